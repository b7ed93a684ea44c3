// Runtime configuration for pm2-mcp.
//
// Looked up in order: $PM2_MCP_CONFIG, /etc/pm2-mcp/config.toml, built-in
// defaults. $PM2_MCP_AUDIT_LOG and $PM2_BIN override single fields.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_ENV: &str = "PM2_MCP_CONFIG";
pub const AUDIT_LOG_ENV: &str = "PM2_MCP_AUDIT_LOG";
pub const PM2_BIN_ENV: &str = "PM2_BIN";
const DEFAULT_CONFIG_PATH: &str = "/etc/pm2-mcp/config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub audit: AuditConfig,
    pub supervisor: SupervisorConfig,
    pub shutdown: ShutdownConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub path: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        // Outside the working directory so callers' workspaces stay clean.
        Self {
            path: std::env::temp_dir().join("pm2-mcp.log"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub pm2_bin: String,
    pub command_timeout_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            pm2_bin: "pm2".to_string(),
            command_timeout_secs: 30,
        }
    }
}

impl SupervisorConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Upper bound for each individual delete during the cleanup sweep.
    pub delete_timeout_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            delete_timeout_secs: 10,
        }
    }
}

impl ShutdownConfig {
    pub fn delete_timeout(&self) -> Duration {
        Duration::from_secs(self.delete_timeout_secs.max(1))
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolves the config file and applies environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let mut config = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::load_from_file(DEFAULT_CONFIG_PATH)?
            }
            None => Self::default(),
        };

        config.apply_overrides(
            std::env::var_os(AUDIT_LOG_ENV).map(PathBuf::from),
            std::env::var(PM2_BIN_ENV).ok(),
        );
        Ok(config)
    }

    fn apply_overrides(&mut self, audit_log: Option<PathBuf>, pm2_bin: Option<String>) {
        if let Some(path) = audit_log {
            self.audit.path = path;
        }
        if let Some(bin) = pm2_bin.filter(|b| !b.trim().is_empty()) {
            self.supervisor.pm2_bin = bin;
        }
    }
}
