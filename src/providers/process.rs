use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::lifecycle::namespace::{has_namespace_prefix, Namespace, NamespaceError};
use crate::native::gateway::{Gateway, GatewayError, ProcessSnapshot, StartSpec, StartedProcess};

/// Placeholder shown instead of an empty table.
pub const NO_PROCESSES: &str = "No processes running";

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("missing required argument '{0}'")]
    MissingArgument(&'static str),
    #[error("cannot resolve working directory: {0}")]
    WorkingDirectory(std::io::Error),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Identity(#[from] NamespaceError),
}

#[derive(Debug, Clone, Default)]
pub struct StartRequest {
    pub script: String,
    pub args: Vec<String>,
    pub cwd: Option<String>,
}

/// Rejects blank values; anything else passes through untouched.
fn required<'a>(arg: &'static str, value: &'a str) -> Result<&'a str, ToolError> {
    if value.trim().is_empty() {
        Err(ToolError::MissingArgument(arg))
    } else {
        Ok(value)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Starts `script` under a freshly minted `<namespace>-<token>` name.
pub async fn start_process(
    gateway: &Gateway,
    namespace: &Namespace,
    request: StartRequest,
) -> Result<StartedProcess, ToolError> {
    let script = required("script", &request.script)?.to_string();
    let cwd = match non_empty(request.cwd.as_deref()) {
        Some(dir) => PathBuf::from(dir),
        None => std::env::current_dir().map_err(ToolError::WorkingDirectory)?,
    };
    let name = namespace.process_name()?;

    tracing::debug!(process = %name, script = %script, cwd = %cwd.display(), "Starting process");
    let started = gateway
        .start(StartSpec {
            name,
            script,
            args: request.args,
            cwd,
        })
        .await?;
    Ok(started)
}

pub async fn delete_process(gateway: &Gateway, name: &str) -> Result<(), ToolError> {
    let name = required("name", name)?;
    gateway.delete(name).await?;
    Ok(())
}

pub async fn list_processes(gateway: &Gateway, filter: Option<&str>) -> Result<Listing, ToolError> {
    let filter = non_empty(filter).map(str::to_string);
    let all = gateway.list().await?;
    let total = all.len();
    let processes = match &filter {
        Some(ns) => all
            .into_iter()
            .filter(|p| has_namespace_prefix(ns, &p.name))
            .collect(),
        None => all,
    };
    Ok(Listing {
        filter,
        processes,
        total,
    })
}

/// Result of `list_processes`, rendered as a text table through `Display`.
#[derive(Debug, Clone)]
pub struct Listing {
    pub filter: Option<String>,
    pub processes: Vec<ProcessSnapshot>,
    /// Number of processes known to the supervisor before filtering.
    pub total: usize,
}

impl Listing {
    pub fn audit_message(&self) -> String {
        match &self.filter {
            Some(ns) => format!(
                "Listed {} processes for namespace '{}'",
                self.processes.len(),
                ns
            ),
            None => format!("Listed {} processes (all)", self.total),
        }
    }
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.filter {
            Some(ns) => write!(
                f,
                "PM2 Processes for namespace '{}' ({} total):\n\n",
                ns,
                self.processes.len()
            )?,
            None => write!(f, "PM2 Processes ({} total):\n\n", self.processes.len())?,
        }

        if self.processes.is_empty() {
            return f.write_str(NO_PROCESSES);
        }
        let rows: Vec<String> = self.processes.iter().map(render_row).collect();
        f.write_str(&rows.join("\n"))
    }
}

fn render_row(p: &ProcessSnapshot) -> String {
    let pid = p
        .pid
        .map(|pid| pid.to_string())
        .unwrap_or_else(|| "N/A".to_string());
    let memory_mb = (p.memory as f64 / 1024.0 / 1024.0).round() as u64;
    let uptime_secs = (p.uptime.as_millis() as f64 / 1000.0).round() as u64;
    format!(
        "{:<20} | {:<10} | PID: {:<8} | CPU: {}% | Memory: {}MB | Uptime: {}s",
        p.name, p.status, pid, p.cpu, memory_mb, uptime_secs
    )
}
