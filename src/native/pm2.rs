use async_trait::async_trait;
use serde::Deserialize;
use std::ffi::{OsStr, OsString};
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::process::Command;

use crate::config::SupervisorConfig;
use crate::native::gateway::{
    GatewayError, ProcessSnapshot, ProcessStatus, StartSpec, StartedProcess, Supervisor,
    SupervisorConnection,
};

/// PM2 driven through its CLI. Each "connection" is a verified-reachable
/// daemon; the CLI itself holds no socket between calls.
pub struct Pm2Supervisor {
    cli: Pm2Cli,
}

impl Pm2Supervisor {
    pub fn new(config: &SupervisorConfig) -> Self {
        Self {
            cli: Pm2Cli {
                bin: config.pm2_bin.clone(),
                timeout: config.command_timeout(),
            },
        }
    }
}

#[async_trait]
impl Supervisor for Pm2Supervisor {
    async fn connect(&self) -> Result<Arc<dyn SupervisorConnection>, GatewayError> {
        let out = self
            .cli
            .run(["ping"])
            .await
            .map_err(|e| GatewayError::Connect(e.to_string()))?;
        if !succeeded(&out) {
            return Err(GatewayError::Connect(failure_reason(&out)));
        }
        tracing::debug!(bin = %self.cli.bin, "Connected to pm2");
        Ok(Arc::new(Pm2Connection {
            cli: self.cli.clone(),
        }))
    }
}

#[derive(Debug, Clone)]
struct Pm2Cli {
    bin: String,
    timeout: Duration,
}

impl Pm2Cli {
    async fn run<I, S>(&self, args: I) -> Result<Output, GatewayError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.bin);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(out)) => Ok(out),
            Ok(Err(e)) => Err(GatewayError::Command(format!("{}: {}", self.bin, e))),
            Err(_) => Err(GatewayError::Timeout(self.timeout)),
        }
    }
}

struct Pm2Connection {
    cli: Pm2Cli,
}

#[async_trait]
impl SupervisorConnection for Pm2Connection {
    async fn start(&self, spec: &StartSpec) -> Result<StartedProcess, GatewayError> {
        if self.list().await?.iter().any(|p| p.name == spec.name) {
            return Err(GatewayError::Start(format!(
                "a process named '{}' already exists",
                spec.name
            )));
        }

        let out = self.cli.run(start_args(spec)).await?;
        if !succeeded(&out) {
            return Err(GatewayError::Start(failure_reason(&out)));
        }

        let started = self
            .list()
            .await?
            .into_iter()
            .find(|p| p.name == spec.name)
            .ok_or_else(|| {
                GatewayError::Start(format!("pm2 did not register '{}'", spec.name))
            })?;

        Ok(StartedProcess {
            name: started.name,
            pid: started.pid,
            status: started.status,
        })
    }

    async fn delete(&self, name: &str) -> Result<(), GatewayError> {
        let out = self.cli.run(delete_args(name)).await?;
        if succeeded(&out) {
            Ok(())
        } else {
            Err(delete_failure(name, &out))
        }
    }

    async fn list(&self) -> Result<Vec<ProcessSnapshot>, GatewayError> {
        let out = self.cli.run(["jlist"]).await?;
        if !out.status.success() {
            return Err(GatewayError::Command(failure_reason(&out)));
        }
        parse_jlist(&String::from_utf8_lossy(&out.stdout), now_millis())
    }

    async fn disconnect(&self) {
        tracing::debug!(bin = %self.cli.bin, "Released pm2 connection");
    }
}

fn start_args(spec: &StartSpec) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "start".into(),
        spec.script.clone().into(),
        "--name".into(),
        spec.name.clone().into(),
        "--cwd".into(),
        spec.cwd.clone().into_os_string(),
    ];
    if !spec.args.is_empty() {
        args.push("--".into());
        args.extend(spec.args.iter().map(OsString::from));
    }
    args
}

fn delete_args(name: &str) -> [&str; 3] {
    ["delete", "--", name]
}

// pm2 sometimes reports errors with a zero exit status.
fn succeeded(out: &Output) -> bool {
    out.status.success() && !combined_output(out).contains("[PM2][ERROR]")
}

fn combined_output(out: &Output) -> String {
    let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&out.stderr));
    text
}

fn failure_reason(out: &Output) -> String {
    let text = combined_output(out);
    let errors: Vec<&str> = text
        .lines()
        .filter(|l| l.contains("ERROR"))
        .map(|l| l.trim_start_matches("[PM2][ERROR]").trim())
        .collect();

    if !errors.is_empty() {
        errors.join("; ")
    } else if !text.trim().is_empty() {
        text.trim().to_string()
    } else {
        format!("pm2 exited with {}", out.status)
    }
}

fn delete_failure(name: &str, out: &Output) -> GatewayError {
    if combined_output(out).to_lowercase().contains("not found") {
        GatewayError::NotFound(name.to_string())
    } else {
        GatewayError::Command(failure_reason(out))
    }
}

#[derive(Debug, Deserialize)]
struct JlistEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    pid: Option<u32>,
    #[serde(default)]
    pm2_env: Pm2Env,
    #[serde(default)]
    monit: Monit,
}

#[derive(Debug, Default, Deserialize)]
struct Pm2Env {
    status: Option<String>,
    pm_uptime: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct Monit {
    memory: Option<u64>,
    cpu: Option<f64>,
}

/// Parses `pm2 jlist` output. The daemon may print banner lines (also
/// starting with `[`) before the JSON array when it is first spawned.
fn parse_jlist(stdout: &str, now_ms: i64) -> Result<Vec<ProcessSnapshot>, GatewayError> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }

    let entries: Vec<JlistEntry> = stdout
        .lines()
        .map(str::trim)
        .filter(|l| l.starts_with('['))
        .find_map(|l| serde_json::from_str(l).ok())
        .ok_or_else(|| GatewayError::Parse("no process list in pm2 jlist output".into()))?;

    Ok(entries
        .into_iter()
        .map(|e| {
            let uptime_ms = e
                .pm2_env
                .pm_uptime
                .map(|started| now_ms.saturating_sub(started).max(0))
                .unwrap_or(0);
            ProcessSnapshot {
                name: e.name.unwrap_or_else(|| "unnamed".to_string()),
                status: e
                    .pm2_env
                    .status
                    .as_deref()
                    .map(ProcessStatus::from)
                    .unwrap_or_else(|| ProcessStatus::Unknown(String::new())),
                pid: e.pid.filter(|pid| *pid != 0),
                cpu: e.monit.cpu.unwrap_or(0.0),
                memory: e.monit.memory.unwrap_or(0),
                uptime: Duration::from_millis(uptime_ms as u64),
            }
        })
        .collect())
}

fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
