use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to connect to process supervisor: {0}")]
    Connect(String),
    #[error("process or namespace not found: {0}")]
    NotFound(String),
    #[error("failed to start process: {0}")]
    Start(String),
    #[error("supervisor command failed: {0}")]
    Command(String),
    #[error("supervisor call timed out after {0:?}")]
    Timeout(Duration),
    #[error("unreadable supervisor output: {0}")]
    Parse(String),
}

impl GatewayError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound(_))
    }
}

/// Status as reported by the supervisor. The supervisor owns transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessStatus {
    Starting,
    Online,
    Stopping,
    Stopped,
    Errored,
    Unknown(String),
}

impl From<&str> for ProcessStatus {
    fn from(raw: &str) -> Self {
        match raw {
            "launching" | "starting" | "waiting restart" => ProcessStatus::Starting,
            "online" => ProcessStatus::Online,
            "stopping" => ProcessStatus::Stopping,
            "stopped" => ProcessStatus::Stopped,
            "errored" => ProcessStatus::Errored,
            other => ProcessStatus::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessStatus::Starting => "starting",
            ProcessStatus::Online => "online",
            ProcessStatus::Stopping => "stopping",
            ProcessStatus::Stopped => "stopped",
            ProcessStatus::Errored => "errored",
            ProcessStatus::Unknown(raw) if raw.is_empty() => "unknown",
            ProcessStatus::Unknown(raw) => raw.as_str(),
        };
        // pad() so callers can use width specifiers
        f.pad(s)
    }
}

/// What to launch. `name` must already carry the namespace prefix.
#[derive(Debug, Clone)]
pub struct StartSpec {
    pub name: String,
    pub script: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

#[derive(Debug, Clone)]
pub struct StartedProcess {
    pub name: String,
    pub pid: Option<u32>,
    pub status: ProcessStatus,
}

/// Point-in-time view of one supervised process.
#[derive(Debug, Clone)]
pub struct ProcessSnapshot {
    pub name: String,
    pub status: ProcessStatus,
    pub pid: Option<u32>,
    pub cpu: f64,
    pub memory: u64,
    pub uptime: Duration,
}

/// An external process supervisor that can be connected to.
#[async_trait]
pub trait Supervisor: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn SupervisorConnection>, GatewayError>;
}

/// An open control connection. Results are already normalized.
#[async_trait]
pub trait SupervisorConnection: Send + Sync {
    async fn start(&self, spec: &StartSpec) -> Result<StartedProcess, GatewayError>;
    async fn delete(&self, name: &str) -> Result<(), GatewayError>;
    async fn list(&self) -> Result<Vec<ProcessSnapshot>, GatewayError>;
    async fn disconnect(&self);
}

/// Connection-scoped access to the supervisor.
#[derive(Clone)]
pub struct Gateway {
    supervisor: Arc<dyn Supervisor>,
}

impl Gateway {
    pub fn new(supervisor: Arc<dyn Supervisor>) -> Self {
        Self { supervisor }
    }

    /// Opens a connection, runs `op` with it and disconnects whatever `op`
    /// returned. A failed connect is returned as-is and `op` never runs.
    pub async fn with_connection<T, F, Fut>(&self, op: F) -> Result<T, GatewayError>
    where
        F: FnOnce(Arc<dyn SupervisorConnection>) -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let conn = self.supervisor.connect().await?;
        let result = op(conn.clone()).await;
        conn.disconnect().await;
        result
    }

    pub async fn start(&self, spec: StartSpec) -> Result<StartedProcess, GatewayError> {
        self.with_connection(|conn| async move { conn.start(&spec).await })
            .await
    }

    pub async fn delete(&self, name: &str) -> Result<(), GatewayError> {
        self.with_connection(|conn| async move { conn.delete(name).await })
            .await
    }

    pub async fn list(&self) -> Result<Vec<ProcessSnapshot>, GatewayError> {
        self.with_connection(|conn| async move { conn.list().await })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSupervisor;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ProcessStatus::from("online"), ProcessStatus::Online);
        assert_eq!(ProcessStatus::from("launching"), ProcessStatus::Starting);
        assert_eq!(ProcessStatus::from("errored"), ProcessStatus::Errored);
        assert_eq!(
            ProcessStatus::from("one-launch-status"),
            ProcessStatus::Unknown("one-launch-status".into())
        );
        assert_eq!(format!("{:<8}|", ProcessStatus::Online), "online  |");
    }

    #[tokio::test]
    async fn test_connection_released_on_success() {
        let fake = FakeSupervisor::new();
        let gateway = Gateway::new(fake.clone());

        let listed = gateway.list().await.unwrap();
        assert!(listed.is_empty());
        assert_eq!(fake.connects(), 1);
        assert_eq!(fake.disconnects(), 1);
    }

    #[tokio::test]
    async fn test_connection_released_on_failure() {
        let fake = FakeSupervisor::new();
        let gateway = Gateway::new(fake.clone());

        let err = gateway.delete("nope-123456").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(fake.connects(), 1);
        assert_eq!(fake.disconnects(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_skips_operation() {
        let fake = FakeSupervisor::new();
        fake.fail_connect(true);
        let gateway = Gateway::new(fake.clone());

        let mut ran = false;
        let result = gateway
            .with_connection(|_conn| {
                ran = true;
                async { Ok(()) }
            })
            .await;

        assert!(matches!(result, Err(GatewayError::Connect(_))));
        assert!(!ran);
        assert_eq!(fake.disconnects(), 0);
    }
}
