//! In-memory stand-in for PM2 used by unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::native::gateway::{
    GatewayError, ProcessSnapshot, ProcessStatus, StartSpec, StartedProcess, Supervisor,
    SupervisorConnection,
};

#[derive(Default)]
struct State {
    processes: BTreeMap<String, ProcessSnapshot>,
    next_pid: u32,
    connects: usize,
    disconnects: usize,
    deletes: Vec<String>,
    fail_connect: bool,
    failing_deletes: HashSet<String>,
    hanging_deletes: HashSet<String>,
}

/// Shared registry; clones of the `Arc` behave like separate clients of the
/// same daemon.
#[derive(Default)]
pub struct FakeSupervisor {
    state: Arc<Mutex<State>>,
}

impl FakeSupervisor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connects(&self) -> usize {
        self.state.lock().connects
    }

    pub fn disconnects(&self) -> usize {
        self.state.lock().disconnects
    }

    pub fn delete_calls(&self) -> Vec<String> {
        self.state.lock().deletes.clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.state.lock().processes.keys().cloned().collect()
    }

    pub fn fail_connect(&self, fail: bool) {
        self.state.lock().fail_connect = fail;
    }

    pub fn fail_delete(&self, name: &str) {
        self.state.lock().failing_deletes.insert(name.to_string());
    }

    pub fn hang_delete(&self, name: &str) {
        self.state.lock().hanging_deletes.insert(name.to_string());
    }

    /// Registers a process that was not started through the gateway.
    pub fn insert(&self, name: &str) {
        let mut state = self.state.lock();
        state.next_pid += 1;
        let pid = 1000 + state.next_pid;
        state.processes.insert(name.to_string(), snapshot(name, pid));
    }
}

fn snapshot(name: &str, pid: u32) -> ProcessSnapshot {
    ProcessSnapshot {
        name: name.to_string(),
        status: ProcessStatus::Online,
        pid: Some(pid),
        cpu: 0.5,
        memory: 32 * 1024 * 1024,
        uptime: Duration::from_secs(12),
    }
}

#[async_trait]
impl Supervisor for FakeSupervisor {
    async fn connect(&self) -> Result<Arc<dyn SupervisorConnection>, GatewayError> {
        let mut state = self.state.lock();
        if state.fail_connect {
            return Err(GatewayError::Connect("connect ECONNREFUSED rpc.sock".into()));
        }
        state.connects += 1;
        Ok(Arc::new(FakeConnection {
            state: self.state.clone(),
        }))
    }
}

struct FakeConnection {
    state: Arc<Mutex<State>>,
}

#[async_trait]
impl SupervisorConnection for FakeConnection {
    async fn start(&self, spec: &StartSpec) -> Result<StartedProcess, GatewayError> {
        let script = Path::new(&spec.script);
        if script.is_absolute() && !script.exists() {
            return Err(GatewayError::Start(format!("Script not found: {}", spec.script)));
        }

        let mut state = self.state.lock();
        if state.processes.contains_key(&spec.name) {
            return Err(GatewayError::Start(format!(
                "a process named '{}' already exists",
                spec.name
            )));
        }
        state.next_pid += 1;
        let pid = 1000 + state.next_pid;
        state
            .processes
            .insert(spec.name.clone(), snapshot(&spec.name, pid));

        Ok(StartedProcess {
            name: spec.name.clone(),
            pid: Some(pid),
            status: ProcessStatus::Online,
        })
    }

    async fn delete(&self, name: &str) -> Result<(), GatewayError> {
        let hang = {
            let mut state = self.state.lock();
            state.deletes.push(name.to_string());
            if state.failing_deletes.contains(name) {
                return Err(GatewayError::Command(format!("cannot stop {name}")));
            }
            state.hanging_deletes.contains(name)
        };
        if hang {
            std::future::pending::<()>().await;
        }

        match self.state.lock().processes.remove(name) {
            Some(_) => Ok(()),
            None => Err(GatewayError::NotFound(name.to_string())),
        }
    }

    async fn list(&self) -> Result<Vec<ProcessSnapshot>, GatewayError> {
        Ok(self.state.lock().processes.values().cloned().collect())
    }

    async fn disconnect(&self) {
        self.state.lock().disconnects += 1;
    }
}
