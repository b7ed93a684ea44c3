//! # Shutdown coordinator
//!
//! Removes every supervised process owned by this instance before the server
//! exits.
//!
//! ```text
//! SIGINT ──┐
//! SIGTERM ─┼─► shutdown(trigger) ──► first caller wins ──► sweep (once)
//! stdin EOF┘        │                                        │
//!                   └── later callers await the same sweep ◄─┘
//!
//! sweep:
//!   connect ─► list ─► filter "<namespace>-" ─► delete all concurrently
//!                                               (each under its own timeout)
//!           ─► log each outcome ─► log summary ─► disconnect
//! ```
//!
//! Phases go `Running -> CleaningUp -> Exited` and never back. A failed delete
//! is recorded and skipped; it never stops the other deletes or the exit.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

use crate::engine::audit::AuditLog;
use crate::lifecycle::namespace::Namespace;
use crate::lifecycle::signals::Trigger;
use crate::native::gateway::{Gateway, GatewayError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    CleaningUp,
    Exited,
}

/// Outcome of the one cleanup sweep.
#[derive(Debug, Clone)]
pub struct CleanupReport {
    /// The trigger that started the sweep.
    pub trigger: Trigger,
    pub deleted: Vec<String>,
    pub failed: Vec<(String, String)>,
    /// Set when the sweep could not list processes at all.
    pub error: Option<String>,
}

impl CleanupReport {
    pub fn exit_code(&self) -> i32 {
        self.trigger.exit_code()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.error.is_none()
    }
}

pub struct ShutdownCoordinator {
    namespace: Namespace,
    gateway: Gateway,
    audit: Arc<AuditLog>,
    delete_timeout: Duration,
    trigger: OnceCell<Trigger>,
    sweep: OnceCell<CleanupReport>,
}

impl ShutdownCoordinator {
    pub fn new(
        namespace: Namespace,
        gateway: Gateway,
        audit: Arc<AuditLog>,
        delete_timeout: Duration,
    ) -> Self {
        Self {
            namespace,
            gateway,
            audit,
            delete_timeout,
            trigger: OnceCell::new(),
            sweep: OnceCell::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        if self.sweep.initialized() {
            Phase::Exited
        } else if self.trigger.initialized() {
            Phase::CleaningUp
        } else {
            Phase::Running
        }
    }

    /// Runs the cleanup sweep, or waits for the one already running, and
    /// returns its report. Safe to call from any number of triggers.
    pub async fn shutdown(&self, trigger: Trigger) -> &CleanupReport {
        // Losers wait here until the winning trigger is stored.
        let mut claimed = false;
        let first = *self
            .trigger
            .get_or_init(|| {
                claimed = true;
                async move { trigger }
            })
            .await;

        if claimed {
            self.audit.record(format!("Received {}, cleaning up...", trigger));
        } else {
            tracing::info!(%trigger, first = %first, "Shutdown already in progress");
            self.audit
                .record(format!("Received {} during shutdown, waiting for cleanup", trigger));
        }

        self.sweep.get_or_init(|| self.cleanup(first)).await
    }

    async fn cleanup(&self, trigger: Trigger) -> CleanupReport {
        let namespace = self.namespace.clone();
        let audit = self.audit.clone();
        let timeout = self.delete_timeout;

        let swept = self
            .gateway
            .with_connection(|conn| async move {
                let owned: Vec<String> = conn
                    .list()
                    .await?
                    .into_iter()
                    .map(|p| p.name)
                    .filter(|name| namespace.owns(name))
                    .collect();
                tracing::info!(namespace = %namespace, count = owned.len(), "Deleting owned processes");

                let deletions = owned.into_iter().map(|name| {
                    let conn = conn.clone();
                    let audit = audit.clone();
                    async move {
                        let outcome = match tokio::time::timeout(timeout, conn.delete(&name)).await {
                            Ok(Ok(())) => Ok(()),
                            // Removed by someone else in the meantime.
                            Ok(Err(e)) if e.is_not_found() => Ok(()),
                            Ok(Err(e)) => Err(e.to_string()),
                            Err(_) => Err(GatewayError::Timeout(timeout).to_string()),
                        };
                        match &outcome {
                            Ok(()) => audit.record(format!("Successfully deleted process {}", name)),
                            Err(e) => audit.record(format!("Error deleting process {}: {}", name, e)),
                        }
                        (name, outcome)
                    }
                });
                Ok::<_, GatewayError>(join_all(deletions).await)
            })
            .await;

        let mut report = CleanupReport {
            trigger,
            deleted: Vec::new(),
            failed: Vec::new(),
            error: None,
        };
        match swept {
            Ok(outcomes) => {
                for (name, outcome) in outcomes {
                    match outcome {
                        Ok(()) => report.deleted.push(name),
                        Err(e) => report.failed.push((name, e)),
                    }
                }
            }
            Err(e) => {
                self.audit.record(format!("Error during cleanup: {}", e));
                report.error = Some(e.to_string());
            }
        }

        if report.is_clean() {
            self.audit.record(format!(
                "Cleanup complete. All processes with namespace '{}' have been deleted.",
                self.namespace
            ));
        } else {
            self.audit.record(format!(
                "Cleanup finished for namespace '{}': {} deleted, {} failed",
                self.namespace,
                report.deleted.len(),
                report.failed.len()
            ));
        }
        report
    }
}
