pub mod config;
pub mod engine;
pub mod lifecycle;
pub mod native;
pub mod providers;

#[cfg(test)]
mod testing;

use anyhow::Context;
use rmcp::{transport::stdio, ServiceExt};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::engine::audit::AuditLog;
use crate::engine::server::ProcessEngine;
use crate::lifecycle::namespace::Namespace;
use crate::lifecycle::shutdown::ShutdownCoordinator;
use crate::lifecycle::signals::{ShutdownSignals, Trigger};
use crate::native::gateway::Gateway;
use crate::native::pm2::Pm2Supervisor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pm2_mcp=info"));

    // stdout carries the protocol; diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load().context("loading configuration")?;
    let namespace = Namespace::generate().context("generating server namespace")?;
    tracing::info!(namespace = %namespace, "Starting pm2-mcp");

    let audit = Arc::new(AuditLog::new(config.audit.path.clone(), namespace.clone()));
    tracing::info!("Audit log: {}", audit.path().display());

    let gateway = Gateway::new(Arc::new(Pm2Supervisor::new(&config.supervisor)));
    let coordinator = Arc::new(ShutdownCoordinator::new(
        namespace.clone(),
        gateway.clone(),
        audit.clone(),
        config.shutdown.delete_timeout(),
    ));
    let mut signals = ShutdownSignals::register().context("installing signal handlers")?;

    let engine = ProcessEngine::new(namespace, gateway, audit.clone());
    let service = match engine.serve(stdio()).await {
        Ok(service) => service,
        Err(e) => {
            audit.record(format!("Server error: {}", e));
            let report = coordinator.shutdown(Trigger::TransportError).await;
            std::process::exit(report.exit_code());
        }
    };
    audit.record("MCP server started and listening for requests...");

    let trigger = tokio::select! {
        quit = service.waiting() => match quit {
            Ok(_) => {
                tracing::info!("Transport closed");
                Trigger::TransportClosed
            }
            Err(e) => {
                audit.record(format!("Server error: {}", e));
                Trigger::TransportError
            }
        },
        trigger = signals.recv() => trigger,
    };

    // Later signals join the sweep already in flight.
    let late = coordinator.clone();
    tokio::spawn(async move {
        loop {
            let again = signals.recv().await;
            late.shutdown(again).await;
        }
    });
    let report = coordinator.shutdown(trigger).await;

    tracing::info!(
        deleted = report.deleted.len(),
        failed = report.failed.len(),
        phase = ?coordinator.phase(),
        "Shutdown complete"
    );
    std::process::exit(report.exit_code())
}
