//! OS termination signals that start the cleanup sweep.
//!
//! Handlers are installed once at startup, before the transport is served, so
//! a failed registration aborts startup instead of leaving processes without
//! a cleanup path.

use std::fmt;

/// What caused the server to begin shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Interrupt,
    Terminate,
    Quit,
    /// The client closed stdin; the process is about to exit.
    TransportClosed,
    TransportError,
}

impl Trigger {
    pub fn exit_code(self) -> i32 {
        match self {
            Trigger::TransportError => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Trigger::Interrupt => "SIGINT",
            Trigger::Terminate => "SIGTERM",
            Trigger::Quit => "SIGQUIT",
            Trigger::TransportClosed => "transport closed",
            Trigger::TransportError => "transport error",
        })
    }
}

#[cfg(unix)]
pub struct ShutdownSignals {
    sigint: tokio::signal::unix::Signal,
    sigterm: tokio::signal::unix::Signal,
    sigquit: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl ShutdownSignals {
    pub fn register() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
            sigquit: signal(SignalKind::quit())?,
        })
    }

    /// Waits for the next termination signal. Can be called repeatedly.
    pub async fn recv(&mut self) -> Trigger {
        tokio::select! {
            _ = self.sigint.recv() => Trigger::Interrupt,
            _ = self.sigterm.recv() => Trigger::Terminate,
            _ = self.sigquit.recv() => Trigger::Quit,
        }
    }
}

#[cfg(not(unix))]
pub struct ShutdownSignals;

#[cfg(not(unix))]
impl ShutdownSignals {
    pub fn register() -> std::io::Result<Self> {
        Ok(Self)
    }

    pub async fn recv(&mut self) -> Trigger {
        match tokio::signal::ctrl_c().await {
            Ok(()) => Trigger::Interrupt,
            Err(e) => {
                tracing::error!("Ctrl-C handler failed: {}", e);
                std::future::pending().await
            }
        }
    }
}
