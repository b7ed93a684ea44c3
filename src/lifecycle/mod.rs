// Namespace ownership and the shutdown path.
//
// namespace: per-instance identity, prefix matching
// signals  : SIGINT/SIGTERM/SIGQUIT registration
// shutdown : single-execution cleanup sweep over owned processes

pub mod namespace;
pub mod shutdown;
pub mod signals;
