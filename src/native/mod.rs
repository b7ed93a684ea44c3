// Adapters for the external process supervisor.
//
// gateway: supervisor traits, normalized result types, scoped connections
// pm2    : PM2 backend driven through the pm2 CLI

pub mod gateway;
pub mod pm2;
