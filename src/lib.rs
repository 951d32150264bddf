pub mod config;
pub mod domain;
pub mod inbound;
pub mod infrastructure;
pub mod outbound;
pub mod server;
pub mod signatures;
pub mod telemetry;
