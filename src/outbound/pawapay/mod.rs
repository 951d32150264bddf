// Mobile-money provider integration
//
//   client – one method per provider operation, signed mutations
//   error  – GatewayError and its transient/rejected split

pub mod client;
pub mod error;

pub use client::{DEFAULT_TIMEOUT, Environment, GatewayClient, GatewaySettings};
pub use error::GatewayError;
