pub mod amount;
pub mod models;
pub mod payments;
pub mod ports;
