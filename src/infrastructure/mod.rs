pub mod audit_log_handler;
pub mod memory_store;

pub use audit_log_handler::AuditLogHandler;
pub use memory_store::InMemoryTransactionStore;
