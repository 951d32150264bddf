/*
   This module specifies the API by which external modules interact with the payments domain.
*/

use crate::domain::models::{CallbackEvent, Transaction, TransactionFilter};
use async_trait::async_trait;
use uuid::Uuid;

/// Error type for persistence operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Transaction not found: {0}")]
    NotFound(Uuid),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Persistence of transaction records (contributions and payouts).
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Insert or replace the record keyed by `transaction.id`.
    async fn save(&self, transaction: Transaction) -> Result<(), StoreError>;
    async fn find(&self, id: Uuid) -> Result<Option<Transaction>, StoreError>;
    async fn list(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>, StoreError>;
}

/// Error type for callback processing
#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    #[error("Unknown transaction: {0}")]
    UnknownTransaction(Uuid),

    #[error("Failed to process callback: {0}")]
    Processing(String),
}

impl From<StoreError> for CallbackError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => CallbackError::UnknownTransaction(id),
            other => CallbackError::Processing(other.to_string()),
        }
    }
}

/// Trait for processing verified provider callbacks
#[async_trait]
pub trait CallbackHandler: Send + Sync {
    async fn handle(&self, event: &CallbackEvent) -> Result<(), CallbackError>;
    fn name(&self) -> &'static str {
        "UnnamedHandler"
    }
}
