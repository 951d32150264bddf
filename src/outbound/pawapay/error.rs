use std::time::Duration;

use thiserror::Error;

use crate::signatures::SignatureError;

/// Error type for calls to the mobile-money provider
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("{operation} failed with a network error: {message}")]
    Network {
        operation: &'static str,
        message: String,
    },

    #[error("{operation} rejected by provider: {status} {status_text}")]
    ProviderRejected {
        operation: &'static str,
        status: u16,
        status_text: String,
        body: String,
    },

    #[error("Failed to sign request: {0}")]
    Signature(#[from] SignatureError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{operation} returned an unexpected response: {message}")]
    InvalidResponse {
        operation: &'static str,
        message: String,
    },

    #[error("Transaction not found: {0}")]
    NotFound(String),

    #[error("Invalid gateway configuration: {0}")]
    Configuration(String),
}

impl GatewayError {
    /// The outcome of the call is unknown.
    ///
    /// A retry is only safe with the same idempotency key.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Timeout { .. } | GatewayError::Network { .. })
    }

    /// The provider answered 2xx but the body could not be read, so the
    /// request may well have been accepted.
    pub fn is_unreadable_success(&self) -> bool {
        matches!(self, GatewayError::InvalidResponse { .. })
    }

    /// The request certainly did not result in a transaction: the provider
    /// refused it, or it was never sent.
    pub fn is_definite_rejection(&self) -> bool {
        matches!(
            self,
            GatewayError::ProviderRejected { .. }
                | GatewayError::InvalidRequest(_)
                | GatewayError::Signature(_)
        )
    }

    pub(crate) fn from_reqwest(operation: &'static str, timeout: Duration, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout { operation, timeout }
        } else {
            GatewayError::Network {
                operation,
                message: err.to_string(),
            }
        }
    }
}
