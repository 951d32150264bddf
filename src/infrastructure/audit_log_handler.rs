use crate::domain::models::{CallbackEvent, TransactionStatus};
use crate::domain::ports::{CallbackError, CallbackHandler};
use async_trait::async_trait;
use tracing::{info, warn};

/// Audit trail of every verified provider callback
pub struct AuditLogHandler;

impl AuditLogHandler {
    pub fn new() -> Self {
        Self
    }

    /// Money did not move as requested
    fn is_failure(&self, event: &CallbackEvent) -> bool {
        matches!(
            event.status(),
            TransactionStatus::Failed | TransactionStatus::Rejected | TransactionStatus::Cancelled
        )
    }
}

impl Default for AuditLogHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CallbackHandler for AuditLogHandler {
    async fn handle(&self, event: &CallbackEvent) -> Result<(), CallbackError> {
        let kind = match event {
            CallbackEvent::Deposit(_) => "deposit",
            CallbackEvent::Payout(_) => "payout",
        };

        if self.is_failure(event) {
            warn!(
                transaction_id = %event.transaction_id(),
                kind,
                status = ?event.status(),
                failure = %event.failure_reason().map(|r| r.describe()).unwrap_or_default(),
                "AUDIT: Failed transaction callback"
            );
        } else {
            info!(
                transaction_id = %event.transaction_id(),
                kind,
                status = ?event.status(),
                "AUDIT: Transaction callback"
            );
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "AuditLogHandler"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{DepositCallback, FailureReason, PayoutCallback};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_audit_log_handler_failed_payout() {
        let handler = AuditLogHandler::new();

        let event = CallbackEvent::Payout(PayoutCallback {
            payout_id: Uuid::new_v4(),
            status: TransactionStatus::Failed,
            amount: Some("100".to_string()),
            currency: Some("KES".to_string()),
            correspondent: Some("MPESA_KEN".to_string()),
            failure_reason: Some(FailureReason {
                failure_code: "RECIPIENT_NOT_FOUND".to_string(),
                failure_message: None,
            }),
        });

        assert!(handler.is_failure(&event));
        assert!(handler.handle(&event).await.is_ok());
    }

    #[tokio::test]
    async fn test_audit_log_handler_completed_deposit() {
        let handler = AuditLogHandler::new();

        let event = CallbackEvent::Deposit(DepositCallback {
            deposit_id: Uuid::new_v4(),
            status: TransactionStatus::Completed,
            requested_amount: Some("15".to_string()),
            deposited_amount: Some("15".to_string()),
            currency: Some("UGX".to_string()),
            correspondent: Some("MTN_MOMO_UGA".to_string()),
            failure_reason: None,
        });

        assert!(!handler.is_failure(&event));
        assert!(handler.handle(&event).await.is_ok());
        assert_eq!(handler.name(), "AuditLogHandler");
    }
}
