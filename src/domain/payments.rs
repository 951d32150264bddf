use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::amount::{self, AmountError};
use crate::domain::models::{
    BulkPayoutRequest, CallbackEvent, CountryAvailability, DepositRequest, FailureReason,
    OperationType, PaymentPageSessionRequest, PaymentPageSessionResponse, PayoutRequest,
    Transaction, TransactionFilter, TransactionKind, TransactionLimits, TransactionResponse,
    TransactionStatus, ValidationError, is_operation_available,
};
use crate::domain::ports::{CallbackError, CallbackHandler, StoreError, TransactionStore};
use crate::outbound::pawapay::{GatewayClient, GatewayError};

/// Error type for payment orchestration
#[derive(Debug, Error)]
pub enum PaymentError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error("Amount {amount} has too many decimal places for {correspondent}")]
    AmountRejected {
        amount: String,
        correspondent: String,
    },

    #[error("{operation:?} is currently unavailable for {correspondent} in {country}")]
    Unavailable {
        operation: OperationType,
        country: String,
        correspondent: String,
    },

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Caller-side orchestration of provider operations.
///
/// Deposits and payouts are validated, checked against the amount rules and
/// the live availability data, and recorded as `PENDING` before the provider
/// is called. The same service applies verified callbacks to those records.
#[derive(Clone)]
pub struct PaymentService {
    gateway: Arc<GatewayClient>,
    store: Arc<dyn TransactionStore>,
}

impl PaymentService {
    pub fn new(gateway: Arc<GatewayClient>, store: Arc<dyn TransactionStore>) -> Self {
        Self { gateway, store }
    }

    pub fn gateway(&self) -> &GatewayClient {
        &self.gateway
    }

    pub async fn check_availability(
        &self,
        country: &str,
    ) -> Result<Vec<CountryAvailability>, PaymentError> {
        Ok(self.gateway.check_availability(country).await?)
    }

    pub async fn predict_correspondent(
        &self,
        msisdn: &str,
        country: &str,
    ) -> Result<String, PaymentError> {
        Ok(self.gateway.predict_correspondent(msisdn, country).await?)
    }

    pub async fn active_configuration(&self) -> Result<serde_json::Value, PaymentError> {
        Ok(self.gateway.get_active_configuration().await?)
    }

    pub async fn transaction_limits(
        &self,
        mmo_id: &str,
        country: &str,
    ) -> Result<TransactionLimits, PaymentError> {
        Ok(self.gateway.get_transaction_limits(mmo_id, country).await?)
    }

    pub async fn initiate_deposit(
        &self,
        request: DepositRequest,
    ) -> Result<TransactionResponse, PaymentError> {
        request.validate()?;
        check_amount(&request.amount, &request.correspondent)?;
        self.ensure_available(&request.country, &request.correspondent, OperationType::Deposit)
            .await?;

        self.record_pending(Transaction::from_deposit(&request)).await?;

        let outcome = self.gateway.initiate_deposit(&request).await;
        self.apply_outcome(request.deposit_id, outcome).await
    }

    pub async fn initiate_payout(
        &self,
        request: PayoutRequest,
    ) -> Result<TransactionResponse, PaymentError> {
        request.validate()?;
        check_amount(&request.amount, &request.correspondent)?;
        self.ensure_available(&request.country, &request.correspondent, OperationType::Payout)
            .await?;

        self.record_pending(Transaction::from_payout(&request)).await?;

        let outcome = self.gateway.initiate_payout(&request).await;
        self.apply_outcome(request.payout_id, outcome).await
    }

    /// Bulk payouts are not gated on availability; the provider answers per item.
    pub async fn initiate_bulk_payout(
        &self,
        request: BulkPayoutRequest,
    ) -> Result<Vec<TransactionResponse>, PaymentError> {
        request.validate()?;
        for payout in &request.payouts {
            check_amount(&payout.amount, &payout.correspondent)?;
        }
        for payout in &request.payouts {
            self.record_pending(Transaction::from_payout(payout)).await?;
        }

        let responses = match self.gateway.initiate_bulk_payout(&request).await {
            Ok(responses) => responses,
            Err(e) => {
                if e.is_definite_rejection() {
                    for payout in &request.payouts {
                        self.record_status(payout.payout_id, TransactionStatus::Rejected, Some(e.to_string()))
                            .await?;
                    }
                } else {
                    warn!(
                        bulk_payout_id = %request.bulk_payout_id,
                        error = %e,
                        "Bulk payout outcome unknown, records left pending"
                    );
                }
                return Err(e.into());
            }
        };

        for response in &responses {
            let Some(id) = response
                .transaction_id
                .as_deref()
                .and_then(|id| Uuid::parse_str(id).ok())
            else {
                continue;
            };
            self.record_status(id, response.status, response.status_reason.as_ref().map(reason_text))
                .await?;
        }
        Ok(responses)
    }

    /// Read back the provider's view of a deposit and sync the local record.
    pub async fn deposit_status(&self, deposit_id: Uuid) -> Result<TransactionResponse, PaymentError> {
        let response = self.gateway.check_deposit_status(deposit_id).await?;
        self.record_status(
            deposit_id,
            response.status,
            response.status_reason.as_ref().map(reason_text),
        )
        .await?;
        Ok(response)
    }

    pub async fn payout_status(&self, payout_id: Uuid) -> Result<TransactionResponse, PaymentError> {
        let response = self.gateway.check_payout_status(payout_id).await?;
        self.record_status(
            payout_id,
            response.status,
            response.status_reason.as_ref().map(reason_text),
        )
        .await?;
        Ok(response)
    }

    pub async fn resend_deposit_callback(&self, deposit_id: Uuid) -> Result<(), PaymentError> {
        Ok(self.gateway.resend_deposit_callback(deposit_id).await?)
    }

    pub async fn resend_payout_callback(&self, payout_id: Uuid) -> Result<(), PaymentError> {
        Ok(self.gateway.resend_payout_callback(payout_id).await?)
    }

    pub async fn create_payment_page_session(
        &self,
        request: PaymentPageSessionRequest,
    ) -> Result<PaymentPageSessionResponse, PaymentError> {
        Ok(self.gateway.create_payment_page_session(&request).await?)
    }

    pub async fn transaction(&self, id: Uuid) -> Result<Option<Transaction>, PaymentError> {
        Ok(self.store.find(id).await?)
    }

    pub async fn transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, PaymentError> {
        Ok(self.store.list(filter).await?)
    }

    /// Availability is fetched on every call, never cached.
    async fn ensure_available(
        &self,
        country: &str,
        correspondent: &str,
        operation: OperationType,
    ) -> Result<(), PaymentError> {
        let availability = self.gateway.check_availability(country).await?;
        if !is_operation_available(&availability, country, correspondent, operation) {
            warn!(country, correspondent, ?operation, "Correspondent not operational");
            return Err(PaymentError::Unavailable {
                operation,
                country: country.to_string(),
                correspondent: correspondent.to_string(),
            });
        }
        Ok(())
    }

    /// Store a new record. A retry with a known id keeps the existing one.
    async fn record_pending(&self, transaction: Transaction) -> Result<(), PaymentError> {
        if let Some(existing) = self.store.find(transaction.id).await? {
            debug!(
                transaction_id = %existing.id,
                status = ?existing.status,
                "Retrying known transaction"
            );
            return Ok(());
        }
        self.store.save(transaction).await?;
        Ok(())
    }

    async fn apply_outcome(
        &self,
        id: Uuid,
        outcome: Result<TransactionResponse, GatewayError>,
    ) -> Result<TransactionResponse, PaymentError> {
        match outcome {
            Ok(response) => {
                info!(transaction_id = %id, status = ?response.status, "Provider accepted request");
                self.record_status(id, response.status, response.status_reason.as_ref().map(reason_text))
                    .await?;
                Ok(response)
            }
            Err(e) if e.is_definite_rejection() => {
                self.record_status(id, TransactionStatus::Rejected, Some(e.to_string()))
                    .await?;
                Err(e.into())
            }
            Err(e) => {
                warn!(transaction_id = %id, error = %e, "Outcome unknown, record left pending");
                Err(e.into())
            }
        }
    }

    async fn record_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
        reason: Option<String>,
    ) -> Result<bool, StoreError> {
        let Some(mut transaction) = self.store.find(id).await? else {
            return Ok(false);
        };
        if !transaction.apply_status(status, reason) {
            return Ok(false);
        }
        self.store.save(transaction).await?;
        Ok(true)
    }
}

#[async_trait]
impl CallbackHandler for PaymentService {
    async fn handle(&self, event: &CallbackEvent) -> Result<(), CallbackError> {
        let id = event.transaction_id();
        let mut transaction = self
            .store
            .find(id)
            .await?
            .ok_or(CallbackError::UnknownTransaction(id))?;

        let expected = match event {
            CallbackEvent::Deposit(_) => TransactionKind::Deposit,
            CallbackEvent::Payout(_) => TransactionKind::Payout,
        };
        if transaction.kind != expected {
            return Err(CallbackError::Processing(format!(
                "{expected:?} callback for {:?} transaction {id}",
                transaction.kind
            )));
        }

        let reason = event.failure_reason().map(FailureReason::describe);
        if transaction.apply_status(event.status(), reason) {
            info!(transaction_id = %id, status = ?event.status(), "Callback applied");
            self.store.save(transaction).await?;
        } else {
            debug!(
                transaction_id = %id,
                current = ?transaction.status,
                reported = ?event.status(),
                "Callback did not change transaction"
            );
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "PaymentService"
    }
}

fn check_amount(value: &str, correspondent: &str) -> Result<(), PaymentError> {
    if !amount::validate(value, correspondent)? {
        return Err(PaymentError::AmountRejected {
            amount: value.to_string(),
            correspondent: correspondent.to_string(),
        });
    }
    Ok(())
}

/// Provider reasons come as a string or as a `{code, message}` object.
fn reason_text(reason: &serde_json::Value) -> String {
    match reason {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
