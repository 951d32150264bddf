use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A payload field that failed boundary validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

fn check_id(field: &'static str, id: &Uuid) -> Result<(), ValidationError> {
    if id.is_nil() {
        return Err(ValidationError::new(field, "must not be the nil UUID"));
    }
    Ok(())
}

fn check_code(field: &'static str, value: &str, lengths: &[usize]) -> Result<(), ValidationError> {
    let upper = value.bytes().all(|b| b.is_ascii_uppercase());
    if !upper || !lengths.contains(&value.len()) {
        return Err(ValidationError::new(
            field,
            format!("expected an upper-case ISO code, got {value:?}"),
        ));
    }
    Ok(())
}

fn check_correspondent(value: &str) -> Result<(), ValidationError> {
    let valid = !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_');
    if !valid {
        return Err(ValidationError::new(
            "correspondent",
            format!("unexpected identifier {value:?}"),
        ));
    }
    Ok(())
}

fn check_msisdn(value: &str) -> Result<(), ValidationError> {
    let valid = (6..=15).contains(&value.len()) && value.bytes().all(|b| b.is_ascii_digit());
    if !valid {
        return Err(ValidationError::new(
            "msisdn",
            "expected 6 to 15 digits including the country prefix",
        ));
    }
    Ok(())
}

fn check_amount(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("amount", "must not be empty"));
    }
    Ok(())
}

fn check_statement(value: Option<&str>) -> Result<(), ValidationError> {
    match value {
        Some(s) if s.chars().count() > 22 => Err(ValidationError::new(
            "statementDescription",
            "must be at most 22 characters",
        )),
        _ => Ok(()),
    }
}

fn check_metadata(metadata: &[MetadataField]) -> Result<(), ValidationError> {
    if metadata.iter().any(|m| m.field_name.trim().is_empty()) {
        return Err(ValidationError::new("metadata", "field names must not be empty"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Outbound payloads
// ---------------------------------------------------------------------------

/// Free-form metadata attached to a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataField {
    pub field_name: String,

    pub field_value: String,

    #[serde(default, rename = "isPII", skip_serializing_if = "Option::is_none")]
    pub is_pii: Option<bool>,
}

/// Body of `POST /deposits`. `deposit_id` doubles as the idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRequest {
    pub deposit_id: Uuid,

    pub amount: String,

    pub currency: String,

    pub country: String,

    pub correspondent: String,

    /// Payer phone number
    pub msisdn: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<MetadataField>,
}

impl DepositRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_id("depositId", &self.deposit_id)?;
        check_amount(&self.amount)?;
        check_code("currency", &self.currency, &[3])?;
        check_code("country", &self.country, &[2, 3])?;
        check_correspondent(&self.correspondent)?;
        check_msisdn(&self.msisdn)?;
        check_statement(self.statement_description.as_deref())?;
        check_metadata(&self.metadata)
    }
}

/// Body of `POST /payouts`. `payout_id` doubles as the idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutRequest {
    pub payout_id: Uuid,

    pub amount: String,

    pub currency: String,

    pub country: String,

    pub correspondent: String,

    /// Recipient phone number
    pub msisdn: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_description: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<MetadataField>,
}

impl PayoutRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_id("payoutId", &self.payout_id)?;
        check_amount(&self.amount)?;
        check_code("currency", &self.currency, &[3])?;
        check_code("country", &self.country, &[2, 3])?;
        check_correspondent(&self.correspondent)?;
        check_msisdn(&self.msisdn)?;
        check_statement(self.statement_description.as_deref())?;
        check_metadata(&self.metadata)
    }
}

/// Body of `POST /bulk-payouts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkPayoutRequest {
    pub bulk_payout_id: Uuid,

    pub payouts: Vec<PayoutRequest>,
}

impl BulkPayoutRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_id("bulkPayoutId", &self.bulk_payout_id)?;
        if self.payouts.is_empty() {
            return Err(ValidationError::new("payouts", "must not be empty"));
        }

        let mut seen = std::collections::HashSet::new();
        for payout in &self.payouts {
            payout.validate()?;
            if !seen.insert(payout.payout_id) {
                return Err(ValidationError::new(
                    "payouts",
                    format!("duplicate payoutId {}", payout.payout_id),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "EN")]
    English,
    #[serde(rename = "FR")]
    French,
}

/// Body of `POST /v1/widget/sessions` (hosted payment page).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPageSessionRequest {
    pub deposit_id: Uuid,

    pub return_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement_description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msisdn: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<MetadataField>,
}

impl PaymentPageSessionRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_id("depositId", &self.deposit_id)?;
        if !(self.return_url.starts_with("https://") || self.return_url.starts_with("http://")) {
            return Err(ValidationError::new("returnUrl", "must be an absolute http(s) URL"));
        }
        if let Some(amount) = &self.amount {
            check_amount(amount)?;
        }
        if let Some(msisdn) = &self.msisdn {
            check_msisdn(msisdn)?;
        }
        if let Some(country) = &self.country {
            check_code("country", country, &[2, 3])?;
        }
        check_statement(self.statement_description.as_deref())?;
        check_metadata(&self.metadata)
    }
}

// ---------------------------------------------------------------------------
// Provider responses
// ---------------------------------------------------------------------------

/// Status reported by the provider for a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Accepted,
    Enqueued,
    Submitted,
    Completed,
    Failed,
    Rejected,
    Cancelled,
    DuplicateIgnored,
    #[serde(other)]
    Unknown,
}

impl TransactionStatus {
    /// No further transitions are expected once a terminal status is reached.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed
                | TransactionStatus::Failed
                | TransactionStatus::Rejected
                | TransactionStatus::Cancelled
        )
    }
}

/// Answer to an initiate or status call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    #[serde(
        default,
        alias = "depositId",
        alias = "payoutId",
        alias = "bulkPayoutId",
        skip_serializing_if = "Option::is_none"
    )]
    pub transaction_id: Option<String>,

    pub status: TransactionStatus,

    #[serde(default, alias = "rejectionReason", skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_settlement_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPageSessionResponse {
    pub redirect_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionLimits {
    pub mmo_id: String,

    pub country: String,

    pub currency: String,

    pub min_amount: f64,

    pub max_amount: f64,
}

// ---------------------------------------------------------------------------
// Availability
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    Deposit,
    Payout,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    Operational,
    Delayed,
    Closed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationAvailability {
    pub operation_type: OperationType,

    pub status: OperationStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrespondentAvailability {
    pub correspondent: String,

    #[serde(default)]
    pub operation_types: Vec<OperationAvailability>,
}

/// One country's entry in the `/availability` answer. Always fetched fresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryAvailability {
    pub country: String,

    #[serde(default)]
    pub correspondents: Vec<CorrespondentAvailability>,
}

/// Status of `operation_type` for `correspondent` in `country`, if listed.
pub fn operation_status(
    availability: &[CountryAvailability],
    country: &str,
    correspondent: &str,
    operation_type: OperationType,
) -> Option<OperationStatus> {
    availability
        .iter()
        .find(|c| c.country == country)?
        .correspondents
        .iter()
        .find(|c| c.correspondent == correspondent)?
        .operation_types
        .iter()
        .find(|op| op.operation_type == operation_type)
        .map(|op| op.status)
}

/// True only when the operation is listed and exactly `OPERATIONAL`.
pub fn is_operation_available(
    availability: &[CountryAvailability],
    country: &str,
    correspondent: &str,
    operation_type: OperationType,
) -> bool {
    operation_status(availability, country, correspondent, operation_type)
        == Some(OperationStatus::Operational)
}

// ---------------------------------------------------------------------------
// Callbacks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReason {
    pub failure_code: String,

    #[serde(default)]
    pub failure_message: Option<String>,
}

impl FailureReason {
    pub fn describe(&self) -> String {
        match &self.failure_message {
            Some(message) => format!("{}: {message}", self.failure_code),
            None => self.failure_code.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositCallback {
    pub deposit_id: Uuid,

    pub status: TransactionStatus,

    #[serde(default)]
    pub requested_amount: Option<String>,

    #[serde(default)]
    pub deposited_amount: Option<String>,

    #[serde(default)]
    pub currency: Option<String>,

    #[serde(default)]
    pub correspondent: Option<String>,

    #[serde(default)]
    pub failure_reason: Option<FailureReason>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutCallback {
    pub payout_id: Uuid,

    pub status: TransactionStatus,

    #[serde(default)]
    pub amount: Option<String>,

    #[serde(default)]
    pub currency: Option<String>,

    #[serde(default)]
    pub correspondent: Option<String>,

    #[serde(default)]
    pub failure_reason: Option<FailureReason>,
}

/// A verified provider callback, routed by its shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackEvent {
    Deposit(DepositCallback),
    Payout(PayoutCallback),
}

impl CallbackEvent {
    pub fn transaction_id(&self) -> Uuid {
        match self {
            CallbackEvent::Deposit(d) => d.deposit_id,
            CallbackEvent::Payout(p) => p.payout_id,
        }
    }

    pub fn status(&self) -> TransactionStatus {
        match self {
            CallbackEvent::Deposit(d) => d.status,
            CallbackEvent::Payout(p) => p.status,
        }
    }

    pub fn failure_reason(&self) -> Option<&FailureReason> {
        match self {
            CallbackEvent::Deposit(d) => d.failure_reason.as_ref(),
            CallbackEvent::Payout(p) => p.failure_reason.as_ref(),
        }
    }
}

// ---------------------------------------------------------------------------
// Transaction records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Deposit,
    Payout,
}

/// Local record of a transaction sent to the provider.
///
/// Created before the network call so that the id used as idempotency key is
/// persisted even when the outcome of the call is unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: Uuid,

    pub kind: TransactionKind,

    pub amount: String,

    pub currency: String,

    pub country: String,

    pub correspondent: String,

    pub msisdn: String,

    pub status: TransactionStatus,

    pub failure_reason: Option<String>,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Transaction {
    fn pending(
        id: Uuid,
        kind: TransactionKind,
        amount: &str,
        currency: &str,
        country: &str,
        correspondent: &str,
        msisdn: &str,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id,
            kind,
            amount: amount.to_string(),
            currency: currency.to_string(),
            country: country.to_string(),
            correspondent: correspondent.to_string(),
            msisdn: msisdn.to_string(),
            status: TransactionStatus::Pending,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn from_deposit(request: &DepositRequest) -> Self {
        Self::pending(
            request.deposit_id,
            TransactionKind::Deposit,
            &request.amount,
            &request.currency,
            &request.country,
            &request.correspondent,
            &request.msisdn,
        )
    }

    pub fn from_payout(request: &PayoutRequest) -> Self {
        Self::pending(
            request.payout_id,
            TransactionKind::Payout,
            &request.amount,
            &request.currency,
            &request.country,
            &request.correspondent,
            &request.msisdn,
        )
    }

    /// Record a status reported by the provider.
    ///
    /// `DUPLICATE_IGNORED` and unknown statuses leave the record untouched, and
    /// a terminal status is never overwritten.
    pub fn apply_status(&mut self, status: TransactionStatus, failure_reason: Option<String>) -> bool {
        if self.status.is_terminal()
            || matches!(
                status,
                TransactionStatus::DuplicateIgnored | TransactionStatus::Unknown
            )
        {
            return false;
        }

        self.status = status;
        self.failure_reason = failure_reason;
        self.updated_at = OffsetDateTime::now_utc();
        true
    }
}

/// Criteria for [`crate::domain::ports::TransactionStore::list`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TransactionFilter {
    pub kind: Option<TransactionKind>,

    pub status: Option<TransactionStatus>,
}

impl TransactionFilter {
    pub fn matches(&self, transaction: &Transaction) -> bool {
        self.kind.is_none_or(|k| k == transaction.kind)
            && self.status.is_none_or(|s| s == transaction.status)
    }
}
