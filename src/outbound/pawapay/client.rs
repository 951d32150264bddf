use std::fmt;
use std::time::{Duration, Instant};

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use super::error::GatewayError;
use crate::domain::models::{
    self, BulkPayoutRequest, CountryAvailability, DepositRequest, OperationType,
    PaymentPageSessionRequest, PaymentPageSessionResponse, PayoutRequest, TransactionLimits,
    TransactionResponse,
};
use crate::signatures::{RequestComponents, RequestSigner, SignatureConfig};

/// Per-call timeout used when none is configured
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const JSON: &str = "application/json";

/// Provider error bodies are kept up to this size
const MAX_ERROR_BODY: usize = 64 * 1024;

/// Provider environment, which selects the base URL
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Sandbox,
    Production,
}

impl Environment {
    pub fn base_url(&self) -> &'static str {
        match self {
            Environment::Sandbox => "https://api.sandbox.pawapay.io",
            Environment::Production => "https://api.pawapay.io",
        }
    }
}

/// Everything needed to build a [`GatewayClient`]
#[derive(Clone)]
pub struct GatewaySettings {
    pub api_key: String,

    pub environment: Environment,

    /// Overrides the environment's base URL
    pub base_url: Option<String>,

    pub timeout: Duration,

    /// Absent disables request signing
    pub signature: Option<SignatureConfig>,
}

impl GatewaySettings {
    pub fn new(api_key: impl Into<String>, environment: Environment) -> Self {
        Self {
            api_key: api_key.into(),
            environment,
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            signature: None,
        }
    }
}

impl fmt::Debug for GatewaySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewaySettings")
            .field("api_key", &"<redacted>")
            .field("environment", &self.environment)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("signature", &self.signature)
            .finish()
    }
}

/// Status endpoints answer with either one record or a list of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

#[derive(Deserialize)]
struct Prediction {
    #[serde(default)]
    correspondent: Option<String>,
}

/// HTTP client for the mobile-money provider.
///
/// Immutable after construction and safe to share between tasks. Each call
/// carries its own timeout, so one call timing out never affects another.
pub struct GatewayClient {
    http: Client,
    api_key: String,
    base_url: String,
    base_path: String,
    authority: String,
    timeout: Duration,
    signer: RequestSigner,
}

impl fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayClient")
            .field("base_url", &self.base_url)
            .field("authority", &self.authority)
            .field("timeout", &self.timeout)
            .field("signing", &self.signer.is_enabled())
            .finish()
    }
}

impl GatewayClient {
    pub fn new(settings: GatewaySettings) -> Result<Self, GatewayError> {
        if settings.api_key.trim().is_empty() {
            return Err(GatewayError::Configuration(
                "API key must not be empty".to_string(),
            ));
        }

        let raw = settings
            .base_url
            .as_deref()
            .unwrap_or(settings.environment.base_url());
        let url = Url::parse(raw)
            .map_err(|e| GatewayError::Configuration(format!("Invalid base URL {raw}: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| GatewayError::Configuration(format!("Base URL has no host: {raw}")))?;
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        let http = Client::builder()
            .timeout(settings.timeout)
            .user_agent(format!("crowdfund-payments/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::Configuration(e.to_string()))?;

        Ok(Self {
            http,
            api_key: settings.api_key,
            base_url: raw.trim_end_matches('/').to_string(),
            base_path: url.path().trim_end_matches('/').to_string(),
            authority,
            timeout: settings.timeout,
            signer: RequestSigner::new(settings.signature),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `host[:port]` used as the `@authority` signature component
    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn is_signing(&self) -> bool {
        self.signer.is_enabled()
    }

    /// Operational status of every correspondent in `country`. Never cached.
    pub async fn check_availability(
        &self,
        country: &str,
    ) -> Result<Vec<CountryAvailability>, GatewayError> {
        self.get("check_availability", "/availability", &[("country", country)])
            .await
    }

    /// Correspondent that serves `msisdn` in `country`
    pub async fn predict_correspondent(
        &self,
        msisdn: &str,
        country: &str,
    ) -> Result<String, GatewayError> {
        const OPERATION: &str = "predict_correspondent";

        let prediction: Prediction = self
            .get(
                OPERATION,
                "/predict-correspondent",
                &[("msisdn", msisdn), ("country", country)],
            )
            .await?;

        prediction
            .correspondent
            .filter(|c| !c.is_empty())
            .ok_or_else(|| GatewayError::InvalidResponse {
                operation: OPERATION,
                message: "Correspondent not returned in response".to_string(),
            })
    }

    pub async fn get_active_configuration(&self) -> Result<serde_json::Value, GatewayError> {
        self.get("get_active_configuration", "/active-configuration", &[])
            .await
    }

    pub async fn get_transaction_limits(
        &self,
        mmo_id: &str,
        country: &str,
    ) -> Result<TransactionLimits, GatewayError> {
        self.get(
            "get_transaction_limits",
            "/configuration/limits",
            &[("mmoId", mmo_id), ("country", country)],
        )
        .await
    }

    /// Initiate a deposit. `deposit_id` is sent as the idempotency key.
    pub async fn initiate_deposit(
        &self,
        request: &DepositRequest,
    ) -> Result<TransactionResponse, GatewayError> {
        request
            .validate()
            .map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;

        self.post_signed(
            "initiate_deposit",
            "/deposits",
            &request.deposit_id.to_string(),
            request,
        )
        .await
    }

    pub async fn check_deposit_status(
        &self,
        deposit_id: Uuid,
    ) -> Result<TransactionResponse, GatewayError> {
        let records: OneOrMany<TransactionResponse> = self
            .get(
                "check_deposit_status",
                &format!("/deposits/{deposit_id}"),
                &[],
            )
            .await?;

        records
            .into_vec()
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::NotFound(deposit_id.to_string()))
    }

    /// Initiate a payout. `payout_id` is sent as the idempotency key.
    pub async fn initiate_payout(
        &self,
        request: &PayoutRequest,
    ) -> Result<TransactionResponse, GatewayError> {
        request
            .validate()
            .map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;

        self.post_signed(
            "initiate_payout",
            "/payouts",
            &request.payout_id.to_string(),
            request,
        )
        .await
    }

    pub async fn check_payout_status(
        &self,
        payout_id: Uuid,
    ) -> Result<TransactionResponse, GatewayError> {
        let records: OneOrMany<TransactionResponse> = self
            .get(
                "check_payout_status",
                &format!("/payouts/{payout_id}/status"),
                &[],
            )
            .await?;

        records
            .into_vec()
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::NotFound(payout_id.to_string()))
    }

    /// Initiate a bulk payout. `bulk_payout_id` is sent as the idempotency key.
    pub async fn initiate_bulk_payout(
        &self,
        request: &BulkPayoutRequest,
    ) -> Result<Vec<TransactionResponse>, GatewayError> {
        request
            .validate()
            .map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;

        let answer: OneOrMany<TransactionResponse> = self
            .post_signed(
                "initiate_bulk_payout",
                "/bulk-payouts",
                &request.bulk_payout_id.to_string(),
                request,
            )
            .await?;
        Ok(answer.into_vec())
    }

    pub async fn resend_deposit_callback(&self, deposit_id: Uuid) -> Result<(), GatewayError> {
        self.post_empty(
            "resend_deposit_callback",
            &format!("/deposits/{deposit_id}/callback/resend"),
        )
        .await
    }

    pub async fn resend_payout_callback(&self, payout_id: Uuid) -> Result<(), GatewayError> {
        self.post_empty(
            "resend_payout_callback",
            &format!("/payouts/{payout_id}/callback/resend"),
        )
        .await
    }

    /// Create a hosted payment page session keyed by its `deposit_id`.
    pub async fn create_payment_page_session(
        &self,
        request: &PaymentPageSessionRequest,
    ) -> Result<PaymentPageSessionResponse, GatewayError> {
        request
            .validate()
            .map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;

        self.post_signed(
            "create_payment_page_session",
            "/v1/widget/sessions",
            &request.deposit_id.to_string(),
            request,
        )
        .await
    }

    /// Pure check over availability data already fetched with
    /// [`GatewayClient::check_availability`].
    pub fn is_operation_available(
        availability: &[CountryAvailability],
        country: &str,
        correspondent: &str,
        operation_type: OperationType,
    ) -> bool {
        models::is_operation_available(availability, country, correspondent, operation_type)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, GatewayError> {
        let request = self
            .http
            .get(self.url(path))
            .bearer_auth(&self.api_key)
            .query(query);

        let body = self.execute(operation, request).await?;
        decode(operation, &body)
    }

    async fn post_signed<B: Serialize, T: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
        idempotency_key: &str,
        payload: &B,
    ) -> Result<T, GatewayError> {
        // These bytes are digested, signed and sent as-is
        let body = serde_json::to_vec(payload)
            .map_err(|e| GatewayError::InvalidRequest(format!("Failed to serialize body: {e}")))?;

        let mut request = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.api_key)
            .header(CONTENT_TYPE, JSON)
            .header("Idempotency-Key", idempotency_key);

        let signed_path = format!("{}{path}", self.base_path);
        let signature = self.signer.sign(&RequestComponents {
            method: "POST",
            authority: &self.authority,
            path: &signed_path,
            body: &body,
            content_type: JSON,
        })?;
        if let Some(headers) = signature {
            for (name, value) in headers.pairs() {
                request = request.header(name, value);
            }
        }

        debug!(operation, idempotency_key, signed = self.signer.is_enabled(), "Sending mutation");

        let response = self.execute(operation, request.body(body)).await?;
        decode(operation, &response)
    }

    async fn post_empty(&self, operation: &'static str, path: &str) -> Result<(), GatewayError> {
        let request = self.http.post(self.url(path)).bearer_auth(&self.api_key);
        self.execute(operation, request).await?;
        Ok(())
    }

    async fn execute(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<Vec<u8>, GatewayError> {
        let start = Instant::now();

        let response = request.send().await.map_err(|e| {
            warn!(operation, error = %e, "Provider request failed");
            GatewayError::from_reqwest(operation, self.timeout, e)
        })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| {
            warn!(operation, error = %e, "Failed to read provider response");
            GatewayError::from_reqwest(operation, self.timeout, e)
        })?;

        debug!(
            operation,
            status = status.as_u16(),
            response_time_ms = start.elapsed().as_millis() as u64,
            "Provider response received"
        );

        if !status.is_success() {
            let body = String::from_utf8_lossy(&body[..body.len().min(MAX_ERROR_BODY)]).into_owned();
            warn!(operation, status = status.as_u16(), body = %body, "Provider rejected request");
            return Err(GatewayError::ProviderRejected {
                operation,
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
                body,
            });
        }

        Ok(body.to_vec())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

fn decode<T: DeserializeOwned>(operation: &'static str, body: &[u8]) -> Result<T, GatewayError> {
    serde_json::from_slice(body).map_err(|e| GatewayError::InvalidResponse {
        operation,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{
        CorrespondentAvailability, OperationAvailability, OperationStatus, TransactionStatus,
    };

    #[test]
    fn test_environment_base_urls() {
        assert_eq!(
            Environment::Sandbox.base_url(),
            "https://api.sandbox.pawapay.io"
        );
        assert_eq!(Environment::Production.base_url(), "https://api.pawapay.io");
        assert_eq!(Environment::default(), Environment::Sandbox);
    }

    #[test]
    fn test_authority_from_environment() -> Result<(), GatewayError> {
        let client = GatewayClient::new(GatewaySettings::new("key", Environment::Production))?;
        assert_eq!(client.authority(), "api.pawapay.io");
        assert_eq!(client.timeout(), DEFAULT_TIMEOUT);
        assert!(!client.is_signing());
        Ok(())
    }

    #[test]
    fn test_authority_keeps_explicit_port() -> Result<(), GatewayError> {
        let mut settings = GatewaySettings::new("key", Environment::Sandbox);
        settings.base_url = Some("http://127.0.0.1:4010/".to_string());

        let client = GatewayClient::new(settings)?;
        assert_eq!(client.authority(), "127.0.0.1:4010");
        assert_eq!(client.url("/deposits"), "http://127.0.0.1:4010/deposits");
        Ok(())
    }

    #[test]
    fn test_blank_api_key_is_rejected() {
        let result = GatewayClient::new(GatewaySettings::new("  ", Environment::Sandbox));
        assert!(matches!(result, Err(GatewayError::Configuration(_))));
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let mut settings = GatewaySettings::new("key", Environment::Sandbox);
        settings.base_url = Some("not a url".to_string());
        assert!(matches!(
            GatewayClient::new(settings),
            Err(GatewayError::Configuration(_))
        ));
    }

    #[test]
    fn test_settings_debug_redacts_api_key() {
        let settings = GatewaySettings::new("super-secret-token", Environment::Sandbox);
        let debug = format!("{settings:?}");
        assert!(!debug.contains("super-secret-token"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_status_answer_shapes() -> Result<(), GatewayError> {
        let list = br#"[{"depositId":"d1","status":"COMPLETED"}]"#;
        let single = br#"{"depositId":"d1","status":"ACCEPTED"}"#;

        let from_list: OneOrMany<TransactionResponse> = decode("test", list)?;
        let from_single: OneOrMany<TransactionResponse> = decode("test", single)?;

        assert_eq!(from_list.into_vec()[0].status, TransactionStatus::Completed);
        assert_eq!(from_single.into_vec()[0].status, TransactionStatus::Accepted);
        Ok(())
    }

    #[test]
    fn test_is_operation_available_delegates() {
        let data = vec![CountryAvailability {
            country: "ZMB".to_string(),
            correspondents: vec![CorrespondentAvailability {
                correspondent: "MTN_MOMO_ZMB".to_string(),
                operation_types: vec![OperationAvailability {
                    operation_type: OperationType::Payout,
                    status: OperationStatus::Operational,
                }],
            }],
        }];

        assert!(GatewayClient::is_operation_available(
            &data,
            "ZMB",
            "MTN_MOMO_ZMB",
            OperationType::Payout
        ));
        assert!(!GatewayClient::is_operation_available(
            &data,
            "ZMB",
            "MTN_MOMO_ZMB",
            OperationType::Deposit
        ));
    }
}
