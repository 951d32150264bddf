use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;

use crate::domain::payments::PaymentError;
use crate::inbound::DispatchError;
use crate::outbound::pawapay::GatewayError;

/// Message returned when the outcome of a provider call is unknown
pub const NETWORK_ERROR_MESSAGE: &str =
    "Network error occurred. Please check transaction status before retrying.";

/// Message returned when the provider accepted a call but its answer was unreadable
pub const UNREADABLE_RESPONSE_MESSAGE: &str =
    "Provider response could not be read. Please check transaction status before retrying.";

/// Webhook acknowledgement body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Received {
    pub received: bool,
}

impl Received {
    pub fn ok() -> Json<Self> {
        Json(Self { received: true })
    }
}

/// Error body shared by all API responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,

    /// What the caller should do next
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<&'static str>,

    /// HTTP status returned by the provider, when it rejected the call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_status: Option<u16>,

    /// Provider error body, as JSON when it parses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_body: Option<Value>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: error.into(),
                action: None,
                provider_status: None,
                provider_body: None,
            },
        }
    }

    fn with_action(mut self, action: &'static str) -> Self {
        self.body.action = Some(action);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            e if e.is_transient() => {
                ApiError::new(StatusCode::SERVICE_UNAVAILABLE, NETWORK_ERROR_MESSAGE)
                    .with_action("CHECK_STATUS")
            }
            e if e.is_unreadable_success() => {
                tracing::error!(error = %e, "Unreadable provider answer");
                ApiError::new(StatusCode::SERVICE_UNAVAILABLE, UNREADABLE_RESPONSE_MESSAGE)
                    .with_action("CHECK_STATUS")
            }
            GatewayError::ProviderRejected {
                operation,
                status,
                status_text,
                body,
            } => {
                let mut api = ApiError::new(
                    StatusCode::BAD_GATEWAY,
                    format!("Provider rejected {operation}: {status_text}"),
                );
                api.body.provider_status = Some(status);
                api.body.provider_body = provider_body(body);
                api
            }
            GatewayError::InvalidRequest(message) => ApiError::new(StatusCode::BAD_REQUEST, message),
            GatewayError::NotFound(id) => {
                ApiError::new(StatusCode::NOT_FOUND, format!("Transaction not found: {id}"))
            }
            e => {
                tracing::error!(error = %e, "Gateway misconfigured");
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to process request")
            }
        }
    }
}

/// Already capped by the gateway client
fn provider_body(body: String) -> Option<Value> {
    if body.trim().is_empty() {
        return None;
    }
    Some(serde_json::from_str(&body).unwrap_or(Value::String(body)))
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Validation(_) | PaymentError::Amount(_) | PaymentError::AmountRejected { .. } => {
                ApiError::new(StatusCode::BAD_REQUEST, err.to_string())
            }
            PaymentError::Unavailable { .. } => {
                ApiError::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string()).with_action("TRY_LATER")
            }
            PaymentError::Gateway(e) => e.into(),
            PaymentError::Store(e) => {
                tracing::error!(error = %e, "Transaction store failure");
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to process request")
            }
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        let status = match err {
            DispatchError::UnknownProvider(_) | DispatchError::MalformedBody(_) => StatusCode::BAD_REQUEST,
            DispatchError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        };
        let error = match &err {
            DispatchError::UnknownProvider(_) => "Unknown webhook provider".to_string(),
            DispatchError::Unauthorized(_) => "Invalid signature".to_string(),
            DispatchError::MalformedBody(_) => "Malformed payload".to_string(),
        };
        ApiError::new(status, error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
