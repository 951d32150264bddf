use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, Uri, header};

use crate::inbound::Acknowledgement;
use crate::server::AppState;
use crate::server::responses::{ApiError, Received};
use crate::signatures::InboundRequest;

/// Receives a provider webhook. The body is taken as raw bytes so the
/// signature is checked over exactly what was sent.
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Received>, ApiError> {
    let authority = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .unwrap_or_default();

    let request = InboundRequest {
        method: method.as_str(),
        authority,
        path: uri.path(),
        headers: &headers,
        body: &body,
    };

    match state.dispatcher.dispatch(&provider, &request).await? {
        Acknowledgement::Processed(event) => {
            tracing::debug!(transaction_id = %event.transaction_id(), "Webhook processed");
        }
        Acknowledgement::Ignored(reason) => {
            tracing::debug!(%provider, %reason, "Webhook acknowledged without processing");
        }
    }

    Ok(Received::ok())
}
