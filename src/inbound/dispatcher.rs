use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::stripe::{StripeEvent, StripeVerifier};
use crate::domain::models::{CallbackEvent, DepositCallback, PayoutCallback};
use crate::domain::ports::CallbackHandler;
use crate::signatures::{CallbackVerifier, InboundRequest};

/// Providers that may post to `/api/webhooks/{provider}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    PawaPay,
    Stripe,
}

impl FromStr for Provider {
    type Err = DispatchError;

    fn from_str(segment: &str) -> Result<Self, Self::Err> {
        match segment.to_ascii_lowercase().as_str() {
            "pawapay" => Ok(Provider::PawaPay),
            "stripe" => Ok(Provider::Stripe),
            _ => Err(DispatchError::UnknownProvider(segment.to_string())),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::PawaPay => f.write_str("pawapay"),
            Provider::Stripe => f.write_str("stripe"),
        }
    }
}

/// Reasons a webhook is not acknowledged
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Unknown webhook provider: {0}")]
    UnknownProvider(String),

    #[error("Webhook signature rejected: {0}")]
    Unauthorized(String),

    #[error("Malformed webhook body: {0}")]
    MalformedBody(String),
}

/// What happened to an acknowledged webhook
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acknowledgement {
    /// Routed to the callback handlers (whether or not they succeeded)
    Processed(CallbackEvent),

    /// Verified but of a shape or type nothing acts on
    Ignored(String),
}

/// Routes verified provider callbacks to the registered handlers.
///
/// The signature is checked over the raw body before anything is parsed.
/// Once a body is verified and parsed the webhook is acknowledged, even when
/// a handler fails: those failures are logged instead, since the provider
/// would otherwise redeliver the whole webhook.
pub struct WebhookDispatcher {
    pawapay: CallbackVerifier,
    stripe: StripeVerifier,
    handlers: Arc<RwLock<Vec<Arc<dyn CallbackHandler>>>>,
}

impl WebhookDispatcher {
    pub fn new(pawapay: CallbackVerifier, stripe: StripeVerifier) -> Self {
        if !pawapay.is_configured() {
            warn!("No PawaPay public key configured, all PawaPay callbacks will be rejected");
        }
        if !stripe.is_configured() {
            warn!("No Stripe webhook secret configured, all Stripe events will be rejected");
        }

        Self {
            pawapay,
            stripe,
            handlers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Register a handler for verified mobile-money callbacks
    pub async fn register_handler(&self, handler: Arc<dyn CallbackHandler>) {
        let mut handlers = self.handlers.write().await;
        handlers.push(handler);
    }

    pub async fn dispatch(
        &self,
        provider: &str,
        request: &InboundRequest<'_>,
    ) -> Result<Acknowledgement, DispatchError> {
        match provider.parse::<Provider>()? {
            Provider::PawaPay => self.dispatch_pawapay(request).await,
            Provider::Stripe => self.dispatch_stripe(request),
        }
    }

    async fn dispatch_pawapay(
        &self,
        request: &InboundRequest<'_>,
    ) -> Result<Acknowledgement, DispatchError> {
        self.pawapay.verify(request).map_err(|e| {
            warn!(provider = %Provider::PawaPay, error = %e, "Rejecting callback");
            DispatchError::Unauthorized(e.to_string())
        })?;

        let payload: Value = serde_json::from_slice(request.body)
            .map_err(|e| DispatchError::MalformedBody(e.to_string()))?;

        let event = match route_callback(payload) {
            Ok(Some(event)) => event,
            Ok(None) => {
                warn!(provider = %Provider::PawaPay, "Unknown callback type, acknowledging");
                return Ok(Acknowledgement::Ignored("unknown callback type".to_string()));
            }
            Err(e) => {
                error!(provider = %Provider::PawaPay, error = %e, "Callback did not match its declared shape");
                return Ok(Acknowledgement::Ignored(e.to_string()));
            }
        };

        info!(
            provider = %Provider::PawaPay,
            transaction_id = %event.transaction_id(),
            status = ?event.status(),
            "Callback received"
        );

        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            if let Err(e) = handler.handle(&event).await {
                error!(
                    handler = handler.name(),
                    transaction_id = %event.transaction_id(),
                    error = %e,
                    "Callback handler failed"
                );
            }
        }

        Ok(Acknowledgement::Processed(event))
    }

    fn dispatch_stripe(&self, request: &InboundRequest<'_>) -> Result<Acknowledgement, DispatchError> {
        let header = request
            .headers
            .get("stripe-signature")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| DispatchError::Unauthorized("Missing stripe-signature header".to_string()))?;

        self.stripe.verify(request.body, header).map_err(|e| {
            warn!(provider = %Provider::Stripe, error = %e, "Rejecting event");
            DispatchError::Unauthorized(e.to_string())
        })?;

        let event: StripeEvent = serde_json::from_slice(request.body)
            .map_err(|e| DispatchError::MalformedBody(e.to_string()))?;

        if event.is_handled() {
            info!(
                provider = %Provider::Stripe,
                event_id = %event.id,
                event_type = %event.event_type,
                "Stripe event received"
            );
        } else {
            debug!(
                provider = %Provider::Stripe,
                event_id = %event.id,
                event_type = %event.event_type,
                "Unhandled Stripe event type"
            );
        }

        Ok(Acknowledgement::Ignored(event.event_type))
    }
}

/// Route a callback by shape: `depositId` makes it a deposit, `payoutId` a payout.
pub fn route_callback(payload: Value) -> Result<Option<CallbackEvent>, serde_json::Error> {
    if payload.get("depositId").is_some() {
        return serde_json::from_value::<DepositCallback>(payload)
            .map(|d| Some(CallbackEvent::Deposit(d)));
    }
    if payload.get("payoutId").is_some() {
        return serde_json::from_value::<PayoutCallback>(payload)
            .map(|p| Some(CallbackEvent::Payout(p)));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TransactionStatus;
    use crate::domain::ports::CallbackError;
    use crate::inbound::stripe::format_signature_header;
    use crate::signatures::algorithm::test_keys::generate_pem;
    use crate::signatures::algorithm::{SignatureAlgorithm, public_key_from_pem};
    use crate::signatures::{RequestComponents, RequestSigner, SignatureConfig};
    use async_trait::async_trait;
    use axum::http::{HeaderMap, HeaderName, HeaderValue};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use time::OffsetDateTime;

    const PATH: &str = "/api/webhooks/pawapay";

    #[derive(Default)]
    struct Recording {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl CallbackHandler for Recording {
        async fn handle(&self, _event: &CallbackEvent) -> Result<(), CallbackError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CallbackError::Processing("database down".to_string()));
            }
            Ok(())
        }
    }

    struct Signed {
        dispatcher: WebhookDispatcher,
        headers: HeaderMap,
    }

    fn signed_pawapay(body: &[u8]) -> Signed {
        let alg = SignatureAlgorithm::EcdsaP256Sha256;
        let (private_pem, public_pem) = generate_pem(alg);
        let signer = RequestSigner::new(Some(SignatureConfig::from_pem("pp", &private_pem, alg).unwrap()));
        let signed = signer
            .sign(&RequestComponents {
                method: "POST",
                authority: "localhost",
                path: PATH,
                body,
                content_type: "application/json",
            })
            .unwrap()
            .unwrap();

        let mut headers = HeaderMap::new();
        for (name, value) in signed.pairs() {
            headers.insert(
                HeaderName::from_bytes(name.to_ascii_lowercase().as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        Signed {
            dispatcher: WebhookDispatcher::new(
                CallbackVerifier::new(Some(public_key_from_pem(&public_pem).unwrap())),
                StripeVerifier::new(None),
            ),
            headers,
        }
    }

    fn inbound<'a>(headers: &'a HeaderMap, body: &'a [u8]) -> InboundRequest<'a> {
        InboundRequest {
            method: "POST",
            authority: "localhost",
            path: PATH,
            headers,
            body,
        }
    }

    #[test]
    fn test_route_by_shape() -> Result<(), serde_json::Error> {
        let deposit = route_callback(json!({
            "depositId": "8917c345-4791-4285-a416-62f24b6982db",
            "status": "COMPLETED"
        }))?;
        assert!(matches!(deposit, Some(CallbackEvent::Deposit(_))));

        let payout = route_callback(json!({
            "payoutId": "8917c345-4791-4285-a416-62f24b6982db",
            "status": "FAILED",
            "failureReason": {"failureCode": "RECIPIENT_NOT_FOUND"}
        }))?;
        assert_eq!(
            payout.map(|p| p.status()),
            Some(TransactionStatus::Failed)
        );

        assert_eq!(route_callback(json!({"refundId": "x"}))?, None);
        assert!(route_callback(json!({"depositId": "not-a-uuid", "status": "COMPLETED"})).is_err());
        Ok(())
    }

    #[test]
    fn test_provider_from_segment() {
        assert_eq!("pawapay".parse::<Provider>().ok(), Some(Provider::PawaPay));
        assert_eq!("Stripe".parse::<Provider>().ok(), Some(Provider::Stripe));
        assert!(matches!(
            "paypal".parse::<Provider>(),
            Err(DispatchError::UnknownProvider(_))
        ));
    }

    #[tokio::test]
    async fn test_verified_callback_reaches_handlers() {
        let body = br#"{"depositId":"8917c345-4791-4285-a416-62f24b6982db","status":"COMPLETED"}"#;
        let signed = signed_pawapay(body);
        let recording = Arc::new(Recording::default());
        signed.dispatcher.register_handler(recording.clone()).await;

        let ack = signed
            .dispatcher
            .dispatch("pawapay", &inbound(&signed.headers, body))
            .await;

        assert!(matches!(ack, Ok(Acknowledgement::Processed(_))));
        assert_eq!(recording.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_handler_failure_is_still_acknowledged() {
        let body = br#"{"payoutId":"8917c345-4791-4285-a416-62f24b6982db","status":"COMPLETED"}"#;
        let signed = signed_pawapay(body);
        let failing = Arc::new(Recording {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let second = Arc::new(Recording::default());
        signed.dispatcher.register_handler(failing.clone()).await;
        signed.dispatcher.register_handler(second.clone()).await;

        let ack = signed
            .dispatcher
            .dispatch("pawapay", &inbound(&signed.headers, body))
            .await;

        assert!(ack.is_ok());
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_tampered_body_never_reaches_handlers() {
        let body = br#"{"depositId":"8917c345-4791-4285-a416-62f24b6982db","status":"FAILED"}"#;
        let signed = signed_pawapay(body);
        let recording = Arc::new(Recording::default());
        signed.dispatcher.register_handler(recording.clone()).await;

        let mut tampered = body.to_vec();
        tampered[60] ^= 0x01;
        let result = signed
            .dispatcher
            .dispatch("pawapay", &inbound(&signed.headers, &tampered))
            .await;

        assert!(matches!(result, Err(DispatchError::Unauthorized(_))));
        assert_eq!(recording.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_signed_garbage_is_malformed() {
        let body = b"not json";
        let signed = signed_pawapay(body);

        let result = signed
            .dispatcher
            .dispatch("pawapay", &inbound(&signed.headers, body))
            .await;
        assert!(matches!(result, Err(DispatchError::MalformedBody(_))));
    }

    #[tokio::test]
    async fn test_unknown_shape_is_acknowledged() {
        let body = br#"{"refundId":"abc","status":"COMPLETED"}"#;
        let signed = signed_pawapay(body);

        let result = signed
            .dispatcher
            .dispatch("pawapay", &inbound(&signed.headers, body))
            .await;
        assert!(matches!(result, Ok(Acknowledgement::Ignored(_))));
    }

    #[tokio::test]
    async fn test_stripe_events() {
        let body = br#"{"id":"evt_1","type":"checkout.session.completed","data":{"object":{}}}"#;
        let stripe = StripeVerifier::new(Some("whsec_test".to_string()));
        let timestamp = OffsetDateTime::now_utc().unix_timestamp();
        let signature = stripe.sign_with_timestamp(body, timestamp).unwrap();
        let dispatcher = WebhookDispatcher::new(CallbackVerifier::new(None), stripe);

        let mut headers = HeaderMap::new();
        headers.insert(
            "stripe-signature",
            HeaderValue::from_str(&format_signature_header(timestamp, &signature)).unwrap(),
        );

        let ack = dispatcher.dispatch("stripe", &inbound(&headers, body)).await;
        assert_eq!(
            ack.ok(),
            Some(Acknowledgement::Ignored("checkout.session.completed".to_string()))
        );

        let unsigned = HeaderMap::new();
        assert!(matches!(
            dispatcher.dispatch("stripe", &inbound(&unsigned, body)).await,
            Err(DispatchError::Unauthorized(_))
        ));

        // PawaPay callbacks fail closed without a public key
        assert!(matches!(
            dispatcher.dispatch("pawapay", &inbound(&headers, body)).await,
            Err(DispatchError::Unauthorized(_))
        ));
    }
}
