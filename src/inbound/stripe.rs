use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use time::OffsetDateTime;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a `Stripe-Signature` timestamp
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Future timestamps within this window are accepted
const CLOCK_SKEW_SECS: i64 = 60;

/// Event types acted upon; everything else is acknowledged and logged
pub const HANDLED_EVENTS: [&str; 3] = [
    "checkout.session.completed",
    "payment_intent.succeeded",
    "payment_intent.payment_failed",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StripeSignatureError {
    #[error("No Stripe webhook secret configured")]
    MissingSecret,

    #[error("Invalid Stripe-Signature header: {0}")]
    Malformed(String),

    #[error("Timestamp too old: {age} seconds (max: {max})")]
    TooOld { age: i64, max: i64 },

    #[error("Timestamp is in the future: {0} seconds ahead")]
    InFuture(i64),

    #[error("No matching v1 signature")]
    Invalid,
}

/// Envelope shared by all Stripe events
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    #[serde(default)]
    pub data: serde_json::Value,
}

impl StripeEvent {
    pub fn is_handled(&self) -> bool {
        HANDLED_EVENTS.contains(&self.event_type.as_str())
    }
}

/// HMAC-SHA256 verification of `Stripe-Signature: t=<unix>,v1=<hex>`.
///
/// The signed message is `"<t>.<raw body>"`. Without a secret every event is
/// rejected.
#[derive(Clone)]
pub struct StripeVerifier {
    secret: Option<String>,
    tolerance_secs: i64,
}

impl std::fmt::Debug for StripeVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeVerifier")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("tolerance_secs", &self.tolerance_secs)
            .finish()
    }
}

impl StripeVerifier {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    pub fn with_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    /// Hex signature of `payload` at `timestamp`
    pub fn sign_with_timestamp(&self, payload: &[u8], timestamp: i64) -> Result<String, StripeSignatureError> {
        let mac = self.mac(payload, timestamp)?;
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    pub fn verify(&self, payload: &[u8], header: &str) -> Result<(), StripeSignatureError> {
        self.verify_at(payload, header, OffsetDateTime::now_utc().unix_timestamp())
    }

    pub fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> Result<(), StripeSignatureError> {
        if self.secret.is_none() {
            return Err(StripeSignatureError::MissingSecret);
        }

        let (timestamp, signatures) = parse_signature_header(header)?;

        // Freshness first, to bound replays
        let age = now.saturating_sub(timestamp);
        if age > self.tolerance_secs {
            return Err(StripeSignatureError::TooOld {
                age,
                max: self.tolerance_secs,
            });
        }
        if timestamp > now.saturating_add(CLOCK_SKEW_SECS) {
            return Err(StripeSignatureError::InFuture(timestamp.saturating_sub(now)));
        }

        for candidate in signatures {
            let Ok(bytes) = hex::decode(&candidate) else {
                continue;
            };
            if self.mac(payload, timestamp)?.verify_slice(&bytes).is_ok() {
                return Ok(());
            }
        }
        Err(StripeSignatureError::Invalid)
    }

    fn mac(&self, payload: &[u8], timestamp: i64) -> Result<HmacSha256, StripeSignatureError> {
        let secret = self
            .secret
            .as_ref()
            .ok_or(StripeSignatureError::MissingSecret)?;

        let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC key can be of any size, as per crate documentation"),
        };
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }
}

/// Format a header the way Stripe sends it
pub fn format_signature_header(timestamp: i64, signature: &str) -> String {
    format!("t={timestamp},v1={signature}")
}

/// Split a header into its timestamp and every `v1` signature.
pub fn parse_signature_header(header: &str) -> Result<(i64, Vec<String>), StripeSignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for item in header.split(',') {
        let Some((key, value)) = item.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => {
                timestamp = Some(value.parse::<i64>().map_err(|_| {
                    StripeSignatureError::Malformed(format!("bad timestamp {value:?}"))
                })?)
            }
            "v1" => signatures.push(value.to_string()),
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| StripeSignatureError::Malformed("missing timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(StripeSignatureError::Malformed(
            "missing v1 signature".to_string(),
        ));
    }
    Ok((timestamp, signatures))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &[u8] = br#"{"id":"evt_1","type":"payment_intent.succeeded","data":{}}"#;

    fn verifier() -> StripeVerifier {
        StripeVerifier::new(Some("whsec_test".to_string()))
    }

    fn now() -> i64 {
        OffsetDateTime::now_utc().unix_timestamp()
    }

    #[test]
    fn test_sign_and_verify() -> Result<(), StripeSignatureError> {
        let verifier = verifier();
        let timestamp = now();
        let signature = verifier.sign_with_timestamp(PAYLOAD, timestamp)?;

        verifier.verify(PAYLOAD, &format_signature_header(timestamp, &signature))?;
        Ok(())
    }

    #[test]
    fn test_verify_fails_with_modified_payload() -> Result<(), StripeSignatureError> {
        let verifier = verifier();
        let timestamp = now();
        let header = format_signature_header(timestamp, &verifier.sign_with_timestamp(PAYLOAD, timestamp)?);

        let result = verifier.verify(br#"{"id":"evt_2"}"#, &header);
        assert_eq!(result, Err(StripeSignatureError::Invalid));
        Ok(())
    }

    #[test]
    fn test_verify_fails_with_wrong_secret() -> Result<(), StripeSignatureError> {
        let other = StripeVerifier::new(Some("whsec_other".to_string()));
        let timestamp = now();
        let header = format_signature_header(timestamp, &other.sign_with_timestamp(PAYLOAD, timestamp)?);

        assert!(verifier().verify(PAYLOAD, &header).is_err());
        Ok(())
    }

    #[test]
    fn test_any_matching_v1_is_accepted() -> Result<(), StripeSignatureError> {
        let verifier = verifier();
        let timestamp = now();
        let good = verifier.sign_with_timestamp(PAYLOAD, timestamp)?;
        let header = format!("t={timestamp},v1={},v1={good},v0=legacy", "00".repeat(32));

        verifier.verify(PAYLOAD, &header)?;
        Ok(())
    }

    #[test]
    fn test_timestamp_too_old() -> Result<(), StripeSignatureError> {
        let verifier = verifier();
        let old = now() - 3600;
        let header = format_signature_header(old, &verifier.sign_with_timestamp(PAYLOAD, old)?);

        let result = verifier.verify(PAYLOAD, &header);
        assert!(matches!(result, Err(StripeSignatureError::TooOld { .. })));
        Ok(())
    }

    #[test]
    fn test_timestamp_in_future() -> Result<(), StripeSignatureError> {
        let verifier = verifier();
        let future = now() + 3600;
        let header = format_signature_header(future, &verifier.sign_with_timestamp(PAYLOAD, future)?);

        let result = verifier.verify(PAYLOAD, &header);
        assert!(matches!(result, Err(StripeSignatureError::InFuture(_))));
        Ok(())
    }

    #[test]
    fn test_extreme_timestamps_are_rejected() {
        let verifier = verifier();

        let result = verifier.verify(b"{}", &format!("t={},v1=00", i64::MIN));
        assert!(matches!(result, Err(StripeSignatureError::TooOld { .. })));

        let result = verifier.verify_at(b"{}", &format!("t={},v1=00", i64::MAX), now());
        assert!(matches!(result, Err(StripeSignatureError::InFuture(_))));

        let result = verifier.verify_at(b"{}", &format!("t={},v1=00", i64::MAX), i64::MAX);
        assert_eq!(result, Err(StripeSignatureError::Invalid));
    }

    #[test]
    fn test_custom_tolerance() -> Result<(), StripeSignatureError> {
        let verifier = verifier().with_tolerance(60);
        let timestamp = now() - 100;
        let header =
            format_signature_header(timestamp, &verifier.sign_with_timestamp(PAYLOAD, timestamp)?);

        assert!(verifier.verify(PAYLOAD, &header).is_err());
        verifier.with_tolerance(200).verify(PAYLOAD, &header)?;
        Ok(())
    }

    #[test]
    fn test_missing_secret_rejects_everything() {
        let verifier = StripeVerifier::new(None);
        assert!(!verifier.is_configured());
        assert_eq!(
            verifier.verify(PAYLOAD, "t=1,v1=00"),
            Err(StripeSignatureError::MissingSecret)
        );
        assert!(!StripeVerifier::new(Some(String::new())).is_configured());
    }

    #[test]
    fn test_parse_signature_header() -> Result<(), StripeSignatureError> {
        let (timestamp, signatures) = parse_signature_header("t=1707574200, v1=abc,v1=def")?;
        assert_eq!(timestamp, 1_707_574_200);
        assert_eq!(signatures, vec!["abc".to_string(), "def".to_string()]);

        assert!(parse_signature_header("v1=abc").is_err());
        assert!(parse_signature_header("t=1707574200").is_err());
        assert!(parse_signature_header("t=yesterday,v1=abc").is_err());
        Ok(())
    }

    #[test]
    fn test_signature_is_hex_encoded() -> Result<(), StripeSignatureError> {
        let signature = verifier().sign_with_timestamp(b"test", 1_707_574_200)?;
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
        Ok(())
    }

    #[test]
    fn test_handled_events() -> Result<(), serde_json::Error> {
        let event: StripeEvent = serde_json::from_slice(PAYLOAD)?;
        assert!(event.is_handled());

        let other: StripeEvent =
            serde_json::from_str(r#"{"id":"evt_3","type":"customer.created"}"#)?;
        assert!(!other.is_handled());
        Ok(())
    }
}
