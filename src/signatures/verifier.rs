use axum::http::HeaderMap;
use openssl::pkey::{PKey, Public};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};

use super::algorithm::SignatureError;
use super::base::{SignatureParams, parse_signature_header, signature_base};
use super::digest::verify_content_digest;

/// Clock skew tolerated on `created` and `expires`
pub const CLOCK_SKEW_SECS: i64 = 60;

/// Age limit for signatures that carry no `expires`
pub const MAX_SIGNATURE_AGE_SECS: i64 = 300;

/// Headers an inbound callback must carry
pub const REQUIRED_HEADERS: [&str; 4] = [
    "content-digest",
    "signature-date",
    "signature",
    "signature-input",
];

/// Reasons an inbound callback signature is rejected
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("No public key configured, callbacks cannot be verified")]
    NoPublicKey,

    #[error("Missing required header: {0}")]
    MissingHeader(String),

    #[error("Malformed content digest: {0}")]
    MalformedDigest(String),

    #[error("Content digest does not match the received body")]
    DigestMismatch,

    #[error("Malformed signature headers: {0}")]
    Malformed(#[from] SignatureError),

    #[error("Signature does not cover content-digest")]
    DigestNotCovered,

    #[error("Signature expired at {expires} (now {now})")]
    Expired { expires: i64, now: i64 },

    #[error("Signature created at {created} is too old (now {now})")]
    TooOld { created: i64, now: i64 },

    #[error("Signature created in the future at {created} (now {now})")]
    NotYetValid { created: i64, now: i64 },

    #[error("Signature verification failed")]
    InvalidSignature,
}

/// The request line properties of an inbound callback
#[derive(Debug, Clone, Copy)]
pub struct InboundRequest<'a> {
    pub method: &'a str,

    pub authority: &'a str,

    pub path: &'a str,

    pub headers: &'a HeaderMap,

    /// Body exactly as received
    pub body: &'a [u8],
}

/// Verifies provider callback signatures against a configured public key.
///
/// Without a public key every callback is rejected.
#[derive(Clone, Default)]
pub struct CallbackVerifier {
    public_key: Option<PKey<Public>>,
}

impl std::fmt::Debug for CallbackVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackVerifier")
            .field("public_key", &self.public_key.as_ref().map(|_| "<configured>"))
            .finish()
    }
}

impl CallbackVerifier {
    pub fn new(public_key: Option<PKey<Public>>) -> Self {
        Self { public_key }
    }

    pub fn is_configured(&self) -> bool {
        self.public_key.is_some()
    }

    /// Boolean form of [`CallbackVerifier::verify`]
    pub fn is_valid(&self, request: &InboundRequest<'_>) -> bool {
        match self.verify(request) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, path = request.path, "Callback signature rejected");
                false
            }
        }
    }

    pub fn verify(&self, request: &InboundRequest<'_>) -> Result<(), VerificationError> {
        self.verify_at(request, OffsetDateTime::now_utc().unix_timestamp())
    }

    /// Verify as of `now` (epoch seconds).
    pub fn verify_at(&self, request: &InboundRequest<'_>, now: i64) -> Result<(), VerificationError> {
        let public_key = self.public_key.as_ref().ok_or(VerificationError::NoPublicKey)?;

        for name in REQUIRED_HEADERS {
            header(request.headers, name)?;
        }

        let digest = header(request.headers, "content-digest")?;
        if !verify_content_digest(digest, request.body).map_err(VerificationError::MalformedDigest)? {
            return Err(VerificationError::DigestMismatch);
        }

        let signature = parse_signature_header(header(request.headers, "signature")?)?;
        let (params, raw_params) = SignatureParams::parse(header(request.headers, "signature-input")?)?;

        if !params.components.iter().any(|c| c == "content-digest") {
            return Err(VerificationError::DigestNotCovered);
        }
        // Untrusted header values
        if params.created > now.saturating_add(CLOCK_SKEW_SECS) {
            return Err(VerificationError::NotYetValid {
                created: params.created,
                now,
            });
        }
        match params.expires {
            Some(expires) if expires.saturating_add(CLOCK_SKEW_SECS) < now => {
                return Err(VerificationError::Expired { expires, now });
            }
            None if params.created.saturating_add(MAX_SIGNATURE_AGE_SECS) < now => {
                return Err(VerificationError::TooOld {
                    created: params.created,
                    now,
                });
            }
            _ => {}
        }

        params.algorithm.check_key(public_key)?;

        let values = params
            .components
            .iter()
            .map(|name| component_value(request, name).map(|v| (name.as_str(), v)))
            .collect::<Result<Vec<_>, _>>()?;
        let base = signature_base(values, &raw_params);

        if !params.algorithm.verify(public_key, base.as_bytes(), &signature) {
            return Err(VerificationError::InvalidSignature);
        }

        debug!(
            key_id = %params.key_id,
            algorithm = %params.algorithm,
            path = request.path,
            "Callback signature verified"
        );
        Ok(())
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, VerificationError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| VerificationError::MissingHeader(name.to_string()))
}

fn component_value<'a>(
    request: &InboundRequest<'a>,
    name: &str,
) -> Result<&'a str, VerificationError> {
    match name {
        "@method" => Ok(request.method),
        "@authority" => Ok(request.authority),
        "@path" => Ok(request.path),
        derived if derived.starts_with('@') => Err(VerificationError::Malformed(
            SignatureError::InvalidSignatureInput(format!("unsupported component {derived}")),
        )),
        field => header(request.headers, field),
    }
}
