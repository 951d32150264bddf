use std::fmt;

use openssl::pkey::{PKey, Private};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;

use super::algorithm::{self, SignatureAlgorithm, SignatureError};
use super::base::{SignatureParams, format_signature_header, signature_base};
use super::digest::{DigestAlgorithm, content_digest};

/// Key material and identity used to sign outbound requests
#[derive(Clone)]
pub struct SignatureConfig {
    key_id: String,
    private_key: PKey<Private>,
    algorithm: SignatureAlgorithm,
}

impl SignatureConfig {
    /// Build a config from a PEM private key, checking it suits `algorithm`.
    pub fn from_pem(
        key_id: impl Into<String>,
        private_key_pem: &str,
        algorithm: SignatureAlgorithm,
    ) -> Result<Self, SignatureError> {
        let private_key = algorithm::private_key_from_pem(private_key_pem)?;
        algorithm.check_key(&private_key)?;

        Ok(Self {
            key_id: key_id.into(),
            private_key,
            algorithm,
        })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }
}

impl fmt::Debug for SignatureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureConfig")
            .field("key_id", &self.key_id)
            .field("private_key", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

/// The request properties covered by a signature
#[derive(Debug, Clone, Copy)]
pub struct RequestComponents<'a> {
    pub method: &'a str,

    pub authority: &'a str,

    pub path: &'a str,

    /// Exact bytes that will be sent as the body
    pub body: &'a [u8],

    pub content_type: &'a str,
}

/// Headers produced by [`RequestSigner`], kept free of transport types
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeaders {
    pub content_digest: String,

    pub signature_date: String,

    pub signature: String,

    pub signature_input: String,

    pub accept_signature: String,

    pub accept_digest: String,
}

impl SignatureHeaders {
    /// Header name/value pairs in the order they are attached
    pub fn pairs(&self) -> [(&'static str, &str); 6] {
        [
            ("Content-Digest", &self.content_digest),
            ("Signature-Date", &self.signature_date),
            ("Signature", &self.signature),
            ("Signature-Input", &self.signature_input),
            ("Accept-Signature", &self.accept_signature),
            ("Accept-Digest", &self.accept_digest),
        ]
    }
}

/// Signs outbound requests when a [`SignatureConfig`] is present
#[derive(Debug, Clone, Default)]
pub struct RequestSigner {
    config: Option<SignatureConfig>,
}

impl RequestSigner {
    pub fn new(config: Option<SignatureConfig>) -> Self {
        Self { config }
    }

    /// Signer that never signs
    pub fn disabled() -> Self {
        Self { config: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_some()
    }

    /// Sign a request with the current time.
    ///
    /// Returns `Ok(None)` when signing is not configured. Any failure with a
    /// configuration present is an error: the request must not go out unsigned.
    pub fn sign(
        &self,
        request: &RequestComponents<'_>,
    ) -> Result<Option<SignatureHeaders>, SignatureError> {
        self.sign_at(request, OffsetDateTime::now_utc())
    }

    /// Sign a request as of `now`
    pub fn sign_at(
        &self,
        request: &RequestComponents<'_>,
        now: OffsetDateTime,
    ) -> Result<Option<SignatureHeaders>, SignatureError> {
        let Some(config) = &self.config else {
            return Ok(None);
        };

        let signature_date = now
            .format(&Rfc3339)
            .map_err(|e| SignatureError::SigningFailed(format!("Invalid timestamp: {e}")))?;
        let content_digest = content_digest(request.body);
        let params = SignatureParams::outbound(config.algorithm, &config.key_id, now.unix_timestamp());
        let signature_params = params.to_string();

        let base = signature_base(
            [
                ("@method", request.method),
                ("@authority", request.authority),
                ("@path", request.path),
                ("signature-date", signature_date.as_str()),
                ("content-digest", content_digest.as_str()),
                ("content-type", request.content_type),
            ],
            &signature_params,
        );

        let signature = config.algorithm.sign(&config.private_key, base.as_bytes())?;

        debug!(
            method = request.method,
            path = request.path,
            algorithm = %config.algorithm,
            key_id = %config.key_id,
            "Signed outbound request"
        );

        Ok(Some(SignatureHeaders {
            content_digest,
            signature_date,
            signature: format_signature_header(&signature),
            signature_input: params.to_signature_input(),
            accept_signature: algorithm::accepted_algorithms(),
            accept_digest: [DigestAlgorithm::Sha256, DigestAlgorithm::Sha512]
                .map(|d| d.as_str())
                .join(","),
        }))
    }
}
