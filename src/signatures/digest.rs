use base64::{Engine, engine::general_purpose::STANDARD};
use serde::Serialize;
use sha2::{Digest, Sha256, Sha512};

/// Hash algorithms accepted in a `Content-Digest` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "sha-256",
            DigestAlgorithm::Sha512 => "sha-512",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        match label {
            "sha-256" => Some(DigestAlgorithm::Sha256),
            "sha-512" => Some(DigestAlgorithm::Sha512),
            _ => None,
        }
    }

    fn hash(&self, bytes: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::Sha256 => Sha256::digest(bytes).to_vec(),
            DigestAlgorithm::Sha512 => Sha512::digest(bytes).to_vec(),
        }
    }
}

/// Compute `sha-512=:<base64>:` over the exact body bytes.
pub fn content_digest(body: &[u8]) -> String {
    content_digest_with(DigestAlgorithm::Sha512, body)
}

/// Compute a structured-field digest with the given algorithm.
pub fn content_digest_with(algorithm: DigestAlgorithm, body: &[u8]) -> String {
    format!("{}=:{}:", algorithm.as_str(), STANDARD.encode(algorithm.hash(body)))
}

/// Serialize `body` once and digest the resulting bytes.
///
/// The returned bytes are the ones that must go on the wire: re-serializing
/// the value later can change key order or whitespace and break the digest.
pub fn serialize_and_digest<T: Serialize>(body: &T) -> Result<(Vec<u8>, String), serde_json::Error> {
    let bytes = serde_json::to_vec(body)?;
    let digest = content_digest(&bytes);
    Ok((bytes, digest))
}

/// Split a `Content-Digest` header value into its algorithm and raw hash.
pub fn parse_content_digest(header: &str) -> Result<(DigestAlgorithm, Vec<u8>), String> {
    let (label, value) = header
        .trim()
        .split_once('=')
        .ok_or_else(|| format!("Invalid content digest format: {header}"))?;

    let algorithm = DigestAlgorithm::from_label(label)
        .ok_or_else(|| format!("Unsupported digest algorithm: {label}"))?;

    let encoded = value
        .strip_prefix(':')
        .and_then(|v| v.strip_suffix(':'))
        .ok_or_else(|| format!("Invalid content digest format: {header}"))?;

    let hash = STANDARD
        .decode(encoded)
        .map_err(|e| format!("Invalid content digest encoding: {e}"))?;

    Ok((algorithm, hash))
}

/// Recompute the digest over `body` and compare it in constant time.
pub fn verify_content_digest(header: &str, body: &[u8]) -> Result<bool, String> {
    let (algorithm, expected) = parse_content_digest(header)?;
    let actual = algorithm.hash(body);
    Ok(expected.len() == actual.len() && openssl::memcmp::eq(&expected, &actual))
}
