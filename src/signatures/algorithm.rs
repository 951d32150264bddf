use std::fmt;
use std::str::FromStr;

use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{HasPrivate, HasPublic, Id, PKey, PKeyRef, Private, Public};
use openssl::rsa::Padding;
use openssl::sign::{RsaPssSaltlen, Signer, Verifier};
use openssl::x509::X509;
use thiserror::Error;

/// Error type for key handling and signature computation
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("Unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Key does not match algorithm {algorithm}: {reason}")]
    KeyMismatch {
        algorithm: SignatureAlgorithm,
        reason: String,
    },

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Invalid signature input: {0}")]
    InvalidSignatureInput(String),
}

/// Algorithms the provider accepts for HTTP message signatures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    EcdsaP256Sha256,
    EcdsaP384Sha384,
    RsaPssSha512,
    RsaV15Sha256,
}

impl SignatureAlgorithm {
    pub const ALL: [SignatureAlgorithm; 4] = [
        SignatureAlgorithm::RsaPssSha512,
        SignatureAlgorithm::EcdsaP256Sha256,
        SignatureAlgorithm::RsaV15Sha256,
        SignatureAlgorithm::EcdsaP384Sha384,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureAlgorithm::EcdsaP256Sha256 => "ecdsa-p256-sha256",
            SignatureAlgorithm::EcdsaP384Sha384 => "ecdsa-p384-sha384",
            SignatureAlgorithm::RsaPssSha512 => "rsa-pss-sha512",
            SignatureAlgorithm::RsaV15Sha256 => "rsa-v1_5-sha256",
        }
    }

    fn message_digest(&self) -> MessageDigest {
        match self {
            SignatureAlgorithm::EcdsaP256Sha256 | SignatureAlgorithm::RsaV15Sha256 => {
                MessageDigest::sha256()
            }
            SignatureAlgorithm::EcdsaP384Sha384 => MessageDigest::sha384(),
            SignatureAlgorithm::RsaPssSha512 => MessageDigest::sha512(),
        }
    }

    /// Reject keys that cannot produce or check signatures for this algorithm.
    pub fn check_key<T: HasPublic>(&self, key: &PKeyRef<T>) -> Result<(), SignatureError> {
        let mismatch = |reason: String| SignatureError::KeyMismatch {
            algorithm: *self,
            reason,
        };

        match self {
            SignatureAlgorithm::EcdsaP256Sha256 | SignatureAlgorithm::EcdsaP384Sha384 => {
                if key.id() != Id::EC {
                    return Err(mismatch("expected an EC key".to_string()));
                }
                let expected = match self {
                    SignatureAlgorithm::EcdsaP256Sha256 => Nid::X9_62_PRIME256V1,
                    _ => Nid::SECP384R1,
                };
                let curve = key
                    .ec_key()
                    .map_err(|e| SignatureError::InvalidKey(e.to_string()))?
                    .group()
                    .curve_name();
                if curve != Some(expected) {
                    return Err(mismatch(format!("unexpected curve {curve:?}")));
                }
            }
            SignatureAlgorithm::RsaPssSha512 | SignatureAlgorithm::RsaV15Sha256 => {
                if key.id() != Id::RSA {
                    return Err(mismatch("expected an RSA key".to_string()));
                }
                if key.bits() < 2048 {
                    return Err(mismatch(format!("{}-bit modulus is too short", key.bits())));
                }
            }
        }
        Ok(())
    }

    /// Sign `data`, returning the raw signature bytes (DER for ECDSA).
    pub fn sign<T: HasPrivate>(&self, key: &PKeyRef<T>, data: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let failed = |e: openssl::error::ErrorStack| SignatureError::SigningFailed(e.to_string());

        let mut signer = Signer::new(self.message_digest(), key).map_err(failed)?;
        if *self == SignatureAlgorithm::RsaPssSha512 {
            signer.set_rsa_padding(Padding::PKCS1_PSS).map_err(failed)?;
            signer
                .set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)
                .map_err(failed)?;
        }
        signer.update(data).map_err(failed)?;
        signer.sign_to_vec().map_err(failed)
    }

    /// Check `signature` over `data`. Malformed signatures verify as `false`.
    pub fn verify<T: HasPublic>(&self, key: &PKeyRef<T>, data: &[u8], signature: &[u8]) -> bool {
        let result = (|| {
            let mut verifier = Verifier::new(self.message_digest(), key)?;
            if *self == SignatureAlgorithm::RsaPssSha512 {
                verifier.set_rsa_padding(Padding::PKCS1_PSS)?;
            }
            verifier.update(data)?;
            verifier.verify(signature)
        })();

        result.unwrap_or_else(|e| {
            tracing::debug!(algorithm = %self, error = %e, "Signature check errored");
            false
        })
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|alg| alg.as_str() == s)
            .ok_or_else(|| SignatureError::UnsupportedAlgorithm(s.to_string()))
    }
}

/// Comma-separated list advertised in `Accept-Signature`
pub fn accepted_algorithms() -> String {
    SignatureAlgorithm::ALL
        .iter()
        .map(SignatureAlgorithm::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

/// Environment variables often carry PEM blocks with escaped newlines.
fn normalize_pem(pem: &str) -> String {
    pem.trim().replace("\\n", "\n")
}

/// Load a PKCS#8 or traditional PEM private key.
pub fn private_key_from_pem(pem: &str) -> Result<PKey<Private>, SignatureError> {
    PKey::private_key_from_pem(normalize_pem(pem).as_bytes())
        .map_err(|e| SignatureError::InvalidKey(format!("Invalid private key: {e}")))
}

/// Load a public key from a SubjectPublicKeyInfo PEM block or an X.509 certificate.
pub fn public_key_from_pem(pem: &str) -> Result<PKey<Public>, SignatureError> {
    let pem = normalize_pem(pem);

    if pem.contains("BEGIN CERTIFICATE") {
        let cert = X509::from_pem(pem.as_bytes())
            .map_err(|e| SignatureError::InvalidKey(format!("Invalid certificate: {e}")))?;
        return cert
            .public_key()
            .map_err(|e| SignatureError::InvalidKey(format!("Invalid certificate key: {e}")));
    }

    PKey::public_key_from_pem(pem.as_bytes())
        .map_err(|e| SignatureError::InvalidKey(format!("Invalid public key: {e}")))
}
