//! Signature base construction and `Signature-Input` / `Signature` parsing.
//!
//! The base is a newline-joined list of `"<component>": <value>` lines followed
//! by the `"@signature-params"` line. Sender and receiver must build it
//! byte-for-byte identically, so the component order is part of the protocol.

use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD};

use super::algorithm::{SignatureAlgorithm, SignatureError};

/// Label under which the provider places its signature
pub const SIGNATURE_LABEL: &str = "sig-pp";

/// Components covered by outbound signatures, in signing order
pub const COVERED_COMPONENTS: [&str; 6] = [
    "@method",
    "@authority",
    "@path",
    "signature-date",
    "content-digest",
    "content-type",
];

/// Lifetime of an outbound signature
pub const SIGNATURE_VALIDITY_SECS: i64 = 60;

/// Metadata carried in `Signature-Input` and in the `@signature-params` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureParams {
    pub components: Vec<String>,

    pub algorithm: SignatureAlgorithm,

    pub key_id: String,

    pub created: i64,

    pub expires: Option<i64>,
}

impl SignatureParams {
    /// Parameters for an outbound signature created at `created` (epoch seconds)
    pub fn outbound(algorithm: SignatureAlgorithm, key_id: &str, created: i64) -> Self {
        Self {
            components: COVERED_COMPONENTS.iter().map(|c| c.to_string()).collect(),
            algorithm,
            key_id: key_id.to_string(),
            created,
            expires: Some(created + SIGNATURE_VALIDITY_SECS),
        }
    }

    /// Full `Signature-Input` header value, including the label
    pub fn to_signature_input(&self) -> String {
        format!("{SIGNATURE_LABEL}={self}")
    }

    /// Parse the `sig-pp` member of a `Signature-Input` header.
    ///
    /// Returns the parsed parameters together with the raw member value, which
    /// is what the sender put on its `@signature-params` line.
    pub fn parse(header: &str) -> Result<(Self, String), SignatureError> {
        let invalid = |reason: &str| SignatureError::InvalidSignatureInput(reason.to_string());

        let raw = find_member(header, SIGNATURE_LABEL)
            .ok_or_else(|| invalid("no sig-pp member in signature-input"))?;

        let inner = raw
            .strip_prefix('(')
            .ok_or_else(|| invalid("component list must start with '('"))?;
        let (list, params) = inner
            .split_once(')')
            .ok_or_else(|| invalid("unterminated component list"))?;

        let components = list
            .split_whitespace()
            .map(|item| {
                item.strip_prefix('"')
                    .and_then(|i| i.strip_suffix('"'))
                    .map(str::to_string)
                    .ok_or_else(|| invalid("components must be quoted strings"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut algorithm = None;
        let mut key_id = None;
        let mut created = None;
        let mut expires = None;

        for param in params.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, value) = param
                .split_once('=')
                .ok_or_else(|| invalid("parameter without value"))?;
            let unquoted = value.trim_matches('"');
            match name {
                "alg" => algorithm = Some(unquoted.parse::<SignatureAlgorithm>()?),
                "keyid" => key_id = Some(unquoted.to_string()),
                "created" => {
                    created = Some(value.parse::<i64>().map_err(|_| invalid("created is not an integer"))?)
                }
                "expires" => {
                    expires = Some(value.parse::<i64>().map_err(|_| invalid("expires is not an integer"))?)
                }
                // nonce, tag and future parameters are covered through the raw value
                _ => {}
            }
        }

        let params = Self {
            components,
            algorithm: algorithm.ok_or_else(|| invalid("alg parameter is missing"))?,
            key_id: key_id.ok_or_else(|| invalid("keyid parameter is missing"))?,
            created: created.ok_or_else(|| invalid("created parameter is missing"))?,
            expires,
        };
        Ok((params, raw.to_string()))
    }
}

impl fmt::Display for SignatureParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let components = self
            .components
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect::<Vec<_>>()
            .join(" ");
        write!(
            f,
            "({components});alg=\"{}\";keyid=\"{}\";created={}",
            self.algorithm, self.key_id, self.created
        )?;
        if let Some(expires) = self.expires {
            write!(f, ";expires={expires}")?;
        }
        Ok(())
    }
}

/// Build the signature base from `(component, value)` pairs and the params line.
pub fn signature_base<'a, I>(components: I, signature_params: &str) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    components
        .into_iter()
        .map(|(name, value)| format!("\"{name}\": {value}"))
        .chain(std::iter::once(format!(
            "\"@signature-params\": {signature_params}"
        )))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Wrap raw signature bytes as `sig-pp=:<base64>:`
pub fn format_signature_header(signature: &[u8]) -> String {
    format!("{SIGNATURE_LABEL}=:{}:", STANDARD.encode(signature))
}

/// Extract the raw signature bytes of the `sig-pp` member.
pub fn parse_signature_header(header: &str) -> Result<Vec<u8>, SignatureError> {
    let invalid = |reason: String| SignatureError::InvalidSignatureInput(reason);

    let value = find_member(header, SIGNATURE_LABEL)
        .ok_or_else(|| invalid(format!("Invalid signature header format: {header}")))?;
    let encoded = value
        .strip_prefix(':')
        .and_then(|v| v.strip_suffix(':'))
        .ok_or_else(|| invalid(format!("Invalid signature header format: {header}")))?;

    STANDARD
        .decode(encoded)
        .map_err(|e| invalid(format!("Invalid signature encoding: {e}")))
}

/// Find `label=<value>` among the comma-separated members of a structured
/// dictionary header. Commas inside quotes or parentheses do not split.
fn find_member<'a>(header: &'a str, label: &str) -> Option<&'a str> {
    let mut members = Vec::new();
    let mut depth = 0usize;
    let mut quoted = false;
    let mut start = 0;

    for (i, c) in header.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth = depth.saturating_sub(1),
            ',' if !quoted && depth == 0 => {
                members.push(&header[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    members.push(&header[start..]);

    members.into_iter().find_map(|member| {
        let (name, value) = member.trim().split_once('=')?;
        (name == label).then_some(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SignatureParams {
        SignatureParams::outbound(SignatureAlgorithm::EcdsaP256Sha256, "key-1", 1_714_557_600)
    }

    #[test]
    fn test_outbound_params_format() {
        assert_eq!(
            params().to_signature_input(),
            "sig-pp=(\"@method\" \"@authority\" \"@path\" \"signature-date\" \"content-digest\" \"content-type\");alg=\"ecdsa-p256-sha256\";keyid=\"key-1\";created=1714557600;expires=1714557660"
        );
    }

    #[test]
    fn test_signature_base_layout() {
        let base = signature_base(
            [
                ("@method", "POST"),
                ("@authority", "api.sandbox.pawapay.io"),
                ("@path", "/deposits"),
            ],
            "(\"@method\" \"@authority\" \"@path\");alg=\"rsa-pss-sha512\";keyid=\"k\";created=1",
        );

        assert_eq!(
            base,
            "\"@method\": POST\n\"@authority\": api.sandbox.pawapay.io\n\"@path\": /deposits\n\"@signature-params\": (\"@method\" \"@authority\" \"@path\");alg=\"rsa-pss-sha512\";keyid=\"k\";created=1"
        );
    }

    #[test]
    fn test_parse_round_trip() -> Result<(), SignatureError> {
        let original = params();
        let header = original.to_signature_input();

        let (parsed, raw) = SignatureParams::parse(&header)?;
        assert_eq!(parsed, original);
        assert_eq!(raw, original.to_string());
        Ok(())
    }

    #[test]
    fn test_parse_picks_labelled_member() -> Result<(), SignatureError> {
        let header = format!(
            "other=(\"@method\");alg=\"rsa-v1_5-sha256\";keyid=\"x\";created=5, {}",
            params().to_signature_input()
        );
        let (parsed, _) = SignatureParams::parse(&header)?;
        assert_eq!(parsed.key_id, "key-1");
        assert_eq!(parsed.components.len(), 6);
        Ok(())
    }

    #[test]
    fn test_parse_rejects_incomplete_input() {
        for header in [
            "sig-pp=(\"@method\");keyid=\"k\";created=1",
            "sig-pp=(\"@method\");alg=\"ecdsa-p256-sha256\";created=1",
            "sig-pp=(\"@method\";alg=\"ecdsa-p256-sha256\";keyid=\"k\";created=1",
            "sig-pp=(@method);alg=\"ecdsa-p256-sha256\";keyid=\"k\";created=1",
            "sig-pp=(\"@method\");alg=\"ecdsa-p256-sha256\";keyid=\"k\";created=soon",
            "sig-other=(\"@method\");alg=\"ecdsa-p256-sha256\";keyid=\"k\";created=1",
        ] {
            assert!(SignatureParams::parse(header).is_err(), "{header}");
        }

        assert!(matches!(
            SignatureParams::parse("sig-pp=(\"@method\");alg=\"hs256\";keyid=\"k\";created=1"),
            Err(SignatureError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_signature_header_round_trip() -> Result<(), SignatureError> {
        let header = format_signature_header(b"\x01\x02\x03signature");
        assert!(header.starts_with("sig-pp=:"));
        assert_eq!(parse_signature_header(&header)?, b"\x01\x02\x03signature");
        Ok(())
    }

    #[test]
    fn test_signature_header_rejects_wrong_label() {
        assert!(parse_signature_header("sig1=:AQID:").is_err());
        assert!(parse_signature_header("sig-pp=AQID").is_err());
    }
}
