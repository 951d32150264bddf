use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use config::{Config as ConfigLib, ConfigBuilder, ConfigError, Environment, builder::DefaultState};
use serde::{Deserialize, Serialize};

use crate::inbound::StripeVerifier;
use crate::outbound::pawapay::{self, GatewaySettings};
use crate::signatures::{CallbackVerifier, SignatureAlgorithm, SignatureConfig, algorithm};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub pawapay: PawaPayConfig,
    #[serde(default)]
    pub stripe: StripeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Mobile-money provider settings
#[derive(Clone, Deserialize)]
pub struct PawaPayConfig {
    pub api_key: String,
    pub environment: pawapay::Environment,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
    pub private_key: Option<String>,
    pub key_id: Option<String>,
    pub signature_algorithm: String,
    pub public_key: Option<String>,
}

#[derive(Clone, Default, Deserialize)]
pub struct StripeConfig {
    pub webhook_secret: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_sources(None)
    }

    /// Load from defaults plus `env_vars` (dotted keys) instead of the process
    /// environment when given.
    pub fn load_with_sources(env_vars: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        let mut builder = Self::set_defaults()?;
        // If env_vars is provided, we use it instead of system environment
        // This is to avoid systems variables pollution across tests
        if let Some(vars) = env_vars {
            for (key, value) in vars {
                builder = builder.set_override(&key, value)?;
            }
        } else {
            // Should be in the format APP_SERVER__PORT or APP_PAWAPAY__API_KEY
            builder = builder.add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would start an insecure or unusable client.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pawapay.gateway_settings()?;
        self.pawapay.callback_verifier()?;
        Ok(())
    }

    /// Set default values for the configuration.
    /// This is used when no environment variables or config file are provided
    fn set_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        ConfigLib::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("pawapay.api_key", "")?
            .set_default("pawapay.environment", "sandbox")?
            .set_default("pawapay.timeout_secs", pawapay::DEFAULT_TIMEOUT.as_secs())?
            .set_default(
                "pawapay.signature_algorithm",
                SignatureAlgorithm::EcdsaP256Sha256.as_str(),
            )
    }
}

impl PawaPayConfig {
    /// Client settings, with the signing key parsed and checked.
    pub fn gateway_settings(&self) -> Result<GatewaySettings, ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::Message(
                "pawapay.api_key must be set".to_string(),
            ));
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::Message(
                "pawapay.timeout_secs must be greater than zero".to_string(),
            ));
        }

        let algorithm = self
            .signature_algorithm
            .parse::<SignatureAlgorithm>()
            .map_err(|e| ConfigError::Message(e.to_string()))?;

        let signature = match (non_blank(&self.private_key), non_blank(&self.key_id)) {
            (Some(pem), Some(key_id)) => Some(
                SignatureConfig::from_pem(key_id, pem, algorithm)
                    .map_err(|e| ConfigError::Message(format!("pawapay.private_key: {e}")))?,
            ),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Message(
                    "pawapay.private_key and pawapay.key_id must be set together".to_string(),
                ));
            }
        };

        Ok(GatewaySettings {
            api_key: self.api_key.clone(),
            environment: self.environment,
            base_url: non_blank(&self.base_url).map(str::to_string),
            timeout: Duration::from_secs(self.timeout_secs),
            signature,
        })
    }

    /// Verifier for inbound callbacks. Without a public key it rejects all.
    pub fn callback_verifier(&self) -> Result<CallbackVerifier, ConfigError> {
        let public_key = non_blank(&self.public_key)
            .map(algorithm::public_key_from_pem)
            .transpose()
            .map_err(|e| ConfigError::Message(format!("pawapay.public_key: {e}")))?;
        Ok(CallbackVerifier::new(public_key))
    }
}

impl StripeConfig {
    pub fn verifier(&self) -> StripeVerifier {
        StripeVerifier::new(non_blank(&self.webhook_secret).map(str::to_string))
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn redact(value: &Option<String>) -> Option<&'static str> {
    non_blank(value).map(|_| "<redacted>")
}

impl fmt::Debug for PawaPayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PawaPayConfig")
            .field("api_key", &"<redacted>")
            .field("environment", &self.environment)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("private_key", &redact(&self.private_key))
            .field("key_id", &self.key_id)
            .field("signature_algorithm", &self.signature_algorithm)
            .field("public_key", &non_blank(&self.public_key).map(|_| "<configured>"))
            .finish()
    }
}

impl fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeConfig")
            .field("webhook_secret", &redact(&self.webhook_secret))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::algorithm::test_keys::generate_pem;
    use std::collections::HashMap;

    fn base_vars() -> HashMap<String, String> {
        let mut env_vars = HashMap::new();
        env_vars.insert("pawapay.api_key".to_string(), "test-token".to_string());
        env_vars
    }

    #[test]
    fn test_default_config() {
        let config = Config::load_with_sources(Some(base_vars())).expect("Failed to load config");

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.pawapay.environment, pawapay::Environment::Sandbox);
        assert_eq!(config.pawapay.timeout_secs, 10);
        assert_eq!(config.pawapay.signature_algorithm, "ecdsa-p256-sha256");
        assert!(config.pawapay.private_key.is_none());
        assert!(config.stripe.webhook_secret.is_none());
    }

    #[test]
    fn test_env_config() {
        let mut env_vars = base_vars();
        env_vars.insert("server.host".to_string(), "0.0.0.0".to_string());
        env_vars.insert("server.port".to_string(), "443".to_string());
        env_vars.insert("pawapay.environment".to_string(), "production".to_string());
        env_vars.insert("pawapay.timeout_secs".to_string(), "5".to_string());

        let config = Config::load_with_sources(Some(env_vars)).expect("Failed to load config");

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 443);
        assert_eq!(config.pawapay.environment, pawapay::Environment::Production);

        let settings = config.pawapay.gateway_settings().expect("valid settings");
        assert_eq!(settings.timeout, Duration::from_secs(5));
        assert!(settings.signature.is_none());
    }

    #[test]
    fn test_partial_env_override() {
        let mut env_vars = base_vars();
        // We just override the host
        env_vars.insert("server.host".to_string(), "192.168.1.1".to_string());

        let config = Config::load_with_sources(Some(env_vars)).expect("Failed to load config");

        assert_eq!(config.server.host, "192.168.1.1");
        // The other values should use default
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_missing_api_key_fails() {
        let result = Config::load_with_sources(Some(HashMap::new()));
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_timeout_fails() {
        let mut env_vars = base_vars();
        env_vars.insert("pawapay.timeout_secs".to_string(), "0".to_string());

        assert!(Config::load_with_sources(Some(env_vars)).is_err());
    }

    #[test]
    fn test_signing_key_requires_key_id() {
        let (private_pem, _) = generate_pem(SignatureAlgorithm::EcdsaP256Sha256);
        let mut env_vars = base_vars();
        env_vars.insert("pawapay.private_key".to_string(), private_pem.clone());

        assert!(Config::load_with_sources(Some(env_vars.clone())).is_err());

        env_vars.insert("pawapay.key_id".to_string(), "key-1".to_string());
        let config = Config::load_with_sources(Some(env_vars)).expect("Failed to load config");
        let settings = config.pawapay.gateway_settings().expect("valid settings");
        assert_eq!(
            settings.signature.map(|s| s.key_id().to_string()),
            Some("key-1".to_string())
        );
    }

    #[test]
    fn test_key_must_match_algorithm() {
        let (p384_pem, _) = generate_pem(SignatureAlgorithm::EcdsaP384Sha384);
        let mut env_vars = base_vars();
        env_vars.insert("pawapay.private_key".to_string(), p384_pem.replace('\n', "\\n"));
        env_vars.insert("pawapay.key_id".to_string(), "key-1".to_string());

        // Default algorithm is ecdsa-p256-sha256
        assert!(Config::load_with_sources(Some(env_vars.clone())).is_err());

        env_vars.insert(
            "pawapay.signature_algorithm".to_string(),
            "ecdsa-p384-sha384".to_string(),
        );
        assert!(Config::load_with_sources(Some(env_vars)).is_ok());
    }

    #[test]
    fn test_unknown_algorithm_fails() {
        let mut env_vars = base_vars();
        env_vars.insert(
            "pawapay.signature_algorithm".to_string(),
            "hmac-sha256".to_string(),
        );
        assert!(Config::load_with_sources(Some(env_vars)).is_err());
    }

    #[test]
    fn test_public_key_is_parsed() {
        let (_, public_pem) = generate_pem(SignatureAlgorithm::RsaPssSha512);
        let mut env_vars = base_vars();
        env_vars.insert("pawapay.public_key".to_string(), public_pem);

        let config = Config::load_with_sources(Some(env_vars)).expect("Failed to load config");
        assert!(config.pawapay.callback_verifier().unwrap().is_configured());

        let mut env_vars = base_vars();
        env_vars.insert("pawapay.public_key".to_string(), "garbage".to_string());
        assert!(Config::load_with_sources(Some(env_vars)).is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut env_vars = base_vars();
        env_vars.insert("stripe.webhook_secret".to_string(), "whsec_123".to_string());

        let config = Config::load_with_sources(Some(env_vars)).expect("Failed to load config");
        let debug = format!("{config:?}");

        assert!(!debug.contains("test-token"));
        assert!(!debug.contains("whsec_123"));
        assert!(config.stripe.verifier().is_configured());
    }
}
