#![allow(dead_code)]

use std::collections::HashMap;

use crowdfund_payments::signatures::{RequestComponents, RequestSigner, SignatureAlgorithm, SignatureConfig};
use crowdfund_payments::{config::Config, server::Server};
use openssl::ec::{EcGroup, EcKey};
use openssl::nid::Nid;
use openssl::pkey::PKey;

pub const API_KEY: &str = "test-api-key";

/// Spawn the server against a provider running at `provider_url`.
///
/// `vars` are dotted configuration keys applied on top of the defaults.
pub async fn spawn_server_with(provider_url: &str, vars: &[(&str, &str)]) -> String {
    let mut sources: HashMap<String, String> = HashMap::from([
        ("pawapay.api_key".to_string(), API_KEY.to_string()),
        ("pawapay.base_url".to_string(), provider_url.to_string()),
    ]);
    for (key, value) in vars {
        sources.insert(key.to_string(), value.to_string());
    }

    let config = {
        let mut config = Config::load_with_sources(Some(sources)).unwrap();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        config
    };

    let server = Server::new(&config).await.unwrap();

    let port = server.port();
    tokio::spawn(server.run());

    format!("http://{}:{}", config.server.host, port)
}

pub async fn spawn_server(provider_url: &str) -> String {
    spawn_server_with(provider_url, &[]).await
}

/// Fresh P-256 key pair as (PKCS#8 private PEM, public PEM)
pub fn generate_keys() -> (String, String) {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();
    (
        String::from_utf8(key.private_key_to_pem_pkcs8().unwrap()).unwrap(),
        String::from_utf8(key.public_key_to_pem().unwrap()).unwrap(),
    )
}

/// Sign a JSON POST the way the provider signs its callbacks.
pub fn sign_post(private_pem: &str, authority: &str, path: &str, body: &[u8]) -> Vec<(&'static str, String)> {
    let config = SignatureConfig::from_pem("provider-key", private_pem, SignatureAlgorithm::EcdsaP256Sha256).unwrap();
    let headers = RequestSigner::new(Some(config))
        .sign(&RequestComponents {
            method: "POST",
            authority,
            path,
            body,
            content_type: "application/json",
        })
        .unwrap()
        .unwrap();

    headers
        .pairs()
        .into_iter()
        .map(|(name, value)| (name, value.to_string()))
        .collect()
}
