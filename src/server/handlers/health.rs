use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::server::AppState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Health {
    pub status: &'static str,

    /// Whether outbound provider calls carry a signature
    pub request_signing: bool,
}

impl Health {
    fn up(request_signing: bool) -> Self {
        Self {
            status: "ok",
            request_signing,
        }
    }
}

pub async fn health_check(State(state): State<AppState>) -> Json<Health> {
    Json(Health::up(state.payments.gateway().is_signing()))
}
