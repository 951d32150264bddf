mod handlers;
pub mod responses;

use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::Config;
use crate::domain::payments::PaymentService;
use crate::inbound::WebhookDispatcher;
use crate::infrastructure::{AuditLogHandler, InMemoryTransactionStore};
use crate::outbound::pawapay::GatewayClient;
use crate::server::handlers::{health::health_check, payments, webhooks::receive_webhook};
use axum::http::Method;
use axum::{
    Router,
    routing::{get, post},
};
use color_eyre::eyre::{Context, Result};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

#[derive(Clone)]
/// The global application state shared between all request handlers.
pub struct AppState {
    payments: Arc<PaymentService>,
    dispatcher: Arc<WebhookDispatcher>,
}

impl AppState {
    pub fn new(payments: Arc<PaymentService>, dispatcher: Arc<WebhookDispatcher>) -> Self {
        Self {
            payments,
            dispatcher,
        }
    }

    /// Wire the gateway, the transaction store and the webhook dispatcher
    /// from configuration.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let settings = config
            .pawapay
            .gateway_settings()
            .wrap_err("Invalid PawaPay settings")?;
        let gateway = GatewayClient::new(settings).wrap_err("Failed to build PawaPay client")?;
        let store = Arc::new(InMemoryTransactionStore::new());
        let payments = Arc::new(PaymentService::new(Arc::new(gateway), store));

        let verifier = config
            .pawapay
            .callback_verifier()
            .wrap_err("Invalid PawaPay public key")?;
        let dispatcher = WebhookDispatcher::new(verifier, config.stripe.verifier());
        dispatcher.register_handler(payments.clone()).await;
        dispatcher
            .register_handler(Arc::new(AuditLogHandler::new()))
            .await;

        Ok(Self::new(payments, Arc::new(dispatcher)))
    }
}

/// All routes without transport layers.
pub fn router(state: AppState) -> Router {
    let pawapay = Router::new()
        .route("/availability", get(payments::availability))
        .route("/predict-correspondent", get(payments::predict_correspondent))
        .route("/configuration", get(payments::active_configuration))
        .route("/limits", get(payments::transaction_limits))
        .route("/deposits", post(payments::initiate_deposit))
        .route("/deposits/{deposit_id}", get(payments::deposit_status))
        .route(
            "/deposits/{deposit_id}/callback/resend",
            post(payments::resend_deposit_callback),
        )
        .route("/payouts", post(payments::initiate_payout))
        .route("/payouts/{payout_id}", get(payments::payout_status))
        .route(
            "/payouts/{payout_id}/callback/resend",
            post(payments::resend_payout_callback),
        )
        .route("/bulk-payouts", post(payments::initiate_bulk_payout))
        .route("/payment-page", post(payments::create_payment_page))
        .route("/transactions", get(payments::transactions))
        .route("/transactions/{id}", get(payments::transaction));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/payments/pawapay", pawapay)
        .route("/api/webhooks/{provider}", post(receive_webhook))
        .with_state(state)
}

pub struct Server {
    router: Router,
    listener: TcpListener,
}

impl Server {
    /// Creates a new HTTP server.
    pub async fn new(config: &Config) -> Result<Self> {
        let trace_layer =
            TraceLayer::new_for_http().make_span_with(|request: &'_ axum::extract::Request<_>| {
                let uri = request.uri().to_string();
                tracing::info_span!("request", method = %request.method(), uri)
            });

        let cors_layer = CorsLayer::new()
            .allow_origin(Any)
            .allow_headers(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS]);

        let state = AppState::from_config(config).await?;

        let router = router(state).layer(cors_layer).layer(trace_layer);

        let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))
            .await
            .wrap_err_with(|| format!("Failed to bind to port {}", config.server.port))?;

        Ok(Self { router, listener })
    }

    pub fn port(&self) -> u16 {
        self.listener
            .local_addr()
            .map(|addr| addr.port())
            .unwrap_or_default()
    }

    /// Runs the HTTP server.
    pub async fn run(self) -> Result<()> {
        tracing::info!("Server listening on {}", self.listener.local_addr()?);
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }
}
