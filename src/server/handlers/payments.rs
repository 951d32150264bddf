use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::domain::models::{
    BulkPayoutRequest, CountryAvailability, DepositRequest, PaymentPageSessionRequest,
    PaymentPageSessionResponse, PayoutRequest, Transaction, TransactionFilter, TransactionLimits,
    TransactionResponse,
};
use crate::server::AppState;
use crate::server::responses::ApiError;

#[derive(Debug, Deserialize)]
pub struct CountryQuery {
    pub country: String,
}

#[derive(Debug, Deserialize)]
pub struct PredictQuery {
    pub msisdn: String,
    pub country: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitsQuery {
    pub mmo_id: String,
    pub country: String,
}

pub async fn availability(
    State(state): State<AppState>,
    Query(query): Query<CountryQuery>,
) -> Result<Json<Vec<CountryAvailability>>, ApiError> {
    Ok(Json(state.payments.check_availability(&query.country).await?))
}

pub async fn predict_correspondent(
    State(state): State<AppState>,
    Query(query): Query<PredictQuery>,
) -> Result<Json<Value>, ApiError> {
    let correspondent = state
        .payments
        .predict_correspondent(&query.msisdn, &query.country)
        .await?;
    Ok(Json(json!({ "correspondent": correspondent })))
}

pub async fn active_configuration(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.payments.active_configuration().await?))
}

pub async fn transaction_limits(
    State(state): State<AppState>,
    Query(query): Query<LimitsQuery>,
) -> Result<Json<TransactionLimits>, ApiError> {
    Ok(Json(
        state
            .payments
            .transaction_limits(&query.mmo_id, &query.country)
            .await?,
    ))
}

pub async fn initiate_deposit(
    State(state): State<AppState>,
    Json(request): Json<DepositRequest>,
) -> Result<Json<TransactionResponse>, ApiError> {
    Ok(Json(state.payments.initiate_deposit(request).await?))
}

pub async fn deposit_status(
    State(state): State<AppState>,
    Path(deposit_id): Path<Uuid>,
) -> Result<Json<TransactionResponse>, ApiError> {
    Ok(Json(state.payments.deposit_status(deposit_id).await?))
}

pub async fn resend_deposit_callback(
    State(state): State<AppState>,
    Path(deposit_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.payments.resend_deposit_callback(deposit_id).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn initiate_payout(
    State(state): State<AppState>,
    Json(request): Json<PayoutRequest>,
) -> Result<Json<TransactionResponse>, ApiError> {
    Ok(Json(state.payments.initiate_payout(request).await?))
}

pub async fn payout_status(
    State(state): State<AppState>,
    Path(payout_id): Path<Uuid>,
) -> Result<Json<TransactionResponse>, ApiError> {
    Ok(Json(state.payments.payout_status(payout_id).await?))
}

pub async fn resend_payout_callback(
    State(state): State<AppState>,
    Path(payout_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.payments.resend_payout_callback(payout_id).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn initiate_bulk_payout(
    State(state): State<AppState>,
    Json(request): Json<BulkPayoutRequest>,
) -> Result<Json<Vec<TransactionResponse>>, ApiError> {
    Ok(Json(state.payments.initiate_bulk_payout(request).await?))
}

pub async fn create_payment_page(
    State(state): State<AppState>,
    Json(request): Json<PaymentPageSessionRequest>,
) -> Result<Json<PaymentPageSessionResponse>, ApiError> {
    Ok(Json(state.payments.create_payment_page_session(request).await?))
}

/// Locally recorded transaction
pub async fn transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Transaction>, ApiError> {
    state
        .payments
        .transaction(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("Transaction not found: {id}")))
}

pub async fn transactions(
    State(state): State<AppState>,
    Query(filter): Query<TransactionFilter>,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    Ok(Json(state.payments.transactions(&filter).await?))
}
