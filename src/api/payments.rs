//! Payment endpoints

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::{require_owner, AppState};
use crate::database::{PaymentFilters, PaymentStatus};
use crate::error::{AppError, AppResult, ValidationError};
use crate::services::{CreatePaymentRequest, VerifyPaymentRequest};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPaymentsQuery {
    pub status: Option<PaymentStatus>,
    pub chain_name: Option<String>,
    #[serde(rename = "type")]
    pub payment_type: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl From<ListPaymentsQuery> for PaymentFilters {
    fn from(query: ListPaymentsQuery) -> Self {
        PaymentFilters {
            status: query.status,
            chain_name: query.chain_name,
            payment_type: query.payment_type,
            start_date: query.start_date,
            end_date: query.end_date,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateAddressRequest {
    pub chain_name: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimateFeeQuery {
    pub chain_name: String,
    pub amount: BigDecimal,
    pub to_address: String,
}

pub async fn create_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreatePaymentRequest>,
) -> AppResult<impl IntoResponse> {
    let owner = require_owner(&headers)?;
    let record = state.payments.create_payment(&owner, request).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let record = state.payments.get_payment(id).await?;
    Ok(Json(record))
}

pub async fn verify_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<VerifyPaymentRequest>,
) -> AppResult<impl IntoResponse> {
    if request.tx_hash.is_empty() {
        return Err(AppError::validation(ValidationError::MissingField {
            field: "txHash".to_string(),
        }));
    }
    let record = state.payments.verify_payment(id, request).await?;
    Ok(Json(record))
}

pub async fn list_payments(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListPaymentsQuery>,
) -> AppResult<impl IntoResponse> {
    let owner = require_owner(&headers)?;
    let records = state
        .payments
        .get_user_payments(&owner, query.into())
        .await?;
    Ok(Json(records))
}

pub async fn supported_chains(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.payments.get_supported_chains())
}

pub async fn generate_address(
    State(state): State<AppState>,
    Json(request): Json<GenerateAddressRequest>,
) -> AppResult<impl IntoResponse> {
    let address = state
        .payments
        .generate_address(&request.chain_name, request.user_id.as_deref())
        .await?;
    Ok(Json(serde_json::json!({
        "chainName": request.chain_name,
        "address": address,
    })))
}

pub async fn estimate_fee(
    State(state): State<AppState>,
    Query(query): Query<EstimateFeeQuery>,
) -> AppResult<impl IntoResponse> {
    let estimate = state
        .payments
        .estimate_fee(&query.chain_name, &query.amount, &query.to_address)
        .await?;
    Ok(Json(estimate))
}
