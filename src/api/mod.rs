//! HTTP API surface
//!
//! Route handlers are thin: deserialize, hand off to a service, serialize.
//! All error mapping lives in [`crate::error::AppError::into_response`].

pub mod payments;
pub mod webhook;

use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};

use crate::error::{AppError, AppResult, ValidationError};
use crate::middleware::{request_logging_middleware, UuidRequestId};
use crate::services::{PaymentService, WebhookService};

#[derive(Clone)]
pub struct AppState {
    pub payments: Arc<PaymentService>,
    pub webhooks: Arc<WebhookService>,
}

/// Build the full application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/payments", post(payments::create_payment))
        .route("/payments", get(payments::list_payments))
        .route("/payments/chains/supported", get(payments::supported_chains))
        .route("/payments/address/generate", post(payments::generate_address))
        .route("/payments/fee/estimate", get(payments::estimate_fee))
        .route("/payments/{id}", get(payments::get_payment))
        .route("/payments/{id}/verify", post(payments::verify_payment))
        .route("/payment/webhook", post(webhook::handle_webhook))
        .route("/payment/webhook/test", post(webhook::handle_test_webhook))
        .route("/payment/webhook/logs", get(webhook::webhook_logs))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Caller identity comes from the `x-user-id` header until a real auth layer
/// fronts this service
pub(crate) fn require_owner(headers: &HeaderMap) -> AppResult<String> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .ok_or_else(|| {
            AppError::validation(ValidationError::MissingField {
                field: "x-user-id header".to_string(),
            })
        })
}
