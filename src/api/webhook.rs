//! Webhook ingestion endpoints
//!
//! The main endpoint takes the raw body so provider signatures can be
//! checked over the exact bytes delivered. The test endpoint skips
//! signature verification and exists for staging and manual replay.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use super::AppState;
use crate::error::{AppError, AppResult, ValidationError};
use crate::services::{extract_provider_from_headers, SignatureCheck, WebhookPayload};

/// Headers whose values never reach the ledger or the logs
const SENSITIVE_HEADERS: &[&str] = &["verif-hash", "x-paystack-signature", "authorization"];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookLogsQuery {
    pub payment_id: Option<Uuid>,
    pub provider: Option<String>,
    pub limit: Option<i64>,
}

pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> AppResult<impl IntoResponse> {
    let provider = extract_provider_from_headers(&headers);
    let signature = signature_header(&headers, &provider);

    let check = state
        .webhooks
        .verify_webhook_signature(body.as_bytes(), signature.as_deref(), &provider)?;

    let payload = parse_payload(&body)?;
    let outcome = state
        .webhooks
        .process_webhook(payload, headers_to_json(&headers), &body, &provider, check)
        .await?;
    Ok(Json(outcome))
}

/// Same pipeline as the live endpoint, minus signature verification
pub async fn handle_test_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> AppResult<impl IntoResponse> {
    let payload = parse_payload(&body)?;
    let outcome = state
        .webhooks
        .process_webhook(
            payload,
            headers_to_json(&headers),
            &body,
            "test",
            SignatureCheck::Verified,
        )
        .await?;
    Ok(Json(outcome))
}

pub async fn webhook_logs(
    State(state): State<AppState>,
    Query(query): Query<WebhookLogsQuery>,
) -> AppResult<impl IntoResponse> {
    let attempts = state
        .webhooks
        .get_webhook_logs(query.payment_id, query.provider.as_deref(), query.limit)
        .await?;
    Ok(Json(attempts))
}

fn parse_payload(body: &str) -> AppResult<WebhookPayload> {
    serde_json::from_str(body).map_err(|e| {
        AppError::validation(ValidationError::InvalidField {
            field: "body".to_string(),
            reason: format!("malformed webhook payload: {}", e),
        })
    })
}

fn signature_header(headers: &HeaderMap, provider: &str) -> Option<String> {
    let header_name = match provider {
        "flutterwave" => "verif-hash",
        "paystack" => "x-paystack-signature",
        _ => return None,
    };
    headers
        .get(header_name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

/// Snapshot the delivery headers for the attempt ledger, masking anything
/// secret-bearing
fn headers_to_json(headers: &HeaderMap) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (name, value) in headers {
        let name_str = name.as_str();
        let stored = if SENSITIVE_HEADERS.contains(&name_str) {
            "[REDACTED]".to_string()
        } else {
            value.to_str().unwrap_or("<non-utf8>").to_string()
        };
        map.insert(name_str.to_string(), serde_json::Value::String(stored));
    }
    serde_json::Value::Object(map)
}
