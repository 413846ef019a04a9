//! Webhook reconciliation service
//!
//! Ingests pushed provider events, deduplicates them against the attempt
//! ledger, maps provider status onto payment status, and applies the update
//! to the payment record exactly once. Providers deliver at-least-once and
//! out of order, so every inbound call is recorded whatever its outcome:
//! the ledger is both the audit trail and the idempotency key space.
//!
//! The idempotency key is the triple (payment_id, reported_status,
//! provider), not a delivery id. Two different statuses for the same payment
//! (a late `success` after an earlier `pending`) are deliberately not
//! deduplicated against each other.

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::database::{
    AttemptInsert, PaymentRecord, PaymentStatus, PaymentStore, WebhookAttempt, WebhookStore,
};
use crate::error::{AppError, AppResult, DomainError};

type HmacSha512 = Hmac<Sha512>;

const DEFAULT_LOG_LIMIT: i64 = 50;

/// Provider event body
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub payment_id: Uuid,
    pub status: String,
    pub amount: Option<bigdecimal::BigDecimal>,
    pub timestamp: Option<DateTime<Utc>>,
    pub tx_hash: Option<String>,
    pub block_number: Option<i64>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub error_message: Option<String>,
}

/// What the caller gets back from `process_webhook`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookOutcome {
    pub success: bool,
    pub message: String,
    pub payment_id: Uuid,
    pub is_duplicate: bool,
}

/// Result of a signature check. An unrecognized provider is let through but
/// marked untrusted, never silently treated as verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck {
    Verified,
    Untrusted,
}

/// Per-provider webhook secrets
#[derive(Debug, Clone, Default)]
pub struct WebhookConfig {
    pub flutterwave_secret: Option<String>,
    pub paystack_secret: Option<String>,
}

impl WebhookConfig {
    pub fn from_env() -> Self {
        Self {
            flutterwave_secret: std::env::var("FLUTTERWAVE_WEBHOOK_SECRET").ok(),
            paystack_secret: std::env::var("PAYSTACK_WEBHOOK_SECRET").ok(),
        }
    }
}

/// Map a provider-reported status onto the payment state machine
pub fn map_reported_status(reported: &str) -> Option<PaymentStatus> {
    match reported.to_lowercase().as_str() {
        "success" => Some(PaymentStatus::Confirmed),
        "failed" => Some(PaymentStatus::Failed),
        "pending" => Some(PaymentStatus::Processing),
        "cancelled" => Some(PaymentStatus::Failed),
        _ => None,
    }
}

/// Deterministic provider detection: known provider-specific signature
/// headers in fixed priority order, then a generic override header, else
/// "unknown".
pub fn extract_provider_from_headers(headers: &HeaderMap) -> String {
    if headers.contains_key("verif-hash") {
        return "flutterwave".to_string();
    }
    if headers.contains_key("x-paystack-signature") {
        return "paystack".to_string();
    }
    if let Some(provider) = headers
        .get("x-webhook-provider")
        .and_then(|v| v.to_str().ok())
    {
        return provider.to_lowercase();
    }
    "unknown".to_string()
}

pub struct WebhookService {
    payments: Arc<dyn PaymentStore>,
    webhooks: Arc<dyn WebhookStore>,
    config: WebhookConfig,
}

impl WebhookService {
    pub fn new(
        payments: Arc<dyn PaymentStore>,
        webhooks: Arc<dyn WebhookStore>,
        config: WebhookConfig,
    ) -> Self {
        Self {
            payments,
            webhooks,
            config,
        }
    }

    /// Ingest one webhook delivery.
    ///
    /// Every path through here leaves a ledger row behind: duplicates leave
    /// a duplicate marker, failures leave an unprocessed row carrying the
    /// error, and success leaves the processed row that claims the
    /// idempotency triple. The claim row is inserted before the payment is
    /// touched, so two racing deliveries cannot both apply the update; if
    /// applying then fails, the claim is demoted and the error propagates.
    pub async fn process_webhook(
        &self,
        payload: WebhookPayload,
        raw_headers: serde_json::Value,
        raw_body: &str,
        provider: &str,
        signature: SignatureCheck,
    ) -> AppResult<WebhookOutcome> {
        let mut attempt = WebhookAttempt::new(
            payload.payment_id,
            &payload.status,
            provider,
            raw_headers,
            raw_body,
        );
        attempt.signature_verified = signature == SignatureCheck::Verified;

        // Fast path: this exact event was already applied
        if self
            .webhooks
            .find_processed(payload.payment_id, &payload.status, provider)
            .await?
            .is_some()
        {
            attempt.mark_duplicate();
            self.webhooks.insert(&attempt).await?;
            info!(
                payment_id = %payload.payment_id,
                provider = %provider,
                status = %payload.status,
                "Duplicate webhook, already processed"
            );
            return Ok(WebhookOutcome {
                success: true,
                message: "already processed".to_string(),
                payment_id: payload.payment_id,
                is_duplicate: true,
            });
        }

        // The attempt is kept for later diagnosis and replay even when the
        // payment is missing, the store is down, or the status is garbage
        let mut record = match self.payments.find_by_id(payload.payment_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                attempt.mark_failed("payment not found");
                self.webhooks.insert(&attempt).await?;
                return Err(AppError::domain(DomainError::PaymentNotFound {
                    payment_id: payload.payment_id.to_string(),
                }));
            }
            Err(err) => {
                attempt.mark_failed(&err.to_string());
                if let Err(insert_err) = self.webhooks.insert(&attempt).await {
                    warn!(
                        attempt_id = %attempt.id,
                        error = %insert_err,
                        "Failed to record webhook failure in ledger"
                    );
                }
                return Err(err);
            }
        };

        let Some(target) = map_reported_status(&payload.status) else {
            attempt.mark_failed(&format!("unrecognized webhook status: {}", payload.status));
            self.webhooks.insert(&attempt).await?;
            return Err(AppError::domain(DomainError::InvalidWebhookStatus {
                status: payload.status.clone(),
            }));
        };

        // Finalized payments accept no further updates; record the event and
        // answer with a benign no-op
        if record.status.is_terminal() {
            attempt.processed = true;
            attempt.processed_at = Some(Utc::now());
            // The note keeps this row out of the unique idempotency index
            attempt.error_message =
                Some(format!("payment already finalized as {}", record.status));
            self.webhooks.insert(&attempt).await?;
            info!(
                payment_id = %record.id,
                status = %record.status,
                reported = %payload.status,
                "Webhook for finalized payment ignored"
            );
            return Ok(WebhookOutcome {
                success: true,
                message: format!("payment already finalized as {}", record.status),
                payment_id: record.id,
                is_duplicate: false,
            });
        }

        // Claim the idempotency triple before touching the payment. Losing
        // the race here means a concurrent delivery of the same event won.
        attempt.mark_processed();
        if self.webhooks.insert(&attempt).await? == AttemptInsert::DuplicateProcessed {
            debug!(
                payment_id = %payload.payment_id,
                provider = %provider,
                "Lost idempotency race to a concurrent delivery"
            );
            return Ok(WebhookOutcome {
                success: true,
                message: "already processed".to_string(),
                payment_id: payload.payment_id,
                is_duplicate: true,
            });
        }

        if let Err(err) = self.apply_update(&mut record, &payload, target).await {
            // Demote the claim so the provider's retry can succeed, keeping
            // the audit trail of this failure
            attempt.mark_failed(&err.to_string());
            if let Err(update_err) = self.webhooks.update(&attempt).await {
                warn!(
                    attempt_id = %attempt.id,
                    error = %update_err,
                    "Failed to record webhook failure in ledger"
                );
            }
            return Err(err);
        }

        info!(
            payment_id = %record.id,
            provider = %provider,
            reported = %payload.status,
            new_status = %record.status,
            "Webhook processed"
        );
        Ok(WebhookOutcome {
            success: true,
            message: "webhook processed".to_string(),
            payment_id: record.id,
            is_duplicate: false,
        })
    }

    /// Apply the mapped update to the payment record and persist it
    async fn apply_update(
        &self,
        record: &mut PaymentRecord,
        payload: &WebhookPayload,
        target: PaymentStatus,
    ) -> AppResult<()> {
        if let Some(tx_hash) = &payload.tx_hash {
            record.tx_hash = Some(tx_hash.clone());
        }
        if let Some(block_number) = payload.block_number {
            record.block_number = Some(block_number);
        }
        if let Some(from_address) = &payload.from_address {
            record.from_address = Some(from_address.clone());
        }
        if let Some(to_address) = &payload.to_address {
            record.to_address = Some(to_address.clone());
        }

        merge_metadata(&mut record.metadata, payload.metadata.as_ref());

        record.transition_to(target).map_err(AppError::domain)?;
        self.payments.update(record).await
    }

    /// Verify a provider signature over the raw body.
    ///
    /// Known providers fail hard on a bad or missing signature. A provider
    /// we have no verifier for passes through as untrusted, and a known
    /// provider with no configured secret is likewise untrusted rather than
    /// rejected, so a half-configured deployment degrades loudly instead of
    /// dropping traffic.
    pub fn verify_webhook_signature(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
        provider: &str,
    ) -> AppResult<SignatureCheck> {
        match provider {
            "test" => Ok(SignatureCheck::Verified),
            "flutterwave" => match &self.config.flutterwave_secret {
                Some(secret) => {
                    // Flutterwave sends the shared secret itself in verif-hash
                    if signature == Some(secret.as_str()) {
                        Ok(SignatureCheck::Verified)
                    } else {
                        Err(signature_error(provider))
                    }
                }
                None => {
                    warn!("No Flutterwave webhook secret configured, accepting as untrusted");
                    Ok(SignatureCheck::Untrusted)
                }
            },
            "paystack" => match &self.config.paystack_secret {
                Some(secret) => {
                    let expected = hmac_sha512_hex(secret.as_bytes(), raw_body);
                    let provided = signature.unwrap_or_default();
                    if !provided.is_empty() && expected.eq_ignore_ascii_case(provided) {
                        Ok(SignatureCheck::Verified)
                    } else {
                        Err(signature_error(provider))
                    }
                }
                None => {
                    warn!("No Paystack webhook secret configured, accepting as untrusted");
                    Ok(SignatureCheck::Untrusted)
                }
            },
            other => {
                warn!(provider = %other, "No signature verifier for provider, accepting as untrusted");
                Ok(SignatureCheck::Untrusted)
            }
        }
    }

    /// Newest-first, read-only audit query over the attempt ledger
    pub async fn get_webhook_logs(
        &self,
        payment_id: Option<Uuid>,
        provider: Option<&str>,
        limit: Option<i64>,
    ) -> AppResult<Vec<WebhookAttempt>> {
        self.webhooks
            .list(payment_id, provider, limit.unwrap_or(DEFAULT_LOG_LIMIT))
            .await
    }
}

fn signature_error(provider: &str) -> AppError {
    AppError::domain(DomainError::InvalidWebhookSignature {
        provider: provider.to_string(),
    })
}

fn hmac_sha512_hex(secret: &[u8], body: &[u8]) -> String {
    let mut mac =
        HmacSha512::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Merge webhook metadata into the record's map (never replace wholesale)
/// and stamp the time of the update
fn merge_metadata(existing: &mut serde_json::Value, incoming: Option<&serde_json::Value>) {
    if !existing.is_object() {
        *existing = serde_json::json!({});
    }
    let map = existing.as_object_mut().expect("metadata is an object");
    if let Some(serde_json::Value::Object(incoming)) = incoming {
        for (key, value) in incoming {
            map.insert(key.clone(), value.clone());
        }
    }
    map.insert(
        "lastWebhookUpdate".to_string(),
        serde_json::Value::String(Utc::now().to_rfc3339()),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn status_mapping_table() {
        assert_eq!(map_reported_status("success"), Some(PaymentStatus::Confirmed));
        assert_eq!(map_reported_status("failed"), Some(PaymentStatus::Failed));
        assert_eq!(map_reported_status("pending"), Some(PaymentStatus::Processing));
        assert_eq!(map_reported_status("cancelled"), Some(PaymentStatus::Failed));
        assert_eq!(map_reported_status("SUCCESS"), Some(PaymentStatus::Confirmed));
        assert_eq!(map_reported_status("refunded"), None);
        assert_eq!(map_reported_status(""), None);
    }

    #[test]
    fn provider_detection_flutterwave() {
        let mut headers = HeaderMap::new();
        headers.insert("verif-hash", HeaderValue::from_static("abc"));
        assert_eq!(extract_provider_from_headers(&headers), "flutterwave");
    }

    #[test]
    fn provider_detection_paystack() {
        let mut headers = HeaderMap::new();
        headers.insert("x-paystack-signature", HeaderValue::from_static("abc"));
        assert_eq!(extract_provider_from_headers(&headers), "paystack");
    }

    #[test]
    fn provider_detection_priority_order() {
        // Flutterwave's header wins over the generic override
        let mut headers = HeaderMap::new();
        headers.insert("verif-hash", HeaderValue::from_static("abc"));
        headers.insert("x-webhook-provider", HeaderValue::from_static("paystack"));
        assert_eq!(extract_provider_from_headers(&headers), "flutterwave");
    }

    #[test]
    fn provider_detection_generic_override() {
        let mut headers = HeaderMap::new();
        headers.insert("x-webhook-provider", HeaderValue::from_static("Stripe"));
        assert_eq!(extract_provider_from_headers(&headers), "stripe");
    }

    #[test]
    fn provider_detection_unknown_fallback() {
        let headers = HeaderMap::new();
        assert_eq!(extract_provider_from_headers(&headers), "unknown");
    }

    #[test]
    fn metadata_merge_keeps_existing_keys() {
        let mut existing = serde_json::json!({"orderId": "o-1", "note": "keep me"});
        let incoming = serde_json::json!({"note": "overwritten", "providerRef": "p-9"});
        merge_metadata(&mut existing, Some(&incoming));

        assert_eq!(existing["orderId"], "o-1");
        assert_eq!(existing["note"], "overwritten");
        assert_eq!(existing["providerRef"], "p-9");
        assert!(existing["lastWebhookUpdate"].is_string());
    }

    #[test]
    fn metadata_merge_handles_non_object_existing() {
        let mut existing = serde_json::Value::Null;
        merge_metadata(&mut existing, None);
        assert!(existing.is_object());
        assert!(existing["lastWebhookUpdate"].is_string());
    }

    #[test]
    fn paystack_signature_round_trip() {
        let service = WebhookService::new(
            Arc::new(crate::database::memory::InMemoryPaymentStore::new()),
            Arc::new(crate::database::memory::InMemoryWebhookStore::new()),
            WebhookConfig {
                flutterwave_secret: None,
                paystack_secret: Some("sk_test_secret".to_string()),
            },
        );
        let body = br#"{"paymentId":"x","status":"success"}"#;
        let signature = hmac_sha512_hex(b"sk_test_secret", body);

        assert_eq!(
            service
                .verify_webhook_signature(body, Some(&signature), "paystack")
                .unwrap(),
            SignatureCheck::Verified
        );
        assert!(service
            .verify_webhook_signature(body, Some("bad"), "paystack")
            .is_err());
        assert!(service
            .verify_webhook_signature(body, None, "paystack")
            .is_err());
    }

    #[test]
    fn flutterwave_signature_is_shared_secret() {
        let service = WebhookService::new(
            Arc::new(crate::database::memory::InMemoryPaymentStore::new()),
            Arc::new(crate::database::memory::InMemoryWebhookStore::new()),
            WebhookConfig {
                flutterwave_secret: Some("fw-hash".to_string()),
                paystack_secret: None,
            },
        );
        assert_eq!(
            service
                .verify_webhook_signature(b"{}", Some("fw-hash"), "flutterwave")
                .unwrap(),
            SignatureCheck::Verified
        );
        assert!(service
            .verify_webhook_signature(b"{}", Some("wrong"), "flutterwave")
            .is_err());
    }

    #[test]
    fn unknown_provider_passes_as_untrusted() {
        let service = WebhookService::new(
            Arc::new(crate::database::memory::InMemoryPaymentStore::new()),
            Arc::new(crate::database::memory::InMemoryWebhookStore::new()),
            WebhookConfig::default(),
        );
        assert_eq!(
            service
                .verify_webhook_signature(b"{}", None, "stripe")
                .unwrap(),
            SignatureCheck::Untrusted
        );
        assert_eq!(
            service
                .verify_webhook_signature(b"{}", None, "test")
                .unwrap(),
            SignatureCheck::Verified
        );
    }
}
