//! Webhook ingestion: idempotency, status mapping, and the attempt ledger

mod common;

use chainpay_engine::database::PaymentStatus;
use chainpay_engine::database::WebhookStore;
use chainpay_engine::error::ErrorCode;
use chainpay_engine::services::SignatureCheck;
use uuid::Uuid;

use common::{empty_headers, harness, webhook_payload};

#[tokio::test]
async fn double_delivery_applies_once() {
    let h = harness(3);
    let payment = h.create_payment("1").await;

    let first = h
        .webhooks
        .process_webhook(
            webhook_payload(payment.id, "success"),
            empty_headers(),
            "{}",
            "flutterwave",
            SignatureCheck::Verified,
        )
        .await
        .unwrap();
    assert!(first.success);
    assert!(!first.is_duplicate);

    let updated = h.payments.get_payment(payment.id).await.unwrap();
    assert_eq!(updated.status, PaymentStatus::Confirmed);
    let confirmed_at = updated.confirmed_at;
    assert!(confirmed_at.is_some());

    // Provider retries the identical event
    let second = h
        .webhooks
        .process_webhook(
            webhook_payload(payment.id, "success"),
            empty_headers(),
            "{}",
            "flutterwave",
            SignatureCheck::Verified,
        )
        .await
        .unwrap();
    assert!(second.success);
    assert!(second.is_duplicate);

    let after = h.payments.get_payment(payment.id).await.unwrap();
    assert_eq!(after.status, PaymentStatus::Confirmed);
    assert_eq!(after.confirmed_at, confirmed_at);

    // Both deliveries are in the ledger
    let attempts = h
        .webhook_store
        .list(Some(payment.id), None, 10)
        .await
        .unwrap();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts.iter().filter(|a| a.error_message.is_none()).count(), 1);
}

#[tokio::test]
async fn same_payment_different_status_is_not_a_duplicate() {
    let h = harness(3);
    let payment = h.create_payment("1").await;

    let pending = h
        .webhooks
        .process_webhook(
            webhook_payload(payment.id, "pending"),
            empty_headers(),
            "{}",
            "flutterwave",
            SignatureCheck::Verified,
        )
        .await
        .unwrap();
    assert!(!pending.is_duplicate);
    assert_eq!(
        h.payments.get_payment(payment.id).await.unwrap().status,
        PaymentStatus::Processing
    );

    let success = h
        .webhooks
        .process_webhook(
            webhook_payload(payment.id, "success"),
            empty_headers(),
            "{}",
            "flutterwave",
            SignatureCheck::Verified,
        )
        .await
        .unwrap();
    assert!(!success.is_duplicate);
    assert_eq!(
        h.payments.get_payment(payment.id).await.unwrap().status,
        PaymentStatus::Confirmed
    );
}

#[tokio::test]
async fn same_event_from_another_provider_applies_to_a_fresh_payment() {
    // The idempotency triple includes the provider
    let h = harness(3);
    let payment = h.create_payment("1").await;

    h.webhooks
        .process_webhook(
            webhook_payload(payment.id, "pending"),
            empty_headers(),
            "{}",
            "flutterwave",
            SignatureCheck::Verified,
        )
        .await
        .unwrap();
    let from_paystack = h
        .webhooks
        .process_webhook(
            webhook_payload(payment.id, "pending"),
            empty_headers(),
            "{}",
            "paystack",
            SignatureCheck::Verified,
        )
        .await
        .unwrap();
    assert!(!from_paystack.is_duplicate);
}

#[tokio::test]
async fn unknown_status_persists_a_failed_attempt() {
    let h = harness(3);
    let payment = h.create_payment("1").await;

    let err = h
        .webhooks
        .process_webhook(
            webhook_payload(payment.id, "refunded"),
            empty_headers(),
            "{}",
            "flutterwave",
            SignatureCheck::Verified,
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::InvalidWebhookStatus);

    let attempts = h
        .webhook_store
        .list(Some(payment.id), None, 10)
        .await
        .unwrap();
    assert_eq!(attempts.len(), 1);
    assert!(!attempts[0].processed);
    assert!(attempts[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("refunded"));

    assert_eq!(
        h.payments.get_payment(payment.id).await.unwrap().status,
        PaymentStatus::Pending
    );
}

#[tokio::test]
async fn missing_payment_persists_a_failed_attempt() {
    let h = harness(3);
    let ghost = Uuid::new_v4();

    let err = h
        .webhooks
        .process_webhook(
            webhook_payload(ghost, "success"),
            empty_headers(),
            "{}",
            "flutterwave",
            SignatureCheck::Verified,
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), ErrorCode::PaymentNotFound);

    let attempts = h.webhook_store.list(Some(ghost), None, 10).await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert!(!attempts[0].processed);
}

#[tokio::test]
async fn cancelled_maps_to_failed() {
    let h = harness(3);
    let payment = h.create_payment("1").await;

    h.webhooks
        .process_webhook(
            webhook_payload(payment.id, "cancelled"),
            empty_headers(),
            "{}",
            "flutterwave",
            SignatureCheck::Verified,
        )
        .await
        .unwrap();
    assert_eq!(
        h.payments.get_payment(payment.id).await.unwrap().status,
        PaymentStatus::Failed
    );
}

#[tokio::test]
async fn finalized_payment_ignores_further_webhooks() {
    let h = harness(3);
    let payment = h.create_payment("1").await;

    h.webhooks
        .process_webhook(
            webhook_payload(payment.id, "success"),
            empty_headers(),
            "{}",
            "flutterwave",
            SignatureCheck::Verified,
        )
        .await
        .unwrap();

    // A late contradictory event must not flip a settled payment
    let outcome = h
        .webhooks
        .process_webhook(
            webhook_payload(payment.id, "failed"),
            empty_headers(),
            "{}",
            "flutterwave",
            SignatureCheck::Verified,
        )
        .await
        .unwrap();
    assert!(outcome.success);
    assert!(!outcome.is_duplicate);
    assert_eq!(
        h.payments.get_payment(payment.id).await.unwrap().status,
        PaymentStatus::Confirmed
    );
}

#[tokio::test]
async fn webhook_stamps_transaction_fields_and_merges_metadata() {
    let h = harness(3);
    let payment = h
        .payments
        .create_payment(
            "owner-1",
            chainpay_engine::services::CreatePaymentRequest {
                chain_name: "testchain".to_string(),
                payment_type: "deposit".to_string(),
                amount: "1".parse().unwrap(),
                currency: "ETH".to_string(),
                to_address: None,
                metadata: Some(serde_json::json!({"orderId": "o-7"})),
            },
        )
        .await
        .unwrap();

    let mut payload = webhook_payload(payment.id, "success");
    payload.tx_hash = Some("0xfeed".to_string());
    payload.block_number = Some(42);
    payload.from_address = Some("0xsender".to_string());
    payload.metadata = Some(serde_json::json!({"providerRef": "fw-123"}));

    h.webhooks
        .process_webhook(payload, empty_headers(), "{}", "flutterwave", SignatureCheck::Verified)
        .await
        .unwrap();

    let updated = h.payments.get_payment(payment.id).await.unwrap();
    assert_eq!(updated.tx_hash.as_deref(), Some("0xfeed"));
    assert_eq!(updated.block_number, Some(42));
    assert_eq!(updated.metadata["orderId"], "o-7");
    assert_eq!(updated.metadata["providerRef"], "fw-123");
    assert!(updated.metadata["lastWebhookUpdate"].is_string());
}

#[tokio::test]
async fn logs_filter_by_payment_and_provider() {
    let h = harness(3);
    let a = h.create_payment("1").await;
    let b = h.create_payment("2").await;

    h.webhooks
        .process_webhook(webhook_payload(a.id, "pending"), empty_headers(), "{}", "flutterwave", SignatureCheck::Verified)
        .await
        .unwrap();
    h.webhooks
        .process_webhook(webhook_payload(a.id, "success"), empty_headers(), "{}", "paystack", SignatureCheck::Verified)
        .await
        .unwrap();
    h.webhooks
        .process_webhook(webhook_payload(b.id, "success"), empty_headers(), "{}", "flutterwave", SignatureCheck::Verified)
        .await
        .unwrap();

    let for_a = h.webhooks.get_webhook_logs(Some(a.id), None, None).await.unwrap();
    assert_eq!(for_a.len(), 2);

    let flutterwave = h
        .webhooks
        .get_webhook_logs(None, Some("flutterwave"), None)
        .await
        .unwrap();
    assert_eq!(flutterwave.len(), 2);

    let limited = h.webhooks.get_webhook_logs(None, None, Some(1)).await.unwrap();
    assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn unverified_delivery_is_distinguishable_in_ledger() {
    let h = harness(3);
    let payment = h.create_payment("1").await;

    // A provider we hold no verifier for still gets applied, but the ledger
    // must record that the signature was never checked
    h.webhooks
        .process_webhook(
            webhook_payload(payment.id, "pending"),
            empty_headers(),
            "{}",
            "stripe",
            SignatureCheck::Untrusted,
        )
        .await
        .unwrap();
    h.webhooks
        .process_webhook(
            webhook_payload(payment.id, "success"),
            empty_headers(),
            "{}",
            "flutterwave",
            SignatureCheck::Verified,
        )
        .await
        .unwrap();

    let attempts = h
        .webhook_store
        .list(Some(payment.id), None, 10)
        .await
        .unwrap();
    let untrusted = attempts.iter().find(|a| a.provider == "stripe").unwrap();
    let trusted = attempts.iter().find(|a| a.provider == "flutterwave").unwrap();
    assert!(!untrusted.signature_verified);
    assert!(trusted.signature_verified);

    // The flag survives serialization for the audit endpoint
    let json = serde_json::to_value(untrusted).unwrap();
    assert_eq!(json["signatureVerified"], false);
}

mod failing_store {
    use async_trait::async_trait;
    use chainpay_engine::database::{PaymentFilters, PaymentRecord, PaymentStore};
    use chainpay_engine::error::{AppError, AppResult};
    use uuid::Uuid;

    /// Payment store whose reads fail, standing in for a database outage
    pub struct UnavailablePaymentStore;

    #[async_trait]
    impl PaymentStore for UnavailablePaymentStore {
        async fn insert(&self, _record: &PaymentRecord) -> AppResult<()> {
            Err(AppError::internal_error("payment store unavailable"))
        }

        async fn find_by_id(&self, _id: Uuid) -> AppResult<Option<PaymentRecord>> {
            Err(AppError::internal_error("payment store unavailable"))
        }

        async fn update(&self, _record: &PaymentRecord) -> AppResult<()> {
            Err(AppError::internal_error("payment store unavailable"))
        }

        async fn find_by_owner(
            &self,
            _owner_id: &str,
            _filters: &PaymentFilters,
        ) -> AppResult<Vec<PaymentRecord>> {
            Err(AppError::internal_error("payment store unavailable"))
        }
    }
}

#[tokio::test]
async fn store_failure_while_loading_still_records_the_attempt() {
    use chainpay_engine::database::memory::InMemoryWebhookStore;
    use chainpay_engine::services::{WebhookConfig, WebhookService};
    use std::sync::Arc;

    let webhook_store = Arc::new(InMemoryWebhookStore::new());
    let service = WebhookService::new(
        Arc::new(failing_store::UnavailablePaymentStore),
        webhook_store.clone(),
        WebhookConfig::default(),
    );

    let ghost = Uuid::new_v4();
    let err = service
        .process_webhook(
            webhook_payload(ghost, "success"),
            empty_headers(),
            "{}",
            "flutterwave",
            SignatureCheck::Verified,
        )
        .await
        .unwrap_err();
    assert!(err.status_code().is_server_error());

    // The audit trail survives the infrastructure failure
    let attempts = webhook_store.list(Some(ghost), None, 10).await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert!(!attempts[0].processed);
    assert!(attempts[0]
        .error_message
        .as_deref()
        .unwrap()
        .contains("unavailable"));
}
