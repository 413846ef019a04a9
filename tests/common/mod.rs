//! Shared test fixtures

#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use chainpay_engine::chains::{
    ChainConfig, ChainProcessor, ChainRegistry, FeeEstimate, TransactionDetails,
    TransactionVerification,
};
use chainpay_engine::database::memory::{InMemoryPaymentStore, InMemoryWebhookStore};
use chainpay_engine::database::PaymentRecord;
use chainpay_engine::services::{
    CreatePaymentRequest, PaymentService, WebhookConfig, WebhookPayload, WebhookService,
};

/// Scriptable chain processor: tests set what the chain reports next
pub struct MockChainProcessor {
    config: ChainConfig,
    verification: Mutex<TransactionVerification>,
}

impl MockChainProcessor {
    pub fn new(chain_name: &str, required_confirmations: i32) -> Self {
        Self {
            config: ChainConfig {
                chain_id: 1337,
                chain_name: chain_name.to_string(),
                native_currency: "ETH".to_string(),
                required_confirmations,
                explorer_url: "https://explorer.invalid".to_string(),
                is_testnet: true,
            },
            verification: Mutex::new(TransactionVerification::invalid("nothing scripted")),
        }
    }

    pub fn report(&self, verification: TransactionVerification) {
        *self.verification.lock().unwrap() = verification;
    }

    pub fn report_transfer(&self, amount: &str, confirmations: i32) {
        self.report(TransactionVerification::valid(TransactionDetails {
            block_number: Some(100),
            from_address: "0xsender".to_string(),
            to_address: "0xrecipient".to_string(),
            amount: amount.parse().unwrap(),
            confirmation_count: confirmations,
        }));
    }
}

#[async_trait]
impl ChainProcessor for MockChainProcessor {
    async fn verify_transaction(
        &self,
        _tx_hash: &str,
    ) -> chainpay_engine::error::AppResult<TransactionVerification> {
        Ok(self.verification.lock().unwrap().clone())
    }

    async fn generate_address(
        &self,
        _owner_id: Option<&str>,
    ) -> chainpay_engine::error::AppResult<String> {
        Ok("0xgenerated".to_string())
    }

    async fn estimate_fee(
        &self,
        _amount: &BigDecimal,
        _to_address: &str,
    ) -> chainpay_engine::error::AppResult<FeeEstimate> {
        Ok(FeeEstimate {
            chain_name: self.config.chain_name.clone(),
            estimated_fee: BigDecimal::from(0),
            currency: self.config.native_currency.clone(),
            details: None,
        })
    }

    fn chain_config(&self) -> ChainConfig {
        self.config.clone()
    }
}

pub struct TestHarness {
    pub payments: PaymentService,
    pub webhooks: WebhookService,
    pub chain: Arc<MockChainProcessor>,
    pub payment_store: Arc<InMemoryPaymentStore>,
    pub webhook_store: Arc<InMemoryWebhookStore>,
}

pub fn harness(required_confirmations: i32) -> TestHarness {
    let chain = Arc::new(MockChainProcessor::new("testchain", required_confirmations));
    let mut registry = ChainRegistry::new();
    registry.register(chain.clone());
    let registry = Arc::new(registry);

    let payment_store = Arc::new(InMemoryPaymentStore::new());
    let webhook_store = Arc::new(InMemoryWebhookStore::new());

    TestHarness {
        payments: PaymentService::new(registry, payment_store.clone()),
        webhooks: WebhookService::new(
            payment_store.clone(),
            webhook_store.clone(),
            WebhookConfig::default(),
        ),
        chain,
        payment_store,
        webhook_store,
    }
}

impl TestHarness {
    pub async fn create_payment(&self, amount: &str) -> PaymentRecord {
        self.payments
            .create_payment(
                "owner-1",
                CreatePaymentRequest {
                    chain_name: "testchain".to_string(),
                    payment_type: "deposit".to_string(),
                    amount: amount.parse().unwrap(),
                    currency: "ETH".to_string(),
                    to_address: None,
                    metadata: None,
                },
            )
            .await
            .expect("payment creation")
    }
}

pub fn webhook_payload(payment_id: Uuid, status: &str) -> WebhookPayload {
    WebhookPayload {
        payment_id,
        status: status.to_string(),
        amount: None,
        timestamp: None,
        tx_hash: None,
        block_number: None,
        from_address: None,
        to_address: None,
        metadata: None,
        error_message: None,
    }
}

pub fn empty_headers() -> serde_json::Value {
    serde_json::json!({})
}
