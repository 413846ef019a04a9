//! Payment orchestration service
//!
//! Creates and queries payment intents and drives active verification by
//! polling the matching chain processor. Verification is safe to repeat: it
//! re-derives state from the chain on every call and only ever advances the
//! record forward.

use bigdecimal::BigDecimal;
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chains::{ChainConfig, ChainRegistry, FeeEstimate};
use crate::database::{PaymentFilters, PaymentRecord, PaymentStatus, PaymentStore};
use crate::error::{AppError, AppResult, DomainError, ValidationError};

/// Payment intents expire advisory after this long; nothing sweeps them yet
const PAYMENT_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub chain_name: String,
    #[serde(rename = "type")]
    pub payment_type: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub to_address: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    pub tx_hash: String,
    pub chain_name: String,
    pub expected_amount: Option<BigDecimal>,
    pub expected_to_address: Option<String>,
}

pub struct PaymentService {
    registry: Arc<ChainRegistry>,
    payments: Arc<dyn PaymentStore>,
}

impl PaymentService {
    pub fn new(registry: Arc<ChainRegistry>, payments: Arc<dyn PaymentStore>) -> Self {
        Self { registry, payments }
    }

    /// Create a new payment intent. Chain config decides `chain_id` and
    /// `required_confirmations`; both are fixed for the record's lifetime.
    pub async fn create_payment(
        &self,
        owner_id: &str,
        request: CreatePaymentRequest,
    ) -> AppResult<PaymentRecord> {
        if request.amount <= BigDecimal::from(0) {
            return Err(AppError::validation(ValidationError::InvalidAmount {
                amount: request.amount.to_string(),
                reason: "amount must be positive".to_string(),
            }));
        }

        let processor = self.registry.get(&request.chain_name)?;
        let config = processor.chain_config();

        let now = Utc::now();
        let record = PaymentRecord {
            id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            payment_type: request.payment_type,
            amount: request.amount,
            currency: request.currency,
            chain_name: config.chain_name.clone(),
            chain_id: config.chain_id,
            tx_hash: None,
            block_number: None,
            from_address: None,
            to_address: request.to_address,
            status: PaymentStatus::Pending,
            confirmation_count: 0,
            required_confirmations: config.required_confirmations,
            metadata: request.metadata.unwrap_or_else(|| serde_json::json!({})),
            expires_at: now + Duration::hours(PAYMENT_TTL_HOURS),
            created_at: now,
            updated_at: now,
            confirmed_at: None,
        };

        self.payments.insert(&record).await?;

        info!(
            payment_id = %record.id,
            owner_id = %record.owner_id,
            chain = %record.chain_name,
            amount = %record.amount,
            "Payment created"
        );
        Ok(record)
    }

    /// Verify on-chain settlement for a payment. Idempotent: repeated calls
    /// re-read chain state and never regress status or confirmation count.
    pub async fn verify_payment(
        &self,
        payment_id: Uuid,
        request: VerifyPaymentRequest,
    ) -> AppResult<PaymentRecord> {
        let mut record = self
            .payments
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| {
                AppError::domain(DomainError::PaymentNotFound {
                    payment_id: payment_id.to_string(),
                })
            })?;

        if !record.chain_name.eq_ignore_ascii_case(&request.chain_name) {
            return Err(AppError::domain(DomainError::ChainMismatch {
                expected: record.chain_name.clone(),
                provided: request.chain_name,
            }));
        }

        // Terminal records are immutable; verifying one is a benign no-op
        if record.status.is_terminal() {
            debug!(
                payment_id = %record.id,
                status = %record.status,
                "Verification requested for finalized payment, returning unchanged"
            );
            return Ok(record);
        }

        let processor = self.registry.get(&record.chain_name)?;
        let verification = processor.verify_transaction(&request.tx_hash).await?;

        if !verification.is_valid {
            return Err(AppError::domain(DomainError::InvalidTransaction {
                reason: verification
                    .error
                    .unwrap_or_else(|| "transaction could not be verified".to_string()),
            }));
        }
        let details = verification.details.ok_or_else(|| {
            AppError::internal_error("chain processor returned no transaction details")
        })?;

        // Underpayment is rejected; overpayment is accepted
        if let Some(expected) = &request.expected_amount {
            if details.amount < *expected {
                return Err(AppError::domain(DomainError::AmountMismatch {
                    expected: expected.to_string(),
                    actual: details.amount.to_string(),
                }));
            }
        }
        if let Some(expected) = &request.expected_to_address {
            if !details.to_address.eq_ignore_ascii_case(expected) {
                return Err(AppError::domain(DomainError::AddressMismatch {
                    expected: expected.clone(),
                    actual: details.to_address.clone(),
                }));
            }
        }

        record.tx_hash = Some(request.tx_hash);
        record.block_number = details.block_number;
        record.from_address = Some(details.from_address);
        record.to_address = Some(details.to_address);
        record.record_confirmations(details.confirmation_count);

        let target = if record.confirmation_count >= record.required_confirmations {
            PaymentStatus::Confirmed
        } else {
            PaymentStatus::Processing
        };
        record.transition_to(target).map_err(AppError::domain)?;

        self.payments.update(&record).await?;

        info!(
            payment_id = %record.id,
            status = %record.status,
            confirmations = record.confirmation_count,
            required = record.required_confirmations,
            "Payment verified against chain state"
        );
        Ok(record)
    }

    pub async fn get_payment(&self, payment_id: Uuid) -> AppResult<PaymentRecord> {
        self.payments
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| {
                AppError::domain(DomainError::PaymentNotFound {
                    payment_id: payment_id.to_string(),
                })
            })
    }

    /// Newest-first listing of one owner's payments
    pub async fn get_user_payments(
        &self,
        owner_id: &str,
        filters: PaymentFilters,
    ) -> AppResult<Vec<PaymentRecord>> {
        self.payments.find_by_owner(owner_id, &filters).await
    }

    pub fn get_supported_chains(&self) -> Vec<ChainConfig> {
        self.registry.configs()
    }

    pub async fn generate_address(
        &self,
        chain_name: &str,
        owner_id: Option<&str>,
    ) -> AppResult<String> {
        let processor = self.registry.get(chain_name)?;
        let address = processor.generate_address(owner_id).await?;
        debug!(chain = %chain_name, "Deposit address generated");
        Ok(address)
    }

    pub async fn estimate_fee(
        &self,
        chain_name: &str,
        amount: &BigDecimal,
        to_address: &str,
    ) -> AppResult<FeeEstimate> {
        let processor = self.registry.get(chain_name)?;
        let estimate = processor.estimate_fee(amount, to_address).await;
        if let Err(ref err) = estimate {
            warn!(chain = %chain_name, error = %err, "Fee estimation failed");
        }
        estimate
    }
}
