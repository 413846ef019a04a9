//! Payment record entity and repository
//!
//! A `PaymentRecord` is the durable representation of one payment intent.
//! Records are created pending, mutated by active verification or webhook
//! reconciliation, and never hard-deleted: they are a financial audit record.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppResult, DomainError};

/// Payment lifecycle status
///
/// Status only advances forward through pending → processing → confirmed, or
/// jumps to the terminal failed state from any non-terminal state. Confirmed
/// and failed are terminal: no transition leaves them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Confirmed,
    Failed,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(PaymentStatus::Pending),
            "processing" => Ok(PaymentStatus::Processing),
            "confirmed" => Ok(PaymentStatus::Confirmed),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(format!("unknown payment status: {}", other)),
        }
    }
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Confirmed => "confirmed",
            PaymentStatus::Failed => "failed",
        }
    }

    /// All states reachable from this one
    pub fn valid_transitions(&self) -> Vec<PaymentStatus> {
        match self {
            PaymentStatus::Pending => vec![
                PaymentStatus::Processing,
                PaymentStatus::Confirmed,
                PaymentStatus::Failed,
            ],
            PaymentStatus::Processing => {
                vec![PaymentStatus::Confirmed, PaymentStatus::Failed]
            }
            // Terminal states
            PaymentStatus::Confirmed => vec![],
            PaymentStatus::Failed => vec![],
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Confirmed | PaymentStatus::Failed)
    }

    /// Whether moving to `target` is legal. Staying in the same non-terminal
    /// state is allowed (re-verification refreshes the record in place).
    pub fn can_transition_to(&self, target: PaymentStatus) -> bool {
        if *self == target {
            return !self.is_terminal();
        }
        self.valid_transitions().contains(&target)
    }
}

/// One payment intent and its lifecycle
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub id: Uuid,
    pub owner_id: String,
    pub payment_type: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub chain_name: String,
    pub chain_id: i64,
    pub tx_hash: Option<String>,
    pub block_number: Option<i64>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub status: PaymentStatus,
    pub confirmation_count: i32,
    pub required_confirmations: i32,
    pub metadata: serde_json::Value,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl PaymentRecord {
    /// Apply a status change, enforcing the transition table and the
    /// write-once `confirmed_at` invariant. Illegal transitions are rejected;
    /// callers decide whether rejection is an error or a benign no-op.
    pub fn transition_to(&mut self, target: PaymentStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(target) {
            return Err(DomainError::InvalidTransaction {
                reason: format!(
                    "illegal status transition {} -> {}",
                    self.status, target
                ),
            });
        }
        if target == PaymentStatus::Confirmed && self.status != PaymentStatus::Confirmed {
            self.confirmed_at = Some(Utc::now());
        }
        self.status = target;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Raise the confirmation count, never lowering it
    pub fn record_confirmations(&mut self, count: i32) {
        if count > self.confirmation_count {
            self.confirmation_count = count;
        }
    }
}

/// Filters for listing a user's payments
#[derive(Debug, Clone, Default)]
pub struct PaymentFilters {
    pub status: Option<PaymentStatus>,
    pub chain_name: Option<String>,
    pub payment_type: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// Durable storage for payment records
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert(&self, record: &PaymentRecord) -> AppResult<()>;

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<PaymentRecord>>;

    async fn update(&self, record: &PaymentRecord) -> AppResult<()>;

    /// Newest-first listing for one owner
    async fn find_by_owner(
        &self,
        owner_id: &str,
        filters: &PaymentFilters,
    ) -> AppResult<Vec<PaymentRecord>>;
}

/// PostgreSQL-backed payment repository
#[derive(Clone)]
pub struct PgPaymentRepository {
    pool: PgPool,
}

impl PgPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentStore for PgPaymentRepository {
    async fn insert(&self, record: &PaymentRecord) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_records (
                id, owner_id, payment_type, amount, currency, chain_name, chain_id,
                tx_hash, block_number, from_address, to_address, status,
                confirmation_count, required_confirmations, metadata,
                expires_at, created_at, updated_at, confirmed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(record.id)
        .bind(&record.owner_id)
        .bind(&record.payment_type)
        .bind(&record.amount)
        .bind(&record.currency)
        .bind(&record.chain_name)
        .bind(record.chain_id)
        .bind(&record.tx_hash)
        .bind(record.block_number)
        .bind(&record.from_address)
        .bind(&record.to_address)
        .bind(record.status)
        .bind(record.confirmation_count)
        .bind(record.required_confirmations)
        .bind(&record.metadata)
        .bind(record.expires_at)
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(record.confirmed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<PaymentRecord>> {
        let record = sqlx::query_as::<_, PaymentRecord>(
            "SELECT * FROM payment_records WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn update(&self, record: &PaymentRecord) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE payment_records
            SET tx_hash = $2,
                block_number = $3,
                from_address = $4,
                to_address = $5,
                status = $6,
                confirmation_count = $7,
                metadata = $8,
                updated_at = $9,
                confirmed_at = $10
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(&record.tx_hash)
        .bind(record.block_number)
        .bind(&record.from_address)
        .bind(&record.to_address)
        .bind(record.status)
        .bind(record.confirmation_count)
        .bind(&record.metadata)
        .bind(record.updated_at)
        .bind(record.confirmed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_owner(
        &self,
        owner_id: &str,
        filters: &PaymentFilters,
    ) -> AppResult<Vec<PaymentRecord>> {
        let records = sqlx::query_as::<_, PaymentRecord>(
            r#"
            SELECT * FROM payment_records
            WHERE owner_id = $1
              AND ($2::payment_status IS NULL OR status = $2)
              AND ($3::text IS NULL OR chain_name = $3)
              AND ($4::text IS NULL OR payment_type = $4)
              AND ($5::timestamptz IS NULL OR created_at >= $5)
              AND ($6::timestamptz IS NULL OR created_at <= $6)
            ORDER BY created_at DESC
            "#,
        )
        .bind(owner_id)
        .bind(filters.status)
        .bind(&filters.chain_name)
        .bind(&filters.payment_type)
        .bind(filters.start_date)
        .bind(filters.end_date)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}
