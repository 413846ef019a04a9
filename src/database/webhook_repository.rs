//! Webhook attempt ledger
//!
//! Every inbound webhook call is recorded here, whatever its outcome. The
//! ledger doubles as the idempotency key space: the triple
//! (payment_id, reported_status, provider) over successfully processed
//! attempts must be unique, and the store enforces that atomically so two
//! concurrent deliveries of the same event cannot both claim it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppResult;

/// One durable record per inbound webhook call. Never deleted: this is the
/// system's replay and audit mechanism.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAttempt {
    pub id: Uuid,
    pub payment_id: Uuid,
    pub reported_status: String,
    pub provider: String,
    pub raw_headers: serde_json::Value,
    pub raw_body: String,
    /// Whether the provider signature was cryptographically verified.
    /// Deliveries from providers with no verifier or no configured secret
    /// are ingested but land here as false.
    pub signature_verified: bool,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WebhookAttempt {
    pub fn new(
        payment_id: Uuid,
        reported_status: &str,
        provider: &str,
        raw_headers: serde_json::Value,
        raw_body: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            payment_id,
            reported_status: reported_status.to_string(),
            provider: provider.to_string(),
            raw_headers,
            raw_body: raw_body.to_string(),
            signature_verified: false,
            processed: false,
            processed_at: None,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    pub fn mark_processed(&mut self) {
        self.processed = true;
        self.processed_at = Some(Utc::now());
        self.error_message = None;
    }

    pub fn mark_failed(&mut self, error: &str) {
        self.processed = false;
        self.processed_at = Some(Utc::now());
        self.error_message = Some(error.to_string());
    }

    /// Duplicate markers are processed (nothing left to do) but carry an
    /// error message, which keeps them out of the unique idempotency index.
    pub fn mark_duplicate(&mut self) {
        self.processed = true;
        self.processed_at = Some(Utc::now());
        self.error_message = Some("duplicate, already processed".to_string());
    }
}

/// Outcome of inserting an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptInsert {
    Inserted,
    /// A processed attempt with the same (payment_id, reported_status,
    /// provider) already exists; the insert was a no-op.
    DuplicateProcessed,
}

/// Durable storage for webhook attempts
#[async_trait]
pub trait WebhookStore: Send + Sync {
    /// Insert an attempt. When the attempt is marked processed with no
    /// error, the unique triple constraint is checked atomically: losing the
    /// race yields [`AttemptInsert::DuplicateProcessed`] instead of a second
    /// row. Unprocessed rows and duplicate markers always insert.
    async fn insert(&self, attempt: &WebhookAttempt) -> AppResult<AttemptInsert>;

    /// Rewrite an existing attempt (processed flag, timestamps, error)
    async fn update(&self, attempt: &WebhookAttempt) -> AppResult<()>;

    /// Look up a successfully processed attempt for the idempotency triple
    async fn find_processed(
        &self,
        payment_id: Uuid,
        reported_status: &str,
        provider: &str,
    ) -> AppResult<Option<WebhookAttempt>>;

    /// Newest-first audit listing
    async fn list(
        &self,
        payment_id: Option<Uuid>,
        provider: Option<&str>,
        limit: i64,
    ) -> AppResult<Vec<WebhookAttempt>>;
}

/// PostgreSQL-backed webhook ledger
///
/// Relies on the partial unique index over
/// (payment_id, reported_status, provider) WHERE processed AND
/// error_message IS NULL declared in the migrations;
/// `ON CONFLICT ... DO NOTHING` turns a lost race into a zero-row insert.
#[derive(Clone)]
pub struct PgWebhookRepository {
    pool: PgPool,
}

impl PgWebhookRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookStore for PgWebhookRepository {
    async fn insert(&self, attempt: &WebhookAttempt) -> AppResult<AttemptInsert> {
        let result = sqlx::query(
            r#"
            INSERT INTO webhook_attempts (
                id, payment_id, reported_status, provider, raw_headers, raw_body,
                signature_verified, processed, processed_at, error_message, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (payment_id, reported_status, provider)
            WHERE processed AND error_message IS NULL
            DO NOTHING
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.payment_id)
        .bind(&attempt.reported_status)
        .bind(&attempt.provider)
        .bind(&attempt.raw_headers)
        .bind(&attempt.raw_body)
        .bind(attempt.signature_verified)
        .bind(attempt.processed)
        .bind(attempt.processed_at)
        .bind(&attempt.error_message)
        .bind(attempt.created_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            Ok(AttemptInsert::DuplicateProcessed)
        } else {
            Ok(AttemptInsert::Inserted)
        }
    }

    async fn update(&self, attempt: &WebhookAttempt) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE webhook_attempts
            SET processed = $2,
                processed_at = $3,
                error_message = $4
            WHERE id = $1
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.processed)
        .bind(attempt.processed_at)
        .bind(&attempt.error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_processed(
        &self,
        payment_id: Uuid,
        reported_status: &str,
        provider: &str,
    ) -> AppResult<Option<WebhookAttempt>> {
        let attempt = sqlx::query_as::<_, WebhookAttempt>(
            r#"
            SELECT * FROM webhook_attempts
            WHERE payment_id = $1
              AND reported_status = $2
              AND provider = $3
              AND processed
              AND error_message IS NULL
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(payment_id)
        .bind(reported_status)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await?;
        Ok(attempt)
    }

    async fn list(
        &self,
        payment_id: Option<Uuid>,
        provider: Option<&str>,
        limit: i64,
    ) -> AppResult<Vec<WebhookAttempt>> {
        let attempts = sqlx::query_as::<_, WebhookAttempt>(
            r#"
            SELECT * FROM webhook_attempts
            WHERE ($1::uuid IS NULL OR payment_id = $1)
              AND ($2::text IS NULL OR provider = $2)
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(payment_id)
        .bind(provider)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(attempts)
    }
}
