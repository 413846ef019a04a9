//! In-memory store implementations
//!
//! Back the integration tests and local development without a Postgres
//! instance. The webhook store enforces the idempotency triple under its
//! lock, giving the same atomic insert-or-detect-conflict behavior as the
//! partial unique index in the Postgres implementation.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::payment_repository::{PaymentFilters, PaymentRecord, PaymentStore};
use super::webhook_repository::{AttemptInsert, WebhookAttempt, WebhookStore};
use crate::error::AppResult;

#[derive(Clone, Default)]
pub struct InMemoryPaymentStore {
    records: Arc<RwLock<Vec<PaymentRecord>>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert(&self, record: &PaymentRecord) -> AppResult<()> {
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<PaymentRecord>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn update(&self, record: &PaymentRecord) -> AppResult<()> {
        let mut records = self.records.write().await;
        if let Some(existing) = records.iter_mut().find(|r| r.id == record.id) {
            *existing = record.clone();
        }
        Ok(())
    }

    async fn find_by_owner(
        &self,
        owner_id: &str,
        filters: &PaymentFilters,
    ) -> AppResult<Vec<PaymentRecord>> {
        let records = self.records.read().await;
        let mut matched: Vec<PaymentRecord> = records
            .iter()
            .filter(|r| r.owner_id == owner_id)
            .filter(|r| filters.status.map_or(true, |s| r.status == s))
            .filter(|r| {
                filters
                    .chain_name
                    .as_deref()
                    .map_or(true, |c| r.chain_name == c)
            })
            .filter(|r| {
                filters
                    .payment_type
                    .as_deref()
                    .map_or(true, |t| r.payment_type == t)
            })
            .filter(|r| filters.start_date.map_or(true, |d| r.created_at >= d))
            .filter(|r| filters.end_date.map_or(true, |d| r.created_at <= d))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matched)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryWebhookStore {
    attempts: Arc<RwLock<Vec<WebhookAttempt>>>,
}

impl InMemoryWebhookStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WebhookStore for InMemoryWebhookStore {
    async fn insert(&self, attempt: &WebhookAttempt) -> AppResult<AttemptInsert> {
        let mut attempts = self.attempts.write().await;
        // Applied attempts (processed, no error) are unique per triple
        if attempt.processed && attempt.error_message.is_none() {
            let conflict = attempts.iter().any(|a| {
                a.processed
                    && a.error_message.is_none()
                    && a.payment_id == attempt.payment_id
                    && a.reported_status == attempt.reported_status
                    && a.provider == attempt.provider
            });
            if conflict {
                return Ok(AttemptInsert::DuplicateProcessed);
            }
        }
        attempts.push(attempt.clone());
        Ok(AttemptInsert::Inserted)
    }

    async fn update(&self, attempt: &WebhookAttempt) -> AppResult<()> {
        let mut attempts = self.attempts.write().await;
        if let Some(existing) = attempts.iter_mut().find(|a| a.id == attempt.id) {
            *existing = attempt.clone();
        }
        Ok(())
    }

    async fn find_processed(
        &self,
        payment_id: Uuid,
        reported_status: &str,
        provider: &str,
    ) -> AppResult<Option<WebhookAttempt>> {
        Ok(self
            .attempts
            .read()
            .await
            .iter()
            .find(|a| {
                a.processed
                    && a.error_message.is_none()
                    && a.payment_id == payment_id
                    && a.reported_status == reported_status
                    && a.provider == provider
            })
            .cloned())
    }

    async fn list(
        &self,
        payment_id: Option<Uuid>,
        provider: Option<&str>,
        limit: i64,
    ) -> AppResult<Vec<WebhookAttempt>> {
        let attempts = self.attempts.read().await;
        let mut matched: Vec<WebhookAttempt> = attempts
            .iter()
            .filter(|a| payment_id.map_or(true, |id| a.payment_id == id))
            .filter(|a| provider.map_or(true, |p| a.provider == p))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matched.truncate(limit.max(0) as usize);
        Ok(matched)
    }
}
