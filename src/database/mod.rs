//! Persistence layer: payment records and the webhook audit ledger
//!
//! Storage is abstracted behind the [`PaymentStore`] and [`WebhookStore`]
//! traits. The production implementation uses `sqlx::PgPool`; an in-memory
//! implementation backs the integration tests and local development without
//! a database.

pub mod memory;
pub mod payment_repository;
pub mod webhook_repository;

pub use payment_repository::{
    PaymentFilters, PaymentRecord, PaymentStatus, PaymentStore, PgPaymentRepository,
};
pub use webhook_repository::{
    AttemptInsert, PgWebhookRepository, WebhookAttempt, WebhookStore,
};
