//! Business logic services
//!
//! The payment service drives the active verification path (we poll the
//! chain); the webhook service drives the passive path (providers push
//! status changes at us). Both converge on the same payment record and both
//! go through its state machine.

pub mod payment_service;
pub mod webhook_service;

pub use payment_service::{CreatePaymentRequest, PaymentService, VerifyPaymentRequest};
pub use webhook_service::{
    extract_provider_from_headers, SignatureCheck, WebhookConfig, WebhookOutcome, WebhookPayload,
    WebhookService,
};
