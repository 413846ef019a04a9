//! Application error types
//!
//! Every error carries a kind (domain, validation, external, infrastructure),
//! a machine-readable code, an HTTP status, and a user-facing message. Domain
//! errors are non-retryable 4xx; infrastructure and external failures surface
//! as retryable 5xx.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Machine-readable error codes exposed in API responses
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    UnsupportedChain,
    ChainMismatch,
    InvalidTransaction,
    AmountMismatch,
    AddressMismatch,
    PaymentNotFound,
    InvalidWebhookStatus,
    InvalidWebhookSignature,
    InvalidRequest,
    DatabaseError,
    ChainRpcError,
    ConfigurationError,
    InternalError,
}

/// Business-rule violations surfaced to the caller as 4xx
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("unsupported chain: {chain_name}")]
    UnsupportedChain { chain_name: String },

    #[error("chain mismatch: payment is on {expected}, request said {provided}")]
    ChainMismatch { expected: String, provided: String },

    #[error("invalid transaction: {reason}")]
    InvalidTransaction { reason: String },

    #[error("amount mismatch: expected at least {expected}, on-chain amount is {actual}")]
    AmountMismatch { expected: String, actual: String },

    #[error("address mismatch: expected {expected}, on-chain recipient is {actual}")]
    AddressMismatch { expected: String, actual: String },

    #[error("payment not found: {payment_id}")]
    PaymentNotFound { payment_id: String },

    #[error("invalid webhook status: {status}")]
    InvalidWebhookStatus { status: String },

    #[error("invalid webhook signature for provider {provider}")]
    InvalidWebhookSignature { provider: String },
}

/// Request-shape problems caught before any business logic runs
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid amount {amount}: {reason}")]
    InvalidAmount { amount: String, reason: String },

    #[error("missing required field: {field}")]
    MissingField { field: String },

    #[error("invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },
}

/// Failures of services we depend on (chain RPC endpoints)
#[derive(Debug, thiserror::Error)]
pub enum ExternalError {
    #[error("chain RPC error ({chain}): {message}")]
    ChainRpc {
        chain: String,
        message: String,
        is_retryable: bool,
    },
}

/// Failures of our own infrastructure (database, configuration)
#[derive(Debug, thiserror::Error)]
pub enum InfrastructureError {
    #[error("database error: {message}")]
    Database { message: String, is_retryable: bool },

    #[error("configuration error: {message}")]
    Configuration { message: String },
}

/// Error category
#[derive(Debug, thiserror::Error)]
pub enum AppErrorKind {
    #[error(transparent)]
    Domain(DomainError),
    #[error(transparent)]
    Validation(ValidationError),
    #[error(transparent)]
    External(ExternalError),
    #[error(transparent)]
    Infrastructure(InfrastructureError),
}

/// Central application error
#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct AppError {
    pub kind: AppErrorKind,
    message: Option<String>,
    status_override: Option<StatusCode>,
    details: Option<serde_json::Value>,
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            message: None,
            status_override: None,
            details: None,
        }
    }

    pub fn domain(err: DomainError) -> Self {
        Self::new(AppErrorKind::Domain(err))
    }

    pub fn validation(err: ValidationError) -> Self {
        Self::new(AppErrorKind::Validation(err))
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Infrastructure(
            InfrastructureError::Configuration {
                message: message.into(),
            },
        ))
        .with_status_code(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Override the user-facing message (defaults to the error display)
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_status_code(mut self, status: StatusCode) -> Self {
        self.status_override = Some(status);
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::UnsupportedChain { .. } => ErrorCode::UnsupportedChain,
                DomainError::ChainMismatch { .. } => ErrorCode::ChainMismatch,
                DomainError::InvalidTransaction { .. } => ErrorCode::InvalidTransaction,
                DomainError::AmountMismatch { .. } => ErrorCode::AmountMismatch,
                DomainError::AddressMismatch { .. } => ErrorCode::AddressMismatch,
                DomainError::PaymentNotFound { .. } => ErrorCode::PaymentNotFound,
                DomainError::InvalidWebhookStatus { .. } => ErrorCode::InvalidWebhookStatus,
                DomainError::InvalidWebhookSignature { .. } => ErrorCode::InvalidWebhookSignature,
            },
            AppErrorKind::Validation(_) => ErrorCode::InvalidRequest,
            AppErrorKind::External(ExternalError::ChainRpc { .. }) => ErrorCode::ChainRpcError,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
            },
        }
    }

    pub fn status_code(&self) -> StatusCode {
        if let Some(status) = self.status_override {
            return status;
        }
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::PaymentNotFound { .. } => StatusCode::NOT_FOUND,
                DomainError::InvalidWebhookSignature { .. } => StatusCode::UNAUTHORIZED,
                DomainError::AmountMismatch { .. } | DomainError::AddressMismatch { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                _ => StatusCode::BAD_REQUEST,
            },
            AppErrorKind::Validation(_) => StatusCode::BAD_REQUEST,
            AppErrorKind::External(_) => StatusCode::BAD_GATEWAY,
            AppErrorKind::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn user_message(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| self.kind.to_string())
    }

    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(_) | AppErrorKind::Validation(_) => false,
            AppErrorKind::External(ExternalError::ChainRpc { is_retryable, .. }) => *is_retryable,
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Configuration { .. } => false,
            },
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::new(AppErrorKind::Infrastructure(
            InfrastructureError::Database {
                message: err.to_string(),
                is_retryable: true,
            },
        ))
    }
}

/// JSON error envelope returned by every endpoint
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.error_code(),
                message: self.user_message(),
                details: self.details.clone(),
                retry_after: if self.is_retryable() { Some(10) } else { None },
            },
        };
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
