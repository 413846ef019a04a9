//! Application configuration
//!
//! Everything comes from the environment. `DATABASE_URL` is optional: with
//! it the service runs against Postgres, without it state lives in memory,
//! which is what local development and the integration tests use.

use crate::chains::{EthereumConfig, StarknetConfig};
use crate::error::{AppError, AppErrorKind, AppResult, InfrastructureError};
use crate::services::WebhookConfig;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub ethereum: EthereumConfig,
    pub starknet: StarknetConfig,
    pub webhook: WebhookConfig,
}

impl AppConfig {
    pub fn from_env() -> AppResult<Self> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = match std::env::var("PORT") {
            Ok(raw) => raw.parse().map_err(|_| {
                AppError::new(AppErrorKind::Infrastructure(
                    InfrastructureError::Configuration {
                        message: format!("PORT is not a valid port number: {}", raw),
                    },
                ))
            })?,
            Err(_) => 8080,
        };

        Ok(Self {
            host,
            port,
            database_url: std::env::var("DATABASE_URL").ok(),
            ethereum: EthereumConfig::from_env(),
            starknet: StarknetConfig::from_env(),
            webhook: WebhookConfig::from_env(),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
