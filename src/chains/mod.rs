//! Chain processor abstraction
//!
//! One [`ChainProcessor`] implementation per supported blockchain, selected
//! through a [`ChainRegistry`] keyed by chain name. Adding a chain means
//! adding a new implementation and a registry entry; the orchestration
//! service never changes.

pub mod ethereum;
pub mod starknet;

pub use ethereum::{EthereumConfig, EthereumProcessor};
pub use starknet::{StarknetConfig, StarknetProcessor};

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AppError, AppResult, DomainError};

/// Static per-chain configuration, consumed at payment creation time
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    pub chain_id: i64,
    pub chain_name: String,
    pub native_currency: String,
    pub required_confirmations: i32,
    pub explorer_url: String,
    pub is_testnet: bool,
}

/// On-chain facts about a verified transaction
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDetails {
    pub block_number: Option<i64>,
    pub from_address: String,
    pub to_address: String,
    pub amount: BigDecimal,
    pub confirmation_count: i32,
}

/// Result of reading the chain's canonical state for a transaction hash.
///
/// "Not found" and "malformed" are not errors: they come back as
/// `is_valid = false` with a human-readable reason. Errors are reserved for
/// infrastructure failures (RPC unreachable).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionVerification {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<TransactionDetails>,
}

impl TransactionVerification {
    pub fn valid(details: TransactionDetails) -> Self {
        Self {
            is_valid: true,
            error: None,
            details: Some(details),
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error: Some(reason.into()),
            details: None,
        }
    }
}

/// Fee estimate for a prospective transfer
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeEstimate {
    pub chain_name: String,
    pub estimated_fee: BigDecimal,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Capability set every supported blockchain must provide
#[async_trait]
pub trait ChainProcessor: Send + Sync {
    /// Read the chain's canonical state for the given hash
    async fn verify_transaction(&self, tx_hash: &str) -> AppResult<TransactionVerification>;

    /// Allocate or derive a deposit address. Pure: no payment-state side
    /// effects.
    async fn generate_address(&self, owner_id: Option<&str>) -> AppResult<String>;

    /// Estimate the fee for sending `amount` to `to_address`. Read-only.
    async fn estimate_fee(
        &self,
        amount: &BigDecimal,
        to_address: &str,
    ) -> AppResult<FeeEstimate>;

    fn chain_config(&self) -> ChainConfig;
}

impl std::fmt::Debug for dyn ChainProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ChainProcessor({})", self.chain_config().chain_name)
    }
}

/// Registry of chain processors keyed by lowercase chain name
#[derive(Clone, Default)]
pub struct ChainRegistry {
    processors: HashMap<String, Arc<dyn ChainProcessor>>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, processor: Arc<dyn ChainProcessor>) {
        let name = processor.chain_config().chain_name.to_lowercase();
        self.processors.insert(name, processor);
    }

    pub fn get(&self, chain_name: &str) -> AppResult<Arc<dyn ChainProcessor>> {
        self.processors
            .get(&chain_name.to_lowercase())
            .cloned()
            .ok_or_else(|| {
                AppError::domain(DomainError::UnsupportedChain {
                    chain_name: chain_name.to_string(),
                })
            })
    }

    pub fn is_supported(&self, chain_name: &str) -> bool {
        self.processors.contains_key(&chain_name.to_lowercase())
    }

    /// Every registered chain's static configuration
    pub fn configs(&self) -> Vec<ChainConfig> {
        let mut configs: Vec<ChainConfig> = self
            .processors
            .values()
            .map(|p| p.chain_config())
            .collect();
        configs.sort_by(|a, b| a.chain_name.cmp(&b.chain_name));
        configs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubProcessor {
        config: ChainConfig,
    }

    #[async_trait]
    impl ChainProcessor for StubProcessor {
        async fn verify_transaction(
            &self,
            _tx_hash: &str,
        ) -> AppResult<TransactionVerification> {
            Ok(TransactionVerification::invalid("stub"))
        }

        async fn generate_address(&self, _owner_id: Option<&str>) -> AppResult<String> {
            Ok("0xstub".to_string())
        }

        async fn estimate_fee(
            &self,
            _amount: &BigDecimal,
            _to_address: &str,
        ) -> AppResult<FeeEstimate> {
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

    fn stub(name: &str) -> Arc<dyn ChainProcessor> {
        Arc::new(StubProcessor {
            config: ChainConfig {
                chain_id: 1,
                chain_name: name.to_string(),
                native_currency: "ETH".to_string(),
                required_confirmations: 3,
                explorer_url: "https://example.org".to_string(),
                is_testnet: false,
            },
        })
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut registry = ChainRegistry::new();
        registry.register(stub("Ethereum"));
        assert!(registry.get("ethereum").is_ok());
        assert!(registry.get("ETHEREUM").is_ok());
        assert!(registry.is_supported("Ethereum"));
    }

    #[test]
    fn unknown_chain_is_unsupported() {
        let registry = ChainRegistry::new();
        let err = registry.get("dogecoin").unwrap_err();
        assert!(err.to_string().contains("unsupported chain"));
    }

    #[test]
    fn configs_enumerates_all_registered_chains() {
        let mut registry = ChainRegistry::new();
        registry.register(stub("starknet"));
        registry.register(stub("ethereum"));
        let names: Vec<String> = registry
            .configs()
            .into_iter()
            .map(|c| c.chain_name)
            .collect();
        assert_eq!(names, vec!["ethereum", "starknet"]);
    }
}
