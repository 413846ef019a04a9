//! Ethereum chain processor
//!
//! Account-model reference implementation. Talks JSON-RPC to an Ethereum
//! node: `eth_getTransactionByHash` for the transfer itself,
//! `eth_getTransactionReceipt` for inclusion and execution status, and
//! `eth_blockNumber` for the confirmation count.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::{ChainConfig, ChainProcessor, FeeEstimate, TransactionDetails, TransactionVerification};
use crate::error::{AppError, AppErrorKind, AppResult, ExternalError};

const WEI_PER_ETH: u64 = 1_000_000_000_000_000_000;
/// Gas used by a plain value transfer
const TRANSFER_GAS: u64 = 21_000;

#[derive(Debug, Clone)]
pub struct EthereumConfig {
    pub rpc_url: String,
    pub chain_id: i64,
    pub required_confirmations: i32,
    pub explorer_url: String,
    pub is_testnet: bool,
}

impl Default for EthereumConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            chain_id: 1,
            required_confirmations: 12,
            explorer_url: "https://etherscan.io".to_string(),
            is_testnet: false,
        }
    }
}

impl EthereumConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(url) = std::env::var("ETHEREUM_RPC_URL") {
            cfg.rpc_url = url;
        }
        cfg.chain_id = std::env::var("ETHEREUM_CHAIN_ID")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(cfg.chain_id);
        cfg.required_confirmations = std::env::var("ETHEREUM_REQUIRED_CONFIRMATIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(cfg.required_confirmations);
        cfg
    }
}

pub struct EthereumProcessor {
    http: reqwest::Client,
    config: EthereumConfig,
}

impl EthereumProcessor {
    pub fn new(config: EthereumConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn rpc_error(&self, message: impl Into<String>) -> AppError {
        AppError::new(AppErrorKind::External(ExternalError::ChainRpc {
            chain: "ethereum".to_string(),
            message: message.into(),
            is_retryable: true,
        }))
    }

    async fn rpc_call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> AppResult<serde_json::Value> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self
            .http
            .post(&self.config.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.rpc_error(format!("{} request failed: {}", method, e)))?;
        let envelope: serde_json::Value = response
            .json()
            .await
            .map_err(|e| self.rpc_error(format!("{} returned invalid JSON: {}", method, e)))?;
        Ok(envelope)
    }

    async fn head_block(&self) -> AppResult<i64> {
        let envelope = self.rpc_call("eth_blockNumber", json!([])).await?;
        let hex = envelope
            .get("result")
            .and_then(|v| v.as_str())
            .ok_or_else(|| self.rpc_error("eth_blockNumber returned no result"))?;
        parse_hex_quantity(hex)
            .map(|n| n as i64)
            .ok_or_else(|| self.rpc_error(format!("bad block number: {}", hex)))
    }
}

#[async_trait]
impl ChainProcessor for EthereumProcessor {
    async fn verify_transaction(&self, tx_hash: &str) -> AppResult<TransactionVerification> {
        if !is_valid_tx_hash(tx_hash) {
            return Ok(TransactionVerification::invalid(format!(
                "malformed transaction hash: {}",
                tx_hash
            )));
        }

        let envelope = self
            .rpc_call("eth_getTransactionByHash", json!([tx_hash]))
            .await?;
        if let Some(err) = envelope.get("error") {
            // The node rejected the request itself; treat as an invalid hash,
            // not an infrastructure failure
            return Ok(TransactionVerification::invalid(format!(
                "node rejected hash: {}",
                err.get("message").and_then(|m| m.as_str()).unwrap_or("unknown error")
            )));
        }
        let tx = match envelope.get("result") {
            Some(tx) if !tx.is_null() => tx.clone(),
            _ => return Ok(TransactionVerification::invalid("transaction not found")),
        };

        let from_address = tx
            .get("from")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_lowercase();
        let to_address = tx
            .get("to")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_lowercase();
        let amount = tx
            .get("value")
            .and_then(|v| v.as_str())
            .and_then(parse_hex_u128)
            .map(wei_to_eth)
            .unwrap_or_else(|| BigDecimal::from(0));

        // Receipt only exists once the transaction is mined
        let receipt_envelope = self
            .rpc_call("eth_getTransactionReceipt", json!([tx_hash]))
            .await?;
        let receipt = receipt_envelope.get("result").cloned();

        let (block_number, confirmation_count) = match receipt.as_ref().filter(|r| !r.is_null()) {
            Some(receipt) => {
                let status = receipt.get("status").and_then(|v| v.as_str());
                if status == Some("0x0") {
                    return Ok(TransactionVerification::invalid("transaction reverted"));
                }
                let block = receipt
                    .get("blockNumber")
                    .and_then(|v| v.as_str())
                    .and_then(parse_hex_quantity)
                    .map(|n| n as i64);
                let confirmations = match block {
                    Some(block) => {
                        let head = self.head_block().await?;
                        (head - block + 1).max(0).min(i32::MAX as i64) as i32
                    }
                    None => 0,
                };
                (block, confirmations)
            }
            // Known to the mempool but not yet mined
            None => (None, 0),
        };

        Ok(TransactionVerification::valid(TransactionDetails {
            block_number,
            from_address,
            to_address,
            amount,
            confirmation_count,
        }))
    }

    async fn generate_address(&self, owner_id: Option<&str>) -> AppResult<String> {
        // Deterministic derivation seed; a production deployment plugs an HD
        // wallet in here
        let seed = match owner_id {
            Some(owner) => format!("ethereum:{}", owner),
            None => format!("ethereum:{}", Uuid::new_v4()),
        };
        let digest = Sha256::digest(seed.as_bytes());
        Ok(format!("0x{}", hex::encode(&digest[digest.len() - 20..])))
    }

    async fn estimate_fee(
        &self,
        _amount: &BigDecimal,
        _to_address: &str,
    ) -> AppResult<FeeEstimate> {
        let envelope = self.rpc_call("eth_gasPrice", json!([])).await?;
        let gas_price_wei = envelope
            .get("result")
            .and_then(|v| v.as_str())
            .and_then(parse_hex_u128)
            .ok_or_else(|| self.rpc_error("eth_gasPrice returned no result"))?;

        let fee_wei = gas_price_wei.saturating_mul(TRANSFER_GAS as u128);
        Ok(FeeEstimate {
            chain_name: "ethereum".to_string(),
            estimated_fee: wei_to_eth(fee_wei),
            currency: "ETH".to_string(),
            details: Some(json!({
                "gasPriceWei": gas_price_wei.to_string(),
                "gasLimit": TRANSFER_GAS,
            })),
        })
    }

    fn chain_config(&self) -> ChainConfig {
        ChainConfig {
            chain_id: self.config.chain_id,
            chain_name: "ethereum".to_string(),
            native_currency: "ETH".to_string(),
            required_confirmations: self.config.required_confirmations,
            explorer_url: self.config.explorer_url.clone(),
            is_testnet: self.config.is_testnet,
        }
    }
}

/// 0x-prefixed, exactly 32 bytes of hex
pub fn is_valid_tx_hash(hash: &str) -> bool {
    hash.len() == 66
        && hash.starts_with("0x")
        && hash[2..].chars().all(|c| c.is_ascii_hexdigit())
}

fn parse_hex_quantity(hex: &str) -> Option<u64> {
    u64::from_str_radix(hex.trim_start_matches("0x"), 16).ok()
}

fn parse_hex_u128(hex: &str) -> Option<u128> {
    u128::from_str_radix(hex.trim_start_matches("0x"), 16).ok()
}

fn wei_to_eth(wei: u128) -> BigDecimal {
    BigDecimal::from(wei) / BigDecimal::from(WEI_PER_ETH)
}
