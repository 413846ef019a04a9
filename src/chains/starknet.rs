//! Starknet chain processor
//!
//! Validity-rollup reference implementation. Confirmation semantics differ
//! from an account-model L1: a transaction accepted on L2 is already backed
//! by a validity proof, and acceptance on L1 is final regardless of depth.
//! Block-depth confirmations are still reported so the orchestration layer
//! can treat every chain uniformly.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::{ChainConfig, ChainProcessor, FeeEstimate, TransactionDetails, TransactionVerification};
use crate::error::{AppError, AppErrorKind, AppResult, ExternalError};

const WEI_PER_TOKEN: u64 = 1_000_000_000_000_000_000;
/// Depth treated as settled once a block is proven on L1
const L1_ACCEPTED_CONFIRMATIONS: i32 = 1_000;

#[derive(Debug, Clone)]
pub struct StarknetConfig {
    pub rpc_url: String,
    pub chain_id: i64,
    pub required_confirmations: i32,
    pub explorer_url: String,
    pub is_testnet: bool,
}

impl Default for StarknetConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:5050".to_string(),
            chain_id: 23448594291968334,
            required_confirmations: 1,
            explorer_url: "https://starkscan.co".to_string(),
            is_testnet: false,
        }
    }
}

impl StarknetConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(url) = std::env::var("STARKNET_RPC_URL") {
            cfg.rpc_url = url;
        }
        cfg.required_confirmations = std::env::var("STARKNET_REQUIRED_CONFIRMATIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(cfg.required_confirmations);
        cfg
    }
}

pub struct StarknetProcessor {
    http: reqwest::Client,
    config: StarknetConfig,
}

impl StarknetProcessor {
    pub fn new(config: StarknetConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn rpc_error(&self, message: impl Into<String>) -> AppError {
        AppError::new(AppErrorKind::External(ExternalError::ChainRpc {
            chain: "starknet".to_string(),
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
        let envelope = self.rpc_call("starknet_blockNumber", json!([])).await?;
        envelope
            .get("result")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| self.rpc_error("starknet_blockNumber returned no result"))
    }
}

#[async_trait]
impl ChainProcessor for StarknetProcessor {
    async fn verify_transaction(&self, tx_hash: &str) -> AppResult<TransactionVerification> {
        if !is_valid_felt_hash(tx_hash) {
            return Ok(TransactionVerification::invalid(format!(
                "malformed transaction hash: {}",
                tx_hash
            )));
        }

        let envelope = self
            .rpc_call("starknet_getTransactionReceipt", json!([tx_hash]))
            .await?;
        if let Some(err) = envelope.get("error") {
            // TXN_HASH_NOT_FOUND comes back as an RPC error object
            return Ok(TransactionVerification::invalid(format!(
                "transaction not found: {}",
                err.get("message").and_then(|m| m.as_str()).unwrap_or("unknown error")
            )));
        }
        let receipt = match envelope.get("result") {
            Some(r) if !r.is_null() => r.clone(),
            _ => return Ok(TransactionVerification::invalid("transaction not found")),
        };

        let execution_status = receipt
            .get("execution_status")
            .and_then(|v| v.as_str())
            .unwrap_or("SUCCEEDED");
        if execution_status == "REVERTED" {
            return Ok(TransactionVerification::invalid("transaction reverted"));
        }

        let finality_status = receipt
            .get("finality_status")
            .and_then(|v| v.as_str())
            .unwrap_or("RECEIVED");
        let block_number = receipt.get("block_number").and_then(|v| v.as_i64());

        let confirmation_count = match (finality_status, block_number) {
            // Proven on L1: settled no matter the depth
            ("ACCEPTED_ON_L1", _) => L1_ACCEPTED_CONFIRMATIONS,
            ("ACCEPTED_ON_L2", Some(block)) => {
                let head = self.head_block().await?;
                (head - block + 1).max(0).min(i32::MAX as i64) as i32
            }
            _ => 0,
        };

        // The receipt carries the transfer through the fee-token events; the
        // first Transfer event of an invoke is the payment itself
        let (from_address, to_address, amount) = extract_transfer(&receipt);

        Ok(TransactionVerification::valid(TransactionDetails {
            block_number,
            from_address,
            to_address,
            amount,
            confirmation_count,
        }))
    }

    async fn generate_address(&self, owner_id: Option<&str>) -> AppResult<String> {
        let seed = match owner_id {
            Some(owner) => format!("starknet:{}", owner),
            None => format!("starknet:{}", Uuid::new_v4()),
        };
        let digest = Sha256::digest(seed.as_bytes());
        // Field elements are at most 252 bits; mask the top byte
        let mut bytes = digest.to_vec();
        bytes[0] &= 0x07;
        Ok(format!("0x{}", hex::encode(bytes)))
    }

    async fn estimate_fee(
        &self,
        _amount: &BigDecimal,
        _to_address: &str,
    ) -> AppResult<FeeEstimate> {
        let envelope = self
            .rpc_call("starknet_getBlockWithTxHashes", json!(["latest"]))
            .await?;
        let gas_price_wei = envelope
            .get("result")
            .and_then(|r| r.get("l1_gas_price"))
            .and_then(|p| p.get("price_in_wei"))
            .and_then(|v| v.as_str())
            .and_then(parse_felt_u128)
            .ok_or_else(|| self.rpc_error("latest block carried no l1 gas price"))?;

        // A plain transfer invoke consumes a near-constant amount of L1 gas
        let fee_wei = gas_price_wei.saturating_mul(1_200);
        Ok(FeeEstimate {
            chain_name: "starknet".to_string(),
            estimated_fee: fri_to_token(fee_wei),
            currency: "STRK".to_string(),
            details: Some(json!({
                "l1GasPriceWei": gas_price_wei.to_string(),
            })),
        })
    }

    fn chain_config(&self) -> ChainConfig {
        ChainConfig {
            chain_id: self.config.chain_id,
            chain_name: "starknet".to_string(),
            native_currency: "STRK".to_string(),
            required_confirmations: self.config.required_confirmations,
            explorer_url: self.config.explorer_url.clone(),
            is_testnet: self.config.is_testnet,
        }
    }
}

/// Pull sender, recipient, and amount out of the receipt's first Transfer
/// event. Starknet value transfers are ERC-20 calls on the token contract,
/// so the payment shows up as an event, not a top-level value field.
fn extract_transfer(receipt: &serde_json::Value) -> (String, String, BigDecimal) {
    let events = receipt.get("events").and_then(|e| e.as_array());
    if let Some(events) = events {
        for event in events {
            let keys = event.get("keys").and_then(|k| k.as_array());
            let data = event.get("data").and_then(|d| d.as_array());
            if let (Some(_keys), Some(data)) = (keys, data) {
                if data.len() >= 3 {
                    let from = data[0].as_str().unwrap_or_default().to_lowercase();
                    let to = data[1].as_str().unwrap_or_default().to_lowercase();
                    let amount = data[2]
                        .as_str()
                        .and_then(parse_felt_u128)
                        .map(fri_to_token)
                        .unwrap_or_else(|| BigDecimal::from(0));
                    return (from, to, amount);
                }
            }
        }
    }
    (String::new(), String::new(), BigDecimal::from(0))
}

/// 0x-prefixed felt, 1 to 64 hex digits
pub fn is_valid_felt_hash(hash: &str) -> bool {
    let Some(digits) = hash.strip_prefix("0x") else {
        return false;
    };
    !digits.is_empty() && digits.len() <= 64 && digits.chars().all(|c| c.is_ascii_hexdigit())
}

fn parse_felt_u128(hex: &str) -> Option<u128> {
    u128::from_str_radix(hex.trim_start_matches("0x"), 16).ok()
}

fn fri_to_token(fri: u128) -> BigDecimal {
    BigDecimal::from(fri) / BigDecimal::from(WEI_PER_TOKEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn felt_hash_validation() {
        assert!(is_valid_felt_hash("0x1"));
        assert!(is_valid_felt_hash(
            "0x6a2df841dc4b02677d2b6e2aa61deb2e2fa1d0b6eeffb4eb7ee070f4f3b986e"
        ));
        assert!(!is_valid_felt_hash("0x"));
        assert!(!is_valid_felt_hash("1234"));
        assert!(!is_valid_felt_hash(
            "0x6a2df841dc4b02677d2b6e2aa61deb2e2fa1d0b6eeffb4eb7ee070f4f3b986e11"
        ));
    }

    #[test]
    fn transfer_extraction_from_receipt_events() {
        let receipt = serde_json::json!({
            "events": [{
                "keys": ["0x99cd8bde557814842a3121e8ddfd433a539b8c9f14bf31ebf108d12e6196e9"],
                "data": ["0xabc", "0xdef", "0xde0b6b3a7640000", "0x0"]
            }]
        });
        let (from, to, amount) = extract_transfer(&receipt);
        assert_eq!(from, "0xabc");
        assert_eq!(to, "0xdef");
        assert_eq!(amount, BigDecimal::from(1));
    }

    #[test]
    fn receipt_without_events_yields_zero_amount() {
        let receipt = serde_json::json!({ "events": [] });
        let (from, to, amount) = extract_transfer(&receipt);
        assert!(from.is_empty());
        assert!(to.is_empty());
        assert_eq!(amount, BigDecimal::from(0));
    }

    #[test]
    fn l2_acceptance_needs_one_confirmation_by_default() {
        let cfg = StarknetConfig::default();
        assert_eq!(cfg.required_confirmations, 1);
    }
}
