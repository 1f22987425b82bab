//! Chain integration boundary.
//!
//! Defines the `ChainGateway` and `BalanceSource` traits the engine talks
//! to, plus implementations for:
//! - an `alloy` HTTP provider against an EVM node (production)
//! - a fixed vault balance (demo)

pub mod rpc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use crate::types::{BlockContext, Receipt, StrategyProposal};

pub use rpc::RpcChainClient;

/// Submits strategies on-chain.
///
/// Implementors bound every call with a timeout; the engine never retries
/// inside a cycle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Chain id and head block the submission is built against.
    async fn block_context(&self) -> Result<BlockContext>;

    /// Submit a proposal and wait for its receipt.
    async fn submit(&self, proposal: &StrategyProposal, context: &BlockContext) -> Result<Receipt>;
}

/// Reports how much of the vault asset is available to lend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn available_balance(&self) -> Result<u128>;
}

/// A balance that never changes. Used in demo mode in place of the vault.
#[derive(Debug, Clone, Copy)]
pub struct FixedBalance(pub u128);

#[async_trait]
impl BalanceSource for FixedBalance {
    async fn available_balance(&self) -> Result<u128> {
        Ok(self.0)
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Node connection and keeper identity.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    /// Unlocked keeper account the node signs with.
    pub account: String,
    /// Per-request timeout.
    pub request_timeout_secs: u64,
    /// How long to wait for a submitted transaction to be mined.
    pub receipt_timeout_secs: u64,
    pub gas_limit: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            chain_id: 1,
            account: "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".to_string(),
            request_timeout_secs: 10,
            receipt_timeout_secs: 60,
            gas_limit: 500_000,
        }
    }
}

/// Deployed contract addresses.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContractsConfig {
    pub vault: String,
    pub pool: String,
    pub loan_token: String,
}

impl Default for ContractsConfig {
    fn default() -> Self {
        Self {
            vault: String::new(),
            pool: "0x88e6a0c2ddd26feeb64f039a2c41296fcb3f5640".to_string(),
            loan_token: "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_balance() {
        let source = FixedBalance(1_000_000_000_000);
        assert_eq!(source.available_balance().await.unwrap(), 1_000_000_000_000);
    }
}
