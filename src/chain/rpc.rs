//! EVM node client built on an `alloy` HTTP provider.
//!
//! Reads the vault balance through `totalAssets()`, reads the head block,
//! and submits strategies with `eth_sendTransaction` from an account the
//! node has unlocked, then waits for the receipt. Every request carries the
//! configured request timeout and the receipt wait is bounded separately.

use alloy::{
    network::ReceiptResponse,
    primitives::{Address, U256},
    providers::{Provider, ProviderBuilder, RootProvider},
    rpc::types::eth::TransactionRequest,
    sol,
    sol_types::SolCall,
    transports::BoxTransport,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::future::IntoFuture;
use std::time::Duration;
use tracing::{debug, info};

use super::{BalanceSource, ChainGateway, ContractsConfig, NetworkConfig};
use crate::types::{BlockContext, KeeperError, Receipt, StrategyProposal};

sol! {
    /// Keeper-facing surface of the ERC-4626 ammunition vault.
    interface IAmmunitionVault {
        function totalAssets() external view returns (uint256);

        function executeStrategy(
            address pool,
            address loanToken,
            uint256 loanAmount,
            int24 tickLower,
            int24 tickUpper,
            uint256 expectedProfit,
            uint256 blockNumber
        ) external;
    }
}

pub type HttpProvider = RootProvider<BoxTransport>;

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct RpcChainClient {
    provider: HttpProvider,
    network: NetworkConfig,
    account: Address,
    vault: Address,
}

impl RpcChainClient {
    pub fn new(network: NetworkConfig, contracts: ContractsConfig) -> Result<Self> {
        let url: reqwest::Url = network
            .rpc_url
            .parse()
            .with_context(|| format!("Invalid RPC URL {}", network.rpc_url))?;
        let account = parse_address(&network.account).context("Invalid keeper account")?;
        let vault = parse_address(&contracts.vault).context("Invalid vault address")?;

        let provider = ProviderBuilder::new().on_http(url).boxed();

        Ok(Self {
            provider,
            network,
            account,
            vault,
        })
    }

    pub fn rpc_url(&self) -> &str {
        &self.network.rpc_url
    }

    /// Await a provider call under the request timeout, tagging failures
    /// with the RPC method.
    async fn bounded<F, T, E>(&self, method: &str, call: F) -> Result<T>
    where
        F: IntoFuture<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
    {
        let limit = Duration::from_secs(self.network.request_timeout_secs);
        match tokio::time::timeout(limit, call.into_future()).await {
            Ok(result) => result.map_err(|e| {
                KeeperError::Rpc {
                    method: method.to_string(),
                    message: e.to_string(),
                }
                .into()
            }),
            Err(_) => Err(KeeperError::Timeout(format!("{method} response")).into()),
        }
    }

    fn execute_call(proposal: &StrategyProposal, context: &BlockContext) -> Result<Vec<u8>, KeeperError> {
        let call = IAmmunitionVault::executeStrategyCall {
            pool: parse_address(&proposal.venue)?,
            loanToken: parse_address(&proposal.loan_token)?,
            loanAmount: U256::from(proposal.loan_amount),
            tickLower: to_tick(proposal.range_lower)?,
            tickUpper: to_tick(proposal.range_upper)?,
            expectedProfit: U256::from(proposal.expected_profit),
            blockNumber: U256::from(context.block_number),
        };
        Ok(call.abi_encode())
    }
}

fn parse_address(address: &str) -> Result<Address, KeeperError> {
    address
        .parse()
        .map_err(|_| KeeperError::Abi(format!("invalid address: {address}")))
}

const INT24_MIN: i64 = -(1 << 23);
const INT24_MAX: i64 = (1 << 23) - 1;

fn to_tick<T: TryFrom<i64>>(tick: i64) -> Result<T, KeeperError> {
    if !(INT24_MIN..=INT24_MAX).contains(&tick) {
        return Err(KeeperError::Abi(format!("{tick} does not fit int24")));
    }
    T::try_from(tick).map_err(|_| KeeperError::Abi(format!("{tick} does not fit int24")))
}

#[async_trait]
impl ChainGateway for RpcChainClient {
    async fn block_context(&self) -> Result<BlockContext> {
        let block_number = self
            .bounded("eth_blockNumber", self.provider.get_block_number())
            .await?;
        Ok(BlockContext {
            chain_id: self.network.chain_id,
            block_number,
        })
    }

    async fn submit(&self, proposal: &StrategyProposal, context: &BlockContext) -> Result<Receipt> {
        let data = Self::execute_call(proposal, context)?;

        let tx = TransactionRequest::default()
            .from(self.account)
            .to(self.vault)
            .input(data.into())
            .gas_limit(self.network.gas_limit);

        let pending = self
            .bounded("eth_sendTransaction", self.provider.send_transaction(tx))
            .await?;
        let tx_hash = format!("{:?}", pending.tx_hash());
        info!(tx_hash = %tx_hash, block = context.block_number, "Strategy transaction sent");

        let receipt = tokio::time::timeout(
            Duration::from_secs(self.network.receipt_timeout_secs),
            pending.get_receipt(),
        )
        .await
        .map_err(|_| KeeperError::Timeout(format!("receipt of {tx_hash}")))?
        .with_context(|| format!("Failed to fetch receipt of {tx_hash}"))?;

        debug!(tx_hash = %tx_hash, status = receipt.status(), "Receipt received");

        Ok(Receipt {
            tx_hash: format!("{:?}", receipt.transaction_hash),
            block_number: receipt.block_number.unwrap_or(context.block_number),
            gas_used: u64::try_from(receipt.gas_used).context("Gas used out of range")?,
            succeeded: receipt.status(),
        })
    }
}

#[async_trait]
impl BalanceSource for RpcChainClient {
    async fn available_balance(&self) -> Result<u128> {
        let tx = TransactionRequest::default()
            .to(self.vault)
            .input(IAmmunitionVault::totalAssetsCall {}.abi_encode().into());

        let raw = self.bounded("eth_call", self.provider.call(&tx)).await?;
        let assets = IAmmunitionVault::totalAssetsCall::abi_decode_returns(&raw, true)
            .map_err(|e| KeeperError::Abi(format!("totalAssets: {e}")))?
            ._0;
        u128::try_from(assets).map_err(|_| KeeperError::Abi(format!("totalAssets exceeds 128 bits: {assets}")).into())
    }
}
