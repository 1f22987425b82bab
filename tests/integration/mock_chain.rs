//! Mock chain for integration testing.
//!
//! Provides a deterministic `ChainGateway` + `BalanceSource` that mines one
//! block per submission, keeps the vault balance in memory and records
//! every receipt. No node, no network.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use keeper::chain::{BalanceSource, ChainGateway};
use keeper::types::{BlockContext, Receipt, StrategyProposal};

/// An in-memory chain whose failure modes are controllable from test code.
pub struct MockChain {
    chain_id: u64,
    block_number: Arc<Mutex<u64>>,
    vault_balance: Arc<Mutex<u128>>,
    receipts: Arc<Mutex<Vec<Receipt>>>,
    submitted: Arc<Mutex<Vec<StrategyProposal>>>,
    /// If set, every call returns this error.
    force_error: Arc<Mutex<Option<String>>>,
    /// If set, `submit` fails but reads still work.
    submit_error: Arc<Mutex<Option<String>>>,
    /// If set, submissions are mined but revert.
    revert: Arc<Mutex<bool>>,
}

impl MockChain {
    pub fn new(chain_id: u64, vault_balance: u128) -> Self {
        Self {
            chain_id,
            block_number: Arc::new(Mutex::new(1_000)),
            vault_balance: Arc::new(Mutex::new(vault_balance)),
            receipts: Arc::new(Mutex::new(Vec::new())),
            submitted: Arc::new(Mutex::new(Vec::new())),
            force_error: Arc::new(Mutex::new(None)),
            submit_error: Arc::new(Mutex::new(None)),
            revert: Arc::new(Mutex::new(false)),
        }
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    pub fn set_submit_error(&self, msg: &str) {
        *self.submit_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_submit_error(&self) {
        *self.submit_error.lock().unwrap() = None;
    }

    pub fn set_revert(&self, revert: bool) {
        *self.revert.lock().unwrap() = revert;
    }

    pub fn receipts(&self) -> Vec<Receipt> {
        self.receipts.lock().unwrap().clone()
    }

    pub fn submitted(&self) -> Vec<StrategyProposal> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn vault_balance(&self) -> u128 {
        *self.vault_balance.lock().unwrap()
    }

    fn check_error(&self) -> Result<()> {
        match self.force_error.lock().unwrap().as_ref() {
            Some(err) => Err(anyhow!("{}", err)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChainGateway for MockChain {
    async fn block_context(&self) -> Result<BlockContext> {
        self.check_error()?;
        Ok(BlockContext {
            chain_id: self.chain_id,
            block_number: *self.block_number.lock().unwrap(),
        })
    }

    async fn submit(&self, proposal: &StrategyProposal, context: &BlockContext) -> Result<Receipt> {
        self.check_error()?;
        if let Some(err) = self.submit_error.lock().unwrap().as_ref() {
            return Err(anyhow!("{}", err));
        }
        if context.chain_id != self.chain_id {
            return Err(anyhow!("wrong chain id {}", context.chain_id));
        }

        self.submitted.lock().unwrap().push(proposal.clone());

        let block_number = {
            let mut block = self.block_number.lock().unwrap();
            *block += 1;
            *block
        };

        let mut balance = self.vault_balance.lock().unwrap();
        let succeeded = !*self.revert.lock().unwrap() && proposal.loan_amount <= *balance;
        if succeeded {
            *balance += proposal.expected_profit;
        }

        let receipt = Receipt {
            tx_hash: format!("0x{}", Uuid::new_v4().simple()),
            block_number,
            gas_used: if succeeded { proposal.gas_estimate } else { 21_000 },
            succeeded,
        };
        self.receipts.lock().unwrap().push(receipt.clone());

        Ok(receipt)
    }
}

#[async_trait]
impl BalanceSource for MockChain {
    async fn available_balance(&self) -> Result<u128> {
        self.check_error()?;
        Ok(self.vault_balance())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal(loan: u128) -> StrategyProposal {
        StrategyProposal {
            venue: "0xpool".into(),
            loan_token: "0xweth".into(),
            loan_amount: loan,
            range_lower: -200_000,
            range_upper: 200_000,
            expected_profit: 4_000_000,
            gas_estimate: 150_000,
        }
    }

    #[tokio::test]
    async fn test_mock_submit_mines_a_block() {
        let chain = MockChain::new(31337, 10_000_000_000);
        let ctx = chain.block_context().await.unwrap();
        assert_eq!(ctx.block_number, 1_000);

        let receipt = chain.submit(&proposal(1_000_000_000), &ctx).await.unwrap();
        assert!(receipt.succeeded);
        assert_eq!(receipt.block_number, 1_001);
        assert_eq!(receipt.gas_used, 150_000);
        assert_eq!(chain.vault_balance(), 10_004_000_000);
        assert_eq!(chain.receipts().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_oversized_loan_reverts() {
        let chain = MockChain::new(31337, 500);
        let ctx = chain.block_context().await.unwrap();
        let receipt = chain.submit(&proposal(1_000), &ctx).await.unwrap();
        assert!(!receipt.succeeded);
        assert_eq!(chain.vault_balance(), 500);
    }

    #[tokio::test]
    async fn test_mock_forced_error() {
        let chain = MockChain::new(31337, 500);
        chain.set_error("connection refused");
        assert!(chain.block_context().await.is_err());
        assert!(chain.available_balance().await.is_err());

        chain.clear_error();
        assert_eq!(chain.available_balance().await.unwrap(), 500);
    }

    #[tokio::test]
    async fn test_mock_rejects_wrong_chain() {
        let chain = MockChain::new(31337, 10_000_000_000);
        let ctx = BlockContext { chain_id: 1, block_number: 1 };
        let err = chain.submit(&proposal(1), &ctx).await.unwrap_err();
        assert!(err.to_string().contains("wrong chain id"));
    }
}
