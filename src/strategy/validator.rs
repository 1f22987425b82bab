//! Pre-execution strategy checks.
//!
//! The baseline validator accepts every proposal. The risk limits it carries
//! are configured and reported but intentionally not enforced yet; stricter
//! validators plug in behind the same trait.

use serde::Deserialize;
use tracing::debug;

use crate::market::USDC;
use crate::types::{amount, StrategyProposal};

/// Sanity check run between strategy calculation and execution.
pub trait StrategyValidator: Send + Sync {
    fn validate(&self, proposal: &StrategyProposal) -> bool;
}

/// Risk limits defined alongside the strategy policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Largest loan a single strategy may take.
    #[serde(with = "amount")]
    pub max_loan_amount: u128,
    /// Minimum pool liquidity relative to the loan.
    pub min_liquidity_ratio: f64,
    /// Longest a position may stay open, in blocks.
    pub max_position_duration_blocks: u64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_loan_amount: 20_000 * USDC,
            min_liquidity_ratio: 0.1,
            max_position_duration_blocks: 100,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct BaselineValidator {
    risk: RiskConfig,
}

impl BaselineValidator {
    pub fn new(risk: RiskConfig) -> Self {
        Self { risk }
    }

    pub fn risk(&self) -> &RiskConfig {
        &self.risk
    }
}

impl StrategyValidator for BaselineValidator {
    fn validate(&self, proposal: &StrategyProposal) -> bool {
        debug!(
            venue = %proposal.venue,
            loan_amount = %proposal.loan_amount,
            max_loan_amount = %self.risk.max_loan_amount,
            "Validating strategy (baseline policy)"
        );
        true
    }
}
