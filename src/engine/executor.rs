//! Strategy execution.
//!
//! Two interchangeable engines sit behind `ExecutionEngine`:
//! - `SimulatedExecutor` rolls a success probability derived from the
//!   proposal's size, width and profit target (demo mode)
//! - `LiveExecutor` submits through a `ChainGateway` and maps the receipt
//!   (production mode)
//!
//! Neither engine retries. A failed strategy is retried, if at all, by the
//! next scheduled cycle.

use anyhow::Result;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::Rng;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::chain::ChainGateway;
use crate::types::{amount, format_units, ExecutionOutcome, StrategyProposal};

/// Reasons a simulated strategy may fail, drawn uniformly.
pub const SIMULATED_FAILURE_REASONS: [&str; 5] = [
    "Gas price too high",
    "Insufficient liquidity",
    "Slippage tolerance exceeded",
    "Strategy timeout",
    "Market volatility too high",
];

/// Runs one proposal and reports what happened.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    async fn execute(&self, strategy_id: &str, proposal: &StrategyProposal) -> Result<ExecutionOutcome>;

    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Simulated execution
// ---------------------------------------------------------------------------

/// Success-probability model for simulated execution. Probabilities are in
/// percent.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub base_success_rate: f64,
    #[serde(with = "amount")]
    pub large_loan_threshold: u128,
    pub large_loan_adjustment: f64,
    #[serde(with = "amount")]
    pub small_loan_threshold: u128,
    pub small_loan_adjustment: f64,
    /// Range widths in ticks.
    pub wide_range_threshold: i64,
    pub wide_range_adjustment: f64,
    pub narrow_range_threshold: i64,
    pub narrow_range_adjustment: f64,
    #[serde(with = "amount")]
    pub high_profit_threshold: u128,
    pub high_profit_adjustment: f64,
    #[serde(with = "amount")]
    pub conservative_profit_threshold: u128,
    pub conservative_profit_adjustment: f64,
    pub min_success_rate: f64,
    pub max_success_rate: f64,
    /// Realised profit = expected profit x a uniform draw from this range.
    pub profit_variance_min: f64,
    pub profit_variance_max: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            base_success_rate: 85.0,
            large_loan_threshold: 3_000_000_000,
            large_loan_adjustment: -15.0,
            small_loan_threshold: 600_000_000,
            small_loan_adjustment: 5.0,
            wide_range_threshold: 400_000,
            wide_range_adjustment: -10.0,
            narrow_range_threshold: 100_000,
            narrow_range_adjustment: 5.0,
            high_profit_threshold: 200_000_000,
            high_profit_adjustment: -20.0,
            conservative_profit_threshold: 50_000_000,
            conservative_profit_adjustment: 10.0,
            min_success_rate: 30.0,
            max_success_rate: 98.0,
            profit_variance_min: 0.9,
            profit_variance_max: 1.1,
        }
    }
}

pub struct SimulatedExecutor {
    config: SimulationConfig,
    rng: Mutex<StdRng>,
}

impl SimulatedExecutor {
    pub fn new(config: SimulationConfig, rng: StdRng) -> Self {
        Self {
            config,
            rng: Mutex::new(rng),
        }
    }

    /// Chance of success for a proposal, in percent, clamped to the
    /// configured bounds.
    pub fn success_probability(&self, proposal: &StrategyProposal) -> f64 {
        let c = &self.config;
        let mut p = c.base_success_rate;

        if proposal.loan_amount > c.large_loan_threshold {
            p += c.large_loan_adjustment;
        } else if proposal.loan_amount < c.small_loan_threshold {
            p += c.small_loan_adjustment;
        }

        let width = proposal.width();
        if width > c.wide_range_threshold {
            p += c.wide_range_adjustment;
        } else if width < c.narrow_range_threshold {
            p += c.narrow_range_adjustment;
        }

        if proposal.expected_profit > c.high_profit_threshold {
            p += c.high_profit_adjustment;
        } else if proposal.expected_profit < c.conservative_profit_threshold {
            p += c.conservative_profit_adjustment;
        }

        p.clamp(c.min_success_rate, c.max_success_rate)
    }
}

#[async_trait]
impl ExecutionEngine for SimulatedExecutor {
    async fn execute(&self, strategy_id: &str, proposal: &StrategyProposal) -> Result<ExecutionOutcome> {
        let started = Instant::now();
        let probability = self.success_probability(proposal);

        // One lock for all draws so concurrent callers cannot interleave.
        let (roll, variance, reason_index) = {
            let mut rng = self.rng.lock().await;
            let roll = rng.gen::<f64>() * 100.0;
            let variance = rng.gen_range(self.config.profit_variance_min..=self.config.profit_variance_max);
            let reason_index = rng.gen_range(0..SIMULATED_FAILURE_REASONS.len());
            (roll, variance, reason_index)
        };

        debug!(strategy_id, probability, roll, "Simulated execution roll");
        let elapsed = started.elapsed().as_millis() as u64;

        if roll < probability {
            let pct = (variance * 100.0).floor().max(0.0) as u128;
            let realized = proposal.expected_profit.saturating_mul(pct) / 100;
            let tx_hash = format!("0x{}", uuid::Uuid::new_v4().simple());

            info!(
                strategy_id,
                realized_profit = %format_units(realized, 6),
                gas_used = proposal.gas_estimate,
                tx_hash = %tx_hash,
                "Simulated strategy succeeded"
            );
            Ok(ExecutionOutcome::success(
                strategy_id,
                realized,
                proposal.gas_estimate,
                elapsed,
                Some(tx_hash),
            ))
        } else {
            let reason = SIMULATED_FAILURE_REASONS[reason_index];
            warn!(strategy_id, reason, "Simulated strategy failed");
            Ok(ExecutionOutcome::failure(strategy_id, reason, elapsed))
        }
    }

    fn name(&self) -> &str {
        "simulated"
    }
}

// ---------------------------------------------------------------------------
// Live execution
// ---------------------------------------------------------------------------

pub struct LiveExecutor {
    gateway: Arc<dyn ChainGateway>,
}

impl LiveExecutor {
    pub fn new(gateway: Arc<dyn ChainGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl ExecutionEngine for LiveExecutor {
    async fn execute(&self, strategy_id: &str, proposal: &StrategyProposal) -> Result<ExecutionOutcome> {
        let started = Instant::now();
        let context = self.gateway.block_context().await?;

        info!(strategy_id, block = context.block_number, %proposal, "Submitting strategy");

        let outcome = match self.gateway.submit(proposal, &context).await {
            Ok(receipt) if receipt.succeeded => {
                let elapsed = started.elapsed().as_millis() as u64;
                info!(
                    strategy_id,
                    tx_hash = %receipt.tx_hash,
                    block = receipt.block_number,
                    gas_used = receipt.gas_used,
                    "Strategy executed on-chain"
                );
                ExecutionOutcome::success(
                    strategy_id,
                    proposal.expected_profit,
                    receipt.gas_used,
                    elapsed,
                    Some(receipt.tx_hash),
                )
            }
            Ok(receipt) => {
                let elapsed = started.elapsed().as_millis() as u64;
                warn!(strategy_id, tx_hash = %receipt.tx_hash, "Strategy transaction reverted");
                let mut outcome = ExecutionOutcome::failure(strategy_id, "transaction reverted", elapsed);
                outcome.gas_used = receipt.gas_used;
                outcome.tx_hash = Some(receipt.tx_hash);
                outcome
            }
            Err(e) => {
                let elapsed = started.elapsed().as_millis() as u64;
                warn!(strategy_id, error = %e, "Strategy submission failed");
                ExecutionOutcome::failure(strategy_id, format!("{e:#}"), elapsed)
            }
        };

        Ok(outcome)
    }

    fn name(&self) -> &str {
        "live"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
