//! Strategy calculator.
//!
//! Turns a market snapshot and the vault's available balance into a
//! loan size, tick range, expected profit and gas estimate, or declines
//! when the expected profit misses the minimum threshold.

use rust_decimal::prelude::*;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::market::{MarketConditionsProvider, ETHER, USDC};
use crate::types::{amount, format_units, KeeperError, MarketConditions, StrategyProposal};

const BPS: u128 = 10_000;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Sizing and profitability policy. Loan, balance and profit figures are in
/// vault-asset base units; liquidity and volume thresholds are in the units
/// the market provider reports.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Below this expected profit no strategy is proposed.
    #[serde(with = "amount")]
    pub min_profit: u128,
    #[serde(with = "amount")]
    pub base_profit: u128,

    #[serde(with = "amount")]
    pub base_loan: u128,
    #[serde(with = "amount")]
    pub high_liquidity_loan: u128,
    #[serde(with = "amount")]
    pub low_liquidity_loan: u128,
    #[serde(with = "amount")]
    pub high_liquidity_threshold: u128,
    #[serde(with = "amount")]
    pub low_liquidity_threshold: u128,
    /// Loans are halved above this volatility.
    pub loan_halving_volatility: f64,
    /// Share of the available balance a loan may use.
    pub max_utilization_bps: u32,

    /// Half-width of the tick range around the current tick.
    pub base_half_width: i64,
    pub wide_range_volatility: f64,
    pub narrow_range_volatility: f64,
    pub current_tick: i64,

    /// Volatility above which the profit multiplier gains `volatility * volatility_profit_weight`.
    pub profit_volatility_threshold: f64,
    pub volatility_profit_weight: f64,
    #[serde(with = "amount")]
    pub profit_liquidity_threshold: u128,
    pub liquidity_profit_bonus: f64,
    #[serde(with = "amount")]
    pub profit_volume_threshold: u128,
    pub volume_profit_bonus: f64,
    pub max_profit_multiplier: f64,
    /// Profit earned per unit of loan, in basis points.
    pub loan_profit_bps: u32,

    pub base_gas: u64,
    pub gas_volatility_threshold: f64,
    pub high_volatility_gas: u64,
    pub low_liquidity_gas: u64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            min_profit: 100_000,  // 0.1 USDC
            base_profit: 200_000, // 0.2 USDC

            base_loan: 1_000 * USDC,
            high_liquidity_loan: 4_000 * USDC,
            low_liquidity_loan: 200 * USDC,
            high_liquidity_threshold: 10_000 * ETHER,
            low_liquidity_threshold: 1_000 * ETHER,
            loan_halving_volatility: 0.2,
            max_utilization_bps: 8_000, // 80% of balance

            base_half_width: 200_000,
            wide_range_volatility: 0.15,
            narrow_range_volatility: 0.05,
            current_tick: 0,

            profit_volatility_threshold: 0.1,
            volatility_profit_weight: 0.1,
            profit_liquidity_threshold: 5_000 * ETHER,
            liquidity_profit_bonus: 0.02,
            profit_volume_threshold: 1_000_000 * USDC,
            volume_profit_bonus: 0.01,
            max_profit_multiplier: 2.0,
            loan_profit_bps: 10,

            base_gas: 150_000,
            gas_volatility_threshold: 0.1,
            high_volatility_gas: 50_000,
            low_liquidity_gas: 30_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Calculator
// ---------------------------------------------------------------------------

pub struct StrategyCalculator {
    config: StrategyConfig,
    loan_token: String,
    market: Arc<dyn MarketConditionsProvider>,
}

impl StrategyCalculator {
    pub fn new(
        config: StrategyConfig,
        loan_token: impl Into<String>,
        market: Arc<dyn MarketConditionsProvider>,
    ) -> Self {
        Self {
            config,
            loan_token: loan_token.into(),
            market,
        }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Compute the optimal strategy for `venue` given the available balance.
    ///
    /// Returns `None` when the market is unavailable, the strategy is not
    /// profitable enough, or any internal computation fails. Errors never
    /// escape: the cycle is skipped, not aborted.
    pub async fn compute_strategy(
        &self,
        venue: &str,
        available_balance: u128,
    ) -> Option<StrategyProposal> {
        debug!(venue, balance = %format_units(available_balance, 6), "Calculating optimal strategy");

        let conditions = match self.market.snapshot(venue).await {
            Ok(c) => c,
            Err(e) => {
                warn!(venue, error = %e, "No market conditions available");
                return None;
            }
        };

        match self.compute_from_conditions(venue, &conditions, available_balance) {
            Ok(proposal) => proposal,
            Err(e) => {
                error!(venue, error = %e, "Error calculating strategy");
                None
            }
        }
    }

    /// Pure strategy computation against an explicit snapshot.
    pub fn compute_from_conditions(
        &self,
        venue: &str,
        conditions: &MarketConditions,
        available_balance: u128,
    ) -> Result<Option<StrategyProposal>, KeeperError> {
        let loan_amount = self.loan_amount(conditions, available_balance)?;
        let (range_lower, range_upper) = self.tick_range(conditions)?;
        let expected_profit = self.expected_profit(conditions, loan_amount)?;

        if expected_profit < self.config.min_profit {
            info!(
                venue,
                expected_profit = %format_units(expected_profit, 6),
                threshold = %format_units(self.config.min_profit, 6),
                "Strategy not profitable enough"
            );
            return Ok(None);
        }

        let proposal = StrategyProposal {
            venue: venue.to_string(),
            loan_token: self.loan_token.clone(),
            loan_amount,
            range_lower,
            range_upper,
            expected_profit,
            gas_estimate: self.gas_estimate(conditions),
        };

        if proposal.range_lower >= proposal.range_upper {
            return Err(KeeperError::InvalidProposal(format!(
                "empty range [{}, {}]",
                proposal.range_lower, proposal.range_upper
            )));
        }

        info!(
            venue,
            loan_amount = %format_units(loan_amount, 6),
            tick_range = format!("{range_lower} - {range_upper}"),
            expected_profit = %format_units(expected_profit, 6),
            volatility = format!("{:.3}", conditions.volatility),
            liquidity = %format_units(conditions.liquidity, 18),
            "Strategy calculated"
        );

        Ok(Some(proposal))
    }

    /// Loan size before the balance cap is applied.
    pub fn uncapped_loan(&self, conditions: &MarketConditions) -> u128 {
        let mut loan = if conditions.liquidity > self.config.high_liquidity_threshold {
            self.config.high_liquidity_loan
        } else if conditions.liquidity < self.config.low_liquidity_threshold {
            self.config.low_liquidity_loan
        } else {
            self.config.base_loan
        };

        if conditions.volatility > self.config.loan_halving_volatility {
            loan /= 2;
        }

        loan
    }

    /// Loan size capped at the utilisation limit of `available_balance`.
    pub fn loan_amount(
        &self,
        conditions: &MarketConditions,
        available_balance: u128,
    ) -> Result<u128, KeeperError> {
        let max_loan = apply_bps(available_balance, self.config.max_utilization_bps)
            .ok_or(KeeperError::Arithmetic("loan cap"))?;

        Ok(self.uncapped_loan(conditions).min(max_loan))
    }

    /// Tick range centred on the current tick.
    pub fn tick_range(&self, conditions: &MarketConditions) -> Result<(i64, i64), KeeperError> {
        let mut half_width = self.config.base_half_width;
        if conditions.volatility > self.config.wide_range_volatility {
            half_width = half_width
                .checked_mul(2)
                .ok_or(KeeperError::Arithmetic("range width"))?;
        } else if conditions.volatility < self.config.narrow_range_volatility {
            half_width /= 2;
        }
        let half_width = half_width.max(1);

        let tick = self.config.current_tick;
        let lower = tick
            .checked_sub(half_width)
            .ok_or(KeeperError::Arithmetic("range lower"))?;
        let upper = tick
            .checked_add(half_width)
            .ok_or(KeeperError::Arithmetic("range upper"))?;
        Ok((lower, upper))
    }

    /// Bounded multiplier applied to the base profit.
    pub fn profit_multiplier(&self, conditions: &MarketConditions) -> f64 {
        let mut multiplier = 1.0;

        if conditions.volatility.is_finite()
            && conditions.volatility > self.config.profit_volatility_threshold
        {
            multiplier += conditions.volatility * self.config.volatility_profit_weight;
        }
        if conditions.liquidity > self.config.profit_liquidity_threshold {
            multiplier += self.config.liquidity_profit_bonus;
        }
        if conditions.volume_24h > self.config.profit_volume_threshold {
            multiplier += self.config.volume_profit_bonus;
        }

        if !multiplier.is_finite() || multiplier <= 0.0 {
            return 1.0;
        }
        multiplier.min(self.config.max_profit_multiplier)
    }

    /// Scaled base profit plus a term proportional to the loan.
    pub fn expected_profit(
        &self,
        conditions: &MarketConditions,
        loan_amount: u128,
    ) -> Result<u128, KeeperError> {
        // Resolved to 1e-6 so float noise cannot shave a unit off the result.
        let multiplier = Decimal::from_f64(self.profit_multiplier(conditions))
            .ok_or(KeeperError::Arithmetic("profit multiplier"))?
            .round_dp(6);
        let base = Decimal::from_u128(self.config.base_profit)
            .ok_or(KeeperError::Arithmetic("base profit"))?;
        let adjusted = base
            .checked_mul(multiplier)
            .and_then(|d| d.trunc().to_u128())
            .ok_or(KeeperError::Arithmetic("adjusted profit"))?;

        let loan_profit = apply_bps(loan_amount, self.config.loan_profit_bps)
            .ok_or(KeeperError::Arithmetic("loan profit"))?;

        adjusted
            .checked_add(loan_profit)
            .ok_or(KeeperError::Arithmetic("expected profit"))
    }

    /// Additive gas estimate.
    pub fn gas_estimate(&self, conditions: &MarketConditions) -> u64 {
        let mut gas = self.config.base_gas;
        if conditions.volatility > self.config.gas_volatility_threshold {
            gas = gas.saturating_add(self.config.high_volatility_gas);
        }
        if conditions.liquidity < self.config.low_liquidity_threshold {
            gas = gas.saturating_add(self.config.low_liquidity_gas);
        }
        gas
    }
}

/// `amount * bps / 10_000`, floored, without forming the full product.
pub fn apply_bps(amount: u128, bps: u32) -> Option<u128> {
    let bps = u128::from(bps);
    (amount / BPS)
        .checked_mul(bps)?
        .checked_add(amount % BPS * bps / BPS)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
