//! Shared types for the keeper.
//!
//! These types form the data model passed between the market, strategy,
//! engine and dashboard modules. Token amounts are base-unit integers held
//! as `u128` and serialised as decimal strings so JSON consumers never
//! round them.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Market conditions
// ---------------------------------------------------------------------------

/// Snapshot of a trading venue at a point in time. Recomputed every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketConditions {
    /// Quote price of the pool's base asset.
    pub price: Decimal,
    /// Pool liquidity in 18-decimal base units.
    #[serde(with = "amount")]
    pub liquidity: u128,
    /// Fractional volatility, roughly in [0, 0.3].
    pub volatility: f64,
    /// Rolling 24h volume in 6-decimal base units.
    #[serde(with = "amount")]
    pub volume_24h: u128,
}

impl fmt::Display for MarketConditions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "price={:.2} liquidity={} vol={:.3} volume24h={}",
            self.price,
            format_units(self.liquidity, 18),
            self.volatility,
            format_units(self.volume_24h, 6),
        )
    }
}

// ---------------------------------------------------------------------------
// Strategy proposal
// ---------------------------------------------------------------------------

/// Candidate parameter set for one liquidity-provision action.
///
/// Built once per cycle by the strategy calculator and consumed by the
/// validator and execution engine without modification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyProposal {
    pub venue: String,
    pub loan_token: String,
    #[serde(with = "amount")]
    pub loan_amount: u128,
    pub range_lower: i64,
    pub range_upper: i64,
    #[serde(with = "amount")]
    pub expected_profit: u128,
    pub gas_estimate: u64,
}

impl StrategyProposal {
    /// Width of the price range in ticks.
    pub fn width(&self) -> i64 {
        self.range_upper - self.range_lower
    }
}

impl fmt::Display for StrategyProposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] loan={} range=[{}, {}] profit={} gas={}",
            self.venue,
            format_units(self.loan_amount, 6),
            self.range_lower,
            self.range_upper,
            format_units(self.expected_profit, 6),
            self.gas_estimate,
        )
    }
}

// ---------------------------------------------------------------------------
// Execution outcome
// ---------------------------------------------------------------------------

/// Realised result of executing one proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    pub strategy_id: String,
    pub succeeded: bool,
    #[serde(with = "amount")]
    pub realized_profit: u128,
    pub gas_used: u64,
    pub execution_time_ms: u64,
    pub failure_reason: Option<String>,
    pub tx_hash: Option<String>,
}

impl ExecutionOutcome {
    pub fn success(
        strategy_id: &str,
        realized_profit: u128,
        gas_used: u64,
        execution_time_ms: u64,
        tx_hash: Option<String>,
    ) -> Self {
        Self {
            strategy_id: strategy_id.to_string(),
            succeeded: true,
            realized_profit,
            gas_used,
            execution_time_ms,
            failure_reason: None,
            tx_hash,
        }
    }

    pub fn failure(strategy_id: &str, reason: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            strategy_id: strategy_id.to_string(),
            succeeded: false,
            realized_profit: 0,
            gas_used: 0,
            execution_time_ms,
            failure_reason: Some(reason.into()),
            tx_hash: None,
        }
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.succeeded {
            write!(
                f,
                "{} OK profit={} gas={} in {}ms",
                self.strategy_id,
                format_units(self.realized_profit, 6),
                self.gas_used,
                self.execution_time_ms,
            )
        } else {
            write!(
                f,
                "{} FAILED ({}) in {}ms",
                self.strategy_id,
                self.failure_reason.as_deref().unwrap_or("unknown"),
                self.execution_time_ms,
            )
        }
    }
}

// ---------------------------------------------------------------------------
// Chain context
// ---------------------------------------------------------------------------

/// Chain position a submission is built against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockContext {
    pub chain_id: u64,
    pub block_number: u64,
}

/// What the chain reports back for a submitted strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub tx_hash: String,
    pub block_number: u64,
    pub gas_used: u64,
    pub succeeded: bool,
}

// ---------------------------------------------------------------------------
// Keeper state
// ---------------------------------------------------------------------------

/// Execution mode, fixed at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Demo,
    Production,
}

impl Mode {
    /// Prefix used when minting strategy ids.
    pub fn strategy_prefix(&self) -> &'static str {
        match self {
            Mode::Demo => "demo",
            Mode::Production => "prod",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Demo => write!(f, "demo"),
            Mode::Production => write!(f, "production"),
        }
    }
}

impl FromStr for Mode {
    type Err = KeeperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "demo" | "simulated" => Ok(Mode::Demo),
            "production" | "prod" | "live" => Ok(Mode::Production),
            other => Err(KeeperError::Config(format!("unknown mode: {other}"))),
        }
    }
}

/// Scheduler run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeeperState {
    pub is_running: bool,
    pub mode: Mode,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for the keeper.
#[derive(Debug, thiserror::Error)]
pub enum KeeperError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Arithmetic overflow in {0}")]
    Arithmetic(&'static str),

    #[error("Invalid proposal: {0}")]
    InvalidProposal(String),

    #[error("RPC error ({method}): {message}")]
    Rpc { method: String, message: String },

    #[error("ABI encoding error: {0}")]
    Abi(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Render a base-unit amount with the given number of decimals.
/// Falls back to the raw integer if it does not fit a `Decimal`.
pub fn format_units(amount: u128, decimals: u32) -> String {
    i128::try_from(amount)
        .ok()
        .and_then(|n| Decimal::try_from_i128_with_scale(n, decimals).ok())
        .map(|d| d.normalize().to_string())
        .unwrap_or_else(|| amount.to_string())
}

/// Serde adapter for `u128` amounts: written as a decimal string, read from
/// either a string or a plain integer (TOML integers cannot hold 10^18-scale
/// values, so config files use strings for those).
pub mod amount {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Number(u64),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Text(s) => s.trim().replace('_', "").parse().map_err(de::Error::custom),
            Repr::Number(n) => Ok(u128::from(n)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
