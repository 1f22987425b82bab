//! Strategy engine: calculation of the per-cycle proposal and the
//! validation gate in front of execution.

pub mod calculator;
pub mod validator;

pub use calculator::{StrategyCalculator, StrategyConfig};
pub use validator::{BaselineValidator, RiskConfig, StrategyValidator};
