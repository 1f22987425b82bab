//! Configuration loading from TOML with environment overrides.
//!
//! Reads `config.toml` into strongly-typed section structs. Every section
//! has defaults, so a partial file (or no file at all) still yields a full
//! configuration. Deployment-specific values (addresses, RPC URL, mode)
//! can be overridden from the environment after loading.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::chain::{ContractsConfig, NetworkConfig};
use crate::engine::{MonitorConfig, SchedulerConfig, SimulationConfig};
use crate::market::{MarketConfig, USDC};
use crate::strategy::{RiskConfig, StrategyConfig};
use crate::types::{amount, KeeperError, Mode};

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub contracts: ContractsConfig,
    pub market: MarketConfig,
    pub strategy: StrategyConfig,
    pub simulation: SimulationConfig,
    pub risk: RiskConfig,
    pub monitoring: MonitorConfig,
    pub scheduler: SchedulerConfig,
    pub demo: DemoConfig,
    pub status: StatusConfig,
}

/// Demo-mode stand-ins for the chain.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Vault balance reported in place of `totalAssets()`.
    #[serde(with = "amount")]
    pub vault_balance: u128,
    /// Seed for the market and execution RNGs. Random when unset.
    pub seed: Option<u64>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            vault_balance: 1_000_000 * USDC,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8001,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            info!(path, "No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), KeeperError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), KeeperError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DEMO_MODE") {
            self.scheduler.mode = if parse::<bool>("DEMO_MODE", &v)? {
                Mode::Demo
            } else {
                Mode::Production
            };
        }
        if let Some(v) = lookup("RPC_URL") {
            self.network.rpc_url = v;
        }
        if let Some(v) = lookup("CHAIN_ID") {
            self.network.chain_id = parse("CHAIN_ID", &v)?;
        }
        if let Some(v) = lookup("KEEPER_ACCOUNT") {
            self.network.account = v;
        }
        if let Some(v) = lookup("AMMUNITION_VAULT_ADDRESS") {
            self.contracts.vault = v;
        }
        if let Some(v) = lookup("POOL_ADDRESS") {
            self.contracts.pool = v;
        }
        if let Some(v) = lookup("LOAN_TOKEN_ADDRESS") {
            self.contracts.loan_token = v;
        }
        if let Some(v) = lookup("CIRCUIT_BREAKER_THRESHOLD") {
            self.monitoring.circuit_breaker_threshold = parse("CIRCUIT_BREAKER_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("EVENT_INTERVAL") {
            self.scheduler.demo_interval_secs = parse("EVENT_INTERVAL", &v)?;
        }
        if let Some(v) = lookup("STATUS_PORT") {
            self.status.port = parse("STATUS_PORT", &v)?;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.monitoring.log_level = v.to_lowercase();
        }
        Ok(())
    }

    /// Reject thresholds the keeper cannot run with.
    pub fn validate(&self) -> Result<(), KeeperError> {
        let s = &self.scheduler;
        if s.demo_interval_secs == 0 || s.production_interval_secs == 0 {
            return Err(KeeperError::Config("scheduler intervals must be positive".into()));
        }
        if self.monitoring.circuit_breaker_threshold == 0 {
            return Err(KeeperError::Config("circuit_breaker_threshold must be at least 1".into()));
        }

        let m = &self.market;
        if !(m.jitter_min > 0.0 && m.jitter_min <= m.jitter_max && m.jitter_max.is_finite()) {
            return Err(KeeperError::Config(format!(
                "market jitter bounds invalid: [{}, {}]",
                m.jitter_min, m.jitter_max
            )));
        }

        let st = &self.strategy;
        if st.max_utilization_bps == 0 || st.max_utilization_bps > 10_000 {
            return Err(KeeperError::Config(format!(
                "max_utilization_bps must be in (0, 10000], got {}",
                st.max_utilization_bps
            )));
        }
        if st.base_half_width <= 0 {
            return Err(KeeperError::Config("base_half_width must be positive".into()));
        }

        let sim = &self.simulation;
        let rates_finite = sim.min_success_rate.is_finite() && sim.max_success_rate.is_finite();
        if !rates_finite || sim.min_success_rate > sim.max_success_rate {
            return Err(KeeperError::Config(format!(
                "success rate clamp inverted: [{}, {}]",
                sim.min_success_rate, sim.max_success_rate
            )));
        }
        if !(sim.profit_variance_min >= 0.0
            && sim.profit_variance_min <= sim.profit_variance_max
            && sim.profit_variance_max.is_finite())
        {
            return Err(KeeperError::Config(format!(
                "profit variance bounds invalid: [{}, {}]",
                sim.profit_variance_min, sim.profit_variance_max
            )));
        }

        if s.mode == Mode::Production && self.contracts.vault.is_empty() {
            return Err(KeeperError::Config(
                "production mode requires contracts.vault (AMMUNITION_VAULT_ADDRESS)".into(),
            ));
        }

        Ok(())
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, KeeperError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| KeeperError::Config(format!("{key}={value}: {e}")))
}
