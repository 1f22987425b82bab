//! Market conditions provider.
//!
//! Produces price/liquidity/volatility/volume snapshots for a venue. The
//! simulated provider derives a time-of-day baseline (busier during the
//! active window, thinner on quiet days) and perturbs it with a bounded
//! multiplicative jitter drawn from an injected, seedable RNG.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Timelike, Utc};
use rand::rngs::StdRng;
use rand::Rng;
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::types::{amount, MarketConditions};

/// One whole unit of an 18-decimal token.
pub const ETHER: u128 = 1_000_000_000_000_000_000;
/// One whole unit of a 6-decimal token.
pub const USDC: u128 = 1_000_000;

/// Source of market snapshots consumed by the strategy calculator.
#[async_trait]
pub trait MarketConditionsProvider: Send + Sync {
    /// Current conditions for the given venue.
    async fn snapshot(&self, venue: &str) -> Result<MarketConditions>;
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Shape of the simulated market.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Price the jitter factor is applied to.
    pub reference_price: Decimal,
    pub jitter_min: f64,
    pub jitter_max: f64,
    /// Active window, inclusive UTC hours.
    pub active_start_hour: u32,
    pub active_end_hour: u32,
    /// Peak-volume window, inclusive UTC hours.
    pub peak_start_hour: u32,
    pub peak_end_hour: u32,
    /// Quiet days as days-from-Sunday (0 = Sunday, 6 = Saturday).
    pub quiet_days: Vec<u32>,
    pub base_volatility: f64,
    pub active_volatility: f64,
    /// Volatility multiplier within `spike_edge_minutes` of the hour turning.
    pub spike_multiplier: f64,
    pub spike_edge_minutes: u32,
    #[serde(with = "amount")]
    pub base_liquidity: u128,
    #[serde(with = "amount")]
    pub active_liquidity: u128,
    /// Liquidity kept on quiet days, in percent.
    pub quiet_liquidity_pct: u32,
    #[serde(with = "amount")]
    pub base_volume: u128,
    #[serde(with = "amount")]
    pub active_volume: u128,
    /// Volume during the peak window, in percent of the active volume.
    pub peak_volume_pct: u32,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            reference_price: dec!(2000),
            jitter_min: 0.8,
            jitter_max: 1.2,
            active_start_hour: 9,
            active_end_hour: 17,
            peak_start_hour: 11,
            peak_end_hour: 15,
            quiet_days: vec![0, 6],
            base_volatility: 0.02,
            active_volatility: 0.08,
            spike_multiplier: 2.0,
            spike_edge_minutes: 5,
            base_liquidity: 5_000 * ETHER,
            active_liquidity: 15_000 * ETHER,
            quiet_liquidity_pct: 60,
            base_volume: 1_000_000 * USDC,
            active_volume: 5_000_000 * USDC,
            peak_volume_pct: 150,
        }
    }
}

// ---------------------------------------------------------------------------
// Simulated market
// ---------------------------------------------------------------------------

/// Deterministic-baseline market with bounded random perturbation.
pub struct SimulatedMarket {
    config: MarketConfig,
    rng: Mutex<StdRng>,
}

impl SimulatedMarket {
    pub fn new(config: MarketConfig, rng: StdRng) -> Self {
        Self {
            config,
            rng: Mutex::new(rng),
        }
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    fn is_active_hour(&self, at: DateTime<Utc>) -> bool {
        let hour = at.hour();
        hour >= self.config.active_start_hour && hour <= self.config.active_end_hour
    }

    fn is_peak_hour(&self, at: DateTime<Utc>) -> bool {
        let hour = at.hour();
        hour >= self.config.peak_start_hour && hour <= self.config.peak_end_hour
    }

    fn is_quiet_day(&self, at: DateTime<Utc>) -> bool {
        self.config
            .quiet_days
            .contains(&at.weekday().num_days_from_sunday())
    }

    /// Volatility before jitter.
    pub fn baseline_volatility(&self, at: DateTime<Utc>) -> f64 {
        let mut volatility = if self.is_active_hour(at) {
            self.config.active_volatility
        } else {
            self.config.base_volatility
        };

        let minute = at.minute();
        let edge = self.config.spike_edge_minutes;
        if minute < edge || minute > 60u32.saturating_sub(edge) {
            volatility *= self.config.spike_multiplier;
        }

        volatility
    }

    /// Liquidity before jitter.
    pub fn baseline_liquidity(&self, at: DateTime<Utc>) -> u128 {
        let liquidity = if self.is_active_hour(at) {
            self.config.active_liquidity
        } else {
            self.config.base_liquidity
        };

        if self.is_quiet_day(at) {
            scale_pct(liquidity, self.config.quiet_liquidity_pct)
        } else {
            liquidity
        }
    }

    /// Volume before jitter.
    pub fn baseline_volume(&self, at: DateTime<Utc>) -> u128 {
        let volume = if self.is_active_hour(at) {
            self.config.active_volume
        } else {
            self.config.base_volume
        };

        if self.is_peak_hour(at) {
            scale_pct(volume, self.config.peak_volume_pct)
        } else {
            volume
        }
    }

    /// Snapshot for an explicit instant.
    pub async fn snapshot_at(&self, venue: &str, at: DateTime<Utc>) -> MarketConditions {
        let raw = {
            let mut rng = self.rng.lock().await;
            rng.gen_range(self.config.jitter_min..=self.config.jitter_max)
        };
        let factor = sanitize_factor(raw);
        let pct = (factor * 100.0).floor() as u128;

        let conditions = MarketConditions {
            price: self.config.reference_price * Decimal::from_f64(factor).unwrap_or(Decimal::ONE),
            liquidity: self.baseline_liquidity(at).saturating_mul(pct) / 100,
            volatility: self.baseline_volatility(at) * factor,
            volume_24h: self.baseline_volume(at).saturating_mul(pct) / 100,
        };

        debug!(venue, factor, %conditions, "Market snapshot");
        conditions
    }
}

#[async_trait]
impl MarketConditionsProvider for SimulatedMarket {
    async fn snapshot(&self, venue: &str) -> Result<MarketConditions> {
        Ok(self.snapshot_at(venue, Utc::now()).await)
    }
}

/// Any non-finite or non-positive jitter factor collapses to 1.0.
pub fn sanitize_factor(factor: f64) -> f64 {
    if factor.is_finite() && factor > 0.0 {
        factor
    } else {
        1.0
    }
}

/// `value * pct / 100`, saturating.
fn scale_pct(value: u128, pct: u32) -> u128 {
    let pct = u128::from(pct);
    (value / 100)
        .saturating_mul(pct)
        .saturating_add(value % 100 * pct / 100)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
