//! Keeper metrics, health classification and circuit breaker.
//!
//! The monitor owns the only copy of `KeeperMetrics`. Writers go through
//! the record operations; readers get a cloned snapshot taken under the
//! same lock, so a status read never observes a half-applied record.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::types::{amount, format_units, ExecutionOutcome};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Consecutive failures that trip the breaker.
    pub circuit_breaker_threshold: u32,
    pub summary_interval_secs: u64,
    pub log_level: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            circuit_breaker_threshold: 5,
            summary_interval_secs: 30,
            log_level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Process-lifetime aggregate of every executed strategy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeeperMetrics {
    pub total_strategies: u64,
    pub successful_strategies: u64,
    pub failed_strategies: u64,
    #[serde(with = "amount")]
    pub total_profit: u128,
    #[serde(with = "amount")]
    pub total_gas_used: u128,
    /// Running mean over successful executions only.
    pub average_execution_time_ms: f64,
    pub last_execution_time_ms: u64,
    pub consecutive_failures: u32,
    pub circuit_breaker_active: bool,
}

impl KeeperMetrics {
    /// Percentage of completed strategies that succeeded; 100 before any
    /// strategy has completed.
    pub fn success_rate(&self) -> f64 {
        let completed = self.successful_strategies + self.failed_strategies;
        if completed == 0 {
            return 100.0;
        }
        self.successful_strategies as f64 / completed as f64 * 100.0
    }
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub details: Vec<String>,
}

impl HealthReport {
    /// Classify a metrics snapshot: no issues is healthy, one is degraded,
    /// two or more is unhealthy.
    pub fn from_metrics(metrics: &KeeperMetrics) -> Self {
        let mut details = Vec::new();

        if metrics.circuit_breaker_active {
            details.push("Circuit breaker is active".to_string());
        }
        if metrics.consecutive_failures > 0 {
            details.push(format!("{} consecutive failures", metrics.consecutive_failures));
        }
        let rate = metrics.success_rate();
        if rate < 50.0 {
            details.push(format!("Low success rate: {rate:.1}%"));
        }

        let status = match details.len() {
            0 => HealthStatus::Healthy,
            1 => HealthStatus::Degraded,
            _ => HealthStatus::Unhealthy,
        };

        Self { status, details }
    }
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

pub struct Monitor {
    config: MonitorConfig,
    metrics: RwLock<KeeperMetrics>,
    started: Instant,
}

impl Monitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            metrics: RwLock::new(KeeperMetrics::default()),
            started: Instant::now(),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub async fn record_start(&self, strategy_id: &str) {
        let mut m = self.metrics.write().await;
        m.total_strategies += 1;
        debug!(strategy_id, total = m.total_strategies, "Strategy started");
    }

    pub async fn record_success(&self, strategy_id: &str, profit: u128, gas_used: u128, execution_time_ms: u64) {
        let mut m = self.metrics.write().await;
        m.successful_strategies += 1;
        m.consecutive_failures = 0;
        m.total_profit = m.total_profit.saturating_add(profit);
        m.total_gas_used = m.total_gas_used.saturating_add(gas_used);
        m.last_execution_time_ms = execution_time_ms;

        // Incremental mean over successes.
        let n = m.successful_strategies as f64;
        m.average_execution_time_ms += (execution_time_ms as f64 - m.average_execution_time_ms) / n;

        info!(
            strategy_id,
            profit = %format_units(profit, 6),
            gas_used = %gas_used,
            execution_time_ms,
            "Strategy succeeded"
        );
    }

    pub async fn record_failure(&self, strategy_id: &str, reason: &str, execution_time_ms: u64) {
        let mut m = self.metrics.write().await;
        m.failed_strategies += 1;
        m.consecutive_failures = m.consecutive_failures.saturating_add(1);
        m.last_execution_time_ms = execution_time_ms;

        warn!(
            strategy_id,
            reason,
            consecutive_failures = m.consecutive_failures,
            execution_time_ms,
            "Strategy failed"
        );

        if !m.circuit_breaker_active && m.consecutive_failures >= self.config.circuit_breaker_threshold {
            m.circuit_breaker_active = true;
            warn!(
                consecutive_failures = m.consecutive_failures,
                threshold = self.config.circuit_breaker_threshold,
                "Circuit breaker activated"
            );
        }
    }

    /// Route an outcome to the matching record operation.
    pub async fn record(&self, outcome: &ExecutionOutcome) {
        if outcome.succeeded {
            self.record_success(
                &outcome.strategy_id,
                outcome.realized_profit,
                u128::from(outcome.gas_used),
                outcome.execution_time_ms,
            )
            .await;
        } else {
            self.record_failure(
                &outcome.strategy_id,
                outcome.failure_reason.as_deref().unwrap_or("unknown"),
                outcome.execution_time_ms,
            )
            .await;
        }
    }

    /// Clear the breaker flag. The only way the breaker turns off; the
    /// failure streak is left as is, so the next failure re-arms it.
    pub async fn deactivate_circuit_breaker(&self) {
        let mut m = self.metrics.write().await;
        if m.circuit_breaker_active {
            m.circuit_breaker_active = false;
            info!(
                consecutive_failures = m.consecutive_failures,
                "Circuit breaker deactivated"
            );
        }
    }

    pub async fn metrics(&self) -> KeeperMetrics {
        self.metrics.read().await.clone()
    }

    pub async fn health(&self) -> HealthReport {
        HealthReport::from_metrics(&*self.metrics.read().await)
    }

    /// Metrics and health from a single read.
    pub async fn report(&self) -> (KeeperMetrics, HealthReport) {
        let m = self.metrics.read().await.clone();
        let health = HealthReport::from_metrics(&m);
        (m, health)
    }

    pub async fn circuit_breaker_active(&self) -> bool {
        self.metrics.read().await.circuit_breaker_active
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub async fn log_summary(&self) {
        let (m, health) = self.report().await;
        info!(
            uptime_secs = self.uptime().as_secs(),
            total = m.total_strategies,
            successful = m.successful_strategies,
            failed = m.failed_strategies,
            success_rate = format!("{:.1}%", m.success_rate()),
            total_profit = %format_units(m.total_profit, 6),
            total_gas_used = %m.total_gas_used,
            avg_execution_ms = format!("{:.1}", m.average_execution_time_ms),
            circuit_breaker = m.circuit_breaker_active,
            health = %health.status,
            "Keeper summary"
        );
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
