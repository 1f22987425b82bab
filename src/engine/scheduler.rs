//! Keeper control loop.
//!
//! `Stopped -> Running(mode) -> Stopped`. On start one cycle runs
//! immediately, then the loop sleeps a fixed delay after each cycle
//! finishes, so a slow cycle pushes the next one back. Stopping only clears
//! the running flag: an in-flight cycle completes, nothing new is scheduled.
//!
//! A cycle is: balance -> strategy -> validate -> execute -> record.

use chrono::Utc;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::chain::BalanceSource;
use crate::engine::executor::ExecutionEngine;
use crate::engine::monitor::{HealthReport, KeeperMetrics, Monitor};
use crate::strategy::{StrategyCalculator, StrategyValidator};
use crate::types::{amount, format_units, ExecutionOutcome, KeeperState, Mode, StrategyProposal};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub mode: Mode,
    pub demo_interval_secs: u64,
    pub production_interval_secs: u64,
    /// Balance assumed when the balance source fails.
    #[serde(with = "amount")]
    pub fallback_balance: u128,
    /// Skip cycles while the circuit breaker is active.
    pub enforce_circuit_breaker: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Demo,
            demo_interval_secs: 30,
            production_interval_secs: 60,
            fallback_balance: 1_000_000_000_000,
            enforce_circuit_breaker: false,
        }
    }
}

impl SchedulerConfig {
    /// Delay between cycles for the configured mode.
    pub fn interval(&self) -> Duration {
        match self.mode {
            Mode::Demo => Duration::from_secs(self.demo_interval_secs),
            Mode::Production => Duration::from_secs(self.production_interval_secs),
        }
    }
}

/// Who the keeper is and what it works on, for logs and the status view.
#[derive(Debug, Clone)]
pub struct KeeperIdentity {
    pub account: String,
    pub network: String,
    pub venue: String,
}

/// Everything a cycle calls into.
pub struct KeeperComponents {
    pub calculator: StrategyCalculator,
    pub validator: Arc<dyn StrategyValidator>,
    pub engine: Arc<dyn ExecutionEngine>,
    pub balance: Arc<dyn BalanceSource>,
    pub monitor: Arc<Monitor>,
}

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// No strategy cleared the profit threshold.
    NoStrategy,
    /// The validator refused the proposal.
    Rejected,
    /// Circuit breaker enforcement skipped the cycle.
    Skipped,
    Executed(ExecutionOutcome),
}

/// Consistent view of the scheduler and monitor for the status surface.
#[derive(Debug, Clone)]
pub struct KeeperSnapshot {
    pub state: KeeperState,
    pub identity: KeeperIdentity,
    pub vault_balance: u128,
    pub last_strategy: Option<StrategyProposal>,
    pub metrics: KeeperMetrics,
    pub health: HealthReport,
    pub uptime: Duration,
    pub cycles: u64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

struct Shared {
    config: SchedulerConfig,
    identity: KeeperIdentity,
    components: KeeperComponents,
    running: AtomicBool,
    /// Bumped on every start so a loop from an earlier run exits.
    generation: AtomicU64,
    wake: Notify,
    /// Held for the whole of a cycle.
    cycle_lock: Mutex<()>,
    cycles: AtomicU64,
    last_strategy: RwLock<Option<StrategyProposal>>,
    last_balance: RwLock<u128>,
}

#[derive(Clone)]
pub struct KeeperScheduler {
    shared: Arc<Shared>,
}

impl KeeperScheduler {
    pub fn new(config: SchedulerConfig, identity: KeeperIdentity, components: KeeperComponents) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                identity,
                components,
                running: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                wake: Notify::new(),
                cycle_lock: Mutex::new(()),
                cycles: AtomicU64::new(0),
                last_strategy: RwLock::new(None),
                last_balance: RwLock::new(0),
            }),
        }
    }

    pub fn mode(&self) -> Mode {
        self.shared.config.mode
    }

    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.shared.components.monitor
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> KeeperState {
        KeeperState {
            is_running: self.is_running(),
            mode: self.shared.config.mode,
        }
    }

    /// Start the loop in the background. Returns `None` (and logs a
    /// warning) if the keeper is already running.
    pub fn start(&self) -> Option<JoinHandle<()>> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            warn!("Keeper is already running");
            return None;
        }

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let interval = self.shared.config.interval();

        info!(
            mode = %self.shared.config.mode,
            interval_secs = interval.as_secs(),
            account = %self.shared.identity.account,
            network = %self.shared.identity.network,
            engine = self.shared.components.engine.name(),
            "Keeper started"
        );

        let this = self.clone();
        Some(tokio::spawn(async move {
            this.run_loop(generation, interval).await;
        }))
    }

    /// Clear the running flag. Does not wait for an in-flight cycle.
    pub fn stop(&self) {
        if self.shared.running.swap(false, Ordering::SeqCst) {
            info!("Keeper stopping");
            self.shared.wake.notify_waiters();
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.is_running() && self.shared.generation.load(Ordering::SeqCst) == generation
    }

    async fn run_loop(&self, generation: u64, interval: Duration) {
        while self.is_current(generation) {
            let outcome = self.run_cycle().await;
            debug!(?outcome, "Cycle complete");

            // Register for the stop signal before re-checking the flag.
            let woken = self.shared.wake.notified();
            if !self.is_current(generation) {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = woken => {}
            }
        }
        info!(generation, "Keeper loop exited");
    }

    /// Run one cycle to completion. Never fails: faults become recorded
    /// strategy failures or policy outcomes.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let _cycle = self.shared.cycle_lock.lock().await;
        let shared = &self.shared;
        let c = &shared.components;
        let cycle = shared.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        let venue = shared.identity.venue.as_str();

        if shared.config.enforce_circuit_breaker && c.monitor.circuit_breaker_active().await {
            warn!(cycle, "Circuit breaker active, skipping cycle");
            return CycleOutcome::Skipped;
        }

        let balance = match c.balance.available_balance().await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(
                    cycle,
                    error = %e,
                    fallback = %format_units(shared.config.fallback_balance, 6),
                    "Balance unavailable, using fallback"
                );
                shared.config.fallback_balance
            }
        };
        *shared.last_balance.write().await = balance;

        let Some(proposal) = c.calculator.compute_strategy(venue, balance).await else {
            info!(cycle, venue, "No profitable strategy found");
            *shared.last_strategy.write().await = None;
            return CycleOutcome::NoStrategy;
        };
        *shared.last_strategy.write().await = Some(proposal.clone());

        if !c.validator.validate(&proposal) {
            warn!(cycle, %proposal, "Strategy rejected by validator");
            return CycleOutcome::Rejected;
        }

        let strategy_id = format!(
            "{}-{}-{}",
            shared.config.mode.strategy_prefix(),
            Utc::now().timestamp_millis(),
            cycle
        );

        c.monitor.record_start(&strategy_id).await;
        let started = Instant::now();

        let outcome = match c.engine.execute(&strategy_id, &proposal).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(strategy_id = %strategy_id, error = %e, "Execution error");
                ExecutionOutcome::failure(&strategy_id, format!("{e:#}"), started.elapsed().as_millis() as u64)
            }
        };

        c.monitor.record(&outcome).await;
        CycleOutcome::Executed(outcome)
    }

    /// Scheduler and monitor state for the status surface.
    pub async fn snapshot(&self) -> KeeperSnapshot {
        let shared = &self.shared;
        let (metrics, health) = shared.components.monitor.report().await;

        KeeperSnapshot {
            state: self.state(),
            identity: shared.identity.clone(),
            vault_balance: *shared.last_balance.read().await,
            last_strategy: shared.last_strategy.read().await.clone(),
            metrics,
            health,
            uptime: shared.components.monitor.uptime(),
            cycles: shared.cycles.load(Ordering::SeqCst),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
