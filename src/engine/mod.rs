//! Keeper engine: execution, monitoring and the scheduling loop.

pub mod executor;
pub mod monitor;
pub mod scheduler;

pub use executor::{ExecutionEngine, LiveExecutor, SimulatedExecutor, SimulationConfig};
pub use monitor::{HealthReport, HealthStatus, KeeperMetrics, Monitor, MonitorConfig};
pub use scheduler::{
    CycleOutcome, KeeperComponents, KeeperIdentity, KeeperScheduler, KeeperSnapshot, SchedulerConfig,
};
