//! Status API route handlers.
//!
//! All endpoints return JSON built from a single scheduler snapshot.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use serde_json::{json, Value};

use crate::engine::{HealthStatus, KeeperMetrics, KeeperScheduler, KeeperSnapshot};
use crate::types::{amount, Mode, StrategyProposal};

pub type AppState = KeeperScheduler;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub is_running: bool,
    pub mode: Mode,
    pub account: String,
    #[serde(with = "amount")]
    pub vault_balance: u128,
    pub network: String,
    pub health: HealthResponse,
    pub metrics: MetricsResponse,
    pub strategy: StrategyResponse,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub details: Vec<String>,
    pub uptime_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsResponse {
    #[serde(flatten)]
    pub metrics: KeeperMetrics,
    /// Percent, one decimal place.
    pub success_rate: f64,
}

/// The last computed proposal, or a zeroed placeholder with
/// `is_active = false`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyResponse {
    pub venue: String,
    pub loan_token: String,
    #[serde(with = "amount")]
    pub loan_amount: u128,
    pub range_lower: i64,
    pub range_upper: i64,
    #[serde(with = "amount")]
    pub expected_profit: u128,
    pub gas_estimate: u64,
    pub is_active: bool,
}

impl From<&StrategyProposal> for StrategyResponse {
    fn from(p: &StrategyProposal) -> Self {
        Self {
            venue: p.venue.clone(),
            loan_token: p.loan_token.clone(),
            loan_amount: p.loan_amount,
            range_lower: p.range_lower,
            range_upper: p.range_upper,
            expected_profit: p.expected_profit,
            gas_estimate: p.gas_estimate,
            is_active: true,
        }
    }
}

impl From<KeeperSnapshot> for StatusResponse {
    fn from(snap: KeeperSnapshot) -> Self {
        let success_rate = (snap.metrics.success_rate() * 10.0).round() / 10.0;
        Self {
            is_running: snap.state.is_running,
            mode: snap.state.mode,
            account: snap.identity.account,
            vault_balance: snap.vault_balance,
            network: snap.identity.network,
            health: HealthResponse {
                status: snap.health.status,
                details: snap.health.details,
                uptime_ms: snap.uptime.as_millis() as u64,
            },
            metrics: MetricsResponse {
                metrics: snap.metrics,
                success_rate,
            },
            strategy: snap
                .last_strategy
                .as_ref()
                .map(StrategyResponse::from)
                .unwrap_or_default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /status (also /api/keeper/status, /api/vault/status)
pub async fn get_status(State(scheduler): State<AppState>) -> Json<StatusResponse> {
    Json(scheduler.snapshot().await.into())
}

/// GET /health
pub async fn health(State(scheduler): State<AppState>) -> (StatusCode, Json<Value>) {
    let report = scheduler.monitor().health().await;
    let code = match report.status {
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (
        code,
        Json(json!({
            "status": report.status,
            "details": report.details,
            "isRunning": scheduler.is_running(),
        })),
    )
}

/// Unknown routes.
pub async fn not_found() -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" })))
}
