//! End-to-end keeper runs.
//!
//! Drives the scheduler through full cycles against the in-memory chain
//! (production wiring) and the simulated engine (demo wiring), then checks
//! metrics, health and the status API.

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    use keeper::chain::FixedBalance;
    use keeper::dashboard::build_router;
    use keeper::engine::{
        CycleOutcome, HealthStatus, KeeperComponents, KeeperIdentity, KeeperScheduler, LiveExecutor, Monitor,
        MonitorConfig, SchedulerConfig, SimulatedExecutor, SimulationConfig,
    };
    use keeper::market::{MarketConditionsProvider, MarketConfig, SimulatedMarket, ETHER, USDC};
    use keeper::strategy::{BaselineValidator, StrategyCalculator, StrategyConfig};
    use keeper::types::{MarketConditions, Mode};

    use crate::mock_chain::MockChain;

    const VAULT: u128 = 1_000_000 * USDC;

    struct FixedMarket(MarketConditions);

    #[async_trait]
    impl MarketConditionsProvider for FixedMarket {
        async fn snapshot(&self, _venue: &str) -> anyhow::Result<MarketConditions> {
            Ok(self.0.clone())
        }
    }

    fn deep_calm_market() -> Arc<FixedMarket> {
        Arc::new(FixedMarket(MarketConditions {
            price: dec!(2000),
            liquidity: 15_000 * ETHER,
            volatility: 0.03,
            volume_24h: 5_000_000 * USDC,
        }))
    }

    fn identity(network: &str) -> KeeperIdentity {
        KeeperIdentity {
            account: "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".into(),
            network: network.into(),
            venue: "0x88e6a0c2ddd26feeb64f039a2c41296fcb3f5640".into(),
        }
    }

    fn production_keeper(chain: Arc<MockChain>, config: SchedulerConfig) -> KeeperScheduler {
        KeeperScheduler::new(
            SchedulerConfig {
                mode: Mode::Production,
                ..config
            },
            identity("chain 31337"),
            KeeperComponents {
                calculator: StrategyCalculator::new(StrategyConfig::default(), "0xweth", deep_calm_market()),
                validator: Arc::new(BaselineValidator::default()),
                engine: Arc::new(LiveExecutor::new(chain.clone())),
                balance: chain,
                monitor: Arc::new(Monitor::new(MonitorConfig::default())),
            },
        )
    }

    fn demo_keeper(seed: u64, demo_interval_secs: u64) -> KeeperScheduler {
        let market = SimulatedMarket::new(MarketConfig::default(), StdRng::seed_from_u64(seed));
        KeeperScheduler::new(
            SchedulerConfig {
                demo_interval_secs,
                ..SchedulerConfig::default()
            },
            identity("demo"),
            KeeperComponents {
                calculator: StrategyCalculator::new(StrategyConfig::default(), "0xweth", Arc::new(market)),
                validator: Arc::new(BaselineValidator::default()),
                engine: Arc::new(SimulatedExecutor::new(
                    SimulationConfig::default(),
                    StdRng::seed_from_u64(seed + 1),
                )),
                balance: Arc::new(FixedBalance(VAULT)),
                monitor: Arc::new(Monitor::default()),
            },
        )
    }

    async fn status_json(scheduler: &KeeperScheduler) -> serde_json::Value {
        let resp = build_router(scheduler.clone())
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_production_cycle_submits_on_chain() {
        let chain = Arc::new(MockChain::new(31337, VAULT));
        let keeper = production_keeper(chain.clone(), SchedulerConfig::default());

        let CycleOutcome::Executed(outcome) = keeper.run_cycle().await else {
            panic!("expected an executed cycle");
        };
        assert!(outcome.succeeded);
        assert!(outcome.strategy_id.starts_with("prod-"));

        let submitted = chain.submitted();
        assert_eq!(submitted.len(), 1);
        let proposal = &submitted[0];
        assert_eq!(proposal.loan_amount, 4_000 * USDC);
        assert!(proposal.loan_amount * 10 <= VAULT * 8);
        assert!(proposal.range_lower < proposal.range_upper);

        let receipt = &chain.receipts()[0];
        assert_eq!(outcome.tx_hash.as_deref(), Some(receipt.tx_hash.as_str()));
        assert_eq!(outcome.gas_used, receipt.gas_used);
        assert_eq!(chain.vault_balance(), VAULT + proposal.expected_profit);

        let json = status_json(&keeper).await;
        assert_eq!(json["mode"], "production");
        assert_eq!(json["network"], "chain 31337");
        assert_eq!(json["vaultBalance"], VAULT.to_string());
        assert_eq!(json["metrics"]["successfulStrategies"], 1);
        assert_eq!(json["metrics"]["totalProfit"], proposal.expected_profit.to_string());
        assert_eq!(json["strategy"]["isActive"], true);
        assert_eq!(json["health"]["status"], "healthy");
    }

    #[tokio::test]
    async fn test_submission_failures_trip_breaker_without_halting() {
        let chain = Arc::new(MockChain::new(31337, VAULT));
        chain.set_submit_error("replacement transaction underpriced");
        let keeper = production_keeper(chain.clone(), SchedulerConfig::default());

        for _ in 0..5 {
            let CycleOutcome::Executed(outcome) = keeper.run_cycle().await else {
                panic!("expected an executed cycle");
            };
            assert!(!outcome.succeeded);
            assert_eq!(
                outcome.failure_reason.as_deref(),
                Some("replacement transaction underpriced")
            );
        }

        let monitor = keeper.monitor();
        let metrics = monitor.metrics().await;
        assert!(metrics.circuit_breaker_active);
        assert_eq!(metrics.consecutive_failures, 5);
        assert_eq!(monitor.health().await.status, HealthStatus::Unhealthy);

        // Advisory breaker: the next cycle still executes and recovers
        chain.clear_submit_error();
        let CycleOutcome::Executed(outcome) = keeper.run_cycle().await else {
            panic!("expected an executed cycle");
        };
        assert!(outcome.succeeded);

        let metrics = monitor.metrics().await;
        assert_eq!(metrics.consecutive_failures, 0);
        assert!(metrics.circuit_breaker_active);
        assert_eq!(metrics.total_strategies, 6);
    }

    #[tokio::test]
    async fn test_reverted_transactions_are_failures() {
        let chain = Arc::new(MockChain::new(31337, VAULT));
        chain.set_revert(true);
        let keeper = production_keeper(chain.clone(), SchedulerConfig::default());

        let CycleOutcome::Executed(outcome) = keeper.run_cycle().await else {
            panic!("expected an executed cycle");
        };
        assert!(!outcome.succeeded);
        assert_eq!(outcome.failure_reason.as_deref(), Some("transaction reverted"));
        assert_eq!(chain.vault_balance(), VAULT);
        assert_eq!(keeper.monitor().metrics().await.failed_strategies, 1);
    }

    #[tokio::test]
    async fn test_node_outage_uses_fallback_and_records_failure() {
        let chain = Arc::new(MockChain::new(31337, VAULT));
        chain.set_error("connection refused");
        let keeper = production_keeper(
            chain.clone(),
            SchedulerConfig {
                fallback_balance: 2_000 * USDC,
                ..SchedulerConfig::default()
            },
        );

        let CycleOutcome::Executed(outcome) = keeper.run_cycle().await else {
            panic!("expected an executed cycle");
        };
        assert!(!outcome.succeeded);
        assert!(outcome.failure_reason.unwrap().contains("connection refused"));
        assert!(chain.submitted().is_empty());

        let snapshot = keeper.snapshot().await;
        assert_eq!(snapshot.vault_balance, 2_000 * USDC);
        assert_eq!(snapshot.last_strategy.unwrap().loan_amount, 1_600 * USDC);
        assert_eq!(snapshot.metrics.failed_strategies, 1);

        // Node back: the live balance replaces the fallback.
        chain.clear_error();
        let CycleOutcome::Executed(outcome) = keeper.run_cycle().await else {
            panic!("expected an executed cycle");
        };
        assert!(outcome.succeeded);
        assert_eq!(chain.submitted().len(), 1);
        assert_eq!(keeper.snapshot().await.vault_balance, VAULT);
        assert_eq!(keeper.monitor().metrics().await.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_enforced_breaker_halts_submissions() {
        let chain = Arc::new(MockChain::new(31337, VAULT));
        chain.set_submit_error("execution reverted");
        let keeper = production_keeper(
            chain.clone(),
            SchedulerConfig {
                enforce_circuit_breaker: true,
                ..SchedulerConfig::default()
            },
        );

        for _ in 0..5 {
            keeper.run_cycle().await;
        }
        chain.clear_submit_error();

        assert_eq!(keeper.run_cycle().await, CycleOutcome::Skipped);
        assert!(chain.submitted().is_empty());

        keeper.monitor().deactivate_circuit_breaker().await;
        assert!(matches!(keeper.run_cycle().await, CycleOutcome::Executed(o) if o.succeeded));
        assert_eq!(chain.submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_seeded_demo_run_keeps_invariants() {
        let keeper = demo_keeper(2024, 30);
        let mut executed = 0u64;

        for _ in 0..40 {
            match keeper.run_cycle().await {
                CycleOutcome::Executed(outcome) => {
                    executed += 1;
                    if outcome.succeeded {
                        assert!(outcome.tx_hash.is_some());
                    } else {
                        assert!(outcome.failure_reason.is_some());
                    }
                }
                CycleOutcome::NoStrategy => {}
                other => panic!("unexpected cycle outcome {other:?}"),
            }

            if let Some(p) = keeper.snapshot().await.last_strategy {
                assert!(p.loan_amount * 10 <= VAULT * 8);
                assert!(p.range_lower < p.range_upper);
                assert!(p.expected_profit >= StrategyConfig::default().min_profit);
            }
        }

        let metrics = keeper.monitor().metrics().await;
        assert_eq!(metrics.total_strategies, executed);
        assert_eq!(
            metrics.successful_strategies + metrics.failed_strategies,
            metrics.total_strategies
        );
    }

    #[tokio::test]
    async fn test_same_seed_same_demo_history() {
        let a = demo_keeper(99, 30);
        let b = demo_keeper(99, 30);

        for _ in 0..10 {
            let x = a.run_cycle().await;
            let y = b.run_cycle().await;
            match (x, y) {
                (CycleOutcome::Executed(x), CycleOutcome::Executed(y)) => {
                    assert_eq!(x.succeeded, y.succeeded);
                    assert_eq!(x.realized_profit, y.realized_profit);
                    assert_eq!(x.failure_reason, y.failure_reason);
                }
                (x, y) => assert_eq!(x, y),
            }
        }
    }

    #[tokio::test]
    async fn test_scheduler_repeats_on_interval_until_stopped() {
        let keeper = demo_keeper(7, 1);
        let handle = keeper.start().unwrap();

        let json = status_json(&keeper).await;
        assert_eq!(json["isRunning"], true);

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        keeper.stop();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        // Immediate cycle plus at least one interval tick
        let cycles = keeper.snapshot().await.cycles;
        assert!(cycles >= 2, "only {cycles} cycles ran");

        let json = status_json(&keeper).await;
        assert_eq!(json["isRunning"], false);

        // No further cycles once stopped
        tokio::time::sleep(Duration::from_millis(1_200)).await;
        assert_eq!(keeper.snapshot().await.cycles, cycles);
    }
}
