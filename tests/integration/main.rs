//! Integration test harness.

mod mock_chain;
mod simulation;
