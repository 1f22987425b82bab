//! Keeper — automated liquidity-strategy keeper for a flash-loan vault.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod chain;
pub mod config;
pub mod dashboard;
pub mod engine;
pub mod market;
pub mod strategy;
pub mod types;
