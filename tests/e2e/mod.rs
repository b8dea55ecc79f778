//! End-to-end tests for the facilitator.
//!
//! Every test runs the real verification pipeline, settlement orchestrator
//! and in-memory store against a mock chain. Poll-loop tests use tokio's
//! paused clock so the 120 s confirmation budget elapses instantly.

#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

mod harness;


#[cfg(test)]
mod settlement_tests;

pub use harness::{MockChain, TestHarness};
