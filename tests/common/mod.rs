//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use blockflow_rs::config::AppConfig;
use blockflow_rs::engine::{BlockEngine, EngineFactory, EngineResult, SimEngine};
use blockflow_rs::scheduler::{ExecutionScheduler, ManualClock};
use std::time::Duration;

/// Upper bound when waiting on the scheduler thread
pub fn test_timeout() -> Duration {
    Duration::from_secs(2)
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Factory producing a fresh `SimEngine` per compilation
pub fn sim_factory() -> Box<dyn EngineFactory> {
    Box::new(|| -> EngineResult<Box<dyn BlockEngine>> { Ok(Box::new(SimEngine::new())) })
}

/// Scheduler on a manual clock with default config and a `SimEngine` attached
pub fn sim_scheduler(clock: &ManualClock) -> ExecutionScheduler {
    let mut scheduler = ExecutionScheduler::new(&AppConfig::default(), Box::new(clock.clone()));
    scheduler.attach_engine(sim_factory());
    scheduler
}
