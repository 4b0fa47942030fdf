//! Common test utilities for integration tests
//!
//! Provides shared fixtures and helpers used across multiple integration
//! test files.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{json, Value};
use stepwise::adapters::MockResource;
use stepwise::domain::models::{EngineConfig, RetryConfig, Step, StepKind, Task, TaskAnalysis};
use stepwise::{Engine, StatsCollector};

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
/// Call this at the beginning of tests that need logging.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Engine with default limits and no delay between retries.
pub fn engine() -> Engine {
    engine_with(EngineConfig::default())
}

pub fn engine_with(config: EngineConfig) -> Engine {
    Engine::new(config, RetryConfig::immediate(), StatsCollector::new())
}

/// Register `resource` under both tiers.
pub fn register_single(engine: &mut Engine, resource: &Arc<MockResource>) {
    engine.register_resources(resource.clone(), resource.clone());
}

/// Payload that passes every kind-specific score cap.
pub fn good_payload() -> Value {
    json!({ "sql": "SELECT day, count(*) FROM orders GROUP BY day", "confidence": 0.9, "quality": 0.9 })
}

/// Task over an explicit step list.
pub fn task(steps: Vec<Step>) -> Task {
    Task::new(TaskAnalysis::new("orders per day", "sales", 0.9), steps).expect("valid steps")
}

/// `parse -> data_query -> formatting`, linearly dependent.
pub fn three_step_task() -> Task {
    task(vec![
        Step::new("parse", StepKind::Parse),
        Step::new("query", StepKind::DataQuery).depends_on("parse"),
        Step::new("format", StepKind::Formatting).depends_on("query"),
    ])
}
