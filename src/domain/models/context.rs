//! Control context: the live state of one task execution.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::decision::{ControlDecision, DecisionKind, Evaluation, QualityAssessment, StateAnalysis};
use super::step::{ResourceTier, StepResult, StepStatus};
use super::task::Task;

/// Default ceiling on step failures for a whole task.
pub const DEFAULT_MAX_ERRORS: u32 = 5;
/// Default ceiling on retry decisions for a whole task.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// One entry of the append-only decision log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub decision: DecisionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub state: StateAnalysis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityAssessment>,
    pub timestamp: DateTime<Utc>,
}

/// Rolling gauges, overwritten after every stored result.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RollingMetrics {
    pub avg_step_time_ms: f64,
    pub success_rate: f64,
    pub avg_confidence: f64,
}

/// Mutable per-run state, owned by exactly one task execution.
#[derive(Debug, Clone)]
pub struct ControlContext {
    pub task: Task,
    pub results: HashMap<String, StepResult>,
    pub decision_log: Vec<DecisionRecord>,
    pub metrics: RollingMetrics,
    pub error_count: u32,
    pub retry_count: u32,
    pub max_errors: u32,
    pub max_retries: u32,
    /// Message of the most recent failure, kept for the error report.
    pub last_error: Option<String>,
}

impl ControlContext {
    pub fn new(task: Task) -> Self {
        Self::with_limits(task, DEFAULT_MAX_ERRORS, DEFAULT_MAX_RETRIES)
    }

    pub fn with_limits(task: Task, max_errors: u32, max_retries: u32) -> Self {
        Self {
            task,
            results: HashMap::new(),
            decision_log: Vec::new(),
            metrics: RollingMetrics::default(),
            error_count: 0,
            retry_count: 0,
            max_errors,
            max_retries,
            last_error: None,
        }
    }

    /// Whether the task-level error budget is used up.
    pub const fn errors_exhausted(&self) -> bool {
        self.error_count >= self.max_errors
    }

    /// Whether the task-level retry budget is used up.
    pub const fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    /// Whether the error count has gone past its ceiling.
    pub const fn errors_overflowed(&self) -> bool {
        self.error_count > self.max_errors
    }

    pub fn record_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }

    pub fn record_retry(&mut self) {
        self.retry_count = self.retry_count.saturating_add(1);
    }

    /// Dependencies that do not yet hold a `success` result.
    pub fn unmet_dependencies<'a, I>(&self, dependencies: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        dependencies
            .into_iter()
            .filter(|dep| !self.results.get(*dep).is_some_and(StepResult::is_success))
            .cloned()
            .collect()
    }

    /// Store a result, replacing any earlier attempt of the same step.
    pub fn store_result(&mut self, result: StepResult) {
        if result.status == StepStatus::Failed && !result.error.is_empty() {
            self.last_error = Some(result.error.clone());
        }
        self.results.insert(result.step_id.clone(), result);
        self.refresh_metrics();
    }

    /// Append one controller invocation to the decision log.
    pub fn log_decision(&mut self, evaluation: &Evaluation) {
        let reason = match &evaluation.decision {
            ControlDecision::Abort { reason } => Some(reason.clone()),
            ControlDecision::Retry { reason, .. } => Some(reason.as_str().to_string()),
            ControlDecision::Continue { .. } | ControlDecision::Complete => None,
        };
        self.decision_log.push(DecisionRecord {
            decision: evaluation.decision.kind(),
            step_id: evaluation.decision.step().map(|s| s.id.clone()),
            resource: evaluation.resource,
            reason,
            state: evaluation.state,
            quality: evaluation.quality.clone(),
            timestamp: Utc::now(),
        });
    }

    fn refresh_metrics(&mut self) {
        let count = self.results.len();
        if count == 0 {
            self.metrics = RollingMetrics::default();
            return;
        }
        let n = count as f64;
        let successes = self.results.values().filter(|r| r.is_success()).count() as f64;
        let total_ms: u64 = self.results.values().map(|r| r.duration_ms).sum();
        let confidence: f64 = self.results.values().map(|r| r.confidence).sum();

        self.metrics = RollingMetrics {
            avg_step_time_ms: total_ms as f64 / n,
            success_rate: successes / n,
            avg_confidence: confidence / n,
        };
    }
}
