//! Final report emitted at the end of every run.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::context::{ControlContext, DecisionRecord, RollingMetrics};
use super::step::StepStatus;

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Success,
    Error,
    Cancelled,
}

impl ReportStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Status of one step as of the end of the run, in pipeline order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step_id: String,
    pub status: StepStatus,
    pub retry_count: u32,
}

/// What callers receive from every run, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalReport {
    pub task_id: String,
    pub status: ReportStatus,
    /// Payload of the last successful step, on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Last error message, on error or cancellation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_ms: u64,
    pub steps: Vec<StepOutcome>,
    pub metrics: RollingMetrics,
    pub decision_log: Vec<DecisionRecord>,
    pub error_count: u32,
    pub retry_count: u32,
}

impl FinalReport {
    /// Build the success report: the result is the payload of the last step,
    /// walking backwards, whose result is a success.
    pub fn success(context: &ControlContext, execution_time_ms: u64) -> Self {
        let result = context
            .task
            .steps()
            .iter()
            .rev()
            .find_map(|step| context.results.get(&step.id).filter(|r| r.is_success()))
            .map(|r| r.data.clone());

        Self {
            result,
            error: None,
            ..Self::base(context, ReportStatus::Success, execution_time_ms)
        }
    }

    /// Build the error report carrying the last known error message.
    pub fn error(context: &ControlContext, message: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::base(context, ReportStatus::Error, execution_time_ms)
        }
    }

    pub fn cancelled(context: &ControlContext, execution_time_ms: u64) -> Self {
        Self {
            error: Some("task cancelled".to_string()),
            ..Self::base(context, ReportStatus::Cancelled, execution_time_ms)
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ReportStatus::Success
    }

    /// Status of a step by id.
    pub fn step_status(&self, step_id: &str) -> Option<StepStatus> {
        self.steps
            .iter()
            .find(|s| s.step_id == step_id)
            .map(|s| s.status)
    }

    fn base(context: &ControlContext, status: ReportStatus, execution_time_ms: u64) -> Self {
        let steps = context
            .task
            .steps()
            .iter()
            .map(|step| StepOutcome {
                step_id: step.id.clone(),
                status: context
                    .results
                    .get(&step.id)
                    .map_or(StepStatus::Pending, |r| r.status),
                retry_count: step.retry_count,
            })
            .collect();

        Self {
            task_id: context.task.id.clone(),
            status,
            result: None,
            error: None,
            execution_time_ms,
            steps,
            metrics: context.metrics,
            decision_log: context.decision_log.clone(),
            error_count: context.error_count,
            retry_count: context.retry_count,
        }
    }
}
