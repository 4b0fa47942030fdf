//! Control decisions and the snapshots recorded alongside them.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::step::{ResourceTier, Step};

/// Decision returned by the controller for one loop iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlDecision {
    /// Dispatch `step`, first moving the task cursor to `cursor`.
    Continue { cursor: usize, step: Step },
    /// Dispatch `step` again; its `retry_count` is already incremented.
    Retry { step: Step, reason: RetryReason },
    /// Every step finished acceptably.
    Complete,
    /// Stop the task.
    Abort { reason: String },
}

impl ControlDecision {
    pub const fn kind(&self) -> DecisionKind {
        match self {
            Self::Continue { .. } => DecisionKind::Continue,
            Self::Retry { .. } => DecisionKind::Retry,
            Self::Complete => DecisionKind::Complete,
            Self::Abort { .. } => DecisionKind::Abort,
        }
    }

    /// The step to dispatch, if the decision dispatches one.
    pub const fn step(&self) -> Option<&Step> {
        match self {
            Self::Continue { step, .. } | Self::Retry { step, .. } => Some(step),
            Self::Complete | Self::Abort { .. } => None,
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Abort { .. })
    }
}

/// Tag of a [`ControlDecision`], as stored in the decision log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Continue,
    Retry,
    Complete,
    Abort,
}

impl DecisionKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Retry => "retry",
            Self::Complete => "complete",
            Self::Abort => "abort",
        }
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a step is being dispatched again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryReason {
    /// The previous attempt failed.
    Failure,
    /// The previous attempt succeeded with low confidence; the retry runs
    /// on the think tier with enhanced reasoning.
    LowConfidence,
}

impl RetryReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Failure => "failure",
            Self::LowConfidence => "low_confidence",
        }
    }
}

/// Aggregate view over every result held by a control context.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StateAnalysis {
    /// Number of results the figures were computed from.
    pub sample_count: usize,
    pub success_rate: f64,
    pub error_rate: f64,
    pub avg_confidence: f64,
    pub avg_quality: f64,
    pub execution_time_ms: u64,
}

/// Confidence bucket of a single result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    /// `high` at 0.8 and above, `medium` from 0.6, `low` otherwise.
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.8 {
            Self::High
        } else if confidence >= 0.6 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Assessment of the current step's latest result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub step_id: String,
    pub confidence_level: ConfidenceLevel,
    /// Outcome of the kind-specific heuristic, `None` when the kind has none.
    pub check_passed: Option<bool>,
    /// Short description of the heuristic that ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<String>,
}

/// Everything the controller produced for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub decision: ControlDecision,
    /// Tier the dispatched step resolved to, if a step is dispatched.
    pub resource: Option<ResourceTier>,
    pub state: StateAnalysis,
    pub quality: Option<QualityAssessment>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::step::StepKind;

    #[test]
    fn test_confidence_level_boundaries() {
        assert_eq!(ConfidenceLevel::from_confidence(0.8), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_confidence(0.799), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_confidence(0.6), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_confidence(0.599), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::from_confidence(0.0), ConfidenceLevel::Low);
    }

    #[test]
    fn test_decision_accessors() {
        let step = Step::new("s1", StepKind::Parse);
        let decision = ControlDecision::Continue { cursor: 0, step };
        assert_eq!(decision.kind(), DecisionKind::Continue);
        assert_eq!(decision.step().map(|s| s.id.as_str()), Some("s1"));
        assert!(!decision.is_terminal());

        let abort = ControlDecision::Abort { reason: "x".into() };
        assert!(abort.is_terminal());
        assert!(abort.step().is_none());
    }
}
