//! Control decision engine.
//!
//! Pure decision logic over a [`ControlContext`]: no I/O, no hidden state.
//! Given the same context the controller always returns the same decision,
//! and it never mutates the context. The engine applies cursor moves and
//! counter updates after the fact.
//!
//! Evaluation order:
//! 1. task-level budgets (errors, retries) → `abort`
//! 2. cursor at the end → `complete`
//! 3. current step not attempted → `continue`
//! 4. current step failed → `retry` while its budget allows, else `abort`
//! 5. current step succeeded with low confidence → `retry` on the think tier
//! 6. otherwise advance → `continue` with the next step, or `complete`

use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ConfidenceLevel, ControlContext, ControlDecision, Evaluation, QualityAssessment, ResourceRequirement,
    RetryReason, StateAnalysis, Step, StepStatus,
};
use crate::services::quality;
use crate::services::resource_router;

/// Tool added to steps escalated for low confidence.
pub const ENHANCED_REASONING_TOOL: &str = "enhanced_reasoning";

/// Low-confidence escalations allowed per step.
pub const MAX_QUALITY_RETRIES: u32 = 2;

/// Stateless decision engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct Controller;

impl Controller {
    pub const fn new() -> Self {
        Self
    }

    /// Decide what the engine should do next.
    ///
    /// Internal invariant violations surface as an `abort` carrying the
    /// violation message.
    pub fn decide(&self, context: &ControlContext) -> ControlDecision {
        match self.evaluate(context) {
            Ok(evaluation) => evaluation.decision,
            Err(err) => ControlDecision::Abort {
                reason: err.to_string(),
            },
        }
    }

    /// Decide, returning the state and quality snapshots the decision was
    /// based on.
    pub fn evaluate(&self, context: &ControlContext) -> DomainResult<Evaluation> {
        let state = Self::analyze_state(context);

        if context.errors_exhausted() {
            return Ok(terminal(
                ControlDecision::Abort {
                    reason: format!(
                        "error budget exhausted ({}/{})",
                        context.error_count, context.max_errors
                    ),
                },
                state,
                None,
            ));
        }
        if context.retries_exhausted() {
            return Ok(terminal(
                ControlDecision::Abort {
                    reason: format!(
                        "retry budget exhausted ({}/{})",
                        context.retry_count, context.max_retries
                    ),
                },
                state,
                None,
            ));
        }

        let task = &context.task;
        let steps = task.steps();
        let cursor = task.cursor;

        if cursor == steps.len() {
            return Ok(terminal(ControlDecision::Complete, state, None));
        }
        let current = steps.get(cursor).ok_or_else(|| {
            DomainError::ControllerInvariant(format!("cursor {cursor} past {} steps", steps.len()))
        })?;

        let Some(result) = context.results.get(&current.id) else {
            return Ok(dispatch(context, cursor, current, state, None));
        };

        let assessment = quality::assess(&current.kind, result);

        match result.status {
            StepStatus::Failed => {
                if current.can_retry() {
                    let mut step = current.clone();
                    step.retry_count += 1;
                    Ok(retry(context, step, RetryReason::Failure, state, assessment))
                } else {
                    Ok(terminal(
                        ControlDecision::Abort {
                            reason: format!(
                                "step {} exhausted its retries ({}/{}): {}",
                                current.id, current.retry_count, current.max_retries, result.error
                            ),
                        },
                        state,
                        Some(assessment),
                    ))
                }
            }
            StepStatus::Success => {
                if assessment.confidence_level == ConfidenceLevel::Low
                    && current.retry_count < MAX_QUALITY_RETRIES
                    && current.can_retry()
                {
                    return Ok(retry(
                        context,
                        escalate(current),
                        RetryReason::LowConfidence,
                        state,
                        assessment,
                    ));
                }

                let next = cursor + 1;
                match steps.get(next) {
                    None => Ok(terminal(ControlDecision::Complete, state, Some(assessment))),
                    Some(step) => Ok(dispatch(context, next, step, state, Some(assessment))),
                }
            }
            other => Err(DomainError::ControllerInvariant(format!(
                "step {} holds a result with status {}",
                current.id,
                other.as_str()
            ))),
        }
    }

    /// Aggregate figures over every result in the context.
    pub fn analyze_state(context: &ControlContext) -> StateAnalysis {
        let results = &context.results;
        if results.is_empty() {
            return StateAnalysis::default();
        }

        let n = results.len() as f64;
        let successes = results.values().filter(|r| r.status == StepStatus::Success).count();
        let failures = results.values().filter(|r| r.status == StepStatus::Failed).count();

        StateAnalysis {
            sample_count: results.len(),
            success_rate: successes as f64 / n,
            error_rate: failures as f64 / n,
            avg_confidence: results.values().map(|r| r.confidence).sum::<f64>() / n,
            avg_quality: results.values().map(|r| r.quality).sum::<f64>() / n,
            execution_time_ms: results.values().map(|r| r.duration_ms).sum(),
        }
    }

    /// Assess the current step's latest result, if it has one.
    pub fn assess_quality(context: &ControlContext) -> Option<QualityAssessment> {
        let step = context.task.current_step()?;
        let result = context.results.get(&step.id)?;
        Some(quality::assess(&step.kind, result))
    }
}

/// Copy of `step` forced onto the think tier with enhanced reasoning.
fn escalate(step: &Step) -> Step {
    let mut escalated = step.clone();
    escalated.resource_requirement = ResourceRequirement::Think;
    escalated.ensure_tool(ENHANCED_REASONING_TOOL);
    escalated.retry_count += 1;
    escalated
}

fn terminal(decision: ControlDecision, state: StateAnalysis, quality: Option<QualityAssessment>) -> Evaluation {
    debug!(decision = %decision.kind(), "terminal decision");
    Evaluation {
        decision,
        resource: None,
        state,
        quality,
    }
}

fn dispatch(
    context: &ControlContext,
    cursor: usize,
    step: &Step,
    state: StateAnalysis,
    quality: Option<QualityAssessment>,
) -> Evaluation {
    let (step, selection) = resource_router::resolve_step(step, context.task.complexity, &state);
    debug!(
        step_id = %step.id,
        resource = %selection.tier,
        reason = %selection.reason,
        "continue"
    );
    Evaluation {
        decision: ControlDecision::Continue { cursor, step },
        resource: Some(selection.tier),
        state,
        quality,
    }
}

fn retry(
    context: &ControlContext,
    step: Step,
    reason: RetryReason,
    state: StateAnalysis,
    assessment: QualityAssessment,
) -> Evaluation {
    let (step, selection) = resource_router::resolve_step(&step, context.task.complexity, &state);
    debug!(
        step_id = %step.id,
        retry_count = step.retry_count,
        reason = reason.as_str(),
        resource = %selection.tier,
        "retry"
    );
    Evaluation {
        decision: ControlDecision::Retry { step, reason },
        resource: Some(selection.tier),
        state,
        quality: Some(assessment),
    }
}
