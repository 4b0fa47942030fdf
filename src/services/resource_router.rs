//! Dispatch-time resource tier selection.
//!
//! `auto` requirements are resolved every time a step is dispatched, from
//! the step, the task complexity and the rolling state of the run. The
//! resolved tier is never written back onto the stored step.

use crate::domain::models::{Complexity, ResourceRequirement, ResourceTier, StateAnalysis, Step, StepKind};

/// Rolling confidence below which `auto` escalates to think.
pub const CONFIDENCE_FLOOR: f64 = 0.7;
/// Rolling error rate above which `auto` escalates to think.
pub const ERROR_RATE_CEILING: f64 = 0.2;

/// Result of a routing decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierSelection {
    /// Selected tier.
    pub tier: ResourceTier,
    /// Reason for selection.
    pub reason: String,
    /// Whether the step asked for `auto`.
    pub resolved: bool,
}

/// Resolve a step's requirement to a concrete tier.
pub fn select_tier(step: &Step, complexity: Complexity, state: &StateAnalysis) -> TierSelection {
    if let Some(tier) = step.resource_requirement.tier() {
        return TierSelection {
            tier,
            reason: format!("declared {tier}"),
            resolved: false,
        };
    }

    let reason = if complexity.is_demanding() {
        Some(format!("{complexity} complexity"))
    } else if demanding_kind(&step.kind) {
        Some(format!("{} step", step.kind))
    } else if state.sample_count > 0 && state.avg_confidence < CONFIDENCE_FLOOR {
        Some(format!("rolling confidence {:.2}", state.avg_confidence))
    } else if state.sample_count > 0 && state.error_rate > ERROR_RATE_CEILING {
        Some(format!("rolling error rate {:.2}", state.error_rate))
    } else {
        None
    };

    match reason {
        Some(reason) => TierSelection {
            tier: ResourceTier::Think,
            reason,
            resolved: true,
        },
        None => TierSelection {
            tier: ResourceTier::Default,
            reason: "no escalation signal".to_string(),
            resolved: true,
        },
    }
}

/// Copy of `step` with its requirement replaced by the selected tier.
pub fn resolve_step(step: &Step, complexity: Complexity, state: &StateAnalysis) -> (Step, TierSelection) {
    let selection = select_tier(step, complexity, state);
    let mut resolved = step.clone();
    resolved.resource_requirement = ResourceRequirement::from(selection.tier);
    (resolved, selection)
}

const fn demanding_kind(kind: &StepKind) -> bool {
    matches!(
        kind,
        StepKind::SqlGeneration | StepKind::BusinessLogic | StepKind::Validation
    )
}
