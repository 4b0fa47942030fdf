//! Result quality heuristics.
//!
//! Two independent uses: the controller records kind-specific checks in the
//! decision log, and the engine derives confidence/quality scores for every
//! successful attempt. Only the confidence bucket feeds control flow.

use serde_json::Value;

use crate::domain::models::{ConfidenceLevel, QualityAssessment, StepKind, StepResult};

/// Scores used when a kind has no specific heuristic and the payload does
/// not report its own.
pub const DEFAULT_CONFIDENCE: f64 = 0.8;
/// See [`DEFAULT_CONFIDENCE`].
pub const DEFAULT_QUALITY: f64 = 0.8;

const SELECT_MARKER: &str = "SELECT";

/// Whether a payload textually contains a `SELECT` marker.
pub fn contains_select(payload: &Value) -> bool {
    let text = match payload {
        Value::String(s) => s.to_uppercase(),
        Value::Null => return false,
        other => other.to_string().to_uppercase(),
    };
    text.contains(SELECT_MARKER)
}

/// Whether a payload carries no data.
pub fn is_empty_payload(payload: &Value) -> bool {
    match payload {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Assess the latest result of the current step.
pub fn assess(kind: &StepKind, result: &StepResult) -> QualityAssessment {
    let (check, passed) = match kind {
        StepKind::SqlGeneration => ("select_marker", Some(contains_select(&result.data))),
        StepKind::BusinessLogic => (
            "confidence>0.6,quality>0.7",
            Some(result.confidence > 0.6 && result.quality > 0.7),
        ),
        StepKind::DataQuery => (
            "non_empty,confidence>0.5",
            Some(!is_empty_payload(&result.data) && result.confidence > 0.5),
        ),
        StepKind::Formatting => ("quality>0.8", Some(result.quality > 0.8)),
        _ => ("none", None),
    };

    QualityAssessment {
        step_id: result.step_id.clone(),
        confidence_level: ConfidenceLevel::from_confidence(result.confidence),
        check_passed: passed,
        check: passed.map(|_| check.to_string()),
    }
}

/// Derive `(confidence, quality)` for a successful attempt.
///
/// Payload objects may self-report `confidence` and `quality`; the
/// kind-specific caps are applied on top.
pub fn score(kind: &StepKind, payload: &Value) -> (f64, f64) {
    let confidence = reported(payload, "confidence").unwrap_or(DEFAULT_CONFIDENCE);
    let quality = reported(payload, "quality").unwrap_or(DEFAULT_QUALITY);

    match kind {
        StepKind::SqlGeneration if !contains_select(payload) => (confidence.min(0.4), quality.min(0.3)),
        StepKind::DataQuery if is_empty_payload(payload) => (confidence.min(0.3), quality.min(0.2)),
        _ => (confidence, quality),
    }
}

fn reported(payload: &Value, field: &str) -> Option<f64> {
    payload
        .get(field)
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 1.0))
}
