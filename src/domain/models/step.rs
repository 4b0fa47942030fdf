//! Step domain model.
//!
//! A step is one node of a task's pipeline. Steps reference their
//! dependencies by id; the owning task stores them in an ordered arena.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default per-step retry budget.
pub const DEFAULT_STEP_MAX_RETRIES: u32 = 3;

/// Kind of work a step performs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Parse,
    ContextAnalysis,
    SqlGeneration,
    DataQuery,
    BusinessLogic,
    Calculation,
    Validation,
    Formatting,
    Aggregation,
    /// Extension point for kinds the core has no built-in knowledge of.
    Custom(String),
}

impl StepKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Parse => "parse",
            Self::ContextAnalysis => "context_analysis",
            Self::SqlGeneration => "sql_generation",
            Self::DataQuery => "data_query",
            Self::BusinessLogic => "business_logic",
            Self::Calculation => "calculation",
            Self::Validation => "validation",
            Self::Formatting => "formatting",
            Self::Aggregation => "aggregation",
            Self::Custom(name) => name,
        }
    }

    /// What the resource is expected to produce for this kind of step.
    pub const fn expectation(&self) -> &'static str {
        match self {
            Self::Parse => "Extract the entities, metrics and filters the request refers to",
            Self::ContextAnalysis => "Resolve ambiguous terms against the domain context",
            Self::SqlGeneration => "Produce a single SELECT statement answering the request",
            Self::DataQuery => "Return the rows produced by running the generated query",
            Self::BusinessLogic => "Apply the business rules that govern the requested figures",
            Self::Calculation => "Compute the requested aggregates from the queried data",
            Self::Validation => "Check the intermediate results for consistency and correctness",
            Self::Formatting => "Shape the final answer for presentation",
            Self::Aggregation => "Combine partial results into one answer",
            Self::Custom(_) => "Complete the step as described by the task",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource tier a step asks for.
///
/// `Auto` is resolved at dispatch time and never written back onto the step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceRequirement {
    #[default]
    Default,
    Think,
    Auto,
}

impl ResourceRequirement {
    /// The concrete tier, if this requirement is already resolved.
    pub const fn tier(self) -> Option<ResourceTier> {
        match self {
            Self::Default => Some(ResourceTier::Default),
            Self::Think => Some(ResourceTier::Think),
            Self::Auto => None,
        }
    }
}

impl From<ResourceTier> for ResourceRequirement {
    fn from(tier: ResourceTier) -> Self {
        match tier {
            ResourceTier::Default => Self::Default,
            ResourceTier::Think => Self::Think,
        }
    }
}

/// A concrete, registered resource tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceTier {
    /// Faster, cheaper text generation.
    Default,
    /// Higher-capability, slower text generation.
    Think,
}

impl ResourceTier {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Think => "think",
        }
    }
}

impl fmt::Display for ResourceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub kind: StepKind,
    #[serde(default)]
    pub resource_requirement: ResourceRequirement,
    #[serde(default)]
    pub tools: Vec<String>,
    /// Ids of steps that must hold a `success` result first.
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

const fn default_max_retries() -> u32 {
    DEFAULT_STEP_MAX_RETRIES
}

impl Step {
    pub fn new(id: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: id.into(),
            kind,
            resource_requirement: ResourceRequirement::Default,
            tools: Vec::new(),
            dependencies: BTreeSet::new(),
            retry_count: 0,
            max_retries: DEFAULT_STEP_MAX_RETRIES,
            timeout: None,
        }
    }

    pub const fn with_requirement(mut self, requirement: ResourceRequirement) -> Self {
        self.resource_requirement = requirement;
        self
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tools.push(tool.into());
        self
    }

    pub fn depends_on(mut self, step_id: impl Into<String>) -> Self {
        self.dependencies.insert(step_id.into());
        self
    }

    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Whether the per-step retry budget still allows another attempt.
    pub const fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Add a tool unless the step already lists it.
    pub fn ensure_tool(&mut self, tool: &str) {
        if !self.tools.iter().any(|t| t == tool) {
            self.tools.push(tool.to_string());
        }
    }
}

/// Outcome status of one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
    Retry,
    Aborted,
}

impl StepStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Retry => "retry",
            Self::Aborted => "aborted",
        }
    }
}

/// Outcome of one execution attempt of a step.
///
/// A new result is produced on every attempt and replaces the previous
/// entry for the same step in the control context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub status: StepStatus,
    #[serde(default)]
    pub data: Value,
    /// Empty on success.
    #[serde(default)]
    pub error: String,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_used: Option<ResourceTier>,
    pub confidence: f64,
    pub quality: f64,
}

impl StepResult {
    pub fn success(
        step_id: impl Into<String>,
        data: Value,
        resource_used: ResourceTier,
        confidence: f64,
        quality: f64,
        duration: Duration,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Success,
            data,
            error: String::new(),
            duration_ms: duration_millis(duration),
            resource_used: Some(resource_used),
            confidence,
            quality,
        }
    }

    pub fn failed(
        step_id: impl Into<String>,
        error: impl Into<String>,
        resource_used: Option<ResourceTier>,
        duration: Duration,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Failed,
            data: Value::Null,
            error: error.into(),
            duration_ms: duration_millis(duration),
            resource_used,
            confidence: 0.0,
            quality: 0.0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_fields() {
        let step = Step::new("s2", StepKind::SqlGeneration)
            .with_requirement(ResourceRequirement::Think)
            .with_tool("sql_executor")
            .depends_on("s1")
            .with_max_retries(5);

        assert_eq!(step.resource_requirement, ResourceRequirement::Think);
        assert_eq!(step.tools, vec!["sql_executor".to_string()]);
        assert!(step.dependencies.contains("s1"));
        assert_eq!(step.max_retries, 5);
        assert!(step.can_retry());
    }

    #[test]
    fn test_ensure_tool_is_idempotent() {
        let mut step = Step::new("s1", StepKind::Parse);
        step.ensure_tool("enhanced_reasoning");
        step.ensure_tool("enhanced_reasoning");
        assert_eq!(step.tools.len(), 1);
    }

    #[test]
    fn test_requirement_tier() {
        assert_eq!(ResourceRequirement::Think.tier(), Some(ResourceTier::Think));
        assert_eq!(ResourceRequirement::Default.tier(), Some(ResourceTier::Default));
        assert_eq!(ResourceRequirement::Auto.tier(), None);
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&StepKind::SqlGeneration).unwrap();
        assert_eq!(json, "\"sql_generation\"");
        assert_eq!(StepKind::Custom("enrich".into()).as_str(), "enrich");
    }

    #[test]
    fn test_failed_result_has_zero_scores() {
        let result = StepResult::failed("s1", "boom", None, Duration::from_millis(3));
        assert_eq!(result.status, StepStatus::Failed);
        assert_eq!(result.error, "boom");
        assert_eq!(result.duration_ms, 3);
        assert!(result.confidence.abs() < f64::EPSILON);
    }
}
