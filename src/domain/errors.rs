//! Domain errors for the stepwise orchestration core.

use std::time::Duration;

use thiserror::Error;

/// Format a list of step ids as a comma separated string.
fn format_ids(ids: &[String]) -> String {
    ids.join(", ")
}

/// Domain-level errors that can occur while building or running a task.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Duplicate step id: {0}")]
    DuplicateStepId(String),

    #[error("Step {step_id} depends on {dependency}, which is not an earlier step")]
    InvalidDependency { step_id: String, dependency: String },

    #[error("dependency not satisfied: {}", format_ids(.0))]
    DependencyNotSatisfied(Vec<String>),

    #[error("Resource not registered: {0}")]
    ResourceNotRegistered(String),

    #[error("Tool not registered: {0}")]
    ToolNotRegistered(String),

    #[error("Unresolved resource requirement for step {0}")]
    UnresolvedRequirement(String),

    #[error("Resource {resource} failed: {message}")]
    ResourceFailed { resource: String, message: String },

    #[error("Tool {tool} failed: {message}")]
    ToolFailed { tool: String, message: String },

    #[error("Step {step_id} timed out after {}ms", .timeout.as_millis())]
    StepTimeout { step_id: String, timeout: Duration },

    #[error("Controller invariant violated: {0}")]
    ControllerInvariant(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Result alias used across the domain and services.
pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Whether this error is a missing-registration problem rather than a
    /// failure of an external call.
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::ResourceNotRegistered(_) | Self::ToolNotRegistered(_) | Self::UnresolvedRequirement(_)
        )
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
