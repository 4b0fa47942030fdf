//! Task domain model.
//!
//! A task is one unit of orchestrated work: upstream analysis metadata plus
//! an ordered, dependency-checked list of steps. Steps live in an arena and
//! are addressed by index; dependencies are edges by step id.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::step::Step;
use crate::domain::errors::{DomainError, DomainResult};

/// Coarse task classification derived once from upstream signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    #[default]
    Simple,
    Medium,
    High,
    VeryHigh,
}

impl Complexity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Medium => "medium",
            Self::High => "high",
            Self::VeryHigh => "very_high",
        }
    }

    /// Classify from a point total.
    pub const fn from_points(points: u32) -> Self {
        match points {
            p if p >= 7 => Self::VeryHigh,
            p if p >= 4 => Self::High,
            p if p >= 2 => Self::Medium,
            _ => Self::Simple,
        }
    }

    /// Compute complexity from upstream confidence and technical flags.
    pub fn assess(confidence: f64, traits: &TaskTraits) -> Self {
        let mut points = 0;
        if traits.multi_table {
            points += 2;
        }
        if traits.business_rules {
            points += 2;
        }
        if traits.conditional_filters {
            points += 1;
        }
        if traits.time_dimension {
            points += 1;
        }
        if traits.aggregation {
            points += 1;
        }
        if confidence < 0.5 {
            points += 2;
        } else if confidence < 0.7 {
            points += 1;
        }
        Self::from_points(points)
    }

    /// Whether this complexity calls for the higher resource tier.
    pub const fn is_demanding(self) -> bool {
        matches!(self, Self::High | Self::VeryHigh)
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boolean traits describing the data and semantics of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskTraits {
    /// The answer needs a generated query.
    pub needs_generation: bool,
    pub multi_table: bool,
    pub conditional_filters: bool,
    pub business_rules: bool,
    pub time_dimension: bool,
    pub aggregation: bool,
}

/// Output of the upstream semantic analysis a task is built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAnalysis {
    #[serde(default)]
    pub id: Option<String>,
    pub description: String,
    #[serde(default)]
    pub domain: String,
    pub confidence: f64,
    #[serde(default)]
    pub traits: TaskTraits,
}

impl TaskAnalysis {
    pub fn new(description: impl Into<String>, domain: impl Into<String>, confidence: f64) -> Self {
        Self {
            id: None,
            description: description.into(),
            domain: domain.into(),
            confidence,
            traits: TaskTraits::default(),
        }
    }

    pub const fn with_traits(mut self, traits: TaskTraits) -> Self {
        self.traits = traits;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Read-only view of task metadata handed to resources and tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: String,
    pub description: String,
    pub domain: String,
    pub confidence: f64,
    pub complexity: Complexity,
}

/// One unit of orchestrated work.
///
/// Deserialized tasks pass the same step checks as [`Task::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TaskRepr")]
pub struct Task {
    pub id: String,
    pub description: String,
    pub domain: String,
    pub confidence: f64,
    pub complexity: Complexity,
    steps: Vec<Step>,
    /// Index of the next step to attempt.
    pub cursor: usize,
}

impl Task {
    /// Build a task from analysis and an explicit step list.
    ///
    /// Fails if step ids repeat or a step depends on anything other than an
    /// earlier step.
    pub fn new(analysis: TaskAnalysis, steps: Vec<Step>) -> DomainResult<Self> {
        validate_confidence(analysis.confidence)?;
        validate_steps(&steps)?;

        let id = analysis
            .id
            .clone()
            .unwrap_or_else(|| content_id(&analysis.domain, &analysis.description));
        let confidence = analysis.confidence.clamp(0.0, 1.0);

        Ok(Self {
            id,
            complexity: Complexity::assess(confidence, &analysis.traits),
            description: analysis.description,
            domain: analysis.domain,
            confidence,
            steps,
            cursor: 0,
        })
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// The step under the cursor, if any remain.
    pub fn current_step(&self) -> Option<&Step> {
        self.steps.get(self.cursor)
    }

    pub fn is_complete(&self) -> bool {
        self.cursor >= self.steps.len()
    }

    /// Move the cursor; positions past the end are clamped.
    pub fn advance_to(&mut self, cursor: usize) {
        self.cursor = cursor.min(self.steps.len());
    }

    /// Persist the retry counter of a dispatched retry onto the stored step.
    pub fn record_retry(&mut self, step_id: &str, retry_count: u32) {
        if let Some(step) = self.steps.iter_mut().find(|s| s.id == step_id) {
            step.retry_count = step.retry_count.max(retry_count);
        }
    }

    pub fn summary(&self) -> TaskSummary {
        TaskSummary {
            id: self.id.clone(),
            description: self.description.clone(),
            domain: self.domain.clone(),
            confidence: self.confidence,
            complexity: self.complexity,
        }
    }
}

/// Wire form of [`Task`], checked on the way in.
#[derive(Deserialize)]
struct TaskRepr {
    id: String,
    description: String,
    #[serde(default)]
    domain: String,
    confidence: f64,
    #[serde(default)]
    complexity: Complexity,
    #[serde(default)]
    steps: Vec<Step>,
    #[serde(default)]
    cursor: usize,
}

impl TryFrom<TaskRepr> for Task {
    type Error = DomainError;

    fn try_from(repr: TaskRepr) -> DomainResult<Self> {
        validate_confidence(repr.confidence)?;
        validate_steps(&repr.steps)?;
        Ok(Self {
            id: repr.id,
            description: repr.description,
            domain: repr.domain,
            confidence: repr.confidence.clamp(0.0, 1.0),
            complexity: repr.complexity,
            cursor: repr.cursor.min(repr.steps.len()),
            steps: repr.steps,
        })
    }
}

/// Stable id derived from the task's content.
fn content_id(domain: &str, description: &str) -> String {
    let content = format!("{domain}\n{description}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, content.as_bytes()).to_string()
}

fn validate_confidence(confidence: f64) -> DomainResult<()> {
    if confidence.is_finite() {
        Ok(())
    } else {
        Err(DomainError::ValidationFailed(format!(
            "confidence must be a finite number, got {confidence}"
        )))
    }
}

fn validate_steps(steps: &[Step]) -> DomainResult<()> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(steps.len());
    let positions: HashMap<&str, usize> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();

    for (index, step) in steps.iter().enumerate() {
        if !seen.insert(step.id.as_str()) {
            return Err(DomainError::DuplicateStepId(step.id.clone()));
        }
        for dep in &step.dependencies {
            match positions.get(dep.as_str()) {
                Some(&pos) if pos < index => {}
                _ => {
                    return Err(DomainError::InvalidDependency {
                        step_id: step.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}
