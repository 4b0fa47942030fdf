//! Step Planner Service
//!
//! Turns upstream analysis into a task with a pre-populated step chain.
//! Every generated step depends on exactly the step before it; the chain
//! always starts with `parse` and ends with `formatting`.

use tracing::{debug, instrument};

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    Complexity, ResourceRequirement, Step, StepKind, Task, TaskAnalysis,
};
use crate::domain::models::step::DEFAULT_STEP_MAX_RETRIES;

/// Tool attached to generated `data_query` steps.
pub const SQL_EXECUTOR_TOOL: &str = "sql_executor";

/// Confidence below which a context analysis step is inserted.
const CONTEXT_ANALYSIS_THRESHOLD: f64 = 0.8;

/// Builds tasks with the default step chain.
///
/// # Examples
///
/// ```
/// use stepwise::domain::models::{TaskAnalysis, TaskTraits};
/// use stepwise::services::StepPlanner;
///
/// let analysis = TaskAnalysis::new("revenue by region", "sales", 0.9)
///     .with_traits(TaskTraits { needs_generation: true, ..TaskTraits::default() });
/// let task = StepPlanner::new().build_task(analysis).unwrap();
/// assert_eq!(task.steps().first().map(|s| s.kind.as_str()), Some("parse"));
/// ```
#[derive(Debug, Clone)]
pub struct StepPlanner {
    step_max_retries: u32,
}

impl StepPlanner {
    /// Create a planner giving every step the default retry budget.
    pub const fn new() -> Self {
        Self {
            step_max_retries: DEFAULT_STEP_MAX_RETRIES,
        }
    }

    /// Retry budget assigned to every generated step.
    pub const fn with_step_max_retries(mut self, step_max_retries: u32) -> Self {
        self.step_max_retries = step_max_retries;
        self
    }

    /// Build a task whose steps are generated from the analysis.
    #[instrument(skip(self, analysis), fields(domain = %analysis.domain))]
    pub fn build_task(&self, analysis: TaskAnalysis) -> DomainResult<Task> {
        let steps = self.plan(&analysis);
        let task = Task::new(analysis, steps)?;
        debug!(
            task_id = %task.id,
            complexity = %task.complexity,
            steps = task.steps().len(),
            "planned task"
        );
        Ok(task)
    }

    /// Generate the step chain for an analysis.
    pub fn plan(&self, analysis: &TaskAnalysis) -> Vec<Step> {
        let traits = &analysis.traits;
        let complexity = Complexity::assess(analysis.confidence, traits);

        let mut kinds: Vec<(StepKind, ResourceRequirement)> = vec![(StepKind::Parse, ResourceRequirement::Default)];

        if analysis.confidence < CONTEXT_ANALYSIS_THRESHOLD {
            kinds.push((StepKind::ContextAnalysis, ResourceRequirement::Auto));
        }
        if traits.needs_generation {
            let requirement = if traits.multi_table || traits.conditional_filters {
                ResourceRequirement::Think
            } else {
                ResourceRequirement::Default
            };
            kinds.push((StepKind::SqlGeneration, requirement));
        }
        kinds.push((StepKind::DataQuery, ResourceRequirement::Default));
        if traits.business_rules {
            kinds.push((StepKind::BusinessLogic, ResourceRequirement::Auto));
        }
        if traits.aggregation {
            kinds.push((StepKind::Calculation, ResourceRequirement::Auto));
        }
        if complexity.is_demanding() {
            kinds.push((StepKind::Validation, ResourceRequirement::Think));
        }
        kinds.push((StepKind::Formatting, ResourceRequirement::Default));

        let mut steps: Vec<Step> = Vec::with_capacity(kinds.len());
        for (index, (kind, requirement)) in kinds.into_iter().enumerate() {
            let id = format!("step_{}_{}", index + 1, kind.as_str());
            let mut step = Step::new(id, kind)
                .with_requirement(requirement)
                .with_max_retries(self.step_max_retries);
            if step.kind == StepKind::DataQuery {
                step.ensure_tool(SQL_EXECUTOR_TOOL);
            }
            if let Some(previous) = steps.last() {
                step = step.depends_on(previous.id.clone());
            }
            steps.push(step);
        }
        steps
    }
}

impl Default for StepPlanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TaskTraits;

    fn kinds(task: &Task) -> Vec<&str> {
        task.steps().iter().map(|s| s.kind.as_str()).collect()
    }

    #[test]
    fn test_minimal_chain() {
        let task = StepPlanner::new()
            .build_task(TaskAnalysis::new("list users", "crm", 0.95))
            .unwrap();
        assert_eq!(kinds(&task), vec!["parse", "data_query", "formatting"]);
        assert_eq!(task.complexity, Complexity::Simple);
    }

    #[test]
    fn test_full_chain() {
        let traits = TaskTraits {
            needs_generation: true,
            multi_table: true,
            conditional_filters: true,
            business_rules: true,
            time_dimension: true,
            aggregation: true,
        };
        let task = StepPlanner::new()
            .build_task(TaskAnalysis::new("margin by quarter", "finance", 0.6).with_traits(traits))
            .unwrap();

        assert_eq!(
            kinds(&task),
            vec![
                "parse",
                "context_analysis",
                "sql_generation",
                "data_query",
                "business_logic",
                "calculation",
                "validation",
                "formatting"
            ]
        );
        assert_eq!(task.complexity, Complexity::VeryHigh);

        let sql = &task.steps()[2];
        assert_eq!(sql.resource_requirement, ResourceRequirement::Think);
        let validation = &task.steps()[6];
        assert_eq!(validation.resource_requirement, ResourceRequirement::Think);
    }

    #[test]
    fn test_linear_dependencies() {
        let traits = TaskTraits {
            needs_generation: true,
            ..TaskTraits::default()
        };
        let task = StepPlanner::new()
            .build_task(TaskAnalysis::new("count orders", "sales", 0.9).with_traits(traits))
            .unwrap();

        let steps = task.steps();
        assert!(steps[0].dependencies.is_empty());
        for pair in steps.windows(2) {
            assert_eq!(pair[1].dependencies.len(), 1);
            assert!(pair[1].dependencies.contains(&pair[0].id));
        }
        assert_eq!(steps[1].resource_requirement, ResourceRequirement::Default);
    }

    #[test]
    fn test_data_query_gets_executor_tool() {
        let task = StepPlanner::new()
            .build_task(TaskAnalysis::new("list users", "crm", 0.95))
            .unwrap();
        let query = task.steps().iter().find(|s| s.kind == StepKind::DataQuery).unwrap();
        assert_eq!(query.tools, vec![SQL_EXECUTOR_TOOL.to_string()]);
    }

    #[test]
    fn test_retry_budget_applied() {
        let task = StepPlanner::new()
            .with_step_max_retries(7)
            .build_task(TaskAnalysis::new("list users", "crm", 0.95))
            .unwrap();
        assert!(task.steps().iter().all(|s| s.max_retries == 7));
    }
}
