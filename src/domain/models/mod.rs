pub mod config;
pub mod context;
pub mod decision;
pub mod report;
pub mod step;
pub mod task;

pub use config::{Config, EngineConfig, LoggingConfig, RetryConfig};
pub use context::{ControlContext, DecisionRecord, RollingMetrics};
pub use decision::{
    ConfidenceLevel, ControlDecision, DecisionKind, Evaluation, QualityAssessment, RetryReason,
    StateAnalysis,
};
pub use report::{FinalReport, ReportStatus, StepOutcome};
pub use step::{ResourceRequirement, ResourceTier, Step, StepKind, StepResult, StepStatus};
pub use task::{Complexity, Task, TaskAnalysis, TaskSummary, TaskTraits};
