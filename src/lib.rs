//! Stepwise - Task Orchestration Engine
//!
//! Stepwise runs multi-step AI-assisted tasks as a dependency-checked chain
//! of steps, with per-step retries, dynamic resource tier selection and
//! quality-gated progression.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Task, step and decision models, errors, ports
//! - **Service Layer** (`services`): Pure decision logic, routing, planning
//! - **Application Layer** (`application`): The execution runner
//! - **Adapters** (`adapters`): Closure-backed and scripted collaborators
//! - **Infrastructure Layer** (`infrastructure`): Configuration and logging
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use serde_json::json;
//! use stepwise::adapters::{FnTool, MockResource};
//! use stepwise::domain::models::{TaskAnalysis, TaskTraits};
//! use stepwise::{Engine, StatsCollector};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = stepwise::ConfigLoader::load()?;
//!     let mut engine = Engine::from_config(&config, StatsCollector::new());
//!
//!     let model = Arc::new(MockResource::new("model").with_default_response(json!("SELECT 1")));
//!     engine.register_resources(model.clone(), model);
//!     engine.register_tool(Arc::new(FnTool::new("sql_executor", |_input| async {
//!         Ok(json!([{ "total": 42 }]))
//!     })));
//!
//!     let analysis = TaskAnalysis::new("total revenue", "sales", 0.9).with_traits(TaskTraits {
//!         needs_generation: true,
//!         ..TaskTraits::default()
//!     });
//!     let report = engine.plan_and_run(analysis).await?;
//!     println!("{}", serde_json::to_string_pretty(&report)?);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use application::{Engine, EngineEvent};
pub use domain::models::{
    Config, ControlContext, ControlDecision, EngineConfig, FinalReport, LoggingConfig, ReportStatus,
    ResourceRequirement, ResourceTier, RetryConfig, Step, StepKind, StepResult, StepStatus, Task,
    TaskAnalysis,
};
pub use domain::ports::{Resource, Tool, ToolInput};
pub use domain::{DomainError, DomainResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use infrastructure::logging::LoggerImpl;
pub use services::{Controller, StatsCollector, StepPlanner};
