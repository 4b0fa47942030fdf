//! Service layer: pure orchestration logic.
//!
//! Nothing in here performs I/O. The engine in `application` drives these
//! services and owns every side effect.

pub mod controller;
pub mod execution_stats;
pub mod quality;
pub mod registry;
pub mod resource_router;
pub mod step_planner;

pub use controller::{Controller, ENHANCED_REASONING_TOOL, MAX_QUALITY_RETRIES};
pub use execution_stats::{ExecutionStats, StatsCollector};
pub use registry::{ResourceRegistry, ToolRegistry};
pub use resource_router::{resolve_step, select_tier, TierSelection};
pub use step_planner::{StepPlanner, SQL_EXECUTOR_TOOL};
