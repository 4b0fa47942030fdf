//! Tool port - named capabilities that post-process resource output.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Step, TaskSummary};

/// Input handed to every tool a step lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInput {
    pub resource_output: Value,
    pub step: Step,
    pub task: TaskSummary,
}

/// A named external capability.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Registry name of the tool.
    fn name(&self) -> &str;

    /// Run the tool against a step's resource output.
    async fn execute(&self, input: ToolInput) -> DomainResult<Value>;
}
