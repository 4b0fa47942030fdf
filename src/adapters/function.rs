//! Closure-backed collaborators.
//!
//! Lets embedding applications register plain async functions as tools or
//! resources without writing a trait impl.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::domain::errors::DomainResult;
use crate::domain::ports::{Resource, Tool, ToolInput};

type ToolFn = Arc<dyn Fn(ToolInput) -> BoxFuture<'static, DomainResult<Value>> + Send + Sync>;
type ResourceFn = Arc<dyn Fn(Value) -> BoxFuture<'static, DomainResult<Value>> + Send + Sync>;

/// A [`Tool`] backed by an async closure.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use stepwise::adapters::FnTool;
/// use stepwise::domain::ports::Tool;
///
/// let tool = FnTool::new("row_count", |input| async move {
///     let rows = input.resource_output.as_array().map_or(0, Vec::len);
///     Ok(json!({ "rows": rows }))
/// });
/// assert_eq!(tool.name(), "row_count");
/// ```
#[derive(Clone)]
pub struct FnTool {
    name: String,
    func: ToolFn,
}

impl FnTool {
    pub fn new<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(ToolInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DomainResult<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(move |input| Box::pin(func(input))),
        }
    }
}

impl fmt::Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool").field("name", &self.name).finish_non_exhaustive()
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: ToolInput) -> DomainResult<Value> {
        (self.func)(input).await
    }
}

/// A [`Resource`] backed by an async closure.
#[derive(Clone)]
pub struct FnResource {
    name: String,
    func: ResourceFn,
}

impl FnResource {
    pub fn new<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = DomainResult<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(move |prompt| Box::pin(func(prompt))),
        }
    }
}

impl fmt::Debug for FnResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnResource").field("name", &self.name).finish_non_exhaustive()
    }
}

#[async_trait]
impl Resource for FnResource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, prompt: Value) -> DomainResult<Value> {
        (self.func)(prompt).await
    }
}
