//! Scripted resource and tool implementations.
//!
//! Both mocks answer from a script: per-step queues first, then a shared
//! queue, then a default response. Every call is counted and its input
//! recorded for later assertions.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{Resource, Tool, ToolInput};

/// Mock response configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MockResponse {
    /// Payload returned on success
    pub output: Value,
    /// Whether to simulate failure
    pub fail: bool,
    /// Error message if failing
    pub error_message: Option<String>,
    /// Simulated latency
    pub delay: Option<Duration>,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self {
            output: json!("mock output"),
            fail: false,
            error_message: None,
            delay: None,
        }
    }
}

impl MockResponse {
    pub fn success(output: Value) -> Self {
        Self {
            output,
            ..Default::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            fail: true,
            error_message: Some(error.into()),
            ..Default::default()
        }
    }

    #[must_use]
    pub const fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn message(&self) -> String {
        self.error_message
            .clone()
            .unwrap_or_else(|| "mock failure".to_string())
    }
}

#[derive(Debug, Default)]
struct Script {
    default: MockResponse,
    queue: VecDeque<MockResponse>,
    by_step: HashMap<String, VecDeque<MockResponse>>,
}

impl Script {
    fn next(&mut self, step_id: Option<&str>) -> MockResponse {
        step_id
            .and_then(|id| self.by_step.get_mut(id))
            .and_then(VecDeque::pop_front)
            .or_else(|| self.queue.pop_front())
            .unwrap_or_else(|| self.default.clone())
    }
}

async fn respond(response: MockResponse) -> Result<Value, String> {
    if let Some(delay) = response.delay {
        tokio::time::sleep(delay).await;
    }
    if response.fail {
        Err(response.message())
    } else {
        Ok(response.output)
    }
}

/// Step id carried by an engine-assembled resource prompt.
fn prompt_step_id(prompt: &Value) -> Option<&str> {
    prompt.get("step")?.get("id")?.as_str()
}

/// Mock resource for testing.
#[derive(Debug)]
pub struct MockResource {
    name: String,
    script: Mutex<Script>,
    calls: AtomicUsize,
    inputs: Arc<RwLock<Vec<Value>>>,
}

impl MockResource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(Script::default()),
            calls: AtomicUsize::new(0),
            inputs: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Payload returned once the scripts are exhausted.
    #[must_use]
    pub fn with_default_response(mut self, output: Value) -> Self {
        self.script.get_mut().default = MockResponse::success(output);
        self
    }

    /// Fail every unscripted call.
    #[must_use]
    pub fn failing(mut self, error: impl Into<String>) -> Self {
        self.script.get_mut().default = MockResponse::failure(error);
        self
    }

    /// Responses consumed in order by calls for any step.
    #[must_use]
    pub fn with_responses(mut self, responses: impl IntoIterator<Item = MockResponse>) -> Self {
        self.script.get_mut().queue.extend(responses);
        self
    }

    /// Responses consumed in order by calls for one step.
    #[must_use]
    pub fn with_step_responses(
        mut self,
        step_id: impl Into<String>,
        responses: impl IntoIterator<Item = MockResponse>,
    ) -> Self {
        self.script
            .get_mut()
            .by_step
            .entry(step_id.into())
            .or_default()
            .extend(responses);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every prompt received, in call order.
    pub async fn inputs(&self) -> Vec<Value> {
        self.inputs.read().await.clone()
    }

    /// Number of calls made on behalf of one step.
    pub async fn calls_for(&self, step_id: &str) -> usize {
        self.inputs
            .read()
            .await
            .iter()
            .filter(|p| prompt_step_id(p) == Some(step_id))
            .count()
    }
}

#[async_trait]
impl Resource for MockResource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, prompt: Value) -> DomainResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self.script.lock().await.next(prompt_step_id(&prompt));
        self.inputs.write().await.push(prompt);

        respond(response).await.map_err(|message| DomainError::ResourceFailed {
            resource: self.name.clone(),
            message,
        })
    }
}

/// Mock tool for testing.
#[derive(Debug)]
pub struct MockTool {
    name: String,
    script: Mutex<Script>,
    calls: AtomicUsize,
    inputs: Arc<RwLock<Vec<ToolInput>>>,
}

impl MockTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(Script::default()),
            calls: AtomicUsize::new(0),
            inputs: Arc::new(RwLock::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn with_default_response(mut self, output: Value) -> Self {
        self.script.get_mut().default = MockResponse::success(output);
        self
    }

    #[must_use]
    pub fn failing(mut self, error: impl Into<String>) -> Self {
        self.script.get_mut().default = MockResponse::failure(error);
        self
    }

    #[must_use]
    pub fn with_responses(mut self, responses: impl IntoIterator<Item = MockResponse>) -> Self {
        self.script.get_mut().queue.extend(responses);
        self
    }

    #[must_use]
    pub fn with_step_responses(
        mut self,
        step_id: impl Into<String>,
        responses: impl IntoIterator<Item = MockResponse>,
    ) -> Self {
        self.script
            .get_mut()
            .by_step
            .entry(step_id.into())
            .or_default()
            .extend(responses);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn inputs(&self) -> Vec<ToolInput> {
        self.inputs.read().await.clone()
    }
}

#[async_trait]
impl Tool for MockTool {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: ToolInput) -> DomainResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self.script.lock().await.next(Some(&input.step.id));
        self.inputs.write().await.push(input);

        respond(response).await.map_err(|message| DomainError::ToolFailed {
            tool: self.name.clone(),
            message,
        })
    }
}
