//! Execution runner.
//!
//! Drives one task at a time through the controller loop: ask for a
//! decision, execute the step it names, fold the result back into the
//! control context, repeat until `complete` or `abort`. Every step-level
//! failure is turned into a `failed` [`StepResult`]; `run` always returns a
//! [`FinalReport`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use serde_json::{json, Map, Value};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Config, ControlContext, ControlDecision, DecisionKind, EngineConfig, Evaluation, FinalReport, ResourceTier,
    RetryConfig, Step, StepResult, Task, TaskAnalysis, TaskSummary,
};
use crate::domain::ports::{Resource, Tool, ToolInput};
use crate::services::{
    quality, Controller, ResourceRegistry, StatsCollector, StepPlanner, ToolRegistry, ENHANCED_REASONING_TOOL,
};

/// Event emitted while a task runs.
#[derive(Debug, Clone)]
#[allow(clippy::large_enum_variant)]
pub enum EngineEvent {
    /// Run started.
    Started { task_id: String, step_count: usize },
    /// Controller returned a decision.
    Decision {
        task_id: String,
        decision: DecisionKind,
        step_id: Option<String>,
        resource: Option<ResourceTier>,
        error_count: u32,
        retry_count: u32,
    },
    /// A step is about to execute.
    StepStarted {
        task_id: String,
        step_id: String,
        resource: Option<ResourceTier>,
        retry_count: u32,
    },
    /// A step attempt produced a result.
    StepFinished { task_id: String, result: StepResult },
    /// Run ended.
    Finished { report: FinalReport },
}

/// Task orchestration engine.
///
/// Registries are filled through `&mut self` before the engine is shared;
/// runs only take `&self`, so any number of tasks may run concurrently on
/// one engine behind an `Arc`.
#[derive(Debug)]
pub struct Engine {
    config: EngineConfig,
    retry: RetryConfig,
    controller: Controller,
    resources: ResourceRegistry,
    tools: ToolRegistry,
    stats: StatsCollector,
}

impl Engine {
    pub fn new(config: EngineConfig, retry: RetryConfig, stats: StatsCollector) -> Self {
        Self {
            config,
            retry,
            controller: Controller::new(),
            resources: ResourceRegistry::new(),
            tools: ToolRegistry::new(),
            stats,
        }
    }

    /// Build an engine from the engine and retry sections of a [`Config`].
    pub fn from_config(config: &Config, stats: StatsCollector) -> Self {
        Self::new(config.engine.clone(), config.retry.clone(), stats)
    }

    /// Register the `think` and `default` resource handles.
    pub fn register_resources(&mut self, think: Arc<dyn Resource>, default: Arc<dyn Resource>) {
        self.resources.register(ResourceTier::Think, think);
        self.resources.register(ResourceTier::Default, default);
    }

    /// Register one resource tier.
    pub fn register_resource(&mut self, tier: ResourceTier, resource: Arc<dyn Resource>) {
        self.resources.register(tier, resource);
    }

    /// Register tools by name.
    pub fn register_tools(&mut self, tools: HashMap<String, Arc<dyn Tool>>) {
        self.tools.extend(tools);
    }

    /// Register a tool under its own name.
    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) {
        self.tools.register(tool);
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub const fn stats(&self) -> &StatsCollector {
        &self.stats
    }

    pub const fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub const fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    /// Planner that gives generated steps this engine's step retry budget.
    pub const fn planner(&self) -> StepPlanner {
        StepPlanner::new().with_step_max_retries(self.config.step_max_retries)
    }

    /// Plan a task from upstream analysis and run it.
    pub async fn plan_and_run(&self, analysis: TaskAnalysis) -> DomainResult<FinalReport> {
        let task = self.planner().build_task(analysis)?;
        Ok(self.run(task).await)
    }

    /// Run a task to completion.
    pub async fn run(&self, task: Task) -> FinalReport {
        self.drive(task, None, None).await
    }

    /// Run a task, streaming progress events.
    ///
    /// A dropped receiver does not affect the run.
    pub async fn run_with_events(&self, task: Task, events: mpsc::Sender<EngineEvent>) -> FinalReport {
        self.drive(task, Some(&events), None).await
    }

    /// Run a task that stops before the next iteration once `cancel` holds
    /// `true`. In-flight resource and tool calls are not interrupted.
    pub async fn run_cancellable(&self, task: Task, cancel: watch::Receiver<bool>) -> FinalReport {
        self.drive(task, None, Some(&cancel)).await
    }

    /// Event channel sized from the engine configuration.
    pub fn event_channel(&self) -> (mpsc::Sender<EngineEvent>, mpsc::Receiver<EngineEvent>) {
        mpsc::channel(self.config.event_buffer.max(1))
    }

    fn context_for(&self, task: Task) -> ControlContext {
        ControlContext::with_limits(task, self.config.max_errors, self.config.max_retries)
    }

    #[instrument(skip_all, fields(task_id = %task.id))]
    async fn drive(
        &self,
        task: Task,
        events: Option<&mpsc::Sender<EngineEvent>>,
        cancel: Option<&watch::Receiver<bool>>,
    ) -> FinalReport {
        let start = Instant::now();
        let mut context = self.context_for(task);
        let mut delay = RetryDelay::new(&self.retry);
        let task_id = context.task.id.clone();

        info!(
            steps = context.task.steps().len(),
            complexity = %context.task.complexity,
            "task started"
        );
        emit(
            events,
            EngineEvent::Started {
                task_id: task_id.clone(),
                step_count: context.task.steps().len(),
            },
        )
        .await;

        let report = loop {
            if is_cancelled(cancel) {
                warn!(cursor = context.task.cursor, "task cancelled");
                break FinalReport::cancelled(&context, elapsed_ms(start));
            }

            let evaluation = self.controller.evaluate(&context).unwrap_or_else(|err| {
                error!(error = %err, "controller failed");
                Evaluation {
                    decision: ControlDecision::Abort {
                        reason: err.to_string(),
                    },
                    resource: None,
                    state: Controller::analyze_state(&context),
                    quality: None,
                }
            });
            context.log_decision(&evaluation);
            emit(
                events,
                EngineEvent::Decision {
                    task_id: task_id.clone(),
                    decision: evaluation.decision.kind(),
                    step_id: evaluation.decision.step().map(|s| s.id.clone()),
                    resource: evaluation.resource,
                    error_count: context.error_count,
                    retry_count: context.retry_count,
                },
            )
            .await;

            match evaluation.decision {
                ControlDecision::Complete => {
                    let len = context.task.steps().len();
                    context.task.advance_to(len);
                    info!(elapsed_ms = elapsed_ms(start), "task complete");
                    break FinalReport::success(&context, elapsed_ms(start));
                }
                ControlDecision::Abort { reason } => {
                    let message = abort_message(&context, reason);
                    warn!(
                        error_count = context.error_count,
                        retry_count = context.retry_count,
                        reason = %message,
                        "task aborted"
                    );
                    break FinalReport::error(&context, message, elapsed_ms(start));
                }
                ControlDecision::Continue { cursor, step } => {
                    if cursor != context.task.cursor {
                        context.task.advance_to(cursor);
                        delay.reset();
                    }
                    self.dispatch(&step, &mut context, events).await;
                }
                ControlDecision::Retry { step, reason } => {
                    context.record_retry();
                    context.task.record_retry(&step.id, step.retry_count);
                    let wait = delay.next_delay();
                    debug!(
                        step_id = %step.id,
                        reason = reason.as_str(),
                        retry_count = step.retry_count,
                        delay_ms = wait.as_millis() as u64,
                        "retrying step"
                    );
                    if !wait.is_zero() {
                        sleep(wait).await;
                    }
                    self.dispatch(&step, &mut context, events).await;
                }
            }

            if context.errors_overflowed() {
                let message = abort_message(
                    &context,
                    format!(
                        "error count {} exceeded limit {}",
                        context.error_count, context.max_errors
                    ),
                );
                warn!(reason = %message, "task aborted");
                break FinalReport::error(&context, message, elapsed_ms(start));
            }
        };

        self.stats.record(&report).await;
        emit(
            events,
            EngineEvent::Finished {
                report: report.clone(),
            },
        )
        .await;
        report
    }

    async fn dispatch(
        &self,
        step: &Step,
        context: &mut ControlContext,
        events: Option<&mpsc::Sender<EngineEvent>>,
    ) {
        emit(
            events,
            EngineEvent::StepStarted {
                task_id: context.task.id.clone(),
                step_id: step.id.clone(),
                resource: step.resource_requirement.tier(),
                retry_count: step.retry_count,
            },
        )
        .await;

        let result = self.execute_step(step, context).await;

        emit(
            events,
            EngineEvent::StepFinished {
                task_id: context.task.id.clone(),
                result: result.clone(),
            },
        )
        .await;
        context.store_result(result);
    }

    /// Execute one attempt of `step`.
    ///
    /// Dependencies are checked first; an unmet dependency fails the attempt
    /// without touching any resource or tool. Any later failure increments
    /// the context's error count. The result is returned, not stored.
    #[instrument(skip_all, fields(step_id = %step.id, kind = %step.kind))]
    pub async fn execute_step(&self, step: &Step, context: &mut ControlContext) -> StepResult {
        let start = Instant::now();

        let unmet = context.unmet_dependencies(&step.dependencies);
        if !unmet.is_empty() {
            let err = DomainError::DependencyNotSatisfied(unmet);
            warn!(error = %err, "step blocked");
            return StepResult::failed(&step.id, err.to_string(), None, start.elapsed());
        }

        let Some(tier) = step.resource_requirement.tier() else {
            let err = DomainError::UnresolvedRequirement(step.id.clone());
            context.record_error();
            error!(error = %err, "step dispatched without a concrete tier");
            return StepResult::failed(&step.id, err.to_string(), None, start.elapsed());
        };

        let input = assemble_input(step, context);
        let summary = context.task.summary();
        let invocation = self.invoke(step, tier, input, summary);
        let outcome = match self.step_timeout(step) {
            Some(limit) => timeout(limit, invocation).await.unwrap_or_else(|_| {
                Err(DomainError::StepTimeout {
                    step_id: step.id.clone(),
                    timeout: limit,
                })
            }),
            None => invocation.await,
        };

        match outcome {
            Ok(data) => {
                let (confidence, quality) = quality::score(&step.kind, &data);
                info!(resource = %tier, confidence, quality, "step succeeded");
                StepResult::success(&step.id, data, tier, confidence, quality, start.elapsed())
            }
            Err(err) => {
                context.record_error();
                warn!(
                    resource = %tier,
                    error = %err,
                    error_count = context.error_count,
                    "step failed"
                );
                StepResult::failed(&step.id, err.to_string(), Some(tier), start.elapsed())
            }
        }
    }

    fn step_timeout(&self, step: &Step) -> Option<Duration> {
        step.timeout
            .or_else(|| self.config.step_timeout_secs.map(Duration::from_secs))
    }

    /// Tools listed by `step`, looked up before the resource is called.
    ///
    /// The escalation tool is optional: without it an escalated retry still
    /// runs on the think tier. Any other unregistered tool fails the step.
    fn step_tools(&self, step: &Step) -> DomainResult<Vec<Arc<dyn Tool>>> {
        let mut tools = Vec::with_capacity(step.tools.len());
        for name in &step.tools {
            match self.tools.require(name) {
                Ok(tool) => tools.push(tool),
                Err(_) if name == ENHANCED_REASONING_TOOL => {
                    warn!(tool = %name, "escalation tool not registered, retrying without it");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(tools)
    }

    async fn invoke(&self, step: &Step, tier: ResourceTier, input: Value, task: TaskSummary) -> DomainResult<Value> {
        let resource = self.resources.require(tier)?;
        let tools = self.step_tools(step)?;

        let output = resource
            .invoke(input)
            .await
            .map_err(|err| resource_failure(resource.name(), err))?;

        if tools.is_empty() {
            return Ok(output);
        }

        let tool_input = ToolInput {
            resource_output: output.clone(),
            step: step.clone(),
            task,
        };

        if let [tool] = tools.as_slice() {
            return tool
                .execute(tool_input)
                .await
                .map_err(|err| tool_failure(tool.name(), err));
        }

        let mut outputs = Map::new();
        let mut failures = Vec::new();
        for tool in &tools {
            match tool.execute(tool_input.clone()).await {
                Ok(value) => {
                    outputs.insert(tool.name().to_string(), value);
                }
                Err(err) => {
                    let err = tool_failure(tool.name(), err);
                    warn!(tool = tool.name(), error = %err, "tool failed");
                    outputs.insert(tool.name().to_string(), json!({ "error": err.to_string() }));
                    failures.push(err.to_string());
                }
            }
        }

        if failures.len() == tools.len() {
            return Err(DomainError::ToolFailed {
                tool: tools.iter().map(|t| t.name()).collect::<Vec<_>>().join(","),
                message: failures.join("; "),
            });
        }

        Ok(json!({
            "resource_output": output,
            "tools": outputs,
        }))
    }
}

/// Exponential delay between consecutive retries, reset on progress.
#[derive(Debug)]
struct RetryDelay {
    backoff: ExponentialBackoff,
}

impl RetryDelay {
    fn new(config: &RetryConfig) -> Self {
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(config.initial_backoff_ms))
            .with_max_interval(Duration::from_millis(config.max_backoff_ms))
            .with_multiplier(config.multiplier)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build();
        Self { backoff }
    }

    fn next_delay(&mut self) -> Duration {
        self.backoff
            .next_backoff()
            .unwrap_or(self.backoff.max_interval)
    }

    fn reset(&mut self) {
        self.backoff.reset();
    }
}

/// Structured input handed to the resource: task metadata, the step's
/// expectations and the payload of every dependency.
fn assemble_input(step: &Step, context: &ControlContext) -> Value {
    let dependencies: Map<String, Value> = step
        .dependencies
        .iter()
        .filter_map(|id| context.results.get(id).map(|r| (id.clone(), r.data.clone())))
        .collect();

    json!({
        "task": context.task.summary(),
        "step": {
            "id": step.id,
            "kind": step.kind.as_str(),
            "expectation": step.kind.expectation(),
            "retry_count": step.retry_count,
            "tools": step.tools,
        },
        "dependencies": dependencies,
    })
}

fn resource_failure(name: &str, err: DomainError) -> DomainError {
    match err {
        err @ DomainError::ResourceFailed { .. } => err,
        other => DomainError::ResourceFailed {
            resource: name.to_string(),
            message: other.to_string(),
        },
    }
}

fn tool_failure(name: &str, err: DomainError) -> DomainError {
    match err {
        err @ DomainError::ToolFailed { .. } => err,
        other => DomainError::ToolFailed {
            tool: name.to_string(),
            message: other.to_string(),
        },
    }
}

/// Abort reason, suffixed with the last step error when it adds anything.
fn abort_message(context: &ControlContext, reason: String) -> String {
    match &context.last_error {
        Some(last) if !reason.contains(last.as_str()) => format!("{reason}: {last}"),
        _ => reason,
    }
}

fn is_cancelled(cancel: Option<&watch::Receiver<bool>>) -> bool {
    cancel.is_some_and(|rx| *rx.borrow())
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

async fn emit(events: Option<&mpsc::Sender<EngineEvent>>, event: EngineEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event).await;
    }
}
