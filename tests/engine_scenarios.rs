//! End-to-end runs of the engine against scripted collaborators.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use stepwise::adapters::{FnResource, MockResource, MockResponse, MockTool};
use stepwise::domain::models::{
    ControlContext, DecisionKind, EngineConfig, ReportStatus, ResourceRequirement, ResourceTier, RetryConfig,
    Step, StepKind, StepResult, StepStatus, Task, TaskAnalysis, TaskTraits,
};
use stepwise::services::ENHANCED_REASONING_TOOL;
use stepwise::{Engine, EngineEvent, StatsCollector};
use tokio::sync::{mpsc, watch};

use common::{engine, engine_with, good_payload, register_single, task, three_step_task};

fn kinds(report: &stepwise::FinalReport) -> Vec<DecisionKind> {
    report.decision_log.iter().map(|r| r.decision).collect()
}

async fn collect(mut rx: mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_three_steps_complete_in_order() {
    common::setup_test_logging();
    let mut engine = engine();
    let resource = Arc::new(MockResource::new("model").with_default_response(good_payload()));
    register_single(&mut engine, &resource);

    let report = engine.run(three_step_task()).await;

    assert_eq!(report.status, ReportStatus::Success);
    assert_eq!(
        kinds(&report),
        vec![
            DecisionKind::Continue,
            DecisionKind::Continue,
            DecisionKind::Continue,
            DecisionKind::Complete
        ]
    );
    assert_eq!(report.result, Some(good_payload()));
    assert_eq!(report.error_count, 0);
    assert_eq!(report.retry_count, 0);
    assert_eq!(resource.call_count(), 3);
    for id in ["parse", "query", "format"] {
        assert_eq!(report.step_status(id), Some(StepStatus::Success));
    }
}

#[tokio::test]
async fn test_failed_step_is_retried_then_completes() {
    let mut engine = engine();
    let resource = Arc::new(
        MockResource::new("model")
            .with_default_response(good_payload())
            .with_step_responses("sql", [MockResponse::failure("connection reset")]),
    );
    register_single(&mut engine, &resource);

    let task = task(vec![
        Step::new("parse", StepKind::Parse),
        Step::new("sql", StepKind::SqlGeneration).depends_on("parse"),
        Step::new("format", StepKind::Formatting).depends_on("sql"),
    ]);
    let report = engine.run(task).await;

    assert_eq!(report.status, ReportStatus::Success);
    assert_eq!(
        kinds(&report),
        vec![
            DecisionKind::Continue,
            DecisionKind::Continue,
            DecisionKind::Retry,
            DecisionKind::Continue,
            DecisionKind::Complete
        ]
    );
    assert_eq!(report.decision_log[2].step_id.as_deref(), Some("sql"));
    assert_eq!(report.decision_log[2].reason.as_deref(), Some("failure"));
    assert_eq!(report.error_count, 1);
    assert_eq!(report.retry_count, 1);
    assert_eq!(resource.calls_for("sql").await, 2);

    let sql = report.steps.iter().find(|s| s.step_id == "sql").unwrap();
    assert_eq!(sql.retry_count, 1);
    assert_eq!(sql.status, StepStatus::Success);
}

#[tokio::test]
async fn test_error_budget_aborts_on_sixth_evaluation() {
    let mut engine = engine();
    let resource = Arc::new(MockResource::new("model").failing("upstream unavailable"));
    register_single(&mut engine, &resource);

    let task = task(vec![
        Step::new("parse", StepKind::Parse).with_max_retries(10),
        Step::new("format", StepKind::Formatting).depends_on("parse"),
    ]);
    let report = engine.run(task).await;

    assert_eq!(report.status, ReportStatus::Error);
    assert_eq!(report.decision_log.len(), 6);
    assert_eq!(
        kinds(&report),
        vec![
            DecisionKind::Continue,
            DecisionKind::Retry,
            DecisionKind::Retry,
            DecisionKind::Retry,
            DecisionKind::Retry,
            DecisionKind::Abort
        ]
    );
    assert_eq!(report.error_count, 5);
    assert_eq!(resource.call_count(), 5);
    assert_eq!(report.step_status("format"), Some(StepStatus::Pending));

    let error = report.error.unwrap();
    assert!(error.contains("error budget exhausted"), "{error}");
    assert!(error.contains("upstream unavailable"), "{error}");
}

#[tokio::test]
async fn test_step_retry_budget_aborts() {
    let mut engine = engine();
    let resource = Arc::new(MockResource::new("model").failing("bad gateway"));
    register_single(&mut engine, &resource);

    let report = engine
        .run(task(vec![Step::new("parse", StepKind::Parse).with_max_retries(2)]))
        .await;

    assert_eq!(report.status, ReportStatus::Error);
    assert_eq!(
        kinds(&report),
        vec![
            DecisionKind::Continue,
            DecisionKind::Retry,
            DecisionKind::Retry,
            DecisionKind::Abort
        ]
    );
    assert_eq!(resource.call_count(), 3);
    assert!(report.error.unwrap().contains("exhausted its retries"));
}

#[tokio::test]
async fn test_low_confidence_escalates_to_think() {
    let mut engine = engine();
    let default = Arc::new(
        MockResource::new("fast").with_default_response(json!({"sql": "SELECT 1", "confidence": 0.5})),
    );
    let think = Arc::new(MockResource::new("deep").with_default_response(json!({"sql": "SELECT 1"})));
    engine.register_resources(think.clone(), default.clone());
    let reasoning = Arc::new(
        MockTool::new(ENHANCED_REASONING_TOOL).with_default_response(json!({"sql": "SELECT 1", "confidence": 0.95})),
    );
    engine.register_tool(reasoning.clone());

    let report = engine
        .run(task(vec![Step::new("sql", StepKind::SqlGeneration)]))
        .await;

    assert_eq!(report.status, ReportStatus::Success);
    assert_eq!(
        kinds(&report),
        vec![DecisionKind::Continue, DecisionKind::Retry, DecisionKind::Complete]
    );
    let retry = &report.decision_log[1];
    assert_eq!(retry.resource, Some(ResourceTier::Think));
    assert_eq!(retry.reason.as_deref(), Some("low_confidence"));

    assert_eq!(default.call_count(), 1);
    assert_eq!(think.call_count(), 1);
    let inputs = reasoning.inputs().await;
    assert_eq!(inputs.len(), 1);
    assert_eq!(inputs[0].step.resource_requirement, ResourceRequirement::Think);
    assert_eq!(inputs[0].step.retry_count, 1);
    assert_eq!(report.steps[0].retry_count, 1);
    assert_eq!(report.error_count, 0);
    assert_eq!(report.retry_count, 1);
}

#[tokio::test]
async fn test_low_confidence_without_reasoning_tool_stays_off_error_budget() {
    let mut engine = engine();
    let low = json!({"sql": "SELECT 1", "confidence": 0.5});
    let default = Arc::new(MockResource::new("fast").with_default_response(low.clone()));
    let think = Arc::new(MockResource::new("deep").with_default_response(low.clone()));
    engine.register_resources(think.clone(), default.clone());

    let report = engine
        .run(task(vec![
            Step::new("sql_a", StepKind::SqlGeneration),
            Step::new("sql_b", StepKind::SqlGeneration).depends_on("sql_a"),
        ]))
        .await;

    assert_eq!(report.status, ReportStatus::Success, "{:?}", report.error);
    assert_eq!(
        kinds(&report),
        vec![
            DecisionKind::Continue,
            DecisionKind::Retry,
            DecisionKind::Retry,
            DecisionKind::Continue,
            DecisionKind::Retry,
            DecisionKind::Retry,
            DecisionKind::Complete
        ]
    );
    assert!(report
        .decision_log
        .iter()
        .filter(|r| r.decision == DecisionKind::Retry)
        .all(|r| r.reason.as_deref() == Some("low_confidence")));
    assert_eq!(report.error_count, 0);
    assert_eq!(report.retry_count, 4);
    assert_eq!(default.call_count(), 2);
    assert_eq!(think.call_count(), 4);
    assert_eq!(report.result, Some(low));
}

#[tokio::test]
async fn test_auto_step_runs_on_think_for_very_high_complexity() {
    let mut engine = engine();
    let default = Arc::new(MockResource::new("fast").with_default_response(good_payload()));
    let think = Arc::new(MockResource::new("deep").with_default_response(good_payload()));
    engine.register_resources(think.clone(), default.clone());

    let traits = TaskTraits {
        needs_generation: true,
        multi_table: true,
        conditional_filters: true,
        business_rules: true,
        time_dimension: true,
        aggregation: true,
    };
    let analysis = TaskAnalysis::new("margin by region and quarter", "finance", 0.95).with_traits(traits);
    let task = Task::new(
        analysis,
        vec![Step::new("format", StepKind::Formatting).with_requirement(ResourceRequirement::Auto)],
    )
    .unwrap();

    let report = engine.run(task).await;

    assert_eq!(report.status, ReportStatus::Success);
    assert_eq!(report.decision_log[0].resource, Some(ResourceTier::Think));
    assert_eq!(think.call_count(), 1);
    assert_eq!(default.call_count(), 0);
}

#[tokio::test]
async fn test_dependency_gate_blocks_without_side_effects() {
    let mut engine = engine();
    let resource = Arc::new(MockResource::new("model").with_default_response(good_payload()));
    register_single(&mut engine, &resource);
    let tool = Arc::new(MockTool::new("sql_executor"));
    engine.register_tool(tool.clone());

    let task = task(vec![
        Step::new("parse", StepKind::Parse),
        Step::new("query", StepKind::DataQuery)
            .depends_on("parse")
            .with_tool("sql_executor"),
    ]);
    let mut context = ControlContext::new(task);
    let query = context.task.step("query").unwrap().clone();

    let missing = engine.execute_step(&query, &mut context).await;
    assert_eq!(missing.status, StepStatus::Failed);
    assert_eq!(missing.error, "dependency not satisfied: parse");

    context.store_result(StepResult::failed(
        "parse",
        "boom",
        Some(ResourceTier::Default),
        Duration::ZERO,
    ));
    let failed = engine.execute_step(&query, &mut context).await;
    assert_eq!(failed.status, StepStatus::Failed);
    assert!(failed.error.starts_with("dependency not satisfied"));

    assert_eq!(resource.call_count(), 0);
    assert_eq!(tool.call_count(), 0);
    assert_eq!(context.error_count, 0);
}

#[tokio::test]
async fn test_step_timeout_counts_as_failure() {
    let mut engine = engine();
    let resource = Arc::new(
        MockResource::new("slow")
            .with_default_response(good_payload())
            .with_step_responses(
                "parse",
                [MockResponse::success(good_payload()).delayed(Duration::from_millis(500))],
            ),
    );
    register_single(&mut engine, &resource);

    let report = engine
        .run(task(vec![
            Step::new("parse", StepKind::Parse).with_timeout(Duration::from_millis(20))
        ]))
        .await;

    assert_eq!(report.status, ReportStatus::Success);
    assert_eq!(report.error_count, 1);
    assert_eq!(report.retry_count, 1);
    assert_eq!(resource.call_count(), 2);
}

#[tokio::test]
async fn test_config_timeout_applies_to_steps_without_their_own() {
    let mut engine = engine_with(EngineConfig {
        step_timeout_secs: Some(1),
        max_errors: 1,
        ..EngineConfig::default()
    });
    let resource = Arc::new(
        MockResource::new("stuck")
            .with_default_response(good_payload())
            .with_responses([MockResponse::success(good_payload()).delayed(Duration::from_secs(3))]),
    );
    register_single(&mut engine, &resource);

    let report = engine.run(task(vec![Step::new("parse", StepKind::Parse)])).await;

    assert_eq!(report.status, ReportStatus::Error);
    assert!(report.error.unwrap().contains("timed out after 1000ms"));
}

#[tokio::test]
async fn test_missing_resource_exhausts_step_budget() {
    let mut engine = engine();
    let default = Arc::new(MockResource::new("fast").with_default_response(good_payload()));
    engine.register_resource(ResourceTier::Default, default.clone());

    let report = engine
        .run(task(vec![
            Step::new("plan", StepKind::Validation).with_requirement(ResourceRequirement::Think)
        ]))
        .await;

    assert_eq!(report.status, ReportStatus::Error);
    assert_eq!(report.error_count, 4);
    assert_eq!(report.retry_count, 3);
    assert!(report.error.unwrap().contains("Resource not registered: think"));
    assert_eq!(default.call_count(), 0);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let mut engine = engine();
    let resource = Arc::new(MockResource::new("model"));
    register_single(&mut engine, &resource);

    let (_tx, rx) = watch::channel(true);
    let report = engine.run_cancellable(three_step_task(), rx).await;

    assert_eq!(report.status, ReportStatus::Cancelled);
    assert_eq!(report.error.as_deref(), Some("task cancelled"));
    assert!(report.decision_log.is_empty());
    assert_eq!(resource.call_count(), 0);
    assert_eq!(engine.stats().snapshot().await.failed, 1);
}

#[tokio::test]
async fn test_cancellation_stops_at_next_iteration() {
    let (tx, rx) = watch::channel(false);
    let tx = Arc::new(tx);
    let mut engine = engine();
    let resource = Arc::new(FnResource::new("cancelling", move |_prompt| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(true);
            Ok(good_payload())
        }
    }));
    engine.register_resources(resource.clone(), resource);

    let report = engine.run_cancellable(three_step_task(), rx).await;

    assert_eq!(report.status, ReportStatus::Cancelled);
    assert_eq!(report.decision_log.len(), 1);
    assert_eq!(report.step_status("parse"), Some(StepStatus::Success));
    assert_eq!(report.step_status("query"), Some(StepStatus::Pending));
}

#[tokio::test]
async fn test_events_bracket_the_run() {
    let mut engine = engine();
    let resource = Arc::new(
        MockResource::new("model")
            .with_default_response(good_payload())
            .with_step_responses("query", [MockResponse::failure("lock timeout")]),
    );
    register_single(&mut engine, &resource);

    let (tx, rx) = engine.event_channel();
    let collector = tokio::spawn(collect(rx));
    let report = engine.run_with_events(three_step_task(), tx).await;
    let events = collector.await.unwrap();

    assert!(matches!(events.first(), Some(EngineEvent::Started { step_count: 3, .. })));
    match events.last() {
        Some(EngineEvent::Finished { report: finished }) => assert_eq!(finished, &report),
        other => panic!("expected finished event, got {other:?}"),
    }

    let started = events
        .iter()
        .filter(|e| matches!(e, EngineEvent::StepStarted { .. }))
        .count();
    assert_eq!(started, resource.call_count());
    assert_eq!(started, 4);

    // once a terminal decision is out, only the finish event follows
    let terminal = events
        .iter()
        .position(|e| {
            matches!(
                e,
                EngineEvent::Decision {
                    decision: DecisionKind::Complete | DecisionKind::Abort,
                    ..
                }
            )
        })
        .unwrap();
    assert_eq!(terminal, events.len() - 2);

    // counters never go backwards
    let counters: Vec<(u32, u32)> = events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::Decision {
                error_count,
                retry_count,
                ..
            } => Some((*error_count, *retry_count)),
            _ => None,
        })
        .collect();
    assert!(counters.windows(2).all(|w| w[0].0 <= w[1].0 && w[0].1 <= w[1].1));
    assert_eq!(counters.last(), Some(&(1, 1)));
}

#[tokio::test]
async fn test_dropped_event_receiver_does_not_break_the_run() {
    let mut engine = engine();
    let resource = Arc::new(MockResource::new("model").with_default_response(good_payload()));
    register_single(&mut engine, &resource);

    let (tx, rx) = mpsc::channel(1);
    drop(rx);
    let report = engine.run_with_events(three_step_task(), tx).await;
    assert!(report.is_success());
}

#[tokio::test]
async fn test_retry_waits_for_backoff() {
    let mut engine = Engine::new(
        EngineConfig::default(),
        RetryConfig {
            initial_backoff_ms: 40,
            max_backoff_ms: 40,
            multiplier: 1.0,
        },
        StatsCollector::new(),
    );
    let resource = Arc::new(
        MockResource::new("model")
            .with_default_response(good_payload())
            .with_responses([MockResponse::failure("flaky")]),
    );
    register_single(&mut engine, &resource);

    let report = engine.run(task(vec![Step::new("parse", StepKind::Parse)])).await;

    assert!(report.is_success());
    assert!(report.execution_time_ms >= 40, "took {}ms", report.execution_time_ms);
}

#[tokio::test]
async fn test_concurrent_runs_share_stats() {
    let stats = StatsCollector::new();
    let mut engine = Engine::new(EngineConfig::default(), RetryConfig::immediate(), stats.clone());
    let resource = Arc::new(
        MockResource::new("model")
            .with_default_response(good_payload())
            .with_step_responses("broken", vec![MockResponse::failure("x"); 10]),
    );
    register_single(&mut engine, &resource);
    let engine = Arc::new(engine);

    let mut handles = Vec::new();
    for i in 0..4 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            let task = Task::new(
                TaskAnalysis::new(format!("report {i}"), "sales", 0.9),
                vec![Step::new("parse", StepKind::Parse)],
            )
            .unwrap();
            engine.run(task).await
        }));
    }
    let failing = engine
        .run(task(vec![Step::new("broken", StepKind::Parse).with_max_retries(1)]))
        .await;

    for handle in handles {
        assert!(handle.await.unwrap().is_success());
    }
    assert_eq!(failing.status, ReportStatus::Error);

    let snapshot = stats.snapshot().await;
    assert_eq!(snapshot.total, 5);
    assert_eq!(snapshot.succeeded, 4);
    assert_eq!(snapshot.failed, 1);
}
