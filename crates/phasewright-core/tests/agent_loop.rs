//! Agent execution loop: suspension, approval, denial, retries and limits.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use phasewright_core::agent::{AgentState, InvocationOutcome};
use phasewright_core::provider::ProviderError;
use phasewright_core::tools::PropertyType;
use phasewright_core::{
    handler_fn, Agent, AgentConfig, AgentError, AgentStep, ApprovalDecision, ExecutionMode,
    Metrics, Phase, ProviderResponse, RetryPolicy, Role, ScriptStep, ScriptedProvider, Tool,
    ToolCall, ToolCategory, ToolRegistry, ToolSchema, WorkflowMode,
};
use serde_json::{json, Value};

fn call(id: &str, name: &str, arguments: Value) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    }
}

fn counting_tool(
    name: &str,
    category: ToolCategory,
    requires_approval: bool,
    counter: Arc<AtomicUsize>,
) -> Tool {
    Tool::builder(name)
        .description(format!("{name} for tests"))
        .requires_approval(requires_approval)
        .category(category)
        .handler(handler_fn(move |_args| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(json!({ "passed": 12, "failed": 0 }))
            }
        }))
}

fn registry_with(tools: Vec<Tool>) -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for tool in tools {
        registry.register(tool).unwrap();
    }
    Arc::new(registry)
}

fn testing_agent(
    mode: ExecutionMode,
    provider: Arc<ScriptedProvider>,
    counter: Arc<AtomicUsize>,
) -> Agent {
    let tools = registry_with(vec![counting_tool(
        "run_tests",
        ToolCategory::Critical,
        true,
        counter,
    )]);
    let config = AgentConfig::for_phase(Phase::Testing)
        .with_tools(["run_tests"])
        .with_execution_mode(mode);
    Agent::new(config, tools, provider).unwrap()
}

fn suspended(step: AgentStep) -> phasewright_core::SuspendedRun {
    match step {
        AgentStep::Suspended(run) => run,
        AgentStep::Finished(outcome) => panic!("expected suspension, got {outcome:?}"),
    }
}

fn finished(step: AgentStep) -> phasewright_core::AgentOutcome {
    match step {
        AgentStep::Finished(outcome) => outcome,
        AgentStep::Suspended(run) => panic!("expected a finished run, got {:?}", run.awaiting),
    }
}

#[tokio::test]
async fn hybrid_critical_call_waits_for_approval_then_runs_once() {
    let counter = Arc::new(AtomicUsize::new(0));
    let provider = Arc::new(ScriptedProvider::new(
        "scripted",
        vec![
            ScriptStep::Respond(ProviderResponse::tool_calls(vec![call(
                "c1",
                "run_tests",
                json!({}),
            )])),
            ScriptStep::Respond(ProviderResponse::text("all 12 tests pass")),
        ],
    ));
    let agent = testing_agent(ExecutionMode::Hybrid, Arc::clone(&provider), Arc::clone(&counter));

    let run = suspended(agent.start("verify the login flow", None).await);
    assert_eq!(run.awaiting.tool_name, "run_tests");
    assert_eq!(run.run.trace.last(), Some(&AgentState::AwaitingApproval));
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    let decision = ApprovalDecision::approve(run.request_id(), "alice");
    let outcome = finished(agent.resume(&run, &decision).await.unwrap());

    assert!(outcome.success);
    assert_eq!(outcome.output, "all 12 tests pass");
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.invocations.len(), 1);
    assert_eq!(outcome.invocations[0].approved_by.as_deref(), Some("alice"));
    assert!(matches!(
        outcome.invocations[0].outcome,
        InvocationOutcome::Executed { .. }
    ));
    assert_eq!(outcome.trace.last(), Some(&AgentState::Done));
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn denial_is_reported_to_the_model_and_run_finishes() {
    let counter = Arc::new(AtomicUsize::new(0));
    let provider = Arc::new(ScriptedProvider::new(
        "scripted",
        vec![
            ScriptStep::Respond(ProviderResponse::tool_calls(vec![call(
                "c1",
                "run_tests",
                json!({}),
            )])),
            ScriptStep::Respond(ProviderResponse::text("skipping the suite as requested")),
        ],
    ));
    let agent = testing_agent(ExecutionMode::Manual, Arc::clone(&provider), Arc::clone(&counter));

    let run = suspended(agent.start("verify", None).await);
    let decision = ApprovalDecision::deny(run.request_id(), "bob", "suite is flaky today");
    let outcome = finished(agent.resume(&run, &decision).await.unwrap());

    assert!(outcome.success);
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert!(matches!(
        &outcome.invocations[0].outcome,
        InvocationOutcome::Denied { decider, .. } if decider == "bob"
    ));

    let requests = provider.requests();
    let last_turn = requests[1].transcript.last().unwrap();
    let result = &last_turn.tool_results[0];
    assert!(result.is_error);
    assert_eq!(result.call_id, "c1");
    assert!(result.content.contains("denied by bob: suite is flaky today"));
}

#[tokio::test]
async fn modified_arguments_replace_the_requested_ones() {
    let seen = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
    let recorder = Arc::clone(&seen);
    let tool = Tool::builder("write_file")
        .description("Write a file")
        .schema(ToolSchema::object().required("path", PropertyType::String, "target path"))
        .requires_approval(true)
        .category(ToolCategory::CodeChange)
        .handler(handler_fn(move |args| {
            let recorder = Arc::clone(&recorder);
            async move {
                let path = args.str("path")?.to_string();
                recorder.lock().unwrap().push(path.clone());
                Ok::<_, anyhow::Error>(json!({ "written": path }))
            }
        }));
    let provider = Arc::new(ScriptedProvider::new(
        "scripted",
        vec![
            ScriptStep::Respond(ProviderResponse::tool_calls(vec![call(
                "w1",
                "write_file",
                json!({ "path": "/etc/passwd" }),
            )])),
            ScriptStep::Respond(ProviderResponse::text("written")),
        ],
    ));
    let config = AgentConfig::for_phase(Phase::DesignBuild)
        .with_tools(["write_file"])
        .with_execution_mode(ExecutionMode::Manual);
    let agent = Agent::new(config, registry_with(vec![tool]), provider).unwrap();

    let run = suspended(agent.start("scaffold", None).await);
    let decision =
        ApprovalDecision::modify(run.request_id(), "carol", json!({ "path": "src/app.rs" }));
    let outcome = finished(agent.resume(&run, &decision).await.unwrap());

    assert!(outcome.success);
    assert_eq!(*seen.lock().unwrap(), vec!["src/app.rs".to_string()]);
    assert_eq!(
        outcome.invocations[0].request.arguments,
        json!({ "path": "src/app.rs" })
    );
}

#[tokio::test]
async fn resume_with_another_request_id_is_refused() {
    let counter = Arc::new(AtomicUsize::new(0));
    let provider = Arc::new(ScriptedProvider::always(
        "scripted",
        ProviderResponse::tool_calls(vec![call("c1", "run_tests", json!({}))]),
    ));
    let agent = testing_agent(ExecutionMode::Hybrid, provider, Arc::clone(&counter));

    let run = suspended(agent.start("verify", None).await);
    let err = agent
        .resume(&run, &ApprovalDecision::approve("req_other", "alice"))
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::ApprovalMismatch { .. }));
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn automated_mode_executes_without_suspending() {
    let counter = Arc::new(AtomicUsize::new(0));
    let provider = Arc::new(ScriptedProvider::new(
        "scripted",
        vec![
            ScriptStep::Respond(ProviderResponse::tool_calls(vec![
                call("c1", "run_tests", json!({})),
                call("c2", "run_tests", json!({})),
            ])),
            ScriptStep::Respond(ProviderResponse::text("done")),
        ],
    ));
    let agent = testing_agent(ExecutionMode::Automated, provider, Arc::clone(&counter));

    let outcome = finished(agent.start("verify", None).await);
    assert!(outcome.success);
    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert_eq!(outcome.iterations, 2);
    assert!(!outcome.trace.contains(&AgentState::AwaitingApproval));
}

#[tokio::test]
async fn iteration_limit_stops_a_model_that_never_answers() {
    let counter = Arc::new(AtomicUsize::new(0));
    let provider = Arc::new(ScriptedProvider::always(
        "scripted",
        ProviderResponse::tool_calls(vec![call("c1", "run_tests", json!({}))]),
    ));
    let tools = registry_with(vec![counting_tool(
        "run_tests",
        ToolCategory::Testing,
        false,
        Arc::clone(&counter),
    )]);
    let config = AgentConfig::for_phase(Phase::Testing)
        .with_tools(["run_tests"])
        .with_max_iterations(3);
    let agent = Agent::new(config, tools, provider.clone()).unwrap();

    let outcome = finished(agent.start("loop forever", None).await);
    assert!(!outcome.success);
    assert_eq!(
        outcome.error,
        Some(AgentError::IterationLimitExceeded { limit: 3 })
    );
    assert_eq!(outcome.iterations, 3);
    assert_eq!(provider.call_count(), 3);
    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert_eq!(outcome.trace.last(), Some(&AgentState::Failed));
}

#[tokio::test]
async fn unknown_tool_is_fed_back_as_an_error_result() {
    let counter = Arc::new(AtomicUsize::new(0));
    let provider = Arc::new(ScriptedProvider::new(
        "scripted",
        vec![
            ScriptStep::Respond(ProviderResponse::tool_calls(vec![call(
                "c1",
                "drop_database",
                json!({}),
            )])),
            ScriptStep::Respond(ProviderResponse::text("fine, no database changes")),
        ],
    ));
    let agent = testing_agent(ExecutionMode::Automated, Arc::clone(&provider), counter);

    let outcome = finished(agent.start("clean up", None).await);
    assert!(outcome.success);
    assert!(matches!(
        outcome.invocations[0].outcome,
        InvocationOutcome::Rejected { .. }
    ));
    let requests = provider.requests();
    let result = &requests[1].transcript.last().unwrap().tool_results[0];
    assert!(result.is_error);
    assert!(result.content.contains("drop_database"));
}

#[tokio::test(start_paused = true)]
async fn transient_provider_failures_are_retried() {
    let metrics = Arc::new(Metrics::new());
    let provider = Arc::new(ScriptedProvider::new(
        "scripted",
        vec![
            ScriptStep::Fail(ProviderError::unavailable("scripted", "HTTP 503")),
            ScriptStep::Respond(ProviderResponse::text("requirements drafted")),
        ],
    ));
    let config = AgentConfig::for_phase(Phase::Requirements);
    let agent = Agent::new(config, Arc::new(ToolRegistry::new()), provider.clone())
        .unwrap()
        .with_metrics(Arc::clone(&metrics));

    let outcome = finished(agent.start("a login page", None).await);
    assert!(outcome.success);
    assert_eq!(provider.call_count(), 2);
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.provider_retries, 1);
    assert_eq!(snapshot.model_turns, 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_fail_the_run() {
    let provider = Arc::new(
        ScriptedProvider::new(
            "scripted",
            vec![ScriptStep::Fail(ProviderError::unavailable("scripted", "HTTP 502"))],
        )
        .repeating_last(),
    );
    let config = AgentConfig::for_phase(Phase::Requirements).with_retry(RetryPolicy {
        max_attempts: 2,
        initial_backoff_ms: 100,
        max_backoff_ms: 100,
    });
    let agent =
        Agent::new(config, Arc::new(ToolRegistry::new()), provider.clone()).unwrap();

    let outcome = finished(agent.start("a login page", None).await);
    assert!(!outcome.success);
    assert!(matches!(
        outcome.error,
        Some(AgentError::ProviderUnavailable { attempts: 2, .. })
    ));
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn tips_only_role_never_executes_tools() {
    let counter = Arc::new(AtomicUsize::new(0));
    let provider = Arc::new(ScriptedProvider::always(
        "scripted",
        ProviderResponse::tool_calls(vec![call("c1", "run_tests", json!({ "suite": "auth" }))]),
    ));
    let tools = registry_with(vec![counting_tool(
        "run_tests",
        ToolCategory::Testing,
        false,
        Arc::clone(&counter),
    )]);
    let config = AgentConfig::for_role(Role::PenTester).with_tools(["run_tests"]);
    assert_eq!(config.workflow_mode, WorkflowMode::TipsOnly);
    let agent = Agent::new(config, tools, provider).unwrap();

    let outcome = finished(agent.start("review the login endpoint for security", None).await);
    assert!(outcome.success);
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert!(outcome.output.starts_with("Pen Tester advisory"));
    assert!(outcome.output.contains("- run_tests"));
    assert!(matches!(
        outcome.invocations[0].outcome,
        InvocationOutcome::Advisory
    ));
}

#[tokio::test]
async fn malformed_response_fails_without_retrying() {
    let provider = Arc::new(ScriptedProvider::new(
        "scripted",
        vec![
            ScriptStep::Fail(ProviderError::malformed("scripted", "empty content")),
            ScriptStep::Respond(ProviderResponse::text("never reached")),
        ],
    ));
    let config = AgentConfig::for_phase(Phase::Requirements).with_retry(RetryPolicy {
        max_attempts: 3,
        initial_backoff_ms: 100,
        max_backoff_ms: 100,
    });
    let agent =
        Agent::new(config, Arc::new(ToolRegistry::new()), provider.clone()).unwrap();

    let outcome = finished(agent.start("a login page", None).await);
    assert!(!outcome.success);
    assert!(matches!(outcome.error, Some(AgentError::MalformedResponse(_))));
    assert_eq!(provider.call_count(), 1);
}

#[tokio::test]
async fn manual_with_tips_runs_tools_and_appends_advice() {
    let counter = Arc::new(AtomicUsize::new(0));
    let provider = Arc::new(ScriptedProvider::new(
        "scripted",
        vec![
            ScriptStep::Respond(ProviderResponse::tool_calls(vec![call(
                "c1",
                "run_tests",
                json!({ "suite": "unit" }),
            )])),
            ScriptStep::Respond(ProviderResponse::text("suite green")),
        ],
    ));
    let tools = registry_with(vec![counting_tool(
        "run_tests",
        ToolCategory::Testing,
        false,
        Arc::clone(&counter),
    )]);
    let config = AgentConfig::for_phase(Phase::Testing)
        .with_tools(["run_tests"])
        .with_execution_mode(ExecutionMode::Automated)
        .with_workflow_mode(WorkflowMode::ManualWithTips);
    let agent = Agent::new(config, tools, provider).unwrap();

    let outcome = finished(agent.start("fix the flaky regression suite", None).await);
    assert!(outcome.success);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert!(outcome.output.starts_with("suite green\n\nTesting advisory"));
    assert!(outcome
        .output
        .contains("Suggested actions:\n- run_tests {\"suite\":\"unit\"}"));
    assert!(outcome.invocations[0].executed());
}
