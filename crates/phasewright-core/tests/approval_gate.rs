//! Approval gate: parking, resolving and persisting suspended runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use phasewright_core::approval::{ApprovalStatus, ApprovalStore};
use phasewright_core::{
    handler_fn, Agent, AgentConfig, AgentStep, ApprovalDecision, ApprovalError, ApprovalGate,
    ExecutionMode, FsApprovalStore, Phase, ProviderResponse, ScriptedProvider, SuspendedRun, Tool,
    ToolCall, ToolCategory, ToolRegistry,
};
use serde_json::json;

fn deploy_agent(counter: Arc<AtomicUsize>) -> Agent {
    let tool = Tool::builder("deploy")
        .description("Roll out the current build")
        .requires_approval(true)
        .category(ToolCategory::Critical)
        .handler(handler_fn(move |_args| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(json!({ "rolled_out": true }))
            }
        }));
    let mut registry = ToolRegistry::new();
    registry.register(tool).unwrap();

    let provider = Arc::new(
        ScriptedProvider::new(
            "scripted",
            vec![phasewright_core::ScriptStep::Respond(
                ProviderResponse::tool_calls(vec![ToolCall {
                    id: "d1".into(),
                    name: "deploy".into(),
                    arguments: json!({}),
                }]),
            )],
        )
        .repeating_last(),
    );
    let config = AgentConfig::for_phase(Phase::Deployment)
        .with_tools(["deploy"])
        .with_execution_mode(ExecutionMode::Manual);
    Agent::new(config, Arc::new(registry), provider).unwrap()
}

async fn suspend(agent: &Agent) -> SuspendedRun {
    match agent.start("ship 1.4.0", None).await {
        AgentStep::Suspended(run) => run,
        AgentStep::Finished(outcome) => panic!("expected suspension, got {outcome:?}"),
    }
}

#[tokio::test]
async fn second_resolution_is_rejected() {
    let agent = deploy_agent(Arc::new(AtomicUsize::new(0)));
    let gate = ApprovalGate::in_memory();
    let pending = gate.submit(suspend(&agent).await).unwrap();

    let decision = ApprovalDecision::approve(&pending.request_id, "alice");
    gate.resolve(&pending.request_id, &decision).unwrap();

    let err = gate.resolve(&pending.request_id, &decision).unwrap_err();
    assert!(matches!(err, ApprovalError::AlreadyResolved { .. }));
    assert_eq!(err.kind(), "already_resolved");
    assert!(gate.pending().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_and_mismatched_decisions_leave_the_record_pending() {
    let agent = deploy_agent(Arc::new(AtomicUsize::new(0)));
    let gate = ApprovalGate::in_memory();
    let pending = gate.submit(suspend(&agent).await).unwrap();

    let err = gate
        .resolve("req_missing", &ApprovalDecision::approve("req_missing", "alice"))
        .unwrap_err();
    assert!(matches!(err, ApprovalError::UnknownRequest { .. }));

    let err = gate
        .resolve(&pending.request_id, &ApprovalDecision::approve("req_other", "alice"))
        .unwrap_err();
    assert!(matches!(err, ApprovalError::DecisionMismatch { .. }));

    let err = gate
        .resolve(
            &pending.request_id,
            &ApprovalDecision::modify(&pending.request_id, "alice", json!("not an object")),
        )
        .unwrap_err();
    assert!(matches!(err, ApprovalError::InvalidDecision { .. }));

    assert!(gate.record(&pending.request_id).unwrap().status.is_pending());
    assert_eq!(gate.pending().unwrap().len(), 1);
}

#[tokio::test]
async fn one_pending_record_per_run() {
    let agent = deploy_agent(Arc::new(AtomicUsize::new(0)));
    let gate = ApprovalGate::in_memory();
    let run = suspend(&agent).await;
    gate.submit(run.clone()).unwrap();

    let err = gate.submit(run).unwrap_err();
    assert!(matches!(err, ApprovalError::SlotOccupied { .. }));
}

#[tokio::test]
async fn prompt_describes_the_call_and_its_origin() {
    let agent = deploy_agent(Arc::new(AtomicUsize::new(0)));
    let gate = ApprovalGate::in_memory();
    let pending = gate.submit(suspend(&agent).await).unwrap();

    let prompt = &pending.prompt;
    assert_eq!(prompt.tool_name, "deploy");
    assert_eq!(prompt.description, "Roll out the current build");
    assert_eq!(prompt.origin.agent, "deployment-agent");
    assert_eq!(prompt.origin.run_id, pending.run_id);
}

#[tokio::test]
async fn fs_store_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let counter = Arc::new(AtomicUsize::new(0));
    let agent = deploy_agent(Arc::clone(&counter));

    let request_id = {
        let store = Arc::new(FsApprovalStore::new(dir.path()).unwrap());
        let gate = ApprovalGate::new(store);
        gate.submit(suspend(&agent).await).unwrap().request_id
    };

    let store = Arc::new(FsApprovalStore::new(dir.path()).unwrap());
    let gate = ApprovalGate::new(Arc::clone(&store) as Arc<dyn ApprovalStore>);
    let prompts = gate.pending().unwrap();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].request_id, request_id);

    let decision = ApprovalDecision::deny(&request_id, "alice", "change freeze");
    let run = gate.resolve(&request_id, &decision).unwrap();
    assert_eq!(run.request_id(), request_id);

    let record = store.load(&request_id).unwrap().unwrap();
    assert!(matches!(record.status, ApprovalStatus::Resolved { .. }));
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn check_does_not_consume_and_reopen_allows_a_new_decision() {
    let agent = deploy_agent(Arc::new(AtomicUsize::new(0)));
    let gate = ApprovalGate::in_memory();
    let pending = gate.submit(suspend(&agent).await).unwrap();
    let approve = ApprovalDecision::approve(&pending.request_id, "alice");

    let record = gate.check(&pending.request_id, &approve).unwrap();
    assert_eq!(record.status, ApprovalStatus::Pending);
    assert_eq!(gate.pending().unwrap().len(), 1);

    gate.resolve(&pending.request_id, &approve).unwrap();
    assert!(matches!(
        gate.check(&pending.request_id, &approve),
        Err(ApprovalError::AlreadyResolved { .. })
    ));

    gate.reopen(&pending.request_id).unwrap();
    assert_eq!(gate.pending().unwrap().len(), 1);
    let deny = ApprovalDecision::deny(&pending.request_id, "bob", "wrong window");
    gate.resolve(&pending.request_id, &deny).unwrap();
    assert!(matches!(
        gate.record(&pending.request_id).unwrap().status,
        ApprovalStatus::Resolved { ref decision } if decision.decider == "bob"
    ));
}

#[tokio::test]
async fn attached_continuation_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let agent = deploy_agent(Arc::new(AtomicUsize::new(0)));
    let gate = ApprovalGate::new(Arc::new(FsApprovalStore::new(dir.path()).unwrap()));
    let pending = gate.submit(suspend(&agent).await).unwrap();
    gate.attach(&pending.request_id, &json!({ "remaining": ["deployment"] }))
        .unwrap();

    let reopened = ApprovalGate::new(Arc::new(FsApprovalStore::new(dir.path()).unwrap()));
    let record = reopened.record(&pending.request_id).unwrap();
    assert_eq!(
        record.continuation::<serde_json::Value>().unwrap(),
        Some(json!({ "remaining": ["deployment"] }))
    );

    reopened
        .resolve(
            &pending.request_id,
            &ApprovalDecision::approve(&pending.request_id, "alice"),
        )
        .unwrap();
    assert!(matches!(
        reopened.attach(&pending.request_id, &json!({})),
        Err(ApprovalError::AlreadyResolved { .. })
    ));
}
