//! Structured observability hooks for stage runs.
//!
//! This module provides:
//! - The run-scoped span, attached across `.await` with `tracing::Instrument`
//! - Emission functions for lifecycle events with stable `event=` names
//!
//! Events are emitted at `info!` level unless noted. Filtering follows
//! `RUST_LOG`; see [`crate::telemetry::init_tracing`].

use tracing::{info, warn};

/// The span every stage run is recorded under.
pub fn run_span(run_id: &str, stage: &str) -> tracing::Span {
    tracing::info_span!("phasewright.run", run_id = %run_id, stage = %stage)
}

pub fn emit_phase_started(run_id: &str, stage: &str, agent: &str) {
    info!(event = "phase.started", run_id = %run_id, stage = %stage, agent = %agent);
}

pub fn emit_phase_finished(
    run_id: &str,
    stage: &str,
    duration_ms: u64,
    iterations: u32,
    success: bool,
) {
    info!(
        event = "phase.finished",
        run_id = %run_id,
        stage = %stage,
        duration_ms = duration_ms,
        iterations = iterations,
        success = success,
    );
}

/// One provider round trip.
pub fn emit_model_turn(run_id: &str, iteration: u32, tool_calls: usize) {
    info!(event = "model.turn", run_id = %run_id, iteration = iteration, tool_calls = tool_calls);
}

/// A transient provider failure that will be retried (warning level).
pub fn emit_provider_retry(
    run_id: &str,
    attempt: u32,
    backoff_ms: u64,
    error: &dyn std::fmt::Display,
) {
    warn!(
        event = "provider.retry",
        run_id = %run_id,
        attempt = attempt,
        backoff_ms = backoff_ms,
        error = %error,
    );
}

pub fn emit_tool_executed(run_id: &str, tool: &str, outcome: &str, duration_ms: u64) {
    info!(
        event = "tool.executed",
        run_id = %run_id,
        tool = %tool,
        outcome = %outcome,
        duration_ms = duration_ms,
    );
}

pub fn emit_approval_requested(run_id: &str, request_id: &str, tool: &str) {
    info!(
        event = "approval.requested",
        run_id = %run_id,
        request_id = %request_id,
        tool = %tool,
    );
}

pub fn emit_approval_resolved(request_id: &str, verdict: &str, decider: &str) {
    info!(
        event = "approval.resolved",
        request_id = %request_id,
        verdict = %verdict,
        decider = %decider,
    );
}

/// A sequence stopped early after a failed stage (warning level).
pub fn emit_workflow_halted(stage: &str, error_kind: &str) {
    warn!(event = "workflow.halted", stage = %stage, error_kind = %error_kind);
}
