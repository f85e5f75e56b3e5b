//! Atomic counters for orchestrator observability.
//!
//! Each orchestrator owns one [`Metrics`] and shares it with the agents it
//! builds. Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single `tracing::info!`
//! event (e.g. at the end of a workflow).

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Lightweight atomic counters. No allocations, no locking.
#[derive(Debug)]
pub struct Metrics {
    model_turns: AtomicU64,
    tool_executions: AtomicU64,
    tool_failures: AtomicU64,
    approvals_requested: AtomicU64,
    approvals_denied: AtomicU64,
    provider_retries: AtomicU64,
}

/// Point-in-time copy of every counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub model_turns: u64,
    pub tool_executions: u64,
    pub tool_failures: u64,
    pub approvals_requested: u64,
    pub approvals_denied: u64,
    pub provider_retries: u64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            model_turns: AtomicU64::new(0),
            tool_executions: AtomicU64::new(0),
            tool_failures: AtomicU64::new(0),
            approvals_requested: AtomicU64::new(0),
            approvals_denied: AtomicU64::new(0),
            provider_retries: AtomicU64::new(0),
        }
    }

    pub fn inc_model_turns(&self) {
        self.model_turns.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "model_turns", "counter incremented");
    }

    pub fn inc_tool_executions(&self) {
        self.tool_executions.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "tool_executions", "counter incremented");
    }

    pub fn inc_tool_failures(&self) {
        self.tool_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "tool_failures", "counter incremented");
    }

    pub fn inc_approvals_requested(&self) {
        self.approvals_requested.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "approvals_requested", "counter incremented");
    }

    pub fn inc_approvals_denied(&self) {
        self.approvals_denied.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "approvals_denied", "counter incremented");
    }

    pub fn inc_provider_retries(&self) {
        self.provider_retries.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "provider_retries", "counter incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            model_turns: self.model_turns.load(Ordering::Relaxed),
            tool_executions: self.tool_executions.load(Ordering::Relaxed),
            tool_failures: self.tool_failures.load(Ordering::Relaxed),
            approvals_requested: self.approvals_requested.load(Ordering::Relaxed),
            approvals_denied: self.approvals_denied.load(Ordering::Relaxed),
            provider_retries: self.provider_retries.load(Ordering::Relaxed),
        }
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries rather than on every increment.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            model_turns = s.model_turns,
            tool_executions = s.tool_executions,
            tool_failures = s.tool_failures,
            approvals_requested = s.approvals_requested,
            approvals_denied = s.approvals_denied,
            provider_retries = s.provider_retries,
        );
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        self.model_turns.store(0, Ordering::Relaxed);
        self.tool_executions.store(0, Ordering::Relaxed);
        self.tool_failures.store(0, Ordering::Relaxed);
        self.approvals_requested.store(0, Ordering::Relaxed);
        self.approvals_denied.store(0, Ordering::Relaxed);
        self.provider_retries.store(0, Ordering::Relaxed);
    }
}
