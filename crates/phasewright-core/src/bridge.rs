//! Issue-tracker → documentation status bridge.
//!
//! Consumes [`StatusChangeEvent`]s, maps each tracked item to a
//! documentation page and upserts the new status into a
//! [`DocumentationSink`]. Events are applied at most once per item and
//! timestamp: duplicates and anything older than the last applied event are
//! skipped.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::agent::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChangeEvent {
    /// Tracker key, e.g. `PAY-142`.
    pub item_key: String,
    pub old_status: String,
    pub new_status: String,
    pub timestamp: DateTime<Utc>,
}

/// Item key → page id.
///
/// Explicit entries win. Otherwise, if a project page is registered for the
/// key's prefix (`PAY` for `PAY-142`), that page is used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMapping {
    #[serde(default)]
    pub items: BTreeMap<String, String>,
    #[serde(default)]
    pub projects: BTreeMap<String, String>,
}

impl PageMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(mut self, item_key: impl Into<String>, page_id: impl Into<String>) -> Self {
        self.items.insert(item_key.into(), page_id.into());
        self
    }

    pub fn with_project(mut self, prefix: impl Into<String>, page_id: impl Into<String>) -> Self {
        self.projects.insert(prefix.into(), page_id.into());
        self
    }

    pub fn page_for(&self, item_key: &str) -> Option<&str> {
        if let Some(page) = self.items.get(item_key) {
            return Some(page);
        }
        let (prefix, _) = item_key.split_once('-')?;
        self.projects.get(prefix).map(String::as_str)
    }
}

/// The write applied to a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageUpdate {
    pub page_id: String,
    pub item_key: String,
    pub status: String,
    pub previous_status: String,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// Worth retrying (timeouts, rate limits, 5xx).
    #[error("transient sink failure: {0}")]
    Transient(String),

    #[error("permanent sink failure: {0}")]
    Permanent(String),
}

/// Where page updates land. Upserts must be idempotent per `(page, item)`.
#[async_trait]
pub trait DocumentationSink: Send + Sync {
    async fn upsert(&self, update: &PageUpdate) -> Result<(), SinkError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    #[error("no documentation page mapped for item {item_key}")]
    UnmappedItem { item_key: String },

    #[error("sink rejected update for {item_key}: {message}")]
    Sink { item_key: String, message: String },

    #[error("sink still failing for {item_key} after {attempts} attempt(s): {message}")]
    RetriesExhausted {
        item_key: String,
        attempts: u32,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeOutcome {
    Applied { page_id: String },
    /// Same item and timestamp as the last applied event.
    SkippedDuplicate,
    /// Older than the last applied event for the item.
    SkippedStale,
}

pub struct StatusBridge {
    mapping: PageMapping,
    sink: Arc<dyn DocumentationSink>,
    retry: RetryPolicy,
    /// Last applied timestamp per item. Held across the sink call so events
    /// are applied one at a time.
    applied: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl StatusBridge {
    pub fn new(mapping: PageMapping, sink: Arc<dyn DocumentationSink>) -> Self {
        Self {
            mapping,
            sink,
            retry: RetryPolicy::default(),
            applied: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Apply one event.
    ///
    /// # Errors
    ///
    /// - `UnmappedItem` when no page is mapped for the item
    /// - `Sink` on a permanent sink failure
    /// - `RetriesExhausted` when transient failures outlast the retry policy
    ///
    /// A failed event is not recorded, so redelivering it retries it.
    pub async fn handle(&self, event: &StatusChangeEvent) -> Result<BridgeOutcome, BridgeError> {
        let mut applied = self.applied.lock().await;

        if let Some(last) = applied.get(&event.item_key) {
            if event.timestamp == *last {
                debug!(item = %event.item_key, "duplicate status event skipped");
                return Ok(BridgeOutcome::SkippedDuplicate);
            }
            if event.timestamp < *last {
                debug!(item = %event.item_key, "stale status event skipped");
                return Ok(BridgeOutcome::SkippedStale);
            }
        }

        let page_id = self
            .mapping
            .page_for(&event.item_key)
            .ok_or_else(|| BridgeError::UnmappedItem {
                item_key: event.item_key.clone(),
            })?
            .to_string();
        let update = PageUpdate {
            page_id: page_id.clone(),
            item_key: event.item_key.clone(),
            status: event.new_status.clone(),
            previous_status: event.old_status.clone(),
            changed_at: event.timestamp,
        };

        self.upsert_with_retry(&update).await?;
        applied.insert(event.item_key.clone(), event.timestamp);
        info!(
            event = "bridge.applied",
            item = %event.item_key,
            page = %page_id,
            status = %event.new_status,
        );
        Ok(BridgeOutcome::Applied { page_id })
    }

    async fn upsert_with_retry(&self, update: &PageUpdate) -> Result<(), BridgeError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.sink.upsert(update).await {
                Ok(()) => return Ok(()),
                Err(SinkError::Transient(message)) if attempt < max_attempts => {
                    let backoff = self.retry.backoff_for(attempt);
                    warn!(
                        event = "bridge.retry",
                        item = %update.item_key,
                        attempt = attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %message,
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(SinkError::Transient(message)) => {
                    return Err(BridgeError::RetriesExhausted {
                        item_key: update.item_key.clone(),
                        attempts: attempt,
                        message,
                    })
                }
                Err(SinkError::Permanent(message)) => {
                    return Err(BridgeError::Sink {
                        item_key: update.item_key.clone(),
                        message,
                    })
                }
            }
        }
    }
}

impl std::fmt::Debug for StatusBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusBridge")
            .field("mapping", &self.mapping)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct MemorySinkState {
    pages: BTreeMap<String, BTreeMap<String, PageUpdate>>,
    writes: usize,
    failures: Vec<SinkError>,
}

/// In-memory sink. Failures queued with [`fail_next`](Self::fail_next) are
/// returned before any write succeeds.
#[derive(Debug, Default)]
pub struct MemoryDocumentationSink {
    state: StdMutex<MemorySinkState>,
}

impl MemoryDocumentationSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemorySinkState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a failure for the next upsert call.
    pub fn fail_next(&self, error: SinkError) {
        self.lock().failures.push(error);
    }

    /// Current status of `item_key` on `page_id`.
    pub fn status(&self, page_id: &str, item_key: &str) -> Option<String> {
        self.lock()
            .pages
            .get(page_id)
            .and_then(|items| items.get(item_key))
            .map(|u| u.status.clone())
    }

    /// Successful writes so far.
    pub fn writes(&self) -> usize {
        self.lock().writes
    }
}

#[async_trait]
impl DocumentationSink for MemoryDocumentationSink {
    async fn upsert(&self, update: &PageUpdate) -> Result<(), SinkError> {
        let mut state = self.lock();
        if !state.failures.is_empty() {
            return Err(state.failures.remove(0));
        }
        state
            .pages
            .entry(update.page_id.clone())
            .or_default()
            .insert(update.item_key.clone(), update.clone());
        state.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_mapping_beats_project_mapping() {
        let mapping = PageMapping::new()
            .with_project("PAY", "payments-status")
            .with_item("PAY-7", "pay-7-spec");
        assert_eq!(mapping.page_for("PAY-7"), Some("pay-7-spec"));
        assert_eq!(mapping.page_for("PAY-8"), Some("payments-status"));
        assert_eq!(mapping.page_for("OPS-1"), None);
        assert_eq!(mapping.page_for("nohyphen"), None);
    }
}
