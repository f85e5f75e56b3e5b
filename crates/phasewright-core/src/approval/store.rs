//! Persistence for approval records.
//!
//! A record holds the prompt, the suspended run it parks, its status, and
//! an optional continuation the caller attaches for after the run. Records
//! carry a SHA-256 seal over everything but the status so a tampered file
//! is refused instead of resumed.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::NamedTempFile;

use super::decision::{ApprovalDecision, ApprovalPrompt};
use super::error::{StoreError, StoreResult};
use crate::agent::SuspendedRun;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Resolved { decision: ApprovalDecision },
}

impl ApprovalStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, ApprovalStatus::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub prompt: ApprovalPrompt,
    pub run: SuspendedRun,
    pub status: ApprovalStatus,
    /// What the caller does once the run finishes, e.g. later stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation: Option<Value>,
    /// SHA-256 hex digest of `(prompt, run, continuation)`.
    pub content_digest: String,
}

impl ApprovalRecord {
    /// A fresh pending record for `run`, sealed.
    pub fn pending(run: SuspendedRun) -> StoreResult<Self> {
        let prompt = ApprovalPrompt::for_run(&run);
        let content_digest = Self::digest(&prompt, &run, None)?;
        Ok(Self {
            prompt,
            run,
            status: ApprovalStatus::Pending,
            continuation: None,
            content_digest,
        })
    }

    pub fn request_id(&self) -> &str {
        &self.prompt.request_id
    }

    /// Store `payload` as the continuation and reseal.
    pub fn set_continuation<T: Serialize>(&mut self, payload: &T) -> StoreResult<()> {
        let value = serde_json::to_value(payload)?;
        self.content_digest = Self::digest(&self.prompt, &self.run, Some(&value))?;
        self.continuation = Some(value);
        Ok(())
    }

    /// The attached continuation, if any.
    pub fn continuation<T: DeserializeOwned>(&self) -> StoreResult<Option<T>> {
        match &self.continuation {
            Some(value) => Ok(Some(T::deserialize(value)?)),
            None => Ok(None),
        }
    }

    fn digest(
        prompt: &ApprovalPrompt,
        run: &SuspendedRun,
        continuation: Option<&Value>,
    ) -> StoreResult<String> {
        use sha2::Digest as _;
        let bytes = serde_json::to_vec(&(prompt, run, continuation))?;
        Ok(hex::encode(sha2::Sha256::digest(&bytes)))
    }

    /// Re-derive the seal and compare it with the stored one.
    pub fn verify(&self) -> StoreResult<()> {
        let actual = Self::digest(&self.prompt, &self.run, self.continuation.as_ref())?;
        if actual != self.content_digest {
            return Err(StoreError::Integrity {
                request_id: self.prompt.request_id.clone(),
                expected: self.content_digest.clone(),
                actual,
            });
        }
        Ok(())
    }
}

/// Backend for approval records, keyed by request id.
///
/// Implementations only store; the check-then-write sequencing lives in
/// [`ApprovalGate`](super::ApprovalGate).
pub trait ApprovalStore: Send + Sync {
    fn load(&self, request_id: &str) -> StoreResult<Option<ApprovalRecord>>;

    /// Insert or overwrite the record under its request id.
    fn save(&self, record: &ApprovalRecord) -> StoreResult<()>;

    /// Every record, in no particular order.
    fn list(&self) -> StoreResult<Vec<ApprovalRecord>>;
}

/// In-process store. Contents are lost with the process.
#[derive(Debug, Default)]
pub struct MemoryApprovalStore {
    records: Mutex<BTreeMap<String, ApprovalRecord>>,
}

impl MemoryApprovalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, ApprovalRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ApprovalStore for MemoryApprovalStore {
    fn load(&self, request_id: &str) -> StoreResult<Option<ApprovalRecord>> {
        Ok(self.lock().get(request_id).cloned())
    }

    fn save(&self, record: &ApprovalRecord) -> StoreResult<()> {
        self.lock()
            .insert(record.request_id().to_string(), record.clone());
        Ok(())
    }

    fn list(&self) -> StoreResult<Vec<ApprovalRecord>> {
        Ok(self.lock().values().cloned().collect())
    }
}

/// One pretty-printed JSON file per request under a directory.
///
/// Layout: `<root>/<request_id>.json`. Writes go to a temp file in the same
/// directory and are renamed into place.
#[derive(Debug)]
pub struct FsApprovalStore {
    root: PathBuf,
}

impl FsApprovalStore {
    /// Open a store at `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, request_id: &str) -> StoreResult<PathBuf> {
        let valid = !request_id.is_empty()
            && request_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::InvalidKey(request_id.to_string()));
        }
        Ok(self.root.join(format!("{request_id}.json")))
    }

    fn read_record(path: &Path) -> StoreResult<ApprovalRecord> {
        let data = fs::read_to_string(path)?;
        let record: ApprovalRecord = serde_json::from_str(&data)?;
        record.verify()?;
        Ok(record)
    }
}

impl ApprovalStore for FsApprovalStore {
    fn load(&self, request_id: &str) -> StoreResult<Option<ApprovalRecord>> {
        let path = self.record_path(request_id)?;
        match Self::read_record(&path) {
            Ok(record) => Ok(Some(record)),
            Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn save(&self, record: &ApprovalRecord) -> StoreResult<()> {
        let path = self.record_path(record.request_id())?;
        let json = serde_json::to_vec_pretty(record)?;

        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(&json)?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(())
    }

    fn list(&self) -> StoreResult<Vec<ApprovalRecord>> {
        let mut records = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                records.push(Self::read_record(&path)?);
            }
        }
        Ok(records)
    }
}
