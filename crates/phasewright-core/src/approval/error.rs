//! Error types for the approval gate and its stores.

use uuid::Uuid;

/// Errors produced by the approval gate.
#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    #[error("approval request {request_id} was already resolved")]
    AlreadyResolved { request_id: String },

    #[error("unknown approval request: {request_id}")]
    UnknownRequest { request_id: String },

    #[error("decision targets request {actual} but was submitted for {expected}")]
    DecisionMismatch { expected: String, actual: String },

    #[error("invalid decision for request {request_id}: {reason}")]
    InvalidDecision { request_id: String, reason: String },

    #[error("run {run_id} already has an outstanding approval ({request_id})")]
    SlotOccupied { run_id: Uuid, request_id: String },

    #[error("approval store error: {0}")]
    Store(#[from] StoreError),
}

impl ApprovalError {
    /// Stable snake_case code used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ApprovalError::AlreadyResolved { .. } => "already_resolved",
            ApprovalError::UnknownRequest { .. } => "unknown_request",
            ApprovalError::DecisionMismatch { .. } => "decision_mismatch",
            ApprovalError::InvalidDecision { .. } => "invalid_decision",
            ApprovalError::SlotOccupied { .. } => "slot_occupied",
            ApprovalError::Store(_) => "store",
        }
    }
}

/// Errors from an [`ApprovalStore`](super::ApprovalStore) backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("record {request_id} failed integrity check: expected {expected}, got {actual}")]
    Integrity {
        request_id: String,
        expected: String,
        actual: String,
    },

    #[error("invalid request id for storage: {0:?}")]
    InvalidKey(String),
}

/// Result type for approval gate operations.
pub type ApprovalResult<T> = std::result::Result<T, ApprovalError>;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
