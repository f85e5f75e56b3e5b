//! Human approval for gated tool calls.
//!
//! When an agent in `manual` or `hybrid` mode reaches a gated call it
//! suspends into a [`SuspendedRun`](crate::agent::SuspendedRun). The
//! [`ApprovalGate`] parks that run in an [`ApprovalStore`] until exactly one
//! [`ApprovalDecision`] resolves it.
//!
//! # Module layout
//!
//! - [`decision`]: `Verdict`, `ApprovalDecision`, `ApprovalPrompt`
//! - [`gate`]: `ApprovalGate`, `PendingApproval`
//! - [`store`]: `ApprovalStore` trait, memory and filesystem backends
//! - [`approver`]: `Approver` trait, `AutoApprover`, `TimeoutApprover`
//! - [`error`]: `ApprovalError`, `StoreError`

pub mod approver;
pub mod decision;
pub mod error;
pub mod gate;
pub mod store;

pub use approver::{Approver, AutoApprover, TimeoutApprover};
pub use decision::{ApprovalDecision, ApprovalPrompt, Verdict};
pub use error::{ApprovalError, ApprovalResult, StoreError, StoreResult};
pub use gate::{ApprovalGate, PendingApproval};
pub use store::{
    ApprovalRecord, ApprovalStatus, ApprovalStore, FsApprovalStore, MemoryApprovalStore,
};
