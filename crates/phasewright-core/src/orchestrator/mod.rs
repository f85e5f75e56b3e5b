//! Phase and role orchestration.
//!
//! The [`Orchestrator`] owns the per-stage configuration ([`ModeTable`]),
//! builds an [`Agent`](crate::agent::Agent) for each stage run, sequences
//! runs in declared order and routes approval suspensions either to an
//! attached [`Approver`](crate::approval::Approver) or back to the caller.
//!
//! # Module layout
//!
//! - [`engine`]: `Orchestrator`
//! - [`modes`]: `ModeTable`
//! - [`result`]: `PhaseResult`, `PhaseRun`, `SequenceReport`, `Resolution`, `RunRecord`
//! - [`cancel`]: `with_cancellation`, `CancelSignal`
//! - [`error`]: `OrchestratorError`, `OrchestratorResult`

pub mod cancel;
pub mod engine;
pub mod error;
pub mod modes;
pub mod result;

pub use cancel::{with_cancellation, CancelHandle, CancelSignal};
pub use engine::Orchestrator;
pub use error::{OrchestratorError, OrchestratorResult};
pub use modes::ModeTable;
pub use result::{
    PhaseError, PhaseResult, PhaseRun, Resolution, RunRecord, SequenceReport, SequenceStatus,
};
