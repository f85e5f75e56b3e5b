//! Best-effort cancellation for long orchestrator calls.

use std::future::Future;

use tokio::sync::watch;

use super::error::{OrchestratorError, OrchestratorResult};

/// Cloneable cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

/// Trigger side of a [`CancelSignal`].
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl CancelSignal {
    pub fn new() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelSignal { rx })
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    async fn cancelled(mut self) {
        // A dropped handle can never cancel, so wait forever in that case.
        if self.rx.wait_for(|c| *c).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Run `fut` until it finishes or `signal` fires.
///
/// On cancellation `fut` is dropped at its next await point and its result,
/// if any would have come, is discarded. Side effects already performed by
/// tools are not rolled back.
pub async fn with_cancellation<F, T>(fut: F, signal: CancelSignal) -> OrchestratorResult<T>
where
    F: Future<Output = OrchestratorResult<T>>,
{
    if signal.is_cancelled() {
        return Err(OrchestratorError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = signal.cancelled() => Err(OrchestratorError::Cancelled),
        out = fut => out,
    }
}
