//! Run-control primitives shared across pipeline stages.
//!
//! Cancellation is cooperative: stages observe a [`CancelToken`] at their
//! suspension points (backoff sleeps, between frontier units) and wind down
//! without corrupting checkpoint state. The [`CancelHandle`] side lives with
//! whoever supervises the run.

use std::sync::{Arc, OnceLock};

use tokio::sync::watch;

/// Create a connected handle/token pair for one run.
#[must_use]
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: Arc::new(tx) }, CancelToken { rx })
}

/// Requests cancellation of a running pipeline. Cheap to clone.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Signal every token derived from this handle. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    /// Derive another token observing the same signal.
    #[must_use]
    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Observer side of a cancellation signal. Cheap to clone.
#[derive(Clone, Debug)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Token that never fires, for callers that do not need cancellation.
    #[must_use]
    pub fn never() -> Self {
        static NEVER: OnceLock<watch::Sender<bool>> = OnceLock::new();
        let tx = NEVER.get_or_init(|| watch::channel(false).0);
        CancelToken { rx: tx.subscribe() }
    }

    /// Non-blocking check, intended for between-unit boundaries.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. If the handle is dropped
    /// without cancelling, this pends forever, so it is only useful inside
    /// `select!` arms racing real work.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
        std::future::pending::<()>().await
    }
}
