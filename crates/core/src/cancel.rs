//! Re-armable cancellation token
//!
//! One token per session. Each reply arms a guard that observes only cancels
//! raised after it was armed, so the token re-arms implicitly for the next
//! turn. `cancel()` is idempotent within an armed period: raising it twice
//! leaves every guard in the same state as raising it once.

use std::sync::Arc;

use tokio::sync::watch;

/// Session-wide cancellation source
#[derive(Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<u64>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    /// Raise cancellation for everything armed before this call.
    pub fn cancel(&self) {
        self.tx.send_modify(|v| *v += 1);
    }

    /// Arm a guard against the current state of the token.
    pub fn arm(&self) -> CancelGuard {
        CancelGuard {
            armed_at: *self.tx.borrow(),
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer side: resolves once the token is cancelled after arming
#[derive(Clone)]
pub struct CancelGuard {
    armed_at: u64,
    rx: watch::Receiver<u64>,
}

impl CancelGuard {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() > self.armed_at
    }

    /// Wait until cancelled. Resolves immediately when already cancelled,
    /// and when the owning token is dropped (session teardown).
    pub async fn cancelled(&mut self) {
        let armed_at = self.armed_at;
        let _ = self.rx.wait_for(|v| *v > armed_at).await;
    }
}
