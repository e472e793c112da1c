//! One-shot resolution gate
//!
//! Every path that can finish a probe (content fetch, transport event,
//! deadline, external cancel) calls [`ResolutionGate::try_resolve`]. Only the
//! first call stores its value; the rest are ignored. Resolution also fires
//! the teardown token, which the channels watch to release their resources.

use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub struct ResolutionGate<T> {
    slot: Mutex<Option<T>>,
    teardown: CancellationToken,
}

impl<T> Default for ResolutionGate<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ResolutionGate<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            teardown: CancellationToken::new(),
        }
    }

    /// Store `value` if nothing was stored yet. Returns whether this call won.
    pub fn try_resolve(&self, value: T) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if self.teardown.is_cancelled() {
            return false;
        }
        *slot = Some(value);
        self.teardown.cancel();
        true
    }

    pub fn is_resolved(&self) -> bool {
        self.teardown.is_cancelled()
    }

    /// Token cancelled exactly once, at resolution.
    pub fn teardown_token(&self) -> CancellationToken {
        self.teardown.clone()
    }

    /// Wait until some path resolves the gate.
    pub async fn resolved(&self) {
        self.teardown.cancelled().await;
    }

    /// Take the stored value. `None` before resolution or after a previous take.
    pub fn take(&self) -> Option<T> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}
