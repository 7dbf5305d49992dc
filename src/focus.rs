//! Process-wide audio focus
//!
//! The microphone and the speech output are treated as one exclusive
//! resource. Whoever acquires focus cancels the previous holder's token, so
//! starting capture silences read-back and starting read-back aborts capture.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

/// Component holding audio focus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusHolder {
    /// Voice capture controller
    Capture,
    /// Speech synthesis controller
    Synthesis,
}

struct Holder {
    lease_id: u64,
    holder: FocusHolder,
    token: CancellationToken,
}

/// Single "current holder" of the shared audio devices
#[derive(Default)]
pub struct AudioFocus {
    current: Mutex<Option<Holder>>,
    next_id: AtomicU64,
}

impl AudioFocus {
    /// Create a new, unheld focus
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Take focus for `holder`, preempting whoever held it
    ///
    /// `token` is cancelled if another component later takes focus while
    /// the returned lease is still current.
    pub fn acquire(self: &Arc<Self>, holder: FocusHolder, token: CancellationToken) -> FocusLease {
        let lease_id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut current = self.current();
        if let Some(previous) = current.take()
            && !previous.token.is_cancelled()
        {
            tracing::debug!(
                preempted = ?previous.holder,
                by = ?holder,
                "audio focus preempted"
            );
            previous.token.cancel();
        }
        *current = Some(Holder {
            lease_id,
            holder,
            token,
        });
        drop(current);

        FocusLease {
            focus: Arc::clone(self),
            lease_id,
            holder,
        }
    }

    /// Component currently holding focus, if any
    #[must_use]
    pub fn holder(&self) -> Option<FocusHolder> {
        self.current().as_ref().map(|h| h.holder)
    }

    fn current(&self) -> MutexGuard<'_, Option<Holder>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clear focus if `lease_id` still holds it
    fn release(&self, lease_id: u64) -> bool {
        let mut current = self.current();
        if current.as_ref().is_some_and(|h| h.lease_id == lease_id) {
            *current = None;
            return true;
        }
        false
    }
}

/// Proof of holding audio focus; releases it on drop
pub struct FocusLease {
    focus: Arc<AudioFocus>,
    lease_id: u64,
    holder: FocusHolder,
}

impl Drop for FocusLease {
    fn drop(&mut self) {
        if self.focus.release(self.lease_id) {
            tracing::trace!(holder = ?self.holder, "audio focus released");
        }
    }
}

impl std::fmt::Debug for FocusLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FocusLease")
            .field("lease_id", &self.lease_id)
            .field("holder", &self.holder)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_preempts_previous_holder() {
        let focus = AudioFocus::new();
        let speech = CancellationToken::new();
        let capture = CancellationToken::new();

        let _speech_lease = focus.acquire(FocusHolder::Synthesis, speech.clone());
        assert_eq!(focus.holder(), Some(FocusHolder::Synthesis));

        let _capture_lease = focus.acquire(FocusHolder::Capture, capture.clone());
        assert!(speech.is_cancelled());
        assert!(!capture.is_cancelled());
        assert_eq!(focus.holder(), Some(FocusHolder::Capture));
    }

    #[test]
    fn test_stale_lease_drop_keeps_new_holder() {
        let focus = AudioFocus::new();

        let first = focus.acquire(FocusHolder::Synthesis, CancellationToken::new());
        let second = focus.acquire(FocusHolder::Capture, CancellationToken::new());

        drop(first);
        assert_eq!(focus.holder(), Some(FocusHolder::Capture));

        drop(second);
        assert_eq!(focus.holder(), None);
    }
}
