//! Press-and-hold gate
//!
//! A press only becomes a capture once it has been held for the minimum
//! duration. Shorter presses are dropped without touching the microphone.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

enum HoldState {
    Released,
    Pending {
        generation: u64,
        pressed_at: Instant,
        token: CancellationToken,
    },
    Engaged,
}

/// Outcome of releasing the control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldRelease {
    /// Nothing was pressed
    Idle,
    /// Released before the minimum hold elapsed
    Early,
    /// Held for the minimum duration but released before the timer engaged
    Elapsed,
    /// Released after capture was engaged
    Engaged,
}

pub struct HoldGate {
    min_hold: Duration,
    state: Mutex<HoldState>,
    generation: AtomicU64,
}

impl HoldGate {
    pub const fn new(min_hold: Duration) -> Self {
        Self {
            min_hold,
            state: Mutex::new(HoldState::Released),
            generation: AtomicU64::new(0),
        }
    }

    fn state(&self) -> MutexGuard<'_, HoldState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Begin a hold; returns the pending generation and its timer token
    ///
    /// Returns `None` when a hold is already in progress.
    pub fn press(&self, parent: &CancellationToken) -> Option<(u64, CancellationToken)> {
        let mut state = self.state();
        if !matches!(*state, HoldState::Released) {
            return None;
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let token = parent.child_token();
        *state = HoldState::Pending {
            generation,
            pressed_at: Instant::now(),
            token: token.clone(),
        };
        Some((generation, token))
    }

    /// Promote a pending hold once its timer fires
    pub fn engage(&self, generation: u64) -> bool {
        let mut state = self.state();
        match &*state {
            HoldState::Pending { generation: g, .. } if *g == generation => {
                *state = HoldState::Engaged;
                true
            }
            _ => false,
        }
    }

    /// Whether a hold has passed the minimum duration and not been released
    pub fn is_engaged(&self) -> bool {
        matches!(*self.state(), HoldState::Engaged)
    }

    /// End the hold
    ///
    /// The hold length is measured from the press, so a release landing on
    /// the same tick as the timer still counts as a full hold.
    pub fn release(&self) -> HoldRelease {
        let mut state = self.state();
        match std::mem::replace(&mut *state, HoldState::Released) {
            HoldState::Released => HoldRelease::Idle,
            HoldState::Pending {
                pressed_at, token, ..
            } => {
                token.cancel();
                if pressed_at.elapsed() >= self.min_hold {
                    HoldRelease::Elapsed
                } else {
                    HoldRelease::Early
                }
            }
            HoldState::Engaged => HoldRelease::Engaged,
        }
    }

    /// Drop any hold in progress without reporting it
    pub fn reset(&self) {
        if let HoldState::Pending { token, .. } =
            std::mem::replace(&mut *self.state(), HoldState::Released)
        {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN_HOLD: Duration = Duration::from_millis(1000);

    #[test]
    fn test_early_release_cancels_timer() {
        let gate = HoldGate::new(MIN_HOLD);
        let parent = CancellationToken::new();

        let (_, token) = gate.press(&parent).unwrap();
        assert_eq!(gate.release(), HoldRelease::Early);
        assert!(token.is_cancelled());
        assert_eq!(gate.release(), HoldRelease::Idle);
    }

    #[test]
    fn test_engage_requires_current_generation() {
        let gate = HoldGate::new(MIN_HOLD);
        let parent = CancellationToken::new();

        let (first, _) = gate.press(&parent).unwrap();
        gate.release();
        let (second, _) = gate.press(&parent).unwrap();

        assert!(!gate.engage(first));
        assert!(gate.engage(second));
        assert!(gate.is_engaged());
        assert_eq!(gate.release(), HoldRelease::Engaged);
    }

    #[test]
    fn test_repeated_press_is_ignored() {
        let gate = HoldGate::new(MIN_HOLD);
        let parent = CancellationToken::new();

        assert!(gate.press(&parent).is_some());
        assert!(gate.press(&parent).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_at_threshold_counts_as_hold() {
        let gate = HoldGate::new(MIN_HOLD);
        let parent = CancellationToken::new();

        let (_, token) = gate.press(&parent).unwrap();
        tokio::time::advance(MIN_HOLD).await;

        assert_eq!(gate.release(), HoldRelease::Elapsed);
        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_just_before_threshold_is_early() {
        let gate = HoldGate::new(MIN_HOLD);
        let parent = CancellationToken::new();

        gate.press(&parent).unwrap();
        tokio::time::advance(MIN_HOLD - Duration::from_millis(1)).await;

        assert_eq!(gate.release(), HoldRelease::Early);
    }
}
