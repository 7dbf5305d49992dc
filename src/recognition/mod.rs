//! Voice capture controller
//!
//! Owns the press-to-talk state machine: holding the control past the
//! minimum duration opens the microphone, releasing it closes the device and
//! submits the buffered clip for transcription. Exactly one session may be
//! Listening or Processing at a time.
//!
//! ```text
//! Idle ──grant──▶ Listening ──release──▶ Processing ──transcript──▶ Idle
//!   │                                        │
//!   └──denied──▶ Errored ──▶ Idle ◀──────────┘ (empty / failed)
//! ```

mod hold;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::focus::{AudioFocus, FocusHolder, FocusLease};
use crate::{Error, Result};
use hold::{HoldGate, HoldRelease};

/// Minimum hold before a press starts capturing
pub const MIN_HOLD: Duration = Duration::from_millis(1000);

/// Upper bound on one transcription round trip
pub const TRANSCRIPTION_TIMEOUT: Duration = Duration::from_secs(15);

/// Encoded audio recorded during one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedClip {
    /// Encoded audio bytes
    pub bytes: Vec<u8>,
    /// File name used for the multipart upload
    pub file_name: String,
    /// MIME type of `bytes`
    pub mime_type: String,
}

/// Source of recordings (the platform microphone)
#[async_trait]
pub trait Microphone: Send + Sync {
    /// Whether capture is supported on this platform at all
    fn is_available(&self) -> bool {
        true
    }

    /// Request the device and start buffering
    ///
    /// # Errors
    ///
    /// Returns error if access is denied or no device exists
    async fn open(&self) -> Result<Box<dyn Recording>>;
}

/// An open microphone buffering audio
///
/// Dropping a recording without finishing it must release the device.
pub trait Recording: Send {
    /// Stop buffering, release the device and return the encoded clip
    ///
    /// # Errors
    ///
    /// Returns error if the buffered audio cannot be encoded
    fn finish(self: Box<Self>) -> Result<RecordedClip>;
}

/// External transcription endpoint
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Turn a recorded clip into text
    ///
    /// # Errors
    ///
    /// Returns error on transport or server failure
    async fn transcribe(&self, clip: RecordedClip) -> Result<String>;
}

/// Capture session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureState {
    #[default]
    Idle,
    Listening,
    Processing,
    Errored,
}

/// Why a capture session produced no transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum CaptureError {
    /// Permission denied or no input device
    #[serde(rename = "microphone_access_error")]
    #[error("microphone_access_error")]
    MicrophoneAccess,

    /// Transcription came back empty
    #[serde(rename = "no_transcript")]
    #[error("no_transcript")]
    NoTranscript,

    /// Transport, server, encoding or timeout failure
    #[serde(rename = "processing_error")]
    #[error("processing_error")]
    Processing,
}

impl CaptureError {
    /// Stable error code shown to the presentation layer
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::MicrophoneAccess => "microphone_access_error",
            Self::NoTranscript => "no_transcript",
            Self::Processing => "processing_error",
        }
    }
}

/// Flags exposed to the presentation layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CaptureSnapshot {
    pub state: CaptureState,
    pub transcript: Option<String>,
    pub error: Option<CaptureError>,
}

impl CaptureSnapshot {
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.state == CaptureState::Listening
    }

    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.state == CaptureState::Processing
    }
}

/// Tunables for the capture controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSettings {
    /// Presses shorter than this never open the microphone
    pub min_hold: Duration,
    /// Flag handed to the result callback alongside the transcript
    pub auto_submit: bool,
    /// Bound on the transcription round trip; `None` waits forever
    pub transcription_timeout: Option<Duration>,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            min_hold: MIN_HOLD,
            auto_submit: true,
            transcription_timeout: Some(TRANSCRIPTION_TIMEOUT),
        }
    }
}

/// Invoked once per successful session with `(transcript, auto_submit)`
pub type TranscriptionCallback = Arc<dyn Fn(String, bool) + Send + Sync>;

enum Slot {
    Vacant,
    Acquiring {
        id: Uuid,
        token: CancellationToken,
        stop_requested: bool,
        lease: FocusLease,
    },
    Listening {
        id: Uuid,
        token: CancellationToken,
        recording: Box<dyn Recording>,
        lease: FocusLease,
    },
    Processing {
        id: Uuid,
        token: CancellationToken,
    },
}

impl Slot {
    const fn id(&self) -> Option<Uuid> {
        match self {
            Self::Vacant => None,
            Self::Acquiring { id, .. } | Self::Listening { id, .. } | Self::Processing { id, .. } => {
                Some(*id)
            }
        }
    }

    const fn token(&self) -> Option<&CancellationToken> {
        match self {
            Self::Vacant => None,
            Self::Acquiring { token, .. }
            | Self::Listening { token, .. }
            | Self::Processing { token, .. } => Some(token),
        }
    }
}

struct CaptureInner {
    microphone: Arc<dyn Microphone>,
    transcriber: Arc<dyn Transcriber>,
    focus: Arc<AudioFocus>,
    settings: CaptureSettings,
    on_result: TranscriptionCallback,
    snapshot: watch::Sender<CaptureSnapshot>,
    transitions: broadcast::Sender<CaptureState>,
    slot: Mutex<Slot>,
    hold: HoldGate,
    lifetime: CancellationToken,
}

/// Press-to-talk capture controller
pub struct VoiceCapture {
    inner: Arc<CaptureInner>,
}

impl VoiceCapture {
    /// Create a controller
    ///
    /// `on_result` fires exactly once per successful session and never on
    /// failure.
    pub fn new(
        microphone: Arc<dyn Microphone>,
        transcriber: Arc<dyn Transcriber>,
        focus: Arc<AudioFocus>,
        settings: CaptureSettings,
        on_result: TranscriptionCallback,
    ) -> Self {
        let (snapshot, _) = watch::channel(CaptureSnapshot::default());
        let (transitions, _) = broadcast::channel(32);
        let hold = HoldGate::new(settings.min_hold);

        Self {
            inner: Arc::new(CaptureInner {
                microphone,
                transcriber,
                focus,
                settings,
                on_result,
                snapshot,
                transitions,
                slot: Mutex::new(Slot::Vacant),
                hold,
                lifetime: CancellationToken::new(),
            }),
        }
    }

    /// Watch the flags the presentation layer renders
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CaptureSnapshot> {
        self.inner.snapshot.subscribe()
    }

    /// Every state transition, in order
    #[must_use]
    pub fn transitions(&self) -> broadcast::Receiver<CaptureState> {
        self.inner.transitions.subscribe()
    }

    /// Current flags
    #[must_use]
    pub fn snapshot(&self) -> CaptureSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    /// Whether the platform can capture audio at all
    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.inner.microphone.is_available()
    }

    /// The control was pressed
    ///
    /// Capture starts only if the press is still held after the minimum
    /// hold duration. Must be called from within a Tokio runtime.
    pub fn press(&self) {
        let inner = &self.inner;
        if inner.lifetime.is_cancelled() {
            return;
        }
        if inner.slot().id().is_some() {
            tracing::debug!("capture session active, ignoring press");
            return;
        }
        let Some((generation, token)) = inner.hold.press(&inner.lifetime) else {
            return;
        };

        let inner = Arc::clone(inner);
        let min_hold = inner.settings.min_hold;
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(min_hold) => {
                    if inner.hold.engage(generation) {
                        inner.begin(true).await;
                    }
                }
            }
        });
    }

    /// The control was released
    ///
    /// Must be called from within a Tokio runtime.
    pub fn release(&self) {
        match self.inner.hold.release() {
            HoldRelease::Early => {
                tracing::debug!("released before minimum hold, ignoring press");
            }
            HoldRelease::Elapsed => {
                // The timer hasn't fired yet; open and stop straight away
                let inner = Arc::clone(&self.inner);
                tokio::spawn(async move { inner.begin(true).await });
            }
            HoldRelease::Engaged => self.inner.stop_listening(),
            HoldRelease::Idle => {}
        }
    }

    /// Open the microphone and start buffering, bypassing the hold gate
    pub async fn start_listening(&self) {
        self.inner.begin(false).await;
    }

    /// Stop buffering and submit the clip; a no-op unless Listening
    pub fn stop_listening(&self) {
        self.inner.stop_listening();
    }

    /// Abort the active session without error or callback
    pub fn cancel(&self) {
        self.inner.hold.reset();
        let id = self.inner.slot().id();
        if let Some(id) = id {
            self.inner.abort(id);
        }
    }

    /// Clear the stored transcript
    pub fn reset_transcript(&self) {
        self.inner.update(|s| s.transcript = None);
    }

    /// Tear down: release any device and ignore every late callback
    pub fn dispose(&self) {
        self.inner.dispose();
    }
}

impl Drop for VoiceCapture {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl CaptureInner {
    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publish a state change; inert once disposed
    fn transition(&self, state: CaptureState, update: impl FnOnce(&mut CaptureSnapshot)) {
        if self.lifetime.is_cancelled() {
            return;
        }
        let changed = self.snapshot.borrow().state != state;
        self.snapshot.send_modify(|s| {
            s.state = state;
            update(s);
        });
        if changed {
            tracing::debug!(?state, "capture state changed");
            let _ = self.transitions.send(state);
        }
    }

    /// Update flags without changing state; inert once disposed
    fn update(&self, update: impl FnOnce(&mut CaptureSnapshot)) {
        if self.lifetime.is_cancelled() {
            return;
        }
        self.snapshot.send_modify(update);
    }

    async fn begin(self: &Arc<Self>, via_hold: bool) {
        if self.lifetime.is_cancelled() {
            return;
        }

        let id = Uuid::new_v4();
        let token = self.lifetime.child_token();
        {
            let mut slot = self.slot();
            if slot.id().is_some() {
                tracing::debug!("capture session already active, ignoring start");
                return;
            }

            // Read-back must stop before the microphone opens
            let lease = self.focus.acquire(FocusHolder::Capture, token.clone());

            // The hold may have been released between engaging and here
            let stop_requested = via_hold && !self.hold.is_engaged();
            *slot = Slot::Acquiring {
                id,
                token: token.clone(),
                stop_requested,
                lease,
            };
            self.update(|s| {
                s.transcript = None;
                s.error = None;
            });
        }
        self.watch_session(id, token.clone());

        tracing::debug!(session = %id, "requesting microphone");
        let opened = self.microphone.open().await;

        let mut slot = self.slot();
        match (std::mem::replace(&mut *slot, Slot::Vacant), opened) {
            (
                Slot::Acquiring {
                    id: current,
                    stop_requested,
                    lease,
                    ..
                },
                Ok(recording),
            ) if current == id && !token.is_cancelled() => {
                *slot = Slot::Listening {
                    id,
                    token,
                    recording,
                    lease,
                };
                self.transition(CaptureState::Listening, |_| {});
                drop(slot);

                tracing::debug!(session = %id, "listening");
                if stop_requested {
                    self.stop_listening();
                }
            }
            (Slot::Acquiring { id: current, lease, .. }, Err(e))
                if current == id && !token.is_cancelled() =>
            {
                tracing::warn!(session = %id, error = %e, "microphone access failed");
                token.cancel();
                self.transition(CaptureState::Errored, |s| {
                    s.error = Some(CaptureError::MicrophoneAccess);
                });
                self.transition(CaptureState::Idle, |_| {});
                drop(slot);
                drop(lease);
            }
            (other, opened) => {
                *slot = other;
                drop(slot);
                // Session was aborted while the device was being opened;
                // dropping the recording releases it
                match opened {
                    Ok(recording) => {
                        tracing::debug!(session = %id, "discarding microphone grant for stale session");
                        drop(recording);
                    }
                    Err(e) => {
                        tracing::debug!(session = %id, error = %e, "microphone failure for stale session");
                    }
                }
            }
        }
    }

    /// Abort the session once its token is cancelled (preemption, cancel)
    fn watch_session(self: &Arc<Self>, id: Uuid, token: CancellationToken) {
        let inner: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            token.cancelled().await;
            if let Some(inner) = inner.upgrade() {
                inner.abort(id);
            }
        });
    }

    fn stop_listening(self: &Arc<Self>) {
        let mut slot = self.slot();
        match std::mem::replace(&mut *slot, Slot::Vacant) {
            Slot::Listening {
                id,
                token,
                recording,
                lease,
            } => {
                *slot = Slot::Processing {
                    id,
                    token: token.clone(),
                };
                self.transition(CaptureState::Processing, |_| {});
                drop(slot);
                drop(lease);

                let inner = Arc::clone(self);
                tokio::spawn(async move { inner.submit(id, token, recording).await });
            }
            Slot::Acquiring {
                id, token, lease, ..
            } => {
                tracing::debug!(session = %id, "stop requested while microphone opening");
                *slot = Slot::Acquiring {
                    id,
                    token,
                    stop_requested: true,
                    lease,
                };
            }
            other => {
                *slot = other;
                tracing::trace!("stop requested with no active recording");
            }
        }
    }

    /// Release the device off the async workers, then transcribe
    async fn submit(&self, id: Uuid, token: CancellationToken, recording: Box<dyn Recording>) {
        let finished = tokio::task::spawn_blocking(move || recording.finish())
            .await
            .unwrap_or_else(|e| Err(Error::Microphone(format!("recording task failed: {e}"))));

        match finished {
            Ok(clip) => {
                tracing::debug!(session = %id, bytes = clip.bytes.len(), "submitting clip");
                self.transcribe(id, token, clip).await;
            }
            Err(e) => {
                tracing::warn!(session = %id, error = %e, "failed to finish recording");
                self.complete(id, Err(CaptureError::Processing));
            }
        }
    }

    async fn transcribe(&self, id: Uuid, token: CancellationToken, clip: RecordedClip) {
        let round_trip = async {
            let request = self.transcriber.transcribe(clip);
            match self.settings.transcription_timeout {
                Some(limit) => tokio::time::timeout(limit, request)
                    .await
                    .unwrap_or_else(|_| {
                        Err(Error::Stt(format!("transcription timed out after {limit:?}")))
                    }),
                None => request.await,
            }
        };

        let result = tokio::select! {
            biased;
            () = token.cancelled() => {
                tracing::debug!(session = %id, "transcription abandoned");
                return;
            }
            result = round_trip => result,
        };

        let outcome = match result {
            Ok(text) if !text.trim().is_empty() => {
                let text = text.trim().to_string();
                tracing::info!(session = %id, transcript = %text, "transcription received");
                Ok(text)
            }
            Ok(_) => {
                tracing::warn!(session = %id, "empty transcript");
                Err(CaptureError::NoTranscript)
            }
            Err(e) => {
                tracing::warn!(session = %id, error = %e, "transcription failed");
                Err(CaptureError::Processing)
            }
        };

        self.complete(id, outcome);
    }

    /// Apply the outcome of a round trip if its session is still current
    fn complete(&self, id: Uuid, outcome: std::result::Result<String, CaptureError>) {
        let mut slot = self.slot();
        let token = match &*slot {
            Slot::Processing { id: current, token } if *current == id && !token.is_cancelled() => {
                token.clone()
            }
            _ => {
                tracing::debug!(session = %id, "discarding result for stale session");
                return;
            }
        };
        *slot = Slot::Vacant;
        token.cancel();

        match &outcome {
            Ok(text) => self.transition(CaptureState::Idle, |s| {
                s.transcript = Some(text.clone());
                s.error = None;
            }),
            Err(code) => {
                let code = *code;
                self.transition(CaptureState::Errored, |s| s.error = Some(code));
                self.transition(CaptureState::Idle, |_| {});
            }
        }
        drop(slot);

        if let Ok(text) = outcome
            && !self.lifetime.is_cancelled()
        {
            (self.on_result)(text, self.settings.auto_submit);
        }
    }

    /// Reset the session `id` to Idle, releasing whatever it holds
    fn abort(&self, id: Uuid) {
        let mut slot = self.slot();
        if slot.id() != Some(id) {
            return;
        }
        let previous = std::mem::replace(&mut *slot, Slot::Vacant);
        if let Some(token) = previous.token() {
            token.cancel();
        }
        tracing::debug!(session = %id, "capture session aborted");
        self.transition(CaptureState::Idle, |_| {});
        drop(slot);
        drop(previous);
    }

    fn dispose(&self) {
        if self.lifetime.is_cancelled() {
            return;
        }
        self.hold.reset();
        self.lifetime.cancel();
        let previous = std::mem::replace(&mut *self.slot(), Slot::Vacant);
        drop(previous);
        tracing::debug!("capture controller disposed");
    }
}
