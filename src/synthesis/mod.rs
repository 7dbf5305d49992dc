//! Speech synthesis controller
//!
//! Turns lookup-result text into sequenced, interruptible spoken output.
//! Each `speak` call cancels whatever was playing, cleans the text, splits it
//! into sentence-aligned segments and feeds them to the engine strictly in
//! order. Only one read-back exists at a time.

mod text;
mod voices;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::Result;
use crate::focus::{AudioFocus, FocusHolder, FocusLease};

pub use text::{MAX_SEGMENT_CHARS, clean_text, from_char, segment, split_sentences};
pub use voices::{Voice, preferred_voice};

/// One segment handed to the engine
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    /// Segment text exactly as cut from the cleaned text, edge spaces included
    pub text: String,
    pub voice: Option<Voice>,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

/// Platform speech engine
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Offered voices; the value changes when the platform's list does
    fn voices(&self) -> watch::Receiver<Vec<Voice>>;

    /// Speak one utterance, resolving when it ends
    ///
    /// # Errors
    ///
    /// Returns error if the engine fails mid-utterance
    async fn speak(&self, utterance: Utterance) -> Result<()>;

    /// Silence the engine immediately; safe to call when idle
    fn cancel(&self);
}

/// Flags exposed to the presentation layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SynthesisStatus {
    pub speaking: bool,
    pub paused: bool,
}

impl SynthesisStatus {
    const IDLE: Self = Self {
        speaking: false,
        paused: false,
    };
}

/// Tunables for the synthesis controller
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisSettings {
    /// Longest segment handed to the engine in one utterance
    pub max_segment_chars: usize,
    /// Preferred voice language (e.g. "en")
    pub language: String,
    /// Voice name to use when the engine offers it
    pub voice: Option<String>,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            max_segment_chars: MAX_SEGMENT_CHARS,
            language: "en".to_string(),
            voice: None,
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
        }
    }
}

/// One pass over (part of) the session text
struct Run {
    token: CancellationToken,
    /// Char offset of each segment within the session text
    starts: Vec<usize>,
    current: Arc<AtomicUsize>,
}

struct Session {
    id: Uuid,
    text: String,
    total_chars: usize,
    token: CancellationToken,
    run: Option<Run>,
    paused_at: Option<usize>,
    _lease: FocusLease,
}

#[derive(Default)]
struct Catalogue {
    voices: Vec<Voice>,
    selected: Option<Voice>,
    pinned: bool,
}

struct SynthInner {
    engine: Option<Arc<dyn SpeechEngine>>,
    focus: Arc<AudioFocus>,
    settings: SynthesisSettings,
    status: watch::Sender<SynthesisStatus>,
    session: Mutex<Option<Session>>,
    catalogue: Mutex<Catalogue>,
    unavailable_logged: AtomicBool,
    lifetime: CancellationToken,
}

/// Read-back controller
pub struct SpeechSynthesis {
    inner: Arc<SynthInner>,
}

impl SpeechSynthesis {
    /// Create a controller
    ///
    /// `engine` is `None` when the platform has no synthesis support; every
    /// operation is then inert. With an engine this must be called from
    /// within a Tokio runtime.
    pub fn new(
        engine: Option<Arc<dyn SpeechEngine>>,
        focus: Arc<AudioFocus>,
        settings: SynthesisSettings,
    ) -> Self {
        let (status, _) = watch::channel(SynthesisStatus::IDLE);
        let inner = Arc::new(SynthInner {
            engine,
            focus,
            settings,
            status,
            session: Mutex::new(None),
            catalogue: Mutex::new(Catalogue::default()),
            unavailable_logged: AtomicBool::new(false),
            lifetime: CancellationToken::new(),
        });

        if let Some(engine) = inner.engine.clone() {
            inner.watch_voices(&engine);
        }

        Self { inner }
    }

    /// Watch the flags the presentation layer renders
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SynthesisStatus> {
        self.inner.status.subscribe()
    }

    /// Current flags
    #[must_use]
    pub fn status(&self) -> SynthesisStatus {
        *self.inner.status.borrow()
    }

    /// Whether a speech engine is present
    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.inner.engine.is_some()
    }

    /// Read `text` aloud, replacing any read-back in progress
    pub fn speak(&self, text: &str) {
        self.inner.speak(text);
    }

    /// Stop reading; a no-op when idle
    pub fn stop(&self) {
        if self.inner.engine().is_some() {
            self.inner.stop_session();
        }
    }

    /// Pause when speaking, resume when paused
    ///
    /// The engine reports no spoken position, so pausing records a coarse
    /// resumption point halfway through the text not yet confirmed spoken.
    /// Resuming re-reads from there.
    pub fn toggle_pause_resume(&self) {
        self.inner.toggle_pause_resume();
    }

    /// Voices currently offered by the engine
    #[must_use]
    pub fn voices(&self) -> Vec<Voice> {
        self.inner.catalogue().voices.clone()
    }

    /// Voice attached to new utterances
    #[must_use]
    pub fn selected_voice(&self) -> Option<Voice> {
        self.inner.catalogue().selected.clone()
    }

    /// Choose a voice by name; returns false if the engine doesn't offer it
    pub fn select_voice(&self, name: &str) -> bool {
        let mut catalogue = self.inner.catalogue();
        let Some(voice) = catalogue.voices.iter().find(|v| v.name == name).cloned() else {
            return false;
        };
        tracing::debug!(voice = %voice.name, "voice selected");
        catalogue.selected = Some(voice);
        catalogue.pinned = true;
        true
    }

    /// Tear down: stop speaking and ignore every late engine event
    pub fn dispose(&self) {
        self.inner.dispose();
    }
}

impl Drop for SpeechSynthesis {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl SynthInner {
    fn session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn catalogue(&self) -> MutexGuard<'_, Catalogue> {
        self.catalogue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn engine(&self) -> Option<Arc<dyn SpeechEngine>> {
        let engine = self.engine.clone();
        if engine.is_none() && !self.unavailable_logged.swap(true, Ordering::Relaxed) {
            tracing::warn!("speech synthesis unavailable, read-back disabled");
        }
        engine
    }

    /// Publish flags; inert once disposed
    fn publish(&self, status: SynthesisStatus) {
        if self.lifetime.is_cancelled() {
            return;
        }
        self.status.send_if_modified(|current| {
            let changed = *current != status;
            *current = status;
            changed
        });
    }

    fn speak(self: &Arc<Self>, text: &str) {
        if self.lifetime.is_cancelled() {
            return;
        }
        let Some(engine) = self.engine() else {
            return;
        };

        self.stop_session();

        let cleaned = clean_text(text);
        if cleaned.is_empty() {
            tracing::debug!("nothing to speak after cleanup");
            return;
        }

        let id = Uuid::new_v4();
        let token = self.lifetime.child_token();
        let lease = self.focus.acquire(FocusHolder::Synthesis, token.clone());

        // Held across spawning so the run can't report before it is recorded
        let mut guard = self.session();
        let run = self.start_run(engine, id, &token, &cleaned, 0);
        tracing::debug!(
            session = %id,
            chars = cleaned.len(),
            segments = run.starts.len(),
            "speaking"
        );
        *guard = Some(Session {
            id,
            total_chars: cleaned.chars().count(),
            text: cleaned,
            token: token.clone(),
            run: Some(run),
            paused_at: None,
            _lease: lease,
        });
        drop(guard);

        self.watch_session(id, token);
    }

    /// Spawn playback of `text`, which begins at char `base` of the session
    fn start_run(
        self: &Arc<Self>,
        engine: Arc<dyn SpeechEngine>,
        session_id: Uuid,
        session_token: &CancellationToken,
        text: &str,
        base: usize,
    ) -> Run {
        let segments = segment(text, self.settings.max_segment_chars);

        let mut starts = Vec::with_capacity(segments.len());
        let mut offset = base;
        for s in &segments {
            starts.push(offset);
            offset += s.chars().count();
        }

        let token = session_token.child_token();
        let current = Arc::new(AtomicUsize::new(0));
        tokio::spawn(Arc::clone(self).drive(
            engine,
            session_id,
            token.clone(),
            segments,
            Arc::clone(&current),
        ));

        Run {
            token,
            starts,
            current,
        }
    }

    async fn drive(
        self: Arc<Self>,
        engine: Arc<dyn SpeechEngine>,
        session_id: Uuid,
        token: CancellationToken,
        segments: Vec<String>,
        current: Arc<AtomicUsize>,
    ) {
        let count = segments.len();
        for (index, segment) in segments.into_iter().enumerate() {
            current.store(index, Ordering::Relaxed);
            if segment.trim().is_empty() {
                continue;
            }

            self.mark_speaking(session_id, &token);
            let utterance = self.utterance(&segment);

            tokio::select! {
                biased;
                () = token.cancelled() => return,
                result = engine.speak(utterance) => {
                    if let Err(e) = result {
                        tracing::warn!(session = %session_id, segment = index, error = %e, "speech engine error");
                        self.finish(session_id, &token);
                        return;
                    }
                    tracing::trace!(session = %session_id, segment = index + 1, of = count, "segment spoken");
                }
            }
        }

        self.finish(session_id, &token);
    }

    fn utterance(&self, text: &str) -> Utterance {
        Utterance {
            text: text.to_string(),
            voice: self.catalogue().selected.clone(),
            rate: self.settings.rate,
            pitch: self.settings.pitch,
            volume: self.settings.volume,
        }
    }

    fn is_current_run(session: Option<&Session>, id: Uuid, run: &CancellationToken) -> bool {
        session.is_some_and(|s| s.id == id) && !run.is_cancelled()
    }

    fn mark_speaking(&self, id: Uuid, run: &CancellationToken) {
        let guard = self.session();
        if Self::is_current_run(guard.as_ref(), id, run) {
            self.publish(SynthesisStatus {
                speaking: true,
                paused: false,
            });
        }
    }

    /// The run ended on its own (last segment or engine error)
    fn finish(&self, id: Uuid, run: &CancellationToken) {
        let mut guard = self.session();
        if !Self::is_current_run(guard.as_ref(), id, run) {
            return;
        }
        if let Some(session) = guard.take() {
            session.token.cancel();
            tracing::debug!(session = %id, "read-back finished");
        }
        self.publish(SynthesisStatus::IDLE);
    }

    fn stop_session(&self) {
        let previous = self.session().take();
        let Some(session) = previous else {
            return;
        };

        if let Some(run) = &session.run {
            run.token.cancel();
        }
        session.token.cancel();
        if let Some(engine) = &self.engine {
            engine.cancel();
        }
        tracing::debug!(session = %session.id, "read-back stopped");
        self.publish(SynthesisStatus::IDLE);
    }

    fn toggle_pause_resume(self: &Arc<Self>) {
        let Some(engine) = self.engine() else {
            return;
        };
        let mut guard = self.session();
        let Some(session) = guard.as_mut() else {
            return;
        };

        if let Some(run) = session.run.take() {
            let index = run.current.load(Ordering::Relaxed);
            let segment_start = run
                .starts
                .get(index)
                .copied()
                .unwrap_or(session.total_chars);
            let remaining = session.total_chars.saturating_sub(segment_start);
            let offset = segment_start + remaining / 2;

            run.token.cancel();
            engine.cancel();
            session.paused_at = Some(offset);
            tracing::debug!(session = %session.id, offset, "read-back paused");
            self.publish(SynthesisStatus {
                speaking: false,
                paused: true,
            });
        } else if let Some(offset) = session.paused_at.take() {
            let rest = from_char(&session.text, offset).to_string();
            let run = self.start_run(engine, session.id, &session.token, &rest, offset);
            session.run = Some(run);
            tracing::debug!(session = %session.id, offset, "read-back resumed");
            self.publish(SynthesisStatus {
                speaking: false,
                paused: false,
            });
        }
    }

    /// Clear the session once its token fires (preemption by capture)
    fn watch_session(self: &Arc<Self>, id: Uuid, token: CancellationToken) {
        let inner: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            token.cancelled().await;
            if let Some(inner) = inner.upgrade() {
                inner.preempted(id);
            }
        });
    }

    fn preempted(&self, id: Uuid) {
        let mut guard = self.session();
        if !guard.as_ref().is_some_and(|s| s.id == id) {
            return;
        }
        let session = guard.take();
        drop(guard);

        if let Some(run) = session.as_ref().and_then(|s| s.run.as_ref()) {
            run.token.cancel();
        }
        if let Some(engine) = &self.engine {
            engine.cancel();
        }
        tracing::debug!(session = %id, "read-back preempted");
        self.publish(SynthesisStatus::IDLE);
    }

    fn watch_voices(self: &Arc<Self>, engine: &Arc<dyn SpeechEngine>) {
        let mut voices = engine.voices();
        let initial = voices.borrow_and_update().clone();
        self.refresh_voices(initial);

        let inner: Weak<Self> = Arc::downgrade(self);
        let lifetime = self.lifetime.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = lifetime.cancelled() => break,
                    changed = voices.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let list = voices.borrow_and_update().clone();
                        let Some(inner) = inner.upgrade() else {
                            break;
                        };
                        inner.refresh_voices(list);
                    }
                }
            }
        });
    }

    fn refresh_voices(&self, voices: Vec<Voice>) {
        let mut catalogue = self.catalogue();

        let keep = catalogue.pinned
            && catalogue
                .selected
                .as_ref()
                .is_some_and(|selected| voices.contains(selected));
        if !keep {
            catalogue.pinned = false;
            catalogue.selected = preferred_voice(
                &voices,
                &self.settings.language,
                self.settings.voice.as_deref(),
            )
            .cloned();
        }

        tracing::debug!(
            count = voices.len(),
            selected = ?catalogue.selected.as_ref().map(|v| v.name.as_str()),
            "voice catalogue updated"
        );
        catalogue.voices = voices;
    }

    fn dispose(&self) {
        if self.lifetime.is_cancelled() {
            return;
        }
        self.stop_session();
        self.lifetime.cancel();
        tracing::debug!("synthesis controller disposed");
    }
}
