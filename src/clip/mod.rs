//! Audio clip loader
//!
//! Loads the short cry clip for the entity on display, trying the primary
//! source first and the backup source if that fails. Playback is allowed
//! only once a clip has loaded.

mod decode;
mod http;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::Result;

pub use decode::decode_clip;
pub use http::{DEFAULT_REQUEST_TIMEOUT, HttpClipBackend};

/// Load state of the current clip
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipStatus {
    #[default]
    NotLoaded,
    Loaded,
    Failed,
}

/// Decoded clip ready to play
#[derive(Debug)]
pub struct LoadedClip {
    /// Source the clip was loaded from
    pub source: String,
    /// Mono samples
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
    released: Arc<AtomicBool>,
}

impl LoadedClip {
    pub fn new(source: impl Into<String>, samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            source: source.into(),
            samples: samples.into(),
            sample_rate,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Halt every playback of this clip
    pub fn release(&self) {
        self.released.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Relaxed)
    }

    /// Flag playback loops poll to stop early
    #[must_use]
    pub fn release_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.released)
    }
}

/// Fetches, decodes and plays clips
#[async_trait]
pub trait ClipBackend: Send + Sync {
    /// Load and decode the clip at `url`
    ///
    /// # Errors
    ///
    /// Returns error if the source can't be fetched or decoded
    async fn load(&self, url: &str) -> Result<LoadedClip>;

    /// Start playing `clip` from the beginning without waiting for it
    ///
    /// Overlapping calls play overlapping copies.
    ///
    /// # Errors
    ///
    /// Returns error if playback can't be started
    fn play(&self, clip: &Arc<LoadedClip>) -> Result<()>;
}

struct Generation {
    token: CancellationToken,
    clip: Option<Arc<LoadedClip>>,
}

struct ClipInner {
    backend: Arc<dyn ClipBackend>,
    status: watch::Sender<ClipStatus>,
    current: Mutex<Option<Generation>>,
    lifetime: CancellationToken,
}

/// Cry clip for the entity on display
pub struct ClipLoader {
    inner: Arc<ClipInner>,
}

impl ClipLoader {
    pub fn new(backend: Arc<dyn ClipBackend>) -> Self {
        let (status, _) = watch::channel(ClipStatus::NotLoaded);
        Self {
            inner: Arc::new(ClipInner {
                backend,
                status,
                current: Mutex::new(None),
                lifetime: CancellationToken::new(),
            }),
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ClipStatus> {
        self.inner.status.subscribe()
    }

    #[must_use]
    pub fn status(&self) -> ClipStatus {
        *self.inner.status.borrow()
    }

    /// Replace the clip sources, releasing the previous clip
    ///
    /// Loading starts at once in the background. With no primary source the
    /// loader stays `NotLoaded`. Must be called from within a Tokio runtime.
    pub fn set_sources(&self, primary: Option<&str>, backup: Option<&str>) {
        let inner = &self.inner;
        if inner.lifetime.is_cancelled() {
            return;
        }

        let token = inner.lifetime.child_token();
        let previous = {
            let mut current = inner.current();
            // Old loads must observe cancellation before the slot changes
            if let Some(old) = current.as_ref() {
                old.token.cancel();
            }
            current.replace(Generation {
                token: token.clone(),
                clip: None,
            })
        };
        release(previous);
        inner.publish(ClipStatus::NotLoaded);

        let Some(primary) = primary.map(ToString::to_string) else {
            tracing::debug!("no clip source, staying unloaded");
            return;
        };
        let backup = backup.map(ToString::to_string);

        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            let loading = inner.load_with_fallback(&primary, backup.as_deref());
            tokio::select! {
                biased;
                () = token.cancelled() => {}
                loaded = loading => inner.apply(&token, loaded),
            }
        });
    }

    /// Play the clip; returns false (and does nothing) unless loaded
    pub fn play(&self) -> bool {
        let clip = self
            .inner
            .current()
            .as_ref()
            .and_then(|generation| generation.clip.clone());
        let Some(clip) = clip else {
            tracing::debug!("clip not loaded, ignoring play");
            return false;
        };

        match self.inner.backend.play(&clip) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(source = %clip.source, error = %e, "clip playback failed");
                false
            }
        }
    }

    /// Release the clip and ignore in-flight loads
    pub fn dispose(&self) {
        self.inner.dispose();
    }
}

impl Drop for ClipLoader {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

fn release(generation: Option<Generation>) {
    if let Some(generation) = generation {
        generation.token.cancel();
        if let Some(clip) = generation.clip {
            tracing::debug!(source = %clip.source, "releasing clip");
            clip.release();
        }
    }
}

impl ClipInner {
    fn current(&self) -> MutexGuard<'_, Option<Generation>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, status: ClipStatus) {
        if self.lifetime.is_cancelled() {
            return;
        }
        self.status.send_if_modified(|current| {
            let changed = *current != status;
            *current = status;
            changed
        });
    }

    async fn load_with_fallback(&self, primary: &str, backup: Option<&str>) -> Option<LoadedClip> {
        match self.backend.load(primary).await {
            Ok(clip) => return Some(clip),
            Err(e) => tracing::warn!(source = primary, error = %e, "failed to load clip"),
        }

        let backup = backup?;
        match self.backend.load(backup).await {
            Ok(clip) => Some(clip),
            Err(e) => {
                tracing::warn!(source = backup, error = %e, "both clip sources failed to load");
                None
            }
        }
    }

    fn apply(&self, token: &CancellationToken, loaded: Option<LoadedClip>) {
        let mut current = self.current();
        let Some(generation) = current.as_mut().filter(|_| !token.is_cancelled()) else {
            tracing::debug!("discarding clip for replaced sources");
            if let Some(clip) = loaded {
                clip.release();
            }
            return;
        };

        match loaded {
            Some(clip) => {
                tracing::debug!(source = %clip.source, samples = clip.samples.len(), "clip loaded");
                generation.clip = Some(Arc::new(clip));
                self.publish(ClipStatus::Loaded);
            }
            None => self.publish(ClipStatus::Failed),
        }
    }

    fn dispose(&self) {
        if self.lifetime.is_cancelled() {
            return;
        }
        self.lifetime.cancel();
        let previous = self.current().take();
        release(previous);
        tracing::debug!("clip loader disposed");
    }
}
