//! Shared test utilities
//!
//! In-memory stand-ins for the microphone, transcription endpoint, speech
//! engine and clip backend.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};

use dex_voice::clip::{ClipBackend, LoadedClip};
use dex_voice::{
    CaptureState, Error, Microphone, RecordedClip, Recording, Result, SpeechEngine, Transcriber,
    TranscriptionCallback, Utterance, Voice,
};

/// Microphone that counts opens and device releases
#[derive(Default)]
pub struct FakeMicrophone {
    opens: AtomicUsize,
    releases: Arc<AtomicUsize>,
    finished_on: Arc<Mutex<Option<ThreadId>>>,
    deny: bool,
    open_delay: Option<Duration>,
}

impl FakeMicrophone {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every open fails as if permission were refused
    #[must_use]
    pub fn denying() -> Self {
        Self {
            deny: true,
            ..Self::default()
        }
    }

    /// Opening takes `delay` before the device is granted
    #[must_use]
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Thread the last recording was finished on
    pub fn finished_on(&self) -> Option<ThreadId> {
        *self.finished_on.lock().unwrap()
    }
}

#[async_trait]
impl Microphone for FakeMicrophone {
    async fn open(&self) -> Result<Box<dyn Recording>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        if self.deny {
            return Err(Error::Microphone("permission denied".to_string()));
        }
        Ok(Box::new(FakeRecording {
            releases: Arc::clone(&self.releases),
            finished_on: Arc::clone(&self.finished_on),
            released: false,
        }))
    }
}

struct FakeRecording {
    releases: Arc<AtomicUsize>,
    finished_on: Arc<Mutex<Option<ThreadId>>>,
    released: bool,
}

impl FakeRecording {
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl Recording for FakeRecording {
    fn finish(mut self: Box<Self>) -> Result<RecordedClip> {
        *self.finished_on.lock().unwrap() = Some(std::thread::current().id());
        self.release();
        Ok(RecordedClip {
            bytes: b"RIFF\0\0\0\0WAVE".to_vec(),
            file_name: "recording.wav".to_string(),
            mime_type: "audio/wav".to_string(),
        })
    }
}

impl Drop for FakeRecording {
    fn drop(&mut self) {
        self.release();
    }
}

/// Transcription endpoint with a scripted reply
pub struct FakeTranscriber {
    reply: Option<String>,
    delay: Duration,
    calls: AtomicUsize,
}

impl FakeTranscriber {
    /// Answers every request with `text`
    #[must_use]
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Some(text.to_string()),
            delay: Duration::from_millis(200),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fails every request
    #[must_use]
    pub fn failing() -> Self {
        Self {
            reply: None,
            delay: Duration::from_millis(200),
            calls: AtomicUsize::new(0),
        }
    }

    /// Answer only after `delay`
    #[must_use]
    pub const fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, _clip: RecordedClip) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.reply
            .clone()
            .ok_or_else(|| Error::Stt("service unavailable".to_string()))
    }
}

/// Result callback that records every invocation
#[derive(Clone, Default)]
pub struct Results(Arc<Mutex<Vec<(String, bool)>>>);

impl Results {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn callback(&self) -> TranscriptionCallback {
        let results = Arc::clone(&self.0);
        Arc::new(move |text: String, auto_submit: bool| {
            results.lock().unwrap().push((text, auto_submit));
        })
    }

    pub fn taken(&self) -> Vec<(String, bool)> {
        self.0.lock().unwrap().clone()
    }
}

/// Collect broadcast states up to and including `last`
pub async fn states_until(
    rx: &mut broadcast::Receiver<CaptureState>,
    last: CaptureState,
) -> Vec<CaptureState> {
    let mut states = Vec::new();
    let collect = async {
        loop {
            let state = rx.recv().await.expect("transition channel closed");
            states.push(state);
            if state == last {
                break;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(120), collect)
        .await
        .expect("timed out waiting for capture transitions");
    states
}

/// Speech engine that takes a fixed time per utterance
pub struct FakeEngine {
    voices: watch::Sender<Vec<Voice>>,
    per_utterance: Duration,
    fail_on: Option<usize>,
    started: Mutex<Vec<Utterance>>,
    finished: Mutex<Vec<String>>,
    cancels: AtomicUsize,
}

impl FakeEngine {
    #[must_use]
    pub fn new(per_utterance: Duration) -> Self {
        let (voices, _) = watch::channel(vec![
            Voice::new("Anna", "de-DE", true),
            Voice::new("Remote English", "en-US", false),
            Voice::new("Samantha", "en-US", true),
        ]);
        Self {
            voices,
            per_utterance,
            fail_on: None,
            started: Mutex::new(Vec::new()),
            finished: Mutex::new(Vec::new()),
            cancels: AtomicUsize::new(0),
        }
    }

    /// The utterance with this start index errors out mid-way
    #[must_use]
    pub const fn failing_on(mut self, index: usize) -> Self {
        self.fail_on = Some(index);
        self
    }

    /// Replace the offered voices, as a platform voice list change would
    pub fn offer_voices(&self, voices: Vec<Voice>) {
        self.voices.send_replace(voices);
    }

    pub fn started(&self) -> Vec<String> {
        self.started
            .lock()
            .unwrap()
            .iter()
            .map(|u| u.text.clone())
            .collect()
    }

    pub fn started_utterances(&self) -> Vec<Utterance> {
        self.started.lock().unwrap().clone()
    }

    pub fn finished(&self) -> Vec<String> {
        self.finished.lock().unwrap().clone()
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechEngine for FakeEngine {
    fn voices(&self) -> watch::Receiver<Vec<Voice>> {
        self.voices.subscribe()
    }

    async fn speak(&self, utterance: Utterance) -> Result<()> {
        let index = {
            let mut started = self.started.lock().unwrap();
            started.push(utterance.clone());
            started.len() - 1
        };

        tokio::time::sleep(self.per_utterance / 2).await;
        if self.fail_on == Some(index) {
            return Err(Error::Tts("synthesis-failed".to_string()));
        }
        tokio::time::sleep(self.per_utterance / 2).await;

        self.finished.lock().unwrap().push(utterance.text);
        Ok(())
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
    }
}

/// Clip backend with per-source outcomes
#[derive(Default)]
pub struct FakeClipBackend {
    outcomes: HashMap<String, bool>,
    delays: HashMap<String, Duration>,
    loads: Mutex<Vec<String>>,
    played: Mutex<Vec<Arc<LoadedClip>>>,
}

impl FakeClipBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `source` loads successfully
    #[must_use]
    pub fn serving(mut self, source: &str) -> Self {
        self.outcomes.insert(source.to_string(), true);
        self
    }

    /// `source` loads successfully after `delay`
    #[must_use]
    pub fn serving_slowly(mut self, source: &str, delay: Duration) -> Self {
        self.delays.insert(source.to_string(), delay);
        self.serving(source)
    }

    pub fn loads(&self) -> Vec<String> {
        self.loads.lock().unwrap().clone()
    }

    pub fn played(&self) -> Vec<Arc<LoadedClip>> {
        self.played.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClipBackend for FakeClipBackend {
    async fn load(&self, url: &str) -> Result<LoadedClip> {
        self.loads.lock().unwrap().push(url.to_string());
        let delay = self
            .delays
            .get(url)
            .copied()
            .unwrap_or(Duration::from_millis(50));
        tokio::time::sleep(delay).await;

        if self.outcomes.get(url).copied().unwrap_or(false) {
            Ok(LoadedClip::new(url, vec![0.1; 240], 24000))
        } else {
            Err(Error::Clip(format!("{url} returned 404")))
        }
    }

    fn play(&self, clip: &Arc<LoadedClip>) -> Result<()> {
        self.played.lock().unwrap().push(Arc::clone(clip));
        Ok(())
    }
}
