//! Text-to-speech (TTS) processing

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::watch;

use super::playback::{AudioPlayback, decode_mp3, resample};
use crate::synthesis::{SpeechEngine, Utterance, Voice};
use crate::{Error, Result};

/// Voices offered by `OpenAI` TTS
pub const OPENAI_VOICES: [&str; 6] = ["alloy", "echo", "fable", "onyx", "nova", "shimmer"];

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";

/// TTS provider backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TtsProvider {
    OpenAI,
    ElevenLabs,
}

/// Synthesizes speech from text
#[derive(Clone, Debug)]
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: String,
    voice: String,
    model: String,
    base_url: String,
    provider: TtsProvider,
}

impl TextToSpeech {
    /// Create a new TTS instance using `OpenAI`
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_openai(api_key: String, voice: String) -> Result<Self> {
        Self::new_openai_with_model(api_key, voice, "tts-1".to_string())
    }

    /// Create a new TTS instance using `OpenAI` with custom model
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_openai_with_model(api_key: String, voice: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice,
            model,
            base_url: OPENAI_BASE_URL.to_string(),
            provider: TtsProvider::OpenAI,
        })
    }

    /// Create a new TTS instance using ElevenLabs
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_elevenlabs(api_key: String, voice_id: String) -> Result<Self> {
        Self::new_elevenlabs_with_model(api_key, voice_id, "eleven_monolingual_v1".to_string())
    }

    /// Create a new TTS instance using ElevenLabs with custom model
    ///
    /// # Errors
    ///
    /// Returns error if API key or voice is missing
    pub fn new_elevenlabs_with_model(
        api_key: String,
        voice_id: String,
        model: String,
    ) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "ElevenLabs API key required for TTS".to_string(),
            ));
        }
        if voice_id.is_empty() {
            return Err(Error::Config("ElevenLabs voice id required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice: voice_id,
            model,
            base_url: ELEVENLABS_BASE_URL.to_string(),
            provider: TtsProvider::ElevenLabs,
        })
    }

    /// Send requests to `base_url` instead of the provider default
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Voices this provider can speak with
    #[must_use]
    pub fn offered_voices(&self) -> Vec<Voice> {
        match self.provider {
            TtsProvider::OpenAI => OPENAI_VOICES
                .iter()
                .map(|name| Voice::new(*name, "en", true))
                .collect(),
            TtsProvider::ElevenLabs => vec![Voice::new(self.voice.clone(), "en", true)],
        }
    }

    /// Synthesize text to MP3 audio
    ///
    /// `voice` overrides the configured voice; `speed` is honoured by
    /// `OpenAI` only.
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    pub async fn synthesize(&self, text: &str, voice: Option<&str>, speed: f32) -> Result<Vec<u8>> {
        let voice = voice.unwrap_or(&self.voice);
        match self.provider {
            TtsProvider::OpenAI => self.synthesize_openai(text, voice, speed).await,
            TtsProvider::ElevenLabs => self.synthesize_elevenlabs(text, voice).await,
        }
    }

    /// Synthesize using OpenAI TTS
    async fn synthesize_openai(&self, text: &str, voice: &str, speed: f32) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice,
            speed: speed.clamp(0.25, 4.0),
        };

        let response = self
            .client
            .post(format!("{}/v1/audio/speech", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("OpenAI TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }

    /// Synthesize using ElevenLabs TTS
    async fn synthesize_elevenlabs(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        let url = format!("{}/v1/text-to-speech/{voice}", self.base_url);

        let request = ElevenLabsRequest {
            text,
            model_id: &self.model,
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("ElevenLabs TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}

/// [`SpeechEngine`] that synthesizes remotely and plays through cpal
pub struct RemoteSpeechEngine {
    tts: TextToSpeech,
    playback: Arc<AudioPlayback>,
    voices: watch::Sender<Vec<Voice>>,
    /// Stop flag of the utterance being played
    playing: Mutex<Option<Arc<AtomicBool>>>,
}

impl RemoteSpeechEngine {
    #[must_use]
    pub fn new(tts: TextToSpeech, playback: Arc<AudioPlayback>) -> Self {
        let (voices, _) = watch::channel(tts.offered_voices());
        Self {
            tts,
            playback,
            voices,
            playing: Mutex::new(None),
        }
    }

    fn playing(&self) -> MutexGuard<'_, Option<Arc<AtomicBool>>> {
        self.playing.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SpeechEngine for RemoteSpeechEngine {
    fn voices(&self) -> watch::Receiver<Vec<Voice>> {
        self.voices.subscribe()
    }

    async fn speak(&self, utterance: Utterance) -> Result<()> {
        let stop = Arc::new(AtomicBool::new(false));
        if let Some(previous) = self.playing().replace(Arc::clone(&stop)) {
            previous.store(true, Ordering::Relaxed);
        }

        let voice = utterance.voice.as_ref().map(|v| v.name.as_str());
        tracing::debug!(chars = utterance.text.len(), voice, "synthesizing utterance");
        let audio = self
            .tts
            .synthesize(&utterance.text, voice, utterance.rate)
            .await?;

        if stop.load(Ordering::Relaxed) {
            return Ok(());
        }

        let playback = Arc::clone(&self.playback);
        let volume = utterance.volume.clamp(0.0, 1.0);
        tokio::task::spawn_blocking(move || {
            let (samples, rate) = decode_mp3(&audio)?;
            let mut samples = resample(&samples, rate, playback.sample_rate())?;
            if volume < 1.0 {
                samples.iter_mut().for_each(|s| *s *= volume);
            }
            playback.play_blocking(samples.into(), &stop)
        })
        .await
        .map_err(|e| Error::Tts(format!("playback task failed: {e}")))?
    }

    fn cancel(&self) {
        if let Some(stop) = self.playing().take() {
            stop.store(true, Ordering::Relaxed);
        }
    }
}
