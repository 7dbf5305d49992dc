//! Configuration management for Dex Voice

pub mod file;

use std::str::FromStr;
use std::time::Duration;

use crate::clip::DEFAULT_REQUEST_TIMEOUT;
use crate::recognition::CaptureSettings;
use crate::synthesis::SynthesisSettings;
use crate::voice::{SpeechToText, TextToSpeech};
use crate::{Error, Result};
use file::DexVoiceConfigFile;

/// Default base URL of the lookup service
pub const DEFAULT_SERVICE_URL: &str = "http://localhost:8000";

/// Dex Voice configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Press-and-hold capture tunables
    pub capture: CaptureSettings,

    /// Transcription endpoint
    pub transcription: TranscriptionConfig,

    /// Read-back tunables (voice, language, segment size)
    pub synthesis: SynthesisSettings,

    /// Remote TTS engine
    pub tts: TtsConfig,

    /// Cry clip downloads
    pub clip: ClipConfig,

    /// API keys
    pub api_keys: ApiKeys,
}

/// Which transcription endpoint to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TranscriptionProvider {
    /// The lookup service's own speech-to-text endpoint
    #[default]
    Service,
    /// `OpenAI` Whisper
    Whisper,
}

impl FromStr for TranscriptionProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "service" => Ok(Self::Service),
            "whisper" | "openai" => Ok(Self::Whisper),
            other => Err(Error::Config(format!(
                "unknown transcription provider: {other}"
            ))),
        }
    }
}

/// Transcription configuration
#[derive(Debug, Clone)]
pub struct TranscriptionConfig {
    pub provider: TranscriptionProvider,

    /// Base URL of the lookup service
    pub service_url: String,

    /// Whisper model
    pub model: String,
}

/// Which TTS service backs the speech engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TtsProvider {
    #[default]
    OpenAI,
    ElevenLabs,
}

impl FromStr for TtsProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "elevenlabs" => Ok(Self::ElevenLabs),
            other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
        }
    }
}

/// Remote TTS configuration
#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub provider: TtsProvider,

    /// Model override (provider default when unset)
    pub model: Option<String>,
}

/// Cry clip configuration
#[derive(Debug, Clone)]
pub struct ClipConfig {
    /// Download timeout per clip source
    pub request_timeout: Duration,
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (for Whisper and TTS)
    pub openai: Option<String>,

    /// ElevenLabs API key
    pub elevenlabs: Option<String>,
}

impl Config {
    /// Load configuration from environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if a provider name is unknown
    pub fn load() -> Result<Self> {
        Self::from_sources(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Assemble configuration with precedence env > file > default
    ///
    /// # Errors
    ///
    /// Returns error if a provider name is unknown
    pub fn from_sources(
        fc: DexVoiceConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let env = |key: &str| env(key).filter(|value| !value.trim().is_empty());
        let env_parsed = |key: &str| env(key).and_then(|value| value.trim().parse::<u64>().ok());

        // Capture config (env > toml > default)
        let defaults = CaptureSettings::default();
        let min_hold = env_parsed("DEXVOICE_MIN_HOLD_MS")
            .or(fc.capture.min_hold_ms)
            .map_or(defaults.min_hold, Duration::from_millis);
        let transcription_timeout = env_parsed("DEXVOICE_TRANSCRIPTION_TIMEOUT_SECS")
            .or(fc.capture.transcription_timeout_secs)
            .map_or(defaults.transcription_timeout, |secs| {
                // Zero disables the bound
                (secs > 0).then(|| Duration::from_secs(secs))
            });
        let capture = CaptureSettings {
            min_hold,
            auto_submit: fc.capture.auto_submit.unwrap_or(defaults.auto_submit),
            transcription_timeout,
        };

        // Transcription config (env > toml > default)
        let transcription = TranscriptionConfig {
            provider: env("DEXVOICE_STT_PROVIDER")
                .or(fc.transcription.provider)
                .map(|p| p.parse())
                .transpose()?
                .unwrap_or_default(),
            service_url: env("DEXVOICE_SERVICE_URL")
                .or(fc.transcription.service_url)
                .unwrap_or_else(|| DEFAULT_SERVICE_URL.to_string()),
            model: env("DEXVOICE_STT_MODEL")
                .or(fc.transcription.model)
                .unwrap_or_else(|| "whisper-1".to_string()),
        };

        // Synthesis config (env > toml > default)
        let synth = SynthesisSettings::default();
        let synthesis = SynthesisSettings {
            max_segment_chars: fc
                .synthesis
                .max_segment_chars
                .filter(|&n| n > 0)
                .unwrap_or(synth.max_segment_chars),
            language: env("DEXVOICE_LANGUAGE")
                .or(fc.synthesis.language)
                .unwrap_or(synth.language),
            voice: env("DEXVOICE_TTS_VOICE").or(fc.synthesis.voice),
            rate: fc.synthesis.rate.unwrap_or(synth.rate),
            pitch: fc.synthesis.pitch.unwrap_or(synth.pitch),
            volume: fc.synthesis.volume.unwrap_or(synth.volume),
        };

        let tts = TtsConfig {
            provider: env("DEXVOICE_TTS_PROVIDER")
                .or(fc.synthesis.provider)
                .map(|p| p.parse())
                .transpose()?
                .unwrap_or_default(),
            model: env("DEXVOICE_TTS_MODEL").or(fc.synthesis.model),
        };

        let clip = ClipConfig {
            request_timeout: fc
                .clip
                .request_timeout_secs
                .map_or(DEFAULT_REQUEST_TIMEOUT, Duration::from_secs),
        };

        // API keys (env > toml > None)
        let api_keys = ApiKeys {
            openai: env("OPENAI_API_KEY").or(fc.api_keys.openai),
            elevenlabs: env("ELEVENLABS_API_KEY").or(fc.api_keys.elevenlabs),
        };

        Ok(Self {
            capture,
            transcription,
            synthesis,
            tts,
            clip,
            api_keys,
        })
    }

    /// Build the configured transcription client
    ///
    /// # Errors
    ///
    /// Returns error if the service URL is invalid or a key is missing
    pub fn transcriber(&self) -> Result<SpeechToText> {
        match self.transcription.provider {
            TranscriptionProvider::Service => {
                SpeechToText::new_service(&self.transcription.service_url)
            }
            TranscriptionProvider::Whisper => SpeechToText::new_whisper(
                self.api_keys.openai.clone().unwrap_or_default(),
                self.transcription.model.clone(),
            ),
        }
    }

    /// Build the configured TTS client
    ///
    /// # Errors
    ///
    /// Returns error if the provider's key or voice is missing
    pub fn text_to_speech(&self) -> Result<TextToSpeech> {
        let voice = self.synthesis.voice.clone();
        match self.tts.provider {
            TtsProvider::OpenAI => TextToSpeech::new_openai_with_model(
                self.api_keys.openai.clone().unwrap_or_default(),
                voice.unwrap_or_else(|| "alloy".to_string()),
                self.tts.model.clone().unwrap_or_else(|| "tts-1".to_string()),
            ),
            TtsProvider::ElevenLabs => {
                let key = self.api_keys.elevenlabs.clone().unwrap_or_default();
                let voice = voice.unwrap_or_default();
                match self.tts.model.clone() {
                    Some(model) => TextToSpeech::new_elevenlabs_with_model(key, voice, model),
                    None => TextToSpeech::new_elevenlabs(key, voice),
                }
            }
        }
    }
}
