//! TOML configuration file loading
//!
//! Supports `~/.config/dexvoice/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct DexVoiceConfigFile {
    /// Microphone capture configuration
    #[serde(default)]
    pub capture: CaptureFileConfig,

    /// Transcription endpoint configuration
    #[serde(default)]
    pub transcription: TranscriptionFileConfig,

    /// Read-back configuration
    #[serde(default)]
    pub synthesis: SynthesisFileConfig,

    /// Cry clip configuration
    #[serde(default)]
    pub clip: ClipFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Capture controller configuration
#[derive(Debug, Default, Deserialize)]
pub struct CaptureFileConfig {
    /// Minimum press duration before capture starts
    pub min_hold_ms: Option<u64>,

    /// Hand transcripts to the callback as final
    pub auto_submit: Option<bool>,

    /// Upper bound on one transcription round trip
    pub transcription_timeout_secs: Option<u64>,
}

/// Transcription configuration
#[derive(Debug, Default, Deserialize)]
pub struct TranscriptionFileConfig {
    /// "service" or "whisper"
    pub provider: Option<String>,

    /// Base URL of the lookup service
    pub service_url: Option<String>,

    /// Whisper model (e.g. "whisper-1")
    pub model: Option<String>,
}

/// Read-back configuration
#[derive(Debug, Default, Deserialize)]
pub struct SynthesisFileConfig {
    /// "openai" or "elevenlabs"
    pub provider: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub model: Option<String>,

    /// Voice name or ElevenLabs voice id
    pub voice: Option<String>,

    /// Preferred voice language (e.g. "en")
    pub language: Option<String>,

    pub max_segment_chars: Option<usize>,
    pub rate: Option<f32>,
    pub pitch: Option<f32>,
    pub volume: Option<f32>,
}

/// Cry clip configuration
#[derive(Debug, Default, Deserialize)]
pub struct ClipFileConfig {
    /// Download timeout per clip source
    pub request_timeout_secs: Option<u64>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub elevenlabs: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `DexVoiceConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> DexVoiceConfigFile {
    config_file_path().map_or_else(DexVoiceConfigFile::default, |path| load_from_path(&path))
}

/// Load a config file from `path`, falling back to defaults
pub fn load_from_path(path: &Path) -> DexVoiceConfigFile {
    if !path.exists() {
        return DexVoiceConfigFile::default();
    }

    match read_config_file(path) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "loaded config file");
            config
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            DexVoiceConfigFile::default()
        }
    }
}

/// Read and parse the config file at `path`
///
/// # Errors
///
/// Returns error if the file can't be read or isn't valid TOML
pub fn read_config_file(path: &Path) -> Result<DexVoiceConfigFile> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Return the config file path: `~/.config/dexvoice/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("dexvoice").join("config.toml"))
}
