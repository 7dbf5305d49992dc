//! Error types for Dex Voice

use thiserror::Error;

/// Result type alias for Dex Voice operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by adapters and clients
///
/// The controllers never hand these to the presentation layer; they are
/// folded into state flags (see [`crate::recognition::CaptureError`]).
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Microphone could not be opened (denied or missing)
    #[error("microphone error: {0}")]
    Microphone(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Clip download or playback error
    #[error("clip error: {0}")]
    Clip(String),

    /// Audio container or codec error
    #[error("decode error: {0}")]
    Decode(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Invalid URL
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}
