//! Dex Voice - voice pipeline for a creature encyclopedia
//!
//! This library provides the audio side of the lookup app:
//! - Press-and-hold voice capture and transcription
//! - Read-back of lookup results with pause and resume
//! - Cry clips with primary/backup sources
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │               Presentation layer                     │
//! │   press/release  │  speak/pause  │  play cry         │
//! └────────────────────┬────────────────────────────────┘
//!                      │  watch / broadcast flags
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Controllers                         │
//! │ VoiceCapture │ SpeechSynthesis │ ClipLoader          │
//! │        └── AudioFocus ──┘                            │
//! └────────────────────┬────────────────────────────────┘
//!                      │  trait seams
//! ┌────────────────────▼────────────────────────────────┐
//! │                   Adapters                           │
//! │  cpal mic/speaker │ STT client │ TTS client │ HTTP   │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod clip;
pub mod config;
pub mod error;
pub mod focus;
pub mod recognition;
pub mod synthesis;
pub mod voice;

pub use clip::{ClipBackend, ClipLoader, ClipStatus, HttpClipBackend, LoadedClip};
pub use config::Config;
pub use error::{Error, Result};
pub use focus::{AudioFocus, FocusHolder, FocusLease};
pub use recognition::{
    CaptureError, CaptureSettings, CaptureSnapshot, CaptureState, Microphone, RecordedClip,
    Recording, Transcriber, TranscriptionCallback, VoiceCapture,
};
pub use synthesis::{
    SpeechEngine, SpeechSynthesis, SynthesisSettings, SynthesisStatus, Utterance, Voice,
};
