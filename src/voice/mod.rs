//! Platform adapters
//!
//! cpal-backed microphone and speaker, plus the HTTP clients for
//! transcription and speech synthesis.

mod capture;
mod playback;
mod stt;
mod tts;

pub use capture::{AudioCapture, CpalMicrophone, SAMPLE_RATE, samples_to_wav};
pub use playback::{AudioPlayback, PLAYBACK_SAMPLE_RATE, decode_mp3, resample};
pub use stt::{SERVICE_TRANSCRIPTION_PATH, SpeechToText};
pub use tts::{OPENAI_VOICES, RemoteSpeechEngine, TextToSpeech};
