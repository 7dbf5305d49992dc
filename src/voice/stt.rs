//! Speech-to-text (STT) processing

use async_trait::async_trait;

use crate::recognition::{RecordedClip, Transcriber};
use crate::{Error, Result};

/// Path of the lookup service's transcription endpoint
pub const SERVICE_TRANSCRIPTION_PATH: &str = "/service/speech-to-text";

const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Response from the lookup service
#[derive(serde::Deserialize)]
struct ServiceResponse {
    transcript: String,
}

/// Response from OpenAI Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// STT provider backend
#[derive(Clone, Debug)]
enum SttProvider {
    Service,
    Whisper { api_key: String, model: String },
}

/// Transcribes recorded clips to text
#[derive(Clone, Debug)]
pub struct SpeechToText {
    client: reqwest::Client,
    base_url: String,
    provider: SttProvider,
}

impl SpeechToText {
    /// Create an STT client for the lookup service at `service_url`
    ///
    /// # Errors
    ///
    /// Returns error if `service_url` is not a valid URL
    pub fn new_service(service_url: &str) -> Result<Self> {
        url::Url::parse(service_url)?;

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: service_url.trim_end_matches('/').to_string(),
            provider: SttProvider::Service,
        })
    }

    /// Create an STT client using `OpenAI` Whisper
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_whisper(api_key: String, model: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for Whisper".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: OPENAI_BASE_URL.to_string(),
            provider: SttProvider::Whisper { api_key, model },
        })
    }

    /// Send requests to `base_url` instead of the provider default
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Transcribe using the lookup service
    async fn transcribe_service(&self, clip: RecordedClip) -> Result<String> {
        tracing::debug!(audio_bytes = clip.bytes.len(), "starting service transcription");

        let form = reqwest::multipart::Form::new().part("data", audio_part(clip)?);

        let response = self
            .client
            .post(format!("{}{SERVICE_TRANSCRIPTION_PATH}", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "transcription request failed");
                e
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "transcription service error");
            return Err(Error::Stt(format!("transcription service error {status}: {body}")));
        }

        let result: ServiceResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse response");
            e
        })?;

        tracing::info!(transcript = %result.transcript, "transcription complete");
        Ok(result.transcript)
    }

    /// Transcribe using OpenAI Whisper
    async fn transcribe_whisper(
        &self,
        clip: RecordedClip,
        api_key: &str,
        model: &str,
    ) -> Result<String> {
        tracing::debug!(audio_bytes = clip.bytes.len(), "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part("file", audio_part(clip)?)
            .text("model", model.to_string());

        let response = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.base_url))
            .header("Authorization", format!("Bearer {api_key}"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Whisper request failed");
                e
            })?;

        let status = response.status();
        tracing::debug!(status = %status, "received response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Whisper API error");
            return Err(Error::Stt(format!("Whisper API error {status}: {body}")));
        }

        let result: WhisperResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse response");
            e
        })?;

        tracing::info!(transcript = %result.text, "transcription complete");
        Ok(result.text)
    }
}

#[async_trait]
impl Transcriber for SpeechToText {
    async fn transcribe(&self, clip: RecordedClip) -> Result<String> {
        match &self.provider {
            SttProvider::Service => self.transcribe_service(clip).await,
            SttProvider::Whisper { api_key, model } => {
                self.transcribe_whisper(clip, api_key, model).await
            }
        }
    }
}

fn audio_part(clip: RecordedClip) -> Result<reqwest::multipart::Part> {
    reqwest::multipart::Part::bytes(clip.bytes)
        .file_name(clip.file_name)
        .mime_str(&clip.mime_type)
        .map_err(|e| Error::Stt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whisper_requires_key() {
        let result = SpeechToText::new_whisper(String::new(), "whisper-1".to_string());
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_service_url_is_validated() {
        assert!(matches!(
            SpeechToText::new_service("not a url"),
            Err(Error::Url(_))
        ));
        let stt = SpeechToText::new_service("http://localhost:8000/").unwrap();
        assert_eq!(stt.base_url, "http://localhost:8000");
    }
}
