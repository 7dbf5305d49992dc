//! HTTP-backed clip backend

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use super::{ClipBackend, LoadedClip, decode_clip};
use crate::voice::{AudioPlayback, PLAYBACK_SAMPLE_RATE, resample};
use crate::{Error, Result};

/// Default bound on one clip download
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Downloads clips over HTTP and plays them on the default output device
pub struct HttpClipBackend {
    client: reqwest::Client,
    sample_rate: u32,
    output: Option<Arc<AudioPlayback>>,
}

impl HttpClipBackend {
    /// Backend that plays through `output`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client can't be built
    pub fn new(output: Arc<AudioPlayback>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            sample_rate: output.sample_rate(),
            output: Some(output),
        })
    }

    /// Backend that only loads clips; every `play` fails
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client can't be built
    pub fn load_only(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            sample_rate: PLAYBACK_SAMPLE_RATE,
            output: None,
        })
    }

    async fn fetch(&self, url: &Url) -> Result<Vec<u8>> {
        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Clip(format!("clip request failed with {status}")));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

#[async_trait]
impl ClipBackend for HttpClipBackend {
    async fn load(&self, url: &str) -> Result<LoadedClip> {
        let parsed = Url::parse(url)?;
        let bytes = self.fetch(&parsed).await?;
        tracing::debug!(source = url, bytes = bytes.len(), "clip downloaded");

        let extension = Path::new(parsed.path())
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        let target = self.sample_rate;

        let samples = tokio::task::spawn_blocking(move || {
            let (samples, rate) = decode_clip(&bytes, extension.as_deref())?;
            resample(&samples, rate, target)
        })
        .await
        .map_err(|e| Error::Clip(format!("decode task failed: {e}")))??;

        Ok(LoadedClip::new(url, samples, target))
    }

    fn play(&self, clip: &Arc<LoadedClip>) -> Result<()> {
        let Some(output) = self.output.as_ref().map(Arc::clone) else {
            return Err(Error::Audio("no output device configured".to_string()));
        };

        let samples = Arc::clone(&clip.samples);
        let stop = clip.release_flag();
        let source = clip.source.clone();

        std::thread::Builder::new()
            .name("clip-playback".to_string())
            .spawn(move || {
                if let Err(e) = output.play_blocking(samples, &stop) {
                    tracing::error!(source = %source, error = %e, "clip playback error");
                }
            })?;

        Ok(())
    }
}
