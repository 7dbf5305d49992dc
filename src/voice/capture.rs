//! Audio capture from microphone

use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use tokio::sync::oneshot;

use crate::recognition::{Microphone, RecordedClip, Recording};
use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

type SampleBuffer = Arc<Mutex<Vec<f32>>>;

/// Captures audio from the default input device
///
/// Holds a live cpal stream, so it stays on the thread that created it.
pub struct AudioCapture {
    config: StreamConfig,
    buffer: SampleBuffer,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Create a new audio capture instance
    ///
    /// # Errors
    ///
    /// Returns error if no input device or usable config is available
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Microphone("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Microphone(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Microphone("no suitable audio config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            channels = config.channels,
            "audio capture initialized"
        );

        Ok(Self {
            config,
            buffer: Arc::new(Mutex::new(Vec::new())),
            stream: None,
        })
    }

    /// Start capturing audio
    ///
    /// # Errors
    ///
    /// Returns error if the input stream can't be opened
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let buffer = Arc::clone(&self.buffer);
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| Error::Microphone("no input device".to_string()))?;

        let stream = device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    buffer
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .extend_from_slice(data);
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Microphone(e.to_string()))?;

        stream
            .play()
            .map_err(|e| Error::Microphone(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    /// Stop capturing audio and release the device
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }

    /// Get captured audio buffer without clearing
    #[must_use]
    pub fn peek_buffer(&self) -> Vec<f32> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Clear the audio buffer
    pub fn clear_buffer(&self) {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Get the sample rate
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn shared_buffer(&self) -> SampleBuffer {
        Arc::clone(&self.buffer)
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Default input device as a [`Microphone`]
///
/// Each recording runs its cpal stream on a dedicated thread that lives
/// until the recording is finished or dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalMicrophone;

impl CpalMicrophone {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Microphone for CpalMicrophone {
    fn is_available(&self) -> bool {
        cpal::default_host().default_input_device().is_some()
    }

    async fn open(&self) -> Result<Box<dyn Recording>> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let worker = std::thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || {
                let capture = AudioCapture::new().and_then(|mut capture| {
                    capture.start()?;
                    Ok(capture)
                });
                match capture {
                    Ok(capture) => {
                        if ready_tx.send(Ok(capture.shared_buffer())).is_err() {
                            return;
                        }
                        // Runs until the recording sends stop or is dropped
                        let _ = stop_rx.recv();
                        drop(capture);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })?;

        let buffer = ready_rx
            .await
            .map_err(|_| Error::Microphone("capture thread exited".to_string()))??;

        Ok(Box::new(CpalRecording {
            buffer,
            stop: Some(stop_tx),
            worker: Some(worker),
        }))
    }
}

/// An open microphone session on the capture thread
struct CpalRecording {
    buffer: SampleBuffer,
    stop: Option<mpsc::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl CpalRecording {
    fn release(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::warn!("capture thread panicked");
        }
    }
}

impl Recording for CpalRecording {
    fn finish(mut self: Box<Self>) -> Result<RecordedClip> {
        self.release();

        let samples = std::mem::take(&mut *self.buffer.lock().unwrap_or_else(PoisonError::into_inner));
        tracing::debug!(samples = samples.len(), "recording finished");

        Ok(RecordedClip {
            bytes: samples_to_wav(&samples, SAMPLE_RATE)?,
            file_name: "recording.wav".to_string(),
            mime_type: "audio/wav".to_string(),
        })
    }
}

impl Drop for CpalRecording {
    fn drop(&mut self) {
        self.release();
    }
}

/// Convert f32 samples to WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            // Convert f32 [-1.0, 1.0] to i16
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
