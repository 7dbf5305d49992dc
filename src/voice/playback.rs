//! Audio playback to speakers

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use crate::{Error, Result};

/// Sample rate for playback (matches common TTS output)
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Plays audio to the default output device
#[derive(Debug)]
pub struct AudioPlayback {
    config: StreamConfig,
}

impl AudioPlayback {
    /// Create a new audio playback instance
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                        && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
                })
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self { config })
    }

    /// Rate samples must be at before playing
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        PLAYBACK_SAMPLE_RATE
    }

    /// Play mono samples, blocking until done or `stop` is raised
    ///
    /// # Errors
    ///
    /// Returns error if the output stream can't be opened
    pub fn play_blocking(&self, samples: Arc<[f32]>, stop: &AtomicBool) -> Result<()> {
        if samples.is_empty() || stop.load(Ordering::Relaxed) {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device".to_string()))?;

        let channels = usize::from(self.config.channels);
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            let finished = Arc::clone(&finished);
            device
                .build_output_stream(
                    &self.config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut pos = position.load(Ordering::Relaxed);
                        for frame in data.chunks_mut(channels) {
                            let sample = samples.get(pos).copied().unwrap_or(0.0);
                            frame.fill(sample);
                            if pos < samples.len() {
                                pos += 1;
                            }
                        }
                        position.store(pos, Ordering::Relaxed);
                        if pos >= samples.len() {
                            finished.store(true, Ordering::Relaxed);
                        }
                    },
                    |err| {
                        tracing::error!(error = %err, "audio playback error");
                    },
                    None,
                )
                .map_err(|e| Error::Audio(e.to_string()))?
        };

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        let duration_ms = (samples.len() as u64 * 1000) / u64::from(PLAYBACK_SAMPLE_RATE);
        let start = Instant::now();
        let timeout = Duration::from_millis(duration_ms + 500);

        while !finished.load(Ordering::Relaxed) {
            if stop.load(Ordering::Relaxed) {
                tracing::debug!(
                    played = position.load(Ordering::Relaxed),
                    "playback halted"
                );
                return Ok(());
            }
            if start.elapsed() > timeout {
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }

        // Let the device drain its last buffer
        std::thread::sleep(Duration::from_millis(100));

        drop(stream);
        tracing::debug!(samples = samples.len(), "playback complete");

        Ok(())
    }
}

/// Decode MP3 bytes to mono f32 samples and their sample rate
///
/// # Errors
///
/// Returns error if the data holds no decodable frames
pub fn decode_mp3(mp3_data: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = 0;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate = u32::try_from(frame.sample_rate).unwrap_or(PLAYBACK_SAMPLE_RATE);
                if frame.channels == 2 {
                    // Stereo: average channels
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            // ID3 tags and padding
            Err(minimp3::Error::SkippedData) => {}
            Err(e) => return Err(Error::Decode(format!("MP3 decode error: {e}"))),
        }
    }

    if samples.is_empty() {
        return Err(Error::Decode("no MP3 frames found".to_string()));
    }

    Ok((samples, sample_rate))
}

/// Resample mono audio using rubato
///
/// # Errors
///
/// Returns error if the resampler can't be built for these rates
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let chunk_size = 1024;
    let sub_chunks = 2;

    let mut resampler =
        FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, chunk_size, sub_chunks, 1)
            .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    let frames = resampler.input_frames_next();
    let mut output = Vec::new();
    for chunk in samples.chunks(frames) {
        // Zero-pad the tail so no samples are dropped
        let mut input: Vec<f64> = chunk.iter().map(|&s| f64::from(s)).collect();
        input.resize(frames, 0.0);

        let result = resampler
            .process(&[input], None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        output.extend(result[0].iter().map(|&s| s as f32));
    }

    let expected = (samples.len() as f64 * f64::from(to_rate) / f64::from(from_rate)).round();
    output.truncate(expected as usize);

    Ok(output)
}
