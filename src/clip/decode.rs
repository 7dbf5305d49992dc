//! Clip container decoding (MP3, OGG Vorbis, WAV)

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::{Error, Result};

/// Decode an in-memory clip to mono f32 samples
///
/// `extension` (e.g. "ogg") hints the container format but isn't required.
///
/// # Errors
///
/// Returns error if the container or codec isn't recognised
#[allow(clippy::cast_precision_loss)]
pub fn decode_clip(bytes: &[u8], extension: Option<&str>) -> Result<(Vec<f32>, u32)> {
    let source = Cursor::new(bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(source), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let detected = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| Error::Decode(format!("unrecognised clip container: {e}")))?;

    let mut format = detected.format;
    let track = format
        .default_track()
        .ok_or_else(|| Error::Decode("no default audio track".to_string()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| Error::Decode("unknown sample rate".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| Error::Decode(format!("failed to create decoder: {e}")))?;

    let mut out = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(Error::Decode(format!("clip read error: {e}"))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphError::DecodeError(e)) => {
                tracing::trace!(error = e, "skipping corrupt packet");
                continue;
            }
            Err(e) => return Err(Error::Decode(format!("clip decode error: {e}"))),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        let frames = decoded.capacity() as u64;

        let buf = match sample_buf.as_mut() {
            Some(buf) if buf.capacity() >= decoded.frames() * channels => buf,
            _ => sample_buf.insert(SampleBuffer::<f32>::new(frames, spec)),
        };
        buf.copy_interleaved_ref(decoded);

        let data = buf.samples();
        if channels <= 1 {
            out.extend_from_slice(data);
        } else {
            // Downmix to mono
            out.extend(
                data.chunks_exact(channels)
                    .map(|frame| frame.iter().sum::<f32>() / channels as f32),
            );
        }
    }

    if out.is_empty() {
        return Err(Error::Decode("clip contains no audio".to_string()));
    }

    Ok((out, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::samples_to_wav;

    #[test]
    fn test_decode_wav_clip() {
        let samples: Vec<f32> = (0..800).map(|i| if i % 2 == 0 { 0.25 } else { -0.25 }).collect();
        let wav = samples_to_wav(&samples, 8000).unwrap();

        let (decoded, rate) = decode_clip(&wav, Some("wav")).unwrap();
        assert_eq!(rate, 8000);
        assert_eq!(decoded.len(), samples.len());
        assert!((decoded[0] - 0.25).abs() < 0.01);
    }

    #[test]
    fn test_garbage_is_rejected() {
        let result = decode_clip(b"definitely not audio", None);
        assert!(matches!(result, Err(Error::Decode(_))));
    }
}
