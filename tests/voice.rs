//! Audio helper tests
//!
//! Exercises encoding, decoding and resampling without audio hardware

use std::io::Cursor;

use dex_voice::Error;
use dex_voice::clip::decode_clip;
use dex_voice::voice::{PLAYBACK_SAMPLE_RATE, SAMPLE_RATE, decode_mp3, resample, samples_to_wav};

/// Generate sine wave audio samples
fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

#[test]
fn test_samples_to_wav() {
    let samples = generate_sine_samples(440.0, 0.1, 0.5);
    let wav_data = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

    // Check WAV header magic
    assert_eq!(&wav_data[0..4], b"RIFF");
    assert_eq!(&wav_data[8..12], b"WAVE");

    // 16-bit mono after the 44 byte header
    assert_eq!(wav_data.len(), 44 + samples.len() * 2);
}

#[test]
fn test_wav_roundtrip() {
    let original_samples: Vec<f32> = vec![0.0, 0.5, -0.5, 1.0, -1.0, 0.25];
    let wav_data = samples_to_wav(&original_samples, SAMPLE_RATE).unwrap();

    let cursor = Cursor::new(wav_data);
    let mut reader = hound::WavReader::new(cursor).unwrap();

    let spec = reader.spec();
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(spec.channels, 1);

    let read_samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(read_samples.len(), original_samples.len());
    assert_eq!(read_samples[3], 32767);
}

#[test]
fn test_out_of_range_samples_are_clamped() {
    let wav_data = samples_to_wav(&[2.0, -2.0], SAMPLE_RATE).unwrap();
    let mut reader = hound::WavReader::new(Cursor::new(wav_data)).unwrap();

    let read_samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(read_samples, vec![32767, -32768]);
}

#[test]
fn test_recording_decodes_as_clip() {
    let samples = generate_sine_samples(440.0, 0.25, 0.5);
    let wav_data = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

    let (decoded, rate) = decode_clip(&wav_data, Some("wav")).unwrap();

    assert_eq!(rate, SAMPLE_RATE);
    assert_eq!(decoded.len(), samples.len());
    assert!(decoded.iter().all(|s| s.abs() <= 0.51));
}

#[test]
fn test_clip_decodes_without_hint() {
    let wav_data = samples_to_wav(&generate_sine_samples(220.0, 0.1, 0.3), SAMPLE_RATE).unwrap();

    let (decoded, rate) = decode_clip(&wav_data, None).unwrap();

    assert_eq!(rate, SAMPLE_RATE);
    assert!(!decoded.is_empty());
}

#[test]
fn test_truncated_clip_is_rejected() {
    assert!(matches!(decode_clip(b"RIFF", Some("wav")), Err(Error::Decode(_))));
    assert!(matches!(decode_clip(&[], None), Err(Error::Decode(_))));
}

#[test]
fn test_recording_upsamples_for_playback() {
    let samples = generate_sine_samples(440.0, 0.5, 0.5);

    let resampled = resample(&samples, SAMPLE_RATE, PLAYBACK_SAMPLE_RATE).unwrap();

    // 0.5s at 24kHz, less whatever the final partial chunk drops
    assert!(resampled.len() <= 12000);
    assert!(resampled.len() > 10000);
    assert!(resampled.iter().all(|s| s.is_finite()));
}

#[test]
fn test_resample_empty_input() {
    assert!(resample(&[], SAMPLE_RATE, PLAYBACK_SAMPLE_RATE).unwrap().is_empty());
}

#[test]
fn test_mp3_rejects_non_audio() {
    assert!(decode_mp3(b"<html>rate limited</html>").is_err());
}
