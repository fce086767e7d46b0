//! In-memory audio fixtures for end-to-end tests
//!
//! Recordings are synthesized with hound so the suite needs no checked-in
//! media files and no ffmpeg (canonical WAV uploads copy straight through
//! transcoding).

use hound::{SampleFormat, WavSpec, WavWriter};
use tempfile::NamedTempFile;

const SAMPLE_RATE: u32 = 16_000;

fn wav_bytes(samples: &[f32]) -> Vec<u8> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let file = NamedTempFile::new().expect("Failed to create temp wav file");
    let mut writer = WavWriter::create(file.path(), spec).expect("Failed to create wav writer");
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        writer
            .write_sample((clamped * i16::MAX as f32) as i16)
            .expect("Failed to write wav sample");
    }
    writer.finalize().expect("Failed to finalize wav");

    std::fs::read(file.path()).expect("Failed to read wav bytes")
}

/// A modulated multi-tone clip that passes the silence and degeneracy guards,
/// long enough for detailed analysis when `duration_sec >= 5.0`.
pub fn speech_wav_bytes(duration_sec: f64) -> Vec<u8> {
    let n = (duration_sec * SAMPLE_RATE as f64) as usize;
    let samples: Vec<f32> = (0..n)
        .map(|i| {
            let t = i as f64 / SAMPLE_RATE as f64;
            let envelope = 0.4 + 0.3 * (2.0 * std::f64::consts::PI * 2.5 * t).sin();
            let carrier =
                (2.0 * std::f64::consts::PI * (180.0 + 40.0 * (t * 1.3).sin()) * t).sin();
            (envelope * carrier * 0.5) as f32
        })
        .collect();
    wav_bytes(&samples)
}

/// Below the minimum duration threshold, takes the fallback path.
pub fn short_wav_bytes() -> Vec<u8> {
    speech_wav_bytes(0.5)
}

/// All zeros, takes the fallback path via the silence guard.
#[allow(dead_code)]
pub fn silent_wav_bytes(duration_sec: f64) -> Vec<u8> {
    let n = (duration_sec * SAMPLE_RATE as f64) as usize;
    wav_bytes(&vec![0.0f32; n])
}

/// A PNG header, recognized as a non-media payload and rejected upfront.
#[allow(dead_code)]
pub fn png_bytes() -> Vec<u8> {
    let mut bytes = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend_from_slice(&[0u8; 64]);
    bytes
}
