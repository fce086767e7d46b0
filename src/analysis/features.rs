//! Acoustic feature extraction.
//!
//! Two extractors produce the same [`FeatureVector`] shape. The light variant
//! runs inside the upload request and works from cheap per-chunk proxies; the
//! detailed variant runs on the worker and uses framed signal processing
//! (energy split, framed ZCR, autocorrelation pitch, spectral-flux onsets).

use crate::audio::{resample_linear, Waveform};
use rustfft::{num_complex::Complex, FftPlanner};
use tracing::warn;

/// Frame length in samples for the framed detailed descriptors.
pub const FRAME_LENGTH: usize = 2048;
/// Hop between successive frames, in samples.
pub const HOP_LENGTH: usize = 512;

/// Light-path chunks are resampled to this rate before computing proxies.
const LIGHT_TARGET_RATE: u32 = 16_000;

/// Frames quieter than the loudest frame by more than this many dB count as
/// silence when computing the voiced ratio.
const SPLIT_TOP_DB: f64 = 30.0;

/// Pitch search band for adult speech, in Hz.
const PITCH_MIN_HZ: f64 = 70.0;
const PITCH_MAX_HZ: f64 = 400.0;
/// Normalized autocorrelation peak below which a frame is treated as
/// unpitched and contributes no pitch estimate.
const PITCH_MIN_CLARITY: f64 = 0.3;

/// The scalar descriptors consumed by the score calculator.
///
/// The light and detailed paths fill the same fields with values on different
/// numeric scales; the calculator applies per-path scaling constants.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    /// Amplitude standard deviation over the analyzed signal.
    pub volume_std: f64,
    /// Fraction of the recording spent above the silence-split threshold.
    /// Not computed by the light path.
    pub voiced_ratio: Option<f64>,
    /// Mean framed zero-crossing rate. Not computed by the light path.
    pub zcr: Option<f64>,
    /// Detailed: standard deviation of per-frame pitch estimates, in Hz.
    /// Light: mean absolute sign-change rate, a coarse pitch-activity proxy.
    pub pitch_std: f64,
    /// Detailed: onsets per second over the onset span.
    /// Light: fraction of samples above an adaptive amplitude threshold.
    pub tempo: f64,
    /// True when extraction fell back to energy-only descriptors.
    pub degraded: bool,
}

/// Cheap per-chunk proxies, computed synchronously during upload.
///
/// The signal is walked in one-second chunks so peak memory stays bounded no
/// matter how long the clip is, each chunk resampled to a fixed rate so the
/// proxies are comparable across source sample rates.
pub fn extract_light(waveform: &Waveform) -> FeatureVector {
    let chunk_len = waveform.sample_rate.max(1) as usize;
    let mut pitch_sum = 0.0;
    let mut tempo_sum = 0.0;
    let mut chunks = 0usize;

    for chunk in waveform.samples.chunks(chunk_len) {
        let resampled;
        let chunk: &[f32] = if waveform.sample_rate != LIGHT_TARGET_RATE {
            resampled = resample_linear(chunk, waveform.sample_rate, LIGHT_TARGET_RATE);
            &resampled
        } else {
            chunk
        };
        pitch_sum += sign_change_rate(chunk);
        tempo_sum += active_fraction(chunk);
        chunks += 1;
    }

    let (pitch_std, tempo) = if chunks > 0 {
        (pitch_sum / chunks as f64, tempo_sum / chunks as f64)
    } else {
        (0.0, 0.0)
    };

    FeatureVector {
        volume_std: waveform.amplitude_std(),
        voiced_ratio: None,
        zcr: None,
        pitch_std,
        tempo,
        degraded: false,
    }
}

/// Full framed analysis, run by the background worker.
pub fn extract_detailed(waveform: &Waveform) -> FeatureVector {
    if waveform.sample_rate == 0 || waveform.samples.len() < FRAME_LENGTH {
        warn!(
            "signal too short for framed analysis ({} samples), returning energy-only features",
            waveform.samples.len()
        );
        return degraded_features(waveform);
    }

    let samples = &waveform.samples;

    FeatureVector {
        volume_std: waveform.amplitude_std(),
        voiced_ratio: Some(voiced_ratio(samples)),
        zcr: Some(framed_zcr(samples)),
        pitch_std: pitch_std_autocorr(samples, waveform.sample_rate),
        tempo: onset_tempo(samples, waveform.sample_rate),
        degraded: false,
    }
}

/// Minimal descriptor set derived from raw energy alone.
fn degraded_features(waveform: &Waveform) -> FeatureVector {
    FeatureVector {
        volume_std: waveform.amplitude_std(),
        voiced_ratio: None,
        zcr: None,
        pitch_std: 0.0,
        tempo: 0.0,
        degraded: true,
    }
}

/// Mean absolute difference of successive sample signs, in [0, 2].
fn sign_change_rate(samples: &[f32]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let mut total = 0.0;
    for pair in samples.windows(2) {
        total += (signum(pair[1]) - signum(pair[0])).abs();
    }
    total / (samples.len() - 1) as f64
}

fn signum(x: f32) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Fraction of samples whose magnitude exceeds 2% of the chunk peak.
fn active_fraction(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let peak = samples.iter().fold(0.0_f32, |acc, &s| acc.max(s.abs()));
    let threshold = peak * 0.02;
    let active = samples.iter().filter(|s| s.abs() > threshold).count();
    active as f64 / samples.len() as f64
}

/// RMS energy per frame.
fn frame_rms(samples: &[f32]) -> Vec<f64> {
    let mut out = Vec::new();
    let mut start = 0;
    while start < samples.len() {
        let end = (start + FRAME_LENGTH).min(samples.len());
        let frame = &samples[start..end];
        let sum_sq: f64 = frame.iter().map(|&s| s as f64 * s as f64).sum();
        out.push((sum_sq / frame.len() as f64).sqrt());
        start += HOP_LENGTH;
    }
    out
}

/// Fraction of frames within `SPLIT_TOP_DB` of the loudest frame.
///
/// This is a frame-granularity version of interval splitting: summing voiced
/// interval durations and dividing by total duration collapses to counting
/// voiced frames when intervals are built from fixed-hop frames.
fn voiced_ratio(samples: &[f32]) -> f64 {
    let energies = frame_rms(samples);
    if energies.is_empty() {
        return 0.0;
    }
    let to_db = |rms: f64| {
        if rms <= 0.0 {
            f64::NEG_INFINITY
        } else {
            20.0 * rms.log10()
        }
    };
    let max_db = energies.iter().map(|&e| to_db(e)).fold(f64::NEG_INFINITY, f64::max);
    if max_db == f64::NEG_INFINITY {
        return 0.0;
    }
    let threshold_db = max_db - SPLIT_TOP_DB;
    let voiced = energies.iter().filter(|&&e| to_db(e) > threshold_db).count();
    voiced as f64 / energies.len() as f64
}

/// Mean per-frame zero-crossing rate.
fn framed_zcr(samples: &[f32]) -> f64 {
    let mut rates = Vec::new();
    let mut start = 0;
    while start < samples.len() {
        let end = (start + FRAME_LENGTH).min(samples.len());
        let frame = &samples[start..end];
        if frame.len() >= 2 {
            let crossings = frame
                .windows(2)
                .filter(|pair| (pair[0] < 0.0) != (pair[1] < 0.0))
                .count();
            rates.push(crossings as f64 / frame.len() as f64);
        }
        start += HOP_LENGTH;
    }
    if rates.is_empty() {
        return 0.0;
    }
    rates.iter().sum::<f64>() / rates.len() as f64
}

/// Standard deviation of per-frame autocorrelation pitch estimates, in Hz.
///
/// Only frames louder than the median frame magnitude are tracked, which
/// keeps breath noise and room tone out of the estimate. A frame contributes
/// a pitch only when its best normalized autocorrelation peak within the
/// speech band is clear enough.
fn pitch_std_autocorr(samples: &[f32], sample_rate: u32) -> f64 {
    let min_lag = (sample_rate as f64 / PITCH_MAX_HZ).floor() as usize;
    let max_lag = (sample_rate as f64 / PITCH_MIN_HZ).ceil() as usize;
    if min_lag == 0 || max_lag + 1 >= FRAME_LENGTH {
        return 0.0;
    }

    let mut frames: Vec<&[f32]> = Vec::new();
    let mut start = 0;
    while start + FRAME_LENGTH <= samples.len() {
        frames.push(&samples[start..start + FRAME_LENGTH]);
        start += HOP_LENGTH;
    }
    if frames.is_empty() {
        return 0.0;
    }

    let magnitudes: Vec<f64> = frames
        .iter()
        .map(|frame| {
            let sum_sq: f64 = frame.iter().map(|&s| s as f64 * s as f64).sum();
            (sum_sq / frame.len() as f64).sqrt()
        })
        .collect();
    let median = median_of(&magnitudes);

    let mut pitches = Vec::new();
    for (frame, &magnitude) in frames.iter().zip(&magnitudes) {
        if magnitude <= median {
            continue;
        }
        let energy: f64 = frame.iter().map(|&s| s as f64 * s as f64).sum();
        if energy <= 0.0 {
            continue;
        }
        let mut best_lag = 0;
        let mut best = 0.0;
        for lag in min_lag..=max_lag {
            let mut r = 0.0;
            for i in 0..frame.len() - lag {
                r += frame[i] as f64 * frame[i + lag] as f64;
            }
            let normalized = r / energy;
            if normalized > best {
                best = normalized;
                best_lag = lag;
            }
        }
        if best >= PITCH_MIN_CLARITY && best_lag > 0 {
            pitches.push(sample_rate as f64 / best_lag as f64);
        }
    }

    if pitches.len() < 2 {
        return 0.0;
    }
    std_of(&pitches)
}

/// Onsets per second over the detected onset span.
///
/// Onsets are local maxima of the half-wave rectified spectral flux that rise
/// above mean + one standard deviation of the flux curve. Returns 0.0 when
/// fewer than two onsets are found.
fn onset_tempo(samples: &[f32], sample_rate: u32) -> f64 {
    let fft = FftPlanner::<f32>::new().plan_fft_forward(FRAME_LENGTH);
    let hann = build_hann_window(FRAME_LENGTH);
    let bins = FRAME_LENGTH / 2 + 1;

    let mut buf = vec![Complex::new(0.0_f32, 0.0); FRAME_LENGTH];
    let mut prev_mag: Option<Vec<f32>> = None;
    let mut flux = Vec::new();

    let mut start = 0;
    while start + FRAME_LENGTH <= samples.len() {
        for (i, v) in buf.iter_mut().enumerate() {
            *v = Complex::new(samples[start + i] * hann[i], 0.0);
        }
        fft.process(&mut buf);
        let mag: Vec<f32> = buf[..bins].iter().map(|c| c.norm()).collect();

        if let Some(prev) = &prev_mag {
            let rectified: f64 = mag
                .iter()
                .zip(prev)
                .map(|(&m, &p)| (m - p).max(0.0) as f64)
                .sum();
            flux.push(rectified);
        }
        prev_mag = Some(mag);
        start += HOP_LENGTH;
    }

    if flux.len() < 3 {
        return 0.0;
    }

    let mean = flux.iter().sum::<f64>() / flux.len() as f64;
    let std = std_of(&flux);
    let threshold = mean + std;

    let mut onsets = Vec::new();
    for i in 1..flux.len() - 1 {
        if flux[i] > threshold && flux[i] >= flux[i - 1] && flux[i] > flux[i + 1] {
            onsets.push(i);
        }
    }

    if onsets.len() < 2 {
        return 0.0;
    }
    let frame_dt = HOP_LENGTH as f64 / sample_rate as f64;
    let span = (onsets[onsets.len() - 1] - onsets[0]) as f64 * frame_dt;
    if span <= 0.0 {
        return 0.0;
    }
    onsets.len() as f64 / span
}

fn build_hann_window(n: usize) -> Vec<f32> {
    use std::f32::consts::PI;
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / n as f32).cos()))
        .collect()
}

fn median_of(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn std_of(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    var.sqrt()
}
