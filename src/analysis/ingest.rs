//! Upload validation and loudness normalization.
//!
//! Turns an arbitrary uploaded audio blob into a validated, loudness
//! normalized canonical waveform. Pure transformation; the pipeline decides
//! what to do with validation failures.

use crate::analysis::PipelineError;
use crate::audio::{self, Waveform, CANONICAL_SAMPLE_RATE};
use crate::config::AnalysisSettings;
use std::path::Path;

/// Container formats browser and mobile recorders actually produce.
pub const ACCEPTED_EXTENSIONS: [&str; 3] = ["m4a", "webm", "wav"];

pub fn is_accepted_extension(extension: &str) -> bool {
    let lower = extension.to_ascii_lowercase();
    ACCEPTED_EXTENSIONS.contains(&lower.as_str())
}

/// Content type stored alongside raw blobs, keyed by upload extension.
pub fn content_type_for_extension(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "m4a" => "audio/mp4",
        "webm" => "audio/webm",
        "wav" => "audio/wav",
        _ => "application/octet-stream",
    }
}

/// Produce the canonical WAV for an upload. WAV sources copy through
/// unchanged; anything else goes through ffmpeg.
pub async fn to_canonical_wav(
    input: &Path,
    output: &Path,
    extension: &str,
) -> Result<(), PipelineError> {
    if !is_accepted_extension(extension) {
        return Err(PipelineError::UnsupportedFormat(extension.to_string()));
    }
    if extension.eq_ignore_ascii_case("wav") {
        tokio::fs::copy(input, output).await?;
        return Ok(());
    }
    audio::transcode_to_pcm_wav(input, output).await?;
    Ok(())
}

/// Reject recordings that are too short or effectively silent.
pub fn validate_recording(
    waveform: &Waveform,
    settings: &AnalysisSettings,
) -> Result<(), PipelineError> {
    let duration = waveform.duration_sec();
    if duration < settings.min_duration_sec {
        return Err(PipelineError::RecordingTooShort {
            duration_sec: duration,
            min_sec: settings.min_duration_sec,
        });
    }
    let quiet = waveform.quiet_fraction(settings.silence_amplitude_threshold as f32);
    if quiet > settings.silence_ratio_threshold {
        return Err(PipelineError::SilentOrDegenerate);
    }
    Ok(())
}

/// Gain the signal to the target loudness and resample to the canonical rate.
///
/// The gain is capped at the signal's peak headroom so a spiky recording is
/// never pushed into clipping. A signal with no measurable loudness is passed
/// through ungained; the silence validation upstream decides its fate.
pub fn normalize_loudness(waveform: &Waveform, target_dbfs: f64) -> Waveform {
    let samples = if waveform.sample_rate == CANONICAL_SAMPLE_RATE {
        waveform.samples.clone()
    } else {
        audio::resample_linear(&waveform.samples, waveform.sample_rate, CANONICAL_SAMPLE_RATE)
    };
    let mut normalized = Waveform {
        samples,
        sample_rate: CANONICAL_SAMPLE_RATE,
    };
    let current = normalized.dbfs();
    if current.is_finite() {
        let mut gain_db = target_dbfs - current;
        let peak = normalized.peak();
        if peak > 0.0 {
            gain_db = gain_db.min(-20.0 * (peak as f64).log10());
        }
        normalized.apply_gain_db(gain_db);
    }
    normalized
}
