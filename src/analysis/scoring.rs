//! Score calculation from feature vectors.
//!
//! The light and detailed paths use different scaling constants because their
//! descriptors live on different numeric scales: the light proxies are cheap
//! stand-ins calibrated against chunked, resampled audio, while the detailed
//! descriptors come from proper framed analysis. The detailed constants live
//! in [`AnalysisSettings`] so they can be recalibrated without a deploy; the
//! light constants are fixed alongside the proxy definitions they calibrate.

use crate::analysis::features::FeatureVector;
use crate::config::AnalysisSettings;
use rand::Rng;

// Light-path constants, calibrated against the chunked proxies.
const LIGHT_SCALE_VOLUME: f64 = 300.0;
const LIGHT_SCALE_PITCH: f64 = 150.0;
const LIGHT_SCALE_TEMPO: f64 = 200.0;
const LIGHT_WEIGHT_VOLUME: f64 = 0.3;
const LIGHT_WEIGHT_PITCH: f64 = 0.4;
const LIGHT_WEIGHT_TEMPO: f64 = 0.3;
const LIGHT_CLAMP_FLOOR: f64 = 20.0;
const LIGHT_CLAMP_CEILING: f64 = 95.0;

// Detailed-path component weights.
const WEIGHT_VOLUME: f64 = 0.25;
const WEIGHT_VOICED: f64 = 0.20;
const WEIGHT_ZCR: f64 = 0.20;
const WEIGHT_PITCH: f64 = 0.20;
const WEIGHT_TEMPO: f64 = 0.15;

// A recording is too flat to score reliably when all three expressiveness
// descriptors sit below these floors at once.
const DEGENERATE_VOLUME_STD: f64 = 0.005;
const DEGENERATE_PITCH_STD: f64 = 1.0;
const DEGENERATE_TEMPO: f64 = 0.1;

/// Result of scoring one feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreOutcome {
    pub score: i64,
    /// True whenever any guard or degraded path fired, so consumers can tell
    /// a confident measurement from a placeholder.
    pub is_fallback: bool,
}

/// Provisional score from the light proxies.
///
/// The volume component blends an absolute level with a level relative to the
/// user's recent recordings (`recent_rms`, mean of the last few raw volume
/// readings), so both a generally quiet voice and a quieter-than-usual day
/// register. Light scores are always provisional.
pub fn score_light(features: &FeatureVector, recent_rms: Option<f64>) -> ScoreOutcome {
    let raw_rms = features.volume_std;

    let abs_score = if raw_rms > 0.0 {
        (raw_rms * LIGHT_SCALE_VOLUME).clamp(0.0, 100.0)
    } else {
        50.0
    };
    let rel_score = match recent_rms {
        Some(reference) if raw_rms > 0.0 && reference > 0.0 => {
            let rel = (raw_rms - reference) / reference;
            (1.0 + rel).clamp(0.5, 1.5) * 50.0
        }
        _ => 50.0,
    };
    let vol_score = 0.5 * abs_score + 0.5 * rel_score;

    let pitch_score = features.pitch_std * LIGHT_SCALE_PITCH;
    let tempo_score = features.tempo * LIGHT_SCALE_TEMPO;

    let raw = LIGHT_WEIGHT_VOLUME * vol_score
        + LIGHT_WEIGHT_PITCH * pitch_score
        + LIGHT_WEIGHT_TEMPO * tempo_score;
    let score = raw.clamp(LIGHT_CLAMP_FLOOR, LIGHT_CLAMP_CEILING) as i64;

    ScoreOutcome {
        score,
        is_fallback: true,
    }
}

/// Authoritative score from the detailed descriptors.
///
/// Each descriptor is scaled into a 0..100 component, the components are
/// combined with fixed weights, and the sum is clamped. When the user has a
/// score baseline, the result may not drift further than the configured
/// tolerance from it; a recording much quieter than the user's volume
/// baseline gets its deviation halved first, since low-level recordings make
/// the other descriptors unreliable.
pub fn score_detailed(
    features: &FeatureVector,
    score_baseline: Option<f64>,
    volume_baseline: Option<f64>,
    settings: &AnalysisSettings,
) -> ScoreOutcome {
    if features.degraded {
        return ScoreOutcome {
            score: settings.fallback_score,
            is_fallback: true,
        };
    }

    if features.volume_std < DEGENERATE_VOLUME_STD
        && features.pitch_std < DEGENERATE_PITCH_STD
        && features.tempo < DEGENERATE_TEMPO
    {
        let score = rand::rng()
            .random_range(settings.degenerate_score_min..=settings.degenerate_score_max);
        return ScoreOutcome {
            score,
            is_fallback: true,
        };
    }

    let clip = |v: f64| v.clamp(0.0, 100.0);
    let volume_c = clip(features.volume_std * settings.scale_volume);
    let voiced_c = clip(features.voiced_ratio.unwrap_or(0.0) * settings.scale_voiced);
    let zcr_c = clip(features.zcr.unwrap_or(0.0) * settings.scale_zcr);
    let pitch_c = clip(features.pitch_std * settings.scale_pitch);
    let tempo_c = clip(100.0 - (features.tempo - settings.tempo_center).abs() * settings.scale_tempo);

    let weighted = WEIGHT_VOLUME * volume_c
        + WEIGHT_VOICED * voiced_c
        + WEIGHT_ZCR * zcr_c
        + WEIGHT_PITCH * pitch_c
        + WEIGHT_TEMPO * tempo_c;

    let floor = settings.clamp_floor as f64;
    let ceiling = settings.clamp_ceiling as f64;
    let mut score = weighted.clamp(floor, ceiling);

    if let Some(baseline) = score_baseline {
        let mut deviation = score - baseline;
        if let Some(volume_baseline) = volume_baseline {
            if volume_baseline > 0.0 && features.volume_std < 0.5 * volume_baseline {
                deviation /= 2.0;
            }
        }
        let tolerance = settings.baseline_deviation_tolerance;
        score = baseline + deviation.clamp(-tolerance, tolerance);
        score = score.clamp(floor, ceiling);
    }

    ScoreOutcome {
        score: score.round() as i64,
        is_fallback: false,
    }
}
