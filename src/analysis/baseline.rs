//! Per-user baseline arithmetic.
//!
//! The score baseline is anchored to a user's earliest recordings so the
//! "better/worse than your normal" display keeps a fixed reference point for
//! the lifetime of the account. The volume baseline is a smoothed running
//! reference used only by the score calculator's guard.

/// Mean of the earliest `window` scores, rounded to one decimal.
///
/// `earliest_scores` must already be ordered by recording time ascending.
/// Returns None when the user has no recordings at all; fewer than `window`
/// recordings average over what exists.
pub fn score_baseline(earliest_scores: &[i64], window: usize) -> Option<f64> {
    if earliest_scores.is_empty() || window == 0 {
        return None;
    }
    let taken = &earliest_scores[..earliest_scores.len().min(window)];
    let mean = taken.iter().sum::<i64>() as f64 / taken.len() as f64;
    Some(round_one_decimal(mean))
}

/// Exponentially smoothed volume reference. The first sample becomes the
/// baseline as-is.
pub fn update_volume_baseline(previous: Option<f64>, sample: f64, smoothing: f64) -> f64 {
    match previous {
        Some(prev) => smoothing * prev + (1.0 - smoothing) * sample,
        None => sample,
    }
}

/// `score - baseline`, rounded to one decimal. Null-safe on both sides.
pub fn deviation(score: Option<f64>, baseline: Option<f64>) -> Option<f64> {
    match (score, baseline) {
        (Some(score), Some(baseline)) => Some(round_one_decimal(score - baseline)),
        _ => None,
    }
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
