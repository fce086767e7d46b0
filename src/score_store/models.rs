//! Score record models.

use serde::Serialize;

/// One persisted score: at most one authoritative record per user per local
/// calendar day. Created by the light path with `is_fallback=true`, then
/// overwritten in place by the detailed worker.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreRecord {
    pub id: i64,
    pub user_id: String,
    pub score: i64,
    /// True while the score is a provisional or degraded estimate.
    pub is_fallback: bool,
    /// Deterministic stored filename of the normalized recording.
    pub filename: String,
    /// Recording timestamp, UTC epoch milliseconds.
    pub recorded_at: i64,
    /// `YYYY-MM-DD` under the configured display timezone. The uniqueness
    /// invariant is keyed on this, not on UTC midnight.
    pub local_day: String,
    // Feature columns captured at detailed-analysis time.
    pub volume_std: Option<f64>,
    pub voiced_ratio: Option<f64>,
    pub zcr: Option<f64>,
    pub pitch_std: Option<f64>,
    pub tempo_val: Option<f64>,
    pub created_at: i64,
}

/// Fields the light path supplies when creating a record.
#[derive(Debug, Clone)]
pub struct NewScoreRecord {
    pub user_id: String,
    pub score: i64,
    pub is_fallback: bool,
    pub filename: String,
    pub recorded_at: i64,
    pub local_day: String,
    pub volume_std: Option<f64>,
}
