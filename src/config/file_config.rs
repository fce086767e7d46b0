use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub data_dir: Option<String>,
    pub blob_dir: Option<String>,
    pub work_dir: Option<String>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub logging_level: Option<String>,
    pub max_upload_size_mb: Option<usize>,
    pub timezone_offset_hours: Option<i32>,
    pub retention_days: Option<u64>,
    pub prune_interval_hours: Option<u64>,
    pub signed_url_base: Option<String>,
    pub blob_signing_secret: Option<String>,

    // Feature configs
    pub analysis: Option<AnalysisConfig>,
    pub worker: Option<WorkerConfig>,
}

/// Tuning knobs for the analysis pipeline, all optional in TOML. The scaling
/// constants are empirically calibrated; they live in config so a recalibration
/// does not require a redeploy.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AnalysisConfig {
    pub min_duration_sec: Option<f64>,
    pub detailed_min_duration_sec: Option<f64>,
    pub silence_amplitude_threshold: Option<f64>,
    pub silence_ratio_threshold: Option<f64>,
    pub target_loudness_dbfs: Option<f64>,
    pub fallback_score: Option<i64>,
    pub degenerate_score_min: Option<i64>,
    pub degenerate_score_max: Option<i64>,
    pub scale_volume: Option<f64>,
    pub scale_voiced: Option<f64>,
    pub scale_zcr: Option<f64>,
    pub scale_pitch: Option<f64>,
    pub tempo_center: Option<f64>,
    pub scale_tempo: Option<f64>,
    pub clamp_floor: Option<i64>,
    pub clamp_ceiling: Option<i64>,
    pub baseline_window_size: Option<usize>,
    pub baseline_deviation_tolerance: Option<f64>,
    pub volume_baseline_smoothing: Option<f64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct WorkerConfig {
    pub poll_interval_secs: Option<u64>,
    pub stale_running_threshold_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
