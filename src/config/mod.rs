mod file_config;

pub use file_config::{AnalysisConfig, FileConfig, WorkerConfig};

use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub data_dir: Option<PathBuf>,
    pub blob_dir: Option<PathBuf>,
    pub work_dir: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub max_upload_size_mb: usize,
    pub timezone_offset_hours: i32,
    pub retention_days: u64,
    pub prune_interval_hours: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub data_dir: PathBuf,
    pub blob_dir: PathBuf,
    pub work_dir: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub max_upload_size_mb: usize,
    pub timezone_offset_hours: i32,
    pub retention_days: u64,
    pub prune_interval_hours: u64,
    pub signed_url_base: String,
    pub blob_signing_secret: String,

    // Feature configs (with defaults)
    pub analysis: AnalysisSettings,
    pub worker: WorkerSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        // TOML overrides CLI for each field
        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .or_else(|| cli.data_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("data_dir must be specified on the command line or in config file")
            })?;

        // Validate data_dir exists
        if !data_dir.exists() {
            bail!("Data directory does not exist: {:?}", data_dir);
        }
        if !data_dir.is_dir() {
            bail!("data_dir is not a directory: {:?}", data_dir);
        }

        let blob_dir = file
            .blob_dir
            .map(PathBuf::from)
            .or_else(|| cli.blob_dir.clone())
            .unwrap_or_else(|| data_dir.join("blobs"));

        let work_dir = file
            .work_dir
            .map(PathBuf::from)
            .or_else(|| cli.work_dir.clone())
            .unwrap_or_else(|| data_dir.join("work"));

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let max_upload_size_mb = file.max_upload_size_mb.unwrap_or(cli.max_upload_size_mb);

        let timezone_offset_hours = file
            .timezone_offset_hours
            .unwrap_or(cli.timezone_offset_hours);
        if !(-23..=23).contains(&timezone_offset_hours) {
            bail!(
                "timezone_offset_hours out of range: {}",
                timezone_offset_hours
            );
        }

        let retention_days = file.retention_days.unwrap_or(cli.retention_days);
        let prune_interval_hours = file.prune_interval_hours.unwrap_or(cli.prune_interval_hours);

        let signed_url_base = file
            .signed_url_base
            .unwrap_or_else(|| format!("http://localhost:{}/blobs", port));
        let blob_signing_secret = file
            .blob_signing_secret
            .unwrap_or_else(|| "koekarte-dev-secret".to_string());

        // Analysis settings - merge file config with defaults
        let a = file.analysis.unwrap_or_default();
        let analysis = AnalysisSettings {
            min_duration_sec: a.min_duration_sec.unwrap_or(1.5),
            detailed_min_duration_sec: a.detailed_min_duration_sec.unwrap_or(5.0),
            silence_amplitude_threshold: a.silence_amplitude_threshold.unwrap_or(0.01),
            silence_ratio_threshold: a.silence_ratio_threshold.unwrap_or(0.97),
            target_loudness_dbfs: a.target_loudness_dbfs.unwrap_or(-3.0),
            fallback_score: a.fallback_score.unwrap_or(50),
            degenerate_score_min: a.degenerate_score_min.unwrap_or(35),
            degenerate_score_max: a.degenerate_score_max.unwrap_or(45),
            scale_volume: a.scale_volume.unwrap_or(800.0),
            scale_voiced: a.scale_voiced.unwrap_or(100.0),
            scale_zcr: a.scale_zcr.unwrap_or(600.0),
            scale_pitch: a.scale_pitch.unwrap_or(0.25),
            tempo_center: a.tempo_center.unwrap_or(3.0),
            scale_tempo: a.scale_tempo.unwrap_or(20.0),
            clamp_floor: a.clamp_floor.unwrap_or(20),
            clamp_ceiling: a.clamp_ceiling.unwrap_or(97),
            baseline_window_size: a.baseline_window_size.unwrap_or(5),
            baseline_deviation_tolerance: a.baseline_deviation_tolerance.unwrap_or(30.0),
            volume_baseline_smoothing: a.volume_baseline_smoothing.unwrap_or(0.8),
        };

        let w = file.worker.unwrap_or_default();
        let worker = WorkerSettings {
            poll_interval_secs: w.poll_interval_secs.unwrap_or(2),
            stale_running_threshold_secs: w.stale_running_threshold_secs.unwrap_or(600),
        };

        Ok(Self {
            data_dir,
            blob_dir,
            work_dir,
            port,
            metrics_port,
            logging_level,
            max_upload_size_mb,
            timezone_offset_hours,
            retention_days,
            prune_interval_hours,
            signed_url_base,
            blob_signing_secret,
            analysis,
            worker,
        })
    }

    pub fn scores_db_path(&self) -> PathBuf {
        self.data_dir.join("scores.db")
    }

    pub fn jobs_db_path(&self) -> PathBuf {
        self.data_dir.join("jobs.db")
    }
}

/// Thresholds, scaling constants, and clamps used by ingestion validation and
/// the score calculator. Calibrated for the detailed path; the light path's
/// proxy constants live next to the light scorer.
#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    /// Recordings shorter than this are never analyzed (fallback score).
    pub min_duration_sec: f64,
    /// Recordings shorter than this skip the detailed path entirely.
    pub detailed_min_duration_sec: f64,
    /// Sample magnitude below which a sample counts as quiet.
    pub silence_amplitude_threshold: f64,
    /// Quiet fraction above which the whole recording counts as silent.
    pub silence_ratio_threshold: f64,
    /// Loudness normalization target.
    pub target_loudness_dbfs: f64,
    /// Score assigned to recordings that cannot be analyzed.
    pub fallback_score: i64,
    pub degenerate_score_min: i64,
    pub degenerate_score_max: i64,
    pub scale_volume: f64,
    pub scale_voiced: f64,
    pub scale_zcr: f64,
    pub scale_pitch: f64,
    /// Tempo that maps to a full 100 component score.
    pub tempo_center: f64,
    /// Penalty per onset-per-second of distance from `tempo_center`.
    pub scale_tempo: f64,
    pub clamp_floor: i64,
    pub clamp_ceiling: i64,
    /// Number of earliest scores averaged into the user baseline.
    pub baseline_window_size: usize,
    /// Detailed scores may not drift further than this from the baseline.
    pub baseline_deviation_tolerance: f64,
    /// Weight given to the previous value when smoothing the volume baseline.
    pub volume_baseline_smoothing: f64,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            min_duration_sec: 1.5,
            detailed_min_duration_sec: 5.0,
            silence_amplitude_threshold: 0.01,
            silence_ratio_threshold: 0.97,
            target_loudness_dbfs: -3.0,
            fallback_score: 50,
            degenerate_score_min: 35,
            degenerate_score_max: 45,
            scale_volume: 800.0,
            scale_voiced: 100.0,
            scale_zcr: 600.0,
            scale_pitch: 0.25,
            tempo_center: 3.0,
            scale_tempo: 20.0,
            clamp_floor: 20,
            clamp_ceiling: 97,
            baseline_window_size: 5,
            baseline_deviation_tolerance: 30.0,
            volume_baseline_smoothing: 0.8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub poll_interval_secs: u64,
    pub stale_running_threshold_secs: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 2,
            stale_running_threshold_secs: 600,
        }
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_temp_data_dir() -> TempDir {
        TempDir::new().unwrap()
    }

    #[test]
    fn test_parse_logging_level() {
        assert!(matches!(
            parse_logging_level("none"),
            Some(RequestsLoggingLevel::None)
        ));
        assert!(matches!(
            parse_logging_level("path"),
            Some(RequestsLoggingLevel::Path)
        ));
        assert!(matches!(
            parse_logging_level("headers"),
            Some(RequestsLoggingLevel::Headers)
        ));
        assert!(matches!(
            parse_logging_level("body"),
            Some(RequestsLoggingLevel::Body)
        ));
        // Case insensitive
        assert!(matches!(
            parse_logging_level("PATH"),
            Some(RequestsLoggingLevel::Path)
        ));
        // Invalid
        assert!(parse_logging_level("invalid").is_none());
    }

    #[test]
    fn test_resolve_cli_only() {
        let temp_dir = make_temp_data_dir();
        let cli = CliConfig {
            data_dir: Some(temp_dir.path().to_path_buf()),
            blob_dir: Some(PathBuf::from("/blobs")),
            work_dir: Some(PathBuf::from("/work")),
            port: 3001,
            metrics_port: 9091,
            logging_level: RequestsLoggingLevel::Headers,
            max_upload_size_mb: 25,
            timezone_offset_hours: 9,
            retention_days: 60,
            prune_interval_hours: 12,
        };

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.data_dir, temp_dir.path());
        assert_eq!(config.blob_dir, PathBuf::from("/blobs"));
        assert_eq!(config.work_dir, PathBuf::from("/work"));
        assert_eq!(config.port, 3001);
        assert_eq!(config.metrics_port, 9091);
        assert_eq!(config.logging_level, RequestsLoggingLevel::Headers);
        assert_eq!(config.max_upload_size_mb, 25);
        assert_eq!(config.timezone_offset_hours, 9);
        assert_eq!(config.retention_days, 60);
        assert_eq!(config.prune_interval_hours, 12);
        assert_eq!(config.analysis.baseline_window_size, 5);
        assert_eq!(config.worker.poll_interval_secs, 2);
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let temp_dir = make_temp_data_dir();
        let cli = CliConfig {
            data_dir: Some(PathBuf::from("/should/be/overridden")),
            blob_dir: Some(PathBuf::from("/cli/blobs")),
            port: 3001,
            metrics_port: 9091,
            logging_level: RequestsLoggingLevel::Path,
            max_upload_size_mb: 25,
            ..Default::default()
        };

        let file_config = FileConfig {
            data_dir: Some(temp_dir.path().to_string_lossy().to_string()),
            blob_dir: Some("/toml/blobs".to_string()),
            port: Some(4000),
            logging_level: Some("body".to_string()),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        // TOML values should override CLI
        assert_eq!(config.data_dir, temp_dir.path());
        assert_eq!(config.blob_dir, PathBuf::from("/toml/blobs"));
        assert_eq!(config.port, 4000);
        assert_eq!(config.logging_level, RequestsLoggingLevel::Body);
        // CLI value used when TOML doesn't specify
        assert_eq!(config.metrics_port, 9091);
        assert_eq!(config.max_upload_size_mb, 25);
    }

    #[test]
    fn test_resolve_analysis_section_overrides_defaults() {
        let temp_dir = make_temp_data_dir();
        let cli = CliConfig {
            data_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };

        let file_config = FileConfig {
            analysis: Some(AnalysisConfig {
                min_duration_sec: Some(2.0),
                clamp_ceiling: Some(95),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        assert_eq!(config.analysis.min_duration_sec, 2.0);
        assert_eq!(config.analysis.clamp_ceiling, 95);
        // Untouched fields keep their defaults
        assert_eq!(config.analysis.silence_ratio_threshold, 0.97);
        assert_eq!(config.analysis.scale_volume, 800.0);
    }

    #[test]
    fn test_resolve_missing_data_dir_error() {
        let cli = CliConfig::default();
        let result = AppConfig::resolve(&cli, None);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("data_dir must be specified"));
    }

    #[test]
    fn test_resolve_nonexistent_data_dir_error() {
        let cli = CliConfig {
            data_dir: Some(PathBuf::from("/nonexistent/path/that/should/not/exist")),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("does not exist"));
    }

    #[test]
    fn test_resolve_data_dir_not_directory_error() {
        // Create a temporary file (not a directory)
        let temp_file = tempfile::NamedTempFile::new().unwrap();
        let cli = CliConfig {
            data_dir: Some(temp_file.path().to_path_buf()),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not a directory"));
    }

    #[test]
    fn test_resolve_timezone_out_of_range_error() {
        let temp_dir = make_temp_data_dir();
        let cli = CliConfig {
            data_dir: Some(temp_dir.path().to_path_buf()),
            timezone_offset_hours: 36,
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("out of range"));
    }

    #[test]
    fn test_resolve_blob_and_work_dirs_default_under_data_dir() {
        let temp_dir = make_temp_data_dir();
        let cli = CliConfig {
            data_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, None).unwrap();
        assert_eq!(config.blob_dir, temp_dir.path().join("blobs"));
        assert_eq!(config.work_dir, temp_dir.path().join("work"));
    }

    #[test]
    fn test_db_path_helpers() {
        let temp_dir = make_temp_data_dir();
        let cli = CliConfig {
            data_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.scores_db_path(), temp_dir.path().join("scores.db"));
        assert_eq!(config.jobs_db_path(), temp_dir.path().join("jobs.db"));
    }
}
