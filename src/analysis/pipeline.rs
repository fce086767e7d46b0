//! Orchestration of the two-pass scoring flow.
//!
//! The light pass runs inside the upload request: validate, normalize, score
//! with cheap proxies, persist with `is_fallback=true`, and enqueue the
//! detailed job. The detailed pass runs later in the worker and overwrites
//! the same record in place, so a user always sees exactly one score per day
//! that silently improves.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{FixedOffset, TimeZone, Utc};
use tracing::{info, warn};

use super::{features, ingest, scoring, PipelineError};
use crate::audio;
use crate::blob_store::BlobStore;
use crate::config::AnalysisSettings;
use crate::job_queue::{AnalysisJob, JobStore};
use crate::score_store::{InsertOutcome, NewScoreRecord, ScoreStore};

/// Reconciliation window around a job's recording timestamp, for when the
/// filename lookup misses.
const RECONCILE_WINDOW_BEFORE_MS: i64 = 5 * 60 * 1000;
const RECONCILE_WINDOW_AFTER_MS: i64 = 60 * 1000;

/// One validated upload, already staged on local disk by the HTTP layer.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub user_id: String,
    /// Where the raw upload bytes were staged.
    pub upload_path: PathBuf,
    /// Extension of the uploaded file, lowercased by the caller or not.
    pub extension: String,
    /// Recording timestamp, UTC epoch milliseconds.
    pub recorded_at_ms: i64,
    /// Explicit local day (`YYYY-MM-DD`); defaults to the recording
    /// timestamp's day under the display offset.
    pub local_day: Option<String>,
    /// Replace an existing same-day record instead of rejecting.
    pub overwrite: bool,
}

/// What the upload request handler reports back to the client.
#[derive(Debug, Clone)]
pub enum UploadOutcome {
    /// A record for this local day already exists and overwrite was not set.
    AlreadyExists { local_day: String },
    Accepted {
        record_id: i64,
        score: i64,
        is_fallback: bool,
        local_day: String,
        /// Present when a detailed job was enqueued for this upload.
        job_id: Option<String>,
    },
}

/// Result of one detailed-analysis job.
#[derive(Debug, Clone)]
pub struct DetailedOutcome {
    pub record_id: i64,
    pub score: i64,
    pub is_fallback: bool,
}

/// Shared orchestrator used by the upload route (light pass) and the worker
/// (detailed pass).
pub struct AnalysisPipeline {
    score_store: Arc<dyn ScoreStore>,
    job_store: Arc<dyn JobStore>,
    blob_store: Arc<dyn BlobStore>,
    work_dir: PathBuf,
    settings: AnalysisSettings,
    timezone_offset_hours: i32,
}

impl AnalysisPipeline {
    pub fn new(
        score_store: Arc<dyn ScoreStore>,
        job_store: Arc<dyn JobStore>,
        blob_store: Arc<dyn BlobStore>,
        work_dir: PathBuf,
        settings: AnalysisSettings,
        timezone_offset_hours: i32,
    ) -> Self {
        Self {
            score_store,
            job_store,
            blob_store,
            work_dir,
            settings,
            timezone_offset_hours,
        }
    }

    /// The synchronous light pass. Always leaves the user with a score when
    /// it returns `Accepted`: clips that cannot be analyzed get the
    /// configured fallback score instead of an error.
    pub async fn process_upload(
        &self,
        request: &UploadRequest,
    ) -> Result<UploadOutcome, PipelineError> {
        let extension = request.extension.to_ascii_lowercase();
        if !ingest::is_accepted_extension(&extension) {
            return Err(PipelineError::UnsupportedFormat(extension));
        }

        let local_day = request
            .local_day
            .clone()
            .unwrap_or_else(|| local_day(request.recorded_at_ms, self.timezone_offset_hours));
        let stored_stem = stored_stem(
            &request.user_id,
            request.recorded_at_ms,
            self.timezone_offset_hours,
        );
        let stored_filename = format!("{}.wav", stored_stem);

        // Short-circuit before any audio work when the day is already taken.
        if !request.overwrite
            && self
                .score_store
                .find_by_day(&request.user_id, &local_day)?
                .is_some()
        {
            return Ok(UploadOutcome::AlreadyExists { local_day });
        }

        // Keep the original bytes around for reprocessing. Best effort: a raw
        // archive failure must not cost the user their daily score.
        let raw_key = format!("raw/{}/{}.{}", request.user_id, stored_stem, extension);
        if let Err(e) = self
            .blob_store
            .put(
                &request.upload_path,
                &raw_key,
                ingest::content_type_for_extension(&extension),
            )
            .await
        {
            warn!("Raw blob archive failed for {}: {}", raw_key, e);
        }

        tokio::fs::create_dir_all(&self.work_dir).await?;
        let canonical_path = self
            .work_dir
            .join(format!("{}.canonical.wav", uuid::Uuid::new_v4()));
        ingest::to_canonical_wav(&request.upload_path, &canonical_path, &extension).await?;

        // WAV uploads copy through untouched, so an unparseable container
        // surfaces here. One repair attempt through ffmpeg before giving up.
        let waveform = match audio::read_wav(&canonical_path) {
            Ok(waveform) => waveform,
            Err(e) if extension == "wav" => {
                warn!(
                    "Uploaded WAV not directly readable ({}), re-transcoding: user={}",
                    e, request.user_id
                );
                audio::transcode_to_pcm_wav(&request.upload_path, &canonical_path).await?;
                audio::read_wav(&canonical_path)?
            }
            Err(e) => return Err(e.into()),
        };
        let duration_sec = waveform.duration_sec();

        let (score, is_fallback, volume_std, eligible_for_detailed) =
            match ingest::validate_recording(&waveform, &self.settings) {
                Ok(()) => {
                    let normalized =
                        ingest::normalize_loudness(&waveform, self.settings.target_loudness_dbfs);
                    let features = features::extract_light(&normalized);
                    let recent = self.recent_rms_reference(&request.user_id)?;
                    let outcome = scoring::score_light(&features, recent);
                    (
                        outcome.score,
                        outcome.is_fallback,
                        Some(features.volume_std),
                        duration_sec >= self.settings.detailed_min_duration_sec,
                    )
                }
                Err(PipelineError::RecordingTooShort { duration_sec, .. }) => {
                    info!(
                        "Recording too short ({:.2}s), assigning fallback score: user={}",
                        duration_sec, request.user_id
                    );
                    (self.settings.fallback_score, true, None, false)
                }
                Err(PipelineError::SilentOrDegenerate) => {
                    info!(
                        "Recording silent or degenerate, assigning fallback score: user={}",
                        request.user_id
                    );
                    (self.settings.fallback_score, true, None, false)
                }
                Err(e) => return Err(e),
            };

        // The normalized canonical WAV is what the detailed pass re-reads.
        let normalized_key = format!("normalized/{}/{}", request.user_id, stored_filename);
        let mut normalized_stored = false;
        if eligible_for_detailed || volume_std.is_some() {
            let normalized =
                ingest::normalize_loudness(&waveform, self.settings.target_loudness_dbfs);
            let normalized_path = self.work_dir.join(&stored_filename);
            audio::write_wav(&normalized_path, &normalized)?;
            match self
                .blob_store
                .put(&normalized_path, &normalized_key, "audio/wav")
                .await
            {
                Ok(()) => normalized_stored = true,
                Err(e) => warn!("Normalized blob store failed for {}: {}", normalized_key, e),
            }
            let _ = tokio::fs::remove_file(&normalized_path).await;
        }
        let _ = tokio::fs::remove_file(&canonical_path).await;

        let record = NewScoreRecord {
            user_id: request.user_id.clone(),
            score,
            is_fallback,
            filename: stored_filename.clone(),
            recorded_at: request.recorded_at_ms,
            local_day: local_day.clone(),
            volume_std,
        };
        let record_id = match self.score_store.insert_score(&record, request.overwrite)? {
            InsertOutcome::Inserted(id) => id,
            InsertOutcome::AlreadyExists => {
                return Ok(UploadOutcome::AlreadyExists { local_day });
            }
        };

        if let Some(sample) = volume_std {
            self.smooth_volume_baseline(&request.user_id, sample)?;
        }

        let job_id = if eligible_for_detailed && normalized_stored {
            let job = AnalysisJob::new(
                request.user_id.clone(),
                record_id,
                normalized_key,
                stored_filename,
                request.recorded_at_ms,
            );
            match self.job_store.enqueue(&job) {
                Ok(()) => Some(job.id),
                Err(e) => {
                    // The provisional score stands; only the refinement is lost.
                    warn!("Failed to enqueue detailed job for record {}: {:#}", record_id, e);
                    None
                }
            }
        } else {
            None
        };

        Ok(UploadOutcome::Accepted {
            record_id,
            score,
            is_fallback,
            local_day,
            job_id,
        })
    }

    /// The asynchronous detailed pass, called by the worker for one job.
    pub async fn run_detailed(&self, job: &AnalysisJob) -> Result<DetailedOutcome, PipelineError> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let local_path = self
            .work_dir
            .join(format!("{}.detailed.wav", uuid::Uuid::new_v4()));
        self.blob_store.get(&job.blob_key, &local_path).await?;

        let waveform = audio::read_wav(&local_path)?;
        let _ = tokio::fs::remove_file(&local_path).await;

        // Framed analysis is pure CPU; keep it off the async runtime.
        let features = tokio::task::spawn_blocking(move || features::extract_detailed(&waveform))
            .await
            .map_err(|e| PipelineError::AnalysisFailure(e.to_string()))?;

        let record = self.reconcile(job)?;

        let earliest = self
            .score_store
            .earliest_scores(&job.user_id, self.settings.baseline_window_size)?;
        let score_baseline =
            super::baseline::score_baseline(&earliest, self.settings.baseline_window_size);
        let volume_baseline = self.score_store.get_volume_baseline(&job.user_id)?;

        let outcome =
            scoring::score_detailed(&features, score_baseline, volume_baseline, &self.settings);

        let updated = self.score_store.apply_detailed_result(
            record.id,
            outcome.score,
            outcome.is_fallback,
            Some(features.volume_std),
            features.voiced_ratio,
            features.zcr,
            Some(features.pitch_std),
            Some(features.tempo),
        )?;
        if !updated {
            return Err(PipelineError::RecordNotFoundForReconciliation {
                user_id: job.user_id.clone(),
                filename: job.filename.clone(),
            });
        }

        self.smooth_volume_baseline(&job.user_id, features.volume_std)?;

        Ok(DetailedOutcome {
            record_id: record.id,
            score: outcome.score,
            is_fallback: outcome.is_fallback,
        })
    }

    /// Find the record a detailed job should overwrite. Filename first; a
    /// time window around the recording as the fallback (the record may have
    /// been overwritten with a new filename in between).
    fn reconcile(
        &self,
        job: &AnalysisJob,
    ) -> Result<crate::score_store::ScoreRecord, PipelineError> {
        if let Some(record) = self
            .score_store
            .find_by_filename(&job.user_id, &job.filename)?
        {
            return Ok(record);
        }
        if let Some(record) = self.score_store.find_in_window(
            &job.user_id,
            job.recorded_at - RECONCILE_WINDOW_BEFORE_MS,
            job.recorded_at + RECONCILE_WINDOW_AFTER_MS,
        )? {
            info!(
                "Reconciled job {} by time window to record {}",
                job.id, record.id
            );
            return Ok(record);
        }

        self.score_store.record_audit(
            &job.user_id,
            "reconciliation_miss",
            Some(&format!(
                r#"{{"job_id":"{}","filename":"{}"}}"#,
                job.id, job.filename
            )),
        )?;
        Err(PipelineError::RecordNotFoundForReconciliation {
            user_id: job.user_id.clone(),
            filename: job.filename.clone(),
        })
    }

    /// Mean of the user's recent stored volume readings, the light path's
    /// relative-volume reference.
    fn recent_rms_reference(&self, user_id: &str) -> Result<Option<f64>, PipelineError> {
        let recent = self
            .score_store
            .recent_volume_stds(user_id, self.settings.baseline_window_size)?;
        if recent.is_empty() {
            return Ok(None);
        }
        Ok(Some(recent.iter().sum::<f64>() / recent.len() as f64))
    }

    fn smooth_volume_baseline(&self, user_id: &str, sample: f64) -> Result<(), PipelineError> {
        let previous = self.score_store.get_volume_baseline(user_id)?;
        let updated = super::baseline::update_volume_baseline(
            previous,
            sample,
            self.settings.volume_baseline_smoothing,
        );
        self.score_store.set_volume_baseline(user_id, updated)?;
        Ok(())
    }
}

/// Calendar day of a UTC timestamp under the configured fixed display offset.
pub fn local_day(recorded_at_ms: i64, offset_hours: i32) -> String {
    let offset = FixedOffset::east_opt(offset_hours * 3600)
        .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap());
    match offset.timestamp_millis_opt(recorded_at_ms) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d").to_string(),
        _ => Utc
            .timestamp_millis_opt(recorded_at_ms)
            .unwrap()
            .format("%Y-%m-%d")
            .to_string(),
    }
}

/// Deterministic stem for stored artifacts of one recording.
fn stored_stem(user_id: &str, recorded_at_ms: i64, offset_hours: i32) -> String {
    let offset = FixedOffset::east_opt(offset_hours * 3600)
        .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap());
    let stamp = match offset.timestamp_millis_opt(recorded_at_ms) {
        chrono::LocalResult::Single(dt) => dt.format("%Y%m%d%H%M%S").to_string(),
        _ => recorded_at_ms.to_string(),
    };
    format!("{}_{}", user_id, stamp)
}
