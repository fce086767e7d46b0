//! The voice-to-score analysis pipeline.
//!
//! `ingest` validates and normalizes uploads, `features` extracts acoustic
//! descriptors, `scoring` maps descriptors to a bounded score, `baseline`
//! tracks a user's personal normal, and `pipeline` orchestrates the
//! synchronous light pass and the asynchronous detailed pass.

pub mod baseline;
pub mod features;
pub mod ingest;
pub mod pipeline;
pub mod scoring;

pub use features::{extract_detailed, extract_light, FeatureVector};
pub use pipeline::{AnalysisPipeline, DetailedOutcome, UploadOutcome, UploadRequest};
pub use scoring::{score_detailed, score_light, ScoreOutcome};

use crate::audio::{TranscodeError, WaveError};
use crate::blob_store::BlobStoreError;
use thiserror::Error;

/// Everything that can go wrong between receiving an upload and writing a
/// score. Failures local to one upload are converted to a structured response
/// at the orchestration boundary; worker failures only surface through the
/// job state and logs.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Uploaded extension not in the accepted set. User-visible, no retry.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Decode or encode step failed. User-visible ("please re-record").
    #[error("transcode failed: {0}")]
    TranscodeFailed(String),

    /// Decoded duration below the configured minimum.
    #[error("recording too short: {duration_sec:.2}s < {min_sec:.2}s")]
    RecordingTooShort { duration_sec: f64, min_sec: f64 },

    /// Signal present but judged unusable. The orchestrator converts this to
    /// a flagged fallback score rather than an error response.
    #[error("recording is silent or degenerate")]
    SilentOrDegenerate,

    /// Durable blob store put/get failed. Logged; best-effort durability.
    #[error("storage failure: {0}")]
    StorageFailure(#[from] BlobStoreError),

    /// Job submission failed. Logged; the upload still succeeds.
    #[error("enqueue failure: {0}")]
    EnqueueFailure(String),

    /// Detailed extraction or persistence failed inside the worker.
    #[error("analysis failure: {0}")]
    AnalysisFailure(String),

    /// The worker could not find the score record it was meant to overwrite.
    #[error("no score record to reconcile for user {user_id} file {filename}")]
    RecordNotFoundForReconciliation { user_id: String, filename: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TranscodeError> for PipelineError {
    fn from(e: TranscodeError) -> Self {
        PipelineError::TranscodeFailed(e.to_string())
    }
}

impl From<WaveError> for PipelineError {
    fn from(e: WaveError) -> Self {
        PipelineError::TranscodeFailed(e.to_string())
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(e: anyhow::Error) -> Self {
        PipelineError::AnalysisFailure(format!("{:#}", e))
    }
}
