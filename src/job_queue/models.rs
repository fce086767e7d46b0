//! Job queue models.

use serde::Serialize;

/// Lifecycle state of a detailed-analysis job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobState {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Done => "done",
            JobState::Failed => "failed",
        }
    }

    pub fn from_db_str(s: &str) -> JobState {
        match s {
            "pending" => JobState::Pending,
            "running" => JobState::Running,
            "done" => JobState::Done,
            _ => JobState::Failed,
        }
    }
}

/// One queued detailed analysis of a normalized recording.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisJob {
    pub id: String,
    pub user_id: String,
    /// Score record the light path created, the reconciliation fast path.
    pub record_id: i64,
    /// Blob key of the normalized recording to analyze.
    pub blob_key: String,
    /// Stored filename, used for reconciliation when the record moved.
    pub filename: String,
    /// Recording timestamp of the clip, UTC epoch milliseconds.
    pub recorded_at: i64,
    pub state: JobState,
    pub attempts: i64,
    pub error: Option<String>,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
}

impl AnalysisJob {
    pub fn new(
        user_id: String,
        record_id: i64,
        blob_key: String,
        filename: String,
        recorded_at: i64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            record_id,
            blob_key,
            filename,
            recorded_at,
            state: JobState::Pending,
            attempts: 0,
            error: None,
            created_at: chrono::Utc::now().timestamp_millis(),
            started_at: None,
            finished_at: None,
        }
    }
}
