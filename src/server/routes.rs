//! Score API handlers.

use std::time::{Duration, Instant};

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, warn};

use super::session::UserIdentity;
use super::state::*;
use crate::analysis::{self, PipelineError, UploadOutcome, UploadRequest};
use crate::job_queue::JobState;
use crate::server::metrics;

#[derive(Serialize)]
struct ServerStats {
    pub uptime: String,
    pub hash: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

pub async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let stats = ServerStats {
        uptime: format_uptime(state.start_time.elapsed()),
        hash: state.hash.clone(),
    };
    Json(stats)
}

#[derive(Deserialize, Debug)]
pub struct UploadQuery {
    pub overwrite: Option<bool>,
    /// Explicit local day `YYYY-MM-DD`; defaults to today in the display
    /// timezone.
    pub date: Option<String>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Stage the multipart `file` field to disk and return its path and
/// extension.
async fn stage_upload(
    state: &ServerState,
    multipart: &mut Multipart,
) -> Result<(std::path::PathBuf, String), Response> {
    let field = loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("file") => break field,
            Ok(Some(_)) => continue,
            Ok(None) => {
                return Err(error_response(
                    StatusCode::BAD_REQUEST,
                    "missing 'file' field",
                ))
            }
            Err(e) => {
                return Err(error_response(
                    StatusCode::BAD_REQUEST,
                    format!("malformed multipart body: {}", e),
                ))
            }
        }
    };

    let extension = field
        .file_name()
        .and_then(|name| name.rsplit('.').next())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if extension.is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "uploaded file has no extension",
        ));
    }

    let bytes = match field.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            return Err(error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                format!("failed to read upload: {}", e),
            ))
        }
    };

    // Whatever the extension claims, a recognizable non-media payload is
    // rejected outright. Unknown payloads pass; the transcoder decides.
    if let Some(kind) = infer::get(&bytes) {
        let mime = kind.mime_type();
        if !mime.starts_with("audio/") && !mime.starts_with("video/") {
            return Err(error_response(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                format!("payload is {}, not audio", mime),
            ));
        }
    }

    if let Err(e) = tokio::fs::create_dir_all(&state.work_dir).await {
        error!("Failed to create work dir: {}", e);
        return Err(error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal error",
        ));
    }
    let staged = state
        .work_dir
        .join(format!("upload_{}.{}", uuid::Uuid::new_v4(), extension));
    if let Err(e) = tokio::fs::write(&staged, &bytes).await {
        error!("Failed to stage upload: {}", e);
        return Err(error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal error",
        ));
    }

    Ok((staged, extension))
}

pub async fn upload_score(
    identity: UserIdentity,
    State(state): State<ServerState>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> Response {
    let start = Instant::now();

    if let Some(date) = &query.date {
        if chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("invalid date: {:?}", date),
            );
        }
    }

    let (staged, extension) = match stage_upload(&state, &mut multipart).await {
        Ok(staged) => staged,
        Err(response) => {
            metrics::record_upload("rejected", start.elapsed());
            return response;
        }
    };

    let request = UploadRequest {
        user_id: identity.user_id,
        upload_path: staged.clone(),
        extension,
        recorded_at_ms: chrono::Utc::now().timestamp_millis(),
        local_day: query.date,
        overwrite: query.overwrite.unwrap_or(false),
    };

    let result = state.pipeline.process_upload(&request).await;
    let _ = tokio::fs::remove_file(&staged).await;

    match result {
        Ok(UploadOutcome::AlreadyExists { local_day }) => {
            metrics::record_upload("already_exists", start.elapsed());
            (
                StatusCode::CONFLICT,
                Json(json!({ "already": true, "local_day": local_day })),
            )
                .into_response()
        }
        Ok(UploadOutcome::Accepted {
            record_id,
            score,
            is_fallback,
            local_day,
            job_id,
        }) => {
            metrics::record_upload("accepted", start.elapsed());
            Json(json!({
                "success": true,
                "record_id": record_id,
                "score": score,
                "is_fallback": is_fallback,
                "local_day": local_day,
                "job_id": job_id,
            }))
            .into_response()
        }
        Err(PipelineError::UnsupportedFormat(extension)) => {
            metrics::record_upload("rejected", start.elapsed());
            error_response(
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                format!("unsupported format: {}", extension),
            )
        }
        Err(PipelineError::TranscodeFailed(reason)) => {
            metrics::record_upload("rejected", start.elapsed());
            warn!("Transcode failed for user {}: {}", request.user_id, reason);
            error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                "could not decode recording, please re-record",
            )
        }
        Err(e) => {
            metrics::record_upload("error", start.elapsed());
            error!("Upload failed for user {}: {}", request.user_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

pub async fn get_job_status(
    identity: UserIdentity,
    State(job_store): State<GuardedJobStore>,
    State(score_store): State<GuardedScoreStore>,
    Path(id): Path<String>,
) -> Response {
    let job = match job_store.get_job(&id) {
        Ok(Some(job)) => job,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "unknown job"),
        Err(e) => {
            error!("Job lookup failed: {:#}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error");
        }
    };
    if job.user_id != identity.user_id {
        return StatusCode::FORBIDDEN.into_response();
    }

    let score = if job.state == JobState::Done {
        match score_store.get_score(job.record_id) {
            Ok(record) => record.map(|r| r.score),
            Err(e) => {
                error!("Score lookup failed for job {}: {:#}", id, e);
                None
            }
        }
    } else {
        None
    };

    Json(json!({
        "status": job.state,
        "score": score,
        "error": job.error,
    }))
    .into_response()
}

#[derive(Deserialize, Debug)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

const HISTORY_DEFAULT_LIMIT: usize = 30;
const HISTORY_MAX_LIMIT: usize = 100;

pub async fn get_history(
    identity: UserIdentity,
    State(score_store): State<GuardedScoreStore>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let limit = query
        .limit
        .unwrap_or(HISTORY_DEFAULT_LIMIT)
        .min(HISTORY_MAX_LIMIT);
    let offset = query.offset.unwrap_or(0);

    match score_store.list_scores(&identity.user_id, limit, offset) {
        Ok(records) => Json(records).into_response(),
        Err(e) => {
            error!("History lookup failed: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

pub async fn get_profile(
    identity: UserIdentity,
    State(state): State<ServerState>,
) -> Response {
    let window = state.analysis.baseline_window_size;
    let earliest = match state.score_store.earliest_scores(&identity.user_id, window) {
        Ok(earliest) => earliest,
        Err(e) => {
            error!("Profile baseline lookup failed: {:#}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error");
        }
    };
    let baseline = analysis::baseline::score_baseline(&earliest, window);

    let latest = match state.score_store.latest_score(&identity.user_id) {
        Ok(latest) => latest,
        Err(e) => {
            error!("Profile latest lookup failed: {:#}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error");
        }
    };

    let deviation =
        analysis::baseline::deviation(latest.as_ref().map(|r| r.score as f64), baseline);

    Json(json!({
        "baseline": baseline,
        "latest": latest,
        "deviation": deviation,
    }))
    .into_response()
}
