use anyhow::Result;
use std::{path::PathBuf, sync::Arc, time::Instant};

use tracing::info;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};

use super::{log_requests, metrics, routes, state::*, ServerConfig};
use crate::analysis::AnalysisPipeline;
use crate::blob_store::BlobStore;
use crate::config::AnalysisSettings;
use crate::job_queue::JobStore;
use crate::score_store::ScoreStore;

impl ServerState {
    #[allow(clippy::too_many_arguments)]
    fn new(
        config: ServerConfig,
        score_store: Arc<dyn ScoreStore>,
        job_store: Arc<dyn JobStore>,
        blob_store: Arc<dyn BlobStore>,
        pipeline: Arc<AnalysisPipeline>,
        analysis: AnalysisSettings,
        work_dir: PathBuf,
    ) -> ServerState {
        ServerState {
            config,
            start_time: Instant::now(),
            score_store,
            job_store,
            blob_store,
            pipeline,
            analysis,
            work_dir,
            hash: format!("{}-{}", env!("CARGO_PKG_VERSION"), env!("GIT_HASH")),
        }
    }
}

#[allow(clippy::too_many_arguments)]
pub fn make_app(
    config: ServerConfig,
    score_store: Arc<dyn ScoreStore>,
    job_store: Arc<dyn JobStore>,
    blob_store: Arc<dyn BlobStore>,
    pipeline: Arc<AnalysisPipeline>,
    analysis: AnalysisSettings,
    work_dir: PathBuf,
) -> Router {
    let max_upload_bytes = config.max_upload_size_mb * 1024 * 1024;
    let state = ServerState::new(
        config,
        score_store,
        job_store,
        blob_store,
        pipeline,
        analysis,
        work_dir,
    );

    let score_routes: Router = Router::new()
        .route(
            "/upload",
            post(routes::upload_score).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/job/{id}", get(routes::get_job_status))
        .route("/history", get(routes::get_history))
        .route("/profile", get(routes::get_profile))
        .with_state(state.clone());

    let home_router: Router = Router::new()
        .route("/", get(routes::home))
        .with_state(state.clone());

    home_router
        .nest("/v1/score", score_routes)
        .layer(middleware::from_fn_with_state(state, log_requests))
}

/// Serve the API on `config.port` and the Prometheus endpoint on
/// `config.metrics_port`, until either listener fails.
#[allow(clippy::too_many_arguments)]
pub async fn run_server(
    config: ServerConfig,
    score_store: Arc<dyn ScoreStore>,
    job_store: Arc<dyn JobStore>,
    blob_store: Arc<dyn BlobStore>,
    pipeline: Arc<AnalysisPipeline>,
    analysis: AnalysisSettings,
    work_dir: PathBuf,
) -> Result<()> {
    metrics::init_metrics();

    let port = config.port;
    let metrics_port = config.metrics_port;
    let app = make_app(
        config,
        score_store,
        job_store,
        blob_store,
        pipeline,
        analysis,
        work_dir,
    );

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    info!("Listening on port {}", port);

    let metrics_app: Router = Router::new().route("/metrics", get(metrics::metrics_handler));
    let metrics_listener =
        tokio::net::TcpListener::bind(format!("127.0.0.1:{}", metrics_port)).await?;
    info!("Metrics listening on port {}", metrics_port);

    tokio::select! {
        result = axum::serve(listener, app) => result?,
        result = axum::serve(metrics_listener, metrics_app) => result?,
    }
    Ok(())
}
