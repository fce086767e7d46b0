//! Test server lifecycle management
//!
//! This module manages spawning and shutting down test HTTP servers.
//! Each test gets an isolated server with its own databases, blob directory
//! and a live background analysis worker.

use super::constants::*;
use koekarte_server::analysis::AnalysisPipeline;
use koekarte_server::blob_store::{BlobStore, FsBlobStore};
use koekarte_server::config::AnalysisSettings;
use koekarte_server::job_queue::{AnalysisWorker, JobStore, SqliteJobStore};
use koekarte_server::score_store::{ScoreStore, SqliteScoreStore};
use koekarte_server::server::{make_app, RequestsLoggingLevel, ServerConfig};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Test server instance with isolated storage and a running analysis worker
///
/// When dropped, the server and worker shut down and temp resources are
/// cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// Score store for direct database access in tests
    pub score_store: Arc<dyn ScoreStore>,

    /// Job store for direct database access in tests
    pub job_store: Arc<dyn JobStore>,

    // Private fields - keep resources alive until drop
    _temp_dir: TempDir,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    worker_shutdown: CancellationToken,
}

impl TestServer {
    /// Spawns a new test server on a random port
    ///
    /// This function:
    /// 1. Creates temporary databases, blob and work directories
    /// 2. Starts the analysis worker with a 1s poll interval
    /// 3. Binds to a random port (127.0.0.1:0)
    /// 4. Spawns the server in a background task
    /// 5. Waits for the server to be ready
    ///
    /// # Panics
    ///
    /// Panics if storage setup fails, the port cannot be bound, or the
    /// server doesn't become ready within timeout.
    pub async fn spawn() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let work_dir = temp_dir.path().join("work");
        std::fs::create_dir_all(&work_dir).expect("Failed to create work dir");

        let score_store: Arc<dyn ScoreStore> = Arc::new(
            SqliteScoreStore::open(&temp_dir.path().join("scores.db"))
                .expect("Failed to open score store"),
        );
        let job_store: Arc<dyn JobStore> = Arc::new(
            SqliteJobStore::open(&temp_dir.path().join("jobs.db"))
                .expect("Failed to open job store"),
        );
        let blob_store: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(
            temp_dir.path().join("blobs"),
            "http://localhost/blobs",
            "test-secret",
        ));

        let analysis = AnalysisSettings::default();
        let pipeline = Arc::new(AnalysisPipeline::new(
            score_store.clone(),
            job_store.clone(),
            blob_store.clone(),
            work_dir.clone(),
            analysis.clone(),
            9,
        ));

        // Run the detailed-analysis worker just like production does
        let worker_shutdown = CancellationToken::new();
        let worker = AnalysisWorker::new(job_store.clone(), pipeline.clone(), 1, 600);
        {
            let shutdown = worker_shutdown.clone();
            tokio::spawn(async move { worker.run(shutdown).await });
        }

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let config = ServerConfig {
            requests_logging_level: RequestsLoggingLevel::None,
            port,
            metrics_port: 0,
            max_upload_size_mb: 25,
        };

        let app = make_app(
            config,
            score_store.clone(),
            job_store.clone(),
            blob_store,
            pipeline,
            analysis,
            work_dir,
        );

        // Spawn server in background task with graceful shutdown
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            score_store,
            job_store,
            _temp_dir: temp_dir,
            _shutdown_tx: Some(shutdown_tx),
            worker_shutdown,
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to become ready by polling the health endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => {
                    return;
                }
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.worker_shutdown.cancel();
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
        // TempDir is cleaned up automatically
    }
}
