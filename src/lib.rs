//! Koekarte Score Server Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod analysis;
pub mod audio;
pub mod blob_store;
pub mod config;
pub mod job_queue;
pub mod score_store;
pub mod server;

// Re-export commonly used types for convenience
pub use analysis::{AnalysisPipeline, UploadOutcome, UploadRequest};
pub use blob_store::{BlobStore, FsBlobStore};
pub use config::{AnalysisSettings, AppConfig, WorkerSettings};
pub use job_queue::{AnalysisWorker, JobState, JobStore, SqliteJobStore};
pub use score_store::{ScoreRecord, ScoreStore, SqliteScoreStore};
pub use server::{make_app, run_server, RequestsLoggingLevel, ServerConfig};
