use axum::extract::FromRef;

use crate::analysis::AnalysisPipeline;
use crate::blob_store::BlobStore;
use crate::config::AnalysisSettings;
use crate::job_queue::JobStore;
use crate::score_store::ScoreStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedScoreStore = Arc<dyn ScoreStore>;
pub type GuardedJobStore = Arc<dyn JobStore>;
pub type GuardedBlobStore = Arc<dyn BlobStore>;
pub type GuardedPipeline = Arc<AnalysisPipeline>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub score_store: GuardedScoreStore,
    pub job_store: GuardedJobStore,
    pub blob_store: GuardedBlobStore,
    pub pipeline: GuardedPipeline,
    pub analysis: AnalysisSettings,
    /// Scratch directory where multipart uploads are staged.
    pub work_dir: PathBuf,
    pub hash: String,
}

impl FromRef<ServerState> for GuardedScoreStore {
    fn from_ref(input: &ServerState) -> Self {
        input.score_store.clone()
    }
}

impl FromRef<ServerState> for GuardedJobStore {
    fn from_ref(input: &ServerState) -> Self {
        input.job_store.clone()
    }
}

impl FromRef<ServerState> for GuardedBlobStore {
    fn from_ref(input: &ServerState) -> Self {
        input.blob_store.clone()
    }
}

impl FromRef<ServerState> for GuardedPipeline {
    fn from_ref(input: &ServerState) -> Self {
        input.pipeline.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
