//! Background worker that drains the analysis job queue.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::models::AnalysisJob;
use super::store::JobStore;
use crate::analysis::AnalysisPipeline;
use crate::server::metrics;

/// Polls the job store for pending detailed-analysis jobs and runs them one
/// at a time. Detailed analysis is CPU and ffmpeg bound, so a single lane
/// keeps the load predictable.
pub struct AnalysisWorker {
    job_store: Arc<dyn JobStore>,
    pipeline: Arc<AnalysisPipeline>,
    poll_interval: Duration,
    stale_running_threshold_secs: i64,
}

impl AnalysisWorker {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        pipeline: Arc<AnalysisPipeline>,
        poll_interval_secs: u64,
        stale_running_threshold_secs: i64,
    ) -> Self {
        Self {
            job_store,
            pipeline,
            poll_interval: Duration::from_secs(poll_interval_secs),
            stale_running_threshold_secs,
        }
    }

    /// Main worker loop - call from a spawned task.
    ///
    /// On startup, jobs stuck in running from a previous process are failed
    /// so the queue never wedges on a crash.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            "Analysis worker starting (poll_interval={}s)",
            self.poll_interval.as_secs()
        );

        match self
            .job_store
            .mark_stale_running_failed(self.stale_running_threshold_secs)
        {
            Ok(0) => {}
            Ok(n) => warn!("Failed {} stale running jobs from a previous run", n),
            Err(e) => error!("Stale job rescue failed: {:#}", e),
        }

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let claimed = match self.job_store.claim_next_pending() {
                Ok(claimed) => claimed,
                Err(e) => {
                    error!("Failed to claim next job: {:#}", e);
                    None
                }
            };

            if let Ok(pending) = self.job_store.count_pending() {
                metrics::set_jobs_pending(pending);
            }

            match claimed {
                Some(job) => self.process_job(job).await,
                None => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.poll_interval) => {}
                        _ = shutdown.cancelled() => break,
                    }
                }
            }
        }

        info!("Analysis worker stopped");
    }

    async fn process_job(&self, job: AnalysisJob) {
        let started = Instant::now();

        match self.pipeline.run_detailed(&job).await {
            Ok(outcome) => {
                if let Err(e) = self.job_store.complete(&job.id) {
                    error!("Failed to mark job {} done: {:#}", job.id, e);
                }
                metrics::record_detailed_job("done");
                info!(
                    "Detailed analysis done: job={} user={} record={} score={}",
                    job.id, job.user_id, outcome.record_id, outcome.score
                );
            }
            Err(e) => {
                let message = format!("{:#}", e);
                if let Err(store_err) = self.job_store.fail(&job.id, &message) {
                    error!("Failed to mark job {} failed: {:#}", job.id, store_err);
                }
                metrics::record_detailed_job("failed");
                warn!(
                    "Detailed analysis failed: job={} user={}: {}",
                    job.id, job.user_id, message
                );
            }
        }

        metrics::observe_detailed_job_duration(started.elapsed().as_secs_f64());
    }
}
