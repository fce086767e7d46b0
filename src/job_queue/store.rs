//! SQLite store for the analysis job queue.

use super::models::{AnalysisJob, JobState};
use super::schema::{JOBS_SCHEMA_SQL, JOBS_SCHEMA_VERSION};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Trait for job queue storage operations.
pub trait JobStore: Send + Sync {
    /// Add a new job in pending state.
    fn enqueue(&self, job: &AnalysisJob) -> Result<()>;

    /// Get a job by id.
    fn get_job(&self, id: &str) -> Result<Option<AnalysisJob>>;

    /// Atomically claim the oldest pending job (pending → running),
    /// incrementing its attempt count.
    fn claim_next_pending(&self) -> Result<Option<AnalysisJob>>;

    /// Mark a running job done.
    fn complete(&self, id: &str) -> Result<()>;

    /// Mark a job failed with an error message.
    fn fail(&self, id: &str, error: &str) -> Result<()>;

    /// Fail every job stuck in running longer than the threshold. Run at
    /// startup so a crash mid-analysis never wedges the queue. Returns the
    /// number of jobs rescued.
    fn mark_stale_running_failed(&self, stale_threshold_secs: i64) -> Result<usize>;

    /// Jobs for a user, newest first.
    fn list_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<AnalysisJob>>;

    /// Number of jobs currently pending.
    fn count_pending(&self) -> Result<usize>;
}

/// SQLite implementation of JobStore.
pub struct SqliteJobStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteJobStore {
    /// Open or create a jobs database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open jobs database: {:?}", path))?;
        conn.execute_batch(JOBS_SCHEMA_SQL)?;
        conn.execute(&format!("PRAGMA user_version = {}", JOBS_SCHEMA_VERSION), [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(JOBS_SCHEMA_SQL)?;
        conn.execute(&format!("PRAGMA user_version = {}", JOBS_SCHEMA_VERSION), [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<AnalysisJob> {
        Ok(AnalysisJob {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            record_id: row.get("record_id")?,
            blob_key: row.get("blob_key")?,
            filename: row.get("filename")?,
            recorded_at: row.get("recorded_at")?,
            state: JobState::from_db_str(&row.get::<_, String>("state")?),
            attempts: row.get("attempts")?,
            error: row.get("error")?,
            created_at: row.get("created_at")?,
            started_at: row.get("started_at")?,
            finished_at: row.get("finished_at")?,
        })
    }
}

impl JobStore for SqliteJobStore {
    fn enqueue(&self, job: &AnalysisJob) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO analysis_jobs (
                id, user_id, record_id, blob_key, filename, recorded_at,
                state, attempts, error, created_at, started_at, finished_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                job.id,
                job.user_id,
                job.record_id,
                job.blob_key,
                job.filename,
                job.recorded_at,
                job.state.as_db_str(),
                job.attempts,
                job.error,
                job.created_at,
                job.started_at,
                job.finished_at,
            ],
        )?;
        Ok(())
    }

    fn get_job(&self, id: &str) -> Result<Option<AnalysisJob>> {
        let conn = self.conn.lock().unwrap();
        let job = conn
            .query_row(
                "SELECT * FROM analysis_jobs WHERE id = ?1",
                params![id],
                Self::row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    fn claim_next_pending(&self) -> Result<Option<AnalysisJob>> {
        // Single lock covers the select and the update, so two workers can
        // never claim the same job.
        let conn = self.conn.lock().unwrap();
        let id: Option<String> = conn
            .query_row(
                "SELECT id FROM analysis_jobs WHERE state = 'pending'
                 ORDER BY created_at ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let Some(id) = id else {
            return Ok(None);
        };

        conn.execute(
            "UPDATE analysis_jobs SET
                 state = 'running',
                 attempts = attempts + 1,
                 started_at = ?2
             WHERE id = ?1 AND state = 'pending'",
            params![id, chrono::Utc::now().timestamp_millis()],
        )?;

        let job = conn
            .query_row(
                "SELECT * FROM analysis_jobs WHERE id = ?1",
                params![id],
                Self::row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    fn complete(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE analysis_jobs SET state = 'done', error = NULL, finished_at = ?2
             WHERE id = ?1 AND state = 'running'",
            params![id, chrono::Utc::now().timestamp_millis()],
        )?;
        if changed == 0 {
            warn!("Tried to complete job {} which is not running", id);
        }
        Ok(())
    }

    fn fail(&self, id: &str, error: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE analysis_jobs SET state = 'failed', error = ?2, finished_at = ?3
             WHERE id = ?1",
            params![id, error, chrono::Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }

    fn mark_stale_running_failed(&self, stale_threshold_secs: i64) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let now = chrono::Utc::now().timestamp_millis();
        let cutoff = now - stale_threshold_secs * 1000;
        let changed = conn.execute(
            "UPDATE analysis_jobs SET
                 state = 'failed',
                 error = 'Interrupted by server restart',
                 finished_at = ?2
             WHERE state = 'running' AND started_at <= ?1",
            params![cutoff, now],
        )?;
        Ok(changed)
    }

    fn list_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<AnalysisJob>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM analysis_jobs WHERE user_id = ?1
             ORDER BY created_at DESC LIMIT ?2",
        )?;
        let jobs = stmt
            .query_map(params![user_id, limit as i64], Self::row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    fn count_pending(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM analysis_jobs WHERE state = 'pending'",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_job(user_id: &str, record_id: i64) -> AnalysisJob {
        AnalysisJob::new(
            user_id.to_string(),
            record_id,
            format!("normalized/{}/clip_{}.wav", user_id, record_id),
            format!("{}_clip_{}.wav", user_id, record_id),
            1_700_000_000_000,
        )
    }

    #[test]
    fn test_enqueue_and_get() {
        let store = SqliteJobStore::in_memory().unwrap();
        let job = new_job("user1", 1);
        store.enqueue(&job).unwrap();

        let fetched = store.get_job(&job.id).unwrap().unwrap();
        assert_eq!(fetched.user_id, "user1");
        assert_eq!(fetched.record_id, 1);
        assert_eq!(fetched.state, JobState::Pending);
        assert_eq!(fetched.attempts, 0);
    }

    #[test]
    fn test_claim_oldest_first() {
        let store = SqliteJobStore::in_memory().unwrap();
        let mut first = new_job("user1", 1);
        first.created_at = 1000;
        let mut second = new_job("user1", 2);
        second.created_at = 2000;
        store.enqueue(&second).unwrap();
        store.enqueue(&first).unwrap();

        let claimed = store.claim_next_pending().unwrap().unwrap();
        assert_eq!(claimed.record_id, 1);
        assert_eq!(claimed.state, JobState::Running);
        assert_eq!(claimed.attempts, 1);
        assert!(claimed.started_at.is_some());
    }

    #[test]
    fn test_claim_skips_non_pending() {
        let store = SqliteJobStore::in_memory().unwrap();
        let job = new_job("user1", 1);
        store.enqueue(&job).unwrap();

        assert!(store.claim_next_pending().unwrap().is_some());
        // Only job is now running; nothing left to claim.
        assert!(store.claim_next_pending().unwrap().is_none());
    }

    #[test]
    fn test_complete_and_fail_transitions() {
        let store = SqliteJobStore::in_memory().unwrap();
        let done_job = new_job("user1", 1);
        let failed_job = new_job("user1", 2);
        store.enqueue(&done_job).unwrap();
        store.enqueue(&failed_job).unwrap();

        let first = store.claim_next_pending().unwrap().unwrap();
        store.complete(&first.id).unwrap();
        let second = store.claim_next_pending().unwrap().unwrap();
        store.fail(&second.id, "ffmpeg exploded").unwrap();

        let done = store.get_job(&first.id).unwrap().unwrap();
        assert_eq!(done.state, JobState::Done);
        assert!(done.finished_at.is_some());

        let failed = store.get_job(&second.id).unwrap().unwrap();
        assert_eq!(failed.state, JobState::Failed);
        assert_eq!(failed.error.as_deref(), Some("ffmpeg exploded"));
    }

    #[test]
    fn test_complete_requires_running() {
        let store = SqliteJobStore::in_memory().unwrap();
        let job = new_job("user1", 1);
        store.enqueue(&job).unwrap();

        // Still pending; complete is a no-op.
        store.complete(&job.id).unwrap();
        let fetched = store.get_job(&job.id).unwrap().unwrap();
        assert_eq!(fetched.state, JobState::Pending);
    }

    #[test]
    fn test_mark_stale_running_failed() {
        let store = SqliteJobStore::in_memory().unwrap();
        let stale = new_job("user1", 1);
        let fresh = new_job("user1", 2);
        store.enqueue(&stale).unwrap();
        store.enqueue(&fresh).unwrap();

        let claimed_stale = store.claim_next_pending().unwrap().unwrap();
        // Backdate its start far past the threshold.
        {
            let conn = store.conn.lock().unwrap();
            conn.execute(
                "UPDATE analysis_jobs SET started_at = started_at - 3600000 WHERE id = ?1",
                params![claimed_stale.id],
            )
            .unwrap();
        }
        let claimed_fresh = store.claim_next_pending().unwrap().unwrap();

        let rescued = store.mark_stale_running_failed(600).unwrap();
        assert_eq!(rescued, 1);

        let stale_after = store.get_job(&claimed_stale.id).unwrap().unwrap();
        assert_eq!(stale_after.state, JobState::Failed);
        assert!(stale_after.error.unwrap().contains("restart"));

        let fresh_after = store.get_job(&claimed_fresh.id).unwrap().unwrap();
        assert_eq!(fresh_after.state, JobState::Running);
    }

    #[test]
    fn test_schema_version_stored() {
        let store = SqliteJobStore::in_memory().unwrap();
        let conn = store.conn.lock().unwrap();
        let version: i64 = conn
            .query_row("PRAGMA user_version;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, JOBS_SCHEMA_VERSION as i64);
    }

    #[test]
    fn test_list_for_user_and_count_pending() {
        let store = SqliteJobStore::in_memory().unwrap();
        for i in 0..3 {
            let mut job = new_job("user1", i);
            job.created_at = i * 1000;
            store.enqueue(&job).unwrap();
        }
        store.enqueue(&new_job("user2", 10)).unwrap();

        let jobs = store.list_for_user("user1", 10).unwrap();
        assert_eq!(jobs.len(), 3);
        assert_eq!(jobs[0].record_id, 2); // Newest first

        assert_eq!(store.count_pending().unwrap(), 4);
        store.claim_next_pending().unwrap();
        assert_eq!(store.count_pending().unwrap(), 3);
    }
}
