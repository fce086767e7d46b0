//! Database schema for the analysis job queue.

/// Schema version, bumped on any DDL change.
pub const JOBS_SCHEMA_VERSION: i32 = 1;

/// SQL schema for the jobs database.
pub const JOBS_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS analysis_jobs (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    record_id INTEGER NOT NULL,
    blob_key TEXT NOT NULL,
    filename TEXT NOT NULL,
    recorded_at INTEGER NOT NULL,

    -- pending | running | done | failed
    state TEXT NOT NULL DEFAULT 'pending',
    attempts INTEGER NOT NULL DEFAULT 0,
    error TEXT,

    created_at INTEGER NOT NULL,
    started_at INTEGER,
    finished_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_analysis_jobs_state
    ON analysis_jobs(state, created_at);

CREATE INDEX IF NOT EXISTS idx_analysis_jobs_user
    ON analysis_jobs(user_id, created_at);
"#;
