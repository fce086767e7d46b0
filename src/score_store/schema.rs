//! Database schema for score persistence.
//!
//! Three tables:
//! - score_records: one row per user per local day
//! - user_baselines: smoothed volume reference per user
//! - audit_log: reconciliation anomalies and overwrite deletions

/// Schema version, bumped on any DDL change.
pub const SCORE_SCHEMA_VERSION: i32 = 1;

/// SQL schema for the scores database.
pub const SCORE_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS score_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    score INTEGER NOT NULL,
    is_fallback INTEGER NOT NULL DEFAULT 1,
    filename TEXT NOT NULL,

    -- Timestamps (Unix milliseconds, UTC)
    recorded_at INTEGER NOT NULL,
    created_at INTEGER NOT NULL,

    -- Calendar day in the user-facing timezone; the write invariant
    local_day TEXT NOT NULL,

    -- Feature columns, filled by the detailed worker
    volume_std REAL,
    voiced_ratio REAL,
    zcr REAL,
    pitch_std REAL,
    tempo_val REAL,

    UNIQUE(user_id, local_day)
);

CREATE INDEX IF NOT EXISTS idx_score_records_user_recorded
    ON score_records(user_id, recorded_at);

CREATE INDEX IF NOT EXISTS idx_score_records_user_filename
    ON score_records(user_id, filename);

CREATE TABLE IF NOT EXISTS user_baselines (
    user_id TEXT PRIMARY KEY,
    volume_baseline REAL NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at INTEGER NOT NULL,
    user_id TEXT NOT NULL,
    action TEXT NOT NULL,
    detail TEXT
);

CREATE INDEX IF NOT EXISTS idx_audit_log_user
    ON audit_log(user_id, created_at);
"#;
