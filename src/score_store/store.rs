//! SQLite store for score records.

use super::models::{NewScoreRecord, ScoreRecord};
use super::schema::{SCORE_SCHEMA_SQL, SCORE_SCHEMA_VERSION};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Result of attempting to create a score record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Row created; carries the new record id.
    Inserted(i64),
    /// A record already exists for this (user, local day) and overwrite was
    /// not requested.
    AlreadyExists,
}

/// Trait for score storage operations.
pub trait ScoreStore: Send + Sync {
    // ==================== Score Records ====================

    /// Create a score record, enforcing at-most-one-per-(user, local day).
    ///
    /// With `overwrite` the existing same-day record (if any) is deleted in
    /// the same transaction and an audit entry records the deletion.
    fn insert_score(&self, record: &NewScoreRecord, overwrite: bool) -> Result<InsertOutcome>;

    /// Get a record by id.
    fn get_score(&self, id: i64) -> Result<Option<ScoreRecord>>;

    /// The record for a user's local calendar day, if any.
    fn find_by_day(&self, user_id: &str, local_day: &str) -> Result<Option<ScoreRecord>>;

    /// Primary reconciliation lookup: match by stored filename.
    fn find_by_filename(&self, user_id: &str, filename: &str) -> Result<Option<ScoreRecord>>;

    /// Secondary reconciliation lookup: the newest record whose recorded_at
    /// falls inside `[from_ms, to_ms]`.
    fn find_in_window(&self, user_id: &str, from_ms: i64, to_ms: i64)
        -> Result<Option<ScoreRecord>>;

    /// Overwrite a record in place with the detailed result, clearing the
    /// fallback flag. Returns false when the row no longer exists.
    #[allow(clippy::too_many_arguments)]
    fn apply_detailed_result(
        &self,
        id: i64,
        score: i64,
        is_fallback: bool,
        volume_std: Option<f64>,
        voiced_ratio: Option<f64>,
        zcr: Option<f64>,
        pitch_std: Option<f64>,
        tempo_val: Option<f64>,
    ) -> Result<bool>;

    /// The user's earliest scores ordered by recording time ascending,
    /// baseline input.
    fn earliest_scores(&self, user_id: &str, limit: usize) -> Result<Vec<i64>>;

    /// The user's most recent stored volume readings, newest first, light
    /// path's recent-RMS reference input.
    fn recent_volume_stds(&self, user_id: &str, limit: usize) -> Result<Vec<f64>>;

    /// Records for a user, newest first.
    fn list_scores(&self, user_id: &str, limit: usize, offset: usize) -> Result<Vec<ScoreRecord>>;

    /// The user's most recent record.
    fn latest_score(&self, user_id: &str) -> Result<Option<ScoreRecord>>;

    /// Total records for a user.
    fn count_scores(&self, user_id: &str) -> Result<usize>;

    // ==================== Volume Baseline ====================

    fn get_volume_baseline(&self, user_id: &str) -> Result<Option<f64>>;

    fn set_volume_baseline(&self, user_id: &str, value: f64) -> Result<()>;

    // ==================== Audit Log ====================

    /// Record an action that must stay observable (reconciliation misses,
    /// overwrite deletions).
    fn record_audit(&self, user_id: &str, action: &str, detail: Option<&str>) -> Result<()>;

    /// Audit entries for a user, newest first.
    fn list_audit(&self, user_id: &str, limit: usize) -> Result<Vec<(String, Option<String>)>>;
}

/// SQLite implementation of ScoreStore.
pub struct SqliteScoreStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteScoreStore {
    /// Open or create a scores database.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open scores database: {:?}", path))?;
        conn.execute_batch(SCORE_SCHEMA_SQL)?;
        conn.execute(
            &format!("PRAGMA user_version = {}", SCORE_SCHEMA_VERSION),
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCORE_SCHEMA_SQL)?;
        conn.execute(
            &format!("PRAGMA user_version = {}", SCORE_SCHEMA_VERSION),
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<ScoreRecord> {
        Ok(ScoreRecord {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            score: row.get("score")?,
            is_fallback: row.get::<_, i32>("is_fallback")? != 0,
            filename: row.get("filename")?,
            recorded_at: row.get("recorded_at")?,
            local_day: row.get("local_day")?,
            volume_std: row.get("volume_std")?,
            voiced_ratio: row.get("voiced_ratio")?,
            zcr: row.get("zcr")?,
            pitch_std: row.get("pitch_std")?,
            tempo_val: row.get("tempo_val")?,
            created_at: row.get("created_at")?,
        })
    }
}

impl ScoreStore for SqliteScoreStore {
    fn insert_score(&self, record: &NewScoreRecord, overwrite: bool) -> Result<InsertOutcome> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = chrono::Utc::now().timestamp_millis();

        if overwrite {
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM score_records WHERE user_id = ?1 AND local_day = ?2",
                    params![record.user_id, record.local_day],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(id) = existing {
                tx.execute("DELETE FROM score_records WHERE id = ?1", params![id])?;
                tx.execute(
                    "INSERT INTO audit_log (created_at, user_id, action, detail) VALUES (?1, ?2, ?3, ?4)",
                    params![
                        now,
                        record.user_id,
                        "overwrite_deleted",
                        format!(r#"{{"record_id":{},"local_day":"{}"}}"#, id, record.local_day),
                    ],
                )?;
            }
        }

        let inserted = tx.execute(
            r#"
            INSERT INTO score_records (
                user_id, score, is_fallback, filename,
                recorded_at, created_at, local_day, volume_std
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(user_id, local_day) DO NOTHING
            "#,
            params![
                record.user_id,
                record.score,
                record.is_fallback as i32,
                record.filename,
                record.recorded_at,
                now,
                record.local_day,
                record.volume_std,
            ],
        )?;

        if inserted == 0 {
            tx.rollback()?;
            return Ok(InsertOutcome::AlreadyExists);
        }

        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(InsertOutcome::Inserted(id))
    }

    fn get_score(&self, id: i64) -> Result<Option<ScoreRecord>> {
        let conn = self.conn.lock().unwrap();
        let result = conn
            .query_row(
                "SELECT * FROM score_records WHERE id = ?1",
                params![id],
                Self::row_to_record,
            )
            .optional()?;
        Ok(result)
    }

    fn find_by_day(&self, user_id: &str, local_day: &str) -> Result<Option<ScoreRecord>> {
        let conn = self.conn.lock().unwrap();
        let result = conn
            .query_row(
                "SELECT * FROM score_records WHERE user_id = ?1 AND local_day = ?2",
                params![user_id, local_day],
                Self::row_to_record,
            )
            .optional()?;
        Ok(result)
    }

    fn find_by_filename(&self, user_id: &str, filename: &str) -> Result<Option<ScoreRecord>> {
        let conn = self.conn.lock().unwrap();
        let result = conn
            .query_row(
                "SELECT * FROM score_records WHERE user_id = ?1 AND filename = ?2
                 ORDER BY recorded_at DESC LIMIT 1",
                params![user_id, filename],
                Self::row_to_record,
            )
            .optional()?;
        Ok(result)
    }

    fn find_in_window(
        &self,
        user_id: &str,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Option<ScoreRecord>> {
        let conn = self.conn.lock().unwrap();
        let result = conn
            .query_row(
                "SELECT * FROM score_records
                 WHERE user_id = ?1 AND recorded_at >= ?2 AND recorded_at <= ?3
                 ORDER BY recorded_at DESC LIMIT 1",
                params![user_id, from_ms, to_ms],
                Self::row_to_record,
            )
            .optional()?;
        Ok(result)
    }

    fn apply_detailed_result(
        &self,
        id: i64,
        score: i64,
        is_fallback: bool,
        volume_std: Option<f64>,
        voiced_ratio: Option<f64>,
        zcr: Option<f64>,
        pitch_std: Option<f64>,
        tempo_val: Option<f64>,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            r#"
            UPDATE score_records SET
                score = ?2, is_fallback = ?3,
                volume_std = ?4, voiced_ratio = ?5, zcr = ?6,
                pitch_std = ?7, tempo_val = ?8
            WHERE id = ?1
            "#,
            params![
                id,
                score,
                is_fallback as i32,
                volume_std,
                voiced_ratio,
                zcr,
                pitch_std,
                tempo_val,
            ],
        )?;
        Ok(changed > 0)
    }

    fn earliest_scores(&self, user_id: &str, limit: usize) -> Result<Vec<i64>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT score FROM score_records WHERE user_id = ?1
             ORDER BY recorded_at ASC LIMIT ?2",
        )?;
        let scores = stmt
            .query_map(params![user_id, limit as i64], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(scores)
    }

    fn recent_volume_stds(&self, user_id: &str, limit: usize) -> Result<Vec<f64>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT volume_std FROM score_records
             WHERE user_id = ?1 AND volume_std IS NOT NULL
             ORDER BY recorded_at DESC LIMIT ?2",
        )?;
        let values = stmt
            .query_map(params![user_id, limit as i64], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(values)
    }

    fn list_scores(&self, user_id: &str, limit: usize, offset: usize) -> Result<Vec<ScoreRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM score_records WHERE user_id = ?1
             ORDER BY recorded_at DESC LIMIT ?2 OFFSET ?3",
        )?;
        let records = stmt
            .query_map(
                params![user_id, limit as i64, offset as i64],
                Self::row_to_record,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn latest_score(&self, user_id: &str) -> Result<Option<ScoreRecord>> {
        let conn = self.conn.lock().unwrap();
        let result = conn
            .query_row(
                "SELECT * FROM score_records WHERE user_id = ?1
                 ORDER BY recorded_at DESC LIMIT 1",
                params![user_id],
                Self::row_to_record,
            )
            .optional()?;
        Ok(result)
    }

    fn count_scores(&self, user_id: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM score_records WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn get_volume_baseline(&self, user_id: &str) -> Result<Option<f64>> {
        let conn = self.conn.lock().unwrap();
        let result = conn
            .query_row(
                "SELECT volume_baseline FROM user_baselines WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(result)
    }

    fn set_volume_baseline(&self, user_id: &str, value: f64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO user_baselines (user_id, volume_baseline, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(user_id) DO UPDATE SET
                volume_baseline = excluded.volume_baseline,
                updated_at = excluded.updated_at
            "#,
            params![user_id, value, chrono::Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }

    fn record_audit(&self, user_id: &str, action: &str, detail: Option<&str>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO audit_log (created_at, user_id, action, detail) VALUES (?1, ?2, ?3, ?4)",
            params![
                chrono::Utc::now().timestamp_millis(),
                user_id,
                action,
                detail,
            ],
        )?;
        Ok(())
    }

    fn list_audit(&self, user_id: &str, limit: usize) -> Result<Vec<(String, Option<String>)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT action, detail FROM audit_log WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let entries = stmt
            .query_map(params![user_id, limit as i64], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }
}
