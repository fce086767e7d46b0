//! Persistence for score records, per-user baselines, and the audit log.

mod models;
mod schema;
mod store;

pub use models::{NewScoreRecord, ScoreRecord};
pub use schema::{SCORE_SCHEMA_SQL, SCORE_SCHEMA_VERSION};
pub use store::{InsertOutcome, ScoreStore, SqliteScoreStore};
