//! Persistent queue for detailed-analysis jobs and the worker that drains it.

mod models;
mod schema;
mod store;
mod worker;

pub use models::{AnalysisJob, JobState};
pub use schema::{JOBS_SCHEMA_SQL, JOBS_SCHEMA_VERSION};
pub use store::{JobStore, SqliteJobStore};
pub use worker::AnalysisWorker;
