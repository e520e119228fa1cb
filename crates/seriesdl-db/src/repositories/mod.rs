//! Repository implementations backed by `SQLite`.

mod sqlite_job_store;

pub use sqlite_job_store::SqliteJobStore;
