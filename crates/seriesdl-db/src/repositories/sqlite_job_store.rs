//! `SQLite` implementation of the `JobStorePort` trait.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::warn;

use seriesdl_core::{Job, JobId, JobStorePort, StoreError};

/// `SQLite` implementation of the `JobStorePort` trait.
///
/// Persists full job snapshots as JSON so jobs survive restarts. The
/// snapshot is the source of truth on load; `source_url` and
/// `config_json` are stored alongside for ad-hoc inspection.
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    /// Create a new `SQLite` job store over an initialized pool.
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn storage_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::storage(e.to_string())
}

#[async_trait]
impl JobStorePort for SqliteJobStore {
    async fn upsert(&self, job: &Job) -> Result<(), StoreError> {
        let config_json = serde_json::to_string(&job.config).map_err(storage_err)?;
        let state_json = serde_json::to_string(job).map_err(storage_err)?;

        sqlx::query(
            r#"
            INSERT INTO jobs (job_id, source_url, config_json, state_json, updated_at)
            VALUES (?, ?, ?, ?, datetime('now'))
            ON CONFLICT(job_id) DO UPDATE SET
                source_url = excluded.source_url,
                config_json = excluded.config_json,
                state_json = excluded.state_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(job.id as i64)
        .bind(&job.source_url)
        .bind(&config_json)
        .bind(&state_json)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    async fn delete(&self, id: JobId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM jobs WHERE job_id = ?")
            .bind(id as i64)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<Job>, StoreError> {
        let rows = sqlx::query("SELECT job_id, state_json FROM jobs ORDER BY job_id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in rows {
            let job_id: i64 = row.get("job_id");
            let state_json: String = row.get("state_json");
            match serde_json::from_str::<Job>(&state_json) {
                Ok(job) => jobs.push(job),
                // Corrupt rows are skipped so the rest can hydrate
                Err(err) => {
                    warn!(job_id, %err, "skipping unreadable job snapshot");
                }
            }
        }

        Ok(jobs)
    }

    async fn max_id(&self) -> Result<JobId, StoreError> {
        let row: (i64,) = sqlx::query_as("SELECT COALESCE(MAX(job_id), 0) FROM jobs")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(row.0 as JobId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::setup::setup_test_database;
    use seriesdl_core::{JobConfig, JobStatus};

    async fn store() -> SqliteJobStore {
        SqliteJobStore::new(setup_test_database().await.unwrap())
    }

    #[tokio::test]
    async fn upsert_then_load_round_trips() {
        let store = store().await;
        let mut job = Job::new(5, "https://anikai.to/watch/x", JobConfig::default());
        job.set_status(JobStatus::Downloading);
        job.total_episodes = 10;
        job.add_log(seriesdl_core::LogLevel::Info, "started");

        store.upsert(&job).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, 5);
        assert_eq!(loaded[0].status, JobStatus::Downloading);
        assert_eq!(loaded[0].total_episodes, 10);
        assert_eq!(loaded[0].logs.len(), job.logs.len());
    }

    #[tokio::test]
    async fn upsert_is_idempotent_per_id() {
        let store = store().await;
        let mut job = Job::new(1, "u", JobConfig::default());
        store.upsert(&job).await.unwrap();
        job.set_status(JobStatus::Completed);
        store.upsert(&job).await.unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn corrupt_snapshot_does_not_block_the_rest() {
        let store = store().await;
        let job = Job::new(5, "u", JobConfig::default());
        store.upsert(&job).await.unwrap();

        sqlx::query(
            "INSERT INTO jobs (job_id, source_url, config_json, state_json) VALUES (6, 'u', '{}', 'not json')",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let loaded = store.load_all().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, 5);
        // The corrupt row still counts toward max_id
        assert_eq!(store.max_id().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn max_id_is_zero_when_empty() {
        let store = store().await;
        assert_eq!(store.max_id().await.unwrap(), 0);
        store
            .upsert(&Job::new(41, "u", JobConfig::default()))
            .await
            .unwrap();
        assert_eq!(store.max_id().await.unwrap(), 41);
    }

    #[tokio::test]
    async fn delete_removes_snapshot() {
        let store = store().await;
        store
            .upsert(&Job::new(2, "u", JobConfig::default()))
            .await
            .unwrap();
        store.delete(2).await.unwrap();
        assert!(store.load_all().await.unwrap().is_empty());
        // Deleting a missing id is not an error
        store.delete(2).await.unwrap();
    }
}
