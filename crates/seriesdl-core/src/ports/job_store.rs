//! Job store port definition.
//!
//! Durable persistence for job snapshots so jobs survive process
//! restarts. Fine-grained progress churn is persisted too, but writes are
//! best-effort at the call sites: a failed persist logs a warning and the
//! in-memory job stays authoritative.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::{Job, JobId};

/// Errors produced by job store implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreError {
    /// Underlying storage failed.
    #[error("Storage error: {message}")]
    Storage {
        /// Human-readable cause.
        message: String,
    },
}

impl StoreError {
    /// Create a storage error from any displayable cause.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

/// Port for persisting job snapshots.
///
/// Implemented by the db crate and injected into the orchestrator.
#[async_trait]
pub trait JobStorePort: Send + Sync {
    /// Insert or replace the snapshot for a job.
    async fn upsert(&self, job: &Job) -> Result<(), StoreError>;

    /// Remove a job's snapshot.
    async fn delete(&self, id: JobId) -> Result<(), StoreError>;

    /// Load every readable snapshot, ordered by job id.
    ///
    /// Rows that fail to decode are skipped, not fatal; one corrupt
    /// snapshot must not prevent the rest from hydrating.
    async fn load_all(&self) -> Result<Vec<Job>, StoreError>;

    /// Highest job id ever stored, or zero when empty.
    ///
    /// Used on startup to seed the id counter so new jobs never collide
    /// with hydrated ones.
    async fn max_id(&self) -> Result<JobId, StoreError>;
}
