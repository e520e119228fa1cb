//! In-memory job registry.
//!
//! Owns the live job map and the id counter. Jobs are held behind
//! `Arc<Mutex<_>>` so the run task, the progress task and API readers
//! share one mutable entity; lock scopes are short and never cross an
//! await point.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use seriesdl_core::{Job, JobConfig, JobError, JobId, JobStorePort, RecoveryAction};

/// Shared handle to a live job.
pub type SharedJob = Arc<Mutex<Job>>;

/// Lock a job, recovering the guard if a writer panicked mid-update.
pub(crate) fn lock_job(job: &Mutex<Job>) -> MutexGuard<'_, Job> {
    job.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// The live job map plus the monotonic id counter.
#[derive(Default)]
pub struct JobRegistry {
    jobs: Mutex<HashMap<JobId, SharedJob>>,
    counter: Mutex<JobId>,
}

impl JobRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a job with the next id and insert it into the map.
    pub fn create(
        &self,
        url: impl Into<String>,
        config: JobConfig,
        parent_job_id: Option<JobId>,
        retry_count: u32,
        recovery_plan: Vec<RecoveryAction>,
    ) -> SharedJob {
        let id = {
            let mut counter = self
                .counter
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *counter += 1;
            *counter
        };

        let mut job = Job::new(id, url, config);
        job.parent_job_id = parent_job_id;
        job.retry_count = retry_count;
        job.recovery_plan = recovery_plan;

        let shared = Arc::new(Mutex::new(job));
        self.jobs_guard().insert(id, shared.clone());
        shared
    }

    /// Look up a live job by id.
    #[must_use]
    pub fn get(&self, id: JobId) -> Option<SharedJob> {
        self.jobs_guard().get(&id).cloned()
    }

    /// Snapshot every job, newest first.
    #[must_use]
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs_guard()
            .values()
            .map(|j| lock_job(j).clone())
            .collect();
        jobs.sort_by(|a, b| b.id.cmp(&a.id));
        jobs
    }

    /// Remove a terminal job from the map.
    ///
    /// Active jobs are refused; clearing mid-run would orphan the run
    /// and progress tasks still mutating the entity.
    pub fn clear(&self, id: JobId) -> Result<(), JobError> {
        let mut jobs = self.jobs_guard();
        let Some(shared) = jobs.get(&id) else {
            return Err(JobError::NotFound { id });
        };
        let status = lock_job(shared).status;
        if !status.is_terminal() {
            return Err(JobError::JobActive {
                id,
                status: status.to_string(),
            });
        }
        jobs.remove(&id);
        Ok(())
    }

    /// Reload persisted jobs on startup and seed the id counter.
    ///
    /// Store failures are logged, not raised; an unreadable store leaves
    /// the registry empty rather than refusing to start.
    pub async fn hydrate(&self, store: &dyn JobStorePort) {
        let jobs = match store.load_all().await {
            Ok(jobs) => jobs,
            Err(err) => {
                warn!(%err, "failed loading jobs from store");
                return;
            }
        };
        let count = jobs.len();

        {
            let mut map = self.jobs_guard();
            for job in jobs {
                map.insert(job.id, Arc::new(Mutex::new(job)));
            }
        }

        match store.max_id().await {
            Ok(max_id) => {
                let mut counter = self
                    .counter
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                *counter = (*counter).max(max_id);
            }
            Err(err) => warn!(%err, "failed reading max job id"),
        }

        info!(count, "hydrated jobs from store");
    }

    fn jobs_guard(&self) -> MutexGuard<'_, HashMap<JobId, SharedJob>> {
        self.jobs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seriesdl_core::JobStatus;

    #[test]
    fn create_assigns_sequential_ids() {
        let registry = JobRegistry::new();
        let a = registry.create("u1", JobConfig::default(), None, 0, Vec::new());
        let b = registry.create("u2", JobConfig::default(), None, 0, Vec::new());
        assert_eq!(lock_job(&a).id, 1);
        assert_eq!(lock_job(&b).id, 2);
        assert!(registry.get(2).is_some());
        assert!(registry.get(3).is_none());
    }

    #[test]
    fn list_is_newest_first() {
        let registry = JobRegistry::new();
        registry.create("u1", JobConfig::default(), None, 0, Vec::new());
        registry.create("u2", JobConfig::default(), None, 0, Vec::new());
        let ids: Vec<_> = registry.list().iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn clear_rejects_active_jobs() {
        let registry = JobRegistry::new();
        let job = registry.create("u", JobConfig::default(), None, 0, Vec::new());
        lock_job(&job).set_status(JobStatus::Downloading);

        let err = registry.clear(1).unwrap_err();
        assert!(matches!(err, JobError::JobActive { id: 1, .. }));

        lock_job(&job).set_status(JobStatus::Completed);
        registry.clear(1).unwrap();
        assert!(registry.get(1).is_none());
        assert!(matches!(
            registry.clear(1).unwrap_err(),
            JobError::NotFound { id: 1 }
        ));
    }
}
