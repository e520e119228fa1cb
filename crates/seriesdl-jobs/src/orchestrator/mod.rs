//! The job orchestrator.
//!
//! Entry point for starting, retrying, listing and clearing jobs. Each
//! submitted job gets two tasks on a shared `TaskTracker`: the run task
//! driving the state machine and a progress task sampling throughput.
//! `shutdown()` closes the tracker and joins everything outstanding.

mod progress;
mod runner;

use std::sync::Arc;

use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use seriesdl_core::{
    build_recovery_plan, JobConfig, JobError, JobEvent, JobEventEmitterPort, JobId, JobStatus,
    JobStorePort, LogLevel, RecoveryAction, Settings, SiteClientFactoryPort,
};
use seriesdl_plugins::PluginRegistry;

use crate::registry::{lock_job, JobRegistry, SharedJob};

use runner::RunContext;

/// Everything the orchestrator needs, injected at construction.
pub struct OrchestratorDeps {
    /// Live job map.
    pub registry: Arc<JobRegistry>,
    /// Durable job snapshots.
    pub store: Arc<dyn JobStorePort>,
    /// URL-routing plugin set.
    pub plugins: Arc<PluginRegistry>,
    /// Per-job site client construction.
    pub clients: Arc<dyn SiteClientFactoryPort>,
    /// Event sink.
    pub emitter: Arc<dyn JobEventEmitterPort>,
    /// Process-wide settings.
    pub settings: Settings,
}

/// Drives jobs from submission to a terminal state.
pub struct JobOrchestrator {
    registry: Arc<JobRegistry>,
    store: Arc<dyn JobStorePort>,
    plugins: Arc<PluginRegistry>,
    clients: Arc<dyn SiteClientFactoryPort>,
    emitter: Arc<dyn JobEventEmitterPort>,
    settings: Settings,
    tracker: TaskTracker,
}

impl JobOrchestrator {
    /// Build the orchestrator from its dependencies.
    #[must_use]
    pub fn new(deps: OrchestratorDeps) -> Self {
        Self {
            registry: deps.registry,
            store: deps.store,
            plugins: deps.plugins,
            clients: deps.clients,
            emitter: deps.emitter,
            settings: deps.settings,
            tracker: TaskTracker::new(),
        }
    }

    /// The live job registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Create a job for a URL and start it. Returns immediately with the
    /// new job id; the work runs on background tasks.
    pub async fn submit(&self, url: impl Into<String>, config: JobConfig) -> JobId {
        let shared = self
            .registry
            .create(url, config, None, 0, Vec::new());
        let id = lock_job(&shared).id;
        info!(job_id = %id, "job submitted");

        self.persist(&shared).await;
        self.spawn_job_tasks(shared);
        id
    }

    /// Create a follow-up job for a failed one, applying the selected
    /// recovery action's config changes. The original job is untouched.
    pub async fn retry(&self, job_id: JobId, action_index: usize) -> Result<JobId, JobError> {
        let Some(shared) = self.registry.get(job_id) else {
            return Err(JobError::NotFound { id: job_id });
        };

        let (url, plan, config, retry_count) = {
            let job = lock_job(&shared);
            if job.status != JobStatus::Failed {
                return Err(JobError::NotRetryable { id: job_id });
            }
            let plan = if job.recovery_plan.is_empty() {
                // Older snapshots may predate the planner
                let category = job.failure_category.unwrap_or(
                    seriesdl_core::FailureCategory::Unknown,
                );
                build_recovery_plan(category, &job.config)
            } else {
                job.recovery_plan.clone()
            };
            (
                job.source_url.clone(),
                plan,
                job.config.clone(),
                job.retry_count,
            )
        };

        let Some(action) = plan.get(action_index) else {
            return Err(JobError::InvalidActionIndex {
                index: action_index,
                len: plan.len(),
            });
        };
        let action: RecoveryAction = action.clone();
        let new_config = config.with_patch(&action.changes);

        let new_shared =
            self.registry
                .create(url, new_config, Some(job_id), retry_count + 1, plan);
        let new_id = {
            let mut job = lock_job(&new_shared);
            job.add_log(
                LogLevel::Info,
                format!("Retry created from job #{job_id} using: {}", action.label),
            );
            job.id
        };
        info!(job_id = %new_id, parent_job_id = %job_id, "retry job created");

        self.persist(&new_shared).await;
        self.spawn_job_tasks(new_shared);
        Ok(new_id)
    }

    /// Remove a terminal job from the registry and the store.
    pub async fn clear(&self, job_id: JobId) -> Result<(), JobError> {
        self.registry.clear(job_id)?;
        if let Err(err) = self.store.delete(job_id).await {
            warn!(job_id = %job_id, %err, "failed deleting job snapshot");
        }
        Ok(())
    }

    /// Stop accepting work and wait for all job and progress tasks.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        info!("orchestrator shut down");
    }

    fn spawn_job_tasks(&self, shared: SharedJob) {
        let ctx = RunContext {
            job: shared.clone(),
            store: Arc::clone(&self.store),
            plugins: Arc::clone(&self.plugins),
            clients: Arc::clone(&self.clients),
            emitter: Arc::clone(&self.emitter),
            settings: self.settings.clone(),
        };
        self.tracker.spawn(runner::run_job(ctx));

        self.tracker.spawn(progress::progress_loop(
            shared,
            Arc::clone(&self.store),
            Arc::clone(&self.emitter),
            self.settings.clone(),
        ));
    }

    async fn persist(&self, shared: &SharedJob) {
        let snapshot = lock_job(shared).clone();
        if let Err(err) = self.store.upsert(&snapshot).await {
            warn!(job_id = %snapshot.id, %err, "failed persisting job");
        }
        self.emitter.emit(JobEvent::update(&snapshot));
    }
}
