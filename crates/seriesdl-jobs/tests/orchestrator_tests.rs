//! End-to-end orchestrator tests with a scripted site client and a real
//! in-memory job store.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use seriesdl_core::{
    DownloadMode, Episode, EpisodeServer, Job, JobConfig, JobError, JobEvent,
    JobEventEmitterPort, JobId, JobStatus, JobStorePort, LogSink, SeriesInfo, Settings,
    SiteClientConfig, SiteClientFactoryPort, SiteClientPort, SiteError, StreamKind,
    StreamSource,
};
use seriesdl_db::{setup_test_database, SqliteJobStore};
use seriesdl_jobs::{JobOrchestrator, JobRegistry, OrchestratorDeps};
use seriesdl_plugins::PluginRegistry;

/// Scripted site client: ten episodes, configurable failures.
struct FakeSiteClient {
    episode_count: u32,
    failing_episodes: HashSet<String>,
    fail_resolve: Option<String>,
    empty_series: bool,
}

impl Default for FakeSiteClient {
    fn default() -> Self {
        Self {
            episode_count: 10,
            failing_episodes: HashSet::new(),
            fail_resolve: None,
            empty_series: false,
        }
    }
}

#[async_trait]
impl SiteClientPort for FakeSiteClient {
    async fn resolve_series(&self, url: &str) -> Result<SeriesInfo, SiteError> {
        if let Some(message) = &self.fail_resolve {
            return Err(SiteError::network(message.clone()));
        }
        let _ = url;
        Ok(SeriesInfo {
            series_id: "show-1".to_string(),
            title: "Test Show".to_string(),
        })
    }

    async fn list_episodes(&self, _series_id: &str) -> Result<Vec<Episode>, SiteError> {
        if self.empty_series {
            return Ok(Vec::new());
        }
        Ok((1..=self.episode_count)
            .map(|n| Episode {
                id: n.to_string(),
                title: format!("Episode {n}"),
                token: format!("token-{n}"),
            })
            .collect())
    }

    async fn list_servers(&self, token: &str) -> Result<Vec<EpisodeServer>, SiteError> {
        Ok(vec![EpisodeServer {
            server_id: format!("srv-{token}"),
            server_name: "Server 1".to_string(),
            kind: StreamKind::SoftSub,
        }])
    }

    async fn resolve_stream(&self, server_id: &str) -> Result<Option<StreamSource>, SiteError> {
        Ok(Some(StreamSource {
            url: format!("https://cdn.example/{server_id}.m3u8"),
            extra: serde_json::Value::Null,
        }))
    }

    async fn download_episode(
        &self,
        _source: &StreamSource,
        output_path: &Path,
        episode_id: &str,
        _quality: &str,
        _fps: &str,
    ) -> Result<bool, SiteError> {
        if self.failing_episodes.contains(episode_id) {
            return Err(SiteError::network("connection reset by peer"));
        }
        tokio::fs::write(output_path, vec![0u8; 1024])
            .await
            .map_err(|e| SiteError::other(e.to_string()))?;
        Ok(true)
    }

    async fn merge(
        &self,
        files: &[PathBuf],
        title: &str,
        season: u32,
        first_episode: &str,
        last_episode: &str,
    ) -> Result<Option<PathBuf>, SiteError> {
        let parent = files[0].parent().unwrap_or_else(|| Path::new("."));
        let merged = parent.join(format!(
            "{title} S{season:02}E{first_episode}-E{last_episode}.mp4"
        ));
        tokio::fs::write(&merged, vec![0u8; 4096])
            .await
            .map_err(|e| SiteError::other(e.to_string()))?;
        Ok(Some(merged))
    }
}

struct FakeFactory {
    client: Arc<FakeSiteClient>,
}

impl SiteClientFactoryPort for FakeFactory {
    fn create(&self, _config: &SiteClientConfig, _logs: LogSink) -> Arc<dyn SiteClientPort> {
        Arc::clone(&self.client) as Arc<dyn SiteClientPort>
    }
}

#[derive(Clone, Default)]
struct CapturingEmitter {
    events: Arc<Mutex<Vec<JobEvent>>>,
}

impl JobEventEmitterPort for CapturingEmitter {
    fn emit(&self, event: JobEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn clone_box(&self) -> Box<dyn JobEventEmitterPort> {
        Box::new(self.clone())
    }
}

struct Harness {
    orchestrator: JobOrchestrator,
    registry: Arc<JobRegistry>,
    store: Arc<SqliteJobStore>,
    emitter: CapturingEmitter,
    _dir: tempfile::TempDir,
}

async fn harness(client: FakeSiteClient) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings {
        download_dir: dir.path().to_path_buf(),
        database_path: dir.path().join("jobs.db"),
        progress_tick: Duration::from_millis(25),
        speed_window: 8,
    };
    settings.validate().unwrap();

    let registry = Arc::new(JobRegistry::new());
    let store = Arc::new(SqliteJobStore::new(setup_test_database().await.unwrap()));
    let emitter = CapturingEmitter::default();

    let orchestrator = JobOrchestrator::new(OrchestratorDeps {
        registry: Arc::clone(&registry),
        store: store.clone(),
        plugins: Arc::new(PluginRegistry::with_defaults()),
        clients: Arc::new(FakeFactory {
            client: Arc::new(client),
        }),
        emitter: Arc::new(emitter.clone()),
        settings,
    });

    Harness {
        orchestrator,
        registry,
        store,
        emitter,
        _dir: dir,
    }
}

async fn wait_terminal(registry: &JobRegistry, id: JobId) -> Job {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Some(shared) = registry.get(id) {
                let snapshot = shared.lock().unwrap().clone();
                if snapshot.status.is_terminal() {
                    return snapshot;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("job did not reach a terminal state in time")
}

const NATIVE_URL: &str = "https://anikai.to/watch/test-show";

#[tokio::test]
async fn range_download_tolerates_per_episode_failures() {
    let h = harness(FakeSiteClient {
        failing_episodes: HashSet::from(["3".to_string()]),
        ..FakeSiteClient::default()
    })
    .await;

    let config = JobConfig {
        download_mode: DownloadMode::EpisodeRange,
        start_episode: "2".to_string(),
        end_episode: "4".to_string(),
        ..JobConfig::default()
    };
    let id = h.orchestrator.submit(NATIVE_URL, config).await;
    let job = wait_terminal(&h.registry, id).await;
    h.orchestrator.shutdown().await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total_episodes, 3);
    assert_eq!(job.completed_episodes, 2);
    assert_eq!(job.progress, 100);
    assert_eq!(job.downloaded_files.len(), 2);
    assert_eq!(job.series_title.as_deref(), Some("Test Show"));
    assert!(job.end_time.is_some());
    // The failed episode left an error log but did not fail the job
    assert!(job
        .logs
        .iter()
        .any(|l| l.message.contains("connection reset")));
    assert!(job
        .logs
        .iter()
        .any(|l| l.message == "Job finished: 2/3 episodes"));

    // Snapshot survived to the store
    let persisted = h.store.load_all().await.unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].status, JobStatus::Completed);
}

#[tokio::test]
async fn empty_series_fails_with_recovery_plan() {
    let h = harness(FakeSiteClient {
        empty_series: true,
        ..FakeSiteClient::default()
    })
    .await;

    let id = h.orchestrator.submit(NATIVE_URL, JobConfig::default()).await;
    let job = wait_terminal(&h.registry, id).await;
    h.orchestrator.shutdown().await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("No episodes found for this series"));
    assert!(!job.recovery_plan.is_empty());
    assert!(job.failure_category.is_some());
}

#[tokio::test]
async fn timeout_failure_plans_server_switch_and_timeout_bump() {
    let h = harness(FakeSiteClient {
        fail_resolve: Some("Read timed out after 300 seconds".to_string()),
        ..FakeSiteClient::default()
    })
    .await;

    let id = h.orchestrator.submit(NATIVE_URL, JobConfig::default()).await;
    let job = wait_terminal(&h.registry, id).await;
    h.orchestrator.shutdown().await;

    assert_eq!(job.status, JobStatus::Failed);
    let labels: Vec<&str> = job.recovery_plan.iter().map(|a| a.label.as_str()).collect();
    assert!(labels[0] == "Switch server preference" || labels[0] == "Lower quality and FPS");
    assert!(labels.contains(&"Increase timeout and retries"));
}

#[tokio::test]
async fn retry_creates_linked_job_with_merged_config() {
    let h = harness(FakeSiteClient {
        fail_resolve: Some("Read timed out".to_string()),
        ..FakeSiteClient::default()
    })
    .await;

    let id = h.orchestrator.submit(NATIVE_URL, JobConfig::default()).await;
    let failed = wait_terminal(&h.registry, id).await;
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.recovery_plan[0].label, "Switch server preference");

    let retry_id = h.orchestrator.retry(id, 0).await.unwrap();
    assert_ne!(retry_id, id);
    let retried = wait_terminal(&h.registry, retry_id).await;
    h.orchestrator.shutdown().await;

    assert_eq!(retried.parent_job_id, Some(id));
    assert_eq!(retried.retry_count, 1);
    // The selected action's changes were merged onto the parent config
    assert_eq!(retried.config.prefer_server, "Server 2");
    assert_eq!(retried.config.quality, "best");

    // The original job is untouched
    let original = h.registry.get(id).unwrap().lock().unwrap().clone();
    assert_eq!(original.config.prefer_server, "Server 1");
    assert_eq!(original.retry_count, 0);
}

#[tokio::test]
async fn retry_rejects_bad_inputs() {
    let h = harness(FakeSiteClient {
        fail_resolve: Some("Read timed out".to_string()),
        ..FakeSiteClient::default()
    })
    .await;

    assert!(matches!(
        h.orchestrator.retry(999, 0).await.unwrap_err(),
        JobError::NotFound { id: 999 }
    ));

    let id = h.orchestrator.submit(NATIVE_URL, JobConfig::default()).await;
    let job = wait_terminal(&h.registry, id).await;
    let len = job.recovery_plan.len();

    assert!(matches!(
        h.orchestrator.retry(id, len + 5).await.unwrap_err(),
        JobError::InvalidActionIndex { .. }
    ));
    h.orchestrator.shutdown().await;
}

#[tokio::test]
async fn merge_combines_files_and_drops_parts() {
    let h = harness(FakeSiteClient::default()).await;

    let config = JobConfig {
        download_mode: DownloadMode::EpisodeRange,
        start_episode: "1".to_string(),
        end_episode: "3".to_string(),
        merge_episodes: true,
        ..JobConfig::default()
    };
    let id = h.orchestrator.submit(NATIVE_URL, config).await;
    let job = wait_terminal(&h.registry, id).await;
    h.orchestrator.shutdown().await;

    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.merged_file.is_some());
    assert!(job.downloaded_files.is_empty());
}

#[tokio::test]
async fn progress_events_are_emitted() {
    let h = harness(FakeSiteClient::default()).await;

    let config = JobConfig {
        download_mode: DownloadMode::SingleEpisode,
        single_episode: "1".to_string(),
        ..JobConfig::default()
    };
    let id = h.orchestrator.submit(NATIVE_URL, config).await;
    wait_terminal(&h.registry, id).await;
    h.orchestrator.shutdown().await;

    let events = h.emitter.events.lock().unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, JobEvent::ProgressUpdate { job_id, .. } if *job_id == id)));
    // The last full update for the job shows it terminal
    let last = events
        .iter()
        .rev()
        .find_map(|e| match e {
            JobEvent::JobUpdate { job } if job.id == id => Some(job.clone()),
            _ => None,
        })
        .expect("job update events were emitted");
    assert!(last.status.is_terminal());
}

#[tokio::test]
async fn hydrate_seeds_the_id_counter() {
    let store = Arc::new(SqliteJobStore::new(setup_test_database().await.unwrap()));
    let mut old = Job::new(7, NATIVE_URL, JobConfig::default());
    old.set_status(JobStatus::Completed);
    store.upsert(&old).await.unwrap();

    let registry = JobRegistry::new();
    registry.hydrate(store.as_ref()).await;

    assert!(registry.get(7).is_some());
    let next = registry.create(NATIVE_URL, JobConfig::default(), None, 0, Vec::new());
    assert_eq!(next.lock().unwrap().id, 8);
}

#[tokio::test]
async fn clear_removes_terminal_jobs_only() {
    let h = harness(FakeSiteClient::default()).await;

    let config = JobConfig {
        download_mode: DownloadMode::SingleEpisode,
        single_episode: "1".to_string(),
        ..JobConfig::default()
    };
    let id = h.orchestrator.submit(NATIVE_URL, config).await;
    wait_terminal(&h.registry, id).await;
    h.orchestrator.shutdown().await;

    h.orchestrator.clear(id).await.unwrap();
    assert!(h.registry.get(id).is_none());
    assert!(h.store.load_all().await.unwrap().is_empty());
}
