//! The job entity, its legal states and its configuration.
//!
//! Pure data types with no I/O dependencies. A serialized `Job` is the
//! snapshot format used both by the job store and by the event sink, so
//! everything here derives `Serialize`/`Deserialize` and round-trips
//! losslessly through JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::episode::StreamKind;
use crate::recovery::{FailureCategory, RecoveryAction, build_recovery_plan, categorize_failure};

/// Monotonically increasing job identifier. Never reused, even after a
/// job is cleared.
pub type JobId = u64;

/// Error type for job lifecycle operations.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobError {
    /// The requested job does not exist.
    #[error("Job not found: {id}")]
    NotFound {
        /// The missing job id.
        id: JobId,
    },

    /// The job is still running and cannot be cleared.
    #[error("Job {id} is still active ({status})")]
    JobActive {
        /// The active job id.
        id: JobId,
        /// Its current (non-terminal) status.
        status: String,
    },

    /// Only failed jobs can be retried.
    #[error("Job {id} is not failed and cannot be retried")]
    NotRetryable {
        /// The job id.
        id: JobId,
    },

    /// A recovery action index outside the plan.
    #[error("Invalid recovery action index {index} (plan has {len} actions)")]
    InvalidActionIndex {
        /// Requested index.
        index: usize,
        /// Plan length.
        len: usize,
    },

    /// General/uncategorized job failure.
    #[error("{message}")]
    Other {
        /// Error message.
        message: String,
    },
}

impl JobError {
    /// Create a generic error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

/// Status of a job.
///
/// Transitions are monotonic forward: `Pending → FetchingInfo →
/// FetchingEpisodes → Downloading → Merging → Completed`, with `Failed`
/// reachable from any non-terminal state. The plugin-mediated path jumps
/// from `Pending`/`Downloading` straight to a terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, not yet picked up by the orchestrator.
    #[default]
    Pending,
    /// Resolving the canonical series id and title.
    FetchingInfo,
    /// Enumerating the episode list.
    FetchingEpisodes,
    /// Downloading selected episodes.
    Downloading,
    /// Merging downloaded episodes into one file.
    Merging,
    /// Terminal: finished successfully.
    Completed,
    /// Terminal: failed with an error and a recovery plan.
    Failed,
}

impl JobStatus {
    /// Convert to string representation for storage and display.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::FetchingInfo => "fetching_info",
            Self::FetchingEpisodes => "fetching_episodes",
            Self::Downloading => "downloading",
            Self::Merging => "merging",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse from string representation. Unknown values default to `Pending`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "fetching_info" => Self::FetchingInfo,
            "fetching_episodes" => Self::FetchingEpisodes,
            "downloading" => Self::Downloading,
            "merging" => Self::Merging,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }

    /// Whether this status is terminal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Position in the forward-only progression. `Failed` ranks above
    /// everything so it is reachable from any non-terminal state.
    const fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::FetchingInfo => 1,
            Self::FetchingEpisodes => 2,
            Self::Downloading => 3,
            Self::Merging => 4,
            Self::Completed => 5,
            Self::Failed => 6,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Episode selection policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DownloadMode {
    /// Act on every episode of the series.
    #[default]
    #[serde(rename = "All Episodes")]
    AllEpisodes,
    /// Act on exactly one episode (`single_episode`).
    #[serde(rename = "Single Episode")]
    SingleEpisode,
    /// Act on an inclusive range (`start_episode` ..= `end_episode`).
    #[serde(rename = "Episode Range")]
    EpisodeRange,
}

/// Job configuration, immutable once the job is created.
///
/// A flat mapping of named options; retries carry a copy with recovery
/// overrides merged in, never a mutation of the original.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Episode selection policy.
    pub download_mode: DownloadMode,
    /// Episode id used by `SingleEpisode` mode.
    pub single_episode: String,
    /// Inclusive range start used by `EpisodeRange` mode.
    pub start_episode: String,
    /// Inclusive range end used by `EpisodeRange` mode.
    pub end_episode: String,
    /// Preferred stream type when choosing a server.
    pub prefer_type: StreamKind,
    /// Preferred server name when choosing a server.
    pub prefer_server: String,
    /// External download tool to use.
    pub download_method: String,
    /// Per-episode retry limit handed to the site client.
    pub max_retries: u32,
    /// Per-request timeout (seconds) handed to the site client.
    pub timeout_secs: u64,
    /// Worker/concurrency limit handed to the site client.
    pub max_workers: u32,
    /// Merge downloaded episodes into a single file.
    pub merge_episodes: bool,
    /// Season override; 0 means detect from the series title.
    pub season_number: u32,
    /// Keep per-episode files after a successful merge.
    pub keep_individual_files: bool,
    /// Quality ceiling ("best" or a height like "720").
    pub quality: String,
    /// FPS ceiling ("best" or a number like "30").
    pub fps: String,
    /// Allow plugin-mediated dispatch for non-native sites.
    pub use_plugin: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            download_mode: DownloadMode::AllEpisodes,
            single_episode: "1".to_string(),
            start_episode: "1".to_string(),
            end_episode: "1".to_string(),
            prefer_type: StreamKind::SoftSub,
            prefer_server: "Server 1".to_string(),
            download_method: "yt-dlp".to_string(),
            max_retries: 7,
            timeout_secs: 300,
            max_workers: 15,
            merge_episodes: false,
            season_number: 0,
            keep_individual_files: false,
            quality: "best".to_string(),
            fps: "best".to_string(),
            use_plugin: true,
        }
    }
}

impl JobConfig {
    /// Return a copy with the given patch merged in.
    #[must_use]
    pub fn with_patch(&self, patch: &ConfigPatch) -> Self {
        let mut config = self.clone();
        patch.apply(&mut config);
        config
    }
}

/// A partial configuration override, as produced by the recovery planner.
///
/// Only fields that recovery actions actually touch are present; unset
/// fields leave the original configuration untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigPatch {
    /// Override the merge flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_episodes: Option<bool>,
    /// Override whether per-episode files are kept after a merge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_individual_files: Option<bool>,
    /// Override the preferred server name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefer_server: Option<String>,
    /// Override the quality ceiling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    /// Override the FPS ceiling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<String>,
    /// Override the plugin-enable flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_plugin: Option<bool>,
    /// Override the per-request timeout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Override the per-episode retry limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

impl ConfigPatch {
    /// Merge the set fields of this patch into `config`.
    pub fn apply(&self, config: &mut JobConfig) {
        if let Some(v) = self.merge_episodes {
            config.merge_episodes = v;
        }
        if let Some(v) = self.keep_individual_files {
            config.keep_individual_files = v;
        }
        if let Some(v) = &self.prefer_server {
            config.prefer_server = v.clone();
        }
        if let Some(v) = &self.quality {
            config.quality = v.clone();
        }
        if let Some(v) = &self.fps {
            config.fps = v.clone();
        }
        if let Some(v) = self.use_plugin {
            config.use_plugin = v;
        }
        if let Some(v) = self.timeout_secs {
            config.timeout_secs = v;
        }
        if let Some(v) = self.max_retries {
            config.max_retries = v;
        }
    }

    /// Whether the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.merge_episodes.is_none()
            && self.keep_individual_files.is_none()
            && self.prefer_server.is_none()
            && self.quality.is_none()
            && self.fps.is_none()
            && self.use_plugin.is_none()
            && self.timeout_secs.is_none()
            && self.max_retries.is_none()
    }
}

/// Severity of a job log entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Diagnostic detail.
    Debug,
    /// Normal progress messages.
    Info,
    /// Recoverable problems.
    Warn,
    /// Failures (per-episode or job-level).
    Error,
}

impl LogLevel {
    /// Uppercase label used in snapshots.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

/// One entry in a job's append-only log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Severity.
    pub level: LogLevel,
    /// Human-readable message.
    pub message: String,
    /// When the entry was appended.
    pub timestamp: DateTime<Utc>,
}

/// The unit of work: one media-acquisition job.
///
/// Mutated exclusively by the orchestrator task running the job plus the
/// progress task belonging to the job; both write last-write-wins.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Job {
    /// Unique, monotonically increasing id.
    pub id: JobId,
    /// Source URL, immutable at creation.
    pub source_url: String,
    /// Configuration, immutable at creation.
    pub config: JobConfig,
    /// Current state-machine status.
    pub status: JobStatus,
    /// Resolved series title, set during `FetchingInfo`.
    pub series_title: Option<String>,
    /// Season number (configured or detected from the title).
    pub season: u32,
    /// Number of episodes selected for download.
    pub total_episodes: u32,
    /// Number of episodes downloaded so far.
    pub completed_episodes: u32,
    /// Integer progress percentage, floor(completed / total * 100).
    pub progress: u8,
    /// Episode currently being processed.
    pub current_episode: Option<String>,
    /// File currently being written.
    pub current_file: Option<String>,
    /// Base names of successfully produced files.
    pub downloaded_files: Vec<String>,
    /// Base name of the merged output, if merging succeeded.
    pub merged_file: Option<String>,
    /// On-disk bytes observed by the progress loop.
    pub downloaded_bytes: u64,
    /// Byte throughput observed by the progress loop.
    pub speed_bps: f64,
    /// Human-readable throughput ("1.50 KB/s").
    pub speed_formatted: Option<String>,
    /// Estimated seconds remaining.
    pub eta_seconds: Option<f64>,
    /// Human-readable ETA ("05:30", "1h 2m", "Calculating...").
    pub eta_formatted: Option<String>,
    /// Creation time.
    pub start_time: DateTime<Utc>,
    /// Terminal-transition time. Set exactly once.
    pub end_time: Option<DateTime<Utc>>,
    /// Append-only ordered log.
    pub logs: Vec<LogEntry>,
    /// Error message, set on failure.
    pub error: Option<String>,
    /// Failure category, set on failure.
    pub failure_category: Option<FailureCategory>,
    /// Ordered remediation candidates; non-empty whenever status is failed.
    pub recovery_plan: Vec<RecoveryAction>,
    /// Id of the failed job this one retries, if any.
    pub parent_job_id: Option<JobId>,
    /// How many retries deep this lineage is.
    pub retry_count: u32,
}

impl Default for Job {
    fn default() -> Self {
        Self::new(0, String::new(), JobConfig::default())
    }
}

impl Job {
    /// Create a fresh job in `Pending` state.
    #[must_use]
    pub fn new(id: JobId, source_url: impl Into<String>, config: JobConfig) -> Self {
        Self {
            id,
            source_url: source_url.into(),
            config,
            status: JobStatus::Pending,
            series_title: None,
            season: 0,
            total_episodes: 0,
            completed_episodes: 0,
            progress: 0,
            current_episode: None,
            current_file: None,
            downloaded_files: Vec::new(),
            merged_file: None,
            downloaded_bytes: 0,
            speed_bps: 0.0,
            speed_formatted: None,
            eta_seconds: None,
            eta_formatted: None,
            start_time: Utc::now(),
            end_time: None,
            logs: Vec::new(),
            error: None,
            failure_category: None,
            recovery_plan: Vec::new(),
            parent_job_id: None,
            retry_count: 0,
        }
    }

    /// Append a log entry. Logs are never deleted, only appended.
    pub fn add_log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.logs.push(LogEntry {
            level,
            message: message.into(),
            timestamp: Utc::now(),
        });
    }

    /// Transition to `status`, enforcing the forward-only rule.
    ///
    /// Terminal states are absorbing and backward transitions are
    /// ignored (both logged at debug); the transition into a terminal
    /// state stamps `end_time`.
    pub fn set_status(&mut self, status: JobStatus) {
        if self.status.is_terminal() || status.rank() < self.status.rank() {
            tracing::debug!(
                job_id = self.id,
                from = %self.status,
                to = %status,
                "Ignoring status transition"
            );
            return;
        }
        self.status = status;
        if status.is_terminal() && self.end_time.is_none() {
            self.end_time = Some(Utc::now());
        }
    }

    /// Record one successfully downloaded episode file.
    ///
    /// Increments the completed count (saturating at the total), recomputes
    /// progress, appends the filename and clears the current-file pointer.
    pub fn record_episode_done(&mut self, filename: impl Into<String>) {
        self.completed_episodes = (self.completed_episodes + 1).min(self.total_episodes.max(1));
        self.recompute_progress();
        self.downloaded_files.push(filename.into());
        self.current_file = None;
    }

    /// Recompute the integer progress percentage.
    ///
    /// Single rounding rule across the system: integer floor of
    /// `completed * 100 / total`.
    pub fn recompute_progress(&mut self) {
        if self.total_episodes > 0 {
            let pct = u64::from(self.completed_episodes) * 100 / u64::from(self.total_episodes);
            self.progress = pct.min(100) as u8;
        }
    }

    /// Transition to `Failed`, recording the error and attaching a
    /// failure category and a non-empty recovery plan.
    pub fn fail(&mut self, error: impl Into<String>) {
        let error = error.into();
        self.error = Some(error.clone());
        self.current_file = None;
        let category = categorize_failure(&error, &self.logs);
        self.recovery_plan = build_recovery_plan(category, &self.config);
        self.failure_category = Some(category);
        self.set_status(JobStatus::Failed);
        self.add_log(LogLevel::Error, format!("Job failed: {error}"));
    }

    /// Mark the job completed: progress pinned to 100, current file
    /// cleared, end time stamped.
    pub fn complete(&mut self) {
        self.progress = 100;
        self.current_file = None;
        self.set_status(JobStatus::Completed);
    }

    /// The last `n` log messages, oldest first.
    #[must_use]
    pub fn recent_logs(&self, n: usize) -> &[LogEntry] {
        let start = self.logs.len().saturating_sub(n);
        &self.logs[start..]
    }
}
