//! Core domain types and port definitions for seriesdl.
//!
//! This crate holds the job entity and its state machine, the ETA/speed
//! tracker, failure categorization and recovery planning, and the port
//! traits implemented by the adapter crates (`seriesdl-db`,
//! `seriesdl-plugins`) and consumed by `seriesdl-jobs`. It performs no
//! I/O of its own.

pub mod eta;
pub mod job;
pub mod ports;
pub mod recovery;
pub mod settings;

// Re-export commonly used types for convenience
pub use eta::{EtaReading, EtaTracker, format_bytes, format_speed, format_time};
pub use job::{
    ConfigPatch, DownloadMode, Episode, EpisodeKey, EpisodeServer, Job, JobConfig, JobError,
    JobEvent, JobId, JobStatus, LogEntry, LogLevel, SeriesInfo, StreamKind, StreamSource,
    choose_server, episode_sort_key,
};
pub use ports::{
    JobEventEmitterPort, JobStorePort, LogSink, NoopJobEmitter, SiteClientConfig,
    SiteClientFactoryPort, SiteClientPort, SiteError, StoreError,
};
pub use recovery::{FailureCategory, RecoveryAction, build_recovery_plan, categorize_failure};
pub use settings::{Settings, SettingsError};
