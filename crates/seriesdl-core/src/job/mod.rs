//! Job domain: the job entity, its state machine, configuration and
//! episode types.

mod episode;
mod events;
mod types;

pub use episode::{
    Episode, EpisodeKey, EpisodeServer, SeriesInfo, StreamKind, StreamSource, choose_server,
    episode_sort_key,
};
pub use events::JobEvent;
pub use types::{
    ConfigPatch, DownloadMode, Job, JobConfig, JobError, JobId, JobStatus, LogEntry, LogLevel,
};
