//! Site client port definition.
//!
//! The site client is the per-job collaborator that talks to a streaming
//! site: resolving a series from its URL, enumerating episodes and
//! servers, resolving playable stream data and fetching files. The
//! orchestrator drives the pipeline; implementations own the wire
//! details.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::job::{Episode, EpisodeServer, LogLevel, SeriesInfo, StreamSource};

/// Callback used by site clients to feed log lines back into the owning
/// job's log buffer.
pub type LogSink = Arc<dyn Fn(LogLevel, String) + Send + Sync>;

/// Errors produced by site client implementations.
#[derive(Error, Debug)]
pub enum SiteError {
    /// The series URL could not be resolved to a known series.
    #[error("Could not resolve series from URL: {url}")]
    SeriesNotFound {
        /// The offending URL.
        url: String,
    },

    /// A network request failed or timed out.
    #[error("Network error: {message}")]
    Network {
        /// Human-readable cause.
        message: String,
    },

    /// A site response could not be parsed.
    #[error("Unexpected response from site: {message}")]
    BadResponse {
        /// Human-readable cause.
        message: String,
    },

    /// The operation is not supported by this client.
    #[error("Operation not supported: {message}")]
    Unsupported {
        /// What was attempted.
        message: String,
    },

    /// Anything else.
    #[error("{message}")]
    Other {
        /// Human-readable cause.
        message: String,
    },
}

impl SiteError {
    /// Create a network error from any displayable cause.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a bad-response error from any displayable cause.
    pub fn bad_response(message: impl Into<String>) -> Self {
        Self::BadResponse {
            message: message.into(),
        }
    }

    /// Create an unsupported-operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }

    /// Create a general error from any displayable cause.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

/// Configuration handed to the factory when constructing a per-job
/// client.
#[derive(Clone, Debug)]
pub struct SiteClientConfig {
    /// Directory downloads are written under.
    pub download_dir: PathBuf,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Retry budget for transient request failures.
    pub max_retries: u32,
    /// Parallel segment workers for a single episode download.
    pub max_workers: u32,
}

/// Port for per-series site access.
///
/// One client instance serves one job; implementations may hold session
/// state (cookies, resolved hosts) scoped to that job.
#[async_trait]
pub trait SiteClientPort: Send + Sync {
    /// Resolve a series URL to its canonical identity.
    async fn resolve_series(&self, url: &str) -> Result<SeriesInfo, SiteError>;

    /// Enumerate the episodes of a series, in site order.
    async fn list_episodes(&self, series_id: &str) -> Result<Vec<Episode>, SiteError>;

    /// List the servers offering streams for an episode token.
    async fn list_servers(&self, token: &str) -> Result<Vec<EpisodeServer>, SiteError>;

    /// Resolve playable stream data for a server. `Ok(None)` means the
    /// server produced no usable stream and the caller should fail the
    /// episode.
    async fn resolve_stream(&self, server_id: &str) -> Result<Option<StreamSource>, SiteError>;

    /// Download one episode's stream to the given path.
    ///
    /// Returns `Ok(false)` when the download completed no file (the
    /// episode is counted as failed without aborting the job).
    async fn download_episode(
        &self,
        source: &StreamSource,
        output_path: &Path,
        episode_id: &str,
        quality: &str,
        fps: &str,
    ) -> Result<bool, SiteError>;

    /// Merge downloaded episode files into a single output.
    ///
    /// Returns the merged file path, or `Ok(None)` when merging was not
    /// possible (callers keep the individual files).
    async fn merge(
        &self,
        files: &[PathBuf],
        title: &str,
        season: u32,
        first_episode: &str,
        last_episode: &str,
    ) -> Result<Option<PathBuf>, SiteError>;

    /// Build the output filename for one episode.
    fn build_filename(&self, title: &str, season: u32, episode_id: &str) -> String {
        format!("{title} S{season:02}E{episode_id}.mp4")
    }

    /// Guess the season number from a series title.
    ///
    /// Recognizes "Season N", "Nth Season" and a bare trailing number;
    /// defaults to season 1.
    fn detect_season(&self, title: &str) -> u32 {
        detect_season_from_title(title)
    }
}

/// Port for constructing per-job site clients.
pub trait SiteClientFactoryPort: Send + Sync {
    /// Build a client with the given settings; log lines the client
    /// produces go to `logs`.
    fn create(&self, config: &SiteClientConfig, logs: LogSink) -> Arc<dyn SiteClientPort>;
}

/// Season detection shared by the default `detect_season` impl.
fn detect_season_from_title(title: &str) -> u32 {
    let lower = title.to_lowercase();

    // "season 2", "season2"
    if let Some(idx) = lower.find("season") {
        let tail = lower[idx + "season".len()..].trim_start();
        if let Some(n) = leading_number(tail) {
            return n;
        }
        // "2nd season", "3rd season"
        let head = lower[..idx].trim_end();
        if let Some(n) = trailing_ordinal(head) {
            return n;
        }
    }

    // Bare trailing number: "Title 2"
    if let Some(last) = lower.split_whitespace().last() {
        if let Ok(n) = last.parse::<u32>() {
            if n > 0 && n < 100 {
                return n;
            }
        }
    }

    1
}

fn leading_number(s: &str) -> Option<u32> {
    let digits: String = s.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok().filter(|n| *n > 0)
}

fn trailing_ordinal(s: &str) -> Option<u32> {
    let word = s.split_whitespace().last()?;
    let stripped = word
        .strip_suffix("st")
        .or_else(|| word.strip_suffix("nd"))
        .or_else(|| word.strip_suffix("rd"))
        .or_else(|| word.strip_suffix("th"))?;
    stripped.parse().ok().filter(|n| *n > 0)
}
