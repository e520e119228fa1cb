//! The site plugin trait and its data types.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use seriesdl_core::Episode;

/// Errors produced by plugins.
#[derive(Error, Debug)]
pub enum PluginError {
    /// A URL pattern failed to compile at construction time.
    #[error("Invalid URL pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// The plugin cannot perform this operation.
    #[error("Unsupported operation: {message}")]
    Unsupported {
        /// What was attempted.
        message: String,
    },

    /// An external process could not be spawned or awaited.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else.
    #[error("{message}")]
    Other {
        /// Human-readable cause.
        message: String,
    },
}

impl PluginError {
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

/// Metadata extracted from a URL without downloading.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Media title, when the site exposes one.
    pub title: Option<String>,
    /// Name of the extractor/site that produced this info.
    pub extractor: Option<String>,
    /// Canonical page URL.
    pub webpage_url: String,
    /// Episode id parsed from the URL, when present.
    pub episode: Option<String>,
    /// Set instead of propagating when extraction failed entirely.
    pub error: Option<String>,
}

/// Result of a plugin download.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginOutcome {
    /// Whether the download produced usable output.
    pub success: bool,
    /// Files written, absolute paths.
    pub files: Vec<PathBuf>,
    /// Failure detail when `success` is false.
    pub error: Option<String>,
    /// Media title, when the plugin learned one.
    pub title: Option<String>,
}

impl PluginOutcome {
    /// A structured failure outcome.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            files: Vec::new(),
            error: Some(message.into()),
            title: None,
        }
    }
}

/// Options forwarded to a plugin download.
#[derive(Clone, Debug)]
pub struct PluginDownloadOptions {
    /// Quality ceiling ("best" or a height like "720").
    pub quality: String,
    /// Frame rate ceiling ("best" or a rate like "30").
    pub fps: String,
    /// Explicit format selector overriding quality/fps derivation.
    pub format: Option<String>,
    /// Container for merged output.
    pub merge_output_format: String,
}

impl Default for PluginDownloadOptions {
    fn default() -> Self {
        Self {
            quality: "best".to_string(),
            fps: "best".to_string(),
            format: None,
            merge_output_format: "mp4".to_string(),
        }
    }
}

/// A URL-based site handler.
///
/// `matches` is the routing predicate; an `Err` there counts as a
/// non-match so one broken plugin never blocks dispatch to the rest.
#[async_trait]
pub trait SitePlugin: Send + Sync {
    /// Display name of the site this plugin handles.
    fn name(&self) -> &str;

    /// Selection priority; higher wins. Fallbacks sit at 0.
    fn priority(&self) -> i32 {
        50
    }

    /// Whether this plugin claims the URL.
    fn matches(&self, url: &str) -> Result<bool, PluginError>;

    /// URL patterns this plugin claims, for diagnostics.
    fn url_patterns(&self) -> Vec<String> {
        Vec::new()
    }

    /// Whether this plugin is the registry's catch-all.
    fn is_fallback(&self) -> bool {
        false
    }

    /// Whether jobs for this site run through the native episode
    /// pipeline instead of the plugin's own `download`.
    fn is_native(&self) -> bool {
        false
    }

    /// Extract metadata for a URL without downloading.
    async fn extract_info(&self, url: &str) -> Result<SourceInfo, PluginError>;

    /// Download the media behind a URL into `output_dir`.
    async fn download(
        &self,
        url: &str,
        output_dir: &Path,
        options: &PluginDownloadOptions,
    ) -> Result<PluginOutcome, PluginError>;

    /// Enumerate episodes of a series URL, when the site supports it.
    async fn list_episodes(&self, _series_url: &str) -> Result<Vec<Episode>, PluginError> {
        Ok(Vec::new())
    }
}
