//! Failure triage and recovery planning.
//!
//! When a job fails, the error text and recent log tail are scanned for
//! known symptom tokens to pick a [`FailureCategory`]. Each category maps
//! to an ordered list of [`RecoveryAction`]s, partial config overrides a
//! retry can apply. The plan is never empty; an unrecognized failure
//! still yields a same-settings retry.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::job::{ConfigPatch, JobConfig, LogEntry};

/// Number of trailing log entries scanned alongside the error text.
const LOG_TAIL: usize = 20;

/// Coarse classification of a job failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// Timeouts, connection resets, HTTP 403/429.
    NetworkOrRateLimit,
    /// Post-download concatenation failed.
    MergeFailure,
    /// Servers or stream data could not be resolved.
    SourceResolutionFailure,
    /// The plugin engine rejected or mishandled the URL.
    PluginFailure,
    /// Nothing matched.
    Unknown,
}

impl FailureCategory {
    /// Stable string form, matching the serde representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NetworkOrRateLimit => "network_or_rate_limit",
            Self::MergeFailure => "merge_failure",
            Self::SourceResolutionFailure => "source_resolution_failure",
            Self::PluginFailure => "plugin_failure",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recovery option: a human-readable label plus the config overrides
/// a retry should merge in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecoveryAction {
    /// Display label ("Switch server preference").
    pub label: String,
    /// Partial config override; empty means retry unchanged.
    #[serde(default)]
    pub changes: ConfigPatch,
}

impl RecoveryAction {
    fn new(label: &str, changes: ConfigPatch) -> Self {
        Self {
            label: label.to_string(),
            changes,
        }
    }
}

/// Classify a failure from its error text and the last few log messages.
///
/// Matching is case-insensitive substring search over the concatenated
/// error and log tail. Rules are checked in order; the first hit wins,
/// so a timeout that also mentions "plugin" still classifies as network.
#[must_use]
pub fn categorize_failure(error: &str, logs: &[LogEntry]) -> FailureCategory {
    let tail_start = logs.len().saturating_sub(LOG_TAIL);
    let mut blob = error.to_lowercase();
    for entry in &logs[tail_start..] {
        blob.push('\n');
        blob.push_str(&entry.message.to_lowercase());
    }

    const NETWORK: &[&str] = &["timeout", "timed out", "connection", "network", "403", "429"];
    const MERGE: &[&str] = &["merge", "concat", "ffmpeg"];
    const SOURCE: &[&str] = &[
        "no servers",
        "could not choose server",
        "resolve video data",
        "episode token",
    ];
    const PLUGIN: &[&str] = &["plugin", "extractor", "unsupported", "youtube"];

    let hit = |tokens: &[&str]| tokens.iter().any(|t| blob.contains(t));

    if hit(NETWORK) {
        FailureCategory::NetworkOrRateLimit
    } else if hit(MERGE) {
        FailureCategory::MergeFailure
    } else if hit(SOURCE) {
        FailureCategory::SourceResolutionFailure
    } else if hit(PLUGIN) {
        FailureCategory::PluginFailure
    } else {
        FailureCategory::Unknown
    }
}

/// Build the ordered recovery plan for a failure category against the
/// config the job ran with. Always returns at least one action.
#[must_use]
pub fn build_recovery_plan(category: FailureCategory, config: &JobConfig) -> Vec<RecoveryAction> {
    use FailureCategory as C;

    let mut plan = Vec::new();

    if category == C::MergeFailure && config.merge_episodes {
        plan.push(RecoveryAction::new(
            "Retry without merging",
            ConfigPatch {
                merge_episodes: Some(false),
                keep_individual_files: Some(true),
                ..ConfigPatch::default()
            },
        ));
    }

    if matches!(
        category,
        C::SourceResolutionFailure | C::NetworkOrRateLimit | C::Unknown
    ) {
        let other_server = if config.prefer_server.eq_ignore_ascii_case("server 1") {
            "Server 2"
        } else {
            "Server 1"
        };
        plan.push(RecoveryAction::new(
            "Switch server preference",
            ConfigPatch {
                prefer_server: Some(other_server.to_string()),
                ..ConfigPatch::default()
            },
        ));
        plan.push(RecoveryAction::new(
            "Lower quality and FPS",
            ConfigPatch {
                quality: Some("720".to_string()),
                fps: Some("30".to_string()),
                ..ConfigPatch::default()
            },
        ));
    }

    if matches!(category, C::PluginFailure | C::Unknown) {
        plan.push(RecoveryAction::new(
            "Toggle plugin engine",
            ConfigPatch {
                use_plugin: Some(!config.use_plugin),
                ..ConfigPatch::default()
            },
        ));
    }

    if category == C::NetworkOrRateLimit {
        plan.push(RecoveryAction::new(
            "Increase timeout and retries",
            ConfigPatch {
                timeout_secs: Some(config.timeout_secs.max(450)),
                max_retries: Some(config.max_retries.max(9)),
                ..ConfigPatch::default()
            },
        ));
    }

    if plan.is_empty() {
        plan.push(RecoveryAction::new(
            "Retry with same settings",
            ConfigPatch::default(),
        ));
    }

    plan
}
