//! AniKai plugin, the native handler.

use std::path::Path;

use async_trait::async_trait;
use regex::Regex;

use crate::plugin::{
    PluginDownloadOptions, PluginError, PluginOutcome, SitePlugin, SourceInfo,
};
use crate::sites::{any_match, compile_patterns};

const PATTERNS: &[&str] = &[r"^https?://(?:www\.)?anikai\.to/.*$"];

/// Native AniKai handler.
///
/// Jobs routed here are served by the episode pipeline (series resolve,
/// episode enumeration, per-episode download), so the plugin's own
/// `download` is deliberately unsupported.
pub struct AniKaiPlugin {
    patterns: Vec<Regex>,
    episode_re: Regex,
}

impl AniKaiPlugin {
    /// Construct the plugin, compiling its URL patterns.
    pub fn new() -> Result<Self, PluginError> {
        Ok(Self {
            patterns: compile_patterns(PATTERNS)?,
            episode_re: Regex::new(r"[?#&]ep=(\d+(?:\.\d+)?)")?,
        })
    }

    fn episode_from_url(&self, url: &str) -> Option<String> {
        self.episode_re
            .captures(url)
            .map(|c| c[1].to_string())
    }
}

#[async_trait]
impl SitePlugin for AniKaiPlugin {
    fn name(&self) -> &str {
        "AniKai.to"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn matches(&self, url: &str) -> Result<bool, PluginError> {
        Ok(any_match(&self.patterns, url))
    }

    fn url_patterns(&self) -> Vec<String> {
        PATTERNS.iter().map(|&p| p.to_string()).collect()
    }

    fn is_native(&self) -> bool {
        true
    }

    async fn extract_info(&self, url: &str) -> Result<SourceInfo, PluginError> {
        Ok(SourceInfo {
            title: None,
            extractor: Some(self.name().to_string()),
            webpage_url: url.to_string(),
            episode: self.episode_from_url(url),
            error: None,
        })
    }

    async fn download(
        &self,
        _url: &str,
        _output_dir: &Path,
        _options: &PluginDownloadOptions,
    ) -> Result<PluginOutcome, PluginError> {
        Err(PluginError::unsupported(
            "AniKai downloads run through the episode pipeline",
        ))
    }
}
