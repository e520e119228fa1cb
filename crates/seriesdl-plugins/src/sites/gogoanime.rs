//! GogoAnime plugin.

use std::path::Path;

use async_trait::async_trait;
use regex::Regex;

use crate::generic::GenericPlugin;
use crate::plugin::{
    PluginDownloadOptions, PluginError, PluginOutcome, SitePlugin, SourceInfo,
};
use crate::sites::{any_match, compile_patterns};

const PATTERNS: &[&str] = &[
    r"https?://(?:www\.)?(?:gogoanime|gogoanime\d+)\.(?:io|co|org|tv)/.+",
    r"https?://(?:www\.)?goload\.(?:io|pro|one)/.+",
];

/// GogoAnime handler; downloads delegate to the generic plugin.
pub struct GogoAnimePlugin {
    patterns: Vec<Regex>,
    episode_re: Regex,
    generic: GenericPlugin,
}

impl GogoAnimePlugin {
    /// Construct the plugin, compiling its URL patterns.
    pub fn new() -> Result<Self, PluginError> {
        Ok(Self {
            patterns: compile_patterns(PATTERNS)?,
            episode_re: Regex::new(r"episode-(\d+)")?,
            generic: GenericPlugin::new(),
        })
    }
}

#[async_trait]
impl SitePlugin for GogoAnimePlugin {
    fn name(&self) -> &str {
        "GogoAnime"
    }

    fn priority(&self) -> i32 {
        80
    }

    fn matches(&self, url: &str) -> Result<bool, PluginError> {
        Ok(any_match(&self.patterns, url))
    }

    fn url_patterns(&self) -> Vec<String> {
        PATTERNS.iter().map(|&p| p.to_string()).collect()
    }

    async fn extract_info(&self, url: &str) -> Result<SourceInfo, PluginError> {
        let episode = if url.contains("/episode-") || url.contains("-episode-") {
            self.episode_re.captures(url).map(|c| c[1].to_string())
        } else {
            None
        };
        Ok(SourceInfo {
            title: None,
            extractor: Some(self.name().to_string()),
            webpage_url: url.to_string(),
            episode,
            error: None,
        })
    }

    async fn download(
        &self,
        url: &str,
        output_dir: &Path,
        options: &PluginDownloadOptions,
    ) -> Result<PluginOutcome, PluginError> {
        self.generic.download(url, output_dir, options).await
    }
}
