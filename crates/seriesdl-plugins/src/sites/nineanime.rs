//! 9anime plugin.

use std::path::Path;

use async_trait::async_trait;
use regex::Regex;

use crate::generic::GenericPlugin;
use crate::plugin::{
    PluginDownloadOptions, PluginError, PluginOutcome, SitePlugin, SourceInfo,
};
use crate::sites::{any_match, compile_patterns};

const PATTERNS: &[&str] = &[r"https?://(?:www\.)?9anime\.(?:to|pe|gg|tv)/.+"];

/// 9anime handler; downloads delegate to the generic plugin.
pub struct NineAnimePlugin {
    patterns: Vec<Regex>,
    generic: GenericPlugin,
}

impl NineAnimePlugin {
    /// Construct the plugin, compiling its URL patterns.
    pub fn new() -> Result<Self, PluginError> {
        Ok(Self {
            patterns: compile_patterns(PATTERNS)?,
            generic: GenericPlugin::new(),
        })
    }
}

#[async_trait]
impl SitePlugin for NineAnimePlugin {
    fn name(&self) -> &str {
        "9anime"
    }

    fn priority(&self) -> i32 {
        82
    }

    fn matches(&self, url: &str) -> Result<bool, PluginError> {
        Ok(any_match(&self.patterns, url))
    }

    fn url_patterns(&self) -> Vec<String> {
        PATTERNS.iter().map(|&p| p.to_string()).collect()
    }

    async fn extract_info(&self, url: &str) -> Result<SourceInfo, PluginError> {
        Ok(SourceInfo {
            title: None,
            extractor: Some(self.name().to_string()),
            webpage_url: url.to_string(),
            episode: None,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_nineanime_domains() {
        let plugin = NineAnimePlugin::new().unwrap();
        assert!(plugin.matches("https://9anime.to/watch/x").unwrap());
        assert!(plugin.matches("https://www.9anime.gg/watch/x").unwrap());
        assert!(!plugin.matches("https://19anime.to/watch/x").unwrap());
    }
}
