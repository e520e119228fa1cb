//! Plugin registry: priority-ordered URL routing with a fallback tier.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::generic::GenericPlugin;
use crate::plugin::{
    PluginDownloadOptions, PluginError, PluginOutcome, SitePlugin, SourceInfo,
};
use crate::sites::{AniKaiPlugin, GogoAnimePlugin, HiAnimePlugin, NineAnimePlugin};

/// A plugin constructor; failures are collected, not raised.
pub type PluginConstructor = fn() -> Result<Arc<dyn SitePlugin>, PluginError>;

/// One entry of [`PluginRegistry::describe`].
#[derive(Clone, Debug, Serialize)]
pub struct PluginDescriptor {
    /// Plugin display name.
    pub name: String,
    /// Selection priority.
    pub priority: i32,
    /// URL patterns the plugin claims.
    pub patterns: Vec<String>,
    /// Whether this is the catch-all tier.
    pub is_fallback: bool,
}

/// Priority-ordered plugin set with exactly one fallback.
///
/// Construction never fails: a plugin whose constructor errors is
/// recorded in [`load_errors`](Self::load_errors) and skipped, so one
/// broken handler cannot take the registry down.
pub struct PluginRegistry {
    handlers: Vec<Arc<dyn SitePlugin>>,
    fallback: Arc<dyn SitePlugin>,
    load_errors: Vec<String>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl PluginRegistry {
    /// Build the registry with the built-in plugin set.
    #[must_use]
    pub fn with_defaults() -> Self {
        let constructors: &[PluginConstructor] = &[
            || Ok(Arc::new(AniKaiPlugin::new()?)),
            || Ok(Arc::new(HiAnimePlugin::new()?)),
            || Ok(Arc::new(NineAnimePlugin::new()?)),
            || Ok(Arc::new(GogoAnimePlugin::new()?)),
        ];
        Self::from_constructors(constructors, Arc::new(GenericPlugin::new()))
    }

    /// Build a registry from an explicit constructor list plus the
    /// fallback handler.
    pub fn from_constructors(
        constructors: &[PluginConstructor],
        fallback: Arc<dyn SitePlugin>,
    ) -> Self {
        let mut handlers: Vec<Arc<dyn SitePlugin>> = Vec::with_capacity(constructors.len());
        let mut load_errors = Vec::new();

        for construct in constructors {
            match construct() {
                Ok(plugin) if plugin.is_fallback() => {
                    warn!(name = plugin.name(), "fallback plugin listed as handler, skipping");
                }
                Ok(plugin) => handlers.push(plugin),
                Err(err) => {
                    warn!(%err, "plugin failed to construct");
                    load_errors.push(err.to_string());
                }
            }
        }

        // Stable sort keeps registration order among equal priorities
        handlers.sort_by_key(|p| std::cmp::Reverse(p.priority()));

        Self {
            handlers,
            fallback,
            load_errors,
        }
    }

    /// Errors recorded while constructing plugins.
    #[must_use]
    pub fn load_errors(&self) -> &[String] {
        &self.load_errors
    }

    /// Pick the handler for a URL: highest-priority match wins, match
    /// errors count as non-matches, no match lands on the fallback.
    #[must_use]
    pub fn select(&self, url: &str) -> Arc<dyn SitePlugin> {
        for plugin in &self.handlers {
            match plugin.matches(url) {
                Ok(true) => return Arc::clone(plugin),
                Ok(false) => {}
                Err(err) => {
                    debug!(name = plugin.name(), %err, "match predicate failed, skipping");
                }
            }
        }
        Arc::clone(&self.fallback)
    }

    /// Download through the selected handler, falling back to the
    /// generic tier when a site handler errors.
    ///
    /// Never propagates an error: when the fallback itself fails the
    /// result is a structured [`PluginOutcome::failure`].
    pub async fn dispatch_download(
        &self,
        url: &str,
        output_dir: &Path,
        options: &PluginDownloadOptions,
    ) -> PluginOutcome {
        let plugin = self.select(url);
        debug!(name = plugin.name(), %url, "dispatching download");

        match plugin.download(url, output_dir, options).await {
            Ok(outcome) => outcome,
            Err(err) if plugin.is_fallback() => PluginOutcome::failure(err.to_string()),
            Err(err) => {
                warn!(name = plugin.name(), %err, "handler failed, trying fallback");
                match self.fallback.download(url, output_dir, options).await {
                    Ok(outcome) => outcome,
                    Err(fallback_err) => PluginOutcome::failure(fallback_err.to_string()),
                }
            }
        }
    }

    /// Extract metadata through the selected handler with the same
    /// two-tier fallback as downloads.
    pub async fn dispatch_extract_info(&self, url: &str) -> SourceInfo {
        let plugin = self.select(url);
        match plugin.extract_info(url).await {
            Ok(info) => info,
            Err(_) => match self.fallback.extract_info(url).await {
                Ok(info) => info,
                Err(_) => SourceInfo {
                    webpage_url: url.to_string(),
                    error: Some("Failed to extract info".to_string()),
                    ..SourceInfo::default()
                },
            },
        }
    }

    /// Describe all registered plugins, fallback last.
    #[must_use]
    pub fn describe(&self) -> Vec<PluginDescriptor> {
        let mut out: Vec<PluginDescriptor> = self
            .handlers
            .iter()
            .map(|p| PluginDescriptor {
                name: p.name().to_string(),
                priority: p.priority(),
                patterns: p.url_patterns(),
                is_fallback: false,
            })
            .collect();
        out.push(PluginDescriptor {
            name: self.fallback.name().to_string(),
            priority: self.fallback.priority(),
            patterns: self.fallback.url_patterns(),
            is_fallback: true,
        });
        out
    }
}
