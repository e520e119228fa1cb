//! URL-based site plugin system for seriesdl.
//!
//! Each plugin claims URLs by pattern and knows how to extract metadata
//! and download from its site. The [`PluginRegistry`] selects handlers
//! by priority and falls back to the generic yt-dlp plugin when a
//! site-specific handler fails or nothing matches.

pub mod generic;
pub mod plugin;
pub mod registry;
pub mod sites;

pub use generic::GenericPlugin;
pub use plugin::{
    PluginDownloadOptions, PluginError, PluginOutcome, SitePlugin, SourceInfo,
};
pub use registry::{PluginDescriptor, PluginRegistry};
pub use sites::{AniKaiPlugin, GogoAnimePlugin, HiAnimePlugin, NineAnimePlugin};
