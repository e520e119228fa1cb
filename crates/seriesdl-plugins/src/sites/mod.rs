//! Site-specific plugins.
//!
//! Each plugin claims its site's URLs by regex. AniKai is the native
//! handler whose jobs run through the episode pipeline; the others
//! extract what metadata the URL carries and delegate the actual
//! download to the generic yt-dlp plugin.

mod anikai;
mod gogoanime;
mod hianime;
mod nineanime;

pub use anikai::AniKaiPlugin;
pub use gogoanime::GogoAnimePlugin;
pub use hianime::HiAnimePlugin;
pub use nineanime::NineAnimePlugin;

use regex::Regex;

use crate::plugin::PluginError;

/// Compile a pattern list, surfacing the first bad pattern as an error.
pub(crate) fn compile_patterns(patterns: &[&str]) -> Result<Vec<Regex>, PluginError> {
    patterns.iter().map(|p| Ok(Regex::new(p)?)).collect()
}

/// Anchored match against any of the compiled patterns.
pub(crate) fn any_match(patterns: &[Regex], url: &str) -> bool {
    patterns
        .iter()
        .any(|p| p.find(url).is_some_and(|m| m.start() == 0))
}
