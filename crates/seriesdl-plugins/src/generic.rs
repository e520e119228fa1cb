//! Catch-all plugin that shells out to `yt-dlp`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::plugin::{
    PluginDownloadOptions, PluginError, PluginOutcome, SitePlugin, SourceInfo,
};

/// Output filename template handed to yt-dlp.
const OUTPUT_TEMPLATE: &str = "%(title)s-%(id)s.%(ext)s";

/// Fallback plugin: matches every URL and delegates to `yt-dlp`.
#[derive(Debug, Default)]
pub struct GenericPlugin;

impl GenericPlugin {
    /// Create the generic plugin.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Build the yt-dlp `-f` selector from quality/fps constraints.
///
/// "best"/"auto"/empty leave a dimension unconstrained; otherwise the
/// digits are pulled out ("720p" -> 720) and turned into `height<=N` /
/// `fps<=N` filters. With no constraints the default best-pair selector
/// is used.
fn build_format_selector(quality: &str, fps: &str) -> String {
    let mut constraints = Vec::new();
    if let Some(n) = numeric_constraint(quality) {
        constraints.push(format!("height<={n}"));
    }
    if let Some(n) = numeric_constraint(fps) {
        constraints.push(format!("fps<={n}"));
    }

    if constraints.is_empty() {
        return "bestvideo+bestaudio/best".to_string();
    }
    let selector: String = constraints.iter().map(|c| format!("[{c}]")).collect();
    format!("bestvideo{selector}+bestaudio/best{selector}/best")
}

fn numeric_constraint(value: &str) -> Option<u32> {
    let trimmed = value.trim().to_lowercase();
    if trimmed.is_empty() || trimmed == "best" || trimmed == "auto" {
        return None;
    }
    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

async fn list_entries(dir: &Path) -> Result<BTreeSet<PathBuf>, PluginError> {
    let mut entries = BTreeSet::new();
    let mut reader = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = reader.next_entry().await? {
        entries.insert(entry.path());
    }
    Ok(entries)
}

/// Most recently modified regular file in the directory, if any.
async fn latest_file(dir: &Path) -> Result<Option<PathBuf>, PluginError> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    let mut reader = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = reader.next_entry().await? {
        let meta = match entry.metadata().await {
            Ok(meta) if meta.is_file() => meta,
            _ => continue,
        };
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, entry.path()));
        }
    }
    Ok(newest.map(|(_, path)| path))
}

#[async_trait]
impl SitePlugin for GenericPlugin {
    fn name(&self) -> &str {
        "Generic (yt-dlp)"
    }

    fn priority(&self) -> i32 {
        0
    }

    fn matches(&self, _url: &str) -> Result<bool, PluginError> {
        Ok(true)
    }

    fn url_patterns(&self) -> Vec<String> {
        vec!["*".to_string()]
    }

    fn is_fallback(&self) -> bool {
        true
    }

    async fn extract_info(&self, url: &str) -> Result<SourceInfo, PluginError> {
        let output = Command::new("yt-dlp")
            .args(["--dump-single-json", "--no-warnings", "--quiet", url])
            .stdin(Stdio::null())
            .output()
            .await;

        // Extraction failures degrade to a bare URL instead of an error
        let output = match output {
            Ok(output) if output.status.success() => output,
            Ok(_) | Err(_) => {
                return Ok(SourceInfo {
                    webpage_url: url.to_string(),
                    ..SourceInfo::default()
                });
            }
        };

        let info: serde_json::Value = match serde_json::from_slice(&output.stdout) {
            Ok(info) => info,
            Err(err) => {
                debug!(%err, "yt-dlp metadata was not valid JSON");
                return Ok(SourceInfo {
                    webpage_url: url.to_string(),
                    ..SourceInfo::default()
                });
            }
        };

        let text = |key: &str| info.get(key).and_then(|v| v.as_str()).map(str::to_string);
        Ok(SourceInfo {
            title: text("title"),
            extractor: text("extractor"),
            webpage_url: text("webpage_url").unwrap_or_else(|| url.to_string()),
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
        tokio::fs::create_dir_all(output_dir).await?;

        let format = options
            .format
            .clone()
            .unwrap_or_else(|| build_format_selector(&options.quality, &options.fps));
        let template = output_dir.join(OUTPUT_TEMPLATE);

        let before = list_entries(output_dir).await?;

        debug!(%url, %format, "invoking yt-dlp");
        let output = Command::new("yt-dlp")
            .arg("-o")
            .arg(&template)
            .arg("-f")
            .arg(&format)
            .arg("--merge-output-format")
            .arg(&options.merge_output_format)
            .arg(url)
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = if stderr.trim().is_empty() {
                stdout.trim()
            } else {
                stderr.trim()
            };
            let detail = if detail.is_empty() { "yt-dlp failed" } else { detail };
            warn!(%url, code = ?output.status.code(), "yt-dlp exited nonzero");
            return Ok(PluginOutcome::failure(detail));
        }

        let after = list_entries(output_dir).await?;
        let mut files: Vec<PathBuf> = after.difference(&before).cloned().collect();
        if files.is_empty() {
            // yt-dlp may have overwritten an existing file in place
            files = latest_file(output_dir).await?.into_iter().collect();
        }

        Ok(PluginOutcome {
            success: true,
            files,
            error: None,
            title: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_unconstrained_by_default() {
        assert_eq!(build_format_selector("best", "best"), "bestvideo+bestaudio/best");
        assert_eq!(build_format_selector("auto", ""), "bestvideo+bestaudio/best");
    }

    #[test]
    fn selector_applies_height_and_fps() {
        assert_eq!(
            build_format_selector("720", "30"),
            "bestvideo[height<=720][fps<=30]+bestaudio/best[height<=720][fps<=30]/best"
        );
        assert_eq!(
            build_format_selector("1080p", "best"),
            "bestvideo[height<=1080]+bestaudio/best[height<=1080]/best"
        );
    }

    #[test]
    fn generic_plugin_matches_everything() {
        let plugin = GenericPlugin::new();
        assert!(plugin.matches("https://anything.example/whatever").unwrap());
        assert!(plugin.is_fallback());
        assert_eq!(plugin.priority(), 0);
    }

    #[tokio::test]
    async fn latest_file_picks_newest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old.mp4"), b"a").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        std::fs::write(dir.path().join("new.mp4"), b"b").unwrap();
        let newest = latest_file(dir.path()).await.unwrap().unwrap();
        assert_eq!(newest.file_name().unwrap(), "new.mp4");
    }
}
