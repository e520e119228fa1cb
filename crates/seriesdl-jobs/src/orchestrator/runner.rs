//! The per-job run task.
//!
//! Drives one job through its state machine. Non-native URLs with the
//! plugin engine enabled take the one-shot plugin path; everything else
//! runs the episode pipeline: resolve series, enumerate episodes, select
//! by mode, download each episode with continue-on-error, optionally
//! merge. Any pipeline error lands in the failed path, which attaches a
//! failure category and recovery plan.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};

use seriesdl_core::{
    choose_server, episode_sort_key, DownloadMode, Episode, JobConfig, JobEvent,
    JobEventEmitterPort, JobStatus, JobStorePort, LogLevel, LogSink, Settings, SiteClientConfig,
    SiteClientFactoryPort, SiteClientPort,
};
use seriesdl_plugins::{PluginDownloadOptions, PluginRegistry};

use crate::registry::{lock_job, SharedJob};

/// Dependencies of one run task.
pub(super) struct RunContext {
    pub job: SharedJob,
    pub store: Arc<dyn JobStorePort>,
    pub plugins: Arc<PluginRegistry>,
    pub clients: Arc<dyn SiteClientFactoryPort>,
    pub emitter: Arc<dyn JobEventEmitterPort>,
    pub settings: Settings,
}

impl RunContext {
    /// Persist the current snapshot and emit a full update. Store
    /// failures are logged, never raised.
    async fn checkpoint(&self) {
        let snapshot = lock_job(&self.job).clone();
        if let Err(err) = self.store.upsert(&snapshot).await {
            warn!(job_id = %snapshot.id, %err, "failed persisting job");
        }
        self.emitter.emit(JobEvent::update(&snapshot));
    }

    fn log(&self, level: LogLevel, message: impl Into<String>) {
        lock_job(&self.job).add_log(level, message);
    }

    fn set_status(&self, status: JobStatus) {
        lock_job(&self.job).set_status(status);
    }

    async fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        {
            let mut job = lock_job(&self.job);
            error!(job_id = %job.id, error = %message, "job failed");
            job.fail(message);
        }
        self.checkpoint().await;
    }
}

/// Run one job to a terminal state.
pub(super) async fn run_job(ctx: RunContext) {
    let (id, url, config) = {
        let job = lock_job(&ctx.job);
        (job.id, job.source_url.clone(), job.config.clone())
    };
    info!(job_id = %id, url = %url, "starting job");

    if config.use_plugin {
        let plugin = ctx.plugins.select(&url);
        if !plugin.is_native() {
            run_plugin_job(&ctx, &url, &config).await;
            return;
        }
        info!(job_id = %id, plugin = plugin.name(), "native handler selected");
    }

    run_native_job(&ctx, &url, &config).await;
}

/// One-shot download through the plugin registry.
async fn run_plugin_job(ctx: &RunContext, url: &str, config: &JobConfig) {
    ctx.set_status(JobStatus::Downloading);
    ctx.log(LogLevel::Info, "Downloading via plugin engine");
    ctx.checkpoint().await;

    let options = PluginDownloadOptions {
        quality: config.quality.clone(),
        fps: config.fps.clone(),
        ..PluginDownloadOptions::default()
    };
    let outcome = ctx
        .plugins
        .dispatch_download(url, &ctx.settings.download_dir, &options)
        .await;

    if !outcome.success {
        let message = outcome
            .error
            .unwrap_or_else(|| "Plugin download failed".to_string());
        ctx.fail(message).await;
        return;
    }

    {
        let mut job = lock_job(&ctx.job);
        let count = outcome.files.len().max(1) as u32;
        job.total_episodes = count;
        job.completed_episodes = count;
        job.downloaded_files = outcome
            .files
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        if job.series_title.is_none() {
            job.series_title = outcome.title;
        }
        job.add_log(
            LogLevel::Info,
            format!("Plugin download finished with {count} file(s)"),
        );
        job.complete();
    }
    ctx.checkpoint().await;
}

/// Full episode pipeline for the native site.
async fn run_native_job(ctx: &RunContext, url: &str, config: &JobConfig) {
    ctx.set_status(JobStatus::FetchingInfo);
    ctx.log(LogLevel::Info, "Fetching series information");
    ctx.checkpoint().await;

    let client = ctx.clients.create(
        &SiteClientConfig {
            download_dir: ctx.settings.download_dir.clone(),
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
            max_workers: config.max_workers,
        },
        job_log_sink(&ctx.job),
    );

    let series = match client.resolve_series(url).await {
        Ok(series) => series,
        Err(err) => return ctx.fail(err.to_string()).await,
    };
    if series.series_id.is_empty() {
        return ctx.fail("Could not fetch series information").await;
    }

    let season = if config.season_number > 0 {
        config.season_number
    } else {
        client.detect_season(&series.title)
    };
    {
        let mut job = lock_job(&ctx.job);
        job.series_title = Some(series.title.clone());
        job.season = season;
        job.set_status(JobStatus::FetchingEpisodes);
        job.add_log(LogLevel::Info, format!("Found series: {}", series.title));
    }
    ctx.checkpoint().await;

    let episodes = match client.list_episodes(&series.series_id).await {
        Ok(episodes) => episodes,
        Err(err) => return ctx.fail(err.to_string()).await,
    };
    if episodes.is_empty() {
        return ctx.fail("No episodes found for this series").await;
    }

    let selected = select_episodes(&episodes, config);
    if selected.is_empty() {
        return ctx.fail("No episodes matched the requested selection").await;
    }

    {
        let mut job = lock_job(&ctx.job);
        job.total_episodes = selected.len() as u32;
        job.set_status(JobStatus::Downloading);
        job.add_log(
            LogLevel::Info,
            format!("Downloading {} episode(s)", selected.len()),
        );
    }
    ctx.checkpoint().await;

    let series_dir = ctx.settings.download_dir.join(&series.title);
    if let Err(err) = tokio::fs::create_dir_all(&series_dir).await {
        return ctx.fail(format!("Could not create output directory: {err}")).await;
    }

    for episode in &selected {
        download_one_episode(ctx, client.as_ref(), config, &series_dir, season, episode).await;
        ctx.checkpoint().await;
    }

    let downloaded: Vec<String> = lock_job(&ctx.job).downloaded_files.clone();
    if config.merge_episodes && downloaded.len() > 1 {
        merge_episodes(ctx, client.as_ref(), config, &series_dir, season, &selected).await;
    }

    {
        let mut job = lock_job(&ctx.job);
        let completed = job.completed_episodes;
        let total = job.total_episodes;
        job.add_log(
            LogLevel::Info,
            format!("Job finished: {completed}/{total} episodes"),
        );
        job.complete();
    }
    ctx.checkpoint().await;
}

/// Download a single episode; all failures log and return, the loop
/// continues with the next episode.
async fn download_one_episode(
    ctx: &RunContext,
    client: &dyn SiteClientPort,
    config: &JobConfig,
    series_dir: &std::path::Path,
    season: u32,
    episode: &Episode,
) {
    let title = {
        let mut job = lock_job(&ctx.job);
        job.current_episode = Some(episode.id.clone());
        job.add_log(LogLevel::Info, format!("Downloading episode {}", episode.id));
        job.series_title.clone().unwrap_or_default()
    };

    let servers = match client.list_servers(&episode.token).await {
        Ok(servers) => servers,
        Err(err) => {
            ctx.log(
                LogLevel::Error,
                format!("Episode {}: {err}", episode.id),
            );
            return;
        }
    };
    if servers.is_empty() {
        ctx.log(
            LogLevel::Warn,
            format!("No servers for episode {}", episode.id),
        );
        return;
    }

    let Some(server) = choose_server(&servers, config.prefer_type, &config.prefer_server) else {
        ctx.log(
            LogLevel::Warn,
            format!("Could not choose server for episode {}", episode.id),
        );
        return;
    };

    let source = match client.resolve_stream(&server.server_id).await {
        Ok(Some(source)) => source,
        Ok(None) => {
            ctx.log(
                LogLevel::Warn,
                format!("Could not resolve video data for episode {}", episode.id),
            );
            return;
        }
        Err(err) => {
            ctx.log(
                LogLevel::Error,
                format!("Episode {}: {err}", episode.id),
            );
            return;
        }
    };

    let filename = client.build_filename(&title, season, &episode.id);
    let path = series_dir.join(&filename);
    lock_job(&ctx.job).current_file = Some(filename.clone());

    match client
        .download_episode(&source, &path, &episode.id, &config.quality, &config.fps)
        .await
    {
        Ok(true) => {
            let mut job = lock_job(&ctx.job);
            job.record_episode_done(filename);
            job.add_log(LogLevel::Info, format!("Episode {} done", episode.id));
        }
        Ok(false) => {
            let mut job = lock_job(&ctx.job);
            job.current_file = None;
            job.add_log(
                LogLevel::Warn,
                format!("Download produced no file for episode {}", episode.id),
            );
        }
        Err(err) => {
            let mut job = lock_job(&ctx.job);
            job.current_file = None;
            job.add_log(LogLevel::Error, format!("Episode {}: {err}", episode.id));
        }
    }
}

/// Merge downloaded files; failure logs and leaves the job completable.
async fn merge_episodes(
    ctx: &RunContext,
    client: &dyn SiteClientPort,
    config: &JobConfig,
    series_dir: &std::path::Path,
    season: u32,
    selected: &[Episode],
) {
    ctx.set_status(JobStatus::Merging);
    ctx.log(LogLevel::Info, "Merging episodes");
    ctx.checkpoint().await;

    let (title, parts) = {
        let job = lock_job(&ctx.job);
        let parts: Vec<(String, PathBuf)> = job
            .downloaded_files
            .iter()
            .map(|name| (name.clone(), series_dir.join(name)))
            .collect();
        (job.series_title.clone().unwrap_or_default(), parts)
    };
    let files: Vec<PathBuf> = parts.iter().map(|(_, path)| path.clone()).collect();
    let first = selected.first().map(|e| e.id.as_str()).unwrap_or("1");
    let last = selected.last().map(|e| e.id.as_str()).unwrap_or("1");

    match client.merge(&files, &title, season, first, last).await {
        Ok(Some(merged)) => {
            let merged_name = merged
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| merged.display().to_string());
            if !config.keep_individual_files {
                let removed = remove_part_files(&parts).await;
                lock_job(&ctx.job)
                    .downloaded_files
                    .retain(|name| !removed.contains(name));
            }
            let mut job = lock_job(&ctx.job);
            job.merged_file = Some(merged_name.clone());
            job.add_log(LogLevel::Info, format!("Merged into {merged_name}"));
        }
        Ok(None) => {
            ctx.log(LogLevel::Warn, "Merge skipped, keeping individual files");
        }
        Err(err) => {
            // The episodes themselves downloaded fine; don't fail the job
            ctx.log(LogLevel::Error, format!("Merge failed: {err}"));
        }
    }
}

/// Delete merged part files; returns the names actually removed, so
/// files that survive a failed delete stay on the job's file list.
async fn remove_part_files(parts: &[(String, PathBuf)]) -> Vec<String> {
    let mut removed = Vec::with_capacity(parts.len());
    for (name, path) in parts {
        match tokio::fs::remove_file(path).await {
            Ok(()) => removed.push(name.clone()),
            Err(err) => {
                warn!(path = %path.display(), %err, "could not remove merged part");
            }
        }
    }
    removed
}

/// Apply the job's download mode to the enumerated episode list,
/// preserving site order.
fn select_episodes(episodes: &[Episode], config: &JobConfig) -> Vec<Episode> {
    match config.download_mode {
        DownloadMode::AllEpisodes => episodes.to_vec(),
        DownloadMode::SingleEpisode => episodes
            .iter()
            .filter(|e| e.id == config.single_episode)
            .cloned()
            .collect(),
        DownloadMode::EpisodeRange => {
            let start = episode_sort_key(&config.start_episode);
            let end = episode_sort_key(&config.end_episode);
            episodes
                .iter()
                .filter(|e| {
                    let key = episode_sort_key(&e.id);
                    start <= key && key <= end
                })
                .cloned()
                .collect()
        }
    }
}

/// A log sink that appends to the job's in-memory log buffer.
fn job_log_sink(job: &SharedJob) -> LogSink {
    let job = Arc::clone(job);
    Arc::new(move |level, message| {
        lock_job(&job).add_log(level, message);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode(id: &str) -> Episode {
        Episode {
            id: id.to_string(),
            title: format!("Episode {id}"),
            token: format!("token-{id}"),
        }
    }

    #[test]
    fn range_selection_is_inclusive_and_ordered() {
        let episodes = vec![
            episode("1"),
            episode("1.5"),
            episode("2"),
            episode("3"),
            episode("4"),
        ];
        let config = JobConfig {
            download_mode: DownloadMode::EpisodeRange,
            start_episode: "1.5".to_string(),
            end_episode: "3".to_string(),
            ..JobConfig::default()
        };
        let ids: Vec<_> = select_episodes(&episodes, &config)
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["1.5", "2", "3"]);
    }

    #[test]
    fn single_selection_matches_exact_id() {
        let episodes = vec![episode("1"), episode("01"), episode("1.0"), episode("2")];
        let config = JobConfig {
            download_mode: DownloadMode::SingleEpisode,
            single_episode: "1".to_string(),
            ..JobConfig::default()
        };
        let ids: Vec<_> = select_episodes(&episodes, &config)
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["1"]);
    }

    #[test]
    fn all_mode_keeps_everything() {
        let episodes = vec![episode("1"), episode("OVA1")];
        let config = JobConfig::default();
        assert_eq!(select_episodes(&episodes, &config).len(), 2);
    }

    #[tokio::test]
    async fn part_removal_reports_only_deleted_files() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("ep1.mp4");
        std::fs::write(&present, b"x").unwrap();
        let parts = vec![
            ("ep1.mp4".to_string(), present.clone()),
            ("ep2.mp4".to_string(), dir.path().join("ep2.mp4")),
        ];
        let removed = remove_part_files(&parts).await;
        assert_eq!(removed, vec!["ep1.mp4"]);
        assert!(!present.exists());
    }
}
