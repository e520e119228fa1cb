//! Per-job progress sampling task.
//!
//! Ticks once per `Settings::progress_tick`: feeds completed episodes
//! into an episode ETA tracker, samples on-disk byte growth for the
//! speed readout, writes the derived fields back onto the job, persists
//! the snapshot best-effort and emits events. Exits after observing a
//! terminal status, with one final full update.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::warn;

use seriesdl_core::{
    format_speed, format_time, EtaTracker, Job, JobEvent, JobEventEmitterPort, JobStorePort,
    Settings,
};

use crate::registry::{lock_job, SharedJob};

pub(super) async fn progress_loop(
    job: SharedJob,
    store: Arc<dyn JobStorePort>,
    emitter: Arc<dyn JobEventEmitterPort>,
    settings: Settings,
) {
    let mut episode_eta = EtaTracker::new(settings.speed_window);
    let mut byte_rate = EtaTracker::new(settings.speed_window);
    byte_rate.start(0.0);
    let mut eta_started = false;

    let mut ticker = tokio::time::interval(settings.progress_tick);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let (terminal, total, completed, files) = {
            let job = lock_job(&job);
            (
                job.status.is_terminal(),
                job.total_episodes,
                job.completed_episodes,
                job_file_paths(&job, &settings),
            )
        };

        let downloaded_bytes = sum_file_sizes(&files).await;
        let byte_reading = byte_rate.update(downloaded_bytes as f64);

        let eta_seconds = if total > 0 {
            if !eta_started {
                episode_eta.start(f64::from(total));
                eta_started = true;
            }
            episode_eta.update(f64::from(completed)).eta_seconds
        } else {
            None
        };

        let snapshot = {
            let mut job = lock_job(&job);
            job.downloaded_bytes = downloaded_bytes;
            job.speed_bps = byte_reading.speed_units_per_sec;
            job.speed_formatted = Some(format_speed(byte_reading.speed_units_per_sec));
            job.eta_seconds = eta_seconds;
            job.eta_formatted = Some(format_time(eta_seconds));
            job.clone()
        };

        if let Err(err) = store.upsert(&snapshot).await {
            warn!(job_id = %snapshot.id, %err, "failed persisting progress snapshot");
        }
        emitter.emit(JobEvent::progress(&snapshot));
        emitter.emit(JobEvent::update(&snapshot));

        if terminal {
            break;
        }
    }
}

/// On-disk paths of the job's downloaded files plus the in-flight one.
fn job_file_paths(job: &Job, settings: &Settings) -> Vec<PathBuf> {
    let series_dir = job
        .series_title
        .as_ref()
        .map_or_else(|| settings.download_dir.clone(), |t| settings.download_dir.join(t));

    let mut paths: Vec<PathBuf> = job
        .downloaded_files
        .iter()
        .map(|name| series_dir.join(name))
        .collect();
    if let Some(current) = &job.current_file {
        paths.push(series_dir.join(current));
    }
    if let Some(merged) = &job.merged_file {
        paths.push(series_dir.join(merged));
    }
    paths
}

async fn sum_file_sizes(paths: &[PathBuf]) -> u64 {
    let mut total = 0;
    for path in paths {
        if let Ok(meta) = tokio::fs::metadata(path).await {
            total += meta.len();
        }
    }
    total
}
