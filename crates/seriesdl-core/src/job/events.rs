//! Job events - discriminated union pushed to the progress/event sink.
//!
//! Delivery is fire-and-forget, at-least-once; consumers must tolerate
//! duplicate and stale updates.

use serde::{Deserialize, Serialize};

use super::types::{Job, JobId};

/// Single discriminated union for all job events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// Full snapshot of a job's mutable state.
    JobUpdate {
        /// The snapshot.
        job: Box<Job>,
    },

    /// Lightweight progress ping for UI tickers.
    ProgressUpdate {
        /// The job this update belongs to.
        job_id: JobId,
        /// Integer progress percentage.
        progress: u8,
        /// Formatted throughput ("1.50 KB/s", "0 B/s").
        speed: String,
        /// Formatted ETA ("05:30", "Calculating...").
        eta: String,
    },
}

impl JobEvent {
    /// Create a full-snapshot event.
    #[must_use]
    pub fn update(job: &Job) -> Self {
        Self::JobUpdate {
            job: Box::new(job.clone()),
        }
    }

    /// Create a progress ping from a job's current fields.
    #[must_use]
    pub fn progress(job: &Job) -> Self {
        Self::ProgressUpdate {
            job_id: job.id,
            progress: job.progress,
            speed: job
                .speed_formatted
                .clone()
                .unwrap_or_else(|| "0 B/s".to_string()),
            eta: job
                .eta_formatted
                .clone()
                .unwrap_or_else(|| "Calculating...".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobConfig;

    #[test]
    fn progress_event_defaults_speed_and_eta() {
        let job = Job::new(3, "u", JobConfig::default());
        match JobEvent::progress(&job) {
            JobEvent::ProgressUpdate {
                job_id, speed, eta, ..
            } => {
                assert_eq!(job_id, 3);
                assert_eq!(speed, "0 B/s");
                assert_eq!(eta, "Calculating...");
            }
            JobEvent::JobUpdate { .. } => panic!("expected progress event"),
        }
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let job = Job::new(1, "u", JobConfig::default());
        let json = serde_json::to_string(&JobEvent::update(&job)).unwrap();
        assert!(json.contains("\"type\":\"job_update\""));
        let json = serde_json::to_string(&JobEvent::progress(&job)).unwrap();
        assert!(json.contains("\"type\":\"progress_update\""));
    }
}
