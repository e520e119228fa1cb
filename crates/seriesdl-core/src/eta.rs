//! Sliding-window speed/ETA estimation and human-readable formatting.
//!
//! The tracker keeps a fixed-capacity FIFO window of per-interval
//! instantaneous speeds; the reported speed is the arithmetic mean of the
//! window, so a single slow tick does not whipsaw the ETA. Calls with a
//! non-increasing cumulative count (or a zero-length interval) contribute
//! no sample, which keeps negative and zero speeds out of the window.

use std::collections::VecDeque;
use std::time::Instant;

/// Default number of speed samples kept in the window.
pub const DEFAULT_WINDOW: usize = 10;

/// One reading produced by [`EtaTracker::update`].
#[derive(Clone, Debug, PartialEq)]
pub struct EtaReading {
    /// Cumulative units downloaded at the time of the reading.
    pub downloaded_units: f64,
    /// Total units expected.
    pub total_units: f64,
    /// Windowed average speed in units per second.
    pub speed_units_per_sec: f64,
    /// Float progress percentage (0.0 - 100.0); telemetry only, the Job's
    /// persisted progress field uses integer floor.
    pub progress_percent: f64,
    /// Estimated seconds remaining, when the average speed is positive.
    pub eta_seconds: Option<f64>,
    /// Formatted ETA.
    pub eta_formatted: String,
    /// Seconds since `start`.
    pub elapsed_seconds: Option<f64>,
    /// Formatted elapsed time.
    pub elapsed_formatted: String,
}

/// Sliding-window speed estimator.
#[derive(Debug)]
pub struct EtaTracker {
    window: usize,
    samples: VecDeque<f64>,
    started: Option<Instant>,
    last_update: Option<Instant>,
    last_downloaded: f64,
    total_units: f64,
}

impl Default for EtaTracker {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl EtaTracker {
    /// Create a tracker with the given window capacity (minimum 1).
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            samples: VecDeque::with_capacity(window.max(1)),
            started: None,
            last_update: None,
            last_downloaded: 0.0,
            total_units: 0.0,
        }
    }

    /// Reset all state and record the wall-clock start time.
    pub fn start(&mut self, total_units: f64) {
        self.start_at(total_units, Instant::now());
    }

    /// `start` with an explicit clock, for deterministic tests.
    pub fn start_at(&mut self, total_units: f64, now: Instant) {
        self.started = Some(now);
        self.last_update = Some(now);
        self.total_units = total_units;
        self.last_downloaded = 0.0;
        self.samples.clear();
    }

    /// Feed the current cumulative count and read back speed/ETA.
    ///
    /// Idempotent with respect to re-reading the same count: a call with
    /// a non-increasing delta contributes no speed sample.
    pub fn update(&mut self, downloaded_units: f64) -> EtaReading {
        self.update_at(downloaded_units, Instant::now())
    }

    /// `update` with an explicit clock, for deterministic tests.
    pub fn update_at(&mut self, downloaded_units: f64, now: Instant) -> EtaReading {
        let (Some(started), Some(last_update)) = (self.started, self.last_update) else {
            return self.reading(downloaded_units, 0.0, None, None);
        };

        let dt = now.duration_since(last_update).as_secs_f64();
        let du = downloaded_units - self.last_downloaded;

        if dt > 0.0 && du >= 0.0 {
            let speed = du / dt;
            if speed > 0.0 {
                if self.samples.len() == self.window {
                    self.samples.pop_front();
                }
                self.samples.push_back(speed);
            }
        }

        self.last_update = Some(now);
        self.last_downloaded = downloaded_units;

        let avg_speed = if self.samples.is_empty() {
            0.0
        } else {
            self.samples.iter().sum::<f64>() / self.samples.len() as f64
        };
        let remaining = (self.total_units - downloaded_units).max(0.0);
        let eta_seconds = (avg_speed > 0.0).then(|| remaining / avg_speed);
        let elapsed = now.duration_since(started).as_secs_f64();

        self.reading(downloaded_units, avg_speed, eta_seconds, Some(elapsed))
    }

    fn reading(
        &self,
        downloaded_units: f64,
        speed: f64,
        eta_seconds: Option<f64>,
        elapsed_seconds: Option<f64>,
    ) -> EtaReading {
        let progress = if self.total_units > 0.0 {
            (downloaded_units / self.total_units * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };
        EtaReading {
            downloaded_units,
            total_units: self.total_units,
            speed_units_per_sec: speed,
            progress_percent: progress,
            eta_seconds,
            eta_formatted: format_time(eta_seconds),
            elapsed_seconds,
            elapsed_formatted: format_time(elapsed_seconds),
        }
    }
}

/// Format a duration in seconds for display.
///
/// `None`, non-positive, NaN and infinite values render as
/// "Calculating..."; an hour or more as `{hours}h {minutes}m`; otherwise
/// `{minutes:02}:{seconds:02}`.
#[must_use]
pub fn format_time(seconds: Option<f64>) -> String {
    let Some(seconds) = seconds else {
        return "Calculating...".to_string();
    };
    if seconds <= 0.0 || seconds.is_nan() || seconds.is_infinite() {
        return "Calculating...".to_string();
    }
    let total = seconds as u64;
    if total >= 3600 {
        format!("{}h {}m", total / 3600, (total % 3600) / 60)
    } else {
        format!("{:02}:{:02}", total / 60, total % 60)
    }
}

/// Format a byte count using binary (1024-based) units, two decimals.
#[must_use]
pub fn format_bytes(num_bytes: u64) -> String {
    let mut value = num_bytes as f64;
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if value < 1024.0 {
            return format!("{value:.2} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.2} PB")
}

/// Format a throughput in bytes per second. Non-positive values render
/// as "0 B/s".
#[must_use]
pub fn format_speed(bps: f64) -> String {
    if bps <= 0.0 || bps.is_nan() {
        return "0 B/s".to_string();
    }
    format!("{}/s", format_bytes(bps as u64))
}
