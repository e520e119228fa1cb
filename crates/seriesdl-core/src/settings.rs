//! Runtime settings for the job pipeline.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Settings validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    /// The download directory is empty.
    #[error("Download directory must not be empty")]
    EmptyDownloadDir,

    /// The database path is empty.
    #[error("Database path must not be empty")]
    EmptyDatabasePath,

    /// The progress tick is zero.
    #[error("Progress tick must be greater than zero")]
    ZeroProgressTick,

    /// The speed window is zero.
    #[error("Speed window must be greater than zero")]
    ZeroSpeedWindow,
}

/// Process-wide settings, distinct from per-job [`JobConfig`].
///
/// [`JobConfig`]: crate::job::JobConfig
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root directory job downloads are written under.
    pub download_dir: PathBuf,
    /// SQLite database file path.
    pub database_path: PathBuf,
    /// Interval between progress loop ticks.
    #[serde(with = "duration_secs")]
    pub progress_tick: Duration,
    /// Sample window of the byte-rate estimator.
    pub speed_window: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads"),
            database_path: PathBuf::from("data/jobs.db"),
            progress_tick: Duration::from_secs(1),
            speed_window: 8,
        }
    }
}

impl Settings {
    /// Check the settings for values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.download_dir.as_os_str().is_empty() {
            return Err(SettingsError::EmptyDownloadDir);
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(SettingsError::EmptyDatabasePath);
        }
        if self.progress_tick.is_zero() {
            return Err(SettingsError::ZeroProgressTick);
        }
        if self.speed_window == 0 {
            return Err(SettingsError::ZeroSpeedWindow);
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.progress_tick, Duration::from_secs(1));
        assert_eq!(settings.speed_window, 8);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let settings = Settings {
            download_dir: PathBuf::new(),
            ..Settings::default()
        };
        assert_eq!(settings.validate(), Err(SettingsError::EmptyDownloadDir));

        let settings = Settings {
            speed_window: 0,
            ..Settings::default()
        };
        assert_eq!(settings.validate(), Err(SettingsError::ZeroSpeedWindow));
    }

    #[test]
    fn settings_round_trip_through_json() {
        let settings = Settings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.progress_tick, settings.progress_tick);
        assert_eq!(back.download_dir, settings.download_dir);
    }
}
