//! Runtime configuration.
//!
//! Everything has a default, so a configuration file only needs to list what it changes:
//!
//! ```json
//! { "tracker": { "capacity": 2 }, "recorder": { "album": "Warps" } }
//! ```

use std::{
    env, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::tracker::TrackerOptions;

/// Environment variable holding the path of the configuration file.
pub const CONFIG_ENV: &str = "FACEWARP_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration from '{}': {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid configuration in '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tracker: TrackerConfig,
    pub calibration: CalibrationConfig,
    pub pipeline: PipelineConfig,
    pub recorder: RecorderConfig,
    pub paths: PathConfig,
}

impl Config {
    /// Loads the configuration from the file named by `FACEWARP_CONFIG`, or returns the defaults
    /// if the variable is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_path(path),
            None => {
                log::debug!("{CONFIG_ENV} not set, using default configuration");
                Ok(Self::default())
            }
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("loaded configuration from '{}'", path.display());
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Identity matching parameters, see [`FaceTracker`](crate::tracker::FaceTracker).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Largest summed landmark distance (in upright pixels) that still counts as the same face.
    pub threshold: f32,
    pub capacity: usize,
    /// Seconds after which an identity that was not seen is forgotten.
    pub staleness_secs: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            threshold: 1000.0,
            capacity: 6,
            staleness_secs: 10.0,
        }
    }
}

impl TrackerConfig {
    pub fn options(&self) -> TrackerOptions {
        TrackerOptions::default()
            .threshold(self.threshold)
            .capacity(self.capacity)
            .staleness(Duration::from_secs_f32(self.staleness_secs.max(0.0)))
    }
}

/// Timing of the calibration flow. All values are seconds since sampling started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Frames before this point are not sampled, giving the user time to settle.
    pub sample_after: f32,
    /// Calibration finishes at this point.
    pub finish_after: f32,
    /// The countdown shown to the user reaches zero at this point.
    pub countdown_to: f32,
    /// How long the device may leave portrait orientation before calibration is aborted.
    pub grace: f32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            sample_after: 2.0,
            finish_after: 5.5,
            countdown_to: 5.0,
            grace: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Downsampling factor of the blur targets.
    pub shrink: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { shrink: 4 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Number of samples each append queue buffers before dropping.
    pub queue_capacity: usize,
    /// Media-library collection that recordings are filed into.
    pub album: String,
    /// Target video bitrate in bits per second.
    pub video_bitrate: u32,
    pub audio_bitrate: u32,
    pub audio_sample_rate: u32,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 8,
            album: "facewarp".into(),
            video_bitrate: 4_000_000,
            audio_bitrate: 64_000,
            audio_sample_rate: 44_100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// File holding the persisted calibration scales.
    pub store: PathBuf,
    /// Root directory of the media library.
    pub library: PathBuf,
    /// File that recordings are written to before they are imported.
    pub recording: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        let base = env::temp_dir().join("facewarp");
        Self {
            store: base.join("scales.json"),
            library: base.join("library"),
            recording: base.join("recording.mp4"),
        }
    }
}
