//! Acquisition configuration using Figment
//!
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Built-in defaults (10 Hz, `sensor_data.csv`, the five-sensor array)
//! 2. An optional TOML file
//! 3. Environment variables prefixed with `SENSOR_DAQ_` (nested keys use `__`)
//!
//! # Example
//! ```no_run
//! use sensor_daq::config::AcquisitionConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AcquisitionConfig::load_from("config/sensor_daq.toml")?;
//! config.validate()?;
//! println!("Sampling at {} Hz into {}", config.sample_rate_hz, config.log_path.display());
//! # Ok(())
//! # }
//! ```

use crate::channel::Channel;
use crate::error::{SensorError, SensorResult};
use crate::scheduler::{SchedulerConfig, DEFAULT_DRIFT_THRESHOLD, DEFAULT_STATS_INTERVAL};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "SENSOR_DAQ_";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Pretty-printed format with colors (for development)
    #[default]
    Pretty,
    /// Compact single-line format (for constrained consoles)
    Compact,
    /// JSON lines (for log aggregation)
    Json,
}

/// Top-level acquisition configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Target sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate_hz: f64,
    /// CSV log file
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
    /// Tolerated tick overrun as a fraction of the interval
    #[serde(default = "default_drift_threshold")]
    pub drift_threshold: f64,
    /// Samples between achieved-rate reports
    #[serde(default = "default_stats_interval")]
    pub stats_interval: u64,
    /// Samples between reading dumps at debug level
    #[serde(default = "default_display_interval")]
    pub display_interval: u64,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Logging output format
    #[serde(default)]
    pub log_format: LogFormat,
    /// Consecutive read failures that end the session (unset = never)
    #[serde(default)]
    pub max_consecutive_read_errors: Option<u32>,
    /// Consecutive storage failures that end the session (unset = never)
    #[serde(default)]
    pub max_consecutive_storage_errors: Option<u32>,
    /// Channels in log column order
    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelDefinition>,
}

/// Channel declaration in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDefinition {
    /// Unique channel id, used as column header
    pub id: String,
    /// Sensor position in the array
    pub coordinates: (f64, f64),
}

impl From<&ChannelDefinition> for Channel {
    fn from(def: &ChannelDefinition) -> Self {
        Channel::new(def.id.clone(), def.coordinates)
    }
}

// Default value functions
fn default_sample_rate() -> f64 {
    10.0
}

fn default_log_path() -> PathBuf {
    PathBuf::from("sensor_data.csv")
}

fn default_drift_threshold() -> f64 {
    DEFAULT_DRIFT_THRESHOLD
}

fn default_stats_interval() -> u64 {
    DEFAULT_STATS_INTERVAL
}

fn default_display_interval() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_channels() -> Vec<ChannelDefinition> {
    [
        ("azul", (0.2, 0.0)),
        ("verde", (0.0, 1.0)),
        ("amarillo", (0.47, 0.6)),
        ("naranja", (0.8, 0.0)),
        ("rojo", (1.0, 1.0)),
    ]
    .into_iter()
    .map(|(id, coordinates)| ChannelDefinition {
        id: id.to_string(),
        coordinates,
    })
    .collect()
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: default_sample_rate(),
            log_path: default_log_path(),
            drift_threshold: default_drift_threshold(),
            stats_interval: default_stats_interval(),
            display_interval: default_display_interval(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            max_consecutive_read_errors: None,
            max_consecutive_storage_errors: None,
            channels: default_channels(),
        }
    }
}

impl AcquisitionConfig {
    /// Defaults overridden by environment variables
    pub fn load() -> SensorResult<Self> {
        Ok(Self::figment(None).extract()?)
    }

    /// Defaults overridden by a TOML file, then by environment variables
    ///
    /// A missing file is not an error; its layer is simply empty.
    pub fn load_from<P: AsRef<Path>>(path: P) -> SensorResult<Self> {
        Ok(Self::figment(Some(path.as_ref())).extract()?)
    }

    fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(AcquisitionConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    ///
    /// # Errors
    /// `SensorError::Config` describing the first problem found.
    pub fn validate(&self) -> SensorResult<()> {
        self.scheduler_config()?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(SensorError::Config(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.log_path.as_os_str().is_empty() {
            return Err(SensorError::Config("log_path cannot be empty".into()));
        }

        if self.display_interval == 0 {
            return Err(SensorError::Config(
                "display_interval must be at least one sample".into(),
            ));
        }

        if self.channels.is_empty() {
            return Err(SensorError::Config(
                "at least one channel must be configured".into(),
            ));
        }
        let mut ids = HashSet::new();
        for channel in &self.channels {
            if !ids.insert(channel.id.as_str()) {
                return Err(SensorError::Config(format!(
                    "Duplicate channel id: {}",
                    channel.id
                )));
            }
        }

        Ok(())
    }

    /// Pacing parameters for the scheduler
    pub fn scheduler_config(&self) -> SensorResult<SchedulerConfig> {
        SchedulerConfig::new(self.sample_rate_hz)?
            .with_drift_threshold(self.drift_threshold)?
            .with_stats_interval(self.stats_interval)
    }

    /// Channel descriptions in column order
    pub fn channel_list(&self) -> Vec<Channel> {
        self.channels.iter().map(Channel::from).collect()
    }
}
