//! Configuration management for the detection pipeline
//!
//! Configuration is loaded once from a JSON file (falling back to defaults),
//! validated, and then shared read-only with every stage. Nothing mutates it
//! after the engine launches.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::analysis::threshold::FallbackThresholds;
use crate::error::ConfigError;

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub baseline: BaselineConfig,
    #[serde(default)]
    pub event_log: EventLogConfig,
}

/// Sampler parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Nominal sample rate in Hz
    pub samplerate: u32,
    /// Channel of interest within each sampler frame (0-based)
    pub channel_index: usize,
    /// Pace file replays at the nominal rate instead of as fast as possible
    #[serde(default)]
    pub realtime_replay: bool,
    /// Write every raw frame to this CSV file (usable as a later baseline)
    #[serde(default)]
    pub record_path: Option<PathBuf>,
    /// Drop samples closer than this to the last accepted one; 0 disables
    #[serde(default)]
    pub min_sample_spacing_ms: u32,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            samplerate: 200,
            channel_index: 0,
            realtime_replay: false,
            record_path: None,
            min_sample_spacing_ms: 0,
        }
    }
}

impl AcquisitionConfig {
    /// Nominal spacing between samples in milliseconds
    pub fn sample_period_ms(&self) -> i64 {
        if self.samplerate == 0 {
            return 0;
        }
        (1000.0 / self.samplerate as f64).round() as i64
    }
}

/// Threshold model parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Number of most recent history records used for statistics (K)
    pub history_window: usize,
    /// Below this many records the CI is half the threshold
    pub min_history_for_ci: usize,
    /// Amplitude threshold used before any history exists
    pub fallback_amplitude: f64,
    /// Interval threshold (ms) used before any history exists
    pub fallback_interval_ms: f64,
    /// Longest open run kept in memory while no extremum confirms
    #[serde(default = "default_max_run_samples")]
    pub max_run_samples: usize,
}

fn default_max_run_samples() -> usize {
    60_000
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            history_window: 20,
            min_history_for_ci: 20,
            fallback_amplitude: 0.5,
            fallback_interval_ms: 500.0,
            max_run_samples: default_max_run_samples(),
        }
    }
}

impl DetectionConfig {
    pub fn fallback(&self) -> FallbackThresholds {
        FallbackThresholds {
            amplitude: self.fallback_amplitude,
            interval_ms: self.fallback_interval_ms,
        }
    }
}

/// Baseline calibration parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaselineConfig {
    pub enabled: bool,
    #[serde(default)]
    pub source_path: Option<PathBuf>,
}

/// What to do when the event log cannot be written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFailurePolicy {
    /// Warn, keep the event in memory and retry on the next write
    #[default]
    Buffer,
    /// Stop the whole pipeline through the shutdown path
    Fatal,
}

/// Event logger parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub failure_policy: LogFailurePolicy,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("default_peak_data.csv"),
            failure_policy: LogFailurePolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from JSON file
    ///
    /// # Returns
    /// The parsed configuration, or defaults if the file doesn't exist or the
    /// JSON is invalid. Call [`PipelineConfig::validate`] afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the conventional location
    pub fn load() -> Self {
        Self::load_from_file("config/rtpeaks.json")
    }

    /// Reject values that would make the pipeline misbehave
    ///
    /// The channel index can only be checked against a concrete sampler, see
    /// [`PipelineConfig::validate_channel`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.acquisition.samplerate == 0 {
            return Err(ConfigError::InvalidSampleRate {
                samplerate: self.acquisition.samplerate,
            });
        }
        if self.detection.history_window < 2 {
            return Err(ConfigError::InvalidWindow {
                window: self.detection.history_window,
            });
        }
        if self.detection.min_history_for_ci < 2 {
            return Err(ConfigError::InvalidMinHistory {
                min_history: self.detection.min_history_for_ci,
            });
        }
        let fallback = self.detection.fallback();
        if !(fallback.amplitude.is_finite() && fallback.amplitude > 0.0) {
            return Err(ConfigError::InvalidFallback {
                reason: format!("amplitude {} must be > 0", fallback.amplitude),
            });
        }
        if !(fallback.interval_ms.is_finite() && fallback.interval_ms > 0.0) {
            return Err(ConfigError::InvalidFallback {
                reason: format!("interval {} ms must be > 0", fallback.interval_ms),
            });
        }
        Ok(())
    }

    pub fn validate_channel(&self, available: usize) -> Result<(), ConfigError> {
        if self.acquisition.channel_index >= available {
            return Err(ConfigError::InvalidChannel {
                channel: self.acquisition.channel_index,
                available,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.acquisition.samplerate, 200);
        assert_eq!(config.acquisition.sample_period_ms(), 5);
        assert_eq!(config.detection.history_window, 20);
        assert_eq!(config.detection.min_history_for_ci, 20);
        assert!(!config.baseline.enabled);
        assert_eq!(config.event_log.failure_policy, LogFailurePolicy::Buffer);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_roundtrip() {
        let mut config = PipelineConfig::default();
        config.event_log.failure_policy = LogFailurePolicy::Fatal;
        config.baseline.source_path = Some(PathBuf::from("baseline.csv"));
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: PipelineConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.event_log.failure_policy, LogFailurePolicy::Fatal);
        assert_eq!(
            parsed.baseline.source_path,
            Some(PathBuf::from("baseline.csv"))
        );
    }

    #[test]
    fn test_partial_json_uses_section_defaults() {
        let parsed: PipelineConfig =
            serde_json::from_str(r#"{"acquisition": {"samplerate": 1000, "channel_index": 2}}"#)
                .unwrap();
        assert_eq!(parsed.acquisition.samplerate, 1000);
        assert_eq!(parsed.acquisition.channel_index, 2);
        assert_eq!(parsed.detection.history_window, 20);
        assert_eq!(parsed.detection.max_run_samples, 60_000);
        assert_eq!(parsed.acquisition.record_path, None);
        assert_eq!(parsed.acquisition.min_sample_spacing_ms, 0);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = PipelineConfig::load_from_file("/definitely/not/here.json");
        assert_eq!(config.acquisition.samplerate, 200);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = PipelineConfig::default();
        config.acquisition.samplerate = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSampleRate { .. })
        ));

        let mut config = PipelineConfig::default();
        config.detection.history_window = 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidWindow { window: 1 })
        ));

        let mut config = PipelineConfig::default();
        config.detection.fallback_amplitude = -1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidFallback { .. })
        ));

        let config = PipelineConfig::default();
        assert!(config.validate_channel(1).is_ok());
        assert!(matches!(
            config.validate_channel(0),
            Err(ConfigError::InvalidChannel { .. })
        ));
    }
}
