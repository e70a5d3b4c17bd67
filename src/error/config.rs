// Configuration error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Configuration error code constants
///
/// Error code range: 4001-4005
pub struct ConfigErrorCodes {}

impl ConfigErrorCodes {
    pub const INVALID_SAMPLE_RATE: i32 = 4001;
    pub const INVALID_CHANNEL: i32 = 4002;
    pub const INVALID_WINDOW: i32 = 4003;
    pub const INVALID_MIN_HISTORY: i32 = 4004;
    pub const INVALID_FALLBACK: i32 = 4005;
}

pub fn log_config_error(err: &ConfigError, context: &str) {
    error!(
        "Configuration error in {}: code={}, component=Config, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Startup configuration errors
///
/// These are fatal and reported before any pipeline stage is launched.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Sample rate must be a positive number of Hz
    InvalidSampleRate { samplerate: u32 },

    /// Channel index outside the sampler's channel range
    InvalidChannel { channel: usize, available: usize },

    /// History window too small to produce a delta
    InvalidWindow { window: usize },

    /// Minimum history for statistical CI must be at least 2
    InvalidMinHistory { min_history: usize },

    /// Fallback thresholds must be finite and positive
    InvalidFallback { reason: String },
}

impl ErrorCode for ConfigError {
    fn code(&self) -> i32 {
        match self {
            ConfigError::InvalidSampleRate { .. } => ConfigErrorCodes::INVALID_SAMPLE_RATE,
            ConfigError::InvalidChannel { .. } => ConfigErrorCodes::INVALID_CHANNEL,
            ConfigError::InvalidWindow { .. } => ConfigErrorCodes::INVALID_WINDOW,
            ConfigError::InvalidMinHistory { .. } => ConfigErrorCodes::INVALID_MIN_HISTORY,
            ConfigError::InvalidFallback { .. } => ConfigErrorCodes::INVALID_FALLBACK,
        }
    }

    fn message(&self) -> String {
        match self {
            ConfigError::InvalidSampleRate { samplerate } => {
                format!("Invalid sample rate {} Hz (must be > 0)", samplerate)
            }
            ConfigError::InvalidChannel { channel, available } => {
                format!(
                    "Channel index {} out of range (sampler has {} channels)",
                    channel, available
                )
            }
            ConfigError::InvalidWindow { window } => {
                format!("History window {} too small (need at least 2)", window)
            }
            ConfigError::InvalidMinHistory { min_history } => {
                format!("Minimum history for CI {} too small (need at least 2)", min_history)
            }
            ConfigError::InvalidFallback { reason } => {
                format!("Invalid fallback thresholds: {}", reason)
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConfigError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for ConfigError {}
