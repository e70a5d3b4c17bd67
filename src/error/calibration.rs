// Calibration error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Calibration error code constants
///
/// Error code range: 2001-2005
pub struct CalibrationErrorCodes {}

impl CalibrationErrorCodes {
    /// Baseline or event log file missing or unreadable
    pub const SOURCE_UNREADABLE: i32 = 2001;

    /// A row could not be parsed
    pub const UNPARSEABLE: i32 = 2002;

    /// Source contained no samples
    pub const EMPTY_BASELINE: i32 = 2003;

    /// Baseline produced zero detections
    pub const NO_DETECTIONS: i32 = 2004;

    /// Reconstructed history does not alternate peak/trough
    pub const NON_ALTERNATING: i32 = 2005;
}

/// Log a calibration error with structured context
///
/// Calibration errors are never fatal, so this is also used right before
/// falling back to fixed thresholds.
pub fn log_calibration_error(err: &CalibrationError, context: &str) {
    error!(
        "Calibration error in {}: code={}, component=BaselineCalibrator, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Calibration-related errors
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// File missing or unreadable
    SourceUnreadable { path: String, reason: String },

    /// Row could not be parsed as numbers
    Unparseable { line: u64, reason: String },

    /// No samples in the baseline
    EmptyBaseline,

    /// Baseline contained samples but no confirmed extrema
    NoDetections { samples: usize },

    /// Two consecutive events of the same kind
    NonAlternating { index: usize },
}

impl ErrorCode for CalibrationError {
    fn code(&self) -> i32 {
        match self {
            CalibrationError::SourceUnreadable { .. } => CalibrationErrorCodes::SOURCE_UNREADABLE,
            CalibrationError::Unparseable { .. } => CalibrationErrorCodes::UNPARSEABLE,
            CalibrationError::EmptyBaseline => CalibrationErrorCodes::EMPTY_BASELINE,
            CalibrationError::NoDetections { .. } => CalibrationErrorCodes::NO_DETECTIONS,
            CalibrationError::NonAlternating { .. } => CalibrationErrorCodes::NON_ALTERNATING,
        }
    }

    fn message(&self) -> String {
        match self {
            CalibrationError::SourceUnreadable { path, reason } => {
                format!("Cannot read calibration source {}: {}", path, reason)
            }
            CalibrationError::Unparseable { line, reason } => {
                format!("Unparseable row on line {}: {}", line, reason)
            }
            CalibrationError::EmptyBaseline => "Baseline recording is empty".to_string(),
            CalibrationError::NoDetections { samples } => {
                format!("Baseline of {} samples yielded no detections", samples)
            }
            CalibrationError::NonAlternating { index } => {
                format!("History event {} repeats the previous kind", index)
            }
        }
    }
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CalibrationError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for CalibrationError {}
