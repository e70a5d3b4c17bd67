// Calibration module - seeding the adaptive thresholds before a session
//
// Two components:
// 1. BaselineCalibrator: runs detection offline over a prior recording
// 2. CalibrationState: the seed (history, thresholds, open run) it produces
//
// A seed can also be rebuilt from an earlier detection log, or fall back to
// fixed thresholds when nothing usable is available.

pub mod baseline;
pub mod state;

pub use baseline::{load_baseline, load_baseline_channel, BaselineCalibrator};
pub use state::{CalibrationState, SeedSource};
