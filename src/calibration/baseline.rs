// BaselineCalibrator - offline pre-pass seeding the live thresholds
//
// Runs the same ExtremaDetector used live over a prior recording and hands
// its final state over as the seed. Any failure degrades to the fallback
// thresholds; calibration never stops a session from starting.

use std::path::Path;

use crate::acquisition::replay::{parse_timestamp, parse_value};
use crate::acquisition::Sample;
use crate::analysis::extrema::ExtremaDetector;
use crate::calibration::state::{CalibrationState, SeedSource};
use crate::config::DetectionConfig;
use crate::error::{log_calibration_error, CalibrationError};

/// Offline calibrator over a baseline recording
#[derive(Debug, Clone)]
pub struct BaselineCalibrator {
    config: DetectionConfig,
    channel: usize,
}

impl BaselineCalibrator {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            config: config.clone(),
            channel: 0,
        }
    }

    /// Read values from `channel` of a multi-channel recording
    pub fn with_channel(mut self, channel: usize) -> Self {
        self.channel = channel;
        self
    }

    /// Run detection over `samples` and capture the resulting seed
    ///
    /// Timestamps are left as recorded; see
    /// [`CalibrationState::aligned_to_session_start`].
    pub fn calibrate(&self, samples: &[Sample]) -> Result<CalibrationState, CalibrationError> {
        if samples.is_empty() {
            return Err(CalibrationError::EmptyBaseline);
        }

        let mut detector = ExtremaDetector::new(&self.config);
        let mut detections = 0usize;
        for &sample in samples {
            detections += detector.process(sample).len();
        }

        if detections == 0 {
            return Err(CalibrationError::NoDetections {
                samples: samples.len(),
            });
        }

        let state = detector.snapshot(SeedSource::Baseline);
        tracing::info!(
            "[BaselineCalibrator] {} detections over {} samples (amplitude {:.4} +/- {:.4}, interval {:.1} +/- {:.1} ms)",
            detections,
            samples.len(),
            state.estimate.amplitude_threshold,
            state.estimate.amplitude_ci,
            state.estimate.interval_threshold,
            state.estimate.interval_ci
        );
        Ok(state)
    }

    pub fn calibrate_file<P: AsRef<Path>>(
        &self,
        path: P,
    ) -> Result<CalibrationState, CalibrationError> {
        let samples = load_baseline_channel(path, self.channel)?;
        self.calibrate(&samples)
    }

    /// Calibrate from `source`, falling back to fixed thresholds on any error
    ///
    /// A successful seed is aligned so the baseline ends one sample period
    /// before the live session starts.
    pub fn calibrate_or_fallback(
        &self,
        source: Option<&Path>,
        sample_period_ms: i64,
    ) -> CalibrationState {
        let result = match source {
            Some(path) => self.calibrate_file(path),
            None => Err(CalibrationError::SourceUnreadable {
                path: "<none>".to_string(),
                reason: "no baseline source configured".to_string(),
            }),
        };

        match result {
            Ok(state) => state.aligned_to_session_start(sample_period_ms),
            Err(err) => {
                log_calibration_error(&err, "baseline calibration");
                log::warn!(
                    "Using fallback thresholds (amplitude {}, interval {} ms)",
                    self.config.fallback_amplitude,
                    self.config.fallback_interval_ms
                );
                CalibrationState::fallback(&self.config)
            }
        }
    }
}

/// Read a two-column `timestamp,value` baseline file
///
/// A non-numeric first row is skipped as a header. Extra columns are ignored.
pub fn load_baseline<P: AsRef<Path>>(path: P) -> Result<Vec<Sample>, CalibrationError> {
    load_baseline_channel(path, 0)
}

/// Read one channel of a `timestamp,ch0,ch1,...` recording
pub fn load_baseline_channel<P: AsRef<Path>>(
    path: P,
    channel: usize,
) -> Result<Vec<Sample>, CalibrationError> {
    let path_display = path.as_ref().display().to_string();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path.as_ref())
        .map_err(|e| CalibrationError::SourceUnreadable {
            path: path_display.clone(),
            reason: e.to_string(),
        })?;

    let mut samples = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let line = index as u64 + 1;
        let record = record.map_err(|e| CalibrationError::SourceUnreadable {
            path: path_display.clone(),
            reason: e.to_string(),
        })?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }

        let timestamp = record.get(0).and_then(parse_timestamp);
        let value = record.get(channel + 1).and_then(parse_value);
        match (timestamp, value) {
            (Some(t), Some(v)) => samples.push(Sample::new(t, v)),
            _ if index == 0 => continue,
            _ => {
                return Err(CalibrationError::Unparseable {
                    line,
                    reason: format!(
                        "expected timestamp and channel {} but found {:?}",
                        channel, record
                    ),
                })
            }
        }
    }

    Ok(samples)
}
