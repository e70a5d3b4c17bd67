// CalibrationState - seed handed from calibration to the live detector
//
// A seed carries the history accumulated so far, the thresholds derived from
// it, and the still-open run of samples. Restoring all three lets live
// detection continue exactly where the calibration pass stopped.
//
// Seeds are serializable so a calibration can be saved to JSON and reused.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::acquisition::Sample;
use crate::analysis::history::HistoryRecord;
use crate::analysis::threshold::{ThresholdEstimate, ThresholdModel};
use crate::config::DetectionConfig;
use crate::error::CalibrationError;
use crate::event_log::read_event_log;

/// Where a seed came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedSource {
    /// Offline pass over a baseline recording
    Baseline,
    /// Detection log of a previous session
    EventLog,
    /// Fixed fallback thresholds, no history
    Fallback,
}

/// Seed for the live detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationState {
    pub history: HistoryRecord,
    pub estimate: ThresholdEstimate,
    /// Open run at the end of calibration, anchor first
    #[serde(default)]
    pub resume_run: Vec<Sample>,
    pub source: SeedSource,
}

impl CalibrationState {
    /// Seed without history; the detector builds its synthetic triplet on the first sample
    pub fn fallback(config: &DetectionConfig) -> Self {
        Self {
            history: HistoryRecord::new(),
            estimate: ThresholdEstimate::from_fallback(config.fallback()),
            resume_run: Vec::new(),
            source: SeedSource::Fallback,
        }
    }

    /// Rebuild a seed from a previous session's detection log
    pub fn from_event_log<P: AsRef<Path>>(
        path: P,
        config: &DetectionConfig,
    ) -> Result<Self, CalibrationError> {
        let history = read_event_log(path)?;
        if history.is_empty() {
            return Err(CalibrationError::NoDetections { samples: 0 });
        }
        let estimate = ThresholdModel::new(config).estimate(&history);
        Ok(Self {
            history,
            estimate,
            resume_run: Vec::new(),
            source: SeedSource::EventLog,
        })
    }

    pub fn is_calibrated(&self) -> bool {
        self.source != SeedSource::Fallback
    }

    /// Timestamp of the most recent sample or event the seed knows about
    pub fn end_timestamp(&self) -> Option<i64> {
        self.resume_run
            .last()
            .map(|s| s.timestamp)
            .or_else(|| self.history.last().map(|e| e.timestamp))
    }

    /// Shift every timestamp by `-offset_ms`
    pub fn rebased(mut self, offset_ms: i64) -> Self {
        self.history = self.history.rebased(offset_ms);
        for sample in &mut self.resume_run {
            sample.timestamp -= offset_ms;
        }
        self
    }

    /// Rebase so the seed ends one sample period before live `t = 0`
    pub fn aligned_to_session_start(self, sample_period_ms: i64) -> Self {
        match self.end_timestamp() {
            Some(end) => self.rebased(end + sample_period_ms),
            None => self,
        }
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(path, json)
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self, CalibrationError> {
        let path_display = path.as_ref().display().to_string();
        let contents =
            fs::read_to_string(path.as_ref()).map_err(|e| CalibrationError::SourceUnreadable {
                path: path_display.clone(),
                reason: e.to_string(),
            })?;
        let state: Self =
            serde_json::from_str(&contents).map_err(|e| CalibrationError::Unparseable {
                line: e.line() as u64,
                reason: e.to_string(),
            })?;
        // Re-check alternation, the file may have been edited by hand
        HistoryRecord::from_events(state.history.events().to_vec())?;
        Ok(state)
    }
}
