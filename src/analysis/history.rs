// Detection events and the append-only history they accumulate into
//
// HistoryRecord is the single source of truth for threshold statistics. Kinds
// strictly alternate; the detector guarantees this by construction, and
// histories built from external data (re-read logs) are checked on entry.

use serde::{Deserialize, Serialize};

use crate::acquisition::Sample;
use crate::error::CalibrationError;

/// Direction of a confirmed extremum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtremumKind {
    Peak,
    Trough,
}

impl ExtremumKind {
    /// The kind expected after this one
    pub fn opposite(self) -> Self {
        match self {
            ExtremumKind::Peak => ExtremumKind::Trough,
            ExtremumKind::Trough => ExtremumKind::Peak,
        }
    }

    /// Whether `value` lies strictly beyond `reference` in this direction
    pub fn exceeds(self, value: f64, reference: f64) -> bool {
        match self {
            ExtremumKind::Peak => value > reference,
            ExtremumKind::Trough => value < reference,
        }
    }
}

/// Whether a detection arrived early enough to drive the trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeliness {
    /// Confirmation lag of at most one sample
    Immediate,
    Delayed,
}

impl Timeliness {
    pub fn from_lag(lag: u32) -> Self {
        if lag <= 1 {
            Timeliness::Immediate
        } else {
            Timeliness::Delayed
        }
    }
}

/// A confirmed peak or trough
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub kind: ExtremumKind,
    /// Milliseconds since session start of the extremum sample
    pub timestamp: i64,
    pub value: f64,
    pub timely: Timeliness,
    /// Samples received after the extremum up to and including the confirming one
    pub lag: u32,
}

impl DetectionEvent {
    pub fn new(kind: ExtremumKind, sample: Sample, lag: u32) -> Self {
        Self {
            kind,
            timestamp: sample.timestamp,
            value: sample.value,
            timely: Timeliness::from_lag(lag),
            lag,
        }
    }

    /// Only immediate peaks are allowed to fire the external trigger
    pub fn fires_trigger(&self) -> bool {
        self.kind == ExtremumKind::Peak && self.timely == Timeliness::Immediate
    }

    pub fn sample(&self) -> Sample {
        Sample::new(self.timestamp, self.value)
    }
}

/// Append-only, strictly alternating sequence of confirmed extrema
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    events: Vec<DetectionEvent>,
}

impl HistoryRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a history from external events, rejecting repeated kinds
    pub fn from_events(events: Vec<DetectionEvent>) -> Result<Self, CalibrationError> {
        if let Some(index) = events
            .windows(2)
            .position(|pair| pair[0].kind == pair[1].kind)
        {
            return Err(CalibrationError::NonAlternating { index: index + 1 });
        }
        Ok(Self { events })
    }

    /// Append an event confirmed by the detector
    pub(crate) fn record(&mut self, event: DetectionEvent) {
        debug_assert!(
            self.last().map(|last| last.kind != event.kind).unwrap_or(true),
            "history kinds must alternate"
        );
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn last(&self) -> Option<&DetectionEvent> {
        self.events.last()
    }

    pub fn events(&self) -> &[DetectionEvent] {
        &self.events
    }

    /// The most recent `k` events, oldest first
    pub fn window(&self, k: usize) -> &[DetectionEvent] {
        let start = self.events.len().saturating_sub(k);
        &self.events[start..]
    }

    /// Shift every timestamp by `-offset_ms`
    pub fn rebased(mut self, offset_ms: i64) -> Self {
        for event in &mut self.events {
            event.timestamp -= offset_ms;
        }
        self
    }
}
