// ExtremaDetector - real-time peak/trough confirmation
//
// The detector keeps a "current run" of samples that always starts at the last
// confirmed extremum (the anchor). Each new sample extends the run, then:
//
// 1. Track the candidate: the run's maximum (expecting a peak) or minimum
//    (expecting a trough) after the anchor, earliest index on ties.
// 2. Require a strict reversal: the latest sample lies strictly below the
//    peak candidate / above the trough candidate.
// 3. Require the swing from the anchor's value to the candidate to reach the
//    confirmation floor from the ThresholdModel (amplitude_threshold -
//    amplitude_ci, shrunk by the long-wait guard).
// 4. Confirm, append to history, re-estimate thresholds, truncate the run to
//    start at the confirmed sample, flip the expected kind and try again.
//
// Samples between the anchor and the candidate are dropped as soon as a new
// candidate appears; only the anchor, the candidate and what follows it can
// matter. The candidate is updated incrementally, so a sample costs O(1)
// unless it confirms an event.

use crate::acquisition::Sample;
use crate::analysis::history::{DetectionEvent, ExtremumKind, HistoryRecord};
use crate::analysis::threshold::{ThresholdEstimate, ThresholdModel};
use crate::calibration::state::{CalibrationState, SeedSource};
use crate::config::DetectionConfig;

const INITIAL_RUN_CAPACITY: usize = 1024;
const MIN_RUN_LIMIT: usize = 8;

/// Streaming peak/trough detector with adaptive thresholds
#[derive(Debug, Clone)]
pub struct ExtremaDetector {
    model: ThresholdModel,
    history: HistoryRecord,
    estimate: ThresholdEstimate,
    /// Anchor first, then the candidate and every sample after it
    run: Vec<Sample>,
    candidate: Option<usize>,
    /// Samples after the candidate dropped by the run limit
    trimmed: usize,
    max_run: usize,
    expected: ExtremumKind,
    confirmed: Vec<DetectionEvent>,
    samples_processed: u64,
    pending_alignment: Option<i64>,
}

impl ExtremaDetector {
    /// Create an unseeded detector
    ///
    /// The first sample seeds a synthetic trough/peak/trough triplet built from
    /// the fallback thresholds, so the initial estimate equals the fallback.
    pub fn new(config: &DetectionConfig) -> Self {
        let model = ThresholdModel::new(config);
        let estimate = ThresholdEstimate::from_fallback(model.fallback());
        let max_run = config.max_run_samples.max(MIN_RUN_LIMIT);
        Self {
            model,
            history: HistoryRecord::new(),
            estimate,
            run: Vec::with_capacity(INITIAL_RUN_CAPACITY.min(max_run)),
            candidate: None,
            trimmed: 0,
            max_run,
            expected: ExtremumKind::Peak,
            confirmed: Vec::with_capacity(4),
            samples_processed: 0,
            pending_alignment: None,
        }
    }

    /// Create a detector continuing from an existing history
    pub fn with_history(config: &DetectionConfig, history: HistoryRecord) -> Self {
        let mut detector = Self::new(config);
        if let Some(anchor) = history.last().copied() {
            detector.expected = anchor.kind.opposite();
            detector.run.push(anchor.sample());
            detector.estimate = detector.model.estimate(&history);
            detector.history = history;
        }
        detector
    }

    /// Create a detector resuming from a calibration seed
    pub fn from_calibration(config: &DetectionConfig, state: CalibrationState) -> Self {
        let CalibrationState {
            history,
            resume_run,
            ..
        } = state;
        let mut detector = Self::with_history(config, history);
        if !detector.history.is_empty() && !resume_run.is_empty() {
            detector.run.clear();
            detector.run.extend_from_slice(&resume_run);
            detector.rescan_candidate();
        }
        detector
    }

    /// Rebase the seed on the first live sample
    ///
    /// Before that sample is processed, the history and open run are shifted
    /// so the seed's last sample sits `sample_period_ms` before it. Without a
    /// seed this does nothing.
    pub fn align_on_first_sample(mut self, sample_period_ms: i64) -> Self {
        self.pending_alignment = Some(sample_period_ms);
        self
    }

    /// Feed one sample; returns the events it confirmed (usually none)
    pub fn process(&mut self, sample: Sample) -> &[DetectionEvent] {
        self.confirmed.clear();
        self.samples_processed += 1;

        if let Some(period) = self.pending_alignment.take() {
            self.align_seed(sample.timestamp - period);
        }

        if self.history.is_empty() {
            self.seed_synthetic(sample);
            return &self.confirmed;
        }

        self.extend_run(sample);
        while let Some(event) = self.try_confirm() {
            self.confirmed.push(event);
        }
        &self.confirmed
    }

    pub fn estimate(&self) -> &ThresholdEstimate {
        &self.estimate
    }

    pub fn history(&self) -> &HistoryRecord {
        &self.history
    }

    pub fn expected_kind(&self) -> ExtremumKind {
        self.expected
    }

    pub fn samples_processed(&self) -> u64 {
        self.samples_processed
    }

    /// Samples held in the open run, anchor included
    pub fn run_len(&self) -> usize {
        self.run.len()
    }

    /// Capture everything needed to resume detection elsewhere
    pub fn snapshot(&self, source: SeedSource) -> CalibrationState {
        CalibrationState {
            history: self.history.clone(),
            estimate: self.estimate,
            resume_run: self.run.clone(),
            source,
        }
    }

    fn seed_synthetic(&mut self, first: Sample) {
        let fallback = self.model.fallback();
        let step = (2.0 * fallback.interval_ms).round() as i64;
        let swing = 2.0 * fallback.amplitude;

        let seed = [
            (ExtremumKind::Trough, first.timestamp - 2 * step, first.value),
            (ExtremumKind::Peak, first.timestamp - step, first.value + swing),
            (ExtremumKind::Trough, first.timestamp, first.value),
        ];
        for (kind, timestamp, value) in seed {
            self.history
                .record(DetectionEvent::new(kind, Sample::new(timestamp, value), 0));
        }

        self.run.clear();
        self.run.push(first);
        self.candidate = None;
        self.trimmed = 0;
        self.expected = ExtremumKind::Peak;
        self.estimate = self.model.estimate(&self.history);
        tracing::debug!(
            "[ExtremaDetector] Seeded synthetic history at t={} (amplitude {:.4}, interval {:.1} ms)",
            first.timestamp,
            self.estimate.amplitude_threshold,
            self.estimate.interval_threshold
        );
    }

    /// Shift the seed so its last sample sits at `end`
    fn align_seed(&mut self, end: i64) {
        if self.history.is_empty() {
            return;
        }
        let Some(current) = self.run.last().map(|s| s.timestamp) else {
            return;
        };
        let offset = current - end;
        if offset == 0 {
            return;
        }

        self.history = std::mem::take(&mut self.history).rebased(offset);
        for sample in &mut self.run {
            sample.timestamp -= offset;
        }
        tracing::debug!(
            "[ExtremaDetector] Rebased seed by {} ms to end at t={}",
            -offset,
            end
        );
    }

    fn extend_run(&mut self, sample: Sample) {
        let is_new_candidate = match self.candidate {
            None => true,
            Some(index) => self
                .expected
                .exceeds(sample.value, self.run[index].value),
        };

        if is_new_candidate {
            self.run.truncate(1);
            self.run.push(sample);
            self.candidate = Some(1);
            self.trimmed = 0;
            return;
        }

        self.run.push(sample);
        if self.run.len() > self.max_run {
            self.trim_run();
        }
    }

    /// Drop the oldest samples after the candidate, keeping the latest one
    fn trim_run(&mut self) {
        let Some(index) = self.candidate else {
            return;
        };
        let after_candidate = self.run.len() - index - 1;
        let drop = (self.max_run / 4).max(1).min(after_candidate.saturating_sub(1));
        if drop == 0 {
            return;
        }
        self.run.drain(index + 1..index + 1 + drop);
        self.trimmed += drop;
        tracing::warn!(
            "[ExtremaDetector] No {:?} confirmed for {} samples, dropped {} from the open run",
            self.expected,
            self.run.len() - index - 1 + self.trimmed,
            drop
        );
    }

    /// Recompute the candidate from scratch and drop what precedes it
    fn rescan_candidate(&mut self) {
        let mut best: Option<usize> = None;
        for index in 1..self.run.len() {
            let better = match best {
                None => true,
                Some(b) => self.expected.exceeds(self.run[index].value, self.run[b].value),
            };
            if better {
                best = Some(index);
            }
        }

        match best {
            Some(index) => {
                self.run.drain(1..index);
                self.candidate = Some(1);
            }
            None => self.candidate = None,
        }
    }

    fn try_confirm(&mut self) -> Option<DetectionEvent> {
        let index = self.candidate?;
        // The candidate needs at least one sample after it to show a reversal
        if index + 1 >= self.run.len() {
            return None;
        }
        let anchor = self.run[0];
        let candidate = self.run[index];
        let latest = *self.run.last()?;

        if !self.expected.exceeds(candidate.value, latest.value) {
            return None;
        }

        let swing = match self.expected {
            ExtremumKind::Peak => candidate.value - anchor.value,
            ExtremumKind::Trough => anchor.value - candidate.value,
        };
        let anchor_timestamp = self.history.last()?.timestamp;
        let floor = self
            .estimate
            .confirmation_floor(latest.timestamp - anchor_timestamp);
        if !(swing > 0.0 && swing >= floor) {
            return None;
        }

        let lag = (self.run.len() - 1 - index + self.trimmed) as u32;
        let event = DetectionEvent::new(self.expected, candidate, lag);

        self.history.record(event);
        self.estimate = self.model.estimate(&self.history);
        self.run.drain(..index);
        self.expected = self.expected.opposite();
        self.trimmed = 0;
        self.rescan_candidate();

        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::history::Timeliness;

    fn config() -> DetectionConfig {
        DetectionConfig {
            history_window: 20,
            min_history_for_ci: 20,
            fallback_amplitude: 0.2,
            fallback_interval_ms: 50.0,
            ..DetectionConfig::default()
        }
    }

    fn seed_history() -> HistoryRecord {
        HistoryRecord::from_events(vec![
            DetectionEvent::new(ExtremumKind::Trough, Sample::new(0, 0.0), 1),
            DetectionEvent::new(ExtremumKind::Peak, Sample::new(10, 1.0), 1),
            DetectionEvent::new(ExtremumKind::Trough, Sample::new(20, 0.0), 1),
        ])
        .unwrap()
    }

    fn feed(detector: &mut ExtremaDetector, samples: &[(i64, f64)]) -> Vec<DetectionEvent> {
        let mut events = Vec::new();
        for &(t, v) in samples {
            events.extend_from_slice(detector.process(Sample::new(t, v)));
        }
        events
    }

    #[test]
    fn test_seeded_scenario_confirms_peak_then_trough() {
        let mut detector = ExtremaDetector::with_history(&config(), seed_history());

        assert!(detector.process(Sample::new(30, 1.0)).is_empty());
        assert!(detector.process(Sample::new(40, 2.0)).is_empty());

        let events = detector.process(Sample::new(50, 1.0)).to_vec();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ExtremumKind::Peak);
        assert_eq!((events[0].timestamp, events[0].value), (40, 2.0));
        assert_eq!(events[0].lag, 1);
        assert_eq!(events[0].timely, Timeliness::Immediate);
        assert!(events[0].fires_trigger());

        assert!(detector.process(Sample::new(60, 0.0)).is_empty());
        let events = detector.process(Sample::new(70, 1.0)).to_vec();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ExtremumKind::Trough);
        assert_eq!((events[0].timestamp, events[0].value), (60, 0.0));
        assert_eq!(events[0].timely, Timeliness::Immediate);

        assert_eq!(detector.history().len(), 5);
        assert_eq!(detector.expected_kind(), ExtremumKind::Peak);
    }

    #[test]
    fn test_first_sample_seeds_fallback_history() {
        let mut detector = ExtremaDetector::new(&config());
        assert!(detector.process(Sample::new(0, 0.3)).is_empty());

        assert_eq!(detector.history().len(), 3);
        assert_eq!(detector.expected_kind(), ExtremumKind::Peak);
        assert_eq!(detector.estimate().amplitude_threshold, 0.2);
        assert_eq!(detector.estimate().interval_threshold, 50.0);
        assert_eq!(detector.run_len(), 1);
    }

    #[test]
    fn test_monotonic_rise_never_confirms() {
        let mut detector = ExtremaDetector::with_history(&config(), seed_history());
        let rising: Vec<(i64, f64)> = (3..40).map(|i| (i * 10, i as f64)).collect();
        assert!(feed(&mut detector, &rising).is_empty());
    }

    #[test]
    fn test_flat_top_waits_for_strict_drop_and_picks_earliest() {
        let mut detector = ExtremaDetector::with_history(&config(), seed_history());
        let events = feed(
            &mut detector,
            &[(30, 1.0), (40, 2.0), (50, 2.0), (60, 2.0)],
        );
        assert!(events.is_empty());

        let events = feed(&mut detector, &[(70, 1.5)]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timestamp, 40);
        assert_eq!(events[0].lag, 3);
        assert_eq!(events[0].timely, Timeliness::Delayed);
        assert!(!events[0].fires_trigger());
    }

    #[test]
    fn test_small_wiggle_below_floor_is_ignored() {
        // Quick successive samples keep the long-wait guard inactive
        let mut detector = ExtremaDetector::with_history(&config(), seed_history());
        // floor = 0.5 - 0.25 = 0.25 while elapsed <= 7.5 ms
        let events = feed(&mut detector, &[(21, 0.1), (22, 0.05)]);
        assert!(events.is_empty());

        let events = feed(&mut detector, &[(23, 0.6), (24, 0.5)]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timestamp, 23);
    }

    #[test]
    fn test_long_wait_lowers_floor() {
        let mut detector = ExtremaDetector::with_history(&config(), seed_history());
        // Same small wiggle, but far beyond the 7.5 ms interval limit
        let events = feed(&mut detector, &[(200, 0.1), (210, 0.05)]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ExtremumKind::Peak);
        assert_eq!(events[0].timestamp, 200);
    }

    #[test]
    fn test_kinds_alternate_on_noisy_signal() {
        let mut detector = ExtremaDetector::new(&config());
        let samples: Vec<(i64, f64)> = (0..2_000)
            .map(|i| {
                let t = i as f64 * 5.0;
                let noise = ((i * 7919) % 13) as f64 / 13.0 - 0.5;
                (t as i64, (t / 80.0).sin() + 0.1 * noise)
            })
            .collect();
        let events = feed(&mut detector, &samples);

        assert!(!events.is_empty());
        assert_eq!(events[0].kind, ExtremumKind::Peak);
        for pair in events.windows(2) {
            assert_ne!(pair[0].kind, pair[1].kind);
            assert!(pair[0].timestamp < pair[1].timestamp);
        }
        let estimate = detector.estimate();
        assert!(estimate.amplitude_threshold >= 0.0);
        assert!(estimate.amplitude_ci >= 0.0);
        assert!(estimate.interval_threshold >= 0.0);
        assert!(estimate.interval_ci >= 0.0);
    }

    #[test]
    fn test_one_sample_can_confirm_both_kinds() {
        let mut detector = ExtremaDetector::with_history(&config(), seed_history());
        // A small peak and trough, both below the floor while the wait is short
        let events = feed(&mut detector, &[(21, 0.2), (22, 0.0), (23, 0.1)]);
        assert!(events.is_empty());

        // After a long gap the floor collapses and both are released together
        let events = feed(&mut detector, &[(100, 0.12)]);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, ExtremumKind::Peak);
        assert_eq!(events[0].timestamp, 21);
        assert_eq!(events[0].lag, 3);
        assert_eq!(events[1].kind, ExtremumKind::Trough);
        assert_eq!(events[1].timestamp, 22);
        assert_eq!(events[1].lag, 2);
        assert!(events.iter().all(|e| e.timely == Timeliness::Delayed));
    }

    #[test]
    fn test_snapshot_roundtrip_resumes_identically() {
        let samples: Vec<(i64, f64)> = (0..400)
            .map(|i| (i * 5, ((i as f64) / 7.0).sin()))
            .collect();

        let mut straight = ExtremaDetector::new(&config());
        let all = feed(&mut straight, &samples);

        let mut first = ExtremaDetector::new(&config());
        let mut resumed_events = feed(&mut first, &samples[..173]);
        let mut resumed =
            ExtremaDetector::from_calibration(&config(), first.snapshot(SeedSource::Baseline));
        resumed_events.extend(feed(&mut resumed, &samples[173..]));

        assert_eq!(all, resumed_events);
        assert_eq!(straight.estimate(), resumed.estimate());
        assert_eq!(straight.history(), resumed.history());
    }

    #[test]
    fn test_overshoot_below_last_trough_is_not_a_peak() {
        let mut detector = ExtremaDetector::with_history(&config(), seed_history());
        let events = feed(&mut detector, &[(21, -5.0), (22, -4.6), (23, -4.9)]);
        assert!(events.is_empty());
        assert_eq!(detector.expected_kind(), ExtremumKind::Peak);

        // Climbing back past the trough's value still confirms normally
        let events = feed(&mut detector, &[(24, 0.6), (25, 0.5)]);
        assert_eq!(events.len(), 1);
        assert_eq!((events[0].timestamp, events[0].value), (24, 0.6));
        assert_eq!(events[0].timely, Timeliness::Immediate);
    }

    #[test]
    fn test_seed_aligns_to_first_live_timestamp() {
        let samples: Vec<(i64, f64)> = (0..400)
            .map(|i| (i * 5, ((i as f64) / 7.0).sin()))
            .collect();
        let (baseline, live) = samples.split_at(173);

        let mut straight = ExtremaDetector::new(&config());
        feed(&mut straight, baseline);
        let straight_live = feed(&mut straight, live);

        let mut calibration = ExtremaDetector::new(&config());
        feed(&mut calibration, baseline);
        let mut resumed = ExtremaDetector::from_calibration(
            &config(),
            calibration.snapshot(SeedSource::Baseline),
        )
        .align_on_first_sample(5);

        let shift = 10_000 - live[0].0;
        let shifted: Vec<(i64, f64)> = live.iter().map(|&(t, v)| (t + shift, v)).collect();
        let resumed_live = feed(&mut resumed, &shifted);

        assert!(!resumed_live.is_empty());
        assert_eq!(resumed_live.len(), straight_live.len());
        for (resumed_event, straight_event) in resumed_live.iter().zip(&straight_live) {
            assert_eq!(resumed_event.timestamp - shift, straight_event.timestamp);
            assert_eq!(resumed_event.kind, straight_event.kind);
            assert_eq!(resumed_event.lag, straight_event.lag);
        }
        assert_eq!(resumed.estimate(), straight.estimate());
    }

    #[test]
    fn test_alignment_without_seed_is_noop() {
        let mut detector = ExtremaDetector::new(&config()).align_on_first_sample(5);
        detector.process(Sample::new(7_000, 0.0));
        assert_eq!(detector.history().last().map(|e| e.timestamp), Some(7_000));
    }

    #[test]
    fn test_flat_signal_keeps_run_bounded() {
        let config = DetectionConfig {
            max_run_samples: 16,
            ..config()
        };
        let mut detector = ExtremaDetector::with_history(&config, seed_history());
        assert!(detector.process(Sample::new(21, 0.5)).is_empty());
        for t in 22..1_022 {
            assert!(detector.process(Sample::new(t, 0.5)).is_empty());
            assert!(detector.run_len() <= 16);
        }

        let events = detector.process(Sample::new(1_022, 0.1)).to_vec();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].timestamp, 21);
        assert_eq!(events[0].lag, 1_001);
        assert_eq!(events[0].timely, Timeliness::Delayed);
    }

    #[test]
    fn test_run_keeps_only_anchor_and_candidate_on_steady_rise() {
        let mut detector = ExtremaDetector::with_history(&config(), seed_history());
        let rising: Vec<(i64, f64)> = (3..40).map(|i| (i * 10, i as f64)).collect();
        feed(&mut detector, &rising);
        assert_eq!(detector.run_len(), 2);
    }
}
