//! Integration tests for seeding the detector
//!
//! Covers baseline calibration continuity, fallback behavior when the
//! baseline is unusable, and reseeding from a previous session's log.

use std::io::Write;

use rand::{rngs::StdRng, Rng, SeedableRng};
use rtpeaks::acquisition::{ReplaySampler, Sample, SyntheticSampler, SyntheticSpec};
use rtpeaks::analysis::history::DetectionEvent;
use rtpeaks::analysis::NoopTrigger;
use rtpeaks::calibration::{BaselineCalibrator, CalibrationState, SeedSource};
use rtpeaks::config::{DetectionConfig, PipelineConfig};
use rtpeaks::engine::Engine;
use rtpeaks::event_log::read_event_log;
use rtpeaks::ExtremaDetector;

const PERIOD_MS: i64 = 5;

/// Noisy two-tone signal, reproducible from `seed`
fn signal(len: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|i| {
            let t = i as f64 * PERIOD_MS as f64 / 1000.0;
            (2.0 * std::f64::consts::PI * 1.1 * t).sin()
                + 0.3 * (2.0 * std::f64::consts::PI * 0.27 * t).sin()
                + rng.gen_range(-0.05..0.05)
        })
        .collect()
}

fn samples(values: &[f64], start_ms: i64) -> Vec<Sample> {
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| Sample::new(start_ms + i as i64 * PERIOD_MS, v))
        .collect()
}

fn write_baseline(values: &[f64]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "timestamp,value").unwrap();
    for sample in samples(values, 0) {
        writeln!(file, "{},{}", sample.timestamp, sample.value).unwrap();
    }
    file.flush().unwrap();
    file
}

fn feed(detector: &mut ExtremaDetector, samples: &[Sample]) -> Vec<DetectionEvent> {
    let mut events = Vec::new();
    for &sample in samples {
        events.extend_from_slice(detector.process(sample));
    }
    events
}

#[test]
fn test_live_detection_continues_baseline_exactly() {
    let config = DetectionConfig::default();
    let values = signal(4_000, 7);
    let (baseline_values, live_values) = values.split_at(1_500);

    // One detector over the whole recording
    let mut straight = ExtremaDetector::new(&config);
    let baseline_samples = samples(baseline_values, 0);
    feed(&mut straight, &baseline_samples);
    let offset = baseline_values.len() as i64 * PERIOD_MS;
    let straight_live = feed(&mut straight, &samples(live_values, offset));

    // Calibrate, rebase, then run live from t = 0
    let seed = BaselineCalibrator::new(&config)
        .calibrate(&baseline_samples)
        .unwrap()
        .aligned_to_session_start(PERIOD_MS);
    let mut live = ExtremaDetector::from_calibration(&config, seed);
    let live_events = feed(&mut live, &samples(live_values, 0));

    assert!(!live_events.is_empty());
    assert_eq!(live_events.len(), straight_live.len());
    for (live_event, straight_event) in live_events.iter().zip(&straight_live) {
        assert_eq!(live_event.kind, straight_event.kind);
        assert_eq!(live_event.timestamp + offset, straight_event.timestamp);
        assert_eq!(live_event.value, straight_event.value);
        assert_eq!(live_event.lag, straight_event.lag);
    }
    assert_eq!(live.estimate(), straight.estimate());
}

#[test]
fn test_live_stream_with_offset_clock_stays_continuous() {
    let values = signal(4_000, 7);
    let (baseline_values, live_values) = values.split_at(1_500);
    let config = DetectionConfig::default();

    let mut straight = ExtremaDetector::new(&config);
    feed(&mut straight, &samples(baseline_values, 0));
    let offset = baseline_values.len() as i64 * PERIOD_MS;
    let straight_live = feed(&mut straight, &samples(live_values, offset));

    let seed = BaselineCalibrator::new(&config)
        .calibrate(&samples(baseline_values, 0))
        .unwrap();
    for start in [0, 10_000, 123_457] {
        let mut live = ExtremaDetector::from_calibration(&config, seed.clone())
            .align_on_first_sample(PERIOD_MS);
        let live_events = feed(&mut live, &samples(live_values, start));

        assert_eq!(live_events.len(), straight_live.len(), "start {}", start);
        for (live_event, straight_event) in live_events.iter().zip(&straight_live) {
            assert_eq!(live_event.timestamp - start + offset, straight_event.timestamp);
            assert_eq!(live_event.kind, straight_event.kind);
            assert_eq!(live_event.lag, straight_event.lag);
        }
        assert_eq!(live.estimate(), straight.estimate(), "start {}", start);
    }
}

#[test]
fn test_engine_baseline_continuity_with_recorded_clock() {
    let dir = tempfile::tempdir().unwrap();
    let values = signal(3_000, 21);
    let (baseline_values, live_values) = values.split_at(1_500);
    let baseline = write_baseline(baseline_values);

    let mut straight = ExtremaDetector::new(&DetectionConfig::default());
    feed(&mut straight, &samples(baseline_values, 0));
    let offset = baseline_values.len() as i64 * PERIOD_MS;
    let straight_live = feed(&mut straight, &samples(live_values, offset));

    // The live recording keeps its device clock, which starts at 10 s
    let start = 10_000;
    let mut config = PipelineConfig::default();
    config.event_log.path = dir.path().join("events.csv");
    config.baseline.enabled = true;
    config.baseline.source_path = Some(baseline.path().to_path_buf());
    Engine::new(config.clone())
        .launch(
            Box::new(ReplaySampler::from_samples(&samples(live_values, start))),
            Box::new(NoopTrigger),
        )
        .unwrap()
        .join()
        .unwrap();

    let logged = read_event_log(&config.event_log.path).unwrap();
    assert!(!logged.is_empty());
    assert_eq!(logged.len(), straight_live.len());
    for (logged_event, straight_event) in logged.events().iter().zip(&straight_live) {
        assert_eq!(logged_event.timestamp - start + offset, straight_event.timestamp);
        assert_eq!(logged_event.kind, straight_event.kind);
        assert_eq!(logged_event.value, straight_event.value);
        assert_eq!(logged_event.timely, straight_event.timely);
    }
}

#[test]
fn test_recorded_session_calibrates_next_session() {
    let dir = tempfile::tempdir().unwrap();
    let recording = dir.path().join("session1_raw.csv");
    let mut config = PipelineConfig::default();
    config.event_log.path = dir.path().join("session1_events.csv");
    config.acquisition.record_path = Some(recording.clone());

    let first = Engine::new(config.clone())
        .launch(
            Box::new(SyntheticSampler::new(SyntheticSpec {
                frequency_hz: 1.2,
                noise: 0.1,
                seed: 4,
                samples: 1_500,
                ..SyntheticSpec::default()
            })),
            Box::new(NoopTrigger),
        )
        .unwrap()
        .join()
        .unwrap();
    assert_eq!(first.sampler.frames_recorded, 1_500);

    let mut next = PipelineConfig::default();
    next.event_log.path = dir.path().join("session2_events.csv");
    next.baseline.enabled = true;
    next.baseline.source_path = Some(recording);
    let second = Engine::new(next)
        .launch(
            Box::new(ReplaySampler::from_values(200, &signal(1_000, 8))),
            Box::new(NoopTrigger),
        )
        .unwrap()
        .join()
        .unwrap();
    assert_eq!(second.seed_source, SeedSource::Baseline);
}

#[test]
fn test_ci_is_half_threshold_until_twenty_records() {
    let config = DetectionConfig::default();
    let mut detector = ExtremaDetector::new(&config);
    for sample in samples(&signal(4_000, 3), 0) {
        detector.process(sample);
        let estimate = detector.estimate();
        if detector.history().len() < 20 {
            assert_eq!(estimate.amplitude_ci, estimate.amplitude_threshold / 2.0);
            assert_eq!(estimate.interval_ci, estimate.interval_threshold / 2.0);
        }
    }
    assert!(detector.history().len() >= 20);
}

#[test]
fn test_engine_calibrates_from_configured_baseline() {
    let dir = tempfile::tempdir().unwrap();
    let baseline = write_baseline(&signal(1_500, 11));
    let mut config = PipelineConfig::default();
    config.event_log.path = dir.path().join("events.csv");
    config.baseline.enabled = true;
    config.baseline.source_path = Some(baseline.path().to_path_buf());

    let report = Engine::new(config)
        .launch(
            Box::new(ReplaySampler::from_values(200, &signal(1_000, 12))),
            Box::new(NoopTrigger),
        )
        .unwrap()
        .join()
        .unwrap();

    assert_eq!(report.seed_source, SeedSource::Baseline);
    assert!(report.detector.peaks > 0);
}

#[test]
fn test_unusable_baseline_falls_back() {
    let empty = tempfile::NamedTempFile::new().unwrap();
    let flat = write_baseline(&[1.0; 200]);
    let calibrator = BaselineCalibrator::new(&DetectionConfig::default());

    for path in [empty.path(), flat.path(), std::path::Path::new("/no/such/file.csv")] {
        let state = calibrator.calibrate_or_fallback(Some(path), PERIOD_MS);
        assert_eq!(state.source, SeedSource::Fallback);
        assert!(state.history.is_empty());
        assert_eq!(state.estimate.amplitude_threshold, 0.5);
        assert_eq!(state.estimate.interval_threshold, 500.0);
    }
}

#[test]
fn test_previous_log_reseeds_next_session() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = PipelineConfig::default();
    config.event_log.path = dir.path().join("events.csv");

    let report = Engine::new(config.clone())
        .launch(
            Box::new(ReplaySampler::from_values(200, &signal(2_000, 5))),
            Box::new(NoopTrigger),
        )
        .unwrap()
        .join()
        .unwrap();

    let history = read_event_log(&config.event_log.path).unwrap();
    assert_eq!(
        history.len() as u64,
        report.detector.peaks + report.detector.troughs
    );

    let seed = CalibrationState::from_event_log(&config.event_log.path, &config.detection)
        .unwrap()
        .aligned_to_session_start(PERIOD_MS);
    assert_eq!(seed.source, SeedSource::EventLog);
    assert!(seed.is_calibrated());
    assert_eq!(seed.history.last().map(|e| e.timestamp), Some(-PERIOD_MS));

    let report = Engine::new(config)
        .with_seed(seed)
        .launch(
            Box::new(ReplaySampler::from_values(200, &signal(1_000, 6))),
            Box::new(NoopTrigger),
        )
        .unwrap()
        .join()
        .unwrap();
    assert_eq!(report.seed_source, SeedSource::EventLog);
    assert!(report.detector.peaks > 0);
}
