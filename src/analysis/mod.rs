// Analysis module - the latency-critical detector stage
//
// This module runs the ExtremaDetector on its own thread, consuming samples
// from the sampler queue and producing DetectionEvents for the logger queue.
//
// Architecture:
// - DetectorWorker: main loop that blocks on the Sampler -> Detector queue
// - Pipeline: Sample -> SpacingGate -> ExtremaDetector -> (Trigger, Detector -> Logger queue)
// - Immediate peaks fire the Trigger before the event is handed to the
//   logger; the logger queue is unbounded so sending never waits on it

use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};

use crate::acquisition::{Sample, SampleMessage, ShutdownReason};
use crate::error::{log_acquisition_error, AcquisitionError, ErrorCode};
use crate::event_log::LogMessage;
use crate::telemetry::{self, Stage, StagePhase};

pub mod extrema;
pub mod history;
pub mod threshold;

use extrema::ExtremaDetector;
use history::DetectionEvent;

/// One-shot external action fired on immediate peaks
///
/// `fire` runs on the detector thread; it should return quickly.
pub trait Trigger: Send {
    fn fire(&mut self);
}

impl<F> Trigger for F
where
    F: FnMut() + Send,
{
    fn fire(&mut self) {
        self()
    }
}

/// Trigger that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTrigger;

impl Trigger for NoopTrigger {
    fn fire(&mut self) {}
}

/// Trigger that emits a tracing line per firing
#[derive(Debug, Default, Clone)]
pub struct LogTrigger {
    fired: u64,
}

impl LogTrigger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Trigger for LogTrigger {
    fn fire(&mut self) {
        self.fired += 1;
        tracing::info!("[Trigger] Fired #{}", self.fired);
    }
}

/// Nominal-rate gate in front of the detector
///
/// Drivers polled for their latest value can hand out the same or a too-early
/// sample. The gate drops any sample closer than `min_spacing_ms` to the last
/// one it let through. A spacing of 0 lets everything through.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpacingGate {
    min_spacing_ms: i64,
    last_accepted: Option<i64>,
}

impl SpacingGate {
    pub fn new(min_spacing_ms: u32) -> Self {
        Self {
            min_spacing_ms: i64::from(min_spacing_ms),
            last_accepted: None,
        }
    }

    pub fn admit(&mut self, sample: &Sample) -> bool {
        if self.min_spacing_ms == 0 {
            return true;
        }
        if let Some(last) = self.last_accepted {
            if sample.timestamp < last + self.min_spacing_ms {
                return false;
            }
        }
        self.last_accepted = Some(sample.timestamp);
        true
    }
}

/// Counters reported by the detector thread when it exits
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorReport {
    pub samples_processed: u64,
    /// Samples dropped by the [`SpacingGate`]
    pub samples_gated: u64,
    pub peaks: u64,
    pub troughs: u64,
    pub immediate: u64,
    pub delayed: u64,
    pub triggers_fired: u64,
    /// A sampler queue closed without a sentinel shows up as a
    /// `StreamDisconnected` fault
    pub reason: ShutdownReason,
}

struct DetectorWorker {
    detector: ExtremaDetector,
    gate: SpacingGate,
    trigger: Box<dyn Trigger>,
    log_tx: Sender<LogMessage>,
    logger_alive: bool,
    report: DetectorReport,
}

impl DetectorWorker {
    fn new(
        detector: ExtremaDetector,
        gate: SpacingGate,
        trigger: Box<dyn Trigger>,
        log_tx: Sender<LogMessage>,
    ) -> Self {
        Self {
            detector,
            gate,
            trigger,
            log_tx,
            logger_alive: true,
            report: DetectorReport {
                samples_processed: 0,
                samples_gated: 0,
                peaks: 0,
                troughs: 0,
                immediate: 0,
                delayed: 0,
                triggers_fired: 0,
                reason: ShutdownReason::Requested,
            },
        }
    }

    fn run(mut self, sample_rx: Receiver<SampleMessage>) -> DetectorReport {
        // Events confirmed by one sample; reused across iterations
        let mut confirmed: Vec<DetectionEvent> = Vec::with_capacity(4);

        let reason = loop {
            match sample_rx.recv() {
                Ok(SampleMessage::Sample(sample)) => {
                    if !self.gate.admit(&sample) {
                        self.report.samples_gated += 1;
                        continue;
                    }
                    confirmed.clear();
                    confirmed.extend_from_slice(self.detector.process(sample));
                    for event in &confirmed {
                        self.handle(*event);
                    }
                    if !confirmed.is_empty() {
                        telemetry::hub().record_queue_depth("detector_to_logger", self.log_tx.len());
                    }
                }
                Ok(SampleMessage::Shutdown(reason)) => break reason,
                Err(_) => {
                    let err = AcquisitionError::StreamDisconnected;
                    log_acquisition_error(&err, "detector thread");
                    telemetry::hub().record_error(err.code(), "detector");
                    break ShutdownReason::Fault(err);
                }
            }
        };

        self.report.samples_processed = self.detector.samples_processed();
        self.report.reason = reason.clone();

        if self.log_tx.send(LogMessage::Shutdown(reason)).is_err() {
            tracing::warn!("[Detector] Logger gone before shutdown sentinel");
        }
        self.report
    }

    fn handle(&mut self, event: DetectionEvent) {
        if event.fires_trigger() {
            let started = Instant::now();
            self.trigger.fire();
            let elapsed_us = started.elapsed().as_secs_f32() * 1_000_000.0;
            self.report.triggers_fired += 1;
            telemetry::hub().record_trigger_latency(elapsed_us);
        }

        match event.kind {
            history::ExtremumKind::Peak => self.report.peaks += 1,
            history::ExtremumKind::Trough => self.report.troughs += 1,
        }
        match event.timely {
            history::Timeliness::Immediate => self.report.immediate += 1,
            history::Timeliness::Delayed => self.report.delayed += 1,
        }

        tracing::debug!(
            "[Detector] {:?} at t={} value={:.4} lag={} ({:?})",
            event.kind,
            event.timestamp,
            event.value,
            event.lag,
            event.timely
        );
        telemetry::hub().record_detection(&event);

        if self.logger_alive && self.log_tx.send(LogMessage::Event(event)).is_err() {
            tracing::error!("[Detector] Logger queue closed, detections will not be recorded");
            self.logger_alive = false;
        }
    }
}

/// Spawn the detector thread
///
/// The thread exits after the sampler's sentinel, forwarding its own sentinel
/// to the logger once the in-flight sample is finished.
pub fn spawn_detector_thread(
    detector: ExtremaDetector,
    gate: SpacingGate,
    trigger: Box<dyn Trigger>,
    sample_rx: Receiver<SampleMessage>,
    log_tx: Sender<LogMessage>,
) -> JoinHandle<DetectorReport> {
    thread::spawn(move || {
        tracing::info!("[Detector] Thread started");
        telemetry::hub().record_stage(Stage::Detector, StagePhase::Started);

        let report = DetectorWorker::new(detector, gate, trigger, log_tx).run(sample_rx);

        telemetry::hub().record_stage(Stage::Detector, StagePhase::Stopped);
        tracing::info!(
            "[Detector] Stopped after {} samples: {} peaks, {} troughs, {} triggers",
            report.samples_processed,
            report.peaks,
            report.troughs,
            report.triggers_fired
        );
        report
    })
}
