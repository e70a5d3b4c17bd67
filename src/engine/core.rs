//! Engine: wires calibration and the three pipeline stages together.
//!
//! `Engine` validates the configuration, resolves the calibration seed, the
//! event sink and the optional raw recorder, then launches Logger, Detector
//! and Sampler threads connected by crossbeam channels. `EngineHandle` requests a cooperative stop and joins
//! the stages into a single `PipelineReport`.

use std::thread::JoinHandle;

use crossbeam_channel::{bounded, unbounded};
use serde::Serialize;

use crate::acquisition::{
    spawn_sampler_thread, FrameRecorder, Sampler, SamplerReport, ShutdownReason, ShutdownSignal,
};
use crate::analysis::extrema::ExtremaDetector;
use crate::analysis::{spawn_detector_thread, DetectorReport, SpacingGate, Trigger};
use crate::calibration::{BaselineCalibrator, CalibrationState, SeedSource};
use crate::config::{LogFailurePolicy, PipelineConfig};
use crate::error::{log_config_error, log_write_error, EngineError};
use crate::event_log::{spawn_logger_thread, EventSink, FileEventSink, LoggerReport};
use crate::telemetry::{self, LatencyStats};

/// Sampler -> Detector queue capacity; the sampler blocks when it is full
const SAMPLE_QUEUE_CAPACITY: usize = 4096;

/// Pipeline builder
pub struct Engine {
    config: PipelineConfig,
    seed: Option<CalibrationState>,
    sink: Option<Box<dyn EventSink>>,
}

impl Engine {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            seed: None,
            sink: None,
        }
    }

    /// Use an explicit seed instead of running baseline calibration
    pub fn with_seed(mut self, seed: CalibrationState) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Use a custom sink instead of the configured log file
    pub fn with_sink(mut self, sink: Box<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Resolve the seed from the configured baseline, or the fallback thresholds
    pub fn calibrate(&self) -> CalibrationState {
        let detection = &self.config.detection;
        if !self.config.baseline.enabled {
            tracing::info!("[Engine] Baseline disabled, using fallback thresholds");
            return CalibrationState::fallback(detection);
        }
        BaselineCalibrator::new(detection)
            .with_channel(self.config.acquisition.channel_index)
            .calibrate_or_fallback(
            self.config.baseline.source_path.as_deref(),
            self.config.acquisition.sample_period_ms(),
        )
    }

    /// Validate, calibrate and start all stages
    pub fn launch(
        mut self,
        sampler: Box<dyn Sampler>,
        trigger: Box<dyn Trigger>,
    ) -> Result<EngineHandle, EngineError> {
        self.config.validate().map_err(|err| {
            log_config_error(&err, "engine launch");
            err
        })?;
        self.config
            .validate_channel(sampler.channel_count())
            .map_err(|err| {
                log_config_error(&err, "engine launch");
                err
            })?;

        let seed = match self.seed.take() {
            Some(seed) => seed,
            None => self.calibrate(),
        };
        let sink = match self.sink.take() {
            Some(sink) => sink,
            None => self.open_log()?,
        };
        let recorder = self.open_recorder(sampler.channel_count())?;

        let seed_source = seed.source;
        let detector = ExtremaDetector::from_calibration(&self.config.detection, seed)
            .align_on_first_sample(self.config.acquisition.sample_period_ms());
        let gate = SpacingGate::new(self.config.acquisition.min_sample_spacing_ms);
        tracing::info!(
            "[Engine] Launching pipeline on channel {} ({:?} seed, {} history records)",
            self.config.acquisition.channel_index,
            seed_source,
            detector.history().len()
        );

        let (sample_tx, sample_rx) = bounded(SAMPLE_QUEUE_CAPACITY);
        let (log_tx, log_rx) = unbounded();
        let shutdown = ShutdownSignal::new();

        let logger = spawn_logger_thread(
            sink,
            self.config.event_log.failure_policy,
            log_rx,
            shutdown.clone(),
        );
        let detector = spawn_detector_thread(detector, gate, trigger, sample_rx, log_tx);
        let sampler = spawn_sampler_thread(
            sampler,
            self.config.acquisition.channel_index,
            recorder,
            sample_tx,
            shutdown.clone(),
        );

        Ok(EngineHandle {
            shutdown,
            sampler,
            detector,
            logger,
            seed_source,
        })
    }

    fn open_log(&self) -> Result<Box<dyn EventSink>, EngineError> {
        let path = &self.config.event_log.path;
        match FileEventSink::open(path) {
            Ok(sink) => Ok(Box::new(sink)),
            Err(err) => {
                log_write_error(&err, "engine launch");
                match self.config.event_log.failure_policy {
                    LogFailurePolicy::Fatal => Err(err.into()),
                    LogFailurePolicy::Buffer => {
                        tracing::warn!(
                            "[Engine] Event log {} unavailable, will retry on each write",
                            path.display()
                        );
                        Ok(Box::new(FileEventSink::deferred(path)))
                    }
                }
            }
        }
    }

    fn open_recorder(&self, channels: usize) -> Result<Option<FrameRecorder>, EngineError> {
        let Some(path) = &self.config.acquisition.record_path else {
            return Ok(None);
        };
        match FrameRecorder::create(path, channels) {
            Ok(recorder) => Ok(Some(recorder)),
            Err(err) => {
                log_write_error(&err, "engine launch");
                match self.config.event_log.failure_policy {
                    LogFailurePolicy::Fatal => Err(err.into()),
                    LogFailurePolicy::Buffer => {
                        tracing::warn!(
                            "[Engine] Raw recording {} unavailable, continuing without it",
                            path.display()
                        );
                        Ok(None)
                    }
                }
            }
        }
    }
}

/// Running pipeline
pub struct EngineHandle {
    shutdown: ShutdownSignal,
    sampler: JoinHandle<SamplerReport>,
    detector: JoinHandle<DetectorReport>,
    logger: JoinHandle<LoggerReport>,
    seed_source: SeedSource,
}

/// Final reports of every stage
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    pub seed_source: SeedSource,
    pub sampler: SamplerReport,
    pub detector: DetectorReport,
    pub logger: LoggerReport,
    /// Rolling trigger latency from the telemetry hub when the pipeline ended
    pub trigger_latency: Option<LatencyStats>,
}

/// Flat summary used for CLI output
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub seed_source: SeedSource,
    pub samples: u64,
    pub samples_gated: u64,
    pub frames_recorded: u64,
    pub peaks: u64,
    pub troughs: u64,
    pub immediate: u64,
    pub delayed: u64,
    pub triggers_fired: u64,
    pub events_written: u64,
    pub events_lost: usize,
    pub trigger_latency: Option<LatencyStats>,
    pub shutdown: String,
}

impl PipelineReport {
    /// Whether the pipeline stopped because of an acquisition fault
    pub fn faulted(&self) -> bool {
        matches!(self.sampler.reason, ShutdownReason::Fault(_))
    }

    pub fn summary(&self) -> PipelineSummary {
        PipelineSummary {
            seed_source: self.seed_source,
            samples: self.detector.samples_processed,
            samples_gated: self.detector.samples_gated,
            frames_recorded: self.sampler.frames_recorded,
            peaks: self.detector.peaks,
            troughs: self.detector.troughs,
            immediate: self.detector.immediate,
            delayed: self.detector.delayed,
            triggers_fired: self.detector.triggers_fired,
            events_written: self.logger.events_written,
            events_lost: self.logger.events_lost,
            trigger_latency: self.trigger_latency,
            shutdown: match &self.sampler.reason {
                ShutdownReason::Completed => "completed".to_string(),
                ShutdownReason::Requested => "requested".to_string(),
                ShutdownReason::Fault(err) => err.to_string(),
            },
        }
    }
}

impl EngineHandle {
    /// Ask the sampler to stop; the rest drains through the sentinel path
    pub fn stop(&self) {
        tracing::info!("[Engine] Stop requested");
        self.shutdown.request();
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn seed_source(&self) -> SeedSource {
        self.seed_source
    }

    /// Wait for every stage to finish
    pub fn join(self) -> Result<PipelineReport, EngineError> {
        let sampler = self
            .sampler
            .join()
            .map_err(|_| EngineError::StagePanicked { stage: "sampler" })?;
        let detector = self
            .detector
            .join()
            .map_err(|_| EngineError::StagePanicked { stage: "detector" })?;
        let logger = self
            .logger
            .join()
            .map_err(|_| EngineError::StagePanicked { stage: "logger" })?;

        tracing::info!(
            "[Engine] Pipeline finished: {} samples, {} events written",
            sampler.samples_sent,
            logger.events_written
        );
        Ok(PipelineReport {
            seed_source: self.seed_source,
            sampler,
            detector,
            logger,
            trigger_latency: telemetry::hub().trigger_latency(),
        })
    }
}
