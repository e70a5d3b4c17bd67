// Acquisition module - the narrow "stream of samples" contract
//
// The detector never sees the hardware binding. It only consumes
// `SampleMessage`s from a channel fed by the sampler thread, which pulls from
// any `Sampler` implementation (device driver, file replay, synthetic signal)
// and forwards the channel of interest.
//
// Shutdown flows downstream as a sentinel message. The sampler thread sends
// exactly one sentinel: when the source is exhausted, when the shared
// `ShutdownSignal` is raised, or alongside a fatal `AcquisitionError`.
//
// When a `FrameRecorder` is attached, every full frame is written to disk from
// this thread before the channel of interest is forwarded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

use crate::error::{log_acquisition_error, log_write_error, AcquisitionError, ErrorCode};
use crate::telemetry::{self, Stage, StagePhase};

pub mod recorder;
pub mod replay;
pub mod synthetic;

pub use recorder::FrameRecorder;
pub use replay::ReplaySampler;
pub use synthetic::{SyntheticSampler, SyntheticSpec};

/// One timestamped reading of the monitored channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Milliseconds since session start
    pub timestamp: i64,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// One timestamped reading of every channel
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub timestamp: i64,
    pub values: Vec<f64>,
}

impl Frame {
    pub fn new(timestamp: i64, values: Vec<f64>) -> Self {
        Self { timestamp, values }
    }

    pub fn sample(&self, channel: usize) -> Option<Sample> {
        self.values
            .get(channel)
            .map(|&value| Sample::new(self.timestamp, value))
    }
}

/// Source of timestamped frames
///
/// Reads may block until the next frame is available. `Ok(None)` means the
/// source is exhausted.
pub trait Sampler: Send {
    /// Number of channels in each frame
    fn channel_count(&self) -> usize;

    fn next_frame(&mut self) -> Result<Option<Frame>, AcquisitionError>;

    /// Read the next frame and return the requested channel
    fn next_sample(&mut self, channel: usize) -> Result<Option<Sample>, AcquisitionError> {
        match self.next_frame()? {
            Some(frame) => frame.sample(channel).map(Some).ok_or_else(|| missing_channel(channel)),
            None => Ok(None),
        }
    }
}

fn missing_channel(channel: usize) -> AcquisitionError {
    AcquisitionError::DeviceFailure {
        details: format!("channel {} not present in frame", channel),
    }
}

/// Why a stage is shutting down
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    /// Source exhausted
    Completed,
    /// Cooperative stop requested through the [`ShutdownSignal`]
    Requested,
    /// Fatal acquisition failure
    Fault(AcquisitionError),
}

/// Sampler -> Detector queue item
#[derive(Debug, Clone, PartialEq)]
pub enum SampleMessage {
    Sample(Sample),
    Shutdown(ShutdownReason),
}

/// Cooperative stop flag checked by the sampler between samples
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    requested: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Counters reported by the sampler thread when it exits
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerReport {
    pub samples_sent: u64,
    /// Frames written by the recorder, 0 when recording is off
    pub frames_recorded: u64,
    pub reason: ShutdownReason,
}

/// Spawn the sampler thread
///
/// The thread forwards samples until the source ends, a stop is requested or
/// the source fails, then sends a single shutdown sentinel.
pub fn spawn_sampler_thread(
    mut sampler: Box<dyn Sampler>,
    channel: usize,
    mut recorder: Option<FrameRecorder>,
    sample_tx: Sender<SampleMessage>,
    shutdown: ShutdownSignal,
) -> JoinHandle<SamplerReport> {
    thread::spawn(move || {
        tracing::info!("[Sampler] Thread started on channel {}", channel);
        telemetry::hub().record_stage(Stage::Sampler, StagePhase::Started);
        let mut samples_sent = 0u64;
        let mut frames_recorded = 0u64;

        let reason = loop {
            if shutdown.is_requested() {
                break ShutdownReason::Requested;
            }
            let next = next_recorded(
                sampler.as_mut(),
                channel,
                &mut recorder,
                &mut frames_recorded,
            );
            match next {
                Ok(Some(sample)) => {
                    if sample_tx.send(SampleMessage::Sample(sample)).is_err() {
                        tracing::warn!("[Sampler] Detector queue closed, stopping");
                        break ShutdownReason::Requested;
                    }
                    samples_sent += 1;
                }
                Ok(None) => break ShutdownReason::Completed,
                Err(err) => {
                    log_acquisition_error(&err, "sampler thread");
                    telemetry::hub().record_error(err.code(), "sampler");
                    break ShutdownReason::Fault(err);
                }
            }
        };

        tracing::info!(
            "[Sampler] Sending shutdown sentinel after {} samples ({:?})",
            samples_sent,
            reason
        );
        let _ = sample_tx.send(SampleMessage::Shutdown(reason.clone()));

        if let Some(active) = recorder {
            if let Err(err) = active.finish() {
                log_write_error(&err, "sample recorder");
                telemetry::hub().record_error(err.code(), "recorder");
            }
        }
        telemetry::hub().record_stage(Stage::Sampler, StagePhase::Stopped);
        SamplerReport {
            samples_sent,
            frames_recorded,
            reason,
        }
    })
}

/// Read the next sample, recording the full frame first when a recorder is attached
///
/// A recorder that fails is dropped with a warning; acquisition carries on.
fn next_recorded(
    sampler: &mut dyn Sampler,
    channel: usize,
    recorder: &mut Option<FrameRecorder>,
    frames_recorded: &mut u64,
) -> Result<Option<Sample>, AcquisitionError> {
    let Some(active) = recorder.as_mut() else {
        return sampler.next_sample(channel);
    };
    let Some(frame) = sampler.next_frame()? else {
        return Ok(None);
    };

    match active.record(&frame) {
        Ok(()) => *frames_recorded += 1,
        Err(err) => {
            log_write_error(&err, "sample recorder");
            telemetry::hub().record_error(err.code(), "recorder");
            tracing::warn!(
                "[Sampler] Raw recording to {} abandoned after {} frames",
                active.path().display(),
                frames_recorded
            );
            *recorder = None;
        }
    }

    frame
        .sample(channel)
        .map(Some)
        .ok_or_else(|| missing_channel(channel))
}
