// Event logger - durable record of every confirmed detection
//
// The logger thread owns the sink and drains the Detector -> Logger queue.
// It never talks back to the detector, so a slow or failing sink cannot delay
// the trigger path.
//
// Write failures follow the configured LogFailurePolicy:
// - Buffer: warn, keep the event pending and retry it before the next one
//   and once more at close
// - Fatal: raise the shutdown signal and keep draining until the sentinel
//
// The sink is closed exactly once, after the sentinel (or after the queue
// disconnects if the detector died without sending one).

use std::collections::VecDeque;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;

use crate::acquisition::{ShutdownReason, ShutdownSignal};
use crate::analysis::history::DetectionEvent;
use crate::config::LogFailurePolicy;
use crate::error::{log_write_error, ErrorCode, LogWriteError};
use crate::telemetry::{self, Stage, StagePhase};

pub mod reader;
pub mod sink;

pub use reader::read_event_log;
pub use sink::{CsvEventSink, EventSink, FileEventSink};

/// Detector -> Logger queue item
#[derive(Debug, Clone, PartialEq)]
pub enum LogMessage {
    Event(DetectionEvent),
    Shutdown(ShutdownReason),
}

/// Counters reported by the logger thread when it exits
#[derive(Debug, Clone, PartialEq)]
pub struct LoggerReport {
    pub events_received: u64,
    pub events_written: u64,
    /// Events still pending when the sink was closed
    pub events_lost: usize,
    pub write_failures: u64,
    /// Whether the sink's `close` succeeded
    pub closed_cleanly: bool,
    /// `None` if the queue disconnected without a sentinel
    pub reason: Option<ShutdownReason>,
}

struct EventLogger {
    sink: Box<dyn EventSink>,
    policy: LogFailurePolicy,
    shutdown: ShutdownSignal,
    pending: VecDeque<DetectionEvent>,
    events_received: u64,
    events_written: u64,
    write_failures: u64,
    fatal_raised: bool,
}

impl EventLogger {
    fn new(sink: Box<dyn EventSink>, policy: LogFailurePolicy, shutdown: ShutdownSignal) -> Self {
        Self {
            sink,
            policy,
            shutdown,
            pending: VecDeque::new(),
            events_received: 0,
            events_written: 0,
            write_failures: 0,
            fatal_raised: false,
        }
    }

    fn accept(&mut self, event: DetectionEvent) {
        self.events_received += 1;
        self.pending.push_back(event);
        self.drain_pending();
    }

    /// Write pending events in order, stopping at the first failure
    fn drain_pending(&mut self) {
        while let Some(event) = self.pending.front() {
            match self.sink.write_event(event) {
                Ok(()) => {
                    self.pending.pop_front();
                    self.events_written += 1;
                }
                Err(err) => {
                    self.on_failure(&err);
                    break;
                }
            }
        }
    }

    fn on_failure(&mut self, err: &LogWriteError) {
        self.write_failures += 1;
        log_write_error(err, "logger thread");
        telemetry::hub().record_error(err.code(), "event_log");

        match self.policy {
            LogFailurePolicy::Buffer => {
                tracing::warn!(
                    "[EventLogger] Keeping {} event(s) in memory for retry",
                    self.pending.len()
                );
            }
            LogFailurePolicy::Fatal => {
                if !self.fatal_raised {
                    tracing::error!("[EventLogger] Fatal log failure, requesting pipeline shutdown");
                    self.shutdown.request();
                    self.fatal_raised = true;
                }
            }
        }
    }

    fn finish(mut self, reason: Option<ShutdownReason>) -> LoggerReport {
        if !self.pending.is_empty() {
            tracing::info!(
                "[EventLogger] Final retry of {} pending event(s)",
                self.pending.len()
            );
            self.drain_pending();
        }

        let closed_cleanly = match self.sink.close() {
            Ok(()) => true,
            Err(err) => {
                self.on_failure(&err);
                false
            }
        };

        if !self.pending.is_empty() {
            tracing::error!(
                "[EventLogger] {} event(s) could not be written before close",
                self.pending.len()
            );
        }

        LoggerReport {
            events_received: self.events_received,
            events_written: self.events_written,
            events_lost: self.pending.len(),
            write_failures: self.write_failures,
            closed_cleanly,
            reason,
        }
    }
}

/// Spawn the logger thread
pub fn spawn_logger_thread(
    sink: Box<dyn EventSink>,
    policy: LogFailurePolicy,
    log_rx: Receiver<LogMessage>,
    shutdown: ShutdownSignal,
) -> JoinHandle<LoggerReport> {
    thread::spawn(move || {
        tracing::info!("[EventLogger] Thread started ({:?} policy)", policy);
        telemetry::hub().record_stage(Stage::Logger, StagePhase::Started);
        let mut logger = EventLogger::new(sink, policy, shutdown);

        let reason = loop {
            match log_rx.recv() {
                Ok(LogMessage::Event(event)) => logger.accept(event),
                Ok(LogMessage::Shutdown(reason)) => break Some(reason),
                Err(_) => {
                    tracing::warn!("[EventLogger] Detector queue disconnected without sentinel");
                    break None;
                }
            }
        };

        let report = logger.finish(reason);
        telemetry::hub().record_stage(Stage::Logger, StagePhase::Stopped);
        tracing::info!(
            "[EventLogger] Closed after {} of {} events written",
            report.events_written,
            report.events_received
        );
        report
    })
}
