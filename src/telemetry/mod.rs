//! Pipeline telemetry collector and helpers.
//!
//! The collector multiplexes detection, trigger latency, queue depth and
//! stage lifecycle events into a bounded history plus a broadcast stream.
//! Publishing never blocks: lagging subscribers lose events, the stages don't.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use tokio::sync::broadcast;

use crate::analysis::history::DetectionEvent;

pub mod events;

pub use events::{MetricEvent, Stage, StagePhase};

/// Global telemetry hub shared across the crate.
static HUB: Lazy<TelemetryHub> = Lazy::new(TelemetryHub::default);

/// Access the global telemetry hub.
pub fn hub() -> &'static TelemetryHub {
    &HUB
}

/// Snapshot of collector state for CLI reporting.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TelemetrySnapshot {
    pub recent: Vec<MetricEvent>,
    pub total_events: u64,
    pub dropped_events: u64,
}

/// Rolling trigger-latency statistics, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LatencyStats {
    pub avg_us: f32,
    pub max_us: f32,
    pub sample_count: usize,
}

/// Broadcast-based collector retaining a bounded history of metrics.
pub struct TelemetryCollector {
    tx: broadcast::Sender<MetricEvent>,
    history: Mutex<VecDeque<MetricEvent>>,
    history_capacity: usize,
    total_events: AtomicU64,
    dropped_history: AtomicU64,
}

impl TelemetryCollector {
    pub fn new(buffer: usize, history_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self {
            tx,
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity,
            total_events: AtomicU64::new(0),
            dropped_history: AtomicU64::new(0),
        }
    }

    pub fn publish(&self, event: MetricEvent) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut history) = self.history.lock() {
            if history.len() == self.history_capacity {
                history.pop_front();
                self.dropped_history.fetch_add(1, Ordering::Relaxed);
            }
            if self.history_capacity > 0 {
                history.push_back(event.clone());
            }
        }

        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MetricEvent> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let recent = self
            .history
            .lock()
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default();
        TelemetrySnapshot {
            recent,
            total_events: self.total_events.load(Ordering::Relaxed),
            dropped_events: self.dropped_history.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new(256, 64)
    }
}

/// Latency tracker maintains a rolling window to compute avg/max latency.
struct LatencyTracker {
    samples: VecDeque<f32>,
    max_samples: usize,
}

impl LatencyTracker {
    fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
        }
    }

    fn observe(&mut self, value: f32) -> LatencyStats {
        if self.samples.len() == self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(value.abs());
        self.stats().unwrap_or(LatencyStats {
            avg_us: 0.0,
            max_us: 0.0,
            sample_count: 0,
        })
    }

    fn stats(&self) -> Option<LatencyStats> {
        let count = self.samples.len();
        if count == 0 {
            return None;
        }
        let sum: f32 = self.samples.iter().copied().sum();
        let max = self.samples.iter().copied().fold(0.0_f32, f32::max);
        Some(LatencyStats {
            avg_us: sum / count as f32,
            max_us: max,
            sample_count: count,
        })
    }
}

/// Top-level hub wrapping collector state plus derived gauges.
pub struct TelemetryHub {
    collector: TelemetryCollector,
    trigger_latency: Mutex<LatencyTracker>,
    queue_gauges: Mutex<HashMap<&'static str, usize>>,
}

impl TelemetryHub {
    pub fn new(channel_capacity: usize, history_capacity: usize, latency_window: usize) -> Self {
        Self {
            collector: TelemetryCollector::new(channel_capacity, history_capacity),
            trigger_latency: Mutex::new(LatencyTracker::new(latency_window)),
            queue_gauges: Mutex::new(HashMap::new()),
        }
    }

    pub fn collector(&self) -> &TelemetryCollector {
        &self.collector
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MetricEvent> {
        self.collector.subscribe()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.collector.snapshot()
    }

    pub fn record_detection(&self, event: &DetectionEvent) {
        self.collector.publish(MetricEvent::Detection {
            kind: event.kind,
            timely: event.timely,
            lag: event.lag,
            timestamp_ms: event.timestamp,
        });
    }

    pub fn record_trigger_latency(&self, micros: f32) {
        let Ok(mut tracker) = self.trigger_latency.lock() else {
            return;
        };
        let stats = tracker.observe(micros);
        drop(tracker);

        self.collector.publish(MetricEvent::TriggerLatency {
            avg_us: stats.avg_us,
            max_us: stats.max_us,
            sample_count: stats.sample_count,
        });
    }

    /// Current rolling trigger latency, `None` before the first firing
    pub fn trigger_latency(&self) -> Option<LatencyStats> {
        self.trigger_latency
            .lock()
            .ok()
            .and_then(|tracker| tracker.stats())
    }

    /// Publish a queue depth, skipping changes smaller than 16 items
    pub fn record_queue_depth(&self, queue: &'static str, depth: usize) {
        let Ok(mut gauges) = self.queue_gauges.lock() else {
            return;
        };
        let should_emit = gauges
            .get(queue)
            .map(|last| last.abs_diff(depth) >= 16)
            .unwrap_or(true);

        if should_emit {
            gauges.insert(queue, depth);
            drop(gauges);
            self.collector.publish(MetricEvent::QueueDepth {
                queue: queue.to_string(),
                depth,
            });
        }
    }

    pub fn record_stage(&self, stage: Stage, phase: StagePhase) {
        self.collector.publish(MetricEvent::StageLifecycle {
            stage,
            phase,
            timestamp_ms: now_timestamp_ms(),
        });
    }

    pub fn record_error(&self, code: i32, context: impl Into<String>) {
        self.collector.publish(MetricEvent::Error {
            code,
            context: context.into(),
        });
    }
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new(256, 64, 32)
    }
}

fn now_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
