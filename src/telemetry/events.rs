//! Metric event types published by the pipeline stages.

use serde::{Deserialize, Serialize};

use crate::analysis::history::{ExtremumKind, Timeliness};

/// Pipeline stages reporting lifecycle transitions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Sampler,
    Detector,
    Logger,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StagePhase {
    Started,
    Stopped,
}

/// Metric events covering detections, trigger latency, queue depth and errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MetricEvent {
    Detection {
        kind: ExtremumKind,
        timely: Timeliness,
        lag: u32,
        timestamp_ms: i64,
    },
    /// Rolling statistics of the time spent inside `Trigger::fire`
    TriggerLatency {
        avg_us: f32,
        max_us: f32,
        sample_count: usize,
    },
    QueueDepth {
        queue: String,
        depth: usize,
    },
    StageLifecycle {
        stage: Stage,
        phase: StagePhase,
        timestamp_ms: u64,
    },
    Error {
        code: i32,
        context: String,
    },
}
