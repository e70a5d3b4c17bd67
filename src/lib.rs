// rtpeaks - real-time adaptive peak/trough detection
// Sampler -> Detector -> Logger pipeline with baseline-seeded thresholds

// Module declarations
pub mod acquisition;
pub mod analysis;
pub mod calibration;
pub mod config;
pub mod engine;
pub mod error;
pub mod event_log;
pub mod telemetry;

// Re-exports for convenience
pub use acquisition::{Frame, FrameRecorder, Sample, Sampler};
pub use analysis::extrema::ExtremaDetector;
pub use analysis::history::{DetectionEvent, ExtremumKind, HistoryRecord, Timeliness};
pub use analysis::threshold::{ThresholdEstimate, ThresholdModel};
pub use analysis::{SpacingGate, Trigger};
pub use calibration::{BaselineCalibrator, CalibrationState};
pub use config::PipelineConfig;
pub use engine::{Engine, EngineHandle, PipelineReport};
