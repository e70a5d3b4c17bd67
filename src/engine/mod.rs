//! Engine module housing the pipeline orchestration layer.
//!
//! `Engine` builds and launches the Sampler -> Detector -> Logger pipeline;
//! `EngineHandle` stops and joins it.

pub mod core;

pub use self::core::{Engine, EngineHandle, PipelineReport, PipelineSummary};
