//! Raw frame recorder - keeps every acquired frame on disk.
//!
//! Rows are `timestamp,ch0,ch1,...` under a header row, the same layout the
//! replay sampler and the baseline loader read, so a session's recording can
//! calibrate the next session. The recorder lives on the sampler thread.

use std::fs::File;
use std::path::{Path, PathBuf};

use crate::acquisition::Frame;
use crate::error::LogWriteError;

/// Frames buffered between flushes
const FLUSH_EVERY: u64 = 200;

/// CSV writer for raw multi-channel frames
pub struct FrameRecorder {
    path: PathBuf,
    writer: csv::Writer<File>,
    channels: usize,
    frames_written: u64,
}

impl FrameRecorder {
    /// Create (or truncate) `path` and write the header row
    pub fn create<P: AsRef<Path>>(path: P, channels: usize) -> Result<Self, LogWriteError> {
        let path = path.as_ref().to_path_buf();
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&path)
            .map_err(|e| LogWriteError::OpenFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        let header = std::iter::once("timestamp".to_string())
            .chain((0..channels).map(|channel| format!("ch{}", channel)));
        writer
            .write_record(header)
            .map_err(|e| LogWriteError::WriteFailed {
                reason: e.to_string(),
            })?;
        writer.flush().map_err(|e| LogWriteError::FlushFailed {
            reason: e.to_string(),
        })?;

        tracing::info!(
            "[FrameRecorder] Recording {} channel(s) to {}",
            channels,
            path.display()
        );
        Ok(Self {
            path,
            writer,
            channels,
            frames_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn record(&mut self, frame: &Frame) -> Result<(), LogWriteError> {
        if frame.values.len() != self.channels {
            return Err(LogWriteError::WriteFailed {
                reason: format!(
                    "frame at t={} has {} channels, recording expects {}",
                    frame.timestamp,
                    frame.values.len(),
                    self.channels
                ),
            });
        }

        let fields = std::iter::once(frame.timestamp.to_string())
            .chain(frame.values.iter().map(|value| value.to_string()));
        self.writer
            .write_record(fields)
            .map_err(|e| LogWriteError::WriteFailed {
                reason: e.to_string(),
            })?;
        self.frames_written += 1;

        if self.frames_written % FLUSH_EVERY == 0 {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), LogWriteError> {
        self.writer.flush().map_err(|e| LogWriteError::FlushFailed {
            reason: e.to_string(),
        })
    }

    /// Flush and close; returns the number of frames written
    pub fn finish(mut self) -> Result<u64, LogWriteError> {
        self.flush()?;
        tracing::info!(
            "[FrameRecorder] Closed {} after {} frames",
            self.path.display(),
            self.frames_written
        );
        Ok(self.frames_written)
    }
}
