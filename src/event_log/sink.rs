// Event sinks - where confirmed detections end up
//
// Each row is `timestamp,value,kind,timely` with no header, e.g.
// `40,2.0,peak,immediate`. Sinks flush after every event so a crash loses at
// most the row being written.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::analysis::history::{DetectionEvent, ExtremumKind, Timeliness};
use crate::error::LogWriteError;

/// Durable destination for detection events
pub trait EventSink: Send {
    fn write_event(&mut self, event: &DetectionEvent) -> Result<(), LogWriteError>;

    fn flush(&mut self) -> Result<(), LogWriteError>;

    /// Flush and release the underlying resource. Called exactly once.
    fn close(&mut self) -> Result<(), LogWriteError> {
        self.flush()
    }
}

#[derive(Serialize)]
struct LogRow {
    timestamp: i64,
    value: f64,
    kind: ExtremumKind,
    timely: Timeliness,
}

impl From<&DetectionEvent> for LogRow {
    fn from(event: &DetectionEvent) -> Self {
        Self {
            timestamp: event.timestamp,
            value: event.value,
            kind: event.kind,
            timely: event.timely,
        }
    }
}

/// CSV sink over any writer
pub struct CsvEventSink<W: Write> {
    writer: csv::Writer<W>,
    rows_written: u64,
}

impl<W: Write> CsvEventSink<W> {
    pub fn new(inner: W) -> Self {
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(inner);
        Self {
            writer,
            rows_written: 0,
        }
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Recover the underlying writer, flushing first
    pub fn into_inner(self) -> Result<W, LogWriteError> {
        self.writer
            .into_inner()
            .map_err(|e| LogWriteError::FlushFailed {
                reason: e.error().to_string(),
            })
    }
}

impl CsvEventSink<File> {
    /// Open `path` for appending, creating it if needed
    pub fn open_append<P: AsRef<Path>>(path: P) -> Result<Self, LogWriteError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .map_err(|e| LogWriteError::OpenFailed {
                path: path.as_ref().display().to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self::new(file))
    }
}

impl<W: Write + Send> EventSink for CsvEventSink<W> {
    fn write_event(&mut self, event: &DetectionEvent) -> Result<(), LogWriteError> {
        self.writer
            .serialize(LogRow::from(event))
            .map_err(|e| LogWriteError::WriteFailed {
                reason: e.to_string(),
            })?;
        self.rows_written += 1;
        self.flush()
    }

    fn flush(&mut self) -> Result<(), LogWriteError> {
        self.writer.flush().map_err(|e| LogWriteError::FlushFailed {
            reason: e.to_string(),
        })
    }
}

/// Append-mode log file that (re)opens itself on demand
///
/// With a deferred open the first write attempts to create the file, so an
/// unavailable path surfaces as write errors the logger can buffer and retry.
pub struct FileEventSink {
    path: PathBuf,
    inner: Option<CsvEventSink<File>>,
}

impl FileEventSink {
    /// Open immediately, failing if the file cannot be created
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LogWriteError> {
        let inner = CsvEventSink::open_append(path.as_ref())?;
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            inner: Some(inner),
        })
    }

    /// Defer opening until the first event
    pub fn deferred<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            inner: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&mut self) -> Result<&mut CsvEventSink<File>, LogWriteError> {
        if self.inner.is_none() {
            self.inner = Some(CsvEventSink::open_append(&self.path)?);
            tracing::info!("[EventLogger] Opened {}", self.path.display());
        }
        self.inner.as_mut().ok_or_else(|| LogWriteError::OpenFailed {
            path: self.path.display().to_string(),
            reason: "writer unavailable".to_string(),
        })
    }
}

impl EventSink for FileEventSink {
    fn write_event(&mut self, event: &DetectionEvent) -> Result<(), LogWriteError> {
        let result = self.writer()?.write_event(event);
        if result.is_err() {
            // Reopen on the next attempt
            self.inner = None;
        }
        result
    }

    fn flush(&mut self) -> Result<(), LogWriteError> {
        match self.inner.as_mut() {
            Some(inner) => inner.flush(),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> Result<(), LogWriteError> {
        let result = self.flush();
        self.inner = None;
        result
    }
}
