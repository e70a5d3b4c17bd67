//! Replay sampler - feeds a recorded table back as a live stream.
//!
//! Rows are `timestamp,ch0,ch1,...`. A leading non-numeric row is treated as a
//! header. With pacing enabled each sample is released at its recorded offset
//! from the first row, otherwise as fast as the detector consumes them.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use crate::acquisition::{Frame, Sample, Sampler};
use crate::error::AcquisitionError;

/// Parse a millisecond timestamp, accepting fractional values
pub(crate) fn parse_timestamp(field: &str) -> Option<i64> {
    let field = field.trim();
    field
        .parse::<i64>()
        .ok()
        .or_else(|| field.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v.round() as i64))
}

pub(crate) fn parse_value(field: &str) -> Option<f64> {
    field.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// In-memory multi-channel recording replayed frame by frame
#[derive(Debug, Clone)]
pub struct ReplaySampler {
    timestamps: Vec<i64>,
    values: Vec<f64>,
    channels: usize,
    position: usize,
    paced: bool,
    started: Option<Instant>,
}

impl ReplaySampler {
    /// Single-channel recording with timestamps derived from the sample rate
    pub fn from_values(samplerate: u32, values: &[f64]) -> Self {
        let period = 1000.0 / samplerate.max(1) as f64;
        let timestamps = (0..values.len())
            .map(|i| (i as f64 * period).round() as i64)
            .collect();
        Self::from_columns(timestamps, values.to_vec(), 1)
    }

    pub fn from_samples(samples: &[Sample]) -> Self {
        Self::from_columns(
            samples.iter().map(|s| s.timestamp).collect(),
            samples.iter().map(|s| s.value).collect(),
            1,
        )
    }

    /// Multi-channel recording; every frame must carry `channels` values
    pub fn from_frames(channels: usize, frames: &[Frame]) -> Self {
        let channels = channels.max(1);
        let mut values = Vec::with_capacity(frames.len() * channels);
        for frame in frames {
            values.extend((0..channels).map(|c| frame.values.get(c).copied().unwrap_or(0.0)));
        }
        Self::from_columns(frames.iter().map(|f| f.timestamp).collect(), values, channels)
    }

    fn from_columns(timestamps: Vec<i64>, values: Vec<f64>, channels: usize) -> Self {
        Self {
            timestamps,
            values,
            channels,
            position: 0,
            paced: false,
            started: None,
        }
    }

    /// Load `timestamp,ch0,ch1,...` rows from a CSV file
    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self, AcquisitionError> {
        let path_display = path.as_ref().display().to_string();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path.as_ref())
            .map_err(|err| AcquisitionError::SourceUnreadable {
                path: path_display.clone(),
                reason: err.to_string(),
            })?;

        let mut timestamps = Vec::new();
        let mut values = Vec::new();
        let mut channels = 0usize;

        for (index, record) in reader.records().enumerate() {
            let line = index as u64 + 1;
            let record = record.map_err(|err| AcquisitionError::SourceUnreadable {
                path: path_display.clone(),
                reason: err.to_string(),
            })?;

            let timestamp = match record.get(0).and_then(parse_timestamp) {
                Some(t) => t,
                None if index == 0 => continue,
                None => {
                    return Err(AcquisitionError::MalformedSample {
                        line,
                        reason: "timestamp is not a number".to_string(),
                    })
                }
            };

            let row_channels = record.len().saturating_sub(1);
            if row_channels == 0 {
                return Err(AcquisitionError::MalformedSample {
                    line,
                    reason: "row has no channel values".to_string(),
                });
            }
            if channels == 0 {
                channels = row_channels;
            } else if row_channels != channels {
                return Err(AcquisitionError::MalformedSample {
                    line,
                    reason: format!("expected {} channels, found {}", channels, row_channels),
                });
            }

            timestamps.push(timestamp);
            for field in record.iter().skip(1) {
                let value = parse_value(field).ok_or_else(|| AcquisitionError::MalformedSample {
                    line,
                    reason: format!("value {:?} is not a number", field),
                })?;
                values.push(value);
            }
        }

        tracing::info!(
            "[ReplaySampler] Loaded {} frames x {} channels from {}",
            timestamps.len(),
            channels,
            path_display
        );
        Ok(Self::from_columns(timestamps, values, channels.max(1)))
    }

    /// Release samples at their recorded pace
    pub fn paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    fn wait_for(&mut self, timestamp: i64) {
        let origin = self.timestamps.first().copied().unwrap_or(0);
        let started = *self.started.get_or_insert_with(Instant::now);
        let due = started + Duration::from_millis((timestamp - origin).max(0) as u64);
        let now = Instant::now();
        if due > now {
            thread::sleep(due - now);
        }
    }
}

impl Sampler for ReplaySampler {
    fn channel_count(&self) -> usize {
        self.channels
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, AcquisitionError> {
        let Some(&timestamp) = self.timestamps.get(self.position) else {
            return Ok(None);
        };
        let start = self.position * self.channels;
        let values = self.values[start..start + self.channels].to_vec();
        self.position += 1;

        if self.paced {
            self.wait_for(timestamp);
        }
        Ok(Some(Frame::new(timestamp, values)))
    }

    // Single-channel reads skip the frame allocation
    fn next_sample(&mut self, channel: usize) -> Result<Option<Sample>, AcquisitionError> {
        if channel >= self.channels {
            return Err(AcquisitionError::DeviceFailure {
                details: format!("channel {} not present in replay", channel),
            });
        }
        let Some(&timestamp) = self.timestamps.get(self.position) else {
            return Ok(None);
        };
        let value = self.values[self.position * self.channels + channel];
        self.position += 1;

        if self.paced {
            self.wait_for(timestamp);
        }
        Ok(Some(Sample::new(timestamp, value)))
    }
}
