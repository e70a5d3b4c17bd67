// ThresholdModel - adaptive amplitude/interval thresholds
//
// Thresholds are derived from the most recent K confirmed extrema:
//
//   amplitude_threshold = mean(|Δvalue|) / 2      amplitude_ci = stderr(|Δvalue|) / 2
//   interval_threshold  = mean(Δtimestamp) / 2    interval_ci  = stderr(Δtimestamp) / 2
//
// Until the history holds `min_history_for_ci` records the CI is pinned to
// half the threshold. Estimation walks the history slice in place and never
// allocates, since it runs on the detector thread after every confirmation.

use serde::{Deserialize, Serialize};

use crate::analysis::history::{DetectionEvent, HistoryRecord};
use crate::config::DetectionConfig;

/// Fixed thresholds used when no history is available
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FallbackThresholds {
    pub amplitude: f64,
    pub interval_ms: f64,
}

/// Current adaptive thresholds. All fields are non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdEstimate {
    pub amplitude_threshold: f64,
    pub amplitude_ci: f64,
    pub interval_threshold: f64,
    pub interval_ci: f64,
}

impl ThresholdEstimate {
    pub fn from_fallback(fallback: FallbackThresholds) -> Self {
        let amplitude_threshold = fallback.amplitude.max(0.0);
        let interval_threshold = fallback.interval_ms.max(0.0);
        Self {
            amplitude_threshold,
            amplitude_ci: amplitude_threshold / 2.0,
            interval_threshold,
            interval_ci: interval_threshold / 2.0,
        }
    }

    /// Longest expected wait between events before the guard engages
    pub fn interval_limit(&self) -> f64 {
        self.interval_threshold + self.interval_ci
    }

    /// Scale applied to amplitude thresholds after an unusually long wait
    ///
    /// Returns 1.0 while `elapsed_ms` is within the interval limit, otherwise
    /// `limit / elapsed` so the required excursion shrinks as the wait grows.
    pub fn guard_factor(&self, elapsed_ms: i64) -> f64 {
        let limit = self.interval_limit();
        let elapsed = elapsed_ms as f64;
        if limit > 0.0 && elapsed > limit {
            limit / elapsed
        } else {
            1.0
        }
    }

    /// Minimum excursion from the last extremum required to confirm the next one
    pub fn confirmation_floor(&self, elapsed_ms: i64) -> f64 {
        let factor = self.guard_factor(elapsed_ms);
        ((self.amplitude_threshold - self.amplitude_ci) * factor).max(0.0)
    }
}

/// Derives [`ThresholdEstimate`]s from a [`HistoryRecord`]
#[derive(Debug, Clone)]
pub struct ThresholdModel {
    window: usize,
    min_history_for_ci: usize,
    fallback: FallbackThresholds,
}

impl ThresholdModel {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            window: config.history_window.max(2),
            min_history_for_ci: config.min_history_for_ci,
            fallback: config.fallback(),
        }
    }

    pub fn fallback(&self) -> FallbackThresholds {
        self.fallback
    }

    /// Recompute thresholds from the latest K records
    pub fn estimate(&self, history: &HistoryRecord) -> ThresholdEstimate {
        let window = history.window(self.window);
        if window.len() < 2 {
            return ThresholdEstimate::from_fallback(self.fallback);
        }

        let (amp_mean, amp_stderr) = mean_and_stderr(window, |a, b| (b.value - a.value).abs());
        let (int_mean, int_stderr) =
            mean_and_stderr(window, |a, b| (b.timestamp - a.timestamp) as f64);

        let amplitude_threshold = (amp_mean / 2.0).max(0.0);
        let interval_threshold = (int_mean / 2.0).max(0.0);

        if history.len() < self.min_history_for_ci {
            ThresholdEstimate {
                amplitude_threshold,
                amplitude_ci: amplitude_threshold / 2.0,
                interval_threshold,
                interval_ci: interval_threshold / 2.0,
            }
        } else {
            ThresholdEstimate {
                amplitude_threshold,
                amplitude_ci: amp_stderr / 2.0,
                interval_threshold,
                interval_ci: int_stderr / 2.0,
            }
        }
    }
}

/// Mean and standard error of `delta` over consecutive event pairs
fn mean_and_stderr<F>(events: &[DetectionEvent], delta: F) -> (f64, f64)
where
    F: Fn(&DetectionEvent, &DetectionEvent) -> f64,
{
    let n = events.len().saturating_sub(1);
    if n == 0 {
        return (0.0, 0.0);
    }

    let sum: f64 = events.windows(2).map(|pair| delta(&pair[0], &pair[1])).sum();
    let mean = sum / n as f64;
    if n < 2 {
        return (mean, 0.0);
    }

    let sum_sq: f64 = events
        .windows(2)
        .map(|pair| {
            let d = delta(&pair[0], &pair[1]) - mean;
            d * d
        })
        .sum();
    let std_dev = (sum_sq / (n - 1) as f64).sqrt();
    (mean, std_dev / (n as f64).sqrt())
}
