use crate::error::{PvcError, PvcResult};
use serde::{Deserialize, Serialize};

/// Uniformly sampled ECG trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Uniform sampling frequency in Hz
    pub fs: f64,
    /// Samples
    pub data: Vec<f64>,
}

impl TimeSeries {
    /// Build a series, rejecting empty data and non-positive sampling rates.
    pub fn new(fs: f64, data: Vec<f64>) -> PvcResult<Self> {
        let ts = Self { fs, data };
        ts.validate()?;
        Ok(ts)
    }

    pub fn validate(&self) -> PvcResult<()> {
        if !(self.fs > 0.0) || !self.fs.is_finite() {
            return Err(PvcError::range(format!(
                "sampling rate must be positive, got {}",
                self.fs
            )));
        }
        if self.data.is_empty() {
            return Err(PvcError::insufficient("signal has no samples"));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn duration(&self) -> f64 {
        self.data.len() as f64 / self.fs
    }
    /// Time axis in seconds, one entry per sample.
    pub fn times(&self) -> Vec<f64> {
        (0..self.data.len()).map(|i| i as f64 / self.fs).collect()
    }
}

/// Point events on a timeline (R-peak sample indices).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Events {
    pub indices: Vec<usize>,
}

impl Events {
    pub fn from_indices(indices: Vec<usize>) -> Self {
        Self { indices }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Check that indices strictly increase and stay below `sample_count`.
    pub fn validate_within(&self, sample_count: usize) -> PvcResult<()> {
        if let Some(w) = self.indices.windows(2).find(|w| w[1] <= w[0]) {
            return Err(PvcError::range(format!(
                "R-peaks must be strictly increasing ({} followed by {})",
                w[0], w[1]
            )));
        }
        if let Some(&last) = self.indices.last() {
            if last >= sample_count {
                return Err(PvcError::range(format!(
                    "R-peak {} lies outside a signal of {} samples",
                    last, sample_count
                )));
            }
        }
        Ok(())
    }
}

/// RR intervals in samples, paired with the time of the beat closing each interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RRSeries {
    /// `peaks[i + 1] - peaks[i]`
    pub intervals: Vec<usize>,
    /// `peaks[i + 1] / fs`, in seconds
    pub beat_times: Vec<f64>,
}

impl RRSeries {
    pub fn from_events(events: &Events, fs: f64) -> PvcResult<Self> {
        if !(fs > 0.0) || !fs.is_finite() {
            return Err(PvcError::range(format!(
                "sampling rate must be positive, got {fs}"
            )));
        }
        if events.len() < 2 {
            return Err(PvcError::insufficient(format!(
                "need at least 2 R-peaks to form an interval, got {}",
                events.len()
            )));
        }
        let mut intervals = Vec::with_capacity(events.len() - 1);
        let mut beat_times = Vec::with_capacity(events.len() - 1);
        for w in events.indices.windows(2) {
            if w[1] <= w[0] {
                return Err(PvcError::range(format!(
                    "R-peaks must be strictly increasing ({} followed by {})",
                    w[0], w[1]
                )));
            }
            intervals.push(w[1] - w[0]);
            beat_times.push(w[1] as f64 / fs);
        }
        Ok(Self {
            intervals,
            beat_times,
        })
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}
