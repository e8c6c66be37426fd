use crate::error::{PvcError, PvcResult};
use serde::{Deserialize, Serialize};

pub const DEFAULT_HISTOGRAM_BINS: usize = 10;

/// Which bin wins when several share the maximum count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModeTieBreak {
    /// Lowest amplitude bin.
    #[default]
    First,
    /// Highest amplitude bin.
    Last,
}

/// Equal-width histogram over the observed amplitude range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub min: f64,
    pub max: f64,
    pub counts: Vec<usize>,
}

impl Histogram {
    pub fn from_samples(data: &[f64], bins: usize) -> PvcResult<Self> {
        if bins == 0 {
            return Err(PvcError::range("histogram needs at least one bin"));
        }
        if data.is_empty() {
            return Err(PvcError::insufficient("cannot build a histogram of an empty signal"));
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(PvcError::range("signal contains non-finite samples"));
        }
        let (min, max) = data
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let mut counts = vec![0usize; bins];
        let width = (max - min) / bins as f64;
        for &v in data {
            let idx = if width > 0.0 {
                (((v - min) / width) as usize).min(bins - 1)
            } else {
                0
            };
            counts[idx] += 1;
        }
        Ok(Self { min, max, counts })
    }

    pub fn bin_width(&self) -> f64 {
        (self.max - self.min) / self.counts.len() as f64
    }

    /// Midpoint of bin `idx`.
    pub fn bin_center(&self, idx: usize) -> f64 {
        let width = self.bin_width();
        let lo = self.min + width * idx as f64;
        let hi = if idx + 1 == self.counts.len() {
            self.max
        } else {
            self.min + width * (idx + 1) as f64
        };
        (lo + hi) / 2.0
    }

    /// Index of the most populated bin.
    pub fn peak_bin(&self, tie_break: ModeTieBreak) -> usize {
        let best = self.counts.iter().copied().max().unwrap_or(0);
        let mut hits = self.counts.iter().enumerate().filter(|&(_, &c)| c == best);
        let hit = match tie_break {
            ModeTieBreak::First => hits.next(),
            ModeTieBreak::Last => hits.last(),
        };
        hit.map(|(i, _)| i).unwrap_or(0)
    }
}

/// Centre of the most frequent amplitude bucket.
pub fn amplitude_mode(data: &[f64], bins: usize, tie_break: ModeTieBreak) -> PvcResult<f64> {
    let hist = Histogram::from_samples(data, bins)?;
    if hist.max == hist.min {
        return Ok(hist.min);
    }
    let bin = hist.peak_bin(tie_break);
    let mode = hist.bin_center(bin);
    log::debug!(
        "amplitude mode {:.4} from bin {} of {} ({} samples)",
        mode,
        bin,
        bins,
        hist.counts[bin]
    );
    Ok(mode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_signal_returns_its_value() {
        for v in [0.0, -3.25, 1234.5] {
            assert_eq!(amplitude_mode(&[v; 64], 10, ModeTieBreak::First).unwrap(), v);
        }
    }

    #[test]
    fn picks_most_populated_bin_center() {
        // Range 0..10, width 1; bin 2 holds the majority.
        let mut data = vec![0.0, 10.0];
        data.extend([2.2, 2.4, 2.6, 2.8, 7.5]);
        let mode = amplitude_mode(&data, 10, ModeTieBreak::First).unwrap();
        assert!((mode - 2.5).abs() < 1e-12);
    }

    #[test]
    fn max_value_lands_in_last_bin() {
        let hist = Histogram::from_samples(&[0.0, 1.0, 1.0, 1.0], 4).unwrap();
        assert_eq!(hist.counts, vec![1, 0, 0, 3]);
    }

    #[test]
    fn ties_follow_configured_policy() {
        let data = [0.0, 0.1, 9.9, 10.0];
        let first = amplitude_mode(&data, 10, ModeTieBreak::First).unwrap();
        let last = amplitude_mode(&data, 10, ModeTieBreak::Last).unwrap();
        assert!((first - 0.5).abs() < 1e-12);
        assert!((last - 9.5).abs() < 1e-12);
    }

    #[test]
    fn invalid_inputs_are_reported() {
        assert!(matches!(
            amplitude_mode(&[], 10, ModeTieBreak::First),
            Err(PvcError::InsufficientData(_))
        ));
        assert!(matches!(
            amplitude_mode(&[1.0, 2.0], 0, ModeTieBreak::First),
            Err(PvcError::ParameterRange(_))
        ));
        assert!(matches!(
            amplitude_mode(&[1.0, f64::NAN], 10, ModeTieBreak::First),
            Err(PvcError::ParameterRange(_))
        ));
    }
}
