use crate::error::{PvcError, PvcResult};
use crate::signal::RRSeries;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub const DEFAULT_WINDOW_S: f64 = 10.0;

/// Robust RR baseline per fixed-duration window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    /// RR index closing each full window.
    pub boundaries: Vec<usize>,
    /// Trimmed mean RR (samples) per window; one longer than `boundaries`.
    pub averages: Vec<f64>,
}

impl Baseline {
    pub fn estimate(rr: &RRSeries, window_s: f64) -> PvcResult<Self> {
        let boundaries = window_boundaries(&rr.beat_times, window_s)?;
        let averages = window_averages(&rr.intervals, &boundaries)?;
        log::debug!(
            "baseline: {} windows of {} s over {} intervals",
            averages.len(),
            window_s,
            rr.len()
        );
        Ok(Self {
            boundaries,
            averages,
        })
    }

    pub fn window_count(&self) -> usize {
        self.averages.len()
    }
}

/// Indices of the first beat reaching each successive multiple of `window_s`.
///
/// At most one boundary is recorded per beat, so a long gap in the beat
/// train shifts the following boundaries later rather than emitting several
/// at once.
pub fn window_boundaries(beat_times: &[f64], window_s: f64) -> PvcResult<Vec<usize>> {
    if !(window_s > 0.0) || !window_s.is_finite() {
        return Err(PvcError::range(format!(
            "window length must be positive, got {window_s}"
        )));
    }
    let mut boundaries = Vec::new();
    let mut multiplier = 1.0;
    for (i, &t) in beat_times.iter().enumerate() {
        if t >= multiplier * window_s {
            boundaries.push(i);
            multiplier += 1.0;
        }
    }
    if boundaries.is_empty() {
        return Err(PvcError::WindowTooLarge {
            window_s,
            duration_s: beat_times.last().copied().unwrap_or(0.0),
        });
    }
    Ok(boundaries)
}

/// Keep values inside the Tukey fences `[Q1 - 1.5 IQR, Q3 + 1.5 IQR]`.
///
/// Quartiles are read straight from the sorted data at `n / 4` and `3n / 4`.
/// Retained values keep their input order.
pub fn remove_outliers<T>(values: &[T]) -> Vec<T>
where
    T: Copy + PartialOrd + ToPrimitive,
{
    if values.is_empty() {
        return Vec::new();
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let n = sorted.len();
    let as_f64 = |v: T| v.to_f64().unwrap_or(f64::NAN);
    let q1 = as_f64(sorted[n / 4]);
    let q3 = as_f64(sorted[3 * n / 4]);
    let iqr = q3 - q1;
    let low = q1 - 1.5 * iqr;
    let high = q3 + 1.5 * iqr;
    values
        .iter()
        .copied()
        .filter(|&v| {
            let x = as_f64(v);
            x >= low && x <= high
        })
        .collect()
}

/// Mean of the outlier-trimmed values, or `None` when nothing survives.
pub fn trimmed_mean<T>(values: &[T]) -> Option<f64>
where
    T: Copy + PartialOrd + ToPrimitive,
{
    let kept = remove_outliers(values);
    if kept.is_empty() {
        return None;
    }
    let sum: f64 = kept.iter().filter_map(|v| v.to_f64()).sum();
    Some(sum / kept.len() as f64)
}

/// Trimmed mean RR for every window delimited by `boundaries`, plus the trailing remainder.
pub fn window_averages(intervals: &[usize], boundaries: &[usize]) -> PvcResult<Vec<f64>> {
    let mut averages = Vec::with_capacity(boundaries.len() + 1);
    let mut start = 0;
    let ends = boundaries.iter().copied().chain(std::iter::once(intervals.len()));
    for (window, end) in ends.enumerate() {
        if end > intervals.len() || end < start {
            return Err(PvcError::range(format!(
                "window boundary {end} is out of order or beyond {} intervals",
                intervals.len()
            )));
        }
        let segment = &intervals[start..end];
        let mean = trimmed_mean(segment).ok_or_else(|| {
            PvcError::insufficient(format!(
                "window {window} (intervals {start}..{end}) has no RR intervals after outlier removal"
            ))
        })?;
        averages.push(mean);
        start = end;
    }
    Ok(averages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Events;

    #[test]
    fn boundaries_follow_window_multiples() {
        let times = [2.0, 4.0, 6.0, 8.0, 10.0, 12.0, 19.9, 20.5, 25.0];
        let b = window_boundaries(&times, 10.0).unwrap();
        assert_eq!(b, vec![4, 7]);
    }

    #[test]
    fn one_boundary_per_beat_after_gap() {
        // The gap jumps past 20 s and 30 s at once but only one boundary is taken.
        let times = [5.0, 31.0, 32.0, 33.0];
        let b = window_boundaries(&times, 10.0).unwrap();
        assert_eq!(b, vec![1, 2, 3]);
    }

    #[test]
    fn window_longer_than_beats_is_rejected() {
        let err = window_boundaries(&[1.0, 2.0, 3.0], 10.0).unwrap_err();
        assert!(matches!(err, PvcError::WindowTooLarge { .. }));
        let err = window_boundaries(&[1.0], 0.0).unwrap_err();
        assert!(matches!(err, PvcError::ParameterRange(_)));
    }

    #[test]
    fn outliers_are_dropped_and_order_kept() {
        let values = [100usize, 101, 99, 100, 102, 98, 100, 160];
        let kept = remove_outliers(&values);
        assert_eq!(kept, vec![100, 101, 99, 100, 102, 98, 100]);
    }

    #[test]
    fn trimming_is_idempotent() {
        let values = [100usize, 101, 99, 100, 102, 98, 100, 160, 40];
        let once = remove_outliers(&values);
        let twice = remove_outliers(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn trimming_works_on_floats() {
        let kept = remove_outliers(&[0.8, 0.81, 0.79, 0.8, 2.5]);
        assert_eq!(kept, vec![0.8, 0.81, 0.79, 0.8]);
    }

    #[test]
    fn averages_include_trailing_window() {
        let intervals = [100, 100, 100, 100, 200, 200, 200, 300, 300];
        let averages = window_averages(&intervals, &[4, 7]).unwrap();
        assert_eq!(averages, vec![100.0, 200.0, 300.0]);
    }

    #[test]
    fn trailing_window_is_trimmed_too() {
        let intervals = [100, 100, 100, 100, 100, 100, 100, 100, 900];
        let averages = window_averages(&intervals, &[3]).unwrap();
        assert_eq!(averages, vec![100.0, 100.0]);
    }

    #[test]
    fn empty_window_is_insufficient_data() {
        let err = window_averages(&[100, 100, 100], &[0]).unwrap_err();
        assert!(matches!(err, PvcError::InsufficientData(_)), "{err}");
    }

    #[test]
    fn estimate_from_rr_series() {
        // 200-sample beats at 250 Hz: one beat every 0.8 s over 24 s.
        let peaks: Vec<usize> = (0..31).map(|i| 100 + i * 200).collect();
        let rr = RRSeries::from_events(&Events::from_indices(peaks), 250.0).unwrap();
        let baseline = Baseline::estimate(&rr, 10.0).unwrap();
        assert_eq!(baseline.boundaries.len(), 2);
        assert_eq!(baseline.window_count(), 3);
        assert!(baseline.averages.iter().all(|&a| a == 200.0));
    }
}
