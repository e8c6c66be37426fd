//! Butterworth low-pass conditioning applied before beat detection.
//!
//! The design follows the usual digital Butterworth recipe: analog prototype
//! poles, frequency pre-warping, bilinear transform to the z-plane and
//! expansion into transfer-function coefficients. Filtering is causal
//! (direct form II transposed, zero initial state), so the output trails the
//! input by the filter group delay.

use crate::error::{PvcError, PvcResult};
use crate::signal::TimeSeries;
use realfft::num_complex::Complex;
use std::f64::consts::PI;

pub const DEFAULT_CUTOFF_HZ: f64 = 15.0;
pub const DEFAULT_ORDER: usize = 5;

/// Digital low-pass filter in transfer-function form (`b` numerator, `a` denominator).
#[derive(Debug, Clone, PartialEq)]
pub struct ButterworthLowpass {
    pub b: Vec<f64>,
    pub a: Vec<f64>,
}

impl ButterworthLowpass {
    pub fn design(order: usize, cutoff_hz: f64, fs: f64) -> PvcResult<Self> {
        if order == 0 {
            return Err(PvcError::range("filter order must be at least 1"));
        }
        if !(fs > 0.0) || !fs.is_finite() {
            return Err(PvcError::range(format!(
                "sampling rate must be positive, got {fs}"
            )));
        }
        let nyquist = 0.5 * fs;
        if !(cutoff_hz > 0.0) || cutoff_hz >= nyquist {
            return Err(PvcError::range(format!(
                "cutoff {cutoff_hz} Hz must lie in (0, {nyquist}) Hz for fs = {fs} Hz"
            )));
        }

        let wn = cutoff_hz / nyquist;
        // Normalized design rate of 2 so that Nyquist sits at 1.
        let fs2 = 4.0;
        let warped = fs2 * (PI * wn / 2.0).tan();

        let n = order as f64;
        let poles: Vec<Complex<f64>> = (0..order)
            .map(|k| {
                let m = -(order as f64) + 1.0 + 2.0 * k as f64;
                -Complex::from_polar(1.0, PI * m / (2.0 * n)) * warped
            })
            .collect();
        let gain_analog = warped.powi(order as i32);

        let z_poles: Vec<Complex<f64>> = poles.iter().map(|&p| (fs2 + p) / (fs2 - p)).collect();
        let denom: Complex<f64> = poles.iter().map(|&p| fs2 - p).product();
        let gain = gain_analog * (Complex::new(1.0, 0.0) / denom).re;

        let zeros = vec![Complex::new(-1.0, 0.0); order];
        let b = poly(&zeros).into_iter().map(|c| c.re * gain).collect();
        let a = poly(&z_poles).into_iter().map(|c| c.re).collect();
        Ok(Self { b, a })
    }

    pub fn order(&self) -> usize {
        self.a.len().saturating_sub(1)
    }

    /// Run the filter over `data`, returning a sequence of the same length.
    pub fn apply(&self, data: &[f64]) -> Vec<f64> {
        let a0 = self.a[0];
        let b: Vec<f64> = self.b.iter().map(|v| v / a0).collect();
        let a: Vec<f64> = self.a.iter().map(|v| v / a0).collect();
        let taps = b.len().max(a.len());
        let mut state = vec![0.0; taps.saturating_sub(1)];
        let coeff = |c: &[f64], i: usize| c.get(i).copied().unwrap_or(0.0);

        let mut out = Vec::with_capacity(data.len());
        for &x in data {
            let y = coeff(&b, 0) * x + state.first().copied().unwrap_or(0.0);
            let last = state.len();
            for i in 0..last {
                let next = if i + 1 < last { state[i + 1] } else { 0.0 };
                state[i] = coeff(&b, i + 1) * x + next - coeff(&a, i + 1) * y;
            }
            out.push(y);
        }
        out
    }

    /// Magnitude of the frequency response at `freq_hz`.
    pub fn gain_at(&self, freq_hz: f64, fs: f64) -> f64 {
        let w = 2.0 * PI * freq_hz / fs;
        let z_inv = Complex::from_polar(1.0, -w);
        let eval = |c: &[f64]| {
            c.iter()
                .rev()
                .fold(Complex::new(0.0, 0.0), |acc, &v| acc * z_inv + v)
        };
        (eval(&self.b) / eval(&self.a)).norm()
    }

    /// Group delay at DC, in samples.
    pub fn group_delay_samples(&self) -> f64 {
        let centroid = |c: &[f64]| {
            let weighted: f64 = c.iter().enumerate().map(|(k, v)| k as f64 * v).sum();
            weighted / c.iter().sum::<f64>()
        };
        centroid(&self.b) - centroid(&self.a)
    }
}

/// Expand the monic polynomial with the given roots, highest power first.
fn poly(roots: &[Complex<f64>]) -> Vec<Complex<f64>> {
    let mut coeffs = vec![Complex::new(1.0, 0.0)];
    for &r in roots {
        let mut next = vec![Complex::new(0.0, 0.0); coeffs.len() + 1];
        for (i, &c) in coeffs.iter().enumerate() {
            next[i] += c;
            next[i + 1] -= r * c;
        }
        coeffs = next;
    }
    coeffs
}

/// Low-pass the series with a Butterworth filter of the given order.
pub fn lowpass_filter(ts: &TimeSeries, cutoff_hz: f64, order: usize) -> PvcResult<TimeSeries> {
    let filter = ButterworthLowpass::design(order, cutoff_hz, ts.fs)?;
    Ok(TimeSeries {
        fs: ts.fs,
        data: filter.apply(&ts.data),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_order_matches_closed_form() {
        // Half-band first order filter: b = [0.5, 0.5], a = [1, 0].
        let f = ButterworthLowpass::design(1, 250.0, 1000.0).unwrap();
        assert!((f.b[0] - 0.5).abs() < 1e-12);
        assert!((f.b[1] - 0.5).abs() < 1e-12);
        assert!((f.a[0] - 1.0).abs() < 1e-12);
        assert!(f.a[1].abs() < 1e-12);
    }

    #[test]
    fn fifth_order_has_unity_dc_gain() {
        let f = ButterworthLowpass::design(5, 15.0, 1000.0).unwrap();
        assert_eq!(f.order(), 5);
        let dc = f.b.iter().sum::<f64>() / f.a.iter().sum::<f64>();
        assert!((dc - 1.0).abs() < 1e-6, "dc gain {dc}");
        let at_cutoff = f.gain_at(15.0, 1000.0);
        assert!((at_cutoff - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        assert!(f.gain_at(100.0, 1000.0) < 1e-3);
    }

    #[test]
    fn step_settles_to_input_level() {
        let f = ButterworthLowpass::design(5, 15.0, 250.0).unwrap();
        let out = f.apply(&vec![2.0; 500]);
        assert_eq!(out.len(), 500);
        assert!(out[0].abs() < 0.01);
        assert!((out[499] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn ramp_lags_by_group_delay() {
        let half_band = ButterworthLowpass::design(1, 250.0, 1000.0).unwrap();
        assert!((half_band.group_delay_samples() - 0.5).abs() < 1e-12);

        let f = ButterworthLowpass::design(5, 15.0, 250.0).unwrap();
        let delay = f.group_delay_samples();
        assert!(delay > 8.0 && delay < 9.0, "delay {delay}");
        let ramp: Vec<f64> = (0..400).map(|i| i as f64).collect();
        let out = f.apply(&ramp);
        assert!((399.0 - out[399] - delay).abs() < 1e-6);
    }

    #[test]
    fn attenuates_high_frequency_tone() {
        let fs = 500.0;
        let tone: Vec<f64> = (0..2000)
            .map(|i| (2.0 * PI * 120.0 * i as f64 / fs).sin())
            .collect();
        let ts = TimeSeries {
            fs,
            data: tone.clone(),
        };
        let out = lowpass_filter(&ts, DEFAULT_CUTOFF_HZ, DEFAULT_ORDER).unwrap();
        assert_eq!(out.len(), tone.len());
        let tail_peak = out.data[500..].iter().fold(0.0f64, |m, v| m.max(v.abs()));
        assert!(tail_peak < 1e-3, "residual {tail_peak}");
    }

    #[test]
    fn cutoff_at_or_above_nyquist_fails() {
        for cutoff in [125.0, 200.0, 0.0] {
            let err = ButterworthLowpass::design(5, cutoff, 250.0).unwrap_err();
            assert!(matches!(err, PvcError::ParameterRange(_)));
        }
        assert!(ButterworthLowpass::design(0, 15.0, 250.0).is_err());
        assert!(ButterworthLowpass::design(5, 15.0, 0.0).is_err());
    }
}
