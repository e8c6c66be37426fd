use crate::signal::{Events, TimeSeries};
use serde::{Deserialize, Serialize};

/// Which time axis a detector's R-peak indices refer to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PeakTimebase {
    /// Peaks sit on the returned `filtered` trace.
    #[default]
    Filtered,
    /// Peaks index the recording before conditioning, so the conditioned
    /// trace lags them by the low-pass group delay.
    Recording,
}

/// Output of a beat detector: R-peak indices plus the trace they were found on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeatDetection {
    pub rpeaks: Events,
    /// Same length as the detector input.
    pub filtered: TimeSeries,
    #[serde(default)]
    pub timebase: PeakTimebase,
}

/// Anything that can locate R-peaks in a conditioned ECG trace.
pub trait BeatDetector {
    fn detect(&self, ts: &TimeSeries) -> BeatDetection;
}

/// Configurable parameters for the Pan–Tompkins style R-peak detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcgPipelineConfig {
    /// Lower cutoff for the single-pole high-pass filter (Hz).
    pub lowcut_hz: f64,
    /// Upper cutoff for the single-pole low-pass filter (Hz).
    pub highcut_hz: f64,
    /// Moving window integration length (seconds).
    pub integration_window_s: f64,
    /// Minimum physiological RR distance / refractory period (seconds).
    pub min_rr_s: f64,
    /// Scale between noise and signal envelopes for the adaptive threshold.
    pub threshold_scale: f64,
    /// How far back to search (seconds) for the precise R-peak after a detection.
    pub search_back_s: f64,
}

impl Default for EcgPipelineConfig {
    fn default() -> Self {
        Self {
            lowcut_hz: 5.0,
            highcut_hz: 15.0,
            integration_window_s: 0.150,
            min_rr_s: 0.120,
            threshold_scale: 0.6,
            search_back_s: 0.150,
        }
    }
}

/// Adaptive-threshold detector over the band-passed, squared derivative envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanTompkinsDetector {
    pub cfg: EcgPipelineConfig,
}

impl PanTompkinsDetector {
    pub fn new(cfg: EcgPipelineConfig) -> Self {
        Self { cfg }
    }
}

impl BeatDetector for PanTompkinsDetector {
    fn detect(&self, ts: &TimeSeries) -> BeatDetection {
        if ts.is_empty() {
            return BeatDetection {
                rpeaks: Events::default(),
                filtered: ts.clone(),
                timebase: PeakTimebase::Filtered,
            };
        }
        let (bandpassed, integrated) = pan_tompkins_envelope(ts, &self.cfg);
        let mut peaks = pick_peaks(&bandpassed, &integrated, ts.fs, &self.cfg);
        if peaks.len() < 2 {
            // Fall back to the naive peak picker if the adaptive method underperformed.
            log::debug!("adaptive picker found {} peaks, using fallback", peaks.len());
            peaks = fallback_peak_picker(ts, &self.cfg);
        }
        BeatDetection {
            rpeaks: Events::from_indices(peaks),
            filtered: TimeSeries {
                fs: ts.fs,
                data: bandpassed,
            },
            timebase: PeakTimebase::Filtered,
        }
    }
}

/// Peaks supplied by the caller, e.g. from an annotation file.
///
/// The indices refer to the unconditioned recording. The input trace is
/// passed through unchanged as the filtered signal.
#[derive(Debug, Clone)]
pub struct PrecomputedPeaks {
    pub rpeaks: Events,
}

impl PrecomputedPeaks {
    pub fn new(rpeaks: Events) -> Self {
        Self { rpeaks }
    }
}

impl BeatDetector for PrecomputedPeaks {
    fn detect(&self, ts: &TimeSeries) -> BeatDetection {
        BeatDetection {
            rpeaks: self.rpeaks.clone(),
            filtered: ts.clone(),
            timebase: PeakTimebase::Recording,
        }
    }
}

/// Detect R-peaks with default settings and a custom refractory period.
pub fn detect_r_peaks(ts: &TimeSeries, min_rr_s: f64) -> Events {
    let cfg = EcgPipelineConfig {
        min_rr_s: min_rr_s.max(0.15),
        ..EcgPipelineConfig::default()
    };
    PanTompkinsDetector::new(cfg).detect(ts).rpeaks
}

fn pan_tompkins_envelope(ts: &TimeSeries, cfg: &EcgPipelineConfig) -> (Vec<f64>, Vec<f64>) {
    let data = &ts.data;
    let fs = ts.fs.max(1.0);
    let bandpassed = bandpass(data, fs, cfg.lowcut_hz, cfg.highcut_hz);
    let derivative = derivative(&bandpassed);
    let squared: Vec<f64> = derivative.iter().map(|x| x * x).collect();
    let win = ((cfg.integration_window_s * fs).round() as usize).max(1);
    let integrated = moving_average(&squared, win);
    (bandpassed, integrated)
}

fn bandpass(data: &[f64], fs: f64, low: f64, high: f64) -> Vec<f64> {
    let hp = if low > 0.0 {
        single_pole_highpass(data, fs, low)
    } else {
        data.to_vec()
    };
    if high <= 0.0 || high >= fs * 0.5 {
        hp
    } else {
        single_pole_lowpass(&hp, fs, high)
    }
}

fn rc_constant(cutoff: f64) -> f64 {
    1.0 / (2.0 * std::f64::consts::PI * cutoff.max(0.01))
}

fn single_pole_highpass(data: &[f64], fs: f64, cutoff: f64) -> Vec<f64> {
    let Some(&first) = data.first() else {
        return Vec::new();
    };
    let dt = 1.0 / fs;
    let rc = rc_constant(cutoff);
    let alpha = rc / (rc + dt);
    let mut prev_y = first;
    let mut prev_x = first;
    data.iter()
        .map(|&x| {
            let y = alpha * (prev_y + x - prev_x);
            prev_y = y;
            prev_x = x;
            y
        })
        .collect()
}

fn single_pole_lowpass(data: &[f64], fs: f64, cutoff: f64) -> Vec<f64> {
    let Some(&first) = data.first() else {
        return Vec::new();
    };
    let dt = 1.0 / fs;
    let rc = rc_constant(cutoff);
    let alpha = dt / (rc + dt);
    let mut prev = first;
    data.iter()
        .map(|&x| {
            prev += alpha * (x - prev);
            prev
        })
        .collect()
}

fn derivative(data: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; data.len()];
    for i in 1..data.len() {
        out[i] = data[i] - data[i - 1];
    }
    out
}

fn moving_average(data: &[f64], win: usize) -> Vec<f64> {
    if win <= 1 {
        return data.to_vec();
    }
    let mut out = vec![0.0; data.len()];
    let mut acc = 0.0;
    for (i, &sample) in data.iter().enumerate() {
        acc += sample;
        if i >= win {
            acc -= data[i - win];
        }
        out[i] = acc / win as f64;
    }
    out
}

/// Running signal and noise envelope levels driving the detection threshold.
struct AdaptiveThreshold {
    signal: f64,
    noise: f64,
    scale: f64,
}

impl AdaptiveThreshold {
    const LEARNING_RATE: f64 = 0.125;

    /// Seed both levels from the mean envelope over the first second.
    fn learn(envelope: &[f64], fs: f64, scale: f64) -> Self {
        let warmup = &envelope[..envelope.len().min((fs as usize).max(1))];
        let mean = warmup.iter().sum::<f64>() / warmup.len() as f64;
        Self {
            signal: mean,
            noise: mean * 0.5,
            scale,
        }
    }

    fn level(&self) -> f64 {
        self.noise + self.scale * (self.signal - self.noise).max(0.0)
    }

    fn update_signal(&mut self, sample: f64) {
        self.signal += Self::LEARNING_RATE * (sample - self.signal);
    }

    fn update_noise(&mut self, sample: f64) {
        self.noise += Self::LEARNING_RATE * (sample - self.noise);
    }
}

/// Index of the largest value in `data[start..=end]`.
fn argmax_in(data: &[f64], start: usize, end: usize) -> usize {
    data[start..=end]
        .iter()
        .enumerate()
        .fold((start, f64::MIN), |(best, max), (offset, &v)| {
            if v > max {
                (start + offset, v)
            } else {
                (best, max)
            }
        })
        .0
}

fn pick_peaks(
    bandpassed: &[f64],
    envelope: &[f64],
    fs: f64,
    cfg: &EcgPipelineConfig,
) -> Vec<usize> {
    if bandpassed.is_empty() || envelope.is_empty() {
        return Vec::new();
    }
    let refractory = ((cfg.min_rr_s * fs).round() as usize).max(1);
    let search = ((cfg.search_back_s * fs).round() as usize).max(1);
    let mut threshold = AdaptiveThreshold::learn(envelope, fs, cfg.threshold_scale);
    let mut last_detection: Option<usize> = None;
    let mut peaks = Vec::new();

    for (i, &sample) in envelope.iter().enumerate() {
        let past_refractory = last_detection.map_or(true, |last| i - last >= refractory);
        if past_refractory && sample >= threshold.level() {
            let end = i.min(bandpassed.len() - 1);
            peaks.push(argmax_in(bandpassed, i.saturating_sub(search).min(end), end));
            last_detection = Some(i);
            threshold.update_signal(sample);
        } else {
            threshold.update_noise(sample);
        }
    }

    peaks.sort_unstable();
    peaks.dedup();
    peaks
}

/// Local maxima of the detrended trace, at least `min_rr_s` apart.
fn fallback_peak_picker(ts: &TimeSeries, cfg: &EcgPipelineConfig) -> Vec<usize> {
    if ts.len() < 3 {
        return Vec::new();
    }
    let min_gap = ((cfg.min_rr_s * ts.fs) as usize).max(1);
    let trend = moving_average(&ts.data, ((0.150 * ts.fs) as usize).max(1));
    let detrended: Vec<f64> = ts.data.iter().zip(&trend).map(|(x, m)| x - m).collect();

    let mut peaks: Vec<usize> = Vec::new();
    for (offset, w) in detrended.windows(3).enumerate() {
        let i = offset + 1;
        let is_local_max = w[1] > 0.0 && w[1] > w[0] && w[1] > w[2];
        let spaced = peaks.last().map_or(true, |&last| i - last >= min_gap);
        if is_local_max && spaced {
            peaks.push(i);
        }
    }
    peaks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::lowpass_filter;

    fn synthetic_timeseries(fs: f64, rr: &[f64]) -> TimeSeries {
        use std::f64::consts::PI;
        let mut beats = Vec::with_capacity(rr.len() + 1);
        let mut t = 0.5;
        beats.push(t);
        for &interval in rr {
            t += interval;
            beats.push(t);
        }
        let duration = beats.last().copied().unwrap_or(1.0) + 1.0;
        let samples = (duration * fs) as usize;
        let mut data = Vec::with_capacity(samples);
        for i in 0..samples {
            let time = i as f64 / fs;
            let mut v = 0.05 * (2.0 * PI * 1.0 * time).sin();
            for &bt in &beats {
                let width = 0.02;
                let amp = (-0.5 * ((time - bt) / width).powi(2)).exp();
                v += 1.2 * amp;
            }
            data.push(v);
        }
        TimeSeries { fs, data }
    }

    #[test]
    fn detects_regular_beats() {
        let fs = 250.0;
        let rr = [0.82, 0.78, 0.8, 0.79, 0.81, 0.77, 0.84, 0.88];
        let ts = synthetic_timeseries(fs, &rr);
        let events = detect_r_peaks(&ts, 0.3);
        assert_eq!(events.indices.len(), rr.len() + 1);
    }

    #[test]
    fn detection_keeps_signal_length() {
        let fs = 250.0;
        let rr = [0.9, 0.85, 0.88, 0.86, 0.82, 0.81, 0.8];
        let ts = synthetic_timeseries(fs, &rr);
        let conditioned = lowpass_filter(&ts, 15.0, 5).unwrap();
        let detection = PanTompkinsDetector::default().detect(&conditioned);
        assert_eq!(detection.filtered.len(), ts.len());
        assert!(detection.rpeaks.len() >= 2);
        assert!(detection
            .rpeaks
            .indices
            .windows(2)
            .all(|w| w[0] < w[1]));
    }

    #[test]
    fn precomputed_peaks_pass_signal_through() {
        let ts = TimeSeries {
            fs: 100.0,
            data: vec![0.0, 1.0, 0.0, 1.0],
        };
        let detection = PrecomputedPeaks::new(Events::from_indices(vec![1, 3])).detect(&ts);
        assert_eq!(detection.rpeaks.indices, vec![1, 3]);
        assert_eq!(detection.filtered.data, ts.data);
        assert_eq!(detection.timebase, PeakTimebase::Recording);
    }

    #[test]
    fn empty_signal_yields_no_peaks() {
        let ts = TimeSeries {
            fs: 250.0,
            data: Vec::new(),
        };
        assert!(PanTompkinsDetector::default().detect(&ts).rpeaks.is_empty());
    }
}
