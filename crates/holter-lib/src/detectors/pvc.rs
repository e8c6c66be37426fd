//! Premature ventricular contraction screening.
//!
//! Each RR interval is compared with the robust baseline of its window and
//! walked through a four step cascade (prematurity, compensatory pause,
//! distance symmetry, amplitude below the histogram mode). The number of
//! steps a beat survives is its certainty tier.

use crate::{
    detectors::ecg::{BeatDetector, PeakTimebase},
    error::{PvcError, PvcResult},
    filter::{ButterworthLowpass, DEFAULT_CUTOFF_HZ, DEFAULT_ORDER},
    metrics::{
        amplitude::{amplitude_mode, ModeTieBreak, DEFAULT_HISTOGRAM_BINS},
        baseline::{Baseline, DEFAULT_WINDOW_S},
    },
    signal::{Events, RRSeries, TimeSeries},
};
use serde::{Deserialize, Serialize};

/// Confidence tier of a PVC candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum PvcTier {
    /// Early beat only.
    Premature = 1,
    /// Early beat followed by a compensatory pause.
    Compensatory = 2,
    /// Pause fully compensates: the pair averages to the baseline.
    Symmetric = 3,
    /// All criteria, including an amplitude below the signal mode.
    Full = 4,
}

impl PvcTier {
    pub const ALL: [PvcTier; 4] = [
        PvcTier::Premature,
        PvcTier::Compensatory,
        PvcTier::Symmetric,
        PvcTier::Full,
    ];

    pub fn level(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            PvcTier::Premature => "1 PVC Criterion Met",
            PvcTier::Compensatory => "2 PVC Criteria Met",
            PvcTier::Symmetric => "3 PVC Criteria Met",
            PvcTier::Full => "PVC",
        }
    }
}

impl From<PvcTier> for u8 {
    fn from(tier: PvcTier) -> Self {
        tier.level()
    }
}

impl TryFrom<u8> for PvcTier {
    type Error = PvcError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(PvcTier::Premature),
            2 => Ok(PvcTier::Compensatory),
            3 => Ok(PvcTier::Symmetric),
            4 => Ok(PvcTier::Full),
            other => Err(PvcError::range(format!("tier must be 1-4, got {other}"))),
        }
    }
}

/// Sample index of a flagged beat and its tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PvcCandidate {
    pub index: usize,
    pub tier: PvcTier,
}

/// Fractional deviations from the baseline used by the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PvcThresholds {
    pub prematurity: f64,
    pub compensatory: f64,
    pub distance_tolerance: f64,
}

impl Default for PvcThresholds {
    fn default() -> Self {
        Self {
            prematurity: 0.15,
            compensatory: 0.05,
            distance_tolerance: 0.20,
        }
    }
}

/// Which signal feeds the amplitude mode estimate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AmplitudeSource {
    /// Detector output, the same trace the beat amplitudes are read from.
    #[default]
    Filtered,
    /// Unconditioned input.
    Raw,
}

/// Parameters for the full conditioning + classification pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PvcConfig {
    /// Butterworth low-pass cutoff (Hz).
    pub cutoff_hz: f64,
    pub filter_order: usize,
    /// Baseline window length (seconds).
    pub window_s: f64,
    pub prematurity: f64,
    pub compensatory: f64,
    pub distance_tolerance: f64,
    pub histogram_bins: usize,
    pub mode_tie_break: ModeTieBreak,
    pub amplitude_source: AmplitudeSource,
}

impl Default for PvcConfig {
    fn default() -> Self {
        let thresholds = PvcThresholds::default();
        Self {
            cutoff_hz: DEFAULT_CUTOFF_HZ,
            filter_order: DEFAULT_ORDER,
            window_s: DEFAULT_WINDOW_S,
            prematurity: thresholds.prematurity,
            compensatory: thresholds.compensatory,
            distance_tolerance: thresholds.distance_tolerance,
            histogram_bins: DEFAULT_HISTOGRAM_BINS,
            mode_tie_break: ModeTieBreak::default(),
            amplitude_source: AmplitudeSource::default(),
        }
    }
}

impl PvcConfig {
    pub fn thresholds(&self) -> PvcThresholds {
        PvcThresholds {
            prematurity: self.prematurity,
            compensatory: self.compensatory,
            distance_tolerance: self.distance_tolerance,
        }
    }

    /// Range checks that do not depend on the recording.
    pub fn validate(&self) -> PvcResult<()> {
        if !(self.window_s > 0.0) || !self.window_s.is_finite() {
            return Err(PvcError::range(format!(
                "window length must be positive, got {}",
                self.window_s
            )));
        }
        if self.filter_order == 0 {
            return Err(PvcError::range("filter order must be at least 1"));
        }
        if self.histogram_bins == 0 {
            return Err(PvcError::range("histogram needs at least one bin"));
        }
        for (name, value) in [
            ("prematurity", self.prematurity),
            ("compensatory", self.compensatory),
            ("distance_tolerance", self.distance_tolerance),
        ] {
            if !(value >= 0.0) || !value.is_finite() {
                return Err(PvcError::range(format!(
                    "{name} threshold must be a non-negative fraction, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Position in the baseline sequence while walking the RR intervals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BaselineCursor {
    pub window: usize,
}

impl BaselineCursor {
    /// Cursor for beat `i`, moving at most one window past `self`.
    ///
    /// The cursor only moves once beat `i` is strictly past the boundary of
    /// the current window, and never beyond the trailing window.
    pub fn advance(self, i: usize, boundaries: &[usize]) -> Self {
        match boundaries.get(self.window) {
            Some(&boundary) if i > 0 && i > boundary => Self {
                window: self.window + 1,
            },
            _ => self,
        }
    }
}

/// Fractional deviation of `value` from `baseline`.
fn deviation(value: f64, baseline: f64) -> f64 {
    (value - baseline) / baseline
}

/// Run the cascade for one beat. `None` means the beat is not premature.
pub fn classify_beat(
    rr_current: f64,
    rr_next: f64,
    baseline: f64,
    amplitude: f64,
    mode: f64,
    thresholds: &PvcThresholds,
) -> Option<PvcTier> {
    if deviation(rr_current, baseline) > -thresholds.prematurity {
        return None;
    }
    if deviation(rr_next, baseline) < thresholds.compensatory {
        return Some(PvcTier::Premature);
    }
    let pair_mean = (rr_current + rr_next) / 2.0;
    if deviation(pair_mean, baseline).abs() > thresholds.distance_tolerance {
        return Some(PvcTier::Compensatory);
    }
    if amplitude >= mode {
        Some(PvcTier::Symmetric)
    } else {
        Some(PvcTier::Full)
    }
}

/// Flagged beat indices grouped by tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PvcClassification {
    pub premature: Vec<usize>,
    pub compensatory: Vec<usize>,
    pub symmetric: Vec<usize>,
    pub full: Vec<usize>,
    /// Number of Tier 4 detections.
    pub full_count: usize,
}

impl PvcClassification {
    fn push(&mut self, index: usize, tier: PvcTier) {
        match tier {
            PvcTier::Premature => self.premature.push(index),
            PvcTier::Compensatory => self.compensatory.push(index),
            PvcTier::Symmetric => self.symmetric.push(index),
            PvcTier::Full => {
                self.full.push(index);
                self.full_count += 1;
            }
        }
    }

    pub fn tier(&self, tier: PvcTier) -> &[usize] {
        match tier {
            PvcTier::Premature => &self.premature,
            PvcTier::Compensatory => &self.compensatory,
            PvcTier::Symmetric => &self.symmetric,
            PvcTier::Full => &self.full,
        }
    }

    pub fn total(&self) -> usize {
        PvcTier::ALL.iter().map(|&t| self.tier(t).len()).sum()
    }
}

/// Beat amplitudes read from `trace`, one per peak.
///
/// With a non-zero `reach` each read moves to the sample in
/// `[peak, peak + reach]` farthest from `reference`, following an R-wave
/// that a causal filter pushed past its annotated index.
pub fn beat_amplitudes(
    trace: &[f64],
    peaks: &Events,
    reach: usize,
    reference: f64,
) -> PvcResult<Vec<f64>> {
    peaks
        .indices
        .iter()
        .map(|&peak| {
            if peak >= trace.len() {
                return Err(PvcError::range(format!(
                    "R-peak {peak} lies outside a filtered signal of {} samples",
                    trace.len()
                )));
            }
            let end = peak.saturating_add(reach).min(trace.len() - 1);
            Ok(trace[peak..=end].iter().fold(trace[peak], |best, &v| {
                if (v - reference).abs() > (best - reference).abs() {
                    v
                } else {
                    best
                }
            }))
        })
        .collect()
}

/// Classify every beat that still has a following interval for look-ahead.
///
/// Beat `i + 1` is judged from intervals `i` and `i + 1`; the last two
/// intervals never start a test. Amplitudes are read at the peak indices.
pub fn classify_pvcs(
    rr: &RRSeries,
    baseline: &Baseline,
    peaks: &Events,
    filtered: &[f64],
    mode: f64,
    thresholds: &PvcThresholds,
) -> PvcResult<PvcClassification> {
    let amplitudes = beat_amplitudes(filtered, peaks, 0, mode)?;
    classify_with_amplitudes(rr, baseline, peaks, &amplitudes, mode, thresholds)
}

/// [`classify_pvcs`] with one precomputed amplitude per peak.
pub fn classify_with_amplitudes(
    rr: &RRSeries,
    baseline: &Baseline,
    peaks: &Events,
    amplitudes: &[f64],
    mode: f64,
    thresholds: &PvcThresholds,
) -> PvcResult<PvcClassification> {
    if peaks.len() != rr.len() + 1 || amplitudes.len() != peaks.len() {
        return Err(PvcError::range(format!(
            "{} R-peaks and {} amplitudes do not match {} RR intervals",
            peaks.len(),
            amplitudes.len(),
            rr.len()
        )));
    }
    if baseline.averages.len() != baseline.boundaries.len() + 1 {
        return Err(PvcError::range(format!(
            "baseline has {} averages for {} boundaries",
            baseline.averages.len(),
            baseline.boundaries.len()
        )));
    }
    let mut out = PvcClassification::default();
    let mut cursor = BaselineCursor::default();
    let intervals = &rr.intervals;
    for i in 0..intervals.len().saturating_sub(2) {
        cursor = cursor.advance(i, &baseline.boundaries);
        let reference = baseline.averages[cursor.window];
        let tier = classify_beat(
            intervals[i] as f64,
            intervals[i + 1] as f64,
            reference,
            amplitudes[i + 1],
            mode,
            thresholds,
        );
        if let Some(tier) = tier {
            out.push(peaks.indices[i + 1], tier);
        }
    }
    Ok(out)
}

/// Merge the per-tier lists into one candidate list ordered by sample index.
pub fn assemble_candidates(classification: &PvcClassification) -> Vec<PvcCandidate> {
    let mut candidates: Vec<PvcCandidate> = PvcTier::ALL
        .iter()
        .flat_map(|&tier| {
            classification
                .tier(tier)
                .iter()
                .map(move |&index| PvcCandidate { index, tier })
        })
        .collect();
    candidates.sort_by_key(|c| c.index);
    candidates
}

/// Everything the pipeline learned about one recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PvcReport {
    pub fs: f64,
    pub sample_count: usize,
    pub rpeaks: Events,
    pub rr: RRSeries,
    pub baseline: Baseline,
    pub amplitude_mode: f64,
    pub candidates: Vec<PvcCandidate>,
    /// Candidate count per tier, Tier 1 first.
    pub tier_counts: [usize; 4],
    pub pvc_count: usize,
}

/// Run interval extraction, baselining, mode estimation and classification on detected beats.
///
/// `filtered` is the trace beat amplitudes are read from; `raw` is only used
/// when the configuration asks for the mode of the unconditioned signal.
/// `amplitude_reach` is the search span handed to [`beat_amplitudes`].
pub fn analyze_beats(
    filtered: &TimeSeries,
    raw: &TimeSeries,
    peaks: &Events,
    amplitude_reach: usize,
    cfg: &PvcConfig,
) -> PvcResult<PvcReport> {
    cfg.validate()?;
    filtered.validate()?;
    peaks.validate_within(filtered.len())?;

    let rr = RRSeries::from_events(peaks, filtered.fs)?;
    let baseline = Baseline::estimate(&rr, cfg.window_s)?;
    let mode_source = match cfg.amplitude_source {
        AmplitudeSource::Filtered => &filtered.data,
        AmplitudeSource::Raw => &raw.data,
    };
    let mode = amplitude_mode(mode_source, cfg.histogram_bins, cfg.mode_tie_break)?;
    let amplitudes = beat_amplitudes(&filtered.data, peaks, amplitude_reach, mode)?;

    let classification = classify_with_amplitudes(
        &rr,
        &baseline,
        peaks,
        &amplitudes,
        mode,
        &cfg.thresholds(),
    )?;
    let candidates = assemble_candidates(&classification);
    let tier_counts = PvcTier::ALL.map(|t| classification.tier(t).len());
    log::info!(
        "{} PVCs detected ({} candidates over {} beats)",
        classification.full_count,
        candidates.len(),
        peaks.len()
    );

    Ok(PvcReport {
        fs: filtered.fs,
        sample_count: filtered.len(),
        rpeaks: peaks.clone(),
        rr,
        baseline,
        amplitude_mode: mode,
        candidates,
        tier_counts,
        pvc_count: classification.full_count,
    })
}

/// A report together with the trace its amplitudes were read from.
#[derive(Debug, Clone)]
pub struct PvcAnalysis {
    pub report: PvcReport,
    pub filtered: TimeSeries,
}

/// Condition the raw recording, detect beats and classify them.
pub fn run_pvc_pipeline(
    ts: &TimeSeries,
    detector: &dyn BeatDetector,
    cfg: &PvcConfig,
) -> PvcResult<PvcReport> {
    analyze_recording(ts, detector, cfg).map(|analysis| analysis.report)
}

/// [`run_pvc_pipeline`], also returning the detector's filtered trace.
pub fn analyze_recording(
    ts: &TimeSeries,
    detector: &dyn BeatDetector,
    cfg: &PvcConfig,
) -> PvcResult<PvcAnalysis> {
    cfg.validate()?;
    ts.validate()?;
    if cfg.window_s > ts.duration() {
        return Err(PvcError::WindowTooLarge {
            window_s: cfg.window_s,
            duration_s: ts.duration(),
        });
    }
    let filter = ButterworthLowpass::design(cfg.filter_order, cfg.cutoff_hz, ts.fs)?;
    let conditioned = TimeSeries {
        fs: ts.fs,
        data: filter.apply(&ts.data),
    };
    let detection = detector.detect(&conditioned);
    log::debug!(
        "detector returned {} R-peaks over {} samples",
        detection.rpeaks.len(),
        detection.filtered.len()
    );
    if detection.filtered.len() != ts.len() {
        return Err(PvcError::range(format!(
            "detector returned {} filtered samples for a {} sample recording",
            detection.filtered.len(),
            ts.len()
        )));
    }
    let reach = match detection.timebase {
        PeakTimebase::Filtered => 0,
        PeakTimebase::Recording => (2.0 * filter.group_delay_samples()).ceil().max(0.0) as usize,
    };
    let report = analyze_beats(&detection.filtered, ts, &detection.rpeaks, reach, cfg)?;
    Ok(PvcAnalysis {
        report,
        filtered: detection.filtered,
    })
}
