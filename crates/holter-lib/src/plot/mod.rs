use crate::detectors::pvc::{PvcCandidate, PvcTier};
use crate::signal::TimeSeries;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub width: f32,
    pub color: Color,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub fn rgb(self) -> (u8, u8, u8) {
        (
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

/// Point markers; `style.width` is the marker radius.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScatterSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Series {
    Line(LineSeries),
    Scatter(ScatterSeries),
}

impl Series {
    pub fn name(&self) -> &str {
        match self {
            Series::Line(s) => &s.name,
            Series::Scatter(s) => &s.name,
        }
    }

    pub fn points(&self) -> &[[f64; 2]] {
        match self {
            Series::Line(s) => &s.points,
            Series::Scatter(s) => &s.points,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub series: Vec<Series>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis { label: None },
            y: Axis { label: None },
            series: Vec::new(),
        }
    }

    pub fn add_series(&mut self, series: Series) {
        self.series.push(series);
    }

    /// `(min, max)` over all points along axis 0 (x) or 1 (y).
    pub fn bounds(&self, axis: usize) -> Option<(f64, f64)> {
        self.series
            .iter()
            .flat_map(|s| s.points().iter().map(move |p| p[axis]))
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((f64::min(lo, v), f64::max(hi, v))),
            })
    }
}

/// Rendering target for a [`Figure`].
pub trait PlotBackend {
    fn draw(&mut self, fig: &Figure) -> anyhow::Result<()>;
}

pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points {
        return points.to_vec();
    }
    let bucket_size = points.len() as f64 / max_points as f64;
    let mut result = Vec::with_capacity(max_points);
    for i in 0..max_points {
        let start = (i as f64 * bucket_size).floor() as usize;
        if start >= points.len() {
            break;
        }
        result.push(points[start]);
    }
    result
}

pub fn tier_color(tier: PvcTier) -> Color {
    match tier {
        PvcTier::Premature => Color(0xFF0000),
        PvcTier::Compensatory => Color(0x00BFBF),
        PvcTier::Symmetric => Color(0xBF00BF),
        PvcTier::Full => Color(0x008000),
    }
}

/// Filtered ECG trace with one marker series per PVC tier.
///
/// Markers sit at full resolution even when the trace is decimated.
pub fn figure_from_pvc_report(
    filtered: &TimeSeries,
    candidates: &[PvcCandidate],
    max_points: usize,
) -> Figure {
    let dt = 1.0 / filtered.fs.max(1.0);
    let full = candidates
        .iter()
        .filter(|c| c.tier == PvcTier::Full)
        .count();
    let mut fig = Figure::new(Some(format!("{full} PVCs detected")));
    fig.x.label = Some("Time (s)".into());
    fig.y.label = Some("ECG".into());

    let trace: Vec<[f64; 2]> = filtered
        .data
        .iter()
        .enumerate()
        .map(|(i, value)| [i as f64 * dt, *value])
        .collect();
    fig.add_series(Series::Line(LineSeries {
        name: "ECG Signal".into(),
        points: decimate_points(&trace, max_points),
        style: Style {
            width: 1.4,
            color: Color(0x1F77B4),
        },
    }));

    for tier in PvcTier::ALL {
        let points: Vec<[f64; 2]> = candidates
            .iter()
            .filter(|c| c.tier == tier)
            .filter_map(|c| filtered.data.get(c.index).map(|&y| [c.index as f64 * dt, y]))
            .collect();
        fig.add_series(Series::Scatter(ScatterSeries {
            name: tier.label().into(),
            points,
            style: Style {
                width: 5.0,
                color: tier_color(tier),
            },
        }));
    }
    fig
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimation_caps_point_count() {
        let points: Vec<[f64; 2]> = (0..1000).map(|i| [i as f64, 0.0]).collect();
        let out = decimate_points(&points, 100);
        assert_eq!(out.len(), 100);
        assert_eq!(out[1], [10.0, 0.0]);
        assert_eq!(decimate_points(&points[..10], 100).len(), 10);
    }

    #[test]
    fn pvc_figure_has_trace_and_tier_markers() {
        let ts = TimeSeries {
            fs: 100.0,
            data: (0..500).map(|i| (i as f64 * 0.1).sin()).collect(),
        };
        let candidates = [
            PvcCandidate {
                index: 120,
                tier: PvcTier::Premature,
            },
            PvcCandidate {
                index: 300,
                tier: PvcTier::Full,
            },
            PvcCandidate {
                index: 410,
                tier: PvcTier::Full,
            },
        ];
        let fig = figure_from_pvc_report(&ts, &candidates, 128);
        assert_eq!(fig.title.as_deref(), Some("2 PVCs detected"));
        assert_eq!(fig.series.len(), 5);
        assert_eq!(fig.series[0].points().len(), 128);
        assert_eq!(fig.series[1].points(), &[[120.0 * 0.01, ts.data[120]]]);
        assert_eq!(fig.series[4].name(), "PVC");
        assert_eq!(fig.series[4].points().len(), 2);
        let (x_min, x_max) = fig.bounds(0).unwrap();
        assert_eq!(x_min, 0.0);
        assert!(x_max >= 4.1);
    }

    #[test]
    fn color_components() {
        assert_eq!(Color(0x00BFBF).rgb(), (0, 0xBF, 0xBF));
    }
}
