//! LabView measurement (`.lvm`) text files.
//!
//! Only single-segment files are accepted. Data rows are `time, ecg[, ...]`;
//! the sampling rate comes from `Delta_X` when present, otherwise from the
//! spacing of the time column.

use crate::signal::TimeSeries;
use anyhow::{anyhow, Context, Result};
use std::path::Path;

const END_OF_HEADER: &str = "***End_of_Header***";
const FILE_MAGIC: &str = "LabVIEW Measurement";

/// Time and ECG columns of a single-segment LVM file.
#[derive(Debug, Clone, PartialEq)]
pub struct LvmRecording {
    pub time: Vec<f64>,
    pub ecg: Vec<f64>,
    /// Sample spacing from the segment header, in seconds.
    pub delta_x: Option<f64>,
}

impl LvmRecording {
    /// Sampling rate from `Delta_X`, or from the first two time stamps.
    pub fn sampling_rate(&self) -> Option<f64> {
        let dt = self
            .delta_x
            .or_else(|| match self.time.as_slice() {
                [t0, t1, ..] => Some(t1 - t0),
                _ => None,
            })?;
        (dt > 0.0).then(|| 1.0 / dt)
    }

    /// Convert to a series, preferring an explicit sampling rate over the file's.
    pub fn to_time_series(&self, fs: Option<f64>) -> Result<TimeSeries> {
        let fs = fs
            .or_else(|| self.sampling_rate())
            .ok_or_else(|| anyhow!("cannot infer sampling rate from LVM file; pass one explicitly"))?;
        Ok(TimeSeries::new(fs, self.ecg.clone())?)
    }
}

struct Layout {
    separator: char,
    decimal_comma: bool,
}

impl Layout {
    fn fields(&self, line: &str) -> Vec<String> {
        line.split(self.separator)
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(|f| {
                if self.decimal_comma {
                    f.replace(',', ".")
                } else {
                    f.to_string()
                }
            })
            .collect()
    }
}

pub fn parse_lvm(text: &str) -> Result<LvmRecording> {
    let has_file_header = text.trim_start().starts_with(FILE_MAGIC);
    let mut layout = Layout {
        separator: '\t',
        decimal_comma: false,
    };
    let mut markers = 0usize;
    let mut delta_x = None;
    let mut time = Vec::new();
    let mut ecg = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with(END_OF_HEADER) {
            markers += 1;
            continue;
        }
        let fields = layout.fields(trimmed);
        let numeric: Option<Vec<f64>> = fields.iter().map(|f| f.parse::<f64>().ok()).collect();
        match numeric {
            Some(values) if markers > 0 => {
                if values.len() < 2 {
                    log::warn!("lvm line {}: expected time and ecg columns, skipping", idx + 1);
                    continue;
                }
                time.push(values[0]);
                ecg.push(values[1]);
            }
            _ => {
                let key = fields.first().map(String::as_str).unwrap_or("");
                let value = fields.get(1).map(String::as_str);
                match (key, value) {
                    ("Separator", Some(sep)) => {
                        layout.separator = if sep.eq_ignore_ascii_case("comma") {
                            ','
                        } else {
                            '\t'
                        };
                    }
                    ("Decimal_Separator", Some(",")) => layout.decimal_comma = true,
                    ("Delta_X", Some(v)) => delta_x = v.parse::<f64>().ok(),
                    _ if !time.is_empty() => {
                        log::warn!("lvm line {}: non-numeric row after data, skipping", idx + 1)
                    }
                    _ => {}
                }
            }
        }
    }

    if markers == 0 {
        anyhow::bail!("no {} marker found; not a LabView measurement file", END_OF_HEADER);
    }
    let segments = markers - usize::from(has_file_header);
    if segments != 1 {
        anyhow::bail!("{} segments detected, expected exactly one", segments);
    }
    if ecg.is_empty() {
        anyhow::bail!("LVM file contains no data rows");
    }
    Ok(LvmRecording {
        time,
        ecg,
        delta_x,
    })
}

pub fn read_lvm(path: &Path) -> Result<LvmRecording> {
    let is_lvm = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("lvm"));
    if !is_lvm {
        anyhow::bail!("{} was not a LabView file", path.display());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let recording = parse_lvm(&text).with_context(|| format!("parsing {}", path.display()))?;
    log::debug!(
        "read {} samples from {}",
        recording.ecg.len(),
        path.display()
    );
    Ok(recording)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_lvm(segments: usize) -> String {
        let mut text = String::from(
            "LabVIEW Measurement\t\nWriter_Version\t2\nSeparator\tTab\nDecimal_Separator\t.\n***End_of_Header***\t\n\n",
        );
        for _ in 0..segments {
            text.push_str("Channels\t1\t\nSamples\t4\t\nX0\t0.0\t\nDelta_X\t0.004000\t\n***End_of_Header***\t\n");
            text.push_str("X_Value\tUntitled\tComment\n");
            text.push_str("0.000\t0.10\n0.004\t0.20\n0.008\t1.50\n0.012\t0.15\n");
        }
        text
    }

    #[test]
    fn parses_single_segment() {
        let rec = parse_lvm(&sample_lvm(1)).unwrap();
        assert_eq!(rec.ecg, vec![0.10, 0.20, 1.50, 0.15]);
        assert_eq!(rec.time.len(), 4);
        assert_eq!(rec.delta_x, Some(0.004));
        let ts = rec.to_time_series(None).unwrap();
        assert!((ts.fs - 250.0).abs() < 1e-9);
        assert_eq!(rec.to_time_series(Some(1000.0)).unwrap().fs, 1000.0);
    }

    #[test]
    fn rejects_multiple_segments() {
        let err = parse_lvm(&sample_lvm(2)).unwrap_err();
        assert!(err.to_string().contains("2 segments"));
    }

    #[test]
    fn honours_comma_decimal_separator() {
        let text = "LabVIEW Measurement\nSeparator\tTab\nDecimal_Separator\t,\n***End_of_Header***\n\
                    Channels\t1\n***End_of_Header***\nX_Value\tUntitled\n0,000\t0,5\n0,001\t-0,25\n";
        let rec = parse_lvm(text).unwrap();
        assert_eq!(rec.ecg, vec![0.5, -0.25]);
        assert!((rec.sampling_rate().unwrap() - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn plain_text_is_not_lvm() {
        assert!(parse_lvm("0.0\t1.0\n").is_err());
    }

    #[test]
    fn extension_is_checked() {
        let err = read_lvm(Path::new("recording.txt")).unwrap_err();
        assert!(err.to_string().contains("not a LabView file"));
    }
}
