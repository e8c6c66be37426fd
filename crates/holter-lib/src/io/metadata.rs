use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Acquisition metadata shipped next to a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetadata {
    /// Hz
    pub sampling_rate: f64,
    pub start_time: String,
    pub units: String,
}

fn required<'a>(doc: &'a Value, key: &str) -> Result<&'a Value> {
    doc.get(key)
        .ok_or_else(|| anyhow!("metadata is missing key {}", key))
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn parse_metadata(text: &str) -> Result<RecordingMetadata> {
    let doc: Value = serde_json::from_str(text).context("metadata is not valid JSON")?;

    let raw_fs = required(&doc, "sampling_rate")?;
    let sampling_rate = match raw_fs {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| anyhow!("metadata has non-numerical sampling_rate value: {}", raw_fs))?;
    if !(sampling_rate > 0.0) || !sampling_rate.is_finite() {
        anyhow::bail!("metadata has negative or zero sampling_rate value");
    }

    let start_time = as_text(required(&doc, "start_time")?);
    let units = as_text(required(&doc, "units")?);
    Ok(RecordingMetadata {
        sampling_rate,
        start_time,
        units,
    })
}

pub fn read_metadata(path: &Path) -> Result<RecordingMetadata> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if !is_json {
        anyhow::bail!("{} was not a json file", path.display());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_metadata(&text).with_context(|| format!("loading {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_numeric_strings() {
        let meta = parse_metadata(
            r#"{"sampling_rate": "1000", "start_time": "2017-03-01 10:00:00", "units": "mV"}"#,
        )
        .unwrap();
        assert_eq!(meta.sampling_rate, 1000.0);
        assert_eq!(meta.units, "mV");
    }

    #[test]
    fn reports_missing_keys() {
        let err = parse_metadata(r#"{"sampling_rate": 250, "units": "mV"}"#).unwrap_err();
        assert!(err.to_string().contains("start_time"));
    }

    #[test]
    fn rejects_bad_sampling_rates() {
        let base = |fs: &str| {
            format!(r#"{{"sampling_rate": {fs}, "start_time": "t", "units": "mV"}}"#)
        };
        assert!(parse_metadata(&base("0")).is_err());
        assert!(parse_metadata(&base("-250")).is_err());
        assert!(parse_metadata(&base("\"fast\"")).is_err());
    }
}
