pub mod binary;
pub mod lvm;
pub mod metadata;
pub mod text;

use crate::signal::TimeSeries;
use anyhow::{anyhow, Result};
use std::path::Path;

/// Samples plus the time stamp of each one, in seconds.
#[derive(Debug, Clone)]
pub struct Recording {
    pub series: TimeSeries,
    pub time: Vec<f64>,
}

impl From<TimeSeries> for Recording {
    fn from(series: TimeSeries) -> Self {
        let time = series.times();
        Self { series, time }
    }
}

/// Load a recording, choosing the reader from the file extension.
///
/// `.lvm` files may carry their own sampling rate and keep their time
/// column; other formats need `fs` and get a time axis built from it.
/// Text files contribute the requested `column`.
pub fn load_recording(path: &Path, fs: Option<f64>, column: usize) -> Result<Recording> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let need_fs = || anyhow!("sampling rate required for {}", path.display());
    let recording = match ext.as_str() {
        "lvm" => {
            let lvm = lvm::read_lvm(path)?;
            Recording {
                series: lvm.to_time_series(fs)?,
                time: lvm.time,
            }
        }
        "bin" => TimeSeries::new(fs.ok_or_else(need_fs)?, binary::read_bin(path)?)?.into(),
        _ => TimeSeries::new(fs.ok_or_else(need_fs)?, text::read_column(path, column)?)?.into(),
    };
    log::debug!(
        "loaded {} samples at {} Hz from {}",
        recording.series.len(),
        recording.series.fs,
        path.display()
    );
    Ok(recording)
}
