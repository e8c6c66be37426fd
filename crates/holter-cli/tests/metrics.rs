use assert_cmd::cargo::cargo_bin_cmd;
use serde::Deserialize;
use std::error::Error;

#[derive(Deserialize)]
struct BaselineOutput {
    intervals: Vec<usize>,
    boundaries: Vec<usize>,
    averages: Vec<f64>,
}

#[test]
fn rr_baseline_from_stdin() -> Result<(), Box<dyn Error>> {
    let peaks: Vec<String> = (0..25).map(|i| (i * 100).to_string()).collect();
    let mut cmd = cargo_bin_cmd!("holter");
    cmd.args(["rr-baseline", "--fs", "100", "--window-s", "10"])
        .write_stdin(peaks.join("\n"));
    let output = cmd.assert().success().get_output().stdout.clone();
    let baseline: BaselineOutput = serde_json::from_slice(&output)?;

    assert_eq!(baseline.intervals, vec![100; 24]);
    assert_eq!(baseline.boundaries, vec![9, 19]);
    assert_eq!(baseline.averages, vec![100.0; 3]);
    Ok(())
}

#[test]
fn rr_baseline_rejects_oversized_window() {
    let mut cmd = cargo_bin_cmd!("holter");
    cmd.args(["rr-baseline", "--fs", "100", "--window-s", "60"])
        .write_stdin("0\n100\n200\n300\n");
    cmd.assert().failure();
}

#[test]
fn amplitude_mode_picks_busiest_bin() -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("holter");
    cmd.args(["amplitude-mode", "--bins", "10"])
        .write_stdin("0\n0\n0\n1\n");
    let output = cmd.assert().success().get_output().stdout.clone();
    let value: serde_json::Value = serde_json::from_slice(&output)?;
    assert!((value["mode"].as_f64().unwrap() - 0.05).abs() < 1e-12);
    assert_eq!(value["bins"], 10);
    Ok(())
}

#[test]
fn amplitude_mode_tie_break_is_selectable() -> Result<(), Box<dyn Error>> {
    let run = |tie: &str| -> Result<f64, Box<dyn Error>> {
        let mut cmd = cargo_bin_cmd!("holter");
        cmd.args(["amplitude-mode", "--bins", "2", "--tie-break", tie])
            .write_stdin("0\n0\n4\n4\n");
        let output = cmd.assert().success().get_output().stdout.clone();
        let value: serde_json::Value = serde_json::from_slice(&output)?;
        Ok(value["mode"].as_f64().unwrap_or(f64::NAN))
    };
    assert_eq!(run("first")?, 1.0);
    assert_eq!(run("last")?, 3.0);
    Ok(())
}

#[test]
fn find_rpeaks_on_regular_rhythm() -> Result<(), Box<dyn Error>> {
    let fs = 250.0;
    let samples: Vec<String> = (0..(12.0 * fs) as usize)
        .map(|i| {
            let t = i as f64 / fs;
            let phase = (t - 0.5).rem_euclid(1.0);
            let d = phase.min(1.0 - phase);
            format!("{:.6}", (-0.5 * (d / 0.02).powi(2)).exp())
        })
        .collect();
    let mut cmd = cargo_bin_cmd!("holter");
    cmd.args(["ecg-find-rpeaks", "--fs", "250"])
        .write_stdin(samples.join("\n"));
    let output = cmd.assert().success().get_output().stdout.clone();
    let events: holter_lib::signal::Events = serde_json::from_slice(&output)?;
    assert!(events.len() >= 9 && events.len() <= 13, "found {}", events.len());
    assert!(events.indices.windows(2).all(|w| w[0] < w[1]));
    Ok(())
}
