use assert_cmd::cargo::cargo_bin_cmd;
use serde::Deserialize;
use std::error::Error;
use std::path::PathBuf;

#[derive(Deserialize)]
struct PeaksOutput {
    threshold_factor: f64,
    count: usize,
    indices: Vec<usize>,
    times_ms: Vec<f64>,
}

#[derive(Deserialize)]
struct Bin {
    freq_hz: f64,
    magnitude: f64,
}

#[derive(Deserialize)]
struct SpectrumOutput {
    input_len: usize,
    fft_len: usize,
    band_limited: bool,
    spectral_bpm: Option<f64>,
    bins: Vec<Bin>,
}

fn trace_path() -> String {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .join("test_data/pulse_72bpm.txt");
    root.to_string_lossy().to_string()
}

#[test]
fn peaks_command_finds_every_beat() -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.args(["peaks", "--input", &trace_path()]);
    let out = cmd.assert().success().get_output().stdout.clone();
    let value: PeaksOutput = serde_json::from_slice(&out)?;
    assert_eq!(value.threshold_factor, 0.5);
    assert_eq!(value.count, 6);
    assert_eq!(value.indices, vec![10, 60, 110, 160, 210, 260]);
    assert!((value.times_ms[1] - 1000.0).abs() < 1e-9);
    Ok(())
}

#[test]
fn peaks_threshold_is_clamped() -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.args(["peaks", "--input", &trace_path(), "--threshold", "5"]);
    let out = cmd.assert().success().get_output().stdout.clone();
    let value: PeaksOutput = serde_json::from_slice(&out)?;
    assert_eq!(value.threshold_factor, 1.0);
    Ok(())
}

#[test]
fn spectrum_command_band_limits_by_default() -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.args(["spectrum", "--input", &trace_path()]);
    let out = cmd.assert().success().get_output().stdout.clone();
    let value: SpectrumOutput = serde_json::from_slice(&out)?;
    assert_eq!(value.input_len, 300);
    assert_eq!(value.fft_len, 512);
    assert!(value.band_limited);
    assert_eq!(value.bins.len(), 512);
    for bin in &value.bins {
        if !(0.7..=3.0).contains(&bin.freq_hz) {
            assert_eq!(bin.magnitude, 0.0);
        }
    }
    let bpm = value.spectral_bpm.unwrap();
    assert!((bpm - 72.0).abs() < 8.0, "spectral bpm {bpm}");
    Ok(())
}

#[test]
fn spectrum_command_without_band_pass_keeps_dc() -> Result<(), Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.args(["spectrum", "--input", &trace_path(), "--no-band-pass"]);
    let out = cmd.assert().success().get_output().stdout.clone();
    let value: SpectrumOutput = serde_json::from_slice(&out)?;
    assert!(!value.band_limited);
    assert!(value.bins[0].magnitude > 100.0);
    Ok(())
}
