use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .to_path_buf()
}

#[test]
fn simulate_records_session_and_history() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let history = temp.path().join("history.csv");
    let samples = temp.path().join("buffer.txt");

    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.args([
        "simulate",
        "--seconds",
        "3",
        "--history",
        history.to_str().unwrap(),
        "--samples-out",
        samples.to_str().unwrap(),
    ]);
    let out = cmd.assert().success().get_output().stdout.clone();
    let value: Value = serde_json::from_slice(&out)?;
    assert_eq!(value["reason"], "SourceEnded");
    assert_eq!(value["ticks"], 180);
    assert_eq!(value["skipped"], 0);
    assert_eq!(value["final_bpm"], 72);
    assert_eq!(value["record"]["heart_rate"], 72);
    assert_eq!(value["record"]["samples_analyzed"], 180);
    let glucose = value["record"]["glucose_mg_dl"].as_u64().unwrap();
    assert!((80..=140).contains(&glucose));
    assert!(value["glucose_note"].as_str().unwrap().contains("not a glucose measurement"));

    let buffer = fs::read_to_string(&samples)?;
    assert_eq!(buffer.lines().filter(|l| !l.starts_with('#')).count(), 150);

    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.args(["history", "--file", history.to_str().unwrap()]);
    let out = cmd.assert().success().get_output().stdout.clone();
    let listed: Value = serde_json::from_slice(&out)?;
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["heart_rate"], 72);
    assert_eq!(listed[0]["glucose_mg_dl"].as_u64(), Some(glucose));

    // the exported buffer analyses back to the same rate
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.args(["analyze", "--input", samples.to_str().unwrap()]);
    let out = cmd.assert().success().get_output().stdout.clone();
    let report: Value = serde_json::from_slice(&out)?;
    assert_eq!(report["heart_rate"], 72);
    Ok(())
}

#[test]
fn simulate_uses_config_file() -> Result<(), Box<dyn Error>> {
    let config = workspace_root().join("test_data/pipeline.toml");
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.args(["simulate", "--bpm", "120", "--config", config.to_str().unwrap()]);
    let out = cmd.assert().success().get_output().stdout.clone();
    let value: Value = serde_json::from_slice(&out)?;
    assert_eq!(value["ticks"], 300);
    let bpm = value["final_bpm"].as_u64().unwrap();
    assert!((110..=130).contains(&bpm), "bpm {bpm}");
    assert_eq!(value["record"]["condition"], "Tachycardia");
    Ok(())
}

#[test]
fn history_limit_and_missing_file() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let history = temp.path().join("history.csv");
    for _ in 0..3 {
        let mut cmd = cargo_bin_cmd!("pulse");
        cmd.args([
            "simulate",
            "--seconds",
            "1",
            "--history",
            history.to_str().unwrap(),
        ]);
        cmd.assert().success();
    }
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.args(["history", "--file", history.to_str().unwrap(), "--limit", "2"]);
    let out = cmd.assert().success().get_output().stdout.clone();
    let listed: Value = serde_json::from_slice(&out)?;
    assert_eq!(listed.as_array().unwrap().len(), 2);

    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.args([
        "history",
        "--file",
        temp.path().join("none.csv").to_str().unwrap(),
    ]);
    let out = cmd.assert().success().get_output().stdout.clone();
    let listed: Value = serde_json::from_slice(&out)?;
    assert_eq!(listed, serde_json::json!([]));
    Ok(())
}

#[test]
fn simulate_rejects_unusable_camera() {
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.args(["simulate", "--camera-fps", "0"]);
    let out = cmd.assert().failure().get_output().stderr.clone();
    assert!(String::from_utf8_lossy(&out).contains("camera unavailable"));
}
