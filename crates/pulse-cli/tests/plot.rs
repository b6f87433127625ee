use assert_cmd::cargo::cargo_bin_cmd;
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

fn trace_path() -> String {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .join("test_data/pulse_72bpm.txt");
    root.to_string_lossy().to_string()
}

#[test]
fn plot_renders_waveform_and_spectrum() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    for kind in ["waveform", "spectrum"] {
        let out = temp.path().join(format!("{kind}.png"));
        let mut cmd = cargo_bin_cmd!("pulse");
        cmd.args([
            "plot",
            "--input",
            &trace_path(),
            "--kind",
            kind,
            "--out",
            out.to_str().unwrap(),
        ]);
        cmd.assert().success();
        let bytes = fs::read(&out)?;
        assert!(bytes.len() > PNG_MAGIC.len(), "{kind} plot is empty");
        assert_eq!(bytes[..8], PNG_MAGIC, "{kind} plot is not a PNG");
    }
    Ok(())
}

#[test]
fn plot_of_flat_trace_still_renders() -> Result<(), Box<dyn Error>> {
    let temp = tempdir()?;
    let out = temp.path().join("flat.png");
    let flat = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../test_data/flat.txt")
        .to_string_lossy()
        .to_string();
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.args(["plot", "--input", &flat, "--out", out.to_str().unwrap()]);
    cmd.assert().success();
    assert!(fs::metadata(&out)?.len() > 0);
    Ok(())
}
