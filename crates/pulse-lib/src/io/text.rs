use crate::signal::Sample;
use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::path::Path;

fn fields(line: &str) -> Vec<&str> {
    line.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|f| !f.is_empty())
        .collect()
}

/// Parse a recorded pulse trace, one sample per line, ignoring blank and
/// `#` comment lines.
///
/// A line is either `value` or `t_ms,value` (comma or whitespace separated).
/// Single-column lines are timestamped at `i * 1000 / sample_rate_hz`.
/// Values must be finite and timestamps must not go backwards.
pub fn parse_sample_series(text: &str, sample_rate_hz: f64) -> Result<Vec<Sample>> {
    let mut out: Vec<Sample> = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let cols = fields(trimmed);
        let parse = |s: &str| -> Result<f64> {
            s.parse::<f64>()
                .with_context(|| format!("line {} is not numeric: {}", idx + 1, trimmed))
        };
        let sample = match cols.as_slice() {
            [value] => Sample::new(out.len() as f64 * 1000.0 / sample_rate_hz, parse(*value)?),
            [t_ms, value] => Sample::new(parse(*t_ms)?, parse(*value)?),
            _ => anyhow::bail!("line {} has {} columns, expected 1 or 2", idx + 1, cols.len()),
        };
        if !sample.is_finite() {
            anyhow::bail!("line {} is not a finite sample: {}", idx + 1, trimmed);
        }
        if let Some(last) = out.last() {
            if sample.t_ms < last.t_ms {
                anyhow::bail!(
                    "line {}: timestamp {} ms precedes {} ms",
                    idx + 1,
                    sample.t_ms,
                    last.t_ms
                );
            }
        }
        out.push(sample);
    }
    if out.is_empty() {
        anyhow::bail!("no numeric samples found");
    }
    Ok(out)
}

pub fn read_sample_series(path: &Path, sample_rate_hz: f64) -> Result<Vec<Sample>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_sample_series(&text, sample_rate_hz).with_context(|| format!("in {}", path.display()))
}

/// Two-column `t_ms,value` rendering accepted by [`parse_sample_series`].
pub fn format_sample_series(samples: &[Sample]) -> String {
    let mut out = String::from("# t_ms,value\n");
    for s in samples {
        let _ = writeln!(out, "{:.3},{:.6}", s.t_ms, s.value);
    }
    out
}
