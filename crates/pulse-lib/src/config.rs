use crate::detectors::peaks::{DEFAULT_THRESHOLD_FACTOR, MAX_THRESHOLD_FACTOR, MIN_THRESHOLD_FACTOR};
use crate::frame::{DEFAULT_ROI_SIZE, MAX_ROI_SIZE, MIN_ROI_SIZE};
use crate::signal::{DEFAULT_BUFFER_CAPACITY, MAX_BUFFER_CAPACITY, MIN_BUFFER_CAPACITY};
use crate::spectrum::DEFAULT_SAMPLE_RATE_HZ;
use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_SESSION_SECONDS: u32 = 45;

/// Runtime-tunable pipeline parameters. Changes apply from the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Side of the centred ROI square, in pixels.
    pub roi_size: u32,
    pub threshold_factor: f64,
    pub band_pass_enabled: bool,
    pub session_duration_secs: u32,
    pub buffer_capacity: usize,
    /// Assumed sample rate for spectral bin frequencies.
    pub sample_rate_hz: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            roi_size: DEFAULT_ROI_SIZE,
            threshold_factor: DEFAULT_THRESHOLD_FACTOR,
            band_pass_enabled: true,
            session_duration_secs: DEFAULT_SESSION_SECONDS,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
        }
    }
}

impl PipelineConfig {
    /// Clamp every field into its accepted range, logging each adjustment.
    pub fn sanitized(self) -> Self {
        let mut cfg = self;
        let roi = cfg.roi_size.clamp(MIN_ROI_SIZE, MAX_ROI_SIZE);
        if roi != cfg.roi_size {
            warn!("roi_size {} out of range, using {}", cfg.roi_size, roi);
            cfg.roi_size = roi;
        }
        let factor = if cfg.threshold_factor.is_finite() {
            cfg.threshold_factor
                .clamp(MIN_THRESHOLD_FACTOR, MAX_THRESHOLD_FACTOR)
        } else {
            DEFAULT_THRESHOLD_FACTOR
        };
        if factor != cfg.threshold_factor {
            warn!(
                "threshold_factor {} out of range, using {}",
                cfg.threshold_factor, factor
            );
            cfg.threshold_factor = factor;
        }
        let capacity = cfg
            .buffer_capacity
            .clamp(MIN_BUFFER_CAPACITY, MAX_BUFFER_CAPACITY);
        if capacity != cfg.buffer_capacity {
            warn!(
                "buffer_capacity {} out of range, using {}",
                cfg.buffer_capacity, capacity
            );
            cfg.buffer_capacity = capacity;
        }
        if cfg.session_duration_secs == 0 {
            warn!("session_duration_secs must be positive, using {DEFAULT_SESSION_SECONDS}");
            cfg.session_duration_secs = DEFAULT_SESSION_SECONDS;
        }
        if !(cfg.sample_rate_hz.is_finite() && cfg.sample_rate_hz > 0.0) {
            warn!(
                "sample_rate_hz {} invalid, using {}",
                cfg.sample_rate_hz, DEFAULT_SAMPLE_RATE_HZ
            );
            cfg.sample_rate_hz = DEFAULT_SAMPLE_RATE_HZ;
        }
        cfg
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: PipelineConfig = toml::from_str(text).context("parsing pipeline config")?;
        Ok(cfg.sanitized())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&contents).with_context(|| format!("in {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = PipelineConfig::from_toml_str("roi_size = 80\nband_pass_enabled = false\n")
            .unwrap();
        assert_eq!(cfg.roi_size, 80);
        assert!(!cfg.band_pass_enabled);
        assert_eq!(cfg.session_duration_secs, DEFAULT_SESSION_SECONDS);
        assert_eq!(cfg.buffer_capacity, DEFAULT_BUFFER_CAPACITY);
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let cfg = PipelineConfig {
            roi_size: 500,
            threshold_factor: 0.01,
            buffer_capacity: 5,
            session_duration_secs: 0,
            sample_rate_hz: -1.0,
            ..PipelineConfig::default()
        }
        .sanitized();
        assert_eq!(cfg.roi_size, MAX_ROI_SIZE);
        assert_eq!(cfg.threshold_factor, MIN_THRESHOLD_FACTOR);
        assert_eq!(cfg.buffer_capacity, MIN_BUFFER_CAPACITY);
        assert_eq!(cfg.session_duration_secs, DEFAULT_SESSION_SECONDS);
        assert_eq!(cfg.sample_rate_hz, DEFAULT_SAMPLE_RATE_HZ);
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(PipelineConfig::from_toml_str("roi_size = \"big\"").is_err());
    }
}
