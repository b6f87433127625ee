use crate::signal::Events;
use serde::{Deserialize, Serialize};

/// Minimum index distance between two accepted peaks.
pub const MIN_PEAK_DISTANCE: usize = 8;
pub const DEFAULT_THRESHOLD_FACTOR: f64 = 0.5;
pub const MIN_THRESHOLD_FACTOR: f64 = 0.1;
pub const MAX_THRESHOLD_FACTOR: f64 = 1.0;

/// Samples skipped at each end of the sequence.
const EDGE_MARGIN: usize = 2;

/// Configurable parameters for the pulse peak picker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PeakDetectorConfig {
    /// Multiple of the standard deviation added to the mean.
    pub threshold_factor: f64,
    /// Refractory distance in samples; never below [`MIN_PEAK_DISTANCE`].
    pub min_distance: usize,
}

impl Default for PeakDetectorConfig {
    fn default() -> Self {
        Self {
            threshold_factor: DEFAULT_THRESHOLD_FACTOR,
            min_distance: MIN_PEAK_DISTANCE,
        }
    }
}

/// Detect pulse peaks with the default refractory distance.
pub fn detect_peaks(values: &[f64], threshold_factor: f64) -> Events {
    let cfg = PeakDetectorConfig {
        threshold_factor,
        ..PeakDetectorConfig::default()
    };
    detect_peaks_with_config(values, &cfg)
}

/// Local maxima above `mean + stddev * threshold_factor`, at least
/// `min_distance` samples apart. Distances below [`MIN_PEAK_DISTANCE`] are
/// raised to it.
pub fn detect_peaks_with_config(values: &[f64], cfg: &PeakDetectorConfig) -> Events {
    if values.len() < 2 * EDGE_MARGIN + 1 {
        return Events::from_indices(Vec::new());
    }
    let factor = cfg
        .threshold_factor
        .clamp(MIN_THRESHOLD_FACTOR, MAX_THRESHOLD_FACTOR);
    let min_distance = cfg.min_distance.max(MIN_PEAK_DISTANCE);
    let threshold = dynamic_threshold(values, factor);

    let mut peaks: Vec<usize> = Vec::new();
    for i in EDGE_MARGIN..=values.len() - 1 - EDGE_MARGIN {
        let v = values[i];
        if v > threshold && v > values[i - 1] && v > values[i + 1] {
            let spaced = peaks.last().map_or(true, |&last| i - last >= min_distance);
            if spaced {
                peaks.push(i);
            }
        }
    }
    Events::from_indices(peaks)
}

/// `mean + stddev * factor`, population standard deviation.
pub fn dynamic_threshold(values: &[f64], factor: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    mean + var.sqrt() * factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sinusoid(len: usize, freq_hz: f64, fs: f64, phase: f64) -> Vec<f64> {
        (0..len)
            .map(|i| 0.5 + 0.1 * (2.0 * PI * freq_hz * i as f64 / fs + phase).sin())
            .collect()
    }

    #[test]
    fn constant_signal_has_no_peaks() {
        let values = vec![0.42; 150];
        assert!(detect_peaks(&values, 0.5).is_empty());
    }

    #[test]
    fn short_input_has_no_peaks() {
        assert!(detect_peaks(&[0.1, 0.9, 0.1, 0.2], 0.5).is_empty());
        assert!(detect_peaks(&[], 0.5).is_empty());
    }

    #[test]
    fn finds_sinusoid_crests() {
        // crest of sin(2*pi*i/50 + 0.1*pi) lands on i = 10, 60, 110
        let values = sinusoid(150, 1.2, 60.0, 0.1 * PI);
        let peaks = detect_peaks(&values, 0.5);
        assert_eq!(peaks.indices, vec![10, 60, 110]);
    }

    #[test]
    fn ignores_margins() {
        let mut values = vec![0.0; 20];
        values[1] = 5.0;
        values[18] = 5.0;
        values[10] = 5.0;
        let peaks = detect_peaks(&values, 0.1);
        assert_eq!(peaks.indices, vec![10]);
    }

    #[test]
    fn enforces_refractory_distance() {
        let mut values = vec![0.0; 40];
        for &i in &[5usize, 9, 13, 30] {
            values[i] = 1.0;
        }
        let peaks = detect_peaks(&values, 0.1);
        assert_eq!(peaks.indices, vec![5, 13, 30]);
    }

    #[test]
    fn output_is_increasing_and_spaced_for_noisy_input() {
        // deterministic pseudo-noise
        let mut state = 0x2545_f491_u64;
        let values: Vec<f64> = (0..500)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                (state % 1000) as f64 / 1000.0
            })
            .collect();
        for factor in [0.1, 0.3, 0.5, 1.0] {
            let peaks = detect_peaks(&values, factor);
            for w in peaks.indices.windows(2) {
                assert!(w[1] > w[0]);
                assert!(w[1] - w[0] >= MIN_PEAK_DISTANCE);
            }
            assert_eq!(peaks, detect_peaks(&values, factor));
        }
    }

    #[test]
    fn refractory_distance_has_a_floor() {
        let mut values = vec![0.0; 40];
        for &i in &[5usize, 9, 13, 30] {
            values[i] = 1.0;
        }
        let cfg = PeakDetectorConfig {
            threshold_factor: 0.1,
            min_distance: 1,
        };
        assert_eq!(detect_peaks_with_config(&values, &cfg).indices, vec![5, 13, 30]);

        let wider = PeakDetectorConfig {
            min_distance: 20,
            ..cfg
        };
        assert_eq!(detect_peaks_with_config(&values, &wider).indices, vec![5, 30]);
    }

    #[test]
    fn threshold_factor_is_clamped() {
        let values = sinusoid(150, 1.2, 60.0, 0.1 * PI);
        assert_eq!(detect_peaks(&values, 5.0), detect_peaks(&values, 1.0));
        assert_eq!(detect_peaks(&values, 0.0), detect_peaks(&values, 0.1));
    }
}
