use crate::signal::{span_seconds, Events, Sample};
use serde::{Deserialize, Serialize};

pub const MIN_BPM: u32 = 40;
pub const MAX_BPM: u32 = 180;
/// Buffer length required before an estimate is attempted.
pub const MIN_SAMPLES_FOR_ESTIMATE: usize = 30;
pub const MIN_PEAKS_FOR_ESTIMATE: usize = 2;
pub const PULSE_EVENT_MS: f64 = 200.0;

/// Transient beat marker for observers. Has no effect on later estimates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PulseEvent {
    pub at_ms: f64,
    pub duration_ms: f64,
}

impl PulseEvent {
    pub fn is_active(&self, now_ms: f64) -> bool {
        now_ms >= self.at_ms && now_ms < self.at_ms + self.duration_ms
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeartRateUpdate {
    pub bpm: u32,
    /// Unclamped `round(peaks * 60 / span)`.
    pub raw_bpm: f64,
    pub pulse: PulseEvent,
}

/// Peak-count heart rate over the current buffer. Keeps the last estimate
/// when the buffer cannot support a new one.
#[derive(Debug, Clone, Default)]
pub struct HeartRateEstimator {
    current: Option<u32>,
}

impl HeartRateEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<u32> {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = None;
    }

    pub fn update(&mut self, samples: &[Sample], peaks: &Events) -> Option<HeartRateUpdate> {
        let update = estimate_bpm(samples, peaks)?;
        self.current = Some(update.bpm);
        Some(update)
    }
}

/// Stateless estimate; `None` when the preconditions do not hold.
pub fn estimate_bpm(samples: &[Sample], peaks: &Events) -> Option<HeartRateUpdate> {
    if samples.len() < MIN_SAMPLES_FOR_ESTIMATE || peaks.len() < MIN_PEAKS_FOR_ESTIMATE {
        return None;
    }
    let span = span_seconds(samples);
    if !span.is_finite() || span <= 0.0 {
        return None;
    }
    let raw_bpm = (peaks.len() as f64 * 60.0 / span).round();
    let bpm = raw_bpm.clamp(MIN_BPM as f64, MAX_BPM as f64) as u32;
    let at_ms = samples.last().map(|s| s.t_ms).unwrap_or(0.0);
    Some(HeartRateUpdate {
        bpm,
        raw_bpm,
        pulse: PulseEvent {
            at_ms,
            duration_ms: PULSE_EVENT_MS,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::peaks::detect_peaks;
    use std::f64::consts::PI;

    fn samples_at(fs: f64, values: &[f64]) -> Vec<Sample> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| Sample::new(i as f64 * 1000.0 / fs, v))
            .collect()
    }

    #[test]
    fn sinusoid_at_1_2_hz_reads_72_bpm() {
        let fs = 60.0;
        let values: Vec<f64> = (0..150)
            .map(|i| 0.5 + 0.1 * (2.0 * PI * 1.2 * i as f64 / fs + 0.1 * PI).sin())
            .collect();
        let samples = samples_at(fs, &values);
        let peaks = detect_peaks(&values, 0.5);
        for w in peaks.indices.windows(2) {
            assert_eq!(w[1] - w[0], 50);
        }
        let mut est = HeartRateEstimator::new();
        let update = est.update(&samples, &peaks).expect("estimate");
        assert_eq!(update.bpm, 72);
        assert_eq!(est.current(), Some(72));
    }

    #[test]
    fn result_is_clamped() {
        let samples = samples_at(60.0, &vec![0.5; 30]);
        let many = Events::from_indices((0..30).collect());
        assert_eq!(estimate_bpm(&samples, &many).unwrap().bpm, MAX_BPM);

        let long = samples_at(1.0, &vec![0.5; 60]);
        let two = Events::from_indices(vec![5, 40]);
        let update = estimate_bpm(&long, &two).unwrap();
        assert_eq!(update.raw_bpm, 2.0);
        assert_eq!(update.bpm, MIN_BPM);
    }

    #[test]
    fn keeps_previous_estimate_when_data_is_insufficient() {
        let fs = 60.0;
        let values: Vec<f64> = (0..150)
            .map(|i| 0.5 + 0.1 * (2.0 * PI * 1.2 * i as f64 / fs + 0.1 * PI).sin())
            .collect();
        let mut est = HeartRateEstimator::new();
        est.update(&samples_at(fs, &values), &detect_peaks(&values, 0.5));
        assert_eq!(est.current(), Some(72));

        let flat = vec![0.5; 150];
        let peaks = detect_peaks(&flat, 0.5);
        assert!(est.update(&samples_at(fs, &flat), &peaks).is_none());
        assert_eq!(est.current(), Some(72));

        let short = samples_at(fs, &values[..20]);
        assert!(est.update(&short, &Events::from_indices(vec![3, 12])).is_none());
        assert_eq!(est.current(), Some(72));
    }

    #[test]
    fn zero_span_is_rejected() {
        let samples = vec![Sample::new(5.0, 0.5); 40];
        let peaks = Events::from_indices(vec![3, 20]);
        assert!(estimate_bpm(&samples, &peaks).is_none());
    }

    #[test]
    fn pulse_event_window() {
        let ev = PulseEvent {
            at_ms: 1000.0,
            duration_ms: PULSE_EVENT_MS,
        };
        assert!(ev.is_active(1100.0));
        assert!(!ev.is_active(1200.0));
    }
}
