use crate::signal::IntervalSeries;
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};

const SNR_WINDOW: usize = 5;
const GOOD_SNR: f64 = 10.0;
const POOR_SNR: f64 = 2.0;
const MAX_GOOD_INTERVAL_CV: f64 = 0.2;
const MAX_GOOD_SPIKE_RATIO: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalGrade {
    Good,
    Fair,
    Poor,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SQIResult {
    pub kurtosis: f64,
    pub snr: f64,
    pub interval_cv: f64,
    pub spectral_entropy: f64,
    pub spike_ratio: f64,
    pub grade: SignalGrade,
}

impl SQIResult {
    pub fn is_acceptable(&self) -> bool {
        self.grade != SignalGrade::Poor
    }
}

pub fn compute_kurtosis(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mean = data.iter().copied().sum::<f64>() / data.len() as f64;
    let m2 = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / data.len() as f64;
    if m2 == 0.0 {
        return 0.0;
    }
    let m4 = data.iter().map(|x| (x - mean).powi(4)).sum::<f64>() / data.len() as f64;
    m4 / (m2 * m2)
}

/// Variance of the detrended trace over the mean variance inside short
/// windows. A smooth pulse scores high, frame-to-frame jitter scores near 1.
pub fn compute_snr(data: &[f64]) -> f64 {
    if data.len() <= SNR_WINDOW {
        return 0.0;
    }
    let mean = data.iter().copied().sum::<f64>() / data.len() as f64;
    let signal_power = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / data.len() as f64;
    let mut noise_power = 0.0;
    let segments = data.len() - SNR_WINDOW;
    for i in 0..segments {
        let segment = &data[i..i + SNR_WINDOW];
        let local = segment.iter().copied().sum::<f64>() / SNR_WINDOW as f64;
        noise_power += segment.iter().map(|x| (x - local).powi(2)).sum::<f64>() / SNR_WINDOW as f64;
    }
    let noise = (noise_power / segments as f64).max(1e-12);
    (signal_power / noise).max(0.0)
}

pub fn compute_interval_cv(intervals: &IntervalSeries) -> f64 {
    let rr = &intervals.intervals_ms;
    if rr.is_empty() {
        return 0.0;
    }
    let mean = rr.iter().copied().sum::<f64>() / rr.len() as f64;
    if mean == 0.0 {
        return 0.0;
    }
    let sd = (rr.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / rr.len() as f64).sqrt();
    sd / mean
}

pub fn compute_spectral_entropy(data: &[f64]) -> f64 {
    let n = data.len();
    if n == 0 {
        return 0.0;
    }
    let mean = data.iter().copied().sum::<f64>() / n as f64;
    let mut planner = RealFftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    let mut buffer: Vec<f64> = data.iter().map(|x| x - mean).collect();
    let mut spectrum = fft.make_output_vec();
    if fft.process(&mut buffer, &mut spectrum).is_err() {
        return 0.0;
    }
    let powers: Vec<f64> = spectrum.iter().map(|c| c.norm_sqr()).collect();
    let total_power: f64 = powers.iter().sum();
    if total_power == 0.0 {
        return 0.0;
    }
    let mut entropy = 0.0;
    for power in powers {
        if power <= 0.0 {
            continue;
        }
        let p = power / total_power;
        entropy -= p * p.log2();
    }
    entropy
}

pub fn compute_spike_ratio(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let diffs: Vec<f64> = data.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
    let mean = diffs.iter().copied().sum::<f64>() / diffs.len() as f64;
    let sd = (diffs.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / diffs.len() as f64).sqrt();
    if sd == 0.0 {
        return 0.0;
    }
    let threshold = mean + 2.0 * sd;
    let spikes = diffs.iter().filter(|&&d| d > threshold).count();
    spikes as f64 / diffs.len() as f64
}

pub fn evaluate_sqi(values: &[f64], intervals: &IntervalSeries) -> SQIResult {
    let kurtosis = compute_kurtosis(values);
    let snr = compute_snr(values);
    let interval_cv = compute_interval_cv(intervals);
    let spectral_entropy = compute_spectral_entropy(values);
    let spike_ratio = compute_spike_ratio(values);
    let grade = if intervals.is_empty() || snr < POOR_SNR {
        SignalGrade::Poor
    } else if snr >= GOOD_SNR
        && interval_cv <= MAX_GOOD_INTERVAL_CV
        && spike_ratio <= MAX_GOOD_SPIKE_RATIO
    {
        SignalGrade::Good
    } else {
        SignalGrade::Fair
    };
    SQIResult {
        kurtosis,
        snr,
        interval_cv,
        spectral_entropy,
        spike_ratio,
        grade,
    }
}
