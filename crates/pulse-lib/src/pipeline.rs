use crate::{
    config::PipelineConfig,
    detectors::peaks::detect_peaks,
    metrics::{
        heart_rate::{HeartRateEstimator, HeartRateUpdate},
        hrv::{classify, HrvAssessment},
        sqi::{evaluate_sqi, SQIResult},
    },
    signal::{Events, IntervalSeries, Sample},
    spectrum::{analyze_spectrum, dominant_pulse_bpm, BandPass, Spectrum, SpectrumPoint},
};
use serde::{Deserialize, Serialize};

/// Everything derived from one buffer state.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub peaks: Events,
    /// Fresh estimate from this buffer, if its preconditions held.
    pub heart_rate: Option<HeartRateUpdate>,
    /// Fresh estimate or the one carried over from earlier buffers.
    pub current_bpm: Option<u32>,
    pub hrv: HrvAssessment,
    pub spectrum: Spectrum,
    /// Strongest in-band spectral component, as BPM.
    pub spectral_bpm: Option<f64>,
    pub quality: SQIResult,
}

/// Peaks → heart rate → HRV/condition → spectrum → quality over `samples`.
pub fn analyze_window(
    samples: &[Sample],
    cfg: &PipelineConfig,
    estimator: &mut HeartRateEstimator,
) -> Analysis {
    let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
    let peaks = detect_peaks(&values, cfg.threshold_factor);
    let heart_rate = estimator.update(samples, &peaks);
    let current_bpm = estimator.current();
    let hrv = classify(samples, &peaks, current_bpm);
    let band = cfg
        .band_pass_enabled
        .then(|| BandPass::pulse(cfg.sample_rate_hz));
    let spectrum = analyze_spectrum(&values, cfg.sample_rate_hz, band);
    let spectral_bpm = dominant_pulse_bpm(&values, cfg.sample_rate_hz);
    let intervals = IntervalSeries::from_events(samples, &peaks);
    let quality = evaluate_sqi(&values, &intervals);
    Analysis {
        peaks,
        heart_rate,
        current_bpm,
        hrv,
        spectrum,
        spectral_bpm,
        quality,
    }
}

/// Serialisable summary of an [`Analysis`], used for offline reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub sample_count: usize,
    pub duration_s: f64,
    pub peaks: Events,
    pub heart_rate: Option<u32>,
    pub hrv: HrvAssessment,
    pub spectral_bpm: Option<f64>,
    pub quality: SQIResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spectrum: Option<Vec<SpectrumPoint>>,
    pub disclaimer: String,
}

impl AnalysisReport {
    pub fn from_analysis(samples: &[Sample], analysis: &Analysis, include_spectrum: bool) -> Self {
        Self {
            sample_count: samples.len(),
            duration_s: crate::signal::span_seconds(samples),
            peaks: analysis.peaks.clone(),
            heart_rate: analysis.current_bpm,
            hrv: analysis.hrv.clone(),
            spectral_bpm: analysis.spectral_bpm,
            quality: analysis.quality,
            spectrum: include_spectrum.then(|| analysis.spectrum.points()),
            disclaimer: crate::metrics::hrv::Condition::disclaimer().to_string(),
        }
    }
}

/// One-shot analysis of a recorded series with a fresh estimator.
pub fn analyze_recording(samples: &[Sample], cfg: &PipelineConfig, include_spectrum: bool) -> AnalysisReport {
    let mut estimator = HeartRateEstimator::new();
    let analysis = analyze_window(samples, cfg, &mut estimator);
    AnalysisReport::from_analysis(samples, &analysis, include_spectrum)
}
