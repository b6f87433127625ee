//! Inter-beat interval statistics and rhythm labels.
//!
//! Every label produced here is a screening heuristic computed from a camera
//! PPG trace. None of them is a diagnosis.

use crate::signal::{Events, IntervalSeries, Sample};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const BRADYCARDIA_BELOW_BPM: u32 = 60;
pub const TACHYCARDIA_ABOVE_BPM: u32 = 100;
/// Interval std above this fraction of the mean flags an irregular rhythm.
pub const ARRHYTHMIA_CV: f64 = 0.2;
/// Interval std (ms) above which stress is reported as high.
pub const HIGH_STRESS_STD_MS: f64 = 100.0;
pub const MIN_PEAKS_FOR_HRV: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    Bradycardia,
    Tachycardia,
    PossibleArrhythmia,
}

impl Condition {
    pub fn label(&self) -> &'static str {
        match self {
            Condition::Bradycardia => "Bradycardia",
            Condition::Tachycardia => "Tachycardia",
            Condition::PossibleArrhythmia => "Possible Arrhythmia",
        }
    }

    pub fn disclaimer() -> &'static str {
        "heuristic screening hint from a camera PPG signal, not a diagnosis"
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StressLevel {
    Normal,
    High,
}

impl fmt::Display for StressLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StressLevel::Normal => f.write_str("Normal"),
            StressLevel::High => f.write_str("High"),
        }
    }
}

/// Time-domain summary of the interval series (milliseconds).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HrvTime {
    pub n: usize,
    pub avnn: f64,
    pub sdnn: f64,
    pub rmssd: f64,
    pub pnn50: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HrvAssessment {
    pub condition: Option<Condition>,
    /// `round(std)` of the inter-peak intervals, in ms.
    pub hrv_ms: Option<u32>,
    pub stress: Option<StressLevel>,
    pub mean_interval_ms: Option<f64>,
    pub std_interval_ms: Option<f64>,
    pub time: HrvTime,
}

pub fn rhythm_condition(bpm: u32) -> Option<Condition> {
    if bpm < BRADYCARDIA_BELOW_BPM {
        Some(Condition::Bradycardia)
    } else if bpm > TACHYCARDIA_ABOVE_BPM {
        Some(Condition::Tachycardia)
    } else {
        None
    }
}

/// Classify rhythm and variability. `bpm` is the current (possibly carried
/// over) heart-rate estimate; an irregular interval series overrides it.
pub fn classify(samples: &[Sample], peaks: &Events, bpm: Option<u32>) -> HrvAssessment {
    let intervals = IntervalSeries::from_events(samples, peaks);
    let time = hrv_time(&intervals);
    let mut condition = bpm.and_then(rhythm_condition);
    let mut assessment = HrvAssessment {
        condition,
        hrv_ms: None,
        stress: None,
        mean_interval_ms: None,
        std_interval_ms: None,
        time,
    };
    if peaks.len() < MIN_PEAKS_FOR_HRV || intervals.is_empty() {
        return assessment;
    }

    let (mean, std) = mean_std(&intervals.intervals_ms);
    if std > ARRHYTHMIA_CV * mean {
        condition = Some(Condition::PossibleArrhythmia);
    }
    assessment.condition = condition;
    assessment.mean_interval_ms = Some(mean);
    assessment.std_interval_ms = Some(std);
    assessment.hrv_ms = Some(std.round() as u32);
    assessment.stress = Some(if std > HIGH_STRESS_STD_MS {
        StressLevel::High
    } else {
        StressLevel::Normal
    });
    assessment
}

/// Mean and population standard deviation.
fn mean_std(data: &[f64]) -> (f64, f64) {
    let n = data.len() as f64;
    let mean = data.iter().sum::<f64>() / n;
    let var = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

pub fn hrv_time(series: &IntervalSeries) -> HrvTime {
    let rr = &series.intervals_ms;
    let n = rr.len();
    let avnn = if n > 0 {
        rr.iter().sum::<f64>() / n as f64
    } else {
        0.0
    };
    let sdnn = if n > 1 {
        (rr.iter().map(|x| (x - avnn).powi(2)).sum::<f64>() / (n as f64 - 1.0)).sqrt()
    } else {
        0.0
    };
    let rmssd = if n > 1 {
        let diffs = rr.windows(2).map(|w| (w[1] - w[0]).powi(2));
        (diffs.sum::<f64>() / (n as f64 - 1.0)).sqrt()
    } else {
        0.0
    };
    let pnn50 = if n > 1 {
        let count = rr.windows(2).filter(|w| (w[1] - w[0]).abs() > 50.0).count();
        count as f64 / (n as f64 - 1.0)
    } else {
        0.0
    };
    HrvTime {
        n,
        avnn,
        sdnn,
        rmssd,
        pnn50,
    }
}
