//! Placeholder "glucose" value derived from heart rate and randomness.
//!
//! NOT A MEASUREMENT. A fingertip camera trace carries no information about
//! blood glucose. This module maps the heart-rate estimate to a random value in
//! one of three bands so that session records keep the field the product
//! displays. Do not use the output for any health decision.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

pub const HIGH_BAND_ABOVE_BPM: u32 = 120;
pub const LOW_BAND_BELOW_BPM: u32 = 60;

const HIGH_BAND: RangeInclusive<u32> = 126..=180;
const LOW_BAND: RangeInclusive<u32> = 55..=75;
const MID_BAND: RangeInclusive<u32> = 80..=140;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GlucoseCategory {
    Low,
    Normal,
    Prediabetes,
    Diabetes,
}

impl GlucoseCategory {
    pub fn from_mg_dl(mg_dl: u32) -> Self {
        match mg_dl {
            0..=69 => GlucoseCategory::Low,
            70..=99 => GlucoseCategory::Normal,
            100..=125 => GlucoseCategory::Prediabetes,
            _ => GlucoseCategory::Diabetes,
        }
    }
}

impl fmt::Display for GlucoseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GlucoseCategory::Low => "Low",
            GlucoseCategory::Normal => "Normal",
            GlucoseCategory::Prediabetes => "Prediabetes",
            GlucoseCategory::Diabetes => "Diabetes",
        };
        f.write_str(label)
    }
}

/// Non-physiological placeholder value, see the module docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlucoseEstimate {
    pub mg_dl: u32,
    pub category: GlucoseCategory,
}

impl GlucoseEstimate {
    pub fn disclaimer() -> &'static str {
        "randomised placeholder derived from heart rate only; not a glucose measurement"
    }
}

fn band_for(bpm: u32) -> RangeInclusive<u32> {
    if bpm > HIGH_BAND_ABOVE_BPM {
        HIGH_BAND
    } else if bpm < LOW_BAND_BELOW_BPM {
        LOW_BAND
    } else {
        MID_BAND
    }
}

/// Draw a placeholder value for `bpm` from the band it falls in.
pub fn estimate_glucose<R: Rng>(bpm: u32, rng: &mut R) -> GlucoseEstimate {
    let mg_dl = rng.gen_range(band_for(bpm));
    GlucoseEstimate {
        mg_dl,
        category: GlucoseCategory::from_mg_dl(mg_dl),
    }
}
