//! Backend-independent figure model for pulse traces and spectra. Rendering
//! lives in the front ends.

use crate::signal::{Events, Sample};
use crate::spectrum::Spectrum;
use serde::{Deserialize, Serialize};

pub const WAVEFORM_COLOR: u32 = 0xD62828;
pub const PEAK_COLOR: u32 = 0x1D3557;
pub const SPECTRUM_COLOR: u32 = 0x2A9D8F;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub width: f32,
    pub color: Color,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub fn rgb(self) -> (u8, u8, u8) {
        (
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

/// Unconnected markers, e.g. detected peaks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub radius: u32,
    pub color: Color,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Series {
    Line(LineSeries),
    Markers(MarkerSeries),
}

impl Series {
    pub fn points(&self) -> &[[f64; 2]] {
        match self {
            Series::Line(line) => &line.points,
            Series::Markers(markers) => &markers.points,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub series: Vec<Series>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis::default(),
            y: Axis::default(),
            series: Vec::new(),
        }
    }

    pub fn add_series(&mut self, series: Series) {
        self.series.push(series);
    }

    /// `(x_min, x_max, y_min, y_max)` over all series, widened so that a
    /// flat or empty figure still has a drawable range.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let mut x = (f64::INFINITY, f64::NEG_INFINITY);
        let mut y = (f64::INFINITY, f64::NEG_INFINITY);
        for p in self.series.iter().flat_map(|s| s.points()) {
            x = (x.0.min(p[0]), x.1.max(p[0]));
            y = (y.0.min(p[1]), y.1.max(p[1]));
        }
        (widen(x).0, widen(x).1, widen(y).0, widen(y).1)
    }
}

fn widen((lo, hi): (f64, f64)) -> (f64, f64) {
    if !lo.is_finite() || !hi.is_finite() {
        (0.0, 1.0)
    } else if hi - lo <= f64::EPSILON {
        (lo - 0.5, hi + 0.5)
    } else {
        (lo, hi)
    }
}

pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points {
        return points.to_vec();
    }
    let bucket_size = points.len() as f64 / max_points as f64;
    let mut result = Vec::with_capacity(max_points);
    for i in 0..max_points {
        let start = (i as f64 * bucket_size).floor() as usize;
        if start >= points.len() {
            break;
        }
        result.push(points[start]);
    }
    result
}

/// Pulse trace against time in seconds, with the detected peaks marked.
pub fn waveform_figure(samples: &[Sample], peaks: &Events, max_points: usize) -> Figure {
    let points: Vec<[f64; 2]> = samples.iter().map(|s| [s.t_ms / 1000.0, s.value]).collect();
    let markers: Vec<[f64; 2]> = peaks
        .indices
        .iter()
        .filter_map(|&i| samples.get(i))
        .map(|s| [s.t_ms / 1000.0, s.value])
        .collect();
    let mut fig = Figure::new(Some("Pulse waveform".to_string()));
    fig.x.label = Some("time (s)".into());
    fig.y.label = Some("red ratio".into());
    fig.add_series(Series::Line(LineSeries {
        name: "signal".into(),
        points: decimate_points(&points, max_points),
        style: Style {
            width: 1.4,
            color: Color(WAVEFORM_COLOR),
        },
    }));
    fig.add_series(Series::Markers(MarkerSeries {
        name: "peaks".into(),
        points: markers,
        radius: 4,
        color: Color(PEAK_COLOR),
    }));
    fig
}

/// Magnitudes of bins `0..=N/2` against frequency in Hz.
pub fn spectrum_figure(spectrum: &Spectrum) -> Figure {
    let half = spectrum.len() / 2;
    let points: Vec<[f64; 2]> = spectrum
        .bins
        .iter()
        .take(half + 1)
        .enumerate()
        .map(|(k, c)| [spectrum.frequency(k), c.norm()])
        .collect();
    let title = if spectrum.band_limited {
        "Spectrum (0.7-3.0 Hz)"
    } else {
        "Spectrum"
    };
    let mut fig = Figure::new(Some(title.to_string()));
    fig.x.label = Some("frequency (Hz)".into());
    fig.y.label = Some("magnitude".into());
    fig.add_series(Series::Line(LineSeries {
        name: "magnitude".into(),
        points,
        style: Style {
            width: 1.6,
            color: Color(SPECTRUM_COLOR),
        },
    }));
    fig
}
