//! Frequency-domain view of the buffered pulse trace.
//!
//! The transform is a recursive radix-2 Cooley–Tukey FFT over strided views
//! of a single zero-padded input, writing into a single output array. It is
//! recomputed from scratch for every buffer update.

use realfft::num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

pub const DEFAULT_SAMPLE_RATE_HZ: f64 = 60.0;
/// Physiological pulse band, 42–180 BPM.
pub const PULSE_BAND_HZ: (f64, f64) = (0.7, 3.0);

/// Frequency band applied after the transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandPass {
    pub sample_rate_hz: f64,
    pub low_hz: f64,
    pub high_hz: f64,
}

impl BandPass {
    pub fn pulse(sample_rate_hz: f64) -> Self {
        Self {
            sample_rate_hz,
            low_hz: PULSE_BAND_HZ.0,
            high_hz: PULSE_BAND_HZ.1,
        }
    }

    pub fn contains(&self, freq_hz: f64) -> bool {
        freq_hz >= self.low_hz && freq_hz <= self.high_hz
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    pub bins: Vec<Complex64>,
    pub sample_rate_hz: f64,
    pub band_limited: bool,
}

impl Spectrum {
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Frequency of bin `k`: `k * sample_rate / N`.
    pub fn frequency(&self, k: usize) -> f64 {
        if self.bins.is_empty() {
            return 0.0;
        }
        k as f64 * self.sample_rate_hz / self.bins.len() as f64
    }

    pub fn magnitudes(&self) -> Vec<f64> {
        self.bins.iter().map(|c| c.norm()).collect()
    }

    /// Frequency of the strongest bin in `(0, fs/2]`, if any bin there is
    /// non-zero.
    pub fn dominant_frequency_hz(&self) -> Option<f64> {
        let n = self.bins.len();
        let mut best: Option<(usize, f64)> = None;
        for k in 1..=n / 2 {
            let mag = self.bins[k].norm();
            if mag > 0.0 && best.map_or(true, |(_, m)| mag > m) {
                best = Some((k, mag));
            }
        }
        best.map(|(k, _)| self.frequency(k))
    }

    pub fn points(&self) -> Vec<SpectrumPoint> {
        self.bins
            .iter()
            .enumerate()
            .map(|(k, c)| SpectrumPoint {
                bin: k,
                freq_hz: self.frequency(k),
                re: c.re,
                im: c.im,
                magnitude: c.norm(),
            })
            .collect()
    }
}

/// Serialisable view of one bin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectrumPoint {
    pub bin: usize,
    pub freq_hz: f64,
    pub re: f64,
    pub im: f64,
    pub magnitude: f64,
}

/// Zero-padded length used for `len` input samples.
pub fn padded_len(len: usize) -> usize {
    if len == 0 {
        0
    } else {
        len.next_power_of_two()
    }
}

/// Zero-pad, transform and optionally band-limit `values`.
pub fn analyze_spectrum(values: &[f64], sample_rate_hz: f64, band: Option<BandPass>) -> Spectrum {
    let mut bins = fft_real(values);
    if let Some(band) = band {
        apply_band_pass(&mut bins, &band);
    }
    Spectrum {
        bins,
        sample_rate_hz,
        band_limited: band.is_some(),
    }
}

/// DFT of `values` zero-padded to the next power of two.
pub fn fft_real(values: &[f64]) -> Vec<Complex64> {
    let n = padded_len(values.len());
    let mut input = vec![Complex64::new(0.0, 0.0); n];
    for (slot, &v) in input.iter_mut().zip(values) {
        *slot = Complex64::new(v, 0.0);
    }
    fft(&input)
}

/// DFT of a power-of-two length sequence.
pub fn fft(input: &[Complex64]) -> Vec<Complex64> {
    debug_assert!(input.is_empty() || input.len().is_power_of_two());
    let mut out = vec![Complex64::new(0.0, 0.0); input.len()];
    transform(input, 1, &mut out);
    out
}

/// Transform the `out.len()` elements `input[0], input[stride], ...` into
/// `out`. The even half lands in `out[..n/2]`, the odd half in `out[n/2..]`,
/// then the butterflies combine them in place.
fn transform(input: &[Complex64], stride: usize, out: &mut [Complex64]) {
    let n = out.len();
    if n <= 1 {
        if n == 1 {
            out[0] = input[0];
        }
        return;
    }
    let half = n / 2;
    let (even, odd) = out.split_at_mut(half);
    transform(input, stride * 2, even);
    transform(&input[stride..], stride * 2, odd);
    for k in 0..half {
        let twiddle = Complex64::from_polar(1.0, -2.0 * PI * k as f64 / n as f64);
        let e = even[k];
        let o = twiddle * odd[k];
        even[k] = e + o;
        odd[k] = e - o;
    }
}

/// Strongest pulse-band component of the mean-removed trace, in BPM.
pub fn dominant_pulse_bpm(values: &[f64], sample_rate_hz: f64) -> Option<f64> {
    let first = *values.first()?;
    if values.iter().all(|v| (v - first).abs() < 1e-12) {
        return None;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let centred: Vec<f64> = values.iter().map(|v| v - mean).collect();
    let spectrum = analyze_spectrum(&centred, sample_rate_hz, Some(BandPass::pulse(sample_rate_hz)));
    spectrum.dominant_frequency_hz().map(|hz| hz * 60.0)
}

/// Zero every bin whose frequency `k * fs / N` lies outside the band.
pub fn apply_band_pass(bins: &mut [Complex64], band: &BandPass) {
    let n = bins.len();
    if n == 0 {
        return;
    }
    let resolution = band.sample_rate_hz / n as f64;
    for (k, bin) in bins.iter_mut().enumerate() {
        if !band.contains(k as f64 * resolution) {
            *bin = Complex64::new(0.0, 0.0);
        }
    }
}
