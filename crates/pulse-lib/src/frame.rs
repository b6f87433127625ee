use crate::error::{PulseError, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_ROI_SIZE: u32 = 50;
pub const MIN_ROI_SIZE: u32 = 20;
pub const MAX_ROI_SIZE: u32 = 100;

/// One RGBA8 video frame, row-major.
#[derive(Debug, Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(PulseError::InvalidFrame {
                width,
                height,
                expected,
                actual: rgba.len(),
            });
        }
        Ok(Self {
            width,
            height,
            rgba,
        })
    }

    /// Frame filled with a single colour.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = width as usize * height as usize;
        let mut data = Vec::with_capacity(pixels * 4);
        for _ in 0..pixels {
            data.extend_from_slice(&rgba);
        }
        Self {
            width,
            height,
            rgba: data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }
}

/// Rectangular region of interest. The origin may lie outside the frame;
/// sampling clips it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
}

impl Roi {
    /// Square of side `side` centred in a `frame_width` x `frame_height` frame.
    pub fn centered(frame_width: u32, frame_height: u32, side: u32) -> Self {
        let x = (frame_width as i64 - side as i64) / 2;
        let y = (frame_height as i64 - side as i64) / 2;
        Self {
            x,
            y,
            width: side,
            height: side,
        }
    }

    fn clip(&self, frame: &Frame) -> Option<(u32, u32, u32, u32)> {
        let x0 = self.x.max(0);
        let y0 = self.y.max(0);
        let x1 = (self.x + self.width as i64).min(frame.width as i64);
        let y1 = (self.y + self.height as i64).min(frame.height as i64);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
    }
}

/// Per-channel means over the clipped ROI plus the red reflectance ratio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoiSample {
    pub avg_red: f64,
    pub avg_green: f64,
    pub avg_blue: f64,
    pub pixel_count: usize,
    /// `avg_red / (avg_red + avg_green + avg_blue)`
    pub value: f64,
}

pub fn sample_roi(frame: &Frame, roi: &Roi) -> Result<RoiSample> {
    let (x0, y0, x1, y1) = roi.clip(frame).ok_or(PulseError::InvalidRegion {
        x: roi.x,
        y: roi.y,
        width: roi.width,
        height: roi.height,
        frame_width: frame.width,
        frame_height: frame.height,
    })?;

    let stride = frame.width as usize * 4;
    let mut red = 0u64;
    let mut green = 0u64;
    let mut blue = 0u64;
    for y in y0..y1 {
        let row = &frame.rgba[y as usize * stride..(y as usize + 1) * stride];
        for px in row[x0 as usize * 4..x1 as usize * 4].chunks_exact(4) {
            red += px[0] as u64;
            green += px[1] as u64;
            blue += px[2] as u64;
        }
    }

    let pixel_count = ((x1 - x0) as usize) * ((y1 - y0) as usize);
    let n = pixel_count as f64;
    let avg_red = red as f64 / n;
    let avg_green = green as f64 / n;
    let avg_blue = blue as f64 / n;
    let total = avg_red + avg_green + avg_blue;
    if total <= 0.0 {
        return Err(PulseError::UnlitRegion);
    }
    Ok(RoiSample {
        avg_red,
        avg_green,
        avg_blue,
        pixel_count,
        value: avg_red / total,
    })
}
