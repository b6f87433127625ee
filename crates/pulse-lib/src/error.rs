use thiserror::Error;

/// Errors raised by the acquisition and analysis pipeline.
///
/// Missing data is not an error: estimators that lack enough samples or peaks
/// return `None` and keep their previous value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PulseError {
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),
    #[error("frame buffer holds {actual} bytes, expected {expected} for {width}x{height} RGBA")]
    InvalidFrame {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("region {width}x{height} at ({x}, {y}) does not overlap the {frame_width}x{frame_height} frame")]
    InvalidRegion {
        x: i64,
        y: i64,
        width: u32,
        height: u32,
        frame_width: u32,
        frame_height: u32,
    },
    #[error("region of interest is completely dark")]
    UnlitRegion,
    #[error("sample at {got_ms} ms precedes buffered sample at {last_ms} ms")]
    NonMonotonicTimestamp { last_ms: f64, got_ms: f64 },
    #[error("sample at {t_ms} ms has a non-finite field (value {value})")]
    NonFiniteSample { t_ms: f64, value: f64 },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("session is not reading")]
    SessionNotReading,
}

impl PulseError {
    /// Errors that only invalidate the current frame; the session keeps going.
    pub fn skips_tick(&self) -> bool {
        matches!(
            self,
            PulseError::InvalidFrame { .. }
                | PulseError::InvalidRegion { .. }
                | PulseError::UnlitRegion
                | PulseError::NonMonotonicTimestamp { .. }
                | PulseError::NonFiniteSample { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PulseError>;
