//! Frame sources. A real camera binding would implement [`FrameSource`];
//! [`SyntheticCamera`] renders a fingertip whose red channel follows a pulse.

use log::{debug, info};
use pulse_lib::{error::PulseError, frame::Frame};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A frame and the time it was captured, in ms since capture started.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub frame: Frame,
    pub at_ms: f64,
}

/// Produces frames until exhausted. Dropping the source releases the device.
pub trait FrameSource: Send {
    /// `Ok(None)` once the source has nothing more to deliver.
    fn next_frame(&mut self) -> pulse_lib::Result<Option<CapturedFrame>>;
}

#[derive(Debug, Clone)]
pub struct SyntheticCameraConfig {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub bpm: f64,
    /// Stop after this many seconds of frames; `None` runs until stopped.
    pub duration_secs: Option<f64>,
    /// Peak-to-peak jitter added to the red channel, in 8-bit levels.
    pub noise: f64,
    pub seed: u64,
    /// Pace frames against the wall clock instead of emitting them at once.
    pub realtime: bool,
}

impl Default for SyntheticCameraConfig {
    fn default() -> Self {
        Self {
            width: 160,
            height: 120,
            fps: 60.0,
            bpm: 72.0,
            duration_secs: None,
            noise: 0.0,
            seed: 0,
            realtime: false,
        }
    }
}

pub struct SyntheticCamera {
    cfg: SyntheticCameraConfig,
    index: u64,
    rng: StdRng,
    started: Option<Instant>,
    released: Arc<AtomicBool>,
}

impl SyntheticCamera {
    pub fn open(cfg: SyntheticCameraConfig) -> pulse_lib::Result<Self> {
        if cfg.width == 0 || cfg.height == 0 {
            return Err(PulseError::CameraUnavailable(format!(
                "unsupported resolution {}x{}",
                cfg.width, cfg.height
            )));
        }
        if !(cfg.fps.is_finite() && cfg.fps > 0.0) {
            return Err(PulseError::CameraUnavailable(format!(
                "unsupported frame rate {}",
                cfg.fps
            )));
        }
        if !(cfg.bpm.is_finite() && cfg.bpm > 0.0) || !cfg.noise.is_finite() || cfg.noise < 0.0 {
            return Err(PulseError::CameraUnavailable(
                "invalid synthetic signal parameters".into(),
            ));
        }
        info!(
            "camera acquired: synthetic {}x{} @ {} fps, {} bpm",
            cfg.width, cfg.height, cfg.fps, cfg.bpm
        );
        Ok(Self {
            rng: StdRng::seed_from_u64(cfg.seed),
            cfg,
            index: 0,
            started: None,
            released: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag that flips to `true` when the camera is released.
    pub fn release_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.released)
    }

    fn render(&mut self, t_s: f64) -> Frame {
        let phase = 2.0 * PI * self.cfg.bpm / 60.0 * t_s + 0.1 * PI;
        let mut red = 150.0 + 100.0 * phase.sin();
        if self.cfg.noise > 0.0 {
            let half = self.cfg.noise / 2.0;
            red += self.rng.gen_range(-half..=half);
        }
        let red = red.round().clamp(1.0, 255.0) as u8;
        Frame::filled(self.cfg.width, self.cfg.height, [red, 60, 60, 255])
    }
}

impl FrameSource for SyntheticCamera {
    fn next_frame(&mut self) -> pulse_lib::Result<Option<CapturedFrame>> {
        let t_s = self.index as f64 / self.cfg.fps;
        if let Some(limit) = self.cfg.duration_secs {
            if t_s >= limit {
                return Ok(None);
            }
        }
        if self.cfg.realtime {
            let started = *self.started.get_or_insert_with(Instant::now);
            let due = started + Duration::from_secs_f64(t_s);
            let now = Instant::now();
            if due > now {
                std::thread::sleep(due - now);
            }
        }
        let frame = self.render(t_s);
        self.index += 1;
        Ok(Some(CapturedFrame {
            frame,
            at_ms: t_s * 1000.0,
        }))
    }
}

impl Drop for SyntheticCamera {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
        debug!("synthetic camera delivered {} frames", self.index);
        info!("camera released");
    }
}
