//! Measurement session: owns the buffer, the configuration and the derived
//! value slots, and turns one frame into one [`TickUpdate`].

use crate::{
    config::PipelineConfig,
    error::{PulseError, Result},
    frame::{sample_roi, Frame, Roi, RoiSample},
    metrics::{
        glucose::{estimate_glucose, GlucoseCategory},
        heart_rate::{HeartRateEstimator, PulseEvent},
        hrv::{Condition, HrvAssessment, StressLevel},
        sqi::SQIResult,
    },
    pipeline::analyze_window,
    signal::{Events, Sample, SharedSignalBuffer},
    spectrum::Spectrum,
};
use log::{debug, info};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

const FPS_SMOOTHING: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Reading,
    Finished,
}

/// Frames seen so far and an exponentially smoothed frame rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameStats {
    pub frame_count: u64,
    pub fps: f64,
}

#[derive(Debug, Clone, Default)]
struct FrameClock {
    stats: FrameStats,
    first_ms: Option<f64>,
    last_ms: Option<f64>,
}

impl FrameClock {
    fn count(&mut self) {
        self.stats.frame_count += 1;
    }

    /// Timing only follows frames whose sample made it into the buffer.
    fn mark(&mut self, at_ms: f64) {
        if let Some(last) = self.last_ms {
            let dt = at_ms - last;
            if dt > 0.0 {
                let instant = 1000.0 / dt;
                self.stats.fps = if self.stats.fps == 0.0 {
                    instant
                } else {
                    self.stats.fps + FPS_SMOOTHING * (instant - self.stats.fps)
                };
            }
        }
        self.first_ms.get_or_insert(at_ms);
        self.last_ms = Some(at_ms);
    }

    fn captured_secs(&self) -> f64 {
        match (self.first_ms, self.last_ms) {
            (Some(first), Some(last)) => (last - first) / 1000.0,
            _ => 0.0,
        }
    }
}

/// Published after every successful tick.
#[derive(Debug, Clone)]
pub struct TickUpdate {
    pub latest_sample: Sample,
    pub roi: RoiSample,
    pub buffer: Arc<[Sample]>,
    pub peaks: Events,
    /// Current estimate, possibly carried over from an earlier tick.
    pub heart_rate: Option<u32>,
    /// Set only on ticks that produced a fresh estimate.
    pub pulse: Option<PulseEvent>,
    pub hrv: HrvAssessment,
    pub condition: Option<Condition>,
    pub spectrum: Spectrum,
    pub spectral_bpm: Option<f64>,
    pub quality: SQIResult,
    pub frame_stats: FrameStats,
    pub remaining_secs: u32,
}

/// Frozen result of a finished session. Flat so it fits one CSV row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub timestamp_unix: u64,
    /// Countdown seconds that elapsed.
    pub duration_secs: u32,
    /// Span between the first and last captured frame.
    pub captured_secs: f64,
    pub heart_rate: Option<u32>,
    /// Randomised placeholder, not a measurement.
    pub glucose_mg_dl: Option<u32>,
    pub glucose_category: Option<GlucoseCategory>,
    pub condition: Option<Condition>,
    pub hrv_ms: Option<u32>,
    pub stress: Option<StressLevel>,
    pub samples_analyzed: u64,
}

pub struct Session {
    state: SessionState,
    config: PipelineConfig,
    buffer: SharedSignalBuffer,
    estimator: HeartRateEstimator,
    condition: Option<Condition>,
    hrv_ms: Option<u32>,
    stress: Option<StressLevel>,
    remaining_secs: u32,
    elapsed_secs: u32,
    samples_analyzed: u64,
    frames: FrameClock,
}

impl Session {
    pub fn new(config: PipelineConfig) -> Self {
        let config = config.sanitized();
        Self {
            state: SessionState::Idle,
            buffer: SharedSignalBuffer::with_capacity(config.buffer_capacity),
            estimator: HeartRateEstimator::new(),
            condition: None,
            hrv_ms: None,
            stress: None,
            remaining_secs: config.session_duration_secs,
            elapsed_secs: 0,
            samples_analyzed: 0,
            frames: FrameClock::default(),
            config,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    pub fn current_bpm(&self) -> Option<u32> {
        self.estimator.current()
    }

    pub fn frame_stats(&self) -> FrameStats {
        self.frames.stats
    }

    /// Shared handle to the sample buffer, for observers on other threads.
    pub fn buffer_handle(&self) -> SharedSignalBuffer {
        self.buffer.clone()
    }

    /// Clear everything from a previous run and begin reading.
    pub fn start(&mut self) {
        self.clear_derived();
        self.remaining_secs = self.config.session_duration_secs;
        self.state = SessionState::Reading;
        info!(
            "session started: {} s, buffer {}",
            self.config.session_duration_secs, self.config.buffer_capacity
        );
    }

    /// Back to `Idle` without producing a record.
    pub fn reset(&mut self) {
        self.clear_derived();
        self.remaining_secs = self.config.session_duration_secs;
        self.state = SessionState::Idle;
    }

    fn clear_derived(&mut self) {
        self.buffer.clear();
        self.estimator.reset();
        self.condition = None;
        self.hrv_ms = None;
        self.stress = None;
        self.elapsed_secs = 0;
        self.samples_analyzed = 0;
        self.frames = FrameClock::default();
    }

    /// One synchronous pipeline pass for a frame captured at `at_ms`.
    pub fn tick(&mut self, frame: &Frame, at_ms: f64) -> Result<TickUpdate> {
        if self.state != SessionState::Reading {
            return Err(PulseError::SessionNotReading);
        }
        self.frames.count();
        let roi = Roi::centered(frame.width(), frame.height(), self.config.roi_size);
        let roi_sample = sample_roi(frame, &roi)?;
        let sample = Sample::new(at_ms, roi_sample.value);
        self.buffer.push(sample)?;
        self.frames.mark(at_ms);
        self.samples_analyzed += 1;

        let snapshot = self.buffer.snapshot();
        let analysis = analyze_window(&snapshot, &self.config, &mut self.estimator);
        if analysis.current_bpm.is_some() || analysis.hrv.hrv_ms.is_some() {
            self.condition = analysis.hrv.condition;
        }
        if analysis.hrv.hrv_ms.is_some() {
            self.hrv_ms = analysis.hrv.hrv_ms;
            self.stress = analysis.hrv.stress;
        }
        debug!(
            "tick t={:.0}ms value={:.4} len={} peaks={} bpm={:?}",
            at_ms,
            sample.value,
            snapshot.len(),
            analysis.peaks.len(),
            analysis.current_bpm
        );

        Ok(TickUpdate {
            latest_sample: sample,
            roi: roi_sample,
            buffer: snapshot,
            peaks: analysis.peaks,
            heart_rate: analysis.current_bpm,
            pulse: analysis.heart_rate.map(|u| u.pulse),
            hrv: analysis.hrv,
            condition: self.condition,
            spectrum: analysis.spectrum,
            spectral_bpm: analysis.spectral_bpm,
            quality: analysis.quality,
            frame_stats: self.frames.stats,
            remaining_secs: self.remaining_secs,
        })
    }

    /// Advance the countdown by one second. Returns `true` once time is up.
    pub fn count_down(&mut self) -> bool {
        if self.state != SessionState::Reading {
            return false;
        }
        self.elapsed_secs += 1;
        self.remaining_secs = self.remaining_secs.saturating_sub(1);
        self.remaining_secs == 0
    }

    /// Apply a new configuration; takes effect from the next tick.
    pub fn update_config(&mut self, config: PipelineConfig) {
        let config = config.sanitized();
        if config.buffer_capacity != self.config.buffer_capacity {
            self.buffer.set_capacity(config.buffer_capacity);
        }
        if config.session_duration_secs != self.config.session_duration_secs {
            self.remaining_secs = config.session_duration_secs.saturating_sub(self.elapsed_secs);
        }
        info!("config updated: {config:?}");
        self.config = config;
    }

    /// Freeze the derived values into a record, drawing the glucose
    /// placeholder from `rng`. `None` unless the session was reading.
    pub fn finish_with_rng<R: Rng>(&mut self, rng: &mut R) -> Option<SessionRecord> {
        if self.state != SessionState::Reading {
            return None;
        }
        self.state = SessionState::Finished;
        let heart_rate = self.estimator.current();
        let glucose = heart_rate.map(|bpm| estimate_glucose(bpm, rng));
        let timestamp_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let record = SessionRecord {
            timestamp_unix,
            duration_secs: self.elapsed_secs,
            captured_secs: self.frames.captured_secs(),
            heart_rate,
            glucose_mg_dl: glucose.map(|g| g.mg_dl),
            glucose_category: glucose.map(|g| g.category),
            condition: self.condition,
            hrv_ms: self.hrv_ms,
            stress: self.stress,
            samples_analyzed: self.samples_analyzed,
        };
        info!(
            "session finished after {} s: bpm={:?} samples={}",
            record.duration_secs, record.heart_rate, record.samples_analyzed
        );
        Some(record)
    }

    pub fn finish(&mut self) -> Option<SessionRecord> {
        self.finish_with_rng(&mut rand::thread_rng())
    }
}
