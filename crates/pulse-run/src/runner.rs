//! Threaded host loop for a [`Session`].
//!
//! A capture thread owns the frame source and forwards every frame as a
//! command; a timer thread sends one `Second` per interval; a single worker
//! consumes the command channel and runs one synchronous tick per frame.
//! Stop and config commands therefore land between ticks, never inside one.
//!
//! The update queue is bounded. Progress updates (ticks, skips, countdown)
//! are dropped while a consumer lags behind; `Started`, capture errors and
//! `Finished` always get through, and `Finished` carries the last tick.

use crate::camera::{CapturedFrame, FrameSource};
use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};
use pulse_lib::{
    config::PipelineConfig,
    session::{Session, SessionRecord, TickUpdate},
};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::thread::JoinHandle;
use std::time::Duration;

const COMMAND_QUEUE: usize = 64;
pub const UPDATE_QUEUE: usize = 32;
/// Queue slots progress updates may never take, so lifecycle sends don't block.
const LIFECYCLE_SLOTS: usize = 4;

pub enum RunnerCommand {
    Frame(CapturedFrame),
    Second,
    UpdateConfig(PipelineConfig),
    Stop,
    SourceEnded,
    CaptureFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishReason {
    TimeUp,
    Stopped,
    SourceEnded,
    CaptureFailed,
}

#[derive(Debug, Clone)]
pub enum RunnerUpdate {
    Started { duration_secs: u32 },
    Tick(Box<TickUpdate>),
    TickSkipped { at_ms: f64, reason: String },
    Countdown { remaining_secs: u32 },
    Error(String),
    Finished {
        record: Option<SessionRecord>,
        reason: FinishReason,
        /// Most recent successful tick, even if its own update was dropped.
        last_tick: Option<Box<TickUpdate>>,
    },
}

#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Countdown period; `None` disables the timer so only the source or an
    /// explicit stop ends the session.
    pub countdown_interval: Option<Duration>,
    /// Seed for the glucose placeholder; entropy when `None`.
    pub seed: Option<u64>,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            countdown_interval: Some(Duration::from_secs(1)),
            seed: None,
        }
    }
}

struct ThreadHandle {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl ThreadHandle {
    fn stop(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

pub struct SessionRunner {
    command_tx: Sender<RunnerCommand>,
    update_rx: Receiver<RunnerUpdate>,
    worker: Option<JoinHandle<Option<SessionRecord>>>,
    capture: Option<ThreadHandle>,
    timer: Option<ThreadHandle>,
}

impl SessionRunner {
    /// Start a session over an already opened source.
    pub fn start<S>(source: S, config: PipelineConfig, options: RunnerOptions) -> Self
    where
        S: FrameSource + 'static,
    {
        let (command_tx, command_rx) = bounded(COMMAND_QUEUE);
        let (update_tx, update_rx) = bounded(UPDATE_QUEUE);

        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let worker = RunnerWorker {
            session: Session::new(config),
            command_rx,
            update_tx,
            rng,
            last_tick: None,
        };
        let worker = std::thread::spawn(move || worker.run());

        let capture = spawn_capture(source, command_tx.clone());
        let timer = options
            .countdown_interval
            .map(|interval| spawn_timer(interval, command_tx.clone()));

        Self {
            command_tx,
            update_rx,
            worker: Some(worker),
            capture: Some(capture),
            timer,
        }
    }

    pub fn updates(&self) -> &Receiver<RunnerUpdate> {
        &self.update_rx
    }

    pub fn update_config(&self, config: PipelineConfig) -> Result<()> {
        self.command_tx
            .send(RunnerCommand::UpdateConfig(config))
            .map_err(|e| anyhow!("Failed to update config: {e}"))
    }

    /// Ask the worker to finish after the tick in progress. Harmless once the
    /// session has already ended.
    pub fn stop(&self) {
        let _ = self.command_tx.send(RunnerCommand::Stop);
    }

    /// Wait for the session to end, then shut down capture and timer threads.
    pub fn join(mut self) -> Result<Option<SessionRecord>> {
        let record = match self.worker.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow!("session worker panicked"))?,
            None => None,
        };
        self.shutdown_threads();
        Ok(record)
    }

    fn shutdown_threads(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop();
        }
        if let Some(capture) = self.capture.take() {
            capture.stop();
        }
    }
}

impl Drop for SessionRunner {
    fn drop(&mut self) {
        let _ = self.command_tx.send(RunnerCommand::Stop);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        self.shutdown_threads();
    }
}

fn spawn_capture<S>(mut source: S, command_tx: Sender<RunnerCommand>) -> ThreadHandle
where
    S: FrameSource + 'static,
{
    let (stop_tx, stop_rx) = bounded::<()>(1);
    let handle = std::thread::spawn(move || {
        loop {
            if stop_rx.try_recv().is_ok() {
                break;
            }
            match source.next_frame() {
                Ok(Some(frame)) => {
                    if command_tx.send(RunnerCommand::Frame(frame)).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    let _ = command_tx.send(RunnerCommand::SourceEnded);
                    break;
                }
                Err(err) => {
                    let _ = command_tx.send(RunnerCommand::CaptureFailed(err.to_string()));
                    break;
                }
            }
        }
        drop(source);
    });
    ThreadHandle {
        stop_tx,
        handle: Some(handle),
    }
}

fn spawn_timer(interval: Duration, command_tx: Sender<RunnerCommand>) -> ThreadHandle {
    let (stop_tx, stop_rx) = bounded::<()>(1);
    let handle = std::thread::spawn(move || loop {
        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {
                if command_tx.send(RunnerCommand::Second).is_err() {
                    break;
                }
            }
            _ => break,
        }
    });
    ThreadHandle {
        stop_tx,
        handle: Some(handle),
    }
}

struct RunnerWorker {
    session: Session,
    command_rx: Receiver<RunnerCommand>,
    update_tx: Sender<RunnerUpdate>,
    rng: StdRng,
    last_tick: Option<TickUpdate>,
}

impl RunnerWorker {
    /// Best-effort send; dropped when the consumer has fallen behind.
    fn publish(&self, update: RunnerUpdate) {
        if self.update_tx.len() + LIFECYCLE_SLOTS >= UPDATE_QUEUE {
            debug!("update queue full, dropping progress update");
            return;
        }
        let _ = self.update_tx.try_send(update);
    }

    /// Blocking send for messages a consumer must never miss.
    fn publish_lifecycle(&self, update: RunnerUpdate) {
        let _ = self.update_tx.send(update);
    }

    fn run(mut self) -> Option<SessionRecord> {
        self.session.start();
        self.publish_lifecycle(RunnerUpdate::Started {
            duration_secs: self.session.remaining_secs(),
        });
        while let Ok(command) = self.command_rx.recv() {
            match command {
                RunnerCommand::Frame(captured) => self.handle_frame(captured),
                RunnerCommand::Second => {
                    let done = self.session.count_down();
                    self.publish(RunnerUpdate::Countdown {
                        remaining_secs: self.session.remaining_secs(),
                    });
                    if done {
                        return self.finish(FinishReason::TimeUp);
                    }
                }
                RunnerCommand::UpdateConfig(config) => self.session.update_config(config),
                RunnerCommand::Stop => return self.finish(FinishReason::Stopped),
                RunnerCommand::SourceEnded => return self.finish(FinishReason::SourceEnded),
                RunnerCommand::CaptureFailed(message) => {
                    error!("capture failed: {message}");
                    self.publish_lifecycle(RunnerUpdate::Error(message));
                    return self.finish(FinishReason::CaptureFailed);
                }
            }
        }
        self.finish(FinishReason::Stopped)
    }

    fn handle_frame(&mut self, captured: CapturedFrame) {
        match self.session.tick(&captured.frame, captured.at_ms) {
            Ok(update) => {
                self.publish(RunnerUpdate::Tick(Box::new(update.clone())));
                self.last_tick = Some(update);
            }
            Err(err) if err.skips_tick() => {
                warn!("skipping frame at {:.0} ms: {err}", captured.at_ms);
                self.publish(RunnerUpdate::TickSkipped {
                    at_ms: captured.at_ms,
                    reason: err.to_string(),
                });
            }
            Err(err) => {
                error!("tick failed: {err}");
                self.publish(RunnerUpdate::Error(err.to_string()));
            }
        }
    }

    fn finish(mut self, reason: FinishReason) -> Option<SessionRecord> {
        info!("session ending: {reason:?}");
        let record = self.session.finish_with_rng(&mut self.rng);
        let last_tick = self.last_tick.take().map(Box::new);
        self.publish_lifecycle(RunnerUpdate::Finished {
            record: record.clone(),
            reason,
            last_tick,
        });
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{SyntheticCamera, SyntheticCameraConfig};
    use pulse_lib::{error::PulseError, frame::Frame};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn camera(duration_secs: Option<f64>) -> SyntheticCamera {
        SyntheticCamera::open(SyntheticCameraConfig {
            duration_secs,
            ..SyntheticCameraConfig::default()
        })
        .unwrap()
    }

    fn no_timer() -> RunnerOptions {
        RunnerOptions {
            countdown_interval: None,
            seed: Some(1),
        }
    }

    fn finish_of(updates: &[RunnerUpdate]) -> (Option<SessionRecord>, FinishReason) {
        updates
            .iter()
            .find_map(|u| match u {
                RunnerUpdate::Finished { record, reason, .. } => Some((record.clone(), *reason)),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn exhausted_source_finishes_session() {
        let cam = camera(Some(5.0));
        let released = cam.release_flag();
        let runner = SessionRunner::start(cam, PipelineConfig::default(), no_timer());
        let mut updates = Vec::new();
        for update in runner.updates().iter() {
            let done = matches!(update, RunnerUpdate::Finished { .. });
            updates.push(update);
            if done {
                break;
            }
        }
        let record = runner.join().unwrap().unwrap();

        assert!(matches!(updates[0], RunnerUpdate::Started { duration_secs: 45 }));
        let ticks = updates
            .iter()
            .filter(|u| matches!(u, RunnerUpdate::Tick(_)))
            .count();
        assert!((1..=300).contains(&ticks));
        let (finished, reason) = finish_of(&updates);
        assert_eq!(reason, FinishReason::SourceEnded);
        assert_eq!(finished.as_ref(), Some(&record));
        assert_eq!(record.heart_rate, Some(72));
        assert_eq!(record.samples_analyzed, 300);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn unread_updates_stay_bounded() {
        let cam = camera(Some(60.0));
        let runner = SessionRunner::start(cam, PipelineConfig::default(), no_timer());
        let updates_rx = runner.updates().clone();
        let record = runner.join().unwrap().unwrap();
        let updates: Vec<RunnerUpdate> = updates_rx.try_iter().collect();

        assert!(updates.len() <= UPDATE_QUEUE);
        assert!(matches!(updates[0], RunnerUpdate::Started { .. }));
        assert_eq!(record.samples_analyzed, 3600);
        match updates.last() {
            Some(RunnerUpdate::Finished {
                reason, last_tick, ..
            }) => {
                assert_eq!(*reason, FinishReason::SourceEnded);
                let last = last_tick.as_ref().unwrap();
                assert_eq!(last.buffer.len(), 150);
                assert_eq!(last.heart_rate, Some(72));
                assert_eq!(last.frame_stats.frame_count, 3600);
            }
            other => panic!("expected Finished last, got {other:?}"),
        }
    }

    #[test]
    fn countdown_ends_session_and_releases_camera() {
        let cam = SyntheticCamera::open(SyntheticCameraConfig {
            realtime: true,
            ..SyntheticCameraConfig::default()
        })
        .unwrap();
        let released = cam.release_flag();
        let config = PipelineConfig {
            session_duration_secs: 3,
            ..PipelineConfig::default()
        };
        let options = RunnerOptions {
            countdown_interval: Some(Duration::from_millis(20)),
            seed: Some(2),
        };
        let runner = SessionRunner::start(cam, config, options);
        let updates_rx = runner.updates().clone();
        let record = runner.join().unwrap().unwrap();
        let updates: Vec<RunnerUpdate> = updates_rx.try_iter().collect();
        let (_, reason) = finish_of(&updates);
        assert_eq!(reason, FinishReason::TimeUp);
        assert_eq!(record.duration_secs, 3);
        let countdowns: Vec<u32> = updates
            .iter()
            .filter_map(|u| match u {
                RunnerUpdate::Countdown { remaining_secs } => Some(*remaining_secs),
                _ => None,
            })
            .collect();
        assert_eq!(countdowns, vec![2, 1, 0]);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn stop_after_first_tick() {
        let cam = camera(None);
        let released = cam.release_flag();
        let runner = SessionRunner::start(cam, PipelineConfig::default(), no_timer());
        loop {
            match runner.updates().recv_timeout(Duration::from_secs(5)).unwrap() {
                RunnerUpdate::Tick(_) => break,
                _ => continue,
            }
        }
        runner.stop();
        let updates_rx = runner.updates().clone();
        let record = runner.join().unwrap().unwrap();
        assert!(record.samples_analyzed >= 1);
        let updates: Vec<RunnerUpdate> = updates_rx.try_iter().collect();
        assert_eq!(finish_of(&updates).1, FinishReason::Stopped);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn dropping_runner_releases_camera() {
        let cam = camera(None);
        let released = cam.release_flag();
        let runner = SessionRunner::start(cam, PipelineConfig::default(), no_timer());
        drop(runner);
        assert!(released.load(Ordering::SeqCst));
    }

    struct FailingSource {
        remaining: usize,
        released: Arc<AtomicBool>,
    }

    impl FrameSource for FailingSource {
        fn next_frame(&mut self) -> pulse_lib::Result<Option<CapturedFrame>> {
            if self.remaining == 0 {
                return Err(PulseError::CameraUnavailable("device unplugged".into()));
            }
            self.remaining -= 1;
            // every other frame is black and gets skipped
            let shade = if self.remaining % 2 == 0 { 0 } else { 120 };
            Ok(Some(CapturedFrame {
                frame: Frame::filled(32, 32, [shade, shade / 2, shade / 2, 255]),
                at_ms: (10 - self.remaining) as f64 * 16.0,
            }))
        }
    }

    impl Drop for FailingSource {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn capture_error_is_reported_and_releases_camera() {
        let released = Arc::new(AtomicBool::new(false));
        let source = FailingSource {
            remaining: 10,
            released: Arc::clone(&released),
        };
        let runner = SessionRunner::start(source, PipelineConfig::default(), no_timer());
        let updates_rx = runner.updates().clone();
        let record = runner.join().unwrap().unwrap();
        let updates: Vec<RunnerUpdate> = updates_rx.try_iter().collect();

        let skipped = updates
            .iter()
            .filter(|u| matches!(u, RunnerUpdate::TickSkipped { .. }))
            .count();
        assert_eq!(skipped, 5);
        assert_eq!(record.samples_analyzed, 5);
        assert_eq!(record.heart_rate, None);
        assert!(updates
            .iter()
            .any(|u| matches!(u, RunnerUpdate::Error(msg) if msg.contains("unplugged"))));
        assert_eq!(finish_of(&updates).1, FinishReason::CaptureFailed);
        assert!(released.load(Ordering::SeqCst));
    }
}
