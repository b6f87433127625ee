pub mod camera;
pub mod history;
pub mod runner;

pub use camera::{CapturedFrame, FrameSource, SyntheticCamera, SyntheticCameraConfig};
pub use history::HistoryStore;
pub use runner::{FinishReason, RunnerCommand, RunnerOptions, RunnerUpdate, SessionRunner};
