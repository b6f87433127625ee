pub mod config;
pub mod detectors;
pub mod error;
pub mod frame;
pub mod io;
pub mod metrics;
pub mod pipeline;
pub mod plot;
pub mod session;
pub mod signal;
pub mod spectrum;

pub use config::PipelineConfig;
pub use detectors::*;
pub use error::{PulseError, Result};
pub use metrics::*;
pub use session::{Session, SessionRecord, SessionState, TickUpdate};
pub use signal::*;
