use crate::error::{PulseError, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

pub const DEFAULT_BUFFER_CAPACITY: usize = 150;
pub const MIN_BUFFER_CAPACITY: usize = 30;
pub const MAX_BUFFER_CAPACITY: usize = 1024;

/// One analysed frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Milliseconds since the session started.
    pub t_ms: f64,
    /// Red reflectance ratio in [0, 1].
    pub value: f64,
}

impl Sample {
    pub fn new(t_ms: f64, value: f64) -> Self {
        Self { t_ms, value }
    }

    pub fn is_finite(&self) -> bool {
        self.t_ms.is_finite() && self.value.is_finite()
    }
}

/// Bounded FIFO of samples with non-decreasing timestamps.
#[derive(Debug, Clone)]
pub struct SignalBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl SignalBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last(&self) -> Option<Sample> {
        self.samples.back().copied()
    }

    /// Append at the tail, evicting the head once the capacity is exceeded.
    /// NaN or infinite fields are rejected so ordering stays total.
    pub fn push(&mut self, sample: Sample) -> Result<()> {
        if !sample.is_finite() {
            return Err(PulseError::NonFiniteSample {
                t_ms: sample.t_ms,
                value: sample.value,
            });
        }
        if let Some(last) = self.samples.back() {
            if sample.t_ms < last.t_ms {
                return Err(PulseError::NonMonotonicTimestamp {
                    last_ms: last.t_ms,
                    got_ms: sample.t_ms,
                });
            }
        }
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
        Ok(())
    }

    /// Resize; shrinking drops the oldest samples right away.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn snapshot(&self) -> Arc<[Sample]> {
        self.samples.iter().copied().collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.value).collect()
    }
}

impl Default for SignalBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }
}

/// Handle for one producer and one consumer on separate threads. Snapshots
/// are copied under the lock, so a reader never sees a half-applied push.
#[derive(Debug, Clone, Default)]
pub struct SharedSignalBuffer {
    inner: Arc<Mutex<SignalBuffer>>,
}

impl SharedSignalBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SignalBuffer::with_capacity(capacity))),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut SignalBuffer) -> R) -> R {
        // Mutations finish before the guard drops, so a poisoned lock still
        // holds a whole buffer.
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn push(&self, sample: Sample) -> Result<()> {
        self.with(|buf| buf.push(sample))
    }

    pub fn snapshot(&self) -> Arc<[Sample]> {
        self.with(|buf| buf.snapshot())
    }

    pub fn len(&self) -> usize {
        self.with(|buf| buf.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.with(|buf| buf.capacity())
    }

    pub fn set_capacity(&self, capacity: usize) {
        self.with(|buf| buf.set_capacity(capacity))
    }

    pub fn clear(&self) {
        self.with(|buf| buf.clear())
    }
}

/// Point events on the buffer timeline (peak indices).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Events {
    pub indices: Vec<usize>,
}

impl Events {
    pub fn from_indices(indices: Vec<usize>) -> Self {
        Self { indices }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Inter-peak intervals in milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntervalSeries {
    pub intervals_ms: Vec<f64>,
}

impl IntervalSeries {
    pub fn from_events(samples: &[Sample], events: &Events) -> Self {
        let mut intervals_ms = Vec::new();
        for w in events.indices.windows(2) {
            if let (Some(a), Some(b)) = (samples.get(w[0]), samples.get(w[1])) {
                intervals_ms.push(b.t_ms - a.t_ms);
            }
        }
        Self { intervals_ms }
    }

    pub fn len(&self) -> usize {
        self.intervals_ms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals_ms.is_empty()
    }
}

/// Time span between the first and last sample, in seconds.
pub fn span_seconds(samples: &[Sample]) -> f64 {
    match (samples.first(), samples.last()) {
        (Some(first), Some(last)) => (last.t_ms - first.t_ms) / 1000.0,
        _ => 0.0,
    }
}
