//! Core data types for blockflow-rs
//!
//! # Main Types
//!
//! - [`RingBuffer`] - Fixed-capacity FIFO used for source history and time series
//! - [`Sample`] - A single wall-clock timestamped value
//! - [`SourceStatistics`] - Count/min/max/mean/stddev summary over a window
//!
//! # Memory Management
//!
//! Ring buffers allocate their arena once on the first `capacity` pushes and
//! then overwrite the oldest slot in place; nothing is shifted on overflow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default number of values retained per data source
pub const DEFAULT_MAX_HISTORY: usize = 100;

/// Default number of samples retained per visualized node
pub const DEFAULT_MAX_POINTS: usize = 100;

/// Fixed-capacity circular buffer (arena + head index).
///
/// Once full, every push overwrites the oldest element. Iteration always runs
/// oldest to newest.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<T>,
    /// Index of the oldest element once the buffer has wrapped
    head: usize,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create an empty buffer. A capacity of zero is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            head: 0,
            capacity,
        }
    }

    /// Append a value, returning the evicted oldest value if the buffer was full
    pub fn push(&mut self, value: T) -> Option<T> {
        if self.slots.len() < self.capacity {
            self.slots.push(value);
            None
        } else {
            let old = std::mem::replace(&mut self.slots[self.head], value);
            self.head = (self.head + 1) % self.capacity;
            Some(old)
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.slots.len() == self.capacity
    }

    /// Get the i-th oldest element
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.slots.len() {
            return None;
        }
        self.slots.get((self.head + index) % self.slots.len())
    }

    /// Most recently pushed element
    pub fn last(&self) -> Option<&T> {
        if self.slots.is_empty() {
            None
        } else {
            self.get(self.slots.len() - 1)
        }
    }

    /// Iterate oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator + Clone + '_ {
        let len = self.slots.len();
        (0..len).map(move |i| &self.slots[(self.head + i) % len])
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.head = 0;
    }

    /// Change capacity, keeping the most recent values that still fit
    pub fn resize(&mut self, capacity: usize)
    where
        T: Clone,
    {
        let capacity = capacity.max(1);
        if capacity == self.capacity {
            return;
        }
        let keep = self.slots.len().min(capacity);
        let skip = self.slots.len() - keep;
        let retained: Vec<T> = self.iter().skip(skip).cloned().collect();
        self.slots = Vec::with_capacity(capacity);
        self.slots.extend(retained);
        self.head = 0;
        self.capacity = capacity;
    }

    /// Copy out in chronological order
    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.iter().cloned().collect()
    }
}

/// A single time-series point published for a node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Wall-clock time of the tick that produced the value
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Summary statistics over a window of values.
///
/// `std_dev` is the population standard deviation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStatistics {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl SourceStatistics {
    /// Compute statistics in two passes (mean first, then variance).
    /// An empty input yields all zeros.
    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = f64>,
        I::IntoIter: Clone,
    {
        let iter = values.into_iter();
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::MAX;
        let mut max = f64::MIN;
        for v in iter.clone() {
            count += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        if count == 0 {
            return Self::default();
        }
        let mean = sum / count as f64;
        let variance = iter.map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
        Self {
            count,
            min,
            max,
            mean,
            std_dev: variance.sqrt(),
        }
    }
}
