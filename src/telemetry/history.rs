//! # Rolling History Buffer
//!
//! Bounded FIFO of readings in arrival order. The oldest entries are evicted
//! once capacity is reached.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::reading::{Metric, Reading};

/// Default number of readings retained
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// One point of a per-metric series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub observed_at: DateTime<Utc>,
    pub value: Option<f64>,
}

/// Capacity-bounded, append-only store of readings
///
/// Readers get copies, so a snapshot is never invalidated by a later append.
#[derive(Debug)]
pub struct HistoryBuffer {
    capacity: usize,
    entries: Mutex<VecDeque<Reading>>,
}

impl HistoryBuffer {
    /// Create an empty buffer holding at most `capacity` readings (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Append a reading at the tail, evicting from the head on overflow
    pub fn append(&self, reading: Reading) {
        let mut entries = self.lock();
        entries.push_back(reading);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// Copy of the retained readings, oldest first
    pub fn snapshot(&self) -> Vec<Reading> {
        self.lock().iter().copied().collect()
    }

    /// Values of one metric over the retained readings, oldest first
    pub fn series(&self, metric: Metric) -> Vec<SeriesPoint> {
        self.lock()
            .iter()
            .map(|r| SeriesPoint {
                observed_at: r.observed_at,
                value: r.value(metric),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Reading>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
