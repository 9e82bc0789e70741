//! Fixed-capacity window of recent samples
//!
//! One queue of whole `Sample`s keeps the acceleration, gyro and timestamp
//! channels index-aligned by construction.

use std::collections::VecDeque;

use crate::types::Sample;

/// Default number of samples retained
pub const WINDOW_CAPACITY: usize = 80;

/// FIFO ring of the most recent samples; the oldest entry is evicted on overflow.
#[derive(Debug, Clone)]
pub struct WindowBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
    total_pushed: u64,
}

impl Default for WindowBuffer {
    fn default() -> Self {
        Self::new(WINDOW_CAPACITY)
    }
}

impl WindowBuffer {
    /// Create a buffer holding at most `capacity` samples (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            total_pushed: 0,
        }
    }

    /// Append a sample, evicting the oldest when full
    pub fn push(&mut self, sample: Sample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        self.total_pushed += 1;
    }

    /// The last `n` samples in arrival order (fewer if not yet filled)
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &Sample> + '_ {
        let start = self.samples.len().saturating_sub(n);
        self.samples.range(start..)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> + '_ {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    /// Samples pushed since construction or the last `clear`, including evicted ones
    pub fn total_pushed(&self) -> u64 {
        self.total_pushed
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.total_pushed = 0;
    }
}
