//! Fixed-capacity ring buffer for price history.

use std::collections::VecDeque;

use super::PriceRecord;

/// Bounded FIFO buffer of price records.
///
/// Once full, pushing a new record evicts the oldest one.
#[derive(Debug)]
pub struct RingBuffer {
    buf: VecDeque<PriceRecord>,
    capacity: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be nonzero");
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a record, evicting the oldest if the buffer is full.
    pub fn push(&mut self, record: PriceRecord) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(record);
    }

    /// All retained records, oldest first.
    pub fn values(&self) -> Vec<PriceRecord> {
        self.buf.iter().cloned().collect()
    }

    /// Iterate retained records oldest first without cloning.
    pub fn iter(&self) -> impl Iterator<Item = &PriceRecord> {
        self.buf.iter()
    }

    /// The most recently pushed record.
    pub fn last(&self) -> Option<&PriceRecord> {
        self.buf.back()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
