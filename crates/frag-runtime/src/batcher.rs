//! Size- and time-bounded batching of live updates.

use std::time::{Duration, Instant};

/// Collects items and releases them in batches.
///
/// A batch is released when it reaches `max_batch` items or when its oldest
/// item has waited `max_delay`, whichever comes first. Time is passed in by
/// the caller so the batcher stays independent of any runtime.
#[derive(Debug)]
pub struct UpdateBatcher<T> {
    max_batch: usize,
    max_delay: Duration,
    pending: Vec<T>,
    oldest: Option<Instant>,
}

impl<T> UpdateBatcher<T> {
    /// `max_batch` of zero is treated as one.
    pub fn new(max_batch: usize, max_delay: Duration) -> Self {
        let max_batch = max_batch.max(1);
        Self {
            max_batch,
            max_delay,
            pending: Vec::with_capacity(max_batch),
            oldest: None,
        }
    }

    /// Queue `item`; returns a full batch when one is ready.
    pub fn push(&mut self, item: T, now: Instant) -> Option<Vec<T>> {
        if self.pending.is_empty() {
            self.oldest = Some(now);
        }
        self.pending.push(item);

        if self.pending.len() >= self.max_batch || self.is_due(now) {
            return self.flush();
        }
        None
    }

    /// Release the pending batch if its delay has run out.
    pub fn poll(&mut self, now: Instant) -> Option<Vec<T>> {
        if self.is_due(now) {
            self.flush()
        } else {
            None
        }
    }

    /// Release whatever is pending.
    pub fn flush(&mut self) -> Option<Vec<T>> {
        self.oldest = None;
        if self.pending.is_empty() {
            return None;
        }
        Some(std::mem::replace(
            &mut self.pending,
            Vec::with_capacity(self.max_batch),
        ))
    }

    /// When the pending batch falls due, if anything is pending.
    pub fn deadline(&self) -> Option<Instant> {
        self.oldest.map(|t| t + self.max_delay)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn is_due(&self, now: Instant) -> bool {
        match self.deadline() {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }
}
