//! Test fixtures for Tandem development.
//!
//! Provides lifecycle-counting payload types used to assert
//! exactly-once construction and teardown of host and device mirrors.
//! Counters are atomic because device mirrors are dropped on the
//! device worker thread.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared construction/destruction tally for [`TrackedValue`]s.
#[derive(Debug, Default)]
pub struct LifeCounter {
    constructed: AtomicUsize,
    dropped: AtomicUsize,
}

impl LifeCounter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn constructed(&self) -> usize {
        self.constructed.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }

    /// Instances constructed but not yet dropped.
    pub fn live(&self) -> usize {
        self.constructed() - self.dropped()
    }
}

/// A payload that tallies its own lifecycle into a [`LifeCounter`].
#[derive(Debug)]
pub struct TrackedValue {
    pub value: i32,
    counter: Arc<LifeCounter>,
}

impl TrackedValue {
    pub fn new(value: i32, counter: &Arc<LifeCounter>) -> Self {
        counter.constructed.fetch_add(1, Ordering::SeqCst);
        Self {
            value,
            counter: Arc::clone(counter),
        }
    }
}

impl Drop for TrackedValue {
    fn drop(&mut self) {
        self.counter.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_tracks_lifecycle() {
        let counter = LifeCounter::new();
        {
            let a = TrackedValue::new(1, &counter);
            let _b = TrackedValue::new(2, &counter);
            assert_eq!(counter.live(), 2);
            assert_eq!(a.value, 1);
        }
        assert_eq!(counter.constructed(), 2);
        assert_eq!(counter.dropped(), 2);
        assert_eq!(counter.live(), 0);
    }
}
