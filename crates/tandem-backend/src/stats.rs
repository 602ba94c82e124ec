//! Allocation instrumentation counters.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Interior counters, shared between the backend and its stats
/// snapshots via `Arc`.
#[derive(Debug, Default)]
pub(crate) struct StatsInner {
    pub host_allocs: AtomicU64,
    pub host_frees: AtomicU64,
    pub device_allocs: AtomicU64,
    pub device_frees: AtomicU64,
    pub unified_allocs: AtomicU64,
    pub unified_frees: AtomicU64,
    pub device_bytes_in_use: AtomicUsize,
    pub copies: AtomicU64,
    pub device_tasks: AtomicU64,
}

/// A point-in-time snapshot of a backend's allocation counters.
///
/// Tests use this as the instrumented allocator: after every handle in
/// an ownership group is dropped, allocation and free counts must
/// match in every space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackendStats {
    /// Host-space allocations performed.
    pub host_allocs: u64,
    /// Host-space frees performed.
    pub host_frees: u64,
    /// Device-space allocations performed.
    pub device_allocs: u64,
    /// Device-space frees performed.
    pub device_frees: u64,
    /// Unified-space allocations performed.
    pub unified_allocs: u64,
    /// Unified-space frees performed.
    pub unified_frees: u64,
    /// Bytes currently resident in the device arena.
    pub device_bytes_in_use: usize,
    /// Byte copies performed between spaces.
    pub copies: u64,
    /// Single-thread device tasks executed.
    pub device_tasks: u64,
}

impl BackendStats {
    /// Whether every space has as many frees as allocations.
    pub fn balanced(&self) -> bool {
        self.host_allocs == self.host_frees
            && self.device_allocs == self.device_frees
            && self.unified_allocs == self.unified_frees
    }

    /// Allocations across all spaces.
    pub fn total_allocs(&self) -> u64 {
        self.host_allocs + self.device_allocs + self.unified_allocs
    }

    /// Frees across all spaces.
    pub fn total_frees(&self) -> u64 {
        self.host_frees + self.device_frees + self.unified_frees
    }
}

impl StatsInner {
    pub(crate) fn snapshot(&self) -> BackendStats {
        BackendStats {
            host_allocs: self.host_allocs.load(Ordering::Relaxed),
            host_frees: self.host_frees.load(Ordering::Relaxed),
            device_allocs: self.device_allocs.load(Ordering::Relaxed),
            device_frees: self.device_frees.load(Ordering::Relaxed),
            unified_allocs: self.unified_allocs.load(Ordering::Relaxed),
            unified_frees: self.unified_frees.load(Ordering::Relaxed),
            device_bytes_in_use: self.device_bytes_in_use.load(Ordering::Relaxed),
            copies: self.copies.load(Ordering::Relaxed),
            device_tasks: self.device_tasks.load(Ordering::Relaxed),
        }
    }
}
