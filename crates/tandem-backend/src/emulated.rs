//! Host-emulated reference backend.
//!
//! [`EmulatedDevice`] models an accelerator without requiring one:
//!
//! - The device space is a host-heap arena with a hard byte capacity,
//!   so exhaustion behavior is exercisable.
//! - Device execution is a dedicated worker thread owning a task
//!   mailbox. `run_device_task` is a rendezvous: the submitting thread
//!   blocks until the worker has finished the task, which reproduces
//!   the launch-then-synchronize shape of real single-thread
//!   administrative kernels.
//! - Unified memory is ordinary host memory reachable from both
//!   personalities; `synchronize` drains the task queue before the
//!   host touches it.

use std::alloc::Layout;
use std::panic::{self, AssertUnwindSafe};
use std::ptr::NonNull;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use tandem_core::{AllocError, CopyDirection, MemorySpace};

use crate::backend::{DeviceTask, MemoryBackend};
use crate::config::BackendConfig;
use crate::stats::{BackendStats, StatsInner};

enum WorkerMsg {
    Task(DeviceTask, Sender<std::thread::Result<()>>),
    Shutdown,
}

/// Reference [`MemoryBackend`] backed entirely by host memory.
pub struct EmulatedDevice {
    config: BackendConfig,
    stats: Arc<StatsInner>,
    task_tx: Sender<WorkerMsg>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EmulatedDevice {
    /// Spawn the device worker and return the backend.
    pub fn new(config: BackendConfig) -> Self {
        let (task_tx, task_rx) = crossbeam_channel::unbounded();
        let worker = std::thread::Builder::new()
            .name("tandem-device".into())
            .spawn(move || Self::worker_loop(task_rx))
            .expect("failed to spawn device worker thread");

        Self {
            config,
            stats: Arc::new(StatsInner::default()),
            task_tx,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Wrap this backend in an `Arc` for sharing.
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// The configuration this backend was built with.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    fn worker_loop(task_rx: Receiver<WorkerMsg>) {
        while let Ok(msg) = task_rx.recv() {
            match msg {
                WorkerMsg::Task(task, done) => {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(task));
                    let _ = done.send(outcome);
                }
                WorkerMsg::Shutdown => break,
            }
        }
    }

    fn raw_alloc(&self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        // SAFETY: layout is non-zero (checked by the caller).
        let ptr = unsafe { std::alloc::alloc(layout) };
        NonNull::new(ptr).ok_or(AllocError::SystemExhausted {
            requested: layout.size(),
        })
    }

    fn reserve_device(&self, bytes: usize) -> Result<(), AllocError> {
        let previous = self
            .stats
            .device_bytes_in_use
            .fetch_add(bytes, Ordering::Relaxed);
        if previous + bytes > self.config.device_capacity {
            self.stats
                .device_bytes_in_use
                .fetch_sub(bytes, Ordering::Relaxed);
            return Err(AllocError::CapacityExceeded {
                space: MemorySpace::Device,
                requested: bytes,
                available: self.config.device_capacity.saturating_sub(previous),
            });
        }
        Ok(())
    }
}

impl Default for EmulatedDevice {
    fn default() -> Self {
        Self::new(BackendConfig::default())
    }
}

impl MemoryBackend for EmulatedDevice {
    fn allocate(&self, layout: Layout, space: MemorySpace) -> Result<NonNull<u8>, AllocError> {
        if layout.size() == 0 {
            return Err(AllocError::ZeroSized);
        }
        match space {
            MemorySpace::None => return Err(AllocError::UnsupportedSpace { space }),
            MemorySpace::Unified if !self.config.unified => {
                return Err(AllocError::UnsupportedSpace { space });
            }
            _ => {}
        }

        if space == MemorySpace::Device {
            self.reserve_device(layout.size())?;
        }

        let ptr = match self.raw_alloc(layout) {
            Ok(ptr) => ptr,
            Err(err) => {
                if space == MemorySpace::Device {
                    self.stats
                        .device_bytes_in_use
                        .fetch_sub(layout.size(), Ordering::Relaxed);
                }
                return Err(err);
            }
        };

        match space {
            MemorySpace::Host => self.stats.host_allocs.fetch_add(1, Ordering::Relaxed),
            MemorySpace::Device => self.stats.device_allocs.fetch_add(1, Ordering::Relaxed),
            MemorySpace::Unified => self.stats.unified_allocs.fetch_add(1, Ordering::Relaxed),
            MemorySpace::None => unreachable!(),
        };

        tracing::trace!(
            target: "tandem::backend",
            %space,
            bytes = layout.size(),
            ptr = ?ptr.as_ptr(),
            "allocated"
        );
        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout, space: MemorySpace) {
        // SAFETY: caller guarantees ptr came from allocate with this
        // layout and has not been freed.
        unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) };

        match space {
            MemorySpace::Host => {
                self.stats.host_frees.fetch_add(1, Ordering::Relaxed);
            }
            MemorySpace::Device => {
                self.stats.device_frees.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .device_bytes_in_use
                    .fetch_sub(layout.size(), Ordering::Relaxed);
            }
            MemorySpace::Unified => {
                self.stats.unified_frees.fetch_add(1, Ordering::Relaxed);
            }
            MemorySpace::None => {}
        }

        tracing::trace!(
            target: "tandem::backend",
            %space,
            bytes = layout.size(),
            "freed"
        );
    }

    unsafe fn copy(
        &self,
        src: NonNull<u8>,
        dst: NonNull<u8>,
        bytes: usize,
        direction: CopyDirection,
    ) {
        // SAFETY: caller guarantees both ranges are live, sized, and
        // non-overlapping.
        unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), dst.as_ptr(), bytes) };
        self.stats.copies.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(target: "tandem::backend", %direction, bytes, "copied");
    }

    fn run_device_task(&self, task: DeviceTask) {
        self.stats.device_tasks.fetch_add(1, Ordering::Relaxed);
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        self.task_tx
            .send(WorkerMsg::Task(task, done_tx))
            .expect("device worker is gone");
        match done_rx.recv().expect("device worker is gone") {
            Ok(()) => {}
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    fn synchronize(&self) {
        // The worker is a single FIFO consumer, so an empty task
        // completing means everything before it has completed.
        self.run_device_task(Box::new(|| {}));
    }

    fn stats(&self) -> BackendStats {
        self.stats.snapshot()
    }
}

impl Drop for EmulatedDevice {
    fn drop(&mut self) {
        let _ = self.task_tx.send(WorkerMsg::Shutdown);
        if let Some(worker) = self.worker.lock().expect("worker handle poisoned").take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> EmulatedDevice {
        EmulatedDevice::new(BackendConfig::new(1024))
    }

    #[test]
    fn allocate_and_free_balance() {
        let dev = backend();
        let layout = Layout::array::<u64>(8).unwrap();
        let host = dev.allocate(layout, MemorySpace::Host).unwrap();
        let gpu = dev.allocate(layout, MemorySpace::Device).unwrap();
        assert_eq!(dev.stats().device_bytes_in_use, 64);

        // SAFETY: both pointers come from allocate above.
        unsafe {
            dev.deallocate(host, layout, MemorySpace::Host);
            dev.deallocate(gpu, layout, MemorySpace::Device);
        }
        let stats = dev.stats();
        assert!(stats.balanced());
        assert_eq!(stats.device_bytes_in_use, 0);
    }

    #[test]
    fn device_capacity_is_enforced() {
        let dev = backend();
        let layout = Layout::array::<u8>(2048).unwrap();
        let err = dev.allocate(layout, MemorySpace::Device).unwrap_err();
        assert!(matches!(err, AllocError::CapacityExceeded { .. }));
        // A failed reservation must not leak accounting.
        assert_eq!(dev.stats().device_bytes_in_use, 0);
    }

    #[test]
    fn zero_sized_requests_are_rejected() {
        let dev = backend();
        let layout = Layout::array::<u8>(0).unwrap();
        assert_eq!(
            dev.allocate(layout, MemorySpace::Host),
            Err(AllocError::ZeroSized)
        );
    }

    #[test]
    fn unified_can_be_disabled() {
        let dev = EmulatedDevice::new(BackendConfig::new(1024).without_unified());
        let layout = Layout::array::<u8>(16).unwrap();
        assert_eq!(
            dev.allocate(layout, MemorySpace::Unified),
            Err(AllocError::UnsupportedSpace {
                space: MemorySpace::Unified
            })
        );
    }

    #[test]
    fn device_tasks_run_in_order_and_block() {
        let dev = backend();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..4 {
            let log = Arc::clone(&log);
            dev.run_device_task(Box::new(move || {
                log.lock().unwrap().push(i);
            }));
        }
        dev.synchronize();
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(dev.stats().device_tasks, 5);
    }

    #[test]
    fn copy_moves_bytes() {
        let dev = backend();
        let layout = Layout::array::<u8>(4).unwrap();
        let src = dev.allocate(layout, MemorySpace::Host).unwrap();
        let dst = dev.allocate(layout, MemorySpace::Device).unwrap();

        // SAFETY: both allocations are 4 bytes and distinct.
        unsafe {
            src.as_ptr().copy_from_nonoverlapping([9, 8, 7, 6].as_ptr(), 4);
            dev.copy(src, dst, 4, CopyDirection::HostToDevice);
            assert_eq!(std::slice::from_raw_parts(dst.as_ptr(), 4), &[9, 8, 7, 6]);
            dev.deallocate(src, layout, MemorySpace::Host);
            dev.deallocate(dst, layout, MemorySpace::Device);
        }
        assert_eq!(dev.stats().copies, 1);
    }
}
