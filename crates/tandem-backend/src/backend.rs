//! The [`MemoryBackend`] capability interface.

use std::alloc::Layout;
use std::ptr::NonNull;

use tandem_core::{AllocError, CopyDirection, MemorySpace};

use crate::stats::BackendStats;

/// A single administrative task to run on the device.
///
/// Tasks are one-shot closures: mirror construction, mirror
/// destruction, pointer casts. They are short and bounded, which is
/// why there is no cancellation primitive.
pub type DeviceTask = Box<dyn FnOnce() + Send + 'static>;

/// The raw capability set the handle layers consume.
///
/// Implementations own the actual memory spaces. All methods may be
/// called from the host personality only; device code never sees the
/// backend, only raw pointers that were produced through it.
pub trait MemoryBackend: Send + Sync {
    /// Allocate `layout` in `space`.
    ///
    /// Exhaustion is returned, not retried; the caller treats it as
    /// fatal to the requesting operation.
    fn allocate(&self, layout: Layout, space: MemorySpace) -> Result<NonNull<u8>, AllocError>;

    /// Free an allocation previously produced by [`allocate`]
    /// (`MemoryBackend::allocate`).
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by `allocate` on this backend
    /// with the same `layout` and `space`, and must not be used again.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout, space: MemorySpace);

    /// Copy `bytes` bytes from `src` to `dst`.
    ///
    /// # Safety
    ///
    /// Both pointers must be live allocations from this backend with
    /// at least `bytes` bytes, the ranges must not overlap, and
    /// `direction` must match the spaces the pointers belong to.
    unsafe fn copy(&self, src: NonNull<u8>, dst: NonNull<u8>, bytes: usize, direction: CopyDirection);

    /// Run one single-thread task on the device and wait for it.
    ///
    /// This is a synchronous barrier: the call returns only after the
    /// task has finished executing in the device personality.
    fn run_device_task(&self, task: DeviceTask);

    /// Block until all previously submitted device work has finished.
    ///
    /// Required before host-personality access to `Unified` memory.
    fn synchronize(&self);

    /// A snapshot of the backend's allocation counters.
    fn stats(&self) -> BackendStats;
}

/// A pointer wrapper that may cross into a device task.
///
/// Raw pointers are not `Send`; handing one to a device task is only
/// sound because the runtime's ordering rules guarantee the host does
/// not touch the pointee while the (synchronous) task runs.
pub struct SendPtr<T: ?Sized>(pub NonNull<T>);

// SAFETY: the wrapper only moves the address across the task boundary;
// run_device_task blocks the submitting host thread until the task
// completes, so the pointee is never accessed from two threads at once.
unsafe impl<T: ?Sized> Send for SendPtr<T> {}

impl<T: ?Sized> SendPtr<T> {
    /// The wrapped pointer.
    pub fn get(&self) -> NonNull<T> {
        self.0
    }
}

impl<T: ?Sized> Clone for SendPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: ?Sized> Copy for SendPtr<T> {}

/// Run a closure in the device personality and return its result.
///
/// Convenience over [`MemoryBackend::run_device_task`] for callers
/// that need a value back (device-side construction and casts). Blocks
/// until the device has produced the result.
pub fn device_call<R, F>(backend: &dyn MemoryBackend, f: F) -> R
where
    R: Send + 'static,
    F: FnOnce() -> R + Send + 'static,
{
    let (tx, rx) = crossbeam_channel::bounded(1);
    backend.run_device_task(Box::new(move || {
        let _ = tx.send(f());
    }));
    rx.recv().expect("device task dropped its result")
}
