//! The dual-residency handle type.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;
use std::sync::Arc;

use tandem_backend::{DeviceTask, MemoryBackend};

use crate::arguments::ArgumentSet;
use crate::strategy::{DeviceOnly, Dual, HostOnly, Strategy};

/// Shared per-ownership-group state.
///
/// Exactly one control block exists per ownership group, heap
/// allocated at owning construction and freed when the count reaches
/// zero. The count is a plain `Cell`: handles are not `Send`, so only
/// one host thread can ever touch it.
pub(crate) struct Control {
    pub(crate) refs: Cell<usize>,
    pub(crate) arguments: RefCell<Option<ArgumentSet>>,
    /// Drops the host mirror. Present for host-carrying strategies.
    pub(crate) host_drop: Cell<Option<Box<dyn FnOnce()>>>,
    /// Drops the device mirror; runs inside a device task.
    pub(crate) device_drop: Cell<Option<DeviceTask>>,
    /// Needed to issue the teardown task. Present whenever a device
    /// mirror is.
    pub(crate) backend: Option<Arc<dyn MemoryBackend>>,
}

/// A reference-counted handle over a polymorphic object with up to two
/// mirrors, one per memory space, selected by the execution strategy
/// `S`.
///
/// Copies share one non-atomic reference count; the last copy to drop
/// tears down every mirror. Aliasing handles (produced by the cast
/// functions) share the count while viewing a different pointer.
///
/// Mirrors are not kept consistent after construction, with one
/// exception: resources registered through
/// [`register_arguments`](ManagedPtr::register_arguments) are
/// re-synchronized on every copy.
///
/// Dereferencing an empty handle is undefined by design on the
/// unchecked paths; check [`is_null`](ManagedPtr::is_null) first.
pub struct ManagedPtr<T: ?Sized, S: Strategy = Dual> {
    pub(crate) host: Option<NonNull<T>>,
    pub(crate) device: Option<NonNull<T>>,
    pub(crate) control: Option<NonNull<Control>>,
    pub(crate) _strategy: PhantomData<S>,
}

impl<T: ?Sized, S: Strategy> ManagedPtr<T, S> {
    /// An empty handle: no mirrors, `use_count() == 0`.
    pub fn new() -> Self {
        Self {
            host: None,
            device: None,
            control: None,
            _strategy: PhantomData,
        }
    }

    /// The number of handles sharing this ownership group, or 0 for an
    /// empty handle.
    ///
    /// Host-side bookkeeping; the count is not visible to device code.
    pub fn use_count(&self) -> usize {
        // SAFETY: the control block outlives every handle that points
        // to it.
        self.control
            .map_or(0, |control| unsafe { control.as_ref() }.refs.get())
    }

    /// Heap-allocate a fresh control block with a count of one.
    pub(crate) fn new_owning(
        host: Option<NonNull<T>>,
        device: Option<NonNull<T>>,
        host_drop: Option<Box<dyn FnOnce()>>,
        device_drop: Option<DeviceTask>,
        backend: Option<Arc<dyn MemoryBackend>>,
    ) -> Self {
        let control = Box::new(Control {
            refs: Cell::new(1),
            arguments: RefCell::new(None),
            host_drop: Cell::new(host_drop),
            device_drop: Cell::new(device_drop),
            backend,
        });
        // SAFETY: Box::into_raw never returns null.
        let control = unsafe { NonNull::new_unchecked(Box::into_raw(control)) };
        Self {
            host,
            device,
            control: Some(control),
            _strategy: PhantomData,
        }
    }

    /// Increment the count and re-synchronize registered resources.
    ///
    /// The resynchronization runs before the new handle is usable,
    /// which is the ordering guarantee nested resources rely on.
    pub(crate) fn bump(&self) {
        let Some(control) = self.control else { return };
        // SAFETY: live control block, host thread only.
        let control = unsafe { control.as_ref() };
        control.refs.set(control.refs.get() + 1);
        if let Some(arguments) = control.arguments.borrow().as_ref() {
            arguments.resynchronize_all();
        }
    }

    /// Re-synchronize registered resources without touching the count.
    pub(crate) fn resync_arguments(&self) {
        let Some(control) = self.control else { return };
        // SAFETY: live control block.
        let control = unsafe { control.as_ref() };
        if let Some(arguments) = control.arguments.borrow().as_ref() {
            arguments.resynchronize_all();
        }
    }

    /// The backend of this ownership group, if it manages a device
    /// mirror.
    pub(crate) fn backend_arc(&self) -> Option<Arc<dyn MemoryBackend>> {
        // SAFETY: live control block.
        self.control
            .and_then(|control| unsafe { control.as_ref() }.backend.clone())
    }
}

impl<T: ?Sized, S: Strategy> Drop for ManagedPtr<T, S> {
    fn drop(&mut self) {
        let Some(control_ptr) = self.control else { return };
        // SAFETY: the control block is alive while any handle in the
        // group exists, and this handle is one.
        let control = unsafe { control_ptr.as_ref() };
        let count = control.refs.get();
        debug_assert!(count > 0, "reference count underflow");
        control.refs.set(count - 1);
        if count != 1 {
            return;
        }

        // Last handle: release the argument set exactly once, drop the
        // host mirror inline, then drop the device mirror through a
        // synchronous device task.
        if let Some(arguments) = control.arguments.borrow_mut().take() {
            arguments.release();
        }
        if let Some(host_drop) = control.host_drop.take() {
            host_drop();
        }
        if let Some(device_drop) = control.device_drop.take() {
            let backend = control
                .backend
                .clone()
                .expect("device mirror registered without a backend");
            backend.run_device_task(device_drop);
        }

        // SAFETY: the count reached zero, so no other handle can reach
        // the block again.
        unsafe { drop(Box::from_raw(control_ptr.as_ptr())) };
    }
}

impl<T: ?Sized, S: Strategy> Clone for ManagedPtr<T, S> {
    fn clone(&self) -> Self {
        self.bump();
        Self {
            host: self.host,
            device: self.device,
            control: self.control,
            _strategy: PhantomData,
        }
    }
}

impl<T: ?Sized, S: Strategy> Default for ManagedPtr<T, S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized, S: Strategy> PartialEq for ManagedPtr<T, S> {
    /// Handles compare equal when they view the same mirror pointers,
    /// regardless of ownership group.
    fn eq(&self, other: &Self) -> bool {
        self.host.map(NonNull::as_ptr) == other.host.map(NonNull::as_ptr)
            && self.device.map(NonNull::as_ptr) == other.device.map(NonNull::as_ptr)
    }
}

impl<T: ?Sized, S: Strategy> Eq for ManagedPtr<T, S> {}

impl<T: ?Sized, S: Strategy> fmt::Debug for ManagedPtr<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedPtr")
            .field("strategy", &S::NAME)
            .field("host", &self.host.map(|p| p.as_ptr() as *const ()))
            .field("device", &self.device.map(|p| p.as_ptr() as *const ()))
            .field("use_count", &self.use_count())
            .finish()
    }
}

impl<T: ?Sized> ManagedPtr<T, HostOnly> {
    /// Take ownership of a host object.
    ///
    /// Coercion at the call site (`Box<Derived>` to `Box<dyn Base>`)
    /// is the convertibility requirement; an inconvertible type fails
    /// to compile.
    pub fn from_host(object: Box<T>) -> Self
    where
        T: 'static,
    {
        // SAFETY: Box::into_raw never returns null.
        let host = unsafe { NonNull::new_unchecked(Box::into_raw(object)) };
        let host_drop: Box<dyn FnOnce()> = Box::new(move || {
            // SAFETY: host came from Box::into_raw above and this
            // closure runs at most once.
            unsafe { drop(Box::from_raw(host.as_ptr())) };
        });
        Self::new_owning(Some(host), None, Some(host_drop), None, None)
    }

    /// Share `other`'s ownership group while viewing `view` instead.
    pub fn alias<U: ?Sized>(other: &ManagedPtr<U, HostOnly>, view: NonNull<T>) -> Self {
        other.bump();
        Self {
            host: Some(view),
            device: None,
            control: other.control,
            _strategy: PhantomData,
        }
    }

    /// Shared access to the host mirror, or `None` for an empty
    /// handle.
    pub fn get(&self) -> Option<&T> {
        // SAFETY: the host mirror lives until the group's teardown,
        // which cannot happen while this handle borrows it.
        self.host.map(|p| unsafe { &*p.as_ptr() })
    }

    /// Whether the handle holds no object.
    pub fn is_null(&self) -> bool {
        self.host.is_none()
    }

    /// Arguments are a dual-residency concern; nothing to register
    /// when only one mirror exists.
    pub fn register_arguments(&self, _arguments: ArgumentSet) {}
}

impl<T: ?Sized> Deref for ManagedPtr<T, HostOnly> {
    type Target = T;

    /// Unchecked hot-path dereference of the host mirror.
    fn deref(&self) -> &T {
        debug_assert!(self.host.is_some(), "dereferenced an empty handle");
        // SAFETY: caller contract; empty handles must be checked with
        // is_null before dereferencing.
        unsafe { &*self.host.unwrap_unchecked().as_ptr() }
    }
}

impl<T: ?Sized> ManagedPtr<T, DeviceOnly> {
    /// Take ownership of a device object.
    ///
    /// `device` must point to an object constructed inside a device
    /// task on `backend`; the teardown task will drop it there.
    pub fn from_device(device: NonNull<T>, backend: Arc<dyn MemoryBackend>) -> Self
    where
        T: Send + 'static,
    {
        let raw = tandem_backend::SendPtr(device);
        let device_drop: DeviceTask = Box::new(move || {
            // SAFETY: raw came from Box::into_raw in a device task and
            // this closure runs at most once, on the device.
            unsafe { drop(Box::from_raw(raw.get().as_ptr())) };
        });
        Self::new_owning(None, Some(device), None, Some(device_drop), Some(backend))
    }

    /// Share `other`'s ownership group while viewing `view` instead.
    pub fn alias<U: ?Sized>(other: &ManagedPtr<U, DeviceOnly>, view: NonNull<T>) -> Self {
        other.bump();
        Self {
            host: None,
            device: Some(view),
            control: other.control,
            _strategy: PhantomData,
        }
    }

    /// The raw device pointer, for use inside device tasks only.
    ///
    /// There is no host accessor on this strategy: the host cannot
    /// dereference the device mirror, so the operation does not exist.
    pub fn device_view(&self) -> Option<NonNull<T>> {
        self.device
    }

    /// Whether the handle holds no object.
    pub fn is_null(&self) -> bool {
        self.device.is_none()
    }

    /// Arguments are a dual-residency concern; nothing to register
    /// when only one mirror exists.
    pub fn register_arguments(&self, _arguments: ArgumentSet) {}
}

impl<T: ?Sized> ManagedPtr<T, Dual> {
    /// Take ownership of a host/device mirror pair.
    ///
    /// Both mirrors must already hold equivalent logical state; the
    /// factories in [`crate::factory`] construct them that way.
    pub fn from_pair(
        host: Box<T>,
        device: NonNull<T>,
        backend: Arc<dyn MemoryBackend>,
    ) -> Self
    where
        T: Send + 'static,
    {
        // SAFETY: Box::into_raw never returns null.
        let host = unsafe { NonNull::new_unchecked(Box::into_raw(host)) };
        let host_drop: Box<dyn FnOnce()> = Box::new(move || {
            // SAFETY: host came from Box::into_raw above; runs once.
            unsafe { drop(Box::from_raw(host.as_ptr())) };
        });
        let raw = tandem_backend::SendPtr(device);
        let device_drop: DeviceTask = Box::new(move || {
            // SAFETY: the device mirror was built by Box::into_raw in
            // a device task; this closure runs at most once, on the
            // device.
            unsafe { drop(Box::from_raw(raw.get().as_ptr())) };
        });
        Self::new_owning(
            Some(host),
            Some(device),
            Some(host_drop),
            Some(device_drop),
            Some(backend),
        )
    }

    /// Share `other`'s ownership group while viewing a different
    /// mirror pair.
    pub fn alias<U: ?Sized>(
        other: &ManagedPtr<U, Dual>,
        host: NonNull<T>,
        device: NonNull<T>,
    ) -> Self {
        other.bump();
        Self {
            host: Some(host),
            device: Some(device),
            control: other.control,
            _strategy: PhantomData,
        }
    }

    /// Shared access to the host mirror with no side effects.
    pub fn get(&self) -> Option<&T> {
        // SAFETY: the host mirror lives until group teardown.
        self.host.map(|p| unsafe { &*p.as_ptr() })
    }

    /// Materialize the raw host pointer.
    ///
    /// This is the "about to be touched" signal: registered nested
    /// resources are re-synchronized before the pointer is returned.
    pub fn host_view(&self) -> Option<NonNull<T>> {
        self.resync_arguments();
        self.host
    }

    /// Materialize the raw device pointer for use inside device tasks.
    ///
    /// Re-synchronizes registered nested resources first, exactly like
    /// [`host_view`](ManagedPtr::host_view); set the registry's active
    /// space beforehand so they migrate toward the device.
    pub fn device_view(&self) -> Option<NonNull<T>> {
        self.resync_arguments();
        self.device
    }

    /// Whether the handle holds no object.
    pub fn is_null(&self) -> bool {
        self.host.is_none()
    }

    /// Capture the given resources for the rest of the group's life.
    ///
    /// They are re-synchronized on every subsequent copy of any handle
    /// in the group and released exactly once at final destruction.
    /// Replaces any previously registered set.
    pub fn register_arguments(&self, arguments: ArgumentSet) {
        let Some(control) = self.control else {
            tracing::warn!(
                target: "tandem::ptr",
                "register_arguments on an empty handle"
            );
            return;
        };
        // SAFETY: live control block.
        let control = unsafe { control.as_ref() };
        *control.arguments.borrow_mut() = Some(arguments);
    }
}

impl<T: ?Sized> tandem_core::SharedResource for ManagedPtr<T, Dual> {
    /// A nested handle registered inside another handle's argument set
    /// propagates the touch to its own registered resources. The count
    /// is not changed: the capturing set already keeps this handle
    /// alive.
    fn resynchronize(&self) {
        self.resync_arguments();
    }
}

impl<T: ?Sized> Deref for ManagedPtr<T, Dual> {
    type Target = T;

    /// Unchecked hot-path dereference of the host mirror.
    fn deref(&self) -> &T {
        debug_assert!(self.host.is_some(), "dereferenced an empty handle");
        // SAFETY: caller contract; empty handles must be checked with
        // is_null before dereferencing.
        unsafe { &*self.host.unwrap_unchecked().as_ptr() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell as StdCell;
    use std::rc::Rc;
    use tandem_core::SharedResource;

    struct Payload {
        value: i32,
        drops: Rc<StdCell<u32>>,
    }

    impl Drop for Payload {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    #[test]
    fn empty_handle_has_zero_count() {
        let ptr: ManagedPtr<i32, HostOnly> = ManagedPtr::new();
        assert_eq!(ptr.use_count(), 0);
        assert!(ptr.is_null());
        assert!(ptr.get().is_none());
    }

    #[test]
    fn copies_share_one_count() {
        let drops = Rc::new(StdCell::new(0));
        let a = ManagedPtr::from_host(Box::new(Payload {
            value: 3,
            drops: Rc::clone(&drops),
        }));
        assert_eq!(a.use_count(), 1);

        let b = a.clone();
        assert_eq!(a.use_count(), 2);
        assert_eq!(b.use_count(), 2);
        assert_eq!(b.get().unwrap().value, 3);

        drop(a);
        assert_eq!(b.use_count(), 1);
        assert_eq!(drops.get(), 0);

        drop(b);
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn deref_reaches_the_host_mirror() {
        let drops = Rc::new(StdCell::new(0));
        let ptr = ManagedPtr::from_host(Box::new(Payload {
            value: 11,
            drops,
        }));
        assert_eq!(ptr.value, 11);
    }

    #[test]
    fn handles_compare_by_view() {
        let drops = Rc::new(StdCell::new(0));
        let a = ManagedPtr::from_host(Box::new(Payload {
            value: 1,
            drops: Rc::clone(&drops),
        }));
        let b = a.clone();
        assert_eq!(a, b);

        let c = ManagedPtr::from_host(Box::new(Payload {
            value: 1,
            drops: Rc::clone(&drops),
        }));
        assert_ne!(a, c);
    }

    #[test]
    fn trait_object_handles_dispatch() {
        trait Speak {
            fn word(&self) -> &'static str;
        }
        struct Dog;
        impl Speak for Dog {
            fn word(&self) -> &'static str {
                "woof"
            }
        }

        let ptr: ManagedPtr<dyn Speak, HostOnly> = ManagedPtr::from_host(Box::new(Dog));
        assert_eq!(ptr.word(), "woof");
        assert_eq!(ptr.get().unwrap().word(), "woof");
    }

    struct SyncProbe {
        syncs: Rc<StdCell<u32>>,
    }

    impl SharedResource for SyncProbe {
        fn resynchronize(&self) {
            self.syncs.set(self.syncs.get() + 1);
        }
    }

    #[test]
    fn dual_copy_resynchronizes_registered_arguments() {
        use crate::arguments::ArgumentSet;
        use tandem_backend::{EmulatedDevice, MemoryBackend};

        let backend: std::sync::Arc<dyn MemoryBackend> =
            EmulatedDevice::default().into_shared();
        let device = tandem_backend::device_call(backend.as_ref(), || {
            // SAFETY: Box::into_raw never returns null.
            tandem_backend::SendPtr(unsafe {
                NonNull::new_unchecked(Box::into_raw(Box::new(5_i32)))
            })
        });
        let ptr = ManagedPtr::from_pair(Box::new(5_i32), device.get(), backend);

        let syncs = Rc::new(StdCell::new(0));
        ptr.register_arguments(ArgumentSet::new().with(SyncProbe {
            syncs: Rc::clone(&syncs),
        }));

        let copy = ptr.clone();
        assert_eq!(syncs.get(), 1);
        let again = copy.clone();
        assert_eq!(syncs.get(), 2);

        // Raw-view materialization is also a touch signal.
        let _ = again.host_view();
        assert_eq!(syncs.get(), 3);

        // Plain get is side-effect-free.
        assert_eq!(*again.get().unwrap(), 5);
        assert_eq!(syncs.get(), 3);
    }
}
