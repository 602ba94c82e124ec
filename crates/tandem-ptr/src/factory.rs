//! Factory functions for managed handles.
//!
//! A factory constructs the object once per mirror its strategy
//! requires, handing the build closure the [`Residency`] it is
//! building for so raw-pointer members can be bound to the pointer
//! valid in that personality. Device-personality construction is
//! marshalled into a single-thread device task and waited on.
//!
//! The build closure *is* the constructibility contract: a type that
//! cannot be built from the captured arguments fails to compile at the
//! closure, never at runtime. A closure returning `Box<Derived>`
//! coerced to `Box<dyn Base>` is the convertibility requirement.

use std::ptr::NonNull;
use std::sync::Arc;

use tandem_backend::{device_call, MemoryBackend, SendPtr};
use tandem_core::Residency;

use crate::arguments::ArgumentSet;
use crate::ptr::ManagedPtr;
use crate::strategy::{DeviceOnly, Dual, HostOnly};

/// Build a dual-residency handle: one host mirror, one device mirror.
///
/// `build` runs once on the host, then once inside a blocking device
/// task; both instances must come out logically equivalent. Nested
/// shared resources among the captured arguments should be registered
/// with [`make_managed_with`] instead so they follow the handle.
pub fn make_managed<T, F>(backend: &Arc<dyn MemoryBackend>, build: F) -> ManagedPtr<T, Dual>
where
    T: ?Sized + Send + 'static,
    F: Fn(Residency) -> Box<T> + Send + 'static,
{
    let host = build(Residency::Host);
    let device = device_call(backend.as_ref(), move || {
        // SAFETY: Box::into_raw never returns null.
        SendPtr(unsafe { NonNull::new_unchecked(Box::into_raw(build(Residency::Device))) })
    });
    ManagedPtr::from_pair(host, device.get(), Arc::clone(backend))
}

/// [`make_managed`] plus automatic nested-resource registration.
///
/// The argument set is installed on the new handle, so every
/// subsequent copy re-synchronizes the captured resources and the
/// final destruction releases them. Capture clones of the same handles
/// the build closure uses.
pub fn make_managed_with<T, F>(
    backend: &Arc<dyn MemoryBackend>,
    arguments: ArgumentSet,
    build: F,
) -> ManagedPtr<T, Dual>
where
    T: ?Sized + Send + 'static,
    F: Fn(Residency) -> Box<T> + Send + 'static,
{
    let result = make_managed(backend, build);
    result.register_arguments(arguments);
    result
}

/// Build a host-only handle. No device work is issued.
pub fn make_managed_host<T, F>(build: F) -> ManagedPtr<T, HostOnly>
where
    T: ?Sized + 'static,
    F: FnOnce() -> Box<T>,
{
    ManagedPtr::from_host(build())
}

/// Build a device-only handle.
///
/// Construction happens entirely inside a blocking device task; the
/// resulting handle has no host-accessible pointer.
pub fn make_managed_device<T, F>(
    backend: &Arc<dyn MemoryBackend>,
    build: F,
) -> ManagedPtr<T, DeviceOnly>
where
    T: ?Sized + Send + 'static,
    F: FnOnce() -> Box<T> + Send + 'static,
{
    let device = device_call(backend.as_ref(), move || {
        // SAFETY: Box::into_raw never returns null.
        SendPtr(unsafe { NonNull::new_unchecked(Box::into_raw(build())) })
    });
    ManagedPtr::from_device(device.get(), Arc::clone(backend))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tandem_backend::EmulatedDevice;
    use tandem_core::MemorySpace;

    fn backend() -> Arc<dyn MemoryBackend> {
        EmulatedDevice::default().into_shared()
    }

    #[test]
    fn dual_factory_builds_both_mirrors() {
        static BUILDS_HOST: AtomicU32 = AtomicU32::new(0);
        static BUILDS_DEVICE: AtomicU32 = AtomicU32::new(0);

        let backend = backend();
        let ptr = make_managed::<u64, _>(&backend, |residency| {
            match residency {
                Residency::Host => BUILDS_HOST.fetch_add(1, Ordering::Relaxed),
                Residency::Device => BUILDS_DEVICE.fetch_add(1, Ordering::Relaxed),
            };
            Box::new(17)
        });

        assert_eq!(BUILDS_HOST.load(Ordering::Relaxed), 1);
        assert_eq!(BUILDS_DEVICE.load(Ordering::Relaxed), 1);
        assert_eq!(ptr.use_count(), 1);
        assert_eq!(*ptr.get().unwrap(), 17);
        assert!(ptr.device_view().is_some());
    }

    #[test]
    fn device_factory_has_no_host_pointer() {
        let backend = backend();
        let ptr = make_managed_device::<u32, _>(&backend, || Box::new(5));
        assert!(!ptr.is_null());
        assert!(ptr.device_view().is_some());
        assert_eq!(ptr.use_count(), 1);
    }

    #[test]
    fn host_factory_never_touches_the_device() {
        let backend = backend();
        let tasks_before = backend.stats().device_tasks;
        let ptr = make_managed_host::<u32, _>(|| Box::new(9));
        assert_eq!(*ptr.get().unwrap(), 9);
        assert_eq!(backend.stats().device_tasks, tasks_before);
    }

    #[test]
    fn either_drop_order_releases_exactly_once() {
        // Drop original first.
        {
            let backend = backend();
            let original = make_managed::<u64, _>(&backend, |_| Box::new(1));
            let copy = original.clone();
            drop(original);
            assert_eq!(copy.use_count(), 1);
            drop(copy);
        }
        // Drop copy first.
        {
            let backend = backend();
            let original = make_managed::<u64, _>(&backend, |_| Box::new(1));
            let copy = original.clone();
            drop(copy);
            assert_eq!(original.use_count(), 1);
            drop(original);
        }
    }

    #[test]
    fn registered_arrays_follow_the_handle() {
        use tandem_array::{ArrayRegistry, ManagedArray};

        let registry =
            ArrayRegistry::new(EmulatedDevice::default().into_shared()).into_shared();
        let array = ManagedArray::<i32>::with_size(4, MemorySpace::Host, &registry).unwrap();
        array.set(0, 1);

        let backend = Arc::clone(registry.backend());
        let nested = array.clone();
        let ptr = make_managed_with::<u32, _>(
            &backend,
            ArgumentSet::new().with(array.clone()),
            move |_| {
                let _ = &nested;
                Box::new(0)
            },
        );

        registry.set_active_space(MemorySpace::Device);
        let _copy = ptr.clone();
        registry.set_active_space(MemorySpace::Host);

        let base = array.host_view().unwrap() as usize;
        // The copy above migrated the registered array to the device;
        // host_view just brought it back.
        assert!(registry.lookup(base).unwrap().has_device_buffer());

        let mut array = array;
        array.free();
    }
}
