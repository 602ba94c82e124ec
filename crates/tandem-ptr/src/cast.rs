//! Aliasing pointer casts.
//!
//! Each cast produces a new handle that shares the source's ownership
//! group (same count, same teardown) while viewing a converted
//! pointer. The conversion is applied to each mirror independently: a
//! dual-strategy cast converts the device mirror inside a device task
//! and waits for it.
//!
//! Rust has no language-level pointer conversions between arbitrary
//! types, so the static and dynamic casts take the conversion as an
//! explicit function; the `const` and reinterpreting casts are
//! address-preserving and need none.

use std::marker::PhantomData;
use std::ptr::NonNull;

use tandem_backend::{device_call, SendPtr};
use tandem_core::ReadOnly;

use crate::ptr::ManagedPtr;
use crate::strategy::{HostOnly, Strategy};

/// Alias `source` through a caller-named pointer conversion.
///
/// The conversion runs once per mirror: directly on the host mirror,
/// and inside a blocking device task on the device mirror. The usual
/// conversions are upcasts (`|p| p as *mut dyn Base`) and
/// known-correct downcasts; the caller is responsible for the
/// conversion's validity, exactly as with the raw cast it names.
pub fn static_pointer_cast<T, U, S>(
    source: &ManagedPtr<U, S>,
    convert: fn(*mut U) -> *mut T,
) -> ManagedPtr<T, S>
where
    T: ?Sized + 'static,
    U: ?Sized + 'static,
    S: Strategy,
{
    let host = source.host.and_then(|p| NonNull::new(convert(p.as_ptr())));
    let device = match (source.device, source.backend_arc()) {
        (Some(p), Some(backend)) => {
            let raw = SendPtr(p);
            device_call(backend.as_ref(), move || {
                NonNull::new(convert(raw.get().as_ptr())).map(SendPtr)
            })
            .map(|p| p.get())
        }
        (Some(p), None) => {
            // A device view without a backend only occurs on handles
            // built outside the factories; convert inline.
            NonNull::new(convert(p.as_ptr()))
        }
        _ => None,
    };

    source.bump();
    ManagedPtr {
        host,
        device,
        control: source.control,
        _strategy: PhantomData,
    }
}

/// Alias `source` through a runtime type probe, host strategy only.
///
/// Returns an empty handle when the probe rejects the pointee. The
/// probe is typically a downcast
/// (`|base| base.as_any().downcast_ref::<Derived>()`).
///
/// This cast is deliberately absent for the device strategies: runtime
/// type information lives in the host personality, so attempting it
/// there is a missing-method compile error.
pub fn dynamic_pointer_cast<T, U>(
    source: &ManagedPtr<U, HostOnly>,
    probe: fn(&U) -> Option<&T>,
) -> ManagedPtr<T, HostOnly>
where
    T: ?Sized,
    U: ?Sized,
{
    let Some(host) = source.host else {
        return ManagedPtr::new();
    };
    // SAFETY: the host mirror is live while `source` exists.
    let hit = probe(unsafe { &*host.as_ptr() });
    match hit {
        Some(view) => {
            source.bump();
            ManagedPtr {
                host: Some(NonNull::from(view)),
                device: None,
                control: source.control,
                _strategy: PhantomData,
            }
        }
        None => ManagedPtr::new(),
    }
}

/// Remove the [`ReadOnly`] qualifier, sharing ownership.
///
/// `ReadOnly<T>` is layout-identical to `T`, so this is a pure pointer
/// cast on both mirrors with no device round trip.
pub fn const_pointer_cast<T, S: Strategy>(
    source: &ManagedPtr<ReadOnly<T>, S>,
) -> ManagedPtr<T, S> {
    source.bump();
    ManagedPtr {
        host: source.host.map(NonNull::cast),
        device: source.device.map(NonNull::cast),
        control: source.control,
        _strategy: PhantomData,
    }
}

/// Add the [`ReadOnly`] qualifier, sharing ownership.
///
/// The inverse of [`const_pointer_cast`].
pub fn freeze<T, S: Strategy>(source: &ManagedPtr<T, S>) -> ManagedPtr<ReadOnly<T>, S> {
    source.bump();
    ManagedPtr {
        host: source.host.map(NonNull::cast),
        device: source.device.map(NonNull::cast),
        control: source.control,
        _strategy: PhantomData,
    }
}

/// Reinterpret each mirror's address as a different pointee type,
/// sharing ownership.
///
/// Address-preserving, so no device round trip is needed. All the
/// caveats of `as`-casting raw pointers apply.
pub fn reinterpret_pointer_cast<T, U, S: Strategy>(
    source: &ManagedPtr<U, S>,
) -> ManagedPtr<T, S> {
    source.bump();
    ManagedPtr {
        host: source.host.map(NonNull::cast),
        device: source.device.map(NonNull::cast),
        control: source.control,
        _strategy: PhantomData,
    }
}
