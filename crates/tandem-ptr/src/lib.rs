//! Reference-counted dual-residency object handles.
//!
//! A [`ManagedPtr<T, S>`] lets one logical polymorphic object exist as
//! a host instance, a device instance, or both at once, selected by
//! the compile-time execution strategy `S`:
//!
//! - [`HostOnly`] — one host mirror, host accessors only.
//! - [`DeviceOnly`] — one device mirror, device accessors only.
//! - [`Dual`] — both mirrors kept alive together and torn down
//!   together.
//!
//! Every copy of a handle shares one non-atomic reference count; the
//! count lives in a heap control block and is mutated only from host
//! code (the handle types are not `Send`, which is what makes the
//! unsynchronized count sound). The last handle to drop releases the
//! host mirror inline and the device mirror through a synchronous
//! single-thread device task.
//!
//! Mirrors are never implicitly kept consistent. The one exception is
//! nested resources registered through
//! [`ManagedPtr::register_arguments`]: those are re-synchronized on
//! every handle copy and on explicit raw-view materialization, so
//! arrays embedded in a managed object follow it across spaces.
//!
//! This crate contains bounded `unsafe` for the raw mirror pointers
//! and the shared control block; every unsafe block carries a
//! `// SAFETY:` comment.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod arguments;
pub mod cast;
pub mod factory;
pub mod ptr;
pub mod strategy;

pub use arguments::ArgumentSet;
pub use cast::{
    const_pointer_cast, dynamic_pointer_cast, freeze, reinterpret_pointer_cast,
    static_pointer_cast,
};
pub use factory::{make_managed, make_managed_device, make_managed_host, make_managed_with};
pub use ptr::ManagedPtr;
pub use strategy::{DeviceOnly, Dual, HostOnly, Strategy};
