//! Tandem: a heterogeneous-memory runtime for host/accelerator code.
//!
//! This is the top-level facade crate that re-exports the public API
//! from all Tandem sub-crates. For most users, adding `tandem` as a
//! single dependency is sufficient.
//!
//! Tandem lets host code and device code share logically identical
//! objects and arrays that reside in physically separate memory
//! spaces. A [`prelude::ManagedArray`] migrates its bytes between
//! spaces lazily, on first touch from the other side; a
//! [`prelude::ManagedPtr`] keeps a host instance and a device instance
//! of one polymorphic object alive together and tears both down
//! together.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use tandem::prelude::*;
//!
//! // One registry over the emulated reference backend.
//! let registry =
//!     ArrayRegistry::new(EmulatedDevice::default().into_shared()).into_shared();
//!
//! // An array that starts out host-resident.
//! let mut values = ManagedArray::<i32>::with_size(4, MemorySpace::Host, &registry).unwrap();
//! for i in 0..4 {
//!     values.set(i, i as i32 + 1);
//! }
//!
//! // A dual-residency object that captures the array as a nested
//! // resource, so copying the handle keeps the array synchronized.
//! let backend = Arc::clone(registry.backend());
//! let data = values.clone();
//! let handle = make_managed_with::<i32, _>(
//!     &backend,
//!     ArgumentSet::new().with(values.clone()),
//!     move |_residency| Box::new(data.size() as i32),
//! );
//! assert_eq!(handle.use_count(), 1);
//!
//! let copy = handle.clone();
//! assert_eq!(copy.use_count(), 2);
//!
//! drop(copy);
//! drop(handle);
//! values.free();
//! assert!(registry.backend().stats().balanced());
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in
//! the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `tandem-core` | Memory spaces, residency, `ReadOnly`, core traits |
//! | [`backend`] | `tandem-backend` | The `MemoryBackend` capability and the emulated device |
//! | [`array`] | `tandem-array` | `ManagedArray` and the allocation tracker |
//! | [`ptr`] | `tandem-ptr` | `ManagedPtr`, strategies, casts, and factories |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types and capability traits (`tandem-core`).
///
/// Contains [`types::MemorySpace`], [`types::Residency`],
/// [`types::CopyDirection`], the [`types::SharedResource`] capability,
/// the [`types::ReadOnly`] pointee qualifier, and
/// [`types::AllocError`].
pub use tandem_core as types;

/// Allocation and device-task backends (`tandem-backend`).
///
/// Provides the [`backend::MemoryBackend`] capability interface, the
/// [`backend::EmulatedDevice`] reference backend, and the
/// [`backend::BackendStats`] allocation counters.
pub use tandem_backend as backend;

/// Space-migrating array handles and the allocation tracker
/// (`tandem-array`).
///
/// [`array::ManagedArray`] is the value-semantic array handle;
/// [`array::ArrayRegistry`] is the tracker that implements the
/// copy-on-touch migration rule.
pub use tandem_array as array;

/// Reference-counted dual-residency object handles (`tandem-ptr`).
///
/// [`ptr::ManagedPtr`] with the [`ptr::HostOnly`], [`ptr::DeviceOnly`],
/// and [`ptr::Dual`] execution strategies, the aliasing pointer casts,
/// and the `make_managed*` factories.
pub use tandem_ptr as ptr;

/// Common imports for typical Tandem usage.
///
/// ```rust
/// use tandem::prelude::*;
/// ```
///
/// This imports the handle types, the registry, the reference backend,
/// the factories, and the vocabulary enums.
pub mod prelude {
    // Core vocabulary
    pub use tandem_core::{
        AllocError, CopyDirection, MemorySpace, ReadOnly, Residency, SharedResource,
    };

    // Backend capability and reference implementation
    pub use tandem_backend::{BackendConfig, BackendStats, EmulatedDevice, MemoryBackend};

    // Arrays and the tracker
    pub use tandem_array::{AllocationEvent, ArrayError, ArrayRegistry, ManagedArray};

    // Handles, strategies, casts, factories
    pub use tandem_ptr::{
        const_pointer_cast, dynamic_pointer_cast, freeze, make_managed, make_managed_device,
        make_managed_host, make_managed_with, reinterpret_pointer_cast, static_pointer_cast,
        ArgumentSet, DeviceOnly, Dual, HostOnly, ManagedPtr,
    };
}
