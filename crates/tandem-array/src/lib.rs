//! Space-migrating array handles and the allocation tracker.
//!
//! [`ManagedArray`] is a value-semantic handle over one logical array
//! whose bytes may live in host, device, or unified memory. The handle
//! never knows where the data currently is; it asks the process-wide
//! [`ArrayRegistry`] on every potentially space-crossing access, and
//! the registry migrates the bytes first if the access comes from the
//! "wrong" side. Repeated access from the same side costs nothing.
//!
//! # Architecture
//!
//! ```text
//! ManagedArray<T> (copyable handle: base key, offset, len, slice flag)
//! └── Arc<ArrayRegistry>
//!     ├── Mutex<IndexMap<base, AllocationRecord>>  (resident space,
//!     │       host/device buffers, sizes)
//!     ├── active space (what resynchronization targets)
//!     └── Arc<dyn MemoryBackend>  (raw allocate/copy/free)
//! ```
//!
//! This crate contains bounded `unsafe` for raw buffer access; every
//! unsafe block carries a `// SAFETY:` comment. The tracker itself
//! serializes record mutation behind a mutex.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod array;
pub mod error;
pub mod record;
pub mod registry;

pub use array::{Countable, ManagedArray};
pub use error::ArrayError;
pub use record::{AllocationAction, AllocationEvent, AllocationRecord};
pub use registry::ArrayRegistry;
