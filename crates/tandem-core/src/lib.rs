//! Core types and capability traits for the Tandem heterogeneous-memory
//! runtime.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared by every other Tandem crate: memory spaces,
//! copy directions, execution personalities, the [`SharedResource`]
//! capability, the [`ReadOnly`] pointee qualifier, and the allocation
//! error type.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod readonly;
pub mod resource;
pub mod space;

pub use error::AllocError;
pub use readonly::ReadOnly;
pub use resource::SharedResource;
pub use space::{CopyDirection, MemorySpace, Residency};
