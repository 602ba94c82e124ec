//! Allocation errors shared across the runtime.

use std::error::Error;
use std::fmt;

use crate::space::MemorySpace;

/// Errors from a backend allocation request.
///
/// Allocation failure is fatal to the requesting operation: the
/// runtime propagates it unchanged, never retries, and never falls
/// back to a different space.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AllocError {
    /// The space's arena cannot satisfy the request.
    CapacityExceeded {
        /// Space the request targeted.
        space: MemorySpace,
        /// Number of bytes requested.
        requested: usize,
        /// Bytes still available in the space.
        available: usize,
    },
    /// A zero-byte request, which no space accepts.
    ZeroSized,
    /// The backend does not provide the requested space.
    UnsupportedSpace {
        /// The space the backend lacks.
        space: MemorySpace,
    },
    /// The underlying system allocator returned null.
    SystemExhausted {
        /// Number of bytes requested.
        requested: usize,
    },
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityExceeded {
                space,
                requested,
                available,
            } => write!(
                f,
                "{space} capacity exceeded: requested {requested} bytes, {available} available"
            ),
            Self::ZeroSized => write!(f, "zero-sized allocation request"),
            Self::UnsupportedSpace { space } => {
                write!(f, "backend does not provide the {space} space")
            }
            Self::SystemExhausted { requested } => {
                write!(f, "system allocator failed for {requested} bytes")
            }
        }
    }
}

impl Error for AllocError {}
