//! Array and tracker error types.

use std::error::Error;
use std::fmt;

use tandem_core::AllocError;

/// Errors from array-handle and tracker operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArrayError {
    /// The address is not in the tracker's record table.
    UnknownPointer {
        /// The unrecognized base address.
        addr: usize,
    },
    /// The requested element count overflows an allocation layout.
    LayoutOverflow {
        /// The element count that overflowed.
        elems: usize,
    },
    /// The backing allocation failed.
    Alloc(AllocError),
}

impl fmt::Display for ArrayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownPointer { addr } => {
                write!(f, "address {addr:#x} has no allocation record")
            }
            Self::LayoutOverflow { elems } => {
                write!(f, "element count {elems} overflows allocation layout")
            }
            Self::Alloc(err) => write!(f, "allocation failed: {err}"),
        }
    }
}

impl Error for ArrayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Alloc(err) => Some(err),
            _ => None,
        }
    }
}

impl From<AllocError> for ArrayError {
    fn from(err: AllocError) -> Self {
        Self::Alloc(err)
    }
}
