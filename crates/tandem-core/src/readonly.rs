//! The [`ReadOnly`] pointee qualifier.

use std::fmt;
use std::ops::Deref;

/// Marks a pointee as read-only at the type level.
///
/// Rust has no `const`-qualified pointee types, so handle types that
/// need to distinguish "view that may mutate" from "view that must
/// not" wrap the element type instead: a `ManagedArray<ReadOnly<T>>`
/// or `ManagedPtr<ReadOnly<T>>` hands out shared access only.
///
/// The layout is guaranteed identical to `T`, which is what makes the
/// qualifying and unqualifying pointer casts sound.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct ReadOnly<T>(T);

impl<T> ReadOnly<T> {
    /// Wrap a value.
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Shared access to the wrapped value.
    pub fn get(&self) -> &T {
        &self.0
    }

    /// Unwrap, consuming the qualifier.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for ReadOnly<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: fmt::Display> fmt::Display for ReadOnly<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
