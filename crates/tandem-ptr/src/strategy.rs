//! Execution strategies.
//!
//! A strategy is a compile-time tag choosing which mirrors a
//! [`ManagedPtr`](crate::ManagedPtr) manages. Each strategy's
//! operations are defined in its own impl block, so an accessor that
//! is invalid for a strategy simply does not exist on it — there is no
//! runtime context flag to branch on and no way to reach the wrong
//! mirror from the wrong side.

mod sealed {
    pub trait Sealed {}
}

/// Compile-time selection of which memory space(s) a handle manages.
///
/// Sealed: the three strategies below are the complete set.
pub trait Strategy: sealed::Sealed + 'static {
    /// Strategy name for diagnostics.
    const NAME: &'static str;
}

/// Host mirror only. Accessors dereference host memory; there is no
/// device mirror and no device teardown task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostOnly;

/// Device mirror only. The handle has no host-accessible pointer; the
/// only view it offers is the raw device pointer for use inside device
/// tasks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceOnly;

/// Host and device mirrors kept alive together.
///
/// The default strategy, and the only one that carries a
/// nested-resource argument set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dual;

impl sealed::Sealed for HostOnly {}
impl sealed::Sealed for DeviceOnly {}
impl sealed::Sealed for Dual {}

impl Strategy for HostOnly {
    const NAME: &'static str = "host-only";
}

impl Strategy for DeviceOnly {
    const NAME: &'static str = "device-only";
}

impl Strategy for Dual {
    const NAME: &'static str = "dual";
}
