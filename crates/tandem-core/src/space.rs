//! Memory spaces, copy directions, and execution personalities.

use std::fmt;

/// A named memory space an allocation can reside in.
///
/// Backends interpret these abstractly: `Host` is CPU-visible heap,
/// `Device` is accelerator memory, and `Unified` is a single allocation
/// visible from both personalities (page-migrated or emulated). `None`
/// is the resting state of an empty handle before any allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemorySpace {
    /// No allocation has been made yet.
    None,
    /// CPU-visible host memory.
    Host,
    /// Accelerator-resident memory, not dereferenceable from the host.
    Device,
    /// A single allocation visible from both host and device.
    Unified,
}

impl MemorySpace {
    /// Whether a host-personality access to this space requires the
    /// device to be idle first.
    pub fn needs_device_idle(self) -> bool {
        matches!(self, MemorySpace::Unified)
    }
}

impl fmt::Display for MemorySpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Host => "host",
            Self::Device => "device",
            Self::Unified => "unified",
        };
        write!(f, "{name}")
    }
}

/// Direction of a raw byte copy between spaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CopyDirection {
    /// Host buffer to host buffer.
    HostToHost,
    /// Host buffer to device buffer.
    HostToDevice,
    /// Device buffer to host buffer.
    DeviceToHost,
    /// Device buffer to device buffer.
    DeviceToDevice,
}

impl CopyDirection {
    /// The direction that moves bytes from `from` to `to`.
    ///
    /// `Unified` and `None` participate as host-visible addresses.
    pub fn between(from: MemorySpace, to: MemorySpace) -> Self {
        match (from, to) {
            (MemorySpace::Device, MemorySpace::Device) => Self::DeviceToDevice,
            (MemorySpace::Device, _) => Self::DeviceToHost,
            (_, MemorySpace::Device) => Self::HostToDevice,
            _ => Self::HostToHost,
        }
    }
}

impl fmt::Display for CopyDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::HostToHost => "host->host",
            Self::HostToDevice => "host->device",
            Self::DeviceToHost => "device->host",
            Self::DeviceToDevice => "device->device",
        };
        write!(f, "{name}")
    }
}

/// Which compiled personality a piece of code is being built for.
///
/// Factories hand this to build closures so an object can be
/// constructed once per mirror, each time binding raw-pointer members
/// to the pointer valid in that personality.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Residency {
    /// The host-personality instance.
    Host,
    /// The device-personality instance.
    Device,
}

impl Residency {
    /// The memory space this personality dereferences by default.
    pub fn space(self) -> MemorySpace {
        match self {
            Self::Host => MemorySpace::Host,
            Self::Device => MemorySpace::Device,
        }
    }
}

impl fmt::Display for Residency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Host => "host",
            Self::Device => "device",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_direction_between_spaces() {
        assert_eq!(
            CopyDirection::between(MemorySpace::Host, MemorySpace::Device),
            CopyDirection::HostToDevice
        );
        assert_eq!(
            CopyDirection::between(MemorySpace::Device, MemorySpace::Host),
            CopyDirection::DeviceToHost
        );
        assert_eq!(
            CopyDirection::between(MemorySpace::Device, MemorySpace::Device),
            CopyDirection::DeviceToDevice
        );
        assert_eq!(
            CopyDirection::between(MemorySpace::Unified, MemorySpace::Host),
            CopyDirection::HostToHost
        );
    }

    #[test]
    fn unified_needs_device_idle() {
        assert!(MemorySpace::Unified.needs_device_idle());
        assert!(!MemorySpace::Host.needs_device_idle());
        assert!(!MemorySpace::Device.needs_device_idle());
    }

    #[test]
    fn residency_maps_to_space() {
        assert_eq!(Residency::Host.space(), MemorySpace::Host);
        assert_eq!(Residency::Device.space(), MemorySpace::Device);
    }
}
