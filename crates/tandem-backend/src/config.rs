//! Backend configuration parameters.

/// Configuration for the emulated device backend.
///
/// Validated at construction; all values are immutable after creation.
#[derive(Clone, Debug)]
pub struct BackendConfig {
    /// Capacity of the device arena in bytes.
    ///
    /// Default: 256MB. Requests past this fail with
    /// `AllocError::CapacityExceeded`.
    pub device_capacity: usize,

    /// Whether the backend offers the `Unified` space.
    ///
    /// Default: true. When disabled, unified allocation requests fail
    /// with `AllocError::UnsupportedSpace`.
    pub unified: bool,
}

impl BackendConfig {
    /// Default device arena capacity: 256MB.
    pub const DEFAULT_DEVICE_CAPACITY: usize = 256 * 1024 * 1024;

    /// Create a config with the given device capacity and unified
    /// memory enabled.
    pub fn new(device_capacity: usize) -> Self {
        Self {
            device_capacity,
            unified: true,
        }
    }

    /// Disable the unified space.
    pub fn without_unified(mut self) -> Self {
        self.unified = false;
        self
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DEVICE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capacity_is_256mb() {
        assert_eq!(
            BackendConfig::default().device_capacity,
            256 * 1024 * 1024
        );
    }

    #[test]
    fn without_unified_clears_flag() {
        let config = BackendConfig::new(1024).without_unified();
        assert!(!config.unified);
        assert_eq!(config.device_capacity, 1024);
    }
}
