//! Benchmark profiles and utilities for the Tandem runtime.
//!
//! Provides pre-built backends, registries, and a reference
//! polymorphic workload shared by the benchmark targets:
//!
//! - [`bench_backend`]: an emulated device with a 1GB arena
//! - [`bench_registry`]: an allocation tracker over a fresh backend
//! - [`Compute`]/[`Scaler`]: the virtual-dispatch workload measured by
//!   the handle benchmarks

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::sync::Arc;

use tandem_array::ArrayRegistry;
use tandem_backend::{BackendConfig, EmulatedDevice, MemoryBackend};
use tandem_ptr::{make_managed, Dual, ManagedPtr};

/// Device arena capacity used by every benchmark backend: 1GB.
pub const BENCH_DEVICE_CAPACITY: usize = 1024 * 1024 * 1024;

/// An emulated device backend sized for benchmark workloads.
pub fn bench_backend() -> Arc<dyn MemoryBackend> {
    EmulatedDevice::new(BackendConfig::new(BENCH_DEVICE_CAPACITY)).into_shared()
}

/// An allocation tracker over a fresh benchmark backend.
pub fn bench_registry() -> Arc<ArrayRegistry> {
    ArrayRegistry::new(bench_backend()).into_shared()
}

/// The polymorphic workload: scale a borrowed buffer in place.
///
/// Dispatch goes through the trait object held by the handle, which is
/// what the handle benchmarks are measuring.
pub trait Compute: Send {
    /// Multiply every element by this kernel's factor.
    fn scale(&self, values: &mut [i32]);
    /// The kernel's scale factor.
    fn factor(&self) -> i32;
}

/// Reference [`Compute`] implementation.
pub struct Scaler {
    /// Factor applied by [`Compute::scale`].
    pub factor: i32,
}

impl Compute for Scaler {
    fn scale(&self, values: &mut [i32]) {
        for v in values {
            *v *= self.factor;
        }
    }

    fn factor(&self) -> i32 {
        self.factor
    }
}

/// Build a dual-residency handle over a [`Scaler`] with the given
/// factor.
pub fn scaler_handle(
    backend: &Arc<dyn MemoryBackend>,
    factor: i32,
) -> ManagedPtr<dyn Compute, Dual> {
    make_managed(backend, move |_| Box::new(Scaler { factor }) as Box<dyn Compute>)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaler_handle_dispatches() {
        let backend = bench_backend();
        let handle = scaler_handle(&backend, 3);
        let mut values = vec![1, 2, 3];
        handle.get().unwrap().scale(&mut values);
        assert_eq!(values, vec![3, 6, 9]);
        assert_eq!(handle.get().unwrap().factor(), 3);
    }

    #[test]
    fn bench_registry_allocates() {
        use tandem_core::MemorySpace;

        let registry = bench_registry();
        let mut array =
            tandem_array::ManagedArray::<i32>::with_size(16, MemorySpace::Host, &registry)
                .unwrap();
        array.set(0, 1);
        assert_eq!(array.pick(0), 1);
        array.free();
        assert!(registry.backend().stats().balanced());
    }
}
