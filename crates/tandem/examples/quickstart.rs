//! Tandem quickstart — one object, two memory spaces.
//!
//! Demonstrates:
//!   1. Building a registry over the emulated reference backend
//!   2. Allocating a host-resident `ManagedArray`
//!   3. Constructing a dual-residency kernel object with the array
//!      registered as a nested resource
//!   4. Running the kernel from the host personality
//!   5. Copying the handle (which migrates the nested array) and
//!      running the kernel from the device personality
//!
//! Run with:
//!   cargo run --example quickstart
//!
//! Set `RUST_LOG=tandem=trace` to watch the allocations and
//! migrations happen.

use std::sync::Arc;

use tandem::prelude::*;
use tandem_backend::SendPtr;

// ─── Kernel: scale a buffer in place ────────────────────────────
//
// The buffer pointer is bound once per personality: the host mirror
// holds the host pointer, the device mirror holds the device pointer.
// Each mirror only ever dereferences its own.

trait Kernel: Send {
    fn run(&self);
}

struct Scaler {
    factor: i32,
    data: *mut i32,
    len: usize,
}

// SAFETY: each mirror's pointer is dereferenced only in the
// personality it was bound for, and the runtime's synchronous device
// tasks keep host and device access from overlapping.
unsafe impl Send for Scaler {}

impl Kernel for Scaler {
    fn run(&self) {
        for i in 0..self.len {
            // SAFETY: data addresses len elements in this mirror's
            // personality; see the Send justification above.
            unsafe { *self.data.add(i) *= self.factor };
        }
    }
}

// ─── Main ───────────────────────────────────────────────────────

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let registry = ArrayRegistry::new(EmulatedDevice::default().into_shared()).into_shared();

    // Four elements, host-resident to start.
    let mut values = ManagedArray::<i32>::with_size(4, MemorySpace::Host, &registry).unwrap();
    for i in 0..4 {
        values.set(i, i as i32 + 1);
    }
    println!("initial:      {:?}", values.as_slice());

    // Build the kernel once per mirror. Registering the array means
    // every subsequent handle copy re-synchronizes it.
    let backend = Arc::clone(registry.backend());
    let build_values = values.clone();
    let kernel: ManagedPtr<dyn Kernel, Dual> = make_managed_with(
        &backend,
        ArgumentSet::new().with(values.clone()),
        move |residency| {
            let data = match residency {
                Residency::Host => build_values.host_view().unwrap(),
                Residency::Device => build_values.device_view().unwrap(),
            };
            Box::new(Scaler {
                factor: 3,
                data,
                len: build_values.size(),
            }) as Box<dyn Kernel>
        },
    );

    // Host personality: building the device mirror left the array
    // device-resident, so materialize the host view first — the touch
    // signal that migrates the registered array back — then scale.
    let host_obj = kernel.host_view().unwrap();
    // SAFETY: the host mirror is live while `kernel` exists.
    unsafe { host_obj.as_ref() }.run();
    println!("host scaled:  {:?}", values.as_slice());

    // Device personality: copying the handle with the device as the
    // active space migrates the registered array first, so the device
    // mirror sees the host-scaled values.
    registry.set_active_space(MemorySpace::Device);
    let copy = kernel.clone();
    let device_obj = copy.device_view().unwrap();
    registry.set_active_space(MemorySpace::Host);

    let raw = SendPtr(device_obj);
    registry.backend().run_device_task(Box::new(move || {
        // SAFETY: the device mirror is live and this synchronous task
        // is the only device work in flight.
        unsafe { raw.get().as_ref() }.run();
    }));

    // Reading from the host migrates the bytes back.
    println!("both scaled:  {:?}", values.as_slice());

    drop(copy);
    drop(kernel);
    values.free();
    assert!(registry.backend().stats().balanced());
    println!("stats:        {:?}", registry.backend().stats());
}
