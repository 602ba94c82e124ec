//! Allocation and device-task backends for the Tandem runtime.
//!
//! The handle crates consume raw memory through one capability
//! interface, [`MemoryBackend`]: space-qualified allocate/deallocate,
//! byte copies between spaces, and a "run this single administrative
//! task on the device and wait" primitive. Swapping backends is a
//! value-level choice, not conditional compilation.
//!
//! This crate is one of the crates that may contain `unsafe` code
//! (along with `tandem-array` and `tandem-ptr`); every unsafe block
//! carries a `// SAFETY:` comment.
//!
//! The reference backend is [`EmulatedDevice`]: device memory is a
//! capacity-limited host-heap arena and device execution is a
//! dedicated worker thread, which keeps every cross-personality
//! ordering rule observable in ordinary tests.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod backend;
pub mod config;
pub mod emulated;
pub mod stats;

pub use backend::{device_call, DeviceTask, MemoryBackend, SendPtr};
pub use config::BackendConfig;
pub use emulated::EmulatedDevice;
pub use stats::BackendStats;
