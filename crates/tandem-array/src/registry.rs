//! The process-wide allocation tracker.

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex, OnceLock};

use indexmap::IndexMap;
use tandem_backend::{EmulatedDevice, MemoryBackend};
use tandem_core::{CopyDirection, MemorySpace, Residency};

use crate::error::ArrayError;
use crate::record::AllocationRecord;

/// Registry mapping base addresses to [`AllocationRecord`]s.
///
/// One registry serves every array sharing a backend. Record mutation
/// is serialized behind a mutex, so handles may consult the registry
/// from the device worker thread as well as the host thread.
///
/// The central rule the registry implements is copy-on-touch: an
/// access from a personality whose space does not currently hold the
/// authoritative bytes triggers a migration before the access
/// proceeds, and an access from the resident side performs no copy at
/// all.
pub struct ArrayRegistry {
    backend: Arc<dyn MemoryBackend>,
    records: Mutex<IndexMap<usize, AllocationRecord>>,
    active_space: Mutex<MemorySpace>,
}

static GLOBAL: OnceLock<Arc<ArrayRegistry>> = OnceLock::new();

impl ArrayRegistry {
    /// Create a registry over the given backend.
    pub fn new(backend: Arc<dyn MemoryBackend>) -> Self {
        Self {
            backend,
            records: Mutex::new(IndexMap::new()),
            active_space: Mutex::new(MemorySpace::Host),
        }
    }

    /// Wrap this registry in an `Arc` for sharing.
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// The process-wide default registry, backed by an
    /// [`EmulatedDevice`] with default configuration.
    ///
    /// Created on first use. Code that wants its own backend (tests,
    /// embedders with a real accelerator) builds registries with
    /// [`ArrayRegistry::new`] instead.
    pub fn global() -> Arc<ArrayRegistry> {
        GLOBAL
            .get_or_init(|| {
                ArrayRegistry::new(EmulatedDevice::default().into_shared()).into_shared()
            })
            .clone()
    }

    /// The backend this registry allocates through.
    pub fn backend(&self) -> &Arc<dyn MemoryBackend> {
        &self.backend
    }

    /// The space nested-resource resynchronization currently targets.
    pub fn active_space(&self) -> MemorySpace {
        *self.active_space.lock().expect("active space poisoned")
    }

    /// Declare the space upcoming work will execute in.
    ///
    /// Handle copies consult this to decide where registered nested
    /// resources should migrate. Host-side bookkeeping; set it before
    /// launching device work, restore it after.
    pub fn set_active_space(&self, space: MemorySpace) {
        *self.active_space.lock().expect("active space poisoned") = space;
    }

    /// Allocate a fresh array buffer in `space` and create its record.
    ///
    /// Returns the base address, which is the record key for the rest
    /// of the allocation's life.
    pub fn allocate(
        &self,
        layout: Layout,
        elems: usize,
        space: MemorySpace,
    ) -> Result<usize, ArrayError> {
        let ptr = self.backend.allocate(layout, space)?;
        let addr = ptr.as_ptr() as usize;
        let record = AllocationRecord {
            host_ptr: (space != MemorySpace::Device).then_some(addr),
            device_ptr: (space == MemorySpace::Device).then_some(addr),
            space,
            layout,
            elems,
        };
        self.records
            .lock()
            .expect("record table poisoned")
            .insert(addr, record);
        tracing::debug!(
            target: "tandem::array",
            %space,
            elems,
            bytes = layout.size(),
            base = format_args!("{addr:#x}"),
            "allocated array"
        );
        Ok(addr)
    }

    /// Ensure the array's bytes are resident where `target` will look
    /// for them, and return the address of that side's buffer.
    ///
    /// Allocates the missing mirror buffer lazily on the first access
    /// from a new side. No copy happens when the bytes are already
    /// resident there. Unified allocations are reachable from both
    /// sides and never migrate.
    pub fn make_resident(&self, base: usize, target: Residency) -> Result<usize, ArrayError> {
        let mut records = self.records.lock().expect("record table poisoned");
        let record = records
            .get_mut(&base)
            .ok_or(ArrayError::UnknownPointer { addr: base })?;

        if record.space == MemorySpace::Unified {
            return Ok(record.resident_ptr());
        }

        let target_space = target.space();
        let missing = match target {
            Residency::Host => record.host_ptr.is_none(),
            Residency::Device => record.device_ptr.is_none(),
        };
        if missing {
            let ptr = self.backend.allocate(record.layout, target_space)?;
            let addr = ptr.as_ptr() as usize;
            match target {
                Residency::Host => record.host_ptr = Some(addr),
                Residency::Device => record.device_ptr = Some(addr),
            }
        }

        let dst = match target {
            Residency::Host => record.host_ptr.expect("host buffer just ensured"),
            Residency::Device => record.device_ptr.expect("device buffer just ensured"),
        };

        if record.space != target_space {
            let src = record.resident_ptr();
            let direction = CopyDirection::between(record.space, target_space);
            // SAFETY: both buffers were allocated from this backend
            // with record.layout and are distinct allocations.
            unsafe {
                self.backend.copy(
                    non_null(src),
                    non_null(dst),
                    record.layout.size(),
                    direction,
                );
            }
            tracing::debug!(
                target: "tandem::array",
                %direction,
                bytes = record.layout.size(),
                base = format_args!("{base:#x}"),
                "migrated array"
            );
            record.space = target_space;
        }

        Ok(dst)
    }

    /// Move the array to a new allocation of `new_elems` elements.
    ///
    /// The new buffer lives in the array's current resident space. The
    /// first `min(old, new)` elements' bytes are preserved; the old
    /// buffers (both mirrors, if the device side was materialized) are
    /// freed. Returns the new base address.
    pub fn reallocate(
        &self,
        base: usize,
        new_layout: Layout,
        new_elems: usize,
    ) -> Result<usize, ArrayError> {
        let mut records = self.records.lock().expect("record table poisoned");
        let old = *records
            .get(&base)
            .ok_or(ArrayError::UnknownPointer { addr: base })?;

        let space = old.space;
        let new_ptr = self.backend.allocate(new_layout, space)?;
        let new_addr = new_ptr.as_ptr() as usize;

        let keep = old.bytes().min(new_layout.size());
        if keep > 0 {
            // SAFETY: source is the live resident buffer, destination
            // was just allocated, and keep fits both.
            unsafe {
                self.backend.copy(
                    non_null(old.resident_ptr()),
                    new_ptr,
                    keep,
                    CopyDirection::between(space, space),
                );
            }
        }

        records.swap_remove(&base);
        self.release_buffers(&old);

        let record = AllocationRecord {
            host_ptr: (space != MemorySpace::Device).then_some(new_addr),
            device_ptr: (space == MemorySpace::Device).then_some(new_addr),
            space,
            layout: new_layout,
            elems: new_elems,
        };
        records.insert(new_addr, record);
        tracing::debug!(
            target: "tandem::array",
            %space,
            old_elems = old.elems(),
            new_elems,
            base = format_args!("{new_addr:#x}"),
            "reallocated array"
        );
        Ok(new_addr)
    }

    /// Release every buffer of the allocation and drop its record.
    pub fn free(&self, base: usize) -> Result<(), ArrayError> {
        let record = self
            .records
            .lock()
            .expect("record table poisoned")
            .swap_remove(&base)
            .ok_or(ArrayError::UnknownPointer { addr: base })?;
        self.release_buffers(&record);
        tracing::debug!(
            target: "tandem::array",
            bytes = record.bytes(),
            base = format_args!("{base:#x}"),
            "freed array"
        );
        Ok(())
    }

    /// The record for `base`, if the address is tracked.
    pub fn lookup(&self, base: usize) -> Option<AllocationRecord> {
        self.records
            .lock()
            .expect("record table poisoned")
            .get(&base)
            .copied()
    }

    /// Size in bytes of the allocation at `base`.
    pub fn size_bytes(&self, base: usize) -> Option<usize> {
        self.lookup(base).map(|r| r.bytes())
    }

    /// Element count of the allocation at `base`.
    pub fn elems(&self, base: usize) -> Option<usize> {
        self.lookup(base).map(|r| r.elems())
    }

    /// Number of live allocation records.
    pub fn record_count(&self) -> usize {
        self.records.lock().expect("record table poisoned").len()
    }

    fn release_buffers(&self, record: &AllocationRecord) {
        let host_space = if record.space == MemorySpace::Unified {
            MemorySpace::Unified
        } else {
            MemorySpace::Host
        };
        if let Some(addr) = record.host_ptr {
            // SAFETY: the buffer was allocated from this backend with
            // record.layout and its record has been removed, so no
            // further access can reach it.
            unsafe {
                self.backend
                    .deallocate(non_null(addr), record.layout, host_space);
            }
        }
        if let Some(addr) = record.device_ptr {
            // SAFETY: as above, for the device mirror.
            unsafe {
                self.backend
                    .deallocate(non_null(addr), record.layout, MemorySpace::Device);
            }
        }
    }
}

fn non_null(addr: usize) -> NonNull<u8> {
    NonNull::new(addr as *mut u8).expect("tracked buffer address is null")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_backend::BackendConfig;

    fn registry() -> ArrayRegistry {
        ArrayRegistry::new(EmulatedDevice::new(BackendConfig::new(1 << 20)).into_shared())
    }

    fn layout(elems: usize) -> Layout {
        Layout::array::<i32>(elems).unwrap()
    }

    #[test]
    fn allocate_creates_record() {
        let reg = registry();
        let base = reg.allocate(layout(16), 16, MemorySpace::Host).unwrap();
        let record = reg.lookup(base).unwrap();
        assert_eq!(record.space(), MemorySpace::Host);
        assert_eq!(record.elems(), 16);
        assert_eq!(record.bytes(), 64);
        assert!(!record.has_device_buffer());
        reg.free(base).unwrap();
        assert_eq!(reg.record_count(), 0);
    }

    #[test]
    fn same_side_access_does_not_copy() {
        let reg = registry();
        let base = reg.allocate(layout(8), 8, MemorySpace::Host).unwrap();
        let copies_before = reg.backend().stats().copies;
        let a = reg.make_resident(base, Residency::Host).unwrap();
        let b = reg.make_resident(base, Residency::Host).unwrap();
        assert_eq!(a, base);
        assert_eq!(b, base);
        assert_eq!(reg.backend().stats().copies, copies_before);
        reg.free(base).unwrap();
    }

    #[test]
    fn first_device_touch_allocates_and_copies() {
        let reg = registry();
        let base = reg.allocate(layout(4), 4, MemorySpace::Host).unwrap();
        // SAFETY: base is a live host buffer of 4 i32s.
        unsafe {
            (base as *mut i32).copy_from_nonoverlapping([1, 2, 3, 4].as_ptr(), 4);
        }

        let dev = reg.make_resident(base, Residency::Device).unwrap();
        assert_ne!(dev, base);
        assert_eq!(reg.lookup(base).unwrap().space(), MemorySpace::Device);
        // SAFETY: dev is the freshly copied device mirror.
        let mirrored = unsafe { std::slice::from_raw_parts(dev as *const i32, 4) };
        assert_eq!(mirrored, &[1, 2, 3, 4]);

        // Key is stable: the record is still reachable through base.
        let back = reg.make_resident(base, Residency::Host).unwrap();
        assert_eq!(back, base);
        assert_eq!(reg.lookup(base).unwrap().space(), MemorySpace::Host);
        reg.free(base).unwrap();
        assert!(reg.backend().stats().balanced());
    }

    #[test]
    fn unified_never_migrates() {
        let reg = registry();
        let base = reg.allocate(layout(4), 4, MemorySpace::Unified).unwrap();
        let copies_before = reg.backend().stats().copies;
        let host = reg.make_resident(base, Residency::Host).unwrap();
        let dev = reg.make_resident(base, Residency::Device).unwrap();
        assert_eq!(host, base);
        assert_eq!(dev, base);
        assert_eq!(reg.backend().stats().copies, copies_before);
        assert_eq!(reg.lookup(base).unwrap().space(), MemorySpace::Unified);
        reg.free(base).unwrap();
    }

    #[test]
    fn reallocate_preserves_prefix_and_rekeys() {
        let reg = registry();
        let base = reg.allocate(layout(4), 4, MemorySpace::Host).unwrap();
        // SAFETY: live host buffer of 4 i32s.
        unsafe {
            (base as *mut i32).copy_from_nonoverlapping([10, 20, 30, 40].as_ptr(), 4);
        }
        let new_base = reg.reallocate(base, layout(8), 8).unwrap();
        assert!(reg.lookup(base).is_none());
        let record = reg.lookup(new_base).unwrap();
        assert_eq!(record.elems(), 8);
        // SAFETY: new_base is a live host buffer of at least 4 i32s.
        let prefix = unsafe { std::slice::from_raw_parts(new_base as *const i32, 4) };
        assert_eq!(prefix, &[10, 20, 30, 40]);
        reg.free(new_base).unwrap();
        assert!(reg.backend().stats().balanced());
    }

    #[test]
    fn free_releases_both_mirrors() {
        let reg = registry();
        let base = reg.allocate(layout(4), 4, MemorySpace::Host).unwrap();
        reg.make_resident(base, Residency::Device).unwrap();
        reg.free(base).unwrap();
        let stats = reg.backend().stats();
        assert!(stats.balanced());
        assert_eq!(stats.device_bytes_in_use, 0);
    }

    #[test]
    fn unknown_pointer_is_reported() {
        let reg = registry();
        assert_eq!(
            reg.make_resident(0xdead_0000, Residency::Host),
            Err(ArrayError::UnknownPointer { addr: 0xdead_0000 })
        );
    }

    #[test]
    fn active_space_round_trip() {
        let reg = registry();
        assert_eq!(reg.active_space(), MemorySpace::Host);
        reg.set_active_space(MemorySpace::Device);
        assert_eq!(reg.active_space(), MemorySpace::Device);
    }
}
