//! The space-migrating array handle.

use std::cell::Cell;
use std::fmt;
use std::ops::{Add, Index, IndexMut, Sub};
use std::sync::Arc;

use tandem_backend::MemoryBackend;
use tandem_core::{MemorySpace, ReadOnly, Residency, SharedResource};

use crate::error::ArrayError;
use crate::record::{AllocationAction, AllocationEvent};
use crate::registry::ArrayRegistry;

/// Element types supporting single-step increment and decrement.
pub trait Countable: Copy + Add<Output = Self> + Sub<Output = Self> {
    /// The unit step.
    fn one() -> Self;
}

macro_rules! impl_countable {
    ($($t:ty),* $(,)?) => {
        $(impl Countable for $t {
            fn one() -> Self {
                1 as $t
            }
        })*
    };
}

impl_countable!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

/// A value-semantic handle over one logical array.
///
/// Copies of a handle alias the same allocation record; the handle
/// itself owns nothing. Freeing goes through the tracker, and slices
/// never free at all. Accessors that may cross a space boundary
/// (`host_view`, `device_view`, `pick`, `set`, `as_slice`) consult the
/// tracker and migrate first; plain indexing dereferences the most
/// recently materialized pointer with no checks and no migration.
///
/// The handle is not thread-safe: one host thread mutates any given
/// allocation at a time, and a view obtained from one copy must not
/// outlive a migration triggered through another.
pub struct ManagedArray<T> {
    /// Most recently materialized pointer, already offset for slices.
    active: Cell<*mut T>,
    /// Tracker key: base address of the underlying allocation.
    base: usize,
    registry: Option<Arc<ArrayRegistry>>,
    elems: usize,
    /// Element offset from the allocation base.
    offset: usize,
    is_slice: bool,
}

// SAFETY: the handle is an address plus bookkeeping; sending it to the
// device worker for mirror construction is sound because all shared
// record state lives behind the registry's mutex. The handle is
// deliberately not Sync.
unsafe impl<T: Send> Send for ManagedArray<T> {}

impl<T> ManagedArray<T> {
    /// An empty handle with no allocation.
    pub fn new() -> Self {
        Self {
            active: Cell::new(std::ptr::null_mut()),
            base: 0,
            registry: None,
            elems: 0,
            offset: 0,
            is_slice: false,
        }
    }

    /// Allocate `elems` elements in `space` through `registry`.
    pub fn with_size(
        elems: usize,
        space: MemorySpace,
        registry: &Arc<ArrayRegistry>,
    ) -> Result<Self, ArrayError> {
        let mut array = Self::new();
        array.registry = Some(Arc::clone(registry));
        array.allocate(elems, space, None)?;
        Ok(array)
    }

    /// Adopt a pointer the registry already tracks.
    ///
    /// The element count comes from the allocation record. Returns
    /// `None` if `ptr` is not a tracked base address.
    pub fn from_registered(ptr: *mut T, registry: &Arc<ArrayRegistry>) -> Option<Self> {
        let base = ptr as usize;
        let record = registry.lookup(base)?;
        Some(Self {
            active: Cell::new(ptr),
            base,
            registry: Some(Arc::clone(registry)),
            elems: record.elems(),
            offset: 0,
            is_slice: false,
        })
    }

    /// Current element count.
    pub fn size(&self) -> usize {
        self.elems
    }

    /// Whether the handle holds zero elements.
    pub fn is_empty(&self) -> bool {
        self.elems == 0
    }

    /// Whether this handle is a non-owning slice view.
    pub fn is_slice(&self) -> bool {
        self.is_slice
    }

    /// The registry this handle consults, if any.
    pub fn registry(&self) -> Option<&Arc<ArrayRegistry>> {
        self.registry.as_ref()
    }

    /// Allocate a fresh buffer of `elems` elements in `space`.
    ///
    /// No-op on a slice. Replaces (and frees) any previous allocation
    /// this handle owned. The optional callback observes the
    /// allocation; it cannot affect its outcome.
    pub fn allocate(
        &mut self,
        elems: usize,
        space: MemorySpace,
        callback: Option<&dyn Fn(&AllocationEvent)>,
    ) -> Result<(), ArrayError> {
        if self.is_slice {
            return Ok(());
        }
        let registry = self.registry.get_or_insert_with(ArrayRegistry::global);
        let layout = std::alloc::Layout::array::<T>(elems)
            .map_err(|_| ArrayError::LayoutOverflow { elems })?;

        if self.base != 0 {
            if let Err(err) = registry.free(self.base) {
                tracing::warn!(target: "tandem::array", %err, "stale handle on allocate");
            }
        }

        let base = registry.allocate(layout, elems, space)?;
        self.base = base;
        self.elems = elems;
        self.offset = 0;
        self.active.set(base as *mut T);

        if let Some(cb) = callback {
            cb(&AllocationEvent {
                action: AllocationAction::Allocate,
                space,
                bytes: layout.size(),
            });
        }
        Ok(())
    }

    /// Move the array to a new allocation of `new_elems` elements.
    ///
    /// No-op on a slice. Elements at indices below
    /// `min(old, new)` keep their values; any trailing new elements
    /// are uninitialized. Other copies of this handle are invalidated.
    pub fn reallocate(&mut self, new_elems: usize) -> Result<(), ArrayError> {
        if self.is_slice || self.base == 0 {
            return Ok(());
        }
        let registry = self.registry.as_ref().expect("allocated handle has a registry");
        let layout = std::alloc::Layout::array::<T>(new_elems)
            .map_err(|_| ArrayError::LayoutOverflow { elems: new_elems })?;
        let base = registry.reallocate(self.base, layout, new_elems)?;
        self.base = base;
        self.elems = new_elems;
        self.offset = 0;
        self.active.set(base as *mut T);
        Ok(())
    }

    /// Release the allocation.
    ///
    /// No-op on a slice. The handle's pointer is stale afterwards and
    /// must not be dereferenced until the handle is reallocated or
    /// reassigned; other copies of the handle are likewise stale.
    pub fn free(&mut self) {
        if self.is_slice || self.base == 0 {
            return;
        }
        let registry = self.registry.as_ref().expect("allocated handle has a registry");
        if let Err(err) = registry.free(self.base) {
            tracing::warn!(target: "tandem::array", %err, "free on untracked handle");
        }
        self.base = 0;
        self.elems = 0;
        self.offset = 0;
        self.active.set(std::ptr::null_mut());
    }

    /// A non-owning view of `elems` elements starting at `offset`.
    ///
    /// The slice shares the source's allocation record: mutation
    /// through it is visible through the source, and `allocate`,
    /// `reallocate`, and `free` on it are no-ops. Out-of-range bounds
    /// are a recoverable usage error: a diagnostic is emitted and an
    /// empty handle returned.
    pub fn slice(&self, offset: usize, elems: usize) -> ManagedArray<T> {
        let out_of_range = offset
            .checked_add(elems)
            .is_none_or(|end| end > self.elems);
        if out_of_range {
            tracing::warn!(
                target: "tandem::array",
                offset,
                elems,
                size = self.elems,
                "invalid slice bounds"
            );
            return ManagedArray::new();
        }
        ManagedArray {
            active: Cell::new(self.active.get().wrapping_add(offset)),
            base: self.base,
            registry: self.registry.clone(),
            elems,
            offset: self.offset + offset,
            is_slice: true,
        }
    }

    /// Reset to the empty state without freeing.
    ///
    /// The allocation (if any) stays tracked by the registry; release
    /// it through another handle or the registry itself.
    pub fn clear(&mut self) {
        self.active.set(std::ptr::null_mut());
        self.base = 0;
        self.elems = 0;
        self.offset = 0;
        self.is_slice = false;
    }

    /// A read-only handle aliasing the same allocation.
    ///
    /// No data is copied; the view is non-owning and never frees.
    pub fn as_const(&self) -> ManagedArray<ReadOnly<T>> {
        ManagedArray {
            active: Cell::new(self.active.get() as *mut ReadOnly<T>),
            base: self.base,
            registry: self.registry.clone(),
            elems: self.elems,
            offset: self.offset,
            is_slice: true,
        }
    }

    /// Materialize the host-personality pointer.
    ///
    /// Migrates the bytes to host memory first if they currently
    /// reside on the device.
    pub fn host_view(&self) -> Result<*mut T, ArrayError> {
        self.view(Residency::Host)
    }

    /// Materialize the device-personality pointer.
    ///
    /// Migrates the bytes to device memory first if needed. The
    /// returned pointer must only be dereferenced inside device tasks.
    pub fn device_view(&self) -> Result<*mut T, ArrayError> {
        self.view(Residency::Device)
    }

    /// A shared host-side view of the elements.
    ///
    /// Migrates to host memory first. Do not hold the returned slice
    /// across a device access made through any copy of this handle.
    ///
    /// # Panics
    ///
    /// Panics if the host mirror cannot be allocated.
    pub fn as_slice(&self) -> &[T] {
        if self.elems == 0 {
            return &[];
        }
        let ptr = self.prepare_host();
        // SAFETY: prepare_host returned a live host buffer with
        // self.elems elements starting at the handle's offset.
        unsafe { std::slice::from_raw_parts(ptr, self.elems) }
    }

    fn view(&self, target: Residency) -> Result<*mut T, ArrayError> {
        let Some(registry) = self.registry.as_ref() else {
            return Ok(self.active.get());
        };
        if self.base == 0 {
            return Ok(self.active.get());
        }
        let addr = registry.make_resident(self.base, target)?;
        let ptr = (addr as *mut T).wrapping_add(self.offset);
        self.active.set(ptr);
        Ok(ptr)
    }

    /// Migrate for host-personality element access, honoring the
    /// unified-memory device-idle rule.
    fn prepare_host(&self) -> *mut T {
        if let Some(registry) = self.registry.as_ref() {
            if self.base != 0 {
                if let Some(record) = registry.lookup(self.base) {
                    if record.space().needs_device_idle() {
                        registry.backend().synchronize();
                    }
                }
            }
        }
        self.view(Residency::Host)
            .expect("host mirror materialization failed")
    }
}

impl<T: Copy> ManagedArray<T> {
    /// Read one element from host context.
    ///
    /// Forces the device idle first when the backing space is unified
    /// memory, and migrates to host otherwise.
    ///
    /// # Panics
    ///
    /// Panics if the host mirror cannot be allocated.
    pub fn pick(&self, i: usize) -> T {
        let ptr = self.prepare_host();
        debug_assert!(i < self.elems, "pick index {i} out of bounds {}", self.elems);
        // SAFETY: ptr is a live host buffer of self.elems elements and
        // the caller guarantees i is in bounds.
        unsafe { *ptr.add(i) }
    }

    /// Write one element from host context.
    ///
    /// Same synchronization behavior as [`pick`](ManagedArray::pick).
    pub fn set(&self, i: usize, value: T) {
        let ptr = self.prepare_host();
        debug_assert!(i < self.elems, "set index {i} out of bounds {}", self.elems);
        // SAFETY: as in pick; the write stays within the allocation.
        unsafe { *ptr.add(i) = value };
    }
}

impl<T: Countable> ManagedArray<T> {
    /// Increment one element by a unit step from host context.
    pub fn incr(&self, i: usize) {
        self.set(i, self.pick(i) + T::one());
    }

    /// Decrement one element by a unit step from host context.
    pub fn decr(&self, i: usize) {
        self.set(i, self.pick(i) - T::one());
    }
}

impl<T> Index<usize> for ManagedArray<T> {
    type Output = T;

    /// Unchecked hot-path access against the most recently
    /// materialized pointer. No migration, no bounds check in release
    /// builds; the caller guarantees `0 <= i < size()` and current
    /// residency.
    fn index(&self, i: usize) -> &T {
        debug_assert!(i < self.elems, "index {i} out of bounds {}", self.elems);
        // SAFETY: caller contract; the active pointer addresses at
        // least self.elems elements when the handle is non-empty.
        unsafe { &*self.active.get().add(i) }
    }
}

impl<T> IndexMut<usize> for ManagedArray<T> {
    fn index_mut(&mut self, i: usize) -> &mut T {
        debug_assert!(i < self.elems, "index {i} out of bounds {}", self.elems);
        // SAFETY: as in Index; &mut self keeps this handle exclusive.
        unsafe { &mut *self.active.get().add(i) }
    }
}

impl<T> Clone for ManagedArray<T> {
    fn clone(&self) -> Self {
        Self {
            active: Cell::new(self.active.get()),
            base: self.base,
            registry: self.registry.clone(),
            elems: self.elems,
            offset: self.offset,
            is_slice: self.is_slice,
        }
    }
}

impl<T> Default for ManagedArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for ManagedArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedArray")
            .field("base", &format_args!("{:#x}", self.base))
            .field("elems", &self.elems)
            .field("offset", &self.offset)
            .field("is_slice", &self.is_slice)
            .finish()
    }
}

impl<T> SharedResource for ManagedArray<T> {
    /// Migrate toward the registry's active space.
    ///
    /// Invoked when an owning handle is copied. Failure to migrate is
    /// reported through the diagnostic sink and otherwise ignored: the
    /// bytes stay where they were.
    fn resynchronize(&self) {
        let Some(registry) = self.registry.as_ref() else {
            return;
        };
        if self.base == 0 {
            return;
        }
        let target = match registry.active_space() {
            MemorySpace::Host => Residency::Host,
            MemorySpace::Device => Residency::Device,
            MemorySpace::Unified | MemorySpace::None => return,
        };
        match registry.make_resident(self.base, target) {
            Ok(addr) => self.active.set((addr as *mut T).wrapping_add(self.offset)),
            Err(err) => {
                tracing::warn!(target: "tandem::array", %err, "resynchronize failed");
            }
        }
    }
}
