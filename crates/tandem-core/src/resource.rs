//! The [`SharedResource`] capability.

/// A resource embedded in a managed object whose movement must follow
/// the owning handle.
///
/// When a dual-residency handle is copied, every resource registered
/// with it is given the chance to migrate before the copy becomes
/// usable; when the last handle is destroyed, every registered
/// resource is released exactly once. Array and pointer handles both
/// implement this, so ownership graphs nest.
pub trait SharedResource {
    /// The owning handle was touched: migrate to wherever the next
    /// access will happen, if the resource is not already resident
    /// there.
    ///
    /// Called once per reference-count increment, from host code only,
    /// before the new handle copy is returned. Must not fail loudly —
    /// implementations report problems through the diagnostic sink and
    /// leave the resource where it was.
    fn resynchronize(&self);

    /// Release the captured resource.
    ///
    /// Called exactly once, at the final destruction of the owning
    /// handle. Consumes the box; the default body just drops it, which
    /// is the whole release for handle types whose reclamation lives
    /// in `Drop`.
    fn release(self: Box<Self>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Probe {
        syncs: Rc<Cell<u32>>,
        drops: Rc<Cell<u32>>,
    }

    impl SharedResource for Probe {
        fn resynchronize(&self) {
            self.syncs.set(self.syncs.get() + 1);
        }
    }

    impl Drop for Probe {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    #[test]
    fn default_release_drops_once() {
        let syncs = Rc::new(Cell::new(0));
        let drops = Rc::new(Cell::new(0));
        let boxed: Box<dyn SharedResource> = Box::new(Probe {
            syncs: Rc::clone(&syncs),
            drops: Rc::clone(&drops),
        });
        boxed.resynchronize();
        boxed.resynchronize();
        boxed.release();
        assert_eq!(syncs.get(), 2);
        assert_eq!(drops.get(), 1);
    }
}
