//! The nested-resource registration set.

use smallvec::SmallVec;
use tandem_core::SharedResource;

/// Type-erased set of resources captured at handle construction.
///
/// A dual-residency handle remembers which of its constructor
/// arguments are themselves shared resources (nested arrays, nested
/// handles). Copying the owning handle calls
/// [`resynchronize_all`](ArgumentSet::resynchronize_all) so those
/// resources can migrate; the final destruction of the owning handle
/// releases the set exactly once.
#[derive(Default)]
pub struct ArgumentSet {
    items: SmallVec<[Box<dyn SharedResource>; 4]>,
}

impl ArgumentSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource, builder style.
    pub fn with(mut self, resource: impl SharedResource + 'static) -> Self {
        self.push(resource);
        self
    }

    /// Add a resource.
    pub fn push(&mut self, resource: impl SharedResource + 'static) {
        self.items.push(Box::new(resource));
    }

    /// Number of captured resources.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Give every captured resource the chance to migrate.
    pub fn resynchronize_all(&self) {
        for item in &self.items {
            item.resynchronize();
        }
    }

    /// Release every captured resource, consuming the set.
    pub(crate) fn release(self) {
        for item in self.items {
            item.release();
        }
    }
}

impl std::fmt::Debug for ArgumentSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArgumentSet")
            .field("len", &self.items.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Probe {
        syncs: Rc<Cell<u32>>,
    }

    impl SharedResource for Probe {
        fn resynchronize(&self) {
            self.syncs.set(self.syncs.get() + 1);
        }
    }

    #[test]
    fn resynchronize_all_visits_every_item() {
        let syncs = Rc::new(Cell::new(0));
        let set = ArgumentSet::new()
            .with(Probe {
                syncs: Rc::clone(&syncs),
            })
            .with(Probe {
                syncs: Rc::clone(&syncs),
            });
        assert_eq!(set.len(), 2);
        set.resynchronize_all();
        assert_eq!(syncs.get(), 2);
        set.release();
    }

    #[test]
    fn empty_set_is_harmless() {
        let set = ArgumentSet::new();
        assert!(set.is_empty());
        set.resynchronize_all();
        set.release();
    }
}
