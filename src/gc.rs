//! Filepath: src/gc.rs
//!
//! Deferred reclamation for nodes, values and suffixes unlinked by writers.
//!
//! Writers never free anything in place. Whatever an operation detaches is
//! pushed into a caller-owned [`GarbageCollector`], which hands the batch to
//! the tree's `seize` collector when it runs (explicitly or on drop). The
//! collector frees a pointer only after every guard that could still see it
//! has been released.
//!
//! The module also holds the single-threaded teardown used by
//! `Masstree::drop`, which walks every layer and frees what is still live.

use std::sync::Arc;

use seize::{Collector, Guard};

use crate::border::{BorderNode, LAYER};
use crate::interior::InteriorNode;
use crate::node::{NodePtr, NodeRef};
use crate::suffix::BigSuffix;
use crate::tracing_helpers::debug_log;

// ============================================================================
//  Reclaimers (seize callback signatures)
// ============================================================================

/// Free a boxed node or suffix.
///
/// # Safety
/// `ptr` came from `Box::into_raw` and no reader can reach it any more.
unsafe fn reclaim_boxed<T>(ptr: *mut T, _collector: &Collector) {
    // SAFETY: guaranteed by the caller and the collector.
    unsafe { drop(Box::from_raw(ptr)) };
}

/// Release the strong count a value slot held.
///
/// # Safety
/// `ptr` came from `Arc::into_raw` and the slot's count was not released
/// elsewhere.
unsafe fn reclaim_value<V>(ptr: *mut V, _collector: &Collector) {
    // SAFETY: guaranteed by the caller and the collector.
    unsafe { drop(Arc::from_raw(ptr.cast_const())) };
}

// ============================================================================
//  GarbageCollector
// ============================================================================

/// Batch of detached pointers waiting for reclamation.
///
/// Obtain one from [`Masstree::gc`](crate::Masstree::gc) and pass it to
/// every mutating call. Each thread uses its own batch. Dropping the batch
/// retires its contents.
///
/// ```rust
/// use masstree_olc::Masstree;
/// use masstree_olc::key::Key;
///
/// let tree: Masstree<String> = Masstree::new();
/// let mut gc = tree.gc();
/// let mut key = Key::new(b"k").unwrap();
///
/// tree.put(&mut key, "v1".to_string(), &mut gc);
/// tree.put(&mut key, "v2".to_string(), &mut gc);
/// assert_eq!(gc.len(), 1); // the replaced value
///
/// gc.run();
/// assert!(gc.is_empty());
/// ```
pub struct GarbageCollector<'t, V> {
    collector: &'t Collector,
    borders: Vec<*mut BorderNode<V>>,
    interiors: Vec<*mut InteriorNode<V>>,
    values: Vec<*mut V>,
    suffixes: Vec<*mut BigSuffix>,
}

impl<'t, V> GarbageCollector<'t, V> {
    /// An empty batch feeding `collector`.
    #[must_use]
    pub const fn new(collector: &'t Collector) -> Self {
        Self {
            collector,
            borders: Vec::new(),
            interiors: Vec::new(),
            values: Vec::new(),
            suffixes: Vec::new(),
        }
    }

    /// The collector this batch retires into.
    #[must_use]
    pub const fn collector(&self) -> &'t Collector {
        self.collector
    }

    /// Pointers waiting.
    #[must_use]
    pub fn len(&self) -> usize {
        self.borders.len() + self.interiors.len() + self.values.len() + self.suffixes.len()
    }

    /// Nothing waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn add_border(&mut self, node: &BorderNode<V>) {
        let ptr: *mut BorderNode<V> = std::ptr::from_ref(node).cast_mut();
        debug_assert!(node.version().is_deleted(), "add_border: node not deleted");
        debug_assert!(!self.borders.contains(&ptr), "add_border: retired twice");
        self.borders.push(ptr);
    }

    pub(crate) fn add_interior(&mut self, node: &InteriorNode<V>) {
        let ptr: *mut InteriorNode<V> = std::ptr::from_ref(node).cast_mut();
        debug_assert!(node.version().is_deleted(), "add_interior: node not deleted");
        debug_assert!(!self.interiors.contains(&ptr), "add_interior: retired twice");
        self.interiors.push(ptr);
    }

    /// Queue a value pointer taken out of a slot.
    pub(crate) fn add_value(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }

        let ptr: *mut V = ptr.cast();
        debug_assert!(!self.values.contains(&ptr), "add_value: retired twice");
        self.values.push(ptr);
    }

    /// Queue a suffix pointer taken out of a slot.
    pub(crate) fn add_suffix(&mut self, ptr: *mut BigSuffix) {
        if ptr.is_null() {
            return;
        }

        debug_assert!(!self.suffixes.contains(&ptr), "add_suffix: retired twice");
        self.suffixes.push(ptr);
    }

    /// Hand everything to the collector.
    pub fn run(&mut self) {
        if self.is_empty() {
            return;
        }

        debug_log!(
            borders = self.borders.len(),
            interiors = self.interiors.len(),
            values = self.values.len(),
            suffixes = self.suffixes.len(),
            "retiring batch"
        );

        let guard = self.collector.enter();

        // SAFETY: every queued pointer was unlinked under its node lock
        // before being queued, so new readers cannot reach it; the collector
        // waits out the old ones.
        unsafe {
            for ptr in self.borders.drain(..) {
                guard.defer_retire(ptr, reclaim_boxed::<BorderNode<V>>);
            }
            for ptr in self.interiors.drain(..) {
                guard.defer_retire(ptr, reclaim_boxed::<InteriorNode<V>>);
            }
            for ptr in self.values.drain(..) {
                guard.defer_retire(ptr, reclaim_value::<V>);
            }
            for ptr in self.suffixes.drain(..) {
                guard.defer_retire(ptr, reclaim_boxed::<BigSuffix>);
            }
        }
    }
}

impl<V> std::fmt::Debug for GarbageCollector<'_, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GarbageCollector")
            .field("borders", &self.borders.len())
            .field("interiors", &self.interiors.len())
            .field("values", &self.values.len())
            .field("suffixes", &self.suffixes.len())
            .finish_non_exhaustive()
    }
}

impl<V> Drop for GarbageCollector<'_, V> {
    fn drop(&mut self) {
        self.run();
    }
}

// ============================================================================
//  Teardown
// ============================================================================

/// Free every node reachable from `root`, including lower layers.
///
/// Border nodes free their own live values and suffixes on drop. Retired
/// nodes are not reachable from a live structure, so nothing here overlaps
/// with what the collector still holds.
///
/// # Safety
/// Caller has exclusive access to the tree and `root` is a live layer root
/// (or null).
pub(crate) unsafe fn teardown<V>(root: NodePtr<V>) {
    let mut stack: Vec<NodePtr<V>> = Vec::with_capacity(64);
    if !root.is_null() {
        stack.push(root);
    }

    #[cfg(feature = "tracing")]
    let mut freed: usize = 0;

    while let Some(ptr) = stack.pop() {
        // SAFETY: every pushed pointer is a live node owned by the tree.
        match unsafe { NodeRef::from_raw(ptr) } {
            NodeRef::Border(border) => {
                let perm = border.permutation();
                for slot in perm.iter() {
                    if border.key_len(slot) == LAYER {
                        stack.push(border.lv(slot).cast());
                    }
                }

                // SAFETY: nodes are allocated through Box.
                unsafe { drop(Box::from_raw(ptr.cast::<BorderNode<V>>())) };
            }

            NodeRef::Interior(interior) => {
                for i in 0..=interior.num_keys() {
                    let child: NodePtr<V> = interior.child(i);
                    if !child.is_null() {
                        stack.push(child);
                    }
                }

                // SAFETY: as above.
                unsafe { drop(Box::from_raw(ptr.cast::<InteriorNode<V>>())) };
            }
        }

        #[cfg(feature = "tracing")]
        {
            freed += 1;
        }
    }

    debug_log!(freed, "tree torn down");
}
