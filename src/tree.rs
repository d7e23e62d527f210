//! Filepath: src/tree.rs
//!
//! [`Masstree`]: the concurrent trie of B+trees.
//!
//! The tree owns the top-level root cell and the `seize` collector every
//! operation enters. The algorithms live in sub-modules:
//!
//! | Module | Operation |
//! |--------|-----------|
//! | `get` | optimistic lookup |
//! | `put` | insert / overwrite, layer descent |
//! | `split` | border and interior splits, root growth |
//! | `remove` | removal, node deletion, pull-up |
//! | `layer` | root publication, layer creation and collapse |
//!
//! # Locking order
//!
//! A thread may hold several node locks at once only in these patterns:
//! a lower-layer node before a node of the layer above, a child before its
//! parent, and a border before its left sibling. No thread ever waits for a
//! dirty version while holding a lock.

use std::marker::PhantomData;
use std::ptr as StdPtr;
use std::sync::Arc;
use std::sync::atomic::AtomicPtr;

use parking_lot::Mutex;
use seize::Collector;

use crate::border::BorderNode;
use crate::gc::{GarbageCollector, teardown};
use crate::key::{Key, KeyError, KeySlice};
use crate::node::{FindBorder, NodeHeader, NodePtr, NodeRef, find_border};
use crate::nodeversion::LockGuard;
use crate::ordering::READ_ORD;

mod get;
mod layer;
mod put;
mod remove;
mod split;

// ============================================================================
//  LayerLink
// ============================================================================

/// The cell that owns a layer's root pointer.
pub(crate) enum LayerLink<V> {
    /// The tree's top-level root.
    Top,

    /// A `LAYER` slot for `slice` in a border of the layer above. The slot
    /// may have moved right through splits since `border` was seen.
    Upper {
        border: *const BorderNode<V>,
        slice: KeySlice,
    },
}

impl<V> Clone for LayerLink<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for LayerLink<V> {}

impl<V> LayerLink<V> {
    pub(crate) fn upper(border: &BorderNode<V>, slice: KeySlice) -> Self {
        Self::Upper {
            border: StdPtr::from_ref(border),
            slice,
        }
    }

    pub(crate) const fn is_top(&self) -> bool {
        matches!(self, Self::Top)
    }
}

// ============================================================================
//  Masstree
// ============================================================================

/// A concurrent ordered map from byte strings to `Arc<V>`.
///
/// Readers take no locks: they validate node versions and retry. Writers
/// lock one node at a time except while propagating a structural change
/// upward. Everything a writer unlinks goes into the caller's
/// [`GarbageCollector`] and is freed by the tree's collector once no
/// concurrent operation can still see it.
///
/// # Example
///
/// ```rust
/// use masstree_olc::Masstree;
/// use masstree_olc::key::Key;
///
/// let tree: Masstree<u64> = Masstree::new();
/// let mut gc = tree.gc();
///
/// let mut key = Key::new(b"the same eight bytes, then more").unwrap();
/// tree.put(&mut key, 7, &mut gc);
/// assert_eq!(tree.get(&mut key).as_deref(), Some(&7));
///
/// tree.remove(&mut key, &mut gc);
/// assert!(tree.get(&mut key).is_none());
/// ```
pub struct Masstree<V> {
    root: AtomicPtr<NodeHeader<V>>,

    /// Serializes writes of `root`.
    root_lock: Mutex<()>,

    collector: Collector,

    _marker: PhantomData<Arc<V>>,
}

impl<V> Masstree<V> {
    /// An empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::from_collector(Collector::new())
    }

    /// An empty tree whose collector retires in batches of `batch_size`.
    #[must_use]
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self::from_collector(Collector::new().batch_size(batch_size))
    }

    fn from_collector(collector: Collector) -> Self {
        Self {
            root: AtomicPtr::new(StdPtr::null_mut()),
            root_lock: Mutex::new(()),
            collector,
            _marker: PhantomData,
        }
    }

    /// A reclamation batch bound to this tree.
    #[must_use]
    pub const fn gc(&self) -> GarbageCollector<'_, V> {
        GarbageCollector::new(&self.collector)
    }

    /// The tree's reclamation collector.
    #[must_use]
    pub const fn collector(&self) -> &Collector {
        &self.collector
    }

    /// True when no key is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let _guard = self.collector.enter();
        let root: NodePtr<V> = self.root.load(READ_ORD);

        if root.is_null() {
            return true;
        }

        // SAFETY: the guard keeps the root allocated.
        match unsafe { NodeRef::from_raw(root) } {
            NodeRef::Border(border) => border.number_of_keys() == 0,
            NodeRef::Interior(_) => false,
        }
    }

    // ========================================================================
    //  Key operations
    // ========================================================================

    /// Look up `key`. The key's cursor is reset first.
    #[must_use]
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", skip_all, fields(len = key.byte_len()))
    )]
    pub fn get(&self, key: &mut Key) -> Option<Arc<V>> {
        let _guard = self.collector.enter();
        self.get_in_guard(key)
    }

    /// Insert or overwrite `key`. A replaced value goes into `gc`.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", skip_all, fields(len = key.byte_len()))
    )]
    pub fn put(&self, key: &mut Key, value: V, gc: &mut GarbageCollector<'_, V>) {
        debug_assert!(
            StdPtr::eq(gc.collector(), &self.collector),
            "put: batch belongs to another tree"
        );

        let _guard = self.collector.enter();
        self.put_in_guard(key, &Arc::new(value), gc);
    }

    /// Remove `key` if present. Unlinked values and nodes go into `gc`.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", skip_all, fields(len = key.byte_len()))
    )]
    pub fn remove(&self, key: &mut Key, gc: &mut GarbageCollector<'_, V>) {
        debug_assert!(
            StdPtr::eq(gc.collector(), &self.collector),
            "remove: batch belongs to another tree"
        );

        let _guard = self.collector.enter();
        self.remove_in_guard(key, gc);
    }

    // ========================================================================
    //  Byte-slice conveniences
    // ========================================================================

    /// [`get`](Self::get) for a byte string.
    ///
    /// # Errors
    /// [`KeyError::Empty`] for an empty key.
    pub fn get_bytes(&self, key: &[u8]) -> Result<Option<Arc<V>>, KeyError> {
        let mut key: Key = Key::new(key)?;
        Ok(self.get(&mut key))
    }

    /// [`put`](Self::put) for a byte string, with a one-shot batch.
    ///
    /// # Errors
    /// [`KeyError::Empty`] for an empty key.
    pub fn put_bytes(&self, key: &[u8], value: V) -> Result<(), KeyError> {
        let mut key: Key = Key::new(key)?;
        let mut gc: GarbageCollector<'_, V> = self.gc();
        self.put(&mut key, value, &mut gc);
        Ok(())
    }

    /// [`remove`](Self::remove) for a byte string, with a one-shot batch.
    ///
    /// # Errors
    /// [`KeyError::Empty`] for an empty key.
    pub fn remove_bytes(&self, key: &[u8]) -> Result<(), KeyError> {
        let mut key: Key = Key::new(key)?;
        let mut gc: GarbageCollector<'_, V> = self.gc();
        self.remove(&mut key, &mut gc);
        Ok(())
    }

    // ========================================================================
    //  Shared helpers
    // ========================================================================

    /// Current top-level root.
    #[inline]
    pub(crate) fn load_root(&self) -> NodePtr<V> {
        self.root.load(READ_ORD)
    }
}

impl<V> Default for Masstree<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> std::fmt::Debug for Masstree<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Masstree")
            .field("root", &self.root.load(READ_ORD))
            .finish_non_exhaustive()
    }
}

impl<V> Drop for Masstree<V> {
    fn drop(&mut self) {
        let root: NodePtr<V> = *self.root.get_mut();

        // SAFETY: `&mut self` excludes every other operation. Retired nodes
        // are not reachable from the root and stay with the collector.
        unsafe { teardown(root) };
    }
}

// ============================================================================
//  Writer positioning
// ============================================================================

/// Outcome of [`lock_border`].
pub(crate) enum LockedBorder<'a, V> {
    /// The border owning the slice, locked and not deleted.
    Locked(&'a BorderNode<V>, LockGuard<'a>),

    /// The layer root was deleted.
    Vanished,
}

/// Find and lock the border that owns `slice` in the layer of `root`.
///
/// After locking, a deleted node sends the search back to the root; a split
/// that moved the slice right is followed hand over hand (the current lock
/// is released before the next one is taken).
///
/// # Safety
/// `root` is non-null and the caller is inside a guard that outlives `'a`.
pub(crate) unsafe fn lock_border<'a, V>(root: NodePtr<V>, slice: KeySlice) -> LockedBorder<'a, V> {
    loop {
        // SAFETY: forwarded from the caller.
        let mut node: &'a BorderNode<V> = match unsafe { find_border::<V>(root, slice) } {
            FindBorder::Found { node, .. } => node,
            FindBorder::Vanished => return LockedBorder::Vanished,
        };

        let locked = loop {
            let lock: LockGuard<'a> = node.version().lock();
            if node.version().is_deleted() {
                break None;
            }

            // SAFETY: siblings are retired through the collector.
            match unsafe { node.next().as_ref() } {
                Some(next) if slice >= next.low_fence() => {
                    drop(lock);
                    node = next;
                }

                _ => break Some(lock),
            }
        };

        if let Some(lock) = locked {
            return LockedBorder::Locked(node, lock);
        }

        std::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    #![expect(clippy::unwrap_used, reason = "fail fast in tests")]

    use std::collections::BTreeMap;

    use super::*;
    use crate::border::{HAS_SUFFIX, LAYER};
    use crate::permuter::MAX_WIDTH;

    fn key(bytes: &[u8]) -> Key {
        Key::new(bytes).unwrap()
    }

    fn root_ref(tree: &Masstree<u64>) -> NodeRef<'_, u64> {
        // SAFETY: tests run single-threaded against a live tree.
        unsafe { NodeRef::from_raw(tree.load_root()) }
    }

    #[test]
    fn test_empty_tree() {
        let tree: Masstree<u64> = Masstree::new();
        assert!(tree.is_empty());
        assert!(tree.get(&mut key(b"missing")).is_none());

        let mut gc = tree.gc();
        tree.remove(&mut key(b"missing"), &mut gc);
        assert!(tree.is_empty());
        assert!(gc.is_empty());
    }

    #[test]
    fn test_put_get_short_keys() {
        let tree: Masstree<u64> = Masstree::new();
        let mut gc = tree.gc();

        tree.put(&mut key(b"a"), 1, &mut gc);
        tree.put(&mut key(b"a\0"), 2, &mut gc);
        tree.put(&mut key(b"abcdefgh"), 3, &mut gc);

        assert_eq!(*tree.get(&mut key(b"a")).unwrap(), 1);
        assert_eq!(*tree.get(&mut key(b"a\0")).unwrap(), 2);
        assert_eq!(*tree.get(&mut key(b"abcdefgh")).unwrap(), 3);
        assert!(tree.get(&mut key(b"ab")).is_none());
        assert!(!tree.is_empty());
    }

    #[test]
    fn test_overwrite_retires_old_value_once() {
        let tree: Masstree<u64> = Masstree::new();
        let mut gc = tree.gc();

        let mut k = key(b"key");
        tree.put(&mut k, 1, &mut gc);
        assert!(gc.is_empty());

        tree.put(&mut k, 2, &mut gc);
        assert_eq!(gc.len(), 1);
        assert_eq!(*tree.get(&mut k).unwrap(), 2);

        tree.put(&mut k, 3, &mut gc);
        assert_eq!(gc.len(), 2);
        assert_eq!(*tree.get(&mut k).unwrap(), 3);
    }

    #[test]
    fn test_reader_keeps_replaced_value() {
        let tree: Masstree<String> = Masstree::new();
        let mut gc = tree.gc();
        let mut k = key(b"k");

        tree.put(&mut k, "old".to_string(), &mut gc);
        let held: Arc<String> = tree.get(&mut k).unwrap();

        tree.put(&mut k, "new".to_string(), &mut gc);
        gc.run();

        assert_eq!(held.as_str(), "old");
        assert_eq!(tree.get(&mut k).unwrap().as_str(), "new");
    }

    #[test]
    fn test_long_key_uses_suffix_then_layer() {
        let tree: Masstree<u64> = Masstree::new();
        let mut gc = tree.gc();

        let mut k1 = key(b"prefix00-first");
        tree.put(&mut k1, 1, &mut gc);

        let NodeRef::Border(root) = root_ref(&tree) else {
            panic!("root should be a border");
        };
        assert_eq!(root.key_len(0), HAS_SUFFIX);

        let mut k2 = key(b"prefix00-second");
        tree.put(&mut k2, 2, &mut gc);

        // Both keys share the first slice: one layer slot, no suffix.
        assert_eq!(root.number_of_keys(), 1);
        let slot: usize = root.permutation().key_index(0);
        assert_eq!(root.key_len(slot), LAYER);

        assert_eq!(*tree.get(&mut k1).unwrap(), 1);
        assert_eq!(*tree.get(&mut k2).unwrap(), 2);
        assert!(tree.get(&mut key(b"prefix00")).is_none());
        assert!(tree.get(&mut key(b"prefix00-thi")).is_none());
        assert_eq!(tree.stats().layers, 2);
    }

    #[test]
    fn test_exact_prefix_and_longer_key_coexist() {
        let tree: Masstree<u64> = Masstree::new();
        let mut gc = tree.gc();

        tree.put(&mut key(b"abcdefgh"), 1, &mut gc);
        tree.put(&mut key(b"abcdefghi"), 2, &mut gc);
        tree.put(&mut key(b"abcdefghij"), 3, &mut gc);

        assert_eq!(*tree.get(&mut key(b"abcdefgh")).unwrap(), 1);
        assert_eq!(*tree.get(&mut key(b"abcdefghi")).unwrap(), 2);
        assert_eq!(*tree.get(&mut key(b"abcdefghij")).unwrap(), 3);
    }

    #[test]
    fn test_sixteenth_key_splits_root_border() {
        let tree: Masstree<u64> = Masstree::new();
        let mut gc = tree.gc();

        for i in 0..MAX_WIDTH as u64 {
            tree.put(&mut key(&i.to_be_bytes()), i, &mut gc);
        }
        assert!(matches!(root_ref(&tree), NodeRef::Border(_)));

        tree.put(&mut key(&(MAX_WIDTH as u64).to_be_bytes()), 99, &mut gc);

        let NodeRef::Interior(root) = root_ref(&tree) else {
            panic!("root should have grown");
        };
        assert_eq!(root.num_keys(), 1);
        assert!(root.version().is_root());

        // SAFETY: single-threaded test; children are live.
        let (left, right) = unsafe {
            match (
                NodeRef::from_raw(root.child(0)),
                NodeRef::from_raw(root.child(1)),
            ) {
                (NodeRef::Border(l), NodeRef::Border(r)) => (l, r),
                _ => panic!("children should be borders"),
            }
        };

        assert!(!left.version().is_root());
        assert_eq!(left.next(), StdPtr::from_ref(right).cast_mut());
        assert_eq!(right.lowest_key(), Some(root.key_slice(0)));
        assert_eq!(right.low_fence(), root.key_slice(0));
        assert_eq!(left.number_of_keys() + right.number_of_keys(), MAX_WIDTH + 1);

        for i in 0..MAX_WIDTH as u64 {
            assert_eq!(*tree.get(&mut key(&i.to_be_bytes())).unwrap(), i);
        }
        assert_eq!(*tree.get(&mut key(&(MAX_WIDTH as u64).to_be_bytes())).unwrap(), 99);
    }

    #[test]
    fn test_interior_split_grows_height() {
        let tree: Masstree<u64> = Masstree::new();
        let mut gc = tree.gc();

        for i in 0..2_000_u64 {
            tree.put(&mut key(&i.to_be_bytes()), i, &mut gc);
        }

        let stats = tree.stats();
        assert_eq!(stats.keys, 2_000);
        assert!(stats.max_height >= 3);
        assert_eq!(stats.empty_borders, 0);

        let NodeRef::Interior(root) = root_ref(&tree) else {
            panic!("root should be interior");
        };
        // SAFETY: single-threaded test.
        let first: NodeRef<'_, u64> = unsafe { NodeRef::from_raw(root.child(0)) };
        assert!(matches!(first, NodeRef::Interior(_)));
        assert_eq!(first.header().parent(), StdPtr::from_ref(root).cast_mut());

        for i in (0..2_000_u64).step_by(7) {
            assert_eq!(*tree.get(&mut key(&i.to_be_bytes())).unwrap(), i);
        }
    }

    #[test]
    fn test_remove_to_empty_and_reuse() {
        let tree: Masstree<u64> = Masstree::new();
        let mut gc = tree.gc();

        for i in 0..100_u64 {
            tree.put(&mut key(&i.to_be_bytes()), i, &mut gc);
        }
        for i in 0..100_u64 {
            tree.remove(&mut key(&i.to_be_bytes()), &mut gc);
            assert!(tree.get(&mut key(&i.to_be_bytes())).is_none());
        }

        assert!(tree.is_empty());
        assert!(tree.load_root().is_null());

        tree.put(&mut key(b"again"), 5, &mut gc);
        assert_eq!(*tree.get(&mut key(b"again")).unwrap(), 5);
    }

    #[test]
    fn test_remove_collapses_interior_root() {
        let tree: Masstree<u64> = Masstree::new();
        let mut gc = tree.gc();

        for i in 0..16_u64 {
            tree.put(&mut key(&i.to_be_bytes()), i, &mut gc);
        }
        assert!(matches!(root_ref(&tree), NodeRef::Interior(_)));

        // Empty the right border; its sibling is pulled up as the root.
        for i in 8..16_u64 {
            tree.remove(&mut key(&i.to_be_bytes()), &mut gc);
        }

        let NodeRef::Border(root) = root_ref(&tree) else {
            panic!("root should be a border again");
        };
        assert!(root.version().is_root());
        assert!(root.header().parent().is_null());
        assert_eq!(root.number_of_keys(), 8);
        assert_eq!(tree.stats().interior_nodes, 0);
    }

    #[test]
    fn test_layer_collapse_after_removal() {
        let tree: Masstree<u64> = Masstree::new();
        let mut gc = tree.gc();

        let mut k1 = key(b"samepref-a");
        let mut k2 = key(b"samepref-b");
        tree.put(&mut k1, 1, &mut gc);
        tree.put(&mut k2, 2, &mut gc);
        assert_eq!(tree.stats().layers, 2);

        tree.remove(&mut k1, &mut gc);
        assert_eq!(tree.stats().layers, 1);
        assert!(tree.get(&mut k1).is_none());
        assert_eq!(*tree.get(&mut k2).unwrap(), 2);

        let NodeRef::Border(root) = root_ref(&tree) else {
            panic!("root should be a border");
        };
        let slot: usize = root.permutation().key_index(0);
        assert_eq!(root.key_len(slot), HAS_SUFFIX);

        tree.remove(&mut k2, &mut gc);
        assert!(tree.is_empty());
    }

    #[test]
    fn test_deep_layers_collapse_in_cascade() {
        let tree: Masstree<u64> = Masstree::new();
        let mut gc = tree.gc();

        let mut k1 = key(b"aaaaaaaabbbbbbbbcccccccc-1");
        let mut k2 = key(b"aaaaaaaabbbbbbbbcccccccc-2");
        tree.put(&mut k1, 1, &mut gc);
        tree.put(&mut k2, 2, &mut gc);
        assert_eq!(tree.stats().layers, 4);

        tree.remove(&mut k2, &mut gc);
        assert_eq!(tree.stats().layers, 1);
        assert_eq!(*tree.get(&mut k1).unwrap(), 1);

        tree.remove(&mut k1, &mut gc);
        assert!(tree.is_empty());
    }

    #[test]
    fn test_mixed_workload_matches_btreemap() {
        let tree: Masstree<u64> = Masstree::new();
        let mut gc = tree.gc();
        let mut oracle: BTreeMap<Vec<u8>, u64> = BTreeMap::new();

        let mut state: u64 = 0x9e37_79b9_7f4a_7c15;
        for step in 0..5_000_u64 {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;

            let len: usize = (state % 20) as usize + 1;
            let bytes: Vec<u8> = (0..len).map(|i| b"ab"[((state >> i) & 1) as usize]).collect();

            if state % 3 == 0 {
                tree.remove(&mut key(&bytes), &mut gc);
                oracle.remove(&bytes);
            } else {
                tree.put(&mut key(&bytes), step, &mut gc);
                oracle.insert(bytes, step);
            }
        }

        for (bytes, value) in &oracle {
            assert_eq!(tree.get(&mut key(bytes)).as_deref(), Some(value));
        }
        assert_eq!(tree.stats().keys, oracle.len());

        for bytes in oracle.keys() {
            tree.remove(&mut key(bytes), &mut gc);
        }
        assert!(tree.is_empty());
    }

    #[test]
    fn test_byte_conveniences_reject_empty_key() {
        let tree: Masstree<u64> = Masstree::new();
        assert_eq!(tree.put_bytes(b"", 1), Err(KeyError::Empty));
        assert_eq!(tree.get_bytes(b""), Err(KeyError::Empty));
        assert_eq!(tree.remove_bytes(b""), Err(KeyError::Empty));

        tree.put_bytes(b"x", 1).unwrap();
        assert_eq!(tree.get_bytes(b"x").unwrap().as_deref(), Some(&1));
        tree.remove_bytes(b"x").unwrap();
        assert!(tree.get_bytes(b"x").unwrap().is_none());
    }

    #[test]
    fn test_drop_frees_values() {
        let probe: Arc<u64> = Arc::new(0);

        {
            let tree: Masstree<Arc<u64>> = Masstree::new();
            let mut gc = tree.gc();
            for i in 0..300_u64 {
                let bytes: Vec<u8> = format!("key-{i:08}-tail").into_bytes();
                tree.put(&mut key(&bytes), Arc::clone(&probe), &mut gc);
            }
            assert_eq!(Arc::strong_count(&probe), 301);
        }

        assert_eq!(Arc::strong_count(&probe), 1);
    }

    #[test]
    fn test_lock_border_follows_split() {
        let tree: Masstree<u64> = Masstree::new();
        let mut gc = tree.gc();
        for i in 0..16_u64 {
            tree.put(&mut key(&i.to_be_bytes()), i, &mut gc);
        }

        let NodeRef::Interior(root) = root_ref(&tree) else {
            panic!("root should be interior");
        };
        let left: NodePtr<u64> = root.child(0);
        let target: KeySlice = 15;

        // Starting from the stale left border still lands on the owner.
        let _guard = tree.collector().enter();
        // SAFETY: the guard keeps the nodes alive.
        match unsafe { lock_border::<u64>(left, target) } {
            LockedBorder::Locked(node, _lock) => {
                assert!(node.low_fence() <= target);
                assert!(node.next().is_null());
            }
            LockedBorder::Vanished => panic!("layer should exist"),
        }
    }
}
