//! Filepath: src/tree/put.rs
//!
//! Insert and overwrite.
//!
//! A put locks the owning border before acting. Overwrites swap the value
//! pointer in place; new keys go into a free slot published through the
//! permutation, or trigger a split when the node is full. A key whose slice
//! collides with a longer stored key pushes both into a new layer.

use std::sync::Arc;

use crate::border::{BorderNode, Extracted, HAS_SUFFIX, SlotEntry, into_value_ptr};
use crate::gc::GarbageCollector;
use crate::key::{Key, KeySlice};
use crate::node::NodePtr;
use crate::nodeversion::LockGuard;
use crate::ordering::WRITE_ORD;
use crate::permuter::Permuter;
use crate::tracing_helpers::{debug_log, trace_log};

use super::{LayerLink, LockedBorder, Masstree, lock_border};

/// Outcome of a put inside one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum PutResult {
    /// The key is installed.
    Done,

    /// The layer vanished; restart from the top.
    Retry,
}

impl<V> Masstree<V> {
    /// Put body. The caller holds a guard for the whole call.
    pub(super) fn put_in_guard(
        &self,
        key: &mut Key,
        value: &Arc<V>,
        gc: &mut GarbageCollector<'_, V>,
    ) {
        loop {
            key.reset();

            let root: NodePtr<V> = self.load_root();
            if root.is_null() {
                if self.start_new_tree(key, value) {
                    return;
                }
                continue;
            }

            match self.put_in_layer(root, LayerLink::Top, key, value, gc) {
                PutResult::Done => return,
                PutResult::Retry => {
                    trace_log!("put retry from the top");
                }
            }
        }
    }

    /// Install a single-key root into an empty tree. Returns `false` when
    /// another thread got there first.
    fn start_new_tree(&self, key: &Key, value: &Arc<V>) -> bool {
        let _root_guard = self.root_lock.lock();
        if !self.load_root().is_null() {
            return false;
        }

        let entry: SlotEntry = SlotEntry::from_key(key, into_value_ptr(Arc::clone(value)));
        let root: *mut BorderNode<V> = Box::into_raw(BorderNode::new_root_boxed(&entry));
        self.root.store(root.cast(), WRITE_ORD);

        debug_log!(root = ?root, "started new tree");
        true
    }

    /// Put `key` (at its current cursor) into the layer rooted at `root`.
    pub(super) fn put_in_layer(
        &self,
        root: NodePtr<V>,
        link: LayerLink<V>,
        key: &mut Key,
        value: &Arc<V>,
        gc: &mut GarbageCollector<'_, V>,
    ) -> PutResult {
        let slice: KeySlice = key.current_slice().slice;

        // SAFETY: root is non-null and the caller holds a guard.
        let (node, mut lock) = match unsafe { lock_border::<V>(root, slice) } {
            LockedBorder::Locked(node, lock) => (node, lock),
            LockedBorder::Vanished => return PutResult::Retry,
        };

        match node.extract_link_or_value(key) {
            Extracted::Value { slot, ptr } => {
                lock.mark_insert();
                node.set_lv(slot, into_value_ptr(Arc::clone(value)));
                drop(lock);

                gc.add_value(ptr);
                return PutResult::Done;
            }

            Extracted::Layer { root: lower, .. } => {
                drop(lock);
                key.next();
                return self.put_in_layer(lower, LayerLink::upper(node, slice), key, value, gc);
            }

            // Slots are never unstable outside their writer's lock.
            Extracted::Unstable => {
                debug_assert!(false, "unstable slot under lock");
                return PutResult::Retry;
            }

            Extracted::NotFound => {}
        }

        let perm: Permuter = node.permutation();

        let long_slot: Option<usize> = if key.has_next() {
            node.long_slot(&perm, slice)
        } else {
            None
        };

        if let Some(slot) = long_slot {
            debug_assert_eq!(node.key_len(slot), HAS_SUFFIX, "layer slot not extracted");

            let lower: NodePtr<V> = self.make_new_layer(node, &mut lock, slot, gc);
            drop(lock);

            key.next();
            return self.put_in_layer(lower, LayerLink::upper(node, slice), key, value, gc);
        }

        let entry: SlotEntry = SlotEntry::from_key(key, into_value_ptr(Arc::clone(value)));

        match node.insert_point(&perm) {
            Some((slot, reused)) => insert_entry(node, &mut lock, perm, slot, reused, &entry),

            None => {
                // SAFETY: node is locked and the caller holds a guard.
                unsafe { self.split_and_insert(node, lock, entry, link) };
            }
        }

        PutResult::Done
    }
}

/// Write `entry` into a free slot and publish it. Caller holds the lock.
fn insert_entry<V>(
    node: &BorderNode<V>,
    lock: &mut LockGuard<'_>,
    mut perm: Permuter,
    slot: usize,
    reused: bool,
    entry: &SlotEntry,
) {
    let pos: usize = node.insert_position(&perm, entry.order());

    if reused {
        lock.mark_insert();
    }

    node.write_slot(slot, entry);
    perm.insert(pos, slot);
    node.set_permutation(perm);
}
