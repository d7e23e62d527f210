//! Filepath: src/tree/remove.rs
//!
//! Removal and structural shrinking.
//!
//! A removal unpublishes the slot from the permutation first and marks it
//! removed second; the value and suffix go to the caller's batch. What
//! follows depends on what is left:
//!
//! - an empty border is unlinked from its siblings and its parent, and an
//!   interior node left with a single child is replaced by that child;
//! - an empty layer root is deleted and its slot in the layer above is
//!   reaped on the way back up;
//! - a non-top layer root holding one plain key is folded back into the
//!   layer above as a suffixed key, which may cascade upward.

use std::ptr as StdPtr;

use crate::border::{BorderNode, Extracted, HAS_SUFFIX, LAYER, is_value_tag};
use crate::gc::GarbageCollector;
use crate::interior::InteriorNode;
use crate::key::{Key, KeySlice};
use crate::node::{NodePtr, NodeRef};
use crate::nodeversion::LockGuard;
use crate::permuter::Permuter;
use crate::tracing_helpers::{debug_log, error_log, trace_log};

use super::{LayerLink, LockedBorder, Masstree, lock_border};

/// What a removal inside one layer asks of the layer above.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum RemoveResult {
    /// Nothing.
    NotChange,

    /// The layer vanished; restart from the top.
    Retry,

    /// The key itself was folded into the layer above; remove it there.
    LayerDeleted,

    /// After the removal the layer's last plain key was folded up; the
    /// layer above may now be foldable too.
    Collapsed,

    /// The layer root emptied and was deleted; reap its slot above.
    LayerEmptied,
}

impl<V> Masstree<V> {
    /// Remove body. The caller holds a guard for the whole call.
    pub(super) fn remove_in_guard(&self, key: &mut Key, gc: &mut GarbageCollector<'_, V>) {
        loop {
            key.reset();

            let root: NodePtr<V> = self.load_root();
            if root.is_null() {
                return;
            }

            match self.remove_in_layer(root, LayerLink::Top, key, gc) {
                RemoveResult::Retry => {
                    trace_log!("remove retry from the top");
                }
                _ => return,
            }
        }
    }

    fn remove_in_layer(
        &self,
        root: NodePtr<V>,
        link: LayerLink<V>,
        key: &mut Key,
        gc: &mut GarbageCollector<'_, V>,
    ) -> RemoveResult {
        loop {
            let slice: KeySlice = key.current_slice().slice;

            // SAFETY: root is non-null and the caller holds a guard.
            let (node, lock) = match unsafe { lock_border::<V>(root, slice) } {
                LockedBorder::Locked(node, lock) => (node, lock),
                LockedBorder::Vanished => return RemoveResult::Retry,
            };

            match node.extract_link_or_value(key) {
                Extracted::NotFound => return RemoveResult::NotChange,

                Extracted::Unstable => {
                    debug_assert!(false, "unstable slot under lock");
                    return RemoveResult::Retry;
                }

                Extracted::Value { slot, .. } => {
                    if !link.is_top() && node.version().is_root() && node.number_of_keys() == 1 {
                        self.fold_into_upper(node, lock, slot, link, gc);
                        return RemoveResult::LayerDeleted;
                    }

                    return self.remove_slot(node, lock, slot, link, gc);
                }

                Extracted::Layer { slot, root: lower } => {
                    // SAFETY: layer roots are retired through the collector.
                    if unsafe { NodeRef::from_raw(lower) }.version().is_deleted() {
                        trace_log!(border = ?node.as_node_ptr(), slot, "reaping dead layer");
                        return self.remove_slot(node, lock, slot, link, gc);
                    }

                    drop(lock);
                    key.next();

                    match self.remove_in_layer(lower, LayerLink::upper(node, slice), key, gc) {
                        result @ (RemoveResult::NotChange | RemoveResult::Retry) => return result,

                        // Either the key now lives in this layer, or the
                        // slot points at a dead root; both are handled by
                        // a fresh pass over this layer.
                        RemoveResult::LayerDeleted | RemoveResult::LayerEmptied => key.back(),

                        RemoveResult::Collapsed => {
                            key.back();
                            return self.collapse_if_single(root, link, gc);
                        }
                    }
                }
            }
        }
    }

    /// Unpublish `slot` of the locked `node` and retire what it owned.
    fn remove_slot(
        &self,
        node: &BorderNode<V>,
        mut lock: LockGuard<'_>,
        slot: usize,
        link: LayerLink<V>,
        gc: &mut GarbageCollector<'_, V>,
    ) -> RemoveResult {
        let mut perm: Permuter = node.permutation();
        let Some(pos) = node.position_of(&perm, slot) else {
            debug_assert!(false, "remove_slot: slot not live");
            return RemoveResult::NotChange;
        };
        let tag: u8 = node.key_len(slot);

        lock.mark_insert();
        perm.remove_index(pos);
        node.set_permutation(perm);
        node.mark_key_removed(slot);

        if is_value_tag(tag) {
            gc.add_value(node.lv(slot));
        }
        if tag == HAS_SUFFIX {
            gc.add_suffix(node.suffixes().get(slot));
        }

        if perm.num_keys() == 0 {
            return self.remove_empty_border(node, lock, link, gc);
        }

        if !link.is_top() && perm.num_keys() == 1 && node.version().is_root() {
            let last: usize = perm.key_index(0);

            if node.key_len(last) != LAYER {
                self.fold_into_upper(node, lock, last, link, gc);
                return RemoveResult::Collapsed;
            }
        }

        RemoveResult::NotChange
    }

    /// Delete the locked, empty border `node`.
    fn remove_empty_border(
        &self,
        node: &BorderNode<V>,
        mut lock: LockGuard<'_>,
        link: LayerLink<V>,
        gc: &mut GarbageCollector<'_, V>,
    ) -> RemoveResult {
        lock.mark_split();

        if node.version().is_root() {
            return self.remove_empty_root(node, lock, link, gc);
        }

        node.connect_prev_and_next();

        loop {
            // SAFETY: the caller holds a guard.
            let Some((parent, mut parent_lock)) = (unsafe { node.header().locked_parent() }) else {
                // Pulled up to the root meanwhile.
                debug_assert!(node.version().is_root());
                return self.remove_empty_root(node, lock, link, gc);
            };

            let Some(index) = parent.find_child_index(node.as_node_ptr()) else {
                error_log!(border = ?node.as_node_ptr(), "parent does not list its child");
                debug_assert!(false, "parent does not list its child");
                drop(parent_lock);
                std::hint::spin_loop();
                continue;
            };

            if parent.num_keys() >= 2 {
                parent_lock.mark_insert();
                parent.remove_child_at(index);
                drop(parent_lock);
            } else {
                let sibling: NodePtr<V> = parent.child(1 - index);
                parent_lock.mark_split();

                // SAFETY: parent is locked and the caller holds a guard.
                unsafe { self.pull_up(parent, parent_lock, sibling, link) };
                gc.add_interior(parent);
            }

            break;
        }

        lock.mark_deleted();
        drop(lock);
        gc.add_border(node);

        debug_log!(border = ?node.as_node_ptr(), "empty border unlinked");
        RemoveResult::NotChange
    }

    /// Replace the one-separator interior `parent` with its remaining child
    /// `sibling`, then delete `parent`.
    ///
    /// # Safety
    /// `parent_lock` is `parent`'s lock, marked splitting; the caller is
    /// inside a guard.
    unsafe fn pull_up(
        &self,
        parent: &InteriorNode<V>,
        mut parent_lock: LockGuard<'_>,
        sibling: NodePtr<V>,
        link: LayerLink<V>,
    ) {
        let parent_ptr: NodePtr<V> = parent.as_node_ptr();

        // SAFETY: a child of a locked parent is live.
        let sibling_ref: NodeRef<'_, V> = unsafe { NodeRef::from_raw(sibling) };

        if parent.version().is_root() {
            // The owning cell moves first, so a root-bit holder is always
            // the published root.
            self.publish_root(link, parent_ptr, sibling);
            sibling_ref.version().mark_root();
            sibling_ref.header().set_parent(StdPtr::null_mut());

            debug_log!(root = ?sibling, top = link.is_top(), "interior root pulled down");
        } else {
            loop {
                // SAFETY: forwarded from the caller.
                let Some((grand, mut grand_lock)) = (unsafe { parent.header().locked_parent() }) else {
                    debug_assert!(false, "non-root interior without a parent");
                    std::hint::spin_loop();
                    continue;
                };

                grand_lock.mark_insert();
                let replaced: bool = grand.replace_child(parent_ptr, sibling);
                debug_assert!(replaced, "grandparent does not list the parent");
                sibling_ref.header().set_parent(StdPtr::from_ref(grand).cast_mut());
                break;
            }

            trace_log!(parent = ?parent_ptr, "single-child interior removed");
        }

        parent_lock.mark_deleted();
    }

    /// Delete the locked, empty layer root `node`.
    fn remove_empty_root(
        &self,
        node: &BorderNode<V>,
        mut lock: LockGuard<'_>,
        link: LayerLink<V>,
        gc: &mut GarbageCollector<'_, V>,
    ) -> RemoveResult {
        let result: RemoveResult = match link {
            LayerLink::Top => {
                self.publish_root(link, node.as_node_ptr(), StdPtr::null_mut());
                debug_log!("tree emptied");
                RemoveResult::NotChange
            }

            LayerLink::Upper { .. } => {
                debug_log!(layer = ?node.as_node_ptr(), "layer emptied");
                RemoveResult::LayerEmptied
            }
        };

        lock.mark_deleted();
        drop(lock);
        gc.add_border(node);
        result
    }
}
