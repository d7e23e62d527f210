//! Filepath: src/tree/layer.rs
//!
//! Layer boundaries: root publication, layer creation and layer collapse.
//!
//! Every layer root is named by exactly one cell: the tree's root pointer
//! for the top layer, or a `LAYER` slot in the layer above. A root is only
//! replaced by the thread holding its lock, and the owning cell is updated
//! before the old root is marked non-root or deleted, so a reader that
//! meets a stale root either climbs to the new one or restarts.

use std::ptr as StdPtr;

use crate::border::{BorderNode, HAS_SUFFIX, LAYER, SlotEntry, UNSTABLE, is_value_tag};
use crate::gc::GarbageCollector;
use crate::key::KeySlice;
use crate::node::{NodePtr, NodeRef, climb_to_root};
use crate::nodeversion::LockGuard;
use crate::ordering::WRITE_ORD;
use crate::permuter::Permuter;
use crate::suffix::BigSuffix;
use crate::tracing_helpers::{debug_log, trace_log};

use super::remove::RemoveResult;
use super::{LayerLink, Masstree};

/// Lock the border holding the `LAYER` slot for `slice` that points at
/// `root`, starting at `border` and walking right, and run `f` on it.
///
/// Returns `None` if no such slot exists.
///
/// # Safety
/// The caller holds `root`'s lock (which pins the slot) and is inside a
/// guard that keeps `border` and its right siblings allocated.
unsafe fn with_layer_slot<V, R>(
    border: *const BorderNode<V>,
    slice: KeySlice,
    root: NodePtr<V>,
    f: impl FnOnce(&BorderNode<V>, &mut LockGuard<'_>, usize) -> R,
) -> Option<R> {
    // SAFETY: guaranteed by the caller.
    let mut node: &BorderNode<V> = unsafe { &*border };

    loop {
        let mut lock: LockGuard<'_> = node.version().lock();
        let perm: Permuter = node.permutation();

        let found: Option<usize> = perm
            .iter()
            .find(|&slot| node.key_slice(slot) == slice && node.key_len(slot) == LAYER);

        if let Some(slot) = found {
            debug_assert_eq!(node.lv(slot).cast(), root, "layer slot names another root");
            return Some(f(node, &mut lock, slot));
        }

        let next: *mut BorderNode<V> = node.next();
        drop(lock);

        // SAFETY: siblings are retired through the collector.
        node = unsafe { next.as_ref() }?;
    }
}

impl<V> Masstree<V> {
    /// Point the cell named by `link` at `new` instead of `old`.
    ///
    /// The caller holds `old`'s lock. `new` may be null only for the top
    /// layer (the tree became empty).
    pub(super) fn publish_root(&self, link: LayerLink<V>, old: NodePtr<V>, new: NodePtr<V>) {
        match link {
            LayerLink::Top => {
                let _root_guard = self.root_lock.lock();
                debug_assert_eq!(self.load_root(), old, "publish_root: top root moved");
                self.root.store(new, WRITE_ORD);
            }

            LayerLink::Upper { border, slice } => {
                debug_assert!(!new.is_null(), "publish_root: inner layers never go empty here");

                // SAFETY: the caller holds old's lock; we are inside its guard.
                let published = unsafe {
                    with_layer_slot(border, slice, old, |upper, _lock, slot| {
                        upper.set_lv(slot, new.cast());
                    })
                };
                debug_assert!(published.is_some(), "publish_root: layer slot not found");
            }
        }

        trace_log!(old = ?old, new = ?new, top = link.is_top(), "root published");
    }

    /// Replace the long key in `slot` of `node` with a new layer holding it.
    ///
    /// The stored key moves down one slice: its suffix head becomes the
    /// slice in the new layer, and the rest of the suffix (if any) stays
    /// attached to it. Returns the new layer root. Caller holds `node`.
    pub(super) fn make_new_layer(
        &self,
        node: &BorderNode<V>,
        lock: &mut LockGuard<'_>,
        slot: usize,
        gc: &mut GarbageCollector<'_, V>,
    ) -> NodePtr<V> {
        let old_suffix: *mut BigSuffix = node.suffixes().get(slot);

        // SAFETY: a live HAS_SUFFIX slot owns a non-null suffix, and we hold
        // the node lock.
        let suffix: &BigSuffix = unsafe { &*old_suffix };
        let head = suffix.current_slice();

        let entry: SlotEntry = if suffix.has_next() {
            let mut rest: BigSuffix = suffix.duplicate();
            rest.next();

            SlotEntry {
                slice: head.slice,
                tag: HAS_SUFFIX,
                lv: node.lv(slot),
                suffix: Box::into_raw(Box::new(rest)),
            }
        } else {
            SlotEntry {
                slice: head.slice,
                tag: head.size,
                lv: node.lv(slot),
                suffix: StdPtr::null_mut(),
            }
        };

        let lower: *mut BorderNode<V> = Box::into_raw(BorderNode::new_root_boxed(&entry));

        lock.mark_insert();
        node.set_key_len(slot, UNSTABLE);
        node.set_lv(slot, lower.cast());
        node.suffixes().set(slot, StdPtr::null_mut());
        node.set_key_len(slot, LAYER);

        gc.add_suffix(old_suffix);

        debug_log!(
            border = ?node.as_node_ptr(),
            slot,
            layer = ?lower,
            "layer created"
        );

        lower.cast()
    }

    /// Move the only key of the layer root `node` into the `LAYER` slot
    /// that owns the layer, as a suffixed value, and delete `node`.
    ///
    /// The folded suffix is the key's slice in this layer followed by its
    /// own suffix, if it had one.
    pub(super) fn fold_into_upper(
        &self,
        node: &BorderNode<V>,
        mut lock: LockGuard<'_>,
        slot: usize,
        link: LayerLink<V>,
        gc: &mut GarbageCollector<'_, V>,
    ) {
        let LayerLink::Upper { border, slice } = link else {
            debug_assert!(false, "fold_into_upper: top layer has nothing above");
            return;
        };

        let entry: SlotEntry = node.entry(slot);
        debug_assert!(is_value_tag(entry.tag), "fold_into_upper: slot holds no value");

        let folded: BigSuffix = if entry.tag == HAS_SUFFIX {
            // SAFETY: live suffix of a locked node.
            let mut suffix: BigSuffix = unsafe { &*entry.suffix }.duplicate();
            suffix.insert_top(entry.slice);
            suffix
        } else {
            BigSuffix::from_parts(vec![entry.slice], usize::from(entry.tag))
        };
        let folded: *mut BigSuffix = Box::into_raw(Box::new(folded));

        // Readers of this node wait until it is deleted.
        lock.mark_split();

        // SAFETY: we hold node's lock and run inside the caller's guard.
        let installed = unsafe {
            with_layer_slot(border, slice, node.as_node_ptr(), |upper, upper_lock, upper_slot| {
                upper_lock.mark_insert();
                upper.set_key_len(upper_slot, UNSTABLE);
                upper.suffixes().set(upper_slot, folded);
                upper.set_lv(upper_slot, entry.lv);
                upper.set_key_len(upper_slot, HAS_SUFFIX);
            })
        };
        debug_assert!(installed.is_some(), "fold_into_upper: layer slot not found");

        lock.mark_deleted();
        node.clear_permutation();
        drop(lock);

        if entry.tag == HAS_SUFFIX {
            gc.add_suffix(entry.suffix);
        }
        gc.add_border(node);

        debug_log!(layer = ?node.as_node_ptr(), "layer folded into the layer above");
    }

    /// Fold the layer owned by `link` if its root border holds a single
    /// plain key. `root` may be a stale root of that layer.
    pub(super) fn collapse_if_single(
        &self,
        root: NodePtr<V>,
        link: LayerLink<V>,
        gc: &mut GarbageCollector<'_, V>,
    ) -> RemoveResult {
        if link.is_top() {
            return RemoveResult::NotChange;
        }

        // SAFETY: root is non-null and the caller holds a guard.
        let Some((NodeRef::Border(node), _)) = (unsafe { climb_to_root::<V>(root) }) else {
            return RemoveResult::NotChange;
        };

        let lock: LockGuard<'_> = node.version().lock();
        if node.version().is_deleted() || !node.version().is_root() {
            return RemoveResult::NotChange;
        }

        let perm: Permuter = node.permutation();
        if perm.num_keys() != 1 {
            return RemoveResult::NotChange;
        }

        let slot: usize = perm.key_index(0);
        if !is_value_tag(node.key_len(slot)) {
            return RemoveResult::NotChange;
        }

        self.fold_into_upper(node, lock, slot, link, gc);
        RemoveResult::Collapsed
    }
}
