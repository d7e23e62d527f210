//! Filepath: src/tree/split.rs
//!
//! Border and interior splits.
//!
//! A full border is split while its lock is held: the sixteen entries
//! (fifteen stored plus the incoming one) are laid out in sorted order and
//! cut at a slice boundary, the upper part moves to a fresh right sibling,
//! and the sibling is linked into the chain. The separator then climbs
//! hand over hand: the left node stays locked while its parent is locked,
//! and a full parent splits the same way before the climb continues.
//!
//! # Locks held at each step
//!
//! ```text
//! left, right           split done, separator not yet installed
//! left, right, parent   installing; parent may itself split into parent'
//! parent, parent'       next iteration (left/right released)
//! ```

use crate::border::{BorderNode, SlotEntry};
use crate::interior::InteriorNode;
use crate::key::KeySlice;
use crate::node::{NodePtr, NodeRef};
use crate::nodeversion::LockGuard;
use crate::permuter::MAX_WIDTH;
use crate::tracing_helpers::{debug_log, trace_log};

use super::{LayerLink, Masstree};

/// Entries kept on the left when every slice is distinct.
const SPLIT_MIDDLE: usize = (MAX_WIDTH + 1) / 2;

/// Cut position for `entries` (sorted): the boundary between two distinct
/// slices closest to the middle. Equal slices never straddle two nodes.
pub(super) fn split_point(entries: &[SlotEntry]) -> usize {
    debug_assert!(entries.len() > 1, "split_point: nothing to split");

    (1..entries.len())
        .filter(|&cut| entries[cut - 1].slice != entries[cut].slice)
        .min_by_key(|&cut| cut.abs_diff(SPLIT_MIDDLE))
        .unwrap_or(SPLIT_MIDDLE)
}

impl<V> Masstree<V> {
    /// Split the full border `node` while inserting `entry`, then install
    /// the new sibling in the layer above the border level.
    ///
    /// # Safety
    /// `lock` is `node`'s lock; the caller is inside a guard that outlives
    /// `'a`.
    pub(super) unsafe fn split_and_insert<'a>(
        &self,
        node: &'a BorderNode<V>,
        mut lock: LockGuard<'a>,
        entry: SlotEntry,
        link: LayerLink<V>,
    ) {
        lock.mark_split();

        let mut entries: Vec<SlotEntry> = node.sorted_entries();
        let pos: usize = entries.partition_point(|e| e.order() <= entry.order());
        entries.insert(pos, entry);

        let cut: usize = split_point(&entries);
        let separator: KeySlice = entries[cut].slice;

        // SAFETY: freshly allocated, published below through the chain and
        // the parent.
        let right: &'a BorderNode<V> = unsafe { &*Box::into_raw(BorderNode::new_boxed()) };
        let right_lock: LockGuard<'a> = right.version().lock();

        right.write_sorted(&entries[cut..]);
        right.header().set_parent(node.header().parent());
        node.write_sorted(&entries[..cut]);
        node.link_split_sibling(right, separator);

        debug_log!(
            left = ?node.as_node_ptr(),
            right = ?right.as_node_ptr(),
            separator = %format_args!("{separator:016x}"),
            left_keys = cut,
            right_keys = entries.len() - cut,
            "border split"
        );

        // SAFETY: forwarded from the caller.
        unsafe {
            self.insert_into_parent(
                NodeRef::Border(node),
                lock,
                NodeRef::Border(right),
                right_lock,
                separator,
                link,
            );
        }
    }

    /// Install `right` next to `left` under `separator`, climbing while
    /// parents split.
    ///
    /// # Safety
    /// Both locks are held by this thread; the caller is inside a guard
    /// that outlives `'a`.
    unsafe fn insert_into_parent<'a>(
        &self,
        mut left: NodeRef<'a, V>,
        mut left_lock: LockGuard<'a>,
        mut right: NodeRef<'a, V>,
        mut right_lock: LockGuard<'a>,
        mut separator: KeySlice,
        link: LayerLink<V>,
    ) {
        loop {
            if left.version().is_root() {
                self.grow_root(left, &mut left_lock, right, separator, link);
                return;
            }

            // SAFETY: forwarded from the caller.
            let Some((parent, mut parent_lock)) = (unsafe { left.header().locked_parent() }) else {
                // Became a root through a pull-up; re-check.
                continue;
            };

            let Some(index) = parent.find_child_index(left.as_ptr()) else {
                debug_assert!(false, "parent does not list its child");
                drop(parent_lock);
                continue;
            };

            if parent.is_not_full() {
                parent_lock.mark_insert();
                parent.insert_child_at(index, separator, right.as_ptr());
                right.header().set_parent(std::ptr::from_ref(parent).cast_mut());

                trace_log!(parent = ?parent.as_node_ptr(), index, "separator installed");
                return;
            }

            parent_lock.mark_split();

            // SAFETY: freshly allocated, published through the grandparent.
            let sibling: &'a InteriorNode<V> = unsafe { &*Box::into_raw(InteriorNode::new_boxed()) };
            let sibling_lock: LockGuard<'a> = sibling.version().lock();
            sibling.header().set_parent(parent.header().parent());

            // Default home; the split redirects it if it lands on the right.
            right.header().set_parent(std::ptr::from_ref(parent).cast_mut());
            let up: KeySlice = parent.split_into(sibling, index, separator, right.as_ptr());

            debug_log!(
                left = ?parent.as_node_ptr(),
                right = ?sibling.as_node_ptr(),
                separator = %format_args!("{up:016x}"),
                "interior split"
            );

            drop(right_lock);
            drop(left_lock);

            left = NodeRef::Interior(parent);
            left_lock = parent_lock;
            right = NodeRef::Interior(sibling);
            right_lock = sibling_lock;
            separator = up;
        }
    }

    /// Put a new interior root above `left` and `right`.
    fn grow_root(
        &self,
        left: NodeRef<'_, V>,
        left_lock: &mut LockGuard<'_>,
        right: NodeRef<'_, V>,
        separator: KeySlice,
        link: LayerLink<V>,
    ) {
        let root: *mut InteriorNode<V> =
            Box::into_raw(InteriorNode::new_root_boxed(left.as_ptr(), separator, right.as_ptr()));

        left.header().set_parent(root);
        right.header().set_parent(root);

        // SAFETY: just allocated; published only by the call below.
        let root_node: NodePtr<V> = unsafe { (*root).as_node_ptr() };
        self.publish_root(link, left.as_ptr(), root_node);
        left_lock.mark_nonroot();

        debug_log!(root = ?root_node, top = link.is_top(), "new layer root");
    }
}
