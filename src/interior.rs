//! Filepath: src/interior.rs
//!
//! Interior (routing) node.
//!
//! Interior nodes hold only separator slices and child pointers. Keys are
//! kept in sorted physical order; writers shift them under the node lock
//! with the version marked dirty, and readers validate the version after
//! picking a child.
//!
//! # Routing Model
//!
//! ```text
//!         [K0 | K1 | K2]           <- 3 keys, 4 children
//!        /    |    |    \
//!    C0     C1    C2     C3
//!
//!    C0: slice < K0
//!    C1: K0 <= slice < K1
//!    C2: K1 <= slice < K2
//!    C3: slice >= K2
//! ```
//!
//! A separator equals the lowest slice of the right subtree, so a target
//! equal to a separator routes right.

use std::ptr as StdPtr;
use std::sync::atomic::{AtomicPtr, AtomicU8, AtomicU64};

use crate::key::KeySlice;
use crate::node::{NodeHeader, NodePtr};
use crate::nodeversion::NodeVersion;
use crate::ordering::{READ_ORD, RELAXED, WRITE_ORD};

/// Children per interior node.
pub const FANOUT: usize = 16;

/// Separator slices per interior node.
pub const MAX_KEYS: usize = FANOUT - 1;

/// Keys left behind in the old node when a full interior node splits.
/// The next key moves up, the rest go right.
const SPLIT_LEFT_KEYS: usize = 7;

/// A routing node: up to 15 separators and 16 children.
#[repr(C)]
#[derive(Debug)]
pub struct InteriorNode<V> {
    header: NodeHeader<V>,
    num_keys: AtomicU8,
    key_slice: [AtomicU64; MAX_KEYS],
    child: [AtomicPtr<NodeHeader<V>>; FANOUT],
}

impl<V> InteriorNode<V> {
    // ========================================================================
    //  Constructors
    // ========================================================================

    /// Create an empty, unlinked interior node.
    #[must_use]
    pub fn new_boxed() -> Box<Self> {
        Box::new(Self {
            header: NodeHeader::new(false),
            num_keys: AtomicU8::new(0),
            key_slice: std::array::from_fn(|_| AtomicU64::new(0)),
            child: std::array::from_fn(|_| AtomicPtr::new(StdPtr::null_mut())),
        })
    }

    /// A new layer root over two children split at `separator`.
    ///
    /// The children's parent pointers are not touched.
    #[must_use]
    pub fn new_root_boxed(left: NodePtr<V>, separator: KeySlice, right: NodePtr<V>) -> Box<Self> {
        let node: Box<Self> = Self::new_boxed();
        node.version().mark_root();
        node.set_child(0, left);
        node.set_key_slice(0, separator);
        node.set_child(1, right);
        node.set_num_keys(1);
        node
    }

    // ========================================================================
    //  Accessors
    // ========================================================================

    /// Common header.
    #[inline(always)]
    pub const fn header(&self) -> &NodeHeader<V> {
        &self.header
    }

    /// Version word.
    #[inline(always)]
    pub const fn version(&self) -> &NodeVersion {
        self.header.version()
    }

    /// Type-erased pointer to this node.
    #[inline(always)]
    pub fn as_node_ptr(&self) -> NodePtr<V> {
        StdPtr::from_ref(self).cast_mut().cast()
    }

    /// Number of separators; children are `num_keys() + 1`.
    #[inline(always)]
    pub fn num_keys(&self) -> usize {
        usize::from(self.num_keys.load(READ_ORD)).min(MAX_KEYS)
    }

    #[expect(clippy::cast_possible_truncation, reason = "n <= MAX_KEYS")]
    pub(crate) fn set_num_keys(&self, n: usize) {
        debug_assert!(n <= MAX_KEYS, "set_num_keys: {n} > {MAX_KEYS}");
        self.num_keys.store(n as u8, WRITE_ORD);
    }

    /// Room for one more separator.
    #[inline(always)]
    pub fn is_not_full(&self) -> bool {
        self.num_keys() < MAX_KEYS
    }

    /// Separator `i`.
    #[inline(always)]
    pub fn key_slice(&self, i: usize) -> KeySlice {
        self.key_slice[i].load(READ_ORD)
    }

    pub(crate) fn set_key_slice(&self, i: usize, slice: KeySlice) {
        self.key_slice[i].store(slice, WRITE_ORD);
    }

    /// Child `i`.
    #[inline(always)]
    pub fn child(&self, i: usize) -> NodePtr<V> {
        self.child[i].load(READ_ORD)
    }

    pub(crate) fn set_child(&self, i: usize, child: NodePtr<V>) {
        self.child[i].store(child, WRITE_ORD);
    }

    // ========================================================================
    //  Routing
    // ========================================================================

    /// Child for the first separator strictly greater than `slice`, or the
    /// last child.
    #[inline]
    pub fn find_child(&self, slice: KeySlice) -> NodePtr<V> {
        let n: usize = self.num_keys();

        for i in 0..n {
            if slice < self.key_slice(i) {
                return self.child(i);
            }
        }

        self.child(n)
    }

    /// Position of `child` in the child array.
    pub fn find_child_index(&self, child: NodePtr<V>) -> Option<usize> {
        (0..=self.num_keys()).find(|&i| StdPtr::eq(self.child(i), child))
    }

    // ========================================================================
    //  Mutation (caller holds the lock, version marked dirty)
    // ========================================================================

    /// Insert `slice` at key position `pos` and `child` right after it,
    /// shifting later keys and children right.
    pub(crate) fn insert_child_at(&self, pos: usize, slice: KeySlice, child: NodePtr<V>) {
        let n: usize = self.num_keys.load(RELAXED) as usize;
        debug_assert!(n < MAX_KEYS, "insert_child_at: node is full");
        debug_assert!(pos <= n, "insert_child_at: position out of bounds");

        for i in (pos..n).rev() {
            self.set_key_slice(i + 1, self.key_slice[i].load(RELAXED));
            self.set_child(i + 2, self.child[i + 1].load(RELAXED));
        }

        self.set_key_slice(pos, slice);
        self.set_child(pos + 1, child);
        self.set_num_keys(n + 1);
    }

    /// Remove child `index` and the separator that bounds it on the left
    /// (or the first separator when `index == 0`).
    pub(crate) fn remove_child_at(&self, index: usize) {
        let n: usize = self.num_keys.load(RELAXED) as usize;
        debug_assert!(n >= 1, "remove_child_at: no separator to drop");
        debug_assert!(index <= n, "remove_child_at: index out of bounds");

        let key_pos: usize = index.saturating_sub(1);

        for i in key_pos..n - 1 {
            self.set_key_slice(i, self.key_slice[i + 1].load(RELAXED));
        }
        for i in index..n {
            self.set_child(i, self.child[i + 1].load(RELAXED));
        }

        self.set_child(n, StdPtr::null_mut());
        self.set_num_keys(n - 1);
    }

    /// Swap `old` for `new` in the child array.
    pub(crate) fn replace_child(&self, old: NodePtr<V>, new: NodePtr<V>) -> bool {
        match self.find_child_index(old) {
            Some(i) => {
                self.set_child(i, new);
                true
            }

            None => false,
        }
    }

    /// Split a full node while inserting `(slice, child)` at key position
    /// `pos`.
    ///
    /// The sixteen keys are cut so that `self` keeps the first seven, the
    /// eighth moves up (returned), and `right` receives the last eight with
    /// their nine children. Every child that ends up in `right` has its
    /// parent pointer redirected.
    pub(crate) fn split_into(
        &self,
        right: &Self,
        pos: usize,
        slice: KeySlice,
        child: NodePtr<V>,
    ) -> KeySlice {
        debug_assert_eq!(self.num_keys(), MAX_KEYS, "split_into: node not full");
        debug_assert!(pos <= MAX_KEYS, "split_into: position out of bounds");

        let mut keys: [KeySlice; MAX_KEYS + 1] = [0; MAX_KEYS + 1];
        let mut children: [NodePtr<V>; FANOUT + 1] = [StdPtr::null_mut(); FANOUT + 1];

        children[0] = self.child(0);
        let mut src: usize = 0;
        for dst in 0..=MAX_KEYS {
            if dst == pos {
                keys[dst] = slice;
                children[dst + 1] = child;
            } else {
                keys[dst] = self.key_slice(src);
                children[dst + 1] = self.child(src + 1);
                src += 1;
            }
        }

        for (i, &key) in keys[..SPLIT_LEFT_KEYS].iter().enumerate() {
            self.set_key_slice(i, key);
        }
        for (i, &c) in children[..=SPLIT_LEFT_KEYS].iter().enumerate() {
            self.set_child(i, c);
        }
        for i in SPLIT_LEFT_KEYS + 1..FANOUT {
            self.set_child(i, StdPtr::null_mut());
        }
        self.set_num_keys(SPLIT_LEFT_KEYS);

        let right_ptr: *mut Self = StdPtr::from_ref(right).cast_mut();
        let right_keys: &[KeySlice] = &keys[SPLIT_LEFT_KEYS + 1..];
        for (i, &key) in right_keys.iter().enumerate() {
            right.set_key_slice(i, key);
        }
        for (i, &c) in children[SPLIT_LEFT_KEYS + 1..].iter().enumerate() {
            right.set_child(i, c);

            // SAFETY: every child is a live node; the caller holds this
            // node's lock, which serializes parent changes of its children.
            unsafe { (*c).set_parent(right_ptr) };
        }
        right.set_num_keys(right_keys.len());

        keys[SPLIT_LEFT_KEYS]
    }
}
