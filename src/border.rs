//! Filepath: src/border.rs
//!
//! Border (leaf) node.
//!
//! A border node stores up to 15 slots. Each slot holds an 8-byte key slice,
//! a length tag, and one pointer whose meaning depends on the tag: a value
//! (an `Arc<V>` turned raw) or the root of the next layer. Keys longer than
//! the current slice either carry a [`BigSuffix`] or live in a next layer.
//!
//! The [`Permuter`] gives logical order. Slots are written before they are
//! published through the permutation, so readers never see a half-written
//! slot through a fresh permutation; slot reuse bumps the insert counter
//! so readers holding an old permutation fail validation.
//!
//! # Slot Tags
//!
//! ```text
//! 0          never used
//! 1..=8      inline key, tag = bytes in this slice
//! 9          key continues in the slot's BigSuffix
//! 10..=18    removed (live tag + 9), slot reusable
//! 254        unstable: a layer is being installed, retry
//! 255        next-layer root
//! ```

use std::marker::PhantomData;
use std::ptr as StdPtr;
use std::sync::Arc;
use std::sync::atomic::{AtomicPtr, AtomicU8, AtomicU64};

use crate::key::{Key, KeySlice};
use crate::node::{NodeHeader, NodePtr};
use crate::nodeversion::NodeVersion;
use crate::ordering::{READ_ORD, RELAXED, WRITE_ORD};
use crate::permuter::{AtomicPermuter, MAX_WIDTH, Permuter};
use crate::suffix::{BigSuffix, KeySuffix};

/// Slot never written.
pub const EMPTY: u8 = 0;

/// Key continues in the slot's suffix.
pub const HAS_SUFFIX: u8 = 9;

/// Added to a live tag when its slot is removed.
pub const REMOVED_OFFSET: u8 = 9;

/// Layer installation in progress.
pub const UNSTABLE: u8 = 254;

/// Slot points at the root of the next layer.
pub const LAYER: u8 = 255;

/// Tag of a slot holding a value (inline or suffixed).
#[inline(always)]
pub const fn is_value_tag(tag: u8) -> bool {
    tag >= 1 && tag <= HAS_SUFFIX
}

/// Tag of a removed slot.
#[inline(always)]
pub const fn is_removed_tag(tag: u8) -> bool {
    tag > HAS_SUFFIX && tag <= HAS_SUFFIX + REMOVED_OFFSET
}

/// Ordering rank among entries with the same slice: inline keys by length,
/// then the single long entry.
#[inline(always)]
const fn rank(tag: u8) -> u8 {
    if tag <= 8 { tag } else { HAS_SUFFIX }
}

// ============================================================================
//  Value pointers
// ============================================================================

/// Hand an `Arc<V>` to a slot.
#[inline]
pub(crate) fn into_value_ptr<V>(value: Arc<V>) -> *mut u8 {
    Arc::into_raw(value).cast_mut().cast()
}

/// Clone the `Arc<V>` behind a slot pointer without taking the slot's
/// reference.
///
/// # Safety
/// `ptr` must come from [`into_value_ptr`] and the `Arc` must not have been
/// dropped yet (the caller is inside a reclamation guard).
#[inline]
pub(crate) unsafe fn clone_value<V>(ptr: *mut u8) -> Arc<V> {
    let ptr: *const V = ptr.cast_const().cast();

    // SAFETY: the slot still owns one strong count; we add our own.
    unsafe {
        Arc::increment_strong_count(ptr);
        Arc::from_raw(ptr)
    }
}

// ============================================================================
//  SlotEntry / Extracted
// ============================================================================

/// A slot's contents detached from any node, used while reshuffling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SlotEntry {
    pub(crate) slice: KeySlice,
    pub(crate) tag: u8,
    pub(crate) lv: *mut u8,
    pub(crate) suffix: *mut BigSuffix,
}

impl SlotEntry {
    /// Entry for `key` at its current cursor, owning `value`.
    ///
    /// A key that continues past this slice gets a fresh suffix.
    pub(crate) fn from_key(key: &Key, value: *mut u8) -> Self {
        let current = key.current_slice();

        if key.has_next() {
            let suffix: Box<BigSuffix> = Box::new(BigSuffix::from_key(key, key.cursor() + 1));

            Self {
                slice: current.slice,
                tag: HAS_SUFFIX,
                lv: value,
                suffix: Box::into_raw(suffix),
            }
        } else {
            Self {
                slice: current.slice,
                tag: current.size,
                lv: value,
                suffix: StdPtr::null_mut(),
            }
        }
    }

    /// Sort key inside a node.
    #[inline]
    pub(crate) const fn order(&self) -> (KeySlice, u8) {
        (self.slice, rank(self.tag))
    }
}

/// What a border node holds for a key at its current cursor.
#[derive(Debug)]
pub enum Extracted<V> {
    /// No slot matches.
    NotFound,

    /// The key's value.
    Value {
        /// Physical slot.
        slot: usize,
        /// Raw `Arc<V>` pointer.
        ptr: *mut u8,
    },

    /// The key continues in the next layer.
    Layer {
        /// Physical slot.
        slot: usize,
        /// Next-layer root.
        root: NodePtr<V>,
    },

    /// A layer is being installed in the matching slot.
    Unstable,
}

// ============================================================================
//  BorderNode
// ============================================================================

/// A leaf node: 15 slots, a permutation, and sibling links.
#[repr(C)]
#[derive(Debug)]
pub struct BorderNode<V> {
    header: NodeHeader<V>,
    permutation: AtomicPermuter,
    key_len: [AtomicU8; MAX_WIDTH],
    key_slice: [AtomicU64; MAX_WIDTH],
    lv: [AtomicPtr<u8>; MAX_WIDTH],
    suffix: KeySuffix,
    low_fence: AtomicU64,
    next: AtomicPtr<BorderNode<V>>,
    prev: AtomicPtr<BorderNode<V>>,
    _marker: PhantomData<Arc<V>>,
}

impl<V> BorderNode<V> {
    /// Create an empty, unlinked border node.
    #[must_use]
    pub fn new_boxed() -> Box<Self> {
        Box::new(Self {
            header: NodeHeader::new(true),
            permutation: AtomicPermuter::new(Permuter::empty()),
            key_len: std::array::from_fn(|_| AtomicU8::new(EMPTY)),
            key_slice: std::array::from_fn(|_| AtomicU64::new(0)),
            lv: std::array::from_fn(|_| AtomicPtr::new(StdPtr::null_mut())),
            suffix: KeySuffix::new(),
            low_fence: AtomicU64::new(0),
            next: AtomicPtr::new(StdPtr::null_mut()),
            prev: AtomicPtr::new(StdPtr::null_mut()),
            _marker: PhantomData,
        })
    }

    /// A layer root holding exactly `entry`.
    pub(crate) fn new_root_boxed(entry: &SlotEntry) -> Box<Self> {
        let node: Box<Self> = Self::new_boxed();
        node.version().mark_root();
        node.write_sorted(&[*entry]);
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

    /// Published permutation.
    #[inline(always)]
    pub fn permutation(&self) -> Permuter {
        self.permutation.load()
    }

    /// Publish a new permutation. Caller holds the lock.
    #[inline(always)]
    pub(crate) fn set_permutation(&self, p: Permuter) {
        self.permutation.store(p);
    }

    /// Live keys.
    #[inline]
    pub fn number_of_keys(&self) -> usize {
        self.permutation().num_keys()
    }

    /// Room for one more key.
    #[inline]
    pub fn is_not_full(&self) -> bool {
        self.permutation().is_not_full()
    }

    /// Length tag of `slot`.
    #[inline(always)]
    pub fn key_len(&self, slot: usize) -> u8 {
        self.key_len[slot].load(READ_ORD)
    }

    pub(crate) fn set_key_len(&self, slot: usize, tag: u8) {
        self.key_len[slot].store(tag, WRITE_ORD);
    }

    /// Key slice of `slot`.
    #[inline(always)]
    pub fn key_slice(&self, slot: usize) -> KeySlice {
        self.key_slice[slot].load(READ_ORD)
    }

    /// Value or layer pointer of `slot`.
    #[inline(always)]
    pub fn lv(&self, slot: usize) -> *mut u8 {
        self.lv[slot].load(READ_ORD)
    }

    pub(crate) fn set_lv(&self, slot: usize, ptr: *mut u8) {
        self.lv[slot].store(ptr, WRITE_ORD);
    }

    /// Suffix table.
    #[inline(always)]
    pub const fn suffixes(&self) -> &KeySuffix {
        &self.suffix
    }

    /// Smallest slice routed to this node when it was split off. Fixed for
    /// the node's lifetime; zero for the leftmost border of a layer.
    ///
    /// Walking right compares against the fence rather than the lowest live
    /// key, which removals can raise.
    #[inline(always)]
    pub fn low_fence(&self) -> KeySlice {
        self.low_fence.load(READ_ORD)
    }

    /// Right sibling.
    #[inline(always)]
    pub fn next(&self) -> *mut Self {
        self.next.load(READ_ORD)
    }

    /// Left sibling.
    #[inline(always)]
    pub fn prev(&self) -> *mut Self {
        self.prev.load(READ_ORD)
    }

    /// Detached copy of `slot`.
    pub(crate) fn entry(&self, slot: usize) -> SlotEntry {
        SlotEntry {
            slice: self.key_slice(slot),
            tag: self.key_len(slot),
            lv: self.lv(slot),
            suffix: self.suffix.get(slot),
        }
    }

    /// Slice of the first live key.
    pub fn lowest_key(&self) -> Option<KeySlice> {
        let perm: Permuter = self.permutation();

        (perm.num_keys() > 0).then(|| self.key_slice(perm.key_index(0)))
    }

    // ========================================================================
    //  Lookup
    // ========================================================================

    /// Classify what this node holds for `key` at its current cursor.
    ///
    /// Optimistic callers must validate the version before trusting the
    /// result; pointers in it may belong to a concurrent writer's state.
    pub fn extract_link_or_value(&self, key: &Key) -> Extracted<V> {
        let target = key.current_slice();
        let has_next: bool = key.has_next();
        let perm: Permuter = self.permutation();

        for slot in perm.iter() {
            if self.key_slice(slot) != target.slice {
                continue;
            }

            let tag: u8 = self.key_len(slot);

            if !has_next {
                if tag == target.size {
                    return Extracted::Value {
                        slot,
                        ptr: self.lv(slot),
                    };
                }
                continue;
            }

            match tag {
                HAS_SUFFIX => {
                    // SAFETY: suffixes are retired through the collector,
                    // and every caller runs inside a guard.
                    match unsafe { self.suffix.get_ref(slot) } {
                        Some(suffix) if suffix.is_same(key, key.cursor() + 1) => {
                            return Extracted::Value {
                                slot,
                                ptr: self.lv(slot),
                            };
                        }

                        Some(_) => {}

                        None => return Extracted::Unstable,
                    }
                }

                LAYER => {
                    return Extracted::Layer {
                        slot,
                        root: self.lv(slot).cast(),
                    };
                }

                UNSTABLE => return Extracted::Unstable,

                _ => {}
            }
        }

        Extracted::NotFound
    }

    /// Live slot holding a longer-than-slice key (suffix or layer) for
    /// `slice`. At most one exists.
    pub(crate) fn long_slot(&self, perm: &Permuter, slice: KeySlice) -> Option<usize> {
        perm.iter().find(|&slot| {
            self.key_slice(slot) == slice && matches!(self.key_len(slot), HAS_SUFFIX | LAYER)
        })
    }

    /// Logical position of the live slot with the given contents.
    pub(crate) fn position_of(&self, perm: &Permuter, slot: usize) -> Option<usize> {
        (0..perm.num_keys()).find(|&i| perm.key_index(i) == slot)
    }

    // ========================================================================
    //  Insertion helpers (caller holds the lock)
    // ========================================================================

    /// Logical position where an entry ordered by `order` belongs.
    pub(crate) fn insert_position(&self, perm: &Permuter, order: (KeySlice, u8)) -> usize {
        (0..perm.num_keys())
            .find(|&i| {
                let slot: usize = perm.key_index(i);
                (self.key_slice(slot), rank(self.key_len(slot))) > order
            })
            .unwrap_or(perm.num_keys())
    }

    /// A free physical slot. Never-used slots are preferred; otherwise a
    /// removed slot is handed out and the second field is `true`, telling
    /// the caller to bump the insert counter before reusing it.
    pub(crate) fn insert_point(&self, perm: &Permuter) -> Option<(usize, bool)> {
        let mut reusable: Option<usize> = None;

        for slot in 0..MAX_WIDTH {
            if perm.contains(slot) {
                continue;
            }

            if self.key_len(slot) == EMPTY {
                return Some((slot, false));
            }

            reusable.get_or_insert(slot);
        }

        reusable.map(|slot| (slot, true))
    }

    /// Write `entry` into a slot that is not in the published permutation.
    pub(crate) fn write_slot(&self, slot: usize, entry: &SlotEntry) {
        self.key_slice[slot].store(entry.slice, WRITE_ORD);
        self.suffix.set(slot, entry.suffix);
        self.set_lv(slot, entry.lv);
        self.set_key_len(slot, entry.tag);
    }

    /// Mark `slot` removed. Its pointers stay in place for concurrent
    /// readers; ownership moves to the caller's reclamation batch.
    pub(crate) fn mark_key_removed(&self, slot: usize) {
        let tag: u8 = match self.key_len(slot) {
            // A dead layer slot reads as a removed suffix slot.
            LAYER => HAS_SUFFIX + REMOVED_OFFSET,
            tag => tag + REMOVED_OFFSET,
        };

        debug_assert!(is_removed_tag(tag), "mark_key_removed: bad tag {tag}");
        self.set_key_len(slot, tag);
    }

    /// Live entries in logical order.
    pub(crate) fn sorted_entries(&self) -> Vec<SlotEntry> {
        self.permutation.load_locked().iter().map(|slot| self.entry(slot)).collect()
    }

    /// Lay `entries` out in slots `0..len` and publish the identity
    /// permutation. Remaining slots are reset to never-used.
    ///
    /// Caller holds the lock with the version marked splitting, or owns an
    /// unpublished node.
    pub(crate) fn write_sorted(&self, entries: &[SlotEntry]) {
        debug_assert!(entries.len() <= MAX_WIDTH, "write_sorted: too many entries");

        for (slot, entry) in entries.iter().enumerate() {
            self.write_slot(slot, entry);
        }

        for slot in entries.len()..MAX_WIDTH {
            self.set_key_len(slot, EMPTY);
            self.set_lv(slot, StdPtr::null_mut());
            self.suffix.set(slot, StdPtr::null_mut());
        }

        self.set_permutation(Permuter::from_sorted(entries.len()));
    }

    // ========================================================================
    //  Sibling chain
    // ========================================================================

    /// Link the freshly split `right` after `self`, fencing it at `fence`.
    /// Caller holds `self`.
    pub(crate) fn link_split_sibling(&self, right: &Self, fence: KeySlice) {
        right.low_fence.store(fence, WRITE_ORD);

        let self_ptr: *mut Self = StdPtr::from_ref(self).cast_mut();
        let right_ptr: *mut Self = StdPtr::from_ref(right).cast_mut();
        let next: *mut Self = self.next();

        right.next.store(next, WRITE_ORD);
        right.prev.store(self_ptr, WRITE_ORD);

        // SAFETY: siblings are retired through the collector; the caller
        // holds a guard. The right neighbor cannot unlink itself without
        // taking our lock.
        if let Some(next) = unsafe { next.as_ref() } {
            next.prev.store(right_ptr, WRITE_ORD);
        }

        self.next.store(right_ptr, WRITE_ORD);
    }

    /// Splice `self` out of the sibling chain ahead of its deletion.
    ///
    /// Caller holds `self`'s lock. The left sibling is locked second, after
    /// `self`, which is the border ordering used throughout the tree: no
    /// path locks a border while holding its left neighbor. The link is
    /// re-checked under both locks, since a concurrent split of the left
    /// sibling may have put a new node between the two.
    pub(crate) fn connect_prev_and_next(&self) {
        let self_ptr: *mut Self = StdPtr::from_ref(self).cast_mut();

        loop {
            let prev: *mut Self = self.prev();

            // SAFETY: as in link_split_sibling.
            let Some(prev_ref) = (unsafe { prev.as_ref() }) else {
                let next: *mut Self = self.next();

                // SAFETY: as above.
                if let Some(next) = unsafe { next.as_ref() } {
                    let _ = next.prev.compare_exchange(
                        self_ptr,
                        StdPtr::null_mut(),
                        WRITE_ORD,
                        RELAXED,
                    );
                }
                return;
            };

            let prev_lock = prev_ref.version().lock();
            if !StdPtr::eq(self.prev(), prev) {
                drop(prev_lock);
                continue;
            }

            let next: *mut Self = self.next();
            prev_ref.next.store(next, WRITE_ORD);

            // SAFETY: as above.
            if let Some(next) = unsafe { next.as_ref() } {
                next.prev.store(prev, WRITE_ORD);
            }

            drop(prev_lock);
            return;
        }
    }

    /// Forget every slot. Used after the node's last key was moved to
    /// another layer, so dropping the node frees nothing.
    pub(crate) fn clear_permutation(&self) {
        self.set_permutation(Permuter::empty());
    }
}

impl<V> Drop for BorderNode<V> {
    fn drop(&mut self) {
        let perm: Permuter = self.permutation.load_locked();

        for slot in perm.iter() {
            let tag: u8 = self.key_len(slot);

            if is_value_tag(tag) {
                let ptr: *mut u8 = self.lv(slot);
                if !ptr.is_null() {
                    // SAFETY: live value slots own one Arc strong count.
                    unsafe { drop(Arc::from_raw(ptr.cast_const().cast::<V>())) };
                }
            }

            if tag == HAS_SUFFIX {
                let suffix: *mut BigSuffix = self.suffix.take(slot);
                if !suffix.is_null() {
                    // SAFETY: live suffix entries come from Box::into_raw.
                    unsafe { drop(Box::from_raw(suffix)) };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![expect(clippy::unwrap_used, reason = "fail fast in tests")]

    use super::*;

    fn insert(node: &BorderNode<u64>, key: &Key, value: u64) {
        let entry: SlotEntry = SlotEntry::from_key(key, into_value_ptr(Arc::new(value)));
        let mut perm: Permuter = node.permutation.load_locked();
        let pos: usize = node.insert_position(&perm, entry.order());
        let (slot, _) = node.insert_point(&perm).unwrap();
        node.write_slot(slot, &entry);
        perm.insert(pos, slot);
        node.set_permutation(perm);
    }

    fn value_of(node: &BorderNode<u64>, key: &Key) -> Option<u64> {
        match node.extract_link_or_value(key) {
            // SAFETY: the node keeps the Arc alive.
            Extracted::Value { ptr, .. } => Some(*unsafe { clone_value::<u64>(ptr) }),
            _ => None,
        }
    }

    #[test]
    fn test_tag_classes() {
        assert!(is_value_tag(1));
        assert!(is_value_tag(HAS_SUFFIX));
        assert!(!is_value_tag(EMPTY));
        assert!(!is_value_tag(LAYER));
        assert!(is_removed_tag(10));
        assert!(is_removed_tag(18));
        assert!(!is_removed_tag(UNSTABLE));
    }

    #[test]
    fn test_extract_inline_lengths_coexist() {
        let node: Box<BorderNode<u64>> = BorderNode::new_boxed();
        let a = Key::new(b"a").unwrap();
        let a0 = Key::new(b"a\0").unwrap();
        insert(&node, &a, 1);
        insert(&node, &a0, 2);

        assert_eq!(value_of(&node, &a), Some(1));
        assert_eq!(value_of(&node, &a0), Some(2));
        assert_eq!(node.number_of_keys(), 2);

        // Shorter key sorts first among equal slices.
        assert_eq!(node.permutation().key_index(0), 0);
    }

    #[test]
    fn test_extract_suffix_match_and_mismatch() {
        let node: Box<BorderNode<u64>> = BorderNode::new_boxed();
        let long = Key::new(b"abcdefgh-tail").unwrap();
        insert(&node, &long, 7);

        assert_eq!(value_of(&node, &long), Some(7));

        let other = Key::new(b"abcdefgh-TAIL").unwrap();
        assert!(matches!(node.extract_link_or_value(&other), Extracted::NotFound));

        let perm = node.permutation();
        assert_eq!(node.long_slot(&perm, long.current_slice().slice), Some(0));
    }

    #[test]
    fn test_extract_layer_and_unstable() {
        let node: Box<BorderNode<u64>> = BorderNode::new_boxed();
        let key = Key::new(b"abcdefgh-tail").unwrap();
        let lower: Box<BorderNode<u64>> = BorderNode::new_boxed();

        let entry = SlotEntry {
            slice: key.current_slice().slice,
            tag: UNSTABLE,
            lv: StdPtr::null_mut(),
            suffix: StdPtr::null_mut(),
        };
        node.write_slot(0, &entry);
        node.set_permutation(Permuter::size_one());
        assert!(matches!(node.extract_link_or_value(&key), Extracted::Unstable));

        node.set_lv(0, lower.as_node_ptr().cast());
        node.set_key_len(0, LAYER);
        match node.extract_link_or_value(&key) {
            Extracted::Layer { slot, root } => {
                assert_eq!(slot, 0);
                assert_eq!(root, lower.as_node_ptr());
            }

            other => panic!("expected layer, got {other:?}"),
        }

        node.clear_permutation();
    }

    #[test]
    fn test_insert_point_prefers_empty() {
        let node: Box<BorderNode<u64>> = BorderNode::new_boxed();
        let key = Key::new(b"k").unwrap();
        insert(&node, &key, 1);

        // Remove slot 0, leaving a removed tag behind.
        let mut perm = node.permutation.load_locked();
        let ptr = node.lv(0);
        node.mark_key_removed(0);
        perm.remove_index(0);
        node.set_permutation(perm);
        // SAFETY: the removed value is owned by the test now.
        drop(unsafe { Arc::from_raw(ptr.cast_const().cast::<u64>()) });

        assert!(is_removed_tag(node.key_len(0)));
        assert_eq!(node.insert_point(&perm), Some((1, false)));
    }

    #[test]
    fn test_insert_point_reuses_removed_when_no_empty() {
        let node: Box<BorderNode<u64>> = BorderNode::new_boxed();
        for i in 0..MAX_WIDTH {
            let key = Key::new(&[b'a' + i as u8]).unwrap();
            insert(&node, &key, i as u64);
        }
        assert!(!node.is_not_full());
        assert_eq!(node.insert_point(&node.permutation()), None);

        let mut perm = node.permutation.load_locked();
        let pos: usize = 4;
        let slot: usize = perm.key_index(pos);
        let ptr = node.lv(slot);
        node.mark_key_removed(slot);
        perm.remove_index(pos);
        node.set_permutation(perm);
        // SAFETY: the removed value is owned by the test now.
        drop(unsafe { Arc::from_raw(ptr.cast_const().cast::<u64>()) });

        assert_eq!(node.insert_point(&perm), Some((slot, true)));
    }

    #[test]
    fn test_lowest_key_and_sorted_layout() {
        let node: Box<BorderNode<u64>> = BorderNode::new_boxed();
        for k in [b"m", b"c", b"x"] {
            insert(&node, &Key::new(k).unwrap(), 0);
        }

        assert_eq!(node.lowest_key(), Some(Key::read_slice(b"c")));

        let entries = node.sorted_entries();
        let slices: Vec<KeySlice> = entries.iter().map(|e| e.slice).collect();
        assert_eq!(
            slices,
            vec![Key::read_slice(b"c"), Key::read_slice(b"m"), Key::read_slice(b"x")]
        );

        node.write_sorted(&entries);
        assert_eq!(node.permutation(), Permuter::from_sorted(3));
        assert_eq!(node.key_slice(0), Key::read_slice(b"c"));
        assert_eq!(node.key_len(3), EMPTY);
    }

    #[test]
    fn test_sibling_link_and_unlink() {
        let a: Box<BorderNode<u64>> = BorderNode::new_boxed();
        let b: Box<BorderNode<u64>> = BorderNode::new_boxed();
        let c: Box<BorderNode<u64>> = BorderNode::new_boxed();

        a.link_split_sibling(&c, 200);
        a.link_split_sibling(&b, 100);

        let a_ptr: *mut BorderNode<u64> = StdPtr::from_ref(&*a).cast_mut();
        let b_ptr: *mut BorderNode<u64> = StdPtr::from_ref(&*b).cast_mut();
        let c_ptr: *mut BorderNode<u64> = StdPtr::from_ref(&*c).cast_mut();
        assert_eq!(a.next(), b_ptr);
        assert_eq!(b.next(), c_ptr);
        assert_eq!(c.prev(), b_ptr);
        assert_eq!(a.low_fence(), 0);
        assert_eq!(b.low_fence(), 100);
        assert_eq!(c.low_fence(), 200);

        {
            let _lock = b.version().lock();
            b.connect_prev_and_next();
        }
        assert_eq!(a.next(), c_ptr);
        assert_eq!(c.prev(), a_ptr);

        {
            let _lock = a.version().lock();
            a.connect_prev_and_next();
        }
        assert!(c.prev().is_null());
    }
}
