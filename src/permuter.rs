//! Filepath: src/permuter.rs
//!
//! Logical slot order for border nodes.
//!
//! A [`Permuter`] packs the number of live keys and, for every logical
//! position, the physical slot that holds the key into a single `u64`.
//! Inserting or removing a key rewrites this one word; the slot arrays are
//! never shifted, so a reader that loaded the old word still sees
//! consistent slots.
//!
//! # Encoding
//!
//! ```text
//! bits 0..4            number of live keys (0..=15)
//! bits (i+1)*4..+4     physical slot at logical position i
//! ```
//!
//! 4 bits of count plus 15 positions of 4 bits each fill the word exactly.

use std::sync::atomic::AtomicU64;

use crate::ordering::{READ_ORD, RELAXED, WRITE_ORD};

/// Slots per border node.
pub const MAX_WIDTH: usize = 15;

/// Mask for the count nibble.
const SIZE_MASK: u64 = 0xF;

/// A packed logical-to-physical slot mapping.
///
/// All operations are pure: they return or mutate a local copy, and the
/// caller publishes the result with [`AtomicPermuter::store`].
///
/// # Example
///
/// ```rust
/// use masstree_olc::permuter::Permuter;
///
/// let mut p = Permuter::empty();
/// p.insert(0, 4);
/// p.insert(0, 9);
/// assert_eq!(p.num_keys(), 2);
/// assert_eq!(p.key_index(0), 9);
/// assert_eq!(p.key_index(1), 4);
///
/// p.remove_index(0);
/// assert_eq!(p.key_index(0), 4);
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Permuter {
    value: u64,
}

impl Permuter {
    // ========================================================================
    //  Constructors
    // ========================================================================

    /// No live keys.
    #[must_use]
    #[inline(always)]
    pub const fn empty() -> Self {
        Self { value: 0 }
    }

    /// One live key stored in slot 0.
    #[must_use]
    #[inline(always)]
    pub const fn size_one() -> Self {
        Self { value: 1 }
    }

    /// `n` live keys, logical position `i` in physical slot `i`.
    ///
    /// Used right after a split, when the surviving slots were written in
    /// sorted order.
    #[must_use]
    pub fn from_sorted(n: usize) -> Self {
        debug_assert!(n <= MAX_WIDTH, "from_sorted: n ({n}) > {MAX_WIDTH}");

        let mut p = Self { value: n as u64 };
        for i in 0..n {
            p.set_key_index(i, i);
        }
        p
    }

    /// Live keys in the given slots, in the given order.
    #[must_use]
    pub fn from_slots(slots: &[usize]) -> Self {
        debug_assert!(slots.len() <= MAX_WIDTH, "from_slots: too many slots");

        let mut p = Self {
            value: slots.len() as u64,
        };
        for (i, &slot) in slots.iter().enumerate() {
            p.set_key_index(i, slot);
        }
        p
    }

    /// Wrap a raw word loaded from a node.
    #[must_use]
    #[inline(always)]
    pub const fn from_value(value: u64) -> Self {
        Self { value }
    }

    /// Raw packed word.
    #[must_use]
    #[inline(always)]
    pub const fn value(&self) -> u64 {
        self.value
    }

    // ========================================================================
    //  Accessors
    // ========================================================================

    /// Number of live keys.
    #[must_use]
    #[inline(always)]
    pub const fn num_keys(&self) -> usize {
        (self.value & SIZE_MASK) as usize
    }

    /// Overwrite the live key count without touching positions.
    #[inline(always)]
    pub fn set_num_keys(&mut self, n: usize) {
        debug_assert!(n <= MAX_WIDTH, "set_num_keys: n ({n}) > {MAX_WIDTH}");

        self.value = (self.value & !SIZE_MASK) | (n as u64);
    }

    /// Physical slot at logical position `i`.
    #[must_use]
    #[inline(always)]
    pub const fn key_index(&self, i: usize) -> usize {
        debug_assert!(i < MAX_WIDTH, "key_index: position out of bounds");

        ((self.value >> ((i + 1) * 4)) & 0xF) as usize
    }

    /// Point logical position `i` at physical slot `slot`.
    #[inline(always)]
    pub fn set_key_index(&mut self, i: usize, slot: usize) {
        debug_assert!(i < MAX_WIDTH, "set_key_index: position {i} out of bounds");
        debug_assert!(slot < MAX_WIDTH, "set_key_index: slot {slot} out of bounds");

        let shift: usize = (i + 1) * 4;
        let mask: u64 = 0xF_u64 << shift;
        self.value = (self.value & !mask) | ((slot as u64) << shift);
    }

    /// No free logical position left.
    #[must_use]
    #[inline(always)]
    pub const fn is_full(&self) -> bool {
        self.num_keys() == MAX_WIDTH
    }

    /// At least one free logical position.
    #[must_use]
    #[inline(always)]
    pub const fn is_not_full(&self) -> bool {
        !self.is_full()
    }

    /// Physical slots of the live keys, in logical order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.num_keys()).map(|i| self.key_index(i))
    }

    /// The live slot set contains `slot`.
    #[must_use]
    pub fn contains(&self, slot: usize) -> bool {
        self.iter().any(|s| s == slot)
    }

    // ========================================================================
    //  Transformations
    // ========================================================================

    /// Insert physical `slot` at logical position `pos`, shifting positions
    /// `pos..num_keys()` one to the right.
    pub fn insert(&mut self, pos: usize, slot: usize) {
        debug_assert!(pos <= self.num_keys(), "insert: pos > num_keys");
        debug_assert!(self.is_not_full(), "insert: permuter full");
        debug_assert!(slot < MAX_WIDTH, "insert: slot out of bounds");

        let i_shift: usize = (pos + 1) * 4;
        // Count nibble plus positions 0..pos.
        let low_mask: u64 = (1_u64 << i_shift) - 1;

        self.value = ((self.value + 1) & low_mask)
            | ((slot as u64) << i_shift)
            | ((self.value << 4) & !(low_mask | (0xF_u64 << i_shift)));

        #[cfg(debug_assertions)]
        self.debug_assert_valid();
    }

    /// Drop logical position `pos`, shifting later positions one to the left.
    pub fn remove_index(&mut self, pos: usize) {
        debug_assert!(pos < self.num_keys(), "remove_index: pos >= num_keys");

        let i_shift: usize = (pos + 1) * 4;
        let low_mask: u64 = (1_u64 << i_shift) - 1;

        self.value = ((self.value - 1) & low_mask) | ((self.value >> 4) & !low_mask);

        #[cfg(debug_assertions)]
        self.debug_assert_valid();
    }

    /// Every live slot appears once.
    #[cfg(debug_assertions)]
    fn debug_assert_valid(&self) {
        let mut seen: u16 = 0;
        for slot in self.iter() {
            debug_assert!(seen & (1 << slot) == 0, "duplicate slot {slot} in {self:?}");
            seen |= 1 << slot;
        }
    }
}

// ============================================================================
//  AtomicPermuter
// ============================================================================

/// The published permutation of a border node.
#[derive(Debug, Default)]
pub struct AtomicPermuter {
    value: AtomicU64,
}

impl AtomicPermuter {
    /// Wrap an initial permutation.
    #[must_use]
    pub const fn new(p: Permuter) -> Self {
        Self {
            value: AtomicU64::new(p.value),
        }
    }

    /// Load for an optimistic reader.
    #[must_use]
    #[inline(always)]
    pub fn load(&self) -> Permuter {
        Permuter::from_value(self.value.load(READ_ORD))
    }

    /// Load while holding the node lock.
    #[must_use]
    #[inline(always)]
    pub fn load_locked(&self) -> Permuter {
        Permuter::from_value(self.value.load(RELAXED))
    }

    /// Publish a new permutation. Callers hold the node lock.
    #[inline(always)]
    pub fn store(&self, p: Permuter) {
        self.value.store(p.value, WRITE_ORD);
    }
}
