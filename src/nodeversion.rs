//! Filepath: src/nodeversion.rs
//!
//! Per-node version word for optimistic concurrency control.
//!
//! [`NodeVersion`] packs the lock bit, the two dirty bits, the insert and
//! split counters and the node flags into one `u32`.
//!
//! # Protocol
//! 1. Readers take `stable()`, read the node, then `has_changed()`. Any
//!    difference above the lock bit means the read must be redone.
//! 2. Writers call `lock()` and get a [`LockGuard`]. Marking the node dirty
//!    (`mark_insert` / `mark_split`) makes readers spin in `stable()`; the
//!    matching counter is bumped when the guard drops.
//!
//! ```rust
//! use masstree_olc::nodeversion::NodeVersion;
//!
//! let v = NodeVersion::new(true);
//! let before = v.stable();
//! {
//!     let mut guard = v.lock();
//!     guard.mark_insert();
//! }
//! assert!(v.has_changed(before));
//! assert!(!v.has_split(before));
//! ```

use std::marker::PhantomData;
use std::sync::atomic::AtomicU32;

use crate::ordering::{CAS_FAILURE, CAS_SUCCESS, RELAXED, UNLOCK_ORD, VERSION_ORD};

// ============================================================================
//  Bit Layout
// ============================================================================

/// Node is locked by a writer.
pub const LOCK_BIT: u32 = 1 << 0;

/// Writer is changing slot contents in place.
const INSERTING_BIT: u32 = 1 << 1;

/// Writer is moving keys out of the node (split, merge, delete).
const SPLITTING_BIT: u32 = 1 << 2;

const DIRTY_MASK: u32 = INSERTING_BIT | SPLITTING_BIT;

/// Low bit of `v_insert` (bits 3..=8).
const VINSERT_LOWBIT: u32 = 1 << 3;

/// Low bit of `v_split` (bits 9..=27).
const VSPLIT_LOWBIT: u32 = 1 << 9;

/// Catches the carry out of `v_split`; always cleared on unlock.
const OVERFLOW_BIT: u32 = 1 << 28;

const VSPLIT_MASK: u32 = (OVERFLOW_BIT - 1) & !(VSPLIT_LOWBIT - 1);

const DELETED_BIT: u32 = 1 << 29;

const ROOT_BIT: u32 = 1 << 30;

const BORDER_BIT: u32 = 1 << 31;

/// Bits cleared by every unlock.
const UNLOCK_CLEAR: u32 = LOCK_BIT | DIRTY_MASK | OVERFLOW_BIT;

// ============================================================================
//  NodeVersion
// ============================================================================

/// Versioned lock shared by interior and border nodes.
///
/// # Layout
/// Bit 31: `border` | Bit 30: `root` | Bit 29: `deleted` | Bit 28: overflow
/// Bits 9-27: `v_split` | Bits 3-8: `v_insert` | Bit 2: `splitting`
/// Bit 1: `inserting` | Bit 0: `locked`
#[derive(Debug)]
pub struct NodeVersion {
    value: AtomicU32,
}

// ============================================================================
//  LockGuard
// ============================================================================

/// Proof that the node lock is held.
///
/// Only [`NodeVersion::lock`] and [`NodeVersion::try_lock`] create one. The
/// lock is released on drop, also while unwinding.
///
/// `PhantomData<*mut ()>` keeps the guard on the thread that locked.
#[derive(Debug)]
#[must_use = "dropping the guard releases the lock immediately"]
pub struct LockGuard<'a> {
    version: &'a NodeVersion,
    _marker: PhantomData<*mut ()>,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        // Root flips on a foreign node can land while we hold the lock,
        // so the release is a read-modify-write rather than a blind store.
        let _ = self
            .version
            .value
            .fetch_update(UNLOCK_ORD, RELAXED, |v: u32| Some(unlocked_value(v)));
    }
}

/// Version value after releasing a lock held over `v`.
#[inline(always)]
const fn unlocked_value(v: u32) -> u32 {
    let bumped: u32 = if v & SPLITTING_BIT != 0 {
        v.wrapping_add(VSPLIT_LOWBIT)
    } else if v & INSERTING_BIT != 0 {
        v.wrapping_add(VINSERT_LOWBIT)
    } else {
        v
    };

    bumped & !UNLOCK_CLEAR
}

impl LockGuard<'_> {
    /// Current value of the locked version.
    #[must_use]
    #[inline]
    pub fn locked_value(&self) -> u32 {
        self.version.value.load(RELAXED)
    }

    /// Set `inserting`. A no-op when `splitting` is already set, since the
    /// split counter bump subsumes it.
    #[inline]
    pub fn mark_insert(&mut self) {
        if self.version.value.load(RELAXED) & SPLITTING_BIT == 0 {
            self.version.value.fetch_or(INSERTING_BIT, CAS_SUCCESS);
        }
    }

    /// Set `splitting` (and drop `inserting`).
    #[inline]
    pub fn mark_split(&mut self) {
        let _ = self
            .version
            .value
            .fetch_update(CAS_SUCCESS, RELAXED, |v: u32| {
                Some((v | SPLITTING_BIT) & !INSERTING_BIT)
            });
    }

    /// Mark the node deleted. Also sets `splitting` so unlock bumps `v_split`.
    #[inline]
    pub fn mark_deleted(&mut self) {
        let _ = self
            .version
            .value
            .fetch_update(CAS_SUCCESS, RELAXED, |v: u32| {
                Some((v | DELETED_BIT | SPLITTING_BIT) & !INSERTING_BIT)
            });
    }

    /// Set the root bit.
    #[inline]
    pub fn mark_root(&mut self) {
        self.version.mark_root();
    }

    /// Clear the root bit.
    #[inline]
    pub fn mark_nonroot(&mut self) {
        self.version.mark_nonroot();
    }
}

impl NodeVersion {
    /// Create an unlocked, non-root version.
    #[must_use]
    pub const fn new(is_border: bool) -> Self {
        let initial: u32 = if is_border { BORDER_BIT } else { 0 };

        Self {
            value: AtomicU32::new(initial),
        }
    }

    /// Create a version from a raw value.
    ///
    ///  WARN: ONLY FOR TESTING.
    #[must_use]
    pub const fn from_value(value: u32) -> Self {
        Self {
            value: AtomicU32::new(value),
        }
    }

    // ========================================================================
    //  Flag Accessors
    // ========================================================================

    /// Border (leaf) node.
    #[inline]
    #[must_use]
    pub fn is_border(&self) -> bool {
        self.value.load(VERSION_ORD) & BORDER_BIT != 0
    }

    /// Root of its layer.
    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        Self::root_in(self.value.load(VERSION_ORD))
    }

    /// Logically deleted.
    #[inline]
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        Self::deleted_in(self.value.load(VERSION_ORD))
    }

    /// Locked by a writer.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.value.load(VERSION_ORD) & LOCK_BIT != 0
    }

    /// `inserting` dirty bit set.
    #[inline]
    #[must_use]
    pub fn is_inserting(&self) -> bool {
        self.value.load(VERSION_ORD) & INSERTING_BIT != 0
    }

    /// `splitting` dirty bit set.
    #[inline]
    #[must_use]
    pub fn is_splitting(&self) -> bool {
        self.value.load(VERSION_ORD) & SPLITTING_BIT != 0
    }

    /// Either dirty bit set.
    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.value.load(VERSION_ORD) & DIRTY_MASK != 0
    }

    /// Raw version value.
    #[inline]
    #[must_use]
    pub fn value(&self) -> u32 {
        self.value.load(VERSION_ORD)
    }

    // ========================================================================
    //  Snapshot Helpers
    // ========================================================================

    /// `deleted` flag of a captured snapshot.
    #[inline(always)]
    #[must_use]
    pub const fn deleted_in(v: u32) -> bool {
        v & DELETED_BIT != 0
    }

    /// `root` flag of a captured snapshot.
    #[inline(always)]
    #[must_use]
    pub const fn root_in(v: u32) -> bool {
        v & ROOT_BIT != 0
    }

    /// `v_split` counter of a captured snapshot.
    #[inline(always)]
    #[must_use]
    pub const fn split_counter(v: u32) -> u32 {
        (v & VSPLIT_MASK) >> VSPLIT_LOWBIT.trailing_zeros()
    }

    /// `v_insert` counter of a captured snapshot.
    #[inline(always)]
    #[must_use]
    pub const fn insert_counter(v: u32) -> u32 {
        (v & (VSPLIT_LOWBIT - 1)) >> VINSERT_LOWBIT.trailing_zeros()
    }

    /// True when two snapshots differ in anything but the lock bit.
    #[inline(always)]
    #[must_use]
    pub const fn differs(old: u32, new: u32) -> bool {
        (old ^ new) > LOCK_BIT
    }

    /// True when a split happened between two snapshots.
    #[inline(always)]
    #[must_use]
    pub const fn split_between(old: u32, new: u32) -> bool {
        (old ^ new) & VSPLIT_MASK != 0
    }

    // ========================================================================
    //  Optimistic Reads
    // ========================================================================

    /// Spin until neither dirty bit is set and return that snapshot.
    #[inline]
    #[must_use]
    pub fn stable(&self) -> u32 {
        loop {
            let value: u32 = self.value.load(VERSION_ORD);

            if value & DIRTY_MASK == 0 {
                return value;
            }

            std::hint::spin_loop();
        }
    }

    /// Anything above the lock bit changed since `old`.
    #[inline]
    #[must_use]
    pub fn has_changed(&self, old: u32) -> bool {
        Self::differs(old, self.value.load(VERSION_ORD))
    }

    /// The split counter moved since `old`.
    #[inline]
    #[must_use]
    pub fn has_split(&self, old: u32) -> bool {
        Self::split_between(old, self.value.load(VERSION_ORD))
    }

    // ========================================================================
    //  Locking
    // ========================================================================

    /// Spin until the lock bit is acquired.
    pub fn lock(&self) -> LockGuard<'_> {
        let mut current: u32 = self.value.load(RELAXED);

        loop {
            if current & LOCK_BIT != 0 {
                std::hint::spin_loop();
                current = self.value.load(RELAXED);
                continue;
            }

            match self.value.compare_exchange_weak(
                current,
                current | LOCK_BIT,
                CAS_SUCCESS,
                CAS_FAILURE,
            ) {
                Ok(_) => {
                    return LockGuard {
                        version: self,
                        _marker: PhantomData,
                    };
                }

                Err(actual) => current = actual,
            }
        }
    }

    /// Acquire the lock if it is free right now.
    pub fn try_lock(&self) -> Option<LockGuard<'_>> {
        let current: u32 = self.value.load(RELAXED);

        if current & LOCK_BIT != 0 {
            return None;
        }

        self.value
            .compare_exchange(current, current | LOCK_BIT, CAS_SUCCESS, CAS_FAILURE)
            .ok()
            .map(|_| LockGuard {
                version: self,
                _marker: PhantomData,
            })
    }

    // ========================================================================
    //  Root Flag
    // ========================================================================

    /// Set the root bit. Safe without the lock: it is an atomic `or`.
    pub fn mark_root(&self) {
        self.value.fetch_or(ROOT_BIT, CAS_SUCCESS);
    }

    /// Clear the root bit. Safe without the lock: it is an atomic `and`.
    pub fn mark_nonroot(&self) {
        self.value.fetch_and(!ROOT_BIT, CAS_SUCCESS);
    }
}

impl Default for NodeVersion {
    /// A border node version.
    fn default() -> Self {
        Self::new(true)
    }
}
