//! Filepath: src/suffix.rs
//!
//! Suffix storage for keys that extend past the current layer.
//!
//! A border slot holds one 8-byte slice. When the key is longer and no other
//! key shares that slice, the remaining slices live in a [`BigSuffix`]
//! referenced from the slot instead of in a new layer. The per-node table of
//! those references is a [`KeySuffix`].

use std::ptr as StdPtr;
use std::sync::atomic::AtomicPtr;

use parking_lot::Mutex;

use crate::key::{Key, KeySlice, SLICE_SIZE, SliceWithSize};
use crate::ordering::{CAS_SUCCESS, READ_ORD, WRITE_ORD};
use crate::permuter::MAX_WIDTH;

// ============================================================================
//  BigSuffix
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
struct SuffixData {
    slices: Vec<KeySlice>,
    last_slice_size: usize,
}

impl SuffixData {
    fn byte_len(&self) -> usize {
        (self.slices.len() - 1) * SLICE_SIZE + self.last_slice_size
    }
}

/// The tail of a key beyond the slice stored in its border slot.
///
/// Published suffixes are only read; writers build a fresh one and swap the
/// pointer. The mutex keeps the slice vector consistent for a reader that
/// races a writer on a suffix that has not been published yet.
#[derive(Debug)]
pub struct BigSuffix {
    data: Mutex<SuffixData>,
}

impl BigSuffix {
    /// Slices of `key` starting at index `from`.
    #[must_use]
    pub fn from_key(key: &Key, from: usize) -> Self {
        debug_assert!(from < key.slices().len(), "from_key: from past end");

        Self {
            data: Mutex::new(SuffixData {
                slices: key.slices()[from..].to_vec(),
                last_slice_size: key.last_slice_size(),
            }),
        }
    }

    /// Build from raw parts. `slices` must be non-empty and
    /// `last_slice_size` in 1..=8.
    #[must_use]
    pub fn from_parts(slices: Vec<KeySlice>, last_slice_size: usize) -> Self {
        debug_assert!(!slices.is_empty(), "from_parts: empty suffix");
        debug_assert!((1..=SLICE_SIZE).contains(&last_slice_size));

        Self {
            data: Mutex::new(SuffixData {
                slices,
                last_slice_size,
            }),
        }
    }

    /// An independent copy.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        Self {
            data: Mutex::new(self.data.lock().clone()),
        }
    }

    /// First remaining slice with its byte count.
    #[must_use]
    #[expect(clippy::cast_possible_truncation, reason = "slice size is at most 8")]
    pub fn current_slice(&self) -> SliceWithSize {
        let data = self.data.lock();
        let size: usize = if data.slices.len() > 1 {
            SLICE_SIZE
        } else {
            data.last_slice_size
        };

        SliceWithSize::new(data.slices[0], size as u8)
    }

    /// More than one slice left.
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.data.lock().slices.len() > 1
    }

    /// Drop the first slice.
    pub fn next(&mut self) {
        let data = self.data.get_mut();
        debug_assert!(data.slices.len() > 1, "next: last slice");
        data.slices.remove(0);
    }

    /// Prepend `slice` as a full 8-byte slice.
    pub fn insert_top(&mut self, slice: KeySlice) {
        self.data.get_mut().slices.insert(0, slice);
    }

    /// Bytes held.
    #[must_use]
    pub fn remain_length(&self) -> usize {
        self.data.lock().byte_len()
    }

    /// Byte count of the final slice.
    #[must_use]
    pub fn last_slice_size(&self) -> usize {
        self.data.lock().last_slice_size
    }

    /// Copy of the held slices.
    #[must_use]
    pub fn slices(&self) -> Vec<KeySlice> {
        self.data.lock().slices.clone()
    }

    /// True when the bytes of `key` from slice `from` onward equal this suffix.
    ///
    /// Lengths are compared first, so keys that only differ by trailing zero
    /// bytes never match.
    #[must_use]
    pub fn is_same(&self, key: &Key, from: usize) -> bool {
        if from >= key.slices().len() {
            return false;
        }

        let data = self.data.lock();
        if data.byte_len() != key.remain_length(from) {
            return false;
        }

        data.slices.as_slice() == &key.slices()[from..]
    }

    /// Reconstruct the suffix bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let data = self.data.lock();
        let mut out: Vec<u8> = Vec::with_capacity(data.byte_len());
        for slice in &data.slices {
            out.extend_from_slice(&slice.to_be_bytes());
        }
        out.truncate(data.byte_len());
        out
    }
}

// ============================================================================
//  KeySuffix
// ============================================================================

/// Per-border table of suffix references, one per physical slot.
///
/// The table never frees on its own: ownership of a non-null entry belongs
/// to the border node (for live slots) or to a reclamation batch (after the
/// slot was removed or its suffix replaced).
#[derive(Debug)]
pub struct KeySuffix {
    entries: [AtomicPtr<BigSuffix>; MAX_WIDTH],
}

impl KeySuffix {
    /// All entries null.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: std::array::from_fn(|_| AtomicPtr::new(StdPtr::null_mut())),
        }
    }

    /// Raw entry for `slot`.
    #[must_use]
    #[inline]
    pub fn get(&self, slot: usize) -> *mut BigSuffix {
        self.entries[slot].load(READ_ORD)
    }

    /// Borrow the suffix for `slot`, if any.
    ///
    /// # Safety
    /// The pointee must stay allocated for `'a`: the caller is inside a
    /// reclamation guard or owns the node exclusively.
    #[must_use]
    #[inline]
    pub unsafe fn get_ref<'a>(&self, slot: usize) -> Option<&'a BigSuffix> {
        let ptr: *mut BigSuffix = self.get(slot);

        // SAFETY: non-null entries were produced by Box::into_raw and the
        // caller keeps them alive for 'a.
        unsafe { ptr.as_ref() }
    }

    /// Install `suffix` into `slot`. Callers hold the node lock.
    #[inline]
    pub fn set(&self, slot: usize, suffix: *mut BigSuffix) {
        self.entries[slot].store(suffix, WRITE_ORD);
    }

    /// Detach and return the entry for `slot`.
    #[inline]
    pub fn take(&self, slot: usize) -> *mut BigSuffix {
        self.entries[slot].swap(StdPtr::null_mut(), CAS_SUCCESS)
    }
}

impl Default for KeySuffix {
    fn default() -> Self {
        Self::new()
    }
}
