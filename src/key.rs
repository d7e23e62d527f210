//! Filepath: src/key.rs
//!
//! Key representation for [`Masstree`](crate::Masstree).
//!
//! A key is split into 8-byte slices, each read as a big-endian `u64` so
//! numeric slice order equals byte-lexicographic order. The last slice may
//! be partially filled; its byte count is kept in `last_slice_size`.
//! A cursor marks which slice, and therefore which trie layer, is being
//! matched.

use std::fmt as StdFmt;

/// Size of a key slice in bytes.
pub const SLICE_SIZE: usize = 8;

/// Raw key slice: eight key bytes read big-endian.
pub type KeySlice = u64;

// ============================================================================
//  KeyError
// ============================================================================

/// Rejected key input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyError {
    /// Keys need at least one byte.
    Empty,

    /// The last slice must carry between 1 and 8 bytes.
    InvalidLastSliceSize(usize),
}

impl StdFmt::Display for KeyError {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        match self {
            Self::Empty => write!(f, "key must not be empty"),

            Self::InvalidLastSliceSize(size) => {
                write!(f, "last slice size {size} is outside 1..=8")
            }
        }
    }
}

impl std::error::Error for KeyError {}

// ============================================================================
//  SliceWithSize
// ============================================================================

/// A key slice together with how many of its bytes belong to the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceWithSize {
    /// The slice value.
    pub slice: KeySlice,

    /// Significant bytes, 1..=8.
    pub size: u8,
}

impl SliceWithSize {
    /// Pair a slice with its byte count.
    #[must_use]
    #[inline(always)]
    pub const fn new(slice: KeySlice, size: u8) -> Self {
        debug_assert!(size >= 1 && size as usize <= SLICE_SIZE);
        Self { slice, size }
    }
}

// ============================================================================
//  Key
// ============================================================================

/// An owned key with a layer cursor.
///
/// Invariant: `(slices.len() - 1) * 8 < byte_len() <= slices.len() * 8`.
///
/// A `Key` is used by one thread at a time. The tree moves the cursor while
/// it descends layers; reset it with [`Key::reset`] before reusing the key
/// for an unrelated operation (the facade does this for you).
///
/// # Example
///
/// ```rust
/// use masstree_olc::key::Key;
///
/// let mut key = Key::new(b"hello world!").unwrap();
/// assert_eq!(key.current_slice().slice, u64::from_be_bytes(*b"hello wo"));
/// assert!(key.has_next());
///
/// key.next();
/// assert_eq!(key.current_slice().slice, u64::from_be_bytes(*b"rld!\0\0\0\0"));
/// assert_eq!(key.current_slice().size, 4);
/// assert!(!key.has_next());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Key {
    slices: Vec<KeySlice>,
    last_slice_size: usize,
    cursor: usize,
}

impl Key {
    /// Slice a byte string.
    ///
    /// # Errors
    /// [`KeyError::Empty`] for a zero-length input.
    pub fn new(data: &[u8]) -> Result<Self, KeyError> {
        if data.is_empty() {
            return Err(KeyError::Empty);
        }

        let slices: Vec<KeySlice> = data.chunks(SLICE_SIZE).map(Self::read_slice).collect();
        let last_slice_size: usize = data.len() - (slices.len() - 1) * SLICE_SIZE;

        Ok(Self {
            slices,
            last_slice_size,
            cursor: 0,
        })
    }

    /// Build a key from already-sliced input.
    ///
    /// # Errors
    /// [`KeyError::Empty`] when `slices` is empty,
    /// [`KeyError::InvalidLastSliceSize`] when `last_slice_size` is not in 1..=8.
    pub fn from_slices(slices: Vec<KeySlice>, last_slice_size: usize) -> Result<Self, KeyError> {
        if slices.is_empty() {
            return Err(KeyError::Empty);
        }

        if !(1..=SLICE_SIZE).contains(&last_slice_size) {
            return Err(KeyError::InvalidLastSliceSize(last_slice_size));
        }

        Ok(Self {
            slices,
            last_slice_size,
            cursor: 0,
        })
    }

    /// Read up to 8 bytes as a big-endian slice, zero-padded on the right.
    #[must_use]
    #[inline]
    pub fn read_slice(chunk: &[u8]) -> KeySlice {
        let mut buf: [u8; SLICE_SIZE] = [0; SLICE_SIZE];
        let n: usize = chunk.len().min(SLICE_SIZE);
        buf[..n].copy_from_slice(&chunk[..n]);
        u64::from_be_bytes(buf)
    }

    // ========================================================================
    //  Accessors
    // ========================================================================

    /// Total key length in bytes.
    #[must_use]
    #[inline]
    pub fn byte_len(&self) -> usize {
        (self.slices.len() - 1) * SLICE_SIZE + self.last_slice_size
    }

    /// All slices.
    #[must_use]
    #[inline]
    pub fn slices(&self) -> &[KeySlice] {
        &self.slices
    }

    /// Byte count of the final slice.
    #[must_use]
    #[inline]
    pub const fn last_slice_size(&self) -> usize {
        self.last_slice_size
    }

    /// Index of the slice being matched.
    #[must_use]
    #[inline]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// More slices after the cursor.
    #[must_use]
    #[inline]
    pub fn has_next(&self) -> bool {
        self.cursor + 1 < self.slices.len()
    }

    /// Byte count of the slice under the cursor.
    #[must_use]
    #[inline]
    pub fn current_slice_size(&self) -> usize {
        if self.has_next() {
            SLICE_SIZE
        } else {
            self.last_slice_size
        }
    }

    /// Slice under the cursor with its byte count.
    #[must_use]
    #[inline]
    #[expect(clippy::cast_possible_truncation, reason = "slice size is at most 8")]
    pub fn current_slice(&self) -> SliceWithSize {
        SliceWithSize::new(self.slices[self.cursor], self.current_slice_size() as u8)
    }

    /// Bytes remaining from slice index `from` to the end of the key.
    #[must_use]
    #[inline]
    pub fn remain_length(&self, from: usize) -> usize {
        debug_assert!(from < self.slices.len(), "remain_length: from past end");

        (self.slices.len() - from - 1) * SLICE_SIZE + self.last_slice_size
    }

    // ========================================================================
    //  Cursor
    // ========================================================================

    /// Advance to the next slice (descend one layer).
    #[inline]
    pub fn next(&mut self) {
        debug_assert!(self.has_next(), "next: no slice after cursor");
        self.cursor += 1;
    }

    /// Step back one slice (return to the layer above).
    #[inline]
    pub fn back(&mut self) {
        debug_assert!(self.cursor != 0, "back: cursor already at 0");
        self.cursor -= 1;
    }

    /// Rewind the cursor to the first slice.
    #[inline]
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Reconstruct the original bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out: Vec<u8> = Vec::with_capacity(self.byte_len());
        for slice in &self.slices {
            out.extend_from_slice(&slice.to_be_bytes());
        }
        out.truncate(self.byte_len());
        out
    }
}

impl TryFrom<&[u8]> for Key {
    type Error = KeyError;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        Self::new(data)
    }
}
