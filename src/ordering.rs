//! Filepath: src/ordering.rs
//!
//! Named memory orderings for node access.
//!
//! Every shared node field is an atomic. Writers store under the node lock,
//! readers load without it and re-validate against the version word.

use std::sync::atomic::Ordering;

/// Loads performed during optimistic traversal.
/// Pairs with the writer's `WRITE_ORD` stores.
pub const READ_ORD: Ordering = Ordering::Acquire;

/// Stores performed under a node lock.
pub const WRITE_ORD: Ordering = Ordering::Release;

/// Successful compare-and-swap (lock acquisition, root install).
pub const CAS_SUCCESS: Ordering = Ordering::AcqRel;

/// Failed compare-and-swap; only the current value is needed.
pub const CAS_FAILURE: Ordering = Ordering::Acquire;

/// Loads of fields owned by the current lock holder.
pub const RELAXED: Ordering = Ordering::Relaxed;

/// Version reads in `stable()` and validation.
pub const VERSION_ORD: Ordering = Ordering::Acquire;

/// Version store that releases a lock.
pub const UNLOCK_ORD: Ordering = Ordering::Release;
