//! Filepath: src/node.rs
//!
//! Shared node header and shape dispatch.
//!
//! Both node shapes start with a `#[repr(C)]` [`NodeHeader`], so a pointer to
//! either one can be carried as a [`NodePtr`] and resolved into a
//! [`NodeRef`] by reading the border bit of the version word. The border bit
//! is fixed at construction, so the dispatch never races.

use std::marker::PhantomData;
use std::ptr as StdPtr;
use std::sync::atomic::AtomicPtr;

use crate::border::BorderNode;
use crate::interior::InteriorNode;
use crate::key::KeySlice;
use crate::nodeversion::{LockGuard, NodeVersion};
use crate::ordering::{READ_ORD, WRITE_ORD};

/// Type-erased pointer to either node shape.
pub type NodePtr<V> = *mut NodeHeader<V>;

// ============================================================================
//  NodeHeader
// ============================================================================

/// Fields every node carries: its version word and its parent pointer.
///
/// `parent` is null at the root of a layer.
#[repr(C)]
#[derive(Debug)]
pub struct NodeHeader<V> {
    version: NodeVersion,
    parent: AtomicPtr<InteriorNode<V>>,
    _marker: PhantomData<V>,
}

impl<V> NodeHeader<V> {
    pub(crate) const fn new(is_border: bool) -> Self {
        Self {
            version: NodeVersion::new(is_border),
            parent: AtomicPtr::new(StdPtr::null_mut()),
            _marker: PhantomData,
        }
    }

    /// The node's version word.
    #[inline(always)]
    pub const fn version(&self) -> &NodeVersion {
        &self.version
    }

    /// Parent interior node, or null at a layer root.
    #[inline(always)]
    pub fn parent(&self) -> *mut InteriorNode<V> {
        self.parent.load(READ_ORD)
    }

    /// Set the parent. Callers hold the lock of the parent being linked.
    #[inline(always)]
    pub fn set_parent(&self, parent: *mut InteriorNode<V>) {
        self.parent.store(parent, WRITE_ORD);
    }

    /// Lock the parent and confirm it is still the parent.
    ///
    /// A concurrent interior split may move this node to a new parent
    /// between the load and the lock; the check catches that and retries.
    /// Returns `None` when the node has no parent (it is, or just became,
    /// a layer root).
    ///
    /// # Safety
    /// The caller must be inside a reclamation guard that outlives `'a`.
    pub(crate) unsafe fn locked_parent<'a>(&self) -> Option<(&'a InteriorNode<V>, LockGuard<'a>)> {
        loop {
            let parent: *mut InteriorNode<V> = self.parent();

            // SAFETY: parents are retired, never freed in place; the guard
            // keeps them allocated.
            let parent_ref: &'a InteriorNode<V> = unsafe { parent.as_ref() }?;
            let lock: LockGuard<'a> = parent_ref.version().lock();

            if StdPtr::eq(self.parent(), parent) {
                return Some((parent_ref, lock));
            }

            drop(lock);
        }
    }
}

// ============================================================================
//  NodeRef
// ============================================================================

/// A resolved node reference.
#[derive(Debug)]
pub enum NodeRef<'a, V> {
    /// Routing node.
    Interior(&'a InteriorNode<V>),

    /// Leaf node.
    Border(&'a BorderNode<V>),
}

impl<V> Clone for NodeRef<'_, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for NodeRef<'_, V> {}

impl<'a, V> NodeRef<'a, V> {
    /// Resolve a type-erased pointer.
    ///
    /// # Safety
    /// `ptr` must be non-null and point to a live `InteriorNode<V>` or
    /// `BorderNode<V>` that stays allocated for `'a`.
    #[inline]
    pub unsafe fn from_raw(ptr: NodePtr<V>) -> Self {
        // SAFETY: both shapes begin with NodeHeader (repr(C)); the caller
        // guarantees liveness.
        let header: &NodeHeader<V> = unsafe { &*ptr };

        if header.version().is_border() {
            // SAFETY: the border bit identifies the concrete shape.
            Self::Border(unsafe { &*ptr.cast::<BorderNode<V>>() })
        } else {
            // SAFETY: as above.
            Self::Interior(unsafe { &*ptr.cast::<InteriorNode<V>>() })
        }
    }

    /// The common header.
    #[inline]
    pub fn header(self) -> &'a NodeHeader<V> {
        match self {
            Self::Interior(node) => node.header(),
            Self::Border(node) => node.header(),
        }
    }

    /// The version word.
    #[inline]
    pub fn version(self) -> &'a NodeVersion {
        self.header().version()
    }

    /// Back to a type-erased pointer.
    #[inline]
    pub fn as_ptr(self) -> NodePtr<V> {
        StdPtr::from_ref(self.header()).cast_mut()
    }
}

// ============================================================================
//  find_border
// ============================================================================

/// Outcome of [`find_border`].
#[derive(Debug)]
pub(crate) enum FindBorder<'a, V> {
    /// The border that owns `slice`, with the stable version it was
    /// reached at.
    Found {
        node: &'a BorderNode<V>,
        version: u32,
    },

    /// The layer root was deleted (its layer collapsed or the tree emptied).
    Vanished,
}

/// Climb parent pointers from `start` to the root of its layer.
///
/// Returns the root with the stable version it was reached at, or `None`
/// when a deleted node is met on the way.
///
/// # Safety
/// `start` must be non-null and the caller must be inside a reclamation
/// guard that outlives `'a`.
pub(crate) unsafe fn climb_to_root<'a, V>(start: NodePtr<V>) -> Option<(NodeRef<'a, V>, u32)> {
    // SAFETY: the caller guarantees start is live.
    let mut node: NodeRef<'a, V> = unsafe { NodeRef::from_raw(start) };
    let mut version: u32 = node.version().stable();

    while !NodeVersion::root_in(version) {
        if NodeVersion::deleted_in(version) {
            return None;
        }

        let parent: *mut InteriorNode<V> = node.header().parent();

        // SAFETY: parent pointers only ever name live or retired nodes.
        match unsafe { parent.as_ref() } {
            Some(parent) => node = NodeRef::Interior(parent),

            // Pull-up in progress: root bit is set before parent clears.
            None => std::hint::spin_loop(),
        }

        version = node.version().stable();
    }

    (!NodeVersion::deleted_in(version)).then_some((node, version))
}

/// Locate the border node responsible for `slice` in the layer that `root`
/// belongs to.
///
/// `root` may be stale: if it stopped being the root, the walk climbs parent
/// pointers to the current root first. Descent re-validates each interior
/// node after reading the child; a split of that interior node restarts the
/// descent, any other change re-reads the child.
///
/// # Safety
/// `root` must be non-null and the caller must be inside a reclamation guard
/// that outlives `'a`.
pub(crate) unsafe fn find_border<'a, V>(root: NodePtr<V>, slice: KeySlice) -> FindBorder<'a, V> {
    'retry: loop {
        // SAFETY: forwarded from the caller.
        let Some((mut node, mut version)) = (unsafe { climb_to_root::<V>(root) }) else {
            return FindBorder::Vanished;
        };

        loop {
            let interior: &InteriorNode<V> = match node {
                NodeRef::Border(border) => {
                    return FindBorder::Found {
                        node: border,
                        version,
                    };
                }

                NodeRef::Interior(interior) => interior,
            };

            let child: NodePtr<V> = interior.find_child(slice);
            if child.is_null() {
                continue 'retry;
            }

            // SAFETY: children are live or retired; the guard keeps them.
            let child_ref: NodeRef<'a, V> = unsafe { NodeRef::from_raw(child) };
            let child_version: u32 = child_ref.version().stable();

            if !interior.version().has_changed(version) {
                node = child_ref;
                version = child_version;
                continue;
            }

            let now: u32 = interior.version().stable();
            if NodeVersion::split_between(version, now) || NodeVersion::deleted_in(now) {
                continue 'retry;
            }

            version = now;
        }
    }
}
