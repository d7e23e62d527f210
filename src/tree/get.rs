//! Filepath: src/tree/get.rs
//!
//! Optimistic lookup.
//!
//! No locks are taken. Each border read is bracketed by a stable version
//! snapshot and a validation; a failed validation re-reads the node after
//! following any split to the right.

use std::sync::Arc;

use crate::border::{BorderNode, Extracted, clone_value};
use crate::key::{Key, KeySlice};
use crate::node::{FindBorder, NodePtr, find_border};
use crate::nodeversion::NodeVersion;
use crate::tracing_helpers::trace_log;

use super::Masstree;

/// Where the lookup currently stands inside one layer.
enum Search<'a, V> {
    /// Descend from the layer root.
    Descend,

    /// Read `node`, validated against `version`.
    Extract { node: &'a BorderNode<V>, version: u32 },

    /// `node` changed under the read; re-snapshot and follow splits.
    Forward { node: &'a BorderNode<V> },
}

impl<V> Masstree<V> {
    /// Lookup body. The caller holds a guard for the whole call.
    pub(super) fn get_in_guard(&self, key: &mut Key) -> Option<Arc<V>> {
        'top: loop {
            key.reset();

            let mut root: NodePtr<V> = self.load_root();
            if root.is_null() {
                return None;
            }

            let mut state: Search<'_, V> = Search::Descend;

            loop {
                let slice: KeySlice = key.current_slice().slice;

                state = match state {
                    Search::Descend => {
                        // SAFETY: root is non-null and protected by the guard.
                        match unsafe { find_border::<V>(root, slice) } {
                            FindBorder::Found { node, version } => Search::Extract { node, version },

                            FindBorder::Vanished => {
                                trace_log!("layer vanished, restarting from the top");
                                continue 'top;
                            }
                        }
                    }

                    Search::Extract { node, version } => {
                        if NodeVersion::deleted_in(version) {
                            Search::Descend
                        } else {
                            let found: Extracted<V> = node.extract_link_or_value(key);

                            if node.version().has_changed(version) {
                                Search::Forward { node }
                            } else {
                                match found {
                                    Extracted::NotFound => return None,

                                    // SAFETY: the validated slot still owned the
                                    // value when read; the guard keeps it alive.
                                    Extracted::Value { ptr, .. } => {
                                        return Some(unsafe { clone_value::<V>(ptr) });
                                    }

                                    Extracted::Layer { root: lower, .. } => {
                                        key.next();
                                        root = lower;
                                        Search::Descend
                                    }

                                    Extracted::Unstable => Search::Forward { node },
                                }
                            }
                        }
                    }

                    Search::Forward { node } => {
                        let version: u32 = node.version().stable();

                        if NodeVersion::deleted_in(version) {
                            Search::Descend
                        } else {
                            // SAFETY: protected by the guard.
                            match unsafe { walk_right(node, version, slice) } {
                                Some((node, version)) => Search::Extract { node, version },
                                None => Search::Descend,
                            }
                        }
                    }
                };
            }
        }
    }
}

/// Follow the sibling chain from `node` while `slice` belongs further right.
///
/// Returns `None` when a deleted node is reached, which sends the caller
/// back to the layer root.
///
/// # Safety
/// The caller is inside a guard that outlives `'a`.
unsafe fn walk_right<'a, V>(
    mut node: &'a BorderNode<V>,
    mut version: u32,
    slice: KeySlice,
) -> Option<(&'a BorderNode<V>, u32)> {
    loop {
        // SAFETY: siblings are retired through the collector.
        let Some(next) = (unsafe { node.next().as_ref() }) else {
            return Some((node, version));
        };

        if slice < next.low_fence() {
            return Some((node, version));
        }

        let next_version: u32 = next.version().stable();
        if NodeVersion::deleted_in(next_version) {
            return None;
        }

        node = next;
        version = next_version;
    }
}

#[cfg(test)]
mod tests {
    #![expect(clippy::unwrap_used, reason = "fail fast in tests")]

    use super::*;
    use crate::node::NodeRef;

    #[test]
    fn test_get_resets_cursor() {
        let tree: Masstree<u64> = Masstree::new();
        let mut gc = tree.gc();

        let mut key = Key::new(b"0123456789abcdef-tail").unwrap();
        tree.put(&mut key, 11, &mut gc);

        key.next();
        key.next();
        assert_eq!(*tree.get(&mut key).unwrap(), 11);
    }

    #[test]
    fn test_walk_right_stops_at_fence() {
        let tree: Masstree<u64> = Masstree::new();
        let mut gc = tree.gc();
        for i in 0..16_u64 {
            tree.put(&mut Key::new(&i.to_be_bytes()).unwrap(), i, &mut gc);
        }

        let _guard = tree.collector().enter();
        // SAFETY: the guard keeps the nodes alive.
        let NodeRef::Interior(root) = (unsafe { NodeRef::from_raw(tree.load_root()) }) else {
            panic!("root should be interior");
        };
        // SAFETY: as above.
        let NodeRef::Border(left) = (unsafe { NodeRef::from_raw(root.child(0)) }) else {
            panic!("child should be a border");
        };
        let version: u32 = left.version().stable();

        // SAFETY: as above.
        unsafe {
            let (stay, _) = walk_right(left, version, 3).unwrap();
            assert!(std::ptr::eq(stay, left));

            let (moved, _) = walk_right(left, version, 12).unwrap();
            assert!(std::ptr::eq(moved.as_node_ptr(), root.child(1)));
        }
    }

    #[test]
    fn test_get_through_three_layers() {
        let tree: Masstree<u64> = Masstree::new();
        let mut gc = tree.gc();

        let keys: [&[u8]; 4] = [
            b"aaaaaaaabbbbbbbb1",
            b"aaaaaaaabbbbbbbb2",
            b"aaaaaaaabbbbbbbb",
            b"aaaaaaaa",
        ];
        for (i, k) in keys.iter().enumerate() {
            tree.put(&mut Key::new(k).unwrap(), i as u64, &mut gc);
        }

        for (i, k) in keys.iter().enumerate() {
            assert_eq!(*tree.get(&mut Key::new(k).unwrap()).unwrap(), i as u64);
        }
        assert!(tree.get(&mut Key::new(b"aaaaaaaabbbbbbbb3").unwrap()).is_none());
        assert!(tree.get(&mut Key::new(b"aaaaaaaabbbbbbb").unwrap()).is_none());
    }
}
