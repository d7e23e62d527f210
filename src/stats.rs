//! Filepath: src/stats.rs
//!
//! Structural statistics gathered by walking every layer.
//!
//! The walk runs under a guard, so it is memory safe next to writers, but
//! the numbers are only exact when the tree is quiescent.

use std::fmt as StdFmt;

use crate::border::{LAYER, is_value_tag};
use crate::node::{NodePtr, NodeRef};
use crate::permuter::Permuter;
use crate::tree::Masstree;

/// Shape of a [`Masstree`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    /// Layers, the top one included.
    pub layers: usize,

    /// Border nodes across all layers.
    pub border_nodes: usize,

    /// Interior nodes across all layers.
    pub interior_nodes: usize,

    /// Stored keys.
    pub keys: usize,

    /// Border nodes holding no key. Zero in a quiescent tree.
    pub empty_borders: usize,

    /// Node levels of the tallest layer (a lone border counts as one).
    pub max_height: usize,

    /// Layers on the deepest path (the top layer alone counts as one).
    pub max_layer_depth: usize,
}

impl StdFmt::Display for TreeStats {
    fn fmt(&self, f: &mut StdFmt::Formatter<'_>) -> StdFmt::Result {
        write!(
            f,
            "{} keys in {} layers ({} borders, {} interiors, height {}, depth {})",
            self.keys,
            self.layers,
            self.border_nodes,
            self.interior_nodes,
            self.max_height,
            self.max_layer_depth
        )
    }
}

impl<V> Masstree<V> {
    /// Walk the whole tree and count its parts.
    #[must_use]
    pub fn stats(&self) -> TreeStats {
        let _guard = self.collector().enter();
        let mut stats = TreeStats::default();

        let root: NodePtr<V> = self.load_root();
        if root.is_null() {
            return stats;
        }

        // (node, layer depth, level within the layer)
        let mut stack: Vec<(NodePtr<V>, usize, usize)> = vec![(root, 1, 1)];

        while let Some((ptr, depth, level)) = stack.pop() {
            if level == 1 {
                stats.layers += 1;
                stats.max_layer_depth = stats.max_layer_depth.max(depth);
            }

            // SAFETY: reachable nodes are live or retired; the guard keeps
            // them allocated.
            match unsafe { NodeRef::from_raw(ptr) } {
                NodeRef::Border(border) => {
                    stats.border_nodes += 1;
                    stats.max_height = stats.max_height.max(level);

                    let perm: Permuter = border.permutation();
                    if perm.num_keys() == 0 {
                        stats.empty_borders += 1;
                    }

                    for slot in perm.iter() {
                        let tag: u8 = border.key_len(slot);

                        if is_value_tag(tag) {
                            stats.keys += 1;
                        } else if tag == LAYER {
                            stack.push((border.lv(slot).cast(), depth + 1, 1));
                        }
                    }
                }

                NodeRef::Interior(interior) => {
                    stats.interior_nodes += 1;

                    for i in 0..=interior.num_keys() {
                        let child: NodePtr<V> = interior.child(i);
                        if !child.is_null() {
                            stack.push((child, depth, level + 1));
                        }
                    }
                }
            }
        }

        stats
    }
}
