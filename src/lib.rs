//! # `masstree-olc`
//!
//! A concurrent ordered map from byte strings to values, built as a trie of
//! B+trees (Masstree).
//!
//! Keys are cut into 8-byte slices. Each trie level ("layer") is a B+tree
//! over one slice position; a key that outgrows its slice either keeps the
//! rest as a suffix in its border slot or, once another key shares the
//! slice, continues in a lower layer.
//!
//! ## Concurrency
//!
//! - Lookups take no locks. Every node carries a version word; a reader
//!   snapshots it, reads, and validates, retrying on change.
//! - Writers lock the border node they modify. Splits and removals lock
//!   upward hand over hand (child before parent, lower layer before upper).
//! - Nothing is freed in place. Replaced values and unlinked nodes go into a
//!   caller-owned [`GarbageCollector`] and are released through `seize` once
//!   no operation can still observe them.
//!
//! ```rust
//! use std::sync::Arc;
//! use std::thread;
//!
//! use masstree_olc::Masstree;
//! use masstree_olc::key::Key;
//!
//! let tree: Arc<Masstree<u64>> = Arc::new(Masstree::new());
//!
//! let handles: Vec<_> = (0..4_u64)
//!     .map(|t| {
//!         let tree = Arc::clone(&tree);
//!         thread::spawn(move || {
//!             let mut gc = tree.gc();
//!             for i in 0..100_u64 {
//!                 let mut key = Key::new(format!("thread-{t}/key-{i}").as_bytes()).unwrap();
//!                 tree.put(&mut key, t * 1_000 + i, &mut gc);
//!             }
//!         })
//!     })
//!     .collect();
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//!
//! assert_eq!(tree.get_bytes(b"thread-2/key-17").unwrap().as_deref(), Some(&2_017));
//! assert_eq!(tree.stats().keys, 400);
//! ```
//!
//! ## Values
//!
//! Values are stored as `Arc<V>`. A lookup returns a clone of the `Arc`, so
//! a value stays usable after a concurrent overwrite or removal.
//!
//! ## Logging
//!
//! Structural events are logged through `tracing` when the `tracing`
//! feature is enabled; without it the logging calls compile to nothing.

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// Hot accessors are forced inline, as the node modules do throughout.
#![allow(clippy::inline_always)]

pub mod border;
pub mod gc;
pub mod interior;
pub mod key;
pub mod node;
pub mod nodeversion;
pub mod ordering;
pub mod permuter;
pub mod stats;
pub mod suffix;
pub mod tree;

mod tracing_helpers;

pub use gc::GarbageCollector;
pub use key::{Key, KeyError};
pub use stats::TreeStats;
pub use tree::Masstree;
