//! Property-based tests for `Masstree`.
//!
//! Differential testing against `BTreeMap`. Keys are drawn from a tiny
//! alphabet so that shared 8-byte prefixes, suffix slots and layer changes
//! come up constantly.

#![expect(clippy::unwrap_used, reason = "fail fast in tests")]

use std::collections::BTreeMap;

use masstree_olc::{Key, Masstree};
use proptest::prelude::*;

// ============================================================================
//  Strategies
// ============================================================================

/// 1..=8 bytes: single layer, inline slots only.
fn short_key() -> impl Strategy<Value = Vec<u8>> + Clone {
    prop::collection::vec(any::<u8>(), 1..=8)
}

/// Keys over `{0, 'a', 'b'}` up to three slices long.
fn prefix_heavy_key() -> impl Strategy<Value = Vec<u8>> + Clone {
    prop::collection::vec(prop::sample::select(vec![0_u8, b'a', b'b']), 1..=24)
}

/// Keys sharing one 16-byte prefix, differing in a short tail.
fn deep_key() -> impl Strategy<Value = Vec<u8>> + Clone {
    prop::collection::vec(prop::sample::select(vec![b'x', b'y']), 0..=10).prop_map(|tail| {
        let mut key: Vec<u8> = b"shared-prefix-16".to_vec();
        key.extend(tail);
        key
    })
}

#[derive(Debug, Clone)]
enum Op {
    Put(Vec<u8>, u32),
    Remove(Vec<u8>),
    Get(Vec<u8>),
}

fn ops(key: impl Strategy<Value = Vec<u8>> + Clone, len: usize) -> impl Strategy<Value = Vec<Op>> {
    let op = prop_oneof![
        4 => (key.clone(), any::<u32>()).prop_map(|(k, v)| Op::Put(k, v)),
        3 => key.clone().prop_map(Op::Remove),
        2 => key.prop_map(Op::Get),
    ];
    prop::collection::vec(op, 1..=len)
}

// ============================================================================
//  Oracle
// ============================================================================

fn run_against_oracle(ops: &[Op]) -> Result<(), TestCaseError> {
    let tree: Masstree<u32> = Masstree::new();
    let mut gc = tree.gc();
    let mut oracle: BTreeMap<Vec<u8>, u32> = BTreeMap::new();

    for op in ops {
        match op {
            Op::Put(k, v) => {
                tree.put(&mut Key::new(k).unwrap(), *v, &mut gc);
                oracle.insert(k.clone(), *v);
            }

            Op::Remove(k) => {
                tree.remove(&mut Key::new(k).unwrap(), &mut gc);
                oracle.remove(k);
            }

            Op::Get(k) => {
                let got: Option<u32> = tree.get(&mut Key::new(k).unwrap()).map(|v| *v);
                prop_assert_eq!(got, oracle.get(k).copied(), "get {:?}", k);
            }
        }
    }

    for (k, v) in &oracle {
        prop_assert_eq!(tree.get_bytes(k).unwrap().map(|v| *v), Some(*v), "final {:?}", k);
    }

    let stats = tree.stats();
    prop_assert_eq!(stats.keys, oracle.len());
    prop_assert_eq!(stats.empty_borders, 0);
    prop_assert_eq!(tree.is_empty(), oracle.is_empty());

    Ok(())
}

// ============================================================================
//  Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Single-layer workloads agree with the oracle.
    #[test]
    fn short_keys_match_btreemap(ops in ops(short_key(), 200)) {
        run_against_oracle(&ops)?;
    }

    /// Prefix-sharing workloads agree with the oracle.
    #[test]
    fn prefix_heavy_keys_match_btreemap(ops in ops(prefix_heavy_key(), 200)) {
        run_against_oracle(&ops)?;
    }

    /// Workloads living below two layers agree with the oracle.
    #[test]
    fn deep_keys_match_btreemap(ops in ops(deep_key(), 150)) {
        run_against_oracle(&ops)?;
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Removing everything leaves an empty tree with no layers.
    #[test]
    fn remove_all_empties_tree(
        keys in prop::collection::btree_set(prefix_heavy_key(), 1..200)
    ) {
        let tree: Masstree<usize> = Masstree::new();
        let mut gc = tree.gc();

        for (i, k) in keys.iter().enumerate() {
            tree.put(&mut Key::new(k).unwrap(), i, &mut gc);
        }
        prop_assert_eq!(tree.stats().keys, keys.len());

        for k in &keys {
            tree.remove(&mut Key::new(k).unwrap(), &mut gc);
        }

        prop_assert!(tree.is_empty());
        prop_assert_eq!(tree.stats().layers, 0);
    }

    /// Overwriting a key never changes the key count.
    #[test]
    fn overwrite_keeps_count(
        keys in prop::collection::btree_set(prefix_heavy_key(), 1..100),
        rounds in 1_usize..4
    ) {
        let tree: Masstree<usize> = Masstree::new();
        let mut gc = tree.gc();

        for round in 0..rounds {
            for k in &keys {
                tree.put(&mut Key::new(k).unwrap(), round, &mut gc);
            }
        }

        prop_assert_eq!(tree.stats().keys, keys.len());
        for k in &keys {
            prop_assert_eq!(tree.get_bytes(k).unwrap().map(|v| *v), Some(rounds - 1));
        }
    }

    /// A key differing from a stored one only by trailing zero bytes is a
    /// different key.
    #[test]
    fn trailing_zeros_are_significant(base in prefix_heavy_key(), zeros in 1_usize..10) {
        let tree: Masstree<u8> = Masstree::new();
        let mut gc = tree.gc();

        let mut padded: Vec<u8> = base.clone();
        padded.extend(std::iter::repeat_n(0, zeros));

        tree.put(&mut Key::new(&base).unwrap(), 1, &mut gc);
        prop_assert!(tree.get_bytes(&padded).unwrap().is_none());

        tree.put(&mut Key::new(&padded).unwrap(), 2, &mut gc);
        prop_assert_eq!(tree.get_bytes(&base).unwrap().map(|v| *v), Some(1));
        prop_assert_eq!(tree.get_bytes(&padded).unwrap().map(|v| *v), Some(2));
    }
}
