#![cfg(test)]

// Property tests for HashIndex kept inside the crate so they can reach the
// table internals (`validate`, cursor state) without feature gates.

use crate::config::HashIndexConfig;
use crate::error::IndexError;
use crate::hash_index::HashIndex;
use crate::policy::{CaseInsensitivePolicy, EntryPolicy, IdentityPolicy};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap};

// Pool-indexed operations: indices shrink to earlier keys and op lists
// shrink in length.
#[derive(Clone, Debug)]
enum Op {
    Insert(usize, i32),
    Upsert(usize, i32),
    GetOrInsert(usize, i32),
    Remove(usize),
    Get(usize),
    Peek(usize),
    Mutate(usize, i32),
    Rehash(usize),
    Resize,
    Iterate,
    SafeSweep,
}

fn arb_ops(pool: usize) -> impl Strategy<Value = Vec<Op>> {
    let idx = 0..pool;
    let op = prop_oneof![
        4 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::Insert(i, v)),
        2 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::Upsert(i, v)),
        1 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::GetOrInsert(i, v)),
        3 => idx.clone().prop_map(Op::Remove),
        2 => idx.clone().prop_map(Op::Get),
        1 => idx.clone().prop_map(Op::Peek),
        1 => (idx.clone(), any::<i32>()).prop_map(|(i, d)| Op::Mutate(i, d)),
        1 => (1usize..8).prop_map(Op::Rehash),
        1 => Just(Op::Resize),
        1 => Just(Op::Iterate),
        1 => Just(Op::SafeSweep),
    ];
    proptest::collection::vec(op, 1..200)
}

// Property: state-machine equivalence against std::collections::HashMap.
// Invariants exercised across random operation sequences, with tiny initial
// tables so most steps run mid-migration:
// - Duplicate inserts are rejected and leave the stored value untouched.
// - `get`/`peek`/`contains_key` parity with the model in either table.
// - `remove` returns the owned pair and the key is gone afterwards.
// - `iter` and safe cursors yield each live entry exactly once.
// - `validate` passes after every operation; `len` matches the model.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine(pool in 1usize..64, ops in arb_ops(64), initial in 0usize..3) {
        let config = HashIndexConfig::builder().initial_size(1 << initial).build();
        let mut sut: HashIndex<u32, i32, IdentityPolicy> =
            HashIndex::with_config_and_policy(config, IdentityPolicy);
        let mut model: HashMap<u32, i32> = HashMap::new();
        let key = |i: usize| (i % pool) as u32;

        for op in ops {
            match op {
                Op::Insert(i, v) => {
                    let k = key(i);
                    match sut.insert(k, v) {
                        Ok(()) => {
                            prop_assert!(!model.contains_key(&k), "insert must fail on duplicate");
                            model.insert(k, v);
                        }
                        Err(IndexError::AlreadyExists) => {
                            prop_assert!(model.contains_key(&k));
                            prop_assert_eq!(sut.peek(&k), model.get(&k));
                        }
                        Err(e) => prop_assert!(false, "unexpected error {e}"),
                    }
                }
                Op::Upsert(i, v) => {
                    let k = key(i);
                    let created = sut.upsert(k, v).unwrap();
                    prop_assert_eq!(created, model.insert(k, v).is_none());
                }
                Op::GetOrInsert(i, v) => {
                    let k = key(i);
                    let got = *sut.get_or_insert_with(k, || v).unwrap();
                    let want = *model.entry(k).or_insert(v);
                    prop_assert_eq!(got, want);
                }
                Op::Remove(i) => {
                    let k = key(i);
                    match model.remove(&k) {
                        Some(mv) => prop_assert_eq!(sut.remove(&k), Ok((k, mv))),
                        None => prop_assert_eq!(sut.remove(&k), Err(IndexError::NotFound)),
                    }
                    prop_assert!(!sut.contains_key(&k).unwrap());
                }
                Op::Get(i) => {
                    let k = key(i);
                    match model.get(&k) {
                        Some(mv) => prop_assert_eq!(sut.get(&k), Ok(mv)),
                        None => prop_assert_eq!(sut.get(&k), Err(IndexError::NotFound)),
                    }
                }
                Op::Peek(i) => {
                    let k = key(i);
                    let cursor = sut.rehash_cursor();
                    prop_assert_eq!(sut.peek(&k), model.get(&k));
                    prop_assert_eq!(sut.rehash_cursor(), cursor, "peek must not migrate");
                }
                Op::Mutate(i, d) => {
                    let k = key(i);
                    if let Some(mv) = model.get_mut(&k) {
                        let v = sut.get_mut(&k).unwrap();
                        *v = v.wrapping_add(d);
                        *mv = mv.wrapping_add(d);
                    }
                }
                Op::Rehash(n) => {
                    let more = sut.rehash(n).unwrap();
                    prop_assert_eq!(more, sut.is_rehashing());
                }
                Op::Resize => {
                    let was_rehashing = sut.is_rehashing();
                    match sut.resize() {
                        Ok(()) => prop_assert!(!was_rehashing),
                        Err(IndexError::ResizeRejected { .. }) => prop_assert!(was_rehashing),
                        Err(e) => prop_assert!(false, "unexpected error {e}"),
                    }
                }
                Op::Iterate => {
                    let seen: Vec<(u32, i32)> = sut.iter().map(|(k, v)| (*k, *v)).collect();
                    prop_assert_eq!(seen.len(), model.len());
                    let seen: BTreeMap<u32, i32> = seen.into_iter().collect();
                    let want: BTreeMap<u32, i32> = model.iter().map(|(k, v)| (*k, *v)).collect();
                    prop_assert_eq!(seen, want);
                }
                Op::SafeSweep => {
                    // Remove every odd value through a safe cursor.
                    let before: BTreeSet<u32> = model.keys().copied().collect();
                    let mut cursor = sut.begin_iterate(true);
                    let mut visited = BTreeSet::new();
                    loop {
                        let (k, odd) = match sut.advance(&mut cursor) {
                            Some((k, v)) => (*k, v % 2 != 0),
                            None => break,
                        };
                        prop_assert!(visited.insert(k), "key {} visited twice", k);
                        if odd {
                            sut.remove(&k).unwrap();
                            model.remove(&k);
                        }
                    }
                    sut.release(cursor).unwrap();
                    prop_assert_eq!(visited, before);
                }
            }

            prop_assert_eq!(sut.len(), model.len());
            prop_assert_eq!(sut.is_empty(), model.is_empty());
            prop_assert_eq!(sut.safe_iterators(), 0);
            sut.validate().unwrap();
        }
    }
}

// Property: an unsafe traversal with no mutation always releases cleanly,
// whatever migration state the index was left in.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_unsafe_cursor_clean(keys in proptest::collection::btree_set(any::<u32>(), 0..100), steps in 0usize..4) {
        let config = HashIndexConfig::builder().initial_size(2).build();
        let mut sut = HashIndex::with_config_and_policy(config, IdentityPolicy);
        for &k in &keys {
            sut.insert(k, ()).unwrap();
        }
        sut.rehash(steps).unwrap();

        let mut cursor = sut.begin_iterate(false);
        let mut seen = BTreeSet::new();
        while let Some((k, _)) = sut.advance(&mut cursor) {
            prop_assert!(seen.insert(*k));
        }
        prop_assert_eq!(sut.release(cursor), Ok(()));
        prop_assert_eq!(seen, keys);
    }
}

// Collision variant: every key lands in bucket 0, so correctness rests on
// the policy's equality alone.
#[derive(Clone, Copy, Default)]
struct Colliding;

impl EntryPolicy<String, i32> for Colliding {
    fn hash(&self, _key: &String, _seed: u32) -> u64 {
        0
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 32, .. ProptestConfig::default() })]
    #[test]
    fn prop_collisions(ops in proptest::collection::vec((any::<bool>(), "[a-d]{0,3}", any::<i32>()), 1..120)) {
        let mut sut = HashIndex::with_policy(Colliding);
        let mut model: HashMap<String, i32> = HashMap::new();
        for (insert, k, v) in ops {
            if insert {
                prop_assert_eq!(sut.upsert(k.clone(), v).unwrap(), model.insert(k, v).is_none());
            } else {
                prop_assert_eq!(sut.remove(&k).ok().map(|(_, v)| v), model.remove(&k));
            }
            prop_assert_eq!(sut.len(), model.len());
            sut.validate().unwrap();
        }
    }
}

// Case-insensitive policy: keys differing only by ASCII case collapse to one
// entry, and the first spelling stored is the one kept.
proptest! {
    #![proptest_config(ProptestConfig { cases: 32, .. ProptestConfig::default() })]
    #[test]
    fn prop_case_insensitive(words in proptest::collection::vec("[a-cA-C]{1,3}", 1..60)) {
        let mut sut = HashIndex::with_policy(CaseInsensitivePolicy);
        let mut model: HashMap<String, String> = HashMap::new();
        for w in words {
            let folded = w.to_ascii_lowercase();
            let first = model.entry(folded).or_insert_with(|| w.clone()).clone();
            let _ = sut.insert(w.clone(), ());
            prop_assert!(sut.peek(&w).is_some());
            let stored: Vec<&String> = sut.iter().map(|(k, _)| k).filter(|k| k.eq_ignore_ascii_case(&w)).collect();
            prop_assert_eq!(stored, vec![&first]);
        }
        prop_assert_eq!(sut.len(), model.len());
    }
}
