#![cfg(test)]

// Property tests for OrderedIndex against a sorted Vec model. In-crate so
// `validate` runs against the real span bookkeeping after every step.

use crate::config::SkipListConfig;
use crate::error::IndexError;
use crate::skip_list::{NodeHandle, OrderedIndex};
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Op {
    Insert(u8),
    Delete(u8),
    Rank(u8),
    ByRank(usize),
    RangeScore(u8, u8),
    RangeRank(usize, usize),
    Walk,
}

fn arb_ops() -> impl Strategy<Value = Vec<Op>> {
    // Scores come from a small domain so ties and hits are common.
    let score = 0u8..32;
    let op = prop_oneof![
        4 => score.clone().prop_map(Op::Insert),
        3 => score.clone().prop_map(Op::Delete),
        1 => score.clone().prop_map(Op::Rank),
        1 => (0usize..80).prop_map(Op::ByRank),
        1 => (score.clone(), score.clone()).prop_map(|(a, b)| Op::RangeScore(a, b)),
        1 => (0usize..80, 0usize..80).prop_map(|(a, b)| Op::RangeRank(a, b)),
        1 => Just(Op::Walk),
    ];
    proptest::collection::vec(op, 1..250)
}

// Model entries are (score, insertion serial); ties order by serial, which
// is exactly the stable order the index promises.
fn model_insert(model: &mut Vec<(f64, u32)>, score: f64, serial: u32) {
    let at = model.partition_point(|(s, _)| *s <= score);
    model.insert(at, (score, serial));
}

fn model_rank(model: &[(f64, u32)], score: f64) -> Option<usize> {
    let at = model.partition_point(|(s, _)| *s < score);
    (model.get(at).map(|(s, _)| *s) == Some(score)).then_some(at + 1)
}

fn collect<'a>(items: impl Iterator<Item = (NodeHandle, f64, &'a u32)>) -> Vec<(f64, u32)> {
    items.map(|(_, s, v)| (s, *v)).collect()
}

// Property: state-machine equivalence with a sorted Vec.
// - `insert` places ties after existing equals; `delete` removes the oldest.
// - `rank`, `get_by_rank` and both range queries agree with the model.
// - Forward and backward walks are mirror images and match the model.
// - `validate` (order, backward links, spans, level trim) holds after each op.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine(ops in arb_ops(), seed in any::<u64>(), max_level in 1usize..=32) {
        let config = SkipListConfig::builder().max_level(max_level).seed(seed).build();
        let mut sut: OrderedIndex<u32> = OrderedIndex::with_config(config).unwrap();
        let mut model: Vec<(f64, u32)> = Vec::new();
        let mut serial = 0u32;

        for op in ops {
            match op {
                Op::Insert(s) => {
                    let score = f64::from(s);
                    let h = sut.insert(score, serial);
                    prop_assert_eq!(h.score(&sut), Some(score));
                    model_insert(&mut model, score, serial);
                    serial += 1;
                }
                Op::Delete(s) => {
                    let score = f64::from(s);
                    match model_rank(&model, score) {
                        Some(r) => {
                            let (_, v) = model.remove(r - 1);
                            prop_assert_eq!(sut.delete(score), Ok(v));
                        }
                        None => prop_assert_eq!(sut.delete(score), Err(IndexError::NotFound)),
                    }
                }
                Op::Rank(s) => {
                    let score = f64::from(s);
                    prop_assert_eq!(sut.rank(score), model_rank(&model, score));
                    prop_assert_eq!(sut.contains_score(score), model_rank(&model, score).is_some());
                }
                Op::ByRank(r) => {
                    let got = sut.get_by_rank(r).map(|h| (h.score(&sut), h.value(&sut).copied()));
                    let want = r
                        .checked_sub(1)
                        .and_then(|i| model.get(i))
                        .map(|&(s, v)| (Some(s), Some(v)));
                    prop_assert_eq!(got, want);
                }
                Op::RangeScore(a, b) => {
                    let (min, max) = (f64::from(a), f64::from(b));
                    let want: Vec<(f64, u32)> =
                        model.iter().copied().filter(|(s, _)| min <= *s && *s <= max).collect();
                    prop_assert_eq!(collect(sut.range_by_score(min, max)), want);
                }
                Op::RangeRank(a, b) => {
                    let want: Vec<(f64, u32)> = if a == 0 || a > b {
                        Vec::new()
                    } else {
                        model.iter().copied().skip(a - 1).take(b + 1 - a).collect()
                    };
                    let range = sut.range_by_rank(a, b);
                    prop_assert_eq!(range.len(), want.len());
                    prop_assert_eq!(collect(range), want.clone());
                    let mut back = collect(sut.range_by_rank(a, b).rev());
                    back.reverse();
                    prop_assert_eq!(back, want);
                }
                Op::Walk => {
                    prop_assert_eq!(collect(sut.iter()), model.clone());
                    let mut back = collect(sut.iter().rev());
                    back.reverse();
                    prop_assert_eq!(back, model.clone());

                    let mut via_prev = Vec::new();
                    let mut cur = sut.last();
                    while let Some(h) = cur {
                        via_prev.push(*h.value(&sut).unwrap());
                        cur = sut.prev(h);
                    }
                    via_prev.reverse();
                    let serials: Vec<u32> = model.iter().map(|(_, v)| *v).collect();
                    prop_assert_eq!(via_prev, serials);
                }
            }

            prop_assert_eq!(sut.len(), model.len());
            prop_assert!(sut.level() >= 1 && sut.level() <= max_level);
            sut.validate().unwrap();
        }
    }
}

// Property: handles stay valid until their node is deleted and never
// resolve afterwards, even when the arena slot is reused.
proptest! {
    #![proptest_config(ProptestConfig { cases: 32, .. ProptestConfig::default() })]
    #[test]
    fn prop_handles(scores in proptest::collection::vec(0u16..1000, 1..120)) {
        let mut sut = OrderedIndex::with_config(SkipListConfig::builder().seed(7).build()).unwrap();
        let mut live: Vec<(NodeHandle, u16)> = Vec::new();
        let mut stale: Vec<NodeHandle> = Vec::new();
        for s in scores {
            if s % 3 == 0 && !live.is_empty() {
                // Delete the oldest live node with the smallest score.
                let min = live.iter().map(|(_, s)| *s).min().unwrap_or_default();
                let pos = live.iter().position(|(_, s)| *s == min).unwrap_or_default();
                let (h, score) = live.remove(pos);
                prop_assert_eq!(sut.delete(f64::from(score)), Ok(score));
                stale.push(h);
            } else {
                live.push((sut.insert(f64::from(s), s), s));
            }
            for (h, s) in &live {
                prop_assert_eq!(h.value(&sut), Some(s));
            }
            for h in &stale {
                prop_assert_eq!(h.value(&sut), None);
                prop_assert_eq!(h.score(&sut), None);
            }
        }
    }
}
