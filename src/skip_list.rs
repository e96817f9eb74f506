//! OrderedIndex: skip list ordered by `f64` score, with per-level spans so
//! rank queries cost O(log n) expected.
//!
//! Nodes live in a generational arena and links are arena keys; `None` as a
//! predecessor means the header. Scores compare with `f64::total_cmp`.
//! Equal scores keep insertion order: a new node goes after existing equals,
//! and `delete`/`rank` address the earliest of them.

use crate::config::{SkipListConfig, MAX_SKIP_LEVEL};
use crate::error::{IndexError, Result};
use core::cmp::Ordering;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use slotmap::{DefaultKey, SecondaryMap, SlotMap};

/// Stable reference to a node. Stale handles (node deleted) resolve to `None`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct NodeHandle(DefaultKey);

impl NodeHandle {
    pub fn score<V>(&self, index: &OrderedIndex<V>) -> Option<f64> {
        index.nodes.get(self.0).map(|n| n.score)
    }

    pub fn value<'a, V>(&self, index: &'a OrderedIndex<V>) -> Option<&'a V> {
        index.nodes.get(self.0).map(|n| &n.value)
    }

    pub fn value_mut<'a, V>(&self, index: &'a mut OrderedIndex<V>) -> Option<&'a mut V> {
        index.nodes.get_mut(self.0).map(|n| &mut n.value)
    }
}

/// Forward link at one level and the number of level-0 steps it covers.
#[derive(Clone, Copy, Debug, Default)]
struct Level {
    forward: Option<DefaultKey>,
    span: usize,
}

#[derive(Debug)]
struct Node<V> {
    score: f64,
    value: V,
    backward: Option<DefaultKey>,
    levels: Vec<Level>,
}

pub struct OrderedIndex<V> {
    nodes: SlotMap<DefaultKey, Node<V>>,
    /// Header links, `max_level` long.
    head: Vec<Level>,
    tail: Option<DefaultKey>,
    level: usize,
    len: usize,
    config: SkipListConfig,
    rng: SmallRng,
}

impl<V> Default for OrderedIndex<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> OrderedIndex<V> {
    pub fn new() -> Self {
        Self::build(SkipListConfig::default())
    }

    pub fn with_config(config: SkipListConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: SkipListConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Self {
            nodes: SlotMap::with_key(),
            head: vec![Level::default(); config.max_level],
            tail: None,
            level: 1,
            len: 0,
            config,
            rng,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Tallest level currently in use.
    pub fn level(&self) -> usize {
        self.level
    }

    #[inline]
    fn link(&self, at: Option<DefaultKey>, i: usize) -> Level {
        match at {
            None => self.head[i],
            Some(k) => self.nodes[k].levels[i],
        }
    }

    #[inline]
    fn link_mut(&mut self, at: Option<DefaultKey>, i: usize) -> &mut Level {
        match at {
            None => &mut self.head[i],
            Some(k) => &mut self.nodes[k].levels[i],
        }
    }

    #[inline]
    fn cmp_score(&self, k: DefaultKey, score: f64) -> Ordering {
        self.nodes[k].score.total_cmp(&score)
    }

    fn random_level(&mut self) -> usize {
        let threshold = (self.config.probability * f64::from(u16::MAX)) as u32;
        let mut level = 1;
        while level < self.config.max_level && u32::from(self.rng.gen::<u16>()) < threshold {
            level += 1;
        }
        level
    }

    /// Splice a new node in. Never fails; equal scores land after existing ones.
    pub fn insert(&mut self, score: f64, value: V) -> NodeHandle {
        let mut update = [None; MAX_SKIP_LEVEL];
        let mut rank = [0usize; MAX_SKIP_LEVEL];

        let mut x = None;
        for i in (0..self.level).rev() {
            rank[i] = if i + 1 == self.level { 0 } else { rank[i + 1] };
            while let Some(next) = self.link(x, i).forward {
                if self.cmp_score(next, score) == Ordering::Greater {
                    break;
                }
                rank[i] += self.link(x, i).span;
                x = Some(next);
            }
            update[i] = x;
        }

        let level = self.random_level();
        if level > self.level {
            for i in self.level..level {
                rank[i] = 0;
                update[i] = None;
                self.head[i].span = self.len;
            }
            tracing::trace!(from = self.level, to = level, "skip list level raised");
            self.level = level;
        }

        let key = self.nodes.insert(Node {
            score,
            value,
            backward: None,
            levels: vec![Level::default(); level],
        });
        for i in 0..level {
            let prev = self.link(update[i], i);
            let crossed = rank[0] - rank[i];
            self.nodes[key].levels[i] = Level {
                forward: prev.forward,
                span: prev.span - crossed,
            };
            *self.link_mut(update[i], i) = Level {
                forward: Some(key),
                span: crossed + 1,
            };
        }
        for i in level..self.level {
            self.link_mut(update[i], i).span += 1;
        }

        self.nodes[key].backward = update[0];
        match self.nodes[key].levels[0].forward {
            Some(next) => self.nodes[next].backward = Some(key),
            None => self.tail = Some(key),
        }
        self.len += 1;
        NodeHandle(key)
    }

    /// Per level, the last node whose score is strictly below `score`.
    fn predecessors(&self, score: f64) -> [Option<DefaultKey>; MAX_SKIP_LEVEL] {
        let mut update = [None; MAX_SKIP_LEVEL];
        let mut x = None;
        for i in (0..self.level).rev() {
            while let Some(next) = self.link(x, i).forward {
                if self.cmp_score(next, score) != Ordering::Less {
                    break;
                }
                x = Some(next);
            }
            update[i] = x;
        }
        update
    }

    /// Remove the earliest-inserted node with exactly `score`.
    pub fn delete(&mut self, score: f64) -> Result<V> {
        let update = self.predecessors(score);
        let target = match self.link(update[0], 0).forward {
            Some(t) if self.cmp_score(t, score) == Ordering::Equal => t,
            _ => return Err(IndexError::NotFound),
        };
        self.unlink(target, &update);
        let node = self
            .nodes
            .remove(target)
            .ok_or_else(|| IndexError::violation("unlinked node missing from arena"))?;
        Ok(node.value)
    }

    fn unlink(&mut self, target: DefaultKey, update: &[Option<DefaultKey>]) {
        for (i, &pred) in update.iter().enumerate().take(self.level) {
            let link = self.link(pred, i);
            if link.forward == Some(target) {
                let removed = self.nodes[target].levels[i];
                *self.link_mut(pred, i) = Level {
                    forward: removed.forward,
                    span: link.span + removed.span - 1,
                };
            } else {
                self.link_mut(pred, i).span -= 1;
            }
        }

        let backward = self.nodes[target].backward;
        match self.nodes[target].levels[0].forward {
            Some(next) => self.nodes[next].backward = backward,
            None => self.tail = backward,
        }

        while self.level > 1 && self.head[self.level - 1].forward.is_none() {
            self.level -= 1;
        }
        self.len -= 1;
    }

    /// 1-based rank of the first node with `score`.
    pub fn rank(&self, score: f64) -> Option<usize> {
        let mut x = None;
        let mut rank = 0;
        for i in (0..self.level).rev() {
            while let Some(next) = self.link(x, i).forward {
                if self.cmp_score(next, score) != Ordering::Less {
                    break;
                }
                rank += self.link(x, i).span;
                x = Some(next);
            }
        }
        let next = self.link(x, 0).forward?;
        (self.cmp_score(next, score) == Ordering::Equal).then_some(rank + 1)
    }

    pub fn contains_score(&self, score: f64) -> bool {
        self.rank(score).is_some()
    }

    /// Node at 1-based `rank`.
    pub fn get_by_rank(&self, rank: usize) -> Option<NodeHandle> {
        if rank == 0 || rank > self.len {
            return None;
        }
        let mut x = None;
        let mut traversed = 0;
        for i in (0..self.level).rev() {
            while let Some(next) = self.link(x, i).forward {
                let span = self.link(x, i).span;
                if traversed + span > rank {
                    break;
                }
                traversed += span;
                x = Some(next);
            }
            if traversed == rank {
                return x.map(NodeHandle);
            }
        }
        None
    }

    /// First node with score `>= min`.
    fn first_at_or_above(&self, min: f64) -> Option<DefaultKey> {
        let mut x = None;
        for i in (0..self.level).rev() {
            while let Some(next) = self.link(x, i).forward {
                if self.cmp_score(next, min) != Ordering::Less {
                    break;
                }
                x = Some(next);
            }
        }
        self.link(x, 0).forward
    }

    /// Nodes with `min <= score <= max`, ascending.
    pub fn range_by_score(&self, min: f64, max: f64) -> Range<'_, V> {
        let next = if min.total_cmp(&max) == Ordering::Greater {
            None
        } else {
            self.first_at_or_above(min)
        };
        Range {
            index: self,
            next,
            max,
        }
    }

    /// Nodes with 1-based rank in `start..=end`, ascending.
    pub fn range_by_rank(&self, start: usize, end: usize) -> Iter<'_, V> {
        let end = end.min(self.len);
        let front = if start == 0 || start > end {
            None
        } else {
            self.get_by_rank(start).map(|h| h.0)
        };
        let remaining = if front.is_some() { end - start + 1 } else { 0 };
        let back = if remaining > 0 {
            self.get_by_rank(end).map(|h| h.0)
        } else {
            None
        };
        Iter {
            index: self,
            front,
            back,
            remaining,
        }
    }

    /// All nodes ascending; `.rev()` walks backward links from the tail.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            index: self,
            front: self.head[0].forward,
            back: self.tail,
            remaining: self.len,
        }
    }

    pub fn first(&self) -> Option<NodeHandle> {
        self.head[0].forward.map(NodeHandle)
    }

    pub fn last(&self) -> Option<NodeHandle> {
        self.tail.map(NodeHandle)
    }

    /// Level-0 successor.
    pub fn next(&self, handle: NodeHandle) -> Option<NodeHandle> {
        self.nodes.get(handle.0)?.levels[0].forward.map(NodeHandle)
    }

    /// Level-0 predecessor (`None` at the first node).
    pub fn prev(&self, handle: NodeHandle) -> Option<NodeHandle> {
        self.nodes.get(handle.0)?.backward.map(NodeHandle)
    }

    /// Checks ordering, backward links, tail, length and every span.
    pub fn validate(&self) -> Result<()> {
        if self.level == 0 || self.level > self.config.max_level {
            return Err(IndexError::violation(format!("level {} out of range", self.level)));
        }

        let mut ranks: SecondaryMap<DefaultKey, usize> = SecondaryMap::new();
        let mut prev: Option<DefaultKey> = None;
        let mut cur = self.head[0].forward;
        let mut count = 0;
        while let Some(k) = cur {
            let node = self.nodes.get(k).ok_or_else(|| {
                IndexError::violation(format!("dangling level-0 link after rank {count}"))
            })?;
            count += 1;
            if count > self.nodes.len() {
                return Err(IndexError::violation("cycle on level 0"));
            }
            if node.levels.is_empty() || node.levels.len() > self.level {
                return Err(IndexError::violation(format!(
                    "node at rank {count} has {} levels, list level {}",
                    node.levels.len(),
                    self.level
                )));
            }
            if node.backward != prev {
                return Err(IndexError::violation(format!("bad backward link at rank {count}")));
            }
            if let Some(p) = prev {
                if self.nodes[p].score.total_cmp(&node.score) == Ordering::Greater {
                    return Err(IndexError::violation(format!("order broken at rank {count}")));
                }
            }
            ranks.insert(k, count);
            prev = cur;
            cur = node.levels[0].forward;
        }
        if count != self.len || count != self.nodes.len() {
            return Err(IndexError::violation(format!(
                "length {} but {count} linked and {} allocated",
                self.len,
                self.nodes.len()
            )));
        }
        if self.tail != prev {
            return Err(IndexError::violation("tail is not the last node"));
        }

        for i in 0..self.level {
            let mut at = None;
            let mut pos = 0;
            let mut linked = 0;
            loop {
                let link = self.link(at, i);
                let expected = match link.forward {
                    Some(next) => {
                        let r = *ranks.get(next).ok_or_else(|| {
                            IndexError::violation(format!("level {i} links an unlisted node"))
                        })?;
                        if r <= pos {
                            return Err(IndexError::violation(format!("level {i} goes backward")));
                        }
                        r - pos
                    }
                    None => self.len - pos,
                };
                if link.span != expected {
                    return Err(IndexError::violation(format!(
                        "level {i} span {} after rank {pos}, expected {expected}",
                        link.span
                    )));
                }
                match link.forward {
                    Some(next) => {
                        pos = ranks[next];
                        at = Some(next);
                        linked += 1;
                    }
                    None => break,
                }
            }
            let tall = self.nodes.values().filter(|n| n.levels.len() > i).count();
            if linked != tall {
                return Err(IndexError::violation(format!(
                    "level {i} links {linked} nodes but {tall} are that tall"
                )));
            }
        }
        if self.level > 1 && self.head[self.level - 1].forward.is_none() {
            return Err(IndexError::violation("top level is empty"));
        }
        Ok(())
    }
}

/// Ascending (and, via `rev`, descending) traversal over a contiguous run of nodes.
pub struct Iter<'a, V> {
    index: &'a OrderedIndex<V>,
    front: Option<DefaultKey>,
    back: Option<DefaultKey>,
    remaining: usize,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (NodeHandle, f64, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let k = self.front?;
        let index = self.index;
        let node = &index.nodes[k];
        self.front = node.levels[0].forward;
        self.remaining -= 1;
        Some((NodeHandle(k), node.score, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, V> DoubleEndedIterator for Iter<'a, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let k = self.back?;
        let index = self.index;
        let node = &index.nodes[k];
        self.back = node.backward;
        self.remaining -= 1;
        Some((NodeHandle(k), node.score, &node.value))
    }
}

impl<'a, V> ExactSizeIterator for Iter<'a, V> {}

/// Ascending traversal that stops past `max`.
pub struct Range<'a, V> {
    index: &'a OrderedIndex<V>,
    next: Option<DefaultKey>,
    max: f64,
}

impl<'a, V> Iterator for Range<'a, V> {
    type Item = (NodeHandle, f64, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let k = self.next?;
        let index = self.index;
        let node = &index.nodes[k];
        if node.score.total_cmp(&self.max) == Ordering::Greater {
            self.next = None;
            return None;
        }
        self.next = node.levels[0].forward;
        Some((NodeHandle(k), node.score, &node.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(seed: u64) -> OrderedIndex<&'static str> {
        OrderedIndex::with_config(SkipListConfig::builder().seed(seed).build()).unwrap()
    }

    fn scores<V>(index: &OrderedIndex<V>) -> Vec<f64> {
        index.iter().map(|(_, s, _)| s).collect()
    }

    #[test]
    fn insert_out_of_order_then_query() {
        let mut z = seeded(1);
        for s in [5.0, 1.0, 3.0, 2.0, 4.0] {
            z.insert(s, "v");
            z.validate().unwrap();
        }
        assert_eq!(scores(&z), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(z.len(), 5);
        assert_eq!(z.rank(3.0), Some(3));
        let first = z.get_by_rank(1).unwrap();
        assert_eq!(first.score(&z), Some(1.0));
    }

    /// Invariant: `get_by_rank(rank(s))` resolves back to `s`.
    #[test]
    fn rank_round_trip() {
        let mut z = seeded(7);
        let input: Vec<f64> = (0..200).map(|i| ((i * 37) % 200) as f64).collect();
        for &s in &input {
            z.insert(s, "x");
        }
        z.validate().unwrap();
        for &s in &input {
            let r = z.rank(s).unwrap();
            assert_eq!(r, s as usize + 1);
            assert_eq!(z.get_by_rank(r).unwrap().score(&z), Some(s));
        }
        assert_eq!(z.get_by_rank(0), None);
        assert_eq!(z.get_by_rank(201), None);
    }

    /// Invariant: deleting an absent score changes nothing.
    #[test]
    fn delete_absent_is_not_found() {
        let mut z = seeded(3);
        assert_eq!(z.delete(1.0), Err(IndexError::NotFound));
        for s in [1.0, 2.0, 3.0] {
            z.insert(s, "v");
        }
        let level = z.level();
        assert_eq!(z.delete(2.5), Err(IndexError::NotFound));
        assert_eq!(z.delete(0.0), Err(IndexError::NotFound));
        assert_eq!(z.delete(9.0), Err(IndexError::NotFound));
        assert_eq!(z.len(), 3);
        assert_eq!(z.level(), level);
        assert_eq!(scores(&z), vec![1.0, 2.0, 3.0]);
        z.validate().unwrap();
    }

    #[test]
    fn delete_repairs_spans_and_links() {
        let mut z = seeded(11);
        for i in 0..100 {
            z.insert(i as f64, "v");
        }
        for i in (0..100).step_by(3) {
            assert_eq!(z.delete(i as f64), Ok("v"));
            z.validate().unwrap();
        }
        assert_eq!(z.len(), 66);
        assert_eq!(z.rank(1.0), Some(1));
        assert_eq!(z.rank(2.0), Some(2));
        assert_eq!(z.rank(4.0), Some(3));
        assert_eq!(z.last().unwrap().score(&z), Some(98.0));
    }

    /// Invariant: equal scores keep insertion order; delete takes the oldest.
    #[test]
    fn ties_are_stable() {
        let mut z = seeded(5);
        z.insert(2.0, "later");
        z.insert(1.0, "a");
        z.insert(1.0, "b");
        z.insert(1.0, "c");
        let values: Vec<&str> = z.iter().map(|(_, _, v)| *v).collect();
        assert_eq!(values, vec!["a", "b", "c", "later"]);
        assert_eq!(z.rank(1.0), Some(1));
        assert_eq!(z.delete(1.0), Ok("a"));
        assert_eq!(z.delete(1.0), Ok("b"));
        assert_eq!(z.rank(2.0), Some(2));
        z.validate().unwrap();
    }

    #[test]
    fn backward_traversal() {
        let mut z = seeded(9);
        for s in [3.0, 1.0, 2.0] {
            z.insert(s, "v");
        }
        let rev: Vec<f64> = z.iter().rev().map(|(_, s, _)| s).collect();
        assert_eq!(rev, vec![3.0, 2.0, 1.0]);

        let last = z.last().unwrap();
        let mid = z.prev(last).unwrap();
        assert_eq!(mid.score(&z), Some(2.0));
        let first = z.prev(mid).unwrap();
        assert_eq!(z.prev(first), None);
        assert_eq!(z.next(first), Some(mid));
        assert_eq!(z.first(), Some(first));

        let mut it = z.iter();
        assert_eq!(it.next().map(|(_, s, _)| s), Some(1.0));
        assert_eq!(it.next_back().map(|(_, s, _)| s), Some(3.0));
        assert_eq!(it.next().map(|(_, s, _)| s), Some(2.0));
        assert!(it.next_back().is_none());
    }

    #[test]
    fn range_queries() {
        let mut z = seeded(13);
        for i in 1..=10 {
            z.insert(i as f64, "v");
        }
        let r: Vec<f64> = z.range_by_score(3.0, 6.0).map(|(_, s, _)| s).collect();
        assert_eq!(r, vec![3.0, 4.0, 5.0, 6.0]);
        let r: Vec<f64> = z.range_by_score(2.5, 3.5).map(|(_, s, _)| s).collect();
        assert_eq!(r, vec![3.0]);
        assert_eq!(z.range_by_score(6.0, 3.0).count(), 0);
        assert_eq!(z.range_by_score(11.0, 20.0).count(), 0);
        assert_eq!(z.range_by_score(f64::NEG_INFINITY, f64::INFINITY).count(), 10);

        let r: Vec<f64> = z.range_by_rank(2, 4).map(|(_, s, _)| s).collect();
        assert_eq!(r, vec![2.0, 3.0, 4.0]);
        let r: Vec<f64> = z.range_by_rank(2, 4).rev().map(|(_, s, _)| s).collect();
        assert_eq!(r, vec![4.0, 3.0, 2.0]);
        assert_eq!(z.range_by_rank(9, 50).count(), 2);
        assert_eq!(z.range_by_rank(0, 3).count(), 0);
        assert_eq!(z.range_by_rank(5, 4).count(), 0);
    }

    /// Invariant: handles to deleted nodes never resolve, even after slot reuse.
    #[test]
    fn stale_handle_does_not_alias() {
        let mut z = seeded(17);
        let h = z.insert(1.0, "old");
        z.delete(1.0).unwrap();
        let h2 = z.insert(1.0, "new");
        assert_ne!(h, h2);
        assert_eq!(h.value(&z), None);
        assert_eq!(h2.value(&z), Some(&"new"));
        *h2.value_mut(&mut z).unwrap() = "newer";
        assert_eq!(h2.value(&z), Some(&"newer"));
        assert_eq!(z.next(h), None);
    }

    #[test]
    fn level_trims_after_emptying() {
        let mut z = seeded(19);
        for i in 0..500 {
            z.insert(i as f64, "v");
        }
        assert!(z.level() > 1);
        for i in 0..500 {
            z.delete(i as f64).unwrap();
        }
        assert_eq!(z.level(), 1);
        assert!(z.is_empty());
        assert_eq!(z.first(), None);
        assert_eq!(z.last(), None);
        z.validate().unwrap();
        z.insert(1.0, "again");
        z.validate().unwrap();
    }

    #[test]
    fn single_level_list_still_ranks() {
        let config = SkipListConfig::builder().max_level(1).seed(1).build();
        let mut z = OrderedIndex::with_config(config).unwrap();
        for s in [4.0, 2.0, 3.0, 1.0] {
            z.insert(s, ());
        }
        assert_eq!(z.level(), 1);
        assert_eq!(z.rank(4.0), Some(4));
        z.validate().unwrap();
    }

    #[test]
    fn same_seed_same_shape() {
        let mut a = seeded(42);
        let mut b = seeded(42);
        for i in 0..300 {
            a.insert(i as f64, "v");
            b.insert(i as f64, "v");
            assert_eq!(a.level(), b.level());
        }
    }

    #[test]
    fn invalid_config_rejected() {
        let config = SkipListConfig::builder().probability(1.5).build();
        assert!(matches!(
            OrderedIndex::<()>::with_config(config),
            Err(IndexError::InvalidConfig(_))
        ));
    }

    /// Invariant: corrupted spans are reported as fatal.
    #[test]
    fn validate_catches_bad_span() {
        let mut z = seeded(23);
        for i in 0..10 {
            z.insert(i as f64, "v");
        }
        z.head[0].span += 1;
        assert!(z.validate().unwrap_err().is_fatal());
    }

    #[test]
    fn special_scores_order_totally() {
        let mut z = seeded(29);
        for s in [f64::INFINITY, -0.0, 0.0, f64::NEG_INFINITY, 1.5] {
            z.insert(s, "v");
        }
        let got = scores(&z);
        assert_eq!(got[0], f64::NEG_INFINITY);
        assert!(got[1].is_sign_negative() && got[1] == 0.0);
        assert!(got[2].is_sign_positive() && got[2] == 0.0);
        assert_eq!(got[4], f64::INFINITY);
        assert_eq!(z.rank(0.0), Some(3));
        z.validate().unwrap();
    }
}
