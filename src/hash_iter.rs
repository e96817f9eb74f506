//! Iteration over a `HashIndex`.
//!
//! Two flavors:
//! - `iter()`: an ordinary borrowing iterator. The shared borrow already
//!   rules out mutation, so no bookkeeping is needed.
//! - The cursor protocol (`begin_iterate` / `advance` / `release`), where the
//!   cursor holds no borrow and the caller may keep using the index between
//!   steps. A *safe* cursor pauses all migration until released; the caller
//!   may insert and remove freely. Every entry present for the whole
//!   traversal is yielded exactly once; entries inserted mid-traversal may or
//!   may not be. An *unsafe*
//!   cursor permits nothing but lookups via `peek`/`advance`; any structural
//!   change is reported by `release` as a fatal error.

use crate::error::{IndexError, Result};
use crate::hash::mix64;
use crate::hash_index::{HashIndex, ACTIVE, GROWING};
use slotmap::DefaultKey;

/// Traversal position: table, next bucket to load, prefetched chain entry.
#[derive(Clone, Copy, Debug)]
struct Position {
    table: usize,
    next_bucket: usize,
    next_entry: Option<DefaultKey>,
}

impl Position {
    const START: Position = Position {
        table: ACTIVE,
        next_bucket: 0,
        next_entry: None,
    };
}

/// Detached traversal state. Must be handed back to [`HashIndex::release`].
#[derive(Debug)]
#[must_use = "cursors must be returned with HashIndex::release"]
pub struct IterCursor {
    owner: u64,
    safe: bool,
    pos: Position,
    fingerprint: u64,
}

impl IterCursor {
    pub fn is_safe(&self) -> bool {
        self.safe
    }
}

impl<K, V, P> HashIndex<K, V, P> {
    /// Snapshot of table identities, sizes, fill counts and the mutation epoch.
    pub(crate) fn fingerprint(&self) -> u64 {
        let [active, growing] = &self.tables;
        mix64(&[
            active.buckets.as_ptr() as usize as u64,
            active.size() as u64,
            active.used as u64,
            growing.buckets.as_ptr() as usize as u64,
            growing.size() as u64,
            growing.used as u64,
            self.epoch,
        ])
    }

    /// Follow removal redirects from `k` to the first entry still linked.
    fn resolve(&self, mut k: DefaultKey) -> Option<DefaultKey> {
        while !self.entries.contains_key(k) {
            k = (*self.redirects.get(&k)?)?;
        }
        Some(k)
    }

    /// Advance `pos`, returning the next live entry key. The successor is
    /// prefetched so the returned entry may be removed before the next call;
    /// if the successor itself is removed, its recorded redirect is followed.
    fn next_key(&self, pos: &mut Position) -> Option<DefaultKey> {
        loop {
            if let Some(k) = pos.next_entry.take().and_then(|k| self.resolve(k)) {
                pos.next_entry = self.entries[k].next;
                return Some(k);
            }
            let table = &self.tables[pos.table];
            if pos.next_bucket >= table.size() {
                if pos.table == ACTIVE && self.is_rehashing() {
                    pos.table = GROWING;
                    pos.next_bucket = 0;
                    continue;
                }
                return None;
            }
            pos.next_entry = table.buckets[pos.next_bucket];
            pos.next_bucket += 1;
        }
    }

    /// Start a cursor traversal. A safe cursor pauses migration until released.
    pub fn begin_iterate(&mut self, safe: bool) -> IterCursor {
        let fingerprint = if safe {
            self.safe_iterators += 1;
            0
        } else {
            self.fingerprint()
        };
        IterCursor {
            owner: self.instance,
            safe,
            pos: Position::START,
            fingerprint,
        }
    }

    /// Next entry, or `None` when done or when `cursor` belongs to another index.
    pub fn advance(&self, cursor: &mut IterCursor) -> Option<(&K, &V)> {
        if cursor.owner != self.instance {
            return None;
        }
        let k = self.next_key(&mut cursor.pos)?;
        let entry = &self.entries[k];
        Some((&entry.key, &entry.value))
    }

    /// End a cursor traversal. For an unsafe cursor, a changed fingerprint
    /// means the index was mutated mid-traversal, which is a caller bug.
    pub fn release(&mut self, cursor: IterCursor) -> Result<()> {
        if cursor.owner != self.instance {
            return Err(IndexError::violation(
                "cursor released on an index that did not create it",
            ));
        }
        if cursor.safe {
            if self.safe_iterators == 0 {
                return Err(IndexError::violation(
                    "safe cursor released on an index with no live safe cursors",
                ));
            }
            self.safe_iterators -= 1;
            if self.safe_iterators == 0 {
                self.redirects.clear();
            }
            return Ok(());
        }
        if self.fingerprint() != cursor.fingerprint {
            return Err(IndexError::violation(
                "index mutated during unsafe iteration",
            ));
        }
        Ok(())
    }

    pub fn iter(&self) -> Iter<'_, K, V, P> {
        Iter {
            index: self,
            pos: Position::START,
            remaining: self.len(),
        }
    }
}

/// Borrowing iterator over all entries, active table first.
pub struct Iter<'a, K, V, P> {
    index: &'a HashIndex<K, V, P>,
    pos: Position,
    remaining: usize,
}

impl<'a, K, V, P> Iterator for Iter<'a, K, V, P> {
    type Item = (&'a K, &'a V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let index = self.index;
        let k = index.next_key(&mut self.pos)?;
        self.remaining = self.remaining.saturating_sub(1);
        let entry = &index.entries[k];
        Some((&entry.key, &entry.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, K, V, P> ExactSizeIterator for Iter<'a, K, V, P> {}

impl<'a, K, V, P> IntoIterator for &'a HashIndex<K, V, P> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V, P>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
