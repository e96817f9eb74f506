//! HashIndex: chained hash table that grows by migrating buckets incrementally
//! from an `active` table into a `growing` one.
//!
//! Entries live in a generational arena; buckets and chains hold arena keys,
//! so migration re-links entries without moving or copying them. Each entry
//! stores its hash, and the policy is never called during migration.

use crate::config::HashIndexConfig;
use crate::error::{IndexError, Result};
use crate::policy::{DefaultPolicy, EntryPolicy};
use core::hash::Hash;
use slotmap::{DefaultKey, SlotMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub(crate) const ACTIVE: usize = 0;
pub(crate) const GROWING: usize = 1;

/// Largest table a single index will allocate: 2^32 slots (2^31 on 32-bit targets).
pub const MAX_TABLE_SIZE: usize = 1 << ((if usize::BITS < 33 { usize::BITS } else { 33 }) - 1);

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
pub(crate) struct Entry<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    hash: u64,
    pub(crate) next: Option<DefaultKey>,
}

/// Bucket array; length is zero (unallocated) or a power of two.
#[derive(Debug, Default)]
pub(crate) struct Table {
    pub(crate) buckets: Vec<Option<DefaultKey>>,
    pub(crate) used: usize,
}

impl Table {
    /// `None` if the bucket array cannot be allocated.
    fn try_with_size(size: usize) -> Option<Self> {
        debug_assert!(size.is_power_of_two());
        let mut buckets = Vec::new();
        buckets.try_reserve_exact(size).ok()?;
        buckets.resize(size, None);
        Some(Self { buckets, used: 0 })
    }

    #[inline]
    pub(crate) fn size(&self) -> usize {
        self.buckets.len()
    }

    /// Only valid on an allocated table.
    #[inline]
    fn slot(&self, hash: u64) -> usize {
        (hash as usize) & (self.size() - 1)
    }
}

/// Where a key was found: table, bucket, chain predecessor, entry.
#[derive(Clone, Copy, Debug)]
struct Location {
    table: usize,
    slot: usize,
    prev: Option<DefaultKey>,
    entry: DefaultKey,
}

/// Exact-key index with amortized O(1) operations and bounded per-call rehash work.
///
/// Every lookup or mutation performs one incremental rehash step while a
/// migration is in flight, unless a safe iterator is live.
pub struct HashIndex<K, V, P = DefaultPolicy> {
    policy: P,
    config: HashIndexConfig,
    pub(crate) entries: SlotMap<DefaultKey, Entry<K, V>>,
    pub(crate) tables: [Table; 2],
    rehash_cursor: Option<usize>,
    pub(crate) safe_iterators: usize,
    /// Successor of each entry removed while a safe cursor is live, so a
    /// cursor whose prefetched entry disappears can resume its chain.
    pub(crate) redirects: hashbrown::HashMap<DefaultKey, Option<DefaultKey>>,
    /// Identifies this instance to the cursors it hands out.
    pub(crate) instance: u64,
    /// Bumped on every structural change; part of the unsafe-iterator fingerprint.
    pub(crate) epoch: u64,
}

impl<K, V> HashIndex<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self::with_policy(DefaultPolicy::default())
    }

    pub fn with_config(config: HashIndexConfig) -> Self {
        Self::with_config_and_policy(config, DefaultPolicy::default())
    }
}

impl<K, V> Default for HashIndex<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, P> HashIndex<K, V, P> {
    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.tables[ACTIVE].used + self.tables[GROWING].used
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total slot count across both tables.
    pub fn capacity(&self) -> usize {
        self.tables[ACTIVE].size() + self.tables[GROWING].size()
    }

    /// `(active, growing)` slot counts.
    pub fn table_sizes(&self) -> (usize, usize) {
        (self.tables[ACTIVE].size(), self.tables[GROWING].size())
    }

    #[inline]
    pub fn is_rehashing(&self) -> bool {
        self.rehash_cursor.is_some()
    }

    /// Next bucket in the active table awaiting migration.
    pub fn rehash_cursor(&self) -> Option<usize> {
        self.rehash_cursor
    }

    /// Live safe iterators; while non-zero, no migration happens.
    pub fn safe_iterators(&self) -> usize {
        self.safe_iterators
    }

    pub fn config(&self) -> &HashIndexConfig {
        &self.config
    }

    /// Full structural check: table sizes, chain placement, used counts,
    /// migrated prefix emptiness and arena accounting.
    pub fn validate(&self) -> Result<()> {
        let mut chained_total = 0usize;
        for (t, table) in self.tables.iter().enumerate() {
            let size = table.size();
            if size != 0 && !size.is_power_of_two() {
                return Err(IndexError::violation(format!(
                    "table {t} size {size} is not a power of two"
                )));
            }
            let mut chained = 0usize;
            for (slot, head) in table.buckets.iter().enumerate() {
                if t == ACTIVE && head.is_some() {
                    if let Some(cursor) = self.rehash_cursor {
                        if slot < cursor {
                            return Err(IndexError::violation(format!(
                                "bucket {slot} below rehash cursor {cursor} is not empty"
                            )));
                        }
                    }
                }
                let mut cur = *head;
                while let Some(k) = cur {
                    let entry = self.entries.get(k).ok_or_else(|| {
                        IndexError::violation(format!("dangling chain link in table {t}"))
                    })?;
                    if table.slot(entry.hash) != slot {
                        return Err(IndexError::violation(format!(
                            "entry in table {t} bucket {slot} belongs in bucket {}",
                            table.slot(entry.hash)
                        )));
                    }
                    chained += 1;
                    if chained > self.entries.len() {
                        return Err(IndexError::violation(format!("cycle in table {t}")));
                    }
                    cur = entry.next;
                }
            }
            if chained != table.used {
                return Err(IndexError::violation(format!(
                    "table {t} used={} but {chained} entries chained",
                    table.used
                )));
            }
            chained_total += chained;
        }
        match self.rehash_cursor {
            None if self.tables[GROWING].size() != 0 => {
                return Err(IndexError::violation("growing table allocated while idle"));
            }
            Some(cursor) if cursor > self.tables[ACTIVE].size() => {
                return Err(IndexError::violation(format!(
                    "rehash cursor {cursor} past active size {}",
                    self.tables[ACTIVE].size()
                )));
            }
            _ => {}
        }
        if chained_total != self.entries.len() {
            return Err(IndexError::violation(format!(
                "{} entries allocated but {chained_total} reachable",
                self.entries.len()
            )));
        }
        Ok(())
    }
}

impl<K, V, P> HashIndex<K, V, P>
where
    K: Eq,
    P: EntryPolicy<K, V>,
{
    pub fn with_policy(policy: P) -> Self {
        Self::with_config_and_policy(HashIndexConfig::default(), policy)
    }

    pub fn with_config_and_policy(mut config: HashIndexConfig, policy: P) -> Self {
        config.initial_size = config.initial_size.max(1).next_power_of_two();
        config.rehash_batch = config.rehash_batch.max(1);
        Self {
            policy,
            config,
            entries: SlotMap::with_key(),
            tables: [Table::default(), Table::default()],
            rehash_cursor: None,
            safe_iterators: 0,
            redirects: hashbrown::HashMap::new(),
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
            epoch: 0,
        }
    }

    #[inline]
    fn hash_of(&self, key: &K) -> u64 {
        self.policy.hash(key, self.config.hash_seed)
    }

    /// Probe `active`, then `growing` while rehashing; first match wins.
    fn locate(&self, key: &K, hash: u64) -> Option<Location> {
        let probed = if self.is_rehashing() { 2 } else { 1 };
        for (t, table) in self.tables.iter().enumerate().take(probed) {
            if table.size() == 0 {
                continue;
            }
            let slot = table.slot(hash);
            let mut prev = None;
            let mut cur = table.buckets[slot];
            while let Some(k) = cur {
                let entry = &self.entries[k];
                if entry.hash == hash && self.policy.equal(&entry.key, key) {
                    return Some(Location {
                        table: t,
                        slot,
                        prev,
                        entry: k,
                    });
                }
                prev = Some(k);
                cur = entry.next;
            }
        }
        None
    }

    /// One bucket of migration, skipped while a safe iterator is live.
    fn step(&mut self) -> Result<()> {
        if self.is_rehashing() && self.safe_iterators == 0 {
            self.migrate(1)?;
        }
        Ok(())
    }

    fn migrate(&mut self, buckets: usize) -> Result<bool> {
        let Some(mut cursor) = self.rehash_cursor else {
            return Ok(false);
        };

        for _ in 0..buckets {
            if self.tables[ACTIVE].used == 0 {
                break;
            }
            loop {
                if cursor >= self.tables[ACTIVE].size() {
                    return Err(IndexError::violation(format!(
                        "rehash cursor {cursor} reached active size {} with {} entries left",
                        self.tables[ACTIVE].size(),
                        self.tables[ACTIVE].used
                    )));
                }
                if self.tables[ACTIVE].buckets[cursor].is_some() {
                    break;
                }
                cursor += 1;
            }

            let mut link = self.tables[ACTIVE].buckets[cursor].take();
            let [active, growing] = &mut self.tables;
            while let Some(k) = link {
                let entry = &mut self.entries[k];
                link = entry.next;
                let slot = growing.slot(entry.hash);
                entry.next = growing.buckets[slot];
                growing.buckets[slot] = Some(k);
                active.used -= 1;
                growing.used += 1;
            }
            cursor += 1;
        }

        self.rehash_cursor = Some(cursor);
        self.epoch = self.epoch.wrapping_add(1);
        tracing::trace!(cursor, remaining = self.tables[ACTIVE].used, "rehash step");

        if self.tables[ACTIVE].used == 0 {
            self.finish_rehash();
            return Ok(false);
        }
        Ok(true)
    }

    fn finish_rehash(&mut self) {
        self.tables[ACTIVE] = std::mem::take(&mut self.tables[GROWING]);
        self.rehash_cursor = None;
        self.epoch = self.epoch.wrapping_add(1);
        tracing::debug!(size = self.tables[ACTIVE].size(), "rehash complete");
    }

    /// Migrate up to `buckets` non-empty buckets now. Returns true while
    /// migration work remains. Does nothing while a safe iterator is live.
    pub fn rehash(&mut self, buckets: usize) -> Result<bool> {
        if self.safe_iterators > 0 {
            return Ok(self.is_rehashing());
        }
        self.migrate(buckets)
    }

    /// Migrate in `rehash_batch`-sized batches until done or `budget` has
    /// elapsed (checked between batches). Returns buckets processed, counted
    /// per batch.
    pub fn rehash_for(&mut self, budget: Duration) -> Result<usize> {
        if self.safe_iterators > 0 {
            return Ok(0);
        }
        let start = Instant::now();
        let batch = self.config.rehash_batch;
        let mut processed = 0;
        while self.is_rehashing() {
            let more = self.migrate(batch)?;
            processed += batch;
            if !more || start.elapsed() >= budget {
                break;
            }
        }
        Ok(processed)
    }

    fn reject(&self, reason: &'static str) -> IndexError {
        tracing::warn!(reason, "resize rejected");
        IndexError::ResizeRejected { reason }
    }

    fn next_power(&self, size: usize) -> usize {
        size.max(self.config.initial_size)
            .min(MAX_TABLE_SIZE)
            .next_power_of_two()
    }

    /// Allocate the first table, or start migrating into a table of at
    /// least `size` slots.
    pub fn expand(&mut self, size: usize) -> Result<()> {
        if self.is_rehashing() {
            return Err(self.reject("rehash in progress"));
        }
        if self.tables[ACTIVE].used > size {
            return Err(self.reject("requested size smaller than entry count"));
        }
        if size > MAX_TABLE_SIZE {
            return Err(self.reject("requested size too large"));
        }
        let real = self.next_power(size);
        if real == self.tables[ACTIVE].size() {
            return Ok(());
        }

        let Some(table) = Table::try_with_size(real) else {
            return Err(self.reject("table allocation failed"));
        };
        self.epoch = self.epoch.wrapping_add(1);
        if self.tables[ACTIVE].size() == 0 {
            tracing::debug!(size = real, "allocated initial table");
            self.tables[ACTIVE] = table;
            return Ok(());
        }

        tracing::debug!(
            from = self.tables[ACTIVE].size(),
            to = real,
            used = self.tables[ACTIVE].used,
            "starting incremental rehash"
        );
        self.tables[GROWING] = table;
        self.rehash_cursor = Some(0);
        Ok(())
    }

    /// Fit the table to its contents: the smallest power of two holding
    /// `max(len, initial_size)`. Never called automatically.
    pub fn resize(&mut self) -> Result<()> {
        if !self.config.growth_enabled {
            return Err(self.reject("growth disabled"));
        }
        if self.is_rehashing() {
            return Err(self.reject("rehash in progress"));
        }
        if self.tables[ACTIVE].size() == 0 {
            return Ok(());
        }
        let minimal = self.tables[ACTIVE].used.max(self.config.initial_size);
        self.expand(minimal)
    }

    fn expand_if_needed(&mut self) -> Result<()> {
        if self.is_rehashing() {
            return Ok(());
        }
        let size = self.tables[ACTIVE].size();
        if size == 0 {
            return self.expand(self.config.initial_size);
        }
        let used = self.tables[ACTIVE].used;
        if size < MAX_TABLE_SIZE
            && used >= size
            && (self.config.growth_enabled || used / size > self.config.force_resize_ratio)
        {
            return self.expand(used.saturating_mul(2).min(MAX_TABLE_SIZE));
        }
        Ok(())
    }

    /// Head-insert a new entry into the table new keys go to.
    fn link_new(&mut self, key: K, value: V, hash: u64) -> DefaultKey {
        let key = self.policy.dup_key(key);
        let value = self.policy.dup_value(value);
        let t = if self.is_rehashing() { GROWING } else { ACTIVE };
        let table = &mut self.tables[t];
        let slot = table.slot(hash);
        let k = self.entries.insert(Entry {
            key,
            value,
            hash,
            next: table.buckets[slot],
        });
        table.buckets[slot] = Some(k);
        table.used += 1;
        self.epoch = self.epoch.wrapping_add(1);
        k
    }

    fn find_entry(&mut self, key: &K) -> Result<DefaultKey> {
        if self.tables[ACTIVE].size() == 0 {
            return Err(IndexError::NotFound);
        }
        self.step()?;
        let hash = self.hash_of(key);
        self.locate(key, hash)
            .map(|loc| loc.entry)
            .ok_or(IndexError::NotFound)
    }

    pub fn get(&mut self, key: &K) -> Result<&V> {
        let k = self.find_entry(key)?;
        Ok(&self.entries[k].value)
    }

    pub fn get_mut(&mut self, key: &K) -> Result<&mut V> {
        let k = self.find_entry(key)?;
        Ok(&mut self.entries[k].value)
    }

    pub fn contains_key(&mut self, key: &K) -> Result<bool> {
        match self.find_entry(key) {
            Ok(_) => Ok(true),
            Err(IndexError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Lookup without a rehash step.
    pub fn peek(&self, key: &K) -> Option<&V> {
        if self.tables[ACTIVE].size() == 0 {
            return None;
        }
        let hash = self.hash_of(key);
        self.locate(key, hash).map(|loc| &self.entries[loc.entry].value)
    }

    /// Insert a new key. Fails with `AlreadyExists`, leaving the stored value
    /// untouched, if the key is present.
    pub fn insert(&mut self, key: K, value: V) -> Result<()> {
        self.step()?;
        let hash = self.hash_of(&key);
        if self.locate(&key, hash).is_some() {
            return Err(IndexError::AlreadyExists);
        }
        self.expand_if_needed()?;
        self.link_new(key, value, hash);
        Ok(())
    }

    /// Insert or overwrite. Returns true if a new entry was created.
    pub fn upsert(&mut self, key: K, value: V) -> Result<bool> {
        self.step()?;
        let hash = self.hash_of(&key);
        if let Some(loc) = self.locate(&key, hash) {
            let value = self.policy.dup_value(value);
            self.entries[loc.entry].value = value;
            return Ok(false);
        }
        self.expand_if_needed()?;
        self.link_new(key, value, hash);
        Ok(true)
    }

    /// Find `key`, inserting `default()` first if absent. `default` only
    /// runs on insert.
    pub fn get_or_insert_with<F>(&mut self, key: K, default: F) -> Result<&mut V>
    where
        F: FnOnce() -> V,
    {
        self.step()?;
        let hash = self.hash_of(&key);
        let k = match self.locate(&key, hash) {
            Some(loc) => loc.entry,
            None => {
                self.expand_if_needed()?;
                self.link_new(key, default(), hash)
            }
        };
        Ok(&mut self.entries[k].value)
    }

    /// Unlink `key` and hand back the owned pair.
    pub fn remove(&mut self, key: &K) -> Result<(K, V)> {
        if self.tables[ACTIVE].size() == 0 {
            return Err(IndexError::NotFound);
        }
        self.step()?;
        let hash = self.hash_of(key);
        let loc = self.locate(key, hash).ok_or(IndexError::NotFound)?;

        let next = self.entries[loc.entry].next;
        match loc.prev {
            Some(prev) => self.entries[prev].next = next,
            None => self.tables[loc.table].buckets[loc.slot] = next,
        }
        self.tables[loc.table].used -= 1;
        self.epoch = self.epoch.wrapping_add(1);
        if self.safe_iterators > 0 {
            self.redirects.insert(loc.entry, next);
        }

        let entry = self
            .entries
            .remove(loc.entry)
            .ok_or_else(|| IndexError::violation("chained entry missing from arena"))?;
        Ok((entry.key, entry.value))
    }
}
