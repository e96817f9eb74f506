//! Entry policies: the per-key-type capability set a `HashIndex` is built with.
//!
//! A policy bundles hashing, key equality and the copy hooks applied when a
//! key or value is stored. It is bound once at construction; the index never
//! inspects key types at runtime.

use crate::hash::{case_insensitive_hash, int_hash, murmur2};
use core::hash::{BuildHasher, Hash, Hasher};
use hashbrown::hash_map::DefaultHashBuilder;

/// Hashing, equality and copy hooks for keys of type `K` and values of type `V`.
pub trait EntryPolicy<K: Eq, V> {
    /// Hash `key`. `seed` is the index's configured hash seed.
    fn hash(&self, key: &K, seed: u32) -> u64;

    /// Key equality; must agree with `hash` (equal keys hash equally).
    fn equal(&self, a: &K, b: &K) -> bool {
        a == b
    }

    /// Applied to a key right before it is stored in a new entry.
    fn dup_key(&self, key: K) -> K {
        key
    }

    /// Applied to a value right before it is stored (insert and overwrite).
    fn dup_value(&self, value: V) -> V {
        value
    }
}

/// Any `K: Hash + Eq`, hashed with a `BuildHasher` after feeding it the seed.
#[derive(Clone, Debug, Default)]
pub struct DefaultPolicy<S = DefaultHashBuilder> {
    build: S,
}

impl<S> DefaultPolicy<S> {
    pub fn with_hasher(build: S) -> Self {
        Self { build }
    }
}

impl<K, V, S> EntryPolicy<K, V> for DefaultPolicy<S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    #[inline]
    fn hash(&self, key: &K, seed: u32) -> u64 {
        let mut h = self.build.build_hasher();
        h.write_u32(seed);
        key.hash(&mut h);
        h.finish()
    }
}

/// Byte-string keys hashed with seeded MurmurHash2.
#[derive(Clone, Copy, Debug, Default)]
pub struct BytesPolicy;

impl<K, V> EntryPolicy<K, V> for BytesPolicy
where
    K: AsRef<[u8]> + Eq,
{
    #[inline]
    fn hash(&self, key: &K, seed: u32) -> u64 {
        u64::from(murmur2(key.as_ref(), seed))
    }
}

/// String keys compared and hashed ignoring ASCII case.
#[derive(Clone, Copy, Debug, Default)]
pub struct CaseInsensitivePolicy;

impl<K, V> EntryPolicy<K, V> for CaseInsensitivePolicy
where
    K: AsRef<str> + Eq,
{
    #[inline]
    fn hash(&self, key: &K, seed: u32) -> u64 {
        u64::from(case_insensitive_hash(key.as_ref().as_bytes(), seed))
    }

    fn equal(&self, a: &K, b: &K) -> bool {
        a.as_ref().eq_ignore_ascii_case(b.as_ref())
    }
}

/// Integer keys mixed with Wang's 32-bit integer hash. The seed is unused.
#[derive(Clone, Copy, Debug, Default)]
pub struct IntegerPolicy;

impl<K, V> EntryPolicy<K, V> for IntegerPolicy
where
    K: Copy + Eq + Into<u64>,
{
    #[inline]
    fn hash(&self, key: &K, _seed: u32) -> u64 {
        let k: u64 = (*key).into();
        u64::from(int_hash((k as u32) ^ ((k >> 32) as u32)))
    }
}

/// Integer keys used as their own hash. Bucket placement is fully predictable.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityPolicy;

impl<K, V> EntryPolicy<K, V> for IdentityPolicy
where
    K: Copy + Eq + Into<u64>,
{
    #[inline]
    fn hash(&self, key: &K, _seed: u32) -> u64 {
        (*key).into()
    }
}
