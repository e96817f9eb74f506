//! Construction-time configuration for both indexes.
//!
//! Everything that used to be process-wide (growth flag, hash seed) is a
//! per-instance value here.

use crate::error::{IndexError, Result};

/// Seed mixed into the stock string/byte hash functions.
pub const DEFAULT_HASH_SEED: u32 = 5381;

/// Upper bound on skip-list height.
pub const MAX_SKIP_LEVEL: usize = 64;

/// Configuration for [`HashIndex`](crate::HashIndex).
#[derive(Debug, Clone)]
pub struct HashIndexConfig {
    /// Slot count of the first table, allocated on first insert. Always a power of two.
    pub initial_size: usize,

    /// When false, automatic growth only happens once `used / size` exceeds
    /// `force_resize_ratio`, and explicit `resize()` is rejected.
    pub growth_enabled: bool,

    pub force_resize_ratio: usize,

    /// Passed to the entry policy on every hash computation.
    pub hash_seed: u32,

    /// Buckets migrated per batch by `rehash_for`.
    pub rehash_batch: usize,
}

impl Default for HashIndexConfig {
    fn default() -> Self {
        Self {
            initial_size: 4,
            growth_enabled: true,
            force_resize_ratio: 5,
            hash_seed: DEFAULT_HASH_SEED,
            rehash_batch: 100,
        }
    }
}

impl HashIndexConfig {
    pub fn builder() -> HashIndexConfigBuilder {
        HashIndexConfigBuilder::default()
    }
}

/// Builder for [`HashIndexConfig`].
#[derive(Default)]
pub struct HashIndexConfigBuilder {
    config: HashIndexConfig,
}

impl HashIndexConfigBuilder {
    /// Initial table size; rounded up to the next power of two.
    pub fn initial_size(mut self, size: usize) -> Self {
        self.config.initial_size = size.max(1).next_power_of_two();
        self
    }

    pub fn growth_enabled(mut self, enabled: bool) -> Self {
        self.config.growth_enabled = enabled;
        self
    }

    pub fn force_resize_ratio(mut self, ratio: usize) -> Self {
        self.config.force_resize_ratio = ratio;
        self
    }

    pub fn hash_seed(mut self, seed: u32) -> Self {
        self.config.hash_seed = seed;
        self
    }

    /// Buckets per batch for time-budgeted rehashing (at least 1).
    pub fn rehash_batch(mut self, buckets: usize) -> Self {
        self.config.rehash_batch = buckets.max(1);
        self
    }

    pub fn build(self) -> HashIndexConfig {
        self.config
    }
}

/// Configuration for [`OrderedIndex`](crate::OrderedIndex).
#[derive(Debug, Clone)]
pub struct SkipListConfig {
    /// Tallest level a node may be given.
    pub max_level: usize,

    /// Chance of promoting a node one more level.
    pub probability: f64,

    /// Seed for level sampling; `None` seeds from OS entropy once at construction.
    pub seed: Option<u64>,
}

impl Default for SkipListConfig {
    fn default() -> Self {
        Self {
            max_level: 32,
            probability: 0.25,
            seed: None,
        }
    }
}

impl SkipListConfig {
    pub fn builder() -> SkipListConfigBuilder {
        SkipListConfigBuilder::default()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_level == 0 || self.max_level > MAX_SKIP_LEVEL {
            return Err(IndexError::InvalidConfig(format!(
                "max_level must be in 1..={}, got {}",
                MAX_SKIP_LEVEL, self.max_level
            )));
        }
        if !(self.probability > 0.0 && self.probability < 1.0) {
            return Err(IndexError::InvalidConfig(format!(
                "probability must be in (0, 1), got {}",
                self.probability
            )));
        }
        Ok(())
    }
}

/// Builder for [`SkipListConfig`].
#[derive(Default)]
pub struct SkipListConfigBuilder {
    config: SkipListConfig,
}

impl SkipListConfigBuilder {
    pub fn max_level(mut self, level: usize) -> Self {
        self.config.max_level = level;
        self
    }

    pub fn probability(mut self, p: f64) -> Self {
        self.config.probability = p;
        self
    }

    /// Fix the level-sampling seed (reproducible layouts).
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn build(self) -> SkipListConfig {
        self.config
    }
}
