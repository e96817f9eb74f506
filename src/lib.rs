//! kvindex: the two in-memory indexes behind a key-value store.
//!
//! - [`HashIndex`]: exact-key lookup with amortized O(1) operations and
//!   bounded per-call latency while the table grows.
//! - [`OrderedIndex`]: score-ordered skip list with O(log n) expected rank
//!   queries and range scans in both directions.
//!
//! Internal Design:
//!
//! Summary
//! - Entries and skip-list nodes live in `slotmap` arenas; chains, forward
//!   links and backward links are generational keys, never pointers.
//! - `HashIndex` keeps two tables. Growth allocates the second and moves one
//!   bucket per operation (plus explicit `rehash`/`rehash_for` batches) until
//!   the first is empty, then swaps. Lookups probe both while migrating.
//! - `OrderedIndex` stores a per-level span on every link so rank and
//!   rank-to-node queries descend the levels instead of walking level 0.
//!
//! Constraints
//! - Single-threaded; callers wrap an instance in their own lock if needed.
//! - Key hashing, equality and copy-on-store hooks come from an
//!   [`EntryPolicy`] bound at construction. Each entry stores its hash, so
//!   migration never calls back into the policy.
//! - Configuration (growth flag, hash seed, skip-list height) is per
//!   instance; there is no process-wide state.
//!
//! Iteration
//! - [`HashIndex::iter`] borrows the index and needs no bookkeeping.
//! - The cursor protocol ([`HashIndex::begin_iterate`], [`HashIndex::advance`],
//!   [`HashIndex::release`]) does not hold a borrow. A safe cursor pauses
//!   migration and allows mutation. An unsafe cursor records a fingerprint
//!   of the tables; any structural change before release is reported as
//!   [`IndexError::InvariantViolation`].
//!
//! Errors
//! - Ordinary outcomes (`NotFound`, `AlreadyExists`, `ResizeRejected`) are
//!   values for the caller to branch on. `InvariantViolation` means the
//!   instance is corrupt and is also logged at error level via `tracing`.
//!
//! Notes and non-goals
//! - No persistence, no concurrent access, no shrinking without an explicit
//!   `resize()` call.
//! - Scores are `f64` ordered by `total_cmp`; equal scores keep insertion order.

pub mod config;
pub mod error;
pub mod hash;
pub mod hash_index;
mod hash_index_proptest;
pub mod hash_iter;
pub mod policy;
pub mod skip_list;
mod skip_list_proptest;

// Public surface
pub use config::{HashIndexConfig, SkipListConfig};
pub use error::{IndexError, Result};
pub use hash_index::HashIndex;
pub use hash_iter::{Iter, IterCursor};
pub use policy::{
    BytesPolicy, CaseInsensitivePolicy, DefaultPolicy, EntryPolicy, IdentityPolicy, IntegerPolicy,
};
pub use skip_list::{NodeHandle, OrderedIndex};
