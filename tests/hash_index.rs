// HashIndex integration suite.
//
// Exercises the public surface only. Core invariants:
// - Growth: exactly one migration starts when the active table fills, and
//   draining it leaves a single table holding every key.
// - Migration is bounded: each operation moves at most one bucket.
// - Safe cursors freeze migration until released; unsafe cursors report
//   any structural change at release.
// - Duplicate inserts and misses are ordinary results, not failures.
use kvindex::{
    BytesPolicy, CaseInsensitivePolicy, HashIndex, HashIndexConfig, IndexError, IntegerPolicy,
};
use std::sync::Once;
use std::time::Duration;

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn drain<K: Eq + std::hash::Hash, V>(m: &mut HashIndex<K, V>, probe: &K) -> usize {
    let mut steps = 0;
    while m.is_rehashing() {
        let _ = m.get(probe);
        steps += 1;
        assert!(steps <= m.capacity(), "migration did not converge");
    }
    steps
}

// Test: one growth event when the table fills, then a full drain.
// Verifies: capacity reflects only the new table once the cursor is drained,
// and every key stays retrievable throughout.
#[test]
fn growth_then_drain() {
    init_tracing();
    let config = HashIndexConfig::builder().initial_size(4).build();
    let mut m: HashIndex<String, usize> = HashIndex::with_config(config);

    let mut growth_events = 0;
    for i in 0..5 {
        let was = m.is_rehashing();
        m.insert(format!("key{i}"), i).unwrap();
        if !was && m.is_rehashing() {
            growth_events += 1;
            assert_eq!(m.table_sizes(), (4, 8));
        }
    }
    assert_eq!(growth_events, 1);
    assert_eq!(m.len(), 5);

    drain(&mut m, &"key0".to_string());
    assert_eq!(m.capacity(), 8);
    assert_eq!(m.table_sizes(), (8, 0));
    for i in 0..5 {
        assert_eq!(m.get(&format!("key{i}")), Ok(&i));
    }
    m.validate().unwrap();
}

// Test: safe cursor blocks migration.
// Verifies: lookups, overwrites and explicit rehash requests leave the
// cursor untouched until release.
#[test]
fn safe_cursor_freezes_migration() {
    init_tracing();
    let config = HashIndexConfig::builder().initial_size(4).build();
    let mut m: HashIndex<u64, u64> = HashIndex::with_config(config);
    for i in 0..5 {
        m.insert(i, i).unwrap();
    }
    assert!(m.is_rehashing());
    let frozen = m.rehash_cursor();

    let cursor = m.begin_iterate(true);
    for i in 0..5 {
        m.get(&i).unwrap();
        m.upsert(i, i + 10).unwrap();
    }
    m.rehash(100).unwrap();
    m.rehash_for(Duration::from_millis(5)).unwrap();
    assert_eq!(m.rehash_cursor(), frozen);

    m.release(cursor).unwrap();
    drain(&mut m, &0);
    assert_eq!(m.len(), 5);
    assert_eq!(m.get(&4), Ok(&14));
}

// Test: unsafe cursor misuse.
// Verifies: a mutation between begin and release is surfaced as a fatal error.
#[test]
fn unsafe_cursor_misuse_is_fatal() {
    init_tracing();
    let mut m: HashIndex<u64, ()> = HashIndex::new();
    m.insert(1, ()).unwrap();
    let mut cursor = m.begin_iterate(false);
    assert!(!cursor.is_safe());
    assert!(m.advance(&mut cursor).is_some());
    m.remove(&1).unwrap();
    let err = m.release(cursor).unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, IndexError::InvariantViolation(_)));
}

// Test: ordinary outcomes.
// Verifies: NotFound and AlreadyExists leave the index unchanged.
#[test]
fn misses_and_duplicates_are_values() {
    let mut m: HashIndex<String, i32> = HashIndex::new();
    assert_eq!(m.get(&"nope".to_string()), Err(IndexError::NotFound));
    assert_eq!(m.remove(&"nope".to_string()), Err(IndexError::NotFound));
    m.insert("a".to_string(), 1).unwrap();
    assert_eq!(m.insert("a".to_string(), 2), Err(IndexError::AlreadyExists));
    assert_eq!(m.get(&"a".to_string()), Ok(&1));
    assert_eq!(m.len(), 1);
}

// Test: time-budgeted rehash.
// Verifies: a generous budget drains a large migration in one call.
#[test]
fn rehash_for_drains_large_table() {
    init_tracing();
    let config = HashIndexConfig::builder().rehash_batch(16).build();
    let mut m: HashIndex<u32, u32, IntegerPolicy> =
        HashIndex::with_config_and_policy(config, IntegerPolicy);
    for i in 0..4096 {
        m.insert(i, i).unwrap();
    }
    m.rehash_for(Duration::from_secs(5)).unwrap();
    assert!(!m.is_rehashing());
    let (size, _) = m.table_sizes();
    assert!(size >= 4096);

    m.expand(size * 4).unwrap();
    assert!(m.is_rehashing());
    let processed = m.rehash_for(Duration::from_secs(5)).unwrap();
    assert!(processed > 0);
    assert!(!m.is_rehashing());
    assert_eq!(m.len(), 4096);
    m.validate().unwrap();
}

// Test: growth disabled.
// Verifies: tables still grow once the load passes the forced ratio, and
// explicit resize is refused.
#[test]
fn growth_disabled_still_forces_past_ratio() {
    let config = HashIndexConfig::builder()
        .initial_size(4)
        .growth_enabled(false)
        .build();
    let mut m: HashIndex<u32, u32, IntegerPolicy> =
        HashIndex::with_config_and_policy(config, IntegerPolicy);
    for i in 0..24 {
        m.insert(i, i).unwrap();
    }
    assert!(!m.is_rehashing());
    assert_eq!(m.table_sizes(), (4, 0));
    m.insert(24, 24).unwrap();
    assert!(m.is_rehashing());
    assert!(matches!(
        m.resize(),
        Err(IndexError::ResizeRejected { .. })
    ));
}

// Test: stock policies.
// Verifies: byte keys round-trip; case-insensitive keys collapse.
#[test]
fn stock_policies() {
    let mut bytes = HashIndex::with_policy(BytesPolicy);
    bytes.insert(b"alpha".to_vec(), 1).unwrap();
    bytes.insert(b"beta".to_vec(), 2).unwrap();
    assert_eq!(bytes.get(&b"beta".to_vec()), Ok(&2));

    let mut ci = HashIndex::with_policy(CaseInsensitivePolicy);
    ci.insert("Key".to_string(), 1).unwrap();
    assert_eq!(ci.insert("KEY".to_string(), 2), Err(IndexError::AlreadyExists));
    assert_eq!(ci.get(&"key".to_string()), Ok(&1));
    assert_eq!(ci.remove(&"kEy".to_string()), Ok(("Key".to_string(), 1)));
}

// Test: iteration under load.
// Verifies: iter() sees every key exactly once at every point of a migration.
#[test]
fn iteration_through_migration() {
    let config = HashIndexConfig::builder().initial_size(8).build();
    let mut m: HashIndex<u32, u32> = HashIndex::with_config(config);
    for i in 0..200u32 {
        m.insert(i, i * 3).unwrap();
        let mut keys: Vec<u32> = m.iter().map(|(k, _)| *k).collect();
        keys.sort_unstable();
        assert_eq!(keys, (0..=i).collect::<Vec<_>>());
    }
    let total: u64 = (&m).into_iter().map(|(_, v)| u64::from(*v)).sum();
    assert_eq!(total, (0..200u64).map(|i| i * 3).sum());
}
