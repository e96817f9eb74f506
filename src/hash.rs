//! Hash primitives used by the stock entry policies and iterator fingerprints.

const MURMUR_M: u32 = 0x5bd1_e995;
const MURMUR_R: u32 = 24;

/// MurmurHash2 (32-bit) over `data`, perturbed by `seed`.
pub fn murmur2(data: &[u8], seed: u32) -> u32 {
    let mut h = seed ^ (data.len() as u32);

    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(MURMUR_M);
        k ^= k >> MURMUR_R;
        k = k.wrapping_mul(MURMUR_M);

        h = h.wrapping_mul(MURMUR_M);
        h ^= k;
    }

    let tail = chunks.remainder();
    if tail.len() >= 3 {
        h ^= u32::from(tail[2]) << 16;
    }
    if tail.len() >= 2 {
        h ^= u32::from(tail[1]) << 8;
    }
    if !tail.is_empty() {
        h ^= u32::from(tail[0]);
        h = h.wrapping_mul(MURMUR_M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(MURMUR_M);
    h ^= h >> 15;
    h
}

/// djb-style hash over the ASCII-lowercased bytes, starting from `seed`.
pub fn case_insensitive_hash(data: &[u8], seed: u32) -> u32 {
    data.iter().fold(seed, |hash, &b| {
        (hash << 5)
            .wrapping_add(hash)
            .wrapping_add(u32::from(b.to_ascii_lowercase()))
    })
}

/// Thomas Wang's 32-bit integer mix.
pub fn int_hash(mut key: u32) -> u32 {
    key = key.wrapping_add(!(key << 15));
    key ^= key >> 10;
    key = key.wrapping_add(key << 3);
    key ^= key >> 6;
    key = key.wrapping_add(!(key << 11));
    key ^= key >> 16;
    key
}

/// Folds a sequence of integers into one 64-bit value; any change to any input
/// changes the result with overwhelming probability.
pub(crate) fn mix64(values: &[u64]) -> u64 {
    values.iter().fold(0u64, |mut hash, &v| {
        hash = hash.wrapping_add(v);
        hash = (!hash).wrapping_add(hash << 21);
        hash ^= hash >> 24;
        hash = hash.wrapping_add(hash << 3).wrapping_add(hash << 8);
        hash ^= hash >> 14;
        hash = hash.wrapping_add(hash << 2).wrapping_add(hash << 4);
        hash ^= hash >> 28;
        hash.wrapping_add(hash << 31)
    })
}
