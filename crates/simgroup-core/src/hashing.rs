//! Hashing functions.
//!
//! Everything here is non-cryptographic: xxh3 is used for shingle
//! permutations and for LSH band keys.

/// Hash with seed for MinHash-style algorithms.
#[inline]
pub fn hash_with_seed(data: &[u8], seed: u64) -> u64 {
    xxhash_rust::xxh3::xxh3_64_with_seed(data, seed)
}

/// Hash a slice of `u64` values into a single bucket key.
///
/// Values are fed little-endian so the key is stable across platforms.
#[inline]
pub fn hash_u64_slice(values: &[u64]) -> u64 {
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    hash_with_seed(&bytes, 0)
}
