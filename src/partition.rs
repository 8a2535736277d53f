use std::hash::Hasher;

use crate::common::KeyValue;

/// Hashes an intermediate key with FNV-1a, masked to a non-negative value.
///
/// Independent of process and thread so every worker computes the same bucket.
pub fn ihash(key: &str) -> u32 {
    let mut hasher = fnv::FnvHasher::default();
    hasher.write(key.as_bytes());
    (hasher.finish() & 0x7fff_ffff) as u32
}

/// Routes `key` to a reduce bucket in `0..bucket_count`.
///
/// # Panics
///
/// Panics if `bucket_count` is zero. The coordinator rejects R = 0 up front.
pub fn partition(key: &str, bucket_count: usize) -> usize {
    assert!(bucket_count > 0, "bucket count must be positive");
    ihash(key) as usize % bucket_count
}

/// Splits map output into exactly `bucket_count` buckets, keeping the emitted
/// order within each bucket.
pub fn partition_pairs(pairs: Vec<KeyValue>, bucket_count: usize) -> Vec<Vec<KeyValue>> {
    let mut buckets = vec![Vec::new(); bucket_count];
    for kv in pairs {
        let bucket = partition(&kv.key, bucket_count);
        buckets[bucket].push(kv);
    }
    buckets
}
