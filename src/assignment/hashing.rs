//! Deterministic bucketing.
//!
//! Version 1: SHA-256 of the UTF-8 key, first four bytes read big-endian,
//! reduced modulo [`BUCKET_COUNT`]. Changing any step reshuffles every
//! deployed assignment, so a new scheme needs a new version.

use sha2::{Digest, Sha256};

/// Buckets per experiment; one bucket is 0.01% of traffic.
pub const BUCKET_COUNT: u32 = 10_000;

pub const HASH_VERSION: u32 = 1;

/// Bucket in `[0, BUCKET_COUNT)` for an arbitrary key.
pub fn bucket(key: &str) -> u32 {
    let digest = Sha256::digest(key.as_bytes());
    let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    prefix % BUCKET_COUNT
}

/// Bucket deciding whether a user is inside a percentage rollout.
pub fn eligibility_bucket(experiment_id: &str, user_id: &str) -> u32 {
    bucket(&format!("{experiment_id}:eligibility:{user_id}"))
}

/// Bucket deciding which variant an eligible user lands in.
pub fn variant_bucket(experiment_id: &str, user_id: &str) -> u32 {
    bucket(&format!("{experiment_id}:variant:{user_id}"))
}
