//! Cryptographic utilities

use rand::Rng;
use sha2::{Digest, Sha256};

/// Hash a string using SHA-256, rendered as lowercase hex
pub fn hash_string(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();
    hex::encode(result)
}

/// Compare two strings without short-circuiting on the first mismatch
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Verify that `provided` is the SHA-256 hex digest matching `expected_hash`
pub fn verify_token_hash(provided: &str, expected_hash: &str) -> bool {
    constant_time_eq(provided, expected_hash)
}

/// Random multiplier in `[1.0, 1.0 + spread]`
pub fn jitter_factor(spread: f64) -> f64 {
    if spread <= 0.0 {
        return 1.0;
    }
    1.0 + rand::rng().random_range(0.0..=spread)
}
