//! Utility functions

pub mod crypto;

pub use crypto::{constant_time_eq, hash_string, verify_token_hash};
