//! API key generation and hashing.

use rand::Rng;
use rand::distr::Alphanumeric;
use sha2::{Digest, Sha256};

/// Prefix carried by every issued key.
pub const API_KEY_PREFIX: &str = "sk_";

/// Hashes an API key using SHA-256.
pub fn hash_api_key(key: &str) -> String {
    let hash = Sha256::digest(key.as_bytes());
    hex::encode(hash)
}

/// Generates a random key: `sk_` followed by 32 alphanumeric characters.
pub fn generate_api_key() -> String {
    let raw: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();
    format!("{API_KEY_PREFIX}{raw}")
}
