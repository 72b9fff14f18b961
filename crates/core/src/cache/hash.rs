//! Entry key generation.
//!
//! An entry is keyed by the identity of the request that produced it:
//! method plus URL. Hashing keeps the key a fixed-width primary key
//! component regardless of URL length.

use sha2::{Digest, Sha256};

/// Compute the store key for a request identity.
pub fn entry_key(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}
