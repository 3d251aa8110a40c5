//! Content hashing.
//!
//! Hashes are SHA-256 over the canonical JSON encoding of a value. Maps in
//! this crate are `BTreeMap`s, so the encoding is key-ordered and stable.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Hex-encoded SHA-256 of the canonical JSON encoding of `value`.
pub fn content_hash<T: Serialize + ?Sized>(value: &T) -> String {
    sha256_hex(&serde_json::to_vec(value).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_hash_is_stable_across_insertion_order() {
        let mut a = BTreeMap::new();
        a.insert("zeta", 1);
        a.insert("alpha", 2);

        let mut b = BTreeMap::new();
        b.insert("alpha", 2);
        b.insert("zeta", 1);

        assert_eq!(content_hash(&a), content_hash(&b));
        assert_eq!(content_hash(&a).len(), 64);
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
