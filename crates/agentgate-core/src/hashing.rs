// agentgate-core/src/hashing.rs
// ============================================================================
// Module: Canonical Hashing
// Description: Canonical JSON encoding and SHA-256 content hashing utilities.
// Purpose: Provide deterministic digests for arguments, policy bundles, and
//          transparency log leaves.
// Dependencies: serde, serde_jcs, sha2
// ============================================================================

//! ## Overview
//! AgentGate hashes canonical JSON (RFC 8785 / JCS: sorted object keys, no
//! insignificant whitespace) so that equal values always hash equal,
//! independent of field order. Binary payloads are hashed directly over raw
//! bytes.

use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

/// Errors raised while canonicalizing a value to JSON.
#[derive(Debug, Error)]
pub enum HashError {
    /// Canonical JSON encoding failed.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
}

/// Returns canonical JSON bytes for a serializable value (sorted keys, no
/// whitespace).
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when the value cannot be
/// serialized as JSON.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    serde_jcs::to_vec(value).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Hashes raw bytes with SHA-256, returning a lowercase hex digest.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(digest)
}

/// Hashes a serializable value as canonical JSON. Falls back to hashing the
/// value's `Debug`-free literal byte representation (its canonical JSON
/// attempt's error text) so the hash stays deterministic even when encoding
/// fails, matching the "arguments_hash must still be stable" invariant.
#[must_use]
pub fn hash_arguments_safe<T: Serialize + ?Sized>(value: &T) -> String {
    match canonical_json_bytes(value) {
        Ok(bytes) => hash_bytes(&bytes),
        Err(HashError::Canonicalization(detail)) => hash_bytes(detail.as_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn hash_is_stable_under_key_reordering() {
        let mut a = serde_json::Map::new();
        a.insert("b".to_string(), serde_json::json!(2));
        a.insert("a".to_string(), serde_json::json!(1));

        let mut b = BTreeMap::new();
        b.insert("a", 1);
        b.insert("b", 2);

        assert_eq!(hash_arguments_safe(&a), hash_arguments_safe(&b));
    }

    #[test]
    fn hash_bytes_is_deterministic() {
        assert_eq!(hash_bytes(b"hello"), hash_bytes(b"hello"));
        assert_ne!(hash_bytes(b"hello"), hash_bytes(b"world"));
    }
}
