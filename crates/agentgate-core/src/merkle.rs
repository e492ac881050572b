// agentgate-core/src/merkle.rs
// ============================================================================
// Module: Transparency Merkle Log
// Description: Deterministic Merkle root construction and inclusion proofs.
// Purpose: Back the per-session transparency log over append-only trace events.
// Dependencies: crate::hashing
// ============================================================================

//! ## Overview
//! The transparency log builds a Merkle tree bottom-up over per-session trace
//! leaves, duplicating the last node on odd levels. Inclusion proofs are the
//! ordered list of sibling hashes from leaf to root; verification recomputes
//! the root from a leaf hash and its proof and compares it bit-for-bit.

use crate::hashing::hash_bytes;

/// Hashes a single leaf payload with SHA-256.
#[must_use]
pub fn hash_leaf(value: &str) -> String {
    hash_bytes(value.as_bytes())
}

/// Builds the Merkle root over leaf hashes, duplicating the last node on odd
/// levels. Returns the hash of the empty string when there are no leaves.
#[must_use]
pub fn build_merkle_root(leaf_hashes: &[String]) -> String {
    if leaf_hashes.is_empty() {
        return hash_leaf("");
    }
    let mut level = leaf_hashes.to_vec();
    while level.len() > 1 {
        level = next_level(&level);
    }
    // `level` is non-empty because the loop only exits at length 1.
    level.into_iter().next().unwrap_or_else(|| hash_leaf(""))
}

/// Builds the inclusion proof (ordered sibling hashes, leaf to root) for the
/// leaf at `index`.
///
/// # Errors
///
/// Returns an error when `index` is out of range for `leaf_hashes`.
pub fn build_inclusion_proof(leaf_hashes: &[String], index: usize) -> Result<Vec<String>, MerkleError> {
    if index >= leaf_hashes.len() {
        return Err(MerkleError::IndexOutOfRange { index, len: leaf_hashes.len() });
    }
    let mut proof = Vec::new();
    let mut level = leaf_hashes.to_vec();
    let mut current = index;
    while level.len() > 1 {
        let sibling_idx = if current.is_multiple_of(2) { current + 1 } else { current - 1 };
        let sibling = level.get(sibling_idx).unwrap_or(&level[current]).clone();
        proof.push(sibling);
        level = next_level(&level);
        current /= 2;
    }
    Ok(proof)
}

/// Verifies an inclusion proof by recomputing the root from a leaf hash.
#[must_use]
pub fn verify_inclusion_proof(
    leaf_hash: &str,
    index: usize,
    total_leaves: usize,
    proof: &[String],
    root_hash: &str,
) -> bool {
    if total_leaves == 0 || index >= total_leaves {
        return false;
    }
    let mut current = leaf_hash.to_string();
    let mut position = index;
    for sibling in proof {
        current = if position.is_multiple_of(2) {
            hash_leaf(&format!("{current}{sibling}"))
        } else {
            hash_leaf(&format!("{sibling}{current}"))
        };
        position /= 2;
    }
    current == root_hash
}

/// Computes the next Merkle level by hashing adjacent pairs, duplicating the
/// last element when the level has odd length.
fn next_level(level: &[String]) -> Vec<String> {
    let mut next = Vec::with_capacity(level.len().div_ceil(2));
    let mut i = 0;
    while i < level.len() {
        let left = &level[i];
        let right = level.get(i + 1).unwrap_or(left);
        next.push(hash_leaf(&format!("{left}{right}")));
        i += 2;
    }
    next
}

/// Errors raised by Merkle proof construction.
#[derive(Debug, thiserror::Error)]
pub enum MerkleError {
    /// The requested leaf index does not exist in the tree.
    #[error("leaf index {index} out of range for {len} leaves")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Total leaf count.
        len: usize,
    },
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only assertions are permitted."
)]
mod tests {
    use super::*;

    fn leaves(n: usize) -> Vec<String> {
        (0..n).map(|i| hash_leaf(&format!("leaf-{i}"))).collect()
    }

    #[test]
    fn every_inclusion_proof_verifies() {
        for n in 1..12 {
            let leaf_hashes = leaves(n);
            let root = build_merkle_root(&leaf_hashes);
            for i in 0..n {
                let proof = build_inclusion_proof(&leaf_hashes, i).expect("in range");
                assert!(verify_inclusion_proof(&leaf_hashes[i], i, n, &proof, &root));
            }
        }
    }

    #[test]
    fn flipping_a_proof_byte_fails_verification() {
        let leaf_hashes = leaves(5);
        let root = build_merkle_root(&leaf_hashes);
        let mut proof = build_inclusion_proof(&leaf_hashes, 2).expect("in range");
        let mut first = proof[0].clone().into_bytes();
        first[0] ^= 1;
        proof[0] = String::from_utf8(first).unwrap_or_default();
        assert!(!verify_inclusion_proof(&leaf_hashes[2], 2, 5, &proof, &root));
    }

    #[test]
    fn out_of_range_index_errors() {
        let leaf_hashes = leaves(3);
        assert!(build_inclusion_proof(&leaf_hashes, 3).is_err());
    }
}
