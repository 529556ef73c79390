//! A depth-256 sparse Merkle tree keyed by arbitrary 32-byte keys.
//!
//! Shared by [`crate::state_tree::StateMerkleTree`] and
//! [`crate::receipt_tree::ReceiptMerkleTree`]. Both trees differ only in
//! what a leaf's key and value mean; the tree-shape math here is identical.

use cx_types::value_objects::Hash;

/// Precomputed empty-subtree hashes, indexed by height above the leaf
/// level (`0` is the empty leaf hash, `256` is the empty root).
///
/// Computed once per process and cached: 256 rounds of `SHA-256` is cheap
/// but there's no reason to repeat it per tree.
fn empty_hashes() -> &'static [Hash; 257] {
    use std::sync::OnceLock;
    static CACHE: OnceLock<[Hash; 257]> = OnceLock::new();
    CACHE.get_or_init(|| {
        let mut hashes = [Hash::ZERO; 257];
        hashes[0] = Hash::digest(&[0u8; 32]);
        for depth in 1..257 {
            hashes[depth] = Hash::digest_pair(hashes[depth - 1].as_bytes(), hashes[depth - 1].as_bytes());
        }
        hashes
    })
}

/// The empty tree's root, i.e. the state root of a tree with no writes.
pub fn empty_root() -> Hash {
    empty_hashes()[256]
}

fn bit_at(key: &Hash, depth: usize) -> bool {
    let byte_index = depth / 8;
    let bit_index = 7 - (depth % 8);
    (key.as_bytes()[byte_index] >> bit_index) & 1 == 1
}

/// Build the root hash of a sparse tree over `entries` (deduplicated,
/// last-write-wins by the caller), optionally collecting an inclusion
/// proof (sibling hashes, leaf-to-root order) for `target`.
pub fn root_and_proof(entries: &[(Hash, Hash)], target: Option<&Hash>) -> (Hash, Vec<Hash>) {
    let empties = empty_hashes();
    let mut proof = Vec::new();
    let root = compute(entries, 0, target, &mut proof, empties);
    (root, proof)
}

fn compute(
    entries: &[(Hash, Hash)],
    depth: usize,
    target: Option<&Hash>,
    proof: &mut Vec<Hash>,
    empties: &[Hash; 257],
) -> Hash {
    if depth == 256 {
        return entries.first().map(|(_, leaf)| *leaf).unwrap_or(empties[0]);
    }
    if entries.is_empty() {
        return empties[256 - depth];
    }

    let mut left = Vec::new();
    let mut right = Vec::new();
    for entry in entries {
        if bit_at(&entry.0, depth) {
            right.push(*entry);
        } else {
            left.push(*entry);
        }
    }

    let target_bit = target.map(|key| bit_at(key, depth));
    let left_target = if target_bit == Some(false) { target } else { None };
    let right_target = if target_bit == Some(true) { target } else { None };

    let left_hash = compute(&left, depth + 1, left_target, proof, empties);
    let right_hash = compute(&right, depth + 1, right_target, proof, empties);

    if let Some(bit) = target_bit {
        proof.push(if bit { left_hash } else { right_hash });
    }

    Hash::digest_pair(left_hash.as_bytes(), right_hash.as_bytes())
}

/// Recompute a root from a leaf, its key, and a leaf-to-root sibling proof,
/// and compare it to `expected_root`.
pub fn verify(key: &Hash, leaf: Hash, proof: &[Hash], expected_root: Hash) -> bool {
    if proof.len() != 256 {
        return false;
    }
    let mut current = leaf;
    for (i, sibling) in proof.iter().enumerate() {
        let depth = 255 - i;
        current = if bit_at(key, depth) {
            Hash::digest_pair(sibling.as_bytes(), current.as_bytes())
        } else {
            Hash::digest_pair(current.as_bytes(), sibling.as_bytes())
        };
    }
    current == expected_root
}
