//! Per-block Merkle tree over `(contract, txId) -> result`.

use crate::errors::MerkleError;
use crate::sparse;
use cx_types::value_objects::{Address, Hash};
use std::collections::HashMap;

fn leaf_key(contract: Address, tx_id: Hash) -> Hash {
    Hash::digest_pair(contract.as_bytes(), tx_id.as_bytes())
}

/// The one-byte marker written in place of a transaction's result when it
/// reverted.
pub const REVERT_MARKER: [u8; 1] = [0x00];

/// A per-block Merkle tree over transaction receipts, plus the two
/// trailing sentinels (previous-block checksum, format version) that bind
/// this block to its predecessor.
///
/// This tree must be frozen before the state tree's root is finalized
/// (Invariant 6, §3): freezing here happens first in the manager's block
/// lifecycle, independent of whether the state tree has been touched yet.
pub struct ReceiptMerkleTree {
    entries: HashMap<Hash, Vec<u8>>,
    root: Hash,
    frozen: bool,
}

impl ReceiptMerkleTree {
    /// An empty tree.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            root: sparse::empty_root(),
            frozen: false,
        }
    }

    /// Record a transaction's result bytes, or [`REVERT_MARKER`] for a
    /// reverted transaction.
    pub fn update(
        &mut self,
        contract: Address,
        tx_id: Hash,
        result: Vec<u8>,
    ) -> Result<(), MerkleError> {
        if self.frozen {
            return Err(MerkleError::TreeFrozen);
        }
        self.entries.insert(leaf_key(contract, tx_id), result);
        Ok(())
    }

    /// Write the previous block's checksum root at the tree's first
    /// sentinel position (`MAX_HASH`, `MAX_HASH`).
    pub fn set_previous_checksum(&mut self, checksum: Hash) -> Result<(), MerkleError> {
        if self.frozen {
            return Err(MerkleError::TreeFrozen);
        }
        self.entries.insert(Hash::MAX, checksum.as_bytes().to_vec());
        Ok(())
    }

    /// Write the receipt format version at the tree's second sentinel
    /// position (`MAX_HASH - 1`, `MAX_HASH - 1`).
    pub fn set_version(&mut self, version: u32) -> Result<(), MerkleError> {
        if self.frozen {
            return Err(MerkleError::TreeFrozen);
        }
        self.entries
            .insert(Hash::max_minus_one(), version.to_be_bytes().to_vec());
        Ok(())
    }

    fn hashed_entries(&self) -> Vec<(Hash, Hash)> {
        self.entries
            .iter()
            .map(|(&key, bytes)| (key, Hash::digest(bytes)))
            .collect()
    }

    /// The current root.
    pub fn root(&self) -> Hash {
        self.root
    }

    /// Finalize: compute the root over every entry including sentinels,
    /// and reject any further updates.
    pub fn freeze(&mut self) {
        let hashed = self.hashed_entries();
        let (root, _) = sparse::root_and_proof(&hashed, None);
        self.root = root;
        self.frozen = true;
    }

    /// Whether this tree has been frozen.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }
}

impl Default for ReceiptMerkleTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::new([n; 32])
    }
    fn tx(n: u8) -> Hash {
        Hash::digest(&[n; 4])
    }

    #[test]
    fn test_empty_tree_root_matches_sparse_empty() {
        let tree = ReceiptMerkleTree::new();
        assert_eq!(tree.root(), sparse::empty_root());
    }

    #[test]
    fn test_revert_marker_distinct_from_success_bytes() {
        let mut reverted = ReceiptMerkleTree::new();
        reverted.update(addr(1), tx(1), REVERT_MARKER.to_vec()).unwrap();
        reverted.freeze();

        let mut success = ReceiptMerkleTree::new();
        success.update(addr(1), tx(1), vec![0x01, 0x02]).unwrap();
        success.freeze();

        assert_ne!(reverted.root(), success.root());
    }

    #[test]
    fn test_sentinels_affect_root() {
        let mut a = ReceiptMerkleTree::new();
        a.update(addr(1), tx(1), vec![1]).unwrap();
        a.freeze();

        let mut b = ReceiptMerkleTree::new();
        b.update(addr(1), tx(1), vec![1]).unwrap();
        b.set_previous_checksum(Hash::digest(b"prev")).unwrap();
        b.freeze();

        assert_ne!(a.root(), b.root());
    }

    #[test]
    fn test_frozen_rejects_update_and_sentinels() {
        let mut tree = ReceiptMerkleTree::new();
        tree.freeze();
        assert!(matches!(
            tree.update(addr(1), tx(1), vec![1]).unwrap_err(),
            MerkleError::TreeFrozen
        ));
        assert!(matches!(
            tree.set_version(1).unwrap_err(),
            MerkleError::TreeFrozen
        ));
    }
}
