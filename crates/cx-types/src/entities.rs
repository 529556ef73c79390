//! Data-model entities that cross a storage or wire boundary.

use crate::value_objects::{Address, Bytes, Hash};
use serde::{Deserialize, Serialize};

/// An immutable record of a deployed contract.
///
/// Lookups against the contract index may be time-travel (at a given
/// height); this type itself carries the deployment height so a caller can
/// tell whether a record was visible at the height it queried.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRecord {
    /// The stable, content-derived address (`hash(deployer, bytecode, salt)`).
    pub virtual_address: Address,
    /// The address the engine indexes by.
    pub canonical_address: Address,
    /// The address that deployed this contract.
    pub deployer: Address,
    /// The contract's WASM bytecode.
    pub bytecode: Bytes,
    /// The deployment salt.
    pub salt: [u8; 32],
    /// The height at which this contract was deployed.
    pub deployed_at_height: u64,
    /// The transaction id that deployed this contract.
    pub deployed_tx_id: Hash,
}

impl ContractRecord {
    /// The bytecode hash, used as the module-cache key in `cx-wasm`.
    pub fn bytecode_hash(&self) -> Hash {
        Hash::digest(self.bytecode.as_slice())
    }
}

/// A storage value paired with the proof needed to verify it and the
/// height at which it was last written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenValue {
    /// The stored value.
    pub value: crate::value_objects::StorageValue,
    /// Ordered sibling hashes from leaf to root.
    pub proofs: Vec<Hash>,
    /// The height at which this value was last written.
    pub last_seen_height: u64,
}

impl ProvenValue {
    /// Build a proven value.
    pub fn new(
        value: crate::value_objects::StorageValue,
        proofs: Vec<Hash>,
        last_seen_height: u64,
    ) -> Self {
        Self {
            value,
            proofs,
            last_seen_height,
        }
    }
}

/// A block header, carrying the six positional fields the checksum tree
/// binds together plus the proofs that link it to its position in that
/// tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// The block's own height.
    pub height: u64,
    /// The previous block's hash.
    pub prev_block_hash: Hash,
    /// The previous block's checksum root.
    pub prev_block_checksum: Hash,
    /// This block's hash.
    pub block_hash: Hash,
    /// This block's transaction/state merkle root.
    pub merkle_root: Hash,
    /// This block's storage root (state tree root).
    pub storage_root: Hash,
    /// This block's receipt root (receipt tree root).
    pub receipt_root: Hash,
    /// The 6-leaf checksum tree's root over the six fields above.
    pub checksum_root: Hash,
    /// Sibling proofs for each of the six leaves, in fixed leaf order.
    pub checksum_proofs: [Vec<Hash>; 6],
}

impl BlockHeader {
    /// The six positional leaf values the checksum tree is built over, in
    /// fixed order: `prev_block_hash, prev_block_checksum, block_hash,
    /// merkle_root, storage_root, receipt_root`.
    pub fn checksum_leaves(&self) -> [Hash; 6] {
        [
            self.prev_block_hash,
            self.prev_block_checksum,
            self.block_hash,
            self.merkle_root,
            self.storage_root,
            self.receipt_root,
        ]
    }

    /// A genesis header: zero predecessor fields, caller-supplied roots.
    pub fn genesis(block_hash: Hash, storage_root: Hash, receipt_root: Hash) -> Self {
        Self {
            height: 0,
            prev_block_hash: Hash::ZERO,
            prev_block_checksum: Hash::ZERO,
            block_hash,
            merkle_root: Hash::ZERO,
            storage_root,
            receipt_root,
            checksum_root: Hash::ZERO,
            checksum_proofs: Default::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_record_bytecode_hash_stable() {
        let record = ContractRecord {
            virtual_address: Address::ZERO,
            canonical_address: Address::ZERO,
            deployer: Address::ZERO,
            bytecode: Bytes::new(vec![1, 2, 3]),
            salt: [0u8; 32],
            deployed_at_height: 10,
            deployed_tx_id: Hash::ZERO,
        };
        let h1 = record.bytecode_hash();
        let h2 = record.bytecode_hash();
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_block_header_checksum_leaves_order() {
        let header = BlockHeader {
            height: 1,
            prev_block_hash: Hash([1u8; 32]),
            prev_block_checksum: Hash([2u8; 32]),
            block_hash: Hash([3u8; 32]),
            merkle_root: Hash([4u8; 32]),
            storage_root: Hash([5u8; 32]),
            receipt_root: Hash([6u8; 32]),
            checksum_root: Hash::ZERO,
            checksum_proofs: Default::default(),
        };
        let leaves = header.checksum_leaves();
        assert_eq!(leaves[0], Hash([1u8; 32]));
        assert_eq!(leaves[5], Hash([6u8; 32]));
    }

    #[test]
    fn test_genesis_header_zero_predecessor() {
        let header = BlockHeader::genesis(Hash([9u8; 32]), Hash([8u8; 32]), Hash([7u8; 32]));
        assert_eq!(header.height, 0);
        assert_eq!(header.prev_block_hash, Hash::ZERO);
        assert_eq!(header.prev_block_checksum, Hash::ZERO);
    }
}
