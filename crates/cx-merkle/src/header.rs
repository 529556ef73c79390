//! Block header checksum validation: binds a block's state/receipt roots
//! to its predecessor via a fixed 6-leaf Merkle tree.

use crate::checksum_tree;
use cx_types::entities::BlockHeader;
use cx_types::value_objects::Hash;
use std::collections::{HashMap, VecDeque};

/// Validates block headers and memoizes the result per height.
///
/// Bounded rather than unbounded: a long-lived indexer process must not
/// grow this cache forever, so it evicts the oldest-inserted height once
/// `max_entries` is exceeded.
pub struct BlockHeaderValidator {
    cache: HashMap<u64, bool>,
    order: VecDeque<u64>,
    max_entries: usize,
}

impl BlockHeaderValidator {
    /// Build a validator with the given memoization capacity.
    pub fn new(max_entries: usize) -> Self {
        Self {
            cache: HashMap::new(),
            order: VecDeque::new(),
            max_entries,
        }
    }

    /// Compute the checksum root that should bind `header`'s six
    /// positional fields, independent of any DB lookup.
    pub fn compute_checksum_root(header: &BlockHeader) -> Hash {
        checksum_tree::root(&header.checksum_leaves())
    }

    /// Validate `header` against the checksum it carries and the previous
    /// block's checksum. `prev_checksum` is the checksum the caller has
    /// already fetched for `header.height - 1` (or `Hash::ZERO` at
    /// genesis) — this keeps this crate free of any storage dependency;
    /// the manager owns the DB fetch.
    pub fn validate(&mut self, header: &BlockHeader, prev_checksum: Hash) -> bool {
        if let Some(&cached) = self.cache.get(&header.height) {
            return cached;
        }

        let recomputed = Self::compute_checksum_root(header);
        let valid = recomputed == header.checksum_root && header.prev_block_checksum == prev_checksum;

        self.memoize(header.height, valid);
        valid
    }

    /// Verify a single leaf's own proof against `header`'s checksum root,
    /// without needing every other leaf present — the external,
    /// light-client-facing counterpart to [`BlockHeaderValidator::validate`].
    pub fn verify_leaf(header: &BlockHeader, leaf_index: usize) -> bool {
        if leaf_index >= 6 {
            return false;
        }
        let leaves = header.checksum_leaves();
        checksum_tree::verify(
            leaves[leaf_index],
            leaf_index,
            &header.checksum_proofs[leaf_index],
            header.checksum_root,
        )
    }

    fn memoize(&mut self, height: u64, valid: bool) {
        if !self.cache.contains_key(&height) && self.order.len() >= self.max_entries {
            if let Some(oldest) = self.order.pop_front() {
                self.cache.remove(&oldest);
            }
        }
        if self.cache.insert(height, valid).is_none() {
            self.order.push_back(height);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cx_types::value_objects::Hash as H;

    fn header_with_leaves(height: u64, leaves: [H; 6], prev_checksum: H) -> BlockHeader {
        let root = checksum_tree::root(&leaves);
        let proofs = std::array::from_fn(|i| checksum_tree::proof_for(&leaves, i));
        BlockHeader {
            height,
            prev_block_hash: leaves[0],
            prev_block_checksum: leaves[1],
            block_hash: leaves[2],
            merkle_root: leaves[3],
            storage_root: leaves[4],
            receipt_root: leaves[5],
            checksum_root: root,
            checksum_proofs: proofs,
        }
        .tap_prev_checksum(prev_checksum)
    }

    trait TapPrevChecksum {
        fn tap_prev_checksum(self, prev: H) -> Self;
    }
    impl TapPrevChecksum for BlockHeader {
        fn tap_prev_checksum(mut self, prev: H) -> Self {
            self.prev_block_checksum = prev;
            self
        }
    }

    #[test]
    fn test_validate_accepts_correct_header() {
        let leaves = [
            H::digest(b"0"),
            H::ZERO,
            H::digest(b"2"),
            H::digest(b"3"),
            H::digest(b"4"),
            H::digest(b"5"),
        ];
        let header = header_with_leaves(1, leaves, H::ZERO);
        let mut validator = BlockHeaderValidator::new(10);
        assert!(validator.validate(&header, H::ZERO));
    }

    #[test]
    fn test_validate_rejects_checksum_mismatch() {
        let leaves = [
            H::digest(b"0"),
            H::ZERO,
            H::digest(b"2"),
            H::digest(b"3"),
            H::digest(b"4"),
            H::digest(b"5"),
        ];
        let mut header = header_with_leaves(1, leaves, H::ZERO);
        header.checksum_root = H::digest(b"tampered");
        let mut validator = BlockHeaderValidator::new(10);
        assert!(!validator.validate(&header, H::ZERO));
    }

    #[test]
    fn test_validate_rejects_prev_checksum_mismatch() {
        let leaves = [
            H::digest(b"0"),
            H::ZERO,
            H::digest(b"2"),
            H::digest(b"3"),
            H::digest(b"4"),
            H::digest(b"5"),
        ];
        let header = header_with_leaves(1, leaves, H::ZERO);
        let mut validator = BlockHeaderValidator::new(10);
        assert!(!validator.validate(&header, H::digest(b"not zero")));
    }

    #[test]
    fn test_memoization_evicts_oldest() {
        let mut validator = BlockHeaderValidator::new(2);
        for height in 0..3u64 {
            let leaves = [H::digest(&[height as u8]); 6];
            let header = header_with_leaves(height, leaves, H::ZERO);
            validator.validate(&header, H::ZERO);
        }
        assert_eq!(validator.cache.len(), 2);
        assert!(!validator.cache.contains_key(&0));
    }

    #[test]
    fn test_verify_leaf_standalone() {
        let leaves = [
            H::digest(b"0"),
            H::ZERO,
            H::digest(b"2"),
            H::digest(b"3"),
            H::digest(b"4"),
            H::digest(b"5"),
        ];
        let header = header_with_leaves(1, leaves, H::ZERO);
        assert!(BlockHeaderValidator::verify_leaf(&header, 2));
        assert!(!BlockHeaderValidator::verify_leaf(&header, 6));
    }
}
