//! Per-block sparse Merkle tree over `(contract, pointer) -> value`.

use crate::errors::MerkleError;
use crate::sparse;
use cx_types::value_objects::{Address, Hash, Pointer, StorageValue};
use std::collections::HashMap;

fn leaf_key(contract: Address, pointer: Pointer) -> Hash {
    Hash::digest_pair(contract.as_bytes(), pointer.as_bytes())
}

fn leaf_value(value: StorageValue) -> Hash {
    Hash::digest(value.as_bytes())
}

/// A per-block sparse Merkle tree over all `(contract, pointer)` writes
/// made during that block.
///
/// Inserts are commutative: the root depends only on the final
/// `(key, value)` multiset, with last-write-wins semantics for duplicate
/// writes to the same key within a block (a plain `HashMap::insert`
/// already gives us that). Once [`StateMerkleTree::freeze`] is called,
/// further updates are rejected.
pub struct StateMerkleTree {
    entries: HashMap<(Address, Pointer), StorageValue>,
    proofs: HashMap<(Address, Pointer), Vec<Hash>>,
    root: Hash,
    frozen: bool,
}

impl StateMerkleTree {
    /// An empty tree, rooted at the canonical empty-sparse-tree hash.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            proofs: HashMap::new(),
            root: sparse::empty_root(),
            frozen: false,
        }
    }

    /// Record a write. Rejected once the tree is frozen.
    pub fn update(
        &mut self,
        contract: Address,
        pointer: Pointer,
        value: StorageValue,
    ) -> Result<(), MerkleError> {
        if self.frozen {
            return Err(MerkleError::TreeFrozen);
        }
        self.entries.insert((contract, pointer), value);
        Ok(())
    }

    /// Recompute the root and every touched leaf's inclusion proof.
    ///
    /// Proofs are regenerated one `root_and_proof` pass per leaf — O(n)
    /// leaves times an O(n) tree walk each. Block-sized write sets keep
    /// this cheap in practice; a production tree would cache internal
    /// node hashes across passes instead of recomputing them per leaf.
    pub fn generate_tree(&mut self) {
        let hashed: Vec<(Hash, Hash)> = self
            .entries
            .iter()
            .map(|(&(contract, pointer), &value)| (leaf_key(contract, pointer), leaf_value(value)))
            .collect();

        let (root, _) = sparse::root_and_proof(&hashed, None);
        self.root = root;

        self.proofs.clear();
        for &(contract, pointer) in self.entries.keys() {
            let key = leaf_key(contract, pointer);
            let (_, proof) = sparse::root_and_proof(&hashed, Some(&key));
            self.proofs.insert((contract, pointer), proof);
        }
    }

    /// The current root. Only meaningful after [`StateMerkleTree::generate_tree`]
    /// or [`StateMerkleTree::freeze`] has run for the latest writes.
    pub fn root(&self) -> Hash {
        self.root
    }

    /// Recompute the root from `(leaf, siblings)` and compare it to
    /// `expected_root` (testable property 3, §8).
    pub fn verify(
        expected_root: Hash,
        contract: Address,
        pointer: Pointer,
        value: StorageValue,
        proofs: &[Hash],
    ) -> bool {
        let key = leaf_key(contract, pointer);
        sparse::verify(&key, leaf_value(value), proofs, expected_root)
    }

    /// Every touched `(contract, pointer)` with its value and the proof
    /// generated for it by the last [`StateMerkleTree::generate_tree`] call.
    pub fn everything_with_proofs(
        &self,
    ) -> impl Iterator<Item = (Address, Pointer, StorageValue, &[Hash])> {
        self.entries.iter().map(move |(&(contract, pointer), &value)| {
            let proof = self
                .proofs
                .get(&(contract, pointer))
                .map(|p| p.as_slice())
                .unwrap_or(&[]);
            (contract, pointer, value, proof)
        })
    }

    /// Finalize this tree: regenerate proofs one last time and reject any
    /// further updates.
    pub fn freeze(&mut self) {
        self.generate_tree();
        self.frozen = true;
    }

    /// Whether this tree has been frozen.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }
}

impl Default for StateMerkleTree {
    fn default() -> Self {
        Self::new()
    }
}
