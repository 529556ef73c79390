//! # cx-storage
//!
//! A copy-on-write storage overlay stacked per call frame. Each frame owns
//! a write buffer layered atop its parent's; reads chain outward through
//! every ancestor before falling back to a block-scoped proof cache and,
//! on a first miss, the persistent [`StorageInterface`] the host provides.
//!
//! ## Invariant table
//!
//! | Invariant | Enforced in |
//! |-----------|-------------|
//! | A pointer never written reads as the zero value | `StorageOverlay::get` |
//! | Writes are rejected outside the executing contract's own namespace | `StorageOverlay::set` |
//! | A frame's writes are discarded entirely on revert | `StorageOverlay::discard` |
//! | A frame's writes flow to its parent only on commit | `StorageOverlay::commit` |
//! | A value fetched from persistent storage is cached (with its proof) for the rest of the block | `StorageOverlay::get` |
//!
//! ## Outbound dependencies
//!
//! | Crate | Used for |
//! |-------|----------|
//! | `cx-types` | `StorageInterface`, value objects, `EngineError` |
//! | `tokio` | The shared, lock-guarded block-scoped proof cache |
//! | `tracing` | Per-access trace spans (`contract`, `pointer`) |
//! | `thiserror` | `StorageError` |

#![warn(missing_docs)]
#![warn(clippy::all)]

use cx_types::entities::ProvenValue;
use cx_types::errors::EngineError;
use cx_types::ports::StorageInterface;
use cx_types::value_objects::{Address, Pointer, StorageValue};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors from overlay operations.
#[derive(Debug, Error, Clone)]
pub enum StorageError {
    /// A frame tried to write into a namespace that isn't its own
    /// executing contract's (Invariant 2: cross-contract storage mutation
    /// is only possible by calling the target contract).
    #[error("write to {attempted} rejected: frame is executing as {executing}")]
    CrossContractWrite {
        /// The contract the write targeted.
        attempted: Address,
        /// The contract this frame is actually executing as.
        executing: Address,
    },

    /// The persistent storage backend returned an error.
    #[error("storage backend error: {0}")]
    Backend(#[from] EngineError),
}

/// A block-scoped cache of proven values, shared by every overlay in a
/// block so a value fetched once from persistent storage is never
/// re-fetched within the same block.
pub type ProofCache = Arc<Mutex<HashMap<(Address, Pointer), ProvenValue>>>;

/// Build a fresh, empty proof cache for a new block.
pub fn new_proof_cache() -> ProofCache {
    Arc::new(Mutex::new(HashMap::new()))
}

/// A copy-on-write view over contract storage, one per call frame.
pub struct StorageOverlay {
    parent: Option<Box<StorageOverlay>>,
    writes: HashMap<(Address, Pointer), StorageValue>,
    backend: Arc<dyn StorageInterface>,
    proof_cache: ProofCache,
    executing_contract: Address,
    height: Option<u64>,
}

impl StorageOverlay {
    /// Build the outermost, block-scoped overlay.
    pub fn new_root(
        backend: Arc<dyn StorageInterface>,
        proof_cache: ProofCache,
        executing_contract: Address,
        height: Option<u64>,
    ) -> Self {
        Self {
            parent: None,
            writes: HashMap::new(),
            backend,
            proof_cache,
            executing_contract,
            height,
        }
    }

    /// Layer a fresh overlay atop this one for a nested frame, taking
    /// ownership of `self` as its parent. The child's own writes are
    /// invisible to `self` until [`StorageOverlay::commit`] is called.
    pub fn child(self, executing_contract: Address) -> Self {
        let backend = self.backend.clone();
        let proof_cache = self.proof_cache.clone();
        let height = self.height;
        Self {
            parent: Some(Box::new(self)),
            writes: HashMap::new(),
            backend,
            proof_cache,
            executing_contract,
            height,
        }
    }

    /// Read a storage value, chaining through every ancestor overlay, then
    /// the block proof cache, then the persistent backend. Never-written
    /// pointers read as the zero value.
    #[tracing::instrument(skip(self), fields(contract = %contract, pointer = %pointer))]
    pub async fn get(
        &self,
        contract: Address,
        pointer: Pointer,
    ) -> Result<StorageValue, StorageError> {
        if let Some(value) = self.writes.get(&(contract, pointer)) {
            return Ok(*value);
        }
        if let Some(parent) = &self.parent {
            return Box::pin(parent.get(contract, pointer)).await;
        }

        {
            let cache = self.proof_cache.lock().await;
            if let Some(existing) = cache.get(&(contract, pointer)) {
                return Ok(existing.value);
            }
        }

        let fetched = self
            .backend
            .get_storage(contract, pointer, self.height)
            .await?;
        let proven = fetched.unwrap_or_else(|| ProvenValue::new(StorageValue::ZERO, vec![], 0));
        let value = proven.value;
        let mut cache = self.proof_cache.lock().await;
        cache.insert((contract, pointer), proven);
        Ok(value)
    }

    /// Write a storage value. Rejected if `contract` isn't the frame's own
    /// executing contract (Invariant 2).
    #[tracing::instrument(skip(self, value), fields(contract = %contract, pointer = %pointer))]
    pub fn set(
        &mut self,
        contract: Address,
        pointer: Pointer,
        value: StorageValue,
    ) -> Result<(), StorageError> {
        if contract != self.executing_contract {
            return Err(StorageError::CrossContractWrite {
                attempted: contract,
                executing: self.executing_contract,
            });
        }
        self.writes.insert((contract, pointer), value);
        Ok(())
    }

    /// The contract this overlay is bound to.
    pub fn executing_contract(&self) -> Address {
        self.executing_contract
    }

    /// Iterate this frame's own dirty keys (not including ancestors').
    pub fn dirty_keys(&self) -> impl Iterator<Item = (Address, Pointer, StorageValue)> + '_ {
        self.writes.iter().map(|(&(c, p), &v)| (c, p, v))
    }

    /// Fold this frame's writes into its parent and return the parent,
    /// consuming `self`. Returns `None` if this was the root overlay — the
    /// caller should read [`StorageOverlay::dirty_keys`] before committing
    /// the root, since there is no parent to fold into.
    pub fn commit(self) -> Option<StorageOverlay> {
        match self.parent {
            Some(mut parent) => {
                for (key, value) in self.writes {
                    parent.writes.insert(key, value);
                }
                Some(*parent)
            }
            None => None,
        }
    }

    /// Discard this frame's writes entirely and return the parent,
    /// consuming `self`. Used on revert.
    pub fn discard(self) -> Option<StorageOverlay> {
        self.parent.map(|parent| *parent)
    }

    /// Consume the root overlay and return its accumulated writes, for
    /// merging into the block's state tree.
    pub fn into_writes(self) -> HashMap<(Address, Pointer), StorageValue> {
        self.writes
    }
}
