//! Outbound ports this engine consumes from the host.

use crate::entities::{BlockHeader, ContractRecord, ProvenValue};
use crate::errors::EngineError;
use crate::value_objects::{Address, Pointer, StorageValue};
use async_trait::async_trait;
use std::collections::HashMap;

/// Persistent storage, consumed but not implemented by this engine.
///
/// Mirrors the sibling `StateAccess` port this workspace already uses for
/// its other subsystems: a narrow async trait, implemented in production by
/// a document-store adapter the host owns, and by an in-memory adapter
/// (`cx-manager::adapters::InMemoryStorage`) for tests.
#[async_trait]
pub trait StorageInterface: Send + Sync {
    /// Look up a contract record, optionally at a historical height.
    async fn get_contract_at(
        &self,
        address: Address,
        height: Option<u64>,
    ) -> Result<Option<ContractRecord>, EngineError>;

    /// Resolve a virtual address to its canonical form, optionally at a
    /// historical height.
    async fn get_contract_address_at(
        &self,
        address: Address,
        height: Option<u64>,
    ) -> Result<Option<Address>, EngineError>;

    /// Persist a contract record (called on successful deployment commit).
    async fn set_contract_at(&self, record: ContractRecord) -> Result<(), EngineError>;

    /// Fetch a single proven storage value, optionally at a historical
    /// height.
    async fn get_storage(
        &self,
        contract: Address,
        pointer: Pointer,
        height: Option<u64>,
    ) -> Result<Option<ProvenValue>, EngineError>;

    /// Batch-fetch proven storage values for several contracts/pointers at
    /// once.
    async fn get_storage_multiple(
        &self,
        request: HashMap<Address, Vec<Pointer>>,
        height: Option<u64>,
    ) -> Result<HashMap<Address, HashMap<Pointer, ProvenValue>>, EngineError>;

    /// Persist a block's dirty storage, each value paired with the proof
    /// computed against that block's finalized state root.
    async fn set_storage_pointers(
        &self,
        writes: HashMap<Address, HashMap<Pointer, (StorageValue, Vec<crate::value_objects::Hash>)>>,
        height: u64,
    ) -> Result<(), EngineError>;

    /// Persist a finalized block header.
    async fn save_block_header(&self, header: BlockHeader) -> Result<(), EngineError>;

    /// Fetch a block header by height.
    async fn get_block_header(&self, height: u64) -> Result<Option<BlockHeader>, EngineError>;

    /// Fetch the most recently persisted block header.
    async fn get_latest_block(&self) -> Result<Option<BlockHeader>, EngineError>;
}
