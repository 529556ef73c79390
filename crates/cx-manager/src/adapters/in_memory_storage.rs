//! In-memory `StorageInterface` for tests, grounded on the teacher's
//! `InMemoryState` (`RwLock<HashMap<...>>` per concern, no persistence).

use async_trait::async_trait;
use cx_types::entities::{BlockHeader, ContractRecord, ProvenValue};
use cx_types::errors::EngineError;
use cx_types::ports::StorageInterface;
use cx_types::value_objects::{Address, Hash, Pointer, StorageValue};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

/// In-memory storage backend: contracts indexed by canonical address, a
/// virtual-to-canonical lookup table, per-`(contract, pointer)` history
/// keyed by the height it was written at (so historical reads, S6, resolve
/// to the value in effect at a queried height), and persisted block headers.
#[derive(Default)]
pub struct InMemoryStorage {
    contracts: RwLock<HashMap<Address, ContractRecord>>,
    virtual_index: RwLock<HashMap<Address, Address>>,
    storage: RwLock<HashMap<(Address, Pointer), BTreeMap<u64, ProvenValue>>>,
    headers: RwLock<HashMap<u64, BlockHeader>>,
    latest_height: RwLock<Option<u64>>,
}

impl InMemoryStorage {
    /// Build an empty backend.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageInterface for InMemoryStorage {
    async fn get_contract_at(
        &self,
        address: Address,
        height: Option<u64>,
    ) -> Result<Option<ContractRecord>, EngineError> {
        let contracts = self.contracts.read().unwrap();
        Ok(contracts.get(&address).and_then(|record| {
            match height {
                Some(h) if record.deployed_at_height > h => None,
                _ => Some(record.clone()),
            }
        }))
    }

    async fn get_contract_address_at(
        &self,
        address: Address,
        _height: Option<u64>,
    ) -> Result<Option<Address>, EngineError> {
        Ok(self.virtual_index.read().unwrap().get(&address).copied())
    }

    async fn set_contract_at(&self, record: ContractRecord) -> Result<(), EngineError> {
        if record.virtual_address != record.canonical_address {
            self.virtual_index
                .write()
                .unwrap()
                .insert(record.virtual_address, record.canonical_address);
        }
        self.contracts
            .write()
            .unwrap()
            .insert(record.canonical_address, record);
        Ok(())
    }

    async fn get_storage(
        &self,
        contract: Address,
        pointer: Pointer,
        height: Option<u64>,
    ) -> Result<Option<ProvenValue>, EngineError> {
        let storage = self.storage.read().unwrap();
        let Some(history) = storage.get(&(contract, pointer)) else {
            return Ok(None);
        };
        let found = match height {
            Some(h) => history.range(..=h).next_back(),
            None => history.iter().next_back(),
        };
        Ok(found.map(|(_, proven)| proven.clone()))
    }

    async fn get_storage_multiple(
        &self,
        request: HashMap<Address, Vec<Pointer>>,
        height: Option<u64>,
    ) -> Result<HashMap<Address, HashMap<Pointer, ProvenValue>>, EngineError> {
        let mut out = HashMap::new();
        for (contract, pointers) in request {
            let mut per_contract = HashMap::new();
            for pointer in pointers {
                if let Some(proven) = self.get_storage(contract, pointer, height).await? {
                    per_contract.insert(pointer, proven);
                }
            }
            out.insert(contract, per_contract);
        }
        Ok(out)
    }

    async fn set_storage_pointers(
        &self,
        writes: HashMap<Address, HashMap<Pointer, (StorageValue, Vec<Hash>)>>,
        height: u64,
    ) -> Result<(), EngineError> {
        let mut storage = self.storage.write().unwrap();
        for (contract, pointers) in writes {
            for (pointer, (value, proofs)) in pointers {
                storage
                    .entry((contract, pointer))
                    .or_default()
                    .insert(height, ProvenValue::new(value, proofs, height));
            }
        }
        Ok(())
    }

    async fn save_block_header(&self, header: BlockHeader) -> Result<(), EngineError> {
        let height = header.height;
        self.headers.write().unwrap().insert(height, header);
        let mut latest = self.latest_height.write().unwrap();
        if latest.is_none_or(|h| height > h) {
            *latest = Some(height);
        }
        Ok(())
    }

    async fn get_block_header(&self, height: u64) -> Result<Option<BlockHeader>, EngineError> {
        Ok(self.headers.read().unwrap().get(&height).cloned())
    }

    async fn get_latest_block(&self) -> Result<Option<BlockHeader>, EngineError> {
        let Some(height) = *self.latest_height.read().unwrap() else {
            return Ok(None);
        };
        Ok(self.headers.read().unwrap().get(&height).cloned())
    }
}
