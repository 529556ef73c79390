//! Resolves a contract reference to the canonical address this engine
//! indexes storage and contract records by (spec §9.1).
//!
//! The original system distinguishes virtual and canonical addresses by a
//! string prefix; this port's [`Address`] is a fixed-width byte type, so
//! resolution here is by lookup instead: if the contract index maps the
//! given address to a distinct canonical one, it was virtual. An address
//! with no mapping is already canonical.

use async_trait::async_trait;
use cx_types::errors::EngineError;
use cx_types::ports::StorageInterface;
use cx_types::value_objects::Address;
use std::sync::Arc;

/// Resolves a possibly-virtual contract address to its canonical form.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Resolve `address` at `height`, returning it unchanged if it's
    /// already canonical.
    async fn resolve(&self, address: Address, height: Option<u64>) -> Result<Address, EngineError>;
}

/// Resolves by looking the address up in the contract index.
pub struct StorageAddressResolver<S: StorageInterface> {
    storage: Arc<S>,
}

impl<S: StorageInterface> StorageAddressResolver<S> {
    /// Build a resolver backed by `storage`.
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl<S: StorageInterface> AddressResolver for StorageAddressResolver<S> {
    async fn resolve(&self, address: Address, height: Option<u64>) -> Result<Address, EngineError> {
        match self.storage.get_contract_address_at(address, height).await? {
            Some(canonical) => Ok(canonical),
            None => Ok(address),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::in_memory_storage::InMemoryStorage;
    use cx_types::entities::ContractRecord;
    use cx_types::value_objects::{Bytes, Hash};

    fn addr(n: u8) -> Address {
        Address::new([n; 32])
    }

    #[tokio::test]
    async fn test_unmapped_address_resolves_to_itself() {
        let storage = Arc::new(InMemoryStorage::new());
        let resolver = StorageAddressResolver::new(storage);
        let resolved = resolver.resolve(addr(1), None).await.unwrap();
        assert_eq!(resolved, addr(1));
    }

    #[tokio::test]
    async fn test_virtual_address_resolves_to_canonical() {
        let storage = Arc::new(InMemoryStorage::new());
        storage
            .set_contract_at(ContractRecord {
                virtual_address: addr(1),
                canonical_address: addr(2),
                deployer: addr(9),
                bytecode: Bytes::new(vec![]),
                salt: [0u8; 32],
                deployed_at_height: 0,
                deployed_tx_id: Hash::ZERO,
            })
            .await
            .unwrap();

        let resolver = StorageAddressResolver::new(storage);
        let resolved = resolver.resolve(addr(1), None).await.unwrap();
        assert_eq!(resolved, addr(2));
    }
}
