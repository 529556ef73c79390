//! The VM Manager: orchestrates a block's worth of contract execution
//! (spec §4.G), the single entry point every transaction, deployment and
//! read-only call passes through.
//!
//! Grounded on `qc-11-smart-contracts::service::SmartContractService`: one
//! manager instance per block range, a lifecycle state machine instead of
//! a busy flag, and `tokio::time::timeout` wrapping every call that must
//! respect a wall-clock budget.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use cx_evaluator::prelude::*;
use cx_gas::{convert_sat_to_gas, scale, GasMeter};
use cx_merkle::prelude::*;
use cx_storage::{new_proof_cache, ProofCache, StorageOverlay};
use cx_types::entities::{BlockHeader, ContractRecord};
use cx_types::errors::EngineError;
use cx_types::ports::StorageInterface;
use cx_types::value_objects::{Address, GasUnits, Hash, Pointer, StorageValue};
use cx_wasm::runtime::ContractRuntime;

use crate::address::AddressResolver;
use crate::config::{ManagerConfig, ManagerStats};
use crate::errors::ManagerError;
use crate::state::ManagerState;

/// A top-level transaction invoking an already-deployed contract.
#[derive(Clone, Debug)]
pub struct Transaction {
    /// The transaction's own id, used as the receipt tree's leaf key.
    pub tx_id: Hash,
    /// The contract being invoked, virtual or canonical.
    pub contract_address: Address,
    /// Raw calldata, selector included.
    pub calldata: Vec<u8>,
    /// The externally-owned account that originated this transaction.
    pub from: Address,
    /// Bitcoin burned to fund this call's gas budget.
    pub burned_sats: u64,
}

/// A top-level transaction deploying a new contract and invoking its
/// constructor in the same frame.
#[derive(Clone, Debug)]
pub struct DeployTransaction {
    /// The transaction's own id.
    pub tx_id: Hash,
    /// The deploying account.
    pub deployer: Address,
    /// The contract's WASM bytecode.
    pub bytecode: cx_types::value_objects::Bytes,
    /// Deployment salt, folded into the virtual address.
    pub salt: [u8; 32],
    /// Calldata for the constructor invocation, selector included.
    pub constructor_calldata: Vec<u8>,
    /// Bitcoin burned to fund this deployment's gas budget.
    pub burned_sats: u64,
}

/// Per-block scratch state: the two Merkle trees and the proof cache every
/// transaction in the block shares. Reset on every `prepare_block`,
/// dropped on `save_block`/`revert_block`.
struct BlockScratch {
    median_time: u64,
    base_gas: u64,
    state_tree: StateMerkleTree,
    receipt_tree: ReceiptMerkleTree,
    proof_cache: ProofCache,
}

/// Orchestrates one block's worth of contract execution against a
/// persistent [`StorageInterface`].
///
/// A single manager instance is single-threaded cooperative (spec §5):
/// `lifecycle` gates which operations are legal, and `read_guard` fails
/// fast rather than queuing a second concurrent `execute()` call.
pub struct VmManager<S: StorageInterface + 'static> {
    config: ManagerConfig,
    storage: Arc<S>,
    runtime: Arc<dyn ContractRuntime>,
    resolver: Arc<dyn AddressResolver>,
    lifecycle: Mutex<ManagerState>,
    block: Mutex<Option<BlockScratch>>,
    header_validator: Mutex<BlockHeaderValidator>,
    read_guard: Mutex<()>,
    stats: RwLock<ManagerStats>,
}

impl<S: StorageInterface + 'static> VmManager<S> {
    /// Build a manager over `storage`, dispatching invocations through
    /// `runtime` and resolving virtual addresses through `resolver`.
    pub fn new(
        config: ManagerConfig,
        storage: Arc<S>,
        runtime: Arc<dyn ContractRuntime>,
        resolver: Arc<dyn AddressResolver>,
    ) -> Self {
        let header_cache_capacity = config.header_cache_capacity;
        Self {
            config,
            storage,
            runtime,
            resolver,
            lifecycle: Mutex::new(ManagerState::Idle),
            block: Mutex::new(None),
            header_validator: Mutex::new(BlockHeaderValidator::new(header_cache_capacity)),
            read_guard: Mutex::new(()),
            stats: RwLock::new(ManagerStats::default()),
        }
    }

    /// Current lifecycle state, mostly for tests and diagnostics.
    pub async fn state(&self) -> ManagerState {
        *self.lifecycle.lock().await
    }

    /// A snapshot of running counters.
    pub async fn stats(&self) -> ManagerStats {
        self.stats.read().await.clone()
    }

    /// 1. Allocate fresh per-block trees and caches. Legal only from `IDLE`.
    pub async fn prepare_block(
        &self,
        height: u64,
        median_time: u64,
        base_gas: u64,
    ) -> Result<(), ManagerError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if !matches!(*lifecycle, ManagerState::Idle) {
            return Err(ManagerError::WrongState {
                expected: "IDLE".into(),
                actual: *lifecycle,
            });
        }

        let mut block = self.block.lock().await;
        *block = Some(BlockScratch {
            median_time,
            base_gas,
            state_tree: StateMerkleTree::new(),
            receipt_tree: ReceiptMerkleTree::new(),
            proof_cache: new_proof_cache(),
        });
        *lifecycle = ManagerState::Preparing(height);
        Ok(())
    }

    async fn enter_executing(&self) -> Result<u64, ManagerError> {
        let mut lifecycle = self.lifecycle.lock().await;
        match *lifecycle {
            ManagerState::Preparing(h) | ManagerState::Executing(h) => {
                *lifecycle = ManagerState::Executing(h);
                Ok(h)
            }
            other => Err(ManagerError::WrongState {
                expected: "PREPARING or EXECUTING".into(),
                actual: other,
            }),
        }
    }

    async fn block_context(&self) -> (u64, u64, ProofCache) {
        let block = self.block.lock().await;
        let scratch = block
            .as_ref()
            .expect("PREPARING/EXECUTING lifecycle guarantees block scratch is present");
        (scratch.median_time, scratch.base_gas, scratch.proof_cache.clone())
    }

    /// 2. Validate, build the root frame and run a transaction against an
    /// already-deployed contract; record its receipt and (on success) its
    /// writes into the block's trees.
    pub async fn execute_transaction(&self, tx: Transaction) -> Result<Evaluation, ManagerError> {
        let height = self.enter_executing().await?;
        let (median_time, base_gas, proof_cache) = self.block_context().await;

        let canonical = self.resolver.resolve(tx.contract_address, Some(height)).await?;
        let record = self
            .storage
            .get_contract_at(canonical, Some(height))
            .await?
            .ok_or(EngineError::ContractNotFound)?;

        let selector = cx_wasm::abi::parse_selector(&tx.calldata)
            .map_err(|e| EngineError::InvalidCalldata(e.to_string()))?;

        let raw_gas =
            convert_sat_to_gas(tx.burned_sats, self.config.absolute_max_gas, self.config.gas_ratio);
        let max_gas = scale(raw_gas, base_gas);

        let frame = CallFrame::root(canonical, selector, tx.calldata.clone(), tx.from, height, median_time);

        let backend: Arc<dyn StorageInterface> = self.storage.clone();
        let storage = StorageOverlay::new_root(backend, proof_cache, canonical, Some(height));
        let gas = GasMeter::new(max_gas);

        let guest = self
            .runtime
            .instantiate(canonical, &record.bytecode, max_gas.0, self.config.epoch_ticks)
            .map_err(|e| EngineError::from(EvaluatorError::Wasm(e)))?;

        let mut evaluator = ContractEvaluator::new(guest, frame);
        evaluator
            .setup(record.deployer, canonical)
            .map_err(EngineError::from)?;

        let (evaluation, storage) = evaluator.execute(storage, gas, self).await;
        self.record_transaction(tx.tx_id, canonical, &evaluation, storage).await?;
        Ok(evaluation)
    }

    /// 3. Read-only emulation path: a single-in-flight call that never
    /// persists its writes, bounded by `EMULATION_MAX_GAS` and a wall-clock
    /// deadline independent of the block lifecycle.
    pub async fn execute(
        &self,
        to: Address,
        from: Address,
        calldata: Vec<u8>,
        height: Option<u64>,
    ) -> Result<Evaluation, ManagerError> {
        let _permit = match self.read_guard.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                let mut stats = self.stats.write().await;
                stats.rejected_concurrent += 1;
                return Err(ManagerError::Busy);
            }
        };

        match tokio::time::timeout(
            self.config.read_only_timeout,
            self.execute_read_only(to, from, calldata, height),
        )
        .await
        {
            Ok(inner) => inner,
            Err(_) => Err(ManagerError::Engine(EngineError::ExecutionTimeout)),
        }
    }

    async fn execute_read_only(
        &self,
        to: Address,
        from: Address,
        calldata: Vec<u8>,
        height: Option<u64>,
    ) -> Result<Evaluation, ManagerError> {
        let canonical = self.resolver.resolve(to, height).await?;
        let record = self
            .storage
            .get_contract_at(canonical, height)
            .await?
            .ok_or(EngineError::ContractNotFound)?;

        let selector = cx_wasm::abi::parse_selector(&calldata)
            .map_err(|e| EngineError::InvalidCalldata(e.to_string()))?;

        let frame = CallFrame::root(canonical, selector, calldata, from, height.unwrap_or(0), 0);

        let backend: Arc<dyn StorageInterface> = self.storage.clone();
        let storage = StorageOverlay::new_root(backend, new_proof_cache(), canonical, height);
        let gas = GasMeter::new(self.config.emulation_max_gas);

        let guest = self
            .runtime
            .instantiate(canonical, &record.bytecode, gas.limit().0, self.config.epoch_ticks)
            .map_err(|e| EngineError::from(EvaluatorError::Wasm(e)))?;

        let mut evaluator = ContractEvaluator::new(guest, frame);
        evaluator
            .setup(record.deployer, canonical)
            .map_err(EngineError::from)?;

        // The returned overlay is simply dropped: this path never reaches
        // persistent storage, regardless of outcome.
        let (evaluation, _storage) = evaluator.execute(storage, gas, self).await;
        Ok(evaluation)
    }

    /// 4. Deploy a new contract and invoke its constructor in the same
    /// frame; the contract record is only persisted if the constructor
    /// succeeds.
    pub async fn deploy_contract(
        &self,
        deploy_tx: DeployTransaction,
    ) -> Result<(Address, Evaluation), ManagerError> {
        let height = self.enter_executing().await?;
        let (median_time, base_gas, proof_cache) = self.block_context().await;

        let mut preimage = Vec::with_capacity(32 + deploy_tx.bytecode.len() + 32);
        preimage.extend_from_slice(deploy_tx.deployer.as_bytes());
        preimage.extend_from_slice(deploy_tx.bytecode.as_slice());
        preimage.extend_from_slice(&deploy_tx.salt);
        let virtual_address = Address::new(Hash::digest(&preimage).0);
        // No network-address routing scheme is defined at this boundary;
        // the virtual address doubles as the canonical one at deploy time.
        let canonical_address = virtual_address;

        let raw_gas = convert_sat_to_gas(
            deploy_tx.burned_sats,
            self.config.absolute_max_gas,
            self.config.gas_ratio,
        );
        let max_gas = scale(raw_gas, base_gas);

        let selector = cx_wasm::abi::parse_selector(&deploy_tx.constructor_calldata)
            .map_err(|e| EngineError::InvalidCalldata(e.to_string()))?;

        let frame = CallFrame {
            contract_address: canonical_address,
            selector,
            calldata: deploy_tx.constructor_calldata.clone(),
            caller: deploy_tx.deployer,
            tx_origin: deploy_tx.deployer,
            msg_sender: deploy_tx.deployer,
            call_depth: 0,
            deploy_depth: 0,
            is_constructor: true,
            deployed_contracts: Vec::new(),
            block_height: height,
            block_median_time: median_time,
            is_view: false,
            pre_read_pointers: Vec::new(),
        };

        let backend: Arc<dyn StorageInterface> = self.storage.clone();
        let storage = StorageOverlay::new_root(backend, proof_cache, canonical_address, Some(height));
        let gas = GasMeter::new(max_gas);

        let guest = self
            .runtime
            .instantiate(canonical_address, &deploy_tx.bytecode, max_gas.0, self.config.epoch_ticks)
            .map_err(|e| EngineError::from(EvaluatorError::Wasm(e)))?;

        let mut evaluator = ContractEvaluator::new(guest, frame);
        evaluator
            .setup(deploy_tx.deployer, canonical_address)
            .map_err(EngineError::from)?;

        let (evaluation, storage) = evaluator.execute(storage, gas, self).await;

        if evaluation.success {
            let record = ContractRecord {
                virtual_address,
                canonical_address,
                deployer: deploy_tx.deployer,
                bytecode: deploy_tx.bytecode.clone(),
                salt: deploy_tx.salt,
                deployed_at_height: height,
                deployed_tx_id: deploy_tx.tx_id,
            };
            self.storage.set_contract_at(record).await?;
        }

        self.record_transaction(deploy_tx.tx_id, canonical_address, &evaluation, storage)
            .await?;
        Ok((canonical_address, evaluation))
    }

    async fn record_transaction(
        &self,
        tx_id: Hash,
        contract: Address,
        evaluation: &Evaluation,
        storage: StorageOverlay,
    ) -> Result<(), ManagerError> {
        {
            let mut block = self.block.lock().await;
            let scratch = block
                .as_mut()
                .expect("EXECUTING lifecycle guarantees block scratch is present");

            if evaluation.success {
                for (c, p, v) in storage.into_writes() {
                    scratch
                        .state_tree
                        .update(c, p, v)
                        .map_err(|e| EngineError::Internal(e.to_string()))?;
                }
                scratch
                    .receipt_tree
                    .update(contract, tx_id, evaluation.result.clone())
                    .map_err(|e| EngineError::Internal(e.to_string()))?;
            } else {
                scratch
                    .receipt_tree
                    .update(contract, tx_id, REVERT_MARKER.to_vec())
                    .map_err(|e| EngineError::Internal(e.to_string()))?;
            }
        }

        let mut stats = self.stats.write().await;
        stats.transactions_executed += 1;
        stats.gas_used = stats.gas_used.saturating_add(evaluation.gas_used.0);
        if !evaluation.success {
            stats.reverts += 1;
        }
        Ok(())
    }

    async fn previous_checksum(&self, height: u64) -> Result<Hash, ManagerError> {
        if height == 0 {
            return Ok(Hash::ZERO);
        }
        Ok(self
            .storage
            .get_block_header(height - 1)
            .await?
            .map(|h| h.checksum_root)
            .unwrap_or(Hash::ZERO))
    }

    /// 6. Freeze this block's trees (receipt before state, per Invariant 6)
    /// and persist every dirty `(contract, pointer) -> (value, proofs)`
    /// tuple at the current height.
    pub async fn update_evaluated_states(&self) -> Result<(Hash, Hash), ManagerError> {
        let height = {
            let lifecycle = self.lifecycle.lock().await;
            match *lifecycle {
                ManagerState::Preparing(h) | ManagerState::Executing(h) => h,
                other => {
                    return Err(ManagerError::WrongState {
                        expected: "PREPARING or EXECUTING".into(),
                        actual: other,
                    })
                }
            }
        };

        let prev_checksum = self.previous_checksum(height).await?;

        let (storage_root, receipt_root, writes) = {
            let mut block = self.block.lock().await;
            let scratch = block
                .as_mut()
                .expect("PREPARING/EXECUTING lifecycle guarantees block scratch is present");

            scratch
                .receipt_tree
                .set_previous_checksum(prev_checksum)
                .map_err(|e| EngineError::Internal(e.to_string()))?;
            scratch.receipt_tree.freeze();
            scratch.state_tree.freeze();

            let writes: Vec<(Address, Pointer, StorageValue, Vec<Hash>)> = scratch
                .state_tree
                .everything_with_proofs()
                .map(|(c, p, v, proof)| (c, p, v, proof.to_vec()))
                .collect();

            (scratch.state_tree.root(), scratch.receipt_tree.root(), writes)
        };

        let mut grouped: HashMap<Address, HashMap<Pointer, (StorageValue, Vec<Hash>)>> = HashMap::new();
        for (c, p, v, proof) in writes {
            grouped.entry(c).or_default().insert(p, (v, proof));
        }
        if !grouped.is_empty() {
            self.storage.set_storage_pointers(grouped, height).await?;
        }

        let mut lifecycle = self.lifecycle.lock().await;
        *lifecycle = ManagerState::Frozen(height);
        Ok((storage_root, receipt_root))
    }

    /// 7. Build and persist this block's header, binding it to its
    /// predecessor via the checksum tree. Legal only from `FROZEN`.
    pub async fn save_block(&self, block_hash: Hash, merkle_root: Hash) -> Result<BlockHeader, ManagerError> {
        let height = {
            let lifecycle = self.lifecycle.lock().await;
            match *lifecycle {
                ManagerState::Frozen(h) => h,
                other => {
                    return Err(ManagerError::WrongState {
                        expected: "FROZEN".into(),
                        actual: other,
                    })
                }
            }
        };

        let (storage_root, receipt_root) = {
            let block = self.block.lock().await;
            let scratch = block
                .as_ref()
                .expect("FROZEN lifecycle guarantees block scratch is present");
            (scratch.state_tree.root(), scratch.receipt_tree.root())
        };

        let prev_block_hash = if height == 0 {
            Hash::ZERO
        } else {
            self.storage
                .get_block_header(height - 1)
                .await?
                .map(|h| h.block_hash)
                .unwrap_or(Hash::ZERO)
        };
        let prev_block_checksum = self.previous_checksum(height).await?;

        let mut header = BlockHeader {
            height,
            prev_block_hash,
            prev_block_checksum,
            block_hash,
            merkle_root,
            storage_root,
            receipt_root,
            checksum_root: Hash::ZERO,
            checksum_proofs: Default::default(),
        };
        let leaves = header.checksum_leaves();
        header.checksum_root = cx_merkle::checksum_tree::root(&leaves);
        header.checksum_proofs = std::array::from_fn(|i| cx_merkle::checksum_tree::proof_for(&leaves, i));

        self.storage.save_block_header(header.clone()).await?;

        *self.lifecycle.lock().await = ManagerState::Idle;
        *self.block.lock().await = None;

        Ok(header)
    }

    /// 8. Discard this block's in-memory trees. Persistent storage is
    /// untouched: writes are deferred to [`VmManager::update_evaluated_states`].
    pub async fn revert_block(&self) -> Result<(), ManagerError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if matches!(*lifecycle, ManagerState::Idle) {
            return Err(ManagerError::WrongState {
                expected: "PREPARING, EXECUTING or FROZEN".into(),
                actual: *lifecycle,
            });
        }
        *self.block.lock().await = None;
        *lifecycle = ManagerState::Idle;
        Ok(())
    }

    /// Verify a proven storage value (spec §4.G "Proof verification"):
    /// against the in-memory state tree if it was last written in the
    /// block currently in flight, otherwise against the historical block
    /// header at `last_seen_height`. A mismatch is fatal — it means the
    /// persisted proof no longer matches its claimed root and the host
    /// must re-index from a trusted checkpoint.
    pub async fn verify_proof(
        &self,
        contract: Address,
        pointer: Pointer,
        value: StorageValue,
        proofs: &[Hash],
        last_seen_height: u64,
    ) -> Result<bool, ManagerError> {
        let current_height = self.lifecycle.lock().await.height();

        if current_height == Some(last_seen_height) {
            let mut block = self.block.lock().await;
            let scratch = block
                .as_mut()
                .expect("current height implies block scratch is present");
            // The tree's root and per-leaf proofs are only regenerated on
            // `freeze`; mid-block, a query may arrive for a write that
            // hasn't been through that pass yet.
            if !scratch.state_tree.is_frozen() {
                scratch.state_tree.generate_tree();
            }
            return Ok(StateMerkleTree::verify(
                scratch.state_tree.root(),
                contract,
                pointer,
                value,
                proofs,
            ));
        }

        let header = self.storage.get_block_header(last_seen_height).await?.ok_or_else(|| {
            EngineError::DataCorrupted {
                detail: format!("missing header at height {last_seen_height}"),
            }
        })?;

        let prev_checksum = self.previous_checksum(last_seen_height).await?;
        let header_valid = self.header_validator.lock().await.validate(&header, prev_checksum);
        if !header_valid {
            return Err(ManagerError::Engine(EngineError::DataCorrupted {
                detail: format!("header checksum invalid at height {last_seen_height}"),
            }));
        }

        if !StateMerkleTree::verify(header.storage_root, contract, pointer, value, proofs) {
            return Err(ManagerError::Engine(EngineError::DataCorrupted {
                detail: format!(
                    "storage proof invalid for ({contract}, {pointer}) at height {last_seen_height}"
                ),
            }));
        }
        Ok(true)
    }
}

/// 5. Dispatch a nested `getCalls` request from a running evaluator.
///
/// Depth-limit and contract-not-found failures are reported as an
/// unsuccessful [`ExternalCallOutcome`] rather than an `Err`, so the
/// calling frame's storage overlay is always handed back intact (a true
/// `Err` here would abandon it, which is only safe for conditions that
/// should abort the whole transaction). `CallDepthExceeded` charges the
/// full gas budget offered to the call, matching
/// `EngineError::consumes_all_gas`.
#[async_trait]
impl<S: StorageInterface + 'static> ExternalCaller for VmManager<S> {
    async fn call_external(
        &self,
        storage: StorageOverlay,
        request: ExternalCallRequest,
    ) -> Result<(StorageOverlay, ExternalCallOutcome), EngineError> {
        if request.call_depth > self.config.max_call_depth
            || request.deploy_depth > self.config.max_deploy_depth
        {
            return Ok((
                storage,
                ExternalCallOutcome {
                    success: false,
                    output: Vec::new(),
                    gas_used: request.gas_available,
                    dirty_storage: Vec::new(),
                    events: Vec::new(),
                },
            ));
        }

        let canonical = self.resolver.resolve(request.to, None).await?;
        let record = match self.storage.get_contract_at(canonical, None).await? {
            Some(record) => record,
            None => {
                return Ok((
                    storage,
                    ExternalCallOutcome {
                        success: false,
                        output: Vec::new(),
                        gas_used: GasUnits::ZERO,
                        dirty_storage: Vec::new(),
                        events: Vec::new(),
                    },
                ))
            }
        };

        let selector = match cx_wasm::abi::parse_selector(&request.calldata) {
            Ok(s) => s,
            Err(_) => {
                return Ok((
                    storage,
                    ExternalCallOutcome {
                        success: false,
                        output: Vec::new(),
                        gas_used: GasUnits::ZERO,
                        dirty_storage: Vec::new(),
                        events: Vec::new(),
                    },
                ))
            }
        };

        let frame = CallFrame {
            contract_address: canonical,
            selector,
            calldata: request.calldata.clone(),
            caller: request.caller,
            tx_origin: request.tx_origin,
            msg_sender: request.caller,
            call_depth: request.call_depth,
            deploy_depth: request.deploy_depth,
            is_constructor: false,
            deployed_contracts: Vec::new(),
            block_height: request.block_height,
            block_median_time: request.block_median_time,
            is_view: false,
            pre_read_pointers: Vec::new(),
        };

        let child_storage = storage.child(canonical);
        let gas = GasMeter::new(request.gas_available);

        let guest = self
            .runtime
            .instantiate(canonical, &record.bytecode, request.gas_available.0, self.config.epoch_ticks)
            .map_err(|e| EngineError::from(EvaluatorError::Wasm(e)))?;

        let mut evaluator = ContractEvaluator::new(guest, frame);
        evaluator.setup(record.deployer, canonical).map_err(EngineError::from)?;

        let (evaluation, child_storage) = evaluator.execute(child_storage, gas, self).await;

        if evaluation.success {
            let parent = child_storage
                .commit()
                .expect("a call_external overlay is always a child, never the root");
            Ok((
                parent,
                ExternalCallOutcome {
                    success: true,
                    output: evaluation.result,
                    gas_used: evaluation.gas_used,
                    dirty_storage: evaluation.dirty_storage,
                    events: evaluation.events,
                },
            ))
        } else {
            let parent = child_storage
                .discard()
                .expect("a call_external overlay is always a child, never the root");
            Ok((
                parent,
                ExternalCallOutcome {
                    success: false,
                    output: Vec::new(),
                    gas_used: evaluation.gas_used,
                    dirty_storage: Vec::new(),
                    events: Vec::new(),
                },
            ))
        }
    }
}
