//! The contract evaluator: drives one invocation through its state
//! machine, from `INIT` to harvested result.

use cx_gas::GasMeter;
use cx_storage::StorageOverlay;
use cx_types::value_objects::{Address, GasUnits};
use cx_wasm::abi::{self, EnvironmentBlock};
use cx_wasm::runtime::GuestContract;

use crate::capabilities::{ExternalCallRequest, ExternalCaller};
use crate::errors::EvaluatorError;
use crate::evaluation::Evaluation;
use crate::frame::CallFrame;
use crate::state::EvaluatorState;

/// Drives a single [`GuestContract`] instance through its invocation
/// lifecycle.
pub struct ContractEvaluator {
    state: EvaluatorState,
    contract: Box<dyn GuestContract>,
    frame: CallFrame,
    fuel_charged: u64,
}

impl ContractEvaluator {
    /// Build a fresh evaluator bound to a freshly-instantiated guest and a
    /// call frame. Starts in `LOADED`.
    pub fn new(contract: Box<dyn GuestContract>, frame: CallFrame) -> Self {
        Self {
            state: EvaluatorState::Loaded,
            contract,
            frame,
            fuel_charged: 0,
        }
    }

    /// Folds any fuel the guest has burned since the last sync into
    /// `gas`, so nested-call budgets and the final harvested total
    /// reflect this frame's own execution cost, not just reconciled
    /// sub-call usage. Fakes reporting `0` are a no-op.
    fn sync_fuel(&mut self, gas: &mut GasMeter) {
        let Ok(consumed) = self.contract.fuel_consumed() else {
            return;
        };
        let delta = consumed.saturating_sub(self.fuel_charged);
        if delta == 0 {
            return;
        }
        // A well-behaved runtime never reports more burned than the fuel
        // it was handed, so this only triggers on exhaustion: charge
        // whatever remains rather than leaving the meter short, per
        // `EngineError::consumes_all_gas`.
        if gas.consume(GasUnits(delta)).is_err() {
            let remaining = gas.remaining();
            let _ = gas.consume(remaining);
        }
        self.fuel_charged = consumed;
    }

    /// The frame this evaluator is bound to.
    pub fn frame(&self) -> &CallFrame {
        &self.frame
    }

    /// The evaluator's current state, mostly for tests and diagnostics.
    pub fn state(&self) -> EvaluatorState {
        self.state
    }

    fn require(&self, expected: EvaluatorState) -> Result<(), EvaluatorError> {
        if self.state != expected {
            return Err(EvaluatorError::IllegalTransition {
                from: self.state,
                to: expected,
            });
        }
        Ok(())
    }

    /// `setup(deployer, self)`: binds identity. `LOADED -> ENV_SET`.
    pub fn setup(&mut self, deployer: Address, self_address: Address) -> Result<(), EvaluatorError> {
        self.require(EvaluatorState::Loaded)?;
        self.contract.init(deployer, self_address)?;
        self.state = EvaluatorState::EnvSet;
        Ok(())
    }

    fn set_environment(&mut self) -> Result<(), EvaluatorError> {
        self.require(EvaluatorState::EnvSet)?;
        let env = EnvironmentBlock {
            block_height: self.frame.block_height,
            block_median: self.frame.block_median_time,
            tx_origin: self.frame.tx_origin,
            msg_sender: self.frame.msg_sender,
            caller: self.frame.caller,
            is_constructor: self.frame.is_constructor,
            deployed_contracts: self.frame.deployed_contracts.clone(),
        };
        self.contract.set_environment(&env.encode())?;
        self.state = EvaluatorState::GasSet;
        Ok(())
    }

    fn set_gas(&mut self, gas: &GasMeter) -> Result<(), EvaluatorError> {
        self.require(EvaluatorState::GasSet)?;
        self.contract.set_max_gas(gas.limit().0, gas.used().0)?;
        self.state = EvaluatorState::StorageLoaded;
        Ok(())
    }

    async fn load_storage(&mut self, storage: &StorageOverlay) -> Result<(), EvaluatorError> {
        self.require(EvaluatorState::StorageLoaded)?;
        let mut entries = Vec::with_capacity(self.frame.pre_read_pointers.len());
        for pointer in &self.frame.pre_read_pointers {
            let value = storage.get(self.frame.contract_address, *pointer).await?;
            entries.push((self.frame.contract_address, *pointer, value));
        }
        let snapshot = abi::encode_storage_tuples(&entries);
        self.contract.load_storage(&snapshot)?;
        self.state = EvaluatorState::Running;
        Ok(())
    }

    /// Dispatch the guest's method/view export. Valid from `RUNNING`,
    /// whether reached for the first time or resumed after a nested call.
    fn invoke(&mut self) -> Result<Vec<u8>, EvaluatorError> {
        self.require(EvaluatorState::Running)?;
        if self.frame.is_view {
            Ok(self.contract.read_view(self.frame.selector)?)
        } else {
            Ok(self
                .contract
                .read_method(self.frame.selector, &self.frame.calldata, self.frame.caller)?)
        }
    }

    fn pending_calls(&mut self) -> Result<Vec<cx_wasm::abi::CallRequest>, EvaluatorError> {
        let raw = self.contract.get_calls()?;
        Ok(abi::decode_calls_batch(&raw)?)
    }

    fn harvest_success(
        &mut self,
        result: Vec<u8>,
        gas: &GasMeter,
    ) -> Result<Evaluation, EvaluatorError> {
        let modified = self.contract.get_modified_storage()?;
        let dirty = abi::decode_storage_tuples(&modified)?;
        let raw_events = self.contract.get_events()?;
        let events = abi::decode_events(&raw_events)?;
        let deployed = if self.frame.is_constructor {
            self.frame.deployed_contracts.clone()
        } else {
            Vec::new()
        };
        self.state = EvaluatorState::Done;
        Ok(Evaluation::success(result, gas.used(), dirty, events, deployed))
    }

    /// Run this invocation to completion: `ENV_SET -> ... -> DONE` or
    /// `REVERTED`. Dispatches any `getCalls` batch back through `caller`,
    /// threading `storage` through the nested call and back.
    ///
    /// Always returns the frame's own storage overlay alongside the
    /// evaluation (with any nested sub-call's writes already folded in on
    /// that sub-call's success, or dropped on its revert) so the caller
    /// can `commit()` or `discard()` it.
    #[tracing::instrument(skip_all, fields(contract = %self.frame.contract_address, selector = format!("{:08x}", self.frame.selector), depth = self.frame.call_depth))]
    pub async fn execute(
        mut self,
        storage: StorageOverlay,
        mut gas: GasMeter,
        caller: &dyn ExternalCaller,
    ) -> (Evaluation, StorageOverlay) {
        let mut storage = Some(storage);
        let outcome = self.run(&mut storage, &mut gas, caller).await;
        let storage = storage.expect("run() always restores storage before returning");

        match outcome {
            Ok(evaluation) => (evaluation, storage),
            Err(err) => {
                self.sync_fuel(&mut gas);
                self.state = EvaluatorState::Reverted;
                (Evaluation::reverted(err.to_string(), gas.used()), storage)
            }
        }
    }

    async fn run(
        &mut self,
        storage: &mut Option<StorageOverlay>,
        gas: &mut GasMeter,
        caller: &dyn ExternalCaller,
    ) -> Result<Evaluation, EvaluatorError> {
        self.set_environment()?;
        self.set_gas(gas)?;
        self.load_storage(storage.as_ref().expect("storage present"))
            .await?;

        let mut result = self.invoke()?;
        self.sync_fuel(gas);

        loop {
            let calls = self.pending_calls()?;
            if calls.is_empty() {
                break;
            }
            self.state = EvaluatorState::CallRequested;

            let mut responses = Vec::with_capacity(calls.len());
            for call in calls {
                let child_budget = gas.child_meter(GasUnits(u64::MAX)).remaining();

                let owned_storage = storage.take().expect("storage present");
                let request = ExternalCallRequest {
                    to: call.to,
                    calldata: call.calldata,
                    value: call.value,
                    caller: self.frame.contract_address,
                    tx_origin: self.frame.tx_origin,
                    call_depth: self.frame.call_depth + 1,
                    deploy_depth: self.frame.deploy_depth,
                    gas_available: child_budget,
                    block_height: self.frame.block_height,
                    block_median_time: self.frame.block_median_time,
                };

                let (restored, call_outcome) =
                    caller.call_external(owned_storage, request).await?;
                *storage = Some(restored);

                let mut child = gas.child_meter(child_budget);
                let _ = child.consume(call_outcome.gas_used);
                gas.reconcile(&child);

                if !call_outcome.success {
                    return Err(EvaluatorError::External(
                        cx_types::errors::EngineError::ExecutionReverted {
                            reason: "nested call reverted".into(),
                        },
                    ));
                }

                responses.push(call_outcome.output);
            }

            let response_bytes = abi::encode_call_responses(&responses);
            self.contract.load_calls_response(&response_bytes)?;
            self.state = EvaluatorState::Running;
            result = self.invoke()?;
            self.sync_fuel(gas);
        }

        // Fold the guest's own harvested writes into this frame's overlay.
        // `set` rejects any entry not addressed to `self.frame.contract_address`
        // (Invariant 2), and a nested frame's own call to this same path is
        // what lets its writes survive `StorageOverlay::commit` into the
        // parent on the way back up.
        let evaluation = self.harvest_success(result, gas)?;
        let overlay = storage.as_mut().expect("storage present");
        for (contract, pointer, value) in &evaluation.dirty_storage {
            overlay.set(*contract, *pointer, *value)?;
        }
        Ok(evaluation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cx_types::entities::{BlockHeader, ContractRecord, ProvenValue};
    use cx_types::errors::EngineError;
    use cx_types::ports::StorageInterface;
    use cx_types::value_objects::{Pointer, StorageValue};
    use cx_wasm::errors::WasmError;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[derive(Default)]
    struct EmptyBackend;

    #[async_trait]
    impl StorageInterface for EmptyBackend {
        async fn get_contract_at(
            &self,
            _address: Address,
            _height: Option<u64>,
        ) -> Result<Option<ContractRecord>, EngineError> {
            Ok(None)
        }
        async fn get_contract_address_at(
            &self,
            _address: Address,
            _height: Option<u64>,
        ) -> Result<Option<Address>, EngineError> {
            Ok(None)
        }
        async fn set_contract_at(&self, _record: ContractRecord) -> Result<(), EngineError> {
            Ok(())
        }
        async fn get_storage(
            &self,
            _contract: Address,
            _pointer: Pointer,
            _height: Option<u64>,
        ) -> Result<Option<ProvenValue>, EngineError> {
            Ok(None)
        }
        async fn get_storage_multiple(
            &self,
            _request: HashMap<Address, Vec<Pointer>>,
            _height: Option<u64>,
        ) -> Result<HashMap<Address, HashMap<Pointer, ProvenValue>>, EngineError> {
            Ok(HashMap::new())
        }
        async fn set_storage_pointers(
            &self,
            _writes: HashMap<Address, HashMap<Pointer, (StorageValue, Vec<cx_types::value_objects::Hash>)>>,
            _height: u64,
        ) -> Result<(), EngineError> {
            Ok(())
        }
        async fn save_block_header(&self, _header: BlockHeader) -> Result<(), EngineError> {
            Ok(())
        }
        async fn get_block_header(&self, _height: u64) -> Result<Option<BlockHeader>, EngineError> {
            Ok(None)
        }
        async fn get_latest_block(&self) -> Result<Option<BlockHeader>, EngineError> {
            Ok(None)
        }
    }

    /// A pure-Rust [`GuestContract`] fake: echoes calldata back as the
    /// result and never requests nested calls. Stands in for compiled
    /// WASM bytecode, which this workspace has no toolchain to produce.
    #[derive(Default)]
    struct EchoContract {
        initialized: bool,
        last_calldata: Vec<u8>,
        should_trap: bool,
    }

    impl GuestContract for EchoContract {
        fn init(&mut self, _deployer: Address, _self_address: Address) -> Result<(), WasmError> {
            self.initialized = true;
            Ok(())
        }
        fn read_method(
            &mut self,
            _selector: u32,
            calldata: &[u8],
            _caller: Address,
        ) -> Result<Vec<u8>, WasmError> {
            if self.should_trap {
                return Err(WasmError::Trap("echo configured to trap".into()));
            }
            self.last_calldata = calldata.to_vec();
            Ok(calldata.to_vec())
        }
        fn read_view(&mut self, _selector: u32) -> Result<Vec<u8>, WasmError> {
            Ok(vec![])
        }
        fn get_method_abi(&mut self) -> Result<Vec<u8>, WasmError> {
            Ok(vec![])
        }
        fn get_view_abi(&mut self) -> Result<Vec<u8>, WasmError> {
            Ok(vec![])
        }
        fn get_events(&mut self) -> Result<Vec<u8>, WasmError> {
            Ok(vec![])
        }
        fn get_write_methods(&mut self) -> Result<Vec<u8>, WasmError> {
            Ok(vec![])
        }
        fn set_environment(&mut self, _env_bytes: &[u8]) -> Result<(), WasmError> {
            Ok(())
        }
        fn set_max_gas(&mut self, _max: u64, _used: u64) -> Result<(), WasmError> {
            Ok(())
        }
        fn load_storage(&mut self, _snapshot: &[u8]) -> Result<(), WasmError> {
            Ok(())
        }
        fn get_modified_storage(&mut self) -> Result<Vec<u8>, WasmError> {
            Ok(vec![])
        }
        fn get_calls(&mut self) -> Result<Vec<u8>, WasmError> {
            Ok(vec![])
        }
        fn load_calls_response(&mut self, _response: &[u8]) -> Result<(), WasmError> {
            Ok(())
        }
        fn purge_memory(&mut self) -> Result<(), WasmError> {
            Ok(())
        }
        fn is_initialized(&mut self) -> Result<bool, WasmError> {
            Ok(self.initialized)
        }
        fn fuel_consumed(&mut self) -> Result<u64, WasmError> {
            Ok(0)
        }
    }

    struct NeverCalled;

    #[async_trait]
    impl ExternalCaller for NeverCalled {
        async fn call_external(
            &self,
            _storage: StorageOverlay,
            _request: ExternalCallRequest,
        ) -> Result<(StorageOverlay, crate::capabilities::ExternalCallOutcome), EngineError> {
            panic!("this test's contract never emits getCalls");
        }
    }

    fn addr(n: u8) -> Address {
        Address::new([n; 32])
    }

    fn root_overlay(executing: Address) -> StorageOverlay {
        StorageOverlay::new_root(
            Arc::new(EmptyBackend),
            cx_storage::new_proof_cache(),
            executing,
            Some(1),
        )
    }

    #[tokio::test]
    async fn test_setup_before_env_set_required() {
        let contract = Box::new(EchoContract::default());
        let frame = CallFrame::root(addr(1), 0xAA000001, vec![1, 2, 3, 4], addr(9), 1, 1000);
        let mut evaluator = ContractEvaluator::new(contract, frame);
        assert_eq!(evaluator.state(), EvaluatorState::Loaded);
        evaluator.setup(addr(9), addr(1)).unwrap();
        assert_eq!(evaluator.state(), EvaluatorState::EnvSet);
    }

    #[tokio::test]
    async fn test_illegal_transition_rejected() {
        let contract = Box::new(EchoContract::default());
        let frame = CallFrame::root(addr(1), 0xAA000001, vec![1, 2, 3, 4], addr(9), 1, 1000);
        let mut evaluator = ContractEvaluator::new(contract, frame);
        let err = evaluator.set_environment().unwrap_err();
        assert!(matches!(err, EvaluatorError::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn test_execute_happy_path_reaches_done() {
        let contract = Box::new(EchoContract::default());
        let frame = CallFrame::root(addr(1), 0xAA000001, vec![0xAA, 0x00, 0x00, 0x01, 7], addr(9), 1, 1000);
        let mut evaluator = ContractEvaluator::new(contract, frame);
        evaluator.setup(addr(9), addr(1)).unwrap();

        let storage = root_overlay(addr(1));
        let gas = GasMeter::new(GasUnits(1_000));
        let (evaluation, _storage) = evaluator.execute(storage, gas, &NeverCalled).await;

        assert!(evaluation.success);
        assert_eq!(evaluation.result, vec![0xAA, 0x00, 0x00, 0x01, 7]);
    }

    #[tokio::test]
    async fn test_execute_trap_reverts_and_discards() {
        let mut contract = EchoContract::default();
        contract.should_trap = true;
        let frame = CallFrame::root(addr(1), 0xAA000001, vec![0xAA, 0x00, 0x00, 0x01], addr(9), 1, 1000);
        let mut evaluator = ContractEvaluator::new(Box::new(contract), frame);
        evaluator.setup(addr(9), addr(1)).unwrap();

        let storage = root_overlay(addr(1));
        let gas = GasMeter::new(GasUnits(1_000));
        let (evaluation, _storage) = evaluator.execute(storage, gas, &NeverCalled).await;

        assert!(!evaluation.success);
        assert!(evaluation.dirty_storage.is_empty());
        assert!(evaluation.revert_reason.is_some());
    }

    /// A [`GuestContract`] fake that reports one write from
    /// `get_modified_storage`, to whichever contract address it's
    /// configured with — its own, to exercise the happy path, or a
    /// foreign one, to exercise Invariant 2.
    struct WritingContract {
        target: Address,
        pointer: Pointer,
        value: StorageValue,
    }

    impl GuestContract for WritingContract {
        fn init(&mut self, _deployer: Address, _self_address: Address) -> Result<(), WasmError> {
            Ok(())
        }
        fn read_method(
            &mut self,
            _selector: u32,
            _calldata: &[u8],
            _caller: Address,
        ) -> Result<Vec<u8>, WasmError> {
            Ok(vec![0x00])
        }
        fn read_view(&mut self, _selector: u32) -> Result<Vec<u8>, WasmError> {
            Ok(vec![])
        }
        fn get_method_abi(&mut self) -> Result<Vec<u8>, WasmError> {
            Ok(vec![])
        }
        fn get_view_abi(&mut self) -> Result<Vec<u8>, WasmError> {
            Ok(vec![])
        }
        fn get_events(&mut self) -> Result<Vec<u8>, WasmError> {
            Ok(vec![])
        }
        fn get_write_methods(&mut self) -> Result<Vec<u8>, WasmError> {
            Ok(vec![])
        }
        fn set_environment(&mut self, _env_bytes: &[u8]) -> Result<(), WasmError> {
            Ok(())
        }
        fn set_max_gas(&mut self, _max: u64, _used: u64) -> Result<(), WasmError> {
            Ok(())
        }
        fn load_storage(&mut self, _snapshot: &[u8]) -> Result<(), WasmError> {
            Ok(())
        }
        fn get_modified_storage(&mut self) -> Result<Vec<u8>, WasmError> {
            Ok(abi::encode_storage_tuples(&[(self.target, self.pointer, self.value)]))
        }
        fn get_calls(&mut self) -> Result<Vec<u8>, WasmError> {
            Ok(vec![])
        }
        fn load_calls_response(&mut self, _response: &[u8]) -> Result<(), WasmError> {
            Ok(())
        }
        fn purge_memory(&mut self) -> Result<(), WasmError> {
            Ok(())
        }
        fn is_initialized(&mut self) -> Result<bool, WasmError> {
            Ok(true)
        }
        fn fuel_consumed(&mut self) -> Result<u64, WasmError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_harvested_write_lands_in_returned_overlay() {
        let own = addr(1);
        let pointer = Pointer::new([7; 32]);
        let value = StorageValue::new([9; 32]);
        let contract = Box::new(WritingContract {
            target: own,
            pointer,
            value,
        });
        let frame = CallFrame::root(own, 0xAA000001, vec![0xAA, 0x00, 0x00, 0x01], addr(9), 1, 1000);
        let mut evaluator = ContractEvaluator::new(contract, frame);
        evaluator.setup(addr(9), own).unwrap();

        let storage = root_overlay(own);
        let gas = GasMeter::new(GasUnits(1_000));
        let (evaluation, storage) = evaluator.execute(storage, gas, &NeverCalled).await;

        assert!(evaluation.success);
        let written = storage.into_writes();
        assert_eq!(written.get(&(own, pointer)), Some(&value));
    }

    #[tokio::test]
    async fn test_cross_contract_write_reverts_whole_frame() {
        let own = addr(1);
        let foreign = addr(2);
        let pointer = Pointer::new([7; 32]);
        let value = StorageValue::new([9; 32]);
        let contract = Box::new(WritingContract {
            target: foreign,
            pointer,
            value,
        });
        let frame = CallFrame::root(own, 0xAA000001, vec![0xAA, 0x00, 0x00, 0x01], addr(9), 1, 1000);
        let mut evaluator = ContractEvaluator::new(contract, frame);
        evaluator.setup(addr(9), own).unwrap();

        let storage = root_overlay(own);
        let gas = GasMeter::new(GasUnits(1_000));
        let (evaluation, storage) = evaluator.execute(storage, gas, &NeverCalled).await;

        assert!(!evaluation.success);
        assert!(evaluation.dirty_storage.is_empty());
        assert!(storage.into_writes().is_empty());
    }
}
