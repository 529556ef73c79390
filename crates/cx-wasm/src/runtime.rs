//! The contract-runtime port: the ABI surface (spec §4.E) as a trait,
//! separate from its `wasmtime`-backed implementation.
//!
//! `cx-evaluator` depends only on [`ContractRuntime`]/[`GuestContract`],
//! never on `cx-wasm::isolator` directly — the same "capability passed at
//! construction" shape this workspace already uses for `StorageInterface`.
//! This is what lets integration tests drive the evaluator against a
//! fast, deterministic in-memory fake instead of compiling real WASM
//! bytecode for every fixture.

use crate::errors::WasmError;
use cx_types::value_objects::{Address, Bytes};

/// One live guest contract instance, bound to a single invocation.
///
/// Every call here corresponds 1:1 to an export in spec §4.E. A fresh
/// instance is created per invocation (re-entrant occurrences of the same
/// contract each get their own instance, mirroring the evaluator's
/// fresh-frame-per-occurrence policy).
pub trait GuestContract: Send {
    /// `INIT(deployer, self_address)`.
    fn init(&mut self, deployer: Address, self_address: Address) -> Result<(), WasmError>;

    /// `readMethod(selector, calldata, caller)` — mutating.
    fn read_method(
        &mut self,
        selector: u32,
        calldata: &[u8],
        caller: Address,
    ) -> Result<Vec<u8>, WasmError>;

    /// `readView(selector)` — non-mutating.
    fn read_view(&mut self, selector: u32) -> Result<Vec<u8>, WasmError>;

    /// `getMethodABI()`.
    fn get_method_abi(&mut self) -> Result<Vec<u8>, WasmError>;

    /// `getViewABI()`.
    fn get_view_abi(&mut self) -> Result<Vec<u8>, WasmError>;

    /// `getEvents()`.
    fn get_events(&mut self) -> Result<Vec<u8>, WasmError>;

    /// `getWriteMethods()`.
    fn get_write_methods(&mut self) -> Result<Vec<u8>, WasmError>;

    /// `setEnvironment(env_bytes)`.
    fn set_environment(&mut self, env_bytes: &[u8]) -> Result<(), WasmError>;

    /// `setMaxGas(max, used)`.
    fn set_max_gas(&mut self, max: u64, used: u64) -> Result<(), WasmError>;

    /// `loadStorage(bytes)`.
    fn load_storage(&mut self, snapshot: &[u8]) -> Result<(), WasmError>;

    /// `getModifiedStorage()`.
    fn get_modified_storage(&mut self) -> Result<Vec<u8>, WasmError>;

    /// `getCalls()`.
    fn get_calls(&mut self) -> Result<Vec<u8>, WasmError>;

    /// `loadCallsResponse(bytes)`.
    fn load_calls_response(&mut self, response: &[u8]) -> Result<(), WasmError>;

    /// `purgeMemory()`.
    fn purge_memory(&mut self) -> Result<(), WasmError>;

    /// `isInitialized()`.
    fn is_initialized(&mut self) -> Result<bool, WasmError>;

    /// Fuel (gas) this instance has burned since it was instantiated.
    /// Lets the evaluator fold an invocation's real execution cost into
    /// the block's gas ledger instead of relying solely on nested-call
    /// reconciliation. Fakes that don't meter fuel may always return `0`.
    fn fuel_consumed(&mut self) -> Result<u64, WasmError>;
}

/// Compiles bytecode and produces fresh [`GuestContract`] instances.
pub trait ContractRuntime: Send + Sync {
    /// Instantiate `bytecode` for `contract`, with the given fuel
    /// (gas-as-fuel) and epoch-tick deadline.
    fn instantiate(
        &self,
        contract: Address,
        bytecode: &Bytes,
        fuel: u64,
        epoch_ticks: u64,
    ) -> Result<Box<dyn GuestContract>, WasmError>;
}
