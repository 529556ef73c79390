//! The host capability this crate needs from its caller: dispatching a
//! nested `getCalls` request back through the VM Manager.
//!
//! Mirrors the rest of this workspace's "capability passed at
//! construction" shape (`StorageInterface`, `ContractRuntime`) rather than
//! a hidden global — `cx-manager` is the only production implementer, and
//! tests can substitute a fake that never actually recurses.

use async_trait::async_trait;
use cx_storage::StorageOverlay;
use cx_types::errors::EngineError;
use cx_types::value_objects::{Address, GasUnits, Pointer, StorageValue};
use cx_wasm::abi::EmittedEvent;

/// One call from a `getCalls` batch, ready to dispatch.
#[derive(Clone, Debug)]
pub struct ExternalCallRequest {
    /// The callee contract.
    pub to: Address,
    /// The calldata to invoke it with, selector included.
    pub calldata: Vec<u8>,
    /// The value (in satoshis) attached to the call.
    pub value: u64,
    /// The address the callee should see as `caller` (the current frame's
    /// own address).
    pub caller: Address,
    /// The top-level transaction's originator, unchanged across the call tree.
    pub tx_origin: Address,
    /// The nested call depth this request would execute at.
    pub call_depth: u32,
    /// The nested deploy depth this request would execute at.
    pub deploy_depth: u32,
    /// The gas budget available to the nested call, already bounded by
    /// the calling frame's remaining gas.
    pub gas_available: GasUnits,
    /// The block this call executes in.
    pub block_height: u64,
    /// The block's median time.
    pub block_median_time: u64,
}

/// What a dispatched external call produced.
#[derive(Clone, Debug)]
pub struct ExternalCallOutcome {
    /// Whether the nested call succeeded.
    pub success: bool,
    /// The nested call's return bytes (empty on revert).
    pub output: Vec<u8>,
    /// Gas the nested call consumed, whether it reverted or not.
    pub gas_used: GasUnits,
    /// Dirty storage the nested call produced (empty on revert).
    pub dirty_storage: Vec<(Address, Pointer, StorageValue)>,
    /// Events the nested call emitted (empty on revert).
    pub events: Vec<EmittedEvent>,
}

/// Dispatches one nested call, threading the caller's storage overlay
/// through so the callee's writes land in a child layered on top of it.
///
/// Implementations own the overlay across the call: they hand back the
/// same overlay (with the nested frame's writes merged in on success, or
/// discarded on revert) so the calling evaluator can resume exactly where
/// it left off.
#[async_trait]
pub trait ExternalCaller: Send + Sync {
    /// Dispatch `request`, consuming and returning `storage`.
    async fn call_external(
        &self,
        storage: StorageOverlay,
        request: ExternalCallRequest,
    ) -> Result<(StorageOverlay, ExternalCallOutcome), EngineError>;
}
