//! Errors from a single contract invocation.

use crate::state::EvaluatorState;
use cx_gas::GasError;
use cx_storage::StorageError;
use cx_types::errors::EngineError;
use cx_wasm::errors::WasmError;
use thiserror::Error;

/// Errors surfaced by the contract evaluator state machine.
#[derive(Debug, Error, Clone)]
pub enum EvaluatorError {
    /// A transition function was called out of order.
    #[error("illegal evaluator transition: {from} -> {to}")]
    IllegalTransition {
        /// The state the evaluator was actually in.
        from: EvaluatorState,
        /// The transition that was attempted.
        to: EvaluatorState,
    },

    /// The guest trapped, timed out, or otherwise failed during execution.
    #[error("wasm error: {0}")]
    Wasm(#[from] WasmError),

    /// The frame's gas budget was exhausted.
    #[error("gas error: {0}")]
    Gas(#[from] GasError),

    /// A storage read or write failed (including a cross-contract write
    /// rejection, Invariant 2).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// This frame's nested call chain would exceed `MAX_CALL_DEPTH`.
    #[error("call depth exceeded: {depth} > {max}")]
    CallDepthExceeded {
        /// The depth that was attempted.
        depth: u32,
        /// The configured ceiling.
        max: u32,
    },

    /// This frame's nested deploy chain would exceed `MAX_DEPLOY_DEPTH`.
    #[error("deploy depth exceeded: {depth} > {max}")]
    DeployDepthExceeded {
        /// The depth that was attempted.
        depth: u32,
        /// The configured ceiling.
        max: u32,
    },

    /// Calldata failed structural validation (shorter than the 4-byte
    /// selector, or similar).
    #[error("invalid calldata: {0}")]
    InvalidCalldata(String),

    /// A nested external call, dispatched through the host callback, failed.
    #[error("external call failed: {0}")]
    External(#[from] EngineError),
}

impl EvaluatorError {
    /// True when this error should collapse every frame above it (a
    /// timeout or an exhausted call-depth budget), as opposed to an
    /// ordinary revert that only unwinds the current frame.
    pub fn collapses_call_stack(&self) -> bool {
        matches!(
            self,
            EvaluatorError::Wasm(WasmError::Timeout)
                | EvaluatorError::CallDepthExceeded { .. }
                | EvaluatorError::DeployDepthExceeded { .. }
        )
    }
}

impl From<EvaluatorError> for EngineError {
    fn from(err: EvaluatorError) -> Self {
        match err {
            EvaluatorError::Gas(_) => EngineError::OutOfGas,
            EvaluatorError::Wasm(WasmError::Timeout) => EngineError::ExecutionTimeout,
            EvaluatorError::Wasm(WasmError::OutOfFuel) => EngineError::OutOfGas,
            EvaluatorError::Wasm(inner) => EngineError::ExecutionReverted {
                reason: inner.to_string(),
            },
            EvaluatorError::Storage(StorageError::CrossContractWrite { .. }) => {
                EngineError::ExecutionReverted {
                    reason: err.to_string(),
                }
            }
            EvaluatorError::Storage(StorageError::Backend(inner)) => inner,
            EvaluatorError::CallDepthExceeded { depth, max } => {
                EngineError::CallDepthExceeded { depth, max }
            }
            EvaluatorError::DeployDepthExceeded { depth, max } => EngineError::CallDepthExceeded {
                depth,
                max,
            },
            EvaluatorError::InvalidCalldata(detail) => EngineError::InvalidCalldata(detail),
            EvaluatorError::External(inner) => inner,
            EvaluatorError::IllegalTransition { from, to } => {
                EngineError::Internal(format!("illegal evaluator transition: {from} -> {to}"))
            }
        }
    }
}
