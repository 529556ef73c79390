//! The engine-wide error taxonomy.
//!
//! Every public operation in this workspace eventually returns
//! [`EngineError`]. Per-crate error enums (`GasError`, `StorageError`,
//! `MerkleError`, `WasmError`, `EvaluatorError`, `ManagerError`,
//! `PluginError`) convert into it via `#[from]`.

use thiserror::Error;

/// The error surface shared across every component boundary in this engine.
#[derive(Debug, Error, Clone)]
pub enum EngineError {
    /// The referenced contract has no record at the queried height.
    #[error("contract not found")]
    ContractNotFound,

    /// The frame's gas budget was exhausted before execution completed.
    #[error("out of gas")]
    OutOfGas,

    /// The contract explicitly reverted, optionally with a reason string.
    #[error("execution reverted: {reason}")]
    ExecutionReverted {
        /// The revert reason, empty if the contract didn't provide one.
        reason: String,
    },

    /// The frame's wall-clock deadline elapsed before it returned.
    #[error("execution timed out")]
    ExecutionTimeout,

    /// The calldata didn't satisfy the minimum 4-byte selector requirement,
    /// or otherwise failed structural validation.
    #[error("invalid calldata: {0}")]
    InvalidCalldata(String),

    /// A call or deploy chain exceeded its configured depth limit.
    #[error("call depth exceeded: {depth} > {max}")]
    CallDepthExceeded {
        /// The depth that was attempted.
        depth: u32,
        /// The configured ceiling.
        max: u32,
    },

    /// A fatal, block-level failure: historical proof mismatch, corrupted
    /// header, or any other condition that requires a re-index from a
    /// trusted checkpoint.
    #[error("data corrupted: {detail}")]
    DataCorrupted {
        /// Human-readable detail for operator diagnostics.
        detail: String,
    },

    /// A second call arrived at a manager that was not idle.
    #[error("concurrent execution detected")]
    ConcurrencyDetected,

    /// An internal invariant was violated; always a programming error in
    /// this engine, never a caller mistake.
    #[error("internal engine error: {0}")]
    Internal(String),
}

impl EngineError {
    /// True for fatal, block-level errors that must abort the whole block
    /// rather than just the current frame (§7 of this engine's design
    /// notes).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::DataCorrupted { .. } | EngineError::Internal(_)
        )
    }

    /// True when the error still charges the frame's gas as fully consumed
    /// (as opposed to an explicit revert, which only charges gas used up to
    /// the revert point).
    pub fn consumes_all_gas(&self) -> bool {
        matches!(
            self,
            EngineError::OutOfGas | EngineError::ExecutionTimeout | EngineError::CallDepthExceeded { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(EngineError::OutOfGas.to_string(), "out of gas");
        let err = EngineError::CallDepthExceeded { depth: 1025, max: 1024 };
        assert_eq!(err.to_string(), "call depth exceeded: 1025 > 1024");
    }

    #[test]
    fn test_is_fatal() {
        assert!(EngineError::DataCorrupted { detail: "x".into() }.is_fatal());
        assert!(!EngineError::OutOfGas.is_fatal());
        assert!(!EngineError::ExecutionReverted { reason: String::new() }.is_fatal());
    }

    #[test]
    fn test_consumes_all_gas() {
        assert!(EngineError::OutOfGas.consumes_all_gas());
        assert!(EngineError::ExecutionTimeout.consumes_all_gas());
        assert!(!EngineError::ExecutionReverted { reason: "r".into() }.consumes_all_gas());
    }
}
