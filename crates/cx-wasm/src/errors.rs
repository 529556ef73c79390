//! Errors from WASM compilation, instantiation and guest execution.

use thiserror::Error;

/// Errors surfaced by the WASM isolator and its guest contract instances.
#[derive(Debug, Error, Clone)]
pub enum WasmError {
    /// Bytecode failed to compile into a module.
    #[error("wasm compile error: {0}")]
    CompileError(String),

    /// Instantiation failed: missing import, linker mismatch, or no
    /// exported linear memory.
    #[error("wasm instantiation error: {0}")]
    InstantiationError(String),

    /// The guest trapped: panic, unreachable, out-of-bounds memory access,
    /// or any other non-timeout trap.
    #[error("wasm trap: {0}")]
    Trap(String),

    /// The frame's wall-clock deadline (driven by the engine's epoch
    /// counter) elapsed before the call returned.
    #[error("wasm execution timed out")]
    Timeout,

    /// The fuel budget (gas, riding on wasmtime's fuel counter) was
    /// exhausted mid-call.
    #[error("wasm fuel exhausted")]
    OutOfFuel,

    /// A required export was missing or had the wrong signature.
    #[error("missing or malformed export: {0}")]
    MissingExport(String),

    /// A guest-returned buffer failed basic bounds validation: a
    /// length-prefix pointing past the end of linear memory, a pointer
    /// the allocator never handed out, or similar.
    #[error("invalid guest buffer: {0}")]
    InvalidBuffer(String),
}

impl WasmError {
    /// True when this error should be treated as a frame timeout by the
    /// evaluator (`EXECUTION_TIMEOUT`, §6/§7), as opposed to a generic
    /// trap (`EXECUTION_REVERTED`).
    pub fn is_timeout(&self) -> bool {
        matches!(self, WasmError::Timeout)
    }
}
