//! # cx-evaluator
//!
//! Drives one contract invocation through its lifecycle: binds identity,
//! pushes the environment block and gas budget into the guest, loads its
//! pre-fetched storage snapshot, dispatches the method, and resumes it
//! across any nested calls the guest requests via `getCalls`.
//!
//! Depends only on [`cx_wasm::runtime::ContractRuntime`]/[`cx_wasm::runtime::GuestContract`]
//! for the guest side and [`capabilities::ExternalCaller`] for nested-call
//! dispatch — never on a concrete WASM engine or on `cx-manager` — so this
//! crate's own tests run against deterministic fakes instead of compiled
//! bytecode and a live manager.
//!
//! ## Invariant table
//!
//! | Invariant | Enforced in |
//! |-----------|-------------|
//! | Transitions only move forward through the state machine, never skip or rewind | `evaluator::ContractEvaluator::require` |
//! | A reverted frame discards its writes but its gas spend still reconciles to the parent | `evaluation::Evaluation::reverted`, `evaluator::ContractEvaluator::run` |
//! | A nested call's storage overlay is handed back to the calling frame, never dropped | `evaluator::ContractEvaluator::run` |
//! | Gas flows to a nested call bounded by the parent's own remaining budget | `cx_gas::GasMeter::child_meter` (invoked from `evaluator::ContractEvaluator::run`) |
//! | A successful frame's harvested writes are folded into its own overlay (rejecting any not addressed to itself) before returning | `cx_storage::StorageOverlay::set`, invoked from `evaluator::ContractEvaluator::run` |
//!
//! ## Outbound dependencies
//!
//! | Crate | Used for |
//! |-------|----------|
//! | `cx-types` | Value objects, `EngineError` |
//! | `cx-gas` | `GasMeter` |
//! | `cx-storage` | `StorageOverlay` |
//! | `cx-wasm` | `GuestContract`/`ContractRuntime`, the evaluator↔contract wire codec |
//! | `async-trait` | `ExternalCaller` |
//! | `tracing` | Per-invocation spans |
//! | `thiserror` | `EvaluatorError` |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod capabilities;
pub mod errors;
pub mod evaluation;
pub mod evaluator;
pub mod frame;
pub mod state;

/// Convenience re-export of every public type in this crate.
pub mod prelude {
    pub use crate::capabilities::{ExternalCallOutcome, ExternalCallRequest, ExternalCaller};
    pub use crate::errors::EvaluatorError;
    pub use crate::evaluation::Evaluation;
    pub use crate::evaluator::ContractEvaluator;
    pub use crate::frame::CallFrame;
    pub use crate::state::EvaluatorState;
}
