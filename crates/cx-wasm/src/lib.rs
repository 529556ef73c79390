//! # cx-wasm
//!
//! The WASM isolator: sandboxes contract bytecode behind a restricted
//! host-import surface, meters gas as `wasmtime` fuel, and bounds
//! wall-clock time with epoch interruption independent of fuel.
//!
//! The ABI the guest and host speak (`abi`) is hand-rolled, not
//! `bincode`/`serde` — a length-prefixed little-endian wire format chosen
//! to match exactly what a `wasm32` guest can encode without pulling in a
//! serialization runtime of its own.
//!
//! `cx-evaluator` depends on the [`runtime::ContractRuntime`] /
//! [`runtime::GuestContract`] port, not on [`isolator::WasmIsolator`]
//! directly, so integration tests can swap in a deterministic in-memory
//! fake instead of compiling real WASM bytecode for every fixture.
//!
//! ## Invariant table
//!
//! | Invariant | Enforced in |
//! |-----------|-------------|
//! | A module is compiled once per bytecode hash, never per invocation | `isolator::WasmIsolator::compiled_module` |
//! | Every invocation gets a fresh instance; no state survives a call | `isolator::WasmIsolator::instantiate` |
//! | Host imports are limited to `env.abort`/`env.log`; no wall-clock, no RNG | `isolator::WasmIsolator::instantiate` |
//! | A guest-returned buffer is bounds-checked before being copied out | `isolator::ContractInstance::read_length_prefixed` |
//! | Fuel exhaustion and epoch timeout are distinguished at the error level | `isolator::classify_trap` |
//!
//! ## Outbound dependencies
//!
//! | Crate | Used for |
//! |-------|----------|
//! | `wasmtime` | Module compilation, instantiation, fuel and epoch metering |
//! | `anyhow` | `wasmtime`'s own call/instantiate error type |
//! | `cx-types` | `Address`, `Bytes`, `Hash` |
//! | `tracing` | `env.log`/`env.abort` diagnostics |
//! | `thiserror` | `WasmError` |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod abi;
pub mod errors;
pub mod isolator;
pub mod runtime;

/// Convenience re-export of every public type in this crate.
pub mod prelude {
    pub use crate::abi::*;
    pub use crate::errors::*;
    pub use crate::isolator::WasmIsolator;
    pub use crate::runtime::{ContractRuntime, GuestContract};
}
