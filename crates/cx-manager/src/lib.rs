//! # cx-manager
//!
//! The VM Manager: the single entry point a host thread calls into for a
//! block's worth of contract execution (spec §4.G). Owns the block
//! lifecycle (`prepare_block` → `execute_transaction`/`deploy_contract` →
//! `update_evaluated_states` → `save_block`/`revert_block`), the
//! evaluator-facing `call_external` dispatch nested calls recurse through,
//! historical proof verification, and the `OPNETPLG` plugin file parser.
//!
//! Grounded on `qc-11-smart-contracts::service::SmartContractService`: one
//! manager instance per block range, a typed lifecycle state machine
//! instead of a boolean busy flag (spec §9), and `tokio::sync::Mutex::try_lock`
//! for the single-in-flight read-only path (spec §5.1).
//!
//! ## Invariant table
//!
//! | Invariant | Enforced in |
//! |-----------|-------------|
//! | Exactly one transaction or read-only call executes at a time | `manager::VmManager::execute` (`try_lock`), `state::ManagerState` gating every write-path operation |
//! | Receipt tree is frozen before the state tree root is finalized | `manager::VmManager::update_evaluated_states` |
//! | A reverted sub-call's gas usage still reconciles to the parent | `manager::VmManager::call_external` (via `cx_gas::GasMeter::reconcile`) |
//! | Call-depth/deploy-depth overflow reverts the sub-call only, not the whole block | `manager::VmManager::call_external` |
//! | A historical proof mismatch is fatal, never silently retried | `manager::VmManager::verify_proof` |
//!
//! ## Outbound dependencies
//!
//! | Crate | Used for |
//! |-------|----------|
//! | `cx-types` | Value objects, `StorageInterface`, `EngineError` |
//! | `cx-gas` | Sat→gas conversion, scaling, `GasMeter` |
//! | `cx-storage` | `StorageOverlay`, block-scoped proof cache |
//! | `cx-merkle` | State/receipt trees, header validator |
//! | `cx-wasm` | `ContractRuntime`, the ABI codec |
//! | `cx-evaluator` | `ContractEvaluator`, `CallFrame`, `ExternalCaller` |
//! | `tokio` | `Mutex`/`RwLock`, `try_lock` fail-fast concurrency guard, read-path timeout |
//! | `async-trait` | `ExternalCaller`, `AddressResolver` |
//! | `tracing` | Per-operation diagnostics |
//! | `thiserror` | `ManagerError`, `PluginError` |
//! | `sha2` | Plugin file checksum |
//! | `serde_json` | Plugin metadata (`utf8-json`) |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod address;
pub mod config;
pub mod errors;
pub mod manager;
pub mod plugin;
pub mod state;

/// Convenience re-export of every public type in this crate.
pub mod prelude {
    pub use crate::address::{AddressResolver, StorageAddressResolver};
    pub use crate::config::{ManagerConfig, ManagerStats};
    pub use crate::errors::ManagerError;
    pub use crate::manager::{DeployTransaction, Transaction, VmManager};
    pub use crate::plugin::{parse as parse_plugin, PluginError, PluginFile};
    pub use crate::state::ManagerState;
}
