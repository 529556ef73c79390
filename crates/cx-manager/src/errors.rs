//! Errors from the VM manager's block-lifecycle and dispatch operations.

use crate::state::ManagerState;
use cx_types::errors::EngineError;
use thiserror::Error;

/// Errors surfaced by [`crate::manager::VmManager`].
#[derive(Debug, Error, Clone)]
pub enum ManagerError {
    /// An operation was called while the manager was in a state it doesn't
    /// apply to (e.g. `execute_transaction` before `prepare_block`, or for
    /// the wrong block height).
    #[error("manager in wrong state: expected {expected}, actual {actual}")]
    WrongState {
        /// What the caller expected (free-form, e.g. `"Preparing/Executing(100)"`).
        expected: String,
        /// The state the manager was actually in.
        actual: ManagerState,
    },

    /// A second call arrived while one was already in flight on the
    /// single-in-flight read path (`tokio::sync::Mutex::try_lock` failed).
    #[error("manager busy: a call is already in flight")]
    Busy,

    /// An engine-level error propagated from a dependency.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A malformed `OPNETPLG` plugin file was submitted.
    #[error(transparent)]
    Plugin(#[from] crate::plugin::PluginError),
}

impl From<ManagerError> for EngineError {
    fn from(err: ManagerError) -> Self {
        match err {
            ManagerError::WrongState { .. } | ManagerError::Busy => EngineError::ConcurrencyDetected,
            ManagerError::Engine(inner) => inner,
            ManagerError::Plugin(inner) => EngineError::DataCorrupted {
                detail: inner.to_string(),
            },
        }
    }
}
