//! The per-invocation evaluator state machine (spec §4.F).
//!
//! A plain enum, not a set of boolean flags: every transition function
//! matches it exhaustively and an illegal transition returns an error
//! instead of panicking.

use std::fmt;

/// Where a single contract invocation currently stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvaluatorState {
    /// Bytecode instantiated, `INIT` not yet called.
    Loaded,
    /// `INIT` has run; environment not yet set.
    EnvSet,
    /// Environment set; gas budget not yet set.
    GasSet,
    /// Gas set; pre-read storage snapshot not yet loaded.
    StorageLoaded,
    /// The guest method is executing (or resumed after a nested call).
    Running,
    /// The guest emitted a `getCalls` batch; waiting on nested results.
    CallRequested,
    /// Finished normally; results harvested.
    Done,
    /// Finished abnormally; writes discarded, gas charged up to the revert point.
    Reverted,
}

impl fmt::Display for EvaluatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvaluatorState::Loaded => "LOADED",
            EvaluatorState::EnvSet => "ENV_SET",
            EvaluatorState::GasSet => "GAS_SET",
            EvaluatorState::StorageLoaded => "STORAGE_LOADED",
            EvaluatorState::Running => "RUNNING",
            EvaluatorState::CallRequested => "CALL_REQUESTED",
            EvaluatorState::Done => "DONE",
            EvaluatorState::Reverted => "REVERTED",
        };
        write!(f, "{name}")
    }
}

impl EvaluatorState {
    /// True once the invocation has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, EvaluatorState::Done | EvaluatorState::Reverted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(EvaluatorState::Loaded.to_string(), "LOADED");
        assert_eq!(EvaluatorState::CallRequested.to_string(), "CALL_REQUESTED");
    }

    #[test]
    fn test_is_terminal() {
        assert!(EvaluatorState::Done.is_terminal());
        assert!(EvaluatorState::Reverted.is_terminal());
        assert!(!EvaluatorState::Running.is_terminal());
    }
}
