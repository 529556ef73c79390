//! The manager's block-lifecycle state machine (spec §9: typed state over
//! a boolean busy flag, the same pattern `cx-evaluator::state` uses for a
//! single invocation).

use std::fmt;

/// Where the manager currently stands in a block's lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManagerState {
    /// No block in flight.
    Idle,
    /// `prepare_block` has run; no transaction has executed yet.
    Preparing(u64),
    /// At least one transaction has executed against this block.
    Executing(u64),
    /// `update_evaluated_states` has frozen this block's trees; waiting on
    /// `save_block` or `revert_block`.
    Frozen(u64),
}

impl ManagerState {
    /// The block height this state is attached to, if any.
    pub fn height(&self) -> Option<u64> {
        match self {
            ManagerState::Idle => None,
            ManagerState::Preparing(h) | ManagerState::Executing(h) | ManagerState::Frozen(h) => {
                Some(*h)
            }
        }
    }
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagerState::Idle => write!(f, "IDLE"),
            ManagerState::Preparing(h) => write!(f, "PREPARING({h})"),
            ManagerState::Executing(h) => write!(f, "EXECUTING({h})"),
            ManagerState::Frozen(h) => write!(f, "FROZEN({h})"),
        }
    }
}
