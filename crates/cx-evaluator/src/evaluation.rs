//! The harvested result of a single invocation.

use cx_types::value_objects::{Address, GasUnits, Pointer, StorageValue};
use cx_wasm::abi::EmittedEvent;

/// The result of running a [`crate::evaluator::ContractEvaluator`] to
/// completion — this crate's sole return type for both success and
/// revert.
#[derive(Clone, Debug)]
pub struct Evaluation {
    /// Whether the invocation finished normally (`DONE`) rather than
    /// reverting (`REVERTED`).
    pub success: bool,
    /// The guest's return bytes. Empty on revert.
    pub result: Vec<u8>,
    /// The revert reason, present only when `success` is false.
    pub revert_reason: Option<String>,
    /// Gas actually consumed, whether or not the frame reverted
    /// (Invariant 4: a reverted sub-call still consumes the gas it used).
    pub gas_used: GasUnits,
    /// Dirty `(contract, pointer, value)` triples. Empty on revert
    /// (Invariant 5: a revert discards all storage writes).
    pub dirty_storage: Vec<(Address, Pointer, StorageValue)>,
    /// Events emitted before the revert point, if any; empty on revert
    /// since a reverted frame's effects are discarded in full.
    pub events: Vec<EmittedEvent>,
    /// Addresses registered by a successful constructor call. Empty
    /// unless this frame was a constructor invocation that succeeded.
    pub deployed_contracts: Vec<Address>,
}

impl Evaluation {
    /// Build a successful result.
    pub fn success(
        result: Vec<u8>,
        gas_used: GasUnits,
        dirty_storage: Vec<(Address, Pointer, StorageValue)>,
        events: Vec<EmittedEvent>,
        deployed_contracts: Vec<Address>,
    ) -> Self {
        Self {
            success: true,
            result,
            revert_reason: None,
            gas_used,
            dirty_storage,
            events,
            deployed_contracts,
        }
    }

    /// Build a reverted result. Per Invariant 5, writes and deployed
    /// contracts are always empty; per Invariant 4, `gas_used` still
    /// reflects whatever was spent before the revert point.
    pub fn reverted(reason: impl Into<String>, gas_used: GasUnits) -> Self {
        Self {
            success: false,
            result: Vec::new(),
            revert_reason: Some(reason.into()),
            gas_used,
            dirty_storage: Vec::new(),
            events: Vec::new(),
            deployed_contracts: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_carries_writes() {
        let eval = Evaluation::success(
            vec![1, 2, 3],
            GasUnits(100),
            vec![(Address::ZERO, Pointer::ZERO, StorageValue::ZERO)],
            vec![],
            vec![],
        );
        assert!(eval.success);
        assert_eq!(eval.dirty_storage.len(), 1);
        assert!(eval.revert_reason.is_none());
    }

    #[test]
    fn test_reverted_discards_writes_but_keeps_gas_used() {
        let eval = Evaluation::reverted("out of gas mid-call", GasUnits(42));
        assert!(!eval.success);
        assert_eq!(eval.gas_used, GasUnits(42));
        assert!(eval.dirty_storage.is_empty());
        assert_eq!(eval.revert_reason.as_deref(), Some("out of gas mid-call"));
    }
}
