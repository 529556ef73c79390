//! # cx-gas
//!
//! Gas metering for the contract execution engine: converting burned
//! bitcoin into gas units, scaling a call's requested budget by the
//! current block's base-gas, and sharing one monotonically-decreasing
//! counter across a call's nested frames.
//!
//! ## Invariant table
//!
//! | Invariant | Enforced in |
//! |-----------|-------------|
//! | Gas is monotonically non-increasing along any call path | `GasMeter::consume` |
//! | A sub-frame's limit is `min(parent.remaining, requested)` | `GasMeter::child_meter` |
//! | Parent's remaining is set from the child's on return, revert or not | `GasMeter::reconcile` |
//! | Sat→gas conversion saturates at `max_gas`, never panics on overflow | `convert_sat_to_gas` |
//! | Base-gas scaling rounds up once, at conversion time only | `scale` |

#![warn(missing_docs)]
#![warn(clippy::all)]

use cx_types::value_objects::GasUnits;
use thiserror::Error;

/// Errors from gas accounting.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GasError {
    /// The frame's gas budget was exhausted.
    #[error("out of gas: requested {requested}, remaining {remaining}")]
    OutOfGas {
        /// The amount the operation tried to consume.
        requested: u64,
        /// The amount actually remaining.
        remaining: u64,
    },
}

/// The fixed-point base this engine quotes gas in.
///
/// Chosen to match the satoshi scale (`10^8`) since gas is derived from
/// burned bitcoin; `scale()` divides by a block's base-gas-per-unit
/// expressed in the same base.
pub const BASE: u64 = 100_000_000;

/// Convert burned satoshis into gas units at the given ratio, clamped to
/// `max_gas`.
///
/// `ratio` is gas units per satoshi, expressed in [`BASE`] fixed point
/// (e.g. `ratio = BASE` means 1 gas unit per satoshi). The multiply
/// saturates rather than overflowing, and the result is clamped to
/// `max_gas` regardless.
pub fn convert_sat_to_gas(burned_sats: u64, max_gas: GasUnits, ratio: u64) -> GasUnits {
    let scaled = (burned_sats as u128).saturating_mul(ratio as u128) / (BASE as u128);
    let gas = u64::try_from(scaled).unwrap_or(u64::MAX);
    GasUnits(gas).min(max_gas)
}

/// Scale a requested gas budget by the block's current base-gas-per-unit.
///
/// Rounds up by one unit on any remainder, per this engine's single
/// rounding rule: scaling happens once, here, at sat→gas conversion time;
/// nested `child_meter` calls never re-round.
pub fn scale(gas: GasUnits, base_gas: u64) -> GasUnits {
    if base_gas == 0 {
        return gas;
    }
    let whole = gas.0 / base_gas;
    let remainder = gas.0 % base_gas;
    let rounded = if remainder == 0 { whole } else { whole + 1 };
    GasUnits(rounded)
}

/// A gas counter shared, by reconciliation, across a call's nested frames.
///
/// Each frame owns its own `GasMeter`; entering a sub-call creates a child
/// meter bounded by `min(remaining, requested)` via [`GasMeter::child_meter`],
/// and returning from the sub-call writes the child's remaining gas back
/// onto the parent via [`GasMeter::reconcile`] — unconditionally, whether
/// the sub-call reverted or not, since a reverted frame still consumes the
/// gas it used up to the revert point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GasMeter {
    limit: GasUnits,
    used: GasUnits,
}

impl GasMeter {
    /// Build a fresh meter with the given limit.
    pub fn new(limit: GasUnits) -> Self {
        Self {
            limit,
            used: GasUnits::ZERO,
        }
    }

    /// The original limit this meter was constructed with.
    pub fn limit(&self) -> GasUnits {
        self.limit
    }

    /// Gas consumed so far.
    pub fn used(&self) -> GasUnits {
        self.used
    }

    /// Gas remaining.
    pub fn remaining(&self) -> GasUnits {
        self.limit.saturating_sub(self.used)
    }

    /// Consume `units` of gas, failing with [`GasError::OutOfGas`] if that
    /// would exceed the limit. The meter is left unchanged on failure —
    /// the caller (the evaluator) is responsible for charging the frame's
    /// full remaining gas on an out-of-gas error, per
    /// `EngineError::consumes_all_gas`.
    pub fn consume(&mut self, units: GasUnits) -> Result<(), GasError> {
        let remaining = self.remaining();
        if units.0 > remaining.0 {
            return Err(GasError::OutOfGas {
                requested: units.0,
                remaining: remaining.0,
            });
        }
        self.used = self.used.saturating_add(units);
        Ok(())
    }

    /// Build a child meter for a nested call, bounded by both this meter's
    /// remaining gas and the sub-call's requested budget.
    pub fn child_meter(&self, requested: GasUnits) -> GasMeter {
        GasMeter::new(self.remaining().min(requested))
    }

    /// Write a child meter's remaining gas back onto this meter, treating
    /// whatever the child didn't use as still available to the parent.
    /// Called unconditionally on return from a sub-call, revert or not.
    pub fn reconcile(&mut self, child: &GasMeter) {
        let child_used = child.limit.saturating_sub(child.remaining());
        self.used = self.used.saturating_add(child_used);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_sat_to_gas_basic() {
        let gas = convert_sat_to_gas(1_000, GasUnits(u64::MAX), BASE);
        assert_eq!(gas, GasUnits(1_000));
    }

    #[test]
    fn test_convert_sat_to_gas_saturates_at_max() {
        let gas = convert_sat_to_gas(u64::MAX, GasUnits(500), BASE);
        assert_eq!(gas, GasUnits(500));
    }

    #[test]
    fn test_convert_sat_to_gas_does_not_overflow() {
        let gas = convert_sat_to_gas(u64::MAX, GasUnits(u64::MAX), u64::MAX);
        assert_eq!(gas, GasUnits(u64::MAX));
    }

    #[test]
    fn test_scale_rounds_up_on_remainder() {
        assert_eq!(scale(GasUnits(100), 30), GasUnits(4)); // 3 whole + 1
        assert_eq!(scale(GasUnits(90), 30), GasUnits(3)); // exact, no bump
    }

    #[test]
    fn test_scale_zero_base_gas_is_identity() {
        assert_eq!(scale(GasUnits(42), 0), GasUnits(42));
    }

    #[test]
    fn test_meter_consume_and_remaining() {
        let mut meter = GasMeter::new(GasUnits(100));
        meter.consume(GasUnits(40)).unwrap();
        assert_eq!(meter.remaining(), GasUnits(60));
        assert_eq!(meter.used(), GasUnits(40));
    }

    #[test]
    fn test_meter_out_of_gas() {
        let mut meter = GasMeter::new(GasUnits(10));
        let err = meter.consume(GasUnits(11)).unwrap_err();
        assert_eq!(
            err,
            GasError::OutOfGas {
                requested: 11,
                remaining: 10
            }
        );
        // unchanged on failure
        assert_eq!(meter.remaining(), GasUnits(10));
    }

    #[test]
    fn test_child_meter_bounded_by_both_sides() {
        let parent = GasMeter::new(GasUnits(100));
        let child = parent.child_meter(GasUnits(200));
        assert_eq!(child.limit(), GasUnits(100));

        let mut parent2 = GasMeter::new(GasUnits(100));
        parent2.consume(GasUnits(70)).unwrap();
        let child2 = parent2.child_meter(GasUnits(10));
        assert_eq!(child2.limit(), GasUnits(10));
    }

    #[test]
    fn test_reconcile_after_simulated_revert_still_charges_parent() {
        let mut parent = GasMeter::new(GasUnits(100));
        let mut child = parent.child_meter(GasUnits(50));
        // simulate the child using 30 gas before reverting
        child.consume(GasUnits(30)).unwrap();
        // reverts still reconcile: the parent is charged for the 30 used
        parent.reconcile(&child);
        assert_eq!(parent.used(), GasUnits(30));
        assert_eq!(parent.remaining(), GasUnits(70));
    }

    #[test]
    fn test_reconcile_gas_monotonicity_across_nested_frames() {
        let mut root = GasMeter::new(GasUnits(1_000));
        root.consume(GasUnits(100)).unwrap();

        let mut frame_a = root.child_meter(GasUnits(500));
        frame_a.consume(GasUnits(200)).unwrap();

        let mut frame_b = frame_a.child_meter(GasUnits(100));
        frame_b.consume(GasUnits(50)).unwrap();

        frame_a.reconcile(&frame_b);
        root.reconcile(&frame_a);

        // total used across the call tree never exceeds the root limit
        assert!(root.used().0 <= root.limit().0);
        assert_eq!(root.used(), GasUnits(100 + 200 + 50));
    }
}
