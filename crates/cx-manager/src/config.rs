//! Manager configuration and running statistics (spec §9, grounded on
//! `qc-11-smart-contracts::service::{ServiceConfig, ServiceStats}`).

use cx_gas::BASE;
use cx_types::value_objects::GasUnits;
use std::time::Duration;

/// Tunables governing one [`crate::manager::VmManager`] instance.
#[derive(Clone, Debug)]
pub struct ManagerConfig {
    /// Maximum nested call depth before a frame reverts instead of
    /// recursing further.
    pub max_call_depth: u32,
    /// Maximum nested constructor-deploy depth.
    pub max_deploy_depth: u32,
    /// Gas ceiling for the read-only `execute()` emulation path,
    /// independent of any transaction's burned fee.
    pub emulation_max_gas: GasUnits,
    /// Absolute gas ceiling a transaction's burned fee can convert to,
    /// regardless of the block's base-gas.
    pub absolute_max_gas: GasUnits,
    /// Gas units per satoshi, in [`BASE`] fixed point, used by
    /// `cx_gas::convert_sat_to_gas`.
    pub gas_ratio: u64,
    /// Epoch ticks a single invocation (including every nested frame it
    /// recurses through) is allowed before the WASM isolator cuts it off.
    pub epoch_ticks: u64,
    /// Wall-clock budget for the read-only `execute()` path.
    pub read_only_timeout: Duration,
    /// Base wall-clock budget for a block's worth of transactions.
    pub block_timeout_base: Duration,
    /// How many block headers `BlockHeaderValidator` memoizes at once.
    pub header_cache_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 64,
            max_deploy_depth: 16,
            emulation_max_gas: GasUnits(10_000_000),
            absolute_max_gas: GasUnits(1_000_000_000),
            gas_ratio: BASE,
            epoch_ticks: 200,
            read_only_timeout: Duration::from_secs(2),
            block_timeout_base: Duration::from_secs(30),
            header_cache_capacity: 4_096,
        }
    }
}

/// Running counters for observability, mirroring the teacher's
/// `ServiceStats` shape (spec §9.1).
#[derive(Clone, Debug, Default)]
pub struct ManagerStats {
    /// Transactions executed (successful or reverted), across every block.
    pub transactions_executed: u64,
    /// Total gas consumed across every transaction.
    pub gas_used: u64,
    /// Transactions that reverted.
    pub reverts: u64,
    /// Calls rejected because the manager was already busy (`Busy`).
    pub rejected_concurrent: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_sane() {
        let config = ManagerConfig::default();
        assert!(config.max_call_depth > 0);
        assert!(config.emulation_max_gas.0 < config.absolute_max_gas.0);
    }

    #[test]
    fn test_stats_default_all_zero() {
        let stats = ManagerStats::default();
        assert_eq!(stats.transactions_executed, 0);
        assert_eq!(stats.reverts, 0);
    }
}
