//! The per-invocation call frame (spec §3 data model).

use cx_types::value_objects::{Address, Pointer};

/// Everything a single invocation needs to know about its place in the
/// call tree, independent of the evaluator's internal state.
#[derive(Clone, Debug)]
pub struct CallFrame {
    /// The contract executing in this frame.
    pub contract_address: Address,
    /// The 4-byte function selector parsed from `calldata`.
    pub selector: u32,
    /// The raw calldata, selector included.
    pub calldata: Vec<u8>,
    /// The address the guest sees as `caller`.
    pub caller: Address,
    /// The externally-owned address that originated the top-level transaction.
    pub tx_origin: Address,
    /// The immediate caller one level up (equals `tx_origin` at depth 0).
    pub msg_sender: Address,
    /// How many nested calls deep this frame sits.
    pub call_depth: u32,
    /// How many nested contract deployments deep this frame sits.
    pub deploy_depth: u32,
    /// Whether this invocation is a constructor call.
    pub is_constructor: bool,
    /// Addresses reserved for this constructor to deploy into.
    pub deployed_contracts: Vec<Address>,
    /// The block this invocation executes in.
    pub block_height: u64,
    /// The block's median time, passed through to the guest unmodified.
    pub block_median_time: u64,
    /// True for the read-only `execute()` path: no storage writes, no
    /// nested-call state mutation.
    pub is_view: bool,
    /// Storage pointers to pre-fetch and snapshot into the guest before
    /// invocation. The ABI has no host-side storage-get import (§4.E lists
    /// only `abort`/`log`), so every pointer a call might touch must be
    /// loaded up front via `loadStorage` rather than fetched on demand.
    pub pre_read_pointers: Vec<Pointer>,
}

impl CallFrame {
    /// Build the root frame for a top-level transaction (depth 0).
    pub fn root(
        contract_address: Address,
        selector: u32,
        calldata: Vec<u8>,
        tx_origin: Address,
        block_height: u64,
        block_median_time: u64,
    ) -> Self {
        Self {
            contract_address,
            selector,
            calldata,
            caller: tx_origin,
            tx_origin,
            msg_sender: tx_origin,
            call_depth: 0,
            deploy_depth: 0,
            is_constructor: false,
            deployed_contracts: Vec::new(),
            block_height,
            block_median_time,
            is_view: false,
            pre_read_pointers: Vec::new(),
        }
    }

    /// Attach the set of pointers this invocation should pre-fetch before
    /// the guest runs.
    pub fn with_pre_read_pointers(mut self, pointers: Vec<Pointer>) -> Self {
        self.pre_read_pointers = pointers;
        self
    }

    /// Derive a nested frame one call deeper, preserving `tx_origin` and
    /// block context, with `self` as the new `msg_sender`.
    pub fn child_call(
        &self,
        contract_address: Address,
        selector: u32,
        calldata: Vec<u8>,
    ) -> Self {
        Self {
            contract_address,
            selector,
            calldata,
            caller: self.contract_address,
            tx_origin: self.tx_origin,
            msg_sender: self.contract_address,
            call_depth: self.call_depth + 1,
            deploy_depth: self.deploy_depth,
            is_constructor: false,
            deployed_contracts: Vec::new(),
            block_height: self.block_height,
            block_median_time: self.block_median_time,
            is_view: self.is_view,
            pre_read_pointers: Vec::new(),
        }
    }

    /// Derive a nested constructor frame one deploy level deeper.
    pub fn child_deploy(
        &self,
        contract_address: Address,
        calldata: Vec<u8>,
        deployed_contracts: Vec<Address>,
    ) -> Self {
        Self {
            contract_address,
            selector: 0,
            calldata,
            caller: self.contract_address,
            tx_origin: self.tx_origin,
            msg_sender: self.contract_address,
            call_depth: self.call_depth + 1,
            deploy_depth: self.deploy_depth + 1,
            is_constructor: true,
            deployed_contracts,
            block_height: self.block_height,
            block_median_time: self.block_median_time,
            is_view: self.is_view,
            pre_read_pointers: Vec::new(),
        }
    }
}
