//! Hand-rolled wire codec for the evaluator ↔ contract ABI (spec §6).
//!
//! Every multi-byte integer is little-endian. This is coded by hand
//! rather than routed through `serde`: the layout is a fixed external
//! contract the guest toolchain also has to implement, not a
//! Rust-internal serialization format this crate controls.

use crate::errors::WasmError;
use cx_types::value_objects::{Address, Pointer, StorageValue};

fn need(buf: &[u8], at: usize, len: usize) -> Result<(), WasmError> {
    match at.checked_add(len) {
        Some(end) if end <= buf.len() => Ok(()),
        _ => Err(WasmError::InvalidBuffer(format!(
            "need {len} bytes at offset {at}, buffer is {} bytes",
            buf.len()
        ))),
    }
}

/// Parse the 4-byte big-endian selector from the front of `calldata`.
pub fn parse_selector(calldata: &[u8]) -> Result<u32, WasmError> {
    if calldata.len() < 4 {
        return Err(WasmError::InvalidBuffer(
            "calldata shorter than the 4-byte selector".into(),
        ));
    }
    Ok(u32::from_be_bytes([
        calldata[0],
        calldata[1],
        calldata[2],
        calldata[3],
    ]))
}

/// The environment block passed to `setEnvironment`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvironmentBlock {
    /// The current block's height.
    pub block_height: u64,
    /// The current block's median time.
    pub block_median: u64,
    /// The externally-owned address that originated the transaction.
    pub tx_origin: Address,
    /// The immediate caller (may equal `tx_origin` for a top-level call).
    pub msg_sender: Address,
    /// The address the contract sees as `caller` for this specific frame.
    pub caller: Address,
    /// Whether this invocation is a constructor call.
    pub is_constructor: bool,
    /// Addresses reserved for this constructor call to deploy into.
    pub deployed_contracts: Vec<Address>,
}

impl EnvironmentBlock {
    /// Encode per §6's fixed layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut out =
            Vec::with_capacity(8 + 8 + 32 * 3 + 1 + 2 + self.deployed_contracts.len() * 32);
        out.extend_from_slice(&self.block_height.to_le_bytes());
        out.extend_from_slice(&self.block_median.to_le_bytes());
        out.extend_from_slice(self.tx_origin.as_bytes());
        out.extend_from_slice(self.msg_sender.as_bytes());
        out.extend_from_slice(self.caller.as_bytes());
        out.push(u8::from(self.is_constructor));
        out.extend_from_slice(&(self.deployed_contracts.len() as u16).to_le_bytes());
        for addr in &self.deployed_contracts {
            out.extend_from_slice(addr.as_bytes());
        }
        out
    }

    /// Decode, validating every length field against the buffer before
    /// indexing into it.
    pub fn decode(buf: &[u8]) -> Result<Self, WasmError> {
        let mut at = 0;
        need(buf, at, 8)?;
        let block_height = u64::from_le_bytes(buf[at..at + 8].try_into().unwrap());
        at += 8;
        need(buf, at, 8)?;
        let block_median = u64::from_le_bytes(buf[at..at + 8].try_into().unwrap());
        at += 8;
        need(buf, at, 32)?;
        let tx_origin = Address::from_slice(&buf[at..at + 32]);
        at += 32;
        need(buf, at, 32)?;
        let msg_sender = Address::from_slice(&buf[at..at + 32]);
        at += 32;
        need(buf, at, 32)?;
        let caller = Address::from_slice(&buf[at..at + 32]);
        at += 32;
        need(buf, at, 1)?;
        let is_constructor = buf[at] != 0;
        at += 1;
        need(buf, at, 2)?;
        let count = u16::from_le_bytes(buf[at..at + 2].try_into().unwrap()) as usize;
        at += 2;
        need(buf, at, count * 32)?;
        let deployed_contracts = (0..count)
            .map(|i| Address::from_slice(&buf[at + i * 32..at + i * 32 + 32]))
            .collect();
        Ok(Self {
            block_height,
            block_median,
            tx_origin,
            msg_sender,
            caller,
            is_constructor,
            deployed_contracts,
        })
    }
}

/// Encode a `(contract, pointer, value)` tuple list: the storage-snapshot
/// and modified-storage wire formats share this 96-bytes-per-entry
/// layout with no count prefix — the buffer's own length (a multiple of
/// 96) determines how many entries it holds.
pub fn encode_storage_tuples(entries: &[(Address, Pointer, StorageValue)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(entries.len() * 96);
    for (contract, pointer, value) in entries {
        out.extend_from_slice(contract.as_bytes());
        out.extend_from_slice(pointer.as_bytes());
        out.extend_from_slice(value.as_bytes());
    }
    out
}

/// Decode a storage-tuple buffer, rejecting any length that isn't a
/// multiple of 96 bytes.
pub fn decode_storage_tuples(
    buf: &[u8],
) -> Result<Vec<(Address, Pointer, StorageValue)>, WasmError> {
    if buf.len() % 96 != 0 {
        return Err(WasmError::InvalidBuffer(format!(
            "storage tuple buffer length {} is not a multiple of 96",
            buf.len()
        )));
    }
    Ok(buf
        .chunks_exact(96)
        .map(|chunk| {
            (
                Address::from_slice(&chunk[0..32]),
                Pointer::from_slice(&chunk[32..64]),
                StorageValue::from_slice(&chunk[64..96]),
            )
        })
        .collect())
}

/// One requested external call from a contract's `getCalls` batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallRequest {
    /// The callee.
    pub to: Address,
    /// The calldata to invoke it with.
    pub calldata: Vec<u8>,
    /// The value (in satoshis) attached to the call.
    pub value: u64,
}

/// Encode a calls batch: `count u16, (to[32], calldata_len u32, calldata[], value u64)[]`.
pub fn encode_calls_batch(calls: &[CallRequest]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(calls.len() as u16).to_le_bytes());
    for call in calls {
        out.extend_from_slice(call.to.as_bytes());
        out.extend_from_slice(&(call.calldata.len() as u32).to_le_bytes());
        out.extend_from_slice(&call.calldata);
        out.extend_from_slice(&call.value.to_le_bytes());
    }
    out
}

/// Decode a calls batch, validating every length field up front.
pub fn decode_calls_batch(buf: &[u8]) -> Result<Vec<CallRequest>, WasmError> {
    let mut at = 0;
    need(buf, at, 2)?;
    let count = u16::from_le_bytes(buf[at..at + 2].try_into().unwrap()) as usize;
    at += 2;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        need(buf, at, 32)?;
        let to = Address::from_slice(&buf[at..at + 32]);
        at += 32;
        need(buf, at, 4)?;
        let calldata_len = u32::from_le_bytes(buf[at..at + 4].try_into().unwrap()) as usize;
        at += 4;
        need(buf, at, calldata_len)?;
        let calldata = buf[at..at + calldata_len].to_vec();
        at += calldata_len;
        need(buf, at, 8)?;
        let value = u64::from_le_bytes(buf[at..at + 8].try_into().unwrap());
        at += 8;
        out.push(CallRequest { to, calldata, value });
    }
    Ok(out)
}

/// Encode the results of a dispatched `getCalls` batch for
/// `loadCallsResponse`: `count u16, (len u32, bytes[])[]`, in the same
/// order the calls were requested.
pub fn encode_call_responses(responses: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(responses.len() as u16).to_le_bytes());
    for response in responses {
        out.extend_from_slice(&(response.len() as u32).to_le_bytes());
        out.extend_from_slice(response);
    }
    out
}

/// Decode a call-responses buffer, validating every length field up front.
pub fn decode_call_responses(buf: &[u8]) -> Result<Vec<Vec<u8>>, WasmError> {
    let mut at = 0;
    need(buf, at, 2)?;
    let count = u16::from_le_bytes(buf[at..at + 2].try_into().unwrap()) as usize;
    at += 2;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        need(buf, at, 4)?;
        let len = u32::from_le_bytes(buf[at..at + 4].try_into().unwrap()) as usize;
        at += 4;
        need(buf, at, len)?;
        out.push(buf[at..at + len].to_vec());
        at += len;
    }
    Ok(out)
}

/// One emitted event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmittedEvent {
    /// The contract that emitted it.
    pub contract: Address,
    /// The event's type name.
    pub event_type: String,
    /// The event's raw payload.
    pub data: Vec<u8>,
}

/// Encode an events batch: `getEvents` returns the concatenation of these
/// records, each `contract[32], type_len u16, type[], data_len u32, data[]`,
/// with no top-level count — the decoder consumes records until the
/// buffer is exhausted.
pub fn encode_events(events: &[EmittedEvent]) -> Vec<u8> {
    let mut out = Vec::new();
    for event in events {
        out.extend_from_slice(event.contract.as_bytes());
        let type_bytes = event.event_type.as_bytes();
        out.extend_from_slice(&(type_bytes.len() as u16).to_le_bytes());
        out.extend_from_slice(type_bytes);
        out.extend_from_slice(&(event.data.len() as u32).to_le_bytes());
        out.extend_from_slice(&event.data);
    }
    out
}

/// Decode an events batch.
pub fn decode_events(buf: &[u8]) -> Result<Vec<EmittedEvent>, WasmError> {
    let mut out = Vec::new();
    let mut at = 0;
    while at < buf.len() {
        need(buf, at, 32)?;
        let contract = Address::from_slice(&buf[at..at + 32]);
        at += 32;
        need(buf, at, 2)?;
        let type_len = u16::from_le_bytes(buf[at..at + 2].try_into().unwrap()) as usize;
        at += 2;
        need(buf, at, type_len)?;
        let event_type = String::from_utf8(buf[at..at + type_len].to_vec())
            .map_err(|e| WasmError::InvalidBuffer(e.to_string()))?;
        at += type_len;
        need(buf, at, 4)?;
        let data_len = u32::from_le_bytes(buf[at..at + 4].try_into().unwrap()) as usize;
        at += 4;
        need(buf, at, data_len)?;
        let data = buf[at..at + data_len].to_vec();
        at += data_len;
        out.push(EmittedEvent {
            contract,
            event_type,
            data,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::new([n; 32])
    }
    fn ptr(n: u8) -> Pointer {
        Pointer::new([n; 32])
    }
    fn val(n: u8) -> StorageValue {
        StorageValue::new([n; 32])
    }

    #[test]
    fn test_parse_selector() {
        assert_eq!(parse_selector(&[0xAA, 0x00, 0x00, 0x01]).unwrap(), 0xAA000001);
        assert!(parse_selector(&[0x01, 0x02]).is_err());
    }

    #[test]
    fn test_environment_block_roundtrip() {
        let env = EnvironmentBlock {
            block_height: 100,
            block_median: 99,
            tx_origin: addr(1),
            msg_sender: addr(2),
            caller: addr(3),
            is_constructor: true,
            deployed_contracts: vec![addr(4), addr(5)],
        };
        let encoded = env.encode();
        let decoded = EnvironmentBlock::decode(&encoded).unwrap();
        assert_eq!(env, decoded);
    }

    #[test]
    fn test_environment_block_truncated_rejected() {
        let env = EnvironmentBlock {
            block_height: 1,
            block_median: 1,
            tx_origin: addr(1),
            msg_sender: addr(1),
            caller: addr(1),
            is_constructor: false,
            deployed_contracts: vec![addr(9)],
        };
        let mut encoded = env.encode();
        encoded.truncate(encoded.len() - 10);
        assert!(EnvironmentBlock::decode(&encoded).is_err());
    }

    #[test]
    fn test_storage_tuples_roundtrip() {
        let entries = vec![(addr(1), ptr(1), val(1)), (addr(2), ptr(2), val(2))];
        let encoded = encode_storage_tuples(&entries);
        assert_eq!(encoded.len(), 192);
        let decoded = decode_storage_tuples(&encoded).unwrap();
        assert_eq!(entries, decoded);
    }

    #[test]
    fn test_storage_tuples_bad_length_rejected() {
        assert!(decode_storage_tuples(&[0u8; 95]).is_err());
    }

    #[test]
    fn test_calls_batch_roundtrip() {
        let calls = vec![
            CallRequest {
                to: addr(7),
                calldata: vec![0xAA, 0x00, 0x00, 0x01],
                value: 500,
            },
            CallRequest {
                to: addr(8),
                calldata: vec![],
                value: 0,
            },
        ];
        let encoded = encode_calls_batch(&calls);
        let decoded = decode_calls_batch(&encoded).unwrap();
        assert_eq!(calls, decoded);
    }

    #[test]
    fn test_calls_batch_overrun_rejected() {
        let mut encoded = encode_calls_batch(&[CallRequest {
            to: addr(1),
            calldata: vec![1, 2, 3],
            value: 1,
        }]);
        encoded.truncate(encoded.len() - 2);
        assert!(decode_calls_batch(&encoded).is_err());
    }

    #[test]
    fn test_events_roundtrip() {
        let events = vec![
            EmittedEvent {
                contract: addr(1),
                event_type: "Transfer".into(),
                data: vec![1, 2, 3],
            },
            EmittedEvent {
                contract: addr(2),
                event_type: "Mint".into(),
                data: vec![],
            },
        ];
        let encoded = encode_events(&events);
        let decoded = decode_events(&encoded).unwrap();
        assert_eq!(events, decoded);
    }

    #[test]
    fn test_events_empty_buffer_is_empty_list() {
        assert_eq!(decode_events(&[]).unwrap(), vec![]);
    }

    #[test]
    fn test_call_responses_roundtrip() {
        let responses = vec![vec![1, 2, 3], vec![], vec![9u8; 40]];
        let encoded = encode_call_responses(&responses);
        let decoded = decode_call_responses(&encoded).unwrap();
        assert_eq!(responses, decoded);
    }

    #[test]
    fn test_call_responses_truncated_rejected() {
        let mut encoded = encode_call_responses(&[vec![1, 2, 3, 4, 5]]);
        encoded.truncate(encoded.len() - 2);
        assert!(decode_call_responses(&encoded).is_err());
    }
}
