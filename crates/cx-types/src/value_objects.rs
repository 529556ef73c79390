//! Fixed-width value objects shared by every crate in this workspace.

use serde::{Deserialize, Serialize};
use std::fmt;

fn hex_truncated(bytes: &[u8]) -> String {
    if bytes.len() <= 8 {
        return format!("0x{}", hex_encode(bytes));
    }
    format!(
        "0x{}…{}",
        hex_encode(&bytes[..4]),
        hex_encode(&bytes[bytes.len() - 4..])
    )
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// A 32-byte contract identifier.
///
/// Two address forms coexist in the wider system: a stable *virtual
/// address* (content-addressed from deployer, bytecode and salt) and a
/// *network address* used for on-chain routing. This type is the canonical
/// form the engine indexes by; resolving either external form to canonical
/// is the manager's job (`cx-manager::AddressResolver`), not this type's.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub [u8; 32]);

impl Address {
    /// The all-zero address.
    pub const ZERO: Address = Address([0u8; 32]);

    /// Build an address from a 32-byte array.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Build an address from a byte slice, padding or truncating to 32 bytes.
    ///
    /// Shorter slices are zero-padded on the right; longer ones are
    /// truncated. Callers that require exact-length validation should check
    /// `slice.len() == 32` themselves before calling this.
    pub fn from_slice(slice: &[u8]) -> Self {
        let mut bytes = [0u8; 32];
        let len = slice.len().min(32);
        bytes[..len].copy_from_slice(&slice[..len]);
        Self(bytes)
    }

    /// Borrow the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// True if this is the all-zero address.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl Default for Address {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", hex_truncated(&self.0))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex_truncated(&self.0))
    }
}

impl From<[u8; 32]> for Address {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// A contract-local 32-byte storage key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Pointer(pub [u8; 32]);

impl Pointer {
    /// The zero pointer.
    pub const ZERO: Pointer = Pointer([0u8; 32]);

    /// Build a pointer from a 32-byte array.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Build a pointer from a byte slice, zero-padding or truncating to 32 bytes.
    pub fn from_slice(slice: &[u8]) -> Self {
        let mut bytes = [0u8; 32];
        let len = slice.len().min(32);
        bytes[..len].copy_from_slice(&slice[..len]);
        Self(bytes)
    }

    /// Borrow the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Default for Pointer {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Debug for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pointer({})", hex_truncated(&self.0))
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex_truncated(&self.0))
    }
}

/// A fixed-width 32-byte storage value.
///
/// Reads of a pointer that has never been written return
/// [`StorageValue::default`], the zero value, per the storage overlay's
/// "never written defaults to zero" policy.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageValue(pub [u8; 32]);

impl StorageValue {
    /// The zero value.
    pub const ZERO: StorageValue = StorageValue([0u8; 32]);

    /// Build a value from a 32-byte array.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Build a value from a byte slice, zero-padding shorter payloads.
    pub fn from_slice(slice: &[u8]) -> Self {
        let mut bytes = [0u8; 32];
        let len = slice.len().min(32);
        bytes[..len].copy_from_slice(&slice[..len]);
        Self(bytes)
    }

    /// Borrow the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// True if this is the zero value.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl Default for StorageValue {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Debug for StorageValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageValue({})", hex_truncated(&self.0))
    }
}

impl fmt::Display for StorageValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex_truncated(&self.0))
    }
}

/// A 32-byte SHA-256 digest: Merkle roots, checksums, bytecode hashes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// The all-zero hash, used as the genesis `prev_block_hash`.
    pub const ZERO: Hash = Hash([0u8; 32]);

    /// The all-`0xff` hash, the receipt tree's first sentinel key.
    pub const MAX: Hash = Hash([0xffu8; 32]);

    /// The all-`0xff` hash with the last byte cleared, the receipt tree's
    /// second sentinel key (`MAX_HASH - 1` per the spec).
    pub fn max_minus_one() -> Hash {
        let mut bytes = [0xffu8; 32];
        bytes[31] = 0xfe;
        Hash(bytes)
    }

    /// Hash arbitrary bytes with SHA-256.
    pub fn digest(data: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(data);
        let out = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&out);
        Hash(bytes)
    }

    /// Hash the concatenation of two byte strings, `H(a ∥ b)`.
    pub fn digest_pair(a: &[u8], b: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(a);
        hasher.update(b);
        let out = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&out);
        Hash(bytes)
    }

    /// Borrow the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Default for Hash {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", hex_truncated(&self.0))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex_truncated(&self.0))
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// A variable-length byte buffer: calldata, bytecode, event data.
///
/// Wrapped (rather than used as bare `Vec<u8>`) so `Debug` can truncate
/// large payloads instead of dumping megabytes of bytecode into a log line.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bytes(pub Vec<u8>);

impl Bytes {
    /// Wrap a byte vector.
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the underlying slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.len() <= 16 {
            write!(f, "Bytes(0x{})", hex_encode(&self.0))
        } else {
            write!(
                f,
                "Bytes({} bytes, 0x{}…)",
                self.0.len(),
                hex_encode(&self.0[..8])
            )
        }
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(data: Vec<u8>) -> Self {
        Self(data)
    }
}

/// Gas expressed in the engine's fixed-point base unit.
///
/// A newtype rather than a bare `u64` so call sites can't accidentally
/// compare a byte count or a block height to a gas quantity.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GasUnits(pub u64);

impl GasUnits {
    /// Zero gas.
    pub const ZERO: GasUnits = GasUnits(0);

    /// Saturating addition.
    pub fn saturating_add(self, other: GasUnits) -> GasUnits {
        GasUnits(self.0.saturating_add(other.0))
    }

    /// Saturating subtraction.
    pub fn saturating_sub(self, other: GasUnits) -> GasUnits {
        GasUnits(self.0.saturating_sub(other.0))
    }

    /// The smaller of two gas amounts; used when bounding a sub-frame's
    /// budget by the parent's remaining gas.
    pub fn min(self, other: GasUnits) -> GasUnits {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }
}

impl fmt::Debug for GasUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} gas", self.0)
    }
}

impl fmt::Display for GasUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
