//! The `OPNETPLG` plugin file format (spec §6): a signed, checksum-bound
//! container for a contract's bytecode plus its metadata and an optional
//! wire protocol description.
//!
//! Every length field is validated against the remaining buffer before
//! it's used to index into it, the same discipline `cx-wasm::abi` applies
//! to the evaluator wire codec.

use sha2::{Digest, Sha256};
use thiserror::Error;

/// The fixed 8-byte magic every plugin file must open with.
pub const MAGIC: &[u8; 8] = b"OPNETPLG";

/// The only format version this parser accepts.
pub const FORMAT_VERSION: u32 = 1;

/// Ceiling on the metadata section, 1 MiB.
pub const META_MAX: usize = 1 << 20;
/// Ceiling on the code section, 16 MiB.
pub const CODE_MAX: usize = 16 << 20;
/// Ceiling on the optional proto section, 1 MiB.
pub const PROTO_MAX: usize = 1 << 20;

/// ML-DSA `(public key, signature)` byte sizes, indexed by signature
/// level. Level 0 is unused (levels are 2/3/5 per NIST FIPS 204).
const SIG_LEVEL_SIZES: &[(u8, (usize, usize))] = &[
    (2, (1312, 2420)),
    (3, (1952, 3309)),
    (5, (2592, 4627)),
];

fn sizes_for_level(level: u8) -> Result<(usize, usize), PluginError> {
    SIG_LEVEL_SIZES
        .iter()
        .find(|(l, _)| *l == level)
        .map(|(_, sizes)| *sizes)
        .ok_or(PluginError::UnknownSigLevel(level))
}

/// Errors from parsing an `OPNETPLG` file.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PluginError {
    /// A length field pointed past the end of the buffer.
    #[error("plugin buffer overflow: need {needed} bytes at offset {at}, have {available}")]
    BufferOverflow {
        /// The offset the read started at.
        at: usize,
        /// The bytes the read needed.
        needed: usize,
        /// The bytes actually left in the buffer.
        available: usize,
    },

    /// The magic bytes didn't match `OPNETPLG`.
    #[error("not a plugin file: bad magic")]
    BadMagic,

    /// The format version isn't one this parser understands.
    #[error("unsupported plugin format version: {0}")]
    VersionMismatch(u32),

    /// The signature level byte didn't match any known ML-DSA parameter set.
    #[error("unknown ML-DSA signature level: {0}")]
    UnknownSigLevel(u8),

    /// A section exceeded its configured size ceiling.
    #[error("plugin section {section} too large: {size} > {max}")]
    SectionTooLarge {
        /// The section name (`metadata`, `code`, `proto`).
        section: &'static str,
        /// The declared size.
        size: usize,
        /// The configured ceiling.
        max: usize,
    },

    /// The metadata section wasn't valid UTF-8 JSON.
    #[error("invalid plugin metadata: {0}")]
    InvalidMetadata(String),

    /// The trailing SHA-256 checksum didn't match the recomputed digest.
    #[error("plugin checksum mismatch")]
    ChecksumMismatch,
}

/// A parsed, checksum-verified plugin file.
#[derive(Clone, Debug)]
pub struct PluginFile {
    /// The ML-DSA signature level this plugin was signed at.
    pub sig_level: u8,
    /// The signer's public key.
    pub pubkey: Vec<u8>,
    /// The signature over `metadata ‖ code ‖ proto`.
    pub signature: Vec<u8>,
    /// Parsed JSON metadata.
    pub metadata: serde_json::Value,
    /// The raw WASM bytecode.
    pub code: Vec<u8>,
    /// The optional wire protocol description.
    pub proto: Option<Vec<u8>>,
}

fn need(buf: &[u8], at: usize, len: usize) -> Result<(), PluginError> {
    match at.checked_add(len) {
        Some(end) if end <= buf.len() => Ok(()),
        _ => Err(PluginError::BufferOverflow {
            at,
            needed: len,
            available: buf.len().saturating_sub(at),
        }),
    }
}

fn read_u32(buf: &[u8], at: usize) -> Result<u32, PluginError> {
    need(buf, at, 4)?;
    Ok(u32::from_le_bytes(buf[at..at + 4].try_into().unwrap()))
}

/// Parse and checksum-verify an `OPNETPLG` buffer end to end.
pub fn parse(buf: &[u8]) -> Result<PluginFile, PluginError> {
    let mut at = 0;

    need(buf, at, 8)?;
    if &buf[at..at + 8] != MAGIC {
        return Err(PluginError::BadMagic);
    }
    at += 8;

    let version = read_u32(buf, at)?;
    at += 4;
    if version != FORMAT_VERSION {
        return Err(PluginError::VersionMismatch(version));
    }

    need(buf, at, 1)?;
    let sig_level = buf[at];
    at += 1;
    let (pubkey_size, sig_size) = sizes_for_level(sig_level)?;

    need(buf, at, pubkey_size)?;
    let pubkey = buf[at..at + pubkey_size].to_vec();
    at += pubkey_size;

    need(buf, at, sig_size)?;
    let signature = buf[at..at + sig_size].to_vec();
    at += sig_size;

    let meta_len = read_u32(buf, at)? as usize;
    at += 4;
    if meta_len > META_MAX {
        return Err(PluginError::SectionTooLarge {
            section: "metadata",
            size: meta_len,
            max: META_MAX,
        });
    }
    need(buf, at, meta_len)?;
    let meta_bytes = &buf[at..at + meta_len];
    at += meta_len;
    let metadata: serde_json::Value = serde_json::from_slice(meta_bytes)
        .map_err(|e| PluginError::InvalidMetadata(e.to_string()))?;

    let code_len = read_u32(buf, at)? as usize;
    at += 4;
    if code_len > CODE_MAX {
        return Err(PluginError::SectionTooLarge {
            section: "code",
            size: code_len,
            max: CODE_MAX,
        });
    }
    need(buf, at, code_len)?;
    let code = buf[at..at + code_len].to_vec();
    at += code_len;

    let proto_len = read_u32(buf, at)? as usize;
    at += 4;
    if proto_len > PROTO_MAX {
        return Err(PluginError::SectionTooLarge {
            section: "proto",
            size: proto_len,
            max: PROTO_MAX,
        });
    }
    need(buf, at, proto_len)?;
    let proto = if proto_len == 0 {
        None
    } else {
        Some(buf[at..at + proto_len].to_vec())
    };
    at += proto_len;

    need(buf, at, 32)?;
    let checksum = &buf[at..at + 32];

    let mut hasher = Sha256::new();
    hasher.update(meta_bytes);
    hasher.update(&code);
    if let Some(proto) = &proto {
        hasher.update(proto);
    }
    let expected = hasher.finalize();
    if expected.as_slice() != checksum {
        return Err(PluginError::ChecksumMismatch);
    }

    Ok(PluginFile {
        sig_level,
        pubkey,
        signature,
        metadata,
        code,
        proto,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_valid(sig_level: u8, metadata: &[u8], code: &[u8], proto: Option<&[u8]>) -> Vec<u8> {
        let (pubkey_size, sig_size) = sizes_for_level(sig_level).unwrap();
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.push(sig_level);
        out.extend_from_slice(&vec![0xAB; pubkey_size]);
        out.extend_from_slice(&vec![0xCD; sig_size]);
        out.extend_from_slice(&(metadata.len() as u32).to_le_bytes());
        out.extend_from_slice(metadata);
        out.extend_from_slice(&(code.len() as u32).to_le_bytes());
        out.extend_from_slice(code);
        let proto_bytes = proto.unwrap_or(&[]);
        out.extend_from_slice(&(proto_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(proto_bytes);

        let mut hasher = Sha256::new();
        hasher.update(metadata);
        hasher.update(code);
        if let Some(proto) = proto {
            hasher.update(proto);
        }
        out.extend_from_slice(&hasher.finalize());
        out
    }

    #[test]
    fn test_parse_valid_plugin_roundtrips() {
        let buf = build_valid(3, br#"{"name":"demo"}"#, &[0x00, 0x61, 0x73, 0x6d], None);
        let plugin = parse(&buf).unwrap();
        assert_eq!(plugin.sig_level, 3);
        assert_eq!(plugin.metadata["name"], "demo");
        assert_eq!(plugin.code, vec![0x00, 0x61, 0x73, 0x6d]);
        assert!(plugin.proto.is_none());
    }

    #[test]
    fn test_parse_with_proto_section() {
        let buf = build_valid(2, b"{}", &[1, 2, 3], Some(&[9, 9, 9]));
        let plugin = parse(&buf).unwrap();
        assert_eq!(plugin.proto, Some(vec![9, 9, 9]));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut buf = build_valid(2, b"{}", &[1], None);
        buf[0] = b'X';
        assert_eq!(parse(&buf).unwrap_err(), PluginError::BadMagic);
    }

    #[test]
    fn test_unknown_sig_level_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf.push(9);
        assert_eq!(parse(&buf).unwrap_err(), PluginError::UnknownSigLevel(9));
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut buf = build_valid(2, b"{}", &[1], None);
        buf[8..12].copy_from_slice(&99u32.to_le_bytes());
        assert_eq!(parse(&buf).unwrap_err(), PluginError::VersionMismatch(99));
    }

    #[test]
    fn test_truncated_buffer_is_overflow_not_panic() {
        let buf = build_valid(2, b"{}", &[1, 2, 3], None);
        for cut in 1..buf.len() {
            let truncated = &buf[..buf.len() - cut];
            let _ = parse(truncated);
        }
    }

    #[test]
    fn test_checksum_mismatch_rejected() {
        let mut buf = build_valid(2, b"{}", &[1, 2, 3], None);
        let last = buf.len() - 1;
        buf[last] ^= 0xFF;
        assert_eq!(parse(&buf).unwrap_err(), PluginError::ChecksumMismatch);
    }

    #[test]
    fn test_oversized_code_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf.push(2);
        let (pubkey_size, sig_size) = sizes_for_level(2).unwrap();
        buf.extend_from_slice(&vec![0u8; pubkey_size]);
        buf.extend_from_slice(&vec![0u8; sig_size]);
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&((CODE_MAX + 1) as u32).to_le_bytes());
        assert_eq!(
            parse(&buf).unwrap_err(),
            PluginError::SectionTooLarge {
                section: "code",
                size: CODE_MAX + 1,
                max: CODE_MAX,
            }
        );
    }
}
