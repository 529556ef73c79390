//! # cx-types
//!
//! Shared kernel for the contract execution engine: value objects
//! (`Address`, `Pointer`, `StorageValue`, `Hash`, `Bytes`, `GasUnits`), the
//! data-model entities that cross a storage or wire boundary
//! (`ContractRecord`, `BlockHeader`, `ProvenValue`), the `EngineError`
//! taxonomy, and the `StorageInterface` port every other crate in this
//! workspace consumes.
//!
//! ## Invariant table
//!
//! | Invariant | Enforced in |
//! |-----------|-------------|
//! | Addresses and storage values are fixed-width 32 bytes | `value_objects.rs` |
//! | Storage reads default to the zero value when never written | `value_objects.rs::StorageValue::default` |
//! | Every error surfaced across a component boundary maps to the §6 taxonomy | `errors.rs` |
//!
//! ## Outbound dependencies
//!
//! | Crate | Used for |
//! |-------|----------|
//! | `sha2` | Address/pointer hashing (`SHA-256`, see the workspace's hash-function note) |
//! | `serde` | (De)serializing storage- and wire-facing entities |
//! | `thiserror` | Typed error enums |
//! | `async-trait` | The async `StorageInterface` port |

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod entities;
pub mod errors;
pub mod ports;
pub mod value_objects;

/// Crate version, exposed for diagnostic logging.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Convenience re-export of every public type in this crate.
pub mod prelude {
    pub use crate::entities::*;
    pub use crate::errors::*;
    pub use crate::ports::*;
    pub use crate::value_objects::*;
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_prelude_exports() {
        use crate::prelude::*;
        let _ = Address::ZERO;
        let _ = Hash::ZERO;
        let _ = GasUnits::ZERO;
    }
}
