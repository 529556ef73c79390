//! Adapters implementing this crate's outbound ports. Production storage
//! lives behind the host's own `StorageInterface` implementation; the one
//! adapter shipped here is the in-memory reference used by this crate's own
//! tests, mirroring the teacher's `qc-11-smart-contracts::adapters::InMemoryState`.

pub mod in_memory_storage;
