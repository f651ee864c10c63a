//! Adapters for the domain ports.

pub mod in_memory;
pub mod outbox;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
