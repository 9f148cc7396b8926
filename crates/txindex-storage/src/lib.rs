//! txindex-storage: ordered key-value store backends for the txindex engine.
//!
//! Backends:
//! - [`memory`]: in-memory (dev/testing, no persistence)
//! - `sled`: embedded on-disk store via `sled` (feature `sled`, on by default)

pub mod memory;

#[cfg(feature = "sled")]
pub mod sled;

pub use memory::MemoryStore;

#[cfg(feature = "sled")]
pub use self::sled::{SledStore, StoreOptions};
