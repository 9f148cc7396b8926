//! Error types for the txindex engine.

use thiserror::Error;

use crate::indexer::ConfigError;

/// Errors that can occur while opening, syncing or querying an index.
#[derive(Debug, Clone, Error)]
pub enum IndexerError {
    #[error("Chain client error: {0}")]
    Client(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Chain client is already open")]
    ClientAlreadyOpen,

    #[error("Chain client is not open")]
    ClientNotOpen,

    #[error("Index engine is already open")]
    AlreadyOpen,

    #[error("Index engine is not open")]
    NotOpen,

    #[error("Network mismatch: store belongs to magic {found:#010x}, client is {expected:#010x}")]
    NetworkMismatch { expected: u32, found: u32 },

    #[error("Index flags mismatch: store was created with {found}, configured for {expected}")]
    FlagsMismatch { expected: String, found: String },

    #[error("Schema version mismatch for '{name}': expected {expected}, found {found}")]
    VersionMismatch {
        name: String,
        expected: u32,
        found: u32,
    },

    #[error("Cannot disconnect the genesis block")]
    GenesisDisconnect,

    #[error("Cannot disconnect block {height}: index tip is at {tip}")]
    NonTipDisconnect { height: u32, tip: u32 },

    #[error("Cannot roll back to future height {target}: index tip is at {tip}")]
    FutureRollback { target: u32, tip: u32 },

    #[error("Block {hash} not found on the chain source")]
    BlockNotFound { hash: String },

    #[error("No best-chain entry at height {height}")]
    EntryNotFound { height: u32 },

    #[error("{0}")]
    Other(String),
}

impl IndexerError {
    /// Returns `true` if the error leaves the index in a state that requires
    /// operator attention (no automatic retry makes sense).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NetworkMismatch { .. }
                | Self::FlagsMismatch { .. }
                | Self::VersionMismatch { .. }
                | Self::GenesisDisconnect
                | Self::NonTipDisconnect { .. }
                | Self::FutureRollback { .. }
                | Self::BlockNotFound { .. }
        )
    }
}
