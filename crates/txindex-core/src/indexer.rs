//! Indexer configuration and state types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::network::Network;

pub const DEFAULT_MAX_FILES: u32 = 64;
pub const DEFAULT_CACHE_SIZE: u64 = 32 << 20;
pub const MIN_CACHE_SIZE: u64 = 1 << 20;
pub const MAX_MAX_FILES: u32 = 65_535;

/// Which indexes an engine maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Transaction records by hash (`t`).
    Tx,
    /// Address secondary indexes (`T`, `C`).
    Address,
}

/// Rejected configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("at least one indexer must be enabled")]
    NoIndexers,

    #[error("indexer '{0:?}' listed more than once")]
    DuplicateIndexer(IndexKind),

    #[error("the address index requires the tx index")]
    AddressWithoutTx,

    #[error("an on-disk store needs a location (set `location` or enable `memory`)")]
    MissingLocation,

    #[error("max_files must be in 1..={max}, got {got}")]
    MaxFiles { got: u32, max: u32 },

    #[error("cache_size must be at least {min} bytes, got {got}")]
    CacheSize { got: u64, min: u64 },

    #[error("compression requested but the store backend was built without it")]
    CompressionUnavailable,
}

/// Validated configuration for an index engine.
///
/// Build through `txindex_engine::IndexerBuilder`, or construct directly and
/// call [`IndexerConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Chain network the index belongs to.
    pub network: Network,
    /// Indexes to maintain.
    pub indexers: Vec<IndexKind>,
    /// Base directory for the on-disk store.
    pub location: Option<PathBuf>,
    /// Keep everything in memory instead of on disk.
    pub memory: bool,
    /// Upper bound on open files for the store backend.
    pub max_files: u32,
    /// Store cache size in bytes.
    pub cache_size: u64,
    /// Compress values on disk.
    pub compression: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            network: Network::default(),
            indexers: vec![IndexKind::Tx],
            location: None,
            memory: true,
            max_files: DEFAULT_MAX_FILES,
            cache_size: DEFAULT_CACHE_SIZE,
            compression: false,
        }
    }
}

impl IndexerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.indexers.is_empty() {
            return Err(ConfigError::NoIndexers);
        }
        for (i, kind) in self.indexers.iter().enumerate() {
            if self.indexers[..i].contains(kind) {
                return Err(ConfigError::DuplicateIndexer(*kind));
            }
        }
        if self.indexes(IndexKind::Address) && !self.indexes(IndexKind::Tx) {
            return Err(ConfigError::AddressWithoutTx);
        }
        if !self.memory && self.location.is_none() {
            return Err(ConfigError::MissingLocation);
        }
        if self.max_files == 0 || self.max_files > MAX_MAX_FILES {
            return Err(ConfigError::MaxFiles {
                got: self.max_files,
                max: MAX_MAX_FILES,
            });
        }
        if self.cache_size < MIN_CACHE_SIZE {
            return Err(ConfigError::CacheSize {
                got: self.cache_size,
                min: MIN_CACHE_SIZE,
            });
        }
        Ok(())
    }

    pub fn indexes(&self, kind: IndexKind) -> bool {
        self.indexers.contains(&kind)
    }

    /// On-disk path of the store: `<location>/<network>/index`.
    pub fn store_path(&self) -> Option<PathBuf> {
        self.location
            .as_ref()
            .map(|base| base.join(self.network.name()).join("index"))
    }
}

/// Runtime state of the index engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexerState {
    /// Not opened, or fully closed.
    Closed,
    /// Opening the store and checking the schema version.
    Opening,
    /// Checking the stored network magic and index flags.
    VerifyingNetwork,
    /// Waiting for the chain client to connect.
    Connecting,
    /// Catching up with (or rolling back to) the chain source.
    Syncing,
    /// Caught up, following live notifications.
    Idle,
    /// Shutting down.
    Closing,
    /// Stopped on an unrecoverable error.
    Failed,
}

impl IndexerState {
    /// `true` while the index reflects the chain source and is making progress.
    pub fn is_healthy(self) -> bool {
        matches!(self, Self::Connecting | Self::Syncing | Self::Idle)
    }
}

impl std::fmt::Display for IndexerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Opening => write!(f, "opening"),
            Self::VerifyingNetwork => write!(f, "verifying-network"),
            Self::Connecting => write!(f, "connecting"),
            Self::Syncing => write!(f, "syncing"),
            Self::Idle => write!(f, "idle"),
            Self::Closing => write!(f, "closing"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
