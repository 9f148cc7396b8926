//! sled storage backend.
//!
//! Persists the index in an embedded sled tree. The database is opened lazily
//! in [`KvStore::open`] so a store can be constructed (and its options
//! validated) before the engine starts.
//!
//! # Usage
//! ```rust,no_run
//! use txindex_core::store::KvStore;
//! use txindex_storage::sled::{SledStore, StoreOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SledStore::new(StoreOptions::at("./data/main/index"))?;
//! store.open().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

use txindex_core::error::IndexerError;
use txindex_core::indexer::{ConfigError, IndexerConfig, DEFAULT_CACHE_SIZE, DEFAULT_MAX_FILES};
use txindex_core::store::{BatchOp, KvStore, WriteBatch};

/// Tuning for a [`SledStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Database directory. `None` opens a temporary database removed on drop.
    pub path: Option<PathBuf>,
    /// Page cache size in bytes.
    pub cache_capacity: u64,
    pub compression: bool,
    /// Accepted for configuration compatibility; sled manages its own files.
    pub max_files: u32,
}

impl StoreOptions {
    pub fn at(path: impl AsRef<Path>) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            ..Self::temporary()
        }
    }

    pub fn temporary() -> Self {
        Self {
            path: None,
            cache_capacity: DEFAULT_CACHE_SIZE,
            compression: false,
            max_files: DEFAULT_MAX_FILES,
        }
    }

    pub fn from_config(config: &IndexerConfig) -> Self {
        Self {
            path: config.store_path(),
            cache_capacity: config.cache_size,
            compression: config.compression,
            max_files: config.max_files,
        }
    }
}

/// sled-backed ordered key-value store.
pub struct SledStore {
    options: StoreOptions,
    db: RwLock<Option<sled::Db>>,
}

fn storage_err(e: sled::Error) -> IndexerError {
    IndexerError::Storage(e.to_string())
}

impl SledStore {
    /// Validate `options` without touching the disk.
    pub fn new(options: StoreOptions) -> Result<Self, IndexerError> {
        if options.compression && !cfg!(feature = "compression") {
            return Err(ConfigError::CompressionUnavailable.into());
        }
        Ok(Self {
            options,
            db: RwLock::new(None),
        })
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub async fn is_open(&self) -> bool {
        self.db.read().await.is_some()
    }

    /// Bytes used on disk, if open.
    pub async fn size_on_disk(&self) -> Result<Option<u64>, IndexerError> {
        match self.db.read().await.as_ref() {
            Some(db) => Ok(Some(db.size_on_disk().map_err(storage_err)?)),
            None => Ok(None),
        }
    }

    fn config(&self) -> sled::Config {
        let config = sled::Config::new()
            .cache_capacity(self.options.cache_capacity)
            .use_compression(self.options.compression);
        match &self.options.path {
            Some(path) => config.path(path),
            None => config.temporary(true),
        }
    }
}

#[async_trait]
impl KvStore for SledStore {
    async fn open(&self) -> Result<(), IndexerError> {
        let mut guard = self.db.write().await;
        if guard.is_some() {
            return Err(IndexerError::Storage("sled store is already open".into()));
        }
        let db = self.config().open().map_err(storage_err)?;
        info!(
            path = ?self.options.path,
            cache = self.options.cache_capacity,
            compression = self.options.compression,
            recovered = db.was_recovered(),
            "Opened sled store"
        );
        debug!(max_files = self.options.max_files, "max_files is advisory for sled");
        *guard = Some(db);
        Ok(())
    }

    async fn close(&self) -> Result<(), IndexerError> {
        let Some(db) = self.db.write().await.take() else {
            return Ok(());
        };
        let flushed = db.flush_async().await.map_err(storage_err)?;
        debug!(bytes = flushed, "Flushed sled store");
        Ok(())
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, IndexerError> {
        let guard = self.db.read().await;
        let db = guard.as_ref().ok_or(IndexerError::NotOpen)?;
        Ok(db.get(key).map_err(storage_err)?.map(|v| v.to_vec()))
    }

    async fn has(&self, key: &[u8]) -> Result<bool, IndexerError> {
        let guard = self.db.read().await;
        let db = guard.as_ref().ok_or(IndexerError::NotOpen)?;
        db.contains_key(key).map_err(storage_err)
    }

    async fn write(&self, batch: WriteBatch) -> Result<(), IndexerError> {
        let guard = self.db.read().await;
        let db = guard.as_ref().ok_or(IndexerError::NotOpen)?;
        let mut sled_batch = sled::Batch::default();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put(key, value) => sled_batch.insert(key, value),
                BatchOp::Delete(key) => sled_batch.remove(key),
            }
        }
        db.apply_batch(sled_batch).map_err(storage_err)
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, IndexerError> {
        let guard = self.db.read().await;
        let db = guard.as_ref().ok_or(IndexerError::NotOpen)?;
        db.scan_prefix(prefix)
            .map(|item| {
                item.map(|(k, v)| (k.to_vec(), v.to_vec()))
                    .map_err(storage_err)
            })
            .collect()
    }
}
