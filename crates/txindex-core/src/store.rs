//! The ordered key-value store contract the engine writes through.
//!
//! Implementations live in `txindex-storage` (`MemoryStore`, `SledStore`).

use async_trait::async_trait;

use crate::error::IndexerError;

/// A single mutation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// A set of mutations committed atomically: either all apply or none do.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Put(key.into(), value.into()));
    }

    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Delete(key.into()));
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// An ordered byte-key / byte-value store with atomic batches.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Open the underlying database. Called once by the engine before any read.
    async fn open(&self) -> Result<(), IndexerError> {
        Ok(())
    }

    /// Flush and release the underlying database.
    async fn close(&self) -> Result<(), IndexerError> {
        Ok(())
    }

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, IndexerError>;

    async fn has(&self, key: &[u8]) -> Result<bool, IndexerError> {
        Ok(self.get(key).await?.is_some())
    }

    /// Commit every operation in `batch` atomically, in order.
    async fn write(&self, batch: WriteBatch) -> Result<(), IndexerError>;

    /// All entries whose key starts with `prefix`, in ascending key order.
    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, IndexerError>;

    /// Check the schema version stored under `key`, writing it on first use.
    ///
    /// The record is `name` followed by a little-endian `u32` version.
    async fn verify(&self, key: &[u8], name: &str, version: u32) -> Result<(), IndexerError> {
        let Some(raw) = self.get(key).await? else {
            let mut value = name.as_bytes().to_vec();
            value.extend_from_slice(&version.to_le_bytes());
            let mut batch = WriteBatch::new();
            batch.put(key, value);
            return self.write(batch).await;
        };

        let mismatch = |found: u32| IndexerError::VersionMismatch {
            name: name.to_string(),
            expected: version,
            found,
        };

        if raw.len() != name.len() + 4 || &raw[..name.len()] != name.as_bytes() {
            return Err(mismatch(0));
        }
        let mut found = [0u8; 4];
        found.copy_from_slice(&raw[name.len()..]);
        let found = u32::from_le_bytes(found);
        if found != version {
            return Err(mismatch(found));
        }
        Ok(())
    }
}
