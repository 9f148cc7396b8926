//! In-memory storage backend.
//!
//! Keeps every record in an ordered map. Useful for tests and short-lived
//! indexes that don't need persistence. Data survives `close()`, so one
//! store can be handed to successive engines.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ops::Bound;
use tokio::sync::RwLock;

use txindex_core::error::IndexerError;
use txindex_core::store::{BatchOp, KvStore, WriteBatch};

/// In-memory ordered key-value store.
///
/// All data is lost when the value is dropped.
#[derive(Default)]
pub struct MemoryStore {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held.
    pub async fn len(&self) -> usize {
        self.map.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.map.read().await.is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, IndexerError> {
        Ok(self.map.read().await.get(key).cloned())
    }

    async fn has(&self, key: &[u8]) -> Result<bool, IndexerError> {
        Ok(self.map.read().await.contains_key(key))
    }

    async fn write(&self, batch: WriteBatch) -> Result<(), IndexerError> {
        // One write guard for the whole batch: readers see all of it or none.
        let mut map = self.map.write().await;
        for op in batch.into_ops() {
            match op {
                BatchOp::Put(key, value) => {
                    map.insert(key, value);
                }
                BatchOp::Delete(key) => {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, IndexerError> {
        let map = self.map.read().await;
        Ok(map
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.put(b"ta".to_vec(), b"1".to_vec());
        batch.put(b"tb".to_vec(), b"2".to_vec());
        store.write(batch).await.unwrap();

        assert_eq!(store.get(b"ta").await.unwrap(), Some(b"1".to_vec()));
        assert!(store.has(b"tb").await.unwrap());
        assert_eq!(store.len().await, 2);

        let mut batch = WriteBatch::new();
        batch.delete(b"ta".to_vec());
        store.write(batch).await.unwrap();
        assert!(store.get(b"ta").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn batch_ops_apply_in_order() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.put(b"k".to_vec(), b"old".to_vec());
        batch.delete(b"k".to_vec());
        batch.put(b"k".to_vec(), b"new".to_vec());
        store.write(batch).await.unwrap();
        assert_eq!(store.get(b"k").await.unwrap(), Some(b"new".to_vec()));
    }

    #[tokio::test]
    async fn scan_prefix_is_ordered_and_bounded() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        for key in [&b"Tb2"[..], b"Ta1", b"Tb1", b"Tc", b"t0"] {
            batch.put(key.to_vec(), Vec::new());
        }
        store.write(batch).await.unwrap();

        let keys: Vec<Vec<u8>> = store
            .scan_prefix(b"Tb")
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"Tb1".to_vec(), b"Tb2".to_vec()]);
        assert!(store.scan_prefix(b"X").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn survives_close() {
        let store = MemoryStore::new();
        store.verify(b"V", "index", 7).await.unwrap();
        store.close().await.unwrap();
        store.open().await.unwrap();
        store.verify(b"V", "index", 7).await.unwrap();
        assert!(!store.is_empty().await);
    }
}
