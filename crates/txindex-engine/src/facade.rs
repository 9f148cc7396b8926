//! Read-only query surface over an index store.
//!
//! Readers never take the engine's resync lock: they see whatever batches
//! have committed. Unknown hashes and addresses yield `None` or an empty list.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::watch;

use txindex_core::error::IndexerError;
use txindex_core::layout::{addr_coin_prefix, addr_tx_prefix, IndexKey};
use txindex_core::meta::{BlockMeta, IndexFlags, TxMeta};
use txindex_core::store::KvStore;
use txindex_core::types::{AddressHash, Coin, Hash256, OutPoint, Transaction};

/// Typed lookups over the `t`, `T` and `C` families.
#[derive(Clone)]
pub struct IndexReader {
    store: Arc<dyn KvStore>,
    tip: watch::Receiver<BlockMeta>,
}

impl IndexReader {
    pub(crate) fn new(store: Arc<dyn KvStore>, tip: watch::Receiver<BlockMeta>) -> Self {
        Self { store, tip }
    }

    /// A reader over an already opened store with no engine attached.
    ///
    /// The tip is read once from the `h` record and never changes.
    pub async fn from_store(store: Arc<dyn KvStore>) -> Result<Self, IndexerError> {
        let tip = match store.get(&IndexKey::Tip.encode()).await? {
            Some(raw) => BlockMeta::decode(&raw)?,
            None => BlockMeta::ZERO,
        };
        let (_, rx) = watch::channel(tip);
        Ok(Self::new(store, rx))
    }

    /// What the index is caught up to.
    pub fn tip(&self) -> BlockMeta {
        *self.tip.borrow()
    }

    /// The stored network magic and index set, if the store was ever opened.
    pub async fn flags(&self) -> Result<Option<IndexFlags>, IndexerError> {
        match self.store.get(&IndexKey::Flags.encode()).await? {
            Some(raw) => Ok(Some(IndexFlags::decode(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn get_meta(&self, hash: &Hash256) -> Result<Option<TxMeta>, IndexerError> {
        match self.store.get(&IndexKey::Tx(*hash).encode()).await? {
            Some(raw) => Ok(Some(TxMeta::decode(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn get_tx(&self, hash: &Hash256) -> Result<Option<Transaction>, IndexerError> {
        Ok(self.get_meta(hash).await?.map(|meta| meta.tx))
    }

    pub async fn has_tx(&self, hash: &Hash256) -> Result<bool, IndexerError> {
        self.store.has(&IndexKey::Tx(*hash).encode()).await
    }

    /// Hashes of every transaction paying to or spending from any of `addrs`,
    /// deduplicated and in ascending hash order.
    pub async fn get_hashes_by_address(
        &self,
        addrs: &[AddressHash],
    ) -> Result<Vec<Hash256>, IndexerError> {
        let mut hashes = BTreeSet::new();
        for addr in addrs {
            for (key, _) in self.store.scan_prefix(&addr_tx_prefix(addr)).await? {
                if let IndexKey::AddrTx(_, hash) = IndexKey::decode(&key)? {
                    hashes.insert(hash);
                }
            }
        }
        Ok(hashes.into_iter().collect())
    }

    /// Unspent coins owned by any of `addrs`.
    pub async fn get_coins_by_address(
        &self,
        addrs: &[AddressHash],
    ) -> Result<Vec<Coin>, IndexerError> {
        let mut outpoints = BTreeSet::new();
        for addr in addrs {
            for (key, _) in self.store.scan_prefix(&addr_coin_prefix(addr)).await? {
                if let IndexKey::AddrCoin(_, outpoint) = IndexKey::decode(&key)? {
                    outpoints.insert(outpoint);
                }
            }
        }

        let mut coins = Vec::with_capacity(outpoints.len());
        let mut current: Option<TxMeta> = None;
        for OutPoint { hash, index } in outpoints {
            // Outpoints are sorted by hash, so each record is loaded once.
            if current.as_ref().map(TxMeta::hash) != Some(hash) {
                current = self.get_meta(&hash).await?;
            }
            if let Some(coin) = current.as_ref().and_then(|meta| meta.coin(index)) {
                coins.push(coin);
            }
        }
        Ok(coins)
    }

    pub async fn get_meta_by_address(
        &self,
        addrs: &[AddressHash],
    ) -> Result<Vec<TxMeta>, IndexerError> {
        let mut metas = Vec::new();
        for hash in self.get_hashes_by_address(addrs).await? {
            if let Some(meta) = self.get_meta(&hash).await? {
                metas.push(meta);
            }
        }
        Ok(metas)
    }

    pub async fn get_tx_by_address(
        &self,
        addrs: &[AddressHash],
    ) -> Result<Vec<Transaction>, IndexerError> {
        Ok(self
            .get_meta_by_address(addrs)
            .await?
            .into_iter()
            .map(|meta| meta.tx)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txindex_core::store::WriteBatch;
    use txindex_core::types::{TxInput, TxOutput};
    use txindex_storage::MemoryStore;

    fn addr(b: u8) -> AddressHash {
        AddressHash::new(vec![b; 20]).unwrap()
    }

    async fn seeded() -> (IndexReader, Transaction) {
        let tx = Transaction::new(
            b"pay".to_vec(),
            vec![TxInput { prevout: OutPoint::NULL }],
            vec![
                TxOutput { value: 10, address: Some(addr(1)) },
                TxOutput { value: 20, address: Some(addr(1)) },
            ],
        );
        let block = BlockMeta::new(3, Hash256::digest(b"block3"));
        let meta = TxMeta::new(tx.clone(), &block, 1_000, 0);

        let store = Arc::new(MemoryStore::new());
        let mut batch = WriteBatch::new();
        batch.put(IndexKey::Tx(tx.hash).encode(), meta.encode().unwrap());
        batch.put(IndexKey::AddrTx(addr(1), tx.hash).encode(), Vec::new());
        batch.put(
            IndexKey::AddrCoin(addr(1), OutPoint::new(tx.hash, 1)).encode(),
            Vec::new(),
        );
        batch.put(IndexKey::Tip.encode(), block.encode());
        store.write(batch).await.unwrap();

        (IndexReader::from_store(store).await.unwrap(), tx)
    }

    #[tokio::test]
    async fn tx_lookups() {
        let (reader, tx) = seeded().await;
        assert_eq!(reader.tip().height, 3);

        let meta = reader.get_meta(&tx.hash).await.unwrap().unwrap();
        assert_eq!(meta.height, 3);
        assert_eq!(meta.block_time, 1_000);
        assert!(reader.has_tx(&tx.hash).await.unwrap());
        assert_eq!(reader.get_tx(&tx.hash).await.unwrap(), Some(tx));

        let unknown = Hash256::digest(b"nope");
        assert!(reader.get_meta(&unknown).await.unwrap().is_none());
        assert!(!reader.has_tx(&unknown).await.unwrap());
    }

    #[tokio::test]
    async fn address_lookups() {
        let (reader, tx) = seeded().await;

        assert_eq!(reader.get_hashes_by_address(&[addr(1)]).await.unwrap(), vec![tx.hash]);
        assert_eq!(
            reader
                .get_hashes_by_address(&[addr(1), addr(1)])
                .await
                .unwrap()
                .len(),
            1
        );

        let coins = reader.get_coins_by_address(&[addr(1)]).await.unwrap();
        assert_eq!(coins.len(), 1);
        assert_eq!(coins[0].value, 20);
        assert_eq!(coins[0].height, 3);

        assert_eq!(reader.get_tx_by_address(&[addr(1)]).await.unwrap(), vec![tx]);
        assert!(reader.get_meta_by_address(&[addr(2)]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_store() {
        let reader = IndexReader::from_store(Arc::new(MemoryStore::new()))
            .await
            .unwrap();
        assert_eq!(reader.tip(), BlockMeta::ZERO);
        assert!(reader.flags().await.unwrap().is_none());
    }
}
