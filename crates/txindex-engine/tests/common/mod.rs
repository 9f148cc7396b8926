//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use txindex_core::client::{ChainClient, ChainEvent, WatchFilter};
use txindex_core::error::IndexerError;
use txindex_core::indexer::{IndexKind, IndexerState};
use txindex_core::memory_chain::MemoryChain;
use txindex_core::meta::BlockMeta;
use txindex_core::network::Network;
use txindex_core::store::KvStore;
use txindex_core::types::{
    AddressHash, Block, BlockId, ChainEntry, CoinView, Hash256, OutPoint, Transaction, TxInput,
    TxOutput,
};
use txindex_engine::{IndexEngine, IndexerBuilder};
use txindex_storage::MemoryStore;

pub const NETWORK: Network = Network::Regtest;

pub fn addr(b: u8) -> AddressHash {
    AddressHash::new(vec![b; 20]).unwrap()
}

/// A coinbase-shaped transaction with no outputs.
pub fn tx(tag: &str) -> Transaction {
    Transaction::new(
        tag.as_bytes().to_vec(),
        vec![TxInput { prevout: OutPoint::NULL }],
        vec![],
    )
}

pub fn coinbase(tag: &str, to: &AddressHash, value: u64) -> Transaction {
    Transaction::new(
        tag.as_bytes().to_vec(),
        vec![TxInput { prevout: OutPoint::NULL }],
        vec![TxOutput {
            value,
            address: Some(to.clone()),
        }],
    )
}

pub fn spend(tag: &str, prevouts: &[OutPoint], outputs: &[(&AddressHash, u64)]) -> Transaction {
    Transaction::new(
        tag.as_bytes().to_vec(),
        prevouts.iter().map(|&prevout| TxInput { prevout }).collect(),
        outputs
            .iter()
            .map(|(to, value)| TxOutput {
                value: *value,
                address: Some((*to).clone()),
            })
            .collect(),
    )
}

pub fn chain() -> Arc<MemoryChain> {
    Arc::new(MemoryChain::new(NETWORK))
}

pub fn engine_with(
    chain: &Arc<MemoryChain>,
    store: Arc<dyn KvStore>,
    indexers: &[IndexKind],
) -> Arc<IndexEngine> {
    IndexerBuilder::new()
        .network(NETWORK)
        .indexers(indexers)
        .client(chain.clone())
        .store(store)
        .build()
        .unwrap()
}

pub fn engine(chain: &Arc<MemoryChain>) -> Arc<IndexEngine> {
    engine_with(chain, Arc::new(MemoryStore::new()), &[IndexKind::Tx])
}

/// Open the engine and wait for the initial sync to finish.
pub async fn open(engine: &Arc<IndexEngine>) {
    engine.open().await.unwrap();
    let mut state = engine.subscribe_state();
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == IndexerState::Idle),
    )
    .await
    .expect("timed out waiting for the initial sync")
    .expect("state channel closed");
}

/// Wait until the engine's tip names `hash`.
pub async fn wait_for_tip(engine: &IndexEngine, hash: Hash256) {
    let mut rx = engine.subscribe_tip();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|tip| tip.hash == hash))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for tip {hash}; at {}", engine.tip()))
        .expect("tip channel closed");
}

/// Wait until the engine reaches `state`.
pub async fn wait_for_state(engine: &IndexEngine, state: IndexerState) {
    let mut rx = engine.subscribe_state();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == state))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {state}; at {}", engine.state()))
        .expect("state channel closed");
}

/// A [`MemoryChain`] seen through a client that can lose blocks and records
/// every filter it is sent.
pub struct RelayChain {
    pub inner: Arc<MemoryChain>,
    hidden: Mutex<HashSet<Hash256>>,
    filters: Mutex<Vec<WatchFilter>>,
}

impl RelayChain {
    pub fn new(inner: Arc<MemoryChain>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            hidden: Mutex::new(HashSet::new()),
            filters: Mutex::new(Vec::new()),
        })
    }

    /// Make `get_block` answer `None` for `hash`.
    pub fn hide(&self, hash: Hash256) {
        self.hidden.lock().unwrap().insert(hash);
    }

    pub fn unhide_all(&self) {
        self.hidden.lock().unwrap().clear();
    }

    pub fn filters(&self) -> Vec<WatchFilter> {
        self.filters.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainClient for RelayChain {
    fn name(&self) -> &str {
        "relay"
    }

    async fn open(&self) -> Result<(), IndexerError> {
        self.inner.open().await
    }

    async fn close(&self) -> Result<(), IndexerError> {
        self.inner.close().await
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.inner.subscribe()
    }

    async fn get_tip(&self) -> Result<BlockMeta, IndexerError> {
        self.inner.get_tip().await
    }

    async fn get_entry(&self, id: BlockId) -> Result<Option<ChainEntry>, IndexerError> {
        self.inner.get_entry(id).await
    }

    async fn get_block(&self, hash: &Hash256) -> Result<Option<Block>, IndexerError> {
        if self.hidden.lock().unwrap().contains(hash) {
            return Ok(None);
        }
        self.inner.get_block(hash).await
    }

    async fn get_next(&self, entry: &ChainEntry) -> Result<Option<ChainEntry>, IndexerError> {
        self.inner.get_next(entry).await
    }

    async fn get_previous(
        &self,
        entry: &ChainEntry,
    ) -> Result<Option<ChainEntry>, IndexerError> {
        self.inner.get_previous(entry).await
    }

    async fn get_hashes(
        &self,
        start: Option<u32>,
        end: Option<u32>,
    ) -> Result<Vec<Hash256>, IndexerError> {
        self.inner.get_hashes(start, end).await
    }

    async fn get_block_view(&self, block: &Block) -> Result<CoinView, IndexerError> {
        self.inner.get_block_view(block).await
    }

    async fn set_filter(&self, filter: &WatchFilter) -> Result<(), IndexerError> {
        self.filters.lock().unwrap().push(filter.clone());
        Ok(())
    }

    async fn rescan(&self, start: u32) -> Result<(), IndexerError> {
        self.inner.rescan(start).await
    }
}
