//! Offline chain client: knows only the genesis block and never produces blocks.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use crate::client::{ChainClient, ChainEvent, EVENT_CHANNEL_CAPACITY};
use crate::error::IndexerError;
use crate::meta::BlockMeta;
use crate::network::Network;
use crate::types::{Block, BlockId, ChainEntry, Hash256};

/// A chain client with no chain behind it.
///
/// Lets an engine open a fresh store standalone: it syncs to genesis and
/// stays there. A store indexed past genesis cannot be synced against it,
/// since none of its blocks are known here; sync fails with
/// [`IndexerError::BlockNotFound`]. Read such a store through a reader
/// built directly on the store instead.
pub struct NullClient {
    network: Network,
    opened: AtomicBool,
    events: broadcast::Sender<ChainEvent>,
}

impl NullClient {
    pub fn new(network: Network) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            network,
            opened: AtomicBool::new(false),
            events,
        }
    }

    fn emit(&self, event: ChainEvent) {
        if self.events.send(event).is_err() {
            debug!(client = "null", "No subscribers for chain event");
        }
    }

    fn genesis_block(&self) -> Block {
        let genesis = self.network.genesis();
        Block {
            hash: genesis.hash,
            prev_hash: genesis.prev_hash,
            time: genesis.time,
            txs: Vec::new(),
        }
    }
}

#[async_trait]
impl ChainClient for NullClient {
    fn name(&self) -> &str {
        "null"
    }

    async fn open(&self) -> Result<(), IndexerError> {
        if self.opened.swap(true, Ordering::SeqCst) {
            return Err(IndexerError::ClientAlreadyOpen);
        }
        self.emit(ChainEvent::Connect);
        Ok(())
    }

    async fn close(&self) -> Result<(), IndexerError> {
        if !self.opened.swap(false, Ordering::SeqCst) {
            return Err(IndexerError::ClientNotOpen);
        }
        self.emit(ChainEvent::Disconnect);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.opened.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.events.subscribe()
    }

    async fn get_tip(&self) -> Result<BlockMeta, IndexerError> {
        Ok(self.network.genesis().meta())
    }

    async fn get_entry(&self, id: BlockId) -> Result<Option<ChainEntry>, IndexerError> {
        let genesis = self.network.genesis();
        let found = match id {
            BlockId::Height(height) => height == 0,
            BlockId::Hash(hash) => hash == genesis.hash,
        };
        Ok(found.then_some(genesis))
    }

    async fn get_block(&self, hash: &Hash256) -> Result<Option<Block>, IndexerError> {
        let block = self.genesis_block();
        Ok((block.hash == *hash).then_some(block))
    }

    async fn get_next(&self, _entry: &ChainEntry) -> Result<Option<ChainEntry>, IndexerError> {
        Ok(None)
    }

    async fn get_previous(
        &self,
        _entry: &ChainEntry,
    ) -> Result<Option<ChainEntry>, IndexerError> {
        Ok(None)
    }

    async fn get_hashes(
        &self,
        start: Option<u32>,
        _end: Option<u32>,
    ) -> Result<Vec<Hash256>, IndexerError> {
        if start.unwrap_or(0) == 0 {
            Ok(vec![self.network.genesis_hash()])
        } else {
            Ok(Vec::new())
        }
    }

    async fn rescan(&self, _start: u32) -> Result<(), IndexerError> {
        Ok(())
    }
}
