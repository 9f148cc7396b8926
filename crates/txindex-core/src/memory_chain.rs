//! Deterministic in-memory chain source.
//!
//! Builds blocks on demand, disconnects tips, reorganizes onto new branches
//! and resets, publishing the same notifications a node-backed client would.
//! Stale blocks stay retrievable by hash, as they would on a real node.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

use crate::client::{ChainClient, ChainEvent, EVENT_CHANNEL_CAPACITY};
use crate::error::IndexerError;
use crate::meta::BlockMeta;
use crate::network::Network;
use crate::types::{Block, BlockId, ChainEntry, Coin, CoinView, Hash256, OutPoint, Transaction};

/// Seconds between consecutive blocks.
const BLOCK_INTERVAL: i64 = 600;

struct ChainState {
    /// Best chain, indexed by height.
    best: Vec<ChainEntry>,
    entries: HashMap<Hash256, ChainEntry>,
    blocks: HashMap<Hash256, Block>,
    /// Every output ever mined, so views can be built for stale blocks too.
    outputs: HashMap<OutPoint, Coin>,
    /// Mixed into block hashes so competing branches never share a hash.
    nonce: u64,
}

impl ChainState {
    fn tip(&self) -> &ChainEntry {
        // `best` always holds at least the genesis entry.
        &self.best[self.best.len() - 1]
    }

    fn is_best(&self, entry: &ChainEntry) -> bool {
        self.best
            .get(entry.height as usize)
            .is_some_and(|e| e.hash == entry.hash)
    }

    fn view_for(&self, block: &Block) -> CoinView {
        block
            .txs
            .iter()
            .flat_map(|tx| tx.inputs.iter())
            .filter(|input| !input.prevout.is_null())
            .filter_map(|input| self.outputs.get(&input.prevout).cloned())
            .collect()
    }
}

/// An in-memory best chain that implements [`ChainClient`].
pub struct MemoryChain {
    network: Network,
    opened: AtomicBool,
    events: broadcast::Sender<ChainEvent>,
    state: Mutex<ChainState>,
}

impl MemoryChain {
    pub fn new(network: Network) -> Self {
        Self::with_capacity(network, EVENT_CHANNEL_CAPACITY)
    }

    /// Like [`Self::new`], with a notification buffer of `capacity` events.
    /// Subscribers that fall further behind see `Lagged`.
    pub fn with_capacity(network: Network, capacity: usize) -> Self {
        let genesis = network.genesis();
        let block = Block {
            hash: genesis.hash,
            prev_hash: genesis.prev_hash,
            time: genesis.time,
            txs: Vec::new(),
        };
        let state = ChainState {
            best: vec![genesis.clone()],
            entries: HashMap::from([(genesis.hash, genesis)]),
            blocks: HashMap::from([(block.hash, block)]),
            outputs: HashMap::new(),
            nonce: 0,
        };
        let (events, _) = broadcast::channel(capacity);
        Self {
            network,
            opened: AtomicBool::new(false),
            events,
            state: Mutex::new(state),
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// The current best-chain tip.
    pub async fn tip(&self) -> ChainEntry {
        self.state.lock().await.tip().clone()
    }

    pub async fn height(&self) -> u32 {
        self.state.lock().await.tip().height
    }

    /// Mine a block with `txs` on top of the best chain and publish `BlockConnect`.
    pub async fn add_block(&self, txs: Vec<Transaction>) -> Result<ChainEntry, IndexerError> {
        let mut state = self.state.lock().await;
        let parent = state.tip().clone();
        let height = parent
            .height
            .checked_add(1)
            .ok_or_else(|| IndexerError::Client("chain height overflow".into()))?;

        state.nonce += 1;
        let mut preimage = Vec::with_capacity(32 + 4 + 8 + 32 * txs.len());
        preimage.extend_from_slice(parent.hash.as_bytes());
        preimage.extend_from_slice(&height.to_le_bytes());
        preimage.extend_from_slice(&state.nonce.to_le_bytes());
        for tx in &txs {
            preimage.extend_from_slice(tx.hash.as_bytes());
        }

        let block = Block {
            hash: Hash256::digest(&preimage),
            prev_hash: parent.hash,
            time: parent.time + BLOCK_INTERVAL,
            txs,
        };
        let entry = ChainEntry {
            height,
            hash: block.hash,
            prev_hash: parent.hash,
            time: block.time,
        };

        for tx in &block.txs {
            for (index, output) in tx.outputs.iter().enumerate() {
                let outpoint = OutPoint::new(tx.hash, index as u32);
                state.outputs.insert(
                    outpoint,
                    Coin {
                        outpoint,
                        value: output.value,
                        address: output.address.clone(),
                        height,
                    },
                );
            }
        }
        // After recording outputs, so spends of same-block coins resolve.
        let view = state.view_for(&block);
        state.entries.insert(entry.hash, entry.clone());
        state.blocks.insert(block.hash, block.clone());
        state.best.push(entry.clone());

        debug!(height, hash = %entry.hash, txs = block.txs.len(), "Memory chain connected block");
        self.emit(ChainEvent::BlockConnect {
            entry: entry.clone(),
            block: Arc::new(block),
            view: Arc::new(view),
        });
        Ok(entry)
    }

    /// Detach the best-chain tip and publish `BlockDisconnect`.
    pub async fn disconnect_tip(&self) -> Result<ChainEntry, IndexerError> {
        let mut state = self.state.lock().await;
        if state.best.len() == 1 {
            return Err(IndexerError::Client("cannot disconnect genesis".into()));
        }
        let entry = state.best.pop().ok_or(IndexerError::GenesisDisconnect)?;
        let block = state
            .blocks
            .get(&entry.hash)
            .cloned()
            .ok_or_else(|| IndexerError::BlockNotFound {
                hash: entry.hash.to_string(),
            })?;
        let view = state.view_for(&block);

        debug!(height = entry.height, hash = %entry.hash, "Memory chain disconnected block");
        self.emit(ChainEvent::BlockDisconnect {
            entry: entry.clone(),
            block: Arc::new(block),
            view: Arc::new(view),
        });
        Ok(entry)
    }

    /// Disconnect down to `fork_height`, then mine one block per entry of `branch`.
    pub async fn reorganize(
        &self,
        fork_height: u32,
        branch: Vec<Vec<Transaction>>,
    ) -> Result<Vec<ChainEntry>, IndexerError> {
        while self.height().await > fork_height {
            self.disconnect_tip().await?;
        }
        let mut connected = Vec::with_capacity(branch.len());
        for txs in branch {
            connected.push(self.add_block(txs).await?);
        }
        Ok(connected)
    }

    /// Truncate the best chain to `height` without per-block notifications and
    /// publish `ChainReset`.
    pub async fn reset(&self, height: u32) -> Result<ChainEntry, IndexerError> {
        let mut state = self.state.lock().await;
        if height > state.tip().height {
            return Err(IndexerError::EntryNotFound { height });
        }
        state.best.truncate(height as usize + 1);
        let tip = state.tip().clone();
        self.emit(ChainEvent::ChainReset { tip: tip.clone() });
        Ok(tip)
    }

    fn emit(&self, event: ChainEvent) {
        let kind = event.kind();
        if self.events.send(event).is_err() {
            debug!(client = "memory", kind, "No subscribers for chain event");
        }
    }
}

#[async_trait]
impl ChainClient for MemoryChain {
    fn name(&self) -> &str {
        "memory"
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
        Ok(self.state.lock().await.tip().meta())
    }

    async fn get_entry(&self, id: BlockId) -> Result<Option<ChainEntry>, IndexerError> {
        let state = self.state.lock().await;
        let entry = match id {
            BlockId::Height(height) => state.best.get(height as usize).cloned(),
            BlockId::Hash(hash) => state
                .entries
                .get(&hash)
                .filter(|e| state.is_best(e))
                .cloned(),
        };
        Ok(entry)
    }

    async fn get_block(&self, hash: &Hash256) -> Result<Option<Block>, IndexerError> {
        Ok(self.state.lock().await.blocks.get(hash).cloned())
    }

    async fn get_next(&self, entry: &ChainEntry) -> Result<Option<ChainEntry>, IndexerError> {
        let state = self.state.lock().await;
        if !state.is_best(entry) {
            return Ok(None);
        }
        Ok(state.best.get(entry.height as usize + 1).cloned())
    }

    async fn get_previous(
        &self,
        entry: &ChainEntry,
    ) -> Result<Option<ChainEntry>, IndexerError> {
        Ok(self.state.lock().await.entries.get(&entry.prev_hash).cloned())
    }

    async fn get_hashes(
        &self,
        start: Option<u32>,
        end: Option<u32>,
    ) -> Result<Vec<Hash256>, IndexerError> {
        let state = self.state.lock().await;
        let tip = state.tip().height;
        let start = start.unwrap_or(0);
        let end = end.unwrap_or(tip).min(tip);
        if start > end {
            return Ok(Vec::new());
        }
        Ok(state.best[start as usize..=end as usize]
            .iter()
            .map(|e| e.hash)
            .collect())
    }

    async fn get_block_view(&self, block: &Block) -> Result<CoinView, IndexerError> {
        Ok(self.state.lock().await.view_for(block))
    }

    async fn rescan(&self, start: u32) -> Result<(), IndexerError> {
        let state = self.state.lock().await;
        for entry in state.best.iter().skip(start as usize) {
            let block = state
                .blocks
                .get(&entry.hash)
                .cloned()
                .ok_or_else(|| IndexerError::BlockNotFound {
                    hash: entry.hash.to_string(),
                })?;
            let view = state.view_for(&block);
            self.emit(ChainEvent::BlockRescan {
                entry: entry.clone(),
                block: Arc::new(block),
                view: Arc::new(view),
            });
        }
        Ok(())
    }
}
