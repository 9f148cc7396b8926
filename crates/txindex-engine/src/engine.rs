//! The index engine: keeps a key-value store in step with a chain client.
//!
//! # Lifecycle
//! `open()` opens the store, checks the schema version and the network/index
//! flags, loads the persisted tip, starts the event task and finally opens
//! the client. The client's `Connect` then triggers a full sync.
//!
//! # Consistency
//! Every block transition is one atomic batch that carries the new tip
//! record along with the block's records, and the in-memory tip only moves
//! after that batch commits. All mutations run under the resync lock, so a
//! live notification arriving mid-sync waits for the sync to finish.

use std::ops::RangeInclusive;
use std::sync::{Arc, Weak};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use txindex_core::client::{ChainClient, ChainEvent, WatchFilter};
use txindex_core::error::IndexerError;
use txindex_core::handler::{BlockAction, HandlerRegistry};
use txindex_core::indexer::{IndexKind, IndexerConfig, IndexerState};
use txindex_core::layout::IndexKey;
use txindex_core::meta::{BlockMeta, IndexFlags, TxMeta};
use txindex_core::store::{KvStore, WriteBatch};
use txindex_core::types::{AddressHash, Block, BlockId, ChainEntry, CoinView, OutPoint};

use crate::facade::IndexReader;

/// Name stored in the `V` record.
pub const INDEX_NAME: &str = "index";
/// Bumped whenever the persisted layout changes incompatibly.
pub const INDEX_VERSION: u32 = 7;

pub struct IndexEngine {
    config: IndexerConfig,
    store: Arc<dyn KvStore>,
    client: Arc<dyn ChainClient>,
    handlers: HandlerRegistry,
    /// The resync lock.
    lock: Mutex<()>,
    tip: watch::Sender<BlockMeta>,
    state: watch::Sender<IndexerState>,
    filter: Mutex<WatchFilter>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl IndexEngine {
    /// Assemble an engine. `config` is assumed validated; use
    /// [`crate::IndexerBuilder`] to get one.
    pub fn new(
        config: IndexerConfig,
        store: Arc<dyn KvStore>,
        client: Arc<dyn ChainClient>,
        handlers: HandlerRegistry,
    ) -> Self {
        Self {
            config,
            store,
            client,
            handlers,
            lock: Mutex::new(()),
            tip: watch::Sender::new(BlockMeta::ZERO),
            state: watch::Sender::new(IndexerState::Closed),
            filter: Mutex::new(WatchFilter::new()),
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    pub fn client(&self) -> &Arc<dyn ChainClient> {
        &self.client
    }

    /// The block the index is caught up to.
    pub fn tip(&self) -> BlockMeta {
        *self.tip.borrow()
    }

    /// Watch the tip move; every value is a committed state.
    pub fn subscribe_tip(&self) -> watch::Receiver<BlockMeta> {
        self.tip.subscribe()
    }

    pub fn state(&self) -> IndexerState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<IndexerState> {
        self.state.subscribe()
    }

    pub fn is_healthy(&self) -> bool {
        self.state().is_healthy()
    }

    /// A lock-free read handle sharing this engine's store and tip.
    pub fn reader(&self) -> IndexReader {
        IndexReader::new(Arc::clone(&self.store), self.tip.subscribe())
    }

    /// Only `close()` leaves `Failed`.
    fn set_state(&self, state: IndexerState) {
        self.state.send_if_modified(|current| {
            let sticky = *current == IndexerState::Failed
                && !matches!(state, IndexerState::Closing | IndexerState::Closed);
            if *current == state || sticky {
                return false;
            }
            debug!(from = %current, to = %state, "Index state changed");
            *current = state;
            true
        });
    }

    /// Move to `Failed` if `result` carries a fatal error.
    fn check<T>(&self, result: Result<T, IndexerError>) -> Result<T, IndexerError> {
        if let Err(err) = &result {
            if err.is_fatal() {
                error!(error = %err, "Fatal index error");
                self.set_state(IndexerState::Failed);
            }
        }
        result
    }

    fn ensure_open(&self) -> Result<(), IndexerError> {
        match self.state() {
            IndexerState::Closed | IndexerState::Closing => Err(IndexerError::NotOpen),
            _ => Ok(()),
        }
    }

    // ─── Lifecycle ────────────────────────────────────────────────────────

    pub async fn open(self: &Arc<Self>) -> Result<(), IndexerError> {
        if self.state() != IndexerState::Closed {
            return Err(IndexerError::AlreadyOpen);
        }
        self.set_state(IndexerState::Opening);

        if let Err(err) = self.open_inner().await {
            self.release().await;
            if err.is_fatal() {
                error!(error = %err, "Failed to open index");
                self.set_state(IndexerState::Failed);
            } else {
                self.set_state(IndexerState::Closed);
            }
            return Err(err);
        }
        Ok(())
    }

    async fn open_inner(self: &Arc<Self>) -> Result<(), IndexerError> {
        self.store.open().await?;
        self.store
            .verify(&IndexKey::Version.encode(), INDEX_NAME, INDEX_VERSION)
            .await?;

        self.set_state(IndexerState::VerifyingNetwork);
        self.verify_flags().await?;

        let tip = self.load_tip().await?;
        self.tip.send_replace(tip);
        info!(
            network = %self.config.network,
            height = tip.height,
            hash = %tip.hash,
            client = self.client.name(),
            "Opened index"
        );

        // Subscribe before opening the client so `Connect` is not missed.
        let events = self.client.subscribe();
        let handle = tokio::spawn(run_events(Arc::downgrade(self), events));
        *self.task.lock().await = Some(handle);

        self.set_state(IndexerState::Connecting);
        self.client.open().await
    }

    pub async fn close(&self) -> Result<(), IndexerError> {
        if self.state() == IndexerState::Closed {
            return Err(IndexerError::NotOpen);
        }
        self.set_state(IndexerState::Closing);

        let client_result = if self.client.is_open() {
            self.client.close().await
        } else {
            Ok(())
        };

        let _guard = self.lock.lock().await;
        self.stop_task().await;
        let store_result = self.store.close().await;
        self.set_state(IndexerState::Closed);
        info!(height = self.tip().height, "Closed index");

        client_result?;
        store_result
    }

    /// Best-effort teardown after a failed open.
    async fn release(&self) {
        if self.client.is_open() {
            if let Err(err) = self.client.close().await {
                warn!(error = %err, "Failed to close chain client");
            }
        }
        self.stop_task().await;
        if let Err(err) = self.store.close().await {
            warn!(error = %err, "Failed to close store");
        }
    }

    async fn stop_task(&self) {
        if let Some(task) = self.task.lock().await.take() {
            task.abort();
            let _ = task.await;
        }
    }

    async fn verify_flags(&self) -> Result<(), IndexerError> {
        let expected = IndexFlags::new(self.config.network.magic(), &self.config.indexers);
        let key = IndexKey::Flags.encode();
        match self.store.get(&key).await? {
            Some(raw) => expected.verify(&IndexFlags::decode(&raw)?),
            None => {
                let mut batch = WriteBatch::new();
                batch.put(key, expected.encode());
                self.store.write(batch).await
            }
        }
    }

    async fn load_tip(&self) -> Result<BlockMeta, IndexerError> {
        let key = IndexKey::Tip.encode();
        if let Some(raw) = self.store.get(&key).await? {
            return BlockMeta::decode(&raw);
        }
        let mut batch = WriteBatch::new();
        batch.put(key, BlockMeta::ZERO.encode());
        self.store.write(batch).await?;
        Ok(BlockMeta::ZERO)
    }

    async fn write_tip(&self, meta: BlockMeta) -> Result<(), IndexerError> {
        let mut batch = WriteBatch::new();
        batch.put(IndexKey::Tip.encode(), meta.encode());
        self.store.write(batch).await?;
        self.tip.send_replace(meta);
        Ok(())
    }

    // ─── Watch filter ─────────────────────────────────────────────────────

    /// Add an address to the watch filter and push it to an open client.
    pub async fn watch_address(&self, addr: AddressHash) -> Result<(), IndexerError> {
        let mut filter = self.filter.lock().await;
        if filter.add(addr) && self.client.is_open() {
            self.client.set_filter(&filter).await?;
        }
        Ok(())
    }

    pub async fn filter(&self) -> WatchFilter {
        self.filter.lock().await.clone()
    }

    // ─── Events ───────────────────────────────────────────────────────────

    async fn handle_event(&self, event: ChainEvent) {
        if let ChainEvent::Error(err) = event {
            warn!(error = %err, "Chain client reported an error");
            self.handlers.dispatch_error(&err).await;
            return;
        }
        if !self.state().is_healthy() {
            debug!(kind = event.kind(), state = %self.state(), "Ignoring chain event");
            return;
        }

        let kind = event.kind();
        let result = match event {
            ChainEvent::Connect => self.sync().await,
            ChainEvent::Disconnect => {
                debug!("Chain client disconnected");
                Ok(())
            }
            ChainEvent::BlockConnect { entry, block, view }
            | ChainEvent::BlockRescan { entry, block, view } => {
                self.index_block(&entry, &block, &view).await
            }
            ChainEvent::BlockDisconnect { entry, block, view } => {
                self.unindex_block(&entry, &block, &view).await
            }
            ChainEvent::ChainReset { tip } => self.reset(&tip).await,
            ChainEvent::Error(_) => Ok(()),
        };

        if let Err(err) = result {
            error!(kind, error = %err, "Failed to handle chain event");
            self.handlers.dispatch_error(&err).await;
        }
    }

    async fn reset(&self, tip: &ChainEntry) -> Result<(), IndexerError> {
        info!(height = tip.height, hash = %tip.hash, "Chain reset");
        self.rollback(tip.height).await?;
        self.handlers.dispatch_reset(&self.tip()).await;
        Ok(())
    }

    async fn notify_block(&self, action: BlockAction, meta: &BlockMeta, block: &Block) {
        if let Err(err) = self.handlers.dispatch_block(action, meta, block).await {
            warn!(height = meta.height, error = %err, "Block handler failed");
            self.handlers.dispatch_error(&err).await;
        }
    }

    // ─── Sync ─────────────────────────────────────────────────────────────

    /// Bring the index in line with the client's best chain: roll back past
    /// any divergence, then index forward to the client's tip.
    pub async fn sync(&self) -> Result<(), IndexerError> {
        self.ensure_open()?;
        let _guard = self.lock.lock().await;
        let result = self.sync_locked().await;
        self.check(result)
    }

    async fn sync_locked(&self) -> Result<(), IndexerError> {
        self.set_state(IndexerState::Syncing);

        let tip = self.load_tip().await?;
        self.tip.send_replace(tip);

        let filter = self.filter.lock().await.clone();
        self.client.set_filter(&filter).await?;

        let remote = self.client.get_tip().await?;
        info!(
            local = tip.height,
            remote = remote.height,
            "Syncing index with chain"
        );

        // Roll back below any stale indexed block, not just to the remote height.
        let mut target = tip.height.min(remote.height);
        if let Some(fork) = self.find_fork_point().await? {
            target = target.min(fork);
        }
        self.rollback_locked(target).await?;

        let local = self.tip();

        for height in heights_after(local.height, remote.height) {
            let entry = self
                .client
                .get_entry(BlockId::Height(height))
                .await?
                .ok_or(IndexerError::EntryNotFound { height })?;
            let block = self.client.get_block(&entry.hash).await?.ok_or_else(|| {
                IndexerError::BlockNotFound {
                    hash: entry.hash.to_string(),
                }
            })?;
            let view = self.client.get_block_view(&block).await?;
            self.index_block_locked(&entry, &block, &view).await?;
        }

        info!(height = self.tip().height, "Index synced");
        self.set_state(IndexerState::Idle);
        Ok(())
    }

    /// Height of the newest indexed block still on the best chain, if the
    /// current tip is not.
    async fn find_fork_point(&self) -> Result<Option<u32>, IndexerError> {
        let tip = self.tip();
        let mut cursor = tip;
        while cursor.height > 0 {
            if self.client.get_entry(BlockId::Hash(cursor.hash)).await?.is_some() {
                break;
            }
            let block = self.client.get_block(&cursor.hash).await?.ok_or_else(|| {
                IndexerError::BlockNotFound {
                    hash: cursor.hash.to_string(),
                }
            })?;
            cursor = BlockMeta::new(cursor.height - 1, block.prev_hash);
        }
        if cursor == tip {
            return Ok(None);
        }
        warn!(
            tip = tip.height,
            fork = cursor.height,
            "Indexed chain diverged from the chain source"
        );
        Ok(Some(cursor.height))
    }

    // ─── Connect / disconnect ─────────────────────────────────────────────

    /// Index `block` at `entry` and advance the tip to it.
    pub async fn index_block(
        &self,
        entry: &ChainEntry,
        block: &Block,
        view: &CoinView,
    ) -> Result<(), IndexerError> {
        self.ensure_open()?;
        let _guard = self.lock.lock().await;
        let result = self.index_block_locked(entry, block, view).await;
        self.check(result)
    }

    async fn index_block_locked(
        &self,
        entry: &ChainEntry,
        block: &Block,
        view: &CoinView,
    ) -> Result<(), IndexerError> {
        let tip = self.tip();
        if entry.height < tip.height {
            warn!(
                height = entry.height,
                tip = tip.height,
                "Ignoring block connect below the index tip"
            );
            return Ok(());
        }

        let meta = entry.meta();
        let mut batch = WriteBatch::new();
        self.add_block_records(&mut batch, &meta, block, view)?;
        batch.put(IndexKey::Tip.encode(), meta.encode());
        self.store.write(batch).await?;
        self.tip.send_replace(meta);

        debug!(height = meta.height, hash = %meta.hash, txs = block.txs.len(), "Indexed block");
        self.notify_block(BlockAction::Indexed, &meta, block).await;
        Ok(())
    }

    /// Remove `block` at `entry`, which must be the current tip, and move the
    /// tip to its parent.
    pub async fn unindex_block(
        &self,
        entry: &ChainEntry,
        block: &Block,
        view: &CoinView,
    ) -> Result<(), IndexerError> {
        self.ensure_open()?;
        let _guard = self.lock.lock().await;
        let result = self.unindex_block_locked(entry, block, view).await;
        self.check(result)
    }

    async fn unindex_block_locked(
        &self,
        entry: &ChainEntry,
        block: &Block,
        view: &CoinView,
    ) -> Result<(), IndexerError> {
        let tip = self.tip();
        if entry.height == 0 {
            return Err(IndexerError::GenesisDisconnect);
        }
        if entry.height > tip.height {
            warn!(
                height = entry.height,
                tip = tip.height,
                "Ignoring block disconnect above the index tip"
            );
            return Ok(());
        }
        if entry.height != tip.height || entry.hash != tip.hash {
            return Err(IndexerError::NonTipDisconnect {
                height: entry.height,
                tip: tip.height,
            });
        }

        let prev = self.client.get_previous(entry).await?.ok_or_else(|| {
            IndexerError::BlockNotFound {
                hash: entry.prev_hash.to_string(),
            }
        })?;
        self.remove_block(&entry.meta(), block, view, prev.meta()).await
    }

    /// One batch: delete `block`'s records and make `parent` the tip.
    async fn remove_block(
        &self,
        meta: &BlockMeta,
        block: &Block,
        view: &CoinView,
        parent: BlockMeta,
    ) -> Result<(), IndexerError> {
        let mut batch = WriteBatch::new();
        self.remove_block_records(&mut batch, block, view);
        batch.put(IndexKey::Tip.encode(), parent.encode());
        self.store.write(batch).await?;
        self.tip.send_replace(parent);

        debug!(height = meta.height, hash = %meta.hash, txs = block.txs.len(), "Unindexed block");
        self.notify_block(BlockAction::Unindexed, meta, block).await;
        Ok(())
    }

    // ─── Rollback ─────────────────────────────────────────────────────────

    /// Unindex blocks from the tip down to `height`, one batch per block.
    pub async fn rollback(&self, height: u32) -> Result<(), IndexerError> {
        self.ensure_open()?;
        let _guard = self.lock.lock().await;
        let result = self.rollback_locked(height).await;
        self.check(result)
    }

    async fn rollback_locked(&self, height: u32) -> Result<(), IndexerError> {
        let mut tip = self.tip();
        if height == tip.height {
            debug!(height, "Rollback target is the index tip");
            return Ok(());
        }
        if height > tip.height {
            return Err(IndexerError::FutureRollback {
                target: height,
                tip: tip.height,
            });
        }

        let target = self
            .client
            .get_entry(BlockId::Height(height))
            .await?
            .ok_or(IndexerError::EntryNotFound { height })?;

        info!(from = tip.height, target = height, "Rolling back index");
        while tip.height > height {
            let block = self.client.get_block(&tip.hash).await?.ok_or_else(|| {
                IndexerError::BlockNotFound {
                    hash: tip.hash.to_string(),
                }
            })?;
            let view = self.client.get_block_view(&block).await?;
            let parent = BlockMeta::new(tip.height - 1, block.prev_hash);
            self.remove_block(&tip, &block, &view, parent).await?;
            tip = parent;
        }

        self.write_tip(target.meta()).await
    }

    // ─── Record derivation ────────────────────────────────────────────────

    fn add_block_records(
        &self,
        batch: &mut WriteBatch,
        meta: &BlockMeta,
        block: &Block,
        view: &CoinView,
    ) -> Result<(), IndexerError> {
        let address = self.config.indexes(IndexKind::Address);
        for (i, tx) in block.txs.iter().enumerate() {
            let record = TxMeta::new(tx.clone(), meta, block.time, i as u32);
            batch.put(IndexKey::Tx(tx.hash).encode(), record.encode()?);
            if !address {
                continue;
            }

            for (index, output) in tx.outputs.iter().enumerate() {
                let Some(addr) = &output.address else { continue };
                let outpoint = OutPoint::new(tx.hash, index as u32);
                batch.put(IndexKey::AddrTx(addr.clone(), tx.hash).encode(), Vec::new());
                batch.put(IndexKey::AddrCoin(addr.clone(), outpoint).encode(), Vec::new());
            }

            if tx.is_coinbase() {
                continue;
            }
            for input in &tx.inputs {
                let Some(coin) = view.get(&input.prevout) else { continue };
                let Some(addr) = &coin.address else { continue };
                batch.put(IndexKey::AddrTx(addr.clone(), tx.hash).encode(), Vec::new());
                batch.delete(IndexKey::AddrCoin(addr.clone(), coin.outpoint).encode());
            }
        }
        Ok(())
    }

    /// Exact reversal of [`Self::add_block_records`], walking transactions
    /// back to front so coins created and spent in one block cancel out.
    fn remove_block_records(&self, batch: &mut WriteBatch, block: &Block, view: &CoinView) {
        let address = self.config.indexes(IndexKind::Address);
        for tx in block.txs.iter().rev() {
            batch.delete(IndexKey::Tx(tx.hash).encode());
            if !address {
                continue;
            }

            if !tx.is_coinbase() {
                for input in &tx.inputs {
                    let Some(coin) = view.get(&input.prevout) else { continue };
                    let Some(addr) = &coin.address else { continue };
                    batch.delete(IndexKey::AddrTx(addr.clone(), tx.hash).encode());
                    batch.put(IndexKey::AddrCoin(addr.clone(), coin.outpoint).encode(), Vec::new());
                }
            }

            for (index, output) in tx.outputs.iter().enumerate() {
                let Some(addr) = &output.address else { continue };
                let outpoint = OutPoint::new(tx.hash, index as u32);
                batch.delete(IndexKey::AddrTx(addr.clone(), tx.hash).encode());
                batch.delete(IndexKey::AddrCoin(addr.clone(), outpoint).encode());
            }
        }
    }
}

/// Heights above `tip` up to and including `remote`.
fn heights_after(tip: u32, remote: u32) -> RangeInclusive<u32> {
    match tip.checked_add(1) {
        Some(start) => start..=remote,
        None => RangeInclusive::new(1, 0),
    }
}

/// The event task: one notification at a time, each run to completion.
async fn run_events(engine: Weak<IndexEngine>, mut events: broadcast::Receiver<ChainEvent>) {
    loop {
        let received = events.recv().await;
        let Some(engine) = engine.upgrade() else {
            break;
        };
        match received {
            Ok(event) => engine.handle_event(event).await,
            Err(RecvError::Lagged(missed)) => {
                warn!(missed, "Event task fell behind; resyncing");
                if let Err(err) = engine.sync().await {
                    error!(error = %err, "Resync after lag failed");
                    engine.handlers.dispatch_error(&err).await;
                }
            }
            Err(RecvError::Closed) => {
                debug!("Chain event channel closed");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txindex_core::memory_chain::MemoryChain;
    use txindex_core::network::Network;
    use txindex_core::types::{Hash256, Transaction, TxInput};
    use txindex_storage::MemoryStore;

    fn tx(tag: &str) -> Transaction {
        Transaction::new(
            tag.as_bytes().to_vec(),
            vec![TxInput { prevout: OutPoint::NULL }],
            vec![],
        )
    }

    fn engine(chain: Arc<MemoryChain>) -> Arc<IndexEngine> {
        let config = IndexerConfig {
            network: Network::Regtest,
            ..Default::default()
        };
        Arc::new(IndexEngine::new(
            config,
            Arc::new(MemoryStore::new()),
            chain,
            HandlerRegistry::new(),
        ))
    }

    #[tokio::test]
    async fn mutations_require_open() {
        let chain = Arc::new(MemoryChain::new(Network::Regtest));
        let engine = engine(chain);
        assert!(matches!(engine.rollback(0).await, Err(IndexerError::NotOpen)));
        assert!(matches!(engine.close().await, Err(IndexerError::NotOpen)));
    }

    #[tokio::test]
    async fn open_twice_fails() {
        let chain = Arc::new(MemoryChain::new(Network::Regtest));
        let engine = engine(chain);
        engine.open().await.unwrap();
        assert!(matches!(engine.open().await, Err(IndexerError::AlreadyOpen)));
        engine.close().await.unwrap();
        assert_eq!(engine.state(), IndexerState::Closed);
    }

    #[tokio::test]
    async fn direct_connect_below_tip_is_ignored() {
        let chain = Arc::new(MemoryChain::new(Network::Regtest));
        let engine = engine(chain.clone());
        engine.open().await.unwrap();
        engine.sync().await.unwrap();

        chain.add_block(vec![tx("a")]).await.unwrap();
        chain.add_block(vec![tx("b")]).await.unwrap();
        engine.sync().await.unwrap();
        assert_eq!(engine.tip().height, 2);

        let stale = ChainEntry {
            height: 1,
            hash: Hash256::digest(b"stale"),
            prev_hash: Network::Regtest.genesis_hash(),
            time: 0,
        };
        let block = Block {
            hash: stale.hash,
            prev_hash: stale.prev_hash,
            time: 0,
            txs: vec![tx("c")],
        };
        engine
            .index_block(&stale, &block, &CoinView::new())
            .await
            .unwrap();
        assert_eq!(engine.tip().height, 2);
        assert!(!engine.reader().has_tx(&tx("c").hash).await.unwrap());
        engine.close().await.unwrap();
    }

    #[test]
    fn sync_range_stops_at_max_height() {
        assert_eq!(heights_after(2, 4), 3..=4);
        assert_eq!(heights_after(4, 4).count(), 0);
        assert_eq!(heights_after(u32::MAX, u32::MAX).count(), 0);
        assert_eq!(heights_after(u32::MAX - 1, u32::MAX).count(), 1);
    }

    #[tokio::test]
    async fn disconnect_of_foreign_tip_fails_engine() {
        let chain = Arc::new(MemoryChain::new(Network::Regtest));
        let engine = engine(chain.clone());
        engine.open().await.unwrap();
        let b1 = chain.add_block(vec![tx("a")]).await.unwrap();
        chain.add_block(vec![tx("b")]).await.unwrap();
        engine.sync().await.unwrap();
        let tip = engine.tip();
        assert_eq!(tip.height, 2);

        // Same height as the tip, different block.
        let other = ChainEntry {
            height: 2,
            hash: Hash256::digest(b"other"),
            prev_hash: b1.hash,
            time: 0,
        };
        let block = Block {
            hash: other.hash,
            prev_hash: other.prev_hash,
            time: 0,
            txs: vec![tx("z")],
        };
        let err = engine
            .unindex_block(&other, &block, &CoinView::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::NonTipDisconnect { height: 2, tip: 2 }));
        assert_eq!(engine.tip(), tip);
        assert!(engine.reader().has_tx(&tx("b").hash).await.unwrap());
        assert_eq!(engine.state(), IndexerState::Failed);
        engine.close().await.unwrap();
    }

    #[tokio::test]
    async fn genesis_disconnect_fails_engine() {
        let chain = Arc::new(MemoryChain::new(Network::Regtest));
        let engine = engine(chain);
        engine.open().await.unwrap();

        let genesis = Network::Regtest.genesis();
        let block = Block {
            hash: genesis.hash,
            prev_hash: genesis.prev_hash,
            time: genesis.time,
            txs: vec![],
        };
        let err = engine
            .unindex_block(&genesis, &block, &CoinView::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::GenesisDisconnect));
        assert_eq!(engine.state(), IndexerState::Failed);
        assert!(!engine.is_healthy());
        engine.close().await.unwrap();
    }
}
