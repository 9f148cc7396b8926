//! Chain client contract: the narrow surface the engine needs from a chain source.
//!
//! A client answers point queries about its best chain and publishes
//! [`ChainEvent`]s on a broadcast channel. The engine subscribes before
//! opening the client so it never misses the initial `Connect`.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::IndexerError;
use crate::memory_chain::MemoryChain;
use crate::meta::BlockMeta;
use crate::network::Network;
use crate::null_client::NullClient;
use crate::types::{AddressHash, Block, BlockId, ChainEntry, CoinView, Hash256};

/// Default capacity of a client's event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 1_024;

/// Notifications published by a chain client.
#[derive(Debug, Clone)]
pub enum ChainEvent {
    /// The client opened and is ready to answer queries.
    Connect,
    /// The client closed.
    Disconnect,
    /// A block was attached to the best chain.
    BlockConnect {
        entry: ChainEntry,
        block: Arc<Block>,
        view: Arc<CoinView>,
    },
    /// The best-chain tip was detached (reorg or invalidation).
    BlockDisconnect {
        entry: ChainEntry,
        block: Arc<Block>,
        view: Arc<CoinView>,
    },
    /// A historical block replayed by [`ChainClient::rescan`].
    BlockRescan {
        entry: ChainEntry,
        block: Arc<Block>,
        view: Arc<CoinView>,
    },
    /// The chain was reset to `tip`; everything above it is gone.
    ChainReset { tip: ChainEntry },
    /// The client hit an error it could not attribute to a query.
    Error(IndexerError),
}

impl ChainEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::BlockConnect { .. } => "block connect",
            Self::BlockDisconnect { .. } => "block disconnect",
            Self::BlockRescan { .. } => "block rescan",
            Self::ChainReset { .. } => "chain reset",
            Self::Error(_) => "error",
        }
    }
}

/// Address hashes the index is interested in, pushed to the client on connect
/// so filtering sources can narrow what they relay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchFilter {
    addresses: HashSet<AddressHash>,
}

impl WatchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the address was not already watched.
    pub fn add(&mut self, addr: AddressHash) -> bool {
        self.addresses.insert(addr)
    }

    pub fn contains(&self, addr: &AddressHash) -> bool {
        self.addresses.contains(addr)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

/// Anything that produces blocks: a local node, a remote node, or a test chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Short name used in logs (e.g. `"memory"`).
    fn name(&self) -> &str;

    /// Fails with [`IndexerError::ClientAlreadyOpen`] if already open.
    /// Publishes [`ChainEvent::Connect`] on success.
    async fn open(&self) -> Result<(), IndexerError>;

    /// Fails with [`IndexerError::ClientNotOpen`] if not open.
    /// Publishes [`ChainEvent::Disconnect`] on success.
    async fn close(&self) -> Result<(), IndexerError>;

    fn is_open(&self) -> bool;

    /// Subscribe to the client's notifications.
    fn subscribe(&self) -> broadcast::Receiver<ChainEvent>;

    async fn get_tip(&self) -> Result<BlockMeta, IndexerError>;

    /// Look up an entry. Returns `None` for unknown ids **and** for entries
    /// that exist but are not on the current best chain.
    async fn get_entry(&self, id: BlockId) -> Result<Option<ChainEntry>, IndexerError>;

    /// Look up any block the source knows about, stale ones included.
    async fn get_block(&self, hash: &Hash256) -> Result<Option<Block>, IndexerError>;

    /// The best-chain successor of `entry`.
    async fn get_next(&self, entry: &ChainEntry) -> Result<Option<ChainEntry>, IndexerError>;

    /// The parent of `entry`, whether or not `entry` is still on the best chain.
    async fn get_previous(&self, entry: &ChainEntry)
        -> Result<Option<ChainEntry>, IndexerError>;

    /// Best-chain hashes for heights `start..=end` (defaults: genesis and tip).
    async fn get_hashes(
        &self,
        start: Option<u32>,
        end: Option<u32>,
    ) -> Result<Vec<Hash256>, IndexerError>;

    /// The coins spent by `block`'s inputs, as far as the source knows them.
    async fn get_block_view(&self, _block: &Block) -> Result<CoinView, IndexerError> {
        Ok(CoinView::new())
    }

    /// Receive the index's current watch filter.
    async fn set_filter(&self, _filter: &WatchFilter) -> Result<(), IndexerError> {
        Ok(())
    }

    /// Replay best-chain blocks from `start` to the tip as [`ChainEvent::BlockRescan`].
    async fn rescan(&self, start: u32) -> Result<(), IndexerError>;
}

/// Builds a client for a network.
pub type ClientFactory = Arc<dyn Fn(Network) -> Arc<dyn ChainClient> + Send + Sync>;

/// Named chain client implementations, resolved at construction time.
pub struct ClientRegistry {
    factories: BTreeMap<String, ClientFactory>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// A registry with the built-in `null` and `memory` clients.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("null", |network| Arc::new(NullClient::new(network)));
        registry.register("memory", |network| Arc::new(MemoryChain::new(network)));
        registry
    }

    /// Register (or replace) a named client factory.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(Network) -> Arc<dyn ChainClient> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn create(
        &self,
        name: &str,
        network: Network,
    ) -> Result<Arc<dyn ChainClient>, IndexerError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| IndexerError::Client(format!("no chain client named '{name}'")))?;
        Ok(factory(network))
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_defaults() {
        let registry = ClientRegistry::with_defaults();
        assert_eq!(registry.names(), vec!["memory", "null"]);

        let client = registry.create("null", Network::Regtest).unwrap();
        assert_eq!(client.name(), "null");
        assert!(!client.is_open());
        assert!(registry.create("electrum", Network::Main).is_err());
    }

    #[test]
    fn registry_custom_factory() {
        let mut registry = ClientRegistry::new();
        registry.register("mine", |network| Arc::new(MemoryChain::new(network)));
        let client = registry.create("mine", Network::Simnet).unwrap();
        assert_eq!(client.name(), "memory");
    }

    #[test]
    fn watch_filter_dedupes() {
        let mut filter = WatchFilter::new();
        let addr = AddressHash::new(vec![3u8; 20]).unwrap();
        assert!(filter.add(addr.clone()));
        assert!(!filter.add(addr.clone()));
        assert!(filter.contains(&addr));
        assert_eq!(filter.len(), 1);
    }
}
