//! Fluent builder API for creating index engines.
//!
//! # Example
//!
//! ```rust,no_run
//! use txindex_engine::IndexerBuilder;
//! use txindex_core::indexer::IndexKind;
//! use txindex_core::network::Network;
//!
//! # async fn example() -> Result<(), txindex_core::IndexerError> {
//! let engine = IndexerBuilder::new()
//!     .network(Network::Testnet)
//!     .indexers(&[IndexKind::Tx, IndexKind::Address])
//!     .location("./data")
//!     .cache_size(64 << 20)
//!     .build()?;
//! engine.open().await?;
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use txindex_core::client::{ChainClient, ClientRegistry};
use txindex_core::error::IndexerError;
use txindex_core::handler::{BlockHandler, ErrorHandler, HandlerRegistry, ResetHandler};
use txindex_core::indexer::{ConfigError, IndexKind, IndexerConfig};
use txindex_core::network::Network;
use txindex_core::null_client::NullClient;
use txindex_core::store::KvStore;
use txindex_storage::{MemoryStore, SledStore, StoreOptions};

use crate::engine::IndexEngine;

enum ClientChoice {
    Default,
    Instance(Arc<dyn ChainClient>),
    Named(String, ClientRegistry),
}

/// Fluent builder for an [`IndexEngine`].
pub struct IndexerBuilder {
    config: IndexerConfig,
    client: ClientChoice,
    store: Option<Arc<dyn KvStore>>,
    handlers: HandlerRegistry,
}

impl IndexerBuilder {
    pub fn new() -> Self {
        Self {
            config: IndexerConfig::default(),
            client: ClientChoice::Default,
            store: None,
            handlers: HandlerRegistry::new(),
        }
    }

    /// Set the chain network.
    pub fn network(mut self, network: Network) -> Self {
        self.config.network = network;
        self
    }

    /// Replace the set of maintained indexes.
    pub fn indexers(mut self, kinds: &[IndexKind]) -> Self {
        self.config.indexers = kinds.to_vec();
        self
    }

    /// Shorthand for enabling the address index on top of the tx index.
    pub fn with_address_index(mut self) -> Self {
        if !self.config.indexes(IndexKind::Address) {
            self.config.indexers.push(IndexKind::Address);
        }
        self
    }

    /// Store on disk under `<location>/<network>/index`. Turns `memory` off.
    pub fn location(mut self, location: impl Into<PathBuf>) -> Self {
        self.config.location = Some(location.into());
        self.config.memory = false;
        self
    }

    pub fn memory(mut self, memory: bool) -> Self {
        self.config.memory = memory;
        self
    }

    pub fn max_files(mut self, n: u32) -> Self {
        self.config.max_files = n;
        self
    }

    /// Store cache size in bytes.
    pub fn cache_size(mut self, bytes: u64) -> Self {
        self.config.cache_size = bytes;
        self
    }

    pub fn compression(mut self, enabled: bool) -> Self {
        self.config.compression = enabled;
        self
    }

    /// Start from an existing configuration.
    pub fn config(mut self, config: IndexerConfig) -> Self {
        self.config = config;
        self
    }

    /// Use this chain client. Defaults to a [`NullClient`].
    pub fn client(mut self, client: Arc<dyn ChainClient>) -> Self {
        self.client = ClientChoice::Instance(client);
        self
    }

    /// Resolve the chain client by name from `registry` at build time.
    pub fn client_named(mut self, name: impl Into<String>, registry: ClientRegistry) -> Self {
        self.client = ClientChoice::Named(name.into(), registry);
        self
    }

    /// Use this store instead of one derived from the configuration.
    pub fn store(mut self, store: Arc<dyn KvStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn on_error(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.handlers.on_error(handler);
        self
    }

    pub fn on_block(mut self, handler: Arc<dyn BlockHandler>) -> Self {
        self.handlers.on_block(handler);
        self
    }

    pub fn on_reset(mut self, handler: Arc<dyn ResetHandler>) -> Self {
        self.handlers.on_reset(handler);
        self
    }

    /// Build the validated `IndexerConfig`.
    pub fn build_config(&self) -> Result<IndexerConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config.clone())
    }

    /// Build the engine. Nothing touches the disk until [`IndexEngine::open`].
    pub fn build(self) -> Result<Arc<IndexEngine>, IndexerError> {
        let config = self.build_config()?;

        let store: Arc<dyn KvStore> = match self.store {
            Some(store) => store,
            None if config.memory => Arc::new(MemoryStore::new()),
            None => Arc::new(SledStore::new(StoreOptions::from_config(&config))?),
        };

        let client: Arc<dyn ChainClient> = match self.client {
            ClientChoice::Default => Arc::new(NullClient::new(config.network)),
            ClientChoice::Instance(client) => client,
            ClientChoice::Named(name, registry) => registry.create(&name, config.network)?,
        };

        Ok(Arc::new(IndexEngine::new(config, store, client, self.handlers)))
    }
}

impl Default for IndexerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use txindex_core::indexer::IndexerState;

    #[test]
    fn builder_defaults() {
        let cfg = IndexerBuilder::new().build_config().unwrap();
        assert_eq!(cfg.network, Network::Main);
        assert_eq!(cfg.indexers, vec![IndexKind::Tx]);
        assert!(cfg.memory);
        assert_eq!(cfg.max_files, 64);
        assert_eq!(cfg.cache_size, 32 << 20);
    }

    #[test]
    fn builder_custom() {
        let cfg = IndexerBuilder::new()
            .network(Network::Testnet)
            .with_address_index()
            .location("/var/lib/txindex")
            .max_files(128)
            .cache_size(8 << 20)
            .build_config()
            .unwrap();

        assert_eq!(cfg.network, Network::Testnet);
        assert!(cfg.indexes(IndexKind::Address));
        assert!(!cfg.memory);
        assert_eq!(
            cfg.store_path(),
            Some(PathBuf::from("/var/lib/txindex/testnet/index"))
        );
        assert_eq!(cfg.max_files, 128);
    }

    #[test]
    fn builder_rejects_invalid() {
        assert_eq!(
            IndexerBuilder::new().indexers(&[]).build_config(),
            Err(ConfigError::NoIndexers)
        );
        assert_eq!(
            IndexerBuilder::new().memory(false).build_config(),
            Err(ConfigError::MissingLocation)
        );
        assert!(matches!(
            IndexerBuilder::new().max_files(70_000).build_config(),
            Err(ConfigError::MaxFiles { .. })
        ));
        assert!(matches!(
            IndexerBuilder::new().cache_size(10).build(),
            Err(IndexerError::Config(ConfigError::CacheSize { .. }))
        ));
    }

    #[test]
    fn builder_resolves_named_client() {
        let engine = IndexerBuilder::new()
            .network(Network::Regtest)
            .client_named("memory", ClientRegistry::with_defaults())
            .build()
            .unwrap();
        assert_eq!(engine.client().name(), "memory");
        assert_eq!(engine.state(), IndexerState::Closed);

        assert!(IndexerBuilder::new()
            .client_named("rpc", ClientRegistry::new())
            .build()
            .is_err());
    }

    #[test]
    fn builder_defaults_to_null_client() {
        let engine = IndexerBuilder::new().build().unwrap();
        assert_eq!(engine.client().name(), "null");
    }
}
