//! txindex-core: foundation for the reorg-safe transaction index engine.
//!
//! # Architecture
//!
//! ```text
//! ChainClient ──ChainEvent──▶ IndexEngine (txindex-engine)
//!   ├── NullClient                ├── layout   (key schema: V O h t T C)
//!   └── MemoryChain               ├── meta     (BlockMeta, TxMeta, IndexFlags)
//!                                 ├── KvStore  (memory / sled, txindex-storage)
//!                                 └── HandlerRegistry (error/block/reset observers)
//! ```

pub mod client;
pub mod error;
pub mod handler;
pub mod indexer;
pub mod layout;
pub mod memory_chain;
pub mod meta;
pub mod network;
pub mod null_client;
pub mod store;
pub mod types;

pub use client::{ChainClient, ChainEvent, ClientRegistry, WatchFilter};
pub use error::IndexerError;
pub use handler::{BlockAction, BlockHandler, ErrorHandler, HandlerRegistry, ResetHandler};
pub use indexer::{ConfigError, IndexKind, IndexerConfig, IndexerState};
pub use layout::IndexKey;
pub use memory_chain::MemoryChain;
pub use meta::{BlockMeta, IndexFlags, TxMeta};
pub use network::Network;
pub use null_client::NullClient;
pub use store::{BatchOp, KvStore, WriteBatch};
pub use types::{
    AddressHash, Block, BlockId, ChainEntry, Coin, CoinView, Hash256, OutPoint, Transaction,
    TxInput, TxOutput,
};
