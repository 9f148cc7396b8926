//! txindex-engine: index engine, sync/rollback protocol, read facade and builder.

pub mod builder;
pub mod engine;
pub mod facade;

pub use builder::IndexerBuilder;
pub use engine::{IndexEngine, INDEX_NAME, INDEX_VERSION};
pub use facade::IndexReader;
