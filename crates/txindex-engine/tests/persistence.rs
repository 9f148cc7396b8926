//! On-disk stores: the tip and records survive a restart, and a store refuses
//! to open for another network or index set.

mod common;

use std::sync::Arc;

use common::*;
use txindex_core::client::ChainClient;
use txindex_core::error::IndexerError;
use txindex_core::indexer::{IndexKind, IndexerState};
use txindex_core::network::Network;
use txindex_core::store::KvStore;
use txindex_engine::{IndexReader, IndexerBuilder};
use txindex_storage::{MemoryStore, SledStore, StoreOptions};

#[tokio::test]
async fn tip_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let chain = chain();
    let (a, b, c) = (tx("a"), tx("b"), tx("c"));

    let engine = IndexerBuilder::new()
        .network(NETWORK)
        .location(dir.path())
        .client(chain.clone())
        .build()
        .unwrap();
    open(&engine).await;
    chain.add_block(vec![a.clone()]).await.unwrap();
    chain.add_block(vec![b.clone()]).await.unwrap();
    let b3 = chain.add_block(vec![c.clone()]).await.unwrap();
    wait_for_tip(&engine, b3.hash).await;
    engine.close().await.unwrap();
    drop(engine);

    // A reader over the closed store sees exactly what was committed.
    let path = dir.path().join("regtest").join("index");
    let store = Arc::new(SledStore::new(StoreOptions::at(&path)).unwrap());
    store.open().await.unwrap();
    let reader = IndexReader::from_store(store.clone()).await.unwrap();
    assert_eq!(reader.tip(), b3.meta());
    assert!(reader.has_tx(&b.hash).await.unwrap());
    let flags = reader.flags().await.unwrap().unwrap();
    assert_eq!(flags.magic, NETWORK.magic());
    assert!(flags.tx && !flags.address);
    store.close().await.unwrap();

    let engine = IndexerBuilder::new()
        .network(NETWORK)
        .location(dir.path())
        .client(chain.clone())
        .build()
        .unwrap();
    open(&engine).await;
    assert_eq!(engine.tip(), b3.meta());
    assert_eq!(engine.reader().get_meta(&a.hash).await.unwrap().unwrap().height, 1);
    engine.close().await.unwrap();
}

#[tokio::test]
async fn network_mismatch_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index");
    let chain = chain();

    let store = Arc::new(SledStore::new(StoreOptions::at(&path)).unwrap());
    let engine = engine_with(&chain, store, &[IndexKind::Tx]);
    open(&engine).await;
    engine.close().await.unwrap();
    drop(engine);

    let store = Arc::new(SledStore::new(StoreOptions::at(&path)).unwrap());
    let engine = IndexerBuilder::new()
        .network(Network::Testnet)
        .client(chain.clone())
        .store(store)
        .build()
        .unwrap();
    let err = engine.open().await.unwrap_err();
    assert!(matches!(
        err,
        IndexerError::NetworkMismatch { expected, found }
            if expected == Network::Testnet.magic() && found == NETWORK.magic()
    ));
    assert_eq!(engine.state(), IndexerState::Failed);
    assert!(!engine.is_healthy());
    assert!(!chain.is_open());

    engine.close().await.unwrap();
    assert_eq!(engine.state(), IndexerState::Closed);
}

#[tokio::test]
async fn indexer_set_mismatch_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index");
    let chain = chain();

    let store = Arc::new(SledStore::new(StoreOptions::at(&path)).unwrap());
    let engine = engine_with(&chain, store, &[IndexKind::Tx]);
    open(&engine).await;
    engine.close().await.unwrap();
    drop(engine);

    let store = Arc::new(SledStore::new(StoreOptions::at(&path)).unwrap());
    let engine = engine_with(&chain, store, &[IndexKind::Tx, IndexKind::Address]);
    assert!(matches!(
        engine.open().await,
        Err(IndexerError::FlagsMismatch { .. })
    ));
}

#[tokio::test]
async fn version_mismatch_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index");

    let store = SledStore::new(StoreOptions::at(&path)).unwrap();
    store.open().await.unwrap();
    store.verify(b"V", "index", 1).await.unwrap();
    store.close().await.unwrap();
    drop(store);

    let chain = chain();
    let store = Arc::new(SledStore::new(StoreOptions::at(&path)).unwrap());
    let engine = engine_with(&chain, store, &[IndexKind::Tx]);
    assert!(matches!(
        engine.open().await,
        Err(IndexerError::VersionMismatch { found: 1, .. })
    ));
    assert_eq!(engine.state(), IndexerState::Failed);
}

#[tokio::test]
async fn offline_client_fails_on_indexed_store() {
    let chain = chain();
    let store = Arc::new(MemoryStore::new());
    let engine = engine_with(&chain, store.clone(), &[IndexKind::Tx]);
    open(&engine).await;
    let a = tx("a");
    chain.add_block(vec![a.clone()]).await.unwrap();
    let b2 = chain.add_block(vec![tx("b")]).await.unwrap();
    wait_for_tip(&engine, b2.hash).await;
    engine.close().await.unwrap();

    // No client given: the offline one knows only genesis.
    let engine = IndexerBuilder::new()
        .network(NETWORK)
        .store(store.clone())
        .build()
        .unwrap();
    engine.open().await.unwrap();
    wait_for_state(&engine, IndexerState::Failed).await;
    assert_eq!(engine.tip(), b2.meta());
    assert!(engine.reader().has_tx(&a.hash).await.unwrap());
    engine.close().await.unwrap();

    let reader = IndexReader::from_store(store).await.unwrap();
    assert_eq!(reader.tip(), b2.meta());
    assert!(reader.has_tx(&a.hash).await.unwrap());
}
