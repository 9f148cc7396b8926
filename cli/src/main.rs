//! txindex CLI: inspect index stores and exercise the engine.
//!
//! Usage:
//! ```bash
//! txindex info
//! txindex status --location ./data --network testnet
//! txindex lookup --location ./data --tx <hash>
//! txindex lookup --location ./data --address <hex>
//! txindex demo   --blocks 20
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use txindex_core::client::ClientRegistry;
use txindex_core::indexer::{IndexKind, IndexerConfig, DEFAULT_CACHE_SIZE, DEFAULT_MAX_FILES};
use txindex_core::memory_chain::MemoryChain;
use txindex_core::meta::TxMeta;
use txindex_core::network::Network;
use txindex_core::store::KvStore;
use txindex_core::types::{AddressHash, Hash256, OutPoint, Transaction, TxInput, TxOutput};
use txindex_engine::{IndexReader, IndexerBuilder, INDEX_VERSION};
use txindex_storage::{SledStore, StoreOptions};

#[derive(Parser)]
#[command(
    name = "txindex",
    about = "Reorg-safe transaction and address index (txindex CLI)",
    version
)]
struct Cli {
    /// Log filter (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit JSON structured logs
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show defaults and registered chain clients
    Info,

    /// Print the tip and flags of an on-disk index
    Status {
        /// Base directory (the store lives in <location>/<network>/index)
        #[arg(short, long)]
        location: PathBuf,
        #[arg(short, long, default_value = "main")]
        network: Network,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Look up a transaction by hash or the history of an address
    Lookup {
        #[arg(short, long)]
        location: PathBuf,
        #[arg(short, long, default_value = "main")]
        network: Network,
        /// Transaction hash (hex)
        #[arg(long, conflicts_with = "address")]
        tx: Option<String>,
        /// Address hash (hex)
        #[arg(long)]
        address: Option<String>,
    },

    /// Run an engine against an in-memory chain, including a reorg
    Demo {
        /// Blocks to mine before the reorg
        #[arg(short, long, default_value_t = 10)]
        blocks: u32,
        /// Blocks replaced by the reorg
        #[arg(long, default_value_t = 2)]
        depth: u32,
    },
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    match cli.command {
        Commands::Info => cmd_info(),
        Commands::Status {
            location,
            network,
            json,
        } => cmd_status(&location, network, json).await,
        Commands::Lookup {
            location,
            network,
            tx,
            address,
        } => cmd_lookup(&location, network, tx, address).await,
        Commands::Demo { blocks, depth } => cmd_demo(blocks, depth).await,
    }
}

fn cmd_info() -> Result<()> {
    println!("txindex v{}", env!("CARGO_PKG_VERSION"));
    println!("  Schema version: {INDEX_VERSION}");
    println!("  Default network: {}", Network::default());
    println!(
        "  Networks: {}",
        Network::ALL.map(|n| n.name()).join(", ")
    );
    println!("  Default indexers: tx (address optional)");
    println!("  Default max files: {DEFAULT_MAX_FILES}");
    println!("  Default cache size: {} MiB", DEFAULT_CACHE_SIZE >> 20);
    println!("  Storage backends: memory, sled");
    println!(
        "  Chain clients: {}",
        ClientRegistry::with_defaults().names().join(", ")
    );
    Ok(())
}

/// Open the on-disk store for `network` under `location` without an engine.
async fn open_reader(location: &Path, network: Network) -> Result<(Arc<SledStore>, IndexReader)> {
    let config = IndexerConfig {
        network,
        location: Some(location.to_path_buf()),
        memory: false,
        ..Default::default()
    };
    let options = StoreOptions::from_config(&config);
    let path = options.path.clone().context("store path")?;
    if !path.exists() {
        bail!("no index at {}", path.display());
    }

    let store = Arc::new(SledStore::new(options)?);
    store.open().await?;
    let reader = IndexReader::from_store(store.clone()).await?;
    Ok((store, reader))
}

async fn cmd_status(location: &Path, network: Network, json: bool) -> Result<()> {
    let (store, reader) = open_reader(location, network).await?;
    let tip = reader.tip();
    let flags = reader.flags().await?;
    let size = store.size_on_disk().await?;
    store.close().await?;

    if json {
        let out = serde_json::json!({
            "network": network.name(),
            "tip": { "height": tip.height, "hash": tip.hash.to_string() },
            "tx_index": flags.map(|f| f.tx),
            "address_index": flags.map(|f| f.address),
            "size_on_disk": size,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Index at {}", location.display());
    println!("  Network: {network}");
    println!("  Tip:     {} (height {})", tip.hash, tip.height);
    match flags {
        Some(f) => {
            if Network::from_magic(f.magic) != Some(network) {
                println!("  WARNING: store magic {:#010x} does not match {network}", f.magic);
            }
            println!("  Indexes: tx={} address={}", f.tx, f.address);
        }
        None => println!("  Indexes: (never opened)"),
    }
    if let Some(bytes) = size {
        println!("  Size:    {bytes} bytes");
    }
    Ok(())
}

async fn cmd_lookup(
    location: &Path,
    network: Network,
    tx: Option<String>,
    address: Option<String>,
) -> Result<()> {
    let (store, reader) = open_reader(location, network).await?;

    let metas = match (tx, address) {
        (Some(hash), _) => {
            let hash = Hash256::from_hex(&hash)?;
            reader.get_meta(&hash).await?.into_iter().collect()
        }
        (None, Some(addr)) => {
            let addr = AddressHash::from_hex(&addr)?;
            let coins = reader.get_coins_by_address(&[addr.clone()]).await?;
            let balance: u64 = coins.iter().map(|c| c.value).sum();
            println!("Unspent: {} coins, {balance} total", coins.len());
            reader.get_meta_by_address(&[addr]).await?
        }
        (None, None) => bail!("pass --tx or --address"),
    };
    store.close().await?;

    if metas.is_empty() {
        println!("Not found");
    }
    for meta in &metas {
        print_meta(meta);
    }
    Ok(())
}

fn print_meta(meta: &TxMeta) {
    let time = chrono::DateTime::from_timestamp(meta.block_time, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| meta.block_time.to_string());
    println!("{}", meta.hash());
    println!("  Block:   {} (height {}, index {})", meta.block_hash, meta.height, meta.index);
    println!("  Time:    {time}");
    println!(
        "  Inputs:  {}  Outputs: {}  Size: {} bytes",
        meta.tx.inputs.len(),
        meta.tx.outputs.len(),
        meta.tx.raw.len()
    );
}

async fn cmd_demo(blocks: u32, depth: u32) -> Result<()> {
    if depth == 0 || depth > blocks {
        bail!("--depth must be in 1..={blocks}");
    }

    let chain = Arc::new(MemoryChain::new(Network::Regtest));
    let engine = IndexerBuilder::new()
        .network(Network::Regtest)
        .indexers(&[IndexKind::Tx, IndexKind::Address])
        .client(chain.clone())
        .build()?;
    engine.open().await?;

    let addrs: Vec<AddressHash> = (1..=3u8)
        .map(|b| AddressHash::new(vec![b; 20]))
        .collect::<Result<_, _>>()?;

    // Each block pays a coinbase and spends the previous block's coinbase.
    let mut prev: Option<Transaction> = None;
    for height in 1..=blocks {
        let to = &addrs[height as usize % addrs.len()];
        let cb = demo_tx(format!("coinbase {height}"), OutPoint::NULL, to, 50);
        let mut txs = vec![cb.clone()];
        if let Some(p) = prev.take() {
            let next = &addrs[(height as usize + 1) % addrs.len()];
            txs.push(demo_tx(format!("spend {height}"), OutPoint::new(p.hash, 0), next, 49));
        }
        chain.add_block(txs).await?;
        prev = Some(cb);
    }
    wait_for_tip(&engine, chain.tip().await.hash).await?;
    info!(height = engine.tip().height, "Demo chain indexed");
    println!("Indexed {} blocks, tip {}", blocks, engine.tip());

    let fork = blocks - depth;
    let branch = (0..=depth)
        .map(|i| vec![demo_tx(format!("reorg {i}"), OutPoint::NULL, &addrs[0], 50)])
        .collect();
    chain.reorganize(fork, branch).await?;
    wait_for_tip(&engine, chain.tip().await.hash).await?;
    println!(
        "Reorganized {depth} blocks at height {fork}, tip {}",
        engine.tip()
    );

    let reader = engine.reader();
    for addr in &addrs {
        let txs = reader.get_hashes_by_address(&[addr.clone()]).await?;
        let coins = reader.get_coins_by_address(&[addr.clone()]).await?;
        let balance: u64 = coins.iter().map(|c| c.value).sum();
        println!(
            "  {}: {} txs, {} coins, balance {balance}",
            addr,
            txs.len(),
            coins.len()
        );
    }

    engine.close().await?;
    Ok(())
}

fn demo_tx(tag: String, prevout: OutPoint, to: &AddressHash, value: u64) -> Transaction {
    Transaction::new(
        tag.into_bytes(),
        vec![TxInput { prevout }],
        vec![TxOutput {
            value,
            address: Some(to.clone()),
        }],
    )
}

async fn wait_for_tip(engine: &txindex_engine::IndexEngine, hash: Hash256) -> Result<()> {
    let mut rx = engine.subscribe_tip();
    tokio::time::timeout(Duration::from_secs(30), rx.wait_for(|tip| tip.hash == hash))
        .await
        .context("timed out waiting for the index to catch up")??;
    Ok(())
}
