//! Tri-channel ledger node
//!
//! Opens the chain database, replays any block files waiting in the import
//! directory and logs best-chain announcements until Ctrl-C.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use trichain_core::chain::{ChainStore, Context, Hooks};
use trichain_core::config::{ChainConfig, ConfigError};
use trichain_core::consensus::SourceBlock;
use trichain_core::constants::CHAIN_NAME;
use trichain_core::node::{create_genesis_block, BroadcastRelay, GenesisInfo};
use trichain_core::storage::{KeyValueStore, SledStore};

const DEFAULT_CONFIG: &str = "trichain.json";
const RELAY_CAPACITY: usize = 256;
const IMPORT_QUEUE: usize = 16;

type Chain = ChainStore<SledStore>;

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

fn load_config(path: &Path) -> Result<ChainConfig, ConfigError> {
    if path.exists() {
        ChainConfig::load(path)
    } else {
        Ok(ChainConfig::default())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = load_config(&config_path)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║               {CHAIN_NAME} TRI-CHANNEL LEDGER NODE                ║");
    println!("║            Stake · Prime · Hash                          ║");
    println!("╚══════════════════════════════════════════════════════════╝");

    config.ensure_directories()?;

    let genesis = GenesisInfo::new();
    info!(
        hash = %genesis.hash,
        merkle_root = %genesis.merkle_root,
        timestamp = genesis.timestamp,
        channel = %genesis.channel,
        "genesis block"
    );

    let (relay, mut announcements) = BroadcastRelay::new(RELAY_CAPACITY);
    let hooks = Hooks::new(&config).with_relay(Arc::new(relay));
    let store = SledStore::open(config.data_dir.join("chain"))?;
    let chain: Arc<Chain> = Arc::new(ChainStore::open_with_genesis(
        store,
        Context::with_hooks(config.clone(), hooks),
        create_genesis_block(),
    )?);

    let best = chain.best()?;
    info!(hash = %best.hash, height = best.height, trust = best.trust, "chain ready");

    tokio::spawn(async move {
        loop {
            match announcements.recv().await {
                Ok(announcement) => info!(
                    hash = %announcement.hash,
                    height = announcement.height,
                    trust = announcement.trust,
                    "relay best block"
                ),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "relay listener lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    if let Some(dir) = config.import_dir.clone() {
        spawn_import(chain.clone(), dir);
    }

    info!("press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, stopping node");

    chain.store().flush()?;
    Ok(())
}

/// Feed every block file in `dir`, in file name order, through the chain
fn spawn_import(chain: Arc<Chain>, dir: PathBuf) {
    let (sender, mut receiver) = mpsc::channel::<(PathBuf, SourceBlock)>(IMPORT_QUEUE);
    tokio::task::spawn_blocking(move || read_blocks(&dir, sender));

    tokio::spawn(async move {
        chain.set_synchronizing(true);
        let mut imported = 0usize;

        while let Some((path, block)) = receiver.recv().await {
            let worker = chain.clone();
            match tokio::task::spawn_blocking(move || worker.process(block, unix_now())).await {
                Ok(Ok(status)) => {
                    imported += 1;
                    info!(path = %path.display(), ?status, "imported block");
                }
                Ok(Err(e)) => error!(path = %path.display(), error = %e, "import failed"),
                Err(e) => error!(path = %path.display(), error = %e, "import worker panicked"),
            }
        }

        chain.set_synchronizing(false);
        match chain.best() {
            Ok(best) => info!(imported, hash = %best.hash, height = best.height, "import finished"),
            Err(e) => error!(error = %e, "best chain unavailable after import"),
        }
    });
}

fn read_blocks(dir: &Path, sender: mpsc::Sender<(PathBuf, SourceBlock)>) {
    let mut paths: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.is_file())
            .collect(),
        Err(e) => {
            error!(dir = %dir.display(), error = %e, "cannot read import directory");
            return;
        }
    };
    paths.sort();

    for path in paths {
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable block file");
                continue;
            }
        };
        let block: SourceBlock = match bincode::deserialize(&bytes) {
            Ok(block) => block,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping malformed block file");
                continue;
            }
        };
        if sender.blocking_send((path, block)).is_err() {
            break;
        }
    }
}
