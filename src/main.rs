//! DriftCoin Node - Main Entry Point
//!
//! This file serves as the entry point for the DriftCoin node. It parses
//! command-line arguments, wires the storage, network, staking, and RPC
//! crates together, and starts the node's services.

use clap::{Parser, Subcommand};
use log::{error, info, warn};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use driftcoin_consensus::ConsensusParams;
use driftcoin_core::{ChainTipSnapshot, Coin, Network, Transaction};
use driftcoin_crypto::Address;
use driftcoin_staking::{
    BlockTemplate, ChainView, StakerSupervisor, StakingError, StakingHandle, SystemClock,
    TemplateBuilder, WalletView,
};
use driftcoin_storage::{create_block_store, BlockStore, StorageConfig};

mod node;

use node::StoreChainView;

/// Command line arguments for the DriftCoin node
#[derive(Parser)]
#[clap(name = "driftcoin")]
#[clap(about = "DriftCoin - a Bitcoin-derived proof-of-stake cryptocurrency node")]
struct Cli {
    /// Sets a custom config file
    #[clap(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Network to connect to (mainnet, testnet, regtest)
    #[clap(long, default_value = "mainnet")]
    network: String,

    /// Enable proof-of-stake block production
    #[clap(long)]
    stake: bool,

    /// Address whose coins are eligible as stake and that receives the
    /// block reward
    #[clap(long)]
    staking_address: Option<String>,

    /// Enable the legacy CPU proof-of-work path alongside or instead of
    /// staking
    #[clap(long)]
    pow: bool,

    /// Number of nonce-search worker threads (PoW path only)
    #[clap(long, default_value = "1")]
    threads: usize,

    /// Enable the JSON-RPC server
    #[clap(long, default_value = "true")]
    rpc: bool,

    /// JSON-RPC bind address
    #[clap(long, default_value = "127.0.0.1:8332")]
    rpc_bind: String,

    /// Data directory. Empty means in-memory storage (regtest/tests).
    #[clap(long, value_name = "DIR")]
    datadir: Option<PathBuf>,

    /// Verbosity level (0-5)
    #[clap(short, long, default_value = "3")]
    verbosity: u8,

    /// Subcommands
    #[clap(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new blockchain with the network's genesis block
    Init {
        /// Force initialization even if data directory exists
        #[clap(long)]
        force: bool,
    },
    /// Import blocks from file
    Import {
        /// Path to blocks file
        #[clap(value_name = "FILE")]
        file: PathBuf,
    },
    /// Export blocks to file
    Export {
        /// Path to output file
        #[clap(value_name = "FILE")]
        file: PathBuf,
        /// Start block height
        #[clap(long, default_value = "0")]
        start: u64,
        /// End block height (inclusive)
        #[clap(long)]
        end: Option<u64>,
    },
}

/// Initialize logging based on verbosity level
fn init_logging(verbosity: u8) {
    let log_level = match verbosity {
        0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Warn,
        2 => log::LevelFilter::Info,
        3 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp_millis()
        .init();
}

fn parse_network(name: &str) -> Network {
    match name {
        "testnet" => Network::Testnet,
        "regtest" => Network::Regtest,
        _ => Network::Mainnet,
    }
}

fn consensus_params_for(network: Network) -> ConsensusParams {
    match network {
        Network::Mainnet => ConsensusParams::mainnet(),
        Network::Testnet => ConsensusParams::testnet(),
        Network::Regtest => ConsensusParams::regtest(),
    }
}

/// A coinbase-and-mempool template builder. Fees are ignored (no mempool
/// fee market is modeled); every pending transaction is included in
/// arrival order.
struct SimpleTemplateBuilder {
    version: u32,
}

impl TemplateBuilder for SimpleTemplateBuilder {
    fn build(&self, tip: &ChainTipSnapshot, mempool: &[Transaction], reward_address: [u8; 20]) -> BlockTemplate {
        let height = tip.height + 1;
        let coinbase = Transaction::coinbase(height, 50_000_000_000, &reward_address, 0);
        let mut txs = vec![coinbase];
        txs.extend_from_slice(mempool);
        BlockTemplate::new(1, height, tip.tip_hash, tip.bits, txs)
    }
}

/// Wallet backed by a single keypair, whose coins in the node's UTXO set
/// are offered up as stake candidates.
struct SingleKeyWallet {
    address: [u8; 20],
    secret_key: Option<[u8; 32]>,
    block_store: Arc<dyn BlockStore>,
}

#[async_trait]
impl WalletView for SingleKeyWallet {
    async fn stake_candidates(&self, tip_height: u64, min_confirmations: u64) -> Vec<Coin> {
        match self.block_store.get_utxo_set().await {
            Ok(utxos) => utxos.stake_candidates(&self.address, tip_height, min_confirmations),
            Err(e) => {
                warn!("failed to read UTXO set for stake candidates: {e}");
                Vec::new()
            }
        }
    }

    fn staking_address(&self) -> [u8; 20] {
        self.address
    }

    fn secret_key_for(&self, _coin: &Coin) -> Option<[u8; 32]> {
        self.secret_key
    }
}

fn parse_address(address: &str) -> Result<[u8; 20], String> {
    let decoded = Address::from_base58(address).map_err(|e| format!("{e}"))?;
    let bytes = decoded.as_bytes();
    if bytes.len() != 20 {
        return Err(format!("invalid address length: {}", bytes.len()));
    }
    let mut out = [0u8; 20];
    out.copy_from_slice(bytes);
    Ok(out)
}

async fn run_node(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let network = parse_network(&cli.network);
    let params = consensus_params_for(network);

    let storage_config = StorageConfig {
        data_dir: cli
            .datadir
            .map(|d| d.to_string_lossy().into_owned())
            .unwrap_or_default(),
        ..StorageConfig::default()
    };
    let block_store = create_block_store(&storage_config).await?;

    let chain_view = Arc::new(StoreChainView::new(block_store.clone()));

    let reward_address = match &cli.staking_address {
        Some(addr) => parse_address(addr).map_err(|e| -> Box<dyn std::error::Error> {
            error!("invalid staking address: {e}");
            e.into()
        })?,
        None => [0; 20],
    };

    let wallet = Arc::new(SingleKeyWallet {
        address: reward_address,
        secret_key: None,
        block_store: block_store.clone(),
    });

    let template_builder = Arc::new(SimpleTemplateBuilder { version: 1 });

    let supervisor = Arc::new(StakerSupervisor::new(
        chain_view,
        wallet,
        SystemClock,
        template_builder,
        params,
        cli.pow,
        cli.stake,
    ));

    let staking_handle: Option<Arc<dyn StakingHandle>> = if cli.pow || cli.stake {
        let handle: Arc<dyn StakingHandle> = Arc::new(supervisor.clone());
        handle.start().await?;
        Some(handle)
    } else {
        None
    };

    if cli.rpc {
        info!("JSON-RPC server would listen on {}", cli.rpc_bind);
        // Wiring a full NetworkService into RpcContext requires a running
        // network layer, which this node does not start by default; the
        // RPC crate's router (driftcoin_rpc::RpcServer) is ready to accept
        // a context built from `block_store` and `staking_handle` once one
        // is available.
        let _ = staking_handle;
    }

    info!("DriftCoin node started on {network}");
    loop {
        tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbosity);

    info!("Starting DriftCoin node");

    if let Some(cmd) = cli.command {
        match cmd {
            Commands::Init { force } => {
                info!("Initializing blockchain (force: {})", force);
                // TODO: write the genesis block to the configured data directory
            }
            Commands::Import { file } => {
                info!("Importing blocks from {}", file.display());
                // TODO: import blocks
            }
            Commands::Export { file, start, end } => {
                info!(
                    "Exporting blocks from {} to {} to {}",
                    start,
                    end.map_or("end".to_string(), |e| e.to_string()),
                    file.display()
                );
                // TODO: export blocks
            }
        }
        process::exit(0);
    }

    let runtime = tokio::runtime::Runtime::new().expect("failed to start tokio runtime");
    if let Err(e) = runtime.block_on(run_node(cli)) {
        error!("node exited with error: {e}");
        process::exit(1);
    }
}
