//! DriftCoin Network and Synchronization Module
//!
//! This module handles all network-related functionality for DriftCoin nodes,
//! including peer discovery, connection management, block and transaction propagation,
//! and blockchain synchronization.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, error, info, trace, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio::time;

use driftcoin_core::{Block, BlockHeader, Hash, Network, Transaction};

pub mod message;
pub mod peer;
pub mod sync;

/// Re-export network types
pub use message::{Message, MessageType};
pub use peer::{Peer, PeerInfo, PeerManager};
pub use sync::{SyncManager, SyncState, SyncError};

/// Network error types
#[derive(Debug, Error)]
pub enum NetworkError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    
    /// Peer error
    #[error("Peer error: {0}")]
    Peer(String),
    
    /// Synchronization error
    #[error("Sync error: {0}")]
    Sync(#[from] sync::SyncError),
    
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),
    
    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network type (mainnet, testnet, regtest)
    pub network: Network,
    
    /// Maximum number of outbound connections
    pub max_outbound_connections: usize,
    
    /// Maximum number of inbound connections
    pub max_inbound_connections: usize,
    
    /// Listen address for incoming connections
    pub listen_addr: SocketAddr,
    
    /// DNS seeds for peer discovery
    pub dns_seeds: Vec<String>,
    
    /// Known peer addresses
    pub seed_peers: Vec<SocketAddr>,
    
    /// Connection timeout in seconds
    pub connection_timeout_sec: u64,
    
    /// Ping interval in seconds
    pub ping_interval_sec: u64,
    
    /// User agent string
    pub user_agent: String,
    
    /// Protocol version
    pub protocol_version: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            network: Network::Mainnet,
            max_outbound_connections: 8,
            max_inbound_connections: 125,
            listen_addr: "0.0.0.0:8333".parse().unwrap(),
            dns_seeds: vec![],
            seed_peers: vec![],
            connection_timeout_sec: 10,
            ping_interval_sec: 120,
            user_agent: format!("DriftCoin:0.1.0"),
            protocol_version: 1,
        }
    }
}

/// Network service that manages peer connections and message handling
pub struct NetworkService {
    /// Network configuration
    config: NetworkConfig,
    
    /// Peer manager
    peer_manager: Arc<PeerManager>,
    
    /// Synchronization manager
    sync_manager: Arc<SyncManager>,
    
    /// Channel for sending messages to the network service
    command_tx: mpsc::Sender<NetworkCommand>,
    
    /// Channel for receiving messages from the network service
    command_rx: mpsc::Receiver<NetworkCommand>,
    
    /// Channel for broadcasting new blocks
    block_tx: mpsc::Sender<Block>,
    
    /// Channel for broadcasting new transactions
    tx_tx: mpsc::Sender<Transaction>,
}

/// Commands that can be sent to the network service
#[derive(Debug)]
pub enum NetworkCommand {
    /// Connect to a peer
    Connect(SocketAddr),
    
    /// Disconnect from a peer
    Disconnect(SocketAddr),
    
    /// Broadcast a block to all peers
    BroadcastBlock(Block),
    
    /// Broadcast a transaction to all peers
    BroadcastTransaction(Transaction),
    
    /// Request synchronization with the network
    StartSync,
    
    /// Stop synchronization
    StopSync,
    
    /// Shutdown the network service
    Shutdown,
}

impl NetworkService {
    /// Create a new network service
    pub fn new(config: NetworkConfig) -> Self {
        let (command_tx, command_rx) = mpsc::channel(100);
        let (block_tx, _) = mpsc::channel(100);
        let (tx_tx, _) = mpsc::channel(1000);
        
        let peer_manager = Arc::new(PeerManager::new(config.clone()));
        let sync_manager = Arc::new(SyncManager::new(peer_manager.clone()));
        
        NetworkService {
            config,
            peer_manager,
            sync_manager,
            command_tx,
            command_rx,
            block_tx,
            tx_tx,
        }
    }
    
    /// Start the network service
    pub async fn start(&mut self) -> Result<(), NetworkError> {
        info!("Starting network service");
        
        // Start listening for incoming connections
        self.start_listener().await?;
        
        // Connect to seed peers
        self.connect_to_seeds().await?;
        
        // Start the main event loop
        self.run().await
    }
    
    /// Start listening for incoming connections
    async fn start_listener(&self) -> Result<(), NetworkError> {
        info!("Listening for incoming connections on {}", self.config.listen_addr);
        // Implementation would set up a TCP listener and accept connections
        Ok(())
    }
    
    /// Connect to seed peers
    async fn connect_to_seeds(&self) -> Result<(), NetworkError> {
        for seed in &self.config.seed_peers {
            if let Err(e) = self.peer_manager.connect(*seed).await {
                warn!("Failed to connect to seed peer {}: {}", seed, e);
            }
        }
        
        // DNS seed discovery would be implemented here
        
        Ok(())
    }
    
    /// Main event loop
    async fn run(&mut self) -> Result<(), NetworkError> {
        loop {
            tokio::select! {
                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        NetworkCommand::Connect(addr) => {
                            if let Err(e) = self.peer_manager.connect(addr).await {
                                error!("Failed to connect to {}: {}", addr, e);
                            }
                        },
                        NetworkCommand::Disconnect(addr) => {
                            self.peer_manager.disconnect(addr).await;
                        },
                        NetworkCommand::BroadcastBlock(block) => {
                            self.peer_manager.broadcast_block(&block).await;
                        },
                        NetworkCommand::BroadcastTransaction(tx) => {
                            self.peer_manager.broadcast_transaction(&tx).await;
                        },
                        NetworkCommand::StartSync => {
                            if let Err(e) = self.sync_manager.start_sync().await {
                                error!("Failed to start sync: {}", e);
                            }
                        },
                        NetworkCommand::StopSync => {
                            self.sync_manager.stop_sync().await;
                        },
                        NetworkCommand::Shutdown => {
                            info!("Shutting down network service");
                            break;
                        },
                    }
                }
                // Other event handlers would be added here
            }
        }
        
        Ok(())
    }
    
    /// Get a sender for network commands
    pub fn command_sender(&self) -> mpsc::Sender<NetworkCommand> {
        self.command_tx.clone()
    }
    
    /// Get the current sync state
    pub async fn sync_state(&self) -> SyncState {
        self.sync_manager.state().await
    }
    
    /// Get the number of connected peers
    pub async fn peer_count(&self) -> usize {
        self.peer_manager.peer_count().await
    }
    
    /// Get information about all connected peers
    pub async fn connected_peers(&self) -> Vec<PeerInfo> {
        self.peer_manager.connected_peers().await
    }
}