//! DriftCoin Core Types and Data Structures
//!
//! This crate defines the fundamental data structures shared by the rest of
//! the workspace: blocks, transactions, outpoints, the UTXO set, and the
//! chain-tip snapshot that the staking engine reads to build new blocks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

pub mod block;
pub mod transaction;
pub mod utxo;

pub use block::{Block, BlockHeader, BlockValidationError};
pub use transaction::{Transaction, TransactionInput, TransactionOutput, TransactionValidationError};
pub use utxo::{Coin, UTXOEntry, UTXOError, UTXOSet};

/// Hash type used throughout the system
pub type Hash = [u8; 32];

/// Address type (public key hash)
pub type Address = [u8; 20];

/// The running stake-modifier accumulator, re-derived each time a stake
/// kernel is accepted and chained into the next one.
pub type StakeModifier = [u8; 32];

/// A reference to a transaction output: the producing transaction's hash
/// and the index of the output within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: Hash,
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: Hash, vout: u32) -> Self {
        OutPoint { txid, vout }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", hex::encode(&self.txid[0..4]), self.vout)
    }
}

/// Network types supported by DriftCoin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Network {
    /// Main production network
    Mainnet,
    /// Test network for development
    Testnet,
    /// Local regression testing
    Regtest,
}

impl Default for Network {
    fn default() -> Self {
        Network::Mainnet
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet => write!(f, "testnet"),
            Network::Regtest => write!(f, "regtest"),
        }
    }
}

/// A minimal snapshot of the current chain tip, as handed to the staking
/// engine by whatever owns chain state. Everything the block-production
/// path needs to build the next block lives here; it never reaches back
/// into a full chain index itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainTipSnapshot {
    /// Height of the tip block.
    pub height: u64,
    /// Hash of the tip block (becomes `prev_block_hash` of the next block).
    pub tip_hash: Hash,
    /// The tip block's own `prev_block_hash`. Used to detect a sibling-tip
    /// race: a new tip sharing this value with a job's `prev_block_hash`
    /// was mined on top of the same parent the job is chasing.
    pub parent_hash: Hash,
    /// Timestamp of the tip block.
    pub tip_timestamp: u32,
    /// Compact difficulty target a block built on this tip must meet.
    pub bits: u32,
    /// Stake modifier accumulated as of this tip.
    pub stake_modifier: StakeModifier,
}

/// Core error types
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Block validation error: {0}")]
    BlockValidation(#[from] BlockValidationError),

    #[error("Transaction validation error: {0}")]
    TransactionValidation(#[from] TransactionValidationError),

    #[error("UTXO error: {0}")]
    UTXO(#[from] UTXOError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Chain state error: {0}")]
    ChainState(String),
}

/// Get current timestamp in seconds
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_secs()
}
