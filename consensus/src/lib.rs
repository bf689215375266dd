//! DriftCoin consensus rules
//!
//! This crate holds the parts of consensus that do not belong to block
//! production itself: difficulty bookkeeping and the proof-of-stake kernel
//! predicate. Validating foreign blocks (full proof-of-work/proof-of-stake
//! acceptance, reorg handling) is out of scope for this workspace — it
//! belongs to a chain/indexer component this crate does not implement.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use driftcoin_core::Network;

pub mod difficulty;
pub mod kernel;

pub use difficulty::{big_to_compact, calculate_next_difficulty, compact_to_big, get_difficulty_for_bits};
pub use kernel::{check_kernel, kernel_hash, next_stake_modifier, KernelError, STAKE_MIN_CONFIRMATIONS, STAKE_TIME_GRID_SECONDS};

/// Consensus parameters for different networks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusParams {
    /// Network type
    pub network: Network,
    /// Block time target in seconds
    pub target_block_time: u64,
    /// Blocks per difficulty adjustment
    pub difficulty_adjustment_interval: u64,
    /// Maximum block size in bytes
    pub max_block_size: usize,
    /// Minimum difficulty bits
    pub min_difficulty_bits: u32,
    /// Initial difficulty bits
    pub initial_difficulty_bits: u32,
    /// Block subsidy halving interval
    pub subsidy_halving_interval: u64,
    /// Initial block subsidy in smallest units
    pub initial_block_subsidy: u64,
    /// Confirmations a coin needs before it can be spent as stake
    pub stake_min_confirmations: u64,
}

impl ConsensusParams {
    /// Get consensus parameters for mainnet
    pub fn mainnet() -> Self {
        ConsensusParams {
            network: Network::Mainnet,
            target_block_time: 15,
            difficulty_adjustment_interval: 2016,
            max_block_size: 2_000_000,
            min_difficulty_bits: 0x1e00ffff,
            initial_difficulty_bits: 0x1e00ffff,
            subsidy_halving_interval: 2_100_000,
            initial_block_subsidy: 50_000_000_000,
            stake_min_confirmations: STAKE_MIN_CONFIRMATIONS,
        }
    }

    /// Get consensus parameters for testnet
    pub fn testnet() -> Self {
        ConsensusParams {
            network: Network::Testnet,
            target_block_time: 15,
            difficulty_adjustment_interval: 2016,
            max_block_size: 2_000_000,
            min_difficulty_bits: 0x1e00ffff,
            initial_difficulty_bits: 0x1e00ffff,
            subsidy_halving_interval: 2_100_000,
            initial_block_subsidy: 50_000_000_000,
            stake_min_confirmations: STAKE_MIN_CONFIRMATIONS,
        }
    }

    /// Get consensus parameters for regtest
    pub fn regtest() -> Self {
        ConsensusParams {
            network: Network::Regtest,
            target_block_time: 15,
            difficulty_adjustment_interval: 144,
            max_block_size: 2_000_000,
            min_difficulty_bits: 0x207fffff,
            initial_difficulty_bits: 0x207fffff,
            subsidy_halving_interval: 150,
            initial_block_subsidy: 50_000_000_000,
            stake_min_confirmations: 10,
        }
    }

    /// Get block subsidy for a given height
    pub fn get_block_subsidy(&self, height: u64) -> u64 {
        let halvings = height / self.subsidy_halving_interval;

        if halvings >= 64 {
            return 0;
        }

        self.initial_block_subsidy >> halvings
    }
}

/// Consensus errors
#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error("Invalid proof of work: {0}")]
    InvalidProofOfWork(String),

    #[error("Invalid difficulty: {0}")]
    InvalidDifficulty(String),

    #[error("Invalid coinbase: {0}")]
    InvalidCoinbase(String),

    #[error("No transactions in block")]
    NoTransactions,

    #[error("Block too large")]
    BlockTooLarge,

    #[error("Kernel error: {0}")]
    Kernel(#[from] KernelError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subsidy_halves() {
        let params = ConsensusParams::mainnet();
        let first = params.get_block_subsidy(0);
        let after_one_halving = params.get_block_subsidy(params.subsidy_halving_interval);
        assert_eq!(after_one_halving, first / 2);
    }

    #[test]
    fn test_subsidy_exhausts_after_64_halvings() {
        let params = ConsensusParams::mainnet();
        let height = params.subsidy_halving_interval * 64;
        assert_eq!(params.get_block_subsidy(height), 0);
    }
}
