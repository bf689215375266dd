//! DriftCoin block-production engine
//!
//! This crate turns a chain tip and a wallet's coins into mined or staked
//! blocks. It is split into:
//! - [`clock`]: the injectable time source used by kernel timing.
//! - [`template`]: `BlockTemplate` and the tagged `BlockProof` sum type.
//! - [`job`]: `Job`, the cancellable unit of work shared by both searchers.
//! - [`nonce_searcher`]: legacy proof-of-work nonce search.
//! - [`stake_searcher`]: proof-of-stake kernel search.
//! - [`supervisor`]: the loop that builds templates, dispatches searches,
//!   and submits winning blocks to the rest of the node.

use async_trait::async_trait;
use thiserror::Error;

use driftcoin_core::{Coin, Hash, StakeModifier, Transaction};

pub mod clock;
pub mod job;
pub mod nonce_searcher;
pub mod stake_searcher;
pub mod supervisor;
pub mod template;

pub use clock::{Clock, FakeClock, SystemClock};
pub use job::{Job, JobSummary};
pub use nonce_searcher::{search_nonce, search_nonce_parallel, INTERVAL, NONCE_SEARCH_SLICES};
pub use stake_searcher::{StakeHit, StakeSearcher, StakeSearcherConfig};
pub use supervisor::{StakerSupervisor, StakingEvent, StakingHandle, StakingInfo, SupervisorState};
pub use template::{BlockProof, BlockTemplate};

#[derive(Debug, Error)]
pub enum StakingError {
    #[error("proof verification failed: {0}")]
    VerifyError(String),
    #[error("lost the race to submit this job's proof")]
    RaceMiss,
    #[error("policy rejected the candidate block: {0}")]
    PolicyError(String),
    #[error("staker is already running")]
    AlreadyRunning,
    #[error("staker is not running")]
    NotRunning,
    #[error("staker is already stopping")]
    AlreadyStopping,
}

/// What the supervisor needs to know about the rest of the node: the
/// current tip, pending mempool transactions, and where to submit a
/// finished block.
#[async_trait]
pub trait ChainView: Send + Sync {
    async fn tip(&self) -> driftcoin_core::ChainTipSnapshot;
    async fn mempool_transactions(&self) -> Vec<Transaction>;
    /// Submit a block that won a proof search. `stake_modifier` carries the
    /// already-computed next stake modifier (chained from the winning
    /// coin's real kernel hash) when `block` is a stake block; `None` for a
    /// proof-of-work block, which has no kernel hash to chain from.
    async fn submit_block(&self, block: driftcoin_core::Block, stake_modifier: Option<StakeModifier>) -> Result<(), StakingError>;
}

/// What the supervisor needs from the wallet: the coins it can stake and
/// the keys to sign a winning coinstake with.
#[async_trait]
pub trait WalletView: Send + Sync {
    async fn stake_candidates(&self, tip_height: u64, min_confirmations: u64) -> Vec<Coin>;
    fn staking_address(&self) -> [u8; 20];
    fn secret_key_for(&self, coin: &Coin) -> Option<[u8; 32]>;
}

/// Assembles a `BlockTemplate` from a tip and a mempool snapshot. Kept as
/// a trait so the supervisor doesn't need to know about fee selection or
/// coinbase construction directly.
pub trait TemplateBuilder: Send + Sync {
    fn build(&self, tip: &driftcoin_core::ChainTipSnapshot, mempool: &[Transaction], reward_address: [u8; 20]) -> BlockTemplate;
}

/// Hash a block header the way the supervisor needs to, exposed here so
/// callers outside this crate (RPC, tests) don't need to reach into
/// `driftcoin_core` directly for it.
pub fn block_identity_hash(header: &driftcoin_core::BlockHeader) -> Result<Hash, driftcoin_core::BlockValidationError> {
    header.identity_hash()
}
