//! A thin `ChainView` over the node's `BlockStore`
//!
//! The staking crate's supervisor only needs four things from "the rest
//! of the node": the current tip snapshot, pending mempool transactions,
//! somewhere to submit a finished block, and (via `WalletView`, wired
//! separately in `main.rs`) coins to stake. This module supplies the
//! chain half of that, backed by whatever `BlockStore` the node was
//! configured with.

use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use tokio::sync::RwLock;

use driftcoin_consensus::next_stake_modifier;
use driftcoin_core::{Block, ChainTipSnapshot, StakeModifier, Transaction};
use driftcoin_staking::{ChainView, StakingError};
use driftcoin_storage::BlockStore;

pub struct StoreChainView {
    block_store: Arc<dyn BlockStore>,
    /// Evolves once per submitted block, chaining the block's own identity
    /// hash into the previous modifier. The stake kernel itself always
    /// chains from the winning coin's real kernel hash (see
    /// `StakeSearcher`/`next_stake_modifier` in `driftcoin-staking`); this
    /// is a simplification so a freshly-started node has *some* modifier
    /// to hand the supervisor without replaying full chain history.
    stake_modifier: RwLock<StakeModifier>,
}

impl StoreChainView {
    pub fn new(block_store: Arc<dyn BlockStore>) -> Self {
        StoreChainView {
            block_store,
            stake_modifier: RwLock::new([0; 32]),
        }
    }
}

#[async_trait]
impl ChainView for StoreChainView {
    async fn tip(&self) -> ChainTipSnapshot {
        let best_hash = self.block_store.get_best_block_hash().await.unwrap_or([0; 32]);
        let best = self.block_store.get_block(&best_hash).await.ok();

        let stake_modifier = *self.stake_modifier.read().await;
        match best {
            Some(block) => ChainTipSnapshot {
                height: block.height.unwrap_or(0),
                tip_hash: best_hash,
                parent_hash: block.header.prev_block_hash,
                tip_timestamp: block.header.timestamp,
                bits: block.header.bits,
                stake_modifier,
            },
            None => ChainTipSnapshot {
                height: 0,
                tip_hash: [0; 32],
                parent_hash: [0; 32],
                tip_timestamp: 0,
                bits: 0x1e00ffff,
                stake_modifier,
            },
        }
    }

    async fn mempool_transactions(&self) -> Vec<Transaction> {
        Vec::new()
    }

    async fn submit_block(&self, block: Block, stake_modifier: Option<StakeModifier>) -> Result<(), StakingError> {
        let hash = block
            .hash()
            .map_err(|e| StakingError::VerifyError(e.to_string()))?;

        self.block_store
            .store_block(&block)
            .await
            .map_err(|e| StakingError::PolicyError(e.to_string()))?;
        self.block_store
            .set_best_block(&hash)
            .await
            .map_err(|e| StakingError::PolicyError(e.to_string()))?;

        let mut modifier = self.stake_modifier.write().await;
        *modifier = match stake_modifier {
            // The stake searcher already chained this from the winning
            // coin's real kernel hash; use it directly.
            Some(next) => next,
            // Proof-of-work blocks have no kernel hash, so fall back to
            // chaining from the block's own identity hash.
            None => {
                let identity = block
                    .header
                    .identity_hash()
                    .map_err(|e| StakingError::VerifyError(e.to_string()))?;
                next_stake_modifier(identity, *modifier)
            }
        };

        info!(
            "accepted block at height {}: {}",
            block.height.unwrap_or(0),
            hex::encode(hash)
        );
        Ok(())
    }
}
