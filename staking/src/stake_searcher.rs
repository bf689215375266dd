//! Proof-of-stake time search
//!
//! Where the nonce searcher walks a 32-bit nonce space, the stake searcher
//! walks time: candidate block times on the 16-second grid, starting from
//! "now" and running forward to a bounded horizon, testing every stake
//! candidate coin against the kernel at each tick. The first (coin, time)
//! pair that satisfies the kernel wins; later ticks are never examined.

use driftcoin_consensus::{check_kernel, kernel_hash, KernelError, STAKE_TIME_GRID_SECONDS};
use driftcoin_core::{ChainTipSnapshot, Coin, Hash, OutPoint};

use crate::clock::Clock;
use crate::job::Job;

/// A winning stake: the coin that satisfied the kernel, the block time it
/// satisfied it at, and the kernel hash itself (needed for chaining the
/// next stake modifier).
#[derive(Debug, Clone)]
pub struct StakeHit {
    pub coin: Coin,
    pub time: u32,
    pub kernel_hash: Hash,
}

#[derive(Debug, Clone)]
pub struct StakeSearcherConfig {
    /// When `false` (the default), the kernel's target is derived from
    /// the *coin's own value* run through the compact ("bits") encoding,
    /// not from the block's difficulty at all — reproducing the source's
    /// documented, atypical default. When `true`, the kernel is tested
    /// against a target derived from the block's own difficulty bits
    /// instead. Existing deployments depend on the default; set this to
    /// `true` only on a network that has been coordinated to switch.
    pub use_block_bits_target: bool,
    /// How far into the future, in seconds, the search is allowed to look
    /// before giving up for this tick of the supervisor loop.
    pub max_future_drift_secs: u32,
}

impl Default for StakeSearcherConfig {
    fn default() -> Self {
        StakeSearcherConfig {
            use_block_bits_target: false,
            max_future_drift_secs: 7200,
        }
    }
}

pub struct StakeSearcher<C: Clock> {
    clock: C,
    config: StakeSearcherConfig,
}

fn align_to_grid(time: u32) -> u32 {
    time - (time % STAKE_TIME_GRID_SECONDS)
}

impl<C: Clock> StakeSearcher<C> {
    pub fn new(clock: C, config: StakeSearcherConfig) -> Self {
        StakeSearcher { clock, config }
    }

    /// Search forward from the current time for a coin/time pair that
    /// satisfies the kernel. `coins` should already be confirmation-
    /// filtered by the caller (see `UTXOSet::stake_candidates`). `new_bits`
    /// is only consulted when `use_block_bits_target` is set; by default
    /// the kernel derives its own target from each coin's value.
    pub fn search(&self, tip: &ChainTipSnapshot, new_bits: u32, coins: &[Coin], job: &Job) -> Option<StakeHit> {
        let start = align_to_grid(self.clock.now()).max(align_to_grid(tip.tip_timestamp + STAKE_TIME_GRID_SECONDS));
        let deadline = start + self.config.max_future_drift_secs;

        let mut time_tx = start;
        while time_tx <= deadline {
            if job.is_destroyed() {
                return None;
            }

            for coin in coins {
                let outpoint = OutPoint::new(coin.txid, coin.vout);
                match check_kernel(
                    tip.stake_modifier,
                    new_bits,
                    coin,
                    outpoint,
                    time_tx,
                    self.config.use_block_bits_target,
                ) {
                    Ok(true) => {
                        let hash = kernel_hash(tip.stake_modifier, coin.confirmed_time, outpoint, time_tx);
                        return Some(StakeHit {
                            coin: coin.clone(),
                            time: time_tx,
                            kernel_hash: hash,
                        });
                    }
                    Ok(false) => {}
                    Err(KernelError::TimeBeforeConfirmation { .. }) => {}
                    Err(_) => {}
                }
            }

            time_tx += STAKE_TIME_GRID_SECONDS;
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::template::BlockTemplate;
    use driftcoin_core::Transaction;

    fn test_job() -> Job {
        let template = BlockTemplate::new(7, 1, [0; 32], 0x207fffff, vec![Transaction::coinbase(1, 1, &[0; 20], 0)]);
        Job::new(1, template)
    }

    fn test_tip() -> ChainTipSnapshot {
        ChainTipSnapshot {
            height: 100,
            tip_hash: [0; 32],
            parent_hash: [8; 32],
            tip_timestamp: 1_700_000_000,
            bits: 0x207fffff, // minimum difficulty, easy to satisfy in a bounded test
            stake_modifier: [4; 32],
        }
    }

    fn abundant_coin() -> Coin {
        Coin {
            txid: [9; 32],
            vout: 0,
            value: u64::MAX / 2,
            script_pubkey: vec![],
            height: 1,
            confirmed_time: 1_600_000_000,
            is_coinbase: false,
        }
    }

    #[test]
    fn test_finds_hit_within_horizon_for_easy_target() {
        // The default value-derived target makes a kernel hit for any
        // realistic coin value vanishingly rare within a bounded horizon
        // (see `test_use_block_bits_target_switches_source`); exercise the
        // block-bits target here so "easy" is actually easy.
        let clock = FakeClock::new(1_700_000_020);
        let config = StakeSearcherConfig {
            use_block_bits_target: true,
            ..StakeSearcherConfig::default()
        };
        let searcher = StakeSearcher::new(clock, config);
        let job = test_job();
        let tip = test_tip();
        let coins = vec![abundant_coin()];

        let hit = searcher.search(&tip, tip.bits, &coins, &job);
        assert!(hit.is_some());
        let hit = hit.unwrap();
        assert_eq!(hit.time % STAKE_TIME_GRID_SECONDS, 0);
    }

    #[test]
    fn test_destroyed_job_yields_no_hit() {
        let clock = FakeClock::new(1_700_000_020);
        let searcher = StakeSearcher::new(clock, StakeSearcherConfig::default());
        let job = test_job();
        job.destroy();
        let tip = test_tip();
        let coins = vec![abundant_coin()];

        assert!(searcher.search(&tip, tip.bits, &coins, &job).is_none());
    }

    #[test]
    fn test_use_block_bits_target_switches_source() {
        let tip = test_tip();
        let scarce_coin = Coin { value: 1, ..abundant_coin() };
        let easy_new_bits = 0x207fffff; // trivially easy, but irrelevant by default

        // Default target is compact(coin.value) = compact(1) = 1: with a
        // one-satoshi coin this is essentially unsatisfiable in a bounded
        // horizon, regardless of how easy `new_bits` is.
        let default_cfg = StakeSearcherConfig::default();
        let searcher = StakeSearcher::new(FakeClock::new(1_700_000_020), default_cfg);
        let job = test_job();
        let coins = vec![scarce_coin.clone()];
        assert!(searcher.search(&tip, easy_new_bits, &coins, &job).is_none());

        // With the escape hatch, the target comes from `new_bits` instead,
        // so the same one-satoshi coin now hits easily.
        let switched_cfg = StakeSearcherConfig {
            use_block_bits_target: true,
            ..StakeSearcherConfig::default()
        };
        let searcher = StakeSearcher::new(FakeClock::new(1_700_000_020), switched_cfg);
        let job = test_job();
        assert!(searcher.search(&tip, easy_new_bits, &coins, &job).is_some());
    }
}
