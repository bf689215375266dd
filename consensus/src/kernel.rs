//! Proof-of-stake kernel predicate for DriftCoin
//!
//! The kernel test is coin-age-free: unlike PPCoin's original design, a
//! coin's weight in the predicate is its value alone, not value times time
//! held. A coin becomes eligible to stake once it has `STAKE_MIN_CONFIRMATIONS`
//! confirmations and stays eligible indefinitely after that — there is no
//! upper age cutoff and no decay.
//!
//! `check_kernel` hashes the chain's running stake modifier together with
//! the spent coin's confirmation time, its outpoint, and the candidate
//! block time, and accepts the coin as a valid stake if the resulting
//! hash, read as a big-endian integer, falls under a value-scaled target.

use byteorder::{LittleEndian, WriteBytesExt};
use num_bigint::BigUint;
use thiserror::Error;

use driftcoin_core::{Coin, Hash, OutPoint, StakeModifier};

use crate::difficulty::{compact_from_value, compact_to_big};

/// Confirmations a coin must accumulate before it may be spent as stake.
pub const STAKE_MIN_CONFIRMATIONS: u64 = 500;

/// Candidate block times must land on this grid, in seconds, so the stake
/// searcher enumerates a bounded, deterministic sequence of times rather
/// than a continuous one.
pub const STAKE_TIME_GRID_SECONDS: u32 = 16;

#[derive(Error, Debug)]
pub enum KernelError {
    #[error("candidate block time {0} is not aligned to the {1}-second stake grid")]
    UnalignedTime(u32, u32),

    #[error("candidate block time {time_tx} predates the coin's confirmation time {confirmed_time}")]
    TimeBeforeConfirmation { time_tx: u32, confirmed_time: u32 },

    #[error("coin has zero value and cannot stake")]
    ZeroValueCoin,
}

/// Hash the kernel's inputs: stake modifier, the spent coin's confirmation
/// time, its outpoint, and the candidate block time.
pub fn kernel_hash(stake_modifier: StakeModifier, confirmed_time: u32, previous_out: OutPoint, time_tx: u32) -> Hash {
    let mut buf = Vec::with_capacity(32 + 4 + 32 + 4 + 4);
    buf.extend_from_slice(&stake_modifier);
    buf.write_u32::<LittleEndian>(confirmed_time).unwrap();
    buf.extend_from_slice(&previous_out.txid);
    buf.write_u32::<LittleEndian>(previous_out.vout).unwrap();
    buf.write_u32::<LittleEndian>(time_tx).unwrap();
    driftcoin_crypto::sha256d(&buf)
}

/// Evaluate the kernel predicate for `coin` spent as stake at `time_tx`,
/// against a block whose difficulty target is `blk_bits`.
///
/// The effective target defaults to `compact(coin.value)` — the coin's
/// value run through the same lossy mantissa/exponent encoding a
/// difficulty target uses, not a target derived from `blk_bits` at all.
/// This is the source's documented (if atypical) behaviour; passing
/// `use_block_bits_target = true` switches to a `blk_bits`-derived
/// target instead (see `StakeSearcherConfig::use_block_bits_target`).
///
/// Returns `Ok(true)` if the coin's kernel hash satisfies the predicate,
/// `Ok(false)` if it does not, and `Err` if the inputs themselves are
/// invalid (unaligned time, coin not yet confirmed at `time_tx`, etc).
pub fn check_kernel(
    stake_modifier: StakeModifier,
    blk_bits: u32,
    coin: &Coin,
    previous_out: OutPoint,
    time_tx: u32,
    use_block_bits_target: bool,
) -> Result<bool, KernelError> {
    if time_tx % STAKE_TIME_GRID_SECONDS != 0 {
        return Err(KernelError::UnalignedTime(time_tx, STAKE_TIME_GRID_SECONDS));
    }
    if time_tx < coin.confirmed_time {
        return Err(KernelError::TimeBeforeConfirmation {
            time_tx,
            confirmed_time: coin.confirmed_time,
        });
    }
    if coin.value == 0 {
        return Err(KernelError::ZeroValueCoin);
    }

    let hash = kernel_hash(stake_modifier, coin.confirmed_time, previous_out, time_tx);
    let hash_value = BigUint::from_bytes_be(&hash);

    let target = if use_block_bits_target {
        compact_to_big(blk_bits)
    } else {
        compact_to_big(compact_from_value(coin.value))
    };

    // Truncating division, then a non-strict comparison against the target.
    Ok(hash_value / BigUint::from(coin.value) <= target)
}

/// Chain a new stake modifier from the kernel hash that produced the
/// latest accepted stake block and the previous modifier.
pub fn next_stake_modifier(kernel_hash: Hash, prev_modifier: StakeModifier) -> StakeModifier {
    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(&kernel_hash);
    buf.extend_from_slice(&prev_modifier);
    driftcoin_crypto::sha256d(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_coin(value: u64, confirmed_time: u32) -> Coin {
        Coin {
            txid: [7; 32],
            vout: 0,
            value,
            script_pubkey: vec![],
            height: 1000,
            confirmed_time,
            is_coinbase: false,
        }
    }

    #[test]
    fn test_unaligned_time_rejected() {
        let coin = test_coin(1_000_000, 1_700_000_000);
        let result = check_kernel([0; 32], 0x1e00ffff, &coin, OutPoint::new([1; 32], 0), 1_700_000_001, false);
        assert!(matches!(result, Err(KernelError::UnalignedTime(_, _))));
    }

    #[test]
    fn test_time_before_confirmation_rejected() {
        let coin = test_coin(1_000_000, 1_700_000_016);
        let result = check_kernel([0; 32], 0x1e00ffff, &coin, OutPoint::new([1; 32], 0), 1_700_000_000, false);
        assert!(matches!(result, Err(KernelError::TimeBeforeConfirmation { .. })));
    }

    #[test]
    fn test_zero_value_coin_rejected() {
        let coin = test_coin(0, 1_700_000_000);
        let result = check_kernel([0; 32], 0x1e00ffff, &coin, OutPoint::new([1; 32], 0), 1_700_000_016, false);
        assert!(matches!(result, Err(KernelError::ZeroValueCoin)));
    }

    #[test]
    fn test_higher_value_coin_more_likely_to_pass() {
        let small = test_coin(1, 1_700_000_000);
        let large = test_coin(1_000_000_000, 1_700_000_000);
        let bits = 0x1e00ffff;

        let mut small_hits = 0;
        let mut large_hits = 0;
        for i in 0..200u32 {
            let t = 1_700_000_000 + i * STAKE_TIME_GRID_SECONDS;
            if check_kernel([3; 32], bits, &small, OutPoint::new([9; 32], 0), t, false).unwrap() {
                small_hits += 1;
            }
            if check_kernel([3; 32], bits, &large, OutPoint::new([9; 32], 0), t, false).unwrap() {
                large_hits += 1;
            }
        }
        assert!(large_hits >= small_hits);
    }

    #[test]
    fn test_stake_modifier_chains_deterministically() {
        let a = next_stake_modifier([1; 32], [0; 32]);
        let b = next_stake_modifier([1; 32], [0; 32]);
        let c = next_stake_modifier([2; 32], [0; 32]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
