//! Difficulty target conversions for DriftCoin
//!
//! Two representations of the same target are used across the workspace:
//! a 32-byte big-endian-ordered byte array (`bits_to_target`), convenient
//! for display and storage, and a `BigUint` (`compact_to_big`), which the
//! kernel needs for the truncated-division arithmetic of the proof-of-stake
//! predicate. Both derive from the same compact ("bits") encoding.

use log::debug;
use num_bigint::BigUint;
use num_traits::Zero;
use std::cmp::min;

use driftcoin_core::BlockHeader;

/// Minimum difficulty bits
const MIN_DIFFICULTY_BITS: u32 = 0x1f00ffff;

/// Maximum adjustment factor (percentage)
const MAX_ADJUSTMENT_PERCENT: u32 = 50;

/// Target block time in seconds
const TARGET_BLOCK_TIME: u64 = 15;

/// Difficulty adjustment window (number of blocks)
const DIFFICULTY_ADJUSTMENT_WINDOW: u64 = 60;

/// Calculate the next difficulty bits based on the previous blocks
pub fn calculate_next_difficulty(
    prev_header: &BlockHeader,
    _prev_timestamp: u32,
    blocks_since_adjustment: u64,
    average_block_time: u64,
) -> u32 {
    let current_difficulty = get_difficulty_for_bits(prev_header.bits);

    if blocks_since_adjustment != 0 && blocks_since_adjustment % DIFFICULTY_ADJUSTMENT_WINDOW != 0 {
        return prev_header.bits;
    }

    let mut adjustment_factor = TARGET_BLOCK_TIME as f64 / average_block_time as f64;

    let max_adjustment = 1.0 + (MAX_ADJUSTMENT_PERCENT as f64 / 100.0);
    let min_adjustment = 1.0 / max_adjustment;

    adjustment_factor = adjustment_factor.max(min_adjustment).min(max_adjustment);

    let new_difficulty = (current_difficulty as f64 * adjustment_factor) as u64;
    let new_bits = get_bits_for_difficulty(new_difficulty);
    let new_bits = min(new_bits, MIN_DIFFICULTY_BITS);

    debug!(
        "Difficulty adjustment: prev={}, new={}, factor={:.4}, avg_time={}",
        current_difficulty,
        get_difficulty_for_bits(new_bits),
        adjustment_factor,
        average_block_time
    );

    new_bits
}

/// Convert difficulty bits to a difficulty value
pub fn get_difficulty_for_bits(bits: u32) -> u64 {
    let exponent = ((bits >> 24) & 0xff) as u32;
    let mantissa = bits & 0x00ffffff;

    if exponent <= 3 {
        (mantissa >> (8 * (3 - exponent))) as u64
    } else {
        (mantissa as u64) << (8 * (exponent - 3))
    }
}

/// Convert a difficulty value to difficulty bits
pub fn get_bits_for_difficulty(difficulty: u64) -> u32 {
    let mut size = difficulty;

    let mut exponent = 0;
    while size > 0x00ffffff {
        size >>= 8;
        exponent += 1;
    }

    let mantissa = if exponent <= 3 {
        (difficulty << (8 * (3 - exponent))) as u32
    } else {
        (difficulty >> (8 * (exponent - 3))) as u32
    };

    let mut compact = mantissa & 0x00ffffff;
    compact |= (exponent + 3) << 24;

    compact
}

/// Convert difficulty bits to a target value (alias for get_target_from_bits)
pub fn bits_to_target(bits: u32) -> [u8; 32] {
    get_target_from_bits(bits)
}

/// Calculate the target hash from difficulty bits, little-endian.
pub fn get_target_from_bits(bits: u32) -> [u8; 32] {
    let mut target = [0u8; 32];

    let exponent = ((bits >> 24) & 0xff) as usize;
    let mantissa = bits & 0x00ffffff;

    target[0] = (mantissa & 0xff) as u8;
    target[1] = ((mantissa >> 8) & 0xff) as u8;
    target[2] = ((mantissa >> 16) & 0xff) as u8;

    if exponent <= 3 {
        for i in 0..29 {
            target[i] = target[i + 3 - exponent];
        }
        for i in 29..32 {
            target[i] = 0;
        }
    } else {
        for i in (0..29).rev() {
            target[i + exponent - 3] = target[i];
        }
        for i in 0..(exponent - 3) {
            target[i] = 0;
        }
    }

    target
}

/// Convert a compact ("bits") target to a `BigUint`, the representation the
/// kernel's truncated division needs. A compact value whose mantissa has
/// the sign bit set (a negative target under the original Bitcoin/PPCoin
/// encoding) decodes to zero, matching upstream behaviour.
pub fn compact_to_big(bits: u32) -> BigUint {
    let exponent = (bits >> 24) as usize;
    let mut mantissa = bits & 0x007fffff;

    if bits & 0x00800000 != 0 {
        return BigUint::zero();
    }

    if mantissa == 0 {
        return BigUint::zero();
    }

    if exponent <= 3 {
        mantissa >>= 8 * (3 - exponent);
        BigUint::from(mantissa)
    } else {
        BigUint::from(mantissa) << (8 * (exponent - 3))
    }
}

/// Encode a plain integer (not a target) into the compact ("bits") form,
/// the same lossy mantissa/exponent encoding headers use for difficulty.
/// The stake kernel's default target source runs a coin's value through
/// this encoding directly, rather than through a difficulty target —
/// see `driftcoin_consensus::kernel`.
pub fn compact_from_value(value: u64) -> u32 {
    big_to_compact(&BigUint::from(value))
}

/// Convert a `BigUint` back to its nearest compact ("bits") representation.
pub fn big_to_compact(value: &BigUint) -> u32 {
    if value.is_zero() {
        return 0;
    }

    let bytes = value.to_bytes_be();
    let mut size = bytes.len();

    let mut compact: u32 = if size <= 3 {
        let mut padded = [0u8; 3];
        padded[3 - size..].copy_from_slice(&bytes);
        u32::from_be_bytes([0, padded[0], padded[1], padded[2]])
    } else {
        u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]])
    };

    if compact & 0x00800000 != 0 {
        compact >>= 8;
        size += 1;
    }

    compact |= (size as u32) << 24;
    compact
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_difficulty_conversion() {
        let bits = 0x1d00ffff;
        let difficulty = get_difficulty_for_bits(bits);
        let bits_back = get_bits_for_difficulty(difficulty);

        assert_eq!(bits, bits_back);
    }

    #[test]
    fn test_target_conversion() {
        let bits = 0x1d00ffff;
        let target = get_target_from_bits(bits);

        assert_eq!(target[0], 0xff);
        assert_eq!(target[1], 0xff);
        assert_eq!(target[2], 0x00);

        for i in 3..32 {
            assert_eq!(target[i], 0);
        }
    }

    #[test]
    fn test_compact_to_big_roundtrip() {
        for bits in [0x1d00ffff_u32, 0x1c7fffff, 0x207fffff, 0x1e00ffff] {
            let big = compact_to_big(bits);
            let back = big_to_compact(&big);
            assert_eq!(bits, back, "roundtrip failed for {:08x}", bits);
        }
    }

    #[test]
    fn test_compact_to_big_negative_mantissa_is_zero() {
        let bits = 0x01800000;
        assert!(compact_to_big(bits).is_zero());
    }

    #[test]
    fn test_difficulty_adjustment() {
        let prev_header = BlockHeader {
            version: 1,
            prev_block_hash: [0; 32],
            merkle_root: [0; 32],
            timestamp: 1000,
            bits: 0x1d00ffff,
            nonce: 0,
        };

        let new_bits = calculate_next_difficulty(&prev_header, 1015, 1, 15);
        assert_eq!(new_bits, prev_header.bits);

        let new_bits = calculate_next_difficulty(&prev_header, 1600, DIFFICULTY_ADJUSTMENT_WINDOW, 10);
        assert!(get_difficulty_for_bits(new_bits) > get_difficulty_for_bits(prev_header.bits));

        let new_bits = calculate_next_difficulty(&prev_header, 2200, DIFFICULTY_ADJUSTMENT_WINDOW, 20);
        assert!(get_difficulty_for_bits(new_bits) < get_difficulty_for_bits(prev_header.bits));

        let new_bits = calculate_next_difficulty(&prev_header, 3000, DIFFICULTY_ADJUSTMENT_WINDOW, 60);
        let adjustment = get_difficulty_for_bits(prev_header.bits) as f64 / get_difficulty_for_bits(new_bits) as f64;
        assert!(adjustment <= 1.0 + (MAX_ADJUSTMENT_PERCENT as f64 / 100.0));
    }
}
