//! Legacy proof-of-work nonce search
//!
//! The 32-bit nonce space is sliced into fixed-size ranges and searched in
//! ascending order. A single-threaded caller just walks the ranges in
//! order; `search_nonce_parallel` hands each range to a rayon worker but
//! still returns the *lowest* winning nonce overall, via `find_map_first`
//! rather than `find_map_any`, so parallelizing the search never changes
//! which nonce a given header would have produced.

use num_bigint::BigUint;
use rayon::prelude::*;

use driftcoin_core::BlockHeader;

use crate::job::Job;

/// Number of ranges the nonce space is sliced into.
pub const NONCE_SEARCH_SLICES: u32 = 1500;

/// Width of a single slice. `0xffffffff / 1500` leaves a short final slice
/// that absorbs the remainder up to `u32::MAX`.
pub const INTERVAL: u32 = u32::MAX / NONCE_SEARCH_SLICES;

/// How often (in nonces tried) the searcher checks whether the job has
/// been destroyed. Checking every nonce would make cancellation instant
/// but adds an atomic load to the hot loop; this amortizes that cost.
const DESTROY_CHECK_STRIDE: u32 = 4096;

fn slice_bounds(slice: u32) -> (u32, u32) {
    let start = slice * INTERVAL;
    let end = if slice == NONCE_SEARCH_SLICES - 1 {
        u32::MAX
    } else {
        start + INTERVAL - 1
    };
    (start, end)
}

fn try_nonce(base_header: &BlockHeader, nonce: u32, target: &BigUint) -> Option<bool> {
    let mut header = base_header.clone();
    header.nonce = nonce;
    match header.identity_hash() {
        Ok(hash) => Some(BigUint::from_bytes_be(&hash) < *target),
        Err(_) => None,
    }
}

/// Search the whole nonce space in ascending order on the calling thread.
/// Returns `None` if the job was destroyed or the space was exhausted
/// without a hit.
pub fn search_nonce(base_header: &BlockHeader, target: &BigUint, job: &Job) -> Option<u32> {
    for slice in 0..NONCE_SEARCH_SLICES {
        if job.is_destroyed() {
            return None;
        }
        let (start, end) = slice_bounds(slice);
        let mut nonce = start;
        loop {
            if (nonce - start) % DESTROY_CHECK_STRIDE == 0 && job.is_destroyed() {
                return None;
            }
            job.record_nonce_attempt(nonce);
            if try_nonce(base_header, nonce, target) == Some(true) {
                return Some(nonce);
            }
            if nonce == end {
                break;
            }
            nonce += 1;
        }
    }
    None
}

/// Search the nonce space with one rayon task per slice, returning the
/// lowest winning nonce across all slices (not merely the first one a
/// worker happens to finish).
pub fn search_nonce_parallel(base_header: &BlockHeader, target: &BigUint, job: &Job) -> Option<u32> {
    (0..NONCE_SEARCH_SLICES)
        .into_par_iter()
        .find_map_first(|slice| {
            if job.is_destroyed() {
                return None;
            }
            let (start, end) = slice_bounds(slice);
            let mut nonce = start;
            loop {
                if (nonce - start) % DESTROY_CHECK_STRIDE == 0 && job.is_destroyed() {
                    return None;
                }
                job.record_nonce_attempt(nonce);
                if try_nonce(base_header, nonce, target) == Some(true) {
                    return Some(nonce);
                }
                if nonce == end {
                    return None;
                }
                nonce += 1;
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Job;
    use crate::template::BlockTemplate;
    use driftcoin_core::Transaction;
    use num_traits::One;

    fn test_job() -> Job {
        let template = BlockTemplate::new(1, 1, [0; 32], 0x1e00ffff, vec![Transaction::coinbase(1, 1, &[0; 20], 0)]);
        Job::new(1, template)
    }

    #[test]
    fn test_slice_bounds_cover_full_range_without_gaps() {
        let mut prev_end: i64 = -1;
        for slice in 0..NONCE_SEARCH_SLICES {
            let (start, end) = slice_bounds(slice);
            assert_eq!(start as i64, prev_end + 1);
            assert!(end >= start);
            prev_end = end as i64;
        }
        assert_eq!(prev_end, u32::MAX as i64);
    }

    #[test]
    fn test_destroyed_job_returns_none_immediately() {
        let job = test_job();
        job.destroy();
        let header = BlockHeader::new(1, [0; 32], [0; 32], 0, 0x1e00ffff, 0);
        // A target of 1 is satisfiable by essentially no hash; the search
        // would run for a long time if destruction weren't honored.
        let target = BigUint::one();
        assert_eq!(search_nonce(&header, &target, &job), None);
    }

    #[test]
    fn test_trivial_target_found_at_or_after_zero() {
        let job = test_job();
        let header = BlockHeader::new(1, [0; 32], [0; 32], 0, 0x1e00ffff, 0);
        // A target covering the whole hash space is satisfied by nonce 0.
        let target = BigUint::from_bytes_be(&[0xff; 32]);
        let found = search_nonce(&header, &target, &job);
        assert_eq!(found, Some(0));
    }
}
