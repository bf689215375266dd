//! A single in-flight block-production attempt
//!
//! `Job` is the unit of cancellation and telemetry shared by the nonce
//! searcher, the stake searcher, and the supervisor that owns them. It is
//! destroyed exactly once, by whichever side notices first that the job
//! is no longer worth pursuing (a new tip arrived, a shutdown was
//! requested, or a winning proof was already committed elsewhere); the
//! debug assertion below exists to catch a second destroy call, which
//! would indicate two code paths both believe they own the job's lifetime.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;

use crate::template::BlockTemplate;

/// Fold an extra-nonce pair and the current header nonce into a single
/// monotonically increasing hash count: `(n1*2^32 + n2)*2^32 + nonce`. Each
/// rollover of `n2` represents a full pass over the 32-bit nonce space, and
/// each rollover of `n1` a full pass over the 32-bit `n2` space, so the
/// count only ever grows as the search advances. Computed in `u128` since
/// the product alone can exceed `u64`; saturates on the (astronomically
/// unlikely) overflow of even that.
fn hash_count(n1: u32, n2: u32, nonce: u32) -> u64 {
    let extra = ((n1 as u128) << 32) | n2 as u128;
    let total = extra.wrapping_mul(1u128 << 32).wrapping_add(nonce as u128);
    total.min(u64::MAX as u128) as u64
}

/// A JSON-friendly snapshot of a job, for RPC callers that only need to
/// know what's in flight rather than touch the job itself.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub id: u64,
    pub height: u64,
    pub bits: u32,
    pub destroyed: bool,
    pub committed: bool,
    pub hashes: u64,
    pub rate: f64,
}

#[derive(Debug)]
pub struct Job {
    pub id: u64,
    pub template: BlockTemplate,
    destroyed: AtomicBool,
    committed: AtomicBool,
    extra_nonce: Mutex<(u32, u32)>,
    hashes: AtomicU64,
    started_at: Instant,
}

impl Job {
    pub fn new(id: u64, template: BlockTemplate) -> Self {
        Job {
            id,
            template,
            destroyed: AtomicBool::new(false),
            committed: AtomicBool::new(false),
            extra_nonce: Mutex::new((0, 0)),
            hashes: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Mark this job as no longer worth pursuing. Idempotent in release
    /// builds but asserts against being called twice, since exactly one
    /// caller should ever decide a job is done.
    pub fn destroy(&self) {
        let already = self.destroyed.swap(true, Ordering::SeqCst);
        debug_assert!(!already, "job {} destroyed twice", self.id);
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Attempt to claim this job as the one whose proof gets submitted.
    /// Returns `true` to exactly one caller; later callers get `false`
    /// and should treat the race as lost.
    pub fn commit(&self) -> bool {
        !self.committed.swap(true, Ordering::SeqCst)
    }

    pub fn is_committed(&self) -> bool {
        self.committed.load(Ordering::SeqCst)
    }

    /// The current extra-nonce pair `(n1, n2)`, without advancing it.
    pub fn extra_nonce(&self) -> (u32, u32) {
        *self.extra_nonce.lock().unwrap()
    }

    /// Roll the coinbase extra-nonce pair forward by one step, for coinbase
    /// script rolling once a nonce search has exhausted the header nonce
    /// space. `n2` increments; on overflow it wraps to zero and `n1`
    /// increments in its place. Returns the new pair.
    pub fn update_nonce(&self) -> (u32, u32) {
        let mut pair = self.extra_nonce.lock().unwrap();
        let (n1, n2) = *pair;
        *pair = match n2.checked_add(1) {
            Some(next_n2) => (n1, next_n2),
            None => (n1.wrapping_add(1), 0),
        };
        *pair
    }

    /// Record that the header nonce `nonce` has just been tried against the
    /// current extra-nonce pair, and fold that into the job's hash count.
    pub fn record_nonce_attempt(&self, nonce: u32) {
        let (n1, n2) = self.extra_nonce();
        self.hashes.store(hash_count(n1, n2, nonce), Ordering::Relaxed);
    }

    pub fn get_hashes(&self) -> u64 {
        self.hashes.load(Ordering::Relaxed)
    }

    /// Hashes per second since the job started.
    pub fn get_rate(&self) -> f64 {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            0.0
        } else {
            self.get_hashes() as f64 / elapsed
        }
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id,
            height: self.template.height,
            bits: self.template.bits,
            destroyed: self.is_destroyed(),
            committed: self.is_committed(),
            hashes: self.get_hashes(),
            rate: self.get_rate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftcoin_core::Transaction;

    fn test_job() -> Job {
        let template = BlockTemplate::new(1, 1, [0; 32], 0x1e00ffff, vec![Transaction::coinbase(1, 1, &[0; 20], 0)]);
        Job::new(1, template)
    }

    #[test]
    fn test_commit_only_succeeds_once() {
        let job = test_job();
        assert!(job.commit());
        assert!(!job.commit());
        assert!(job.is_committed());
    }

    #[test]
    fn test_update_nonce_increments_n2() {
        let job = test_job();
        assert_eq!(job.extra_nonce(), (0, 0));
        assert_eq!(job.update_nonce(), (0, 1));
        assert_eq!(job.update_nonce(), (0, 2));
    }

    #[test]
    fn test_update_nonce_rolls_n1_on_n2_overflow() {
        let job = test_job();
        *job.extra_nonce.lock().unwrap() = (0, u32::MAX);
        assert_eq!(job.update_nonce(), (1, 0));
    }

    #[test]
    fn test_hash_count_formula() {
        assert_eq!(hash_count(0, 0, 7), 7);
        assert_eq!(hash_count(0, 1, 0), 1u64 << 32);
        // n1=1 alone already implies 2^64 hashes, which saturates u64.
        assert_eq!(hash_count(1, 0, 0), u64::MAX);
    }

    #[test]
    fn test_record_nonce_attempt_folds_extra_nonce_into_hash_count() {
        let job = test_job();
        job.record_nonce_attempt(5);
        assert_eq!(job.get_hashes(), 5);

        job.update_nonce(); // extra_nonce is now (0, 1)
        job.record_nonce_attempt(3);
        assert_eq!(job.get_hashes(), (1u64 << 32) + 3);
    }

    #[test]
    #[should_panic]
    fn test_double_destroy_panics_in_debug() {
        let job = test_job();
        job.destroy();
        job.destroy();
    }
}
