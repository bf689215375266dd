//! Time source abstraction for the staking engine
//!
//! Both the kernel evaluator and the stake searcher need "now" to quantize
//! candidate block times. Reading the OS clock directly from inside that
//! logic makes it untestable, so every time read goes through a `Clock`
//! instead; tests inject a fixed or stepped clock.

use std::sync::atomic::{AtomicU32, Ordering};

pub trait Clock: Send + Sync {
    /// Current time, in seconds since the Unix epoch.
    fn now(&self) -> u32;
}

/// Reads the real wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u32 {
        driftcoin_core::current_timestamp() as u32
    }
}

/// A clock that returns a fixed time until advanced, for deterministic tests.
#[derive(Debug)]
pub struct FakeClock(AtomicU32);

impl FakeClock {
    pub fn new(start: u32) -> Self {
        FakeClock(AtomicU32::new(start))
    }

    pub fn advance(&self, secs: u32) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, time: u32) {
        self.0.store(time, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

impl Clone for FakeClock {
    /// Snapshots the current reading into a fresh, independent clock —
    /// advancing the clone does not advance the original.
    fn clone(&self) -> Self {
        FakeClock::new(self.now())
    }
}
