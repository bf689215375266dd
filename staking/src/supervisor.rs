//! The staker supervisor
//!
//! A single cooperative loop owns block production end to end: it watches
//! the chain tip, rebuilds a template whenever the tip moves or the
//! mempool goes stale, hands the template to the nonce searcher or the
//! stake searcher depending on which proof path is configured, and
//! submits whatever wins. Only one job is ever in flight; a new tip
//! always destroys the job chasing the old one before starting its
//! replacement.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::{Mutex, Notify};

use secp256k1::SecretKey;

use driftcoin_consensus::{compact_to_big, next_stake_modifier, ConsensusParams};
use driftcoin_core::{ChainTipSnapshot, Hash, StakeModifier, Transaction};
use driftcoin_crypto::sign_canonical;

use crate::clock::Clock;
use crate::job::{Job, JobSummary};
use crate::nonce_searcher::search_nonce_parallel;
use crate::stake_searcher::StakeSearcher;
use crate::template::BlockProof;
use crate::{ChainView, StakingError, TemplateBuilder, WalletView};

/// Mempool transactions older than this are considered stale and force a
/// template rebuild even if the tip hasn't moved.
const MEMPOOL_STALE_SECS: u64 = 10;

/// How long the run loop sleeps between polls when it has nothing better
/// to wait on.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Capacity of the broadcast channel backing [`StakingEvent`] subscriptions.
/// A slow or absent subscriber just misses old events rather than
/// backpressuring the supervisor loop.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Events the supervisor loop emits as it runs, for embedders (RPC, logs)
/// that want to observe block production without polling `staking_info`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StakingEvent {
    /// Periodic heartbeat: current state and the job in flight, if any.
    Status { state: SupervisorState, current_job: Option<JobSummary> },
    /// A block was found and accepted.
    Block { height: u64, hash: Hash },
    /// The loop is giving up after an unrecoverable submission error.
    Error { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Running,
    Stopping,
}

/// A JSON-friendly snapshot for the `getstakinginfo` RPC query.
#[derive(Debug, Clone, Serialize)]
pub struct StakingInfo {
    pub state: SupervisorState,
    pub enable_pow: bool,
    pub enable_stake: bool,
    pub current_job: Option<JobSummary>,
}

impl Serialize for SupervisorState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let s = match self {
            SupervisorState::Idle => "idle",
            SupervisorState::Running => "running",
            SupervisorState::Stopping => "stopping",
        };
        serializer.serialize_str(s)
    }
}

pub struct StakerSupervisor<V: ChainView, W: WalletView, C: Clock + Clone + 'static, T: TemplateBuilder> {
    chain: Arc<V>,
    wallet: Arc<W>,
    clock: C,
    template_builder: Arc<T>,
    params: ConsensusParams,
    state: Mutex<SupervisorState>,
    stop_notify: Notify,
    job_counter: AtomicU64,
    enable_pow: bool,
    enable_stake: bool,
    /// A job created on demand by the `createjob`/`mineblock` RPC pair,
    /// independent of the continuous supervisor loop.
    manual_job: Mutex<Option<Arc<Job>>>,
    events: broadcast::Sender<StakingEvent>,
}

impl<V: ChainView + 'static, W: WalletView + 'static, C: Clock + Clone + 'static, T: TemplateBuilder + 'static>
    StakerSupervisor<V, W, C, T>
{
    pub fn new(
        chain: Arc<V>,
        wallet: Arc<W>,
        clock: C,
        template_builder: Arc<T>,
        params: ConsensusParams,
        enable_pow: bool,
        enable_stake: bool,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        StakerSupervisor {
            chain,
            wallet,
            clock,
            template_builder,
            params,
            state: Mutex::new(SupervisorState::Idle),
            stop_notify: Notify::new(),
            job_counter: AtomicU64::new(0),
            enable_pow,
            enable_stake,
            manual_job: Mutex::new(None),
            events,
        }
    }

    /// Subscribe to `StakingEvent`s emitted by the run loop. Each
    /// subscriber gets its own queue; events emitted before a subscriber
    /// joins, or while it is lagging, are simply missed.
    pub fn subscribe(&self) -> broadcast::Receiver<StakingEvent> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> SupervisorState {
        *self.state.lock().await
    }

    pub async fn staking_info(&self) -> StakingInfo {
        let current_job = self.manual_job.lock().await.as_ref().map(|job| job.summary());
        StakingInfo {
            state: self.state().await,
            enable_pow: self.enable_pow,
            enable_stake: self.enable_stake,
            current_job,
        }
    }

    /// Build a fresh template from the current tip and mempool without
    /// starting the continuous loop, for embedders that want to drive
    /// block production one job at a time over RPC.
    pub async fn create_job(&self) -> JobSummary {
        let tip = self.chain.tip().await;
        let mempool = self.chain.mempool_transactions().await;
        let job = Arc::new(self.build_job(&tip, mempool));
        let summary = job.summary();
        let mut slot = self.manual_job.lock().await;
        if let Some(old) = slot.replace(job) {
            if !old.is_destroyed() {
                old.destroy();
            }
        }
        summary
    }

    /// Try once, synchronously, to find a winning proof for the job
    /// created by `create_job` and submit it if found. Returns `Ok(None)`
    /// if there is no manual job, the job was already destroyed, or no
    /// proof was found on this attempt.
    pub async fn mine_block(&self) -> Result<Option<Hash>, StakingError> {
        let job = {
            let slot = self.manual_job.lock().await;
            match slot.as_ref() {
                Some(job) if !job.is_destroyed() => Arc::clone(job),
                _ => return Ok(None),
            }
        };

        let tip = self.chain.tip().await;
        let (proof, next_modifier) = match self.try_proofs(&tip, &job).await {
            Some(result) => result,
            None => return Ok(None),
        };

        if !job.commit() {
            return Err(StakingError::RaceMiss);
        }

        let block = job.template.into_block(self.clock.now(), &proof);
        let height = block.height.unwrap_or(0);
        let hash = block.header.identity_hash().map_err(|e| StakingError::VerifyError(e.to_string()))?;
        self.chain.submit_block(block, next_modifier).await?;
        let _ = self.events.send(StakingEvent::Block { height, hash });
        job.destroy();
        *self.manual_job.lock().await = None;
        Ok(Some(hash))
    }

    pub async fn start(self: &Arc<Self>) -> Result<(), StakingError> {
        {
            let mut state = self.state.lock().await;
            match *state {
                SupervisorState::Running => return Err(StakingError::AlreadyRunning),
                SupervisorState::Stopping => return Err(StakingError::AlreadyStopping),
                SupervisorState::Idle => *state = SupervisorState::Running,
            }
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_loop().await;
        });

        Ok(())
    }

    pub async fn stop(&self) -> Result<(), StakingError> {
        {
            let mut state = self.state.lock().await;
            match *state {
                SupervisorState::Idle => return Err(StakingError::NotRunning),
                SupervisorState::Stopping => return Err(StakingError::AlreadyStopping),
                SupervisorState::Running => *state = SupervisorState::Stopping,
            }
        }
        self.stop_notify.notify_waiters();
        Ok(())
    }

    async fn run_loop(self: Arc<Self>) {
        info!("staker supervisor starting");
        let mut current_job: Option<Arc<Job>> = None;
        let mut last_mempool_refresh = self.clock.now();

        'outer: loop {
            if self.state().await == SupervisorState::Stopping {
                break;
            }

            let tip = self.chain.tip().await;
            // Sibling-tip race: a new tip sharing a parent with the job's
            // own prev_block means another block beat ours at this height.
            // Deliberately not a `tip_hash` comparison — see Design Notes.
            let sibling_race = current_job
                .as_ref()
                .map(|job| tip.parent_hash == job.template.prev_block_hash)
                .unwrap_or(false);
            let mempool_stale = (self.clock.now().saturating_sub(last_mempool_refresh) as u64) >= MEMPOOL_STALE_SECS;

            if current_job.is_none() || sibling_race || mempool_stale {
                if let Some(job) = current_job.take() {
                    if !job.is_destroyed() {
                        job.destroy();
                    }
                }

                let mempool = self.chain.mempool_transactions().await;
                last_mempool_refresh = self.clock.now();
                let job = self.build_job(&tip, mempool);
                current_job = Some(Arc::new(job));
            }

            let _ = self.events.send(StakingEvent::Status {
                state: self.state().await,
                current_job: current_job.as_ref().map(|job| job.summary()),
            });

            if let Some(job) = current_job.as_ref() {
                if let Some((proof, next_modifier)) = self.try_proofs(&tip, job).await {
                    if job.commit() {
                        let block = job.template.into_block(self.clock.now(), &proof);
                        let height = block.height.unwrap_or(0);
                        let identity = block.header.identity_hash();
                        match self.chain.submit_block(block, next_modifier).await {
                            Ok(()) => {
                                info!("submitted new block at height {height}");
                                if let Ok(hash) = identity {
                                    let _ = self.events.send(StakingEvent::Block { height, hash });
                                }
                                job.destroy();
                                current_job = None;
                            }
                            Err(e @ StakingError::VerifyError(_)) => {
                                warn!("block submission rejected: {e}");
                                job.destroy();
                                current_job = None;
                            }
                            Err(StakingError::RaceMiss) => {
                                warn!("bad-prevblk (race): lost the race to submit this job's proof");
                                job.destroy();
                                current_job = None;
                            }
                            Err(e) => {
                                error!("unrecoverable block submission error, stopping: {e}");
                                let _ = self.events.send(StakingEvent::Error { message: e.to_string() });
                                job.destroy();
                                current_job = None;
                                break 'outer;
                            }
                        }
                    }
                }
            }

            tokio::select! {
                _ = self.stop_notify.notified() => break,
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }
        }

        if let Some(job) = current_job {
            if !job.is_destroyed() {
                job.destroy();
            }
        }

        let mut state = self.state.lock().await;
        *state = SupervisorState::Idle;
        info!("staker supervisor stopped");
    }

    fn build_job(&self, tip: &ChainTipSnapshot, mempool: Vec<Transaction>) -> Job {
        let id = self.job_counter.fetch_add(1, Ordering::Relaxed);
        let reward_address = self.wallet.staking_address();
        let template = self.template_builder.build(tip, &mempool, reward_address);
        debug!("built job {id} at height {}", template.height);
        Job::new(id, template)
    }

    /// Search for a winning proof along whichever paths are enabled. The
    /// second element of the stake result is the next stake modifier,
    /// already chained from the winning coin's real kernel hash — the
    /// caller passes it straight through to `ChainView::submit_block` once
    /// the block is accepted; it is `None` for a proof-of-work proof.
    async fn try_proofs(&self, tip: &ChainTipSnapshot, job: &Job) -> Option<(BlockProof, Option<StakeModifier>)> {
        if self.enable_stake {
            let coins = self.wallet.stake_candidates(tip.height, self.params.stake_min_confirmations).await;
            if !coins.is_empty() {
                let searcher = StakeSearcher::new(self.clock.clone(), Default::default());
                if let Some(hit) = searcher.search(tip, job.template.bits, &coins, job) {
                    let next_modifier = next_stake_modifier(hit.kernel_hash, tip.stake_modifier);

                    let signature = match self.wallet.secret_key_for(&hit.coin) {
                        Some(raw_key) => {
                            let block = job.template.into_block(hit.time, &BlockProof::Pow { nonce: 0 });
                            match (SecretKey::from_slice(&raw_key), block.header.identity_hash()) {
                                (Ok(secret_key), Ok(identity)) => sign_canonical(&identity, &secret_key).unwrap_or_default(),
                                _ => Vec::new(),
                            }
                        }
                        None => Vec::new(),
                    };

                    let proof = BlockProof::Stake {
                        time: hit.time,
                        coin: driftcoin_core::OutPoint::new(hit.coin.txid, hit.coin.vout),
                        signature,
                    };
                    return Some((proof, Some(next_modifier)));
                }
            }
        }

        if self.enable_pow {
            let header = job.template.into_block(self.clock.now(), &BlockProof::Pow { nonce: 0 }).header;
            let target = compact_to_big(job.template.bits);
            if let Some(nonce) = search_nonce_parallel(&header, &target, job) {
                return Some((BlockProof::Pow { nonce }, None));
            }
        }

        None
    }
}

/// Type-erased control surface for the supervisor, so callers that don't
/// want to carry its `V`/`W`/`C`/`T` type parameters around (namely the
/// RPC crate) can hold it behind `Arc<dyn StakingHandle>`.
#[async_trait]
pub trait StakingHandle: Send + Sync {
    async fn start(&self) -> Result<(), StakingError>;
    async fn stop(&self) -> Result<(), StakingError>;
    async fn state(&self) -> SupervisorState;
    async fn staking_info(&self) -> StakingInfo;
    async fn create_job(&self) -> JobSummary;
    async fn mine_block(&self) -> Result<Option<Hash>, StakingError>;
    fn subscribe(&self) -> broadcast::Receiver<StakingEvent>;
}

#[async_trait]
impl<V, W, C, T> StakingHandle for Arc<StakerSupervisor<V, W, C, T>>
where
    V: ChainView + 'static,
    W: WalletView + 'static,
    C: Clock + Clone + 'static,
    T: TemplateBuilder + 'static,
{
    async fn start(&self) -> Result<(), StakingError> {
        StakerSupervisor::start(self).await
    }
    async fn stop(&self) -> Result<(), StakingError> {
        StakerSupervisor::stop(self).await
    }
    async fn state(&self) -> SupervisorState {
        StakerSupervisor::state(self).await
    }
    async fn staking_info(&self) -> StakingInfo {
        StakerSupervisor::staking_info(self).await
    }
    async fn create_job(&self) -> JobSummary {
        StakerSupervisor::create_job(self).await
    }
    async fn mine_block(&self) -> Result<Option<Hash>, StakingError> {
        StakerSupervisor::mine_block(self).await
    }
    fn subscribe(&self) -> broadcast::Receiver<StakingEvent> {
        StakerSupervisor::subscribe(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::template::BlockTemplate;
    use async_trait::async_trait;
    use driftcoin_core::{Block, Coin, Transaction};
    use std::sync::Mutex as StdMutex;

    struct FixedChain {
        tip: ChainTipSnapshot,
        submitted: StdMutex<Vec<Block>>,
    }

    #[async_trait]
    impl ChainView for FixedChain {
        async fn tip(&self) -> ChainTipSnapshot {
            self.tip.clone()
        }
        async fn mempool_transactions(&self) -> Vec<Transaction> {
            Vec::new()
        }
        async fn submit_block(&self, block: Block, _stake_modifier: Option<StakeModifier>) -> Result<(), StakingError> {
            self.submitted.lock().unwrap().push(block);
            Ok(())
        }
    }

    struct EmptyWallet;

    #[async_trait]
    impl WalletView for EmptyWallet {
        async fn stake_candidates(&self, _tip_height: u64, _min_confirmations: u64) -> Vec<Coin> {
            Vec::new()
        }
        fn staking_address(&self) -> [u8; 20] {
            [0; 20]
        }
        fn secret_key_for(&self, _coin: &Coin) -> Option<[u8; 32]> {
            None
        }
    }

    struct CoinbaseOnlyBuilder;

    impl TemplateBuilder for CoinbaseOnlyBuilder {
        fn build(&self, tip: &ChainTipSnapshot, _mempool: &[Transaction], reward_address: [u8; 20]) -> BlockTemplate {
            let coinbase = Transaction::coinbase(tip.height + 1, 50_000_000, &reward_address, 0);
            BlockTemplate::new(1, tip.height + 1, tip.tip_hash, tip.bits, vec![coinbase])
        }
    }

    fn test_tip() -> ChainTipSnapshot {
        ChainTipSnapshot {
            height: 10,
            tip_hash: [1; 32],
            parent_hash: [9; 32],
            tip_timestamp: 1_700_000_000,
            bits: 0x1e00ffff,
            stake_modifier: [2; 32],
        }
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let supervisor = Arc::new(StakerSupervisor::new(
            Arc::new(FixedChain {
                tip: test_tip(),
                submitted: StdMutex::new(Vec::new()),
            }),
            Arc::new(EmptyWallet),
            FakeClock::new(1_700_000_010),
            Arc::new(CoinbaseOnlyBuilder),
            ConsensusParams::regtest(),
            false,
            false,
        ));

        supervisor.start().await.unwrap();
        let err = supervisor.start().await.unwrap_err();
        assert!(matches!(err, StakingError::AlreadyRunning));
        supervisor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_run_loop_emits_status_event() {
        let supervisor = Arc::new(StakerSupervisor::new(
            Arc::new(FixedChain {
                tip: test_tip(),
                submitted: StdMutex::new(Vec::new()),
            }),
            Arc::new(EmptyWallet),
            FakeClock::new(1_700_000_010),
            Arc::new(CoinbaseOnlyBuilder),
            ConsensusParams::regtest(),
            false,
            false,
        ));

        let mut events = supervisor.subscribe();
        supervisor.start().await.unwrap();
        let event = tokio::time::timeout(Duration::from_secs(1), events.recv()).await.unwrap().unwrap();
        assert!(matches!(event, StakingEvent::Status { .. }));
        supervisor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_without_start_is_rejected() {
        let supervisor = StakerSupervisor::new(
            Arc::new(FixedChain {
                tip: test_tip(),
                submitted: StdMutex::new(Vec::new()),
            }),
            Arc::new(EmptyWallet),
            FakeClock::new(1_700_000_010),
            Arc::new(CoinbaseOnlyBuilder),
            ConsensusParams::regtest(),
            false,
            false,
        );

        let err = supervisor.stop().await.unwrap_err();
        assert!(matches!(err, StakingError::NotRunning));
    }
}
