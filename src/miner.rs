//! Proof-of-work mining.
//!
//! A run moves through `Idle -> CollectingTransactions -> SearchingNonce ->
//! Committing -> Idle`. Only one run may be in flight at a time: every run
//! reads the last block hash and appends the next block, so the whole state
//! machine sits behind a single lock.

use crate::blockchain::{Block, Ledger, GENESIS_SEED};
use crate::config::MinerConfig;
use crate::crypto::sha256_hex;
use crate::error::ChainError;
use crate::mempool::{Mempool, VerifiedBatch};
use crate::transaction::{now_millis, VerifiedTx};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How many nonces are tried between checks of the stop signal.
pub const STOP_CHECK_INTERVAL: u64 = 1024;

/// Shared flag that aborts an in-progress nonce search.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The leading-digit puzzle: `sha256(seed + nonce)` must start with
/// `difficulty` copies of `target_digit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofOfWork {
    prefix: String,
}

impl ProofOfWork {
    pub fn new(config: &MinerConfig) -> Self {
        ProofOfWork {
            prefix: config.target_digit.to_string().repeat(config.difficulty),
        }
    }

    pub fn difficulty(&self) -> usize {
        self.prefix.len()
    }

    /// Serialized transactions followed by the previous block hash
    /// (or [`GENESIS_SEED`] for the first block).
    pub fn seed(transactions: &[VerifiedTx], last_block_hash: Option<&str>) -> Result<String, ChainError> {
        let mut seed = serde_json::to_string(transactions)?;
        seed.push_str(last_block_hash.unwrap_or(GENESIS_SEED));
        Ok(seed)
    }

    pub fn meets_target(&self, seed: &str, nonce: u64) -> bool {
        sha256_hex(format!("{}{}", seed, nonce).as_bytes()).starts_with(&self.prefix)
    }

    /// Find the smallest nonce that solves the puzzle for `seed`.
    ///
    /// Unbounded apart from `stop`, which is polled every
    /// [`STOP_CHECK_INTERVAL`] attempts.
    pub fn search(&self, seed: &str, stop: &StopSignal) -> Result<u64, ChainError> {
        let mut nonce: u64 = 0;
        loop {
            if nonce % STOP_CHECK_INTERVAL == 0 && stop.is_stopped() {
                debug!("Nonce search stopped after {} attempts", nonce);
                return Err(ChainError::MiningCancelled);
            }
            if self.meets_target(seed, nonce) {
                debug!("Found nonce {} after {} attempts", nonce, nonce + 1);
                return Ok(nonce);
            }
            nonce = nonce.wrapping_add(1);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinerState {
    Idle,
    CollectingTransactions,
    SearchingNonce,
    Committing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MiningOutcome {
    Mined(Block),
    NothingToMine,
}

pub struct Miner {
    mempool: Arc<Mempool>,
    ledger: Arc<Ledger>,
    pow: ProofOfWork,
    stop: StopSignal,
    state: RwLock<MinerState>,
    run_lock: Mutex<()>,
}

impl Miner {
    pub fn new(mempool: Arc<Mempool>, ledger: Arc<Ledger>, config: &MinerConfig) -> Self {
        Miner {
            mempool,
            ledger,
            pow: ProofOfWork::new(config),
            stop: StopSignal::new(),
            state: RwLock::new(MinerState::Idle),
            run_lock: Mutex::new(()),
        }
    }

    pub fn state(&self) -> MinerState {
        *self.state.read()
    }

    /// Handle that cancels the current (and any later) nonce search.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn proof_of_work(&self) -> &ProofOfWork {
        &self.pow
    }

    /// Seal every currently verifiable pending transaction into a new block.
    ///
    /// Nothing is written unless the whole run succeeds; a cancelled or failed
    /// run leaves both the ledger and the pending queue as they were.
    pub fn mine(&self) -> Result<MiningOutcome, ChainError> {
        let _run = self.run_lock.lock();
        let result = self.run();
        self.set_state(MinerState::Idle);

        match result {
            Ok(block) => Ok(MiningOutcome::Mined(block)),
            Err(ChainError::EmptyMiningSet) => {
                warn!("No transactions found to add to the blockchain");
                Ok(MiningOutcome::NothingToMine)
            }
            Err(e) => Err(e),
        }
    }

    fn run(&self) -> Result<Block, ChainError> {
        self.set_state(MinerState::CollectingTransactions);
        let batch = self.collect()?;
        self.seal(batch)
    }

    /// Search, commit, then drop the examined prefix of the queue. Entries
    /// queued after `batch` was collected are left for the next run.
    fn seal(&self, batch: VerifiedBatch) -> Result<Block, ChainError> {
        self.set_state(MinerState::SearchingNonce);
        let last_block_hash = self.ledger.last_block_hash()?;
        let seed = ProofOfWork::seed(&batch.transactions, last_block_hash.as_deref())?;
        let nonce = self.pow.search(&seed, &self.stop)?;

        self.set_state(MinerState::Committing);
        let block = Block::new(batch.transactions, nonce, now_millis());
        self.ledger.append_block(&block)?;
        self.mempool.clear_mined(batch.examined)?;

        info!("Mined block {} with nonce {}", block.header.name, nonce);
        Ok(block)
    }

    fn collect(&self) -> Result<VerifiedBatch, ChainError> {
        let batch = self.mempool.collect_verified()?;
        if batch.transactions.is_empty() {
            return Err(ChainError::EmptyMiningSet);
        }
        Ok(batch)
    }

    fn set_state(&self, state: MinerState) {
        *self.state.write() = state;
    }
}
