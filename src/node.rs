//! Wires the identity store, pending queue, ledger and miner together over
//! one storage backend.

use crate::blockchain::{ChainAudit, Ledger};
use crate::config::Config;
use crate::error::ChainError;
use crate::mempool::{JsonFileQueue, MemoryQueue, Mempool, PendingStore};
use crate::miner::{Miner, MiningOutcome, StopSignal};
use crate::persistence::{Database, InMemoryPersistence, Persistence};
use crate::transaction::Transaction;
use crate::wallet::{Identity, WalletStore};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub struct Node {
    config: Config,
    wallets: Arc<WalletStore>,
    mempool: Arc<Mempool>,
    ledger: Arc<Ledger>,
    miner: Miner,
}

impl Node {
    /// Open (creating if needed) the database and pending queue named in `config`.
    pub fn open(config: &Config) -> Result<Self, ChainError> {
        config.validate()?;
        ensure_parent_dir(Path::new(&config.database.path))?;
        ensure_parent_dir(Path::new(&config.mempool.path))?;

        let persistence: Arc<dyn Persistence> = Arc::new(Database::open(&config.database.path)?);
        let queue = Box::new(JsonFileQueue::new(&config.mempool.path));
        info!(
            "Opened ledger at {} with pending queue {}",
            config.database.path, config.mempool.path
        );
        Ok(Self::assemble(config, persistence, queue))
    }

    /// Everything volatile. Nothing touches the filesystem.
    pub fn in_memory(config: &Config) -> Result<Self, ChainError> {
        config.validate()?;
        Ok(Self::assemble(
            config,
            Arc::new(InMemoryPersistence::new()),
            Box::new(MemoryQueue::new()),
        ))
    }

    fn assemble(config: &Config, persistence: Arc<dyn Persistence>, queue: Box<dyn PendingStore>) -> Self {
        let wallets = Arc::new(WalletStore::new(persistence.clone(), &config.wallet));
        let mempool = Arc::new(Mempool::new(queue, wallets.clone()));
        let ledger = Arc::new(Ledger::new(persistence));
        let miner = Miner::new(mempool.clone(), ledger.clone(), &config.miner);
        Node {
            config: config.clone(),
            wallets,
            mempool,
            ledger,
            miner,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn wallets(&self) -> &WalletStore {
        &self.wallets
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn miner(&self) -> &Miner {
        &self.miner
    }

    pub fn generate_identity(&self, owner: &str, passphrase: &str) -> Result<Identity, ChainError> {
        self.wallets.generate(owner, passphrase)
    }

    pub fn submit_transaction(
        &self,
        sender: &str,
        receiver: &str,
        amount: f64,
        passphrase: &str,
    ) -> Result<bool, ChainError> {
        self.mempool.submit(sender, receiver, amount, passphrase)
    }

    pub fn mine(&self) -> Result<MiningOutcome, ChainError> {
        self.miner.mine()
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.miner.stop_signal()
    }

    /// Committed transfers involving `owner` in ledger order, followed by
    /// any still waiting in the queue.
    pub fn history(&self, owner: &str) -> Result<Vec<Transaction>, ChainError> {
        let mut history: Vec<Transaction> = self
            .ledger
            .transactions_for(owner)?
            .into_iter()
            .map(Transaction::Committed)
            .collect();
        history.extend(
            self.mempool
                .pending()?
                .into_iter()
                .map(Transaction::Pending)
                .filter(|tx| tx.involves(owner)),
        );
        Ok(history)
    }

    pub fn balance(&self, owner: &str) -> Result<f64, ChainError> {
        Ok(self.ledger.balances()?.get_balance(owner))
    }

    pub fn audit(&self) -> Result<ChainAudit, ChainError> {
        self.ledger.audit(self.miner.proof_of_work())
    }
}

fn ensure_parent_dir(path: &Path) -> Result<(), ChainError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                ChainError::StorageFailure(format!(
                    "Failed to create data dir {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }
    Ok(())
}
