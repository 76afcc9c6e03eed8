//! Pending transactions: the queue medium and the submit/verify/clear pipeline.

use crate::error::ChainError;
use crate::transaction::{now_millis, transfer_message, validate_transfer, PendingTx, VerifiedTx};
use crate::wallet::WalletStore;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A durable, overwritable sequence of pending transactions.
pub trait PendingStore: Send {
    fn read_all(&self) -> Result<Vec<PendingTx>, ChainError>;
    fn write_all(&mut self, transactions: &[PendingTx]) -> Result<(), ChainError>;
}

/// JSON array on disk. A missing file is an empty queue.
pub struct JsonFileQueue {
    path: PathBuf,
}

impl JsonFileQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileQueue { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PendingStore for JsonFileQueue {
    fn read_all(&self) -> Result<Vec<PendingTx>, ChainError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&content).map_err(|e| {
            ChainError::MalformedRecord(format!(
                "Pending queue {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    fn write_all(&mut self, transactions: &[PendingTx]) -> Result<(), ChainError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(transactions)?;
        let temp_path = self.path.with_extension("json.tmp");
        let mut file = File::create(&temp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;

        // Atomic rename
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

/// Volatile queue for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryQueue {
    transactions: Vec<PendingTx>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PendingStore for MemoryQueue {
    fn read_all(&self) -> Result<Vec<PendingTx>, ChainError> {
        Ok(self.transactions.clone())
    }

    fn write_all(&mut self, transactions: &[PendingTx]) -> Result<(), ChainError> {
        self.transactions = transactions.to_vec();
        Ok(())
    }
}

/// Verified transactions plus how many queue entries were examined to get them.
#[derive(Debug, Clone)]
pub struct VerifiedBatch {
    pub examined: usize,
    pub transactions: Vec<VerifiedTx>,
}

pub struct Mempool {
    queue: Mutex<Box<dyn PendingStore>>,
    wallets: Arc<WalletStore>,
}

impl Mempool {
    pub fn new(queue: Box<dyn PendingStore>, wallets: Arc<WalletStore>) -> Self {
        Mempool {
            queue: Mutex::new(queue),
            wallets,
        }
    }

    /// Sign a transfer as `sender` and queue it.
    ///
    /// Returns `Ok(false)` and leaves the queue alone when the sender is
    /// unknown or the passphrase is wrong.
    pub fn submit(
        &self,
        sender: &str,
        receiver: &str,
        amount: f64,
        passphrase: &str,
    ) -> Result<bool, ChainError> {
        validate_transfer(sender, receiver, amount)?;

        let message = transfer_message(sender, amount, receiver);
        let signature = match self.wallets.sign(sender, message.as_bytes(), passphrase) {
            Ok(signature) => signature,
            Err(ChainError::IdentityNotFound(_)) | Err(ChainError::WrongPassphrase) => {
                warn!("Could not sign transaction from {}", sender);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let pending = PendingTx {
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            amount,
            signature: BASE64.encode(signature),
            submitted_time: now_millis(),
        };

        let mut queue = self.queue.lock();
        let mut transactions = queue.read_all()?;
        transactions.push(pending);
        queue.write_all(&transactions)?;

        info!("Queued: {}", message);
        Ok(true)
    }

    pub fn pending(&self) -> Result<Vec<PendingTx>, ChainError> {
        self.queue.lock().read_all()
    }

    pub fn len(&self) -> Result<usize, ChainError> {
        Ok(self.pending()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, ChainError> {
        Ok(self.len()? == 0)
    }

    /// Every pending transaction whose signature checks out, stamped now.
    ///
    /// Entries that fail verification are dropped from the result only; the
    /// queue itself is not modified.
    pub fn verify_pending(&self) -> Result<Vec<VerifiedTx>, ChainError> {
        Ok(self.collect_verified()?.transactions)
    }

    pub fn collect_verified(&self) -> Result<VerifiedBatch, ChainError> {
        // Snapshot under the lock; signature checks run without it.
        let snapshot = self.pending()?;
        let examined = snapshot.len();
        let mut transactions = Vec::with_capacity(examined);

        for pending in snapshot {
            let public_key = match self.wallets.public_key(&pending.sender) {
                Ok(key) => key,
                Err(ChainError::IdentityNotFound(_)) | Err(ChainError::CryptoError(_)) => {
                    warn!("Dropping transaction from unknown sender {}", pending.sender);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let sender = pending.sender.clone();
            match pending.verify(&public_key, now_millis()) {
                Ok(verified) => transactions.push(verified),
                Err(_) => warn!("Dropping transaction from {} with invalid signature", sender),
            }
        }

        debug!("Verified {} of {} pending transactions", transactions.len(), examined);
        Ok(VerifiedBatch {
            examined,
            transactions,
        })
    }

    /// Empty the queue unconditionally.
    pub fn clear(&self) -> Result<(), ChainError> {
        self.queue.lock().write_all(&[])
    }

    /// Remove the first `count` entries, the ones a mining run examined.
    ///
    /// Entries appended after that snapshot stay queued. With no concurrent
    /// submissions this is the same as [`Mempool::clear`].
    pub fn clear_mined(&self, count: usize) -> Result<(), ChainError> {
        let mut queue = self.queue.lock();
        let mut transactions = queue.read_all()?;
        let count = count.min(transactions.len());
        transactions.drain(..count);
        queue.write_all(&transactions)
    }
}
