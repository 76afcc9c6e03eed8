/// Transaction types for Dummycoin
use serde::{Deserialize, Serialize};

/// The message a sender signs to authorize a transfer.
pub fn transfer_message(sender: &str, amount: f64, receiver: &str) -> String {
    format!("{} sends {} dummycoins to {}", sender, amount, receiver)
}

/// A transaction at some point of its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Transaction {
    Pending(PendingTx),
    Verified(VerifiedTx),
    Committed(CommittedTx),
}

impl Transaction {
    pub fn sender(&self) -> &str {
        match self {
            Transaction::Pending(tx) => &tx.sender,
            Transaction::Verified(tx) => &tx.sender,
            Transaction::Committed(tx) => &tx.sender,
        }
    }

    pub fn receiver(&self) -> &str {
        match self {
            Transaction::Pending(tx) => &tx.receiver,
            Transaction::Verified(tx) => &tx.receiver,
            Transaction::Committed(tx) => &tx.receiver,
        }
    }

    pub fn amount(&self) -> f64 {
        match self {
            Transaction::Pending(tx) => tx.amount,
            Transaction::Verified(tx) => tx.amount,
            Transaction::Committed(tx) => tx.amount,
        }
    }

    pub fn submitted_time(&self) -> u64 {
        match self {
            Transaction::Pending(tx) => tx.submitted_time,
            Transaction::Verified(tx) => tx.submitted_time,
            Transaction::Committed(tx) => tx.submitted_time,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Transaction::Pending(_) => "pending",
            Transaction::Verified(_) => "verified",
            Transaction::Committed(_) => "committed",
        }
    }

    pub fn message(&self) -> String {
        transfer_message(self.sender(), self.amount(), self.receiver())
    }

    /// Whether `owner` sent or received this transfer.
    pub fn involves(&self, owner: &str) -> bool {
        self.sender() == owner || self.receiver() == owner
    }
}

/// Signed and queued, not yet checked by a miner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTx {
    pub sender: String,
    pub receiver: String,
    pub amount: f64,
    /// Base64 PSS signature, decoded only at verification.
    pub signature: String,
    /// Unix milliseconds.
    pub submitted_time: u64,
}

impl PendingTx {
    pub fn message(&self) -> String {
        transfer_message(&self.sender, self.amount, &self.receiver)
    }
}

/// Signature checked against the sender's public key; lives only during a mining run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedTx {
    pub sender: String,
    pub receiver: String,
    pub amount: f64,
    pub submitted_time: u64,
    pub verified_time: u64,
}

impl VerifiedTx {
    pub fn commit(self, block_name: &str) -> CommittedTx {
        CommittedTx {
            block_name: block_name.to_string(),
            sender: self.sender,
            receiver: self.receiver,
            amount: self.amount,
            submitted_time: self.submitted_time,
            verified_time: self.verified_time,
        }
    }
}

/// Part of a block in the ledger. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommittedTx {
    pub block_name: String,
    pub sender: String,
    pub receiver: String,
    pub amount: f64,
    pub submitted_time: u64,
    pub verified_time: u64,
}

impl From<&CommittedTx> for VerifiedTx {
    fn from(tx: &CommittedTx) -> Self {
        VerifiedTx {
            sender: tx.sender.clone(),
            receiver: tx.receiver.clone(),
            amount: tx.amount,
            submitted_time: tx.submitted_time,
            verified_time: tx.verified_time,
        }
    }
}

/// Current time as Unix milliseconds.
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
