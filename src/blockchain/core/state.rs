use crate::transaction::CommittedTx;
use std::collections::HashMap;

/// Net committed flow per owner, rebuilt from ledger transactions.
///
/// The ledger mints nothing, so a balance is simply received minus sent and
/// may be negative.
#[derive(Debug, Clone, Default)]
pub struct Balances {
    pub by_owner: HashMap<String, f64>,
}

impl Balances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_transactions<'a>(transactions: impl IntoIterator<Item = &'a CommittedTx>) -> Self {
        let mut balances = Balances::new();
        for tx in transactions {
            balances.apply(tx);
        }
        balances
    }

    pub fn apply(&mut self, tx: &CommittedTx) {
        *self.by_owner.entry(tx.sender.clone()).or_insert(0.0) -= tx.amount;
        *self.by_owner.entry(tx.receiver.clone()).or_insert(0.0) += tx.amount;
    }

    pub fn get_balance(&self, owner: &str) -> f64 {
        self.by_owner.get(owner).copied().unwrap_or(0.0)
    }
}
