use crate::crypto::sha256_hex;
use crate::transaction::{CommittedTx, VerifiedTx};
use rand::RngCore;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Seed used in place of the previous block hash while the ledger is empty.
pub const GENESIS_SEED: &str = "00";

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BlockHeader {
    pub name: String,
    pub transaction_count: u64,
    pub total_amount: f64,
    /// Unix milliseconds at commit.
    pub timestamp: u64,
    /// Winning proof-of-work nonce; part of the hash input.
    pub nonce: u64,
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<CommittedTx>,
}

impl Block {
    /// Seal `verified` into a new block under a fresh random name.
    pub fn new(verified: Vec<VerifiedTx>, nonce: u64, timestamp: u64) -> Self {
        let name = new_block_name();
        let transactions: Vec<CommittedTx> =
            verified.into_iter().map(|tx| tx.commit(&name)).collect();
        let total_amount = transactions.iter().map(|tx| tx.amount).sum();
        let hash = Block::calculate_hash(&name, &transactions, timestamp, nonce);

        Block {
            header: BlockHeader {
                name,
                transaction_count: transactions.len() as u64,
                total_amount,
                timestamp,
                nonce,
                hash,
            },
            transactions,
        }
    }

    pub fn name(&self) -> &str {
        &self.header.name
    }

    pub fn hash(&self) -> &str {
        &self.header.hash
    }

    /// SHA-256 over a sorted-key JSON document of the block contents.
    ///
    /// The owning block name is left out of each transaction; it is already
    /// bound once at the top level.
    pub fn calculate_hash(
        name: &str,
        transactions: &[CommittedTx],
        timestamp: u64,
        nonce: u64,
    ) -> String {
        sha256_hex(hash_document(name, transactions, timestamp, nonce).as_bytes())
    }
}

fn hash_document(name: &str, transactions: &[CommittedTx], timestamp: u64, nonce: u64) -> String {
    let transactions: Vec<Value> = transactions
        .iter()
        .map(|tx| {
            sorted_object(BTreeMap::from([
                ("sender", json!(tx.sender)),
                ("receiver", json!(tx.receiver)),
                ("amount", json!(tx.amount)),
                ("submitted_time", json!(tx.submitted_time)),
                ("verified_time", json!(tx.verified_time)),
            ]))
        })
        .collect();

    sorted_object(BTreeMap::from([
        ("name", json!(name)),
        ("transactions", Value::Array(transactions)),
        ("timestamp", json!(timestamp)),
        ("nonce", json!(nonce)),
    ]))
    .to_string()
}

/// JSON object whose keys are inserted in sorted order, so the encoding is
/// the same whether or not serde_json's `preserve_order` feature is enabled.
fn sorted_object(fields: BTreeMap<&str, Value>) -> Value {
    Value::Object(
        fields
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect::<Map<String, Value>>(),
    )
}

/// 128 random bits, hex encoded.
fn new_block_name() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verified(sender: &str, receiver: &str, amount: f64) -> VerifiedTx {
        VerifiedTx {
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            amount,
            submitted_time: 1_000,
            verified_time: 2_000,
        }
    }

    #[test]
    fn test_block_totals_and_names() {
        let block = Block::new(
            vec![verified("a", "b", 2.0), verified("b", "c", 1.5)],
            7,
            3_000,
        );
        assert_eq!(block.header.transaction_count, 2);
        assert_eq!(block.header.total_amount, 3.5);
        assert_eq!(block.header.name.len(), 32);
        assert!(block.transactions.iter().all(|tx| tx.block_name == block.header.name));
        assert_eq!(block.hash().len(), 64);

        let other = Block::new(vec![verified("a", "b", 2.0)], 7, 3_000);
        assert_ne!(block.name(), other.name());
    }

    #[test]
    fn test_hash_document_has_sorted_keys() {
        let block = Block::new(vec![verified("a", "b", 2.0)], 9, 3_000);
        let document = hash_document("n", &block.transactions, 3_000, 9);
        assert_eq!(
            document,
            r#"{"name":"n","nonce":9,"timestamp":3000,"transactions":[{"amount":2.0,"receiver":"b","sender":"a","submitted_time":1000,"verified_time":2000}]}"#
        );
    }

    #[test]
    fn test_hash_is_deterministic_and_binds_contents() {
        let block = Block::new(vec![verified("a", "b", 2.0)], 11, 5_000);
        let h = &block.header;
        assert_eq!(
            Block::calculate_hash(&h.name, &block.transactions, h.timestamp, h.nonce),
            h.hash
        );
        assert_ne!(
            Block::calculate_hash(&h.name, &block.transactions, h.timestamp, h.nonce + 1),
            h.hash
        );
        assert_ne!(
            Block::calculate_hash(&h.name, &block.transactions, h.timestamp + 1, h.nonce),
            h.hash
        );

        let mut altered = block.transactions.clone();
        altered[0].amount = 3.0;
        assert_ne!(
            Block::calculate_hash(&h.name, &altered, h.timestamp, h.nonce),
            h.hash
        );
    }
}
