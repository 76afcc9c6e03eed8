use crate::blockchain::core::chain::Block;

impl Block {
    /// Recompute the content hash and compare it with the stored one.
    pub fn verify_hash(&self) -> bool {
        let header = &self.header;
        if header.transaction_count != self.transactions.len() as u64 {
            return false;
        }
        if self.transactions.iter().any(|tx| tx.block_name != header.name) {
            return false;
        }
        // The total is not hashed; it must equal the sum of what is.
        let total: f64 = self.transactions.iter().map(|tx| tx.amount).sum();
        if header.total_amount != total {
            return false;
        }
        Block::calculate_hash(&header.name, &self.transactions, header.timestamp, header.nonce)
            == header.hash
    }
}

/// Names of blocks whose stored hash no longer matches their contents.
pub fn find_tampered_blocks<'a>(blocks: impl IntoIterator<Item = &'a Block>) -> Vec<String> {
    blocks
        .into_iter()
        .filter(|block| !block.verify_hash())
        .map(|block| block.header.name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::VerifiedTx;

    fn block() -> Block {
        Block::new(
            vec![VerifiedTx {
                sender: "a".to_string(),
                receiver: "b".to_string(),
                amount: 1.0,
                submitted_time: 1,
                verified_time: 2,
            }],
            42,
            3,
        )
    }

    #[test]
    fn test_verify_hash_detects_tampering() {
        let good = block();
        assert!(good.verify_hash());

        let mut forged_amount = good.clone();
        forged_amount.transactions[0].amount = 100.0;
        assert!(!forged_amount.verify_hash());

        let mut forged_nonce = good.clone();
        forged_nonce.header.nonce = 0;
        assert!(!forged_nonce.verify_hash());

        let mut forged_total = good.clone();
        forged_total.header.total_amount = 999.0;
        assert!(!forged_total.verify_hash());

        let mut dropped = good.clone();
        dropped.transactions.clear();
        assert!(!dropped.verify_hash());

        let tampered = find_tampered_blocks(&[good.clone(), forged_amount.clone()]);
        assert_eq!(tampered, vec![forged_amount.header.name]);
    }
}
