use crate::blockchain::core::chain::{Block, BlockHeader};
use crate::blockchain::core::state::Balances;
use crate::blockchain::core::validation::find_tampered_blocks;
use crate::error::ChainError;
use crate::miner::ProofOfWork;
use crate::persistence::Persistence;
use crate::transaction::{CommittedTx, VerifiedTx};
use std::sync::Arc;
use tracing::info;

/// Append-only store of committed blocks.
#[derive(Clone)]
pub struct Ledger {
    persistence: Arc<dyn Persistence>,
}

/// Result of re-checking every stored block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainAudit {
    pub blocks_checked: usize,
    /// Blocks whose content no longer matches their stored hash.
    pub bad_hash: Vec<String>,
    /// Blocks whose nonce does not solve the puzzle seeded by their predecessor.
    pub bad_work: Vec<String>,
}

impl ChainAudit {
    pub fn is_valid(&self) -> bool {
        self.bad_hash.is_empty() && self.bad_work.is_empty()
    }
}

impl Ledger {
    pub fn new(persistence: Arc<dyn Persistence>) -> Self {
        Ledger { persistence }
    }

    pub fn append_block(&self, block: &Block) -> Result<(), ChainError> {
        self.persistence.append_block(block)?;
        info!(
            "Committed block {} ({} transactions, {} dummycoins)",
            block.header.name, block.header.transaction_count, block.header.total_amount
        );
        Ok(())
    }

    pub fn last_block_hash(&self) -> Result<Option<String>, ChainError> {
        self.persistence.last_block_hash()
    }

    pub fn get_block(&self, name: &str) -> Result<Option<Block>, ChainError> {
        let header = match self.persistence.get_block_header(name)? {
            Some(header) => header,
            None => return Ok(None),
        };
        let transactions = self.persistence.get_transactions(name)?;
        Ok(Some(Block {
            header,
            transactions,
        }))
    }

    pub fn list_blocks(&self) -> Result<Vec<BlockHeader>, ChainError> {
        self.persistence.list_blocks()
    }

    pub fn get_transactions(&self, block_name: &str) -> Result<Vec<CommittedTx>, ChainError> {
        self.persistence.get_transactions(block_name)
    }

    pub fn block_count(&self) -> Result<u64, ChainError> {
        self.persistence.block_count()
    }

    pub fn transactions_for(&self, owner: &str) -> Result<Vec<CommittedTx>, ChainError> {
        self.persistence.transactions_for(owner)
    }

    /// Every block with its transactions, oldest first.
    pub fn blocks(&self) -> Result<Vec<Block>, ChainError> {
        self.list_blocks()?
            .into_iter()
            .map(|header| {
                let transactions = self.persistence.get_transactions(&header.name)?;
                Ok(Block {
                    header,
                    transactions,
                })
            })
            .collect()
    }

    pub fn balances(&self) -> Result<Balances, ChainError> {
        let blocks = self.blocks()?;
        Ok(Balances::from_transactions(
            blocks.iter().flat_map(|b| b.transactions.iter()),
        ))
    }

    /// Recompute every block hash and re-check every proof of work against
    /// the hash of the block before it.
    pub fn audit(&self, pow: &ProofOfWork) -> Result<ChainAudit, ChainError> {
        let blocks = self.blocks()?;
        let mut audit = ChainAudit {
            blocks_checked: blocks.len(),
            bad_hash: find_tampered_blocks(&blocks),
            bad_work: Vec::new(),
        };

        let mut previous_hash: Option<String> = None;
        for block in &blocks {
            let verified: Vec<VerifiedTx> = block.transactions.iter().map(VerifiedTx::from).collect();
            let seed = ProofOfWork::seed(&verified, previous_hash.as_deref())?;
            if !pow.meets_target(&seed, block.header.nonce) {
                audit.bad_work.push(block.header.name.clone());
            }
            previous_hash = Some(block.header.hash.clone());
        }
        Ok(audit)
    }
}
