//! Database persistence layer for Dummycoin

use crate::blockchain::{Block, BlockHeader};
use crate::error::ChainError;
use crate::transaction::CommittedTx;
use crate::wallet::Identity;
use rusqlite::types::FromSql;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Storage for the identity table and the ledger tables.
///
/// Every method is a single unit of work: a failed call leaves previously
/// committed state untouched.
pub trait Persistence: Send + Sync {
    /// Fails with `DuplicateIdentity` if the owner already exists.
    fn insert_wallet(&self, identity: &Identity) -> Result<(), ChainError>;
    fn get_wallet(&self, owner: &str) -> Result<Option<Identity>, ChainError>;
    fn list_owners(&self) -> Result<Vec<String>, ChainError>;
    fn remove_wallet(&self, owner: &str) -> Result<bool, ChainError>;

    /// Atomically writes the block row and all of its transaction rows.
    fn append_block(&self, block: &Block) -> Result<(), ChainError>;
    fn last_block_hash(&self) -> Result<Option<String>, ChainError>;
    fn get_block_header(&self, name: &str) -> Result<Option<BlockHeader>, ChainError>;
    /// Headers in insertion order.
    fn list_blocks(&self) -> Result<Vec<BlockHeader>, ChainError>;
    fn get_transactions(&self, block_name: &str) -> Result<Vec<CommittedTx>, ChainError>;
    /// Committed transactions sent or received by `owner`, oldest first.
    fn transactions_for(&self, owner: &str) -> Result<Vec<CommittedTx>, ChainError>;
    fn block_count(&self) -> Result<u64, ChainError>;
}

const WALLET_COLUMNS: usize = 3;
const BLOCK_COLUMNS: usize = 6;
const TRANSACTION_COLUMNS: usize = 6;

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self, ChainError> {
        let conn = Connection::open(path)
            .map_err(|e| ChainError::StorageFailure(format!("Failed to open database: {}", e)))?;

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS wallets (
                owner TEXT PRIMARY KEY,
                public_key BLOB NOT NULL,
                private_key BLOB NOT NULL
            );

            CREATE TABLE IF NOT EXISTS blocks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                transaction_count INTEGER NOT NULL,
                total_amount REAL NOT NULL,
                timestamp INTEGER NOT NULL,
                nonce INTEGER NOT NULL,
                hash TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                block_name TEXT NOT NULL REFERENCES blocks(name),
                sender TEXT NOT NULL,
                receiver TEXT NOT NULL,
                amount REAL NOT NULL,
                submitted_time INTEGER NOT NULL,
                verified_time INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_block ON transactions (block_name);",
        )
        .map_err(|e| ChainError::StorageFailure(format!("Failed to create tables: {}", e)))?;

        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, ChainError> {
        self.conn
            .lock()
            .map_err(|_| ChainError::StorageFailure("Mutex poisoned".to_string()))
    }

    /// Names of the tables in the schema, sorted.
    pub fn table_names(&self) -> Result<Vec<String>, ChainError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }
}

fn check_arity(row: &Row<'_>, expected: usize, record: &str) -> Result<(), ChainError> {
    let actual = row.as_ref().column_count();
    if actual != expected {
        return Err(ChainError::MalformedRecord(format!(
            "{} row has {} columns, expected {}",
            record, actual, expected
        )));
    }
    Ok(())
}

fn column<T: FromSql>(row: &Row<'_>, idx: usize, record: &str) -> Result<T, ChainError> {
    row.get(idx).map_err(|e| {
        ChainError::MalformedRecord(format!("{} column {}: {}", record, idx, e))
    })
}

fn column_u64(row: &Row<'_>, idx: usize, record: &str) -> Result<u64, ChainError> {
    let value: i64 = column(row, idx, record)?;
    u64::try_from(value).map_err(|_| {
        ChainError::MalformedRecord(format!("{} column {} is negative: {}", record, idx, value))
    })
}

fn identity_from_row(row: &Row<'_>) -> Result<Identity, ChainError> {
    check_arity(row, WALLET_COLUMNS, "wallet")?;
    let public_key: Vec<u8> = column(row, 1, "wallet")?;
    let public_key = String::from_utf8(public_key)
        .map_err(|e| ChainError::MalformedRecord(format!("wallet public key: {}", e)))?;
    Ok(Identity {
        owner: column(row, 0, "wallet")?,
        public_key,
        encrypted_private_key: column(row, 2, "wallet")?,
    })
}

fn header_from_row(row: &Row<'_>) -> Result<BlockHeader, ChainError> {
    check_arity(row, BLOCK_COLUMNS, "block")?;
    Ok(BlockHeader {
        name: column(row, 0, "block")?,
        transaction_count: column_u64(row, 1, "block")?,
        total_amount: column(row, 2, "block")?,
        timestamp: column_u64(row, 3, "block")?,
        nonce: column_u64(row, 4, "block")?,
        hash: column(row, 5, "block")?,
    })
}

fn committed_from_row(row: &Row<'_>) -> Result<CommittedTx, ChainError> {
    check_arity(row, TRANSACTION_COLUMNS, "transaction")?;
    Ok(CommittedTx {
        block_name: column(row, 0, "transaction")?,
        sender: column(row, 1, "transaction")?,
        receiver: column(row, 2, "transaction")?,
        amount: column(row, 3, "transaction")?,
        submitted_time: column_u64(row, 4, "transaction")?,
        verified_time: column_u64(row, 5, "transaction")?,
    })
}

const SELECT_HEADER: &str =
    "SELECT name, transaction_count, total_amount, timestamp, nonce, hash FROM blocks";
const SELECT_TRANSACTION: &str =
    "SELECT block_name, sender, receiver, amount, submitted_time, verified_time FROM transactions";

impl Persistence for Database {
    fn insert_wallet(&self, identity: &Identity) -> Result<(), ChainError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO wallets (owner, public_key, private_key) VALUES (?1, ?2, ?3)",
            params![
                identity.owner,
                identity.public_key.as_bytes(),
                identity.encrypted_private_key,
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(ref err, _)
                if err.code == ErrorCode::ConstraintViolation =>
            {
                ChainError::DuplicateIdentity(identity.owner.clone())
            }
            other => ChainError::StorageFailure(format!("Failed to save wallet: {}", other)),
        })?;
        Ok(())
    }

    fn get_wallet(&self, owner: &str) -> Result<Option<Identity>, ChainError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT owner, public_key, private_key FROM wallets WHERE owner = ?1")?;
        let mut rows = stmt.query(params![owner])?;
        match rows.next()? {
            Some(row) => Ok(Some(identity_from_row(row)?)),
            None => Ok(None),
        }
    }

    fn list_owners(&self) -> Result<Vec<String>, ChainError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT owner FROM wallets ORDER BY owner")?;
        let owners = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(owners)
    }

    fn remove_wallet(&self, owner: &str) -> Result<bool, ChainError> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM wallets WHERE owner = ?1", params![owner])?;
        Ok(removed > 0)
    }

    fn append_block(&self, block: &Block) -> Result<(), ChainError> {
        let conn_guard = self.conn()?;
        // Rolled back on drop unless committed.
        let tx = conn_guard.unchecked_transaction().map_err(|e| {
            ChainError::StorageFailure(format!("Failed to start transaction: {}", e))
        })?;

        let header = &block.header;
        tx.execute(
            "INSERT INTO blocks (name, transaction_count, total_amount, timestamp, nonce, hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                header.name,
                header.transaction_count as i64,
                header.total_amount,
                header.timestamp as i64,
                header.nonce as i64,
                header.hash,
            ],
        )
        .map_err(|e| ChainError::StorageFailure(format!("Failed to save block: {}", e)))?;

        for committed in &block.transactions {
            tx.execute(
                "INSERT INTO transactions (block_name, sender, receiver, amount, submitted_time, verified_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    committed.block_name,
                    committed.sender,
                    committed.receiver,
                    committed.amount,
                    committed.submitted_time as i64,
                    committed.verified_time as i64,
                ],
            )
            .map_err(|e| {
                ChainError::StorageFailure(format!("Failed to save transaction: {}", e))
            })?;
        }

        tx.commit().map_err(|e| {
            ChainError::StorageFailure(format!("Failed to commit transaction: {}", e))
        })?;
        Ok(())
    }

    fn last_block_hash(&self) -> Result<Option<String>, ChainError> {
        let conn = self.conn()?;
        let hash = conn
            .query_row("SELECT hash FROM blocks ORDER BY id DESC LIMIT 1", [], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(hash)
    }

    fn get_block_header(&self, name: &str) -> Result<Option<BlockHeader>, ChainError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("{} WHERE name = ?1", SELECT_HEADER))?;
        let mut rows = stmt.query(params![name])?;
        match rows.next()? {
            Some(row) => Ok(Some(header_from_row(row)?)),
            None => Ok(None),
        }
    }

    fn list_blocks(&self) -> Result<Vec<BlockHeader>, ChainError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("{} ORDER BY id ASC", SELECT_HEADER))?;
        let mut rows = stmt.query([])?;
        let mut headers = Vec::new();
        while let Some(row) = rows.next()? {
            headers.push(header_from_row(row)?);
        }
        Ok(headers)
    }

    fn get_transactions(&self, block_name: &str) -> Result<Vec<CommittedTx>, ChainError> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare(&format!("{} WHERE block_name = ?1 ORDER BY id ASC", SELECT_TRANSACTION))?;
        let mut rows = stmt.query(params![block_name])?;
        let mut transactions = Vec::new();
        while let Some(row) = rows.next()? {
            transactions.push(committed_from_row(row)?);
        }
        Ok(transactions)
    }

    fn transactions_for(&self, owner: &str) -> Result<Vec<CommittedTx>, ChainError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE sender = ?1 OR receiver = ?1 ORDER BY id ASC",
            SELECT_TRANSACTION
        ))?;
        let mut rows = stmt.query(params![owner])?;
        let mut transactions = Vec::new();
        while let Some(row) = rows.next()? {
            transactions.push(committed_from_row(row)?);
        }
        Ok(transactions)
    }

    fn block_count(&self) -> Result<u64, ChainError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM blocks", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

/// Simple in-memory persistence implementation useful for tests and ephemeral runs.
#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    wallets: Arc<Mutex<BTreeMap<String, Identity>>>,
    blocks: Arc<Mutex<Vec<Block>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    fn wallets(&self) -> Result<MutexGuard<'_, BTreeMap<String, Identity>>, ChainError> {
        self.wallets
            .lock()
            .map_err(|_| ChainError::StorageFailure("Mutex poisoned".to_string()))
    }

    fn blocks(&self) -> Result<MutexGuard<'_, Vec<Block>>, ChainError> {
        self.blocks
            .lock()
            .map_err(|_| ChainError::StorageFailure("Mutex poisoned".to_string()))
    }
}

impl Persistence for InMemoryPersistence {
    fn insert_wallet(&self, identity: &Identity) -> Result<(), ChainError> {
        let mut wallets = self.wallets()?;
        if wallets.contains_key(&identity.owner) {
            return Err(ChainError::DuplicateIdentity(identity.owner.clone()));
        }
        wallets.insert(identity.owner.clone(), identity.clone());
        Ok(())
    }

    fn get_wallet(&self, owner: &str) -> Result<Option<Identity>, ChainError> {
        Ok(self.wallets()?.get(owner).cloned())
    }

    fn list_owners(&self) -> Result<Vec<String>, ChainError> {
        Ok(self.wallets()?.keys().cloned().collect())
    }

    fn remove_wallet(&self, owner: &str) -> Result<bool, ChainError> {
        Ok(self.wallets()?.remove(owner).is_some())
    }

    fn append_block(&self, block: &Block) -> Result<(), ChainError> {
        let mut blocks = self.blocks()?;
        if blocks.iter().any(|b| b.header.name == block.header.name) {
            return Err(ChainError::StorageFailure(format!(
                "Block {} already exists",
                block.header.name
            )));
        }
        blocks.push(block.clone());
        Ok(())
    }

    fn last_block_hash(&self) -> Result<Option<String>, ChainError> {
        Ok(self.blocks()?.last().map(|b| b.header.hash.clone()))
    }

    fn get_block_header(&self, name: &str) -> Result<Option<BlockHeader>, ChainError> {
        Ok(self
            .blocks()?
            .iter()
            .find(|b| b.header.name == name)
            .map(|b| b.header.clone()))
    }

    fn list_blocks(&self) -> Result<Vec<BlockHeader>, ChainError> {
        Ok(self.blocks()?.iter().map(|b| b.header.clone()).collect())
    }

    fn get_transactions(&self, block_name: &str) -> Result<Vec<CommittedTx>, ChainError> {
        Ok(self
            .blocks()?
            .iter()
            .find(|b| b.header.name == block_name)
            .map(|b| b.transactions.clone())
            .unwrap_or_default())
    }

    fn transactions_for(&self, owner: &str) -> Result<Vec<CommittedTx>, ChainError> {
        Ok(self
            .blocks()?
            .iter()
            .flat_map(|b| b.transactions.iter())
            .filter(|tx| tx.sender == owner || tx.receiver == owner)
            .cloned()
            .collect())
    }

    fn block_count(&self) -> Result<u64, ChainError> {
        Ok(self.blocks()?.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::VerifiedTx;

    fn identity(owner: &str) -> Identity {
        Identity {
            owner: owner.to_string(),
            public_key: format!("public key of {}", owner),
            encrypted_private_key: format!("private key of {}", owner).into_bytes(),
        }
    }

    fn block(amounts: &[f64]) -> Block {
        let verified = amounts
            .iter()
            .map(|&amount| VerifiedTx {
                sender: "alice".to_string(),
                receiver: "bob".to_string(),
                amount,
                submitted_time: 10,
                verified_time: 20,
            })
            .collect();
        Block::new(verified, 99, 30)
    }

    fn backends() -> Vec<Box<dyn Persistence>> {
        vec![
            Box::new(Database::open(":memory:").unwrap()),
            Box::new(InMemoryPersistence::new()),
        ]
    }

    #[test]
    fn test_database_tables() {
        let db = Database::open(":memory:").unwrap();
        assert_eq!(
            db.table_names().unwrap(),
            vec!["blocks", "transactions", "wallets"]
        );
        assert!(db.conn.lock().unwrap().is_autocommit());
    }

    #[test]
    fn test_database_file_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        Database::open(path.to_str().unwrap()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_wallet_table() {
        for store in backends() {
            for owner in ["praveen", "mrinu", "ishu"] {
                store.insert_wallet(&identity(owner)).unwrap();
            }
            assert_eq!(store.list_owners().unwrap(), vec!["ishu", "mrinu", "praveen"]);

            let loaded = store.get_wallet("ishu").unwrap().unwrap();
            assert_eq!(loaded, identity("ishu"));
            assert!(store.get_wallet("ishuu").unwrap().is_none());

            assert!(matches!(
                store.insert_wallet(&identity("praveen")),
                Err(ChainError::DuplicateIdentity(owner)) if owner == "praveen"
            ));

            assert!(store.remove_wallet("praveen").unwrap());
            assert!(!store.remove_wallet("praveen").unwrap());
            assert_eq!(store.list_owners().unwrap(), vec!["ishu", "mrinu"]);
        }
    }

    #[test]
    fn test_ledger_tables() {
        for store in backends() {
            assert_eq!(store.last_block_hash().unwrap(), None);
            assert_eq!(store.block_count().unwrap(), 0);

            let first = block(&[2.0, 1.5]);
            let second = block(&[0.25]);
            store.append_block(&first).unwrap();
            store.append_block(&second).unwrap();

            assert_eq!(store.block_count().unwrap(), 2);
            assert_eq!(store.last_block_hash().unwrap().as_deref(), Some(second.hash()));

            let headers = store.list_blocks().unwrap();
            assert_eq!(headers, vec![first.header.clone(), second.header.clone()]);
            assert_eq!(
                store.get_block_header(first.name()).unwrap(),
                Some(first.header.clone())
            );
            assert_eq!(store.get_block_header("missing").unwrap(), None);
            assert_eq!(store.get_transactions(first.name()).unwrap(), first.transactions);
            assert!(store.get_transactions("missing").unwrap().is_empty());
            assert_eq!(store.transactions_for("bob").unwrap().len(), 3);
            assert!(store.transactions_for("carol").unwrap().is_empty());

            assert!(store.append_block(&first).is_err());
            assert_eq!(store.block_count().unwrap(), 2);
        }
    }

    #[test]
    fn test_failed_append_leaves_no_partial_block() {
        let db = Database::open(":memory:").unwrap();
        let first = block(&[1.0]);
        db.append_block(&first).unwrap();

        // The block row and the first transaction row are written before the
        // last row trips the foreign key; all of them must be rolled back.
        let mut broken = block(&[5.0, 6.0, 7.0]);
        broken.transactions[2].block_name = "no-such-block".to_string();
        assert!(matches!(
            db.append_block(&broken),
            Err(ChainError::StorageFailure(_))
        ));

        assert_eq!(db.block_count().unwrap(), 1);
        assert_eq!(db.get_block_header(broken.name()).unwrap(), None);
        assert!(db.get_transactions(broken.name()).unwrap().is_empty());
        assert!(db.get_transactions("no-such-block").unwrap().is_empty());
        let rows: i64 = db
            .conn
            .lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
        assert_eq!(db.last_block_hash().unwrap().as_deref(), Some(first.hash()));

        // Name clash on the block row itself.
        let mut clash = block(&[2.0]);
        clash.header.name = first.header.name.clone();
        assert!(db.append_block(&clash).is_err());
        assert_eq!(db.block_count().unwrap(), 1);
    }

    #[test]
    fn test_malformed_rows_are_reported() {
        let db = Database::open(":memory:").unwrap();
        db.conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO blocks (name, transaction_count, total_amount, timestamp, nonce, hash)
                 VALUES ('bad', 'many', 1.0, 1, 1, 'h')",
                [],
            )
            .unwrap();
        assert!(matches!(db.list_blocks(), Err(ChainError::MalformedRecord(_))));
    }
}
