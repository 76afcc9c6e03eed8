//! Integration tests for identities, the pending queue and mining over
//! on-disk storage.

use dummycoin::config::{Config, DatabaseConfig, MempoolConfig, WalletConfig};
use dummycoin::error::ChainError;
use dummycoin::miner::MiningOutcome;
use dummycoin::node::Node;
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

/// File-backed node rooted in a fresh temp dir, with fast test crypto.
fn open_node(dir: &TempDir) -> Result<Node, Box<dyn std::error::Error>> {
    let config = Config {
        database: DatabaseConfig {
            path: dir.path().join("data").join("ledger.db").display().to_string(),
        },
        mempool: MempoolConfig {
            path: dir.path().join("data").join("pending.json").display().to_string(),
        },
        wallet: WalletConfig {
            key_bits: 1024,
            kdf_memory_kib: 8,
            kdf_iterations: 1,
            kdf_parallelism: 1,
        },
        ..Config::default()
    };
    Ok(Node::open(&config)?)
}

#[test]
fn test_signatures_round_trip_and_reject_tampering() -> TestResult {
    let dir = TempDir::new()?;
    let node = open_node(&dir)?;
    node.generate_identity("A", "pwdA")?;

    let message = b"A sends 2 dummycoins to B";
    let signature = node.wallets().sign("A", message, "pwdA")?;
    assert!(node.wallets().verify("A", message, &signature)?);

    let mut flipped = signature.clone();
    let last = flipped.len() - 1;
    flipped[last] ^= 0x01;
    assert!(!node.wallets().verify("A", message, &flipped)?);

    assert!(matches!(
        node.wallets().sign("A", message, "not-pwdA"),
        Err(ChainError::WrongPassphrase)
    ));
    Ok(())
}

#[test]
fn test_generate_is_idempotent_across_reopen() -> TestResult {
    let dir = TempDir::new()?;
    let first = {
        let node = open_node(&dir)?;
        node.generate_identity("A", "p1")?
    };

    let node = open_node(&dir)?;
    let second = node.generate_identity("A", "p2")?;
    assert_eq!(first, second);
    assert!(node.wallets().sign("A", b"m", "p1").is_ok());
    Ok(())
}

#[test]
fn test_submit_changes_queue_only_on_success() -> TestResult {
    let dir = TempDir::new()?;
    let node = open_node(&dir)?;
    node.generate_identity("A", "pwdA")?;

    assert!(!node.submit_transaction("ghost", "B", 1.0, "pw")?);
    assert_eq!(node.mempool().len()?, 0);

    assert!(node.submit_transaction("A", "B", 1.0, "pwdA")?);
    assert_eq!(node.mempool().len()?, 1);
    Ok(())
}

#[test]
fn test_verify_pending_skips_tampered_entry() -> TestResult {
    let dir = TempDir::new()?;
    let node = open_node(&dir)?;
    node.generate_identity("A", "pwdA")?;
    node.generate_identity("B", "pwdB")?;

    assert!(node.submit_transaction("A", "B", 1.0, "pwdA")?);
    assert!(node.submit_transaction("B", "A", 2.0, "pwdB")?);
    assert!(node.submit_transaction("A", "B", 3.0, "pwdA")?);

    // Edit the queue file directly: the middle entry's amount no longer
    // matches what was signed.
    let path = &node.config().mempool.path;
    let mut entries: Vec<serde_json::Value> = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    entries[1]["amount"] = serde_json::json!(200.0);
    std::fs::write(path, serde_json::to_string(&entries)?)?;

    let verified = node.mempool().verify_pending()?;
    assert_eq!(verified.len(), 2);
    assert!(verified.iter().all(|tx| tx.sender == "A"));
    Ok(())
}

#[test]
fn test_undecodable_signature_does_not_block_mining() -> TestResult {
    let dir = TempDir::new()?;
    let node = open_node(&dir)?;
    node.generate_identity("A", "pwdA")?;
    node.generate_identity("B", "pwdB")?;
    assert!(node.submit_transaction("A", "B", 1.0, "pwdA")?);
    assert!(node.submit_transaction("B", "A", 2.0, "pwdB")?);

    let path = &node.config().mempool.path;
    let mut entries: Vec<serde_json::Value> = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    entries[0]["signature"] = serde_json::json!("not base64 !!!");
    std::fs::write(path, serde_json::to_string(&entries)?)?;

    assert_eq!(node.mempool().verify_pending()?.len(), 1);
    assert!(node.submit_transaction("A", "B", 3.0, "pwdA")?);

    let block = match node.mine()? {
        MiningOutcome::Mined(block) => block,
        MiningOutcome::NothingToMine => panic!("expected a block"),
    };
    assert_eq!(block.header.transaction_count, 2);
    assert_eq!(block.header.total_amount, 5.0);
    assert!(node.mempool().is_empty()?);
    Ok(())
}

#[test]
fn test_edited_block_total_fails_audit() -> TestResult {
    let dir = TempDir::new()?;
    let node = open_node(&dir)?;
    node.generate_identity("A", "pwdA")?;
    assert!(node.submit_transaction("A", "B", 2.0, "pwdA")?);
    let name = match node.mine()? {
        MiningOutcome::Mined(block) => block.header.name,
        MiningOutcome::NothingToMine => panic!("expected a block"),
    };
    drop(node);

    let conn = rusqlite::Connection::open(dir.path().join("data").join("ledger.db"))?;
    conn.execute("UPDATE blocks SET total_amount = 999.0", [])?;
    drop(conn);

    let node = open_node(&dir)?;
    let audit = node.audit()?;
    assert!(!audit.is_valid());
    assert_eq!(audit.bad_hash, vec![name]);
    Ok(())
}

#[test]
fn test_mine_empty_queue_writes_nothing() -> TestResult {
    let dir = TempDir::new()?;
    let node = open_node(&dir)?;

    assert_eq!(node.mine()?, MiningOutcome::NothingToMine);
    assert_eq!(node.ledger().last_block_hash()?, None);
    assert_eq!(node.ledger().block_count()?, 0);
    Ok(())
}

#[test]
fn test_end_to_end_mining() -> TestResult {
    let dir = TempDir::new()?;
    let node = open_node(&dir)?;
    node.generate_identity("A", "pwdA")?;
    node.generate_identity("B", "pwdB")?;
    assert_eq!(node.ledger().last_block_hash()?, None);

    assert!(node.submit_transaction("A", "B", 2.0, "pwdA")?);
    let block = match node.mine()? {
        MiningOutcome::Mined(block) => block,
        MiningOutcome::NothingToMine => panic!("expected a block"),
    };

    assert_eq!(block.header.transaction_count, 1);
    assert_eq!(block.header.total_amount, 2.0);
    assert!(node.mempool().is_empty()?);
    assert_eq!(node.ledger().last_block_hash()?, Some(block.header.hash.clone()));

    let stored = node
        .ledger()
        .get_block(block.name())?
        .ok_or("block not stored")?;
    assert_eq!(stored, block);
    assert_eq!(node.ledger().get_transactions(block.name())?.len(), 1);
    assert!(node.audit()?.is_valid());
    Ok(())
}

#[test]
fn test_second_mine_without_submissions_is_empty() -> TestResult {
    let dir = TempDir::new()?;
    let node = open_node(&dir)?;
    node.generate_identity("A", "pwdA")?;
    assert!(node.submit_transaction("A", "B", 2.0, "pwdA")?);

    assert!(matches!(node.mine()?, MiningOutcome::Mined(_)));
    assert_eq!(node.mine()?, MiningOutcome::NothingToMine);
    assert_eq!(node.ledger().block_count()?, 1);
    Ok(())
}

#[test]
fn test_ledger_survives_reopen_and_chains() -> TestResult {
    let dir = TempDir::new()?;
    let first_hash = {
        let node = open_node(&dir)?;
        node.generate_identity("A", "pwdA")?;
        assert!(node.submit_transaction("A", "B", 1.5, "pwdA")?);
        node.mine()?;
        node.ledger().last_block_hash()?
    };

    let node = open_node(&dir)?;
    assert_eq!(node.ledger().last_block_hash()?, first_hash);
    assert!(node.submit_transaction("A", "B", 0.5, "pwdA")?);
    node.mine()?;

    let headers = node.ledger().list_blocks()?;
    assert_eq!(headers.len(), 2);
    assert_eq!(Some(headers[0].hash.clone()), first_hash);
    assert!(node.audit()?.is_valid());
    assert_eq!(node.balance("B")?, 2.0);
    Ok(())
}
