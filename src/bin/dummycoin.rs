#![forbid(unsafe_code)]
//! Dummycoin command line: identities, transfers, mining and ledger queries.

use clap::{Parser, Subcommand};
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Color as TableColor;
use comfy_table::{Attribute, Cell, ContentArrangement, Table};
use dummycoin::blockchain::Block;
use dummycoin::config::{load_config, DEFAULT_CONFIG_FILE};
use dummycoin::miner::MiningOutcome;
use dummycoin::node::Node;
use dummycoin::transaction::Transaction;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Single-node dummycoin ledger", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage identities
    Wallet {
        #[command(subcommand)]
        command: WalletCommands,
    },
    /// Sign a transfer and queue it for the next block
    Send {
        sender: String,
        receiver: String,
        amount: f64,
        /// Sender's passphrase (prompted for when omitted)
        #[arg(long)]
        password: Option<String>,
    },
    /// Show transactions waiting to be mined
    Pending,
    /// Verify pending transactions and seal them into a block
    Mine,
    /// List every block, oldest first
    Blocks,
    /// Show one block and its transactions
    Block { name: String },
    /// Recheck every block hash and proof of work
    Verify,
    /// Transfers sent or received by an owner
    History { owner: String },
    /// Net committed flow for an owner
    Balance { owner: String },
}

#[derive(Subcommand)]
enum WalletCommands {
    /// Create an identity (no-op if it already exists)
    New {
        owner: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// List identity owners
    List,
    /// Delete an identity
    Remove { owner: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let node = Arc::new(Node::open(&config)?);

    match cli.command {
        Commands::Wallet { command } => wallet(&node, command)?,
        Commands::Send {
            sender,
            receiver,
            amount,
            password,
        } => {
            let password = passphrase(password, &sender)?;
            if node.submit_transaction(&sender, &receiver, amount, &password)? {
                println!(
                    "{} {} sends {} dummycoins to {}",
                    "✅ Queued:".bright_green().bold(),
                    sender,
                    amount,
                    receiver
                );
            } else {
                eprintln!(
                    "{}",
                    format!("❌ Could not sign as {} (unknown owner or wrong passphrase)", sender)
                        .red()
                );
            }
        }
        Commands::Pending => pending(&node)?,
        Commands::Mine => mine(node).await?,
        Commands::Blocks => blocks(&node)?,
        Commands::Block { name } => match node.ledger().get_block(&name)? {
            Some(block) => print_block(&block),
            None => eprintln!("{}", format!("No block named {}", name).yellow()),
        },
        Commands::Verify => verify(&node)?,
        Commands::History { owner } => history(&node, &owner)?,
        Commands::Balance { owner } => {
            let balance = node.balance(&owner)?;
            let shown = if balance < 0.0 {
                balance.to_string().red()
            } else {
                balance.to_string().bright_green()
            };
            println!("{} {} dummycoins", format!("{}:", owner).bright_white().bold(), shown);
        }
    }

    Ok(())
}

fn passphrase(given: Option<String>, owner: &str) -> Result<String, Box<dyn std::error::Error>> {
    match given {
        Some(password) => Ok(password),
        None => Ok(rpassword::prompt_password(format!("Passphrase for {}: ", owner))?),
    }
}

fn wallet(node: &Node, command: WalletCommands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        WalletCommands::New { owner, password } => {
            let password = passphrase(password, &owner)?;
            let identity = node.generate_identity(&owner, &password)?;
            println!("{} {}", "🔑 Identity ready:".bright_green().bold(), identity.owner);
            println!("{}", identity.public_key.dimmed());
        }
        WalletCommands::List => {
            let owners = node.wallets().owners()?;
            if owners.is_empty() {
                println!("{}", "No identities yet. Run 'wallet new <owner>'.".yellow());
            }
            for owner in owners {
                println!("  - {}", owner.bright_white());
            }
        }
        WalletCommands::Remove { owner } => {
            if node.wallets().remove(&owner)? {
                println!("{} {}", "🗑️  Removed".bright_green(), owner);
            } else {
                println!("{}", format!("No identity for {}", owner).yellow());
            }
        }
    }
    Ok(())
}

async fn mine(node: Arc<Node>) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "⛏️  Mining...".bright_cyan().bold());
    let stop = node.stop_signal();
    let worker = node.clone();
    let start_time = Instant::now();

    let mut task = tokio::task::spawn_blocking(move || worker.mine());
    let outcome = tokio::select! {
        joined = &mut task => joined?,
        _ = tokio::signal::ctrl_c() => {
            println!("{}", "Stopping miner...".yellow());
            stop.stop();
            task.await?
        }
    }?;

    match outcome {
        MiningOutcome::Mined(block) => {
            println!(
                "{} in {:.3} seconds",
                "✅ BLOCK MINED".bright_green().bold(),
                start_time.elapsed().as_secs_f64()
            );
            print_block(&block);
        }
        MiningOutcome::NothingToMine => {
            println!("{}", "No transactions found to add to the blockchain".yellow());
        }
    }
    Ok(())
}

fn pending(node: &Node) -> Result<(), Box<dyn std::error::Error>> {
    let pending = node.mempool().pending()?;
    if pending.is_empty() {
        println!("{}", "Queue is empty".yellow());
        return Ok(());
    }

    let mut table = new_table(&["Sender", "Receiver", "Amount", "Submitted"]);
    for tx in &pending {
        table.add_row(vec![
            Cell::new(&tx.sender),
            Cell::new(&tx.receiver),
            Cell::new(tx.amount).fg(TableColor::Green),
            Cell::new(format_millis(tx.submitted_time)),
        ]);
    }
    println!("{table}");
    println!("{} pending", pending.len());
    Ok(())
}

fn blocks(node: &Node) -> Result<(), Box<dyn std::error::Error>> {
    let headers = node.ledger().list_blocks()?;
    if headers.is_empty() {
        println!("{}", "Ledger is empty".yellow());
        return Ok(());
    }

    let mut table = new_table(&["Name", "Txs", "Total", "Timestamp", "Nonce", "Hash"]);
    for header in &headers {
        table.add_row(vec![
            Cell::new(&header.name),
            Cell::new(header.transaction_count),
            Cell::new(header.total_amount).fg(TableColor::Green),
            Cell::new(format_millis(header.timestamp)),
            Cell::new(header.nonce),
            Cell::new(short_hash(&header.hash)).fg(TableColor::Cyan),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn verify(node: &Node) -> Result<(), Box<dyn std::error::Error>> {
    let audit = node.audit()?;
    if audit.is_valid() {
        println!(
            "{} {} blocks checked",
            "✅ Ledger intact:".bright_green().bold(),
            audit.blocks_checked
        );
        return Ok(());
    }

    println!("{}", "❌ Ledger failed verification".red().bold());
    for name in &audit.bad_hash {
        println!("  {} {}", "hash mismatch:".red(), name);
    }
    for name in &audit.bad_work {
        println!("  {} {}", "bad proof of work:".red(), name);
    }
    Err(format!(
        "{} of {} blocks failed verification",
        audit.bad_hash.len() + audit.bad_work.len(),
        audit.blocks_checked
    )
    .into())
}

fn history(node: &Node, owner: &str) -> Result<(), Box<dyn std::error::Error>> {
    let history = node.history(owner)?;
    if history.is_empty() {
        println!("{}", format!("No transfers for {}", owner).yellow());
        return Ok(());
    }

    let mut table = new_table(&["Status", "Direction", "Counterparty", "Amount", "Block"]);
    for tx in &history {
        let (direction, counterparty, color) = if tx.sender() == owner && tx.receiver() == owner {
            ("↔️  Self", tx.receiver(), TableColor::Yellow)
        } else if tx.sender() == owner {
            ("📤 Sent", tx.receiver(), TableColor::Red)
        } else {
            ("📥 Received", tx.sender(), TableColor::Green)
        };
        let block = match tx {
            Transaction::Committed(committed) => committed.block_name.clone(),
            _ => "-".to_string(),
        };
        table.add_row(vec![
            Cell::new(tx.status()),
            Cell::new(direction).fg(color),
            Cell::new(counterparty),
            Cell::new(tx.amount()).fg(color),
            Cell::new(block),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn print_block(block: &Block) {
    let header = &block.header;
    println!("{} {}", "Block".bright_cyan().bold(), header.name.bright_white());
    println!("  Hash:        {}", header.hash);
    println!("  Timestamp:   {}", format_millis(header.timestamp));
    println!("  Nonce:       {}", header.nonce);
    println!("  Total:       {} dummycoins", header.total_amount);

    let mut table = new_table(&["Sender", "Receiver", "Amount", "Submitted", "Verified"]);
    for tx in &block.transactions {
        table.add_row(vec![
            Cell::new(&tx.sender),
            Cell::new(&tx.receiver),
            Cell::new(tx.amount).fg(TableColor::Green),
            Cell::new(format_millis(tx.submitted_time)),
            Cell::new(format_millis(tx.verified_time)),
        ]);
    }
    println!("{table}");
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold).fg(TableColor::Cyan))
                .collect::<Vec<_>>(),
        );
    table
}

fn format_millis(millis: u64) -> String {
    match chrono::DateTime::from_timestamp_millis(millis as i64) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string(),
        None => millis.to_string(),
    }
}

fn short_hash(hash: &str) -> String {
    if hash.len() > 16 {
        format!("{}...", &hash[..13])
    } else {
        hash.to_string()
    }
}
