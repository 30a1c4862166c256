use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ledgerlite::{build_manager, run_sync_loop, telemetry, NodeConfig};
use ledgerlite_core::{Ledger, SignatureCheck, Transaction};
use ledgerlite_crypto::{generate_keypair, Wallet};
use serde_json::json;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "ledgerlite")]
#[command(about = "Proof-of-work ledger with quorum-gated validation", long_about = None)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, overrides RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Key management
    Wallet {
        #[command(subcommand)]
        action: WalletCommand,
    },

    /// Sign and verify transactions
    Tx {
        #[command(subcommand)]
        action: TxCommand,
    },

    /// Mine blocks on a scratch in-memory ledger and print the chain
    Mine {
        /// Signed transaction JSON files to include, one block each
        #[arg(long = "tx")]
        transactions: Vec<PathBuf>,

        /// Extra blocks holding a system reward to this address
        #[arg(long)]
        reward_to: Option<String>,

        #[arg(long, default_value_t = 1)]
        blocks: usize,

        /// Overrides the configured difficulty
        #[arg(long)]
        difficulty: Option<usize>,
    },

    /// Node operations
    Node {
        #[command(subcommand)]
        action: NodeCommand,
    },
}

#[derive(Subcommand)]
enum WalletCommand {
    /// Generate a new key pair
    Create,
    /// Show address and public key for a private key
    Inspect { private_key: String },
}

#[derive(Subcommand)]
enum TxCommand {
    Sign {
        /// Hex private key of the sender
        #[arg(long)]
        key: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        amount: f64,
    },
    /// Verify a transaction read from a JSON file, or stdin with `-`
    Verify { file: PathBuf },
}

#[derive(Subcommand)]
enum NodeCommand {
    /// Run one resolution pass against the configured peers
    Sync,
    /// Resolve periodically until interrupted
    Run,
}

fn read_transaction(path: &PathBuf) -> Result<Transaction> {
    let mut raw = String::new();
    if path.as_os_str() == "-" {
        std::io::stdin().read_to_string(&mut raw).context("reading stdin")?;
    } else {
        raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    }
    serde_json::from_str(&raw).context("parsing transaction JSON")
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = NodeConfig::load(cli.config.as_deref())?;
    telemetry::init(cli.log_level.as_deref(), &config.log_level)?;

    match cli.command {
        Commands::Wallet { action } => match action {
            WalletCommand::Create => {
                let (wallet, address) = generate_keypair();
                print_json(&json!({
                    "address": address,
                    "public_key": wallet.public_key_string(),
                    "private_key": wallet.export_private_key(),
                }))?;
            }
            WalletCommand::Inspect { private_key } => {
                let wallet = Wallet::import_private_key(&private_key)?;
                print_json(&json!({
                    "address": wallet.address(),
                    "public_key": wallet.public_key_string(),
                }))?;
            }
        },
        Commands::Tx { action } => match action {
            TxCommand::Sign { key, to, amount } => {
                let wallet = Wallet::import_private_key(&key)?;
                let mut tx = Transaction::new(wallet.address().into_string(), to, amount)?;
                tx.sign(&wallet)?;
                print_json(&tx)?;
            }
            TxCommand::Verify { file } => {
                let tx = read_transaction(&file)?;
                let check = tx.check_signature();
                let verdict = match &check {
                    SignatureCheck::Valid => "valid".to_string(),
                    SignatureCheck::Exempt => "exempt (system transaction)".to_string(),
                    SignatureCheck::Missing => "missing signature".to_string(),
                    SignatureCheck::Invalid => "invalid".to_string(),
                    SignatureCheck::Malformed(e) => format!("malformed: {}", e),
                };
                println!("Signature {}", verdict);
                if !check.is_acceptable() {
                    std::process::exit(1);
                }
            }
        },
        Commands::Mine {
            transactions,
            reward_to,
            blocks,
            difficulty,
        } => {
            let ledger = Ledger::in_memory(difficulty.unwrap_or(config.difficulty))?;
            for path in &transactions {
                let tx = read_transaction(path)?;
                ledger.submit_transaction(tx)?;
                ledger.mine_pending()?;
            }
            if let Some(address) = reward_to {
                for _ in 0..blocks {
                    ledger.create_block(vec![Transaction::system(address.clone(), 1.0)?])?;
                }
            } else if transactions.is_empty() {
                bail!("nothing to mine: pass --tx and/or --reward-to");
            }
            if !ledger.is_valid_chain(&ledger.chain()) {
                bail!("mined chain failed validation");
            }
            print_json(&json!({
                "chain": ledgerlite_core::ChainResponse::from_chain(&ledger.chain(), None),
                "stats": ledger.stats(),
            }))?;
        }
        Commands::Node { action } => {
            let manager = Arc::new(build_manager(&config, None)?);
            match action {
                NodeCommand::Sync => {
                    let report = manager.resolve().await?;
                    print_json(&report)?;
                    print_json(&manager.network_status())?;
                }
                NodeCommand::Run => {
                    info!(
                        peers = config.bootstrap_peers.len(),
                        interval_secs = config.sync_interval_secs,
                        "starting sync loop"
                    );
                    let shutdown = async {
                        let _ = tokio::signal::ctrl_c().await;
                    };
                    run_sync_loop(manager.clone(), &config, shutdown).await?;
                    print_json(&manager.sync_status())?;
                }
            }
        }
    }

    Ok(())
}
