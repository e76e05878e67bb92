//! LendPool CLI - Main entry point

use anyhow::Context;
use clap::{Parser, Subcommand};
use lendpool_core::ReceiptId;
use lendpool_oracle::FeedId;
use lendpool_rpc::commands::{self, AttestArgs};
use lendpool_rpc::config::{ConfigLoader, OracleConfig, PoolConfig, DEFAULT_FEED_ID};
use lendpool_rpc::service::{Clock, SystemClock};
use lendpool_rpc::AppContext;
use rust_decimal::Decimal;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lendpool")]
#[command(about = "LendPool - over-collateralized lending pool", long_about = None)]
struct Cli {
    /// Data directory path
    #[arg(short, long, default_value = "./data")]
    data: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new pool in the data directory
    Init {
        /// Read the whole configuration from a TOML file
        #[arg(long, conflicts_with_all = ["anchor", "quorum", "trust_set_index", "feed_id"])]
        config: Option<PathBuf>,
        /// Trust-anchor public key (hex), in signer order
        #[arg(long)]
        anchor: Vec<String>,
        /// Signatures required (default: more than two thirds)
        #[arg(long)]
        quorum: Option<usize>,
        /// Trust set index attestations must carry
        #[arg(long, default_value = "0")]
        trust_set_index: u32,
        /// Collateral price feed id (hex)
        #[arg(long)]
        feed_id: Option<FeedId>,
    },

    /// Generate trust-anchor signing keys
    Keygen {
        /// Number of keys
        #[arg(long, default_value = "3")]
        count: u8,
    },

    /// Sign a price attestation with trust-anchor seeds
    Attest {
        /// Collateral price in base-asset units
        price: Decimal,
        /// Signer seed (hex); repeat in signer order
        #[arg(long, required = true)]
        seed: Vec<String>,
        #[arg(long, default_value = "0")]
        trust_set_index: u32,
        #[arg(long)]
        feed_id: Option<FeedId>,
        #[arg(long, default_value = "0")]
        confidence: Decimal,
        /// Unix seconds (default: now)
        #[arg(long)]
        publish_time: Option<u64>,
        /// Write hex to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Deposit base asset as a lender
    Deposit {
        user: String,
        amount: Decimal,
        /// Existing lender receipt to top up
        #[arg(long)]
        receipt: Option<ReceiptId>,
    },

    /// Withdraw yield first, then principal
    Withdraw {
        user: String,
        receipt: ReceiptId,
        amount: Decimal,
    },

    /// Borrow against collateral
    Borrow {
        user: String,
        amount: Decimal,
        /// Collateral posted with this borrow
        #[arg(long, default_value = "0")]
        collateral: Decimal,
        /// Attestation hex, or a file containing it
        #[arg(long)]
        attestation: String,
        /// Existing borrower receipt
        #[arg(long)]
        receipt: Option<ReceiptId>,
    },

    /// Post more collateral
    AddCollateral {
        user: String,
        receipt: ReceiptId,
        amount: Decimal,
    },

    /// Release collateral while the health factor stays above the initiation floor
    WithdrawCollateral {
        user: String,
        receipt: ReceiptId,
        amount: Decimal,
        #[arg(long)]
        attestation: String,
    },

    /// Repay the full debt and release collateral
    Repay {
        user: String,
        receipt: ReceiptId,
        amount: Decimal,
    },

    /// Liquidate an unhealthy position
    Liquidate {
        liquidator: String,
        receipt: ReceiptId,
        #[arg(long)]
        attestation: String,
    },

    /// Show pool totals and rates
    Status,

    /// Show one position
    Position {
        receipt: ReceiptId,
        /// Also report the health factor at this price
        #[arg(long)]
        attestation: Option<String>,
    },

    /// Hand a receipt to another owner
    TransferReceipt {
        from: String,
        receipt: ReceiptId,
        to: String,
    },

    /// Audit the journal (verify hash chain)
    Audit,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let now = SystemClock.now();

    match cli.command {
        Commands::Init {
            config,
            anchor,
            quorum,
            trust_set_index,
            feed_id,
        } => {
            let config = match config {
                Some(path) => ConfigLoader::load_file(&path)?.into_config(),
                None => PoolConfig {
                    oracle: OracleConfig {
                        feed_id: feed_id.unwrap_or(DEFAULT_FEED_ID),
                        trust_set_index,
                        trust_anchors: anchor,
                        quorum,
                        ..OracleConfig::default()
                    },
                    ..PoolConfig::default()
                },
            };
            commands::init(&cli.data, config)?;
        }

        Commands::Keygen { count } => commands::keygen(count)?,

        Commands::Attest {
            price,
            seed,
            trust_set_index,
            feed_id,
            confidence,
            publish_time,
            output,
        } => {
            let hex = commands::attest(AttestArgs {
                seeds: &seed,
                trust_set_index,
                feed_id: feed_id.unwrap_or(DEFAULT_FEED_ID),
                price,
                confidence,
                publish_time: publish_time.unwrap_or(now),
            })?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &hex)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    println!("✅ Attestation written to {}", path.display());
                }
                None => println!("{}", hex),
            }
        }

        Commands::Deposit {
            user,
            amount,
            receipt,
        } => {
            let mut ctx = AppContext::open(&cli.data)?;
            commands::deposit(&mut ctx, &user, receipt, amount, now)?;
        }

        Commands::Withdraw {
            user,
            receipt,
            amount,
        } => {
            let mut ctx = AppContext::open(&cli.data)?;
            commands::withdraw(&mut ctx, &user, receipt, amount, now)?;
        }

        Commands::Borrow {
            user,
            amount,
            collateral,
            attestation,
            receipt,
        } => {
            let raw = commands::read_attestation(&attestation)?;
            let mut ctx = AppContext::open(&cli.data)?;
            commands::borrow(&mut ctx, &user, receipt, amount, collateral, &raw, now)?;
        }

        Commands::AddCollateral {
            user,
            receipt,
            amount,
        } => {
            let mut ctx = AppContext::open(&cli.data)?;
            commands::add_collateral(&mut ctx, &user, receipt, amount, now)?;
        }

        Commands::WithdrawCollateral {
            user,
            receipt,
            amount,
            attestation,
        } => {
            let raw = commands::read_attestation(&attestation)?;
            let mut ctx = AppContext::open(&cli.data)?;
            commands::withdraw_collateral(&mut ctx, &user, receipt, amount, &raw, now)?;
        }

        Commands::Repay {
            user,
            receipt,
            amount,
        } => {
            let mut ctx = AppContext::open(&cli.data)?;
            commands::repay(&mut ctx, &user, receipt, amount, now)?;
        }

        Commands::Liquidate {
            liquidator,
            receipt,
            attestation,
        } => {
            let raw = commands::read_attestation(&attestation)?;
            let mut ctx = AppContext::open(&cli.data)?;
            commands::liquidate(&mut ctx, &liquidator, receipt, &raw, now)?;
        }

        Commands::Status => {
            let ctx = AppContext::open(&cli.data)?;
            commands::status(&ctx, now)?;
        }

        Commands::Position {
            receipt,
            attestation,
        } => {
            let raw = attestation
                .as_deref()
                .map(commands::read_attestation)
                .transpose()?;
            let ctx = AppContext::open(&cli.data)?;
            commands::position(&ctx, receipt, raw.as_deref(), now)?;
        }

        Commands::TransferReceipt { from, receipt, to } => {
            let mut ctx = AppContext::open(&cli.data)?;
            commands::transfer_receipt(&mut ctx, &from, receipt, &to, now)?;
        }

        Commands::Audit => {
            let ctx = AppContext::open(&cli.data)?;
            commands::audit(&ctx)?;
        }
    }

    Ok(())
}
