use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::application::{AppError, BankService};
use crate::config::BankConfig;
use crate::domain::{AccountSnapshot, Amount};
use crate::telemetry;

/// Arca - bank ledger
#[derive(Parser)]
#[command(name = "arca")]
#[command(about = "A bank ledger with per-account optimistic concurrency")]
#[command(version)]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Database file path (overrides the configuration file)
    #[arg(short, long, global = true)]
    pub database: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the database if it does not exist yet
    Init,

    /// List all accounts
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Open a new account with a zero balance
    Create {
        /// Holder name (must be unique)
        holder: String,
    },

    /// Show one account
    Show {
        /// Holder name
        holder: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Delete an account
    Delete {
        /// Holder name
        holder: String,
    },

    /// Deposit into an account
    Deposit {
        /// Holder name
        holder: String,

        /// Whole units to deposit
        #[arg(allow_negative_numbers = true)]
        amount: Amount,
    },

    /// Withdraw from an account
    Withdraw {
        /// Holder name
        holder: String,

        /// Whole units to withdraw
        #[arg(allow_negative_numbers = true)]
        amount: Amount,
    },
}

impl Cli {
    pub fn load_config(&self) -> Result<BankConfig> {
        let mut config = BankConfig::load(self.config.as_deref())?;
        if let Some(path) = &self.database {
            config = config.with_database_path(path);
            config.validate()?;
        }
        Ok(config)
    }

    pub async fn run(self) -> Result<()> {
        telemetry::init(self.verbose);
        let config = self.load_config()?;
        let service = BankService::open(&config).await?;

        match self.command {
            Commands::Init => {
                println!("Database ready: {}", config.database.path.display());
            }

            Commands::List { json } => {
                let accounts = service.list_accounts().await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&accounts)?);
                } else if accounts.is_empty() {
                    println!("No accounts found.");
                } else {
                    println!("{:<24} {:>14} {:>8}", "HOLDER", "BALANCE", "VERSION");
                    println!("{}", "-".repeat(48));
                    for account in accounts {
                        println!(
                            "{:<24} {:>14} {:>8}",
                            account.holder_name, account.balance, account.version
                        );
                    }
                }
            }

            Commands::Create { holder } => {
                let account = service.create_account(&holder).await?;
                println!("Created account for {} ({})", account.holder_name, account.id);
            }

            Commands::Show { holder, json } => {
                let account = resolve(&service, &holder).await?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&account)?);
                } else {
                    print_account(&account);
                }
            }

            Commands::Delete { holder } => {
                let account = resolve(&service, &holder).await?;
                service.delete_account(&account).await?;
                println!("Deleted account for {}", account.holder_name);
            }

            Commands::Deposit { holder, amount } => {
                let account = resolve(&service, &holder).await?;
                let updated = service.deposit(&account, amount).await?;
                println!(
                    "Deposited {} to {}. Balance: {}",
                    amount, updated.holder_name, updated.balance
                );
            }

            Commands::Withdraw { holder, amount } => {
                let account = resolve(&service, &holder).await?;
                let updated = service.withdraw(&account, amount).await?;
                println!(
                    "Withdrew {} from {}. Balance: {}",
                    amount, updated.holder_name, updated.balance
                );
            }
        }

        service.gateway().repository().close().await;
        Ok(())
    }
}

async fn resolve(service: &BankService, holder: &str) -> Result<AccountSnapshot, AppError> {
    service
        .get_account(holder)
        .await?
        .ok_or_else(|| AppError::NotFound(holder.to_string()))
}

fn print_account(account: &AccountSnapshot) {
    println!("Account: {}", account.holder_name);
    println!("  ID:       {}", account.id);
    println!("  Balance:  {}", account.balance);
    println!("  Version:  {}", account.version);
    println!(
        "  Created:  {}",
        account.created_at.format("%Y-%m-%d %H:%M:%S")
    );
}
