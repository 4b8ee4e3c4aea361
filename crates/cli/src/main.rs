//! wgaccess admin CLI
//!
//! Token management for the wgaccess bot. Operates directly on the store
//! database; tokens are never created through the chat interface.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use wgaccess_common::types::AccessToken;
use wgaccess_common::{token, Database};

mod output;

use output::{OutputFormat, TableDisplay};

/// wgaccess admin CLI - prepaid access token management
#[derive(Parser)]
#[command(name = "wgaccess")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Store directory
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new token with an initial balance
    Generate {
        /// Initial balance (non-negative)
        #[arg(value_parser = clap::value_parser!(i64).range(0..))]
        balance: i64,
    },

    /// Add to a token's balance
    Add {
        /// Token identifier
        token: String,

        /// Amount to add (non-negative)
        #[arg(value_parser = clap::value_parser!(i64).range(0..))]
        amount: i64,
    },

    /// Subtract from a token's balance (floors at zero)
    Remove {
        /// Token identifier
        token: String,

        /// Amount to subtract (non-negative)
        #[arg(value_parser = clap::value_parser!(i64).range(0..))]
        amount: i64,
    },

    /// Set a token's balance
    Update {
        /// Token identifier
        token: String,

        /// New balance (non-negative)
        #[arg(value_parser = clap::value_parser!(i64).range(0..))]
        balance: i64,
    },

    /// List all tokens
    List,
}

/// Token display wrapper for serialization
#[derive(Serialize)]
struct TokenDisplay {
    token: String,
    balance: i64,
    created: String,
}

impl From<AccessToken> for TokenDisplay {
    fn from(record: AccessToken) -> Self {
        let created = chrono::DateTime::from_timestamp(record.created_at, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| record.created_at.to_string());
        Self {
            token: record.token,
            balance: record.balance,
            created,
        }
    }
}

impl TableDisplay for TokenDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Token", "Balance", "Created"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.token.clone(),
            self.balance.to_string(),
            self.created.clone(),
        ]
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging; keep stdout clean for scripted use
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        output::print_error(&e.to_string());
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let store = cli.store.unwrap_or_else(wgaccess_common::default_store_path);
    std::fs::create_dir_all(&store)?;
    let db = Database::open(store.join("state.db"))?;

    match cli.command {
        Commands::Generate { balance } => {
            let record = db.insert_token(&token::generate(), balance)?;
            println!("{}", record.token);
        }

        Commands::Add { token, amount } => {
            let balance = db.adjust_balance(&token, amount)?;
            output::print_success(&format!("Balance of {} is now {}", token, balance));
        }

        Commands::Remove { token, amount } => {
            let balance = db.adjust_balance(&token, -amount)?;
            output::print_success(&format!("Balance of {} is now {}", token, balance));
        }

        Commands::Update { token, balance } => {
            db.set_balance(&token, balance)?;
            output::print_success(&format!("Balance of {} set to {}", token, balance));
        }

        Commands::List => {
            let tokens = db.list_tokens()?;
            let displays: Vec<TokenDisplay> = tokens.into_iter().map(TokenDisplay::from).collect();
            output::print_list(&displays, cli.format);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_arguments_must_be_non_negative_integers() {
        assert!(Cli::try_parse_from(["wgaccess", "generate", "100"]).is_ok());
        assert!(Cli::try_parse_from(["wgaccess", "generate", "--", "-5"]).is_err());
        assert!(Cli::try_parse_from(["wgaccess", "generate", "abc"]).is_err());
        assert!(Cli::try_parse_from(["wgaccess", "update", "cafe01", "--", "-1"]).is_err());
        assert!(Cli::try_parse_from(["wgaccess", "add", "cafe01", "30"]).is_ok());
    }

    #[test]
    fn usage_requires_a_subcommand() {
        assert!(Cli::try_parse_from(["wgaccess"]).is_err());
    }

    #[test]
    fn mutations_against_a_real_store() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("state.db")).unwrap();

        let record = db.insert_token(&token::generate(), 100).unwrap();
        assert_eq!(db.adjust_balance(&record.token, -30).unwrap(), 70);
        assert!(db.adjust_balance("missing", 10).is_err());
    }
}
