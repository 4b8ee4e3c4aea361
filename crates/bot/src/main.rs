//! wgaccess daemon
//!
//! Telegram front-end over the profile/token registries and the external
//! WireGuard peer-management tool.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod artifacts;
mod config;
mod router;
mod session;
mod state;
mod telegram;
mod wg;

use config::BotConfig;

/// Environment variable carrying the Telegram credential
const TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";

/// Exit code used when the credential is missing at startup
const EXIT_NO_TOKEN: i32 = 2;

#[derive(Parser)]
#[command(name = "wgaccessd")]
#[command(about = "wgaccess daemon - chat-driven WireGuard peer provisioning")]
#[command(version)]
struct Cli {
    /// Configuration file path (defaults to <store>/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Store directory
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    info!("wgaccess daemon v{}", env!("CARGO_PKG_VERSION"));

    let token = match std::env::var(TOKEN_ENV) {
        Ok(token) if !token.trim().is_empty() => token,
        _ => {
            error!("{} is not set; refusing to start", TOKEN_ENV);
            std::process::exit(EXIT_NO_TOKEN);
        }
    };

    let store_path = cli.store.unwrap_or_else(wgaccess_common::default_store_path);
    tokio::fs::create_dir_all(&store_path).await?;

    let config_path = cli
        .config
        .unwrap_or_else(|| store_path.join("config.toml"));
    let mut config = BotConfig::load(&config_path)?;
    config.store_path = store_path;

    let db = wgaccess_common::Database::open(config.db_path())?;

    let sessions = session::Sessions::new(Duration::from_secs(config.session.timeout_secs));
    tokio::spawn(session::sweeper(sessions.clone()));

    let peers: Arc<dyn wg::PeerBackend> = Arc::new(wg::WgTool::new(config.wg.clone()));
    let state = state::AppState::new(config, db, sessions);
    let router = Arc::new(router::Router::new(state, peers));

    let bot = teloxide::Bot::new(token);
    info!("Dispatching Telegram updates");
    telegram::run(bot, router).await;

    info!("Daemon shutdown complete");
    Ok(())
}
