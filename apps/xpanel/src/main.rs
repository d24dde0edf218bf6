mod cli;
mod generator;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use xpanel_db::db::init_db;
use xpanel_db::repositories::UserRepository;

#[derive(Parser)]
#[command(name = "xpanel")]
#[command(about = "Xray inbound management panel CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the Xray configuration from the stored inbounds
    Config {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate every stored inbound
    Check {
        /// Print the report as a JSON message
        #[arg(long)]
        json: bool,
    },
    /// Disable inbounds that are out of traffic or past their expiry
    DisableInvalid,
    /// Administrative tools
    Admin {
        #[command(subcommand)]
        subcommand: AdminCommands,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Replace the panel login
    ResetCredentials {
        /// New username
        username: String,
        /// New password
        password: String,
    },
    /// Show panel connection information
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Warning: Failed to load .env file: {}", e);
    }

    let cli = Cli::parse();

    let log_dir = std::env::var("XPANEL_LOG_DIR").unwrap_or_else(|_| ".".to_string());
    let file_appender = tracing_appender::rolling::never(log_dir, "xpanel.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "xpanel=debug,xpanel_db=debug,sqlx=warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    let pool = init_db().await?;
    UserRepository::new(pool.clone()).ensure_default_user().await?;

    match cli.command {
        Commands::Config { output } => cli::write_config(&pool, output.as_deref()).await?,
        Commands::Check { json } => cli::check_inbounds(&pool, json).await?,
        Commands::DisableInvalid => cli::disable_invalid(&pool).await?,
        Commands::Admin { subcommand } => match subcommand {
            AdminCommands::ResetCredentials { username, password } => {
                cli::reset_credentials(&pool, &username, &password).await?
            }
            AdminCommands::Info => cli::show_info(&pool).await?,
        },
    }

    Ok(())
}
