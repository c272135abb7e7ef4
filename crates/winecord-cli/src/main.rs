use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use winecord_core::AppConfig;

mod commands;

#[derive(Parser)]
#[command(name = "winecord")]
#[command(author, version, about = "Discord rich presence for games running under Wine")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch for games and keep Discord presence up to date
    Run,
    /// Scan running processes once and print the detected game
    Scan,
    /// Show the display name for an executable path
    Resolve {
        /// Windows or Unix path to a `.exe`
        path: String,
    },
    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the configuration file path
    Path,
    /// Write the default configuration if none exists
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.general.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Some(Commands::Run) | None => commands::run::run(config).await,
        Some(Commands::Scan) => commands::scan::run(&config).await,
        Some(Commands::Resolve { path }) => commands::resolve::run(&config, &path),
        Some(Commands::Config { action }) => match action {
            ConfigAction::Path => commands::config::path(),
            ConfigAction::Init => commands::config::init(),
        },
    }
}
