use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fieldwork::commands::{
    ConfigCommand, SeedCommand, ShareCommand, StatusCommand, SyncCommand,
};
use fieldwork::config::Config;

#[derive(Parser)]
#[command(name = "fieldwork")]
#[command(version)]
#[command(about = "Field service management data store", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the demo dataset
    Seed(SeedCommand),

    /// Sync with the cloud container and tradesmen directory
    Sync(SyncCommand),

    /// Show store contents and sync position
    Status(StatusCommand),

    /// Share a record through the cloud container
    Share(ShareCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fieldwork=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Seed(cmd)) => cmd.run(&config).await?,
        Some(Commands::Sync(cmd)) => cmd.run(&config).await?,
        Some(Commands::Status(cmd)) => cmd.run(&config).await?,
        Some(Commands::Share(cmd)) => cmd.run(&config).await?,
        Some(Commands::Config(cmd)) => cmd.run(&config)?,
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
