//! Run a full sync pass from the command line.

use clap::{Args, Subcommand};

use super::open_session;
use crate::config::Config;
use crate::sync::directory::DirectoryClient;

/// Sync with the cloud container and the tradesmen directory
#[derive(Debug, Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    command: Option<SyncSubcommand>,
}

#[derive(Debug, Subcommand)]
enum SyncSubcommand {
    /// Show sync configuration
    Status,
}

impl SyncCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            None => self.sync(config).await,
            Some(SyncSubcommand::Status) => self.status(config),
        }
    }

    async fn sync(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        if !config.cloud.is_configured() && config.directory_url.is_none() {
            println!("Nothing to sync: neither cloud nor directory is configured.");
            println!("Run 'fieldwork sync status' for setup instructions.");
            return Ok(());
        }

        let session = open_session(config, true).await?;
        println!("Syncing...");
        println!();

        if let Some(url) = &config.directory_url {
            let client = DirectoryClient::new(url.clone(), config.directory_api_key.clone());
            match client.sync_into(&session).await {
                Ok(imported) => println!("  ✓ directory: {} tradesmen", imported),
                Err(e) => println!("  ✗ directory: {}", e),
            }
        }

        if config.cloud.is_configured() {
            match session.pull_now().await {
                Ok(applied) => println!("  ✓ cloud: {} remote changes applied", applied),
                Err(e) => println!("  ✗ cloud: {}", e),
            }
        }

        // Close flushes pending edits and drains the push queue.
        session.close().await?;
        println!();
        println!("Sync complete.");
        Ok(())
    }

    fn status(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        println!("Sync Configuration");
        println!("==================");
        println!();

        match &config.directory_url {
            Some(url) => println!("Directory: {}", url),
            None => println!("Directory: not configured (set directory_url)"),
        }
        println!();

        if !config.cloud.is_configured() {
            println!("Cloud: not configured");
            println!();
            println!("To enable cloud sync, add to your config file:");
            println!();
            println!("  cloud:");
            println!("    enabled: true");
            println!("    server_url: \"https://cloud.example.com\"");
            println!("    api_key: \"your-api-key\"");
            println!();
            println!("Or set environment variables:");
            println!("  FIELDWORK_CLOUD_ENABLED");
            println!("  FIELDWORK_CLOUD_URL");
            println!("  FIELDWORK_CLOUD_API_KEY");
            return Ok(());
        }

        println!("Cloud: enabled");
        if let Some(url) = &config.cloud.server_url {
            println!("  server:    {}", url);
        }
        println!("  container: {}", config.cloud.container_id);
        println!("  scope:     {}", config.cloud.scope);
        if let Some(key) = &config.cloud.api_key {
            println!("  api key:   {}...", &key[..key.len().min(8)]);
        }
        println!("  poll:      every {}s", config.cloud.poll_secs);

        Ok(())
    }
}
