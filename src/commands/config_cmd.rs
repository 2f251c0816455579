use clap::{Args, Subcommand};

use super::OutputFormat;
use crate::config::Config;

#[derive(Debug, Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(config)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");

                        if let Some(path) = &config.config_file {
                            println!("Config file: {}", path.display());
                        } else {
                            println!(
                                "Config file: {} (not found)",
                                Config::default_config_path().display()
                            );
                        }
                        println!();

                        println!("database_path: {}", config.database_path.value.display());
                        println!("  source: {}", config.database_path.source);
                        println!();

                        println!("save_debounce_secs: {}", config.save_debounce_secs.value);
                        println!("  source: {}", config.save_debounce_secs.source);
                        println!();

                        println!("save_interval_secs: {}", config.save_interval_secs.value);
                        println!("  source: {}", config.save_interval_secs.source);
                        println!();

                        match &config.directory_url {
                            Some(url) => println!("directory_url: {}", url),
                            None => println!("directory_url: (not set)"),
                        }
                        println!();

                        println!("cloud.enabled: {}", config.cloud.enabled);
                        if let Some(url) = &config.cloud.server_url {
                            println!("cloud.server_url: {}", url);
                        }
                        println!("cloud.container_id: {}", config.cloud.container_id);
                        println!("cloud.scope: {}", config.cloud.scope);
                        println!("cloud.poll_secs: {}", config.cloud.poll_secs);
                    }
                }
                Ok(())
            }
        }
    }
}
