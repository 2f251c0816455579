use clap::Args;
use serde::Serialize;

use super::{open_session, OutputFormat};
use crate::config::Config;
use crate::session::EntityCounts;

/// Show store contents and sync position
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output format
    #[arg(long, short, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Serialize)]
struct StatusReport {
    database_path: String,
    entities: EntityCounts,
    total: usize,
    pending_changes: usize,
    history_position: i64,
    cloud_configured: bool,
}

impl StatusCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let session = open_session(config, false).await?;

        let counts = session.counts();
        let report = StatusReport {
            database_path: config.database_path.value.display().to_string(),
            entities: counts,
            total: counts.total(),
            pending_changes: session.pending_changes(),
            history_position: session.history_position().0,
            cloud_configured: config.cloud.is_configured(),
        };
        session.close().await?;

        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            OutputFormat::Text => {
                println!("Store Status");
                println!("============\n");
                println!("Database: {}", report.database_path);
                println!("Pending changes: {}", report.pending_changes);
                println!("History position: {}", report.history_position);
                println!(
                    "Cloud sync: {}",
                    if report.cloud_configured {
                        "configured"
                    } else {
                        "not configured"
                    }
                );
                println!();
                println!("Entities ({} total)", report.total);
                println!("  customers:        {}", report.entities.customers);
                println!("  work orders:      {}", report.entities.work_orders);
                println!("  tasks:            {}", report.entities.tasks);
                println!("  tradesmen:        {}", report.entities.tradesmen);
                println!("  invoices:         {}", report.entities.invoices);
                println!("  inventories:      {}", report.entities.inventories);
                println!("  usage records:    {}", report.entities.usage_records);
                println!("  job categories:   {}", report.entities.job_categories);
                println!("  job options:      {}", report.entities.job_options);
                println!("  payment QR codes: {}", report.entities.payment_qr_codes);
            }
        }

        Ok(())
    }
}
