use clap::Args;

use super::open_session;
use crate::bootstrap::seed_demo_data;
use crate::config::Config;

/// Load the demo dataset into the store
#[derive(Debug, Args)]
pub struct SeedCommand {
    /// Seed even if the store already has data
    #[arg(long)]
    force: bool,
}

impl SeedCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let session = open_session(config, false).await?;

        if !session.is_empty() && !self.force {
            println!("Store already has data; use --force to seed anyway.");
            session.close().await?;
            return Ok(());
        }

        seed_demo_data(&session).await?;
        let counts = session.counts();
        session.close().await?;

        println!("Seeded demo data:");
        println!("  {} customers", counts.customers);
        println!("  {} work orders ({} tasks)", counts.work_orders, counts.tasks);
        println!("  {} tradesmen", counts.tradesmen);
        println!("  {} invoices", counts.invoices);
        println!(
            "  {} inventories ({} usage records)",
            counts.inventories, counts.usage_records
        );
        println!(
            "  {} job categories ({} options)",
            counts.job_categories, counts.job_options
        );
        println!("  {} payment QR codes", counts.payment_qr_codes);

        Ok(())
    }
}
