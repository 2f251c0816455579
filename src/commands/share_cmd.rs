use clap::Args;
use uuid::Uuid;

use super::open_session;
use crate::config::Config;
use crate::session::EntityKind;

/// Share a record through the cloud container
#[derive(Debug, Args)]
pub struct ShareCommand {
    /// What kind of entity to share
    #[arg(long, value_enum)]
    entity: EntityKind,

    /// The entity's id
    #[arg(long)]
    id: Uuid,
}

impl ShareCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        if !config.cloud.is_configured() {
            println!("Sharing requires cloud sync; run 'fieldwork sync status' for setup.");
            return Ok(());
        }

        let session = open_session(config, true).await?;
        let result = session.share_record(self.entity, &self.id).await;
        session.close().await?;

        let handle = result?;
        println!("Shared {} {}", self.entity, self.id);
        println!("  record: {}", handle.record_name);
        println!("  url:    {}", handle.url);
        Ok(())
    }
}
