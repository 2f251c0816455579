mod config_cmd;
mod seed_cmd;
mod share_cmd;
mod status_cmd;
mod sync_cmd;

pub use config_cmd::ConfigCommand;
pub use seed_cmd::SeedCommand;
pub use share_cmd::ShareCommand;
pub use status_cmd::StatusCommand;
pub use sync_cmd::SyncCommand;

use clap::ValueEnum;
use std::sync::Arc;

use crate::cloud::{CloudContainer, HttpCloudContainer};
use crate::codec::TransformerRegistry;
use crate::config::Config;
use crate::session::{SessionError, StoreSession, TracingSink};

#[derive(Debug, Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Open a session for a command: tracing sink, cloud container only
/// when the command wants one and the config provides one.
async fn open_session(
    config: &Config,
    with_cloud: bool,
) -> Result<Arc<StoreSession>, SessionError> {
    let container = if with_cloud {
        config
            .cloud_options()
            .map(|options| Arc::new(HttpCloudContainer::new(&options)) as Arc<dyn CloudContainer>)
    } else {
        None
    };

    StoreSession::open(
        config.store_options(),
        TransformerRegistry::standard(),
        container,
        Arc::new(TracingSink),
    )
    .await
}
