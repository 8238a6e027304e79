use crate::config::Config;
use crate::error::{AppError, Result};
use crate::graph::GraphClient;
use clap::Subcommand;
use tracing::info;

#[derive(Subcommand, Debug)]
pub enum DriveCommand {
    /// List the items at the root of the site's default drive
    List,
    /// Locate the configured workbook
    Resolve,
}

impl DriveCommand {
    pub async fn execute(&self) -> Result<()> {
        let config = Config::load()?;
        let client = GraphClient::from_config(&config)?;
        if !client.ensure_authenticated().await {
            return Err(AppError::Auth("Graph authentication failed".to_string()));
        }

        match self {
            DriveCommand::List => {
                let items = client
                    .list_drive_root_children()
                    .await
                    .ok_or_else(|| AppError::Graph("Failed to list drive root".to_string()))?;
                info!(count = items.len(), "Listed drive root");
            }
            DriveCommand::Resolve => {
                let file = client.resolve_file().await.ok_or_else(|| {
                    AppError::Graph(format!(
                        "Could not find workbook '{}'",
                        client.config().file_path
                    ))
                })?;
                info!(item_id = %file.item_id, path = %file.path, via = ?file.via, "Resolved workbook");
            }
        }

        Ok(())
    }
}
