use crate::auth::FileTokenStore;
use crate::auth::deere::DEERE_CACHE_KEY;
use crate::auth::microsoft::GRAPH_CACHE_KEY;
use crate::config::Config;
use crate::error::Result;
use clap::Subcommand;
use tracing::info;

#[derive(Subcommand, Debug)]
pub enum ShowResource {
    /// Show configuration, cache and token file paths
    Paths,
}

impl ShowResource {
    pub async fn execute(&self) -> Result<()> {
        match self {
            ShowResource::Paths => show_paths(),
        }
    }
}

fn show_paths() -> Result<()> {
    let config_path = Config::config_file()?;
    info!(path = ?config_path, "Config path");

    // Paths are still useful before the config file exists
    let config = match config_path.exists() {
        true => Config::from_path(&config_path)?,
        false => Config::default(),
    };
    let cache_dir = config.cache_dir()?;
    info!(path = ?cache_dir, "Cache path");

    let tokens = FileTokenStore::new(&cache_dir);
    info!(path = ?tokens.path_for(GRAPH_CACHE_KEY), "Graph token path");
    info!(path = ?tokens.path_for(DEERE_CACHE_KEY), "John Deere token path");

    Ok(())
}
