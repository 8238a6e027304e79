mod auth;
mod drive;
mod sheet;
mod show;

use crate::error::Result;
use clap::{Parser, Subcommand};

pub use auth::AuthProvider;
pub use drive::DriveCommand;
pub use sheet::SheetCommand;
pub use show::ShowResource;

#[derive(Parser, Debug)]
#[command(name = "brideal-sync")]
#[command(about = "Read and append dealership data in a SharePoint Excel workbook", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Commands::Show { resource } => resource.execute().await,
            Commands::Auth {
                provider,
                reset,
                force,
            } => provider.execute(*reset, *force).await,
            Commands::Drive { command } => command.execute().await,
            Commands::Sheet { command } => command.execute().await,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Show {
        #[command(subcommand)]
        resource: ShowResource,
    },
    /// Obtain (or reuse) an access token
    Auth {
        #[command(subcommand)]
        provider: AuthProvider,
        /// Delete the cached token first
        #[arg(long, global = true)]
        reset: bool,
        /// Request a new token even if the cached one is still usable
        #[arg(long, global = true)]
        force: bool,
    },
    /// Inspect the SharePoint drive
    Drive {
        #[command(subcommand)]
        command: DriveCommand,
    },
    /// Read or append worksheet rows
    Sheet {
        #[command(subcommand)]
        command: SheetCommand,
    },
}
