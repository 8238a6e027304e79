use crate::clock::default_clock;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::graph::GraphClient;
use crate::models::{SheetRow, rows_from_csv};
use crate::sync::refresh::DEFAULT_STOP_TIMEOUT;
use crate::sync::{
    BackgroundRefresh, RefreshSchedule, SheetCache, SheetReader, UploadOutcome,
    append_with_deadline,
};
use clap::Subcommand;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Subcommand, Debug)]
pub enum SheetCommand {
    /// Print a worksheet's used range
    Read {
        /// Worksheet name, defaults to the configured sheet
        sheet: Option<String>,
        /// Skip the local cache and read from SharePoint
        #[arg(long)]
        no_cache: bool,
        /// Print one JSON object per data row instead of tab-separated text
        #[arg(long)]
        json: bool,
    },
    /// Append the rows of a CSV file below a worksheet's used range
    Append {
        /// Worksheet name, defaults to the configured sheet
        sheet: Option<String>,
        #[arg(long)]
        csv: PathBuf,
        /// Seconds to wait for the write before reporting it unverified
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },
    /// Keep the cache of the given worksheets fresh until interrupted
    Watch {
        #[arg(required = true)]
        sheets: Vec<String>,
        #[arg(long)]
        interval_hours: Option<u64>,
    },
}

impl SheetCommand {
    pub async fn execute(&self) -> Result<()> {
        let config = Config::load()?;
        let client = Arc::new(GraphClient::from_config(&config)?);
        let sheet_name = |sheet: &Option<String>| {
            sheet
                .clone()
                .unwrap_or_else(|| config.graph.default_sheet.clone())
        };

        match self {
            SheetCommand::Read {
                sheet,
                no_cache,
                json,
            } => {
                let reader = sheet_reader(&config, client)?;
                read(&reader, &sheet_name(sheet), !*no_cache, *json).await
            }
            SheetCommand::Append {
                sheet,
                csv,
                timeout,
            } => append(client, &sheet_name(sheet), csv, Duration::from_secs(*timeout)).await,
            SheetCommand::Watch {
                sheets,
                interval_hours,
            } => {
                let hours = interval_hours.unwrap_or(config.cache.refresh_interval_hours);
                let schedule = RefreshSchedule::new(sheets.clone(), Duration::from_secs(hours * 3600));
                watch(Arc::new(sheet_reader(&config, client)?), schedule).await
            }
        }
    }
}

fn sheet_reader(config: &Config, client: Arc<GraphClient>) -> Result<SheetReader<GraphClient>> {
    let cache = SheetCache::new(
        config.cache_dir()?,
        Duration::from_secs(config.cache.sheet_ttl_secs),
        default_clock(),
    );
    Ok(SheetReader::new(client, cache))
}

async fn read(
    reader: &SheetReader<GraphClient>,
    sheet: &str,
    use_cache: bool,
    json: bool,
) -> Result<()> {
    let rows = reader
        .read_sheet(sheet, use_cache)
        .await
        .ok_or_else(|| AppError::Graph(format!("Failed to read worksheet '{}'", sheet)))?;

    match json {
        true => {
            for row in SheetRow::from_table(&rows) {
                println!("{}", row.to_json());
            }
        }
        false => {
            for row in &rows {
                println!("{}", row.join("\t"));
            }
        }
    }

    info!(sheet, rows = rows.len(), "Read worksheet");
    Ok(())
}

async fn append(
    client: Arc<GraphClient>,
    sheet: &str,
    csv: &Path,
    deadline: Duration,
) -> Result<()> {
    let rows = rows_from_csv(File::open(csv)?)?;
    if rows.is_empty() {
        return Err(AppError::Config(format!("No rows in {:?}", csv)));
    }
    let count = rows.len();

    match append_with_deadline(client, sheet, rows, deadline).await {
        UploadOutcome::Written => {
            info!(sheet, rows = count, "Rows appended");
            Ok(())
        }
        UploadOutcome::Failed => Err(AppError::Graph(format!(
            "Failed to append rows to worksheet '{}'",
            sheet
        ))),
        UploadOutcome::Unverified => {
            warn!(sheet, "Append still in progress at exit, check the workbook");
            Ok(())
        }
    }
}

async fn watch(reader: Arc<SheetReader<GraphClient>>, schedule: RefreshSchedule) -> Result<()> {
    let refresh = BackgroundRefresh::start(reader, schedule)?;

    tokio::signal::ctrl_c().await?;
    info!("Interrupted, stopping refresh");

    refresh.stop(DEFAULT_STOP_TIMEOUT).await;
    Ok(())
}
