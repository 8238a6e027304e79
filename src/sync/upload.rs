use crate::graph::WorkbookOperations;
use crate::models::SheetRow;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UploadOutcome {
    Written,
    Failed,
    /// The deadline passed first; the append keeps running and may still land
    Unverified,
}

/// Append `rows` and wait at most `deadline` for the result
#[instrument(name = "Uploading rows", skip(workbook, rows), fields(rows = rows.len()))]
pub async fn append_with_deadline<W>(
    workbook: Arc<W>,
    sheet_name: &str,
    rows: Vec<SheetRow>,
    deadline: Duration,
) -> UploadOutcome
where
    W: WorkbookOperations + 'static,
{
    let sheet = sheet_name.to_string();
    let task = tokio::spawn(async move { workbook.append_rows(&sheet, &rows).await });

    match tokio::time::timeout(deadline, task).await {
        Ok(Ok(true)) => {
            info!("Rows written");
            UploadOutcome::Written
        }
        Ok(Ok(false)) => UploadOutcome::Failed,
        Ok(Err(e)) => {
            error!("Upload task failed: {}", e);
            UploadOutcome::Failed
        }
        Err(_) => {
            warn!(
                deadline_secs = deadline.as_secs(),
                "Upload did not finish in time, result unknown"
            );
            UploadOutcome::Unverified
        }
    }
}
