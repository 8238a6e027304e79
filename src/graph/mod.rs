pub mod client;
pub mod range;
pub mod resolve;
mod types;

use crate::models::SheetRow;
use async_trait::async_trait;

pub use client::GraphClient;

/// Worksheet access for one workbook
#[async_trait]
pub trait WorkbookOperations: Send + Sync {
    /// Identifies the workbook in cache keys
    fn cache_scope(&self) -> String;

    /// Displayed text of the sheet's used range, `None` on any failure
    async fn read_worksheet(&self, sheet_name: &str) -> Option<Vec<Vec<String>>>;

    /// Forget the resolved workbook so the next operation looks it up again
    async fn invalidate_file(&self);

    /// Write `rows` directly below the sheet's used range in one request
    async fn append_rows(&self, sheet_name: &str, rows: &[SheetRow]) -> bool;
}
