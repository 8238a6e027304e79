pub mod cache;
pub mod refresh;
pub mod upload;

pub use cache::{SheetCache, SheetReader};
pub use refresh::{BackgroundRefresh, RefreshSchedule};
pub use upload::{UploadOutcome, append_with_deadline};

#[cfg(test)]
pub(crate) mod mocks {
    use crate::graph::WorkbookOperations;
    use crate::models::SheetRow;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    pub(crate) struct MockWorkbook {
        pub(crate) table: Option<Vec<Vec<String>>>,
        pub(crate) reads: AtomicUsize,
        pub(crate) invalidations: AtomicUsize,
        pub(crate) read_sheets: Mutex<Vec<String>>,
        pub(crate) appended: Mutex<Vec<(String, Vec<SheetRow>)>>,
        pub(crate) append_result: bool,
        pub(crate) append_delay: Duration,
    }

    impl Default for MockWorkbook {
        fn default() -> Self {
            Self {
                table: None,
                reads: AtomicUsize::new(0),
                invalidations: AtomicUsize::new(0),
                read_sheets: Mutex::new(Vec::new()),
                appended: Mutex::new(Vec::new()),
                append_result: true,
                append_delay: Duration::ZERO,
            }
        }
    }

    impl MockWorkbook {
        pub(crate) fn with_table(table: Vec<Vec<String>>) -> Self {
            Self {
                table: Some(table),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl WorkbookOperations for MockWorkbook {
        fn cache_scope(&self) -> String {
            "mock-site_/Deals.xlsx".to_string()
        }

        async fn read_worksheet(&self, sheet_name: &str) -> Option<Vec<Vec<String>>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.read_sheets.lock().unwrap().push(sheet_name.to_string());
            self.table.clone()
        }

        async fn invalidate_file(&self) {
            self.invalidations.fetch_add(1, Ordering::SeqCst);
        }

        async fn append_rows(&self, sheet_name: &str, rows: &[SheetRow]) -> bool {
            if !self.append_delay.is_zero() {
                tokio::time::sleep(self.append_delay).await;
            }
            self.appended
                .lock()
                .unwrap()
                .push((sheet_name.to_string(), rows.to_vec()));
            self.append_result
        }
    }
}
