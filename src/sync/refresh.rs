use crate::error::{AppError, Result};
use crate::graph::WorkbookOperations;
use crate::sync::cache::SheetReader;
use indicatif::ProgressStyle;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Span, info, instrument, warn};
use tracing_indicatif::span_ext::IndicatifSpanExt;

pub const DEFAULT_PAUSE_BETWEEN_SHEETS: Duration = Duration::from_secs(5);
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct RefreshSchedule {
    pub sheets: Vec<String>,
    pub interval: Duration,
    pub pause_between_sheets: Duration,
}

impl RefreshSchedule {
    pub fn new(sheets: Vec<String>, interval: Duration) -> Self {
        Self {
            sheets,
            interval,
            pause_between_sheets: DEFAULT_PAUSE_BETWEEN_SHEETS,
        }
    }
}

/// Periodically re-reads sheets into the cache until stopped
pub struct BackgroundRefresh {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl BackgroundRefresh {
    pub fn start<W>(reader: Arc<SheetReader<W>>, schedule: RefreshSchedule) -> Result<Self>
    where
        W: WorkbookOperations + 'static,
    {
        if schedule.sheets.is_empty() {
            return Err(AppError::Config("No sheets to refresh".to_string()));
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        info!(
            sheets = ?schedule.sheets,
            interval_secs = schedule.interval.as_secs(),
            "Starting background sheet refresh"
        );
        let handle = tokio::spawn(refresh_loop(reader, schedule, stop_rx));

        Ok(Self { stop_tx, handle })
    }

    /// Signal the loop and wait up to `timeout` for it to finish.
    /// Returns false if it had to be aborted.
    pub async fn stop(mut self, timeout: Duration) -> bool {
        let _ = self.stop_tx.send(true);

        match tokio::time::timeout(timeout, &mut self.handle).await {
            Ok(_) => {
                info!("Background refresh stopped");
                true
            }
            Err(_) => {
                warn!("Background refresh did not stop in time, aborting");
                self.handle.abort();
                false
            }
        }
    }
}

async fn refresh_loop<W: WorkbookOperations>(
    reader: Arc<SheetReader<W>>,
    schedule: RefreshSchedule,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut first_pass = true;
    loop {
        if !first_pass {
            reader.workbook().invalidate_file().await;
        }
        first_pass = false;

        let refreshed = refresh_all(&reader, &schedule, &mut stop_rx).await;
        info!(refreshed, total = schedule.sheets.len(), "Sheet refresh pass finished");

        if wait_or_stop(schedule.interval, &mut stop_rx).await {
            return;
        }
    }
}

#[instrument(name = "Refreshing sheets", skip_all)]
async fn refresh_all<W: WorkbookOperations>(
    reader: &SheetReader<W>,
    schedule: &RefreshSchedule,
    stop_rx: &mut watch::Receiver<bool>,
) -> usize {
    let span = Span::current();
    if let Ok(style) = ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>3}/{len:3} {msg}") {
        span.pb_set_style(&style);
    }
    span.pb_set_length(schedule.sheets.len() as u64);

    let mut refreshed = 0;
    for (idx, sheet) in schedule.sheets.iter().enumerate() {
        if idx > 0 && wait_or_stop(schedule.pause_between_sheets, stop_rx).await {
            break;
        }

        span.pb_set_message(sheet);
        match reader.read_sheet(sheet, false).await {
            Some(_) => refreshed += 1,
            None => warn!(sheet = %sheet, "Failed to refresh sheet"),
        }
        span.pb_inc(1);
    }
    refreshed
}

/// Sleep for `duration` unless stopped first. Returns true when stopped.
async fn wait_or_stop(duration: Duration, stop_rx: &mut watch::Receiver<bool>) -> bool {
    if *stop_rx.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        // A dropped sender also ends the loop
        _ = stop_rx.changed() => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::mock::MockClock;
    use crate::sync::cache::SheetCache;
    use crate::sync::mocks::MockWorkbook;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    fn reader(dir: &TempDir, workbook: Arc<MockWorkbook>) -> Arc<SheetReader<MockWorkbook>> {
        let cache = SheetCache::new(dir.path(), Duration::from_secs(3600), MockClock::fixed());
        Arc::new(SheetReader::new(workbook, cache))
    }

    async fn wait_for_reads(workbook: &MockWorkbook, at_least: usize) {
        for _ in 0..200 {
            if workbook.reads.load(Ordering::SeqCst) >= at_least {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected at least {at_least} reads");
    }

    #[tokio::test]
    async fn test_refreshes_every_sheet_each_pass() {
        let dir = TempDir::new().unwrap();
        let workbook = Arc::new(MockWorkbook::with_table(vec![vec!["A".to_string()]]));
        let schedule = RefreshSchedule {
            sheets: vec!["App".to_string(), "Prices".to_string()],
            interval: Duration::from_millis(20),
            pause_between_sheets: Duration::ZERO,
        };

        let refresh = BackgroundRefresh::start(reader(&dir, workbook.clone()), schedule).unwrap();
        wait_for_reads(&workbook, 4).await;

        assert!(refresh.stop(DEFAULT_STOP_TIMEOUT).await);

        let sheets = workbook.read_sheets.lock().unwrap().clone();
        assert_eq!(&sheets[..4], ["App", "Prices", "App", "Prices"]);
        assert!(workbook.invalidations.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_stop_interrupts_interval() {
        let dir = TempDir::new().unwrap();
        let workbook = Arc::new(MockWorkbook::default());
        let schedule = RefreshSchedule::new(vec!["App".to_string()], Duration::from_secs(6 * 3600));

        let refresh = BackgroundRefresh::start(reader(&dir, workbook.clone()), schedule).unwrap();
        wait_for_reads(&workbook, 1).await;

        assert!(refresh.stop(Duration::from_secs(1)).await);
        assert_eq!(workbook.reads.load(Ordering::SeqCst), 1);
        assert_eq!(workbook.invalidations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_requires_sheets() {
        let dir = TempDir::new().unwrap();
        let schedule = RefreshSchedule::new(Vec::new(), Duration::from_secs(1));

        assert!(BackgroundRefresh::start(reader(&dir, Arc::new(MockWorkbook::default())), schedule).is_err());
    }
}
