use crate::auth::store::sanitize_key;
use crate::clock::Clock;
use crate::error::{AppError, Result};
use crate::graph::WorkbookOperations;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Serialize, Deserialize)]
struct CachedSheet {
    cached_at: i64,
    rows: Vec<Vec<String>>,
}

/// Worksheet contents stored as `{key}.cache.json`, valid for `ttl` after writing
pub struct SheetCache {
    dir: PathBuf,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SheetCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            dir: dir.into(),
            ttl,
            clock,
        }
    }

    pub fn key_for(sheet_name: &str, scope: &str) -> String {
        format!("sheet_{}_{}", sheet_name, scope)
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.cache.json", sanitize_key(key)))
    }

    pub fn get(&self, key: &str) -> Option<Vec<Vec<String>>> {
        let path = self.path_for(key);
        let contents = fs::read(&path).ok()?;

        let cached: CachedSheet = match serde_json::from_slice(&contents) {
            Ok(cached) => cached,
            Err(e) => {
                warn!(?path, "Discarding unreadable cache entry: {}", e);
                Self::discard(&path);
                return None;
            }
        };

        let age = self.clock.timestamp() - cached.cached_at;
        if age < 0 || age as u64 >= self.ttl.as_secs() {
            debug!(key, age, "Cache entry expired");
            Self::discard(&path);
            return None;
        }

        debug!(key, age, "Cache hit");
        Some(cached.rows)
    }

    fn discard(path: &Path) {
        if let Err(e) = fs::remove_file(path) {
            warn!(?path, "Failed to remove cache file: {}", e);
        }
    }

    pub fn set(&self, key: &str, rows: &[Vec<String>]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let entry = CachedSheet {
            cached_at: self.clock.timestamp(),
            rows: rows.to_vec(),
        };
        let contents = serde_json::to_vec(&entry)?;

        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, contents)
            .map_err(|e| AppError::Cache(format!("Failed to write {:?}: {}", tmp_path, e)))?;
        fs::rename(&tmp_path, &path)
            .map_err(|e| AppError::Cache(format!("Failed to replace {:?}: {}", path, e)))?;

        Ok(())
    }
}

/// Worksheet reads through a [`SheetCache`]
pub struct SheetReader<W> {
    workbook: Arc<W>,
    cache: SheetCache,
}

impl<W: WorkbookOperations> SheetReader<W> {
    pub fn new(workbook: Arc<W>, cache: SheetCache) -> Self {
        Self { workbook, cache }
    }

    pub fn workbook(&self) -> &W {
        &self.workbook
    }

    /// Cached rows when allowed and fresh, otherwise a live read that
    /// replaces the cache entry. `None` if the live read fails.
    #[instrument(name = "Reading sheet", skip(self))]
    pub async fn read_sheet(&self, sheet_name: &str, use_cache: bool) -> Option<Vec<Vec<String>>> {
        let key = SheetCache::key_for(sheet_name, &self.workbook.cache_scope());

        if use_cache {
            if let Some(rows) = self.cache.get(&key) {
                info!(rows = rows.len(), "Using cached sheet data");
                return Some(rows);
            }
        }

        let rows = self.workbook.read_worksheet(sheet_name).await?;
        if let Err(e) = self.cache.set(&key, &rows) {
            warn!("Failed to cache sheet data: {}", e);
        }
        Some(rows)
    }
}
