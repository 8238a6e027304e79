use crate::clock::Clock;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// Tokens are treated as expired this many seconds before their real expiry
pub const EXPIRY_MARGIN_SECS: i64 = 300;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CachedToken {
    pub access_token: String,
    /// Expiry time as seconds since Unix epoch
    pub expires_at: i64,
    #[serde(default)]
    pub scope: String,
}

impl CachedToken {
    pub fn new(access_token: impl Into<String>, expires_in: i64, scope: impl Into<String>, now: i64) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: now + expires_in,
            scope: scope.into(),
        }
    }

    pub fn is_usable_at(&self, now: i64) -> bool {
        now < self.expires_at - EXPIRY_MARGIN_SECS
    }
}

/// Key-value persistence for cached tokens.
///
/// `get` reports unreadable entries as errors; the expiry and corruption
/// policy lives in [`TokenCache`].
pub trait TokenStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<CachedToken>>;

    /// Replace the entry for `key`. Implementations must never leave a
    /// half-written entry behind.
    fn set(&self, key: &str, token: &CachedToken) -> Result<()>;

    fn delete(&self, key: &str) -> Result<()>;
}

/// One JSON file per key inside a cache directory
pub struct FileTokenStore {
    dir: PathBuf,
}

impl FileTokenStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_key(key)))
    }

    fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
        let mut options = OpenOptions::new();
        options.create(true).write(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(path)?;
        file.write_all(contents)?;
        file.sync_all()
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, key: &str) -> Result<Option<CachedToken>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&path)
            .map_err(|e| AppError::Cache(format!("Failed to read {:?}: {}", path, e)))?;
        let token = serde_json::from_str(&contents)
            .map_err(|e| AppError::Cache(format!("Failed to parse {:?}: {}", path, e)))?;

        Ok(Some(token))
    }

    fn set(&self, key: &str, token: &CachedToken) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            AppError::Cache(format!("Failed to create token cache directory: {}", e))
        })?;

        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");
        let contents = serde_json::to_vec_pretty(token)?;

        Self::write_private(&tmp_path, &contents)
            .map_err(|e| AppError::Cache(format!("Failed to write {:?}: {}", tmp_path, e)))?;
        fs::rename(&tmp_path, &path)
            .map_err(|e| AppError::Cache(format!("Failed to replace {:?}: {}", path, e)))?;

        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Cache(format!("Failed to delete {:?}: {}", path, e))),
        }
    }
}

#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<HashMap<String, CachedToken>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: &str) -> Result<Option<CachedToken>> {
        let tokens = self
            .tokens
            .lock()
            .map_err(|e| AppError::Cache(format!("Token store lock poisoned: {}", e)))?;
        Ok(tokens.get(key).cloned())
    }

    fn set(&self, key: &str, token: &CachedToken) -> Result<()> {
        let mut tokens = self
            .tokens
            .lock()
            .map_err(|e| AppError::Cache(format!("Token store lock poisoned: {}", e)))?;
        tokens.insert(key.to_string(), token.clone());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut tokens = self
            .tokens
            .lock()
            .map_err(|e| AppError::Cache(format!("Token store lock poisoned: {}", e)))?;
        tokens.remove(key);
        Ok(())
    }
}

/// Expiry-aware view over a [`TokenStore`]. Never fails on read.
#[derive(Clone)]
pub struct TokenCache {
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
}

impl TokenCache {
    pub fn new(store: Arc<dyn TokenStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Return the cached token for `key` if it is still usable.
    ///
    /// Expired and unreadable entries are deleted on a best-effort basis.
    pub fn load(&self, key: &str) -> Option<CachedToken> {
        let token = match self.store.get(key) {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!(key, "No cached token");
                return None;
            }
            Err(e) => {
                error!(key, "Discarding unreadable cached token: {}", e);
                self.discard(key);
                return None;
            }
        };

        if token.is_usable_at(self.clock.timestamp()) {
            debug!(key, expires_at = token.expires_at, "Using cached token");
            return Some(token);
        }

        info!(key, "Cached token has expired or will expire soon");
        self.discard(key);
        None
    }

    /// Persist a freshly issued token, replacing any previous entry
    pub fn save(
        &self,
        key: &str,
        access_token: &str,
        expires_in: i64,
        scope: &str,
    ) -> Result<CachedToken> {
        let token = CachedToken::new(access_token, expires_in, scope, self.clock.timestamp());
        self.store.set(key, &token)?;
        debug!(key, expires_at = token.expires_at, "Saved token to cache");
        Ok(token)
    }

    pub fn clear(&self, key: &str) -> Result<()> {
        self.store.delete(key)
    }

    fn discard(&self, key: &str) {
        if let Err(e) = self.store.delete(key) {
            warn!(key, "Failed to delete cached token: {}", e);
        }
    }
}

/// Keep cache file names to `[A-Za-z0-9_-]`
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| match c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            true => c,
            false => '_',
        })
        .collect()
}
