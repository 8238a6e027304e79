use super::WorkbookOperations;
use crate::auth::{
    AccessTokenProvider, CachedToken, FileTokenStore, GraphOAuthClient,
    MicrosoftConfidentialClient, TokenCache,
};
use crate::clock::{Clock, default_clock};
use crate::config::{Config, GraphConfig};
use crate::error::{AppError, Result};
use crate::graph::range::{WorksheetRange, odata_literal};
use crate::graph::resolve::{
    DriveFileReference, FileResolution, ResolvedFile, ResolvedVia, pick_exact_match,
};
use crate::graph::types::{Collection, Drive, DriveItem, RangeUpdate, UsedRange};
use crate::models::{RowBatch, SheetRow};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

/// Reported when no token could be obtained; the request is never sent
pub const STATUS_AUTH_UNAVAILABLE: u16 = 503;
/// Reported when the request failed before a response arrived
pub const STATUS_TRANSPORT_FAILURE: u16 = 500;

const MAX_LOGGED_PAYLOAD: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct GraphResponse {
    pub status: u16,
    /// Parsed JSON, the raw text for non-JSON bodies, or `Null` when empty
    pub body: Value,
}

impl GraphResponse {
    fn synthetic(status: u16) -> Self {
        Self {
            status,
            body: Value::Null,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == StatusCode::NOT_FOUND.as_u16()
    }

    /// Deserialize a 200 body, `None` for any other status or shape
    fn parse<T: DeserializeOwned>(&self) -> Option<T> {
        if self.status != StatusCode::OK.as_u16() {
            return None;
        }
        serde_json::from_value(self.body.clone()).ok()
    }
}

/// Microsoft Graph client for one workbook in a SharePoint site's drive
pub struct GraphClient {
    config: GraphConfig,
    api_base: Url,
    http_client: reqwest::Client,
    provider: Option<Arc<dyn AccessTokenProvider>>,
    clock: Arc<dyn Clock>,
    token: Mutex<Option<CachedToken>>,
    drive_id: Mutex<Option<String>>,
    file: Mutex<DriveFileReference>,
}

impl GraphClient {
    /// Without a `provider` the client still constructs, but every request
    /// short-circuits as unauthenticated.
    pub fn new(
        config: GraphConfig,
        provider: Option<Arc<dyn AccessTokenProvider>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let missing = config.missing_fields();
        if missing.is_empty() {
            info!(site_id = %config.site_id, file_path = %config.file_path, "Graph configuration loaded");
        } else {
            error!(
                ?missing,
                "Missing required SharePoint configuration, SharePoint features will fail"
            );
        }

        let api_base = Url::parse(&config.api_base)
            .map_err(|e| AppError::Config(format!("Invalid Graph API base URL: {}", e)))?;

        let http_client = reqwest::ClientBuilder::new()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::Graph(format!("Failed to build reqwest client: {}", e)))?;

        let file = DriveFileReference::new(config.file_path.clone());

        Ok(Self {
            config,
            api_base,
            http_client,
            provider,
            clock,
            token: Mutex::new(None),
            drive_id: Mutex::new(None),
            file: Mutex::new(file),
        })
    }

    /// Client backed by the confidential-client token provider and the
    /// on-disk token cache
    pub fn from_config(config: &Config) -> Result<Self> {
        let clock = default_clock();
        let provider: Option<Arc<dyn AccessTokenProvider>> =
            match MicrosoftConfidentialClient::new(&config.graph) {
                Ok(strategy) => {
                    let store = Arc::new(FileTokenStore::new(config.cache_dir()?));
                    let cache = TokenCache::new(store, clock.clone());
                    Some(Arc::new(GraphOAuthClient::new(strategy, cache)))
                }
                Err(e) => {
                    error!("Cannot initialize Graph authentication: {}", e);
                    None
                }
            };

        Self::new(config.graph.clone(), provider, clock)
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    async fn bearer_token(&self) -> Option<String> {
        let mut current = self.token.lock().await;
        if let Some(token) = current
            .as_ref()
            .filter(|t| t.is_usable_at(self.clock.timestamp()))
        {
            debug!("Existing token is valid");
            return Some(token.access_token.clone());
        }

        let Some(provider) = self.provider.as_ref() else {
            error!("No token provider configured");
            return None;
        };

        info!("Existing token missing or expired, requesting token");
        let token = provider.fetch_token(false).await?;
        let access_token = token.access_token.clone();
        *current = Some(token);
        Some(access_token)
    }

    pub async fn ensure_authenticated(&self) -> bool {
        self.bearer_token().await.is_some()
    }

    fn endpoint(&self, segments: &[&str], query: Option<&str>) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Config("Graph API base URL cannot have a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        url.set_query(query);
        Ok(url)
    }

    /// Issue an authenticated Graph request. Never fails: transport and
    /// authentication problems are reported through synthetic statuses.
    #[instrument(name = "Graph request", skip_all, fields(%method))]
    pub async fn request(
        &self,
        method: Method,
        segments: &[&str],
        query: Option<&str>,
        body: Option<&Value>,
    ) -> GraphResponse {
        let Some(token) = self.bearer_token().await else {
            error!("Authentication failed, request not sent");
            return GraphResponse::synthetic(STATUS_AUTH_UNAVAILABLE);
        };

        let url = match self.endpoint(segments, query) {
            Ok(url) => url,
            Err(e) => {
                error!("{}", e);
                return GraphResponse::synthetic(STATUS_TRANSPORT_FAILURE);
            }
        };

        info!(%url, "Making Graph API request");
        let mut request = self
            .http_client
            .request(method, url.clone())
            .bearer_auth(token)
            .header(ACCEPT, "application/json");

        if let Some(body) = body {
            let payload: String = body.to_string().chars().take(MAX_LOGGED_PAYLOAD).collect();
            debug!(%payload, "Request JSON payload (truncated)");
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                error!(%url, "Request exception calling Graph API: {}", e);
                return GraphResponse::synthetic(STATUS_TRANSPORT_FAILURE);
            }
        };

        let status = response.status();
        info!(%status, "Graph API response");

        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                error!(%url, "Failed to read Graph API response: {}", e);
                return GraphResponse::synthetic(STATUS_TRANSPORT_FAILURE);
            }
        };
        let body = match text.is_empty() {
            true => Value::Null,
            false => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        };

        if !status.is_success() {
            error!(%url, %status, %body, "Graph API request failed");
        }

        GraphResponse {
            status: status.as_u16(),
            body,
        }
    }

    /// Default drive of the configured site, looked up once
    #[instrument(name = "Getting drive ID", skip(self))]
    pub async fn get_drive_id(&self) -> Option<String> {
        let mut drive_id = self.drive_id.lock().await;
        if let Some(id) = drive_id.as_ref() {
            return Some(id.clone());
        }

        if self.config.site_id.is_empty() {
            error!("Cannot get drive ID: SharePoint site ID is not configured");
            return None;
        }

        let response = self
            .request(Method::GET, &["sites", &self.config.site_id, "drive"], None, None)
            .await;

        let Some(drive) = response.parse::<Drive>() else {
            error!(status = response.status, "Failed to get drive ID for site");
            return None;
        };

        info!(drive_id = %drive.id, "Retrieved drive ID");
        *drive_id = Some(drive.id.clone());
        Some(drive.id)
    }

    /// Diagnostic listing of the drive root
    #[instrument(name = "Listing drive root", skip(self))]
    pub async fn list_drive_root_children(&self) -> Option<Vec<DriveItem>> {
        let drive_id = self.get_drive_id().await?;

        let response = self
            .request(Method::GET, &["drives", &drive_id, "root", "children"], None, None)
            .await;

        let Some(children) = response.parse::<Collection<DriveItem>>() else {
            error!(status = response.status, "Failed to list drive root children");
            return None;
        };

        if children.value.is_empty() {
            info!("Drive root appears to be empty");
        }
        for item in &children.value {
            info!(name = %item.name, kind = item.kind(), id = %item.id, "Drive root item");
        }

        Some(children.value)
    }

    /// Search the drive for an item named exactly `filename` (ignoring case)
    #[instrument(name = "Searching for file", skip(self))]
    pub async fn search_file_by_name(&self, filename: &str) -> Option<ResolvedFile> {
        if filename.is_empty() {
            error!("Cannot search: filename not provided");
            return None;
        }
        let drive_id = self.get_drive_id().await?;

        let search = format!("search(q='{}')", filename.replace('\'', "''"));
        let response = self
            .request(Method::GET, &["drives", &drive_id, "root", &search], None, None)
            .await;

        let Some(results) = response.parse::<Collection<DriveItem>>() else {
            error!(status = response.status, "File search failed");
            return None;
        };

        if results.value.is_empty() {
            warn!("Search returned no results");
            return None;
        }

        let found = pick_exact_match(&results.value, filename);
        match &found {
            Some(file) => info!(item_id = %file.item_id, path = %file.path, "Search found file"),
            None => {
                let names: Vec<&str> = results.value.iter().map(|i| i.name.as_str()).collect();
                warn!(?names, "Search results found, but no exact match");
            }
        }
        found
    }

    /// Resolve the configured workbook to a drive item: direct path first,
    /// name search second. Successful resolutions are reused until invalidated.
    #[instrument(name = "Resolving file", skip(self))]
    pub async fn resolve_file(&self) -> Option<ResolvedFile> {
        let mut file = self.file.lock().await;
        if let Some(resolved) = file.resolved() {
            debug!(item_id = %resolved.item_id, "Using resolved file item");
            return Some(resolved.clone());
        }

        if let FileResolution::Stale(previous) = file.state() {
            info!(item_id = %previous.item_id, "Re-resolving file after it was reported missing");
        }

        let Some(graph_path) = file.graph_path() else {
            error!("Cannot get file item: file path is not configured");
            return None;
        };
        let drive_id = self.get_drive_id().await?;

        let mut segments = vec!["drives", drive_id.as_str(), "root:"];
        segments.extend(graph_path.split('/').filter(|s| !s.is_empty()));

        let response = self.request(Method::GET, &segments, None, None).await;
        if let Some(item) = response.parse::<DriveItem>() {
            let resolved = ResolvedFile {
                item_id: item.id,
                path: file.configured_path.clone(),
                via: ResolvedVia::DirectPath,
            };
            info!(item_id = %resolved.item_id, "Direct path lookup succeeded");
            file.set_resolved(resolved.clone());
            return Some(resolved);
        }

        warn!(
            status = response.status,
            "Direct path lookup failed, attempting search fallback"
        );

        let Some(filename) = self.config.target_filename() else {
            error!("Cannot search for file: no filename in configured path");
            file.set_unresolved();
            return None;
        };

        match self.search_file_by_name(&filename).await {
            Some(resolved) => {
                file.set_resolved(resolved.clone());
                Some(resolved)
            }
            None => {
                error!(%filename, "Both direct path lookup and search failed");
                file.set_unresolved();
                None
            }
        }
    }

    async fn mark_stale_on_not_found(&self, file: &ResolvedFile, response: &GraphResponse) {
        if response.is_not_found() && self.file.lock().await.invalidate(&file.item_id) {
            warn!(item_id = %file.item_id, "File item not found, will re-resolve on next use");
        }
    }

    async fn used_range(&self, file: &ResolvedFile, sheet_name: &str, column_count: usize) -> WorksheetRange {
        let response = self
            .request(
                Method::GET,
                &self.worksheet_segments(file, sheet_name, "usedRange(valuesOnly=true)"),
                Some("$select=address,rowCount"),
                None,
            )
            .await;
        self.mark_stale_on_not_found(file, &response).await;

        match response.parse::<UsedRange>() {
            Some(used) => WorksheetRange::from_used_range(
                sheet_name,
                used.row_count,
                used.address.as_deref(),
                column_count,
            ),
            None => {
                warn!(
                    status = response.status,
                    "Could not get used range, assuming empty sheet"
                );
                WorksheetRange::empty(sheet_name, column_count)
            }
        }
    }

    fn worksheet_segments<'a>(
        &'a self,
        file: &'a ResolvedFile,
        sheet_name: &'a str,
        leaf: &'a str,
    ) -> Vec<&'a str> {
        vec![
            "sites",
            self.config.site_id.as_str(),
            "drive",
            "items",
            file.item_id.as_str(),
            "workbook",
            "worksheets",
            sheet_name,
            leaf,
        ]
    }
}

#[async_trait]
impl WorkbookOperations for GraphClient {
    fn cache_scope(&self) -> String {
        format!("{}_{}", self.config.site_id, self.config.file_path)
    }

    async fn invalidate_file(&self) {
        let mut file = self.file.lock().await;
        if let Some(item_id) = file.resolved().map(|f| f.item_id.clone()) {
            file.invalidate(&item_id);
            debug!(%item_id, "File resolution invalidated");
        }
    }

    #[instrument(name = "Reading worksheet", skip(self))]
    async fn read_worksheet(&self, sheet_name: &str) -> Option<Vec<Vec<String>>> {
        let Some(file) = self.resolve_file().await else {
            error!("Cannot read worksheet: failed to get file item");
            return None;
        };

        let response = self
            .request(
                Method::GET,
                &self.worksheet_segments(&file, sheet_name, "usedRange"),
                Some("$select=text"),
                None,
            )
            .await;
        self.mark_stale_on_not_found(&file, &response).await;

        match response.parse::<UsedRange>().and_then(|used| used.text) {
            Some(text) => {
                info!(rows = text.len(), path = %file.path, "Read worksheet");
                Some(text)
            }
            None => {
                error!(status = response.status, "Failed to read worksheet");
                None
            }
        }
    }

    #[instrument(name = "Appending rows", skip(self, rows), fields(rows = rows.len()))]
    async fn append_rows(&self, sheet_name: &str, rows: &[SheetRow]) -> bool {
        let batch = match RowBatch::from_rows(rows) {
            Ok(batch) => batch,
            Err(e) => {
                error!("Invalid rows: {}", e);
                return false;
            }
        };

        let Some(file) = self.resolve_file().await else {
            error!("Cannot update worksheet: failed to obtain file item, save failed");
            return false;
        };

        let range = self.used_range(&file, sheet_name, batch.width()).await;
        let address = range.append_target(batch.len());
        info!(%address, "Updating range");

        let body = match serde_json::to_value(RangeUpdate {
            values: &batch.values,
        }) {
            Ok(body) => body,
            Err(e) => {
                error!("Failed to prepare update payload: {}", e);
                return false;
            }
        };

        let leaf = format!("range(address='{}')", odata_literal(&address));
        let response = self
            .request(
                Method::PATCH,
                &self.worksheet_segments(&file, sheet_name, &leaf),
                None,
                Some(&body),
            )
            .await;
        self.mark_stale_on_not_found(&file, &response).await;

        match response.is_success() {
            true => info!(%address, "Successfully updated worksheet"),
            false => error!(status = response.status, %address, "Failed to update worksheet"),
        }
        response.is_success()
    }
}
