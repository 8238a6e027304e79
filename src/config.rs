use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_DIR_PREFIX: &str = "brideal-sync";

pub const DEFAULT_SHEET: &str = "App";
pub const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";
pub const MICROSOFT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const DEERE_WELL_KNOWN_URL: &str =
    "https://signin.johndeere.com/oauth2/aus78tnlaysMraFhC1t7/.well-known/oauth-authorization-server";
pub const DEERE_TOKEN_URL: &str = "https://signin.johndeere.com/oauth2/aus78tnlaysMraFhC1t7/v1/token";
pub const DEERE_QUOTES_API_BASE: &str =
    "https://jdquote2-api-sandbox.deere.com/om/cert/maintainquote";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    /// Overrides the XDG cache directory for token and sheet caches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub deere: DeereConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GraphConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub site_id: String,
    /// Preferred path of the workbook inside the site's default drive
    pub file_path: String,
    pub default_sheet: String,
    pub timeout_secs: u64,
    pub api_base: String,
    pub authority_host: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            site_id: String::new(),
            file_path: String::new(),
            default_sheet: DEFAULT_SHEET.to_string(),
            timeout_secs: 30,
            api_base: GRAPH_API_BASE.to_string(),
            authority_host: MICROSOFT_AUTHORITY_HOST.to_string(),
        }
    }
}

impl GraphConfig {
    /// Names of required settings that are empty
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("tenant_id", &self.tenant_id),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("site_id", &self.site_id),
            ("file_path", &self.file_path),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    pub fn has_credentials(&self) -> bool {
        !self.tenant_id.is_empty() && !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// File name used when the direct path lookup fails and we fall back to search
    pub fn target_filename(&self) -> Option<String> {
        self.file_path
            .replace('\\', "/")
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DeereConfig {
    pub client_id: String,
    pub client_secret: String,
    pub well_known_url: String,
    /// Used when endpoint discovery fails
    pub token_url: String,
    pub scope: String,
    pub quotes_api_base: String,
    pub timeout_secs: u64,
}

impl Default for DeereConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            well_known_url: DEERE_WELL_KNOWN_URL.to_string(),
            token_url: DEERE_TOKEN_URL.to_string(),
            scope: "offline_access".to_string(),
            quotes_api_base: DEERE_QUOTES_API_BASE.to_string(),
            timeout_secs: 30,
        }
    }
}

impl DeereConfig {
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [("client_id", &self.client_id), ("client_secret", &self.client_secret)]
            .into_iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| name)
            .collect()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub sheet_ttl_secs: u64,
    pub refresh_interval_hours: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sheet_ttl_secs: 3600,
            refresh_interval_hours: 6,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_file()?;

        if !config_path.exists() {
            return Err(AppError::Config(format!(
                "Config file not found at {:?}. Please create one.",
                config_path
            )));
        }

        Self::from_path(&config_path)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {}", e)))
    }

    fn xdg_dirs() -> xdg::BaseDirectories {
        xdg::BaseDirectories::with_prefix(CONFIG_DIR_PREFIX)
    }

    /// Get the config file path
    pub fn config_file() -> Result<PathBuf> {
        let xdg_dirs = Self::xdg_dirs();
        xdg_dirs
            .place_config_file("config.toml")
            .map_err(|e| AppError::Config(format!("Failed to create config directory: {}", e)))
    }

    /// Get the cache directory path, honouring the `cache_dir` override
    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            return Ok(dir.clone());
        }
        let xdg = Self::xdg_dirs();
        xdg.get_cache_home()
            .ok_or_else(|| AppError::Config("Failed to determine cache directory".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serialization() {
        let config = Config {
            cache_dir: Some(PathBuf::from("/tmp/brideal")),
            graph: GraphConfig {
                tenant_id: "tenant".to_string(),
                client_id: "graph_id".to_string(),
                client_secret: "graph_secret".to_string(),
                site_id: "site".to_string(),
                file_path: "/Shared Documents/Deals.xlsx".to_string(),
                ..Default::default()
            },
            deere: DeereConfig {
                client_id: "jd_id".to_string(),
                client_secret: "jd_secret".to_string(),
                ..Default::default()
            },
            cache: CacheConfig::default(),
        };

        let serialized = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();

        assert_eq!(config.graph.client_id, deserialized.graph.client_id);
        assert_eq!(config.deere.client_id, deserialized.deere.client_id);
        assert_eq!(config.cache_dir, deserialized.cache_dir);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [graph]
            site_id = "site"
            "#,
        )
        .unwrap();

        assert_eq!(config.graph.default_sheet, "App");
        assert_eq!(config.graph.timeout_secs, 30);
        assert_eq!(config.graph.api_base, GRAPH_API_BASE);
        assert_eq!(config.deere.token_url, DEERE_TOKEN_URL);
        assert_eq!(config.deere.scope, "offline_access");
        assert_eq!(config.cache.sheet_ttl_secs, 3600);
    }

    #[test]
    fn test_missing_fields() {
        let graph = GraphConfig {
            tenant_id: "tenant".to_string(),
            client_secret: "  ".to_string(),
            ..Default::default()
        };
        assert_eq!(
            graph.missing_fields(),
            vec!["client_id", "client_secret", "site_id", "file_path"]
        );
        assert!(DeereConfig::default().missing_fields().len() == 2);
    }

    #[test]
    fn test_target_filename() {
        let mut graph = GraphConfig {
            file_path: "/Shared Documents/Sales/Deals.xlsx".to_string(),
            ..Default::default()
        };
        assert_eq!(graph.target_filename().as_deref(), Some("Deals.xlsx"));

        graph.file_path = r"Shared Documents\Deals 2025.xlsx".to_string();
        assert_eq!(graph.target_filename().as_deref(), Some("Deals 2025.xlsx"));

        graph.file_path = "folder/".to_string();
        assert_eq!(graph.target_filename(), None);
    }

    #[test]
    fn test_cache_dir_override() {
        let config = Config {
            cache_dir: Some(PathBuf::from("/var/cache/brideal")),
            ..Default::default()
        };
        assert_eq!(config.cache_dir().unwrap(), PathBuf::from("/var/cache/brideal"));
    }
}
