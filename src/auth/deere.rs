use crate::auth::client::{GrantStrategy, TokenGrant};
use crate::config::DeereConfig;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tracing::{debug, error, info, instrument, warn};

pub const DEERE_CACHE_KEY: &str = "jd_token";
const DEFAULT_EXPIRES_IN: i64 = 3600;

// https://datatracker.ietf.org/doc/html/rfc8414#section-2
#[derive(Debug, Deserialize)]
struct AuthorizationServerMetadata {
    token_endpoint: Option<String>,
    authorization_endpoint: Option<String>,
    #[serde(default)]
    scopes_supported: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OAuthEndpoints {
    pub token_endpoint: String,
    pub authorization_endpoint: Option<String>,
    pub scopes_supported: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DeereTokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

/// Outcome of probing the quotes API with a token
#[derive(Debug, Clone, PartialEq)]
pub enum TokenCheck {
    Valid,
    /// The API answered 401
    Rejected(String),
    /// The API answered, but with something other than 200 or 401
    Reachable(u16),
    Unreachable(String),
}

impl TokenCheck {
    pub fn is_ok(&self) -> bool {
        matches!(self, TokenCheck::Valid | TokenCheck::Reachable(_))
    }
}

/// John Deere client-credentials grant with endpoint discovery
pub struct DeereClientCredentials {
    client_id: String,
    client_secret: String,
    well_known_url: String,
    fallback_token_url: String,
    scope: String,
    quotes_api_base: String,
    http_client: reqwest::Client,
}

impl DeereClientCredentials {
    pub fn new(config: &DeereConfig) -> Result<Self> {
        let http_client = reqwest::ClientBuilder::new()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::Auth(format!("Failed to build reqwest client: {}", e)))?;

        Ok(Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            well_known_url: config.well_known_url.clone(),
            fallback_token_url: config.token_url.clone(),
            scope: config.scope.clone(),
            quotes_api_base: config.quotes_api_base.clone(),
            http_client,
        })
    }

    /// Fetch the authorization server metadata. Any failure yields the
    /// configured fallback token endpoint.
    #[instrument(name = "Discovering OAuth endpoints", skip(self))]
    pub async fn discover_endpoints(&self) -> OAuthEndpoints {
        match self.fetch_metadata().await {
            Ok(metadata) => {
                let endpoints = OAuthEndpoints {
                    token_endpoint: metadata
                        .token_endpoint
                        .unwrap_or_else(|| self.fallback_token_url.clone()),
                    authorization_endpoint: metadata.authorization_endpoint,
                    scopes_supported: metadata.scopes_supported,
                };
                debug!(token_endpoint = %endpoints.token_endpoint, "Discovered endpoints");
                endpoints
            }
            Err(e) => {
                warn!("Endpoint discovery failed, using fallback token URL: {}", e);
                OAuthEndpoints {
                    token_endpoint: self.fallback_token_url.clone(),
                    authorization_endpoint: None,
                    scopes_supported: Vec::new(),
                }
            }
        }
    }

    async fn fetch_metadata(&self) -> Result<AuthorizationServerMetadata> {
        let response = self.http_client.get(&self.well_known_url).send().await?;

        if response.status() != StatusCode::OK {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Auth(format!(
                "Failed to get OAuth endpoints: {} - {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }

    /// Probe the quotes API with `token` on behalf of `dealer_racf_id`
    #[instrument(name = "Testing token", skip(self, token))]
    pub async fn test_token(&self, token: &str, dealer_racf_id: &str) -> TokenCheck {
        let Some(token) = clean_token(token) else {
            return TokenCheck::Rejected("Invalid token format".to_string());
        };

        let url = format!(
            "{}/api/v1/dealers/{}/maintain-quotes",
            self.quotes_api_base.trim_end_matches('/'),
            dealer_racf_id
        );

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .json(&serde_json::json!({ "dealerRacfID": dealer_racf_id }))
            .send()
            .await;

        match response {
            Ok(response) if response.status() == StatusCode::OK => TokenCheck::Valid,
            Ok(response) if response.status() == StatusCode::UNAUTHORIZED => {
                let body = response.text().await.unwrap_or_default();
                warn!("Token authentication failed: {}", body);
                TokenCheck::Rejected(body)
            }
            Ok(response) => {
                warn!(status = %response.status(), "Token test returned unexpected status");
                TokenCheck::Reachable(response.status().as_u16())
            }
            Err(e) => {
                error!("Request error during token test: {}", e);
                TokenCheck::Unreachable(e.to_string())
            }
        }
    }
}

#[async_trait]
impl GrantStrategy for DeereClientCredentials {
    fn cache_key(&self) -> &str {
        DEERE_CACHE_KEY
    }

    #[instrument(name = "Requesting John Deere token", skip(self))]
    async fn request_token(&self) -> Result<TokenGrant> {
        let endpoints = self.discover_endpoints().await;

        info!(token_url = %endpoints.token_endpoint, "Requesting access token");
        let response = self
            .http_client
            .post(&endpoints.token_endpoint)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header(ACCEPT, "application/json")
            .form(&[
                ("grant_type", "client_credentials"),
                ("scope", self.scope.as_str()),
            ])
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Auth(format!(
                "Failed to get token: {} - {}",
                status, body
            )));
        }

        let token: DeereTokenResponse = response.json().await?;
        let access_token = clean_token(&token.access_token)
            .ok_or_else(|| AppError::Auth("Token endpoint returned an empty token".to_string()))?;

        Ok(TokenGrant {
            access_token: access_token.to_string(),
            expires_in: token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN),
            scope: token.scope.unwrap_or_else(|| self.scope.clone()),
        })
    }
}

/// Strip surrounding whitespace; `None` if nothing is left
pub fn clean_token(token: &str) -> Option<&str> {
    let cleaned = token.trim();
    match cleaned.is_empty() {
        true => None,
        false => Some(cleaned),
    }
}
