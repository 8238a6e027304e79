use crate::auth::client::{GrantStrategy, TokenGrant};
use crate::config::GraphConfig;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use oauth2::{
    AuthType, Client, ClientId, ClientSecret, EndpointNotSet, EndpointSet, Scope,
    StandardRevocableToken, TokenResponse, TokenUrl,
    basic::{
        BasicClient, BasicErrorResponse, BasicRevocationErrorResponse,
        BasicTokenIntrospectionResponse, BasicTokenResponse,
    },
};
use reqwest::redirect::Policy;
use tracing::instrument;

pub const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";
pub const GRAPH_CACHE_KEY: &str = "sharepoint_token";
const DEFAULT_EXPIRES_IN: i64 = 3599;

// Only the token endpoint is used by the client-credentials grant
type ConfiguredClient = Client<
    BasicErrorResponse,
    BasicTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointNotSet, // HasAuthUrl
    EndpointNotSet, // HasDeviceAuthUrl
    EndpointNotSet, // HasIntrospectionUrl
    EndpointNotSet, // HasRevocationUrl
    EndpointSet,    // HasTokenUrl
>;

/// Application-only token for Microsoft Graph via the confidential client
/// credentials flow.
pub struct MicrosoftConfidentialClient {
    client: ConfiguredClient,
    http_client: reqwest::Client,
}

impl MicrosoftConfidentialClient {
    pub fn new(config: &GraphConfig) -> Result<Self> {
        if !config.has_credentials() {
            return Err(AppError::Config(
                "Graph tenant_id, client_id and client_secret must be set".to_string(),
            ));
        }

        let token_url = TokenUrl::new(token_endpoint(&config.authority_host, &config.tenant_id))
            .map_err(|e| AppError::Auth(format!("Invalid token URL: {}", e)))?;

        let client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_client_secret(ClientSecret::new(config.client_secret.clone()))
            .set_auth_type(AuthType::RequestBody)
            .set_token_uri(token_url);

        let http_client = reqwest::ClientBuilder::new()
            .redirect(Policy::none())
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::Auth(format!("Failed to build reqwest client: {}", e)))?;

        Ok(Self {
            client,
            http_client,
        })
    }
}

#[async_trait]
impl GrantStrategy for MicrosoftConfidentialClient {
    fn cache_key(&self) -> &str {
        GRAPH_CACHE_KEY
    }

    #[instrument(name = "Requesting Graph token", skip(self))]
    async fn request_token(&self) -> Result<TokenGrant> {
        let token_result = self
            .client
            .exchange_client_credentials()
            .add_scope(Scope::new(GRAPH_SCOPE.to_string()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| AppError::Auth(format!("Failed to acquire token: {:?}", e)))?;

        let scope = token_result
            .scopes()
            .map(|scopes| {
                scopes
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_else(|| GRAPH_SCOPE.to_string());

        Ok(TokenGrant {
            access_token: token_result.access_token().secret().clone(),
            expires_in: token_result
                .expires_in()
                .map(|d| d.as_secs() as i64)
                .unwrap_or(DEFAULT_EXPIRES_IN),
            scope,
        })
    }
}

fn token_endpoint(authority_host: &str, tenant_id: &str) -> String {
    format!(
        "{}/{}/oauth2/v2.0/token",
        authority_host.trim_end_matches('/'),
        tenant_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> GraphConfig {
        GraphConfig {
            tenant_id: "tenant-1".to_string(),
            client_id: "graph_id".to_string(),
            client_secret: "graph_secret".to_string(),
            authority_host: server.uri(),
            ..Default::default()
        }
    }

    #[test]
    fn test_token_endpoint() {
        assert_eq!(
            token_endpoint("https://login.microsoftonline.com/", "contoso"),
            "https://login.microsoftonline.com/contoso/oauth2/v2.0/token"
        );
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let config = GraphConfig {
            tenant_id: "tenant".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            MicrosoftConfidentialClient::new(&config),
            Err(AppError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_client_credentials_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=graph_id"))
            .and(body_string_contains("client_secret=graph_secret"))
            .and(body_string_contains("graph.microsoft.com%2F.default"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token_type": "Bearer",
                "expires_in": 3599,
                "access_token": "graph-token"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let grant = MicrosoftConfidentialClient::new(&config_for(&server)).unwrap();
        let token = grant.request_token().await.unwrap();

        assert_eq!(token.access_token, "graph-token");
        assert_eq!(token.expires_in, 3599);
        assert_eq!(token.scope, GRAPH_SCOPE);
    }

    #[tokio::test]
    async fn test_identity_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_client",
                "error_description": "AADSTS7000215: Invalid client secret provided."
            })))
            .mount(&server)
            .await;

        let grant = MicrosoftConfidentialClient::new(&config_for(&server)).unwrap();
        let err = grant.request_token().await.unwrap_err();

        assert!(matches!(err, AppError::Auth(_)));
        assert!(err.to_string().contains("AADSTS7000215"));
    }
}
