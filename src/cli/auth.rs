use crate::auth::retry::{DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY, with_token_retry};
use crate::auth::{
    AccessTokenProvider, DeereClientCredentials, DeereOAuthClient, FileTokenStore,
    GraphOAuthClient, MicrosoftConfidentialClient, TokenCache,
};
use crate::clock::default_clock;
use crate::config::Config;
use crate::error::{AppError, Result};
use chrono::DateTime;
use clap::Subcommand;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Subcommand, Debug)]
pub enum AuthProvider {
    /// Authenticate with Microsoft Graph (client credentials)
    Graph,
    /// Authenticate with the John Deere API (client credentials)
    Deere {
        /// Probe the quotes API with the token on behalf of this dealer RACF ID
        #[arg(long)]
        check_dealer: Option<String>,
    },
}

impl AuthProvider {
    pub async fn execute(&self, reset: bool, force: bool) -> Result<()> {
        let config = Config::load()?;
        match self {
            AuthProvider::Graph => authenticate_graph(&config, reset, force).await,
            AuthProvider::Deere { check_dealer } => {
                authenticate_deere(&config, reset, force, check_dealer.as_deref()).await
            }
        }
    }
}

fn token_cache(config: &Config) -> Result<TokenCache> {
    let store = Arc::new(FileTokenStore::new(config.cache_dir()?));
    Ok(TokenCache::new(store, default_clock()))
}

async fn authenticate_graph(config: &Config, reset: bool, force: bool) -> Result<()> {
    let strategy = MicrosoftConfidentialClient::new(&config.graph)?;
    let client = GraphOAuthClient::new(strategy, token_cache(config)?);

    if reset {
        client.clear_cache()?;
    }

    let token = client
        .fetch_token(force)
        .await
        .ok_or_else(|| AppError::Auth("Failed to obtain Graph access token".to_string()))?;

    let expires_at = DateTime::from_timestamp(token.expires_at, 0);
    info!(?expires_at, scope = %token.scope, "Graph authentication verified");

    Ok(())
}

async fn authenticate_deere(
    config: &Config,
    reset: bool,
    force: bool,
    check_dealer: Option<&str>,
) -> Result<()> {
    let missing = config.deere.missing_fields();
    if !missing.is_empty() {
        error!(?missing, "Missing John Deere OAuth configuration");
        return Err(AppError::Config(format!(
            "Missing John Deere settings: {}",
            missing.join(", ")
        )));
    }

    let strategy = DeereClientCredentials::new(&config.deere)?;
    let client = DeereOAuthClient::new(strategy, token_cache(config)?);

    if reset {
        client.clear_cache()?;
    }

    let token = client
        .fetch_token(force)
        .await
        .ok_or_else(|| AppError::Auth("Failed to obtain John Deere access token".to_string()))?;

    let expires_at = DateTime::from_timestamp(token.expires_at, 0);
    info!(?expires_at, "John Deere authentication verified");

    let Some(dealer) = check_dealer else {
        return Ok(());
    };

    let check = with_token_retry(&client, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY, |token| {
        let client = &client;
        async move {
            let check = client.strategy().test_token(&token, dealer).await;
            match check.is_ok() {
                true => Ok(check),
                false => Err(AppError::Auth(format!("Token check failed: {:?}", check))),
            }
        }
    })
    .await?;

    info!(dealer, ?check, "Quotes API accepted the token");

    Ok(())
}
