mod client;
pub mod deere;
pub mod microsoft;
pub mod retry;
pub mod store;

pub use client::{AccessTokenProvider, OAuthClient};
pub use deere::DeereClientCredentials;
pub use microsoft::MicrosoftConfidentialClient;
pub use store::{CachedToken, FileTokenStore, TokenCache};

#[cfg(test)]
pub(crate) use client::mocks;

pub type DeereOAuthClient = OAuthClient<DeereClientCredentials>;
pub type GraphOAuthClient = OAuthClient<MicrosoftConfidentialClient>;
