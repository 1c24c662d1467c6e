//! Network calls that mint and revoke tokens.

use std::sync::RwLock;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::{client::check_response, endpoints, ApiError};
use crate::config::Config;
use crate::models::{Credentials, TokenGrant};

/// The auth side of the network transport.
///
/// Implementations report failures as `ApiError` so callers can tell a
/// rejected credential (`Unauthorized`, `BadRequest`, ...) apart from an
/// unreachable server (`NetworkError`) and a server fault (`ServerError`).
#[async_trait]
pub trait AuthTransport: Send + Sync {
    /// Set or clear the default bearer credential.
    fn set_bearer(&self, token: Option<&str>);

    async fn login(&self, credentials: &Credentials) -> Result<TokenGrant, ApiError>;

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ApiError>;

    /// Revoke the current bearer credential server-side.
    async fn logout(&self) -> Result<(), ApiError>;
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    #[serde(rename = "refreshToken")]
    refresh_token: &'a str,
}

/// reqwest implementation of [`AuthTransport`].
/// Clone of the inner client is cheap - reqwest::Client uses Arc internally.
pub struct HttpAuthTransport {
    client: Client,
    base_url: String,
    bearer: RwLock<Option<String>>,
}

impl HttpAuthTransport {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self::with_client(client, &config.api_base_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.to_string(),
            bearer: RwLock::new(None),
        }
    }

    /// Shared connection pool for the rest of the API surface
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn bearer(&self) -> Option<String> {
        self.bearer
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    async fn post_grant<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<TokenGrant, ApiError> {
        let url = endpoints::join(&self.base_url, path);
        let response = self.client.post(&url).json(body).send().await?;
        let response = check_response(response).await?;
        response.json::<TokenGrant>().await.map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse token response from {}: {}", path, e))
        })
    }
}

#[async_trait]
impl AuthTransport for HttpAuthTransport {
    fn set_bearer(&self, token: Option<&str>) {
        *self
            .bearer
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = token.map(str::to_string);
    }

    async fn login(&self, credentials: &Credentials) -> Result<TokenGrant, ApiError> {
        debug!(email = %credentials.email, "Sending login request");
        self.post_grant(endpoints::LOGIN, credentials).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ApiError> {
        debug!("Sending refresh request");
        self.post_grant(endpoints::REFRESH, &RefreshRequest { refresh_token })
            .await
    }

    async fn logout(&self) -> Result<(), ApiError> {
        let Some(token) = self.bearer() else {
            return Ok(());
        };
        let url = endpoints::join(&self.base_url, endpoints::LOGOUT);
        let response = self.client.post(&url).bearer_auth(token).send().await?;
        check_response(response).await?;
        Ok(())
    }
}
