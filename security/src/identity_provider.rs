// security/src/identity_provider.rs

use async_trait::async_trait;
use lib::config::DigiLockerConfig;
use log::{debug, warn};
use reqwest::Url;
use serde::Deserialize;

use crate::errors::{AuthError, AuthResult};

/// What an external identity provider tells us about a person.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderProfile {
    /// Stable subject identifier at the provider.
    #[serde(alias = "digilockerid", alias = "sub")]
    pub subject: String,
    pub name: String,
}

/// An OAuth-style handoff: send the user to `authorization_url`, then trade
/// the returned code for a profile.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    fn authorization_url(&self, state: &str) -> AuthResult<String>;
    async fn exchange_code(&self, code: &str) -> AuthResult<ProviderProfile>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct DigiLockerClient {
    http: reqwest::Client,
    config: DigiLockerConfig,
}

impl DigiLockerClient {
    pub fn new(config: DigiLockerConfig) -> Self {
        DigiLockerClient {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl IdentityProvider for DigiLockerClient {
    fn authorization_url(&self, state: &str) -> AuthResult<String> {
        let url = Url::parse_with_params(
            &self.config.authorize_url,
            &[
                ("response_type", "code"),
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| AuthError::Provider(format!("invalid DigiLocker authorize URL: {}", e)))?;
        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str) -> AuthResult<ProviderProfile> {
        if self.config.client_id.is_empty() {
            warn!("DigiLocker client id is not configured");
            return Err(AuthError::Provider("DigiLocker is not configured".to_string()));
        }
        debug!("Exchanging DigiLocker authorization code");
        let token: TokenResponse = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("redirect_uri", self.config.redirect_url.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let profile = self
            .http
            .get(&self.config.profile_url)
            .bearer_auth(&token.access_token)
            .send()
            .await?
            .error_for_status()?
            .json::<ProviderProfile>()
            .await?;
        Ok(profile)
    }
}
