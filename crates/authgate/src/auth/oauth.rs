//! GitHub OAuth authorization-code flow.

use std::time::Duration;

use log::warn;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use serde::Deserialize;

use super::{AuthError, DEFAULT_ROLE, GithubConfig, Identity};

/// Cookie holding the OAuth `state` between redirect and callback.
pub const STATE_COOKIE: &str = "authgate.oauth-state";
/// Cookie holding the post-login redirect target.
pub const CALLBACK_COOKIE: &str = "authgate.callback-url";
/// Lifetime of the flow cookies in seconds.
pub const FLOW_COOKIE_MAX_AGE: i64 = 600;

/// Token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Subset of the GitHub user profile.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubProfile {
    pub id: u64,
    pub login: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl GithubProfile {
    /// Map the profile to an identity. OAuth users get the default role.
    pub fn into_identity(self) -> Identity {
        Identity {
            id: self.id.to_string(),
            name: self.name.filter(|n| !n.is_empty()).unwrap_or(self.login),
            email: self.email.unwrap_or_default(),
            role: DEFAULT_ROLE.to_string(),
            image: self.avatar_url,
        }
    }
}

/// Configured GitHub provider.
#[derive(Debug, Clone)]
pub struct GithubProvider {
    client_id: String,
    client_secret: String,
    authorize_url: String,
    token_url: String,
    user_info_url: String,
    scopes: Vec<String>,
    http: reqwest::Client,
}

impl GithubProvider {
    /// Build the provider, or `None` when no client credentials resolve.
    pub fn from_config(config: &GithubConfig) -> Option<Self> {
        let (client_id, client_secret) = config.resolve_client()?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| warn!("Failed to build GitHub HTTP client: {}", e))
            .ok()?;

        Some(Self {
            client_id,
            client_secret,
            authorize_url: config.authorize_url.clone(),
            token_url: config.token_url.clone(),
            user_info_url: config.user_info_url.clone(),
            scopes: config.scopes.clone(),
            http,
        })
    }

    /// Random value binding the callback to this browser.
    pub fn generate_state() -> String {
        nanoid::nanoid!(32)
    }

    /// URL to send the browser to for consent.
    pub fn authorization_url(&self, redirect_uri: &str, state: &str) -> String {
        let scope = self.scopes.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&scope={}&state={}",
            self.authorize_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scope),
            urlencoding::encode(state),
        )
    }

    /// Exchange an authorization code for an access token.
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<String, AuthError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ];
        let body = params
            .iter()
            .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");

        let response = self
            .http
            .post(&self.token_url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| AuthError::OAuth(format!("token request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AuthError::OAuth(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::OAuth(format!("invalid token response: {}", e)))?;

        match (body.access_token, body.error) {
            (Some(token), None) => Ok(token),
            (_, Some(error)) => Err(AuthError::OAuth(format!(
                "{}: {}",
                error,
                body.error_description.unwrap_or_default()
            ))),
            (None, None) => Err(AuthError::OAuth("token response missing access_token".into())),
        }
    }

    /// Fetch the signed-in user's profile.
    pub async fn fetch_profile(&self, access_token: &str) -> Result<GithubProfile, AuthError> {
        let response = self
            .http
            .get(&self.user_info_url)
            .bearer_auth(access_token)
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, concat!("authgate/", env!("CARGO_PKG_VERSION")))
            .send()
            .await
            .map_err(|e| AuthError::OAuth(format!("profile request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AuthError::OAuth(format!(
                "profile endpoint returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::OAuth(format!("invalid profile response: {}", e)))
    }
}
