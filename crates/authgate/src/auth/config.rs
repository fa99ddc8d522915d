//! `[auth]` config section.

use super::{Identity, Role};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Settings for sign-in, session tokens and page access.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Enable development mode.
    ///
    /// Allows a missing JWT secret (an ephemeral one is generated), allows the
    /// stub credentials provider and drops the `Secure` cookie flag.
    pub dev_mode: bool,

    /// Secret for signing session tokens (HS256). Either a literal or
    /// `env:VAR_NAME`. REQUIRED when dev_mode is false.
    pub jwt_secret: Option<String>,

    /// Public base URL used to build OAuth redirect URIs.
    /// Derived from the request Host header when unset.
    pub base_url: Option<String>,

    /// Session lifetime in seconds.
    pub session_max_age_secs: i64,

    /// Name of the session cookie.
    pub session_cookie: String,

    /// Allowed CORS origins. If empty, CORS is disabled.
    pub allowed_origins: Vec<String>,

    /// Page access rules.
    pub routes: RouteConfig,

    /// Credentials sign-in provider.
    pub credentials: CredentialsConfig,

    /// GitHub OAuth provider.
    pub github: GithubConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            dev_mode: false,
            jwt_secret: Some("env:NEXTAUTH_SECRET".to_string()),
            base_url: None,
            session_max_age_secs: 30 * 24 * 60 * 60,
            session_cookie: "authgate.session-token".to_string(),
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:8080".to_string(),
            ],
            routes: RouteConfig::default(),
            credentials: CredentialsConfig::default(),
            github: GithubConfig::default(),
        }
    }
}

/// Shortest secret accepted outside dev mode.
pub const MIN_SECRET_LEN: usize = 32;

/// Placeholder secrets that must never sign production tokens.
const PLACEHOLDER_SECRETS: &[&str] = &["dev-secret-change-in-production", "changeme"];

/// Expand `env:VAR_NAME` to the variable's value; other values pass through.
pub fn resolve_env_ref(value: &str) -> Result<String, ConfigValidationError> {
    let Some(var) = value.strip_prefix("env:") else {
        return Ok(value.to_string());
    };

    match std::env::var(var) {
        Ok(resolved) if resolved.is_empty() => Err(ConfigValidationError::EnvVarEmpty(var.into())),
        Ok(resolved) => Ok(resolved),
        Err(_) => Err(ConfigValidationError::EnvVarNotFound(var.into())),
    }
}

impl AuthConfig {
    /// The signing secret with `env:` references expanded. `None` when unset.
    pub fn resolve_jwt_secret(&self) -> Result<Option<String>, ConfigValidationError> {
        self.jwt_secret.as_deref().map(resolve_env_ref).transpose()
    }

    /// Check the config is safe to serve with.
    ///
    /// Route paths are always checked. Secret strength and the credentials
    /// mode are only enforced outside dev mode.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        self.routes.validate()?;
        if self.dev_mode {
            return Ok(());
        }

        match self.resolve_jwt_secret()? {
            None => return Err(ConfigValidationError::MissingJwtSecret),
            Some(secret) if PLACEHOLDER_SECRETS.contains(&secret.as_str()) => {
                return Err(ConfigValidationError::InsecureJwtSecret);
            }
            Some(secret) if secret.len() < MIN_SECRET_LEN => {
                return Err(ConfigValidationError::JwtSecretTooShort);
            }
            Some(_) => {}
        }

        if self.credentials.mode == CredentialsMode::Stub {
            return Err(ConfigValidationError::StubModeOutsideDev);
        }
        Ok(())
    }

    /// Random 64-character alphanumeric secret.
    pub fn generate_jwt_secret() -> String {
        use rand::Rng;

        rand::rng()
            .sample_iter(rand::distr::Alphanumeric)
            .take(64)
            .map(char::from)
            .collect()
    }
}

/// Page access rules evaluated per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Custom sign-in page. Signed-in users are sent home from here.
    pub signin_page: String,
    /// Redirect target for bounced requests.
    pub home: String,
    /// Path prefixes that require the admin role.
    pub admin_prefixes: Vec<String>,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            signin_page: "/auth/signin".to_string(),
            home: "/".to_string(),
            admin_prefixes: vec!["/page2".to_string()],
        }
    }
}

impl RouteConfig {
    fn validate(&self) -> Result<(), ConfigValidationError> {
        let paths = [&self.signin_page, &self.home]
            .into_iter()
            .chain(self.admin_prefixes.iter());

        for path in paths {
            if !path.starts_with('/') {
                return Err(ConfigValidationError::InvalidRoutePath(path.clone()));
            }
        }
        Ok(())
    }
}

/// How the credentials provider resolves a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialsMode {
    /// Any well-formed credential pair signs in as the stub user.
    #[default]
    Stub,
    /// Credentials are checked against `dev_users`.
    DevUsers,
}

/// Credentials provider configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub mode: CredentialsMode,
    pub stub_user: StubUser,
    /// Passwords are stored as bcrypt hashes.
    pub dev_users: Vec<DevUser>,
}

/// Fixed identity returned by the stub credentials provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StubUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl Default for StubUser {
    fn default() -> Self {
        Self {
            id: "1".to_string(),
            name: "Stub Admin".to_string(),
            email: "admin@localhost".to_string(),
            role: Role::Admin,
        }
    }
}

impl StubUser {
    pub fn to_identity(&self) -> Identity {
        Identity {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role.to_string(),
            image: None,
        }
    }
}

/// A user the `dev_users` credentials mode can sign in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevUser {
    pub id: String,
    pub name: String,
    /// Matched against the submitted email (the id is accepted too).
    pub email: String,
    /// bcrypt hash (`$2b$...`).
    pub password_hash: String,
    pub role: Role,
}

impl DevUser {
    pub fn verify_password(&self, password: &str) -> bool {
        bcrypt::verify(password, &self.password_hash).unwrap_or(false)
    }

    pub fn to_identity(&self) -> Identity {
        Identity {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role.to_string(),
            image: None,
        }
    }
}

/// GitHub OAuth provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    /// OAuth app client ID (literal or `env:VAR_NAME`).
    pub client_id: Option<String>,
    /// OAuth app client secret (literal or `env:VAR_NAME`).
    pub client_secret: Option<String>,
    pub authorize_url: String,
    pub token_url: String,
    pub user_info_url: String,
    pub scopes: Vec<String>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            client_id: Some("env:AUTH_GITHUB_ID".to_string()),
            client_secret: Some("env:AUTH_GITHUB_SECRET".to_string()),
            authorize_url: "https://github.com/login/oauth/authorize".to_string(),
            token_url: "https://github.com/login/oauth/access_token".to_string(),
            user_info_url: "https://api.github.com/user".to_string(),
            scopes: vec!["read:user".to_string(), "user:email".to_string()],
        }
    }
}

impl GithubConfig {
    /// Resolve client ID and secret. `None` means the provider is disabled.
    pub fn resolve_client(&self) -> Option<(String, String)> {
        let id = resolve_env_ref(self.client_id.as_deref()?).ok()?;
        let secret = resolve_env_ref(self.client_secret.as_deref()?).ok()?;
        Some((id, secret))
    }
}

/// Reasons a config is refused at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigValidationError {
    #[error("auth.jwt_secret is required unless dev_mode is set (set NEXTAUTH_SECRET or the config value)")]
    MissingJwtSecret,

    #[error("auth.jwt_secret is a placeholder value; generate one with `authgate secret generate`")]
    InsecureJwtSecret,

    #[error("auth.jwt_secret must be at least 32 characters")]
    JwtSecretTooShort,

    #[error("environment variable {0} is not set")]
    EnvVarNotFound(String),

    #[error("environment variable {0} is empty")]
    EnvVarEmpty(String),

    /// Stub mode signs in any well-formed credentials.
    #[error("auth.credentials.mode = \"stub\" requires dev_mode; use \"dev_users\"")]
    StubModeOutsideDev,

    #[error("route path {0:?} must start with '/'")]
    InvalidRoutePath(String),
}
