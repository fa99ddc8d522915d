//! Authentication module.
//!
//! Provides:
//! - Credentials sign-in (stub user or bcrypt-checked dev users)
//! - GitHub OAuth sign-in
//! - Signed session tokens and the jwt/session projection callbacks
//! - Role-based page access middleware

pub mod callbacks;
mod claims;
mod config;
pub mod credentials;
pub mod decision;
mod error;
mod middleware;
pub mod oauth;

pub use callbacks::Trigger;
pub use claims::{
    ADMIN_ROLE, Claims, DEFAULT_ROLE, Identity, Role, Session, SessionUser, effective_role,
};
pub use config::{
    AuthConfig, ConfigValidationError, CredentialsConfig, CredentialsMode, DevUser, GithubConfig,
    RouteConfig, StubUser, resolve_env_ref,
};
pub use credentials::SignInCredentials;
pub use decision::{AuthorizationContext, Decision};
pub use error::AuthError;
pub use middleware::{AuthState, CurrentUser, authorize_middleware, cookie_value, found};
