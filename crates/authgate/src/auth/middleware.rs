//! Authentication state and the page access middleware.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{OptionalFromRequestParts, State},
    http::{
        HeaderMap, StatusCode,
        header::{AUTHORIZATION, COOKIE, LOCATION},
        request::Parts,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use log::{debug, warn};

use super::callbacks::{self, Trigger};
use super::credentials::{self, SignInCredentials};
use super::decision::{self, AuthorizationContext, Decision};
use super::oauth::GithubProvider;
use super::{AuthConfig, AuthError, Claims, Identity, RouteConfig, Session};

/// Extract a Bearer token from an Authorization header value.
fn bearer_token_from_header(header_value: &str) -> Result<&str, AuthError> {
    let mut parts = header_value.split_whitespace();
    let scheme = parts
        .next()
        .ok_or_else(|| AuthError::InvalidToken("empty authorization header".into()))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::InvalidToken("unsupported authorization scheme".into()));
    }

    let token = parts
        .next()
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AuthError::InvalidToken("missing bearer token".into()))?;

    if parts.next().is_some() {
        return Err(AuthError::InvalidToken("malformed authorization header".into()));
    }

    Ok(token)
}

/// Find a cookie value by name in a Cookie header.
pub fn cookie_value<'a>(headers: &'a HeaderMap, cookie_name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|cookie_header| cookie_header.split(';'))
        .map(str::trim)
        .find_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            if name.trim() == cookie_name {
                Some(value.trim())
            } else {
                None
            }
        })
}

/// Build a 302 response to `location`.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}

/// Signing keys derived from the resolved secret.
#[derive(Clone)]
struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// Authentication state shared across handlers.
#[derive(Clone)]
pub struct AuthState {
    config: Arc<AuthConfig>,
    keys: Option<TokenKeys>,
    github: Option<Arc<GithubProvider>>,
}

impl AuthState {
    /// Create new auth state from config.
    ///
    /// Resolves `env:VAR_NAME` syntax in jwt_secret at construction time. In
    /// dev mode a missing secret is replaced with an ephemeral random one.
    pub fn new(config: AuthConfig) -> Self {
        let secret = match config.resolve_jwt_secret() {
            Ok(secret) => secret,
            Err(e) => {
                warn!("Ignoring JWT secret: {}", e);
                None
            }
        };

        let secret = match secret {
            Some(secret) => Some(secret),
            None if config.dev_mode => {
                warn!("No JWT secret configured; using an ephemeral secret for dev mode");
                Some(AuthConfig::generate_jwt_secret())
            }
            None => None,
        };

        let keys = secret.map(|s| TokenKeys {
            encoding: EncodingKey::from_secret(s.as_bytes()),
            decoding: DecodingKey::from_secret(s.as_bytes()),
        });

        let github = GithubProvider::from_config(&config.github).map(Arc::new);
        if github.is_none() {
            debug!("GitHub provider disabled: client credentials not configured");
        }

        Self {
            config: Arc::new(config),
            keys,
            github,
        }
    }

    /// Check if dev mode is enabled.
    pub fn is_dev_mode(&self) -> bool {
        self.config.dev_mode
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn routes(&self) -> &RouteConfig {
        &self.config.routes
    }

    /// Get allowed CORS origins from config.
    pub fn allowed_origins(&self) -> &[String] {
        &self.config.allowed_origins
    }

    /// GitHub provider, when configured.
    pub fn github(&self) -> Option<&GithubProvider> {
        self.github.as_deref()
    }

    /// Run the credentials provider.
    pub fn authorize_credentials(&self, credentials: &SignInCredentials) -> Option<Identity> {
        credentials::authorize(credentials, &self.config.credentials)
    }

    /// Build the token for a freshly signed-in identity.
    pub fn sign_in(&self, identity: &Identity) -> Result<Claims, AuthError> {
        let token = Claims::for_identity(
            identity,
            Utc::now().timestamp(),
            self.config.session_max_age_secs,
        );
        callbacks::jwt(token, Some(identity), Some(Trigger::SignIn), None)
    }

    /// Sign claims into a session token.
    pub fn encode_token(&self, claims: &Claims) -> Result<String, AuthError> {
        let keys = self
            .keys
            .as_ref()
            .ok_or_else(|| AuthError::Internal("no JWT secret configured".to_string()))?;

        encode(&Header::new(Algorithm::HS256), claims, &keys.encoding)
            .map_err(|e| AuthError::Internal(e.to_string()))
    }

    /// Validate a session token.
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let keys = self
            .keys
            .as_ref()
            .ok_or_else(|| AuthError::Internal("no JWT secret configured".to_string()))?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_nbf = false;
        validation.required_spec_claims.clear(); // Allow missing iss/aud/sub

        let token_data = decode::<Claims>(token, &keys.decoding, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken(e.to_string()),
            }
        })?;

        Ok(token_data.claims)
    }

    /// Pull and validate the session token from a request.
    ///
    /// Checks `Authorization: Bearer` first, then the session cookie. Any
    /// failure means "not signed in".
    pub fn claims_from_headers(&self, headers: &HeaderMap) -> Option<Claims> {
        let token = match headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok()) {
            Some(header) => match bearer_token_from_header(header) {
                Ok(token) => Some(token),
                Err(e) => {
                    debug!("Ignoring authorization header: {}", e);
                    None
                }
            },
            None => None,
        };
        let token = token.or_else(|| cookie_value(headers, &self.config.session_cookie))?;

        match self.validate_token(token) {
            Ok(claims) => Some(claims),
            Err(AuthError::TokenExpired) => {
                debug!("Session token expired");
                None
            }
            Err(e) => {
                warn!("Session token rejected: {}", e);
                None
            }
        }
    }

    /// Project a token onto the session view.
    pub fn session_for(&self, claims: &Claims) -> Session {
        callbacks::session(Session::from_claims(claims), Some(claims))
    }

    /// Set-Cookie value carrying a session token.
    pub fn session_cookie(&self, token: &str) -> String {
        self.cookie(
            &self.config.session_cookie,
            token,
            "/",
            self.config.session_max_age_secs,
        )
    }

    /// Set-Cookie value removing the session token.
    pub fn clear_session_cookie(&self) -> String {
        self.cookie(&self.config.session_cookie, "", "/", 0)
    }

    /// Build a Set-Cookie value with the standard security flags.
    ///
    /// In dev mode the Secure flag is omitted to allow http://localhost.
    pub fn cookie(&self, name: &str, value: &str, path: &str, max_age: i64) -> String {
        let secure_flag = if self.is_dev_mode() { "" } else { " Secure;" };
        format!(
            "{}={}; Path={}; HttpOnly; SameSite=Lax;{} Max-Age={}",
            name, value, path, secure_flag, max_age
        )
    }

    /// Sign-in page URL, optionally carrying a return path and error code.
    pub fn signin_url(&self, callback_url: Option<&str>, error: Option<&str>) -> String {
        let mut params = Vec::new();
        if let Some(callback_url) = callback_url {
            params.push(format!("callbackUrl={}", urlencoding::encode(callback_url)));
        }
        if let Some(error) = error {
            params.push(format!("error={}", urlencoding::encode(error)));
        }

        let signin_page = &self.config.routes.signin_page;
        if params.is_empty() {
            signin_page.clone()
        } else {
            format!("{}?{}", signin_page, params.join("&"))
        }
    }

    /// Accept `candidate` as a redirect target only if it stays on this origin.
    ///
    /// Control characters are refused: browsers strip tabs and newlines, which
    /// turns `/\t/host` into `//host`.
    pub fn safe_callback_url(&self, candidate: Option<&str>) -> String {
        match candidate {
            Some(url)
                if url.starts_with('/')
                    && !url.starts_with("//")
                    && !url.contains('\\')
                    && !url.chars().any(char::is_control) =>
            {
                url.to_string()
            }
            _ => self.config.routes.home.clone(),
        }
    }
}

/// Authenticated user extracted from request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    /// Session projected from the request's token.
    pub session: Session,
}

impl<S> OptionalFromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<CurrentUser>().cloned())
    }
}

/// Page access middleware.
///
/// Resolves the session from the request, runs the access decision and either
/// forwards the request (with `CurrentUser` in extensions when signed in) or
/// answers with a redirect. Denied requests go to the sign-in page with a
/// `callbackUrl`, except the sign-in page itself.
pub async fn authorize_middleware(
    State(auth): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let user = auth
        .claims_from_headers(req.headers())
        .map(|claims| CurrentUser {
            session: auth.session_for(&claims),
        });

    let ctx = AuthorizationContext {
        pathname: req.uri().path().to_string(),
        identity: user.as_ref().map(|u| u.session.user.clone()),
    };

    match decision::authorized(&ctx, auth.routes()) {
        Decision::Allow => {
            if let Some(user) = user {
                req.extensions_mut().insert(user);
            }
            next.run(req).await
        }
        Decision::Redirect(to) => {
            debug!("Redirecting {} to {}", ctx.pathname, to);
            found(&to)
        }
        Decision::Deny if ctx.pathname == auth.routes().signin_page => {
            next.run(req).await
        }
        Decision::Deny => {
            let callback_url = req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/");
            found(&auth.signin_url(Some(callback_url), None))
        }
    }
}
