//! API request handlers.

use std::collections::BTreeMap;

use axum::{
    Form, Json,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, Uri, header::SET_COOKIE},
    response::{AppendHeaders, Html, IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use subtle::ConstantTimeEq;
use tracing::{info, instrument, warn};

use crate::auth::oauth::{CALLBACK_COOKIE, FLOW_COOKIE_MAX_AGE, GithubProvider, STATE_COOKIE};
use crate::auth::{
    AuthError, CurrentUser, Identity, Session, SessionUser, SignInCredentials, Trigger, callbacks,
    cookie_value, found,
};

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Error code shown on the sign-in page after a failed credentials attempt.
pub const CREDENTIALS_SIGNIN_ERROR: &str = "CredentialsSignin";
/// Error code shown on the sign-in page after a failed OAuth callback.
pub const OAUTH_CALLBACK_ERROR: &str = "OAuthCallback";

/// Cookie scope for the OAuth flow cookies.
const AUTH_API_PATH: &str = "/api/auth";

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Provider and Session Handlers
// ============================================================================

/// Public description of a sign-in provider.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    pub id: &'static str,
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub signin_url: String,
    pub callback_url: String,
}

impl ProviderInfo {
    fn new(id: &'static str, name: &'static str, kind: &'static str) -> Self {
        Self {
            id,
            name,
            kind,
            signin_url: format!("{}/signin/{}", AUTH_API_PATH, id),
            callback_url: format!("{}/callback/{}", AUTH_API_PATH, id),
        }
    }
}

/// List the enabled sign-in providers.
pub async fn providers(State(state): State<AppState>) -> Json<BTreeMap<&'static str, ProviderInfo>> {
    let mut providers = BTreeMap::new();
    if state.auth.github().is_some() {
        providers.insert("github", ProviderInfo::new("github", "GitHub", "oauth"));
    }
    providers.insert(
        "credentials",
        ProviderInfo::new("credentials", "Credentials", "credentials"),
    );
    Json(providers)
}

/// Current session, or `null` when signed out.
pub async fn get_session(State(state): State<AppState>, headers: HeaderMap) -> Json<Option<Session>> {
    let session = state
        .auth
        .claims_from_headers(&headers)
        .map(|claims| state.auth.session_for(&claims));
    Json(session)
}

/// Session update request.
#[derive(Debug, Default, Deserialize)]
pub struct SessionUpdateRequest {
    /// Payload merged into the token.
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
}

/// Update the session token.
///
/// Runs the jwt callback with the `update` trigger, re-signs the token and
/// restarts its lifetime.
#[instrument(skip(state, headers, request))]
pub async fn update_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SessionUpdateRequest>,
) -> ApiResult<impl IntoResponse> {
    let claims = state
        .auth
        .claims_from_headers(&headers)
        .ok_or(AuthError::MissingSession)?;

    let mut claims = callbacks::jwt(claims, None, Some(Trigger::Update), request.data.as_ref())?;
    claims.refresh_expiry(
        Utc::now().timestamp(),
        state.auth.config().session_max_age_secs,
    );

    let token = state.auth.encode_token(&claims)?;
    let session = state.auth.session_for(&claims);

    info!(user_id = ?session.user.id, "Session updated");

    Ok((
        AppendHeaders([(SET_COOKIE, state.auth.session_cookie(&token))]),
        Json(session),
    ))
}

/// Sign out (clears the session cookie).
pub async fn signout(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        AppendHeaders([(SET_COOKIE, state.auth.clear_session_cookie())]),
    )
}

// ============================================================================
// Sign-in Handlers
// ============================================================================

/// Credentials form as posted by the sign-in page.
#[derive(Debug, Deserialize)]
pub struct CredentialsForm {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default, rename = "callbackUrl")]
    pub callback_url: Option<String>,
}

/// Credentials sign-in.
///
/// Redirects to the callback URL on success and back to the sign-in page with
/// an error code on failure.
#[instrument(skip(state, form))]
pub async fn credentials_callback(
    State(state): State<AppState>,
    Form(form): Form<CredentialsForm>,
) -> ApiResult<Response> {
    let credentials = SignInCredentials {
        email: form.email,
        password: form.password,
    };

    let Some(identity) = state.auth.authorize_credentials(&credentials) else {
        return Ok(found(
            &state
                .auth
                .signin_url(None, Some(CREDENTIALS_SIGNIN_ERROR)),
        ));
    };

    complete_sign_in(&state, &identity, form.callback_url.as_deref(), Vec::new())
}

/// Query for starting an OAuth sign-in.
#[derive(Debug, Deserialize)]
pub struct SignInQuery {
    #[serde(default, rename = "callbackUrl")]
    pub callback_url: Option<String>,
}

/// Start GitHub sign-in: remember state and return path, then hand off to GitHub.
#[instrument(skip(state, headers, query))]
pub async fn github_signin(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SignInQuery>,
) -> ApiResult<Response> {
    let github = state
        .auth
        .github()
        .ok_or_else(|| AuthError::ProviderNotConfigured("github".to_string()))?;

    let oauth_state = GithubProvider::generate_state();
    let redirect_uri = provider_callback_uri(&state, &headers, "github");
    let location = github.authorization_url(&redirect_uri, &oauth_state);

    let callback_url = state.auth.safe_callback_url(query.callback_url.as_deref());
    let cookies = vec![
        state
            .auth
            .cookie(STATE_COOKIE, &oauth_state, AUTH_API_PATH, FLOW_COOKIE_MAX_AGE),
        state.auth.cookie(
            CALLBACK_COOKIE,
            &urlencoding::encode(&callback_url),
            AUTH_API_PATH,
            FLOW_COOKIE_MAX_AGE,
        ),
    ];

    redirect_with_cookies(&location, cookies)
}

/// OAuth callback query.
#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Finish GitHub sign-in.
#[instrument(skip(state, headers, query))]
pub async fn github_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<OAuthCallbackQuery>,
) -> ApiResult<Response> {
    let github = state
        .auth
        .github()
        .ok_or_else(|| AuthError::ProviderNotConfigured("github".to_string()))?;

    let expected_state = cookie_value(&headers, STATE_COOKIE).map(str::to_string);
    let callback_url = cookie_value(&headers, CALLBACK_COOKIE)
        .and_then(|value| urlencoding::decode(value).ok())
        .map(|value| value.into_owned());

    let clear_flow_cookies = vec![
        state.auth.cookie(STATE_COOKIE, "", AUTH_API_PATH, 0),
        state.auth.cookie(CALLBACK_COOKIE, "", AUTH_API_PATH, 0),
    ];
    let failure_url = state.auth.signin_url(None, Some(OAUTH_CALLBACK_ERROR));

    if let Some(error) = query.error {
        warn!(error = %error, "GitHub returned an error");
        return redirect_with_cookies(&failure_url, clear_flow_cookies);
    }

    let code = match (query.code, query.state, expected_state) {
        (Some(code), Some(got), Some(expected)) if states_match(&got, &expected) => code,
        _ => {
            warn!("OAuth state missing or mismatched");
            return redirect_with_cookies(&failure_url, clear_flow_cookies);
        }
    };

    let redirect_uri = provider_callback_uri(&state, &headers, "github");
    let profile = match github.exchange_code(&code, &redirect_uri).await {
        Ok(access_token) => github.fetch_profile(&access_token).await,
        Err(e) => Err(e),
    };

    match profile {
        Ok(profile) => complete_sign_in(
            &state,
            &profile.into_identity(),
            callback_url.as_deref(),
            clear_flow_cookies,
        ),
        Err(e) => {
            warn!(error = %e, "GitHub sign-in failed");
            redirect_with_cookies(&failure_url, clear_flow_cookies)
        }
    }
}

/// Compare the returned OAuth state with the cookie copy in constant time.
fn states_match(got: &str, expected: &str) -> bool {
    !expected.is_empty() && bool::from(got.as_bytes().ct_eq(expected.as_bytes()))
}

/// Issue the session for `identity` and redirect to the return path.
fn complete_sign_in(
    state: &AppState,
    identity: &Identity,
    callback_url: Option<&str>,
    extra_cookies: Vec<String>,
) -> ApiResult<Response> {
    let claims = state.auth.sign_in(identity)?;
    let token = state.auth.encode_token(&claims)?;
    let location = state.auth.safe_callback_url(callback_url);

    info!(user_id = %identity.id, role = %identity.role, "User signed in");

    let mut cookies = vec![state.auth.session_cookie(&token)];
    cookies.extend(extra_cookies);
    redirect_with_cookies(&location, cookies)
}

fn redirect_with_cookies(location: &str, cookies: Vec<String>) -> ApiResult<Response> {
    let mut response = found(location);
    for cookie in cookies {
        let value = HeaderValue::from_str(&cookie)
            .map_err(|e| ApiError::internal(format!("invalid cookie header: {}", e)))?;
        response.headers_mut().append(SET_COOKIE, value);
    }
    Ok(response)
}

/// Absolute redirect URI for a provider callback.
fn provider_callback_uri(state: &AppState, headers: &HeaderMap, provider: &str) -> String {
    let base = match state.auth.config().base_url.as_deref() {
        Some(base) => base.trim_end_matches('/').to_string(),
        None => {
            let host = headers
                .get("host")
                .and_then(|h| h.to_str().ok())
                .unwrap_or("localhost");
            let default_scheme = if state.auth.is_dev_mode() { "http" } else { "https" };
            let scheme = headers
                .get("x-forwarded-proto")
                .and_then(|h| h.to_str().ok())
                .unwrap_or(default_scheme);
            format!("{}://{}", scheme, host)
        }
    };
    format!("{}{}/callback/{}", base, AUTH_API_PATH, provider)
}

// ============================================================================
// Page Handlers
// ============================================================================

/// Sign-in page query.
#[derive(Debug, Deserialize)]
pub struct SignInPageQuery {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, rename = "callbackUrl")]
    pub callback_url: Option<String>,
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn signin_error_message(code: &str) -> &'static str {
    match code {
        CREDENTIALS_SIGNIN_ERROR => "Sign in failed. Check the details you provided are correct.",
        OAUTH_CALLBACK_ERROR => "Could not sign in with GitHub. Try again.",
        _ => "Unable to sign in.",
    }
}

/// Custom sign-in page.
pub async fn signin_page(
    State(state): State<AppState>,
    Query(query): Query<SignInPageQuery>,
) -> Html<String> {
    let callback_url = state.auth.safe_callback_url(query.callback_url.as_deref());

    let error = query
        .error
        .as_deref()
        .map(|code| format!("<p class=\"error\">{}</p>\n", signin_error_message(code)))
        .unwrap_or_default();

    let github = if state.auth.github().is_some() {
        format!(
            "<p><a href=\"{}/signin/github?callbackUrl={}\">Sign in with GitHub</a></p>\n",
            AUTH_API_PATH,
            escape_html(&urlencoding::encode(&callback_url)),
        )
    } else {
        String::new()
    };

    Html(format!(
        r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>Sign in</title></head>
<body>
<h1>Sign in</h1>
{error}<form method="post" action="{api}/callback/credentials">
<input type="hidden" name="callbackUrl" value="{callback}">
<label>Email <input type="email" name="email" placeholder="Email"></label>
<label>Password <input type="password" name="password" placeholder="Password"></label>
<button type="submit">Sign in</button>
</form>
{github}</body>
</html>
"#,
        error = error,
        api = AUTH_API_PATH,
        callback = escape_html(&callback_url),
        github = github,
    ))
}

/// Placeholder page body.
#[derive(Debug, Serialize)]
pub struct PageResponse {
    pub path: String,
    pub user: Option<SessionUser>,
}

/// Any gated page that has no dedicated handler.
pub async fn page(user: Option<CurrentUser>, uri: Uri) -> Json<PageResponse> {
    Json(PageResponse {
        path: uri.path().to_string(),
        user: user.map(|u| u.session.user),
    })
}
