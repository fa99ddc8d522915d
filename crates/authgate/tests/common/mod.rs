//! Test utilities and common setup.

use std::collections::HashMap;

use axum::http::{HeaderMap, Response, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use authgate::api;
use authgate::auth::{AuthConfig, AuthState, CredentialsMode, DevUser, Identity, Role};

pub const TEST_SECRET: &str = "test-secret-for-integration-tests-minimum-32-chars";
pub const SESSION_COOKIE: &str = "authgate.session-token";

pub const USER_PASSWORD: &str = "userpassword123";
pub const ADMIN_PASSWORD: &str = "adminpassword123";

/// Authorization code and access token the fake GitHub accepts.
pub const GITHUB_CODE: &str = "good-code";
pub const GITHUB_ACCESS_TOKEN: &str = "gho_test_token";

/// Base config: explicit secret, GitHub disabled.
fn test_auth_config() -> AuthConfig {
    let mut config = AuthConfig::default();
    config.jwt_secret = Some(TEST_SECRET.to_string());
    config.github.client_id = None;
    config.github.client_secret = None;
    config
}

fn build(config: AuthConfig) -> (Router, AuthState) {
    let auth_state = AuthState::new(config);
    let state = api::AppState::new(auth_state.clone());
    (api::create_router(state), auth_state)
}

fn dev_user(id: &str, email: &str, password: &str, role: Role) -> DevUser {
    DevUser {
        id: id.to_string(),
        name: format!("Test {}", id),
        email: email.to_string(),
        password_hash: bcrypt::hash(password, 4).unwrap(),
        role,
    }
}

/// Dev mode app using the stub credentials provider.
pub fn test_app() -> (Router, AuthState) {
    let mut config = test_auth_config();
    config.dev_mode = true;
    config.credentials.mode = CredentialsMode::Stub;
    build(config)
}

/// Production-mode app with a regular user and an admin.
pub fn test_app_with_dev_users() -> (Router, AuthState) {
    let mut config = test_auth_config();
    config.credentials.mode = CredentialsMode::DevUsers;
    config.credentials.dev_users = vec![
        dev_user("alice", "alice@example.com", USER_PASSWORD, Role::User),
        dev_user("root", "root@example.com", ADMIN_PASSWORD, Role::Admin),
    ];
    build(config)
}

/// Dev mode app with GitHub enabled. The provider endpoints point at a closed
/// local port so code exchange always fails.
pub fn test_app_with_github() -> (Router, AuthState) {
    test_app_with_github_at("http://127.0.0.1:9")
}

/// Dev mode app with GitHub token and profile endpoints under `provider_url`.
pub fn test_app_with_github_at(provider_url: &str) -> (Router, AuthState) {
    let mut config = test_auth_config();
    config.dev_mode = true;
    config.base_url = Some("http://localhost:3000".to_string());
    config.github.client_id = Some("test-client-id".to_string());
    config.github.client_secret = Some("test-client-secret".to_string());
    config.github.token_url = format!("{}/login/oauth/access_token", provider_url);
    config.github.user_info_url = format!("{}/user", provider_url);
    build(config)
}

async fn fake_token_endpoint(Form(form): Form<HashMap<String, String>>) -> Json<serde_json::Value> {
    let valid = form.get("code").map(String::as_str) == Some(GITHUB_CODE)
        && form.get("client_id").map(String::as_str) == Some("test-client-id")
        && form.get("client_secret").map(String::as_str) == Some("test-client-secret");

    if valid {
        Json(serde_json::json!({
            "access_token": GITHUB_ACCESS_TOKEN,
            "token_type": "bearer",
            "scope": "read:user,user:email"
        }))
    } else {
        Json(serde_json::json!({
            "error": "bad_verification_code",
            "error_description": "The code passed is incorrect or expired."
        }))
    }
}

async fn fake_user_endpoint(headers: HeaderMap) -> axum::response::Response {
    let expected = format!("Bearer {}", GITHUB_ACCESS_TOKEN);
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        == Some(expected.as_str());

    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    Json(serde_json::json!({
        "id": 583231,
        "login": "octocat",
        "name": "The Octocat",
        "email": "octocat@example.com",
        "avatar_url": "https://avatars.example/u/583231"
    }))
    .into_response()
}

/// Serve a minimal GitHub token and profile API on an ephemeral local port.
/// Returns its base URL.
pub async fn spawn_github_provider() -> String {
    let router = Router::new()
        .route("/login/oauth/access_token", post(fake_token_endpoint))
        .route("/user", get(fake_user_endpoint));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://{}", addr)
}

pub fn identity(id: &str, role: &str) -> Identity {
    Identity {
        id: id.to_string(),
        name: format!("Test {}", id),
        email: format!("{}@example.com", id),
        role: role.to_string(),
        image: None,
    }
}

/// Signed session token for `identity`.
pub fn token_for(auth: &AuthState, identity: &Identity) -> String {
    let claims = auth.sign_in(identity).unwrap();
    auth.encode_token(&claims).unwrap()
}

/// Cookie header value carrying a session token.
pub fn session_cookie(token: &str) -> String {
    format!("{}={}", SESSION_COOKIE, token)
}

/// All Set-Cookie values on a response.
pub fn set_cookies<B>(response: &Response<B>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .map(str::to_string)
        .collect()
}

/// `name=value` pair of a Set-Cookie entry, by cookie name.
pub fn cookie_pair<B>(response: &Response<B>, name: &str) -> Option<String> {
    set_cookies(response).into_iter().find_map(|cookie| {
        let pair = cookie.split(';').next()?.trim().to_string();
        if pair.starts_with(&format!("{}=", name)) {
            Some(pair)
        } else {
            None
        }
    })
}

pub fn location<B>(response: &Response<B>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
