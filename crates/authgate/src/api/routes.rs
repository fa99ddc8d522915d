//! Router assembly.

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::auth::{AuthState, authorize_middleware};

use super::handlers;
use super::state::AppState;

/// Localhost origins allowed in dev mode.
const DEV_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "http://localhost:8080",
    "http://127.0.0.1:3000",
    "http://127.0.0.1:8080",
];

/// Public auth endpoints plus every other path behind the access middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.auth);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let auth_state = state.auth.clone();

    // Auth endpoints and health check (never gated)
    let public_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/api/auth/providers", get(handlers::providers))
        .route(
            "/api/auth/session",
            get(handlers::get_session).post(handlers::update_session),
        )
        .route(
            "/api/auth/callback/credentials",
            post(handlers::credentials_callback),
        )
        .route("/api/auth/signin/github", get(handlers::github_signin))
        .route("/api/auth/callback/github", get(handlers::github_callback))
        .route("/api/auth/signout", post(handlers::signout))
        .with_state(state.clone());

    // Everything else is a page and goes through the access decision
    let gated_routes = Router::new()
        .route("/auth/signin", get(handlers::signin_page))
        .fallback(handlers::page)
        .layer(middleware::from_fn_with_state(
            auth_state,
            authorize_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(gated_routes)
        .layer(cors)
        .layer(trace_layer)
}

/// CORS for browser clients on other origins.
///
/// Allows the configured origins, plus localhost dev servers in dev mode.
/// With no usable origin every cross-origin request is refused.
fn cors_layer(auth: &AuthState) -> CorsLayer {
    let dev_origins = if auth.is_dev_mode() { DEV_ORIGINS } else { &[] };

    let mut origins: Vec<HeaderValue> = Vec::new();
    for origin in auth
        .allowed_origins()
        .iter()
        .map(String::as_str)
        .chain(dev_origins.iter().copied())
    {
        match HeaderValue::from_str(origin) {
            Ok(value) if !origins.contains(&value) => origins.push(value),
            Ok(_) => {}
            Err(_) => tracing::warn!(origin, "CORS: ignoring invalid origin"),
        }
    }

    if origins.is_empty() {
        tracing::warn!("CORS: no allowed origins, cross-origin requests are refused");
        // "null" never matches a real origin
        return CorsLayer::new().allow_origin(AllowOrigin::exact(HeaderValue::from_static("null")));
    }

    tracing::info!(count = origins.len(), "CORS: origins allowed");
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::COOKIE,
        ])
        .allow_credentials(true)
}
