//! HTTP API module.
//!
//! Provides the auth endpoints, the sign-in page and the gated page fallback.

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use handlers::{CREDENTIALS_SIGNIN_ERROR, OAUTH_CALLBACK_ERROR};
pub use routes::create_router;
pub use state::AppState;
