//! Per-request page access decision.

use super::{ADMIN_ROLE, RouteConfig, SessionUser, effective_role};

/// Inputs to a single access decision.
#[derive(Debug, Clone)]
pub struct AuthorizationContext {
    pub pathname: String,
    pub identity: Option<SessionUser>,
}

/// Outcome of an access decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
    Redirect(String),
}

impl From<bool> for Decision {
    fn from(allowed: bool) -> Self {
        if allowed { Decision::Allow } else { Decision::Deny }
    }
}

/// Decide whether a request may reach its page.
///
/// Signed-in users are bounced off the sign-in page, non-admins off admin
/// prefixes; everything else is open to signed-in users only.
pub fn authorized(ctx: &AuthorizationContext, routes: &RouteConfig) -> Decision {
    let is_logged_in = ctx.identity.is_some();
    let role = effective_role(ctx.identity.as_ref().map(|user| user.role.as_str()));
    let pathname = ctx.pathname.as_str();

    if pathname.starts_with(&routes.signin_page) && is_logged_in {
        return Decision::Redirect(routes.home.clone());
    }

    let admin_only = routes
        .admin_prefixes
        .iter()
        .any(|prefix| pathname.starts_with(prefix.as_str()));
    if admin_only && role != ADMIN_ROLE {
        return Decision::Redirect(routes.home.clone());
    }

    Decision::from(is_logged_in)
}
