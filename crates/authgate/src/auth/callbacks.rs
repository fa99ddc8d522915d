//! Token and session projection callbacks.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{AuthError, Claims, Identity, Session, effective_role};

/// Why the token is being (re)computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Trigger {
    SignIn,
    Update,
}

/// Compute the token to persist.
///
/// On sign-in (`user` present) the user's id and role are copied in. On an
/// explicit update with a payload, the payload is shallow-merged over the token.
pub fn jwt(
    mut token: Claims,
    user: Option<&Identity>,
    trigger: Option<Trigger>,
    session: Option<&Map<String, Value>>,
) -> Result<Claims, AuthError> {
    if let Some(user) = user {
        token.id = Some(user.id.clone());
        token.role = Some(user.role.clone());
    }

    if let (Some(Trigger::Update), Some(payload)) = (trigger, session) {
        token = token
            .merged_with(payload)
            .map_err(|e| AuthError::InvalidSessionUpdate(e.to_string()))?;
    }

    Ok(token)
}

/// Expose token fields on the outward-facing session.
pub fn session(mut session: Session, token: Option<&Claims>) -> Session {
    if let Some(token) = token {
        session.user.id = token.id.clone();
        session.user.role = effective_role(token.role.as_deref()).to_string();
    }
    session
}
