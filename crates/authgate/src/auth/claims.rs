//! Session token claims, identities and the projected session view.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Role assigned when a token or identity carries none.
pub const DEFAULT_ROLE: &str = "user";

/// Role required for admin-only pages.
pub const ADMIN_ROLE: &str = "admin";

/// Resolve the role to act on, falling back to [`DEFAULT_ROLE`].
///
/// Empty strings count as missing.
pub fn effective_role(role: Option<&str>) -> &str {
    match role {
        Some(role) if !role.is_empty() => role,
        _ => DEFAULT_ROLE,
    }
}

/// User role for configured users.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular user.
    #[default]
    User,
    /// Administrator.
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => DEFAULT_ROLE,
            Role::Admin => ADMIN_ROLE,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated user record, as returned by a sign-in provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    /// Avatar URL, when the provider supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Signed session token claims.
///
/// Unknown keys are preserved in `extra`, so payloads merged in on a session
/// update survive encoding and decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (provider account ID).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// User ID copied from the identity at sign-in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// User role copied from the identity at sign-in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,

    /// Issued at (as Unix timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Expiration time (as Unix timestamp).
    pub exp: i64,

    /// JWT ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    /// Any other claims.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    /// Default claims for a freshly signed-in identity.
    ///
    /// `id` and `role` are left empty; the jwt callback copies them.
    pub fn for_identity(identity: &Identity, now: i64, max_age_secs: i64) -> Self {
        Self {
            sub: Some(identity.id.clone()),
            id: None,
            role: None,
            name: Some(identity.name.clone()),
            email: Some(identity.email.clone()),
            picture: identity.image.clone(),
            iat: Some(now),
            exp: now + max_age_secs,
            jti: Some(nanoid::nanoid!()),
            extra: Map::new(),
        }
    }

    /// Shallow-merge `payload` into these claims. Payload keys win.
    pub fn merged_with(&self, payload: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(ref mut map) = value {
            for (key, val) in payload {
                map.insert(key.clone(), val.clone());
            }
        }
        serde_json::from_value(value)
    }

    /// Restart the token lifetime at `now`.
    pub fn refresh_expiry(&mut self, now: i64, max_age_secs: i64) {
        self.iat = Some(now);
        self.exp = now + max_age_secs;
    }
}

/// User fields exposed through the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    pub role: String,
}

/// Per-request session view derived from a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user: SessionUser,
    pub expires: DateTime<Utc>,
}

impl Session {
    /// Base session carrying the profile fields of a token.
    ///
    /// `id` and `role` are filled by the session callback.
    pub fn from_claims(claims: &Claims) -> Self {
        let expires = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .unwrap_or_else(Utc::now);

        Self {
            user: SessionUser {
                id: None,
                name: claims.name.clone(),
                email: claims.email.clone(),
                image: claims.picture.clone(),
                role: DEFAULT_ROLE.to_string(),
            },
            expires,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn identity() -> Identity {
        Identity {
            id: "1".to_string(),
            name: "Stub Admin".to_string(),
            email: "admin@localhost".to_string(),
            role: "admin".to_string(),
            image: None,
        }
    }

    #[test]
    fn test_effective_role_defaults() {
        assert_eq!(effective_role(None), "user");
        assert_eq!(effective_role(Some("")), "user");
        assert_eq!(effective_role(Some("admin")), "admin");
        assert_eq!(effective_role(Some("editor")), "editor");
    }

    #[test]
    fn test_role_serde_names() {
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(Role::Admin.to_string(), "admin");
        assert_eq!(serde_json::to_value(Role::Admin).unwrap(), json!("admin"));
        assert!(serde_json::from_value::<Role>(json!("root")).is_err());
    }

    #[test]
    fn test_claims_for_identity() {
        let claims = Claims::for_identity(&identity(), 1_000, 60);
        assert_eq!(claims.sub.as_deref(), Some("1"));
        assert_eq!(claims.name.as_deref(), Some("Stub Admin"));
        assert_eq!(claims.exp, 1_060);
        assert!(claims.id.is_none());
        assert!(claims.role.is_none());
        assert!(claims.jti.is_some());
    }

    #[test]
    fn test_merge_overrides_and_keeps_extra_keys() {
        let claims = Claims::for_identity(&identity(), 0, 60);
        let payload = json!({ "name": "Renamed", "theme": "dark" });
        let merged = claims
            .merged_with(payload.as_object().unwrap())
            .unwrap();

        assert_eq!(merged.name.as_deref(), Some("Renamed"));
        assert_eq!(merged.extra.get("theme"), Some(&json!("dark")));
        assert_eq!(merged.email, claims.email);
    }

    #[test]
    fn test_merge_rejects_malformed_known_claims() {
        let claims = Claims::for_identity(&identity(), 0, 60);
        let payload = json!({ "role": 42 });
        assert!(claims.merged_with(payload.as_object().unwrap()).is_err());
    }

    #[test]
    fn test_claims_round_trip_through_json_keeps_extra() {
        let mut claims = Claims::for_identity(&identity(), 0, 60);
        claims.extra.insert("plan".to_string(), json!("pro"));
        let text = serde_json::to_string(&claims).unwrap();
        let back: Claims = serde_json::from_str(&text).unwrap();
        assert_eq!(back, claims);
    }

    #[test]
    fn test_session_from_claims() {
        let claims = Claims::for_identity(&identity(), 0, 60);
        let session = Session::from_claims(&claims);
        assert_eq!(session.user.role, "user");
        assert!(session.user.id.is_none());
        assert_eq!(session.user.email.as_deref(), Some("admin@localhost"));
        assert_eq!(session.expires.timestamp(), 60);
    }
}
