//! Credentials sign-in: shape validation and user resolution.

use log::{info, warn};
use serde::Deserialize;

use super::{CredentialsConfig, CredentialsMode, Identity};

/// Raw credential pair as submitted by the sign-in form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignInCredentials {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// A single failed schema rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: &'static str,
    pub message: &'static str,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl SignInCredentials {
    /// Check the credential shape, collecting every issue.
    pub fn validate(&self) -> Result<(), Vec<ValidationIssue>> {
        let mut issues = Vec::new();

        match self.email.as_deref() {
            None | Some("") => issues.push(ValidationIssue {
                field: "email",
                message: "Email is required",
            }),
            Some(email) if !is_valid_email(email) => issues.push(ValidationIssue {
                field: "email",
                message: "Invalid email",
            }),
            Some(_) => {}
        }

        if self.password.as_deref().is_none_or(str::is_empty) {
            issues.push(ValidationIssue {
                field: "password",
                message: "Password is required",
            });
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

/// Basic email validation.
pub fn is_valid_email(email: &str) -> bool {
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return false;
    }
    let (local, domain) = (parts[0], parts[1]);
    !local.is_empty()
        && !email.chars().any(char::is_whitespace)
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

/// Resolve submitted credentials to an identity.
///
/// Malformed credentials are logged and rejected. In stub mode a well-formed
/// pair always yields the configured stub user.
pub fn authorize(credentials: &SignInCredentials, config: &CredentialsConfig) -> Option<Identity> {
    if let Err(issues) = credentials.validate() {
        let issues: Vec<String> = issues.iter().map(ToString::to_string).collect();
        warn!("Invalid credentials: {}", issues.join(", "));
        return None;
    }

    let user = match config.mode {
        CredentialsMode::Stub => Some(config.stub_user.to_identity()),
        CredentialsMode::DevUsers => {
            // validate() guarantees both fields are present
            let email = credentials.email.as_deref().unwrap_or_default();
            let password = credentials.password.as_deref().unwrap_or_default();
            config
                .dev_users
                .iter()
                .find(|u| (u.email == email || u.id == email) && u.verify_password(password))
                .map(|u| u.to_identity())
        }
    };

    if user.is_none() {
        info!("Invalid credentials");
    }

    user
}
