//! Credential resolution
//!
//! Looks up `API_USERNAME_<KEY>` / `API_PASSWORD_<KEY>` for the environment's
//! credential key, then the generic `API_USERNAME` / `API_PASSWORD` pair.
//! Never fails: with nothing configured the pair is empty and the
//! authenticator refuses to send it.

use crate::config::EnvLookup;
use muniprobe_fixtures::Environment;
use std::fmt;

/// Where a credential pair came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialScope {
    /// Environment-scoped variables
    Environment(Environment),
    /// Generic fallback variables
    Generic,
    /// Nothing usable was configured
    Unset,
}

/// Username/password pair
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub scope: CredentialScope,
}

impl Credentials {
    /// Create credentials
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>, scope: CredentialScope) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            scope,
        }
    }

    /// Empty pair
    #[inline]
    #[must_use]
    pub fn unset() -> Self {
        Self::new("", "", CredentialScope::Unset)
    }

    /// Both fields non-empty
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("scope", &self.scope)
            .finish()
    }
}

fn non_blank(env: &impl EnvLookup, name: &str) -> Option<String> {
    env.var(name).filter(|v| !v.trim().is_empty())
}

/// Resolve the credential pair for `environment`
#[must_use]
pub fn resolve_credentials(environment: Environment, env: &impl EnvLookup) -> Credentials {
    let key = environment.credential_key();
    let scoped_user = non_blank(env, &format!("API_USERNAME_{key}"));
    let scoped_pass = non_blank(env, &format!("API_PASSWORD_{key}"));

    if let (Some(username), Some(password)) = (scoped_user, scoped_pass) {
        tracing::debug!(environment = %environment, "using environment-scoped credentials");
        return Credentials::new(username, password, CredentialScope::Environment(environment));
    }

    tracing::warn!(
        environment = %environment,
        "environment-scoped credentials incomplete, falling back to generic pair"
    );

    match (non_blank(env, "API_USERNAME"), non_blank(env, "API_PASSWORD")) {
        (Some(username), Some(password)) => {
            Credentials::new(username, password, CredentialScope::Generic)
        }
        _ => {
            tracing::warn!(environment = %environment, "no credentials configured");
            Credentials::unset()
        }
    }
}
