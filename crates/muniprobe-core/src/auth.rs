//! Session authentication
//!
//! One login attempt per session: a form-encoded POST of the credential pair
//! to the login endpoint. A token is stored only for a 2xx response whose
//! JSON body carries a non-empty `access_token`; every other result moves the
//! authenticator to [`AuthState::Failed`] and the caller decides whether to
//! continue without a token.
//!
//! ```text
//! Unauthenticated ──login──▶ Requesting ──▶ Authenticated
//!                                       └──▶ Failed(reason)
//! ```

use crate::credentials::Credentials;
use crate::transport::{ApiRequest, Method, RequestBody, Transport};
use parking_lot::RwLock;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Bearer token
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wrap a raw token
    #[inline]
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(<redacted>)")
    }
}

/// Why a login attempt failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    /// Username or password empty; nothing was sent
    #[error("credentials missing")]
    MissingCredentials,

    /// Login endpoint answered with a non-2xx status
    #[error("login rejected with status {0}")]
    RejectedStatus(u16),

    /// 2xx response whose body is not a JSON object
    #[error("login response is not a JSON object")]
    UnparsableBody,

    /// JSON object without a usable `access_token`
    #[error("login response carries no access_token")]
    MissingToken,

    /// No HTTP status was obtained
    #[error("login request failed: {0}")]
    Transport(String),
}

impl AuthFailure {
    /// True if a request reached the server
    #[inline]
    #[must_use]
    pub fn was_sent(&self) -> bool {
        !matches!(self, Self::MissingCredentials)
    }
}

/// Authenticator state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    Unauthenticated,
    Requesting,
    Authenticated,
    Failed(AuthFailure),
}

impl AuthState {
    /// Check if a token is held
    #[inline]
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated)
    }

    /// Failure reason, if failed
    #[must_use]
    pub fn failure(&self) -> Option<&AuthFailure> {
        match self {
            Self::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Token shared between the authenticator and executing virtual users
///
/// Re-authentication overwrites the held token; a failed attempt clears it.
#[derive(Debug, Clone, Default)]
pub struct TokenCell {
    inner: Arc<RwLock<Option<SessionToken>>>,
}

impl TokenCell {
    /// Create an empty cell
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held token
    pub fn set(&self, token: SessionToken) {
        *self.inner.write() = Some(token);
    }

    /// Drop the held token
    pub fn clear(&self) {
        *self.inner.write() = None;
    }

    /// Current token
    #[must_use]
    pub fn get(&self) -> Option<SessionToken> {
        self.inner.read().clone()
    }

    /// Current raw token, ready for a bearer header
    #[must_use]
    pub fn bearer(&self) -> Option<String> {
        self.inner.read().as_ref().map(|t| t.as_str().to_string())
    }

    /// Check if a token is held
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.inner.read().is_some()
    }
}

/// Performs the login exchange for one session
pub struct Authenticator {
    transport: Arc<dyn Transport>,
    login_path: String,
    state: AuthState,
    token: TokenCell,
}

impl Authenticator {
    /// Create authenticator posting to `login_path`
    pub fn new(transport: Arc<dyn Transport>, login_path: impl Into<String>) -> Self {
        Self {
            transport,
            login_path: login_path.into(),
            state: AuthState::Unauthenticated,
            token: TokenCell::new(),
        }
    }

    /// Use an existing token cell
    #[must_use]
    pub fn with_token_cell(mut self, token: TokenCell) -> Self {
        self.token = token;
        self
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> &AuthState {
        &self.state
    }

    /// Cell the token is published to
    #[inline]
    #[must_use]
    pub fn token_cell(&self) -> &TokenCell {
        &self.token
    }

    /// Log in once; returns the token on success
    ///
    /// Failures are logged and recorded in [`Self::state`]. No retry.
    pub async fn login(&mut self, credentials: &Credentials) -> Option<SessionToken> {
        if !credentials.is_complete() {
            tracing::warn!(
                username_set = !credentials.username.is_empty(),
                "login skipped: username or password empty"
            );
            self.token.clear();
            self.state = AuthState::Failed(AuthFailure::MissingCredentials);
            return None;
        }

        self.state = AuthState::Requesting;
        match self.exchange(credentials).await {
            Ok(token) => {
                tracing::info!(username = %credentials.username, "login succeeded");
                self.token.set(token.clone());
                self.state = AuthState::Authenticated;
                Some(token)
            }
            Err(reason) => {
                match &reason {
                    AuthFailure::Transport(_) => {
                        tracing::error!(error = %reason, "login failed");
                    }
                    _ => tracing::warn!(error = %reason, "login failed"),
                }
                self.token.clear();
                self.state = AuthState::Failed(reason);
                None
            }
        }
    }

    async fn exchange(&self, credentials: &Credentials) -> Result<SessionToken, AuthFailure> {
        let request = ApiRequest::new(Method::Post, self.login_path.clone()).with_body(
            RequestBody::Form(vec![
                ("username".to_string(), credentials.username.clone()),
                ("password".to_string(), credentials.password.clone()),
            ]),
        );

        let response = self
            .transport
            .send(&request)
            .await
            .map_err(|e| AuthFailure::Transport(e.to_string()))?;

        if !response.is_success() {
            return Err(AuthFailure::RejectedStatus(response.status));
        }

        let body = response.parse_json().map_err(|_| AuthFailure::UnparsableBody)?;
        extract_token(&body)
    }
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field("login_path", &self.login_path)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

fn extract_token(body: &Value) -> Result<SessionToken, AuthFailure> {
    let object = body.as_object().ok_or(AuthFailure::UnparsableBody)?;
    match object.get("access_token").and_then(Value::as_str) {
        Some(token) if !token.is_empty() => Ok(SessionToken::new(token)),
        _ => Err(AuthFailure::MissingToken),
    }
}
