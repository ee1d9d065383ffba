//! Error types for muniprobe core
//!
//! Covers the failures that can leave a component boundary:
//! - Transport failures (converted into probe outcomes by the executor)
//! - Configuration loading
//! - Logger lifecycle
//! - Run setup under a strict authentication policy
//!
//! Authentication failures live in [`crate::auth::AuthFailure`]; probe
//! failures are outcomes, not errors.

use crate::auth::AuthFailure;
use std::path::PathBuf;

/// Failures before an HTTP status exists
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Request URL could not be built
    #[error("invalid url '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    /// Request timed out
    #[error("request timed out")]
    Timeout,

    /// Connection or protocol failure
    #[error("request failed: {0}")]
    Request(String),

    /// Response body could not be read
    #[error("failed to read response body: {0}")]
    Body(String),
}

impl TransportError {
    /// Check if the failure was a timeout
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_builder() {
            Self::InvalidUrl {
                url: err.url().map(ToString::to_string).unwrap_or_default(),
                message: err.to_string(),
            }
        } else if err.is_body() || err.is_decode() {
            Self::Body(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid YAML for the schema
    #[error("invalid config {path}: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// An environment override could not be parsed
    #[error("invalid value for {variable}: '{value}'")]
    InvalidOverride { variable: String, value: String },
}

/// Logger lifecycle errors
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// Log directory or file could not be prepared
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Filter directive could not be parsed
    #[error("invalid log filter '{0}'")]
    InvalidFilter(String),
}

impl LoggingError {
    /// Create IO error for path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Run setup errors
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Login failed and the policy forbids unauthenticated runs
    #[error("authentication failed: {0}")]
    AuthenticationFailed(AuthFailure),

    /// Transport could not be constructed
    #[error("transport setup failed: {0}")]
    Transport(#[from] TransportError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_display() {
        let err = TransportError::InvalidUrl {
            url: "::".to_string(),
            message: "relative URL without a base".to_string(),
        };
        assert!(err.to_string().contains("invalid url"));
        assert!(!err.is_timeout());
        assert!(TransportError::Timeout.is_timeout());
    }

    #[test]
    fn run_error_wraps_auth_failure() {
        let err = RunError::AuthenticationFailed(AuthFailure::MissingCredentials);
        assert!(err.to_string().starts_with("authentication failed"));
    }

    #[test]
    fn config_override_display() {
        let err = ConfigError::InvalidOverride {
            variable: "API_ENVIRONMENT".to_string(),
            value: "moon".to_string(),
        };
        assert_eq!(err.to_string(), "invalid value for API_ENVIRONMENT: 'moon'");
    }
}
