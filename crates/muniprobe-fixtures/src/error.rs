//! Error types for fixture loading
//!
//! Loading errors never abort resolution; the resolver records them as
//! skipped sources and moves on to the next tier.

use crate::domain::Domain;
use crate::environment::Environment;
use std::path::PathBuf;

/// Errors produced while loading a single fixture source
#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    /// No source exists for this environment/domain pair
    #[error("no fixture source for {domain} in {environment}")]
    NotFound {
        environment: Environment,
        domain: Domain,
    },

    /// Source exists but could not be read
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Source could not be parsed
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// Source parsed but its top level is not a key/value mapping
    #[error("fixture source {path} is not a mapping")]
    NotAMapping { path: PathBuf },
}

impl FixtureError {
    /// Create not-found error
    #[inline]
    #[must_use]
    pub fn not_found(environment: Environment, domain: Domain) -> Self {
        Self::NotFound {
            environment,
            domain,
        }
    }

    /// Create parse error for path
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Missing sources are routine; everything else deserves attention
    #[inline]
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = FixtureError::not_found(Environment::Staging, Domain::Tax);
        assert_eq!(err.to_string(), "no fixture source for tax in staging");
        assert!(err.is_absent());
    }

    #[test]
    fn parse_is_not_absent() {
        let err = FixtureError::parse("fixtures/production/tax.yaml", "bad indent");
        assert!(!err.is_absent());
        assert!(err.to_string().contains("bad indent"));
    }
}
