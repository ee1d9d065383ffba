//! Deployment environment detection
//!
//! An environment is inferred from the API base URL by ordered substring
//! tests. The first matching marker wins and anything unrecognised is
//! treated as production.

use crate::domain::{Domain, SourceId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Base URL used when none is configured
pub const DEFAULT_BASE_URL: &str = "https://datos.cordoba.gob.ar";

/// Markers checked in order; first hit wins
const MARKERS: &[(Environment, &[&str])] = &[
    (Environment::Clone, &["clon"]),
    (Environment::Staging, &["staging", "-stg", ".stg", "-qa", "qa."]),
    (
        Environment::Development,
        &["-dev", "dev.", "desa", "localhost", "127.0.0.1"],
    ),
];

/// Named deployment target
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Developer environment
    Development,
    /// Pre-production staging
    Staging,
    /// Cloned copy of production data
    Clone,
    /// Live environment
    Production,
}

impl Environment {
    /// Classify a base URL
    ///
    /// Blank or absent URLs are replaced by `default_url` before matching.
    /// Total: every input yields an environment.
    #[must_use]
    pub fn detect(base_url: Option<&str>, default_url: &str) -> Self {
        let url = base_url
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(default_url)
            .to_ascii_lowercase();

        MARKERS
            .iter()
            .find(|(_, markers)| markers.iter().any(|m| url.contains(m)))
            .map_or(Environment::Production, |(env, _)| *env)
    }

    /// Canonical lowercase name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Clone => "clone",
            Environment::Production => "production",
        }
    }

    /// Suffix for environment-scoped credential variables
    #[inline]
    #[must_use]
    pub fn credential_key(&self) -> &'static str {
        match self {
            Environment::Development => "DEV",
            Environment::Staging => "STAGING",
            Environment::Clone => "CLONE",
            Environment::Production => "PROD",
        }
    }

    /// Directory holding this environment's fixture sources
    #[inline]
    #[must_use]
    pub fn fixture_dir(&self) -> &'static str {
        self.as_str()
    }

    /// Candidate fixture sources in resolution order
    #[must_use]
    pub fn fixture_sources(&self) -> Vec<SourceId> {
        Domain::ALL
            .iter()
            .map(|&domain| SourceId {
                environment: *self,
                domain,
            })
            .collect()
    }

    /// Check if this is the live environment
    #[inline]
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised environment name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown environment: '{0}'")]
pub struct UnknownEnvironment(pub String);

impl FromStr for Environment {
    type Err = UnknownEnvironment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" | "stg" => Ok(Environment::Staging),
            "clone" | "clon" => Ok(Environment::Clone),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(UnknownEnvironment(other.to_string())),
        }
    }
}
