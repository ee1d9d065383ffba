//! Run configuration
//!
//! Configuration comes from an optional YAML file and is then overridden by
//! process environment variables:
//!
//! | variable | field |
//! |---|---|
//! | `API_BASE_URL` | `base_url` |
//! | `API_ENVIRONMENT` | `environment` |
//! | `API_FIXTURES_DIR` | `fixtures_dir` |
//! | `API_VIRTUAL_USERS` | `virtual_users` |
//!
//! Credentials are not part of the config; see [`crate::credentials`].

use crate::error::ConfigError;
use muniprobe_fixtures::{Environment, DEFAULT_BASE_URL};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Source of environment variables
pub trait EnvLookup {
    /// Value of `name`, if set
    fn var(&self, name: &str) -> Option<String>;
}

/// The process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvLookup for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl EnvLookup for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// What to do when login fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPolicy {
    /// Keep probing without a token (exercises anonymous-access paths)
    #[default]
    ContinueUnauthenticated,
    /// Refuse to start the run
    Abort,
}

/// Logger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for the log file
    pub dir: PathBuf,
    /// Log file name; prior files sharing its stem are cleared on setup
    pub file_name: String,
    /// Filter used when `RUST_LOG` is unset
    pub filter: String,
    /// Mirror output to stderr
    pub console: bool,
}

impl LoggingConfig {
    /// With log directory
    #[inline]
    #[must_use]
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    /// With default filter
    #[inline]
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Full path of the log file
    #[inline]
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            file_name: "muniprobe.log".to_string(),
            filter: "info".to_string(),
            console: true,
        }
    }
}

/// Configuration of one probe run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// API base URL; `default_base_url` when absent
    pub base_url: Option<String>,
    /// Fallback base URL
    pub default_base_url: String,
    /// Explicit environment, bypassing URL detection
    pub environment: Option<Environment>,
    /// Login endpoint path
    pub login_path: String,
    /// Root of the fixture tree
    pub fixtures_dir: PathBuf,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Behaviour on login failure
    pub auth_policy: AuthPolicy,
    /// Concurrent virtual users
    pub virtual_users: usize,
    /// Scenario repetitions per virtual user
    pub iterations: usize,
    /// Seed for variant selection; random when absent
    pub variant_seed: Option<u64>,
    /// Logger settings
    pub logging: LoggingConfig,
}

impl RunConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a YAML file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or does not match the schema
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Invalid {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply environment variable overrides
    ///
    /// # Errors
    /// Returns error if an override cannot be parsed
    pub fn apply_env(mut self, env: &impl EnvLookup) -> Result<Self, ConfigError> {
        if let Some(url) = env.var("API_BASE_URL").filter(|u| !u.trim().is_empty()) {
            self.base_url = Some(url);
        }
        if let Some(name) = env.var("API_ENVIRONMENT").filter(|n| !n.trim().is_empty()) {
            let parsed: Environment = name.parse().map_err(|_| ConfigError::InvalidOverride {
                variable: "API_ENVIRONMENT".to_string(),
                value: name.clone(),
            })?;
            self.environment = Some(parsed);
        }
        if let Some(dir) = env.var("API_FIXTURES_DIR") {
            self.fixtures_dir = PathBuf::from(dir);
        }
        if let Some(users) = env.var("API_VIRTUAL_USERS") {
            self.virtual_users = users.trim().parse().map_err(|_| ConfigError::InvalidOverride {
                variable: "API_VIRTUAL_USERS".to_string(),
                value: users.clone(),
            })?;
        }
        Ok(self)
    }

    /// With base URL
    #[inline]
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// With explicit environment
    #[inline]
    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// With auth policy
    #[inline]
    #[must_use]
    pub fn with_auth_policy(mut self, policy: AuthPolicy) -> Self {
        self.auth_policy = policy;
        self
    }

    /// With virtual users
    #[inline]
    #[must_use]
    pub fn with_virtual_users(mut self, users: usize) -> Self {
        self.virtual_users = users;
        self
    }

    /// With iterations
    #[inline]
    #[must_use]
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// With variant seed
    #[inline]
    #[must_use]
    pub fn with_variant_seed(mut self, seed: u64) -> Self {
        self.variant_seed = Some(seed);
        self
    }

    /// With fixtures directory
    #[inline]
    #[must_use]
    pub fn with_fixtures_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fixtures_dir = dir.into();
        self
    }

    /// Base URL in effect
    #[must_use]
    pub fn effective_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(self.default_base_url.as_str())
    }

    /// Environment in effect: explicit override, else detected from the URL
    #[must_use]
    pub fn resolve_environment(&self) -> Environment {
        self.environment.unwrap_or_else(|| {
            Environment::detect(self.base_url.as_deref(), &self.default_base_url)
        })
    }

    /// Request timeout
    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            default_base_url: DEFAULT_BASE_URL.to_string(),
            environment: None,
            login_path: "/auth/token".to_string(),
            fixtures_dir: PathBuf::from("fixtures"),
            request_timeout_secs: 30,
            auth_policy: AuthPolicy::default(),
            virtual_users: 10,
            iterations: 1,
            variant_seed: None,
            logging: LoggingConfig::default(),
        }
    }
}
