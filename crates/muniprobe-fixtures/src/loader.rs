//! Fixture source loaders
//!
//! The resolver treats every source as an opaque key/value provider. Two
//! loaders ship: one reading YAML/JSON files laid out as
//! `<root>/<environment>/<domain>.<ext>`, and an in-memory one for tests and
//! embedding.

use crate::domain::{Domain, FixtureSet};
use crate::environment::Environment;
use crate::error::FixtureError;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Provider of fixture sources
pub trait FixtureLoader: Send + Sync {
    /// Load the source for one domain in one environment
    ///
    /// # Errors
    /// - `FixtureError::NotFound` if the source does not exist
    /// - any other variant if it exists but is unusable
    fn load(&self, environment: Environment, domain: Domain) -> Result<FixtureSet, FixtureError>;
}

impl<L: FixtureLoader + ?Sized> FixtureLoader for &L {
    fn load(&self, environment: Environment, domain: Domain) -> Result<FixtureSet, FixtureError> {
        (**self).load(environment, domain)
    }
}

/// File extensions probed in order
const EXTENSIONS: [&str; 3] = ["yaml", "yml", "json"];

/// Loads fixture files from a directory tree
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
}

impl DirectoryLoader {
    /// Create loader rooted at `root`
    #[inline]
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// First existing file for the source, if any
    fn locate(&self, environment: Environment, domain: Domain) -> Option<PathBuf> {
        let dir = self.root.join(environment.fixture_dir());
        EXTENSIONS
            .iter()
            .map(|ext| dir.join(format!("{}.{ext}", domain.as_str())))
            .find(|path| path.is_file())
    }
}

impl FixtureLoader for DirectoryLoader {
    fn load(&self, environment: Environment, domain: Domain) -> Result<FixtureSet, FixtureError> {
        let path = self
            .locate(environment, domain)
            .ok_or_else(|| FixtureError::not_found(environment, domain))?;

        let raw = std::fs::read_to_string(&path).map_err(|source| FixtureError::Io {
            path: path.clone(),
            source,
        })?;

        let value: Value = if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&raw).map_err(|e| FixtureError::parse(&path, e.to_string()))?
        } else {
            serde_yaml::from_str(&raw).map_err(|e| FixtureError::parse(&path, e.to_string()))?
        };

        FixtureSet::from_value(value).ok_or(FixtureError::NotAMapping { path })
    }
}

/// In-memory loader
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    sources: HashMap<(Environment, Domain), FixtureSet>,
}

impl MemoryLoader {
    /// Create empty loader
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source
    #[must_use]
    pub fn with_source(mut self, environment: Environment, domain: Domain, set: FixtureSet) -> Self {
        self.sources.insert((environment, domain), set);
        self
    }

    /// Number of registered sources
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl FixtureLoader for MemoryLoader {
    fn load(&self, environment: Environment, domain: Domain) -> Result<FixtureSet, FixtureError> {
        self.sources
            .get(&(environment, domain))
            .cloned()
            .ok_or_else(|| FixtureError::not_found(environment, domain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn write(root: &Path, env: &str, file: &str, body: &str) {
        let dir = root.join(env);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file), body).unwrap();
    }

    #[test]
    fn directory_loader_reads_yaml() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "staging", "banks.yaml", "bank_id: 11\n");

        let loader = DirectoryLoader::new(tmp.path());
        let set = loader.load(Environment::Staging, Domain::Banks).unwrap();
        assert_eq!(set.get("bank_id"), Some(&json!(11)));
    }

    #[test]
    fn directory_loader_prefers_yaml_over_json() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "production", "tax.yaml", "identity_tax_id: from-yaml\n");
        write(tmp.path(), "production", "tax.json", r#"{"identity_tax_id": "from-json"}"#);

        let set = DirectoryLoader::new(tmp.path())
            .load(Environment::Production, Domain::Tax)
            .unwrap();
        assert_eq!(set.get("identity_tax_id"), Some(&json!("from-yaml")));
    }

    #[test]
    fn directory_loader_reads_json() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "clone", "health.json", r#"{"health_center_id": 3}"#);

        let set = DirectoryLoader::new(tmp.path())
            .load(Environment::Clone, Domain::Health)
            .unwrap();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn directory_loader_missing_source() {
        let tmp = tempfile::tempdir().unwrap();
        let err = DirectoryLoader::new(tmp.path())
            .load(Environment::Development, Domain::Persons)
            .unwrap_err();
        assert!(err.is_absent());
    }

    #[test]
    fn directory_loader_rejects_non_mapping() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "development", "transport.yaml", "- 1\n- 2\n");

        let err = DirectoryLoader::new(tmp.path())
            .load(Environment::Development, Domain::Transport)
            .unwrap_err();
        assert!(matches!(err, FixtureError::NotAMapping { .. }));
    }

    #[test]
    fn directory_loader_reports_parse_errors() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "development", "banks.json", "{not json");

        let err = DirectoryLoader::new(tmp.path())
            .load(Environment::Development, Domain::Banks)
            .unwrap_err();
        assert!(matches!(err, FixtureError::Parse { .. }));
    }

    #[test]
    fn memory_loader_roundtrip() {
        let loader = MemoryLoader::new().with_source(
            Environment::Production,
            Domain::Banks,
            FixtureSet::new().with("bank_id", json!(1)),
        );
        assert!(loader.load(Environment::Production, Domain::Banks).is_ok());
        assert!(loader.load(Environment::Staging, Domain::Banks).unwrap_err().is_absent());
    }
}
