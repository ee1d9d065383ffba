//! Fixture domains and their declared keys
//!
//! Every domain owns a fixed set of fixture keys. Sources may only define
//! keys their domain declares; anything else is rejected at merge time so
//! that a typo in a fixture file shows up as a diagnostic instead of a
//! silently unused value.

use crate::environment::Environment;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// API domain with its own fixture source per environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    /// Natural and legal persons
    Persons,
    /// Municipal providers
    Providers,
    /// Addresses and localities
    Addresses,
    /// Public transport lines and stops
    Transport,
    /// Health centers
    Health,
    /// Tax registry
    Tax,
    /// Banks
    Banks,
}

impl Domain {
    /// All domains in resolution order
    pub const ALL: [Domain; 7] = [
        Domain::Persons,
        Domain::Providers,
        Domain::Addresses,
        Domain::Transport,
        Domain::Health,
        Domain::Tax,
        Domain::Banks,
    ];

    /// Source name used for files and diagnostics
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Persons => "persons",
            Domain::Providers => "providers",
            Domain::Addresses => "addresses",
            Domain::Transport => "transport",
            Domain::Health => "health",
            Domain::Tax => "tax",
            Domain::Banks => "banks",
        }
    }

    /// Keys this domain is allowed to define
    #[must_use]
    pub fn keys(&self) -> &'static [&'static str] {
        match self {
            Domain::Persons => &[
                "identity_tax_id",
                "authorization_level",
                "person_id",
                "person_body",
                "person_search_params",
            ],
            Domain::Providers => &[
                "identity_tax_id",
                "authorization_level",
                "provider_id",
                "provider_body",
                "provider_search_params",
                "provider_search_params_minimal",
            ],
            Domain::Addresses => &[
                "address_id",
                "address_body",
                "address_variants",
                "address_search_params",
                "locality_id",
            ],
            Domain::Transport => &[
                "transport_line_id",
                "transport_line_params",
                "transport_stop_params",
            ],
            Domain::Health => &["health_center_id", "health_center_params"],
            Domain::Tax => &["identity_tax_id", "tax_body", "tax_search_params"],
            Domain::Banks => &["bank_id", "bank_search_params"],
        }
    }

    /// Check whether this domain declares `key`
    #[inline]
    #[must_use]
    pub fn declares(&self, key: &str) -> bool {
        self.keys().contains(&key)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One fixture source: a domain as seen from one environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId {
    pub environment: Environment,
    pub domain: Domain,
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.environment.fixture_dir(), self.domain)
    }
}

/// Key/value pairs exposed by one fixture source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FixtureSet {
    entries: BTreeMap<String, Value>,
}

impl FixtureSet {
    /// Create empty set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON value; only objects qualify
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self {
                entries: map.into_iter().collect(),
            }),
            _ => None,
        }
    }

    /// Builder-style insert
    #[inline]
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.entries.insert(key.into(), value);
        self
    }

    /// Insert an entry, returning the previous value
    #[inline]
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.insert(key.into(), value)
    }

    /// Get entry by key
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Iterate entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// Number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for FixtureSet {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<(String, Value)> for FixtureSet {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
