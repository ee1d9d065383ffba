//! Shared probe namespace
//!
//! Split in two halves:
//! - [`FixtureSnapshot`]: immutable, produced once by the resolver
//! - [`ResultStore`]: concurrent, written by probes as they discover values
//!
//! Store writes are last-write-wins. Each entry carries a process-wide
//! version and the virtual user that wrote it, so a reader can tell whether
//! it is looking at its own write or one from a concurrent user.

use crate::environment::Environment;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use ulid::Ulid;

/// Virtual user identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VirtualUserId(pub Ulid);

impl VirtualUserId {
    /// Generate new id
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for VirtualUserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for VirtualUserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable merged fixtures
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureSnapshot {
    environment: Environment,
    entries: BTreeMap<String, Value>,
}

impl FixtureSnapshot {
    /// Create snapshot
    #[inline]
    #[must_use]
    pub fn new(environment: Environment, entries: BTreeMap<String, Value>) -> Self {
        Self {
            environment,
            entries,
        }
    }

    /// Environment whose sources produced this snapshot
    #[inline]
    #[must_use]
    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Get fixture by key
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Check if key is present
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys in order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Underlying map
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &BTreeMap<String, Value> {
        &self.entries
    }

    /// Number of fixtures
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

/// A discovered value with its provenance
#[derive(Debug, Clone, PartialEq)]
pub struct StoreEntry {
    /// Stored value
    pub value: Value,
    /// Process-wide write sequence number
    pub version: u64,
    /// Virtual user that wrote the value
    pub writer: VirtualUserId,
}

/// Concurrent store of values discovered during a run
#[derive(Debug, Default)]
pub struct ResultStore {
    entries: DashMap<String, StoreEntry>,
    next_version: AtomicU64,
}

impl ResultStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a value, replacing any previous one
    ///
    /// Returns the version assigned to this write.
    pub fn publish(&self, key: impl Into<String>, value: Value, writer: VirtualUserId) -> u64 {
        let key = key.into();
        let version = self.next_version.fetch_add(1, Ordering::AcqRel) + 1;
        let entry = StoreEntry {
            value,
            version,
            writer,
        };

        // Concurrent publishers may reach the map out of version order; keep
        // the newest version so "last write" means last assigned.
        self.entries
            .entry(key.clone())
            .and_modify(|current| {
                if current.version < version {
                    *current = entry.clone();
                }
            })
            .or_insert(entry);

        tracing::trace!(key = %key, version, writer = %writer, "published value");
        version
    }

    /// Current value for key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|e| e.value().value.clone())
    }

    /// Current entry (value plus provenance) for key
    #[must_use]
    pub fn entry(&self, key: &str) -> Option<StoreEntry> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    /// Number of discovered keys
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

    /// Highest version handed out so far
    #[inline]
    #[must_use]
    pub fn latest_version(&self) -> u64 {
        self.next_version.load(Ordering::Acquire)
    }
}

/// Fixtures plus discovered values, shared by every virtual user
#[derive(Debug, Clone)]
pub struct Namespace {
    snapshot: Arc<FixtureSnapshot>,
    store: Arc<ResultStore>,
}

impl Namespace {
    /// Create namespace over a resolved snapshot with an empty store
    #[inline]
    #[must_use]
    pub fn new(snapshot: FixtureSnapshot) -> Self {
        Self {
            snapshot: Arc::new(snapshot),
            store: Arc::new(ResultStore::new()),
        }
    }

    /// Look up a key; discovered values shadow fixtures
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<Value> {
        self.store
            .get(key)
            .or_else(|| self.snapshot.get(key).cloned())
    }

    /// Check if a key resolves
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.store.entries.contains_key(key) || self.snapshot.contains(key)
    }

    /// Publish a discovered value
    #[inline]
    pub fn publish(&self, key: impl Into<String>, value: Value, writer: VirtualUserId) -> u64 {
        self.store.publish(key, value, writer)
    }

    /// Immutable fixtures
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> &FixtureSnapshot {
        &self.snapshot
    }

    /// Discovered values
    #[inline]
    #[must_use]
    pub fn store(&self) -> &ResultStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;

    fn snapshot() -> FixtureSnapshot {
        let mut entries = BTreeMap::new();
        entries.insert("bank_id".to_string(), json!(1));
        entries.insert("address_id".to_string(), json!("fixture"));
        FixtureSnapshot::new(Environment::Production, entries)
    }

    #[test]
    fn store_versions_increase() {
        let store = ResultStore::new();
        let user = VirtualUserId::new();

        let v1 = store.publish("address_id", json!(10), user);
        let v2 = store.publish("address_id", json!(11), user);

        assert!(v2 > v1);
        let entry = store.entry("address_id").unwrap();
        assert_eq!(entry.value, json!(11));
        assert_eq!(entry.version, v2);
        assert_eq!(entry.writer, user);
        assert_eq!(store.latest_version(), v2);
    }

    #[test]
    fn store_last_write_wins_across_users() {
        let store = ResultStore::new();
        let a = VirtualUserId::new();
        let b = VirtualUserId::new();

        store.publish("provider_id", json!("a"), a);
        store.publish("provider_id", json!("b"), b);

        let entry = store.entry("provider_id").unwrap();
        assert_eq!(entry.value, json!("b"));
        assert_eq!(entry.writer, b);
    }

    #[test]
    fn store_concurrent_writers_keep_highest_version() {
        let store = Arc::new(ResultStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let user = VirtualUserId::new();
                    for n in 0..100 {
                        store.publish("counter", json!(i * 1000 + n), user);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let entry = store.entry("counter").unwrap();
        assert_eq!(entry.version, 800);
        assert_eq!(store.latest_version(), 800);
    }

    #[test]
    fn namespace_discovered_values_shadow_fixtures() {
        let ns = Namespace::new(snapshot());
        assert_eq!(ns.lookup("address_id"), Some(json!("fixture")));

        ns.publish("address_id", json!(99), VirtualUserId::new());
        assert_eq!(ns.lookup("address_id"), Some(json!(99)));
        assert_eq!(ns.snapshot().get("address_id"), Some(&json!("fixture")));
    }

    #[test]
    fn namespace_clones_share_store() {
        let ns = Namespace::new(snapshot());
        let other = ns.clone();

        other.publish("locality_id", json!(5), VirtualUserId::new());
        assert!(ns.contains("locality_id"));
        assert!(!ns.contains("person_id"));
    }
}
