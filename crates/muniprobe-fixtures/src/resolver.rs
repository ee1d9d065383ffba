//! Fixture resolution
//!
//! Resolution runs in three tiers, each a fallback for the total failure of
//! the previous one:
//! 1. every domain source of the requested environment
//! 2. every domain source of production
//! 3. built-in defaults
//!
//! Sources are merged in domain order with last-writer-wins semantics. Keys a
//! domain does not declare are rejected, and keys overwritten across domains
//! are recorded as collisions.

use crate::domain::{Domain, FixtureSet, SourceId};
use crate::environment::Environment;
use crate::error::FixtureError;
use crate::loader::FixtureLoader;
use crate::namespace::FixtureSnapshot;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Which tier produced the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTier {
    /// Sources of the requested environment
    Environment(Environment),
    /// Production sources, after the requested environment had none
    ProductionFallback,
    /// Built-in defaults, after neither tier had any source
    Defaults,
}

impl fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionTier::Environment(env) => write!(f, "environment:{env}"),
            ResolutionTier::ProductionFallback => f.write_str("production-fallback"),
            ResolutionTier::Defaults => f.write_str("defaults"),
        }
    }
}

/// A source that could not be used
#[derive(Debug)]
pub struct SkippedSource {
    pub source: SourceId,
    pub error: FixtureError,
}

/// Same key defined by two domains; the later one won
#[derive(Debug, Clone, PartialEq)]
pub struct Collision {
    pub key: String,
    pub previous: Domain,
    pub current: Domain,
}

/// Key defined by a source whose domain does not declare it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedKey {
    pub source: SourceId,
    pub key: String,
}

/// Outcome of resolving fixtures for one environment
#[derive(Debug)]
pub struct Resolution {
    /// Merged fixtures
    pub snapshot: FixtureSnapshot,
    /// Tier that produced the snapshot
    pub tier: ResolutionTier,
    /// Sources merged, in merge order
    pub loaded: Vec<SourceId>,
    /// Sources that failed to load, across all attempted tiers
    pub skipped: Vec<SkippedSource>,
    /// Cross-domain overwrites in the winning tier
    pub collisions: Vec<Collision>,
    /// Undeclared keys dropped in the winning tier
    pub rejected: Vec<RejectedKey>,
}

/// Minimal fixtures that keep probes from failing on startup
#[must_use]
pub fn builtin_defaults() -> BTreeMap<String, Value> {
    let mut entries = BTreeMap::new();
    entries.insert("identity_tax_id".to_string(), json!("20000000001"));
    entries.insert("authorization_level".to_string(), json!(1));
    entries
}

/// Accumulator for one tier
#[derive(Debug, Default)]
struct TierMerge {
    entries: BTreeMap<String, Value>,
    owners: BTreeMap<String, Domain>,
    loaded: Vec<SourceId>,
    collisions: Vec<Collision>,
    rejected: Vec<RejectedKey>,
}

impl TierMerge {
    /// A tier counts only if it produced at least one usable key
    fn is_resolved(&self) -> bool {
        !self.loaded.is_empty() && !self.entries.is_empty()
    }

    /// Merge one source into the accumulator
    fn merge_source(&mut self, source: SourceId, set: FixtureSet) {
        let domain = source.domain;
        for (key, value) in set {
            if !domain.declares(&key) {
                tracing::warn!(source = %source, key = %key, "rejecting undeclared fixture key");
                self.rejected.push(RejectedKey { source, key });
                continue;
            }

            if let Some(previous) = self.owners.insert(key.clone(), domain) {
                if previous != domain {
                    tracing::warn!(
                        key = %key,
                        previous = %previous,
                        current = %domain,
                        "fixture key overwritten by later domain"
                    );
                    self.collisions.push(Collision {
                        key: key.clone(),
                        previous,
                        current: domain,
                    });
                }
            }
            self.entries.insert(key, value);
        }
        self.loaded.push(source);
    }
}

/// Resolves the fixture snapshot for an environment
#[derive(Debug, Clone)]
pub struct FixtureResolver<L> {
    loader: L,
}

impl<L: FixtureLoader> FixtureResolver<L> {
    /// Create resolver over a loader
    #[inline]
    #[must_use]
    pub fn new(loader: L) -> Self {
        Self { loader }
    }

    /// Underlying loader
    #[inline]
    #[must_use]
    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Resolve fixtures for `environment`
    ///
    /// Never fails and always returns a non-empty snapshot.
    #[must_use]
    pub fn resolve(&self, environment: Environment) -> Resolution {
        let mut skipped = Vec::new();

        let merge = self.merge_tier(environment, &mut skipped);
        if merge.is_resolved() {
            return Self::finish(environment, ResolutionTier::Environment(environment), merge, skipped);
        }

        if !environment.is_production() {
            tracing::warn!(
                environment = %environment,
                "no fixture sources resolved, falling back to production"
            );
            let merge = self.merge_tier(Environment::Production, &mut skipped);
            if merge.is_resolved() {
                return Self::finish(
                    Environment::Production,
                    ResolutionTier::ProductionFallback,
                    merge,
                    skipped,
                );
            }
        }

        tracing::error!(
            environment = %environment,
            "no fixture sources resolved, using built-in defaults"
        );
        Resolution {
            snapshot: FixtureSnapshot::new(environment, builtin_defaults()),
            tier: ResolutionTier::Defaults,
            loaded: Vec::new(),
            skipped,
            collisions: Vec::new(),
            rejected: Vec::new(),
        }
    }

    /// Merge every source of one environment
    fn merge_tier(&self, environment: Environment, skipped: &mut Vec<SkippedSource>) -> TierMerge {
        let mut merge = TierMerge::default();

        for source in environment.fixture_sources() {
            match self.loader.load(source.environment, source.domain) {
                Ok(set) => {
                    tracing::debug!(source = %source, keys = set.len(), "loaded fixture source");
                    merge.merge_source(source, set);
                }
                Err(error) => {
                    if error.is_absent() {
                        tracing::debug!(source = %source, "fixture source not present");
                    } else {
                        tracing::warn!(source = %source, error = %error, "skipping fixture source");
                    }
                    skipped.push(SkippedSource { source, error });
                }
            }
        }

        merge
    }

    fn finish(
        environment: Environment,
        tier: ResolutionTier,
        merge: TierMerge,
        skipped: Vec<SkippedSource>,
    ) -> Resolution {
        tracing::info!(
            tier = %tier,
            sources = merge.loaded.len(),
            keys = merge.entries.len(),
            "fixtures resolved"
        );
        Resolution {
            snapshot: FixtureSnapshot::new(environment, merge.entries),
            tier,
            loaded: merge.loaded,
            skipped,
            collisions: merge.collisions,
            rejected: merge.rejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MemoryLoader;
    use pretty_assertions::assert_eq;

    fn set(pairs: &[(&str, Value)]) -> FixtureSet {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn later_domain_overwrites_and_records_collision() {
        let loader = MemoryLoader::new()
            .with_source(
                Environment::Staging,
                Domain::Persons,
                set(&[("identity_tax_id", json!("person")), ("person_id", json!(1))]),
            )
            .with_source(
                Environment::Staging,
                Domain::Tax,
                set(&[("identity_tax_id", json!("tax"))]),
            );

        let resolution = FixtureResolver::new(loader).resolve(Environment::Staging);

        assert_eq!(resolution.tier, ResolutionTier::Environment(Environment::Staging));
        assert_eq!(resolution.snapshot.get("identity_tax_id"), Some(&json!("tax")));
        assert_eq!(
            resolution.collisions,
            vec![Collision {
                key: "identity_tax_id".to_string(),
                previous: Domain::Persons,
                current: Domain::Tax,
            }]
        );
    }

    #[test]
    fn undeclared_keys_are_rejected() {
        let loader = MemoryLoader::new().with_source(
            Environment::Production,
            Domain::Banks,
            set(&[("bank_id", json!(3)), ("bank_nmae", json!("typo"))]),
        );

        let resolution = FixtureResolver::new(loader).resolve(Environment::Production);

        assert!(resolution.snapshot.contains("bank_id"));
        assert!(!resolution.snapshot.contains("bank_nmae"));
        assert_eq!(resolution.rejected.len(), 1);
        assert_eq!(resolution.rejected[0].key, "bank_nmae");
    }

    #[test]
    fn falls_back_to_production() {
        let loader = MemoryLoader::new()
            .with_source(
                Environment::Production,
                Domain::Providers,
                set(&[("provider_id", json!(42))]),
            )
            .with_source(
                Environment::Production,
                Domain::Banks,
                set(&[("bank_id", json!(7))]),
            );

        let resolution = FixtureResolver::new(loader).resolve(Environment::Clone);

        assert_eq!(resolution.tier, ResolutionTier::ProductionFallback);
        assert_eq!(resolution.snapshot.len(), 2);
        assert_eq!(resolution.snapshot.environment(), Environment::Production);
        assert_eq!(resolution.loaded.len(), 2);
        // Seven misses in clone, five in production
        assert_eq!(resolution.skipped.len(), 12);
    }

    #[test]
    fn defaults_when_nothing_resolves() {
        let resolution = FixtureResolver::new(MemoryLoader::new()).resolve(Environment::Development);

        assert_eq!(resolution.tier, ResolutionTier::Defaults);
        assert_eq!(resolution.snapshot.entries(), &builtin_defaults());
        assert!(!resolution.snapshot.is_empty());
    }

    #[test]
    fn production_does_not_fall_back_twice() {
        let resolution = FixtureResolver::new(MemoryLoader::new()).resolve(Environment::Production);

        assert_eq!(resolution.tier, ResolutionTier::Defaults);
        assert_eq!(resolution.skipped.len(), Domain::ALL.len());
    }

    #[test]
    fn environment_sources_win_over_production() {
        let loader = MemoryLoader::new()
            .with_source(
                Environment::Development,
                Domain::Banks,
                set(&[("bank_id", json!("dev"))]),
            )
            .with_source(
                Environment::Production,
                Domain::Banks,
                set(&[("bank_id", json!("prod"))]),
            );

        let resolution = FixtureResolver::new(loader).resolve(Environment::Development);

        assert_eq!(resolution.snapshot.get("bank_id"), Some(&json!("dev")));
        assert_eq!(resolution.snapshot.len(), 1);
    }

    #[test]
    fn tier_display() {
        assert_eq!(
            ResolutionTier::Environment(Environment::Clone).to_string(),
            "environment:clone"
        );
        assert_eq!(ResolutionTier::Defaults.to_string(), "defaults");
    }
}
