//! Fixture resolution against on-disk sources
//!
//! Exercises the three resolution tiers through `DirectoryLoader`, the way a
//! run resolves fixtures from a checked-out fixtures tree.

use muniprobe_fixtures::prelude::*;
use muniprobe_fixtures::{builtin_defaults, DirectoryLoader};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::fs;
use std::path::Path;

fn write_source(root: &Path, env: &str, domain: &str, yaml: &str) {
    let dir = root.join(env);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(format!("{domain}.yaml")), yaml).unwrap();
}

fn production_tree(root: &Path) {
    write_source(
        root,
        "production",
        "persons",
        "identity_tax_id: \"20123456789\"\nauthorization_level: 3\n",
    );
    write_source(
        root,
        "production",
        "addresses",
        "address_variants:\n  - calle: Colon\n    altura: 100\n  - calle: Velez Sarsfield\n    altura: 250\n",
    );
    write_source(root, "production", "banks", "bank_id: 285\n");
}

#[test]
fn absent_environment_resolves_to_merged_production() {
    let tmp = tempfile::tempdir().unwrap();
    production_tree(tmp.path());

    let resolver = FixtureResolver::new(DirectoryLoader::new(tmp.path()));
    let staging = resolver.resolve(Environment::Staging);
    let production = resolver.resolve(Environment::Production);

    assert_eq!(staging.tier, ResolutionTier::ProductionFallback);
    assert_eq!(production.tier, ResolutionTier::Environment(Environment::Production));
    assert_eq!(staging.snapshot.entries(), production.snapshot.entries());
    assert_eq!(
        staging.snapshot.get("address_variants").and_then(|v| v.as_array()).map(Vec::len),
        Some(2)
    );
}

#[test]
fn resolution_is_deterministic() {
    let tmp = tempfile::tempdir().unwrap();
    production_tree(tmp.path());
    write_source(tmp.path(), "development", "tax", "identity_tax_id: \"27999999990\"\n");
    write_source(tmp.path(), "development", "persons", "identity_tax_id: \"20111111112\"\n");

    let resolver = FixtureResolver::new(DirectoryLoader::new(tmp.path()));
    let first = resolver.resolve(Environment::Development);
    let second = resolver.resolve(Environment::Development);

    assert_eq!(first.snapshot, second.snapshot);
    // Tax comes after persons, so it wins the shared key
    assert_eq!(first.snapshot.get("identity_tax_id"), Some(&json!("27999999990")));
    assert_eq!(first.collisions.len(), 1);
}

#[test]
fn unreadable_source_is_skipped_not_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    write_source(tmp.path(), "clone", "banks", "bank_id: [unterminated\n");
    write_source(tmp.path(), "clone", "health", "health_center_id: 12\n");

    let resolution = FixtureResolver::new(DirectoryLoader::new(tmp.path())).resolve(Environment::Clone);

    assert_eq!(resolution.tier, ResolutionTier::Environment(Environment::Clone));
    assert_eq!(resolution.snapshot.get("health_center_id"), Some(&json!(12)));
    assert!(resolution
        .skipped
        .iter()
        .any(|s| s.source.domain == Domain::Banks && !s.error.is_absent()));
}

#[test]
fn empty_tree_yields_defaults() {
    let tmp = tempfile::tempdir().unwrap();

    let resolution = FixtureResolver::new(DirectoryLoader::new(tmp.path())).resolve(Environment::Clone);

    assert_eq!(resolution.tier, ResolutionTier::Defaults);
    assert_eq!(resolution.snapshot.entries(), &builtin_defaults());
}

#[test]
fn namespace_over_resolved_snapshot() {
    let tmp = tempfile::tempdir().unwrap();
    production_tree(tmp.path());

    let resolution = FixtureResolver::new(DirectoryLoader::new(tmp.path())).resolve(Environment::Production);
    let namespace = Namespace::new(resolution.snapshot);

    assert_eq!(namespace.lookup("bank_id"), Some(json!(285)));
    namespace.publish("address_id", json!(5001), VirtualUserId::new());
    assert_eq!(namespace.lookup("address_id"), Some(json!(5001)));
}

#[test]
fn shipped_fixture_tree_is_clean() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures");
    let resolver = FixtureResolver::new(DirectoryLoader::new(&root));

    let production = resolver.resolve(Environment::Production);
    assert_eq!(production.tier, ResolutionTier::Environment(Environment::Production));
    assert!(production.rejected.is_empty());
    assert!(production.snapshot.contains("address_variants"));

    let development = resolver.resolve(Environment::Development);
    assert_eq!(development.tier, ResolutionTier::Environment(Environment::Development));
    assert!(development.rejected.is_empty());
    assert_eq!(development.snapshot.get("bank_id"), Some(&json!(3)));
    assert!(!development.snapshot.contains("address_variants"));
}
