//! muniprobe fixtures
//!
//! The environment-aware resolution half of the probe engine:
//! - Detects which deployment environment a base URL points at
//! - Loads per-domain fixture sources for that environment
//! - Merges them into one immutable snapshot, falling back to production
//!   fixtures and then to built-in defaults
//! - Provides the shared namespace probes read from and publish into
//!
//! # Example
//!
//! ```rust,ignore
//! use muniprobe_fixtures::{DirectoryLoader, Environment, FixtureResolver, Namespace};
//!
//! let env = Environment::detect(Some("https://api-dev.example.gob.ar"), DEFAULT_BASE_URL);
//! let resolution = FixtureResolver::new(DirectoryLoader::new("fixtures")).resolve(env);
//! println!("resolved from {}", resolution.tier);
//!
//! let namespace = Namespace::new(resolution.snapshot);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod domain;
pub mod environment;
pub mod error;
pub mod loader;
pub mod namespace;
pub mod resolver;

pub use domain::{Domain, FixtureSet, SourceId};
pub use environment::{Environment, UnknownEnvironment, DEFAULT_BASE_URL};
pub use error::FixtureError;
pub use loader::{DirectoryLoader, FixtureLoader, MemoryLoader};
pub use namespace::{FixtureSnapshot, Namespace, ResultStore, StoreEntry, VirtualUserId};
pub use resolver::{
    builtin_defaults, Collision, FixtureResolver, RejectedKey, Resolution, ResolutionTier,
    SkippedSource,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for resolving fixtures
    pub use crate::{
        Domain, Environment, FixtureLoader, FixtureResolver, FixtureSnapshot, Namespace,
        Resolution, ResolutionTier, VirtualUserId,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
