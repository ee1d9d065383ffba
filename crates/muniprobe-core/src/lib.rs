//! muniprobe core
//!
//! The execution half of the probe engine:
//! - Resolves credentials and authenticates once per session
//! - Executes declarative probes against the API, classifying every
//!   response into a probe outcome
//! - Propagates discovered values between probes through the shared
//!   namespace
//! - Runs scenarios with concurrent virtual users
//! - Owns the process-wide logger lifecycle
//!
//! # Example
//!
//! ```rust,ignore
//! use muniprobe_core::{catalog, logging, ProcessEnv, RunConfig, Session};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RunConfig::new().apply_env(&ProcessEnv)?;
//! logging::setup(&config.logging)?;
//!
//! let session = Session::establish(&config, &ProcessEnv).await?;
//! let summary = session
//!     .runner(config.variant_seed)
//!     .run(&catalog::default_scenario(), config.virtual_users, config.iterations)
//!     .await;
//!
//! println!("{} passed, {} failed", summary.passed(), summary.failed());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod auth;
pub mod catalog;
pub mod config;
pub mod credentials;
pub mod descriptor;
pub mod error;
pub mod executor;
pub mod logging;
pub mod outcome;
pub mod runner;
pub mod transport;

pub use auth::{AuthFailure, AuthState, Authenticator, SessionToken, TokenCell};
pub use config::{AuthPolicy, EnvLookup, LoggingConfig, ProcessEnv, RunConfig};
pub use credentials::{resolve_credentials, CredentialScope, Credentials};
pub use descriptor::{Extraction, ParamBinding, ProbeDescriptor, RequestShape, ValueSource};
pub use error::{ConfigError, LoggingError, RunError, TransportError};
pub use executor::{ProbeExecutor, ProbeReport, VirtualUserContext};
pub use logging::LogHandle;
pub use outcome::{
    check_shape, classify, error_types, AllowList, ProbeOutcome, ShapeVerdict,
    DEFAULT_ALLOWED_ERRORS,
};
pub use runner::{LoadRunner, ProbeCounters, ProbeStats, RunSummary, Scenario, Session};
pub use transport::{ApiRequest, ApiResponse, Method, RequestBody, ReqwestTransport, Transport};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with muniprobe core
    pub use crate::{
        AuthPolicy, Authenticator, Credentials, LoadRunner, Method, ProbeDescriptor,
        ProbeExecutor, ProbeOutcome, ProbeReport, RequestShape, RunConfig, Scenario, Session,
        Transport, ValueSource, VirtualUserContext,
    };
    pub use muniprobe_fixtures::prelude::*;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
