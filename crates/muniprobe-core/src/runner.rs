//! Sessions and virtual-user runs
//!
//! [`Session::establish`] performs the once-per-run setup: environment
//! detection, credential and fixture resolution, and login. [`LoadRunner`]
//! then drives a [`Scenario`] with one tokio task per virtual user, all
//! sharing the session's namespace, token and executor.

use crate::auth::{AuthState, Authenticator, TokenCell};
use crate::config::{AuthPolicy, EnvLookup, RunConfig};
use crate::credentials::{resolve_credentials, Credentials};
use crate::descriptor::ProbeDescriptor;
use crate::error::RunError;
use crate::executor::{ProbeExecutor, ProbeReport, VirtualUserContext};
use crate::outcome::ProbeOutcome;
use crate::transport::{ReqwestTransport, Transport};
use dashmap::DashMap;
use muniprobe_fixtures::{
    DirectoryLoader, Environment, FixtureLoader, FixtureResolver, Namespace, ResolutionTier,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Ordered probes one virtual user runs per iteration
#[derive(Debug, Clone, Default)]
pub struct Scenario {
    pub name: String,
    pub probes: Vec<ProbeDescriptor>,
}

impl Scenario {
    /// Create empty scenario
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            probes: Vec::new(),
        }
    }

    /// Append a probe
    #[must_use]
    pub fn with_probe(mut self, probe: ProbeDescriptor) -> Self {
        self.probes.push(probe);
        self
    }

    /// Number of probes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.probes.len()
    }

    /// Check if empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }
}

/// Everything resolved once per run
pub struct Session {
    pub environment: Environment,
    pub tier: ResolutionTier,
    pub namespace: Namespace,
    pub credentials: Credentials,
    pub auth_state: AuthState,
    pub token: TokenCell,
    pub transport: Arc<dyn Transport>,
}

impl Session {
    /// Establish a session against the configured base URL
    ///
    /// Fixtures are read from `config.fixtures_dir`.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built, or if login fails
    /// under [`AuthPolicy::Abort`]
    pub async fn establish(config: &RunConfig, env: &(impl EnvLookup + Sync)) -> Result<Self, RunError> {
        let transport = ReqwestTransport::new(config.effective_base_url(), config.request_timeout())?;
        let loader = DirectoryLoader::new(&config.fixtures_dir);
        Self::establish_with(config, env, Arc::new(transport), &loader).await
    }

    /// Establish a session over an explicit transport and fixture loader
    ///
    /// # Errors
    /// Returns error if login fails under [`AuthPolicy::Abort`]
    pub async fn establish_with<L: FixtureLoader>(
        config: &RunConfig,
        env: &(impl EnvLookup + Sync),
        transport: Arc<dyn Transport>,
        loader: L,
    ) -> Result<Self, RunError> {
        let environment = config.resolve_environment();
        tracing::info!(
            environment = %environment,
            base_url = %config.effective_base_url(),
            "establishing session"
        );

        let credentials = resolve_credentials(environment, env);
        let resolution = FixtureResolver::new(loader).resolve(environment);
        let tier = resolution.tier;
        let namespace = Namespace::new(resolution.snapshot);

        let mut authenticator = Authenticator::new(Arc::clone(&transport), config.login_path.clone());
        authenticator.login(&credentials).await;
        let auth_state = authenticator.state().clone();

        if let Some(reason) = auth_state.failure() {
            match config.auth_policy {
                AuthPolicy::Abort => return Err(RunError::AuthenticationFailed(reason.clone())),
                AuthPolicy::ContinueUnauthenticated => tracing::warn!(
                    reason = %reason,
                    "continuing without a session token"
                ),
            }
        }

        Ok(Self {
            environment,
            tier,
            namespace,
            credentials,
            auth_state,
            token: authenticator.token_cell().clone(),
            transport,
        })
    }

    /// Executor over this session's transport
    #[must_use]
    pub fn executor(&self, seed: Option<u64>) -> ProbeExecutor {
        let transport = Arc::clone(&self.transport);
        match seed {
            Some(seed) => ProbeExecutor::with_seed(transport, seed),
            None => ProbeExecutor::new(transport),
        }
    }

    /// Runner sharing this session's namespace and token
    #[must_use]
    pub fn runner(&self, seed: Option<u64>) -> LoadRunner {
        LoadRunner::new(
            Arc::new(self.executor(seed)),
            self.namespace.clone(),
            self.token.clone(),
        )
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("environment", &self.environment)
            .field("tier", &self.tier)
            .field("credentials", &self.credentials)
            .field("auth_state", &self.auth_state)
            .finish_non_exhaustive()
    }
}

/// Counters for one probe
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeCounters {
    pub passed: u64,
    pub failed: u64,
    /// Count per outcome label
    pub outcomes: BTreeMap<&'static str, u64>,
}

impl ProbeCounters {
    /// Total executions
    #[inline]
    #[must_use]
    pub fn total(&self) -> u64 {
        self.passed + self.failed
    }

    /// Count for one outcome label
    #[must_use]
    pub fn outcome(&self, label: &str) -> u64 {
        self.outcomes.get(label).copied().unwrap_or(0)
    }
}

/// Concurrent per-probe statistics
#[derive(Debug, Default)]
pub struct ProbeStats {
    probes: DashMap<String, ProbeCounters>,
}

impl ProbeStats {
    /// Create empty stats
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a report
    pub fn record(&self, report: &ProbeReport) {
        self.record_outcome(&report.probe, &report.outcome);
    }

    /// Record an outcome for `probe`
    pub fn record_outcome(&self, probe: &str, outcome: &ProbeOutcome) {
        let mut counters = self.probes.entry(probe.to_string()).or_default();
        if outcome.is_pass() {
            counters.passed += 1;
        } else {
            counters.failed += 1;
        }
        *counters.outcomes.entry(outcome.label()).or_insert(0) += 1;
    }

    /// Counters for one probe
    #[must_use]
    pub fn get(&self, probe: &str) -> Option<ProbeCounters> {
        self.probes.get(probe).map(|c| c.value().clone())
    }

    /// Copy of all counters, sorted by probe name
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, ProbeCounters> {
        self.probes
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }
}

/// Aggregated result of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub scenario: String,
    pub users: usize,
    pub iterations: usize,
    pub probes: BTreeMap<String, ProbeCounters>,
    /// User tasks that panicked
    pub panicked_users: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Total passes across probes
    #[must_use]
    pub fn passed(&self) -> u64 {
        self.probes.values().map(|c| c.passed).sum()
    }

    /// Total failures across probes
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.probes.values().map(|c| c.failed).sum()
    }

    /// Check if every execution passed
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failed() == 0
    }
}

/// Drives a scenario with concurrent virtual users
#[derive(Debug, Clone)]
pub struct LoadRunner {
    executor: Arc<ProbeExecutor>,
    namespace: Namespace,
    token: TokenCell,
}

impl LoadRunner {
    /// Create runner
    #[must_use]
    pub fn new(executor: Arc<ProbeExecutor>, namespace: Namespace, token: TokenCell) -> Self {
        Self {
            executor,
            namespace,
            token,
        }
    }

    /// Run `scenario` for `users` virtual users, `iterations` times each
    pub async fn run(&self, scenario: &Scenario, users: usize, iterations: usize) -> RunSummary {
        let started = Instant::now();
        let scenario = Arc::new(scenario.clone());
        let stats = Arc::new(ProbeStats::new());

        tracing::info!(
            scenario = %scenario.name,
            users,
            iterations,
            probes = scenario.len(),
            "starting run"
        );

        let mut tasks = Vec::with_capacity(users);
        for _ in 0..users {
            let ctx = VirtualUserContext::new(self.namespace.clone(), self.token.clone());
            let current = Arc::new(AtomicUsize::new(0));
            let handle = tokio::spawn(user_task(
                ctx,
                Arc::clone(&self.executor),
                Arc::clone(&scenario),
                Arc::clone(&stats),
                Arc::clone(&current),
                iterations,
            ));
            tasks.push((handle, current));
        }

        let (handles, cursors): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
        let results = futures::future::join_all(handles).await;

        let mut panicked_users = 0;
        for (result, current) in results.into_iter().zip(cursors) {
            if let Err(e) = result {
                panicked_users += 1;
                let index = current.load(Ordering::SeqCst);
                if let Some(probe) = scenario.probes.get(index) {
                    tracing::error!(probe = %probe.name, error = %e, "virtual user task aborted");
                    stats.record_outcome(&probe.name, &ProbeOutcome::TransportException);
                }
            }
        }

        let summary = RunSummary {
            scenario: scenario.name.clone(),
            users,
            iterations,
            probes: stats.snapshot(),
            panicked_users,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            scenario = %summary.scenario,
            passed = summary.passed(),
            failed = summary.failed(),
            panicked_users,
            elapsed_ms = u64::try_from(summary.elapsed.as_millis()).unwrap_or(u64::MAX),
            "run finished"
        );
        summary
    }
}

async fn user_task(
    ctx: VirtualUserContext,
    executor: Arc<ProbeExecutor>,
    scenario: Arc<Scenario>,
    stats: Arc<ProbeStats>,
    current: Arc<AtomicUsize>,
    iterations: usize,
) {
    tracing::debug!(user = %ctx.id, "virtual user started");
    for _ in 0..iterations {
        for (index, probe) in scenario.probes.iter().enumerate() {
            current.store(index, Ordering::SeqCst);
            let report = executor.execute(probe, &ctx).await;
            stats.record(&report);
        }
    }
    tracing::debug!(user = %ctx.id, "virtual user finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Method;

    #[test]
    fn stats_aggregate() {
        let stats = ProbeStats::new();
        stats.record_outcome("bank", &ProbeOutcome::Success);
        stats.record_outcome("bank", &ProbeOutcome::ExpectedAbsence);
        stats.record_outcome("bank", &ProbeOutcome::ServerError);

        let bank = stats.get("bank").unwrap();
        assert_eq!(bank.passed, 2);
        assert_eq!(bank.failed, 1);
        assert_eq!(bank.total(), 3);
        assert_eq!(bank.outcome("server-error"), 1);
        assert_eq!(bank.outcome("validation-error"), 0);
        assert!(stats.get("other").is_none());
    }

    #[test]
    fn summary_totals() {
        let stats = ProbeStats::new();
        stats.record_outcome("a", &ProbeOutcome::Success);
        stats.record_outcome("b", &ProbeOutcome::PermissionError);

        let summary = RunSummary {
            scenario: "s".into(),
            users: 1,
            iterations: 1,
            probes: stats.snapshot(),
            panicked_users: 0,
            elapsed: Duration::ZERO,
        };
        assert_eq!(summary.passed(), 1);
        assert_eq!(summary.failed(), 1);
        assert!(!summary.all_passed());
    }

    #[test]
    fn scenario_builder() {
        let scenario = Scenario::new("smoke")
            .with_probe(ProbeDescriptor::new("a", Method::Get, "/a"))
            .with_probe(ProbeDescriptor::new("b", Method::Get, "/b"));
        assert_eq!(scenario.len(), 2);
        assert!(!scenario.is_empty());
    }
}
