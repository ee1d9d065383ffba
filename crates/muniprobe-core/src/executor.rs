//! Probe executor
//!
//! Runs one [`ProbeDescriptor`] for one virtual user:
//! 1. Builds the request from the user's namespace, failing fast with
//!    `MissingFixture` when a required key is absent
//! 2. Sends it with the session's bearer token
//! 3. Classifies the response and checks its shape
//! 4. Publishes extracted values for later probes
//! 5. Retries once with the fallback shape if the primary attempt failed
//!
//! Nothing escapes as an error: every path ends in a [`ProbeReport`], a
//! panic inside an attempt included.

use crate::auth::TokenCell;
use crate::descriptor::{ProbeDescriptor, RequestShape, ValueSource};
use crate::outcome::{check_shape, classify, ProbeOutcome, ShapeVerdict};
use crate::transport::{ApiRequest, RequestBody, Transport};
use futures::FutureExt;
use muniprobe_fixtures::{Namespace, VirtualUserId};
use parking_lot::Mutex;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Everything but RFC 3986 unreserved characters is escaped in path values
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Per-user execution context
#[derive(Debug, Clone)]
pub struct VirtualUserContext {
    pub id: VirtualUserId,
    pub namespace: Namespace,
    pub token: TokenCell,
}

impl VirtualUserContext {
    /// Create context with a fresh user id
    #[must_use]
    pub fn new(namespace: Namespace, token: TokenCell) -> Self {
        Self {
            id: VirtualUserId::new(),
            namespace,
            token,
        }
    }
}

/// Result of executing one probe
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub probe: String,
    pub outcome: ProbeOutcome,
    /// Status of the final attempt, if one was obtained
    pub status: Option<u16>,
    /// Requests attempted, including ones refused for missing fixtures
    pub attempts: u8,
    pub used_fallback: bool,
    pub shape: ShapeVerdict,
    /// Result-store keys published by this probe
    pub extracted: Vec<String>,
    /// Transport error, missing fields or other diagnostic
    pub detail: Option<String>,
    pub elapsed: Duration,
}

impl ProbeReport {
    /// Check if the probe passed
    #[inline]
    #[must_use]
    pub fn is_pass(&self) -> bool {
        self.outcome.is_pass()
    }

    fn log(&self, user: VirtualUserId) {
        let status = self.status.map_or_else(|| "-".to_string(), |s| s.to_string());
        let detail = self.detail.as_deref().unwrap_or("");
        let elapsed_ms = u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX);

        if self.is_pass() {
            if let ShapeVerdict::Degraded(missing) = &self.shape {
                tracing::warn!(
                    probe = %self.probe,
                    user = %user,
                    missing = ?missing,
                    "response shape degraded"
                );
            }
            tracing::info!(
                probe = %self.probe,
                user = %user,
                outcome = %self.outcome,
                status = %status,
                attempts = self.attempts,
                elapsed_ms,
                "probe passed"
            );
        } else if self.outcome.is_severe() {
            tracing::error!(
                probe = %self.probe,
                user = %user,
                outcome = %self.outcome,
                status = %status,
                attempts = self.attempts,
                detail,
                "probe failed"
            );
        } else {
            tracing::warn!(
                probe = %self.probe,
                user = %user,
                outcome = %self.outcome,
                status = %status,
                attempts = self.attempts,
                detail,
                "probe failed"
            );
        }
    }
}

struct Attempt {
    outcome: ProbeOutcome,
    status: Option<u16>,
    shape: ShapeVerdict,
    extracted: Vec<String>,
    detail: Option<String>,
}

impl Attempt {
    fn failed(outcome: ProbeOutcome, status: Option<u16>, detail: Option<String>) -> Self {
        Self {
            outcome,
            status,
            shape: ShapeVerdict::Unchecked,
            extracted: Vec::new(),
            detail,
        }
    }

    fn missing(key: String) -> Self {
        let detail = Some(format!("namespace key '{key}' not resolved"));
        Self::failed(ProbeOutcome::MissingFixture { key }, None, detail)
    }
}

/// Executes probe descriptors over a shared transport
pub struct ProbeExecutor {
    transport: Arc<dyn Transport>,
    rng: Mutex<StdRng>,
}

impl ProbeExecutor {
    /// Create executor with an OS-seeded variant RNG
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Create executor with a reproducible variant sequence
    pub fn with_seed(transport: Arc<dyn Transport>, seed: u64) -> Self {
        Self {
            transport,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Execute `probe` for the user in `ctx`
    pub async fn execute(&self, probe: &ProbeDescriptor, ctx: &VirtualUserContext) -> ProbeReport {
        let started = Instant::now();
        let (attempt, attempts, used_fallback) =
            match AssertUnwindSafe(self.run_shapes(probe, ctx)).catch_unwind().await {
                Ok(finished) => finished,
                Err(payload) => {
                    let detail = format!("panicked: {}", panic_message(payload.as_ref()));
                    (
                        Attempt::failed(ProbeOutcome::TransportException, None, Some(detail)),
                        1,
                        false,
                    )
                }
            };

        let report = ProbeReport {
            probe: probe.name.clone(),
            outcome: attempt.outcome,
            status: attempt.status,
            attempts,
            used_fallback,
            shape: attempt.shape,
            extracted: attempt.extracted,
            detail: attempt.detail,
            elapsed: started.elapsed(),
        };
        report.log(ctx.id);
        report
    }

    /// Primary shape, then the fallback once if the primary did not pass
    async fn run_shapes(&self, probe: &ProbeDescriptor, ctx: &VirtualUserContext) -> (Attempt, u8, bool) {
        let attempt = self.attempt(probe, &probe.primary, ctx).await;
        if attempt.outcome.is_pass() {
            return (attempt, 1, false);
        }

        match &probe.fallback {
            Some(fallback) => {
                tracing::debug!(
                    probe = %probe.name,
                    user = %ctx.id,
                    primary = %attempt.outcome,
                    "primary attempt failed, trying fallback shape"
                );
                (self.attempt(probe, fallback, ctx).await, 2, true)
            }
            None => (attempt, 1, false),
        }
    }

    async fn attempt(
        &self,
        probe: &ProbeDescriptor,
        shape: &RequestShape,
        ctx: &VirtualUserContext,
    ) -> Attempt {
        let request = match self.build_request(probe, shape, &ctx.namespace) {
            Ok(request) => request.with_bearer(ctx.token.bearer()),
            Err(key) => return Attempt::missing(key),
        };

        let response = match self.transport.send(&request).await {
            Ok(response) => response,
            Err(e) => {
                return Attempt::failed(ProbeOutcome::TransportException, None, Some(e.to_string()))
            }
        };

        let status = response.status;
        let body = response.parse_json();
        let outcome = classify(
            status,
            body.as_ref().ok(),
            &probe.allowed_errors,
            probe.absence_expected,
        );

        if outcome != ProbeOutcome::Success {
            return Attempt::failed(outcome, Some(status), None);
        }

        let body = match body {
            Ok(body) => body,
            Err(e) => {
                return Attempt::failed(
                    ProbeOutcome::TransportException,
                    Some(status),
                    Some(format!("undecodable body: {e}")),
                )
            }
        };

        let verdict = check_shape(&body, &probe.expected_fields, probe.tolerance);
        if let ShapeVerdict::Mismatch(missing) = &verdict {
            let detail = Some(format!("missing fields: {}", missing.join(", ")));
            return Attempt {
                outcome: ProbeOutcome::ValidationError,
                status: Some(status),
                shape: verdict,
                extracted: Vec::new(),
                detail,
            };
        }

        Attempt {
            outcome: ProbeOutcome::Success,
            status: Some(status),
            shape: verdict,
            extracted: publish_extractions(probe, &body, ctx),
            detail: None,
        }
    }

    /// Build the request for `shape`; `Err` carries the first missing key
    fn build_request(
        &self,
        probe: &ProbeDescriptor,
        shape: &RequestShape,
        namespace: &Namespace,
    ) -> Result<ApiRequest, String> {
        let mut path = probe.path.clone();
        for key in probe.path_keys() {
            let value = namespace.lookup(key).ok_or_else(|| key.to_string())?;
            if value.is_null() {
                return Err(key.to_string());
            }
            let segment = utf8_percent_encode(&render(&value), PATH_SEGMENT).to_string();
            path = path.replace(&format!("{{{key}}}"), &segment);
        }

        let mut query = Vec::new();
        if let Some(map_key) = &shape.param_map {
            let object = namespace
                .lookup(map_key)
                .and_then(|v| v.as_object().cloned())
                .ok_or_else(|| map_key.clone())?;
            for (name, value) in object {
                push_param(&mut query, &name, &value);
            }
        }
        for binding in &shape.params {
            match namespace.lookup(&binding.key) {
                Some(value) if !value.is_null() => push_param(&mut query, &binding.name, &value),
                _ if binding.required => return Err(binding.key.clone()),
                _ => {}
            }
        }

        let body = match &shape.body {
            None => RequestBody::Empty,
            Some(source) => RequestBody::Json(self.resolve_source(source, namespace)?),
        };

        Ok(ApiRequest::new(probe.method, path)
            .with_query(query)
            .with_body(body))
    }

    fn resolve_source(&self, source: &ValueSource, namespace: &Namespace) -> Result<Value, String> {
        match source {
            ValueSource::Literal(value) => Ok(value.clone()),
            ValueSource::Fixed(key) => namespace
                .lookup(key)
                .filter(|v| !v.is_null())
                .ok_or_else(|| key.clone()),
            ValueSource::Variants(key) => {
                let variants = namespace
                    .lookup(key)
                    .and_then(|v| match v {
                        Value::Array(items) if !items.is_empty() => Some(items),
                        _ => None,
                    })
                    .ok_or_else(|| key.clone())?;
                let index = self.rng.lock().random_range(0..variants.len());
                Ok(variants[index].clone())
            }
        }
    }
}

impl std::fmt::Debug for ProbeExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeExecutor").finish_non_exhaustive()
    }
}

fn publish_extractions(probe: &ProbeDescriptor, body: &Value, ctx: &VirtualUserContext) -> Vec<String> {
    let mut published = Vec::new();
    for rule in &probe.extractions {
        match body.pointer(&rule.pointer) {
            Some(value) if !value.is_null() => {
                let version = ctx.namespace.publish(rule.key.clone(), value.clone(), ctx.id);
                tracing::debug!(
                    probe = %probe.name,
                    key = %rule.key,
                    version,
                    "published extracted value"
                );
                published.push(rule.key.clone());
            }
            _ => tracing::warn!(
                probe = %probe.name,
                pointer = %rule.pointer,
                "extraction pointer matched nothing"
            ),
        }
    }
    published
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    let literal: Option<&str> = payload.downcast_ref::<&str>().copied();
    literal
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Scalar rendering for paths and query strings
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn push_param(query: &mut Vec<(String, String)>, name: &str, value: &Value) {
    match value {
        Value::Null => {}
        Value::Array(items) => {
            for item in items.iter().filter(|v| !v.is_null()) {
                query.push((name.to_string(), render(item)));
            }
        }
        other => query.push((name.to_string(), render(other))),
    }
}
