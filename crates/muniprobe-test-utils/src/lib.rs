//! Testing utilities for the muniprobe workspace
//!
//! Scripted transport, namespace builders and environment maps.

#![allow(missing_docs)]

use muniprobe_core::{
    ApiRequest, ApiResponse, Method, TokenCell, Transport, TransportError, VirtualUserContext,
};
use muniprobe_fixtures::{Environment, FixtureSnapshot, Namespace};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};

#[derive(Debug, Clone)]
enum Reply {
    Respond(ApiResponse),
    Fail(String),
    Panic,
}

#[derive(Debug, Default)]
struct Route {
    queued: VecDeque<Reply>,
    repeat: Option<Reply>,
}

/// Transport answering from a per-route script and recording every request
///
/// Queued replies are used first, then the repeating reply; unscripted
/// routes answer 599 so they stand out in assertions.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<(Method, String), Route>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn route(&self, method: Method, path: &str, reply: Reply, once: bool) -> &Self {
        let mut routes = self.routes.lock();
        let route = routes.entry((method, path.to_string())).or_default();
        if once {
            route.queued.push_back(reply);
        } else {
            route.repeat = Some(reply);
        }
        self
    }

    /// Answer every request to the route with `status` and `body`
    pub fn respond(&self, method: Method, path: &str, status: u16, body: Value) -> &Self {
        self.route(method, path, Reply::Respond(ApiResponse::json(status, &body)), false)
    }

    /// Answer the next request to the route with `status` and `body`
    pub fn respond_once(&self, method: Method, path: &str, status: u16, body: Value) -> &Self {
        self.route(method, path, Reply::Respond(ApiResponse::json(status, &body)), true)
    }

    /// Answer with a raw, possibly non-JSON body
    pub fn respond_raw(&self, method: Method, path: &str, status: u16, body: &str) -> &Self {
        self.route(method, path, Reply::Respond(ApiResponse::new(status, body)), false)
    }

    /// Fail every request to the route before a status exists
    pub fn fail(&self, method: Method, path: &str, message: &str) -> &Self {
        self.route(method, path, Reply::Fail(message.to_string()), false)
    }

    /// Panic inside `send` for the route
    pub fn panic_on(&self, method: Method, path: &str) -> &Self {
        self.route(method, path, Reply::Panic, false)
    }

    /// Every request sent, in order
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().clone()
    }

    /// Requests sent to one route
    pub fn requests_to(&self, method: Method, path: &str) -> Vec<ApiRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .cloned()
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn next_reply(&self, request: &ApiRequest) -> Option<Reply> {
        let mut routes = self.routes.lock();
        let route = routes.get_mut(&(request.method, request.path.clone()))?;
        route.queued.pop_front().or_else(|| route.repeat.clone())
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        self.requests.lock().push(request.clone());
        match self.next_reply(request) {
            Some(Reply::Respond(response)) => Ok(response),
            Some(Reply::Fail(message)) => Err(TransportError::Request(message)),
            Some(Reply::Panic) => panic!("scripted panic for {} {}", request.method, request.path),
            None => Ok(ApiResponse::new(599, "")),
        }
    }
}

/// Snapshot from a JSON object
pub fn snapshot(environment: Environment, entries: Value) -> FixtureSnapshot {
    let entries: BTreeMap<String, Value> = match entries {
        Value::Object(map) => map.into_iter().collect(),
        _ => BTreeMap::new(),
    };
    FixtureSnapshot::new(environment, entries)
}

/// Development namespace from a JSON object
pub fn namespace(entries: Value) -> Namespace {
    Namespace::new(snapshot(Environment::Development, entries))
}

/// Unauthenticated virtual user over a fresh namespace
pub fn user_context(entries: Value) -> VirtualUserContext {
    VirtualUserContext::new(namespace(entries), TokenCell::new())
}

/// Environment variable map
pub fn env_vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}
