//! Declarative probe descriptions
//!
//! A [`ProbeDescriptor`] names an endpoint, where its parameters come from in
//! the namespace, what a good response looks like, and which values to
//! publish back for later probes.

use crate::outcome::AllowList;
use crate::transport::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where a request value comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    /// The namespace value under this key
    Fixed(String),
    /// A uniformly chosen element of the array stored under this key
    Variants(String),
    /// A constant
    Literal(Value),
}

impl ValueSource {
    /// Namespace key read by this source
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Fixed(key) | Self::Variants(key) => Some(key),
            Self::Literal(_) => None,
        }
    }
}

/// One query parameter bound to a namespace key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamBinding {
    /// Query parameter name
    pub name: String,
    /// Namespace key supplying the value
    pub key: String,
    /// Absent value fails the probe instead of omitting the parameter
    pub required: bool,
}

impl ParamBinding {
    /// Required parameter
    #[must_use]
    pub fn required(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            required: true,
        }
    }

    /// Optional parameter
    #[must_use]
    pub fn optional(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            required: false,
        }
    }
}

/// Query parameters plus optional body for one attempt
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RequestShape {
    pub params: Vec<ParamBinding>,
    pub body: Option<ValueSource>,
    /// Namespace key whose object value is expanded into query parameters
    pub param_map: Option<String>,
}

impl RequestShape {
    /// Shape with no parameters and no body
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter binding
    #[must_use]
    pub fn param(mut self, binding: ParamBinding) -> Self {
        self.params.push(binding);
        self
    }

    /// Expand an object fixture into query parameters
    #[must_use]
    pub fn params_from(mut self, key: impl Into<String>) -> Self {
        self.param_map = Some(key.into());
        self
    }

    /// Set the body source
    #[must_use]
    pub fn body(mut self, source: ValueSource) -> Self {
        self.body = Some(source);
        self
    }
}

/// Copy a value out of a successful response into the result store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    /// JSON pointer into the response body, e.g. `/id`
    pub pointer: String,
    /// Result-store key to publish under
    pub key: String,
}

impl Extraction {
    /// Create an extraction rule
    #[must_use]
    pub fn new(pointer: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            pointer: pointer.into(),
            key: key.into(),
        }
    }
}

/// Everything needed to run and judge one probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeDescriptor {
    pub name: String,
    pub method: Method,
    /// Path with `{key}` placeholders filled from the namespace
    pub path: String,
    pub primary: RequestShape,
    /// Attempted once if the primary attempt does not pass
    pub fallback: Option<RequestShape>,
    pub expected_fields: Vec<String>,
    /// Missing fields tolerated before a shape mismatch
    pub tolerance: usize,
    pub allowed_errors: AllowList,
    /// Treat 404 as a valid answer
    pub absence_expected: bool,
    pub extractions: Vec<Extraction>,
}

impl ProbeDescriptor {
    /// Create descriptor with an empty primary shape
    #[must_use]
    pub fn new(name: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method,
            path: path.into(),
            primary: RequestShape::new(),
            fallback: None,
            expected_fields: Vec::new(),
            tolerance: 0,
            allowed_errors: AllowList::default(),
            absence_expected: true,
            extractions: Vec::new(),
        }
    }

    /// With primary shape
    #[inline]
    #[must_use]
    pub fn with_primary(mut self, shape: RequestShape) -> Self {
        self.primary = shape;
        self
    }

    /// With fallback shape
    #[inline]
    #[must_use]
    pub fn with_fallback(mut self, shape: RequestShape) -> Self {
        self.fallback = Some(shape);
        self
    }

    /// With expected response fields
    #[must_use]
    pub fn expect_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// With missing-field tolerance
    #[inline]
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: usize) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// With allow-listed error types
    #[inline]
    #[must_use]
    pub fn with_allowed_errors(mut self, allowed: AllowList) -> Self {
        self.allowed_errors = allowed;
        self
    }

    /// Whether 404 counts as a pass
    #[inline]
    #[must_use]
    pub fn with_absence_expected(mut self, expected: bool) -> Self {
        self.absence_expected = expected;
        self
    }

    /// Add an extraction rule
    #[must_use]
    pub fn extract(mut self, pointer: impl Into<String>, key: impl Into<String>) -> Self {
        self.extractions.push(Extraction::new(pointer, key));
        self
    }

    /// Keys named by `{key}` placeholders in the path
    #[must_use]
    pub fn path_keys(&self) -> Vec<&str> {
        let mut keys = Vec::new();
        let mut rest = self.path.as_str();
        while let Some(start) = rest.find('{') {
            let after = &rest[start + 1..];
            match after.find('}') {
                Some(end) => {
                    keys.push(&after[..end]);
                    rest = &after[end + 1..];
                }
                None => break,
            }
        }
        keys
    }
}
