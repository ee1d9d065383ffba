//! Probe outcome taxonomy and response classification

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// Error types that are valid test results rather than defects
pub const DEFAULT_ALLOWED_ERRORS: [&str; 4] = [
    "already_exists",
    "low_data_quality",
    "not_found_element",
    "invalid_parameter",
];

/// Classification of one probe attempt
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ProbeOutcome {
    /// 2xx with an acceptable shape
    Success,
    /// 404 where absence is a valid answer
    ExpectedAbsence,
    /// 4xx whose error type is allow-listed
    ExpectedValidationError,
    /// Unrecognised 4xx, or a 2xx whose shape does not match
    ValidationError,
    /// 401 or 403
    PermissionError,
    /// 5xx
    ServerError,
    /// No usable status, or an undecodable body
    TransportException,
    /// A required namespace key was absent; nothing was sent
    MissingFixture { key: String },
}

impl ProbeOutcome {
    /// Check if the outcome counts as a pass
    #[inline]
    #[must_use]
    pub fn is_pass(&self) -> bool {
        matches!(
            self,
            Self::Success | Self::ExpectedAbsence | Self::ExpectedValidationError
        )
    }

    /// Stable label used in stats and logs
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::ExpectedAbsence => "expected-absence",
            Self::ExpectedValidationError => "expected-validation-error",
            Self::ValidationError => "validation-error",
            Self::PermissionError => "permission-error",
            Self::ServerError => "server-error",
            Self::TransportException => "transport-exception",
            Self::MissingFixture { .. } => "missing-fixture",
        }
    }

    /// Check if the outcome should be logged at error level
    #[inline]
    #[must_use]
    pub fn is_severe(&self) -> bool {
        matches!(self, Self::ServerError | Self::TransportException)
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingFixture { key } => write!(f, "missing-fixture({key})"),
            other => f.write_str(other.label()),
        }
    }
}

/// Set of error types treated as expected
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowList(BTreeSet<String>);

impl AllowList {
    /// Empty allow-list
    #[must_use]
    pub fn empty() -> Self {
        Self(BTreeSet::new())
    }

    /// Add an error type
    #[must_use]
    pub fn with(mut self, error_type: impl Into<String>) -> Self {
        self.0.insert(error_type.into());
        self
    }

    /// Check membership
    #[inline]
    #[must_use]
    pub fn contains(&self, error_type: &str) -> bool {
        self.0.contains(error_type)
    }

    /// Iterate error types
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for AllowList {
    fn default() -> Self {
        DEFAULT_ALLOWED_ERRORS.iter().copied().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for AllowList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Error types reported by a 4xx body
///
/// Reads `detail[].type`, `errors[].type` / `errors[].code`, then a
/// top-level `type` / `code`.
#[must_use]
pub fn error_types(body: &Value) -> Vec<String> {
    let Some(object) = body.as_object() else {
        return Vec::new();
    };

    let mut found = Vec::new();
    for list in ["detail", "errors"] {
        if let Some(entries) = object.get(list).and_then(Value::as_array) {
            for entry in entries {
                for field in ["type", "code"] {
                    if let Some(kind) = entry.get(field).and_then(Value::as_str) {
                        found.push(kind.to_string());
                    }
                }
            }
        }
    }

    if found.is_empty() {
        for field in ["type", "code"] {
            if let Some(kind) = object.get(field).and_then(Value::as_str) {
                found.push(kind.to_string());
            }
        }
    }
    found
}

/// Classify a status code and (optional) decoded body
#[must_use]
pub fn classify(
    status: u16,
    body: Option<&Value>,
    allowed: &AllowList,
    absence_expected: bool,
) -> ProbeOutcome {
    match status {
        200..=299 => ProbeOutcome::Success,
        401 | 403 => ProbeOutcome::PermissionError,
        404 if absence_expected => ProbeOutcome::ExpectedAbsence,
        400..=499 => {
            let expected = body
                .map(error_types)
                .unwrap_or_default()
                .iter()
                .any(|kind| allowed.contains(kind));
            if expected {
                ProbeOutcome::ExpectedValidationError
            } else {
                ProbeOutcome::ValidationError
            }
        }
        500..=599 => ProbeOutcome::ServerError,
        _ => ProbeOutcome::TransportException,
    }
}

/// Result of checking expected fields on a 2xx body
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "verdict", content = "missing")]
pub enum ShapeVerdict {
    /// Shape not checked
    #[default]
    Unchecked,
    /// Every expected field present
    Complete,
    /// Some fields missing, within tolerance
    Degraded(Vec<String>),
    /// Too many (or all) fields missing
    Mismatch(Vec<String>),
}

impl ShapeVerdict {
    /// Check if the verdict still counts as a pass
    #[inline]
    #[must_use]
    pub fn is_acceptable(&self) -> bool {
        !matches!(self, Self::Mismatch(_))
    }
}

/// Check `expected` fields against a response body
///
/// Objects are checked directly; arrays by their first element, an empty
/// array passes.
#[must_use]
pub fn check_shape(body: &Value, expected: &[String], tolerance: usize) -> ShapeVerdict {
    if expected.is_empty() {
        return ShapeVerdict::Complete;
    }

    let subject = match body {
        Value::Array(items) => match items.first() {
            Some(first) => first,
            None => return ShapeVerdict::Complete,
        },
        other => other,
    };

    let missing: Vec<String> = match subject.as_object() {
        Some(object) => expected
            .iter()
            .filter(|field| !object.contains_key(field.as_str()))
            .cloned()
            .collect(),
        None => expected.to_vec(),
    };

    if missing.is_empty() {
        ShapeVerdict::Complete
    } else if missing.len() <= tolerance && missing.len() < expected.len() {
        ShapeVerdict::Degraded(missing)
    } else {
        ShapeVerdict::Mismatch(missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn status_classes() {
        let allow = AllowList::default();
        assert_eq!(classify(201, None, &allow, true), ProbeOutcome::Success);
        assert_eq!(classify(401, None, &allow, true), ProbeOutcome::PermissionError);
        assert_eq!(classify(403, None, &allow, true), ProbeOutcome::PermissionError);
        assert_eq!(classify(404, None, &allow, true), ProbeOutcome::ExpectedAbsence);
        assert_eq!(classify(404, None, &allow, false), ProbeOutcome::ValidationError);
        assert_eq!(classify(503, None, &allow, true), ProbeOutcome::ServerError);
        assert_eq!(classify(302, None, &allow, true), ProbeOutcome::TransportException);
    }

    #[test]
    fn allow_listed_detail_is_expected() {
        let body = json!({"detail": [{"type": "already_exists", "msg": "duplicate"}]});
        assert_eq!(
            classify(409, Some(&body), &AllowList::default(), true),
            ProbeOutcome::ExpectedValidationError
        );
    }

    #[test]
    fn unknown_detail_fails() {
        let body = json!({"detail": [{"type": "value_error", "msg": "bad"}]});
        assert_eq!(
            classify(422, Some(&body), &AllowList::default(), true),
            ProbeOutcome::ValidationError
        );
    }

    #[test]
    fn error_type_sources() {
        assert_eq!(
            error_types(&json!({"errors": [{"code": "invalid_parameter"}]})),
            fields(&["invalid_parameter"])
        );
        assert_eq!(
            error_types(&json!({"type": "low_data_quality"})),
            fields(&["low_data_quality"])
        );
        assert_eq!(error_types(&json!({"detail": "plain text"})), Vec::<String>::new());
        assert!(error_types(&json!([1, 2])).is_empty());
    }

    #[test]
    fn custom_allow_list() {
        let allow = AllowList::empty().with("duplicate_cuit");
        let body = json!({"detail": [{"type": "duplicate_cuit"}]});
        assert_eq!(
            classify(400, Some(&body), &allow, true),
            ProbeOutcome::ExpectedValidationError
        );
        let body = json!({"detail": [{"type": "already_exists"}]});
        assert_eq!(classify(400, Some(&body), &allow, true), ProbeOutcome::ValidationError);
    }

    #[test]
    fn passes() {
        assert!(ProbeOutcome::Success.is_pass());
        assert!(ProbeOutcome::ExpectedAbsence.is_pass());
        assert!(ProbeOutcome::ExpectedValidationError.is_pass());
        assert!(!ProbeOutcome::ValidationError.is_pass());
        assert!(!ProbeOutcome::MissingFixture { key: "bank_id".into() }.is_pass());
        assert!(ProbeOutcome::ServerError.is_severe());
    }

    #[test]
    fn display_names_missing_key() {
        let outcome = ProbeOutcome::MissingFixture {
            key: "address_id".into(),
        };
        assert_eq!(outcome.to_string(), "missing-fixture(address_id)");
        assert_eq!(ProbeOutcome::ServerError.to_string(), "server-error");
    }

    #[test]
    fn shape_object() {
        let body = json!({"id": 1, "name": "x", "cuit": "20"});
        let expected = fields(&["id", "name", "cuit"]);
        assert_eq!(check_shape(&body, &expected, 0), ShapeVerdict::Complete);

        let partial = json!({"id": 1, "name": "x"});
        assert_eq!(
            check_shape(&partial, &expected, 1),
            ShapeVerdict::Degraded(fields(&["cuit"]))
        );
        assert_eq!(
            check_shape(&partial, &expected, 0),
            ShapeVerdict::Mismatch(fields(&["cuit"]))
        );
    }

    #[test]
    fn shape_all_missing_is_mismatch_even_within_tolerance() {
        let verdict = check_shape(&json!({"other": 1}), &fields(&["id"]), 5);
        assert_eq!(verdict, ShapeVerdict::Mismatch(fields(&["id"])));
        assert!(!verdict.is_acceptable());
    }

    #[test]
    fn shape_array_uses_first_element() {
        let expected = fields(&["id"]);
        assert_eq!(
            check_shape(&json!([{"id": 1}, {"x": 2}]), &expected, 0),
            ShapeVerdict::Complete
        );
        assert_eq!(check_shape(&json!([]), &expected, 0), ShapeVerdict::Complete);
        assert!(matches!(
            check_shape(&json!("text"), &expected, 0),
            ShapeVerdict::Mismatch(_)
        ));
    }

    #[test]
    fn paginated_body_checks_page_keys() {
        let body = json!({"page_number": 1, "page_size": 10, "total_items": 0, "items": []});
        let expected = fields(&["page_number", "page_size", "total_items", "items"]);
        assert_eq!(check_shape(&body, &expected, 0), ShapeVerdict::Complete);
    }
}
