//! Opaque record values and dotted field paths.
//!
//! Backends return records as JSON trees; the engine addresses into them
//! with dotted paths (`metadata.labels.env`). A path segment that lands on
//! an array fans out across its elements, so one path can yield several
//! leaf values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque structured record exchanged with storage adapters.
///
/// The core never interprets a record beyond field-path addressing, which
/// keeps it independent of any backend wire format.
pub type Value = serde_json::Value;

/// Errors raised while parsing a dotted field path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldPathError {
    #[error("field path is empty")]
    Empty,

    #[error("field path '{0}' contains an empty segment")]
    EmptySegment(String),
}

/// A parsed dotted field path into a record value.
///
/// Paths are parsed once at declaration time and reused for every
/// extraction during query execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Parse a dotted path such as `metadata.id`.
    pub fn parse(raw: &str) -> Result<Self, FieldPathError> {
        if raw.is_empty() {
            return Err(FieldPathError::Empty);
        }
        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(FieldPathError::EmptySegment(raw.to_string()));
        }
        Ok(Self { segments })
    }

    /// Path segments in traversal order.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Extract every leaf value this path reaches inside `value`.
    ///
    /// Traversing into an array fans out per element, so the result can
    /// hold zero, one, or many references. Missing fields contribute
    /// nothing rather than erroring.
    pub fn extract<'a>(&self, value: &'a Value) -> Vec<&'a Value> {
        let mut current = vec![value];
        for segment in &self.segments {
            let mut next = Vec::new();
            for candidate in current {
                match candidate {
                    Value::Object(map) => {
                        if let Some(child) = map.get(segment) {
                            next.push(child);
                        }
                    }
                    Value::Array(items) => {
                        for item in items {
                            if let Some(child) = item.get(segment) {
                                next.push(child);
                            }
                        }
                    }
                    _ => {}
                }
            }
            current = next;
        }
        current
    }

    /// Extract the first leaf value this path reaches, if any.
    pub fn extract_first<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        self.extract(value).into_iter().next()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl TryFrom<String> for FieldPath {
    type Error = FieldPathError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.to_string()
    }
}

/// Canonical form of a scalar value, used as a batch/cache key.
///
/// The canonical form is type-prefixed so the number `1` and the string
/// `"1"` stay distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScalarKey(String);

impl ScalarKey {
    /// Canonicalize a scalar value. Arrays, objects, and null are not
    /// usable as reference keys and yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self(format!("s:{s}"))),
            Value::Number(n) => Some(Self(format!("n:{n}"))),
            Value::Bool(b) => Some(Self(format!("b:{b}"))),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Whether `value` canonicalizes to this key.
    pub fn matches(&self, value: &Value) -> bool {
        Self::from_value(value).as_ref() == Some(self)
    }
}

impl fmt::Display for ScalarKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_rejects_empty_paths() {
        assert_eq!(FieldPath::parse(""), Err(FieldPathError::Empty));
        assert!(matches!(
            FieldPath::parse("metadata..id"),
            Err(FieldPathError::EmptySegment(_))
        ));
    }

    #[test]
    fn test_extract_nested_field() {
        let path = FieldPath::parse("metadata.id").unwrap();
        let value = json!({"metadata": {"id": "g1"}});
        let found = path.extract(&value);
        assert_eq!(found, vec![&json!("g1")]);
    }

    #[test]
    fn test_extract_fans_out_over_lists() {
        let path = FieldPath::parse("parts.ref").unwrap();
        let value = json!({"parts": [{"ref": "a"}, {"ref": "b"}, {"other": 1}]});
        let found = path.extract(&value);
        assert_eq!(found, vec![&json!("a"), &json!("b")]);
    }

    #[test]
    fn test_extract_missing_field_is_empty() {
        let path = FieldPath::parse("spec.owner").unwrap();
        assert!(path.extract(&json!({"metadata": {}})).is_empty());
    }

    #[test]
    fn test_scalar_key_distinguishes_types() {
        let number = ScalarKey::from_value(&json!(1)).unwrap();
        let string = ScalarKey::from_value(&json!("1")).unwrap();
        assert_ne!(number, string);
        assert!(number.matches(&json!(1)));
        assert!(!number.matches(&json!("1")));
    }

    #[test]
    fn test_scalar_key_rejects_composites() {
        assert!(ScalarKey::from_value(&json!(null)).is_none());
        assert!(ScalarKey::from_value(&json!([1])).is_none());
        assert!(ScalarKey::from_value(&json!({"a": 1})).is_none());
    }
}
