//! Storage capability trait.
//!
//! Backends implement [`EntityStore`]; the engine only ever talks to this
//! trait. The capability probe ([`EntityStore::capabilities`]) lets the
//! composer verify at registration time that every capability an entity
//! declares is actually backed by its adapter.
//!
//! ## Thread Safety
//!
//! Implementations must be `Send + Sync`; the engine invokes them
//! concurrently (bounded by its per-wave concurrency cap) and imposes no
//! additional locking.

use crate::schema::{CapabilitySet, Operation};
use crate::value::{FieldPath, ScalarKey, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Common result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Storage operation errors.
///
/// The engine wraps these with the query path at which they occurred;
/// adapters should not pre-format paths into messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum StoreError {
    #[error("not found: {namespace}/{name}")]
    NotFound { namespace: String, name: String },

    #[error("operation not supported: {0}")]
    Unsupported(Operation),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Equality-set match on a dotted field path: a record matches when any
/// value reached by `path` equals any of `values`.
#[derive(Debug, Clone)]
pub struct FieldMatch {
    pub path: FieldPath,
    pub values: Vec<Value>,
}

impl FieldMatch {
    pub fn matches(&self, record: &Value) -> bool {
        let keys: Vec<ScalarKey> = self
            .values
            .iter()
            .filter_map(ScalarKey::from_value)
            .collect();
        self.path
            .extract(record)
            .into_iter()
            .any(|leaf| keys.iter().any(|key| key.matches(leaf)))
    }
}

/// Filter for `List` calls: an optional namespace scope plus zero or more
/// field-path equality sets. The batch layer relies on the single-match
/// form ("target field in {collected keys}").
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub namespace: Option<String>,
    pub matches: Vec<FieldMatch>,
}

impl ListFilter {
    /// Match everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Scope to one resource namespace.
    pub fn in_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            matches: Vec::new(),
        }
    }

    /// Add a field-path equality set.
    pub fn matching(mut self, path: FieldPath, values: Vec<Value>) -> Self {
        self.matches.push(FieldMatch { path, values });
        self
    }

    /// Whether `record` passes every match in this filter. The namespace
    /// scope is the backend's concern (it keys storage, not record
    /// content).
    pub fn accepts(&self, record: &Value) -> bool {
        self.matches.iter().all(|m| m.matches(record))
    }
}

/// The narrow capability interface the engine consumes.
///
/// `namespace` here is the *resource* namespace (a storage scope), not the
/// subgraph namespace; single-tenant backends may ignore it. Records are
/// opaque [`Value`] trees addressed by dotted field path.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// The capability probe: which operations this adapter actually backs.
    /// Composition fails if an entity declares more than this.
    fn capabilities(&self) -> CapabilitySet;

    /// Fetch one record by name.
    async fn get(&self, namespace: Option<&str>, name: &str) -> StoreResult<Value>;

    /// List records matching `filter`. Ordering is backend-defined but must
    /// be stable; the engine performs no reordering.
    async fn list(&self, filter: &ListFilter) -> StoreResult<Vec<Value>>;

    /// Create a record; returns the stored value.
    async fn create(&self, value: Value) -> StoreResult<Value>;

    /// Update an existing record; returns the stored value.
    async fn update(&self, value: Value) -> StoreResult<Value>;

    /// Delete a record by name; returns the removed value.
    async fn delete(&self, namespace: Option<&str>, name: &str) -> StoreResult<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_match_equality_set() {
        let m = FieldMatch {
            path: FieldPath::parse("metadata.id").unwrap(),
            values: vec![json!("g1"), json!("g2")],
        };
        assert!(m.matches(&json!({"metadata": {"id": "g1"}})));
        assert!(m.matches(&json!({"metadata": {"id": "g2"}})));
        assert!(!m.matches(&json!({"metadata": {"id": "g3"}})));
        assert!(!m.matches(&json!({"metadata": {}})));
    }

    #[test]
    fn test_list_filter_accepts_all_matches() {
        let filter = ListFilter::all()
            .matching(FieldPath::parse("kind").unwrap(), vec![json!("widget")])
            .matching(FieldPath::parse("size").unwrap(), vec![json!(2), json!(3)]);
        assert!(filter.accepts(&json!({"kind": "widget", "size": 3})));
        assert!(!filter.accepts(&json!({"kind": "widget", "size": 9})));
        assert!(!filter.accepts(&json!({"kind": "gadget", "size": 3})));
    }
}
