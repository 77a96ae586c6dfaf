//! # Lattice Memstore
//!
//! An in-memory [`EntityStore`] used by tests, demos, and embedders that
//! want a local backend. Records are keyed by `(metadata.namespace,
//! metadata.name)`; `List` returns records in key order so results are
//! stable across calls.
//!
//! Per-operation call counters are exposed through [`MemStore::stats`];
//! the engine's batching guarantees are asserted against them in tests.

use async_trait::async_trait;
use dashmap::DashMap;
use lattice_core::{CapabilitySet, EntityStore, ListFilter, StoreError, StoreResult, Value};
use std::sync::atomic::{AtomicU64, Ordering};

/// Storage key for one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct RecordKey {
    namespace: String,
    name: String,
}

/// Per-operation call counters.
#[derive(Debug, Default)]
pub struct CallStats {
    gets: AtomicU64,
    lists: AtomicU64,
    creates: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
}

impl CallStats {
    pub fn gets(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
    }

    pub fn lists(&self) -> u64 {
        self.lists.load(Ordering::Relaxed)
    }

    pub fn creates(&self) -> u64 {
        self.creates.load(Ordering::Relaxed)
    }

    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    /// Backend calls of any kind since construction.
    pub fn total_calls(&self) -> u64 {
        self.gets() + self.lists() + self.creates() + self.updates() + self.deletes()
    }
}

/// In-memory entity store.
///
/// Supports the full capability set by default; restrict it with
/// [`with_capabilities`](Self::with_capabilities) to exercise
/// capability-gated composition and the engine's `Get`-only batching
/// fallback.
#[derive(Debug, Default)]
pub struct MemStore {
    records: DashMap<RecordKey, Value>,
    capabilities: Option<CapabilitySet>,
    stats: CallStats,
}

impl MemStore {
    /// A store advertising every capability.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store advertising only `capabilities`.
    pub fn with_capabilities(capabilities: CapabilitySet) -> Self {
        Self {
            capabilities: Some(capabilities),
            ..Self::default()
        }
    }

    /// Pre-populate the store with fixture records. Each record must carry
    /// `metadata.name`; `metadata.namespace` defaults to the empty scope.
    pub fn seed(&self, records: Vec<Value>) -> StoreResult<()> {
        for record in records {
            let key = record_key(&record)?;
            self.records.insert(key, record);
        }
        Ok(())
    }

    /// Call counters for assertions and observability.
    pub fn stats(&self) -> &CallStats {
        &self.stats
    }

    fn key(namespace: Option<&str>, name: &str) -> RecordKey {
        RecordKey {
            namespace: namespace.unwrap_or("").to_string(),
            name: name.to_string(),
        }
    }
}

/// Extract the storage key from a record's metadata.
fn record_key(record: &Value) -> StoreResult<RecordKey> {
    let name = record
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::InvalidRecord("record is missing metadata.name".into()))?;
    let namespace = record
        .pointer("/metadata/namespace")
        .and_then(Value::as_str)
        .unwrap_or("");
    Ok(RecordKey {
        namespace: namespace.to_string(),
        name: name.to_string(),
    })
}

#[async_trait]
impl EntityStore for MemStore {
    fn capabilities(&self) -> CapabilitySet {
        self.capabilities.unwrap_or_else(CapabilitySet::all)
    }

    async fn get(&self, namespace: Option<&str>, name: &str) -> StoreResult<Value> {
        self.stats.gets.fetch_add(1, Ordering::Relaxed);
        let key = Self::key(namespace, name);
        self.records
            .get(&key)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound {
                namespace: key.namespace,
                name: key.name,
            })
    }

    async fn list(&self, filter: &ListFilter) -> StoreResult<Vec<Value>> {
        self.stats.lists.fetch_add(1, Ordering::Relaxed);
        let mut rows: Vec<(RecordKey, Value)> = self
            .records
            .iter()
            .filter(|entry| match &filter.namespace {
                Some(ns) => &entry.key().namespace == ns,
                None => true,
            })
            .filter(|entry| filter.accepts(entry.value()))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        // DashMap iteration order is arbitrary; sort by key so List order
        // is stable, as the storage contract requires.
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(rows.into_iter().map(|(_, value)| value).collect())
    }

    async fn create(&self, value: Value) -> StoreResult<Value> {
        self.stats.creates.fetch_add(1, Ordering::Relaxed);
        let key = record_key(&value)?;
        if self.records.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "record {}/{} already exists",
                key.namespace, key.name
            )));
        }
        self.records.insert(key, value.clone());
        Ok(value)
    }

    async fn update(&self, value: Value) -> StoreResult<Value> {
        self.stats.updates.fetch_add(1, Ordering::Relaxed);
        let key = record_key(&value)?;
        if !self.records.contains_key(&key) {
            return Err(StoreError::NotFound {
                namespace: key.namespace,
                name: key.name,
            });
        }
        self.records.insert(key, value.clone());
        Ok(value)
    }

    async fn delete(&self, namespace: Option<&str>, name: &str) -> StoreResult<Value> {
        self.stats.deletes.fetch_add(1, Ordering::Relaxed);
        let key = Self::key(namespace, name);
        self.records
            .remove(&key)
            .map(|(_, value)| value)
            .ok_or(StoreError::NotFound {
                namespace: key.namespace,
                name: key.name,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::FieldPath;
    use serde_json::json;

    fn widget(name: &str, gadget_ref: &str) -> Value {
        json!({
            "metadata": {"name": name},
            "gadgetRef": gadget_ref,
        })
    }

    #[tokio::test]
    async fn test_get_roundtrip() {
        let store = MemStore::new();
        store.seed(vec![widget("w1", "g1")]).unwrap();

        let found = store.get(None, "w1").await.unwrap();
        assert_eq!(found.pointer("/gadgetRef"), Some(&json!("g1")));

        let missing = store.get(None, "w2").await.unwrap_err();
        assert!(matches!(missing, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_namespace_scopes_keys() {
        let store = MemStore::new();
        store
            .seed(vec![
                json!({"metadata": {"name": "w1", "namespace": "tenant-a"}}),
                json!({"metadata": {"name": "w1", "namespace": "tenant-b"}}),
            ])
            .unwrap();

        assert!(store.get(Some("tenant-a"), "w1").await.is_ok());
        assert!(store.get(None, "w1").await.is_err());
        let scoped = store
            .list(&ListFilter::in_namespace("tenant-b"))
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_filtered() {
        let store = MemStore::new();
        store
            .seed(vec![
                widget("w3", "g1"),
                widget("w1", "g1"),
                widget("w2", "g2"),
            ])
            .unwrap();

        let filter = ListFilter::all().matching(
            FieldPath::parse("gadgetRef").unwrap(),
            vec![json!("g1")],
        );
        let rows = store.list(&filter).await.unwrap();
        let names: Vec<_> = rows
            .iter()
            .map(|r| r.pointer("/metadata/name").unwrap().clone())
            .collect();
        assert_eq!(names, vec![json!("w1"), json!("w3")]);
    }

    #[tokio::test]
    async fn test_create_conflicts_update_requires_existing() {
        let store = MemStore::new();
        store.create(widget("w1", "g1")).await.unwrap();

        let conflict = store.create(widget("w1", "g2")).await.unwrap_err();
        assert!(matches!(conflict, StoreError::Conflict(_)));

        store.update(widget("w1", "g9")).await.unwrap();
        let updated = store.get(None, "w1").await.unwrap();
        assert_eq!(updated.pointer("/gadgetRef"), Some(&json!("g9")));

        let missing = store.update(widget("w2", "g1")).await.unwrap_err();
        assert!(matches!(missing, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_returns_removed_record() {
        let store = MemStore::new();
        store.seed(vec![widget("w1", "g1")]).unwrap();

        let removed = store.delete(None, "w1").await.unwrap();
        assert_eq!(removed.pointer("/metadata/name"), Some(&json!("w1")));
        assert!(store.get(None, "w1").await.is_err());
    }

    #[tokio::test]
    async fn test_seed_rejects_anonymous_records() {
        let store = MemStore::new();
        let err = store.seed(vec![json!({"spec": {}})]).unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord(_)));
    }

    #[tokio::test]
    async fn test_stats_count_calls() {
        let store = MemStore::new();
        store.seed(vec![widget("w1", "g1")]).unwrap();

        let _ = store.get(None, "w1").await;
        let _ = store.get(None, "nope").await;
        let _ = store.list(&ListFilter::all()).await;

        assert_eq!(store.stats().gets(), 2);
        assert_eq!(store.stats().lists(), 1);
        assert_eq!(store.stats().total_calls(), 3);
    }
}
