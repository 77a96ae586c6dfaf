//! Relationship lookup batching and caching.
//!
//! One [`BatchContext`] lives for exactly one query execution. References
//! discovered while scanning a resolution depth accumulate here (keyed by
//! target entity and comparison field path); `dispatch_wave` then issues at
//! most one `List` call per batch key — or falls back to concurrent `Get`
//! calls when the target only supports single-item lookup — and caches
//! every (entity, key) → matches binding for the rest of the execution.
//!
//! A lookup moves `Pending` (enqueued, wave not yet dispatched) → `Batched`
//! (wave in flight) → [`LookupState::Resolved`] or [`LookupState::Failed`];
//! both terminal states live in the cache so repeated references within one
//! execution never re-issue backend calls. Retries are an adapter concern.

use crate::config::EngineConfig;
use crate::error::ResolveError;
use dashmap::DashMap;
use lattice_compose::ComposedSchema;
use lattice_core::{EntityRef, FieldPath, ListFilter, Operation, ScalarKey, StoreError, Value};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Lookups are batched per (target entity, comparison field path).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct BatchKey {
    pub target: EntityRef,
    pub path: FieldPath,
}

/// Terminal state of one relationship lookup.
#[derive(Debug, Clone)]
pub(crate) enum LookupState {
    /// Target records matching the reference, in backend return order.
    Resolved(Arc<Vec<Value>>),
    Failed(StoreError),
}

/// Per-execution batching and caching of relationship lookups.
#[derive(Debug, Default)]
pub(crate) struct BatchContext {
    /// References awaiting the next wave, with their original (pre-canonical)
    /// values for building backend filters.
    pending: Mutex<BTreeMap<BatchKey, BTreeMap<ScalarKey, Value>>>,
    cache: DashMap<(BatchKey, ScalarKey), LookupState>,
}

impl BatchContext {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Enqueue one reference for the next wave. References already resolved
    /// (or failed) earlier in this execution are served from cache instead.
    pub(crate) fn enqueue(
        &self,
        target: &EntityRef,
        path: &FieldPath,
        key: ScalarKey,
        original: Value,
    ) {
        let batch_key = BatchKey {
            target: target.clone(),
            path: path.clone(),
        };
        if self.cache.contains_key(&(batch_key.clone(), key.clone())) {
            return;
        }
        self.pending
            .lock()
            .entry(batch_key)
            .or_default()
            .insert(key, original);
    }

    /// Cached outcome for one reference, if its wave has run.
    pub(crate) fn lookup(
        &self,
        target: &EntityRef,
        path: &FieldPath,
        key: &ScalarKey,
    ) -> Option<LookupState> {
        let batch_key = BatchKey {
            target: target.clone(),
            path: path.clone(),
        };
        self.cache
            .get(&(batch_key, key.clone()))
            .map(|entry| entry.value().clone())
    }

    /// Dispatch every pending lookup: one filtered `List` per batch key,
    /// concurrent under the configured cap. Only cancellation propagates as
    /// an error; backend failures land in the cache as `Failed` entries and
    /// degrade per-field during binding.
    pub(crate) async fn dispatch_wave(
        &self,
        schema: &ComposedSchema,
        config: &EngineConfig,
        cancel: &CancellationToken,
    ) -> Result<(), ResolveError> {
        let wave = std::mem::take(&mut *self.pending.lock());
        if wave.is_empty() {
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }

        let keys: usize = wave.values().map(BTreeMap::len).sum();
        tracing::debug!(batches = wave.len(), keys, "dispatching relationship batch wave");

        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_lookups.max(1)));
        let outcomes = futures::future::join_all(wave.into_iter().map(|(batch_key, refs)| {
            self.resolve_batch(schema, batch_key, refs, semaphore.clone(), cancel.clone())
        }))
        .await;
        outcomes.into_iter().collect()
    }

    async fn resolve_batch(
        &self,
        schema: &ComposedSchema,
        batch_key: BatchKey,
        refs: BTreeMap<ScalarKey, Value>,
        semaphore: Arc<Semaphore>,
        cancel: CancellationToken,
    ) -> Result<(), ResolveError> {
        let Some(entity) = schema.entity(&batch_key.target) else {
            self.fail_all(
                &batch_key,
                refs.keys(),
                StoreError::Backend(format!(
                    "entity '{}' is not registered",
                    batch_key.target
                )),
            );
            return Ok(());
        };
        let store = entity.store().clone();

        if entity.capabilities.supports(Operation::List) {
            let filter = ListFilter::all()
                .matching(batch_key.path.clone(), refs.values().cloned().collect());
            let _permit = semaphore.acquire().await.ok();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ResolveError::Cancelled),
                rows = store.list(&filter) => rows,
            };
            match result {
                Ok(rows) => {
                    for key in refs.keys() {
                        let matches: Vec<Value> = rows
                            .iter()
                            .filter(|row| {
                                batch_key
                                    .path
                                    .extract(row)
                                    .into_iter()
                                    .any(|leaf| key.matches(leaf))
                            })
                            .cloned()
                            .collect();
                        self.cache.insert(
                            (batch_key.clone(), key.clone()),
                            LookupState::Resolved(Arc::new(matches)),
                        );
                    }
                }
                Err(err) => self.fail_all(&batch_key, refs.keys(), err),
            }
            return Ok(());
        }

        if entity.capabilities.supports(Operation::Get) {
            // Single-item fallback: one Get per distinct key, concurrent
            // under the cap, using the reference value as the resource name.
            let gets = refs.into_iter().map(|(key, original)| {
                let store = store.clone();
                let semaphore = semaphore.clone();
                let cancel = cancel.clone();
                let batch_key = batch_key.clone();
                async move {
                    let name = match original {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    let _permit = semaphore.acquire_owned().await.ok();
                    let result = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(ResolveError::Cancelled),
                        row = store.get(None, &name) => row,
                    };
                    let state = match result {
                        Ok(row) => LookupState::Resolved(Arc::new(vec![row])),
                        // A plain miss is zero matches, not a backend fault.
                        Err(StoreError::NotFound { .. }) => {
                            LookupState::Resolved(Arc::new(Vec::new()))
                        }
                        Err(err) => LookupState::Failed(err),
                    };
                    self.cache.insert((batch_key, key), state);
                    Ok(())
                }
            });
            let outcomes: Vec<Result<(), ResolveError>> =
                futures::future::join_all(gets).await;
            return outcomes.into_iter().collect();
        }

        self.fail_all(
            &batch_key,
            refs.keys(),
            StoreError::Unsupported(Operation::List),
        );
        Ok(())
    }

    fn fail_all<'a>(
        &self,
        batch_key: &BatchKey,
        keys: impl Iterator<Item = &'a ScalarKey>,
        err: StoreError,
    ) {
        for key in keys {
            self.cache.insert(
                (batch_key.clone(), key.clone()),
                LookupState::Failed(err.clone()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_compose::{compose, RelationshipRegistry};
    use lattice_core::{CapabilitySet, Entity, EntityStore, FieldType, SubgraphDescriptor};
    use lattice_memstore::MemStore;
    use serde_json::json;

    fn gadget(id: &str) -> Value {
        json!({"metadata": {"name": id, "id": id}})
    }

    fn schema_with(store: Arc<MemStore>, capabilities: CapabilitySet) -> ComposedSchema {
        let descriptor = SubgraphDescriptor::new("b").entity(
            Entity::new("Gadget", store as Arc<dyn EntityStore>)
                .field("id", FieldType::scalar("String"))
                .capabilities(capabilities),
        );
        compose(&[descriptor], &RelationshipRegistry::new()).unwrap()
    }

    fn enqueue_ref(ctx: &BatchContext, target: &EntityRef, path: &FieldPath, raw: &str) {
        let value = json!(raw);
        let key = ScalarKey::from_value(&value).unwrap();
        ctx.enqueue(target, path, key, value);
    }

    #[tokio::test]
    async fn test_wave_issues_one_list_call_per_batch_key() {
        let store = Arc::new(MemStore::with_capabilities(CapabilitySet::read_only()));
        store.seed(vec![gadget("g1"), gadget("g2")]).unwrap();
        let schema = schema_with(store.clone(), CapabilitySet::read_only());

        let target = EntityRef::new("b", "Gadget");
        let path = FieldPath::parse("metadata.id").unwrap();
        let ctx = BatchContext::new();
        for reference in ["g1", "g2", "g1", "g1"] {
            enqueue_ref(&ctx, &target, &path, reference);
        }

        ctx.dispatch_wave(&schema, &EngineConfig::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(store.stats().lists(), 1);
        assert_eq!(store.stats().gets(), 0);
        let key = ScalarKey::from_value(&json!("g1")).unwrap();
        match ctx.lookup(&target, &path, &key).unwrap() {
            LookupState::Resolved(rows) => assert_eq!(rows.len(), 1),
            LookupState::Failed(err) => panic!("unexpected failure: {err}"),
        }
    }

    #[tokio::test]
    async fn test_get_only_target_falls_back_to_concurrent_gets() {
        let store = Arc::new(MemStore::with_capabilities(CapabilitySet::GET));
        store.seed(vec![gadget("g1")]).unwrap();
        let schema = schema_with(store.clone(), CapabilitySet::GET);

        let target = EntityRef::new("b", "Gadget");
        let path = FieldPath::parse("metadata.id").unwrap();
        let ctx = BatchContext::new();
        enqueue_ref(&ctx, &target, &path, "g1");
        enqueue_ref(&ctx, &target, &path, "missing");

        ctx.dispatch_wave(&schema, &EngineConfig::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(store.stats().gets(), 2);
        assert_eq!(store.stats().lists(), 0);

        let missing = ScalarKey::from_value(&json!("missing")).unwrap();
        match ctx.lookup(&target, &path, &missing).unwrap() {
            // A miss is zero matches, not a failure.
            LookupState::Resolved(rows) => assert!(rows.is_empty()),
            LookupState::Failed(err) => panic!("unexpected failure: {err}"),
        }
    }

    #[tokio::test]
    async fn test_cached_keys_are_not_re_dispatched() {
        let store = Arc::new(MemStore::with_capabilities(CapabilitySet::read_only()));
        store.seed(vec![gadget("g1")]).unwrap();
        let schema = schema_with(store.clone(), CapabilitySet::read_only());

        let target = EntityRef::new("b", "Gadget");
        let path = FieldPath::parse("metadata.id").unwrap();
        let ctx = BatchContext::new();
        let config = EngineConfig::default();

        enqueue_ref(&ctx, &target, &path, "g1");
        ctx.dispatch_wave(&schema, &config, &CancellationToken::new())
            .await
            .unwrap();

        // The same reference at a later depth hits the cache: no new wave.
        enqueue_ref(&ctx, &target, &path, "g1");
        ctx.dispatch_wave(&schema, &config, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(store.stats().lists(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_token_abandons_wave() {
        let store = Arc::new(MemStore::with_capabilities(CapabilitySet::read_only()));
        let schema = schema_with(store.clone(), CapabilitySet::read_only());

        let target = EntityRef::new("b", "Gadget");
        let path = FieldPath::parse("metadata.id").unwrap();
        let ctx = BatchContext::new();
        enqueue_ref(&ctx, &target, &path, "g1");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = ctx
            .dispatch_wave(&schema, &EngineConfig::default(), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, ResolveError::Cancelled);
        assert_eq!(store.stats().total_calls(), 0);
    }
}
