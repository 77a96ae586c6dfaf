//! The query router and breadth-first resolver.
//!
//! Execution runs in waves, one per selection depth. Scanning a depth reads
//! declared fields immediately and collects every relationship reference;
//! the batch wave then runs as the synchronization point for that depth;
//! binding consumes the cached lookups and spawns the next depth's tasks.
//! Depth-by-depth resolution (instead of naive depth-first recursion) is
//! what makes the batching effective: all sibling references are known
//! before the first backend call for that depth is issued.
//!
//! Output is assembled in a node arena. Scanning writes scalar fields and
//! list placeholders; a final bottom-up fold attaches child objects into
//! their parents, turning nulled nodes (required-relationship failures)
//! into `null` elements.

use crate::batch::{BatchContext, LookupState};
use crate::config::EngineConfig;
use crate::error::{QueryError, ResolveError};
use crate::path::QueryPath;
use crate::response::Response;
use crate::selection::{resolve_arguments, Selection, Variables};
use lattice_compose::{Cardinality, ComposedSchema, FieldBinding, RelationshipConfig, Route};
use lattice_core::{
    EntityRef, FieldKind, FieldPath, ListFilter, Operation, ScalarKey, StoreError, Value,
};
use serde_json::Map;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Execute a parsed selection tree against a composed schema snapshot.
///
/// The returned [`Response`] carries partial-success semantics; only an
/// unknown root field, an unknown variable, or cancellation surface as an
/// `Err`. The optional engine timeout cancels through a child of `cancel`,
/// so caller-driven aborts and timeouts share one code path.
pub async fn execute(
    schema: &ComposedSchema,
    selections: &[Selection],
    variables: &Variables,
    config: &EngineConfig,
    cancel: CancellationToken,
) -> Result<Response, ResolveError> {
    let cancel = cancel.child_token();
    let deadline = config.query_timeout().map(|timeout| {
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            tracing::debug!(?timeout, "query timeout expired; cancelling execution");
            token.cancel();
        })
    });

    let executor = Executor::new(schema, config, variables, cancel);
    let result = executor.run(selections).await;

    if let Some(handle) = deadline {
        handle.abort();
    }
    result
}

/// Root dispatch outcome: a single record or a backend-ordered collection.
enum RootValue {
    Single(Value),
    Collection(Vec<Value>),
}

/// One node of the output tree under assembly.
#[derive(Default)]
struct OutputNode {
    fields: Map<String, Value>,
    parent: Option<ParentLink>,
    /// Set when a required relationship on this node failed; the fold
    /// collapses the whole node to null.
    nulled: bool,
}

struct ParentLink {
    node: usize,
    field: String,
    index: Option<usize>,
}

/// One value whose child selections still need resolving.
struct Task {
    node: usize,
    entity: EntityRef,
    value: Value,
    selections: Vec<Selection>,
    path: QueryPath,
}

/// A relationship field waiting for its wave's lookups.
struct PendingBind {
    node: usize,
    field: String,
    config: RelationshipConfig,
    /// Distinct references in source order, with original values.
    refs: Vec<(ScalarKey, Value)>,
    path: QueryPath,
    children: Vec<Selection>,
}

struct Executor<'a> {
    schema: &'a ComposedSchema,
    config: &'a EngineConfig,
    variables: &'a Variables,
    cancel: CancellationToken,
    batch: BatchContext,
    nodes: Vec<OutputNode>,
    errors: Vec<QueryError>,
}

impl<'a> Executor<'a> {
    fn new(
        schema: &'a ComposedSchema,
        config: &'a EngineConfig,
        variables: &'a Variables,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            schema,
            config,
            variables,
            cancel,
            batch: BatchContext::new(),
            nodes: vec![OutputNode::default()],
            errors: Vec::new(),
        }
    }

    async fn run(mut self, selections: &[Selection]) -> Result<Response, ResolveError> {
        if self.cancel.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }
        let mut frontier = self.resolve_roots(selections).await?;

        while !frontier.is_empty() {
            if self.cancel.is_cancelled() {
                return Err(ResolveError::Cancelled);
            }

            let mut binds = Vec::new();
            let mut next = Vec::new();
            for task in frontier {
                self.scan_task(task, &mut binds, &mut next);
            }

            // Every reference at this depth is now collected; this wave is
            // the only place backend calls for the depth happen.
            self.batch
                .dispatch_wave(self.schema, self.config, &self.cancel)
                .await?;

            for bind in binds {
                self.bind_relationship(bind, &mut next);
            }
            frontier = next;
        }

        Ok(Response {
            data: self.fold(),
            errors: self.errors,
        })
    }

    /// Route and dispatch every root selection. Routing and argument errors
    /// abort before any backend call; dispatches then run concurrently
    /// under the lookup cap.
    async fn resolve_roots(&mut self, selections: &[Selection]) -> Result<Vec<Task>, ResolveError> {
        let mut planned = Vec::with_capacity(selections.len());
        for selection in selections {
            let route = self
                .schema
                .route(&selection.name)
                .ok_or_else(|| ResolveError::UnknownField(selection.name.clone()))?
                .clone();
            let arguments = resolve_arguments(&selection.arguments, self.variables)?;
            planned.push((selection, route, arguments));
        }

        let schema = self.schema;
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_lookups.max(1)));
        let outcomes =
            futures::future::join_all(planned.iter().map(|(selection, route, arguments)| {
                dispatch_root(
                    schema,
                    route,
                    arguments,
                    &selection.name,
                    semaphore.clone(),
                    self.cancel.clone(),
                )
            }))
            .await;

        let mut tasks = Vec::new();
        for ((selection, route, _), outcome) in planned.into_iter().zip(outcomes) {
            let path = QueryPath::root(&selection.name);
            match outcome {
                Err(ResolveError::Cancelled) => return Err(ResolveError::Cancelled),
                Err(err) => {
                    self.errors.push(QueryError::from_resolve(&err, path));
                    self.write_slot(0, &selection.name, None, Value::Null);
                }
                Ok(RootValue::Single(value)) => self.emit_object(
                    0,
                    selection.name.clone(),
                    None,
                    route.entity.clone(),
                    value,
                    &selection.children,
                    path,
                    &mut tasks,
                ),
                Ok(RootValue::Collection(rows)) => self.emit_collection(
                    0,
                    selection.name.clone(),
                    route.entity.clone(),
                    rows,
                    &selection.children,
                    path,
                    &mut tasks,
                ),
            }
        }
        Ok(tasks)
    }

    /// Resolve one value's selections: declared fields read directly,
    /// relationship fields enqueue their references for the wave.
    fn scan_task(&mut self, task: Task, binds: &mut Vec<PendingBind>, next: &mut Vec<Task>) {
        let schema = self.schema;
        let Some(composed) = schema.composed_type(&task.entity) else {
            self.errors.push(QueryError::new(
                format!("unknown type for entity '{}'", task.entity),
                task.path.clone(),
            ));
            self.nodes[task.node].nulled = true;
            return;
        };

        for selection in &task.selections {
            let field_path = task.path.field(&selection.name);
            match composed.fields.get(&selection.name) {
                None => {
                    self.errors.push(QueryError::new(
                        format!(
                            "unknown field '{}' on type '{}'",
                            selection.name,
                            task.entity.type_name()
                        ),
                        field_path,
                    ));
                    self.write_slot(task.node, &selection.name, None, Value::Null);
                }
                Some(field) => match &field.binding {
                    FieldBinding::Declared => {
                        self.scan_declared(&task, selection, &field.ty.kind, field_path, next);
                    }
                    FieldBinding::Relationship(config) => {
                        self.scan_relationship(&task, selection, config, field_path, binds);
                    }
                },
            }
        }
    }

    fn scan_declared(
        &mut self,
        task: &Task,
        selection: &Selection,
        kind: &FieldKind,
        field_path: QueryPath,
        next: &mut Vec<Task>,
    ) {
        let raw = task
            .value
            .get(&selection.name)
            .cloned()
            .unwrap_or(Value::Null);
        if selection.children.is_empty() {
            self.write_slot(task.node, &selection.name, None, raw);
            return;
        }
        match kind {
            FieldKind::Object(entity) => self.emit_object(
                task.node,
                selection.name.clone(),
                None,
                entity.clone(),
                raw,
                &selection.children,
                field_path,
                next,
            ),
            FieldKind::List(inner) => match (&inner.kind, raw) {
                (FieldKind::Object(entity), Value::Array(rows)) => self.emit_collection(
                    task.node,
                    selection.name.clone(),
                    entity.clone(),
                    rows,
                    &selection.children,
                    field_path,
                    next,
                ),
                // Non-object list (or non-list value): sub-selections
                // cannot apply, return the raw value.
                (_, other) => self.write_slot(task.node, &selection.name, None, other),
            },
            FieldKind::Scalar(_) => {
                self.write_slot(task.node, &selection.name, None, raw);
            }
        }
    }

    fn scan_relationship(
        &mut self,
        task: &Task,
        selection: &Selection,
        config: &RelationshipConfig,
        field_path: QueryPath,
        binds: &mut Vec<PendingBind>,
    ) {
        let mut refs: Vec<(ScalarKey, Value)> = Vec::new();
        let mut seen = BTreeSet::new();
        let mut push_ref = |leaf: &Value, refs: &mut Vec<(ScalarKey, Value)>| {
            if let Some(key) = ScalarKey::from_value(leaf) {
                if seen.insert(key.clone()) {
                    refs.push((key, leaf.clone()));
                }
            } else if !leaf.is_null() {
                tracing::debug!(
                    field = %selection.name,
                    source = %config.source_path,
                    "skipping non-scalar relationship reference"
                );
            }
        };
        for leaf in config.source_path.extract(&task.value) {
            // A path landing on a list of scalars references each element.
            if let Value::Array(items) = leaf {
                for item in items {
                    push_ref(item, &mut refs);
                }
            } else {
                push_ref(leaf, &mut refs);
            }
        }

        for (key, original) in &refs {
            self.batch
                .enqueue(&config.target, &config.target_path, key.clone(), original.clone());
        }
        binds.push(PendingBind {
            node: task.node,
            field: selection.name.clone(),
            config: config.clone(),
            refs,
            path: field_path,
            children: selection.children.clone(),
        });
    }

    /// Bind one relationship field from the wave's cached lookups.
    fn bind_relationship(&mut self, bind: PendingBind, next: &mut Vec<Task>) {
        let mut matches: Vec<Value> = Vec::new();
        for (key, _) in &bind.refs {
            match self
                .batch
                .lookup(&bind.config.target, &bind.config.target_path, key)
            {
                Some(LookupState::Resolved(rows)) => matches.extend(rows.iter().cloned()),
                Some(LookupState::Failed(err)) => {
                    let err = ResolveError::Store {
                        path: bind.path.clone(),
                        source: err,
                    };
                    self.fail_field(&bind, err);
                    return;
                }
                None => {
                    let err = ResolveError::Store {
                        path: bind.path.clone(),
                        source: StoreError::Backend(
                            "relationship lookup was never dispatched".into(),
                        ),
                    };
                    self.fail_field(&bind, err);
                    return;
                }
            }
        }

        match bind.config.cardinality {
            Cardinality::One => {
                if matches.len() > 1 {
                    tracing::debug!(
                        field = %bind.field,
                        target = %bind.config.target,
                        matches = matches.len(),
                        "ambiguous singular relationship; using first match by backend order"
                    );
                }
                match matches.into_iter().next() {
                    Some(value) => self.emit_object(
                        bind.node,
                        bind.field.clone(),
                        None,
                        bind.config.target.clone(),
                        value,
                        &bind.children,
                        bind.path.clone(),
                        next,
                    ),
                    None if bind.config.optional => {
                        self.write_slot(bind.node, &bind.field, None, Value::Null);
                    }
                    None => {
                        let err = ResolveError::RequiredRelationshipMissing {
                            field: bind.field.clone(),
                        };
                        self.fail_field(&bind, err);
                    }
                }
            }
            Cardinality::Many => {
                if matches.is_empty() {
                    if bind.config.optional {
                        self.write_slot(bind.node, &bind.field, None, Value::Null);
                    } else {
                        let err = ResolveError::RequiredRelationshipMissing {
                            field: bind.field.clone(),
                        };
                        self.fail_field(&bind, err);
                    }
                } else {
                    self.emit_collection(
                        bind.node,
                        bind.field.clone(),
                        bind.config.target.clone(),
                        matches,
                        &bind.children,
                        bind.path.clone(),
                        next,
                    );
                }
            }
        }
    }

    /// Record a field failure. Optional fields degrade to null in place;
    /// required fields null the element that owns them.
    fn fail_field(&mut self, bind: &PendingBind, err: ResolveError) {
        self.errors
            .push(QueryError::from_resolve(&err, bind.path.clone()));
        if bind.config.optional {
            self.write_slot(bind.node, &bind.field, None, Value::Null);
        } else {
            self.nodes[bind.node].nulled = true;
        }
    }

    /// Emit a single object value into `parent.field` (or `parent.field[index]`):
    /// directly when there are no child selections, otherwise as a new
    /// output node with a task for the next depth.
    #[allow(clippy::too_many_arguments)]
    fn emit_object(
        &mut self,
        parent: usize,
        field: String,
        index: Option<usize>,
        entity: EntityRef,
        value: Value,
        children: &[Selection],
        path: QueryPath,
        next: &mut Vec<Task>,
    ) {
        if value.is_null() || children.is_empty() {
            self.write_slot(parent, &field, index, value);
            return;
        }
        let node = self.nodes.len();
        self.nodes.push(OutputNode {
            fields: Map::new(),
            parent: Some(ParentLink {
                node: parent,
                field,
                index,
            }),
            nulled: false,
        });
        next.push(Task {
            node,
            entity,
            value,
            selections: children.to_vec(),
            path,
        });
    }

    /// Emit a collection into `parent.field`, preserving backend order. With
    /// child selections each element becomes its own node/task; the field
    /// starts as an all-null placeholder array the fold fills in.
    fn emit_collection(
        &mut self,
        parent: usize,
        field: String,
        entity: EntityRef,
        rows: Vec<Value>,
        children: &[Selection],
        path: QueryPath,
        next: &mut Vec<Task>,
    ) {
        if children.is_empty() {
            self.write_slot(parent, &field, None, Value::Array(rows));
            return;
        }
        self.write_slot(parent, &field, None, Value::Array(vec![Value::Null; rows.len()]));
        for (i, row) in rows.into_iter().enumerate() {
            self.emit_object(
                parent,
                field.clone(),
                Some(i),
                entity.clone(),
                row,
                children,
                path.index(i),
                next,
            );
        }
    }

    fn write_slot(&mut self, node: usize, field: &str, index: Option<usize>, value: Value) {
        let fields = &mut self.nodes[node].fields;
        match index {
            None => {
                fields.insert(field.to_string(), value);
            }
            Some(i) => {
                if let Some(Value::Array(items)) = fields.get_mut(field) {
                    if let Some(slot) = items.get_mut(i) {
                        *slot = value;
                    }
                }
            }
        }
    }

    /// Fold the node arena bottom-up into the final data tree. Children
    /// always have higher indices than their parents, so one reverse pass
    /// suffices.
    fn fold(&mut self) -> Value {
        for i in (1..self.nodes.len()).rev() {
            let node = std::mem::take(&mut self.nodes[i]);
            let value = if node.nulled {
                Value::Null
            } else {
                Value::Object(node.fields)
            };
            if let Some(link) = node.parent {
                self.write_slot(link.node, &link.field, link.index, value);
            }
        }
        let root = std::mem::take(&mut self.nodes[0]);
        Value::Object(root.fields)
    }
}

/// Dispatch one root selection to its entity's storage adapter.
async fn dispatch_root(
    schema: &ComposedSchema,
    route: &Route,
    arguments: &BTreeMap<String, Value>,
    field: &str,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
) -> Result<RootValue, ResolveError> {
    let path = QueryPath::root(field);
    let entity = schema.entity(&route.entity).ok_or_else(|| ResolveError::Store {
        path: path.clone(),
        source: StoreError::Backend(format!("entity '{}' is not registered", route.entity)),
    })?;
    let store = entity.store().clone();
    let wrap = |source: StoreError| ResolveError::Store {
        path: path.clone(),
        source,
    };

    tracing::debug!(%field, entity = %route.entity, operation = %route.operation, "dispatching root selection");
    let call = async {
        let _permit = semaphore.acquire_owned().await.ok();
        match route.operation {
            Operation::Get => {
                let name = require_string(arguments, "name", field)?;
                let namespace = optional_string(arguments, "namespace", field)?;
                store
                    .get(namespace.as_deref(), &name)
                    .await
                    .map(RootValue::Single)
                    .map_err(wrap)
            }
            Operation::List => {
                let filter = list_filter(arguments, field)?;
                store
                    .list(&filter)
                    .await
                    .map(RootValue::Collection)
                    .map_err(wrap)
            }
            Operation::Create => {
                let object = require_object(arguments, "object", field)?;
                store.create(object).await.map(RootValue::Single).map_err(wrap)
            }
            Operation::Update => {
                let object = require_object(arguments, "object", field)?;
                store.update(object).await.map(RootValue::Single).map_err(wrap)
            }
            Operation::Delete => {
                let name = require_string(arguments, "name", field)?;
                let namespace = optional_string(arguments, "namespace", field)?;
                store
                    .delete(namespace.as_deref(), &name)
                    .await
                    .map(RootValue::Single)
                    .map_err(wrap)
            }
        }
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ResolveError::Cancelled),
        outcome = call => outcome,
    }
}

fn require_string(
    arguments: &BTreeMap<String, Value>,
    key: &str,
    field: &str,
) -> Result<String, ResolveError> {
    match arguments.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        _ => Err(ResolveError::BadArguments {
            field: field.to_string(),
            reason: format!("missing string argument '{key}'"),
        }),
    }
}

fn optional_string(
    arguments: &BTreeMap<String, Value>,
    key: &str,
    field: &str,
) -> Result<Option<String>, ResolveError> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ResolveError::BadArguments {
            field: field.to_string(),
            reason: format!("argument '{key}' must be a string"),
        }),
    }
}

fn require_object(
    arguments: &BTreeMap<String, Value>,
    key: &str,
    field: &str,
) -> Result<Value, ResolveError> {
    match arguments.get(key) {
        Some(value @ Value::Object(_)) => Ok(value.clone()),
        _ => Err(ResolveError::BadArguments {
            field: field.to_string(),
            reason: format!("missing object argument '{key}'"),
        }),
    }
}

/// Build a `List` filter from root arguments: an optional `namespace` scope
/// plus a `filter` object of `"dotted.path": value-or-values` entries.
fn list_filter(
    arguments: &BTreeMap<String, Value>,
    field: &str,
) -> Result<ListFilter, ResolveError> {
    let mut filter = ListFilter::all();
    filter.namespace = optional_string(arguments, "namespace", field)?;
    match arguments.get("filter") {
        None | Some(Value::Null) => {}
        Some(Value::Object(entries)) => {
            for (raw_path, raw_values) in entries {
                let path = FieldPath::parse(raw_path).map_err(|err| ResolveError::BadArguments {
                    field: field.to_string(),
                    reason: format!("bad filter path '{raw_path}': {err}"),
                })?;
                let values = match raw_values {
                    Value::Array(items) => items.clone(),
                    other => vec![other.clone()],
                };
                filter = filter.matching(path, values);
            }
        }
        Some(_) => {
            return Err(ResolveError::BadArguments {
                field: field.to_string(),
                reason: "argument 'filter' must be an object".to_string(),
            })
        }
    }
    Ok(filter)
}
