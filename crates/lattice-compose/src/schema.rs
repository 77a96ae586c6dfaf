//! The composed schema snapshot.
//!
//! Built once per registration batch, then read-only: safe for
//! unsynchronized concurrent reads. Any change to subgraphs or
//! relationships produces a whole new snapshot that the owner swaps in
//! atomically; in-flight executions keep the snapshot they started with.

use crate::relationship::RelationshipConfig;
use lattice_core::{Entity, EntityRef, FieldType, Operation};
use std::collections::BTreeMap;

/// How a composed field resolves: read directly from the record, or
/// computed through relationship resolution.
#[derive(Debug, Clone)]
pub enum FieldBinding {
    Declared,
    Relationship(RelationshipConfig),
}

/// One field of a composed type.
#[derive(Debug, Clone)]
pub struct ComposedField {
    pub ty: FieldType,
    pub binding: FieldBinding,
}

impl ComposedField {
    pub fn is_relationship(&self) -> bool {
        matches!(self.binding, FieldBinding::Relationship(_))
    }
}

/// One entry in the type table: an entity's declared fields plus its
/// injected relationship fields.
#[derive(Debug, Clone)]
pub struct ComposedType {
    pub entity: EntityRef,
    pub fields: BTreeMap<String, ComposedField>,
}

/// One entry in the routing table: the owning entity and operation for a
/// prefixed root field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub entity: EntityRef,
    pub operation: Operation,
}

/// The immutable composed schema: type table plus routing table, with the
/// registered entities (and their storage adapter handles) behind them.
///
/// Tables are ordered maps so composing identical inputs yields identical
/// iteration order.
#[derive(Debug, Clone, Default)]
pub struct ComposedSchema {
    entities: BTreeMap<EntityRef, Entity>,
    types: BTreeMap<String, ComposedType>,
    routes: BTreeMap<String, Route>,
}

impl ComposedSchema {
    pub(crate) fn new(
        entities: BTreeMap<EntityRef, Entity>,
        types: BTreeMap<String, ComposedType>,
        routes: BTreeMap<String, Route>,
    ) -> Self {
        Self {
            entities,
            types,
            routes,
        }
    }

    /// An empty schema; what a gateway holds before any registration.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Routing-table lookup for a prefixed root field.
    pub fn route(&self, root_field: &str) -> Option<&Route> {
        self.routes.get(root_field)
    }

    /// The registered entity behind a reference.
    pub fn entity(&self, entity: &EntityRef) -> Option<&Entity> {
        self.entities.get(entity)
    }

    /// Type-table lookup by entity reference.
    pub fn composed_type(&self, entity: &EntityRef) -> Option<&ComposedType> {
        self.types.get(&entity.type_name())
    }

    /// The full routing table, ordered by root field name.
    pub fn routing_table(&self) -> &BTreeMap<String, Route> {
        &self.routes
    }

    /// The full type table, ordered by prefixed type name.
    pub fn type_table(&self) -> &BTreeMap<String, ComposedType> {
        &self.types
    }
}
