//! Relationship declarations.
//!
//! A relationship injects a computed field into a source entity's composed
//! type: resolving it looks up records of the target entity whose value at
//! `target_path` equals the source record's value at `source_path`.

use lattice_core::{EntityRef, FieldPath};
use serde::{Deserialize, Serialize};

/// How many target records one source record relates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    One,
    Many,
}

/// One cross-subgraph relationship declaration.
#[derive(Debug, Clone)]
pub struct RelationshipConfig {
    /// Field name injected into the source entity's composed type. Must not
    /// collide with a declared field.
    pub field_name: String,
    /// The entity the field is injected into.
    pub source: EntityRef,
    /// The namespace-qualified entity the field resolves to.
    pub target: EntityRef,
    /// Dotted path to the reference value on a resolved source record. May
    /// traverse list elements, fanning out per element.
    pub source_path: FieldPath,
    /// Dotted path to the comparison field on candidate target records.
    pub target_path: FieldPath,
    pub cardinality: Cardinality,
    /// When false, zero matches is a resolution error, never a silent null.
    pub optional: bool,
}

impl RelationshipConfig {
    /// A singular, optional relationship; adjust with the builder methods.
    pub fn new(
        field_name: impl Into<String>,
        source: EntityRef,
        target: EntityRef,
        source_path: FieldPath,
        target_path: FieldPath,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            source,
            target,
            source_path,
            target_path,
            cardinality: Cardinality::One,
            optional: true,
        }
    }

    /// Resolve to a list of targets instead of a single one.
    pub fn many(mut self) -> Self {
        self.cardinality = Cardinality::Many;
        self
    }

    /// Zero matches becomes a resolution error instead of null.
    pub fn required(mut self) -> Self {
        self.optional = false;
        self
    }
}

/// Holds relationship declarations, keyed by source entity.
///
/// Registration order is preserved per source entity; injected fields show
/// up in the composed type in that order (the type table itself is an
/// ordered map, so composition stays deterministic either way).
#[derive(Debug, Clone, Default)]
pub struct RelationshipRegistry {
    configs: Vec<RelationshipConfig>,
}

impl RelationshipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one relationship declaration.
    pub fn register(&mut self, config: RelationshipConfig) {
        self.configs.push(config);
    }

    /// All declarations, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &RelationshipConfig> {
        self.configs.iter()
    }

    /// Declarations whose source is `entity`.
    pub fn for_source<'a>(
        &'a self,
        entity: &'a EntityRef,
    ) -> impl Iterator<Item = &'a RelationshipConfig> {
        self.configs.iter().filter(move |c| &c.source == entity)
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}
