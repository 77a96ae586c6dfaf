//! The composition algorithm.
//!
//! `compose` merges descriptors and relationship declarations into a
//! [`ComposedSchema`]. It validates namespace uniqueness, adapter
//! capability coverage, relationship endpoints, and field collisions, then
//! produces the immutable snapshot. It never touches backends.

use crate::error::ComposeError;
use crate::relationship::{Cardinality, RelationshipConfig, RelationshipRegistry};
use crate::schema::{ComposedField, ComposedSchema, ComposedType, FieldBinding, Route};
use lattice_core::{EntityRef, FieldType, Operation, SubgraphDescriptor};
use std::collections::{BTreeMap, BTreeSet};

/// The prefixed root-field name for one operation on one entity.
///
/// Prefixing with the subgraph namespace guarantees global uniqueness
/// without cross-subgraph name coordination.
pub(crate) fn root_field_name(namespace: &str, entity: &str, operation: Operation) -> String {
    match operation {
        Operation::Get => format!("{namespace}_get{entity}"),
        Operation::List => format!("{namespace}_list{entity}s"),
        Operation::Create => format!("{namespace}_create{entity}"),
        Operation::Update => format!("{namespace}_update{entity}"),
        Operation::Delete => format!("{namespace}_delete{entity}"),
    }
}

/// The type an injected relationship field gets in the composed schema:
/// `Object(target)` or `List(Object(target))`, nullable unless the
/// relationship is singular and required.
fn relationship_field_type(config: &RelationshipConfig) -> FieldType {
    match config.cardinality {
        Cardinality::One => {
            let ty = FieldType::object(config.target.clone());
            if config.optional {
                ty
            } else {
                ty.required()
            }
        }
        Cardinality::Many => FieldType::list(FieldType::object(config.target.clone())),
    }
}

/// Merge subgraph descriptors plus the relationship registry into one
/// composed schema.
pub fn compose(
    descriptors: &[SubgraphDescriptor],
    relationships: &RelationshipRegistry,
) -> Result<ComposedSchema, ComposeError> {
    let mut namespaces = BTreeSet::new();
    let mut entities = BTreeMap::new();
    let mut types = BTreeMap::new();
    let mut routes = BTreeMap::new();

    for descriptor in descriptors {
        if descriptor.namespace.is_empty() {
            return Err(ComposeError::EmptyNamespace);
        }
        if !namespaces.insert(descriptor.namespace.clone()) {
            return Err(ComposeError::DuplicateNamespace(descriptor.namespace.clone()));
        }

        for entity in &descriptor.entities {
            let entity_ref = EntityRef::new(&descriptor.namespace, &entity.name);
            if entities.contains_key(&entity_ref) {
                return Err(ComposeError::DuplicateEntity {
                    namespace: descriptor.namespace.clone(),
                    entity: entity.name.clone(),
                });
            }

            let supported = entity.store().capabilities();
            for operation in Operation::ALL {
                if !entity.capabilities.supports(operation) {
                    continue;
                }
                // Declared capability must be backed by the adapter, so an
                // exposed operation can never be unimplemented at runtime.
                if !supported.supports(operation) {
                    return Err(ComposeError::UnsupportedCapability {
                        entity: entity_ref.clone(),
                        operation,
                    });
                }
                routes.insert(
                    root_field_name(&descriptor.namespace, &entity.name, operation),
                    Route {
                        entity: entity_ref.clone(),
                        operation,
                    },
                );
            }

            let fields = entity
                .fields
                .iter()
                .map(|(name, ty)| {
                    (
                        name.clone(),
                        ComposedField {
                            ty: ty.clone(),
                            binding: FieldBinding::Declared,
                        },
                    )
                })
                .collect();
            types.insert(
                entity_ref.type_name(),
                ComposedType {
                    entity: entity_ref.clone(),
                    fields,
                },
            );
            entities.insert(entity_ref, entity.clone());
        }
    }

    for config in relationships.iter() {
        if !entities.contains_key(&config.target) {
            return Err(ComposeError::UnknownTargetEntity(config.target.clone()));
        }
        let composed = types
            .get_mut(&config.source.type_name())
            .filter(|_| entities.contains_key(&config.source))
            .ok_or_else(|| ComposeError::UnknownSourceEntity(config.source.clone()))?;
        if composed.fields.contains_key(&config.field_name) {
            return Err(ComposeError::FieldCollision {
                entity: config.source.clone(),
                field: config.field_name.clone(),
            });
        }
        composed.fields.insert(
            config.field_name.clone(),
            ComposedField {
                ty: relationship_field_type(config),
                binding: FieldBinding::Relationship(config.clone()),
            },
        );
    }

    tracing::debug!(
        subgraphs = descriptors.len(),
        entities = entities.len(),
        routes = routes.len(),
        relationships = relationships.len(),
        "composed schema"
    );
    Ok(ComposedSchema::new(entities, types, routes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_core::{CapabilitySet, Entity, EntityStore, FieldPath, FieldType};
    use lattice_memstore::MemStore;
    use std::sync::Arc;
    use test_case::test_case;

    fn store() -> Arc<dyn EntityStore> {
        Arc::new(MemStore::new())
    }

    fn widget_subgraph() -> SubgraphDescriptor {
        SubgraphDescriptor::new("a").entity(
            Entity::new("Widget", store())
                .field("id", FieldType::scalar("String").required())
                .field("gadgetRef", FieldType::scalar("String"))
                .capabilities(CapabilitySet::read_only()),
        )
    }

    fn gadget_subgraph() -> SubgraphDescriptor {
        SubgraphDescriptor::new("b").entity(
            Entity::new("Gadget", store())
                .field("id", FieldType::scalar("String").required())
                .capabilities(CapabilitySet::read_only()),
        )
    }

    fn widget_gadget_relationship() -> RelationshipConfig {
        RelationshipConfig::new(
            "gadget",
            EntityRef::new("a", "Widget"),
            EntityRef::new("b", "Gadget"),
            FieldPath::parse("gadgetRef").unwrap(),
            FieldPath::parse("metadata.id").unwrap(),
        )
    }

    #[test]
    fn test_duplicate_namespace_fails() {
        let result = compose(
            &[widget_subgraph(), widget_subgraph()],
            &RelationshipRegistry::new(),
        );
        assert_eq!(result.unwrap_err(), ComposeError::DuplicateNamespace("a".into()));
    }

    #[test]
    fn test_empty_namespace_fails() {
        let result = compose(&[SubgraphDescriptor::new("")], &RelationshipRegistry::new());
        assert_eq!(result.unwrap_err(), ComposeError::EmptyNamespace);
    }

    #[test]
    fn test_distinct_namespaces_prefix_every_root_field() {
        let schema = compose(
            &[widget_subgraph(), gadget_subgraph()],
            &RelationshipRegistry::new(),
        )
        .unwrap();

        for (field, route) in schema.routing_table() {
            assert!(
                field.starts_with(&format!("{}_", route.entity.namespace)),
                "root field '{field}' is not namespace-prefixed"
            );
        }
        assert!(schema.route("a_getWidget").is_some());
        assert!(schema.route("a_listWidgets").is_some());
        assert!(schema.route("b_getGadget").is_some());
    }

    #[test]
    fn test_absent_capability_generates_no_route() {
        let descriptor = SubgraphDescriptor::new("a").entity(
            Entity::new("Widget", store())
                .field("id", FieldType::scalar("String"))
                .capabilities(CapabilitySet::GET),
        );
        let schema = compose(&[descriptor], &RelationshipRegistry::new()).unwrap();

        assert!(schema.route("a_getWidget").is_some());
        assert!(schema.route("a_listWidgets").is_none());
        assert!(schema.route("a_createWidget").is_none());
        assert!(schema.route("a_updateWidget").is_none());
        assert!(schema.route("a_deleteWidget").is_none());
    }

    #[test]
    fn test_declared_capability_must_be_backed_by_adapter() {
        let read_only: Arc<dyn EntityStore> =
            Arc::new(MemStore::with_capabilities(CapabilitySet::read_only()));
        let descriptor = SubgraphDescriptor::new("a").entity(
            Entity::new("Widget", read_only)
                .capabilities(CapabilitySet::read_only() | CapabilitySet::CREATE),
        );

        let result = compose(&[descriptor], &RelationshipRegistry::new());
        assert_eq!(
            result.unwrap_err(),
            ComposeError::UnsupportedCapability {
                entity: EntityRef::new("a", "Widget"),
                operation: Operation::Create,
            }
        );
    }

    #[test]
    fn test_unknown_relationship_target_fails() {
        let mut relationships = RelationshipRegistry::new();
        relationships.register(widget_gadget_relationship());

        let result = compose(&[widget_subgraph()], &relationships);
        assert_eq!(
            result.unwrap_err(),
            ComposeError::UnknownTargetEntity(EntityRef::new("b", "Gadget"))
        );
    }

    #[test]
    fn test_unknown_relationship_source_fails() {
        let mut relationships = RelationshipRegistry::new();
        let mut config = widget_gadget_relationship();
        config.source = EntityRef::new("a", "Sprocket");
        relationships.register(config);

        let result = compose(&[widget_subgraph(), gadget_subgraph()], &relationships);
        assert_eq!(
            result.unwrap_err(),
            ComposeError::UnknownSourceEntity(EntityRef::new("a", "Sprocket"))
        );
    }

    #[test]
    fn test_field_collision_fails() {
        let mut relationships = RelationshipRegistry::new();
        let mut config = widget_gadget_relationship();
        config.field_name = "gadgetRef".into();
        relationships.register(config);

        let result = compose(&[widget_subgraph(), gadget_subgraph()], &relationships);
        assert_eq!(
            result.unwrap_err(),
            ComposeError::FieldCollision {
                entity: EntityRef::new("a", "Widget"),
                field: "gadgetRef".into(),
            }
        );
    }

    #[test_case(Cardinality::One, true => (false, true); "singular optional is nullable object")]
    #[test_case(Cardinality::One, false => (false, false); "singular required is non-null object")]
    #[test_case(Cardinality::Many, true => (true, true); "many is nullable list")]
    #[test_case(Cardinality::Many, false => (true, true); "many stays nullable even when required")]
    fn test_injected_field_type(cardinality: Cardinality, optional: bool) -> (bool, bool) {
        let mut config = widget_gadget_relationship();
        config.cardinality = cardinality;
        config.optional = optional;

        let ty = relationship_field_type(&config);
        let is_list = matches!(ty.kind, lattice_core::FieldKind::List(_));
        (is_list, ty.nullable)
    }

    #[test]
    fn test_relationship_injects_field() {
        let mut relationships = RelationshipRegistry::new();
        relationships.register(widget_gadget_relationship());

        let schema = compose(&[widget_subgraph(), gadget_subgraph()], &relationships).unwrap();
        let widget = schema
            .composed_type(&EntityRef::new("a", "Widget"))
            .unwrap();

        let field = widget.fields.get("gadget").expect("injected field");
        assert!(field.is_relationship());
        assert!(!widget.fields.get("gadgetRef").unwrap().is_relationship());
    }

    #[test]
    fn test_composition_is_idempotent() {
        let mut relationships = RelationshipRegistry::new();
        relationships.register(widget_gadget_relationship());
        let descriptors = [widget_subgraph(), gadget_subgraph()];

        let first = compose(&descriptors, &relationships).unwrap();
        let second = compose(&descriptors, &relationships).unwrap();

        assert_eq!(first.routing_table(), second.routing_table());
        let first_types: Vec<_> = first
            .type_table()
            .iter()
            .map(|(name, ty)| (name.clone(), ty.fields.keys().cloned().collect::<Vec<_>>()))
            .collect();
        let second_types: Vec<_> = second
            .type_table()
            .iter()
            .map(|(name, ty)| (name.clone(), ty.fields.keys().cloned().collect::<Vec<_>>()))
            .collect();
        assert_eq!(first_types, second_types);
    }

    #[test]
    fn test_composition_never_touches_backends() {
        let backend = Arc::new(MemStore::new());
        let descriptor = SubgraphDescriptor::new("a").entity(
            Entity::new("Widget", backend.clone() as Arc<dyn EntityStore>)
                .capabilities(CapabilitySet::read_only()),
        );

        compose(&[descriptor], &RelationshipRegistry::new()).unwrap();
        assert_eq!(backend.stats().total_calls(), 0);
    }
}
