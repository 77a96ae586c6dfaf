//! Subgraph schema data model.
//!
//! A [`SubgraphDescriptor`] is the immutable output of an external
//! type-generation step: a namespace plus the entity types it owns. Each
//! [`Entity`] carries its field types, the capability set its storage
//! adapter supports, and a shared handle to that adapter.

use crate::store::EntityStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

bitflags::bitflags! {
    /// The subset of storage operations an entity's adapter supports.
    ///
    /// An absent capability means the corresponding root operation is
    /// omitted from the composed schema entirely, never exposed-but-erroring.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CapabilitySet: u8 {
        const GET    = 1 << 0;
        const LIST   = 1 << 1;
        const CREATE = 1 << 2;
        const UPDATE = 1 << 3;
        const DELETE = 1 << 4;
    }
}

impl CapabilitySet {
    /// Read-only capability pair, the common case for derived subgraphs.
    pub const fn read_only() -> Self {
        Self::GET.union(Self::LIST)
    }

    /// Whether this set covers `operation`.
    pub fn supports(&self, operation: Operation) -> bool {
        self.contains(operation.required_capability())
    }
}

/// A root operation routed to a storage adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Get,
    List,
    Create,
    Update,
    Delete,
}

impl Operation {
    /// All operations, in routing-table generation order.
    pub const ALL: [Self; 5] = [
        Self::Get,
        Self::List,
        Self::Create,
        Self::Update,
        Self::Delete,
    ];

    /// The capability an adapter must hold for this operation.
    pub fn required_capability(self) -> CapabilitySet {
        match self {
            Self::Get => CapabilitySet::GET,
            Self::List => CapabilitySet::LIST,
            Self::Create => CapabilitySet::CREATE,
            Self::Update => CapabilitySet::UPDATE,
            Self::Delete => CapabilitySet::DELETE,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Get => "get",
            Self::List => "list",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{name}")
    }
}

/// Namespace-qualified reference to an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub namespace: String,
    pub name: String,
}

impl EntityRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// The globally unique composed type name (`<namespace>_<Entity>`).
    pub fn type_name(&self) -> String {
        format!("{}_{}", self.namespace, self.name)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

/// The shape of one field: scalar, object, or list, plus nullability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldType {
    pub kind: FieldKind,
    pub nullable: bool,
}

/// Tagged field-type variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    /// A named scalar (`String`, `Int`, ...). The name is opaque to the
    /// core; it comes from the external type-mapping step.
    Scalar(String),
    /// An embedded or related object of the referenced entity type.
    Object(EntityRef),
    /// A list of the inner type.
    List(Box<FieldType>),
}

impl FieldType {
    /// A nullable scalar field.
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            kind: FieldKind::Scalar(name.into()),
            nullable: true,
        }
    }

    /// A nullable object field of the given entity type.
    pub fn object(entity: EntityRef) -> Self {
        Self {
            kind: FieldKind::Object(entity),
            nullable: true,
        }
    }

    /// A nullable list of the inner type.
    pub fn list(inner: FieldType) -> Self {
        Self {
            kind: FieldKind::List(Box::new(inner)),
            nullable: true,
        }
    }

    /// Mark this field non-nullable.
    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// One entity type inside a subgraph: fields, capability set, and the
/// storage adapter that backs it.
#[derive(Clone)]
pub struct Entity {
    pub name: String,
    pub fields: BTreeMap<String, FieldType>,
    pub capabilities: CapabilitySet,
    store: Arc<dyn EntityStore>,
}

impl Entity {
    /// Start building an entity bound to `store`. Fields and capabilities
    /// accumulate through the builder methods, then the value is immutable
    /// once handed to a descriptor.
    pub fn new(name: impl Into<String>, store: Arc<dyn EntityStore>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
            capabilities: CapabilitySet::empty(),
            store,
        }
    }

    /// Declare a field.
    pub fn field(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.insert(name.into(), ty);
        self
    }

    /// Declare the capability set this entity exposes.
    pub fn capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// The storage adapter backing this entity.
    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

/// An immutable, namespaced set of entity types owned by one provider.
#[derive(Debug, Clone)]
pub struct SubgraphDescriptor {
    pub namespace: String,
    pub entities: Vec<Entity>,
}

impl SubgraphDescriptor {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            entities: Vec::new(),
        }
    }

    /// Add an entity to the descriptor.
    pub fn entity(mut self, entity: Entity) -> Self {
        self.entities.push(entity);
        self
    }

    /// Look up an entity by name.
    pub fn find_entity(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_set_supports() {
        let caps = CapabilitySet::read_only();
        assert!(caps.supports(Operation::Get));
        assert!(caps.supports(Operation::List));
        assert!(!caps.supports(Operation::Create));
        assert!(!caps.supports(Operation::Delete));
    }

    #[test]
    fn test_entity_ref_type_name() {
        let entity = EntityRef::new("a", "Widget");
        assert_eq!(entity.type_name(), "a_Widget");
        assert_eq!(entity.to_string(), "a.Widget");
    }

    #[test]
    fn test_field_type_required() {
        let ty = FieldType::scalar("String").required();
        assert!(!ty.nullable);
        assert!(FieldType::scalar("String").nullable);
    }
}
