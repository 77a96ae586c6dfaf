//! Composition errors.
//!
//! All of these are fatal at registration time: the composition aborts and
//! any previously published schema snapshot remains active.

use lattice_core::{EntityRef, Operation};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComposeError {
    #[error("subgraph namespace must not be empty")]
    EmptyNamespace,

    #[error("duplicate subgraph namespace '{0}'")]
    DuplicateNamespace(String),

    #[error("duplicate entity '{entity}' in subgraph '{namespace}'")]
    DuplicateEntity { namespace: String, entity: String },

    #[error("entity '{entity}' declares capability for '{operation}' its adapter does not support")]
    UnsupportedCapability {
        entity: EntityRef,
        operation: Operation,
    },

    #[error("relationship source entity '{0}' is not registered")]
    UnknownSourceEntity(EntityRef),

    #[error("relationship target entity '{0}' is not registered")]
    UnknownTargetEntity(EntityRef),

    #[error("relationship field '{field}' collides with a declared field on '{entity}'")]
    FieldCollision { entity: EntityRef, field: String },
}
