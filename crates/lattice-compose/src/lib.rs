//! # Lattice Compose
//!
//! Schema composition: merges N subgraph descriptors plus the relationship
//! registry into one [`ComposedSchema`] — a type table of prefixed composed
//! types (declared fields plus injected relationship fields) and a routing
//! table mapping prefixed root fields back to `(namespace, entity,
//! operation)`.
//!
//! Composition is pure: it validates, produces an immutable snapshot, and
//! never touches backends. Callers rebuild and atomically swap the snapshot
//! whenever subgraphs or relationships change.

pub mod compose;
pub mod error;
pub mod relationship;
pub mod schema;

pub use compose::compose;
pub use error::ComposeError;
pub use relationship::{Cardinality, RelationshipConfig, RelationshipRegistry};
pub use schema::{ComposedField, ComposedSchema, ComposedType, FieldBinding, Route};
