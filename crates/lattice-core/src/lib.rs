//! # Lattice Core
//!
//! Core building blocks shared by every lattice crate: the opaque record
//! value model with dotted field paths, the subgraph schema data model
//! (descriptors, entities, field types, capability sets), and the storage
//! capability trait that backends implement.
//!
//! ## Design
//!
//! - **Values are opaque**: records are `serde_json::Value` trees addressed
//!   by [`FieldPath`]; the core never assumes a backend wire format.
//! - **Capabilities gate operations**: an entity declares the subset of
//!   {Get, List, Create, Update, Delete} its adapter supports; undeclared
//!   operations are never exposed.
//! - **Dependency inversion**: this crate defines the [`EntityStore`] and
//!   [`SubgraphProvider`] traits; backends and providers implement them and
//!   are injected by the embedder.

pub mod provider;
pub mod schema;
pub mod store;
pub mod value;

pub use provider::SubgraphProvider;
pub use schema::{
    CapabilitySet, Entity, EntityRef, FieldKind, FieldType, Operation, SubgraphDescriptor,
};
pub use store::{EntityStore, FieldMatch, ListFilter, StoreError, StoreResult};
pub use value::{FieldPath, FieldPathError, ScalarKey, Value};
