//! # Lattice Engine
//!
//! The query router and resolver engine. Given a composed schema and an
//! externally-parsed field-selection tree, it routes each root selection to
//! the owning subgraph's storage adapter, then resolves child selections
//! depth by depth. Relationship fields discovered at one depth are collected
//! into a batch wave before any backend call for that depth is issued, which
//! bounds backend load independent of result-set size (the N+1 problem).
//!
//! ## Semantics
//!
//! - **Partial success**: a response always carries a data tree (with nulls
//!   at failure points) plus a list of path-addressed structured errors.
//!   Only an unknown root field, an unknown variable, or cancellation aborts
//!   the whole execution.
//! - **Per-element isolation**: one failing list element never aborts its
//!   siblings.
//! - **Cancellation**: every backend call is raced against the execution's
//!   cancellation token; on cancellation pending waves are abandoned and the
//!   execution returns an error, not a partial result.

pub(crate) mod batch;
pub mod config;
pub mod error;
pub mod path;
pub mod resolver;
pub mod response;
pub mod selection;

pub use config::EngineConfig;
pub use error::{QueryError, ResolveError};
pub use path::{PathSegment, QueryPath};
pub use resolver::execute;
pub use response::Response;
pub use selection::{Selection, Variables};
