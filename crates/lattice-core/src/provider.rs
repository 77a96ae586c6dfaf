//! Subgraph discovery.
//!
//! Enumeration yields providers that *optionally* expose a subgraph. The
//! probe is an explicit method returning present/absent rather than a
//! runtime type inspection; absence is a normal outcome, never an error.

use crate::schema::SubgraphDescriptor;

/// A discoverable provider that may expose a subgraph.
///
/// The gateway's discovery step calls [`subgraph`](Self::subgraph) on every
/// enumerated provider and registers whatever comes back, silently skipping
/// providers that return `None`.
pub trait SubgraphProvider: Send + Sync {
    /// Human-readable provider name, used only for logging.
    fn name(&self) -> &str;

    /// The capability probe: the subgraph this provider exposes, if any.
    fn subgraph(&self) -> Option<SubgraphDescriptor>;
}
