//! The gateway context.

use crate::config::GatewayConfig;
use lattice_compose::{compose, ComposeError, ComposedSchema, RelationshipConfig, RelationshipRegistry};
use lattice_core::{SubgraphDescriptor, SubgraphProvider};
use lattice_engine::{execute, ResolveError, Response, Selection, Variables};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Registered inputs plus the currently published schema snapshot.
struct GatewayState {
    descriptors: Vec<SubgraphDescriptor>,
    relationships: RelationshipRegistry,
    snapshot: Arc<ComposedSchema>,
}

/// The federated query gateway.
///
/// Construct once at startup and share (it is `Send + Sync`; embedders
/// typically hold it in an `Arc`). Registration recomposes and swaps the
/// snapshot under a short write lock; query execution clones the current
/// snapshot `Arc` and never blocks registration.
pub struct Gateway {
    state: RwLock<GatewayState>,
    config: GatewayConfig,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            state: RwLock::new(GatewayState {
                descriptors: Vec::new(),
                relationships: RelationshipRegistry::new(),
                snapshot: Arc::new(ComposedSchema::empty()),
            }),
            config,
        }
    }

    /// Register one subgraph descriptor and republish the schema.
    ///
    /// On composition failure nothing changes: the descriptor is not kept
    /// and the previous snapshot stays active.
    pub fn register_subgraph(&self, descriptor: SubgraphDescriptor) -> Result<(), ComposeError> {
        let mut state = self.state.write();
        let mut candidate = state.descriptors.clone();
        candidate.push(descriptor);

        let schema = compose(&candidate, &state.relationships)?;
        let namespace = candidate.last().map(|d| d.namespace.clone()).unwrap_or_default();
        state.descriptors = candidate;
        state.snapshot = Arc::new(schema);
        tracing::info!(%namespace, subgraphs = state.descriptors.len(), "registered subgraph");
        Ok(())
    }

    /// Register one relationship declaration and republish the schema.
    pub fn register_relationship(&self, config: RelationshipConfig) -> Result<(), ComposeError> {
        let mut state = self.state.write();
        let mut candidate = state.relationships.clone();
        candidate.register(config);

        let schema = compose(&state.descriptors, &candidate)?;
        state.relationships = candidate;
        state.snapshot = Arc::new(schema);
        tracing::info!(relationships = state.relationships.len(), "registered relationship");
        Ok(())
    }

    /// Probe every provider and register the subgraphs they expose.
    ///
    /// Providers without the subgraph capability are skipped, not errors.
    /// Returns how many subgraphs were registered.
    pub fn discover(&self, providers: &[&dyn SubgraphProvider]) -> Result<usize, ComposeError> {
        let mut registered = 0;
        for provider in providers {
            match provider.subgraph() {
                Some(descriptor) => {
                    self.register_subgraph(descriptor)?;
                    registered += 1;
                }
                None => {
                    tracing::debug!(provider = provider.name(), "provider exposes no subgraph; skipping");
                }
            }
        }
        Ok(registered)
    }

    /// The currently published schema snapshot.
    pub fn snapshot(&self) -> Arc<ComposedSchema> {
        self.state.read().snapshot.clone()
    }

    /// Execute a parsed selection tree against the current snapshot.
    ///
    /// The execution keeps the snapshot it starts with even if a
    /// registration swaps in a new one mid-flight.
    pub async fn execute(
        &self,
        selections: &[Selection],
        variables: &Variables,
        cancel: CancellationToken,
    ) -> Result<Response, ResolveError> {
        let snapshot = self.snapshot();
        execute(&snapshot, selections, variables, &self.config.engine, cancel).await
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new(GatewayConfig::default())
    }
}
