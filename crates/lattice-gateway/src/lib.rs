//! # Lattice Gateway
//!
//! The owned gateway context. Instead of process-wide registries, an
//! embedder constructs one [`Gateway`] at startup, registers subgraph
//! descriptors and relationship declarations (directly or through provider
//! discovery), and executes queries against it.
//!
//! Every successful registration recomposes the schema and atomically swaps
//! the published snapshot; a failed composition leaves the previous
//! snapshot active. Executions hold the snapshot they started with, so
//! re-registration never tears a query in flight.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lattice_gateway::{Gateway, GatewayConfig};
//! use lattice_engine::{Selection, Variables};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(descriptor: lattice_core::SubgraphDescriptor) -> anyhow::Result<()> {
//! let gateway = Gateway::new(GatewayConfig::default());
//! gateway.register_subgraph(descriptor)?;
//!
//! let query = [Selection::field("a_getWidget").arg("name", "w1")];
//! let response = gateway
//!     .execute(&query, &Variables::new(), CancellationToken::new())
//!     .await?;
//! println!("{}", response.data);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod gateway;

pub use config::GatewayConfig;
pub use gateway::Gateway;
