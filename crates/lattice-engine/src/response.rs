//! Execution response.

use crate::error::QueryError;
use lattice_core::Value;
use serde::Serialize;

/// The result of one query execution: a data tree (possibly containing
/// nulls at failure points) and a parallel list of path-addressed errors.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub data: Value,
    pub errors: Vec<QueryError>,
}

impl Response {
    /// Whether any field degraded to null during resolution.
    pub fn is_partial(&self) -> bool {
        !self.errors.is_empty()
    }
}
