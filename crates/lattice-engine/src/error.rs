//! Resolution errors and the serializable error payload.

use crate::path::QueryPath;
use lattice_core::StoreError;
use serde::Serialize;

/// Errors raised during query execution.
///
/// Only [`UnknownField`](Self::UnknownField) (at the root),
/// [`UnknownVariable`](Self::UnknownVariable), and
/// [`Cancelled`](Self::Cancelled) abort the whole execution; every other
/// variant degrades to a null at the failing field plus a [`QueryError`]
/// entry in the response.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolveError {
    #[error("unknown root field '{0}'")]
    UnknownField(String),

    #[error("unknown variable '${0}'")]
    UnknownVariable(String),

    #[error("invalid arguments for '{field}': {reason}")]
    BadArguments { field: String, reason: String },

    #[error("required relationship '{field}' matched no target")]
    RequiredRelationshipMissing { field: String },

    #[error("storage error at {path}: {source}")]
    Store {
        path: QueryPath,
        #[source]
        source: StoreError,
    },

    #[error("query execution cancelled")]
    Cancelled,
}

/// One structured, path-addressed error in a partial-success response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryError {
    pub message: String,
    pub path: QueryPath,
}

impl QueryError {
    /// Build the user-visible payload for a degraded field. Storage errors
    /// keep only the adapter message; the path field already locates them.
    pub(crate) fn from_resolve(err: &ResolveError, path: QueryPath) -> Self {
        let message = match err {
            ResolveError::Store { source, .. } => source.to_string(),
            other => other.to_string(),
        };
        Self { message, path }
    }

    pub(crate) fn new(message: impl Into<String>, path: QueryPath) -> Self {
        Self {
            message: message.into(),
            path,
        }
    }
}
