//! Catalog access
//!
//! Read-only structured access to SKU rows plus an in-process vector index
//! used to re-rank retrieval results. Both are built once at startup and
//! are safe to share across tasks without locking.

pub mod store;
pub mod vector;

use thiserror::Error;

pub use store::CatalogStore;
pub use vector::{Embedder, VectorIndex};

/// Errors raised while building the catalog. Construction failures are
/// fatal; queries against a built store never fail.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog file {0} unreadable: {1}")]
    Unreadable(String, String),

    #[error("catalog file {0} malformed: {1}")]
    Malformed(String, String),

    #[error("catalog contains no usable rows")]
    Empty,

    #[error("duplicate model name {0}")]
    DuplicateModel(String),
}
