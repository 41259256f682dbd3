//! Shared types and error taxonomy for the ArrowDB embedded vector database.
//!
//! This crate defines the identifiers (`VectorId`), configuration types
//! (`CollectionConfig`, `IndexOptions`), result types (`SearchHit`), metadata
//! value union, and the unified `ArrowError` used across all ArrowDB crates.
//!
//! It has minimal external dependencies and is intended to be depended on by
//! every other crate in the workspace.

pub mod error;
pub mod types;

pub use error::{ArrowError, ArrowResult};
pub use types::{
    CollectionConfig, DistanceMetric, IndexOptions, Metadata, MetadataValue, SearchHit, VectorId,
    DEFAULT_EF_CONSTRUCTION, DEFAULT_EF_SEARCH, DEFAULT_M, DEFAULT_MAX_ELEMENTS,
};
