//! ArrowDB: an embedded vector database with HNSW search and WAL-backed
//! durability.
//!
//! A host process links this library to store 32-bit float vectors together
//! with opaque per-vector metadata and retrieve the k nearest neighbors of a
//! query under Cosine, L2, or InnerProduct metrics. Every mutation is
//! appended and fsynced to a write-ahead log before it is applied, so a
//! crash can always be recovered into a state consistent with the log;
//! [`Collection::save`] checkpoints the full state and truncates the log.
//!
//! # Example
//!
//! ```no_run
//! use arrowdb::{ArrowDb, ClientOptions, CollectionConfig, DistanceMetric};
//!
//! # fn main() -> arrowdb::ArrowResult<()> {
//! let mut db = ArrowDb::open(ClientOptions::new("/var/lib/myapp/vectors"))?;
//! let docs = db.create_collection(CollectionConfig::new(
//!     "docs",
//!     384,
//!     DistanceMetric::Cosine,
//! )?)?;
//!
//! docs.insert(1, &vec![0.1; 384])?;
//! let hits = docs.search(&vec![0.1; 384], 10, 200)?;
//! assert_eq!(hits[0].id, 1);
//! db.close()?;
//! # Ok(())
//! # }
//! ```

pub mod collection;
pub mod db;
pub mod dispatch;
pub mod manifest;
pub mod metadata;

pub use arrowdb_core::{
    ArrowError, ArrowResult, CollectionConfig, DistanceMetric, IndexOptions, Metadata,
    MetadataValue, SearchHit, VectorId,
};
pub use arrowdb_index::AnnIndex;
pub use arrowdb_wal::Wal;

pub use collection::{
    BatchInsertResult, Collection, InsertOutcome, QueryHit, INDEX_FILE_NAME, WAL_DIR_NAME,
};
pub use db::{ArrowDb, ClientOptions};
pub use dispatch::MAX_SEARCH_WORKERS;
pub use manifest::{RecoveryMetadata, META_FILE_NAME};
pub use metadata::METADATA_FILE_NAME;
