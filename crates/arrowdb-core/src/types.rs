use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{ArrowError, ArrowResult};

// ---------------------------------------------------------------------------
// Identifiers and metrics
// ---------------------------------------------------------------------------

/// Caller-chosen vector identifier, unique within a collection.
pub type VectorId = u64;

/// Distance metric a collection computes similarity under.
///
/// Chosen at collection creation and immutable afterwards. The metric
/// determines the score sign convention of search results: higher is always
/// better. Cosine assumes callers pass L2-normalized vectors; the index does
/// not renormalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Dot product of normalized vectors.
    Cosine,
    /// Negated squared Euclidean distance.
    L2,
    /// Raw dot product.
    InnerProduct,
}

// ---------------------------------------------------------------------------
// Collection configuration
// ---------------------------------------------------------------------------

/// Immutable configuration of a vector collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Collection name; doubles as the persistence subdirectory name.
    pub name: String,
    /// Dimension of every vector in the collection. Must be greater than zero.
    pub dimensions: u32,
    /// Similarity metric.
    pub metric: DistanceMetric,
}

impl CollectionConfig {
    /// Creates a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `ArrowError::InvalidArgument` if `dimensions` is zero or the
    /// name is empty.
    pub fn new(
        name: impl Into<String>,
        dimensions: u32,
        metric: DistanceMetric,
    ) -> ArrowResult<Self> {
        let config = Self {
            name: name.into(),
            dimensions,
            metric,
        };
        config.validate()?;
        Ok(config)
    }

    /// Re-validates a configuration, e.g. one deserialized from `meta.json`.
    ///
    /// # Errors
    ///
    /// Returns `ArrowError::InvalidArgument` on a zero dimension or empty name.
    pub fn validate(&self) -> ArrowResult<()> {
        if self.dimensions == 0 {
            return Err(ArrowError::invalid_argument("dimensions must be > 0"));
        }
        if self.name.is_empty() {
            return Err(ArrowError::invalid_argument(
                "collection name must not be empty",
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Index options
// ---------------------------------------------------------------------------

/// Default index capacity before `reserve` is required.
pub const DEFAULT_MAX_ELEMENTS: u64 = 1_000_000;
/// Default HNSW `M` (max connections per node). Targets ~91% recall@10 on
/// 100K vectors; smaller datasets can drop to 32 to save memory.
pub const DEFAULT_M: u32 = 64;
/// Default build-time beam width.
pub const DEFAULT_EF_CONSTRUCTION: u32 = 200;
/// Default query-time beam width.
pub const DEFAULT_EF_SEARCH: u32 = 200;

/// ANN construction and runtime parameters, immutable once the index exists.
///
/// Serialization matches the `hnsw` object of the `meta.json` schema;
/// `ef_search` is a runtime default and is not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexOptions {
    /// Capacity bound; inserts beyond it fail until `reserve` raises it.
    #[serde(rename = "maxElements")]
    pub max_elements: u64,
    /// Max connections per graph node.
    #[serde(rename = "M")]
    pub m: u32,
    /// Build-time beam width.
    #[serde(rename = "efConstruction")]
    pub ef_construction: u32,
    /// Default query-time beam width.
    #[serde(skip_serializing, default = "default_ef_search")]
    pub ef_search: u32,
}

fn default_ef_search() -> u32 {
    DEFAULT_EF_SEARCH
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            max_elements: DEFAULT_MAX_ELEMENTS,
            m: DEFAULT_M,
            ef_construction: DEFAULT_EF_CONSTRUCTION,
            ef_search: DEFAULT_EF_SEARCH,
        }
    }
}

impl IndexOptions {
    /// Validates the parameter ranges.
    ///
    /// # Errors
    ///
    /// Returns `ArrowError::InvalidArgument` for zero `max_elements`, `M`,
    /// `ef_construction`, or `ef_search`, or `M` above 256.
    pub fn validate(&self) -> ArrowResult<()> {
        if self.max_elements == 0 {
            return Err(ArrowError::invalid_argument("max_elements must be > 0"));
        }
        if self.m == 0 {
            return Err(ArrowError::invalid_argument("M must be > 0"));
        }
        if self.m > 256 {
            return Err(ArrowError::invalid_argument(format!(
                "M must be <= 256, got {}",
                self.m
            )));
        }
        if self.ef_construction == 0 {
            return Err(ArrowError::invalid_argument("ef_construction must be > 0"));
        }
        if self.ef_search == 0 {
            return Err(ArrowError::invalid_argument("ef_search must be > 0"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Search results
// ---------------------------------------------------------------------------

/// One ranked search result. Scores follow the metric's higher-is-better
/// convention.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Matched vector id.
    pub id: VectorId,
    /// Similarity score; larger is more similar.
    pub score: f32,
}

impl SearchHit {
    /// Descending, NaN-safe score ordering (NaN sorts last), ties broken by
    /// ascending id for determinism.
    #[must_use]
    pub fn cmp_by_score(&self, other: &Self) -> Ordering {
        score_key(other.score)
            .total_cmp(&score_key(self.score))
            .then_with(|| self.id.cmp(&other.id))
    }
}

fn score_key(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Scalar metadata value. No nested objects or arrays.
///
/// Serializes untagged so `metadata.json` values are plain JSON scalars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// Per-vector metadata: string keys to scalar values. Stored and returned
/// verbatim, never queried.
pub type Metadata = HashMap<String, MetadataValue>;
