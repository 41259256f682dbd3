//! Approximate nearest-neighbor index for ArrowDB.
//!
//! This crate wraps `hnsw_rs` behind an ArrowDB-native API: caller-chosen
//! 64-bit ids, lazy tombstone deletion, capacity enforcement, metric
//! selection, and single-artifact persistence.
//!
//! # Persistence
//!
//! [`AnnIndex::save`] stores the slot table and row-ordered vectors in one
//! snapshot file (see [`snapshot`]); [`AnnIndex::load`] rebuilds the ANN
//! graph from the slab and replaces the index state. The snapshot header
//! records dimension and metric, and loading a file that disagrees with the
//! live index is rejected rather than silently producing wrong results.

pub mod metric;
mod snapshot;

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use arrowdb_core::{ArrowError, ArrowResult, DistanceMetric, IndexOptions, SearchHit, VectorId};
use hnsw_rs::prelude::{DistDot, DistL2, Hnsw};
use tracing::debug;

pub use snapshot::{SNAPSHOT_MAGIC, SNAPSHOT_VERSION};

/// Maximum HNSW layer depth.
const MAX_LAYER: usize = 16;

/// Metric-selected HNSW graph.
///
/// Cosine and InnerProduct build over the dot-product space; L2 over the
/// Euclidean space. Neighbor candidates come from the graph; final scores
/// are always recomputed from the stored vectors, so the library's sign
/// convention never depends on the graph's internal distance.
enum Graph {
    Dot(Hnsw<'static, f32, DistDot>),
    L2(Hnsw<'static, f32, DistL2>),
}

impl Graph {
    fn build(
        metric: DistanceMetric,
        m: usize,
        capacity_hint: usize,
        ef_construction: usize,
    ) -> Self {
        let hint = capacity_hint.max(1);
        match metric {
            DistanceMetric::Cosine | DistanceMetric::InnerProduct => {
                Self::Dot(Hnsw::new(m, hint, MAX_LAYER, ef_construction, DistDot))
            }
            DistanceMetric::L2 => Self::L2(Hnsw::new(m, hint, MAX_LAYER, ef_construction, DistL2)),
        }
    }

    fn insert(&self, vector: &[f32], slot: usize) {
        match self {
            Self::Dot(graph) => graph.insert_slice((vector, slot)),
            Self::L2(graph) => graph.insert_slice((vector, slot)),
        }
    }

    fn insert_all(&self, vectors: &[Vec<f32>]) {
        if vectors.is_empty() {
            return;
        }
        let with_slots: Vec<(&Vec<f32>, usize)> = vectors.iter().enumerate().map(|(slot, vector)| (vector, slot)).collect();
        match self {
            Self::Dot(graph) => graph.parallel_insert(&with_slots),
            Self::L2(graph) => graph.parallel_insert(&with_slots),
        }
    }

    fn candidate_slots(&self, query: &[f32], knbn: usize, ef: usize) -> Vec<usize> {
        let neighbours = match self {
            Self::Dot(graph) => graph.search(query, knbn, ef),
            Self::L2(graph) => graph.search(query, knbn, ef),
        };
        neighbours.into_iter().map(|n| n.d_id).collect()
    }
}

/// HNSW index over fixed-dimension f32 vectors under a fixed metric.
///
/// Deletion is lazy: tombstoned slots stay physically present and are
/// filtered from search results. Re-inserting an existing id supersedes the
/// previous vector (the old slot is tombstoned). `size()` counts every slot
/// ever inserted, tombstoned ones included.
pub struct AnnIndex {
    graph: Graph,
    options: IndexOptions,
    dimension: u32,
    metric: DistanceMetric,
    /// Slot-ordered external ids.
    ids: Vec<VectorId>,
    /// Slot-ordered stored vectors; source of truth for scoring and saving.
    vectors: Vec<Vec<f32>>,
    tombstones: Vec<bool>,
    /// Live id to slot. Tombstoned and superseded ids are absent.
    slots: HashMap<VectorId, usize>,
    deleted: usize,
}

impl std::fmt::Debug for AnnIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnIndex")
            .field("dimension", &self.dimension)
            .field("metric", &self.metric)
            .field("slots", &self.ids.len())
            .field("deleted", &self.deleted)
            .field("capacity", &self.options.max_elements)
            .finish_non_exhaustive()
    }
}

impl AnnIndex {
    /// Creates an empty index.
    ///
    /// # Errors
    ///
    /// Returns `ArrowError::InvalidArgument` for a zero dimension or
    /// out-of-range index options.
    pub fn new(dimension: u32, metric: DistanceMetric, options: IndexOptions) -> ArrowResult<Self> {
        if dimension == 0 {
            return Err(ArrowError::invalid_argument("dimension must be > 0"));
        }
        options.validate()?;

        let graph = Graph::build(
            metric,
            options.m as usize,
            usize::try_from(options.max_elements).unwrap_or(usize::MAX),
            options.ef_construction as usize,
        );
        Ok(Self {
            graph,
            options,
            dimension,
            metric,
            ids: Vec::new(),
            vectors: Vec::new(),
            tombstones: Vec::new(),
            slots: HashMap::new(),
            deleted: 0,
        })
    }

    /// Inserts a vector, superseding any previous vector with the same id.
    ///
    /// # Errors
    ///
    /// - `ArrowError::DimensionMismatch` if the vector length is wrong
    /// - `ArrowError::InvalidArgument` if the vector has non-finite values
    ///   or capacity is exhausted (grow with [`AnnIndex::reserve`])
    #[allow(clippy::cast_possible_truncation)]
    pub fn insert(&mut self, id: VectorId, vector: &[f32]) -> ArrowResult<()> {
        if vector.len() as u32 != self.dimension {
            return Err(ArrowError::DimensionMismatch {
                expected: self.dimension,
                found: vector.len() as u32,
            });
        }
        if vector.iter().any(|value| !value.is_finite()) {
            return Err(ArrowError::invalid_argument(
                "vector values must all be finite",
            ));
        }
        if self.ids.len() as u64 >= self.options.max_elements {
            return Err(ArrowError::invalid_argument(format!(
                "index capacity exhausted (max_elements = {}); call reserve to grow",
                self.options.max_elements
            )));
        }

        if let Some(old_slot) = self.slots.remove(&id) {
            self.tombstones[old_slot] = true;
            self.deleted += 1;
        }

        let slot = self.ids.len();
        self.ids.push(id);
        self.vectors.push(vector.to_vec());
        self.tombstones.push(false);
        self.slots.insert(id, slot);
        self.graph.insert(vector, slot);
        Ok(())
    }

    /// Returns at most `k` live neighbors of `query`, best first.
    ///
    /// `ef` is the beam width; values below `k` are raised to `k`. Scores
    /// follow the metric's higher-is-better convention and are exact for the
    /// returned vectors.
    ///
    /// # Errors
    ///
    /// Returns `ArrowError::DimensionMismatch` if the query length is wrong.
    #[allow(clippy::cast_possible_truncation)]
    pub fn search(&self, query: &[f32], k: u32, ef: u32) -> ArrowResult<Vec<SearchHit>> {
        if query.len() as u32 != self.dimension {
            return Err(ArrowError::DimensionMismatch {
                expected: self.dimension,
                found: query.len() as u32,
            });
        }
        if k == 0 || self.ids.len() == self.deleted {
            return Ok(Vec::new());
        }

        // Ask the graph for enough candidates to survive tombstone filtering.
        let knbn = (k as usize + self.deleted).min(self.ids.len());
        let ef_effective = (ef as usize).max(knbn).max(1);

        let start = Instant::now();
        let candidates = self.graph.candidate_slots(query, knbn, ef_effective);

        let mut hits = Vec::with_capacity(candidates.len());
        for slot in candidates {
            if self.tombstones.get(slot).copied().unwrap_or(true) {
                continue;
            }
            hits.push(SearchHit {
                id: self.ids[slot],
                score: metric::score(self.metric, query, &self.vectors[slot]),
            });
        }
        hits.sort_by(SearchHit::cmp_by_score);
        hits.truncate(k as usize);

        debug!(
            k,
            ef = ef_effective,
            returned = hits.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "ann search"
        );
        Ok(hits)
    }

    /// Tombstones a live id. Subsequent searches exclude it; the slot stays
    /// physically present and `size()` does not decrement.
    ///
    /// # Errors
    ///
    /// Returns `ArrowError::NotFound` if the id was never inserted or is
    /// already tombstoned.
    pub fn mark_delete(&mut self, id: VectorId) -> ArrowResult<()> {
        match self.slots.remove(&id) {
            Some(slot) => {
                self.tombstones[slot] = true;
                self.deleted += 1;
                Ok(())
            }
            None => Err(ArrowError::not_found(format!("vector id {id}"))),
        }
    }

    /// Count of inserted elements, tombstoned ones included.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.ids.len() as u64
    }

    /// Count of live (searchable) elements.
    #[must_use]
    pub fn live_count(&self) -> u64 {
        (self.ids.len() - self.deleted) as u64
    }

    /// True when `id` is live in the index.
    #[must_use]
    pub fn contains(&self, id: VectorId) -> bool {
        self.slots.contains_key(&id)
    }

    #[must_use]
    pub const fn dimension(&self) -> u32 {
        self.dimension
    }

    #[must_use]
    pub const fn metric(&self) -> DistanceMetric {
        self.metric
    }

    #[must_use]
    pub const fn options(&self) -> IndexOptions {
        self.options
    }

    /// Current capacity bound.
    #[must_use]
    pub const fn capacity(&self) -> u64 {
        self.options.max_elements
    }

    /// Raises the capacity bound in place. Never shrinks.
    pub fn reserve(&mut self, new_capacity: u64) {
        if new_capacity > self.options.max_elements {
            debug!(
                from = self.options.max_elements,
                to = new_capacity,
                "growing index capacity"
            );
            self.options.max_elements = new_capacity;
        }
    }

    /// Persists the complete index as one snapshot artifact.
    ///
    /// # Errors
    ///
    /// Returns `ArrowError::Io` on write failure.
    pub fn save(&self, path: &Path) -> ArrowResult<()> {
        let start = Instant::now();
        let snap = snapshot::Snapshot {
            metric: self.metric,
            dimension: self.dimension,
            capacity: self.options.max_elements,
            ids: self.ids.clone(),
            tombstones: self.tombstones.clone(),
            vectors: self.vectors.clone(),
        };
        snapshot::write_snapshot(path, &snap)?;
        debug!(
            path = %path.display(),
            slots = self.ids.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "saved index snapshot"
        );
        Ok(())
    }

    /// Loads a snapshot, replacing the current index state.
    ///
    /// The graph is rebuilt from the stored vectors. The capacity bound
    /// becomes the larger of the current bound and the snapshot's.
    ///
    /// # Errors
    ///
    /// - `ArrowError::NotFound` / `ArrowError::Io` on file errors
    /// - integrity errors from the snapshot parser
    /// - `ArrowError::DimensionMismatch` if the snapshot dimension differs
    /// - `ArrowError::InvalidArgument` if the snapshot metric differs
    pub fn load(&mut self, path: &Path) -> ArrowResult<()> {
        let start = Instant::now();
        let snap = snapshot::read_snapshot(path)?;

        if snap.dimension != self.dimension {
            return Err(ArrowError::DimensionMismatch {
                expected: self.dimension,
                found: snap.dimension,
            });
        }
        if snap.metric != self.metric {
            return Err(ArrowError::invalid_argument(format!(
                "snapshot metric {:?} does not match index metric {:?}",
                snap.metric, self.metric
            )));
        }

        let capacity = self
            .options
            .max_elements
            .max(snap.capacity)
            .max(snap.ids.len() as u64);
        self.options.max_elements = capacity;

        let graph = Graph::build(
            self.metric,
            self.options.m as usize,
            usize::try_from(capacity).unwrap_or(usize::MAX),
            self.options.ef_construction as usize,
        );
        graph.insert_all(&snap.vectors);

        let mut slots = HashMap::new();
        let mut deleted = 0;
        for (slot, (&id, &tombstoned)) in snap.ids.iter().zip(&snap.tombstones).enumerate() {
            if tombstoned {
                deleted += 1;
            } else {
                slots.insert(id, slot);
            }
        }

        self.graph = graph;
        self.ids = snap.ids;
        self.vectors = snap.vectors;
        self.tombstones = snap.tombstones;
        self.slots = slots;
        self.deleted = deleted;

        debug!(
            path = %path.display(),
            slots = self.ids.len(),
            deleted,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "loaded index snapshot"
        );
        Ok(())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
