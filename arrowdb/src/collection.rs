//! The collection coordinator: owns an ANN index, a metadata map, and an
//! optional WAL, and enforces the contract that every mutation is
//! logged-then-applied.
//!
//! A mutating call assigns the next LSN/TXID pair, appends the entry to the
//! WAL, fsyncs, and only then touches the index. A crash between the fsync
//! and the index apply is recovered by [`Collection::load`], which replays
//! every WAL entry past the last checkpoint.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use arrowdb_core::{
    ArrowError, ArrowResult, CollectionConfig, IndexOptions, Metadata, SearchHit, VectorId,
};
use arrowdb_index::AnnIndex;
use arrowdb_wal::{Entry, Header, OperationType, Wal, WAL_VERSION};
use tracing::{debug, warn};

use crate::dispatch;
use crate::manifest::{self, RecoveryMetadata, META_FILE_NAME};
use crate::metadata::{self, METADATA_FILE_NAME};

/// Index snapshot file name inside a collection directory.
pub const INDEX_FILE_NAME: &str = "index.bin";
/// WAL subdirectory name inside a collection directory.
pub const WAL_DIR_NAME: &str = "wal";

/// Per-vector outcome of a batch insert.
#[derive(Debug)]
pub struct InsertOutcome {
    pub id: VectorId,
    pub status: ArrowResult<()>,
}

/// Result of [`Collection::insert_batch`]: per-vector outcomes in input
/// order plus summary counts.
#[derive(Debug)]
pub struct BatchInsertResult {
    pub results: Vec<InsertOutcome>,
    pub success_count: usize,
    pub failure_count: usize,
}

/// A search hit joined with the vector's metadata. Vectors without metadata
/// get an empty map.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryHit {
    pub id: VectorId,
    pub score: f32,
    pub metadata: Metadata,
}

/// A named set of vectors sharing one dimension and metric.
///
/// All mutating operations are serialized by the caller (`&mut self`);
/// searches may run concurrently with other searches. With a persistence
/// path configured, every mutation is durable in the WAL before it is
/// applied, and [`Collection::save`] checkpoints the full state and empties
/// the log.
pub struct Collection {
    config: CollectionConfig,
    index: AnnIndex,
    metadata: HashMap<VectorId, Metadata>,
    wal: Option<Wal>,
    lsn_counter: u64,
    txid_counter: u64,
    last_persisted_lsn: u64,
    recovered_from_wal: bool,
    persistence_path: Option<PathBuf>,
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.config.name)
            .field("dimensions", &self.config.dimensions)
            .field("metric", &self.config.metric)
            .field("size", &self.index.size())
            .field("next_lsn", &self.lsn_counter)
            .field("persistent", &self.persistence_path.is_some())
            .finish_non_exhaustive()
    }
}

impl Collection {
    /// Creates an in-memory collection with default index options.
    ///
    /// # Errors
    ///
    /// Returns `ArrowError::InvalidArgument` for an invalid config.
    pub fn new(config: CollectionConfig) -> ArrowResult<Self> {
        Self::with_options(config, IndexOptions::default())
    }

    /// Creates an in-memory collection with custom index options.
    ///
    /// # Errors
    ///
    /// Returns `ArrowError::InvalidArgument` for invalid config or options.
    pub fn with_options(config: CollectionConfig, options: IndexOptions) -> ArrowResult<Self> {
        config.validate()?;
        let index = AnnIndex::new(config.dimensions, config.metric, options)?;
        Ok(Self {
            config,
            index,
            metadata: HashMap::new(),
            wal: None,
            lsn_counter: 1,
            txid_counter: 1,
            last_persisted_lsn: 0,
            recovered_from_wal: false,
            persistence_path: None,
        })
    }

    /// Creates a collection with WAL-backed durability rooted at `dir`.
    ///
    /// The WAL lives at `dir/wal/db.wal`; a fresh header is written if the
    /// file does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns config/options validation errors or `ArrowError::Io` from WAL
    /// initialization.
    pub fn with_persistence(
        config: CollectionConfig,
        options: IndexOptions,
        dir: impl Into<PathBuf>,
    ) -> ArrowResult<Self> {
        let mut collection = Self::with_options(config, options)?;
        let dir = dir.into();
        let wal = Wal::new(dir.join(WAL_DIR_NAME));
        if !wal.file_path().exists() {
            wal.write_header(&Header::new(unix_now()))?;
        }
        collection.wal = Some(wal);
        collection.persistence_path = Some(dir);
        Ok(collection)
    }

    // ── Accessors ───────────────────────────────────────────────────────

    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    #[must_use]
    pub const fn dimension(&self) -> u32 {
        self.config.dimensions
    }

    #[must_use]
    pub const fn metric(&self) -> arrowdb_core::DistanceMetric {
        self.config.metric
    }

    #[must_use]
    pub const fn config(&self) -> &CollectionConfig {
        &self.config
    }

    #[must_use]
    pub fn index_options(&self) -> IndexOptions {
        self.index.options()
    }

    /// Count of inserted vectors, tombstoned ones included.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.index.size()
    }

    /// The next LSN a mutation will be assigned.
    #[must_use]
    pub const fn current_lsn(&self) -> u64 {
        self.lsn_counter
    }

    /// The next TXID a mutation will be assigned.
    #[must_use]
    pub const fn current_txid(&self) -> u64 {
        self.txid_counter
    }

    /// True when the last [`Collection::load`] replayed WAL entries.
    #[must_use]
    pub const fn recovered_from_wal(&self) -> bool {
        self.recovered_from_wal
    }

    /// The WAL coordinator, when persistence is configured.
    #[must_use]
    pub const fn wal(&self) -> Option<&Wal> {
        self.wal.as_ref()
    }

    /// Metadata stored for `id`, if any.
    #[must_use]
    pub fn get_metadata(&self, id: VectorId) -> Option<&Metadata> {
        self.metadata.get(&id)
    }

    // ── Mutations ───────────────────────────────────────────────────────

    /// Inserts one vector: logged to the WAL, fsynced, then applied to the
    /// index. Re-inserting an id supersedes its previous vector.
    ///
    /// # Errors
    ///
    /// - `ArrowError::DimensionMismatch` before any state changes
    /// - `ArrowError::Io` on WAL failure; the index is not touched and the
    ///   counters are rolled back
    /// - index errors (capacity, non-finite values) after the entry is
    ///   durable; replay will retry the apply
    pub fn insert(&mut self, id: VectorId, vector: &[f32]) -> ArrowResult<()> {
        self.check_dimension(vector.len())?;

        let entry = Entry {
            op: OperationType::Insert,
            version: WAL_VERSION,
            lsn: self.lsn_counter,
            txid: self.txid_counter,
            vector_id: id,
            embedding: vector.to_vec(),
        };
        self.lsn_counter += 1;
        self.txid_counter += 1;

        if let Some(wal) = &self.wal {
            if let Err(error) = wal.log(&entry, false) {
                self.lsn_counter -= 1;
                self.txid_counter -= 1;
                return Err(error);
            }
        }
        self.index.insert(id, vector)
    }

    /// Inserts a batch with partial-success semantics.
    ///
    /// Dimensions are validated upfront; entries that fail validation
    /// consume no LSN/TXID. All valid entries are appended to the WAL in one
    /// batch with a single fsync, then applied to the index individually.
    ///
    /// # Errors
    ///
    /// Only a WAL failure aborts the whole batch; the speculatively assigned
    /// LSN/TXID counters are rolled back. Per-vector validation and index
    /// failures are reported in the returned [`BatchInsertResult`].
    #[allow(clippy::cast_possible_truncation)]
    pub fn insert_batch(
        &mut self,
        batch: &[(VectorId, Vec<f32>)],
    ) -> ArrowResult<BatchInsertResult> {
        let valid: Vec<bool> = batch
            .iter()
            .map(|(_, vector)| vector.len() as u32 == self.config.dimensions)
            .collect();

        let mut entries = Vec::with_capacity(batch.len());
        for ((id, vector), &is_valid) in batch.iter().zip(&valid) {
            if !is_valid {
                continue;
            }
            entries.push(Entry {
                op: OperationType::Insert,
                version: WAL_VERSION,
                lsn: self.lsn_counter,
                txid: self.txid_counter,
                vector_id: *id,
                embedding: vector.clone(),
            });
            self.lsn_counter += 1;
            self.txid_counter += 1;
        }

        if let Some(wal) = &self.wal {
            if let Err(error) = wal.log_batch(&entries) {
                // The buffered batch never became durable; hand the same
                // LSN/TXID range to the next caller.
                self.lsn_counter -= entries.len() as u64;
                self.txid_counter -= entries.len() as u64;
                return Err(error);
            }
        }

        let mut result = BatchInsertResult {
            results: Vec::with_capacity(batch.len()),
            success_count: 0,
            failure_count: 0,
        };
        for ((id, vector), &is_valid) in batch.iter().zip(&valid) {
            let status = if is_valid {
                self.index.insert(*id, vector)
            } else {
                Err(ArrowError::DimensionMismatch {
                    expected: self.config.dimensions,
                    found: vector.len() as u32,
                })
            };
            match status {
                Ok(()) => result.success_count += 1,
                Err(_) => result.failure_count += 1,
            }
            result.results.push(InsertOutcome { id: *id, status });
        }

        debug!(
            batch = batch.len(),
            ok = result.success_count,
            failed = result.failure_count,
            "batch insert"
        );
        Ok(result)
    }

    /// Removes a vector: logs a DELETE entry, tombstones the index slot, and
    /// erases the metadata entry.
    ///
    /// # Errors
    ///
    /// - `ArrowError::Io` on WAL failure (counters rolled back, no state
    ///   change)
    /// - `ArrowError::NotFound` if the id is not live in the index
    pub fn remove(&mut self, id: VectorId) -> ArrowResult<()> {
        let entry = Entry {
            op: OperationType::Delete,
            version: WAL_VERSION,
            lsn: self.lsn_counter,
            txid: self.txid_counter,
            vector_id: id,
            embedding: Vec::new(),
        };
        self.lsn_counter += 1;
        self.txid_counter += 1;

        if let Some(wal) = &self.wal {
            if let Err(error) = wal.log(&entry, false) {
                self.lsn_counter -= 1;
                self.txid_counter -= 1;
                return Err(error);
            }
        }

        self.index.mark_delete(id)?;
        self.metadata.remove(&id);
        Ok(())
    }

    /// Attaches metadata to a vector id. Memory-only: not WAL-logged,
    /// persisted at the next [`Collection::save`].
    pub fn set_metadata(&mut self, id: VectorId, metadata: Metadata) {
        self.metadata.insert(id, metadata);
    }

    /// Raises the index capacity bound. Never shrinks.
    pub fn reserve(&mut self, new_capacity: u64) {
        self.index.reserve(new_capacity);
    }

    // ── Queries ─────────────────────────────────────────────────────────

    /// Returns at most `k` nearest neighbors, best first. `ef` is the beam
    /// width (`ef >= k`; smaller values are raised).
    ///
    /// # Errors
    ///
    /// Returns `ArrowError::DimensionMismatch` for a wrong query length.
    pub fn search(&self, query: &[f32], k: u32, ef: u32) -> ArrowResult<Vec<SearchHit>> {
        self.index.search(query, k, ef)
    }

    /// [`Collection::search`] joined with per-vector metadata. Vectors
    /// without metadata yield an empty map.
    ///
    /// # Errors
    ///
    /// Returns `ArrowError::DimensionMismatch` for a wrong query length.
    pub fn query(&self, query: &[f32], k: u32, ef: u32) -> ArrowResult<Vec<QueryHit>> {
        let hits = self.index.search(query, k, ef)?;
        Ok(hits
            .into_iter()
            .map(|hit| QueryHit {
                metadata: self.metadata.get(&hit.id).cloned().unwrap_or_default(),
                id: hit.id,
                score: hit.score,
            })
            .collect())
    }

    /// Runs one search per query, fanning out over the worker pool.
    /// Results are returned in input order.
    ///
    /// # Errors
    ///
    /// Returns `ArrowError::DimensionMismatch` if any query has the wrong
    /// length (checked upfront, before any search runs).
    pub fn search_batch(
        &self,
        queries: &[Vec<f32>],
        k: u32,
        ef: u32,
    ) -> ArrowResult<Vec<Vec<SearchHit>>> {
        for query in queries {
            self.check_dimension(query.len())?;
        }
        dispatch::parallel_search(&self.index, queries, k, ef)
    }

    // ── Persistence ─────────────────────────────────────────────────────

    /// Checkpoints the collection into `dir`: writes `meta.json` (with
    /// recovery metadata and `cleanShutdown = true`), `index.bin`, and
    /// `metadata.json` (when non-empty), then truncates the WAL.
    ///
    /// After a successful save the on-disk index is authoritative and no
    /// WAL entry is needed for recovery.
    ///
    /// # Errors
    ///
    /// Returns `ArrowError::Io` on any write failure.
    pub fn save(&mut self, dir: &Path) -> ArrowResult<()> {
        std::fs::create_dir_all(dir)?;

        let recovery = RecoveryMetadata {
            last_persisted_lsn: self.lsn_counter.saturating_sub(1),
            last_persisted_txid: self.txid_counter.saturating_sub(1),
            clean_shutdown: true,
        };
        manifest::write_manifest(
            &dir.join(META_FILE_NAME),
            &self.config,
            self.index.options(),
            recovery,
        )?;
        self.index.save(&dir.join(INDEX_FILE_NAME))?;

        let metadata_path = dir.join(METADATA_FILE_NAME);
        if self.metadata.is_empty() {
            if metadata_path.exists() {
                std::fs::remove_file(&metadata_path)?;
            }
        } else {
            metadata::write_metadata_file(&metadata_path, &self.metadata)?;
        }

        if let Some(wal) = &self.wal {
            wal.truncate()?;
        }
        self.last_persisted_lsn = recovery.last_persisted_lsn;

        debug!(
            dir = %dir.display(),
            last_persisted_lsn = recovery.last_persisted_lsn,
            slots = self.index.size(),
            "checkpointed collection"
        );
        Ok(())
    }

    /// Loads a collection from a directory written by [`Collection::save`],
    /// then replays any WAL entries newer than the checkpoint.
    ///
    /// # Errors
    ///
    /// - `ArrowError::NotFound` for a missing directory, `meta.json`, or
    ///   `index.bin`
    /// - integrity errors from the snapshot or WAL parsers (strict replay)
    pub fn load(dir: &Path) -> ArrowResult<Self> {
        if !dir.is_dir() {
            return Err(ArrowError::not_found(format!(
                "collection directory {}",
                dir.display()
            )));
        }

        let (config, options, recovery) = manifest::read_manifest(&dir.join(META_FILE_NAME))?;
        let mut collection = Self::with_persistence(config, options, dir)?;

        collection.index.load(&dir.join(INDEX_FILE_NAME))?;

        let metadata_path = dir.join(METADATA_FILE_NAME);
        if metadata_path.exists() {
            collection.metadata = metadata::read_metadata_file(&metadata_path)?;
        }

        collection.last_persisted_lsn = recovery.last_persisted_lsn;
        collection.lsn_counter = recovery.last_persisted_lsn + 1;
        collection.txid_counter = recovery.last_persisted_txid + 1;

        collection.replay_wal(recovery.last_persisted_lsn)?;

        debug!(
            dir = %dir.display(),
            size = collection.index.size(),
            next_lsn = collection.lsn_counter,
            recovered = collection.recovered_from_wal,
            "loaded collection"
        );
        Ok(collection)
    }

    /// Saves to the configured persistence path, if any, and consumes the
    /// collection.
    ///
    /// # Errors
    ///
    /// Returns `ArrowError::Io` on save failure.
    pub fn close(mut self) -> ArrowResult<()> {
        if let Some(dir) = self.persistence_path.take() {
            self.save(&dir)?;
        }
        Ok(())
    }

    /// Replays WAL entries with `lsn > from_lsn` into the index.
    ///
    /// INSERT entries are applied without re-logging; a failed apply aborts
    /// recovery. DELETE entries tombstone the id (a miss is tolerated: the
    /// delete may already be reflected in the checkpoint) and erase its
    /// metadata. Transaction bracket types are ignored at this layer.
    fn replay_wal(&mut self, from_lsn: u64) -> ArrowResult<()> {
        let Some(wal) = &self.wal else {
            return Ok(());
        };

        let entries = match wal.read_all() {
            Ok(entries) => entries,
            // Nothing logged since the checkpoint.
            Err(ArrowError::Eof | ArrowError::NotFound { .. }) => return Ok(()),
            Err(error) => return Err(error),
        };

        let mut max_lsn = self.lsn_counter;
        let mut max_txid = self.txid_counter;
        let mut replayed = 0_u64;

        for entry in &entries {
            if entry.lsn <= from_lsn {
                continue;
            }
            max_lsn = max_lsn.max(entry.lsn + 1);
            max_txid = max_txid.max(entry.txid + 1);

            match entry.op {
                OperationType::Insert => {
                    self.index
                        .insert(entry.vector_id, &entry.embedding)
                        .map_err(|error| {
                            ArrowError::internal(format!(
                                "failed to replay INSERT for vector {}: {error}",
                                entry.vector_id
                            ))
                        })?;
                    replayed += 1;
                }
                OperationType::Delete => {
                    if self.index.mark_delete(entry.vector_id).is_err() {
                        warn!(
                            vector_id = entry.vector_id,
                            lsn = entry.lsn,
                            "replayed DELETE for an id that is not live"
                        );
                    }
                    self.metadata.remove(&entry.vector_id);
                    replayed += 1;
                }
                _ => {}
            }
        }

        self.lsn_counter = max_lsn;
        self.txid_counter = max_txid;
        if replayed > 0 {
            self.recovered_from_wal = true;
            debug!(replayed, next_lsn = max_lsn, "recovered from WAL");
        }
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn check_dimension(&self, len: usize) -> ArrowResult<()> {
        if len as u32 != self.config.dimensions {
            return Err(ArrowError::DimensionMismatch {
                expected: self.config.dimensions,
                found: len as u32,
            });
        }
        Ok(())
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ─── Tests ──────────────────────────────────────────────────────────────────
