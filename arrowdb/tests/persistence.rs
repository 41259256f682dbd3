//! End-to-end persistence and crash-recovery scenarios: checkpoint
//! round-trips, WAL replay after unclean shutdown, checkpoint truncation,
//! batch atomicity, and corruption handling.

use arrowdb::{
    ArrowError, Collection, CollectionConfig, DistanceMetric, IndexOptions, Metadata,
    MetadataValue, VectorId,
};
use tempfile::TempDir;

fn config(name: &str, dimensions: u32) -> CollectionConfig {
    CollectionConfig::new(name, dimensions, DistanceMetric::Cosine).unwrap()
}

fn small_options() -> IndexOptions {
    IndexOptions {
        max_elements: 10_000,
        m: 16,
        ef_construction: 100,
        ef_search: 100,
    }
}

fn lcg_next(state: &mut u64) -> u32 {
    *state = state
        .wrapping_mul(6_364_136_223_846_793_005)
        .wrapping_add(1);
    (*state >> 32) as u32
}

/// Deterministic L2-normalized vector for a (seed, dimension) pair.
fn normalized_vector(seed: u64, dimension: usize) -> Vec<f32> {
    let mut state = seed.wrapping_add(42);
    let mut out: Vec<f32> = (0..dimension)
        .map(|_| (lcg_next(&mut state) as f32 / u32::MAX as f32) * 2.0 - 1.0)
        .collect();
    let norm = out.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut out {
            *value /= norm;
        }
    }
    out
}

fn axis_vector(dimension: usize, axis: usize) -> Vec<f32> {
    let mut v = vec![0.0_f32; dimension];
    v[axis] = 1.0;
    v
}

#[test]
fn persistence_round_trip_preserves_top_hits() {
    let dir = TempDir::new().unwrap();
    let mut collection =
        Collection::with_persistence(config("s2", 64), small_options(), dir.path()).unwrap();

    for seed in 0..100 {
        collection
            .insert(seed, &normalized_vector(seed, 64))
            .unwrap();
    }
    let before: Vec<VectorId> = (0..10)
        .map(|seed| {
            collection
                .search(&normalized_vector(seed, 64), 1, 100)
                .unwrap()[0]
                .id
        })
        .collect();

    collection.save(dir.path()).unwrap();
    let loaded = Collection::load(dir.path()).unwrap();

    assert_eq!(loaded.size(), 100);
    for (seed, &expected) in before.iter().enumerate() {
        let hits = loaded
            .search(&normalized_vector(seed as u64, 64), 1, 100)
            .unwrap();
        assert_eq!(hits[0].id, expected, "top-1 changed for seed {seed}");
    }
}

#[test]
fn crash_recovery_replays_unsaved_inserts() {
    let dim = 32;
    let dir = TempDir::new().unwrap();

    // First session: 10 inserts, clean checkpoint.
    {
        let mut collection =
            Collection::with_persistence(config("s3", dim as u32), small_options(), dir.path())
                .unwrap();
        for axis in 0..10_u64 {
            collection
                .insert(axis, &axis_vector(dim, axis as usize))
                .unwrap();
        }
        collection.save(dir.path()).unwrap();
    }

    // Second session: 10 more inserts, then the process "crashes" (the
    // collection is dropped without save).
    {
        let mut collection = Collection::load(dir.path()).unwrap();
        assert!(!collection.recovered_from_wal());
        for axis in 10..20_u64 {
            collection
                .insert(axis, &axis_vector(dim, axis as usize))
                .unwrap();
        }
    }

    // Third session: the WAL brings the index back to 20 vectors.
    let collection = Collection::load(dir.path()).unwrap();
    assert_eq!(collection.size(), 20);
    assert!(collection.recovered_from_wal());
    assert_eq!(collection.current_lsn(), 21);
    assert_eq!(collection.current_txid(), 21);

    for axis in 0..20_u64 {
        let hits = collection
            .search(&axis_vector(dim, axis as usize), 1, 100)
            .unwrap();
        assert_eq!(hits[0].id, axis, "vector {axis} lost in recovery");
    }
}

#[test]
fn checkpoint_truncates_wal() {
    let dir = TempDir::new().unwrap();
    let mut collection =
        Collection::with_persistence(config("s4", 8), small_options(), dir.path()).unwrap();

    for id in 0..10_u64 {
        collection.insert(id, &normalized_vector(id, 8)).unwrap();
    }
    let wal = collection.wal().unwrap().clone();
    assert_eq!(wal.read_all().unwrap().len(), 10);

    collection.save(dir.path()).unwrap();
    assert!(wal.read_all().unwrap().is_empty());
    assert!(wal.load_header().is_ok(), "header must still validate");
}

#[test]
fn batch_insert_is_atomic_in_the_wal() {
    let dir = TempDir::new().unwrap();
    let mut collection =
        Collection::with_persistence(config("s5", 128), small_options(), dir.path()).unwrap();

    let batch = vec![
        (0_u64, vec![0.5_f32; 128]),
        (1, vec![0.5; 64]), // wrong dimension
        (2, vec![0.25; 128]),
    ];
    let result = collection.insert_batch(&batch).unwrap();

    assert_eq!(result.success_count, 2);
    assert_eq!(result.failure_count, 1);
    assert!(matches!(
        result.results[1].status,
        Err(ArrowError::DimensionMismatch { .. })
    ));
    assert_eq!(collection.size(), 2);

    let entries = collection.wal().unwrap().read_all().unwrap();
    assert_eq!(entries.len(), 2, "only valid entries reach the WAL");
    assert_eq!(entries[0].lsn, 1);
    assert_eq!(entries[1].lsn, 2, "LSNs are consecutive");
    assert_eq!(entries[0].vector_id, 0);
    assert_eq!(entries[1].vector_id, 2);
}

#[test]
fn corrupted_wal_payload_fails_load() {
    let dim = 3_usize;
    let dir = TempDir::new().unwrap();

    {
        let mut collection =
            Collection::with_persistence(config("s6", dim as u32), small_options(), dir.path())
                .unwrap();
        collection.save(dir.path()).unwrap();
        for id in 0..5_u64 {
            collection
                .insert(id, &normalized_vector(id, dim))
                .unwrap();
        }
        // Dropped without save: the five entries stay in the WAL.
    }

    // Flip one bit in the payload of the third entry.
    let wal_path = dir.path().join("wal").join("db.wal");
    let mut bytes = std::fs::read(&wal_path).unwrap();
    let header = 24_usize;
    let entry_size = 45 + 4 * dim;
    let payload_offset = header + 2 * entry_size + 41;
    bytes[payload_offset] ^= 0x01;
    std::fs::write(&wal_path, &bytes).unwrap();

    let err = Collection::load(dir.path()).unwrap_err();
    assert!(
        matches!(err, ArrowError::ChecksumMismatch { .. }),
        "got {err:?}"
    );
}

#[test]
fn clean_shutdown_load_does_not_replay() {
    let dir = TempDir::new().unwrap();
    let mut collection =
        Collection::with_persistence(config("clean", 16), small_options(), dir.path()).unwrap();
    for id in 0..25_u64 {
        collection.insert(id, &normalized_vector(id, 16)).unwrap();
    }
    let query = normalized_vector(3, 16);
    let before = collection.search(&query, 5, 100).unwrap();

    collection.save(dir.path()).unwrap();
    let loaded = Collection::load(dir.path()).unwrap();

    assert!(!loaded.recovered_from_wal());
    assert_eq!(loaded.size(), 25);

    let after = loaded.search(&query, 5, 100).unwrap();
    assert_eq!(before, after, "results must match exactly after reload");
}

#[test]
fn deletes_survive_crash_recovery() {
    let dim = 16;
    let dir = TempDir::new().unwrap();

    {
        let mut collection =
            Collection::with_persistence(config("del", dim as u32), small_options(), dir.path())
                .unwrap();
        for axis in 0..3_u64 {
            collection
                .insert(axis, &axis_vector(dim, axis as usize))
                .unwrap();
            let mut meta = Metadata::new();
            meta.insert("axis".to_owned(), MetadataValue::Int(axis as i64));
            collection.set_metadata(axis, meta);
        }
        collection.save(dir.path()).unwrap();
    }

    {
        let mut collection = Collection::load(dir.path()).unwrap();
        collection.remove(1).unwrap();
        // Crash without save.
    }

    let collection = Collection::load(dir.path()).unwrap();
    assert!(collection.recovered_from_wal());
    assert_eq!(collection.size(), 3, "tombstoned slot still counted");

    let hits = collection.search(&axis_vector(dim, 1), 3, 100).unwrap();
    assert!(!hits.iter().any(|hit| hit.id == 1), "deleted id resurfaced");
    assert!(collection.get_metadata(1).is_none());
    assert!(collection.get_metadata(0).is_some());
}

#[test]
fn lsn_and_txid_continue_across_restarts() {
    let dir = TempDir::new().unwrap();

    {
        let mut collection =
            Collection::with_persistence(config("lsn", 8), small_options(), dir.path()).unwrap();
        for id in 0..3_u64 {
            collection.insert(id, &normalized_vector(id, 8)).unwrap();
        }
        collection.save(dir.path()).unwrap();
    }

    {
        let mut collection = Collection::load(dir.path()).unwrap();
        assert_eq!(collection.current_lsn(), 4);
        assert_eq!(collection.current_txid(), 4);
        for id in 3..5_u64 {
            collection.insert(id, &normalized_vector(id, 8)).unwrap();
        }
        collection.save(dir.path()).unwrap();
    }

    let collection = Collection::load(dir.path()).unwrap();
    assert_eq!(collection.current_lsn(), 6);

    // The checkpoint recorded the counters in meta.json.
    let meta: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("meta.json")).unwrap())
            .unwrap();
    assert_eq!(meta["recovery"]["lastPersistedLsn"], 5);
    assert_eq!(meta["recovery"]["lastPersistedTxid"], 5);
    assert_eq!(meta["recovery"]["cleanShutdown"], true);
}

#[test]
fn metadata_round_trips_through_checkpoint() {
    let dir = TempDir::new().unwrap();
    let mut collection =
        Collection::with_persistence(config("meta", 4), small_options(), dir.path()).unwrap();

    collection.insert(10, &[1.0, 0.0, 0.0, 0.0]).unwrap();
    let mut meta = Metadata::new();
    meta.insert("title".to_owned(), MetadataValue::from("first"));
    meta.insert("score".to_owned(), MetadataValue::Float(0.9));
    collection.set_metadata(10, meta.clone());

    collection.save(dir.path()).unwrap();
    assert!(dir.path().join("metadata.json").exists());

    let loaded = Collection::load(dir.path()).unwrap();
    assert_eq!(loaded.get_metadata(10), Some(&meta));

    let hits = loaded.query(&[1.0, 0.0, 0.0, 0.0], 1, 50).unwrap();
    assert_eq!(hits[0].metadata, meta);
}

#[test]
fn empty_metadata_writes_no_file() {
    let dir = TempDir::new().unwrap();
    let mut collection =
        Collection::with_persistence(config("nometa", 4), small_options(), dir.path()).unwrap();
    collection.insert(1, &[1.0, 0.0, 0.0, 0.0]).unwrap();
    collection.save(dir.path()).unwrap();

    assert!(!dir.path().join("metadata.json").exists());
    let loaded = Collection::load(dir.path()).unwrap();
    assert!(loaded.get_metadata(1).is_none());
}

#[test]
fn close_checkpoints_to_the_persistence_path() {
    let dir = TempDir::new().unwrap();
    {
        let mut collection =
            Collection::with_persistence(config("close", 4), small_options(), dir.path())
                .unwrap();
        collection.insert(1, &[0.0, 1.0, 0.0, 0.0]).unwrap();
        collection.close().unwrap();
    }

    let loaded = Collection::load(dir.path()).unwrap();
    assert_eq!(loaded.size(), 1);
    assert!(!loaded.recovered_from_wal(), "close is a clean shutdown");
}

#[test]
fn in_memory_collection_has_no_wal() {
    let mut collection = Collection::new(config("mem", 4)).unwrap();
    assert!(collection.wal().is_none());
    collection.insert(1, &[1.0, 0.0, 0.0, 0.0]).unwrap();
    assert_eq!(collection.size(), 1);
}
