//! `meta.json` read/write: collection config, index options, and recovery
//! metadata in one self-describing file.
//!
//! Example on-disk shape:
//!
//! ```json
//! {
//!   "name": "docs",
//!   "dimensions": 384,
//!   "metric": "Cosine",
//!   "dtype": "Float32",
//!   "idxType": "HNSW",
//!   "hnsw": { "maxElements": 1000000, "M": 64, "efConstruction": 200 },
//!   "recovery": {
//!     "lastPersistedLsn": 42,
//!     "lastPersistedTxid": 42,
//!     "cleanShutdown": true
//!   }
//! }
//! ```

use std::path::Path;

use arrowdb_core::{ArrowError, ArrowResult, CollectionConfig, IndexOptions};
use serde::{Deserialize, Serialize};

/// Manifest file name inside a collection directory.
pub const META_FILE_NAME: &str = "meta.json";

/// The only vector element type this build stores.
const DTYPE_FLOAT32: &str = "Float32";
/// The only index type this build provides.
const IDX_TYPE_HNSW: &str = "HNSW";

/// Recovery bookkeeping persisted alongside the index at checkpoint time.
///
/// `last_persisted_lsn` decides where WAL replay starts on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryMetadata {
    #[serde(rename = "lastPersistedLsn")]
    pub last_persisted_lsn: u64,
    #[serde(rename = "lastPersistedTxid")]
    pub last_persisted_txid: u64,
    #[serde(rename = "cleanShutdown")]
    pub clean_shutdown: bool,
}

impl Default for RecoveryMetadata {
    fn default() -> Self {
        Self {
            last_persisted_lsn: 0,
            last_persisted_txid: 0,
            clean_shutdown: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    name: String,
    dimensions: u32,
    metric: arrowdb_core::DistanceMetric,
    dtype: String,
    #[serde(rename = "idxType")]
    idx_type: String,
    hnsw: IndexOptions,
    #[serde(default)]
    recovery: RecoveryMetadata,
}

/// Writes `meta.json`, pretty-printed.
///
/// # Errors
///
/// Returns `ArrowError::Io` on write failure.
pub(crate) fn write_manifest(
    path: &Path,
    config: &CollectionConfig,
    options: IndexOptions,
    recovery: RecoveryMetadata,
) -> ArrowResult<()> {
    let manifest = Manifest {
        name: config.name.clone(),
        dimensions: config.dimensions,
        metric: config.metric,
        dtype: DTYPE_FLOAT32.to_owned(),
        idx_type: IDX_TYPE_HNSW.to_owned(),
        hnsw: options,
        recovery,
    };
    let text = serde_json::to_string_pretty(&manifest)
        .map_err(|error| ArrowError::internal(format!("failed to serialize manifest: {error}")))?;
    std::fs::write(path, text)?;
    Ok(())
}

/// Reads and validates `meta.json`.
///
/// # Errors
///
/// - `ArrowError::NotFound` if the file does not exist
/// - `ArrowError::Corruption` on unparseable JSON
/// - `ArrowError::Unimplemented` for a dtype or index type this build does
///   not provide
/// - `ArrowError::InvalidArgument` for out-of-range config values
pub(crate) fn read_manifest(
    path: &Path,
) -> ArrowResult<(CollectionConfig, IndexOptions, RecoveryMetadata)> {
    let text = std::fs::read_to_string(path).map_err(|error| {
        if error.kind() == std::io::ErrorKind::NotFound {
            ArrowError::not_found(format!("manifest {}", path.display()))
        } else {
            ArrowError::Io(error)
        }
    })?;
    let manifest: Manifest = serde_json::from_str(&text).map_err(|error| {
        ArrowError::corruption(format!(
            "unparseable manifest {}: {error}",
            path.display()
        ))
    })?;

    if manifest.dtype != DTYPE_FLOAT32 {
        return Err(ArrowError::Unimplemented {
            what: format!("dtype {:?}", manifest.dtype),
        });
    }
    if manifest.idx_type != IDX_TYPE_HNSW {
        return Err(ArrowError::Unimplemented {
            what: format!("index type {:?}", manifest.idx_type),
        });
    }

    let config = CollectionConfig {
        name: manifest.name,
        dimensions: manifest.dimensions,
        metric: manifest.metric,
    };
    config.validate()?;
    manifest.hnsw.validate()?;
    Ok((config, manifest.hnsw, manifest.recovery))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    use arrowdb_core::{DistanceMetric, DEFAULT_EF_SEARCH};

    use super::*;

    fn temp_path(label: &str) -> PathBuf {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "arrowdb-manifest-{label}-{}-{now}.json",
            std::process::id()
        ))
    }

    fn sample_config() -> CollectionConfig {
        CollectionConfig::new("docs", 128, DistanceMetric::Cosine).unwrap()
    }

    #[test]
    fn round_trip() {
        let path = temp_path("roundtrip");
        let options = IndexOptions {
            max_elements: 5000,
            m: 32,
            ef_construction: 150,
            ef_search: 75,
        };
        let recovery = RecoveryMetadata {
            last_persisted_lsn: 42,
            last_persisted_txid: 42,
            clean_shutdown: true,
        };
        write_manifest(&path, &sample_config(), options, recovery).unwrap();

        let (config, loaded_options, loaded_recovery) = read_manifest(&path).unwrap();
        assert_eq!(config.name, "docs");
        assert_eq!(config.dimensions, 128);
        assert_eq!(config.metric, DistanceMetric::Cosine);
        assert_eq!(loaded_options.max_elements, 5000);
        assert_eq!(loaded_options.m, 32);
        assert_eq!(loaded_options.ef_construction, 150);
        assert_eq!(
            loaded_options.ef_search, DEFAULT_EF_SEARCH,
            "ef_search is a runtime default, not persisted"
        );
        assert_eq!(loaded_recovery, recovery);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn schema_field_names_are_stable() {
        let path = temp_path("schema");
        write_manifest(
            &path,
            &sample_config(),
            IndexOptions::default(),
            RecoveryMetadata::default(),
        )
        .unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["dtype"], "Float32");
        assert_eq!(json["idxType"], "HNSW");
        assert_eq!(json["metric"], "Cosine");
        assert_eq!(json["hnsw"]["maxElements"], 1_000_000);
        assert_eq!(json["hnsw"]["M"], 64);
        assert_eq!(json["hnsw"]["efConstruction"], 200);
        assert_eq!(json["recovery"]["lastPersistedLsn"], 0);
        assert_eq!(json["recovery"]["cleanShutdown"], true);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = read_manifest(&temp_path("missing")).unwrap_err();
        assert!(matches!(err, ArrowError::NotFound { .. }));
    }

    #[test]
    fn unparseable_manifest_is_corruption() {
        let path = temp_path("garbage");
        std::fs::write(&path, "{not json").unwrap();
        let err = read_manifest(&path).unwrap_err();
        assert!(matches!(err, ArrowError::Corruption { .. }));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn unknown_dtype_is_unimplemented() {
        let path = temp_path("dtype");
        write_manifest(
            &path,
            &sample_config(),
            IndexOptions::default(),
            RecoveryMetadata::default(),
        )
        .unwrap();
        let text = std::fs::read_to_string(&path)
            .unwrap()
            .replace("Float32", "Float16");
        std::fs::write(&path, text).unwrap();

        let err = read_manifest(&path).unwrap_err();
        assert!(matches!(err, ArrowError::Unimplemented { .. }));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_recovery_section_defaults_to_clean() {
        let path = temp_path("no-recovery");
        let json = serde_json::json!({
            "name": "docs",
            "dimensions": 16,
            "metric": "L2",
            "dtype": "Float32",
            "idxType": "HNSW",
            "hnsw": { "maxElements": 100, "M": 16, "efConstruction": 50 }
        });
        std::fs::write(&path, serde_json::to_string(&json).unwrap()).unwrap();

        let (_, _, recovery) = read_manifest(&path).unwrap();
        assert_eq!(recovery, RecoveryMetadata::default());
        assert!(recovery.clean_shutdown);

        std::fs::remove_file(&path).ok();
    }
}
