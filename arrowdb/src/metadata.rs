//! JSON round-trip for the per-vector metadata map.
//!
//! The on-disk shape keys each metadata object by the stringified vector id:
//! `{ "<vectorID>": { "<key>": <int|float|string|bool>, ... }, ... }`.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use arrowdb_core::{ArrowError, ArrowResult, Metadata, VectorId};

/// Metadata file name inside a collection directory.
pub const METADATA_FILE_NAME: &str = "metadata.json";

/// Writes the metadata map, pretty-printed, ids serialized as strings in
/// ascending order.
///
/// # Errors
///
/// Returns `ArrowError::Io` on write failure.
pub(crate) fn write_metadata_file(
    path: &Path,
    metadata: &HashMap<VectorId, Metadata>,
) -> ArrowResult<()> {
    let by_string_id: BTreeMap<String, &Metadata> = metadata
        .iter()
        .map(|(id, values)| (id.to_string(), values))
        .collect();
    let text = serde_json::to_string_pretty(&by_string_id)
        .map_err(|error| ArrowError::internal(format!("failed to serialize metadata: {error}")))?;
    std::fs::write(path, text)?;
    Ok(())
}

/// Reads a metadata map written by [`write_metadata_file`].
///
/// # Errors
///
/// - `ArrowError::NotFound` if the file does not exist
/// - `ArrowError::Corruption` on unparseable JSON or a non-numeric id key
pub(crate) fn read_metadata_file(path: &Path) -> ArrowResult<HashMap<VectorId, Metadata>> {
    let text = std::fs::read_to_string(path).map_err(|error| {
        if error.kind() == std::io::ErrorKind::NotFound {
            ArrowError::not_found(format!("metadata file {}", path.display()))
        } else {
            ArrowError::Io(error)
        }
    })?;
    let by_string_id: HashMap<String, Metadata> = serde_json::from_str(&text).map_err(|error| {
        ArrowError::corruption(format!(
            "unparseable metadata file {}: {error}",
            path.display()
        ))
    })?;

    let mut metadata = HashMap::with_capacity(by_string_id.len());
    for (key, values) in by_string_id {
        let id: VectorId = key.parse().map_err(|_| {
            ArrowError::corruption(format!(
                "non-numeric vector id key {key:?} in {}",
                path.display()
            ))
        })?;
        metadata.insert(id, values);
    }
    Ok(metadata)
}
