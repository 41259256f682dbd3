//! Binary snapshot format for the ANN index (`index.bin`).
//!
//! A snapshot is one self-describing artifact holding everything needed to
//! reconstruct the index: the slot table (external ids + tombstone flags)
//! and the row-ordered vector slab. The graph itself is rebuilt on load.
//!
//! # File Layout
//!
//! All multi-byte integers and floats are little-endian.
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │ Header (32 bytes)                         │
//! │   magic: b"ADBI"              (4 bytes)   │
//! │   version: u16                (2 bytes)   │
//! │   metric: u8                  (1 byte)    │
//! │   reserved: u8                (1 byte)    │
//! │   dimension: u32              (4 bytes)   │
//! │   capacity: u64               (8 bytes)   │
//! │   slot_count: u64             (8 bytes)   │
//! │   header_crc32: u32           (4 bytes)   │
//! ├───────────────────────────────────────────┤
//! │ Slot Table                                │
//! │   slot_count × 16 bytes each:             │
//! │     vector_id: u64            (8 bytes)   │
//! │     flags: u16                (2 bytes)   │
//! │     reserved: [u8; 6]         (6 bytes)   │
//! ├───────────────────────────────────────────┤
//! │ Vector Slab                               │
//! │   slot_count × dimension × 4 bytes        │
//! ├───────────────────────────────────────────┤
//! │ payload_crc32: u32            (4 bytes)   │
//! └───────────────────────────────────────────┘
//! ```
//!
//! `header_crc32` covers the 28 bytes before it; `payload_crc32` covers the
//! slot table and the slab.

use std::path::Path;

use arrowdb_core::{ArrowError, ArrowResult, DistanceMetric, VectorId};

/// Magic bytes at the start of every snapshot file.
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"ADBI";
/// Supported snapshot format version.
pub const SNAPSHOT_VERSION: u16 = 1;

const HEADER_SIZE: usize = 32;
const HEADER_CRC_SPAN: usize = 28;
const SLOT_RECORD_SIZE: usize = 16;
const SLOT_FLAG_TOMBSTONE: u16 = 0x0001;

/// Decoded snapshot contents.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Snapshot {
    pub metric: DistanceMetric,
    pub dimension: u32,
    pub capacity: u64,
    pub ids: Vec<VectorId>,
    pub tombstones: Vec<bool>,
    pub vectors: Vec<Vec<f32>>,
}

fn read_u64_le(data: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(buf)
}

fn metric_to_wire(metric: DistanceMetric) -> u8 {
    match metric {
        DistanceMetric::Cosine => 0,
        DistanceMetric::L2 => 1,
        DistanceMetric::InnerProduct => 2,
    }
}

fn metric_from_wire(value: u8, path: &Path) -> ArrowResult<DistanceMetric> {
    match value {
        0 => Ok(DistanceMetric::Cosine),
        1 => Ok(DistanceMetric::L2),
        2 => Ok(DistanceMetric::InnerProduct),
        other => Err(ArrowError::bad_header(format!(
            "unsupported metric byte {other} in {}",
            path.display()
        ))),
    }
}

/// Serializes a snapshot and writes it to `path` in one shot.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn write_snapshot(path: &Path, snapshot: &Snapshot) -> ArrowResult<()> {
    let slot_count = snapshot.ids.len();
    let slab_bytes = slot_count * snapshot.dimension as usize * 4;
    let mut data =
        Vec::with_capacity(HEADER_SIZE + slot_count * SLOT_RECORD_SIZE + slab_bytes + 4);

    data.extend_from_slice(&SNAPSHOT_MAGIC);
    data.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
    data.push(metric_to_wire(snapshot.metric));
    data.push(0); // reserved
    data.extend_from_slice(&snapshot.dimension.to_le_bytes());
    data.extend_from_slice(&snapshot.capacity.to_le_bytes());
    data.extend_from_slice(&(slot_count as u64).to_le_bytes());
    let header_crc = crc32fast::hash(&data[..HEADER_CRC_SPAN]);
    data.extend_from_slice(&header_crc.to_le_bytes());

    for (id, &tombstoned) in snapshot.ids.iter().zip(&snapshot.tombstones) {
        data.extend_from_slice(&id.to_le_bytes());
        let flags = if tombstoned { SLOT_FLAG_TOMBSTONE } else { 0 };
        data.extend_from_slice(&flags.to_le_bytes());
        data.extend_from_slice(&[0u8; 6]); // reserved
    }
    for vector in &snapshot.vectors {
        for &value in vector {
            data.extend_from_slice(&value.to_le_bytes());
        }
    }
    let payload_crc = crc32fast::hash(&data[HEADER_SIZE..]);
    data.extend_from_slice(&payload_crc.to_le_bytes());

    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, &data)?;
    Ok(())
}

/// Reads and validates a snapshot from `path`.
pub(crate) fn read_snapshot(path: &Path) -> ArrowResult<Snapshot> {
    let data = std::fs::read(path).map_err(|error| {
        if error.kind() == std::io::ErrorKind::NotFound {
            ArrowError::not_found(format!("index snapshot {}", path.display()))
        } else {
            ArrowError::Io(error)
        }
    })?;
    parse_snapshot(&data, path)
}

fn parse_snapshot(data: &[u8], path: &Path) -> ArrowResult<Snapshot> {
    if data.len() < HEADER_SIZE {
        return Err(ArrowError::bad_header(format!(
            "snapshot {} is {} bytes, shorter than a header",
            path.display(),
            data.len()
        )));
    }
    if data[..4] != SNAPSHOT_MAGIC {
        return Err(ArrowError::bad_header(format!(
            "bad magic bytes in {}",
            path.display()
        )));
    }
    let version = u16::from_le_bytes([data[4], data[5]]);
    if version != SNAPSHOT_VERSION {
        return Err(ArrowError::VersionMismatch {
            expected: SNAPSHOT_VERSION,
            found: version,
        });
    }
    let metric = metric_from_wire(data[6], path)?;
    // data[7] reserved
    let dimension = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);
    let capacity = read_u64_le(data, 12);
    let slot_count = read_u64_le(data, 20);

    let stored_header_crc = u32::from_le_bytes([data[28], data[29], data[30], data[31]]);
    let computed_header_crc = crc32fast::hash(&data[..HEADER_CRC_SPAN]);
    if stored_header_crc != computed_header_crc {
        return Err(ArrowError::ChecksumMismatch {
            what: "snapshot header",
            stored: stored_header_crc,
            computed: computed_header_crc,
        });
    }

    // Validate the declared geometry against the actual file length before
    // allocating anything sized by untrusted fields.
    let slot_count_usize = usize::try_from(slot_count)
        .map_err(|_| ArrowError::corruption("snapshot slot count exceeds address space"))?;
    let expected_len = (slot_count as u128) * (SLOT_RECORD_SIZE as u128)
        + (slot_count as u128) * (dimension as u128) * 4
        + (HEADER_SIZE as u128)
        + 4;
    if (data.len() as u128) != expected_len {
        return Err(ArrowError::corruption(format!(
            "snapshot {} is {} bytes but its header implies {}",
            path.display(),
            data.len(),
            expected_len
        )));
    }

    let payload_end = data.len() - 4;
    let stored_payload_crc = u32::from_le_bytes([
        data[payload_end],
        data[payload_end + 1],
        data[payload_end + 2],
        data[payload_end + 3],
    ]);
    let computed_payload_crc = crc32fast::hash(&data[HEADER_SIZE..payload_end]);
    if stored_payload_crc != computed_payload_crc {
        return Err(ArrowError::ChecksumMismatch {
            what: "snapshot payload",
            stored: stored_payload_crc,
            computed: computed_payload_crc,
        });
    }

    let mut ids = Vec::with_capacity(slot_count_usize);
    let mut tombstones = Vec::with_capacity(slot_count_usize);
    let mut cursor = HEADER_SIZE;
    for _ in 0..slot_count_usize {
        let id = read_u64_le(data, cursor);
        let flags = u16::from_le_bytes([data[cursor + 8], data[cursor + 9]]);
        ids.push(id);
        tombstones.push(flags & SLOT_FLAG_TOMBSTONE != 0);
        cursor += SLOT_RECORD_SIZE;
    }

    let dim = dimension as usize;
    let mut vectors = Vec::with_capacity(slot_count_usize);
    for _ in 0..slot_count_usize {
        let vector: Vec<f32> = data[cursor..cursor + dim * 4]
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        vectors.push(vector);
        cursor += dim * 4;
    }

    Ok(Snapshot {
        metric,
        dimension,
        capacity,
        ids,
        tombstones,
        vectors,
    })
}
