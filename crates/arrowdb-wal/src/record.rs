//! WAL record wire format: header and entry layouts, CRC computation, and
//! the strict parse/emit contracts.
//!
//! # File Layout
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │ Header (24 bytes)                   │
//! │   magic: 0x41574C01 u32 LE          │
//! │   version: u16 LE                   │
//! │   flags: u16 LE                     │
//! │   creation_time: u64 LE             │
//! │   header_crc32: u32 LE              │
//! │   padding: u32 LE (zero)            │
//! ├─────────────────────────────────────┤
//! │ Entry 0 (45 + 4·dimension bytes)    │
//! │   type: u16 LE (1..=6)              │
//! │   version: u16 LE                   │
//! │   lsn: u64 LE                       │
//! │   txid: u64 LE                      │
//! │   header_crc: u32 LE                │
//! │   payload_length: u32 LE (= 4·dim)  │
//! │   vector_id: u64 LE                 │
//! │   dimension: u32 LE (<= 65536)      │
//! │   padding: u8 (zero)                │
//! │   embedding: [f32; dimension] LE    │
//! │   payload_crc: u32 LE               │
//! ├─────────────────────────────────────┤
//! │ Entry 1 ...                         │
//! └─────────────────────────────────────┘
//! ```
//!
//! The header CRC covers the first 16 bytes (`magic ‖ version ‖ flags ‖
//! creation_time`). The entry header CRC covers `type ‖ version ‖ lsn ‖
//! txid`; the payload CRC covers the raw embedding bytes. All CRCs are
//! IEEE 802.3 CRC-32.

use std::io::{Read, Seek, Write};

use arrowdb_core::{ArrowError, ArrowResult, VectorId};
use crc32fast::Hasher as Crc32;

use crate::codec::{BinaryReader, BinaryWriter};

/// Magic number at the start of every WAL file: "AWL" + version byte 0x01.
pub const WAL_MAGIC: u32 = 0x41574C01;
/// Supported WAL format version.
pub const WAL_VERSION: u16 = 1;
/// Hard cap on the embedding dimension of a parsed entry. Defeats
/// memory-exhaustion on corrupt files: the cap is checked before the
/// embedding buffer is allocated.
pub const MAX_DIMENSION: u32 = 65_536;
/// On-wire header size in bytes.
pub const HEADER_WIRE_SIZE: u64 = 24;
/// On-wire size of an entry with an empty embedding.
pub const ENTRY_FIXED_WIRE_SIZE: u64 = 45;

const HEADER_CRC_SPAN: usize = 16;

// ─── Operation types ────────────────────────────────────────────────────────

/// Operation recorded by a WAL entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum OperationType {
    CommitTxn = 1,
    AbortTxn = 2,
    Insert = 3,
    Delete = 4,
    Update = 5,
    BatchInsert = 6,
}

impl OperationType {
    /// Decodes a wire value, rejecting anything outside 1..=6.
    ///
    /// # Errors
    ///
    /// Returns `ArrowError::BadRecord` for an unknown operation type.
    pub fn from_wire(value: u16) -> ArrowResult<Self> {
        match value {
            1 => Ok(Self::CommitTxn),
            2 => Ok(Self::AbortTxn),
            3 => Ok(Self::Insert),
            4 => Ok(Self::Delete),
            5 => Ok(Self::Update),
            6 => Ok(Self::BatchInsert),
            other => Err(ArrowError::bad_record(format!(
                "unknown operation type {other}"
            ))),
        }
    }

    #[must_use]
    pub const fn to_wire(self) -> u16 {
        self as u16
    }
}

// ─── Header ─────────────────────────────────────────────────────────────────

/// WAL file header. The CRC and trailing padding exist only on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: u32,
    pub version: u16,
    pub flags: u16,
    /// Seconds since the Unix epoch at file creation.
    pub creation_time: u64,
}

impl Header {
    #[must_use]
    pub fn new(creation_time: u64) -> Self {
        Self {
            magic: WAL_MAGIC,
            version: WAL_VERSION,
            flags: 0,
            creation_time,
        }
    }

    /// CRC-32 over the 16-byte prefix `magic ‖ version ‖ flags ‖
    /// creation_time` in wire layout.
    #[must_use]
    pub fn crc32(&self) -> u32 {
        let mut buf = [0u8; HEADER_CRC_SPAN];
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        buf[6..8].copy_from_slice(&self.flags.to_le_bytes());
        buf[8..16].copy_from_slice(&self.creation_time.to_le_bytes());
        crc32fast::hash(&buf)
    }
}

/// Writes a header in wire layout, computing the CRC from the live fields.
///
/// # Errors
///
/// Returns `ArrowError::Io` on write failure.
pub fn write_header<W: Write>(header: &Header, writer: &mut BinaryWriter<W>) -> ArrowResult<()> {
    writer.write_u32(header.magic)?;
    writer.write_u16(header.version)?;
    writer.write_u16(header.flags)?;
    writer.write_u64(header.creation_time)?;
    writer.write_u32(header.crc32())?;
    writer.write_u32(0)?; // padding
    Ok(())
}

/// Parses and validates a header.
///
/// # Errors
///
/// - `ArrowError::Eof` if fewer than 24 bytes remain
/// - `ArrowError::BadHeader` on a wrong magic number
/// - `ArrowError::ChecksumMismatch` when the stored CRC disagrees
/// - `ArrowError::VersionMismatch` for an unsupported version
pub fn parse_header<R: Read + Seek>(reader: &mut BinaryReader<R>) -> ArrowResult<Header> {
    let header = Header {
        magic: reader.read_u32()?,
        version: reader.read_u16()?,
        flags: reader.read_u16()?,
        creation_time: reader.read_u64()?,
    };
    let stored_crc = reader.read_u32()?;
    let _padding = reader.read_u32()?;

    if header.magic != WAL_MAGIC {
        return Err(ArrowError::bad_header(format!(
            "bad magic number {:#010x}",
            header.magic
        )));
    }
    let computed = header.crc32();
    if stored_crc != computed {
        return Err(ArrowError::ChecksumMismatch {
            what: "WAL header",
            stored: stored_crc,
            computed,
        });
    }
    if header.version != WAL_VERSION {
        return Err(ArrowError::VersionMismatch {
            expected: WAL_VERSION,
            found: header.version,
        });
    }
    Ok(header)
}

// ─── Entry ──────────────────────────────────────────────────────────────────

/// One logged mutation. CRCs, payload length, and dimension are derived from
/// the live fields at write time and never stored in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub op: OperationType,
    pub version: u16,
    /// Log sequence number, strictly increasing per collection.
    pub lsn: u64,
    /// Transaction id; advances in lockstep with `lsn`.
    pub txid: u64,
    pub vector_id: VectorId,
    /// Empty for DELETE entries.
    pub embedding: Vec<f32>,
}

impl Entry {
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn dimension(&self) -> u32 {
        self.embedding.len() as u32
    }

    #[must_use]
    pub fn payload_length(&self) -> u32 {
        self.dimension() * 4
    }

    /// CRC-32 over `type ‖ version ‖ lsn ‖ txid` in wire order.
    #[must_use]
    pub fn header_crc(&self) -> u32 {
        let mut hasher = Crc32::new();
        hasher.update(&self.op.to_wire().to_le_bytes());
        hasher.update(&self.version.to_le_bytes());
        hasher.update(&self.lsn.to_le_bytes());
        hasher.update(&self.txid.to_le_bytes());
        hasher.finalize()
    }

    /// CRC-32 over the raw embedding bytes.
    #[must_use]
    pub fn payload_crc(&self) -> u32 {
        let mut hasher = Crc32::new();
        for &value in &self.embedding {
            hasher.update(&value.to_le_bytes());
        }
        hasher.finalize()
    }

    /// Total on-wire size of this entry.
    #[must_use]
    pub fn wire_size(&self) -> u64 {
        ENTRY_FIXED_WIRE_SIZE + u64::from(self.payload_length())
    }
}

/// Writes an entry in wire layout. The header CRC, payload length, and
/// payload CRC are computed from the live fields; nothing the caller
/// precomputed is trusted.
///
/// # Errors
///
/// Returns `ArrowError::Io` on write failure.
pub fn write_entry<W: Write>(entry: &Entry, writer: &mut BinaryWriter<W>) -> ArrowResult<()> {
    writer.write_u16(entry.op.to_wire())?;
    writer.write_u16(entry.version)?;
    writer.write_u64(entry.lsn)?;
    writer.write_u64(entry.txid)?;
    writer.write_u32(entry.header_crc())?;
    writer.write_u32(entry.payload_length())?;
    writer.write_u64(entry.vector_id)?;
    writer.write_u32(entry.dimension())?;
    writer.write_u8(0)?; // padding
    writer.write_f32_slice(&entry.embedding)?;
    writer.write_u32(entry.payload_crc())?;
    Ok(())
}

/// Parses and validates one entry at the reader's current position.
///
/// # Errors
///
/// - `ArrowError::Eof` on a short read (partial record at the file tail)
/// - `ArrowError::BadRecord` for an unknown type, a dimension above
///   [`MAX_DIMENSION`] (checked before the embedding buffer is allocated),
///   or a payload length that disagrees with the dimension
/// - `ArrowError::ChecksumMismatch` when either CRC disagrees
/// - `ArrowError::Corruption` if the reader made no forward progress
pub fn parse_entry<R: Read + Seek>(reader: &mut BinaryReader<R>) -> ArrowResult<Entry> {
    let start = reader.position()?;

    let op = OperationType::from_wire(reader.read_u16()?)?;
    let version = reader.read_u16()?;
    let lsn = reader.read_u64()?;
    let txid = reader.read_u64()?;
    let stored_header_crc = reader.read_u32()?;
    let payload_length = reader.read_u32()?;
    let vector_id = reader.read_u64()?;
    let dimension = reader.read_u32()?;

    if dimension > MAX_DIMENSION {
        return Err(ArrowError::bad_record(format!(
            "dimension {dimension} exceeds the cap of {MAX_DIMENSION}"
        )));
    }
    if payload_length != dimension * 4 {
        return Err(ArrowError::bad_record(format!(
            "payload length {payload_length} disagrees with dimension {dimension}"
        )));
    }

    let _padding = reader.read_u8()?;
    let embedding = reader.read_f32_vec(dimension as usize)?;
    let stored_payload_crc = reader.read_u32()?;

    let entry = Entry {
        op,
        version,
        lsn,
        txid,
        vector_id,
        embedding,
    };

    let computed_header_crc = entry.header_crc();
    if stored_header_crc != computed_header_crc {
        return Err(ArrowError::ChecksumMismatch {
            what: "WAL entry header",
            stored: stored_header_crc,
            computed: computed_header_crc,
        });
    }
    let computed_payload_crc = entry.payload_crc();
    if stored_payload_crc != computed_payload_crc {
        return Err(ArrowError::ChecksumMismatch {
            what: "WAL entry payload",
            stored: stored_payload_crc,
            computed: computed_payload_crc,
        });
    }
    if entry.dimension() != dimension {
        return Err(ArrowError::bad_record(
            "decoded embedding length disagrees with the stored dimension",
        ));
    }

    let end = reader.position()?;
    if end == start {
        return Err(ArrowError::corruption(
            "entry parser made no forward progress",
        ));
    }

    Ok(entry)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn insert_entry(lsn: u64, embedding: Vec<f32>) -> Entry {
        Entry {
            op: OperationType::Insert,
            version: WAL_VERSION,
            lsn,
            txid: lsn,
            vector_id: lsn * 10,
            embedding,
        }
    }

    fn entry_bytes(entry: &Entry) -> Vec<u8> {
        let mut writer = BinaryWriter::new(Cursor::new(Vec::new()));
        write_entry(entry, &mut writer).unwrap();
        writer.into_inner().into_inner()
    }

    // ── Header ──────────────────────────────────────────────────────────

    #[test]
    fn default_header_has_golden_crc() {
        let header = Header::new(0);
        assert_eq!(header.magic, WAL_MAGIC);
        assert_eq!(header.version, 1);
        assert_eq!(header.flags, 0);
        assert_eq!(header.crc32(), 1_956_998_465);
    }

    #[test]
    fn header_wire_size_is_24_bytes() {
        let mut writer = BinaryWriter::new(Cursor::new(Vec::new()));
        write_header(&Header::new(7), &mut writer).unwrap();
        let bytes = writer.into_inner().into_inner();
        assert_eq!(bytes.len() as u64, HEADER_WIRE_SIZE);
    }

    #[test]
    fn header_round_trip() {
        let original = Header {
            magic: WAL_MAGIC,
            version: WAL_VERSION,
            flags: 0x1234,
            creation_time: 1_234_567_890,
        };
        let mut writer = BinaryWriter::new(Cursor::new(Vec::new()));
        write_header(&original, &mut writer).unwrap();
        let bytes = writer.into_inner().into_inner();

        let mut reader = BinaryReader::new(Cursor::new(bytes));
        let parsed = parse_header(&mut reader).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn header_bad_magic_is_rejected() {
        let mut writer = BinaryWriter::new(Cursor::new(Vec::new()));
        write_header(&Header::new(0), &mut writer).unwrap();
        let mut bytes = writer.into_inner().into_inner();
        bytes[0] ^= 0xFF;

        let mut reader = BinaryReader::new(Cursor::new(bytes));
        let err = parse_header(&mut reader).unwrap_err();
        assert!(matches!(err, ArrowError::BadHeader { .. }), "got {err:?}");
    }

    #[test]
    fn header_crc_corruption_is_detected() {
        let mut writer = BinaryWriter::new(Cursor::new(Vec::new()));
        write_header(&Header::new(42), &mut writer).unwrap();
        let mut bytes = writer.into_inner().into_inner();
        bytes[8] ^= 0x01; // creation_time byte

        let mut reader = BinaryReader::new(Cursor::new(bytes));
        let err = parse_header(&mut reader).unwrap_err();
        assert!(
            matches!(err, ArrowError::ChecksumMismatch { what, .. } if what == "WAL header"),
            "got {err:?}"
        );
    }

    #[test]
    fn header_future_version_is_rejected() {
        // A version-2 header with a self-consistent CRC still fails the
        // version gate.
        let header = Header {
            magic: WAL_MAGIC,
            version: 2,
            flags: 0,
            creation_time: 0,
        };
        let mut writer = BinaryWriter::new(Cursor::new(Vec::new()));
        write_header(&header, &mut writer).unwrap();

        let mut reader = BinaryReader::new(Cursor::new(writer.into_inner().into_inner()));
        let err = parse_header(&mut reader).unwrap_err();
        assert!(
            matches!(
                err,
                ArrowError::VersionMismatch {
                    expected: 1,
                    found: 2
                }
            ),
            "got {err:?}"
        );
    }

    #[test]
    fn truncated_header_is_eof() {
        let mut reader = BinaryReader::new(Cursor::new(vec![0x01, 0x4C, 0x57]));
        let err = parse_header(&mut reader).unwrap_err();
        assert!(matches!(err, ArrowError::Eof));
    }

    // ── Entry ───────────────────────────────────────────────────────────

    #[test]
    fn entry_wire_size_is_fixed_plus_payload() {
        let entry = insert_entry(1, vec![0.25, -0.5, 0.75]);
        let bytes = entry_bytes(&entry);
        assert_eq!(bytes.len() as u64, ENTRY_FIXED_WIRE_SIZE + 12);
        assert_eq!(bytes.len() as u64, entry.wire_size());
    }

    #[test]
    fn entry_round_trip() {
        let original = insert_entry(7, vec![1.0, 0.0, -3.5, 0.125]);
        let mut reader = BinaryReader::new(Cursor::new(entry_bytes(&original)));
        let parsed = parse_entry(&mut reader).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn delete_entry_with_empty_embedding_round_trips() {
        let original = Entry {
            op: OperationType::Delete,
            version: WAL_VERSION,
            lsn: 3,
            txid: 3,
            vector_id: 99,
            embedding: Vec::new(),
        };
        let bytes = entry_bytes(&original);
        assert_eq!(bytes.len() as u64, ENTRY_FIXED_WIRE_SIZE);

        let mut reader = BinaryReader::new(Cursor::new(bytes));
        let parsed = parse_entry(&mut reader).unwrap();
        assert_eq!(parsed, original);
        assert_eq!(parsed.dimension(), 0);
    }

    #[test]
    fn all_operation_types_round_trip() {
        for op in [
            OperationType::CommitTxn,
            OperationType::AbortTxn,
            OperationType::Insert,
            OperationType::Delete,
            OperationType::Update,
            OperationType::BatchInsert,
        ] {
            assert_eq!(OperationType::from_wire(op.to_wire()).unwrap(), op);
        }
        assert!(OperationType::from_wire(0).is_err());
        assert!(OperationType::from_wire(7).is_err());
    }

    #[test]
    fn payload_corruption_is_checksum_mismatch() {
        let entry = insert_entry(1, vec![0.1, 0.2, 0.3]);
        let mut bytes = entry_bytes(&entry);
        bytes[41] ^= 0x01; // first embedding byte

        let mut reader = BinaryReader::new(Cursor::new(bytes));
        let err = parse_entry(&mut reader).unwrap_err();
        assert!(
            matches!(err, ArrowError::ChecksumMismatch { what, .. } if what == "WAL entry payload"),
            "got {err:?}"
        );
    }

    #[test]
    fn lsn_corruption_is_header_checksum_mismatch() {
        let entry = insert_entry(1, vec![0.1]);
        let mut bytes = entry_bytes(&entry);
        bytes[4] ^= 0xFF; // low lsn byte

        let mut reader = BinaryReader::new(Cursor::new(bytes));
        let err = parse_entry(&mut reader).unwrap_err();
        assert!(
            matches!(err, ArrowError::ChecksumMismatch { what, .. } if what == "WAL entry header"),
            "got {err:?}"
        );
    }

    #[test]
    fn unknown_operation_type_is_bad_record() {
        let entry = insert_entry(1, vec![0.1]);
        let mut bytes = entry_bytes(&entry);
        bytes[0] = 0xEE;
        bytes[1] = 0xEE;

        let mut reader = BinaryReader::new(Cursor::new(bytes));
        let err = parse_entry(&mut reader).unwrap_err();
        assert!(matches!(err, ArrowError::BadRecord { .. }), "got {err:?}");
    }

    #[test]
    fn oversized_dimension_is_rejected_before_allocation() {
        let entry = insert_entry(1, vec![0.1]);
        let mut bytes = entry_bytes(&entry);
        let dimension: u32 = MAX_DIMENSION + 1;
        bytes[24..28].copy_from_slice(&(dimension * 4).to_le_bytes()); // payload_length
        bytes[36..40].copy_from_slice(&dimension.to_le_bytes()); // dimension

        let mut reader = BinaryReader::new(Cursor::new(bytes));
        let err = parse_entry(&mut reader).unwrap_err();
        assert!(
            matches!(err, ArrowError::BadRecord { detail } if detail.contains("cap")),
            "the cap must trip before any embedding read"
        );
    }

    #[test]
    fn payload_length_dimension_disagreement_is_bad_record() {
        let entry = insert_entry(1, vec![0.1, 0.2]);
        let mut bytes = entry_bytes(&entry);
        bytes[24..28].copy_from_slice(&999_u32.to_le_bytes()); // payload_length

        let mut reader = BinaryReader::new(Cursor::new(bytes));
        let err = parse_entry(&mut reader).unwrap_err();
        assert!(matches!(err, ArrowError::BadRecord { .. }), "got {err:?}");
    }

    #[test]
    fn truncated_entry_is_eof() {
        let entry = insert_entry(1, vec![0.1, 0.2, 0.3, 0.4]);
        let mut bytes = entry_bytes(&entry);
        bytes.truncate(bytes.len() - 9); // cut into the embedding

        let mut reader = BinaryReader::new(Cursor::new(bytes));
        let err = parse_entry(&mut reader).unwrap_err();
        assert!(matches!(err, ArrowError::Eof), "got {err:?}");
    }

    #[test]
    fn write_ignores_nothing_and_recomputes_crcs() {
        // Two writes of the same logical entry are byte-identical: every
        // derived field comes from the live values.
        let entry = insert_entry(5, vec![0.5, 0.25]);
        assert_eq!(entry_bytes(&entry), entry_bytes(&entry.clone()));
    }
}
