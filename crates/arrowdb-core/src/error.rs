//! Unified error type covering every failure mode the library surfaces.
//!
//! Parse and codec functions never panic; every fallible operation returns
//! `ArrowResult`. Callers can fully recover from `DimensionMismatch` and
//! `NotFound`; `Io`, `Corruption`, and the integrity variants mean the
//! persistence state should be treated as quarantined.

/// Error taxonomy for ArrowDB operations.
///
/// The variants partition into input errors (`InvalidArgument`,
/// `DimensionMismatch`), existence errors (`NotFound`, `AlreadyExists`),
/// I/O (`Io`, `Eof`), integrity (`Corruption`, `ChecksumMismatch`,
/// `BadRecord`, `BadHeader`), version (`VersionMismatch`), and internal
/// invariant failures (`Internal`).
#[derive(Debug, thiserror::Error)]
pub enum ArrowError {
    /// A caller-supplied argument is out of contract.
    #[error("invalid argument: {detail}")]
    InvalidArgument {
        /// What was wrong with the argument.
        detail: String,
    },

    /// A named entity (collection, vector id, file) does not exist.
    #[error("{what} not found")]
    NotFound {
        /// Description of the missing entity.
        what: String,
    },

    /// A named entity already exists and cannot be created again.
    #[error("{what} already exists")]
    AlreadyExists {
        /// Description of the conflicting entity.
        what: String,
    },

    /// The on-disk state requests a capability this build does not provide.
    #[error("unsupported: {what}")]
    Unimplemented {
        /// The unsupported capability.
        what: String,
    },

    /// Vector or query length differs from the collection dimension.
    #[error("dimension mismatch: expected {expected}, got {found}")]
    DimensionMismatch {
        /// Dimension the collection was created with.
        expected: u32,
        /// Dimension of the offending vector.
        found: u32,
    },

    /// Wraps `std::io::Error` from file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended before a complete value could be read.
    #[error("unexpected end of stream")]
    Eof,

    /// On-disk state is structurally damaged beyond a single record.
    #[error("corruption detected: {detail}")]
    Corruption {
        /// Nature of the damage.
        detail: String,
    },

    /// A stored CRC-32 disagrees with the recomputed one.
    #[error("checksum mismatch in {what}: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// Which checksum failed (e.g. "WAL entry payload").
        what: &'static str,
        /// CRC read from disk.
        stored: u32,
        /// CRC recomputed over the bytes.
        computed: u32,
    },

    /// A record violates the wire format (bad type tag, oversized field).
    #[error("bad record: {detail}")]
    BadRecord {
        /// Which field was malformed.
        detail: String,
    },

    /// A file header violates the wire format (bad magic, truncated).
    #[error("bad header: {detail}")]
    BadHeader {
        /// Which header field was malformed.
        detail: String,
    },

    /// A file was written by an incompatible format version.
    #[error("version mismatch: expected v{expected}, found v{found}")]
    VersionMismatch {
        /// The version this build reads and writes.
        expected: u16,
        /// The version found on disk.
        found: u16,
    },

    /// An internal invariant failed; not recoverable by the caller.
    #[error("internal error: {detail}")]
    Internal {
        /// What went wrong.
        detail: String,
    },
}

impl ArrowError {
    pub fn invalid_argument(detail: impl Into<String>) -> Self {
        Self::InvalidArgument {
            detail: detail.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists { what: what.into() }
    }

    pub fn corruption(detail: impl Into<String>) -> Self {
        Self::Corruption {
            detail: detail.into(),
        }
    }

    pub fn bad_record(detail: impl Into<String>) -> Self {
        Self::BadRecord {
            detail: detail.into(),
        }
    }

    pub fn bad_header(detail: impl Into<String>) -> Self {
        Self::BadHeader {
            detail: detail.into(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal {
            detail: detail.into(),
        }
    }

    /// True for the integrity family of errors, after which persisted state
    /// should be considered quarantined.
    #[must_use]
    pub const fn is_integrity(&self) -> bool {
        matches!(
            self,
            Self::Corruption { .. }
                | Self::ChecksumMismatch { .. }
                | Self::BadRecord { .. }
                | Self::BadHeader { .. }
        )
    }
}

/// Convenience alias used throughout the ArrowDB crate hierarchy.
pub type ArrowResult<T> = Result<T, ArrowError>;
