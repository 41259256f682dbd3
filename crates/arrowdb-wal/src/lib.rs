//! Write-ahead log for ArrowDB collections.
//!
//! Every mutating collection operation is appended here and fsynced before
//! it touches the in-memory index, so a crash can always be recovered by
//! replaying the log. Each record carries its own CRC-32s; there is no
//! trailer or file-level checksum. A checkpoint truncates the file back to
//! header-only.
//!
//! The crate splits into [`codec`] (stream-oriented little-endian I/O),
//! [`record`] (header/entry wire format and parse/emit contracts), and the
//! [`Wal`] coordinator owning the append-only file lifecycle.

pub mod codec;
pub mod record;

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use arrowdb_core::{ArrowError, ArrowResult};
use tracing::{debug, warn};

pub use codec::{BinaryReader, BinaryWriter};
pub use record::{
    parse_entry, parse_header, write_entry, write_header, Entry, Header, OperationType,
    ENTRY_FIXED_WIRE_SIZE, HEADER_WIRE_SIZE, MAX_DIMENSION, WAL_MAGIC, WAL_VERSION,
};

/// Fixed WAL file name inside the log directory.
pub const WAL_FILE_NAME: &str = "db.wal";

/// Owns the WAL file lifecycle for one collection.
///
/// The coordinator holds only the directory path; files are opened per
/// operation. One collection owns its log directory exclusively; opening
/// the same directory from two processes is undefined.
#[derive(Debug, Clone)]
pub struct Wal {
    dir: PathBuf,
}

impl Wal {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The log directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of the log file.
    #[must_use]
    pub fn file_path(&self) -> PathBuf {
        self.dir.join(WAL_FILE_NAME)
    }

    fn ensure_dir(&self) -> ArrowResult<()> {
        if self.dir.exists() && !self.dir.is_dir() {
            return Err(ArrowError::invalid_argument(format!(
                "WAL path {} exists but is not a directory",
                self.dir.display()
            )));
        }
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Appends one entry and fsyncs.
    ///
    /// With `reset`, the file is truncated and a fresh header written first.
    /// A failure may leave a trailing partial record; replay detects it at
    /// the tail and discards it.
    ///
    /// # Errors
    ///
    /// Returns `ArrowError::Io` on any file operation failure.
    pub fn log(&self, entry: &Entry, reset: bool) -> ArrowResult<()> {
        self.append(std::slice::from_ref(entry), reset)
    }

    /// Appends a batch of entries with a single buffer flush and a single
    /// fsync. A batch of N inserts costs one sync rather than N.
    ///
    /// # Errors
    ///
    /// Returns `ArrowError::Io` on failure; the caller must then roll back
    /// any LSN/TXID counters it assigned speculatively.
    pub fn log_batch(&self, entries: &[Entry]) -> ArrowResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.append(entries, false)
    }

    fn append(&self, entries: &[Entry], reset: bool) -> ArrowResult<()> {
        self.ensure_dir()?;
        let path = self.file_path();

        let file = if reset {
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&path)?
        } else {
            OpenOptions::new().create(true).append(true).open(&path)?
        };
        let needs_header = reset || file.metadata()?.len() == 0;

        let mut writer = BinaryWriter::new(BufWriter::new(file));
        if needs_header {
            write_header(&Header::new(unix_now()), &mut writer)?;
        }
        for entry in entries {
            write_entry(entry, &mut writer)?;
        }
        writer.flush()?;

        let file = writer
            .into_inner()
            .into_inner()
            .map_err(|error| ArrowError::Io(error.into_error()))?;
        file.sync_all()?;

        debug!(
            path = %path.display(),
            entries = entries.len(),
            reset,
            "appended WAL entries"
        );
        Ok(())
    }

    /// Rewrites the file as header-only and fsyncs (checkpoint operation).
    ///
    /// # Errors
    ///
    /// Returns `ArrowError::Io` on failure.
    pub fn truncate(&self) -> ArrowResult<()> {
        self.write_header(&Header::new(unix_now()))
    }

    /// Truncates the file to exactly the given header and fsyncs.
    ///
    /// # Errors
    ///
    /// Returns `ArrowError::Io` on failure.
    pub fn write_header(&self, header: &Header) -> ArrowResult<()> {
        self.ensure_dir()?;
        let path = self.file_path();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        let mut writer = BinaryWriter::new(BufWriter::new(file));
        write_header(header, &mut writer)?;
        writer.flush()?;
        let file = writer
            .into_inner()
            .into_inner()
            .map_err(|error| ArrowError::Io(error.into_error()))?;
        file.sync_all()?;
        debug!(path = %path.display(), "wrote WAL header");
        Ok(())
    }

    /// Parses and validates the header of the current log file.
    ///
    /// # Errors
    ///
    /// - `ArrowError::NotFound` if the file does not exist
    /// - `ArrowError::Eof` if the file is empty
    /// - header errors per [`record::parse_header`]
    pub fn load_header(&self) -> ArrowResult<Header> {
        let mut reader = self.open_reader()?;
        if reader.stream_len()? == 0 {
            return Err(ArrowError::Eof);
        }
        parse_header(&mut reader)
    }

    /// Scans the whole log: parses the header, then entries until
    /// end-of-file.
    ///
    /// Integrity failures (`BadRecord`, `ChecksumMismatch`, `BadHeader`,
    /// `VersionMismatch`, `Corruption`) abort the scan and propagate. An
    /// `Eof` mid-entry is a partial record at the tail from an interrupted
    /// append: entries parsed before it are returned, the tail is discarded.
    ///
    /// # Errors
    ///
    /// - `ArrowError::NotFound` if the file does not exist
    /// - `ArrowError::Eof` if the file is empty
    /// - `ArrowError::BadHeader` if the file is shorter than a header
    /// - any integrity error from the record parsers
    pub fn read_all(&self) -> ArrowResult<Vec<Entry>> {
        let path = self.file_path();
        let mut reader = self.open_reader()?;

        let len = reader.stream_len()?;
        if len == 0 {
            return Err(ArrowError::Eof);
        }
        if len < HEADER_WIRE_SIZE {
            return Err(ArrowError::bad_header(format!(
                "WAL file is {len} bytes, shorter than a header"
            )));
        }
        parse_header(&mut reader)?;

        let mut entries = Vec::new();
        loop {
            let position = reader.position()?;
            if position >= len {
                break;
            }
            match parse_entry(&mut reader) {
                Ok(entry) => entries.push(entry),
                Err(ArrowError::Eof) => {
                    warn!(
                        path = %path.display(),
                        offset = position,
                        entries_recovered = entries.len(),
                        "partial record at WAL tail, discarding"
                    );
                    break;
                }
                Err(error) => return Err(error),
            }
        }

        debug!(path = %path.display(), entries = entries.len(), "scanned WAL");
        Ok(entries)
    }

    fn open_reader(&self) -> ArrowResult<BinaryReader<BufReader<File>>> {
        let path = self.file_path();
        let file = File::open(&path).map_err(|error| {
            if error.kind() == std::io::ErrorKind::NotFound {
                ArrowError::not_found(format!("WAL file {}", path.display()))
            } else {
                ArrowError::Io(error)
            }
        })?;
        Ok(BinaryReader::new(BufReader::new(file)))
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ─── Tests ──────────────────────────────────────────────────────────────────
