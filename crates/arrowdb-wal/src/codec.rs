//! Stream-oriented binary codec for fixed-width scalars and f32 arrays.
//!
//! The writer and reader each hold their stream by unique ownership. Reads
//! move through the reader monotonically; the only seeking operation is
//! [`BinaryReader::stream_len`], used at load time to discover end-of-file.
//! All multi-byte values are little-endian.

use std::io::{Read, Seek, SeekFrom, Write};

use arrowdb_core::{ArrowError, ArrowResult};

/// Little-endian binary writer over an owned stream.
#[derive(Debug)]
pub struct BinaryWriter<W: Write> {
    inner: W,
}

impl<W: Write> BinaryWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn write_u8(&mut self, value: u8) -> ArrowResult<()> {
        self.inner.write_all(&[value])?;
        Ok(())
    }

    pub fn write_u16(&mut self, value: u16) -> ArrowResult<()> {
        self.inner.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    pub fn write_u32(&mut self, value: u32) -> ArrowResult<()> {
        self.inner.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    pub fn write_u64(&mut self, value: u64) -> ArrowResult<()> {
        self.inner.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    /// Writes a contiguous f32 array with no length prefix.
    pub fn write_f32_slice(&mut self, values: &[f32]) -> ArrowResult<()> {
        let mut buf = Vec::with_capacity(values.len() * 4);
        for &value in values {
            buf.extend_from_slice(&value.to_le_bytes());
        }
        self.inner.write_all(&buf)?;
        Ok(())
    }

    pub fn flush(&mut self) -> ArrowResult<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// Consumes the writer and returns the underlying stream.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Little-endian binary reader over an owned stream.
#[derive(Debug)]
pub struct BinaryReader<R: Read + Seek> {
    inner: R,
}

impl<R: Read + Seek> BinaryReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    fn fill(&mut self, buf: &mut [u8]) -> ArrowResult<()> {
        self.inner.read_exact(buf).map_err(|error| {
            if error.kind() == std::io::ErrorKind::UnexpectedEof {
                ArrowError::Eof
            } else {
                ArrowError::Io(error)
            }
        })
    }

    pub fn read_u8(&mut self) -> ArrowResult<u8> {
        let mut buf = [0u8; 1];
        self.fill(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_u16(&mut self) -> ArrowResult<u16> {
        let mut buf = [0u8; 2];
        self.fill(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    pub fn read_u32(&mut self) -> ArrowResult<u32> {
        let mut buf = [0u8; 4];
        self.fill(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn read_u64(&mut self) -> ArrowResult<u64> {
        let mut buf = [0u8; 8];
        self.fill(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Reads `count` consecutive f32 values.
    pub fn read_f32_vec(&mut self, count: usize) -> ArrowResult<Vec<f32>> {
        let mut buf = vec![0u8; count * 4];
        self.fill(&mut buf)?;
        Ok(buf
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect())
    }

    /// Current byte offset from the start of the stream.
    pub fn position(&mut self) -> ArrowResult<u64> {
        Ok(self.inner.stream_position()?)
    }

    /// Total stream length in bytes. Restores the current position.
    pub fn stream_len(&mut self) -> ArrowResult<u64> {
        let current = self.inner.stream_position()?;
        let end = self.inner.seek(SeekFrom::End(0))?;
        if current != end {
            self.inner.seek(SeekFrom::Start(current))?;
        }
        Ok(end)
    }
}
