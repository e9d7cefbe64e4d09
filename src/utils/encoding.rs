use crate::error::{IndexError, Result};
use std::io::{self, Write};

/// Write an i32 in little-endian format
pub fn write_i32_le<W: Write>(writer: &mut W, value: i32) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

/// Write a u32 in little-endian format
pub fn write_u32_le<W: Write>(writer: &mut W, value: u32) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

/// Write a u64 in little-endian format
pub fn write_u64_le<W: Write>(writer: &mut W, value: u64) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

/// Write a collection length as the format's signed 32-bit count
pub fn write_count_le<W: Write>(writer: &mut W, count: usize) -> io::Result<()> {
    let count = i32::try_from(count).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("count {} does not fit in an int32 field", count),
        )
    })?;
    write_i32_le(writer, count)
}

/// Bounds-checked little-endian cursor over an index buffer.
///
/// Every read that would run past the end of the buffer fails with
/// `MalformedSourceIndex` carrying the position of the short read.
pub struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn at(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(IndexError::malformed(
                self.pos,
                format!(
                    "truncated {}: need {} bytes, {} left",
                    what,
                    len,
                    self.remaining()
                ),
            ));
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn skip(&mut self, len: usize, what: &str) -> Result<()> {
        self.take(len, what).map(|_| ())
    }

    pub fn read_u32_le(&mut self, what: &str) -> Result<u32> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(self.take(4, what)?);
        Ok(u32::from_le_bytes(bytes))
    }

    pub fn read_i32_le(&mut self, what: &str) -> Result<i32> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(self.take(4, what)?);
        Ok(i32::from_le_bytes(bytes))
    }

    pub fn read_u64_le(&mut self, what: &str) -> Result<u64> {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(self.take(8, what)?);
        Ok(u64::from_le_bytes(bytes))
    }

    /// Read an int32 count field, rejecting negative values
    pub fn read_count(&mut self, what: &str) -> Result<usize> {
        let pos = self.pos;
        let value = self.read_i32_le(what)?;
        usize::try_from(value)
            .map_err(|_| IndexError::malformed(pos, format!("negative {}: {}", what, value)))
    }

    /// Skip `count` fixed-size records, checking the total fits
    pub fn skip_records(&mut self, count: usize, record_size: usize, what: &str) -> Result<()> {
        let len = count.checked_mul(record_size).ok_or_else(|| {
            IndexError::malformed(self.pos, format!("{} count {} overflows", what, count))
        })?;
        self.skip(len, what)
    }
}
