//! Binary encoding for segment and manifest files.
//!
//! [`StructWriter`] writes little-endian integers, varints and length-prefixed
//! strings while feeding every byte to a CRC32 hasher; [`StructWriter::finish`]
//! appends the checksum as a 4-byte trailer. [`verify_trailer`] checks that
//! trailer and hands back the body, which [`StructReader`] then decodes
//! without copying.

use std::io::Write;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use crc32fast::Hasher;

use crate::error::{FiledexError, Result};
use crate::util::varint::{decode_u64, encode_u64};

/// A checksumming writer for binary data.
pub struct StructWriter<W: Write> {
    writer: W,
    hasher: Hasher,
    position: u64,
}

impl<W: Write> StructWriter<W> {
    pub fn new(writer: W) -> Self {
        StructWriter {
            writer,
            hasher: Hasher::new(),
            position: 0,
        }
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_raw(&[value])
    }

    /// Write a u32 value (little-endian).
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_raw(&value.to_le_bytes())
    }

    /// Write a u64 value (little-endian).
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_raw(&value.to_le_bytes())
    }

    /// Write an i64 value (little-endian).
    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.write_raw(&value.to_le_bytes())
    }

    /// Write a variable-length integer.
    pub fn write_varint(&mut self, value: u64) -> Result<()> {
        self.write_raw(&encode_u64(value))
    }

    /// Write a string with length prefix.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Write raw bytes with length prefix.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.write_varint(value.len() as u64)?;
        self.write_raw(value)
    }

    /// Write raw bytes without length prefix.
    pub fn write_raw(&mut self, value: &[u8]) -> Result<()> {
        self.writer.write_all(value)?;
        self.hasher.update(value);
        self.position += value.len() as u64;
        Ok(())
    }

    /// Write an ascending integer array as count + deltas.
    pub fn write_delta_compressed_u32s(&mut self, values: &[u32]) -> Result<()> {
        self.write_varint(values.len() as u64)?;

        let mut previous = 0u32;
        for &value in values {
            self.write_varint(value.wrapping_sub(previous) as u64)?;
            previous = value;
        }

        Ok(())
    }

    /// Bytes written so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Append the CRC32 trailer and return the inner writer.
    pub fn finish(mut self) -> Result<W> {
        let checksum = self.hasher.finalize();
        self.writer.write_u32::<LittleEndian>(checksum)?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Check the CRC32 trailer of `data` and return the body it covers.
pub fn verify_trailer(data: &[u8]) -> Result<&[u8]> {
    if data.len() < 4 {
        return Err(FiledexError::corrupt("file too short for checksum"));
    }
    let (body, trailer) = data.split_at(data.len() - 4);
    let stored = LittleEndian::read_u32(trailer);
    let actual = crc32fast::hash(body);
    if stored != actual {
        return Err(FiledexError::corrupt(format!(
            "checksum mismatch: stored {stored:08x}, computed {actual:08x}"
        )));
    }
    Ok(body)
}

/// A zero-copy reader over an in-memory byte slice.
#[derive(Debug, Clone)]
pub struct StructReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> StructReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        StructReader { data, position: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .position
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                FiledexError::corrupt(format!(
                    "unexpected end of data reading {len} bytes at {}",
                    self.position
                ))
            })?;
        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read a u32 value (little-endian).
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    /// Read a u64 value (little-endian).
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    /// Read an i64 value (little-endian).
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(LittleEndian::read_i64(self.take(8)?))
    }

    /// Read a variable-length integer.
    pub fn read_varint(&mut self) -> Result<u64> {
        let (value, len) = decode_u64(&self.data[self.position.min(self.data.len())..])
            .map_err(|e| FiledexError::corrupt(format!("at {}: {e}", self.position)))?;
        self.position += len;
        Ok(value)
    }

    /// Read a varint that must fit a u32.
    pub fn read_varint_u32(&mut self) -> Result<u32> {
        let value = self.read_varint()?;
        u32::try_from(value).map_err(|_| FiledexError::corrupt(format!("value {value} exceeds u32")))
    }

    /// Read bytes with length prefix.
    pub fn read_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_varint()? as usize;
        self.take(len)
    }

    /// Read a string with length prefix.
    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|e| FiledexError::corrupt(format!("invalid UTF-8: {e}")))
    }

    /// Read an array written by [`StructWriter::write_delta_compressed_u32s`].
    pub fn read_delta_compressed_u32s(&mut self) -> Result<Vec<u32>> {
        let len = self.read_varint()? as usize;
        // Each value takes at least one byte.
        if len > self.remaining() {
            return Err(FiledexError::corrupt(format!("array length {len} out of range")));
        }
        let mut values = Vec::with_capacity(len);
        let mut previous = 0u32;
        for _ in 0..len {
            let value = previous.wrapping_add(self.read_varint_u32()?);
            values.push(value);
            previous = value;
        }
        Ok(values)
    }

    /// Advance without decoding.
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.take(len).map(|_| ())
    }

    pub fn position(&self) -> usize {
        self.position
    }

    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }
}
