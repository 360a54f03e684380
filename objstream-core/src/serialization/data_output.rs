//! Data output traits and implementations for the object stream format.

use crate::error::{Result, StreamError};
use bytes::{BufMut, BytesMut};

/// Trait for writing primitive values in the object stream format.
///
/// All multi-byte values are written in big-endian byte order. Strings use the
/// modified UTF-8 encoding over UTF-16 code units with a 2-byte length prefix.
pub trait DataOutput {
    /// Writes a single byte (i8).
    fn write_byte(&mut self, v: i8) -> Result<()>;

    /// Writes a boolean as a single byte (0 for false, 1 for true).
    fn write_bool(&mut self, v: bool) -> Result<()>;

    /// Writes a UTF-16 code unit in big-endian order.
    fn write_char(&mut self, v: u16) -> Result<()>;

    /// Writes a 16-bit signed integer in big-endian order.
    fn write_short(&mut self, v: i16) -> Result<()>;

    /// Writes a 32-bit signed integer in big-endian order.
    fn write_int(&mut self, v: i32) -> Result<()>;

    /// Writes a 64-bit signed integer in big-endian order.
    fn write_long(&mut self, v: i64) -> Result<()>;

    /// Writes a 32-bit floating point in big-endian order.
    fn write_float(&mut self, v: f32) -> Result<()>;

    /// Writes a 64-bit floating point in big-endian order.
    fn write_double(&mut self, v: f64) -> Result<()>;

    /// Writes raw bytes without length prefix.
    fn write_bytes(&mut self, v: &[u8]) -> Result<()>;

    /// Writes a string in modified UTF-8 with a 2-byte length prefix.
    fn write_utf(&mut self, v: &str) -> Result<()> {
        let len = utf_length(v);
        if len > u16::MAX as usize {
            return Err(StreamError::corrupted(format!(
                "encoded string too long: {} bytes",
                len
            )));
        }
        let mut buf = Vec::with_capacity(len + 2);
        buf.put_u16(len as u16);
        encode_modified_utf8(v, &mut buf);
        self.write_bytes(&buf)
    }
}

/// Returns the number of bytes `s` occupies in modified UTF-8.
pub fn utf_length(s: &str) -> usize {
    s.encode_utf16()
        .map(|c| match c {
            0x0001..=0x007F => 1,
            0x0000 | 0x0080..=0x07FF => 2,
            _ => 3,
        })
        .sum()
}

/// Appends the modified UTF-8 encoding of `s` to `out`.
pub fn encode_modified_utf8(s: &str, out: &mut impl BufMut) {
    for c in s.encode_utf16() {
        match c {
            0x0001..=0x007F => out.put_u8(c as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.put_u8(0xC0 | ((c >> 6) & 0x1F) as u8);
                out.put_u8(0x80 | (c & 0x3F) as u8);
            }
            _ => {
                out.put_u8(0xE0 | ((c >> 12) & 0x0F) as u8);
                out.put_u8(0x80 | ((c >> 6) & 0x3F) as u8);
                out.put_u8(0x80 | (c & 0x3F) as u8);
            }
        }
    }
}

/// A buffer-based implementation of `DataOutput`.
#[derive(Debug)]
pub struct ObjectDataOutput {
    buffer: BytesMut,
}

impl ObjectDataOutput {
    /// Creates a new `ObjectDataOutput` with default capacity.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(256),
        }
    }

    /// Creates a new `ObjectDataOutput` with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Returns the written bytes as a slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the output and returns the written bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer.to_vec()
    }

    /// Returns the number of bytes written.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if no bytes have been written.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clears the buffer, removing all written data.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for ObjectDataOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl DataOutput for ObjectDataOutput {
    fn write_byte(&mut self, v: i8) -> Result<()> {
        self.buffer.put_i8(v);
        Ok(())
    }

    fn write_bool(&mut self, v: bool) -> Result<()> {
        self.buffer.put_u8(if v { 1 } else { 0 });
        Ok(())
    }

    fn write_char(&mut self, v: u16) -> Result<()> {
        self.buffer.put_u16(v);
        Ok(())
    }

    fn write_short(&mut self, v: i16) -> Result<()> {
        self.buffer.put_i16(v);
        Ok(())
    }

    fn write_int(&mut self, v: i32) -> Result<()> {
        self.buffer.put_i32(v);
        Ok(())
    }

    fn write_long(&mut self, v: i64) -> Result<()> {
        self.buffer.put_i64(v);
        Ok(())
    }

    fn write_float(&mut self, v: f32) -> Result<()> {
        self.buffer.put_f32(v);
        Ok(())
    }

    fn write_double(&mut self, v: f64) -> Result<()> {
        self.buffer.put_f64(v);
        Ok(())
    }

    fn write_bytes(&mut self, v: &[u8]) -> Result<()> {
        self.buffer.put_slice(v);
        Ok(())
    }
}
