//! Data input traits and implementations for the object stream format.

use crate::error::{Result, StreamError};
use bytes::Buf;
use std::io::Cursor;

/// Trait for reading primitive values from the object stream format.
///
/// All multi-byte values are read in big-endian byte order.
pub trait DataInput {
    /// Fills `buf` completely.
    fn read_fully(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Reads a single byte (i8).
    fn read_byte(&mut self) -> Result<i8> {
        let mut b = [0u8; 1];
        self.read_fully(&mut b)?;
        Ok(b[0] as i8)
    }

    /// Reads an unsigned byte.
    fn read_unsigned_byte(&mut self) -> Result<u8> {
        self.read_byte().map(|b| b as u8)
    }

    /// Reads a boolean from a single byte.
    fn read_bool(&mut self) -> Result<bool> {
        self.read_byte().map(|b| b != 0)
    }

    /// Reads a UTF-16 code unit in big-endian order.
    fn read_char(&mut self) -> Result<u16> {
        let mut b = [0u8; 2];
        self.read_fully(&mut b)?;
        Ok(u16::from_be_bytes(b))
    }

    /// Reads a 16-bit signed integer in big-endian order.
    fn read_short(&mut self) -> Result<i16> {
        self.read_char().map(|c| c as i16)
    }

    /// Reads a 16-bit unsigned integer in big-endian order.
    fn read_unsigned_short(&mut self) -> Result<u16> {
        self.read_char()
    }

    /// Reads a 32-bit signed integer in big-endian order.
    fn read_int(&mut self) -> Result<i32> {
        let mut b = [0u8; 4];
        self.read_fully(&mut b)?;
        Ok(i32::from_be_bytes(b))
    }

    /// Reads a 64-bit signed integer in big-endian order.
    fn read_long(&mut self) -> Result<i64> {
        let mut b = [0u8; 8];
        self.read_fully(&mut b)?;
        Ok(i64::from_be_bytes(b))
    }

    /// Reads a 32-bit floating point in big-endian order.
    fn read_float(&mut self) -> Result<f32> {
        self.read_int().map(|v| f32::from_bits(v as u32))
    }

    /// Reads a 64-bit floating point in big-endian order.
    fn read_double(&mut self) -> Result<f64> {
        self.read_long().map(|v| f64::from_bits(v as u64))
    }

    /// Reads the specified number of raw bytes.
    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_fully(&mut buf)?;
        Ok(buf)
    }

    /// Reads a modified UTF-8 string with a 2-byte length prefix.
    fn read_utf(&mut self) -> Result<String> {
        let len = self.read_unsigned_short()? as usize;
        let bytes = self.read_bytes(len)?;
        decode_modified_utf8(&bytes)
    }
}

/// Decodes modified UTF-8 into a `String`.
///
/// Heap strings are Rust `String`s, so a decoded sequence holding an unpaired
/// surrogate is rejected as `StreamCorrupted`.
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        match c >> 4 {
            0..=7 => {
                units.push(c as u16);
                i += 1;
            }
            12 | 13 => {
                let b2 = *bytes.get(i + 1).ok_or_else(|| malformed(i))?;
                if b2 & 0xC0 != 0x80 {
                    return Err(malformed(i + 1));
                }
                units.push((((c & 0x1F) as u16) << 6) | (b2 & 0x3F) as u16);
                i += 2;
            }
            14 => {
                let b2 = *bytes.get(i + 1).ok_or_else(|| malformed(i))?;
                let b3 = *bytes.get(i + 2).ok_or_else(|| malformed(i))?;
                if b2 & 0xC0 != 0x80 || b3 & 0xC0 != 0x80 {
                    return Err(malformed(i + 1));
                }
                units.push(
                    (((c & 0x0F) as u16) << 12) | (((b2 & 0x3F) as u16) << 6) | (b3 & 0x3F) as u16,
                );
                i += 3;
            }
            _ => return Err(malformed(i)),
        }
    }
    String::from_utf16(&units)
        .map_err(|e| StreamError::corrupted(format!("invalid UTF-16 in string: {}", e)))
}

fn malformed(at: usize) -> StreamError {
    StreamError::corrupted(format!("malformed input around byte {}", at))
}

/// A buffer-based implementation of `DataInput`.
#[derive(Debug)]
pub struct ObjectDataInput<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> ObjectDataInput<'a> {
    /// Creates a new `ObjectDataInput` from the given byte slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }

    /// Returns the number of bytes remaining to be read.
    pub fn remaining(&self) -> usize {
        self.cursor.remaining()
    }

    /// Returns the current position in the buffer.
    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    fn ensure_remaining(&self, n: usize) -> Result<()> {
        if self.cursor.remaining() < n {
            Err(StreamError::Eof)
        } else {
            Ok(())
        }
    }
}

impl DataInput for ObjectDataInput<'_> {
    fn read_fully(&mut self, buf: &mut [u8]) -> Result<()> {
        self.ensure_remaining(buf.len())?;
        self.cursor.copy_to_slice(buf);
        Ok(())
    }

    fn read_byte(&mut self) -> Result<i8> {
        self.ensure_remaining(1)?;
        Ok(self.cursor.get_i8())
    }

    fn read_short(&mut self) -> Result<i16> {
        self.ensure_remaining(2)?;
        Ok(self.cursor.get_i16())
    }

    fn read_int(&mut self) -> Result<i32> {
        self.ensure_remaining(4)?;
        Ok(self.cursor.get_i32())
    }

    fn read_long(&mut self) -> Result<i64> {
        self.ensure_remaining(8)?;
        Ok(self.cursor.get_i64())
    }
}
