use std::io::Write;

use bytes::BufMut;

use crate::error::{Result, StreamError};
use crate::protocol::{MAX_BLOCK_SIZE, TC_BLOCKDATA, TC_BLOCKDATALONG};
use crate::serialization::data_output::{encode_modified_utf8, utf_length};
use crate::serialization::DataOutput;

/// Output side of the block-data framer.
///
/// Object-mode bytes go straight to the sink. Block-mode bytes are buffered and emitted
/// as a block record whenever the buffer fills, the mode switches back to object mode,
/// or the stream is flushed.
#[derive(Debug)]
pub struct BlockDataOutput<W: Write> {
    sink: W,
    block_mode: bool,
    buf: Vec<u8>,
}

impl<W: Write> BlockDataOutput<W> {
    /// Wraps a sink, starting in object mode.
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            block_mode: false,
            buf: Vec::with_capacity(MAX_BLOCK_SIZE),
        }
    }

    /// Switches framing mode, draining buffered block data. Returns the previous mode.
    pub fn set_block_data_mode(&mut self, mode: bool) -> Result<bool> {
        if self.block_mode == mode {
            return Ok(mode);
        }
        if mode && !self.buf.is_empty() {
            return Err(StreamError::IllegalState(
                "buffered bytes pending on entry to block data mode".to_string(),
            ));
        }
        self.drain()?;
        self.block_mode = mode;
        Ok(!mode)
    }

    /// Writes buffered block data as one block record.
    pub fn drain(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        if self.block_mode {
            self.write_block_header(self.buf.len())?;
        }
        self.sink.write_all(&self.buf)?;
        tracing::trace!(len = self.buf.len(), "drained block data");
        self.buf.clear();
        Ok(())
    }

    fn write_block_header(&mut self, len: usize) -> Result<()> {
        if len <= 0xFF {
            self.sink.write_all(&[TC_BLOCKDATA, len as u8])?;
        } else {
            let mut header = [0u8; 5];
            header[0] = TC_BLOCKDATALONG;
            header[1..].copy_from_slice(&(len as i32).to_be_bytes());
            self.sink.write_all(&header)?;
        }
        Ok(())
    }

    /// Writes a string with an 8-byte length prefix.
    pub fn write_long_utf(&mut self, s: &str) -> Result<()> {
        let len = utf_length(s);
        let mut buf = Vec::with_capacity(len + 8);
        buf.put_i64(len as i64);
        encode_modified_utf8(s, &mut buf);
        self.write_bytes(&buf)
    }

    /// Drains block data and flushes the sink.
    pub fn flush(&mut self) -> Result<()> {
        self.drain()?;
        self.sink.flush()?;
        Ok(())
    }

    /// Returns the sink.
    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    /// Drains pending block data and returns the sink.
    pub fn into_inner(mut self) -> Result<W> {
        self.drain()?;
        Ok(self.sink)
    }
}

impl<W: Write> DataOutput for BlockDataOutput<W> {
    fn write_byte(&mut self, v: i8) -> Result<()> {
        self.write_bytes(&[v as u8])
    }

    fn write_bool(&mut self, v: bool) -> Result<()> {
        self.write_bytes(&[u8::from(v)])
    }

    fn write_char(&mut self, v: u16) -> Result<()> {
        self.write_bytes(&v.to_be_bytes())
    }

    fn write_short(&mut self, v: i16) -> Result<()> {
        self.write_bytes(&v.to_be_bytes())
    }

    fn write_int(&mut self, v: i32) -> Result<()> {
        self.write_bytes(&v.to_be_bytes())
    }

    fn write_long(&mut self, v: i64) -> Result<()> {
        self.write_bytes(&v.to_be_bytes())
    }

    fn write_float(&mut self, v: f32) -> Result<()> {
        self.write_bytes(&v.to_be_bytes())
    }

    fn write_double(&mut self, v: f64) -> Result<()> {
        self.write_bytes(&v.to_be_bytes())
    }

    fn write_bytes(&mut self, mut v: &[u8]) -> Result<()> {
        if !self.block_mode {
            self.sink.write_all(v)?;
            return Ok(());
        }
        while !v.is_empty() {
            if self.buf.len() >= MAX_BLOCK_SIZE {
                self.drain()?;
            }
            let n = v.len().min(MAX_BLOCK_SIZE - self.buf.len());
            self.buf.extend_from_slice(&v[..n]);
            v = &v[n..];
        }
        Ok(())
    }
}
