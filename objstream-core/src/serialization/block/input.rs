use std::io::{ErrorKind, Read};

use crate::error::{Result, StreamError};
use crate::protocol::{is_type_code, MAX_BLOCK_SIZE, TC_BLOCKDATA, TC_BLOCKDATALONG, TC_RESET};
use crate::serialization::data_input::decode_modified_utf8;
use crate::serialization::DataInput;

/// Upper bound on a single allocation step while reading length-prefixed data.
const READ_CHUNK: usize = 64 * 1024;

/// Byte source with one byte of lookahead and a consumed-byte counter.
#[derive(Debug)]
struct PeekReader<R> {
    inner: R,
    peeked: Option<u8>,
    consumed: u64,
}

impl<R: Read> PeekReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            peeked: None,
            consumed: 0,
        }
    }

    fn peek(&mut self) -> Result<Option<u8>> {
        if self.peeked.is_none() {
            let mut b = [0u8; 1];
            if self.read_raw(&mut b)? == 0 {
                return Ok(None);
            }
            self.peeked = Some(b[0]);
        }
        Ok(self.peeked)
    }

    fn read_raw(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match self.inner.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let n = match self.peeked.take() {
            Some(b) => {
                buf[0] = b;
                1 + if buf.len() > 1 { self.read_raw(&mut buf[1..])? } else { 0 }
            }
            None => self.read_raw(buf)?,
        };
        self.consumed += n as u64;
        Ok(n)
    }

    fn read_fully(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut off = 0;
        while off < buf.len() {
            let n = self.read(&mut buf[off..])?;
            if n == 0 {
                return Err(StreamError::Eof);
            }
            off += n;
        }
        Ok(())
    }
}

/// Input side of the block-data framer.
///
/// In block mode, primitive reads consume block records transparently; hitting the next
/// object record or `TC_ENDBLOCKDATA` ends the data and a further primitive read fails
/// with `OptionalData { eof: true }`.
#[derive(Debug)]
pub struct BlockDataInput<R> {
    inner: PeekReader<R>,
    block_mode: bool,
    buf: Vec<u8>,
    pos: usize,
    end: Option<usize>,
    unread: usize,
    default_data_end: bool,
    depth: usize,
    reset_pending: bool,
}

impl<R: Read> BlockDataInput<R> {
    /// Wraps a byte source, starting in object mode.
    pub fn new(source: R) -> Self {
        Self {
            inner: PeekReader::new(source),
            block_mode: false,
            buf: vec![0; MAX_BLOCK_SIZE],
            pos: 0,
            end: None,
            unread: 0,
            default_data_end: false,
            depth: 0,
            reset_pending: false,
        }
    }

    /// Switches framing mode. Returns the previous mode.
    ///
    /// Leaving block mode with bytes still buffered is an error.
    pub fn set_block_data_mode(&mut self, mode: bool) -> Result<bool> {
        if self.block_mode == mode {
            return Ok(mode);
        }
        if mode {
            self.pos = 0;
            self.end = Some(0);
            self.unread = 0;
        } else if self.end.map_or(false, |end| self.pos < end) {
            return Err(StreamError::IllegalState("unread block data".to_string()));
        }
        self.block_mode = mode;
        Ok(!mode)
    }

    /// Returns true in block-data mode.
    pub fn block_data_mode(&self) -> bool {
        self.block_mode
    }

    /// Total bytes consumed from the source.
    pub fn bytes_consumed(&self) -> u64 {
        self.inner.consumed
    }

    pub(crate) fn set_depth(&mut self, depth: usize) {
        self.depth = depth;
    }

    pub(crate) fn set_default_data_end(&mut self, value: bool) {
        self.default_data_end = value;
    }

    pub(crate) fn default_data_end(&self) -> bool {
        self.default_data_end
    }

    /// Returns true once if a reset record was consumed inside a block header.
    pub(crate) fn take_reset(&mut self) -> bool {
        std::mem::take(&mut self.reset_pending)
    }

    /// Reads a block header, or returns `None` at the end of block data.
    fn read_block_header(&mut self) -> Result<Option<usize>> {
        if self.default_data_end {
            return Ok(None);
        }
        loop {
            let Some(tc) = self.inner.peek()? else {
                return Ok(None);
            };
            match tc {
                TC_BLOCKDATA => {
                    let mut header = [0u8; 2];
                    self.read_header_bytes(&mut header)?;
                    return Ok(Some(header[1] as usize));
                }
                TC_BLOCKDATALONG => {
                    let mut header = [0u8; 5];
                    self.read_header_bytes(&mut header)?;
                    let len = i32::from_be_bytes([header[1], header[2], header[3], header[4]]);
                    if len < 0 {
                        return Err(StreamError::corrupted(format!(
                            "illegal block data header length: {}",
                            len
                        )));
                    }
                    return Ok(Some(len as usize));
                }
                TC_RESET => {
                    let mut tc = [0u8; 1];
                    self.inner.read_fully(&mut tc)?;
                    self.handle_reset()?;
                }
                tc if !is_type_code(tc) => {
                    return Err(StreamError::corrupted(format!("invalid type code: {:02X}", tc)));
                }
                _ => return Ok(None),
            }
        }
    }

    fn read_header_bytes(&mut self, header: &mut [u8]) -> Result<()> {
        self.inner.read_fully(header).map_err(|e| match e {
            StreamError::Eof => {
                StreamError::corrupted("unexpected EOF while reading block data header")
            }
            other => other,
        })
    }

    fn handle_reset(&mut self) -> Result<()> {
        if self.depth > 0 {
            return Err(StreamError::corrupted(format!(
                "unexpected reset; recursion depth: {}",
                self.depth
            )));
        }
        tracing::debug!("stream reset inside block data");
        self.reset_pending = true;
        Ok(())
    }

    fn refill(&mut self) -> Result<()> {
        let result = self.refill_inner();
        if result.is_err() {
            self.pos = 0;
            self.end = None;
            self.unread = 0;
        }
        result
    }

    fn refill_inner(&mut self) -> Result<()> {
        loop {
            self.pos = 0;
            if self.unread > 0 {
                let want = self.unread.min(MAX_BLOCK_SIZE);
                let n = self.inner.read(&mut self.buf[..want])?;
                if n == 0 {
                    return Err(StreamError::corrupted("unexpected EOF in middle of data block"));
                }
                self.end = Some(n);
                self.unread -= n;
            } else {
                match self.read_block_header()? {
                    Some(len) => {
                        self.end = Some(0);
                        self.unread = len;
                    }
                    None => {
                        self.end = None;
                        self.unread = 0;
                    }
                }
            }
            if self.end != Some(0) {
                return Ok(());
            }
        }
    }

    /// Error for a primitive read past the end of block data.
    fn end_of_data(&mut self) -> StreamError {
        match self.inner.peek() {
            Ok(Some(_)) => StreamError::OptionalData {
                eof: true,
                length: 0,
            },
            Ok(None) => StreamError::Eof,
            Err(e) => e,
        }
    }

    /// Bytes left in the current block-data run; zero at the end of block data.
    pub fn current_block_remaining(&self) -> Result<usize> {
        if !self.block_mode {
            return Err(StreamError::IllegalState("not in block data mode".to_string()));
        }
        Ok(match self.end {
            Some(end) => end - self.pos + self.unread,
            None => 0,
        })
    }

    /// Primitive bytes available before the next object record.
    pub fn available(&mut self) -> Result<usize> {
        if !self.block_mode {
            return Ok(0);
        }
        if self.end == Some(self.pos) && self.unread == 0 {
            loop {
                match self.read_block_header()? {
                    Some(0) => continue,
                    Some(len) => {
                        self.pos = 0;
                        self.end = Some(0);
                        self.unread = len;
                    }
                    None => {
                        self.pos = 0;
                        self.end = None;
                    }
                }
                break;
            }
        }
        self.current_block_remaining()
    }

    /// Discards the remaining block data up to the next object record.
    pub fn skip_block_data(&mut self) -> Result<()> {
        if !self.block_mode {
            return Err(StreamError::IllegalState("not in block data mode".to_string()));
        }
        while self.end.is_some() {
            self.refill()?;
        }
        Ok(())
    }

    /// Peeks at the next byte without consuming it.
    pub fn peek(&mut self) -> Result<Option<u8>> {
        if !self.block_mode {
            return self.inner.peek();
        }
        if self.end == Some(self.pos) {
            self.refill()?;
        }
        Ok(match self.end {
            Some(_) => Some(self.buf[self.pos]),
            None => None,
        })
    }

    /// Peeks at the next byte, failing at the end of data.
    pub fn peek_byte(&mut self) -> Result<u8> {
        match self.peek()? {
            Some(b) => Ok(b),
            None if self.block_mode => Err(self.end_of_data()),
            None => Err(StreamError::Eof),
        }
    }

    /// Reads a string with an 8-byte length prefix.
    pub fn read_long_utf(&mut self) -> Result<String> {
        let len = self.read_long()?;
        if len < 0 {
            return Err(StreamError::corrupted(format!("illegal string length: {}", len)));
        }
        let len = usize::try_from(len)
            .map_err(|_| StreamError::corrupted(format!("illegal string length: {}", len)))?;
        let mut bytes = Vec::with_capacity(len.min(READ_CHUNK));
        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(READ_CHUNK);
            let start = bytes.len();
            bytes.resize(start + n, 0);
            self.read_fully(&mut bytes[start..])?;
            remaining -= n;
        }
        decode_modified_utf8(&bytes)
    }
}

impl<R: Read> DataInput for BlockDataInput<R> {
    fn read_fully(&mut self, out: &mut [u8]) -> Result<()> {
        if !self.block_mode {
            return self.inner.read_fully(out);
        }
        let mut off = 0;
        while off < out.len() {
            if self.end == Some(self.pos) {
                self.refill()?;
            }
            let Some(end) = self.end else {
                return Err(self.end_of_data());
            };
            let n = (end - self.pos).min(out.len() - off);
            out[off..off + n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
            self.pos += n;
            off += n;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{TC_ENDBLOCKDATA, TC_NULL};

    #[test]
    fn test_object_mode_reads_raw() {
        let data = [0, 0, 0, 9];
        let mut input = BlockDataInput::new(&data[..]);
        assert_eq!(input.read_int().unwrap(), 9);
        assert_eq!(input.bytes_consumed(), 4);
        assert!(matches!(input.read_byte(), Err(StreamError::Eof)));
    }

    #[test]
    fn test_reads_across_block_records() {
        let data = [TC_BLOCKDATA, 2, 0, 0, TC_BLOCKDATA, 2, 0, 5, TC_NULL];
        let mut input = BlockDataInput::new(&data[..]);
        input.set_block_data_mode(true).unwrap();
        assert_eq!(input.read_int().unwrap(), 5);
        assert_eq!(input.peek().unwrap(), None);
        input.set_block_data_mode(false).unwrap();
        assert_eq!(input.peek_byte().unwrap(), TC_NULL);
    }

    #[test]
    fn test_truncated_header_is_corrupted() {
        let data = [TC_BLOCKDATALONG, 0, 0];
        let mut input = BlockDataInput::new(&data[..]);
        input.set_block_data_mode(true).unwrap();
        let err = input.read_byte().unwrap_err();
        assert!(err.to_string().contains("unexpected EOF while reading block data header"));
    }

    #[test]
    fn test_negative_long_header_is_corrupted() {
        let data = [TC_BLOCKDATALONG, 0xFF, 0xFF, 0xFF, 0xFF];
        let mut input = BlockDataInput::new(&data[..]);
        input.set_block_data_mode(true).unwrap();
        let err = input.read_byte().unwrap_err();
        assert!(err.to_string().contains("illegal block data header length: -1"));
    }

    #[test]
    fn test_invalid_type_code_is_corrupted() {
        let data = [0x10];
        let mut input = BlockDataInput::new(&data[..]);
        input.set_block_data_mode(true).unwrap();
        let err = input.read_byte().unwrap_err();
        assert!(err.to_string().contains("invalid type code: 10"));
    }

    #[test]
    fn test_truncated_block_body() {
        let data = [TC_BLOCKDATA, 4, 1];
        let mut input = BlockDataInput::new(&data[..]);
        input.set_block_data_mode(true).unwrap();
        assert!(input.read_int().is_err());
    }

    #[test]
    fn test_end_of_stream_in_block_mode_is_eof() {
        let data = [TC_BLOCKDATA, 1, 7];
        let mut input = BlockDataInput::new(&data[..]);
        input.set_block_data_mode(true).unwrap();
        assert_eq!(input.read_byte().unwrap(), 7);
        assert!(matches!(input.read_byte(), Err(StreamError::Eof)));
    }

    #[test]
    fn test_reset_inside_header_at_depth_zero() {
        let data = [TC_RESET, TC_BLOCKDATA, 1, 3];
        let mut input = BlockDataInput::new(&data[..]);
        input.set_block_data_mode(true).unwrap();
        assert_eq!(input.read_byte().unwrap(), 3);
        assert!(input.take_reset());
        assert!(!input.take_reset());
    }

    #[test]
    fn test_reset_inside_header_when_nested() {
        let data = [TC_RESET, TC_BLOCKDATA, 1, 3];
        let mut input = BlockDataInput::new(&data[..]);
        input.set_depth(2);
        input.set_block_data_mode(true).unwrap();
        let err = input.read_byte().unwrap_err();
        assert!(err.to_string().contains("unexpected reset; recursion depth: 2"));
    }

    #[test]
    fn test_leaving_block_mode_with_unread_data() {
        let data = [TC_BLOCKDATA, 2, 1, 2];
        let mut input = BlockDataInput::new(&data[..]);
        input.set_block_data_mode(true).unwrap();
        input.read_byte().unwrap();
        assert!(matches!(
            input.set_block_data_mode(false),
            Err(StreamError::IllegalState(_))
        ));
        input.skip_block_data().unwrap();
        input.set_block_data_mode(false).unwrap();
    }

    #[test]
    fn test_default_data_end_simulates_boundary() {
        let data = [TC_BLOCKDATA, 1, 3];
        let mut input = BlockDataInput::new(&data[..]);
        input.set_block_data_mode(true).unwrap();
        input.set_default_data_end(true);
        assert!(matches!(
            input.read_byte(),
            Err(StreamError::OptionalData { eof: true, .. })
        ));
        assert!(matches!(
            input.read_byte(),
            Err(StreamError::OptionalData { eof: true, .. })
        ));

        input.set_default_data_end(false);
        input.set_block_data_mode(false).unwrap();
        input.set_block_data_mode(true).unwrap();
        assert_eq!(input.read_byte().unwrap(), 3);
    }

    #[test]
    fn test_available_and_skip() {
        let data = [TC_BLOCKDATA, 3, 1, 2, 3, TC_ENDBLOCKDATA];
        let mut input = BlockDataInput::new(&data[..]);
        input.set_block_data_mode(true).unwrap();
        assert_eq!(input.available().unwrap(), 3);
        input.skip_block_data().unwrap();
        assert_eq!(input.current_block_remaining().unwrap(), 0);
        input.set_block_data_mode(false).unwrap();
        assert_eq!(input.read_unsigned_byte().unwrap(), TC_ENDBLOCKDATA);
    }

    #[test]
    fn test_read_long_utf() {
        let data = [0, 0, 0, 0, 0, 0, 0, 3, b'a', b'b', b'c'];
        let mut input = BlockDataInput::new(&data[..]);
        assert_eq!(input.read_long_utf().unwrap(), "abc");

        let negative = [0xFF; 8];
        let mut input = BlockDataInput::new(&negative[..]);
        assert!(input.read_long_utf().is_err());
    }
}
