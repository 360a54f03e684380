//! Block-data framing.
//!
//! Primitive data written by hooks and top-level primitive writes travels in length
//! prefixed blocks of at most [`MAX_BLOCK_SIZE`](crate::protocol::MAX_BLOCK_SIZE) bytes,
//! so a reader can skip data it does not understand and tell primitive data apart from
//! object records. Control records (type codes, descriptors, field values written by
//! default serialization) are written in object mode, unframed.

mod input;
mod output;

pub use input::BlockDataInput;
pub use output::BlockDataOutput;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamError;
    use crate::protocol::{TC_ENDBLOCKDATA, TC_OBJECT};
    use crate::serialization::{DataInput, DataOutput};

    #[test]
    fn test_block_round_trip() {
        let mut out = BlockDataOutput::new(Vec::new());
        out.set_block_data_mode(true).unwrap();
        out.write_int(7).unwrap();
        out.write_utf("héllo").unwrap();
        out.write_long(-1).unwrap();
        out.set_block_data_mode(false).unwrap();
        out.write_bytes(&[TC_ENDBLOCKDATA]).unwrap();
        let bytes = out.into_inner().unwrap();

        let mut input = BlockDataInput::new(bytes.as_slice());
        input.set_block_data_mode(true).unwrap();
        assert_eq!(input.read_int().unwrap(), 7);
        assert_eq!(input.read_utf().unwrap(), "héllo");
        assert_eq!(input.read_long().unwrap(), -1);
        assert!(matches!(
            input.read_int(),
            Err(StreamError::OptionalData { eof: true, .. })
        ));
        input.set_block_data_mode(false).unwrap();
        assert_eq!(input.read_unsigned_byte().unwrap(), TC_ENDBLOCKDATA);
    }

    #[test]
    fn test_large_payload_spans_blocks() {
        let payload: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
        let mut out = BlockDataOutput::new(Vec::new());
        out.set_block_data_mode(true).unwrap();
        out.write_bytes(&payload).unwrap();
        out.set_block_data_mode(false).unwrap();
        out.write_bytes(&[TC_OBJECT]).unwrap();
        let bytes = out.into_inner().unwrap();

        let mut input = BlockDataInput::new(bytes.as_slice());
        input.set_block_data_mode(true).unwrap();
        assert_eq!(input.read_bytes(3000).unwrap(), payload);
        assert_eq!(input.current_block_remaining().unwrap(), 0);
        input.set_block_data_mode(false).unwrap();
        assert_eq!(input.peek_byte().unwrap(), TC_OBJECT);
    }
}
