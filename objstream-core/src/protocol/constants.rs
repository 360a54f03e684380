//! Protocol constants for the object stream wire format.

/// Magic number written at the start of every stream.
pub const STREAM_MAGIC: u16 = 0xACED;

/// Stream format version written after the magic number.
pub const STREAM_VERSION: u16 = 5;

/// Lowest type code value.
pub const TC_BASE: u8 = 0x70;

/// Null reference.
pub const TC_NULL: u8 = 0x70;

/// Back-reference to a previously written value.
pub const TC_REFERENCE: u8 = 0x71;

/// New class descriptor.
pub const TC_CLASSDESC: u8 = 0x72;

/// New ordinary object.
pub const TC_OBJECT: u8 = 0x73;

/// New string (2-byte length).
pub const TC_STRING: u8 = 0x74;

/// New array.
pub const TC_ARRAY: u8 = 0x75;

/// Class value.
pub const TC_CLASS: u8 = 0x76;

/// Block data with a 1-byte length header.
pub const TC_BLOCKDATA: u8 = 0x77;

/// End of optional block data for an object.
pub const TC_ENDBLOCKDATA: u8 = 0x78;

/// Reset of the stream context.
pub const TC_RESET: u8 = 0x79;

/// Block data with a 4-byte length header.
pub const TC_BLOCKDATALONG: u8 = 0x7A;

/// Terminal exception record written during a failed write.
pub const TC_EXCEPTION: u8 = 0x7B;

/// New string (8-byte length).
pub const TC_LONGSTRING: u8 = 0x7C;

/// New proxy class descriptor.
pub const TC_PROXYCLASSDESC: u8 = 0x7D;

/// New enum constant.
pub const TC_ENUM: u8 = 0x7E;

/// Highest type code value.
pub const TC_MAX: u8 = 0x7E;

/// First handle value on the wire.
pub const BASE_WIRE_HANDLE: i32 = 0x7E_0000;

/// Class descriptor flag: the class has a custom write hook.
pub const SC_WRITE_METHOD: u8 = 0x01;

/// Class descriptor flag: externalizable data is written in block-data mode.
pub const SC_BLOCK_DATA: u8 = 0x08;

/// Class descriptor flag: the class is serializable.
pub const SC_SERIALIZABLE: u8 = 0x02;

/// Class descriptor flag: the class is externalizable.
pub const SC_EXTERNALIZABLE: u8 = 0x04;

/// Class descriptor flag: the class is an enum type.
pub const SC_ENUM: u8 = 0x10;

/// Maximum payload of one block-data record produced by the writer.
pub const MAX_BLOCK_SIZE: usize = 1024;

/// Largest string length, in encoded bytes, that uses the short string record.
pub const MAX_SHORT_STRING_LEN: usize = 0xFFFF;

/// Maximum number of interfaces in a proxy class descriptor.
pub const MAX_PROXY_INTERFACES: i32 = 65535;

/// Stream protocol versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProtocolVersion {
    /// Externalizable data is written without block-data framing.
    V1,
    /// Externalizable data is framed as block data and terminated by `TC_ENDBLOCKDATA`.
    #[default]
    V2,
}

impl ProtocolVersion {
    /// Parses the numeric protocol version.
    pub fn from_number(n: u32) -> Option<Self> {
        match n {
            1 => Some(Self::V1),
            2 => Some(Self::V2),
            _ => None,
        }
    }

    /// Returns the numeric protocol version.
    pub fn number(&self) -> u32 {
        match self {
            Self::V1 => 1,
            Self::V2 => 2,
        }
    }
}

/// Returns true if `tc` is a block-data header type code.
pub fn is_block_header(tc: u8) -> bool {
    tc == TC_BLOCKDATA || tc == TC_BLOCKDATALONG
}

/// Returns true if `tc` is inside the valid type code range.
pub fn is_type_code(tc: u8) -> bool {
    (TC_BASE..=TC_MAX).contains(&tc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_code_range() {
        assert!(is_type_code(TC_NULL));
        assert!(is_type_code(TC_ENUM));
        assert!(!is_type_code(0x6F));
        assert!(!is_type_code(0x7F));
    }

    #[test]
    fn test_block_headers() {
        assert!(is_block_header(TC_BLOCKDATA));
        assert!(is_block_header(TC_BLOCKDATALONG));
        assert!(!is_block_header(TC_ENDBLOCKDATA));
    }

    #[test]
    fn test_protocol_version_numbers() {
        assert_eq!(ProtocolVersion::from_number(1), Some(ProtocolVersion::V1));
        assert_eq!(ProtocolVersion::from_number(2), Some(ProtocolVersion::V2));
        assert_eq!(ProtocolVersion::from_number(3), None);
        assert_eq!(ProtocolVersion::default().number(), 2);
    }
}
