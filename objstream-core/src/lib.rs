//! Identity-preserving object graph streams.
//!
//! An [`ObjectWriter`] walks a graph of objects held in a [`Heap`] and emits it as a
//! self-describing byte stream: class descriptors, field values and back-references to
//! objects already written. An [`ObjectReader`] rebuilds an equivalent graph, binding
//! stream descriptors to the types registered in a [`TypeRegistry`] and tolerating
//! class evolution on either side.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use objstream_core::{FieldDef, FieldType, Heap, ObjectReader, ObjectWriter, TypeDef, TypeRegistry};
//!
//! let registry = Arc::new(TypeRegistry::new());
//! registry.register(
//!     TypeDef::builder("com.example.Point")
//!         .serializable()
//!         .field(FieldDef::new("x", FieldType::Int))
//!         .build(),
//! )?;
//!
//! let mut heap = Heap::new(Arc::clone(&registry));
//! let point = heap.new_instance("com.example.Point")?;
//! heap.set_field(point, "x", 7.into())?;
//!
//! let mut writer = ObjectWriter::new(Vec::new())?;
//! writer.write_object(&mut heap, point)?;
//! let bytes = writer.into_inner()?;
//!
//! let mut copy = Heap::new(registry);
//! let mut reader = ObjectReader::new(bytes.as_slice())?;
//! let value = reader.read_object(&mut copy)?;
//! ```

#![warn(missing_docs)]

pub mod config;
#[cfg(feature = "config-file")]
pub mod config_file;
pub mod error;
pub mod protocol;
pub mod serialization;

pub use config::{ConfigError, StreamConfig, StreamConfigBuilder};
#[cfg(feature = "config-file")]
pub use config_file::FileConfig;
pub use error::{ErrorKind, Result, StreamError};
pub use protocol::ProtocolVersion;
pub use serialization::{
    ArrayElements, DataInput, DataOutput, DescribeType, FieldDef, FieldType, FieldValue,
    FilterInfo, FilterStatus, Heap, ObjectDataInput, ObjectDataOutput, ObjectId,
    ObjectInput, ObjectInputFilter, ObjectOutput, ObjectReader, ObjectWriter, PatternFilter,
    StreamObject, TypeDef, TypeRegistry, Value,
};
