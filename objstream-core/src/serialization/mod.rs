//! Object graph serialization over the stream protocol.

mod block;
mod data_input;
mod data_output;
pub mod descriptor;
pub mod fields;
pub mod filter;
pub mod handles;
pub mod heap;
pub mod hooks;
mod object;
pub mod reader;
pub mod registry;
pub mod validation;
pub mod writer;

pub use data_input::{DataInput, ObjectDataInput};
pub use data_output::{DataOutput, ObjectDataOutput};
pub use descriptor::{ClassDescriptor, DescriptorKind, FieldType, StreamField};
pub use fields::{GetField, PutField};
pub use filter::{FilterInfo, FilterStatus, ObjectInputFilter, PatternFilter};
pub use heap::{ArrayElements, Heap, HeapObject, Instance, ObjectId, Value};
pub use hooks::{
    Externalizable, ObjectInput, ObjectOutput, ObjectReplacer, ObjectResolver,
    ReadObjectHook, ReadObjectNoDataHook, ReadResolveHook, WriteObjectHook, WriteReplaceHook,
};
pub use object::{DescribeType, FieldValue, StreamObject};
pub use reader::ObjectReader;
pub use registry::{FieldDef, TypeDef, TypeDefBuilder, TypeKind, TypeRegistry};
pub use validation::ObjectInputValidation;
pub use writer::ObjectWriter;
