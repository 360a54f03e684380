//! Typed bridges between Rust structs and heap instances.
//!
//! `#[derive(StreamObject)]` from `objstream-derive` implements [`DescribeType`] and
//! [`StreamObject`] field by field through [`FieldValue`].

use crate::error::{Result, StreamError};
use crate::serialization::descriptor::FieldType;
use crate::serialization::heap::{Heap, ObjectId, Value};
use crate::serialization::registry::{FieldDef, TypeDef, TypeRegistry};

const STRING: &str = "java.lang.String";

/// A Rust type with a stream class definition.
pub trait DescribeType {
    /// The class definition registered for this type.
    fn type_def() -> TypeDef;

    /// Registers [`type_def`](Self::type_def) with `registry`.
    fn register(registry: &TypeRegistry) -> Result<()> {
        registry.register(Self::type_def())
    }
}

/// A Rust value that converts to and from a heap instance of its class.
pub trait StreamObject: DescribeType + Sized {
    /// Allocates a heap instance holding this value's persistent fields.
    fn to_heap(&self, heap: &mut Heap) -> Result<ObjectId>;

    /// Rebuilds a value from a heap instance of this class.
    fn from_heap(heap: &Heap, id: ObjectId) -> Result<Self>;
}

/// A Rust field type with a fixed stream field type.
pub trait FieldValue: Sized {
    /// Declares a field of this type.
    fn field_def(name: &str) -> FieldDef;

    /// Converts to a field value, allocating in `heap` where needed.
    fn to_value(&self, heap: &mut Heap) -> Value;

    /// Converts from a field value read from `heap`.
    fn from_value(heap: &Heap, value: Value) -> Result<Self>;
}

fn mismatch(expected: &str, value: Value) -> StreamError {
    StreamError::IllegalState(format!("expected {} field value, found {:?}", expected, value))
}

macro_rules! primitive_field_value {
    ($($ty:ty => $ft:ident, $variant:ident, $getter:ident;)*) => {
        $(
            impl FieldValue for $ty {
                fn field_def(name: &str) -> FieldDef {
                    FieldDef::new(name, FieldType::$ft)
                }

                fn to_value(&self, _heap: &mut Heap) -> Value {
                    Value::$variant(*self)
                }

                fn from_value(_heap: &Heap, value: Value) -> Result<Self> {
                    value.$getter().ok_or_else(|| mismatch(stringify!($ty), value))
                }
            }
        )*
    };
}

primitive_field_value! {
    bool => Boolean, Boolean, as_bool;
    i8 => Byte, Byte, as_byte;
    u16 => Char, Char, as_char;
    i16 => Short, Short, as_short;
    i32 => Int, Int, as_int;
    i64 => Long, Long, as_long;
    f32 => Float, Float, as_float;
    f64 => Double, Double, as_double;
}

impl FieldValue for Option<String> {
    fn field_def(name: &str) -> FieldDef {
        FieldDef::of_class(name, STRING)
    }

    fn to_value(&self, heap: &mut Heap) -> Value {
        match self {
            Some(s) => Value::Ref(heap.alloc_string(s.as_str())),
            None => Value::Null,
        }
    }

    fn from_value(heap: &Heap, value: Value) -> Result<Self> {
        if value.is_null() {
            return Ok(None);
        }
        heap.string(value)
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| mismatch("String", value))
    }
}

/// A null reference reads back as the empty string.
impl FieldValue for String {
    fn field_def(name: &str) -> FieldDef {
        FieldDef::of_class(name, STRING)
    }

    fn to_value(&self, heap: &mut Heap) -> Value {
        Value::Ref(heap.alloc_string(self.as_str()))
    }

    fn from_value(heap: &Heap, value: Value) -> Result<Self> {
        Ok(Option::<String>::from_value(heap, value)?.unwrap_or_default())
    }
}
