//! Named field access for hooks that do not use the default field layout.
//!
//! A write hook fills a [`PutField`] with values by name and writes it in one go; a read
//! hook receives a [`GetField`] holding the stream's values for the current class level.

use std::sync::Arc;

use crate::error::{Result, StreamError};
use crate::serialization::descriptor::{ClassDescriptor, FieldType, StreamField};
use crate::serialization::heap::Value;

fn type_label(value: &Value) -> String {
    match value.primitive_type() {
        Some(ft) => ft.primitive_name().unwrap_or("?").to_string(),
        None => "Object".to_string(),
    }
}

fn matches_type(field: &StreamField, value: &Value) -> bool {
    match value.primitive_type() {
        Some(ft) => field.field_type() == ft,
        None => !field.is_primitive(),
    }
}

/// Buffer of serializable field values to be written by [`ObjectOutput::write_fields`].
///
/// [`ObjectOutput::write_fields`]: crate::serialization::hooks::ObjectOutput::write_fields
#[derive(Debug, Clone)]
pub struct PutField {
    desc: Arc<ClassDescriptor>,
    prims: Vec<u8>,
    objs: Vec<Value>,
}

impl PutField {
    pub(crate) fn new(desc: Arc<ClassDescriptor>) -> Self {
        Self {
            prims: vec![0; desc.prim_data_size()],
            objs: vec![Value::Null; desc.num_obj_fields()],
            desc,
        }
    }

    /// Sets the value of a serializable field.
    ///
    /// The value's type must match the declared field type; any reference type fits a
    /// reference field.
    pub fn put(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let field = self
            .desc
            .field(name)
            .filter(|f| matches_type(f, &value))
            .ok_or_else(|| {
                StreamError::IllegalState(format!(
                    "no such field {} with type {}",
                    name,
                    type_label(&value)
                ))
            })?;
        if field.is_primitive() {
            value.write_prim_bytes(&mut self.prims[field.offset()..]);
        } else {
            self.objs[field.offset()] = value;
        }
        Ok(())
    }

    pub(crate) fn descriptor(&self) -> &Arc<ClassDescriptor> {
        &self.desc
    }

    pub(crate) fn prim_data(&self) -> &[u8] {
        &self.prims
    }

    pub(crate) fn obj_values(&self) -> &[Value] {
        &self.objs
    }
}

/// Serializable field values of one class level as read from the stream.
#[derive(Debug, Clone)]
pub struct GetField {
    desc: Arc<ClassDescriptor>,
    prims: Vec<u8>,
    objs: Vec<Value>,
    failures: Vec<Option<StreamError>>,
}

macro_rules! typed_get {
    ($($(#[$doc:meta])* $fn:ident: $ty:ty => $variant:ident;)*) => {
        $(
            $(#[$doc])*
            pub fn $fn(&self, name: &str, default: $ty) -> Result<$ty> {
                match self.get(name, Value::$variant(default))? {
                    Value::$variant(v) => Ok(v),
                    _ => Ok(default),
                }
            }
        )*
    };
}

impl GetField {
    pub(crate) fn new(
        desc: Arc<ClassDescriptor>,
        prims: Vec<u8>,
        objs: Vec<Value>,
        failures: Vec<Option<StreamError>>,
    ) -> Self {
        Self {
            desc,
            prims,
            objs,
            failures,
        }
    }

    /// Descriptor of the class level these values were written for.
    pub fn descriptor(&self) -> &Arc<ClassDescriptor> {
        &self.desc
    }

    fn find(&self, name: &str, probe: &Value) -> Result<Option<&StreamField>> {
        if let Some(field) = self.desc.field(name).filter(|f| matches_type(f, probe)) {
            return Ok(Some(field));
        }
        let local = self
            .desc
            .local_fields()
            .iter()
            .any(|f| f.name() == name && matches_type(f, probe));
        if local {
            Ok(None)
        } else {
            Err(StreamError::IllegalState(format!(
                "no such field {} with type {}",
                name,
                type_label(probe)
            )))
        }
    }

    /// Returns true if the stream carried no value for a locally declared field.
    pub fn defaulted(&self, name: &str) -> Result<bool> {
        if self.desc.field(name).is_some() {
            return Ok(false);
        }
        if self.desc.local_fields().iter().any(|f| f.name() == name) {
            return Ok(true);
        }
        Err(StreamError::IllegalState(format!("no such field {}", name)))
    }

    /// Returns the value of a field, or `default` if the stream did not carry it.
    ///
    /// The type of `default` selects the field type; pass [`Value::Null`] for reference
    /// fields. Reading a reference whose class could not be resolved fails with the
    /// recorded error.
    pub fn get(&self, name: &str, default: Value) -> Result<Value> {
        let Some(field) = self.find(name, &default)? else {
            return Ok(default);
        };
        if field.is_primitive() {
            return Ok(Value::from_prim_bytes(
                field.field_type(),
                &self.prims[field.offset()..],
            ));
        }
        if let Some(err) = &self.failures[field.offset()] {
            return Err(err.clone());
        }
        Ok(self.objs[field.offset()])
    }

    /// Returns the value of a reference field, or null if the stream did not carry it.
    pub fn get_object(&self, name: &str) -> Result<Value> {
        self.get(name, Value::Null)
    }

    typed_get! {
        /// Returns a `boolean` field.
        get_bool: bool => Boolean;
        /// Returns a `byte` field.
        get_byte: i8 => Byte;
        /// Returns a `char` field.
        get_char: u16 => Char;
        /// Returns a `short` field.
        get_short: i16 => Short;
        /// Returns an `int` field.
        get_int: i32 => Int;
        /// Returns a `long` field.
        get_long: i64 => Long;
        /// Returns a `float` field.
        get_float: f32 => Float;
        /// Returns a `double` field.
        get_double: f64 => Double;
    }

    /// Field type of a stream field, if the stream carried it.
    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.desc.field(name).map(StreamField::field_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::registry::{FieldDef, TypeDef, TypeRegistry};

    fn descriptor() -> Arc<ClassDescriptor> {
        let registry = TypeRegistry::new();
        registry
            .register(
                TypeDef::builder("com.example.Point")
                    .serializable()
                    .serial_version_uid(1)
                    .field(FieldDef::new("x", FieldType::Int))
                    .field(FieldDef::new("y", FieldType::Int))
                    .field(FieldDef::of_class("label", "java.lang.String"))
                    .build(),
            )
            .unwrap();
        registry.descriptor("com.example.Point").unwrap()
    }

    #[test]
    fn test_put_field_type_checked() {
        let mut put = PutField::new(descriptor());
        put.put("x", 3).unwrap();
        put.put("label", Value::Null).unwrap();
        assert!(put.put("x", 3i64).is_err());
        assert!(put.put("label", 3).is_err());
        let err = put.put("z", 1).unwrap_err();
        assert!(err.to_string().contains("no such field z with type int"));
    }

    #[test]
    fn test_put_field_layout() {
        let mut put = PutField::new(descriptor());
        put.put("y", 0x0102).unwrap();
        assert_eq!(put.prim_data(), &[0, 0, 0, 0, 0, 0, 1, 2]);
        assert_eq!(put.obj_values(), &[Value::Null]);
    }

    #[test]
    fn test_get_field_values_and_errors() {
        let desc = descriptor();
        let prims = vec![0, 0, 0, 5, 0, 0, 0, 6];
        let failures = vec![Some(StreamError::ClassNotFound("a.B".into()))];
        let get = GetField::new(desc, prims, vec![Value::Null], failures);
        assert_eq!(get.get_int("x", 0).unwrap(), 5);
        assert_eq!(get.get_int("y", 0).unwrap(), 6);
        assert!(get.get_long("x", 0).is_err());
        assert!(matches!(
            get.get_object("label"),
            Err(StreamError::ClassNotFound(_))
        ));
        assert!(!get.defaulted("x").unwrap());
        assert!(get.defaulted("nope").is_err());
        assert_eq!(get.field_type("x"), Some(FieldType::Int));
    }
}
