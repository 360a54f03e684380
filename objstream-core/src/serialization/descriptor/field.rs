//! Wire field specifications and type signatures.

use crate::error::{Result, StreamError};
use std::cmp::Ordering;

/// Type codes of serializable fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// `Z`
    Boolean,
    /// `B`
    Byte,
    /// `C`, a UTF-16 code unit.
    Char,
    /// `S`
    Short,
    /// `I`
    Int,
    /// `J`
    Long,
    /// `F`
    Float,
    /// `D`
    Double,
    /// `L`, a reference to an object.
    Object,
    /// `[`, a reference to an array.
    Array,
}

impl FieldType {
    /// Creates a field type from its one-byte type code.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            b'Z' => Ok(Self::Boolean),
            b'B' => Ok(Self::Byte),
            b'C' => Ok(Self::Char),
            b'S' => Ok(Self::Short),
            b'I' => Ok(Self::Int),
            b'J' => Ok(Self::Long),
            b'F' => Ok(Self::Float),
            b'D' => Ok(Self::Double),
            b'L' => Ok(Self::Object),
            b'[' => Ok(Self::Array),
            _ => Err(StreamError::invalid_class_anon(format!(
                "illegal field type code: {:#04x}",
                code
            ))),
        }
    }

    /// Returns the one-byte type code.
    pub fn code(&self) -> u8 {
        match self {
            Self::Boolean => b'Z',
            Self::Byte => b'B',
            Self::Char => b'C',
            Self::Short => b'S',
            Self::Int => b'I',
            Self::Long => b'J',
            Self::Float => b'F',
            Self::Double => b'D',
            Self::Object => b'L',
            Self::Array => b'[',
        }
    }

    /// Returns true for the eight primitive types.
    pub fn is_primitive(&self) -> bool {
        !matches!(self, Self::Object | Self::Array)
    }

    /// Size in bytes of a primitive value of this type; zero for references.
    pub fn primitive_size(&self) -> usize {
        match self {
            Self::Boolean | Self::Byte => 1,
            Self::Char | Self::Short => 2,
            Self::Int | Self::Float => 4,
            Self::Long | Self::Double => 8,
            Self::Object | Self::Array => 0,
        }
    }

    /// Parses the type of a JVM type signature such as `I` or `Ljava/lang/String;`.
    pub fn from_signature(signature: &str) -> Result<Self> {
        let first = signature.as_bytes().first().copied().ok_or_else(|| {
            StreamError::invalid_class_anon("empty field type signature")
        })?;
        let field_type = Self::from_code(first)?;
        let well_formed = match field_type {
            Self::Object => signature.len() > 2 && signature.ends_with(';'),
            Self::Array => signature.len() > 1,
            _ => signature.len() == 1,
        };
        if !well_formed {
            return Err(StreamError::invalid_class_anon(format!(
                "illegal signature: {}",
                signature
            )));
        }
        Ok(field_type)
    }

    /// Returns the primitive type name used for class lookups, e.g. `int`.
    pub fn primitive_name(&self) -> Option<&'static str> {
        match self {
            Self::Boolean => Some("boolean"),
            Self::Byte => Some("byte"),
            Self::Char => Some("char"),
            Self::Short => Some("short"),
            Self::Int => Some("int"),
            Self::Long => Some("long"),
            Self::Float => Some("float"),
            Self::Double => Some("double"),
            Self::Object | Self::Array => None,
        }
    }

    /// Maps a primitive type name such as `int` back to its field type.
    pub fn from_primitive_name(name: &str) -> Option<Self> {
        match name {
            "boolean" => Some(Self::Boolean),
            "byte" => Some(Self::Byte),
            "char" => Some(Self::Char),
            "short" => Some(Self::Short),
            "int" => Some(Self::Int),
            "long" => Some(Self::Long),
            "float" => Some(Self::Float),
            "double" => Some(Self::Double),
            _ => None,
        }
    }
}

/// Converts a class name to a field type signature.
///
/// `int` becomes `I`, `com.example.Point` becomes `Lcom/example/Point;` and array
/// names such as `[Ljava.lang.String;` keep their shape with slashes.
pub fn signature_of(class_name: &str) -> String {
    if let Some(ft) = FieldType::from_primitive_name(class_name) {
        return (ft.code() as char).to_string();
    }
    if class_name.starts_with('[') {
        class_name.replace('.', "/")
    } else {
        format!("L{};", class_name.replace('.', "/"))
    }
}

/// Converts a reference signature back to a class name.
///
/// Returns `None` for primitive signatures.
pub fn class_name_of(signature: &str) -> Option<String> {
    if signature.starts_with('[') {
        Some(signature.replace('/', "."))
    } else if signature.starts_with('L') && signature.ends_with(';') && signature.len() > 2 {
        Some(signature[1..signature.len() - 1].replace('/', "."))
    } else {
        None
    }
}

/// A serializable field as it appears in a class descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamField {
    name: String,
    field_type: FieldType,
    signature: String,
    unshared: bool,
    offset: usize,
}

impl StreamField {
    /// Creates a field from its name and type signature.
    pub fn new(name: impl Into<String>, signature: impl Into<String>, unshared: bool) -> Result<Self> {
        let signature = signature.into();
        let field_type = FieldType::from_signature(&signature)?;
        Ok(Self {
            name: name.into(),
            field_type,
            signature,
            unshared,
            offset: 0,
        })
    }

    /// Returns the field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the field type code.
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Returns the full type signature.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Returns true if the field is written with unshared semantics.
    pub fn is_unshared(&self) -> bool {
        self.unshared
    }

    /// Returns true for primitive fields.
    pub fn is_primitive(&self) -> bool {
        self.field_type.is_primitive()
    }

    /// Byte offset in the primitive block, or index in the object slot array.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Class name of a reference field's declared type.
    pub fn type_name(&self) -> Option<String> {
        class_name_of(&self.signature)
    }

    pub(crate) fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }
}

/// Canonical descriptor order: primitives first, then by name.
pub fn canonical_order(a: &StreamField, b: &StreamField) -> Ordering {
    match (a.is_primitive(), b.is_primitive()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.name.cmp(&b.name),
    }
}

/// Assigns offsets to fields in wire order.
///
/// Returns `(primitive block size, object field count)`. Fails with "illegal field
/// order" when a primitive field follows a reference field.
pub fn compute_offsets(class_name: &str, fields: &mut [StreamField]) -> Result<(usize, usize)> {
    let mut prim_size = 0;
    let mut obj_count = 0;
    let mut first_obj: Option<usize> = None;
    for (i, field) in fields.iter_mut().enumerate() {
        if field.is_primitive() {
            field.set_offset(prim_size);
            prim_size += field.field_type().primitive_size();
        } else {
            field.set_offset(obj_count);
            obj_count += 1;
            first_obj.get_or_insert(i);
        }
    }
    if let Some(first) = first_obj {
        if first + obj_count != fields.len() {
            return Err(StreamError::invalid_class(class_name, "illegal field order"));
        }
    }
    Ok((prim_size, obj_count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_codes() {
        for code in b"ZBCSIJFDL[" {
            assert_eq!(FieldType::from_code(*code).unwrap().code(), *code);
        }
        assert!(FieldType::from_code(b'X').is_err());
    }

    #[test]
    fn test_primitive_sizes() {
        assert_eq!(FieldType::Boolean.primitive_size(), 1);
        assert_eq!(FieldType::Char.primitive_size(), 2);
        assert_eq!(FieldType::Float.primitive_size(), 4);
        assert_eq!(FieldType::Long.primitive_size(), 8);
        assert_eq!(FieldType::Object.primitive_size(), 0);
    }

    #[test]
    fn test_from_signature() {
        assert_eq!(FieldType::from_signature("I").unwrap(), FieldType::Int);
        assert_eq!(
            FieldType::from_signature("Ljava/lang/String;").unwrap(),
            FieldType::Object
        );
        assert_eq!(FieldType::from_signature("[I").unwrap(), FieldType::Array);
        assert!(FieldType::from_signature("").is_err());
        assert!(FieldType::from_signature("II").is_err());
        assert!(FieldType::from_signature("Ljava/lang/String").is_err());
    }

    #[test]
    fn test_signature_of() {
        assert_eq!(signature_of("int"), "I");
        assert_eq!(signature_of("java.lang.String"), "Ljava/lang/String;");
        assert_eq!(signature_of("[Ljava.lang.String;"), "[Ljava/lang/String;");
        assert_eq!(signature_of("[[J"), "[[J");
    }

    #[test]
    fn test_class_name_of() {
        assert_eq!(
            class_name_of("Ljava/lang/String;").as_deref(),
            Some("java.lang.String")
        );
        assert_eq!(
            class_name_of("[Ljava/lang/String;").as_deref(),
            Some("[Ljava.lang.String;")
        );
        assert_eq!(class_name_of("I"), None);
    }

    #[test]
    fn test_canonical_order() {
        let mut fields = vec![
            StreamField::new("name", "Ljava/lang/String;", false).unwrap(),
            StreamField::new("y", "I", false).unwrap(),
            StreamField::new("x", "J", false).unwrap(),
            StreamField::new("alias", "Ljava/lang/String;", false).unwrap(),
        ];
        fields.sort_by(canonical_order);
        let names: Vec<_> = fields.iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["x", "y", "alias", "name"]);
    }

    #[test]
    fn test_compute_offsets() {
        let mut fields = vec![
            StreamField::new("a", "Z", false).unwrap(),
            StreamField::new("b", "J", false).unwrap(),
            StreamField::new("c", "I", false).unwrap(),
            StreamField::new("d", "Ljava/lang/Object;", false).unwrap(),
            StreamField::new("e", "[B", false).unwrap(),
        ];
        let (prim, objs) = compute_offsets("T", &mut fields).unwrap();
        assert_eq!(prim, 13);
        assert_eq!(objs, 2);
        assert_eq!(fields[1].offset(), 1);
        assert_eq!(fields[2].offset(), 9);
        assert_eq!(fields[4].offset(), 1);
    }

    #[test]
    fn test_illegal_field_order() {
        let mut fields = vec![
            StreamField::new("d", "Ljava/lang/Object;", false).unwrap(),
            StreamField::new("a", "I", false).unwrap(),
        ];
        let err = compute_offsets("com.example.Bad", &mut fields).unwrap_err();
        assert!(err.to_string().contains("illegal field order"));
    }
}
