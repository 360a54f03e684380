//! Default version id computation.
//!
//! The digest covers the type's name, masked class modifiers, sorted interface names,
//! sorted field signatures, the static initializer and the non-private constructors and
//! methods, so two independent definitions of the same shape hash identically.

use sha1::{Digest, Sha1};

use crate::error::Result;
use crate::serialization::registry::modifiers::*;
use crate::serialization::registry::TypeDef;
use crate::serialization::{DataOutput, ObjectDataOutput};

const CLASS_MASK: u16 = PUBLIC | FINAL | INTERFACE | ABSTRACT;
const FIELD_MASK: u16 = PUBLIC | PRIVATE | PROTECTED | STATIC | FINAL | VOLATILE | TRANSIENT;
const METHOD_MASK: u16 =
    PUBLIC | PRIVATE | PROTECTED | STATIC | FINAL | SYNCHRONIZED | NATIVE | ABSTRACT | STRICT;

/// Computes the default version id of a type from its structural signature.
pub fn compute_default_suid(def: &TypeDef) -> Result<i64> {
    let mut out = ObjectDataOutput::with_capacity(512);
    out.write_utf(def.name())?;

    let mut class_mods = def.modifiers() & CLASS_MASK;
    if class_mods & INTERFACE != 0 {
        class_mods = if def.methods().is_empty() {
            class_mods & !ABSTRACT
        } else {
            class_mods | ABSTRACT
        };
    }
    out.write_int(class_mods as i32)?;

    if !def.is_array() {
        let mut interfaces: Vec<&str> = def.interfaces().iter().map(String::as_str).collect();
        interfaces.sort_unstable();
        for name in interfaces {
            out.write_utf(name)?;
        }
    }

    let mut fields: Vec<_> = def.fields().iter().collect();
    fields.sort_by(|a, b| a.name().cmp(b.name()));
    for field in fields {
        let mods = field.modifier_bits() & FIELD_MASK;
        if mods & PRIVATE == 0 || mods & (STATIC | TRANSIENT) == 0 {
            out.write_utf(field.name())?;
            out.write_int(mods as i32)?;
            out.write_utf(field.signature())?;
        }
    }

    if def.has_static_initializer() {
        out.write_utf("<clinit>")?;
        out.write_int(STATIC as i32)?;
        out.write_utf("()V")?;
    }

    let mut constructors = def.effective_constructors();
    constructors.sort_by(|a, b| a.descriptor().cmp(b.descriptor()));
    for ctor in &constructors {
        let mods = ctor.modifiers() & METHOD_MASK;
        if mods & PRIVATE == 0 {
            out.write_utf("<init>")?;
            out.write_int(mods as i32)?;
            out.write_utf(&ctor.descriptor().replace('/', "."))?;
        }
    }

    let mut methods: Vec<_> = def.methods().iter().collect();
    methods.sort_by(|a, b| {
        a.name()
            .cmp(b.name())
            .then_with(|| a.descriptor().cmp(b.descriptor()))
    });
    for method in methods {
        let mods = method.modifiers() & METHOD_MASK;
        if mods & PRIVATE == 0 {
            out.write_utf(method.name())?;
            out.write_int(mods as i32)?;
            out.write_utf(&method.descriptor().replace('/', "."))?;
        }
    }

    let digest = Sha1::digest(out.as_bytes());
    let mut hash: i64 = 0;
    for byte in digest.iter().take(8).rev() {
        hash = (hash << 8) | *byte as i64;
    }
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::descriptor::FieldType;
    use crate::serialization::registry::{FieldDef, TypeKind};

    fn array_def(name: &str) -> TypeDef {
        TypeDef::synthesized(
            name.to_string(),
            TypeKind::Array("int".to_string()),
            Some("java.lang.Object".to_string()),
            PUBLIC | FINAL | ABSTRACT,
            vec!["java.lang.Cloneable".to_string(), "java.io.Serializable".to_string()],
        )
    }

    #[test]
    fn test_int_array_suid_matches_reference_value() {
        assert_eq!(
            compute_default_suid(&array_def("[I")).unwrap(),
            0x4dba_6026_76ea_b2a5
        );
    }

    #[test]
    fn test_byte_array_suid_matches_reference_value() {
        assert_eq!(
            compute_default_suid(&array_def("[B")).unwrap(),
            0xacf3_17f8_0608_54e0_u64 as i64
        );
    }

    #[test]
    fn test_string_array_suid_matches_reference_value() {
        assert_eq!(
            compute_default_suid(&array_def("[Ljava.lang.String;")).unwrap(),
            0xadd2_56e7_e91d_7b47_u64 as i64
        );
    }

    #[test]
    fn test_suid_is_stable_across_definitions() {
        let make = || {
            TypeDef::builder("com.example.Point")
                .serializable()
                .field(FieldDef::new("y", FieldType::Int))
                .field(FieldDef::new("x", FieldType::Int))
                .build()
        };
        let reordered = TypeDef::builder("com.example.Point")
            .serializable()
            .field(FieldDef::new("x", FieldType::Int))
            .field(FieldDef::new("y", FieldType::Int))
            .build();
        let a = compute_default_suid(&make()).unwrap();
        assert_eq!(a, compute_default_suid(&make()).unwrap());
        assert_eq!(a, compute_default_suid(&reordered).unwrap());
    }

    #[test]
    fn test_suid_changes_with_shape() {
        let base = TypeDef::builder("com.example.Point")
            .serializable()
            .field(FieldDef::new("x", FieldType::Int))
            .build();
        let wider = TypeDef::builder("com.example.Point")
            .serializable()
            .field(FieldDef::new("x", FieldType::Long))
            .build();
        assert_ne!(
            compute_default_suid(&base).unwrap(),
            compute_default_suid(&wider).unwrap()
        );
    }

    #[test]
    fn test_private_transient_field_ignored() {
        let base = TypeDef::builder("com.example.Cache")
            .serializable()
            .build();
        let with_transient = TypeDef::builder("com.example.Cache")
            .serializable()
            .field(FieldDef::new("memo", FieldType::Object).transient())
            .build();
        assert_eq!(
            compute_default_suid(&base).unwrap(),
            compute_default_suid(&with_transient).unwrap()
        );
    }

    #[test]
    fn test_private_methods_ignored() {
        let base = TypeDef::builder("com.example.Node").serializable().build();
        let with_private = TypeDef::builder("com.example.Node")
            .serializable()
            .method("helper", "()V", PRIVATE)
            .build();
        let with_public = TypeDef::builder("com.example.Node")
            .serializable()
            .method("helper", "()V", PUBLIC)
            .build();
        let base_suid = compute_default_suid(&base).unwrap();
        assert_eq!(base_suid, compute_default_suid(&with_private).unwrap());
        assert_ne!(base_suid, compute_default_suid(&with_public).unwrap());
    }
}
