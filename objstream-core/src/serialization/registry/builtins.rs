//! Definitions of the platform types every registry starts with.

use crate::error::{Result, StreamError};
use crate::serialization::descriptor::FieldType;
use crate::serialization::heap::{ArrayElements, ObjectId, Value};
use crate::serialization::hooks::{ObjectInput, ObjectOutput};
use crate::serialization::registry::modifiers::*;
use crate::serialization::registry::{FieldDef, TypeDef, OBJECT};

/// Cap on speculative preallocation driven by counts read from a stream.
const MAX_PREALLOC: usize = 1024;

pub(super) fn builtin_types() -> Vec<TypeDef> {
    let mut types = vec![
        TypeDef::builder(OBJECT)
            .no_super()
            .constructor("()V", PUBLIC)
            .build(),
        TypeDef::interface("java.io.Serializable").build(),
        TypeDef::interface("java.io.Externalizable")
            .implements("java.io.Serializable")
            .build(),
        TypeDef::interface("java.lang.Cloneable").build(),
        TypeDef::interface("java.lang.Comparable").build(),
        TypeDef::interface("java.lang.CharSequence").build(),
        TypeDef::interface("java.lang.reflect.InvocationHandler").build(),
        TypeDef::interface("java.util.RandomAccess").build(),
        TypeDef::builder("java.lang.String")
            .modifiers(PUBLIC | FINAL)
            .serializable()
            .implements("java.lang.Comparable")
            .implements("java.lang.CharSequence")
            .serial_version_uid(-6849794470754667710)
            .persistent_fields(Vec::new())
            .build(),
        TypeDef::enumeration("java.lang.Enum", Vec::<String>::new())
            .extends(OBJECT)
            .modifiers(PUBLIC | ABSTRACT)
            .serializable()
            .implements("java.lang.Comparable")
            .constructor("(Ljava/lang/String;I)V", PROTECTED)
            .build(),
        TypeDef::builder("java.lang.Number")
            .modifiers(PUBLIC | ABSTRACT)
            .serializable()
            .serial_version_uid(-8742448824652078965)
            .build(),
        TypeDef::builder("java.lang.reflect.Proxy")
            .serializable()
            .serial_version_uid(-2222568056686623797)
            .field(
                FieldDef::of_class("h", "java.lang.reflect.InvocationHandler").modifiers(PROTECTED),
            )
            .constructor("(Ljava/lang/reflect/InvocationHandler;)V", PROTECTED)
            .build(),
    ];
    types.extend(boxed_types());
    types.extend(collection_types());
    types.extend(throwable_types());
    types
}

fn boxed(name: &str, super_name: &str, suid: i64, value: FieldType) -> TypeDef {
    TypeDef::builder(name)
        .extends(super_name)
        .modifiers(PUBLIC | FINAL)
        .serializable()
        .implements("java.lang.Comparable")
        .serial_version_uid(suid)
        .field(FieldDef::new("value", value).modifiers(PRIVATE | FINAL))
        .build()
}

fn boxed_types() -> Vec<TypeDef> {
    let number = "java.lang.Number";
    vec![
        boxed("java.lang.Boolean", OBJECT, -3665804199014368530, FieldType::Boolean),
        boxed("java.lang.Character", OBJECT, 3786198910865385080, FieldType::Char),
        boxed("java.lang.Byte", number, -7183698231559129828, FieldType::Byte),
        boxed("java.lang.Short", number, 7515723908773894738, FieldType::Short),
        boxed("java.lang.Integer", number, 1360826667806852920, FieldType::Int),
        boxed("java.lang.Long", number, 4290774380558885855, FieldType::Long),
        boxed("java.lang.Float", number, -2671257302660747028, FieldType::Float),
        boxed("java.lang.Double", number, -9172774392245257468, FieldType::Double),
    ]
}

fn collection_types() -> Vec<TypeDef> {
    vec![
        TypeDef::builder("java.util.AbstractCollection")
            .modifiers(PUBLIC | ABSTRACT)
            .constructor("()V", PROTECTED)
            .build(),
        TypeDef::builder("java.util.AbstractList")
            .extends("java.util.AbstractCollection")
            .modifiers(PUBLIC | ABSTRACT)
            .constructor("()V", PROTECTED)
            .field(FieldDef::new("modCount", FieldType::Int).modifiers(PROTECTED | TRANSIENT))
            .build(),
        TypeDef::builder("java.util.ArrayList")
            .extends("java.util.AbstractList")
            .serializable()
            .implements("java.lang.Cloneable")
            .implements("java.util.RandomAccess")
            .serial_version_uid(8683452581122892189)
            .field(FieldDef::new("size", FieldType::Int))
            .field(FieldDef::of_class("elementData", "[Ljava.lang.Object;").transient())
            .constructor("()V", PUBLIC)
            .write_object(write_array_list)
            .read_object(read_array_list)
            .build(),
    ]
}

fn write_array_list(this: ObjectId, out: &mut dyn ObjectOutput) -> Result<()> {
    out.default_write_object()?;
    let elements = out.heap().list_elements(this)?;
    out.write_int(elements.len() as i32)?;
    for element in elements {
        out.write_object(element)?;
    }
    Ok(())
}

fn read_array_list(this: ObjectId, input: &mut dyn ObjectInput) -> Result<()> {
    input.default_read_object()?;
    input.read_int()?;
    let size = input.heap().field(this, "size")?.as_int().unwrap_or(0);
    if size < 0 {
        return Err(StreamError::InvalidObject(format!("Invalid size: {}", size)));
    }
    let mut elements = Vec::with_capacity((size as usize).min(MAX_PREALLOC));
    for _ in 0..size {
        elements.push(input.read_object()?);
    }
    let array = input
        .heap_mut()
        .alloc_array("[Ljava.lang.Object;", ArrayElements::Object(elements))?;
    input
        .heap_mut()
        .set_field(this, "elementData", Value::Ref(array))
}

fn exception(name: &str, super_name: &str, suid: i64) -> TypeDef {
    TypeDef::builder(name)
        .extends(super_name)
        .serial_version_uid(suid)
        .constructor("()V", PUBLIC)
        .constructor("(Ljava/lang/String;)V", PUBLIC)
        .build()
}

fn throwable_types() -> Vec<TypeDef> {
    let ose = "java.io.ObjectStreamException";
    vec![
        TypeDef::builder("java.lang.Throwable")
            .serializable()
            .serial_version_uid(-3042686055658047285)
            .field(FieldDef::of_class("detailMessage", "java.lang.String"))
            .constructor("()V", PUBLIC)
            .constructor("(Ljava/lang/String;)V", PUBLIC)
            .build(),
        exception("java.lang.Exception", "java.lang.Throwable", -3387516993124229948),
        exception("java.io.IOException", "java.lang.Exception", 7818375828146090155),
        TypeDef::builder(ose)
            .extends("java.io.IOException")
            .modifiers(PUBLIC | ABSTRACT)
            .serial_version_uid(7260898174833392607)
            .constructor("()V", PROTECTED)
            .constructor("(Ljava/lang/String;)V", PROTECTED)
            .build(),
        TypeDef::builder("java.io.InvalidClassException")
            .extends(ose)
            .serial_version_uid(-4333316296251054416)
            .field(FieldDef::of_class("classname", "java.lang.String").modifiers(PUBLIC))
            .constructor("(Ljava/lang/String;)V", PUBLIC)
            .build(),
        exception("java.io.NotSerializableException", ose, 2906642554793891381),
        exception("java.io.StreamCorruptedException", ose, 8983558202217591746),
        exception("java.io.InvalidObjectException", ose, 3233174318281839583),
        exception("java.io.NotActiveException", ose, -3893467273049808895),
        TypeDef::builder("java.io.OptionalDataException")
            .extends(ose)
            .serial_version_uid(-8011121865681257820)
            .field(FieldDef::new("eof", FieldType::Boolean).modifiers(PUBLIC))
            .field(FieldDef::new("length", FieldType::Int).modifiers(PUBLIC))
            .constructor("(I)V", 0)
            .constructor("(Z)V", 0)
            .build(),
        TypeDef::builder("java.io.WriteAbortedException")
            .extends(ose)
            .serial_version_uid(-3326426625597282442)
            .field(FieldDef::of_class("detail", "java.lang.Exception").modifiers(PUBLIC))
            .constructor("(Ljava/lang/String;Ljava/lang/Exception;)V", PUBLIC)
            .build(),
        exception("java.io.EOFException", "java.io.IOException", 6433858223774886977),
        exception(
            "java.lang.ReflectiveOperationException",
            "java.lang.Exception",
            123456789,
        ),
        TypeDef::builder("java.lang.ClassNotFoundException")
            .extends("java.lang.ReflectiveOperationException")
            .serial_version_uid(9176873029745254542)
            .field(FieldDef::of_class("ex", "java.lang.Throwable"))
            .constructor("()V", PUBLIC)
            .constructor("(Ljava/lang/String;)V", PUBLIC)
            .build(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_builtin_names_unique() {
        let types = builtin_types();
        let names: HashSet<_> = types.iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names.len(), types.len());
    }

    #[test]
    fn test_array_list_has_hooks() {
        let types = builtin_types();
        let list = types
            .iter()
            .find(|t| t.name() == "java.util.ArrayList")
            .unwrap();
        assert!(list.hooks().has_write_object());
        assert!(list.hooks().has_read_object());
        assert!(list.fields().iter().any(|f| f.name() == "elementData" && f.is_transient()));
    }

    #[test]
    fn test_exception_hierarchy() {
        let types = builtin_types();
        let find = |n: &str| types.iter().find(|t| t.name() == n).unwrap();
        assert_eq!(
            find("java.io.InvalidClassException").super_name(),
            Some("java.io.ObjectStreamException")
        );
        assert_eq!(
            find("java.io.EOFException").super_name(),
            Some("java.io.IOException")
        );
    }
}
