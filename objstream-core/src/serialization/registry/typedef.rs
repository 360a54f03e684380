//! Host-declared structural signatures of types.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::serialization::descriptor::{signature_of, FieldType};
use crate::serialization::heap::{Heap, ObjectId, Value};
use crate::serialization::hooks::{
    Externalizable, ObjectInput, ObjectOutput, TypeHooks,
};

/// Modifier bits, numerically identical to the JVM access flags so version ids
/// computed from them match.
pub mod modifiers {
    /// `public`
    pub const PUBLIC: u16 = 0x0001;
    /// `private`
    pub const PRIVATE: u16 = 0x0002;
    /// `protected`
    pub const PROTECTED: u16 = 0x0004;
    /// `static`
    pub const STATIC: u16 = 0x0008;
    /// `final`
    pub const FINAL: u16 = 0x0010;
    /// `synchronized`
    pub const SYNCHRONIZED: u16 = 0x0020;
    /// `volatile`
    pub const VOLATILE: u16 = 0x0040;
    /// `transient`
    pub const TRANSIENT: u16 = 0x0080;
    /// `native`
    pub const NATIVE: u16 = 0x0100;
    /// interface type
    pub const INTERFACE: u16 = 0x0200;
    /// `abstract`
    pub const ABSTRACT: u16 = 0x0400;
    /// `strictfp`
    pub const STRICT: u16 = 0x0800;
}

use modifiers::*;

/// Name of the marker interface for default serialization.
pub const SERIALIZABLE: &str = "java.io.Serializable";
/// Name of the marker interface for externalizable types.
pub const EXTERNALIZABLE: &str = "java.io.Externalizable";

/// Member visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Visible everywhere.
    Public,
    /// Visible to subclasses and the same package.
    Protected,
    /// Visible within the same package.
    Package,
    /// Visible only within the declaring type.
    Private,
}

impl Access {
    /// Extracts the visibility from modifier bits.
    pub fn from_modifiers(mods: u16) -> Self {
        if mods & PUBLIC != 0 {
            Access::Public
        } else if mods & PROTECTED != 0 {
            Access::Protected
        } else if mods & PRIVATE != 0 {
            Access::Private
        } else {
            Access::Package
        }
    }

    /// Returns the modifier bits for this visibility.
    pub fn modifiers(self) -> u16 {
        match self {
            Access::Public => PUBLIC,
            Access::Protected => PROTECTED,
            Access::Package => 0,
            Access::Private => PRIVATE,
        }
    }
}

/// Signature of a declared constructor or method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberSig {
    name: String,
    descriptor: String,
    modifiers: u16,
}

impl MemberSig {
    /// Creates a member signature such as `("toString", "()Ljava/lang/String;", PUBLIC)`.
    pub fn new(name: impl Into<String>, descriptor: impl Into<String>, modifiers: u16) -> Self {
        Self {
            name: name.into(),
            descriptor: descriptor.into(),
            modifiers,
        }
    }

    /// Returns the member name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the method descriptor, e.g. `(I)V`.
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// Returns the modifier bits.
    pub fn modifiers(&self) -> u16 {
        self.modifiers
    }
}

/// A declared instance or static field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    name: String,
    signature: String,
    modifiers: u16,
    unshared: bool,
}

impl FieldDef {
    /// Declares a private field of the given type.
    ///
    /// `FieldType::Object` declares `java.lang.Object` and `FieldType::Array` declares
    /// `java.lang.Object[]`; use [`FieldDef::of_class`] for other reference types.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        let signature = match field_type {
            FieldType::Object => "Ljava/lang/Object;".to_string(),
            FieldType::Array => "[Ljava/lang/Object;".to_string(),
            prim => (prim.code() as char).to_string(),
        };
        Self::with_signature(name, signature)
    }

    /// Declares a private field whose type is the named class, array or primitive.
    pub fn of_class(name: impl Into<String>, class_name: &str) -> Self {
        Self::with_signature(name, signature_of(class_name))
    }

    /// Declares a private field from a raw type signature.
    pub fn with_signature(name: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            signature: signature.into(),
            modifiers: PRIVATE,
            unshared: false,
        }
    }

    /// Replaces the modifier bits.
    pub fn modifiers(mut self, modifiers: u16) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Marks the field `transient`.
    pub fn transient(mut self) -> Self {
        self.modifiers |= TRANSIENT;
        self
    }

    /// Marks the field `static`.
    pub fn static_field(mut self) -> Self {
        self.modifiers |= STATIC;
        self
    }

    /// Requests unshared semantics for a persistent field entry.
    pub fn unshared(mut self) -> Self {
        self.unshared = true;
        self
    }

    /// Returns the field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the type signature.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Returns the modifier bits.
    pub fn modifier_bits(&self) -> u16 {
        self.modifiers
    }

    /// Returns true if the field is unshared.
    pub fn is_unshared(&self) -> bool {
        self.unshared
    }

    /// Returns true for `static` fields.
    pub fn is_static(&self) -> bool {
        self.modifiers & STATIC != 0
    }

    /// Returns true for `transient` fields.
    pub fn is_transient(&self) -> bool {
        self.modifiers & TRANSIENT != 0
    }
}

/// What kind of type a [`TypeDef`] declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    /// An ordinary class.
    Class,
    /// An interface.
    Interface,
    /// An enum type with its constants in declaration order.
    Enum(Vec<String>),
    /// A dynamic proxy class implementing the listed interfaces.
    Proxy(Vec<String>),
    /// An array type with the given component type name.
    Array(String),
    /// A primitive type such as `int`.
    Primitive,
}

/// Structural signature of a type, supplied by the host.
///
/// The registry derives class descriptors, version ids and instance layouts from this
/// definition.
#[derive(Clone)]
pub struct TypeDef {
    name: String,
    kind: TypeKind,
    super_name: Option<String>,
    modifiers: u16,
    interfaces: Vec<String>,
    declared_suid: Option<i64>,
    fields: Vec<FieldDef>,
    persistent_fields: Option<Vec<FieldDef>>,
    constructors: Vec<MemberSig>,
    methods: Vec<MemberSig>,
    static_initializer: bool,
    hooks: TypeHooks,
    externalizer: Option<Arc<dyn Externalizable>>,
}

impl fmt::Debug for TypeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDef")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("super_name", &self.super_name)
            .field("interfaces", &self.interfaces)
            .field("declared_suid", &self.declared_suid)
            .field("fields", &self.fields)
            .field("hooks", &self.hooks)
            .field("externalizer", &self.externalizer.is_some())
            .finish()
    }
}

impl TypeDef {
    /// Starts a class definition.
    pub fn builder(name: impl Into<String>) -> TypeDefBuilder {
        TypeDefBuilder::new(name.into(), TypeKind::Class)
    }

    /// Starts an interface definition.
    pub fn interface(name: impl Into<String>) -> TypeDefBuilder {
        TypeDefBuilder::new(name.into(), TypeKind::Interface)
    }

    /// Starts an enum definition with the given constants.
    pub fn enumeration<I, S>(name: impl Into<String>, constants: I) -> TypeDefBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let constants = constants.into_iter().map(Into::into).collect();
        TypeDefBuilder::new(name.into(), TypeKind::Enum(constants))
    }

    pub(crate) fn synthesized(name: String, kind: TypeKind, super_name: Option<String>, modifiers: u16, interfaces: Vec<String>) -> Self {
        Self {
            name,
            kind,
            super_name,
            modifiers,
            interfaces,
            declared_suid: None,
            fields: Vec::new(),
            persistent_fields: None,
            constructors: Vec::new(),
            methods: Vec::new(),
            static_initializer: false,
            hooks: TypeHooks::default(),
            externalizer: None,
        }
    }

    /// Returns the qualified type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the type kind.
    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    /// Returns the superclass name; `None` for `java.lang.Object`, interfaces and primitives.
    pub fn super_name(&self) -> Option<&str> {
        self.super_name.as_deref()
    }

    /// Returns the class modifier bits.
    pub fn modifiers(&self) -> u16 {
        self.modifiers
    }

    /// Returns the directly implemented interfaces.
    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    /// Returns the declared version id, if any.
    pub fn declared_suid(&self) -> Option<i64> {
        self.declared_suid
    }

    /// Returns all declared fields, static and transient ones included.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Returns the explicit serializable field list, if declared.
    pub fn persistent_fields(&self) -> Option<&[FieldDef]> {
        self.persistent_fields.as_deref()
    }

    /// Returns the declared methods.
    pub fn methods(&self) -> &[MemberSig] {
        &self.methods
    }

    /// Returns true if the type has a static initializer.
    pub fn has_static_initializer(&self) -> bool {
        self.static_initializer
    }

    /// Returns the hooks declared directly on this type.
    pub fn hooks(&self) -> &TypeHooks {
        &self.hooks
    }

    /// Returns the externalizer declared directly on this type.
    pub fn externalizer(&self) -> Option<&Arc<dyn Externalizable>> {
        self.externalizer.as_ref()
    }

    /// Returns true for interfaces.
    pub fn is_interface(&self) -> bool {
        matches!(self.kind, TypeKind::Interface)
    }

    /// Returns true for array types.
    pub fn is_array(&self) -> bool {
        matches!(self.kind, TypeKind::Array(_))
    }

    /// Returns true for primitive types.
    pub fn is_primitive(&self) -> bool {
        matches!(self.kind, TypeKind::Primitive)
    }

    /// Returns true for proxy classes.
    pub fn is_proxy(&self) -> bool {
        matches!(self.kind, TypeKind::Proxy(_))
    }

    /// Returns true for enum types, `java.lang.Enum` included.
    pub fn is_enum(&self) -> bool {
        matches!(self.kind, TypeKind::Enum(_))
    }

    /// Returns the enum constants, or an empty slice for non-enum types.
    pub fn enum_constants(&self) -> &[String] {
        match &self.kind {
            TypeKind::Enum(constants) => constants,
            _ => &[],
        }
    }

    /// Package part of the name, empty for the default package.
    pub fn package(&self) -> &str {
        package_of(&self.name)
    }

    /// Declared constructors; a class without any gets the implicit no-arg constructor
    /// with the class's own visibility.
    pub fn effective_constructors(&self) -> Vec<MemberSig> {
        if !self.constructors.is_empty() || !matches!(self.kind, TypeKind::Class) {
            return self.constructors.clone();
        }
        let access = self.modifiers & (PUBLIC | PROTECTED | PRIVATE);
        vec![MemberSig::new("<init>", "()V", access)]
    }

    /// Visibility of the no-arg constructor, or `None` if there is none.
    pub fn no_arg_constructor(&self) -> Option<Access> {
        self.effective_constructors()
            .iter()
            .find(|c| c.descriptor == "()V")
            .map(|c| Access::from_modifiers(c.modifiers))
    }

    /// Fields that need per-instance storage.
    pub fn instance_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| !f.is_static())
    }
}

/// Returns the package part of a qualified class name.
pub fn package_of(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) => &name[..idx],
        None => "",
    }
}

/// Builder for [`TypeDef`].
pub struct TypeDefBuilder {
    def: TypeDef,
}

impl TypeDefBuilder {
    fn new(name: String, kind: TypeKind) -> Self {
        let (super_name, modifiers) = match &kind {
            TypeKind::Interface => (None, PUBLIC | INTERFACE | ABSTRACT),
            TypeKind::Enum(_) => (Some("java.lang.Enum".to_string()), PUBLIC | FINAL),
            _ => (Some("java.lang.Object".to_string()), PUBLIC),
        };
        Self {
            def: TypeDef::synthesized(name, kind, super_name, modifiers, Vec::new()),
        }
    }

    /// Sets the superclass.
    pub fn extends(mut self, super_name: impl Into<String>) -> Self {
        self.def.super_name = Some(super_name.into());
        self
    }

    /// Clears the superclass; only meaningful for root types.
    pub fn no_super(mut self) -> Self {
        self.def.super_name = None;
        self
    }

    /// Adds a directly implemented interface.
    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        let interface = interface.into();
        if !self.def.interfaces.contains(&interface) {
            self.def.interfaces.push(interface);
        }
        self
    }

    /// Declares the type serializable with default field layout.
    pub fn serializable(self) -> Self {
        self.implements(SERIALIZABLE)
    }

    /// Declares the type externalizable with the given read/write implementation.
    pub fn externalizable<E>(mut self, externalizer: E) -> Self
    where
        E: Externalizable + 'static,
    {
        self.def.externalizer = Some(Arc::new(externalizer));
        self.implements(EXTERNALIZABLE)
    }

    /// Declares the version id instead of computing it.
    pub fn serial_version_uid(mut self, suid: i64) -> Self {
        self.def.declared_suid = Some(suid);
        self
    }

    /// Replaces the class modifier bits.
    pub fn modifiers(mut self, modifiers: u16) -> Self {
        self.def.modifiers = modifiers;
        self
    }

    /// Adds a declared field.
    pub fn field(mut self, field: FieldDef) -> Self {
        self.def.fields.push(field);
        self
    }

    /// Adds several declared fields.
    pub fn fields(mut self, fields: impl IntoIterator<Item = FieldDef>) -> Self {
        self.def.fields.extend(fields);
        self
    }

    /// Declares the serializable field list explicitly, overriding the declared fields.
    pub fn persistent_fields(mut self, fields: impl IntoIterator<Item = FieldDef>) -> Self {
        self.def.persistent_fields = Some(fields.into_iter().collect());
        self
    }

    /// Adds a declared constructor by descriptor, e.g. `("()V", PUBLIC)`.
    pub fn constructor(mut self, descriptor: impl Into<String>, modifiers: u16) -> Self {
        self.def
            .constructors
            .push(MemberSig::new("<init>", descriptor, modifiers));
        self
    }

    /// Adds a declared method.
    pub fn method(
        mut self,
        name: impl Into<String>,
        descriptor: impl Into<String>,
        modifiers: u16,
    ) -> Self {
        self.def.methods.push(MemberSig::new(name, descriptor, modifiers));
        self
    }

    /// Marks the type as having a static initializer.
    pub fn static_initializer(mut self) -> Self {
        self.def.static_initializer = true;
        self
    }

    /// Installs a custom write hook for this class level.
    pub fn write_object<F>(mut self, hook: F) -> Self
    where
        F: Fn(ObjectId, &mut dyn ObjectOutput) -> Result<()> + Send + Sync + 'static,
    {
        self.def.hooks.write_object = Some(Arc::new(hook));
        self
    }

    /// Installs a custom read hook for this class level.
    pub fn read_object<F>(mut self, hook: F) -> Self
    where
        F: Fn(ObjectId, &mut dyn ObjectInput) -> Result<()> + Send + Sync + 'static,
    {
        self.def.hooks.read_object = Some(Arc::new(hook));
        self
    }

    /// Installs the hook run when the stream carries no data for this class level.
    pub fn read_object_no_data<F>(mut self, hook: F) -> Self
    where
        F: Fn(ObjectId, &mut Heap) -> Result<()> + Send + Sync + 'static,
    {
        self.def.hooks.read_object_no_data = Some(Arc::new(hook));
        self
    }

    /// Installs a substitution applied before an instance is written.
    pub fn write_replace<F>(mut self, hook: F) -> Self
    where
        F: Fn(ObjectId, &mut Heap) -> Result<Value> + Send + Sync + 'static,
    {
        self.def.hooks.write_replace = Some(Arc::new(hook));
        self
    }

    /// Installs a substitution applied after an instance is read.
    pub fn read_resolve<F>(mut self, hook: F) -> Self
    where
        F: Fn(ObjectId, &mut Heap) -> Result<Value> + Send + Sync + 'static,
    {
        self.def.hooks.read_resolve = Some(Arc::new(hook));
        self
    }

    /// Finishes the definition.
    pub fn build(self) -> TypeDef {
        self.def
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let def = TypeDef::builder("com.example.Point").build();
        assert_eq!(def.name(), "com.example.Point");
        assert_eq!(def.super_name(), Some("java.lang.Object"));
        assert_eq!(def.modifiers(), PUBLIC);
        assert_eq!(def.kind(), &TypeKind::Class);
        assert!(def.interfaces().is_empty());
    }

    #[test]
    fn test_serializable_adds_marker_once() {
        let def = TypeDef::builder("a.B").serializable().serializable().build();
        assert_eq!(def.interfaces(), &[SERIALIZABLE.to_string()]);
    }

    #[test]
    fn test_enum_defaults() {
        let def = TypeDef::enumeration("a.Color", ["RED", "GREEN"]).build();
        assert!(def.is_enum());
        assert_eq!(def.super_name(), Some("java.lang.Enum"));
        assert_eq!(def.enum_constants(), &["RED".to_string(), "GREEN".to_string()]);
    }

    #[test]
    fn test_implicit_constructor_follows_class_access() {
        let def = TypeDef::builder("a.B").build();
        assert_eq!(def.no_arg_constructor(), Some(Access::Public));

        let hidden = TypeDef::builder("a.C").modifiers(0).build();
        assert_eq!(hidden.no_arg_constructor(), Some(Access::Package));
    }

    #[test]
    fn test_declared_constructor_replaces_implicit() {
        let def = TypeDef::builder("a.B").constructor("(I)V", PUBLIC).build();
        assert_eq!(def.no_arg_constructor(), None);

        let private = TypeDef::builder("a.C").constructor("()V", PRIVATE).build();
        assert_eq!(private.no_arg_constructor(), Some(Access::Private));
    }

    #[test]
    fn test_field_def_signatures() {
        assert_eq!(FieldDef::new("x", FieldType::Int).signature(), "I");
        assert_eq!(
            FieldDef::of_class("s", "java.lang.String").signature(),
            "Ljava/lang/String;"
        );
        assert_eq!(FieldDef::of_class("v", "[I").signature(), "[I");
        let f = FieldDef::new("cache", FieldType::Object).transient();
        assert!(f.is_transient());
        assert!(!f.is_static());
    }

    #[test]
    fn test_instance_fields_skip_static() {
        let def = TypeDef::builder("a.B")
            .field(FieldDef::new("x", FieldType::Int))
            .field(FieldDef::new("COUNT", FieldType::Int).static_field())
            .build();
        let names: Vec<_> = def.instance_fields().map(|f| f.name()).collect();
        assert_eq!(names, vec!["x"]);
    }

    #[test]
    fn test_package_of() {
        assert_eq!(package_of("com.example.Point"), "com.example");
        assert_eq!(package_of("Point"), "");
    }

    #[test]
    fn test_access_round_trip() {
        for access in [Access::Public, Access::Protected, Access::Package, Access::Private] {
            assert_eq!(Access::from_modifiers(access.modifiers()), access);
        }
    }
}
