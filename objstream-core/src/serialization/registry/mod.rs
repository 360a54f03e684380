//! Type registry: the host's catalog of type definitions and their derived descriptors.
//!
//! Types are resolved by name. Array and primitive types are synthesized on demand and
//! proxy classes are synthesized per interface list. Descriptors and storage layouts are
//! derived lazily and cached; registering a type clears the caches.

mod builtins;
mod typedef;

pub use typedef::{
    modifiers, package_of, Access, FieldDef, MemberSig, TypeDef, TypeDefBuilder, TypeKind,
    EXTERNALIZABLE, SERIALIZABLE,
};

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{Result, StreamError};
use crate::serialization::descriptor::{ClassDescriptor, FieldLayout, FieldType};
use modifiers::*;

/// Name of the root class.
pub const OBJECT: &str = "java.lang.Object";

/// Catalog of host types.
///
/// The registry is shared between writers, readers and heaps through an `Arc`; all
/// methods take `&self`.
pub struct TypeRegistry {
    types: RwLock<HashMap<String, Arc<TypeDef>>>,
    aliases: RwLock<HashMap<String, String>>,
    descriptors: RwLock<HashMap<String, Arc<ClassDescriptor>>>,
    storage: RwLock<HashMap<String, Arc<FieldLayout>>>,
    proxies: RwLock<HashMap<Vec<String>, Arc<TypeDef>>>,
    proxy_counter: AtomicUsize,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.len())
            .finish()
    }
}

impl TypeRegistry {
    /// Creates a registry preloaded with the built-in types (`java.lang.Object`, the
    /// boxed primitives, `java.util.ArrayList`, the exception hierarchy, ...).
    pub fn new() -> Self {
        let types = builtins::builtin_types()
            .into_iter()
            .map(|def| (def.name().to_string(), Arc::new(def)))
            .collect();
        Self {
            types: RwLock::new(types),
            aliases: RwLock::new(HashMap::new()),
            descriptors: RwLock::new(HashMap::new()),
            storage: RwLock::new(HashMap::new()),
            proxies: RwLock::new(HashMap::new()),
            proxy_counter: AtomicUsize::new(0),
        }
    }

    /// Registers a type definition, replacing any previous definition of the same name.
    pub fn register(&self, def: TypeDef) -> Result<()> {
        let name = def.name().to_string();
        if name.is_empty() || name.starts_with('[') || FieldType::from_primitive_name(&name).is_some() {
            return Err(StreamError::invalid_class(
                name,
                "array and primitive types cannot be registered",
            ));
        }
        if def.is_proxy() {
            return Err(StreamError::invalid_class(
                name,
                "proxy classes are synthesized from their interfaces",
            ));
        }
        FieldLayout::new(name.clone(), def.fields())?;
        self.check_hierarchy(&def)?;

        write(&self.types).insert(name.clone(), Arc::new(def));
        write(&self.descriptors).clear();
        write(&self.storage).clear();
        tracing::debug!(class = %name, "registered type");
        Ok(())
    }

    /// Maps a stream class name onto a differently named local type.
    pub fn alias(&self, stream_name: impl Into<String>, local_name: impl Into<String>) {
        write(&self.aliases).insert(stream_name.into(), local_name.into());
    }

    /// Returns true if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        read(&self.types).contains_key(name)
    }

    /// Returns the number of registered and synthesized types.
    pub fn len(&self) -> usize {
        read(&self.types).len()
    }

    /// Returns true if no types are known.
    pub fn is_empty(&self) -> bool {
        read(&self.types).is_empty()
    }

    /// Looks up a type by local name, synthesizing array and primitive types.
    pub fn type_def(&self, name: &str) -> Result<Arc<TypeDef>> {
        if let Some(def) = read(&self.types).get(name) {
            return Ok(Arc::clone(def));
        }
        let def = if let Some(component) = name.strip_prefix('[') {
            self.synthesize_array(name, component)?
        } else if FieldType::from_primitive_name(name).is_some() {
            TypeDef::synthesized(
                name.to_string(),
                TypeKind::Primitive,
                None,
                PUBLIC | FINAL | ABSTRACT,
                Vec::new(),
            )
        } else {
            return Err(StreamError::ClassNotFound(name.to_string()));
        };
        let def = Arc::new(def);
        Ok(Arc::clone(
            write(&self.types)
                .entry(name.to_string())
                .or_insert(def),
        ))
    }

    fn synthesize_array(&self, name: &str, component: &str) -> Result<TypeDef> {
        let component_name = array_component(component)
            .ok_or_else(|| StreamError::ClassNotFound(name.to_string()))?;
        let component_def = self.type_def(&component_name)?;
        let access = if component_def.is_primitive() {
            PUBLIC
        } else {
            component_def.modifiers() & (PUBLIC | PROTECTED | PRIVATE)
        };
        Ok(TypeDef::synthesized(
            name.to_string(),
            TypeKind::Array(component_name),
            Some(OBJECT.to_string()),
            access | FINAL | ABSTRACT,
            vec!["java.lang.Cloneable".to_string(), SERIALIZABLE.to_string()],
        ))
    }

    /// Resolves a class name read from a stream, honoring aliases.
    pub fn resolve(&self, stream_name: &str) -> Result<Arc<TypeDef>> {
        let local = read(&self.aliases).get(stream_name).cloned();
        self.type_def(local.as_deref().unwrap_or(stream_name))
    }

    /// Resolves (or synthesizes) the proxy class implementing `interfaces`.
    pub fn resolve_proxy(&self, interfaces: &[String]) -> Result<Arc<TypeDef>> {
        let mut local_names = Vec::with_capacity(interfaces.len());
        for name in interfaces {
            let def = self.resolve(name)?;
            if !def.is_interface() {
                return Err(StreamError::ClassNotFound(format!(
                    "{} is not an interface",
                    def.name()
                )));
            }
            local_names.push(def.name().to_string());
        }
        if let Some(def) = read(&self.proxies).get(&local_names) {
            return Ok(Arc::clone(def));
        }
        let n = self.proxy_counter.fetch_add(1, Ordering::Relaxed);
        let def = Arc::new(TypeDef::synthesized(
            format!("$Proxy{}", n),
            TypeKind::Proxy(local_names.clone()),
            Some("java.lang.reflect.Proxy".to_string()),
            PUBLIC | FINAL,
            local_names.clone(),
        ));
        let def = Arc::clone(write(&self.proxies).entry(local_names).or_insert(def));
        write(&self.types)
            .entry(def.name().to_string())
            .or_insert_with(|| Arc::clone(&def));
        tracing::debug!(class = %def.name(), "synthesized proxy class");
        Ok(def)
    }

    /// Returns the cached local descriptor of a type, building it on first use.
    pub fn descriptor(&self, name: &str) -> Result<Arc<ClassDescriptor>> {
        if let Some(desc) = read(&self.descriptors).get(name) {
            return Ok(Arc::clone(desc));
        }
        let def = self.type_def(name)?;
        let desc = Arc::new(ClassDescriptor::for_local(self, def)?);
        Ok(Arc::clone(
            write(&self.descriptors)
                .entry(name.to_string())
                .or_insert(desc),
        ))
    }

    /// Returns the type and its superclasses, most-derived first.
    pub fn ancestors(&self, name: &str) -> Result<Vec<Arc<TypeDef>>> {
        let mut chain = Vec::new();
        let mut current = Some(name.to_string());
        while let Some(n) = current {
            let def = self.type_def(&n)?;
            current = def.super_name().map(str::to_string);
            chain.push(def);
        }
        Ok(chain)
    }

    /// Returns true if a value of type `from` can be stored where `to` is declared.
    pub fn is_assignable(&self, from: &str, to: &str) -> bool {
        if from == to {
            return true;
        }
        let Ok(def) = self.type_def(from) else {
            return false;
        };
        if def.is_primitive() {
            return false;
        }
        if to == OBJECT {
            return true;
        }
        if let (TypeKind::Array(from_component), Some(to_rest)) = (def.kind(), to.strip_prefix('[')) {
            let Some(to_component) = array_component(to_rest) else {
                return false;
            };
            let from_prim = FieldType::from_primitive_name(from_component).is_some();
            let to_prim = FieldType::from_primitive_name(&to_component).is_some();
            return if from_prim || to_prim {
                *from_component == to_component
            } else {
                self.is_assignable(from_component, &to_component)
            };
        }

        let mut seen = HashSet::new();
        let mut pending = vec![def];
        while let Some(def) = pending.pop() {
            if !seen.insert(def.name().to_string()) {
                continue;
            }
            if def.name() == to {
                return true;
            }
            let parents = def.super_name().into_iter().chain(def.interfaces().iter().map(String::as_str));
            for parent in parents {
                if let Ok(parent_def) = self.type_def(parent) {
                    pending.push(parent_def);
                }
            }
        }
        false
    }

    /// Returns true if the type is serializable.
    pub fn is_serializable(&self, name: &str) -> bool {
        self.is_assignable(name, SERIALIZABLE)
    }

    /// Returns true if the type is externalizable.
    pub fn is_externalizable(&self, name: &str) -> bool {
        self.is_assignable(name, EXTERNALIZABLE)
    }

    /// Storage layouts of every class level of a type, root first.
    pub fn storage_layouts(&self, name: &str) -> Result<Vec<Arc<FieldLayout>>> {
        let mut layouts = Vec::new();
        for def in self.ancestors(name)?.into_iter().rev() {
            if def.is_interface() {
                continue;
            }
            if let Some(layout) = read(&self.storage).get(def.name()) {
                layouts.push(Arc::clone(layout));
                continue;
            }
            let layout = Arc::new(FieldLayout::new(def.name(), def.fields())?);
            let layout = Arc::clone(
                write(&self.storage)
                    .entry(def.name().to_string())
                    .or_insert(layout),
            );
            layouts.push(layout);
        }
        Ok(layouts)
    }

    /// Names of the serializable class levels of a type, most-derived first.
    pub fn serializable_chain(&self, name: &str) -> Result<Vec<String>> {
        Ok(self
            .ancestors(name)?
            .iter()
            .map(|d| d.name().to_string())
            .take_while(|n| self.is_serializable(n))
            .collect())
    }

    fn check_hierarchy(&self, def: &TypeDef) -> Result<()> {
        let mut seen = HashSet::new();
        seen.insert(def.name().to_string());
        let mut current = def.super_name().map(str::to_string);
        while let Some(name) = current {
            if !seen.insert(name.clone()) {
                return Err(StreamError::invalid_class(
                    def.name(),
                    "circular class hierarchy",
                ));
            }
            current = match read(&self.types).get(&name) {
                Some(parent) => parent.super_name().map(str::to_string),
                None => None,
            };
        }
        Ok(())
    }
}

/// Class name of an array's component, given the array name without its leading `[`.
fn array_component(rest: &str) -> Option<String> {
    let first = rest.as_bytes().first().copied()?;
    match first {
        b'[' => Some(rest.to_string()),
        b'L' if rest.len() > 2 && rest.ends_with(';') => Some(rest[1..rest.len() - 1].to_string()),
        code if rest.len() == 1 => FieldType::from_code(code)
            .ok()
            .and_then(|ft| ft.primitive_name())
            .map(str::to_string),
        _ => None,
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_present() {
        let registry = TypeRegistry::new();
        for name in [
            OBJECT,
            "java.lang.String",
            "java.lang.Integer",
            "java.util.ArrayList",
            "java.io.InvalidClassException",
        ] {
            assert!(registry.contains(name), "{} missing", name);
        }
    }

    #[test]
    fn test_builtin_suids() {
        let registry = TypeRegistry::new();
        let cases = [
            ("java.lang.String", -6849794470754667710),
            ("java.lang.Integer", 1360826667806852920),
            ("java.lang.Long", 4290774380558885855),
            ("java.util.ArrayList", 8683452581122892189),
        ];
        for (name, suid) in cases {
            assert_eq!(registry.descriptor(name).unwrap().suid(), suid, "{}", name);
        }
    }

    #[test]
    fn test_unknown_type_not_found() {
        let registry = TypeRegistry::new();
        let err = registry.type_def("com.example.Missing").unwrap_err();
        assert!(err.is_class_not_found());
    }

    #[test]
    fn test_array_synthesis() {
        let registry = TypeRegistry::new();
        let def = registry.type_def("[I").unwrap();
        assert!(def.is_array());
        assert_eq!(def.modifiers(), PUBLIC | FINAL | ABSTRACT);
        assert_eq!(registry.descriptor("[I").unwrap().suid(), 0x4dba_6026_76ea_b2a5);

        assert!(registry.type_def("[Lcom.example.Missing;").is_err());
        assert!(registry.type_def("[Q").is_err());
        assert!(registry.type_def("[[J").unwrap().is_array());
    }

    #[test]
    fn test_register_rejects_arrays_and_cycles() {
        let registry = TypeRegistry::new();
        assert!(registry.register(TypeDef::builder("[I").build()).is_err());

        registry
            .register(TypeDef::builder("a.A").extends("a.B").build())
            .unwrap();
        let err = registry
            .register(TypeDef::builder("a.B").extends("a.A").build())
            .unwrap_err();
        assert!(err.to_string().contains("circular class hierarchy"));
    }

    #[test]
    fn test_assignability() {
        let registry = TypeRegistry::new();
        assert!(registry.is_assignable("java.lang.Integer", "java.lang.Number"));
        assert!(registry.is_assignable("java.lang.Integer", SERIALIZABLE));
        assert!(registry.is_assignable("java.lang.Integer", OBJECT));
        assert!(!registry.is_assignable("java.lang.Integer", "java.lang.String"));
        assert!(registry.is_assignable("[Ljava.lang.String;", "[Ljava.lang.Object;"));
        assert!(!registry.is_assignable("[I", "[J"));
        assert!(registry.is_assignable("[I", "java.lang.Cloneable"));
        assert!(!registry.is_assignable("int", OBJECT));
    }

    #[test]
    fn test_serializable_chain() {
        let registry = TypeRegistry::new();
        registry
            .register(TypeDef::builder("a.Base").serializable().build())
            .unwrap();
        registry
            .register(TypeDef::builder("a.Child").extends("a.Base").build())
            .unwrap();
        assert_eq!(
            registry.serializable_chain("a.Child").unwrap(),
            vec!["a.Child".to_string(), "a.Base".to_string()]
        );
        assert_eq!(
            registry.serializable_chain("java.util.ArrayList").unwrap(),
            vec!["java.util.ArrayList".to_string()]
        );
    }

    #[test]
    fn test_alias_resolution() {
        let registry = TypeRegistry::new();
        registry
            .register(TypeDef::builder("local.Point").serializable().build())
            .unwrap();
        registry.alias("remote.Point", "local.Point");
        assert_eq!(registry.resolve("remote.Point").unwrap().name(), "local.Point");
    }

    #[test]
    fn test_proxy_synthesis_is_cached() {
        let registry = TypeRegistry::new();
        registry
            .register(TypeDef::interface("a.Service").build())
            .unwrap();
        let names = vec!["a.Service".to_string()];
        let first = registry.resolve_proxy(&names).unwrap();
        let second = registry.resolve_proxy(&names).unwrap();
        assert_eq!(first.name(), second.name());
        assert!(first.is_proxy());
        assert!(registry.is_serializable(first.name()));

        let err = registry
            .resolve_proxy(&["java.lang.String".to_string()])
            .unwrap_err();
        assert!(err.is_class_not_found());
    }

    #[test]
    fn test_storage_layouts_root_first() {
        let registry = TypeRegistry::new();
        let layouts = registry.storage_layouts("java.lang.Integer").unwrap();
        let names: Vec<_> = layouts.iter().map(|l| l.class_name().to_string()).collect();
        assert_eq!(names, vec![OBJECT, "java.lang.Number", "java.lang.Integer"]);
        assert!(layouts[2].field("value").is_some());
    }

    #[test]
    fn test_register_invalidates_descriptor_cache() {
        let registry = TypeRegistry::new();
        registry
            .register(TypeDef::builder("a.P").serializable().serial_version_uid(1).build())
            .unwrap();
        assert_eq!(registry.descriptor("a.P").unwrap().suid(), 1);
        registry
            .register(TypeDef::builder("a.P").serializable().serial_version_uid(2).build())
            .unwrap();
        assert_eq!(registry.descriptor("a.P").unwrap().suid(), 2);
    }
}
