//! Class descriptors: the on-wire description of a type and its binding to a local type.
//!
//! A descriptor is either built from a local [`TypeDef`] (write side, and the local half
//! of a read-side binding) or read from the stream and bound to the local type of the
//! same name. A bound descriptor keeps the stream's field list and maps it onto local
//! storage through a [`FieldReflector`]; fields present on only one side are skipped or
//! defaulted.

mod field;
mod layout;
mod reflector;
mod suid;

pub use field::{
    canonical_order, class_name_of, compute_offsets, signature_of, FieldType, StreamField,
};
pub use layout::{ClassDataSlot, FieldLayout, StorageField};
pub(crate) use layout::{LayoutEntry, SlotSource};
pub use reflector::FieldReflector;
pub use suid::compute_default_suid;

use std::fmt;
use std::sync::Arc;

use crate::error::{Result, StreamError};
use crate::protocol::{
    ProtocolVersion, SC_BLOCK_DATA, SC_ENUM, SC_EXTERNALIZABLE, SC_SERIALIZABLE, SC_WRITE_METHOD,
};
use crate::serialization::hooks::{Externalizable, ReadResolveHook, TypeHooks, WriteReplaceHook};
use crate::serialization::registry::{Access, TypeDef, TypeKind, TypeRegistry};

/// What a descriptor describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    /// A class using default or hook-driven field serialization, or a non-serializable type.
    Ordinary,
    /// A class that writes its whole payload itself.
    Externalizable,
    /// An enum type.
    Enum,
    /// A dynamic proxy class.
    Proxy,
}

/// The local half of a descriptor: everything derived from the host's [`TypeDef`].
pub(crate) struct LocalClass {
    pub(crate) def: Arc<TypeDef>,
    pub(crate) suid: i64,
    pub(crate) serializable: bool,
    pub(crate) externalizable: bool,
    pub(crate) fields: Vec<StreamField>,
    pub(crate) own_layout: Arc<FieldLayout>,
    pub(crate) layouts: Vec<Arc<FieldLayout>>,
    pub(crate) hooks: TypeHooks,
    pub(crate) externalizer: Option<Arc<dyn Externalizable>>,
    pub(crate) serialize_error: Option<StreamError>,
    pub(crate) default_serialize_error: Option<StreamError>,
}

impl fmt::Debug for LocalClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalClass")
            .field("name", &self.def.name())
            .field("suid", &self.suid)
            .field("serializable", &self.serializable)
            .field("externalizable", &self.externalizable)
            .field("hooks", &self.hooks)
            .finish()
    }
}

/// Serialization descriptor of a class.
#[derive(Debug, Clone)]
pub struct ClassDescriptor {
    name: String,
    suid: i64,
    kind: DescriptorKind,
    serializable: bool,
    externalizable: bool,
    has_write_object_data: bool,
    has_block_external_data: bool,
    fields: Vec<StreamField>,
    prim_data_size: usize,
    num_obj_fields: usize,
    interfaces: Vec<String>,
    super_desc: Option<Arc<ClassDescriptor>>,
    local: Option<Arc<LocalClass>>,
    reflector: FieldReflector,
    resolve_error: Option<StreamError>,
    deserialize_error: Option<StreamError>,
    layout: Vec<LayoutEntry>,
}

/// A descriptor as read off the wire, before binding.
#[derive(Debug)]
pub(crate) struct WireDescriptor {
    pub(crate) name: String,
    pub(crate) suid: i64,
    pub(crate) flags: u8,
    pub(crate) fields: Vec<StreamField>,
    prim_data_size: usize,
    num_obj_fields: usize,
}

impl WireDescriptor {
    /// Validates flags and field order of a descriptor read from the stream.
    pub(crate) fn new(
        name: String,
        suid: i64,
        flags: u8,
        mut fields: Vec<StreamField>,
    ) -> Result<Self> {
        let externalizable = flags & SC_EXTERNALIZABLE != 0;
        let serializable = flags & SC_SERIALIZABLE != 0;
        let is_enum = flags & SC_ENUM != 0;
        if externalizable && serializable {
            return Err(StreamError::invalid_class(
                name,
                "serializable and externalizable flags conflict",
            ));
        }
        if is_enum && suid != 0 {
            return Err(StreamError::invalid_class(
                name,
                format!("enum descriptor has non-zero serialVersionUID: {}", suid),
            ));
        }
        if is_enum && !fields.is_empty() {
            return Err(StreamError::invalid_class(
                name,
                format!("enum descriptor has non-zero field count: {}", fields.len()),
            ));
        }
        let (prim_data_size, num_obj_fields) = compute_offsets(&name, &mut fields)?;
        Ok(Self {
            name,
            suid,
            flags,
            fields,
            prim_data_size,
            num_obj_fields,
        })
    }

    fn is_enum(&self) -> bool {
        self.flags & SC_ENUM != 0
    }

    fn serializable(&self) -> bool {
        self.flags & SC_SERIALIZABLE != 0
    }

    fn externalizable(&self) -> bool {
        self.flags & SC_EXTERNALIZABLE != 0
    }
}

impl ClassDescriptor {
    /// Builds the local descriptor of `def`. Called once per type by the registry.
    pub(crate) fn for_local(registry: &TypeRegistry, def: Arc<TypeDef>) -> Result<Self> {
        let name = def.name().to_string();
        let serializable = registry.is_serializable(&name);
        let externalizable = serializable && registry.is_externalizable(&name);
        let kind = if def.is_proxy() {
            DescriptorKind::Proxy
        } else if def.is_enum() {
            DescriptorKind::Enum
        } else if externalizable {
            DescriptorKind::Externalizable
        } else {
            DescriptorKind::Ordinary
        };

        let super_desc = match def.super_name() {
            Some(super_name) if registry.is_serializable(super_name) => {
                Some(registry.descriptor(super_name)?)
            }
            _ => None,
        };

        let layouts = registry.storage_layouts(&name)?;
        let own_layout = layouts
            .last()
            .cloned()
            .unwrap_or_else(|| Arc::new(FieldLayout::empty(name.clone())));

        let mut suid = 0;
        let mut fields = Vec::new();
        let mut hooks = TypeHooks::default();
        let mut externalizer = None;
        let mut deserialize_error = None;
        let mut serialize_error = None;
        let mut constructible = false;

        let plain = serializable && !def.is_enum() && !def.is_array();
        if plain {
            suid = if def.is_proxy() {
                0
            } else {
                match def.declared_suid() {
                    Some(declared) => declared,
                    None => compute_default_suid(&def)?,
                }
            };
            if !externalizable && !def.is_proxy() && !def.is_interface() {
                match serial_fields(&def) {
                    Ok(list) => fields = list,
                    Err(err) => {
                        serialize_error = Some(err.clone());
                        deserialize_error = Some(err);
                    }
                }
            }
            if externalizable {
                constructible = def.no_arg_constructor() == Some(Access::Public);
                externalizer = nearest_externalizer(registry, &def)?;
            } else {
                constructible = serializable_constructor_ok(registry, &def)?;
                let own = def.hooks();
                hooks.write_object = own.write_object.clone();
                hooks.read_object = own.read_object.clone();
                hooks.read_object_no_data = own.read_object_no_data.clone();
            }
            let (write_replace, read_resolve) = inherited_substitutions(registry, &def)?;
            hooks.write_replace = write_replace;
            hooks.read_resolve = read_resolve;
        } else if def.is_array() {
            suid = compute_default_suid(&def)?;
        }

        if deserialize_error.is_none() {
            if def.is_enum() {
                deserialize_error = Some(StreamError::invalid_class(&*name, "enum type"));
            } else if !constructible {
                deserialize_error = Some(StreamError::invalid_class(&*name, "no valid constructor"));
            }
        }

        let bound: Vec<bool> = fields
            .iter()
            .map(|f| {
                own_layout
                    .field(f.name())
                    .map_or(false, |sf| sf.signature() == f.signature())
            })
            .collect();
        let default_serialize_error = if bound.iter().all(|b| *b) {
            None
        } else {
            Some(StreamError::invalid_class(
                &*name,
                "unmatched serializable field(s) declared",
            ))
        };
        let (prim_data_size, num_obj_fields) = compute_offsets(&name, &mut fields)?;
        let reflector = FieldReflector::new(&fields, &bound, Some(&own_layout));
        let has_write_object_data = hooks.write_object.is_some();

        let interfaces = match def.kind() {
            TypeKind::Proxy(interfaces) => interfaces.clone(),
            _ => Vec::new(),
        };

        let mut layout: Vec<LayoutEntry> = Vec::new();
        let mut ancestor = super_desc.clone();
        while let Some(desc) = ancestor {
            ancestor = desc.super_desc.clone();
            layout.push(LayoutEntry {
                source: SlotSource::Desc(desc),
                has_data: true,
            });
        }
        layout.reverse();
        layout.push(LayoutEntry {
            source: SlotSource::This,
            has_data: true,
        });

        let local = LocalClass {
            def,
            suid,
            serializable,
            externalizable,
            fields: fields.clone(),
            own_layout,
            layouts,
            hooks,
            externalizer,
            serialize_error,
            default_serialize_error,
        };

        Ok(Self {
            name,
            suid,
            kind,
            serializable,
            externalizable,
            has_write_object_data,
            has_block_external_data: true,
            fields,
            prim_data_size,
            num_obj_fields,
            interfaces,
            super_desc,
            local: Some(Arc::new(local)),
            reflector,
            resolve_error: None,
            deserialize_error,
            layout,
        })
    }

    /// Binds a non-proxy descriptor read from the stream to its local counterpart.
    pub(crate) fn bind_non_proxy(
        wire: WireDescriptor,
        local: Option<Arc<ClassDescriptor>>,
        resolve_error: Option<StreamError>,
        super_desc: Option<Arc<ClassDescriptor>>,
        strict_names: bool,
    ) -> Result<Self> {
        let kind = if wire.is_enum() {
            DescriptorKind::Enum
        } else if wire.externalizable() {
            DescriptorKind::Externalizable
        } else {
            DescriptorKind::Ordinary
        };
        let serializable = wire.serializable() || wire.externalizable();
        let externalizable = wire.externalizable();
        let has_write_object_data = wire.flags & SC_WRITE_METHOD != 0;
        let has_block_external_data = wire.flags & SC_BLOCK_DATA != 0;

        let mut fields = wire.fields;
        let mut name = wire.name;
        let mut deserialize_error = None;
        let mut local_class = None;
        let reflector;

        match local.as_ref().and_then(|d| d.local.clone().map(|l| (d, l))) {
            Some((local_desc, lc)) => {
                if local_desc.is_proxy() {
                    return Err(StreamError::invalid_class(
                        name,
                        "cannot bind non-proxy descriptor to a proxy class",
                    ));
                }
                if wire.flags & SC_ENUM != 0 && !local_desc.is_enum() {
                    return Err(StreamError::invalid_class(
                        name,
                        "cannot bind enum descriptor to a non-enum class",
                    ));
                }
                if wire.flags & SC_ENUM == 0 && local_desc.is_enum() {
                    return Err(StreamError::invalid_class(
                        name,
                        "cannot bind non-enum descriptor to an enum class",
                    ));
                }
                if local_desc.serializable == serializable
                    && !lc.def.is_array()
                    && wire.suid != local_desc.suid
                {
                    return Err(StreamError::VersionMismatch {
                        class_name: local_desc.name.clone(),
                        stream_suid: wire.suid,
                        local_suid: local_desc.suid,
                    });
                }
                if !class_names_equal(&name, &local_desc.name, strict_names) {
                    return Err(StreamError::invalid_class(
                        local_desc.name.clone(),
                        format!(
                            "local class name incompatible with stream class name \"{}\"",
                            name
                        ),
                    ));
                }
                if !local_desc.is_enum() {
                    if local_desc.serializable == serializable
                        && local_desc.externalizable != externalizable
                    {
                        return Err(StreamError::invalid_class(
                            local_desc.name.clone(),
                            "Serializable incompatible with Externalizable",
                        ));
                    }
                    if local_desc.serializable != serializable
                        || local_desc.externalizable != externalizable
                        || !(serializable || externalizable)
                    {
                        deserialize_error = Some(StreamError::invalid_class(
                            local_desc.name.clone(),
                            "class invalid for deserialization",
                        ));
                    }
                }
                let bound = match_fields(&local_desc.name, &mut fields, &lc.fields)?;
                reflector = FieldReflector::new(&fields, &bound, Some(&lc.own_layout));
                if deserialize_error.is_none() {
                    deserialize_error = local_desc.deserialize_error.clone();
                }
                name = local_desc.name.clone();
                local_class = Some(lc);
            }
            None => {
                reflector = FieldReflector::filler(&fields);
            }
        }

        Ok(Self {
            name,
            suid: wire.suid,
            kind,
            serializable,
            externalizable,
            has_write_object_data,
            has_block_external_data,
            fields,
            prim_data_size: wire.prim_data_size,
            num_obj_fields: wire.num_obj_fields,
            interfaces: Vec::new(),
            super_desc,
            local: local_class,
            reflector,
            resolve_error,
            deserialize_error,
            layout: Vec::new(),
        })
    }

    /// Binds a proxy descriptor read from the stream to its local proxy class.
    pub(crate) fn bind_proxy(
        interfaces: Vec<String>,
        local: Option<Arc<ClassDescriptor>>,
        resolve_error: Option<StreamError>,
        super_desc: Option<Arc<ClassDescriptor>>,
    ) -> Result<Self> {
        let mut name = format!("$Proxy[{}]", interfaces.join(","));
        let mut local_class = None;
        let mut deserialize_error = None;
        let mut serializable = true;
        let mut externalizable = false;
        if let Some(local_desc) = local {
            if !local_desc.is_proxy() {
                return Err(StreamError::invalid_class(
                    local_desc.name.clone(),
                    "cannot bind proxy descriptor to a non-proxy class",
                ));
            }
            name = local_desc.name.clone();
            serializable = local_desc.serializable;
            externalizable = local_desc.externalizable;
            deserialize_error = local_desc.deserialize_error.clone();
            local_class = local_desc.local.clone();
        }
        Ok(Self {
            name,
            suid: 0,
            kind: DescriptorKind::Proxy,
            serializable,
            externalizable,
            has_write_object_data: false,
            has_block_external_data: false,
            fields: Vec::new(),
            prim_data_size: 0,
            num_obj_fields: 0,
            interfaces,
            super_desc,
            local: local_class,
            reflector: FieldReflector::filler(&[]),
            resolve_error,
            deserialize_error,
            layout: Vec::new(),
        })
    }

    /// Computes the class-data layout of a descriptor read from the stream.
    ///
    /// Stream class levels are matched against the local serializable hierarchy. Local
    /// levels missing from the stream become no-data slots; stream levels missing locally
    /// become unbound slots whose data is read and dropped.
    pub(crate) fn compute_wire_layout(&mut self, registry: &TypeRegistry) -> Result<()> {
        let chain: Vec<String> = match &self.local {
            Some(lc) => registry.serializable_chain(lc.def.name())?,
            None => Vec::new(),
        };
        let mut start = 0;
        let mut entries = Vec::new();

        let own_name = self.local.as_ref().map(|_| self.name.clone());
        if let Some(own_name) = own_name {
            if let Some(m) = chain[start..].iter().position(|c| *c == own_name) {
                for missing in &chain[start..start + m] {
                    entries.push(LayoutEntry {
                        source: SlotSource::Desc(registry.descriptor(missing)?),
                        has_data: false,
                    });
                }
                start += m + 1;
            }
        }
        entries.push(LayoutEntry {
            source: SlotSource::This,
            has_data: true,
        });

        let mut ancestor = self.super_desc.clone();
        while let Some(desc) = ancestor {
            ancestor = desc.super_desc.clone();
            let matched = chain[start..]
                .iter()
                .position(|c| *c == desc.name)
                .map(|p| start + p);
            let source = match matched {
                Some(m) => {
                    for missing in &chain[start..m] {
                        entries.push(LayoutEntry {
                            source: SlotSource::Desc(registry.descriptor(missing)?),
                            has_data: false,
                        });
                    }
                    start = m + 1;
                    desc
                }
                None if desc.local.is_some() => Arc::new(desc.unbound()),
                None => desc,
            };
            entries.push(LayoutEntry {
                source: SlotSource::Desc(source),
                has_data: true,
            });
        }
        for missing in &chain[start.min(chain.len())..] {
            entries.push(LayoutEntry {
                source: SlotSource::Desc(registry.descriptor(missing)?),
                has_data: false,
            });
        }
        entries.reverse();
        self.layout = entries;
        Ok(())
    }

    fn unbound(&self) -> Self {
        let mut copy = self.clone();
        copy.local = None;
        copy.reflector = FieldReflector::filler(&copy.fields);
        copy.deserialize_error = None;
        copy
    }

    /// Returns the class name; bound descriptors report the local name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the version id.
    pub fn suid(&self) -> i64 {
        self.suid
    }

    /// Returns the descriptor kind.
    pub fn kind(&self) -> DescriptorKind {
        self.kind
    }

    /// Returns true for serializable (including externalizable) classes.
    pub fn is_serializable(&self) -> bool {
        self.serializable
    }

    /// Returns true for externalizable classes.
    pub fn is_externalizable(&self) -> bool {
        self.externalizable
    }

    /// Returns true for enum descriptors.
    pub fn is_enum(&self) -> bool {
        self.kind == DescriptorKind::Enum
    }

    /// Returns true for proxy descriptors.
    pub fn is_proxy(&self) -> bool {
        self.kind == DescriptorKind::Proxy
    }

    /// Returns true if instance data carries custom hook output.
    pub fn has_write_object_data(&self) -> bool {
        self.has_write_object_data
    }

    /// Returns true if externalizable data is framed as block data.
    pub fn has_block_external_data(&self) -> bool {
        self.has_block_external_data
    }

    /// Serializable fields in wire order.
    pub fn fields(&self) -> &[StreamField] {
        &self.fields
    }

    /// Looks up a serializable field by name.
    pub fn field(&self, name: &str) -> Option<&StreamField> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// Size in bytes of the primitive field block.
    pub fn prim_data_size(&self) -> usize {
        self.prim_data_size
    }

    /// Number of reference fields.
    pub fn num_obj_fields(&self) -> usize {
        self.num_obj_fields
    }

    /// Interface names of a proxy descriptor.
    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    /// Descriptor of the nearest serializable superclass.
    pub fn super_desc(&self) -> Option<&Arc<ClassDescriptor>> {
        self.super_desc.as_ref()
    }

    /// Returns true if the descriptor is bound to a local type.
    pub fn is_resolved(&self) -> bool {
        self.local.is_some()
    }

    /// The error recorded when the class could not be resolved locally.
    pub fn resolve_error(&self) -> Option<&StreamError> {
        self.resolve_error.as_ref()
    }

    /// The local type definition this descriptor is bound to.
    pub fn type_def(&self) -> Option<&Arc<TypeDef>> {
        self.local.as_ref().map(|l| &l.def)
    }

    /// Version id of the bound local type.
    pub fn local_suid(&self) -> Option<i64> {
        self.local.as_ref().map(|l| l.suid)
    }

    /// Hooks of the bound local type.
    pub fn hooks(&self) -> Option<&TypeHooks> {
        self.local.as_ref().map(|l| &l.hooks)
    }

    /// The reflector mapping wire fields onto local storage.
    pub fn reflector(&self) -> &FieldReflector {
        &self.reflector
    }

    /// Serializable fields of the bound local type, in canonical order.
    pub fn local_fields(&self) -> &[StreamField] {
        self.local.as_ref().map_or(&[], |l| l.fields.as_slice())
    }

    pub(crate) fn externalizer(&self) -> Option<&Arc<dyn Externalizable>> {
        self.local.as_ref().and_then(|l| l.externalizer.as_ref())
    }

    /// Storage layouts for allocating an instance of the bound local type.
    pub(crate) fn instance_layouts(&self) -> Option<&[Arc<FieldLayout>]> {
        self.local.as_ref().map(|l| l.layouts.as_slice())
    }

    /// Fails if instances of the bound local type cannot be created by the reader.
    pub fn check_deserialize(&self) -> Result<()> {
        match &self.deserialize_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Fails if instances of this local type cannot be written.
    pub fn check_serialize(&self) -> Result<()> {
        match self.local.as_ref().and_then(|l| l.serialize_error.as_ref()) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Fails if the default field layout cannot be written for this local type.
    pub fn check_default_serialize(&self) -> Result<()> {
        match self
            .local
            .as_ref()
            .and_then(|l| l.default_serialize_error.as_ref())
        {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Descriptor flags as written for `protocol`.
    pub fn wire_flags(&self, protocol: ProtocolVersion) -> u8 {
        let mut flags = 0;
        if self.externalizable {
            flags |= SC_EXTERNALIZABLE;
            if protocol != ProtocolVersion::V1 {
                flags |= SC_BLOCK_DATA;
            }
        } else if self.serializable {
            flags |= SC_SERIALIZABLE;
        }
        if self.has_write_object_data {
            flags |= SC_WRITE_METHOD;
        }
        if self.is_enum() {
            flags |= SC_ENUM;
        }
        flags
    }

    /// Class-data slots from the root-most serializable class down to this one.
    pub fn class_data_slots(self: &Arc<Self>) -> Vec<ClassDataSlot> {
        self.layout
            .iter()
            .map(|entry| ClassDataSlot {
                desc: match &entry.source {
                    SlotSource::This => Arc::clone(self),
                    SlotSource::Desc(desc) => Arc::clone(desc),
                },
                has_data: entry.has_data,
            })
            .collect()
    }
}

fn serial_fields(def: &TypeDef) -> Result<Vec<StreamField>> {
    let mut fields = match def.persistent_fields() {
        Some(declared) => {
            let mut out: Vec<StreamField> = Vec::with_capacity(declared.len());
            for fd in declared {
                if out.iter().any(|f| f.name() == fd.name()) {
                    return Err(StreamError::invalid_class(
                        def.name(),
                        format!("multiple serializable fields named {}", fd.name()),
                    ));
                }
                out.push(StreamField::new(fd.name(), fd.signature(), fd.is_unshared())?);
            }
            out
        }
        None => def
            .fields()
            .iter()
            .filter(|f| !f.is_static() && !f.is_transient())
            .map(|f| StreamField::new(f.name(), f.signature(), f.is_unshared()))
            .collect::<Result<Vec<_>>>()?,
    };
    fields.sort_by(canonical_order);
    Ok(fields)
}

fn serializable_constructor_ok(registry: &TypeRegistry, def: &TypeDef) -> Result<bool> {
    let mut current = def.super_name().map(str::to_string);
    while let Some(name) = current {
        if !registry.is_serializable(&name) {
            let ancestor = registry.type_def(&name)?;
            return Ok(match ancestor.no_arg_constructor() {
                Some(Access::Public) | Some(Access::Protected) => true,
                Some(Access::Package) => ancestor.package() == def.package(),
                Some(Access::Private) | None => false,
            });
        }
        current = registry.type_def(&name)?.super_name().map(str::to_string);
    }
    Ok(false)
}

fn nearest_externalizer(
    registry: &TypeRegistry,
    def: &TypeDef,
) -> Result<Option<Arc<dyn Externalizable>>> {
    if let Some(ext) = def.externalizer() {
        return Ok(Some(Arc::clone(ext)));
    }
    let mut current = def.super_name().map(str::to_string);
    while let Some(name) = current {
        let ancestor = registry.type_def(&name)?;
        if let Some(ext) = ancestor.externalizer() {
            return Ok(Some(Arc::clone(ext)));
        }
        current = ancestor.super_name().map(str::to_string);
    }
    Ok(None)
}

type Substitutions = (
    Option<Arc<dyn WriteReplaceHook>>,
    Option<Arc<dyn ReadResolveHook>>,
);

fn inherited_substitutions(registry: &TypeRegistry, def: &TypeDef) -> Result<Substitutions> {
    let mut write_replace = def.hooks().write_replace.clone();
    let mut read_resolve = def.hooks().read_resolve.clone();
    let mut current = def.super_name().map(str::to_string);
    while let Some(name) = current {
        if write_replace.is_some() && read_resolve.is_some() {
            break;
        }
        let ancestor = registry.type_def(&name)?;
        if write_replace.is_none() {
            write_replace = ancestor.hooks().write_replace.clone();
        }
        if read_resolve.is_none() {
            read_resolve = ancestor.hooks().read_resolve.clone();
        }
        current = ancestor.super_name().map(str::to_string);
    }
    Ok((write_replace, read_resolve))
}

fn class_names_equal(stream: &str, local: &str, strict: bool) -> bool {
    if strict {
        return stream == local;
    }
    let short = |n: &str| n.rsplit('.').next().unwrap_or(n).to_string();
    short(stream) == short(local)
}

/// Matches stream fields against local serializable fields by name.
///
/// Matched fields take the local `unshared` flag. Returns, per stream field, whether a
/// local field of compatible type exists.
fn match_fields(
    class_name: &str,
    stream: &mut [StreamField],
    local: &[StreamField],
) -> Result<Vec<bool>> {
    let mut bound = Vec::with_capacity(stream.len());
    for field in stream.iter_mut() {
        match local.iter().find(|lf| lf.name() == field.name()) {
            Some(lf) => {
                let compatible = lf.field_type() == field.field_type()
                    || (!lf.is_primitive() && !field.is_primitive());
                if !compatible {
                    return Err(StreamError::invalid_class(
                        class_name,
                        format!("incompatible types for field {}", field.name()),
                    ));
                }
                let mut replacement = StreamField::new(lf.name(), lf.signature(), lf.is_unshared())?;
                replacement.set_offset(field.offset());
                *field = replacement;
                bound.push(true);
            }
            None => bound.push(false),
        }
    }
    Ok(bound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::registry::{modifiers, FieldDef};

    fn registry_with(defs: Vec<TypeDef>) -> TypeRegistry {
        let registry = TypeRegistry::new();
        for def in defs {
            registry.register(def).unwrap();
        }
        registry
    }

    fn point() -> TypeDef {
        TypeDef::builder("com.example.Point")
            .serializable()
            .serial_version_uid(1)
            .field(FieldDef::new("y", FieldType::Int))
            .field(FieldDef::new("x", FieldType::Int))
            .field(FieldDef::of_class("label", "java.lang.String"))
            .field(FieldDef::new("cache", FieldType::Object).transient())
            .build()
    }

    fn wire_point(suid: i64, fields: &[(&str, &str)]) -> WireDescriptor {
        let fields = fields
            .iter()
            .map(|(n, s)| StreamField::new(*n, *s, false).unwrap())
            .collect();
        WireDescriptor::new("com.example.Point".into(), suid, SC_SERIALIZABLE, fields).unwrap()
    }

    #[test]
    fn test_local_descriptor_fields_sorted() {
        let registry = registry_with(vec![point()]);
        let desc = registry.descriptor("com.example.Point").unwrap();
        let names: Vec<_> = desc.fields().iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["x", "y", "label"]);
        assert_eq!(desc.prim_data_size(), 8);
        assert_eq!(desc.num_obj_fields(), 1);
        assert_eq!(desc.suid(), 1);
        assert_eq!(desc.kind(), DescriptorKind::Ordinary);
        assert!(desc.check_deserialize().is_ok());
    }

    #[test]
    fn test_non_serializable_has_zero_suid() {
        let registry = registry_with(vec![TypeDef::builder("com.example.Socket")
            .field(FieldDef::new("fd", FieldType::Int))
            .build()]);
        let desc = registry.descriptor("com.example.Socket").unwrap();
        assert_eq!(desc.suid(), 0);
        assert!(desc.fields().is_empty());
        assert!(!desc.is_serializable());
        assert_eq!(desc.wire_flags(ProtocolVersion::V2), 0);
    }

    #[test]
    fn test_enum_descriptor() {
        let registry = registry_with(vec![TypeDef::enumeration("a.Color", ["RED"]).build()]);
        let desc = registry.descriptor("a.Color").unwrap();
        assert_eq!(desc.suid(), 0);
        assert!(desc.is_enum());
        assert_eq!(
            desc.wire_flags(ProtocolVersion::V2),
            SC_SERIALIZABLE | SC_ENUM
        );
        assert!(desc.check_deserialize().unwrap_err().to_string().contains("enum type"));
    }

    #[test]
    fn test_no_valid_constructor() {
        let registry = registry_with(vec![
            TypeDef::builder("a.Base")
                .constructor("(I)V", modifiers::PUBLIC)
                .build(),
            TypeDef::builder("a.Child").extends("a.Base").serializable().build(),
        ]);
        let desc = registry.descriptor("a.Child").unwrap();
        let err = desc.check_deserialize().unwrap_err();
        assert!(err.to_string().contains("no valid constructor"));
    }

    #[test]
    fn test_package_private_constructor_other_package() {
        let registry = registry_with(vec![
            TypeDef::builder("a.Base")
                .constructor("()V", 0)
                .build(),
            TypeDef::builder("a.Same").extends("a.Base").serializable().build(),
            TypeDef::builder("b.Other").extends("a.Base").serializable().build(),
        ]);
        assert!(registry.descriptor("a.Same").unwrap().check_deserialize().is_ok());
        assert!(registry.descriptor("b.Other").unwrap().check_deserialize().is_err());
    }

    #[test]
    fn test_unmatched_persistent_field() {
        let registry = registry_with(vec![TypeDef::builder("a.P")
            .serializable()
            .field(FieldDef::new("x", FieldType::Int))
            .persistent_fields([FieldDef::new("x", FieldType::Int), FieldDef::new("ghost", FieldType::Long)])
            .build()]);
        let desc = registry.descriptor("a.P").unwrap();
        assert!(desc.check_default_serialize().is_err());
        assert!(desc.check_serialize().is_ok());
    }

    #[test]
    fn test_duplicate_persistent_field() {
        let registry = registry_with(vec![TypeDef::builder("a.P")
            .serializable()
            .persistent_fields([FieldDef::new("x", FieldType::Int), FieldDef::new("x", FieldType::Long)])
            .build()]);
        let desc = registry.descriptor("a.P").unwrap();
        let err = desc.check_serialize().unwrap_err();
        assert!(err.to_string().contains("multiple serializable fields named x"));
    }

    #[test]
    fn test_wire_flags_conflict() {
        let err = WireDescriptor::new(
            "a.B".into(),
            0,
            SC_SERIALIZABLE | SC_EXTERNALIZABLE,
            Vec::new(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("flags conflict"));
    }

    #[test]
    fn test_enum_wire_descriptor_checks() {
        let err = WireDescriptor::new("a.E".into(), 5, SC_ENUM | SC_SERIALIZABLE, Vec::new())
            .unwrap_err();
        assert!(err.to_string().contains("non-zero serialVersionUID: 5"));
    }

    #[test]
    fn test_bind_version_mismatch() {
        let registry = registry_with(vec![point()]);
        let local = registry.descriptor("com.example.Point").unwrap();
        let err = ClassDescriptor::bind_non_proxy(wire_point(2, &[]), Some(local), None, None, false)
            .unwrap_err();
        assert!(matches!(
            err,
            StreamError::VersionMismatch {
                stream_suid: 2,
                local_suid: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_bind_incompatible_field_types() {
        let registry = registry_with(vec![point()]);
        let local = registry.descriptor("com.example.Point").unwrap();
        let wire = wire_point(1, &[("x", "J")]);
        let err = ClassDescriptor::bind_non_proxy(wire, Some(local), None, None, false).unwrap_err();
        assert!(err.to_string().contains("incompatible types for field x"));
    }

    #[test]
    fn test_bind_tolerates_added_and_removed_fields() {
        let registry = registry_with(vec![point()]);
        let local = registry.descriptor("com.example.Point").unwrap();
        let wire = wire_point(1, &[("x", "I"), ("z", "D")]);
        let desc = ClassDescriptor::bind_non_proxy(wire, Some(local), None, None, false).unwrap();
        assert_eq!(desc.fields().len(), 2);
        assert_eq!(desc.prim_data_size(), 12);
        assert!(desc.is_resolved());
    }

    #[test]
    fn test_strict_class_names() {
        let registry = registry_with(vec![point()]);
        let local = registry.descriptor("com.example.Point").unwrap();
        let mut wire = wire_point(1, &[]);
        wire.name = "org.other.Point".into();
        assert!(ClassDescriptor::bind_non_proxy(wire, Some(Arc::clone(&local)), None, None, false).is_ok());

        let mut wire = wire_point(1, &[]);
        wire.name = "org.other.Point".into();
        let err = ClassDescriptor::bind_non_proxy(wire, Some(local), None, None, true).unwrap_err();
        assert!(err.to_string().contains("local class name incompatible"));
    }

    #[test]
    fn test_bind_serializable_to_externalizable_fails() {
        let registry = registry_with(vec![point()]);
        let local = registry.descriptor("com.example.Point").unwrap();
        let wire = WireDescriptor::new(
            "com.example.Point".into(),
            1,
            SC_EXTERNALIZABLE,
            Vec::new(),
        )
        .unwrap();
        let err = ClassDescriptor::bind_non_proxy(wire, Some(local), None, None, false).unwrap_err();
        assert!(matches!(
            err,
            StreamError::InvalidClass { ref reason, .. }
                if reason == "Serializable incompatible with Externalizable"
        ));
    }

    #[test]
    fn test_bind_proxy_to_non_proxy_fails() {
        let registry = registry_with(vec![point()]);
        let local = registry.descriptor("com.example.Point").unwrap();
        let err = ClassDescriptor::bind_proxy(vec!["a.I".into()], Some(local), None, None)
            .unwrap_err();
        assert!(err
            .to_string()
            .contains("cannot bind proxy descriptor to a non-proxy class"));
    }

    #[test]
    fn test_unresolved_descriptor_keeps_stream_shape() {
        let wire = wire_point(9, &[("x", "I")]);
        let desc = ClassDescriptor::bind_non_proxy(
            wire,
            None,
            Some(StreamError::ClassNotFound("com.example.Point".into())),
            None,
            false,
        )
        .unwrap();
        assert!(!desc.is_resolved());
        assert_eq!(desc.name(), "com.example.Point");
        assert!(desc.resolve_error().is_some());
    }

    #[test]
    fn test_local_layout_includes_ancestors() {
        let registry = registry_with(vec![
            TypeDef::builder("a.Base").serializable().build(),
            TypeDef::builder("a.Child").extends("a.Base").build(),
        ]);
        let desc = registry.descriptor("a.Child").unwrap();
        let slots = desc.class_data_slots();
        let names: Vec<_> = slots.iter().map(|s| s.desc.name().to_string()).collect();
        assert_eq!(names, vec!["a.Base", "a.Child"]);
        assert!(slots.iter().all(|s| s.has_data));
    }

    #[test]
    fn test_wire_layout_marks_missing_local_levels() {
        let registry = registry_with(vec![
            TypeDef::builder("a.Base").serializable().build(),
            TypeDef::builder("a.Child").extends("a.Base").build(),
        ]);
        let local = registry.descriptor("a.Child").unwrap();
        let suid = local.suid();
        let wire = WireDescriptor::new("a.Child".into(), suid, SC_SERIALIZABLE, Vec::new()).unwrap();
        let mut desc = ClassDescriptor::bind_non_proxy(wire, Some(local), None, None, false).unwrap();
        desc.compute_wire_layout(&registry).unwrap();
        let desc = Arc::new(desc);
        let slots = desc.class_data_slots();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[0].desc.name(), "a.Base");
        assert!(!slots[0].has_data);
        assert!(slots[1].has_data);
    }
}
