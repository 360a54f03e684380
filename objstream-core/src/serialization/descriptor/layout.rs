//! Instance storage layouts and class-data slots.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Result, StreamError};
use crate::serialization::descriptor::{ClassDescriptor, FieldType};
use crate::serialization::registry::FieldDef;

/// One stored field of a class level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageField {
    name: String,
    field_type: FieldType,
    signature: String,
    offset: usize,
}

impl StorageField {
    /// Returns the field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the field type code.
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Returns the declared type signature.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Byte offset into the primitive block, or index into the object slots.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// Storage layout of one class level: a primitive byte block plus an object slot array.
///
/// Every non-static declared field gets storage, transient fields included.
#[derive(Debug)]
pub struct FieldLayout {
    class_name: String,
    fields: Vec<StorageField>,
    index: HashMap<String, usize>,
    prim_size: usize,
    obj_count: usize,
}

impl FieldLayout {
    /// Builds the layout for a class level from its declared fields.
    pub fn new(class_name: impl Into<String>, defs: &[FieldDef]) -> Result<Self> {
        let class_name = class_name.into();
        let mut fields = Vec::new();
        let mut index = HashMap::new();
        let mut prim_size = 0;
        let mut obj_count = 0;
        for def in defs.iter().filter(|d| !d.is_static()) {
            let field_type = FieldType::from_signature(def.signature()).map_err(|_| {
                StreamError::invalid_class(
                    class_name.clone(),
                    format!("invalid signature for field {}", def.name()),
                )
            })?;
            if index.contains_key(def.name()) {
                return Err(StreamError::invalid_class(
                    class_name,
                    format!("duplicate field {}", def.name()),
                ));
            }
            let offset = if field_type.is_primitive() {
                let off = prim_size;
                prim_size += field_type.primitive_size();
                off
            } else {
                obj_count += 1;
                obj_count - 1
            };
            index.insert(def.name().to_string(), fields.len());
            fields.push(StorageField {
                name: def.name().to_string(),
                field_type,
                signature: def.signature().to_string(),
                offset,
            });
        }
        Ok(Self {
            class_name,
            fields,
            index,
            prim_size,
            obj_count,
        })
    }

    /// An empty layout, for class levels without instance fields.
    pub fn empty(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            fields: Vec::new(),
            index: HashMap::new(),
            prim_size: 0,
            obj_count: 0,
        }
    }

    /// Returns the class level this layout belongs to.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Returns all stored fields.
    pub fn fields(&self) -> &[StorageField] {
        &self.fields
    }

    /// Looks up a stored field by name.
    pub fn field(&self, name: &str) -> Option<&StorageField> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    /// Size of the primitive block in bytes.
    pub fn prim_size(&self) -> usize {
        self.prim_size
    }

    /// Number of object slots.
    pub fn obj_count(&self) -> usize {
        self.obj_count
    }
}

/// One entry of a descriptor's precomputed class-data layout.
#[derive(Debug, Clone)]
pub struct ClassDataSlot {
    /// Descriptor for this class level.
    pub desc: Arc<ClassDescriptor>,
    /// False when the stream carries no data for this level.
    pub has_data: bool,
}

/// Where a layout entry's descriptor lives.
#[derive(Debug, Clone)]
pub(crate) enum SlotSource {
    /// The descriptor that owns the layout.
    This,
    /// An ancestor, or a local class level missing from the stream.
    Desc(Arc<ClassDescriptor>),
}

#[derive(Debug, Clone)]
pub(crate) struct LayoutEntry {
    pub(crate) source: SlotSource,
    pub(crate) has_data: bool,
}
