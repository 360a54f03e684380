//! Host object graph model.
//!
//! A [`Heap`] owns every object of a graph and hands out [`ObjectId`]s, so cycles and
//! shared references are expressed without reference counting. Writers read from a
//! heap and readers allocate into one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{Result, StreamError};
use crate::serialization::descriptor::{ClassDescriptor, FieldLayout, FieldType};
use crate::serialization::registry::{TypeKind, TypeRegistry};

static NEXT_HEAP_ID: AtomicU64 = AtomicU64::new(1);

const ARRAY_LIST: &str = "java.util.ArrayList";
const PROXY: &str = "java.lang.reflect.Proxy";

/// Identity of an object within its [`Heap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(usize);

impl ObjectId {
    /// Position of the object in allocation order.
    pub fn index(self) -> usize {
        self.0
    }
}

/// A field value, array element or top-level stream value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// The null reference.
    Null,
    /// `Z`
    Boolean(bool),
    /// `B`
    Byte(i8),
    /// `C`
    Char(u16),
    /// `S`
    Short(i16),
    /// `I`
    Int(i32),
    /// `J`
    Long(i64),
    /// `F`
    Float(f32),
    /// `D`
    Double(f64),
    /// Reference to a heap object.
    Ref(ObjectId),
}

impl Value {
    /// Returns true for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the referenced object, if any.
    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Value::Ref(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns the boolean payload.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the byte payload.
    pub fn as_byte(&self) -> Option<i8> {
        match self {
            Value::Byte(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the char payload.
    pub fn as_char(&self) -> Option<u16> {
        match self {
            Value::Char(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the short payload.
    pub fn as_short(&self) -> Option<i16> {
        match self {
            Value::Short(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the int payload.
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the long payload.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the float payload.
    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the double payload.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Field type of a primitive value; `None` for references and null.
    pub fn primitive_type(&self) -> Option<FieldType> {
        match self {
            Value::Boolean(_) => Some(FieldType::Boolean),
            Value::Byte(_) => Some(FieldType::Byte),
            Value::Char(_) => Some(FieldType::Char),
            Value::Short(_) => Some(FieldType::Short),
            Value::Int(_) => Some(FieldType::Int),
            Value::Long(_) => Some(FieldType::Long),
            Value::Float(_) => Some(FieldType::Float),
            Value::Double(_) => Some(FieldType::Double),
            Value::Null | Value::Ref(_) => None,
        }
    }

    /// The zero value of a field type.
    pub fn zero(field_type: FieldType) -> Value {
        match field_type {
            FieldType::Boolean => Value::Boolean(false),
            FieldType::Byte => Value::Byte(0),
            FieldType::Char => Value::Char(0),
            FieldType::Short => Value::Short(0),
            FieldType::Int => Value::Int(0),
            FieldType::Long => Value::Long(0),
            FieldType::Float => Value::Float(0.0),
            FieldType::Double => Value::Double(0.0),
            FieldType::Object | FieldType::Array => Value::Null,
        }
    }

    /// Decodes a big-endian primitive of `field_type` from the front of `bytes`.
    pub fn from_prim_bytes(field_type: FieldType, bytes: &[u8]) -> Value {
        let mut buf = [0u8; 8];
        let size = field_type.primitive_size();
        buf[..size].copy_from_slice(&bytes[..size]);
        match field_type {
            FieldType::Boolean => Value::Boolean(buf[0] != 0),
            FieldType::Byte => Value::Byte(buf[0] as i8),
            FieldType::Char => Value::Char(u16::from_be_bytes([buf[0], buf[1]])),
            FieldType::Short => Value::Short(i16::from_be_bytes([buf[0], buf[1]])),
            FieldType::Int => Value::Int(i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]])),
            FieldType::Long => Value::Long(i64::from_be_bytes(buf)),
            FieldType::Float => {
                Value::Float(f32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]))
            }
            FieldType::Double => Value::Double(f64::from_be_bytes(buf)),
            FieldType::Object | FieldType::Array => Value::Null,
        }
    }

    /// Encodes a primitive value big-endian into the front of `out`.
    pub fn write_prim_bytes(&self, out: &mut [u8]) {
        match self {
            Value::Boolean(v) => out[0] = u8::from(*v),
            Value::Byte(v) => out[0] = *v as u8,
            Value::Char(v) => out[..2].copy_from_slice(&v.to_be_bytes()),
            Value::Short(v) => out[..2].copy_from_slice(&v.to_be_bytes()),
            Value::Int(v) => out[..4].copy_from_slice(&v.to_be_bytes()),
            Value::Long(v) => out[..8].copy_from_slice(&v.to_be_bytes()),
            Value::Float(v) => out[..4].copy_from_slice(&v.to_be_bytes()),
            Value::Double(v) => out[..8].copy_from_slice(&v.to_be_bytes()),
            Value::Null | Value::Ref(_) => {}
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    bool => Boolean,
    i8 => Byte,
    u16 => Char,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    ObjectId => Ref,
}

impl From<Option<ObjectId>> for Value {
    fn from(v: Option<ObjectId>) -> Self {
        v.map_or(Value::Null, Value::Ref)
    }
}

/// Typed array storage.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayElements {
    /// `boolean[]`
    Boolean(Vec<bool>),
    /// `byte[]`
    Byte(Vec<i8>),
    /// `char[]`
    Char(Vec<u16>),
    /// `short[]`
    Short(Vec<i16>),
    /// `int[]`
    Int(Vec<i32>),
    /// `long[]`
    Long(Vec<i64>),
    /// `float[]`
    Float(Vec<f32>),
    /// `double[]`
    Double(Vec<f64>),
    /// Any reference array.
    Object(Vec<Value>),
}

impl ArrayElements {
    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            ArrayElements::Boolean(v) => v.len(),
            ArrayElements::Byte(v) => v.len(),
            ArrayElements::Char(v) => v.len(),
            ArrayElements::Short(v) => v.len(),
            ArrayElements::Int(v) => v.len(),
            ArrayElements::Long(v) => v.len(),
            ArrayElements::Float(v) => v.len(),
            ArrayElements::Double(v) => v.len(),
            ArrayElements::Object(v) => v.len(),
        }
    }

    /// Returns true for empty arrays.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element type; reference arrays report [`FieldType::Object`].
    pub fn element_type(&self) -> FieldType {
        match self {
            ArrayElements::Boolean(_) => FieldType::Boolean,
            ArrayElements::Byte(_) => FieldType::Byte,
            ArrayElements::Char(_) => FieldType::Char,
            ArrayElements::Short(_) => FieldType::Short,
            ArrayElements::Int(_) => FieldType::Int,
            ArrayElements::Long(_) => FieldType::Long,
            ArrayElements::Float(_) => FieldType::Float,
            ArrayElements::Double(_) => FieldType::Double,
            ArrayElements::Object(_) => FieldType::Object,
        }
    }

    /// Element at `index` as a [`Value`].
    pub fn get(&self, index: usize) -> Option<Value> {
        Some(match self {
            ArrayElements::Boolean(v) => Value::Boolean(*v.get(index)?),
            ArrayElements::Byte(v) => Value::Byte(*v.get(index)?),
            ArrayElements::Char(v) => Value::Char(*v.get(index)?),
            ArrayElements::Short(v) => Value::Short(*v.get(index)?),
            ArrayElements::Int(v) => Value::Int(*v.get(index)?),
            ArrayElements::Long(v) => Value::Long(*v.get(index)?),
            ArrayElements::Float(v) => Value::Float(*v.get(index)?),
            ArrayElements::Double(v) => Value::Double(*v.get(index)?),
            ArrayElements::Object(v) => *v.get(index)?,
        })
    }
}

/// Storage of one class level of an instance.
#[derive(Debug, Clone)]
pub struct InstanceSlot {
    layout: Arc<FieldLayout>,
    prims: Vec<u8>,
    objs: Vec<Value>,
}

impl InstanceSlot {
    /// Zero-initialized storage for `layout`.
    pub fn new(layout: Arc<FieldLayout>) -> Self {
        Self {
            prims: vec![0; layout.prim_size()],
            objs: vec![Value::Null; layout.obj_count()],
            layout,
        }
    }

    /// The class level this slot stores.
    pub fn class_name(&self) -> &str {
        self.layout.class_name()
    }

    /// The storage layout.
    pub fn layout(&self) -> &FieldLayout {
        &self.layout
    }

    /// Raw primitive block.
    pub fn prims(&self) -> &[u8] {
        &self.prims
    }

    /// Raw primitive block, mutably.
    pub fn prims_mut(&mut self) -> &mut [u8] {
        &mut self.prims
    }

    /// Object slots.
    pub fn objs(&self) -> &[Value] {
        &self.objs
    }

    /// Object slots, mutably.
    pub fn objs_mut(&mut self) -> &mut [Value] {
        &mut self.objs
    }

    /// Reads a field of this class level.
    pub fn get(&self, name: &str) -> Option<Value> {
        let field = self.layout.field(name)?;
        Some(if field.field_type().is_primitive() {
            Value::from_prim_bytes(field.field_type(), &self.prims[field.offset()..])
        } else {
            self.objs[field.offset()]
        })
    }

    /// Writes a field of this class level; the value must match the declared type.
    pub fn set(&mut self, name: &str, value: Value) -> Result<()> {
        let field = self.layout.field(name).ok_or_else(|| {
            StreamError::IllegalState(format!(
                "no field {} in {}",
                name,
                self.layout.class_name()
            ))
        })?;
        let field_type = field.field_type();
        if field_type.is_primitive() {
            if value.primitive_type() != Some(field_type) {
                return Err(StreamError::IllegalState(format!(
                    "field {}.{} holds {:?}, not {:?}",
                    self.layout.class_name(),
                    name,
                    field_type,
                    value
                )));
            }
            let offset = field.offset();
            value.write_prim_bytes(&mut self.prims[offset..]);
        } else {
            if value.primitive_type().is_some() {
                return Err(StreamError::IllegalState(format!(
                    "field {}.{} holds a reference, not {:?}",
                    self.layout.class_name(),
                    name,
                    value
                )));
            }
            let offset = field.offset();
            self.objs[offset] = value;
        }
        Ok(())
    }
}

/// An ordinary object: one storage slot per class level, root first.
#[derive(Debug, Clone)]
pub struct Instance {
    class_name: String,
    slots: Vec<InstanceSlot>,
}

impl Instance {
    /// Runtime class name.
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// All class-level slots, root first.
    pub fn slots(&self) -> &[InstanceSlot] {
        &self.slots
    }

    /// Storage of one class level.
    pub fn slot(&self, class_name: &str) -> Option<&InstanceSlot> {
        self.slots.iter().find(|s| s.class_name() == class_name)
    }

    /// Storage of one class level, mutably.
    pub fn slot_mut(&mut self, class_name: &str) -> Option<&mut InstanceSlot> {
        self.slots.iter_mut().find(|s| s.class_name() == class_name)
    }

    /// Reads a field, searching from the most-derived class level.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.slots.iter().rev().find_map(|s| s.get(name))
    }
}

/// Every kind of object a heap can hold.
#[derive(Debug, Clone)]
pub enum HeapObject {
    /// An ordinary object.
    Instance(Instance),
    /// An array.
    Array {
        /// Array type name such as `[I`.
        type_name: String,
        /// The elements.
        elements: ArrayElements,
    },
    /// A string.
    String(String),
    /// An enum constant.
    Enum {
        /// Enum type name.
        type_name: String,
        /// Constant name.
        constant: String,
    },
    /// A class value.
    Class {
        /// Name of the class.
        name: String,
    },
    /// A class descriptor handed out as a value.
    Descriptor(Arc<ClassDescriptor>),
}

impl HeapObject {
    /// Runtime type name of the object.
    pub fn type_name(&self) -> &str {
        match self {
            HeapObject::Instance(inst) => inst.class_name(),
            HeapObject::Array { type_name, .. } => type_name,
            HeapObject::String(_) => "java.lang.String",
            HeapObject::Enum { type_name, .. } => type_name,
            HeapObject::Class { .. } => "java.lang.Class",
            HeapObject::Descriptor(_) => "java.io.ObjectStreamClass",
        }
    }
}

/// Owner of an object graph.
pub struct Heap {
    id: u64,
    registry: Arc<TypeRegistry>,
    objects: Vec<HeapObject>,
    classes: HashMap<String, ObjectId>,
    enums: HashMap<(String, String), ObjectId>,
}

impl std::fmt::Debug for Heap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heap")
            .field("id", &self.id)
            .field("objects", &self.objects.len())
            .finish()
    }
}

impl Heap {
    /// Creates an empty heap over `registry`.
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            id: NEXT_HEAP_ID.fetch_add(1, Ordering::Relaxed),
            registry,
            objects: Vec::new(),
            classes: HashMap::new(),
            enums: HashMap::new(),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// The registry the heap's types come from.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Number of objects allocated.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns true if nothing has been allocated.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn push(&mut self, object: HeapObject) -> ObjectId {
        self.objects.push(object);
        ObjectId(self.objects.len() - 1)
    }

    /// Allocates a new string. Equal strings allocated twice are distinct objects.
    pub fn alloc_string(&mut self, s: impl Into<String>) -> ObjectId {
        self.push(HeapObject::String(s.into()))
    }

    /// Allocates an array of the named array type.
    pub fn alloc_array(&mut self, type_name: &str, elements: ArrayElements) -> Result<ObjectId> {
        let def = self.registry.type_def(type_name)?;
        let TypeKind::Array(component) = def.kind() else {
            return Err(StreamError::IllegalState(format!("{} is not an array type", type_name)));
        };
        let expected = FieldType::from_primitive_name(component).unwrap_or(FieldType::Object);
        if elements.element_type() != expected {
            return Err(StreamError::IllegalState(format!(
                "{:?} elements do not fit {}",
                elements.element_type(),
                type_name
            )));
        }
        Ok(self.push(HeapObject::Array {
            type_name: type_name.to_string(),
            elements,
        }))
    }

    /// Allocates a zero-initialized instance of a registered class.
    pub fn new_instance(&mut self, class_name: &str) -> Result<ObjectId> {
        let def = self.registry.type_def(class_name)?;
        if !matches!(def.kind(), TypeKind::Class | TypeKind::Proxy(_)) {
            return Err(StreamError::IllegalState(format!(
                "{} cannot be instantiated",
                class_name
            )));
        }
        let layouts = self.registry.storage_layouts(class_name)?;
        Ok(self.alloc_instance(class_name, &layouts))
    }

    pub(crate) fn alloc_instance(&mut self, class_name: &str, layouts: &[Arc<FieldLayout>]) -> ObjectId {
        let slots = layouts.iter().cloned().map(InstanceSlot::new).collect();
        self.push(HeapObject::Instance(Instance {
            class_name: class_name.to_string(),
            slots,
        }))
    }

    /// Returns the canonical object for an enum constant.
    pub fn enum_constant(&mut self, type_name: &str, constant: &str) -> Result<ObjectId> {
        let key = (type_name.to_string(), constant.to_string());
        if let Some(id) = self.enums.get(&key) {
            return Ok(*id);
        }
        let def = self.registry.type_def(type_name)?;
        if !def.is_enum() {
            return Err(StreamError::IllegalState(format!("{} is not an enum type", type_name)));
        }
        if !def.enum_constants().iter().any(|c| c == constant) {
            return Err(StreamError::InvalidObject(format!(
                "enum constant {} does not exist in {}",
                constant, type_name
            )));
        }
        let id = self.push(HeapObject::Enum {
            type_name: key.0.clone(),
            constant: key.1.clone(),
        });
        self.enums.insert(key, id);
        Ok(id)
    }

    /// Returns the canonical class object for a type name.
    pub fn class_object(&mut self, name: &str) -> ObjectId {
        if let Some(id) = self.classes.get(name) {
            return *id;
        }
        let id = self.push(HeapObject::Class {
            name: name.to_string(),
        });
        self.classes.insert(name.to_string(), id);
        id
    }

    /// Wraps a class descriptor as a heap value.
    pub fn descriptor_object(&mut self, desc: Arc<ClassDescriptor>) -> ObjectId {
        self.push(HeapObject::Descriptor(desc))
    }

    /// Allocates a proxy instance implementing `interfaces` with the given handler.
    pub fn new_proxy(&mut self, interfaces: &[String], handler: Value) -> Result<ObjectId> {
        let def = self.registry.resolve_proxy(interfaces)?;
        let id = self.new_instance(def.name())?;
        self.set_field_of(id, PROXY, "h", handler)?;
        Ok(id)
    }

    /// Allocates an `ArrayList` holding `elements`.
    pub fn new_array_list(&mut self, elements: Vec<Value>) -> Result<ObjectId> {
        let size = elements.len() as i32;
        let data = self.alloc_array("[Ljava.lang.Object;", ArrayElements::Object(elements))?;
        let id = self.new_instance(ARRAY_LIST)?;
        self.set_field_of(id, ARRAY_LIST, "size", Value::Int(size))?;
        self.set_field_of(id, ARRAY_LIST, "elementData", Value::Ref(data))?;
        Ok(id)
    }

    /// Elements of an `ArrayList` (or subclass) instance.
    pub fn list_elements(&self, id: ObjectId) -> Result<Vec<Value>> {
        let size = self.field_of(id, ARRAY_LIST, "size")?.as_int().unwrap_or(0).max(0) as usize;
        match self.field_of(id, ARRAY_LIST, "elementData")? {
            Value::Ref(data) => match self.array(data) {
                Some(ArrayElements::Object(values)) if values.len() >= size => {
                    Ok(values[..size].to_vec())
                }
                _ => Err(StreamError::IllegalState(
                    "list storage is not an object array of sufficient length".to_string(),
                )),
            },
            _ if size == 0 => Ok(Vec::new()),
            _ => Err(StreamError::IllegalState("list storage missing".to_string())),
        }
    }

    /// Boxes a primitive value into its wrapper object; references pass through.
    pub fn boxed(&mut self, value: Value) -> Result<Value> {
        let class_name = match value.primitive_type() {
            Some(ft) => box_class(ft),
            None => return Ok(value),
        };
        let id = self.new_instance(class_name)?;
        self.set_field_of(id, class_name, "value", value)?;
        Ok(Value::Ref(id))
    }

    /// Unboxes a wrapper object into its primitive value.
    pub fn unbox(&self, value: Value) -> Option<Value> {
        let id = value.as_object()?;
        let inst = self.instance(id)?;
        let ft = [
            FieldType::Boolean,
            FieldType::Byte,
            FieldType::Char,
            FieldType::Short,
            FieldType::Int,
            FieldType::Long,
            FieldType::Float,
            FieldType::Double,
        ]
        .into_iter()
        .find(|ft| box_class(*ft) == inst.class_name())?;
        inst.slot(box_class(ft))?.get("value")
    }

    /// Looks up an object.
    pub fn get(&self, id: ObjectId) -> Option<&HeapObject> {
        self.objects.get(id.0)
    }

    /// Looks up an object mutably.
    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut HeapObject> {
        self.objects.get_mut(id.0)
    }

    pub(crate) fn object(&self, id: ObjectId) -> Result<&HeapObject> {
        self.get(id)
            .ok_or_else(|| StreamError::IllegalState(format!("unknown object id {}", id.0)))
    }

    /// Runtime type name of an object.
    pub fn type_name(&self, id: ObjectId) -> Option<&str> {
        self.get(id).map(HeapObject::type_name)
    }

    /// The instance behind `id`, if it is an ordinary object.
    pub fn instance(&self, id: ObjectId) -> Option<&Instance> {
        match self.get(id)? {
            HeapObject::Instance(inst) => Some(inst),
            _ => None,
        }
    }

    /// The instance behind `id`, mutably.
    pub fn instance_mut(&mut self, id: ObjectId) -> Option<&mut Instance> {
        match self.get_mut(id)? {
            HeapObject::Instance(inst) => Some(inst),
            _ => None,
        }
    }

    /// The elements behind `id`, if it is an array.
    pub fn array(&self, id: ObjectId) -> Option<&ArrayElements> {
        match self.get(id)? {
            HeapObject::Array { elements, .. } => Some(elements),
            _ => None,
        }
    }

    /// The elements behind `id`, mutably.
    pub fn array_mut(&mut self, id: ObjectId) -> Option<&mut ArrayElements> {
        match self.get_mut(id)? {
            HeapObject::Array { elements, .. } => Some(elements),
            _ => None,
        }
    }

    /// The string a value refers to, if any.
    pub fn string(&self, value: Value) -> Option<&str> {
        match self.get(value.as_object()?)? {
            HeapObject::String(s) => Some(s),
            _ => None,
        }
    }

    /// Reads a field, searching from the most-derived class level.
    pub fn field(&self, id: ObjectId, name: &str) -> Result<Value> {
        let inst = self.expect_instance(id)?;
        inst.get(name).ok_or_else(|| {
            StreamError::IllegalState(format!("no field {} in {}", name, inst.class_name()))
        })
    }

    /// Writes a field on the most-derived class level that declares it.
    pub fn set_field(&mut self, id: ObjectId, name: &str, value: Value) -> Result<()> {
        let inst = self.expect_instance_mut(id)?;
        let class_name = inst.class_name.clone();
        match inst
            .slots
            .iter_mut()
            .rev()
            .find(|s| s.layout().field(name).is_some())
        {
            Some(slot) => slot.set(name, value),
            None => Err(StreamError::IllegalState(format!(
                "no field {} in {}",
                name, class_name
            ))),
        }
    }

    /// Reads a field of a specific class level.
    pub fn field_of(&self, id: ObjectId, class_name: &str, name: &str) -> Result<Value> {
        let inst = self.expect_instance(id)?;
        inst.slot(class_name)
            .and_then(|s| s.get(name))
            .ok_or_else(|| StreamError::IllegalState(format!("no field {}.{}", class_name, name)))
    }

    /// Writes a field of a specific class level.
    pub fn set_field_of(
        &mut self,
        id: ObjectId,
        class_name: &str,
        name: &str,
        value: Value,
    ) -> Result<()> {
        let inst = self.expect_instance_mut(id)?;
        let runtime = inst.class_name.clone();
        match inst.slot_mut(class_name) {
            Some(slot) => slot.set(name, value),
            None => Err(StreamError::IllegalState(format!(
                "{} has no class level {}",
                runtime, class_name
            ))),
        }
    }

    fn expect_instance(&self, id: ObjectId) -> Result<&Instance> {
        match self.object(id)? {
            HeapObject::Instance(inst) => Ok(inst),
            other => Err(StreamError::IllegalState(format!(
                "{} is not an ordinary object",
                other.type_name()
            ))),
        }
    }

    fn expect_instance_mut(&mut self, id: ObjectId) -> Result<&mut Instance> {
        match self.objects.get_mut(id.0) {
            Some(HeapObject::Instance(inst)) => Ok(inst),
            Some(other) => Err(StreamError::IllegalState(format!(
                "{} is not an ordinary object",
                other.type_name()
            ))),
            None => Err(StreamError::IllegalState(format!("unknown object id {}", id.0))),
        }
    }
}

fn box_class(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Boolean => "java.lang.Boolean",
        FieldType::Byte => "java.lang.Byte",
        FieldType::Char => "java.lang.Character",
        FieldType::Short => "java.lang.Short",
        FieldType::Int => "java.lang.Integer",
        FieldType::Long => "java.lang.Long",
        FieldType::Float => "java.lang.Float",
        FieldType::Double => "java.lang.Double",
        FieldType::Object | FieldType::Array => "java.lang.Object",
    }
}
