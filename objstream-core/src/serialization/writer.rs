//! Serialization writer.
//!
//! [`ObjectWriter`] walks an object graph held in a [`Heap`] and emits it as a stream of
//! records. Every new object, string, array, enum constant and class descriptor is
//! assigned the next handle; later encounters of the same identity are written as
//! back-references, which is what preserves sharing and makes cycles terminate.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

use bytes::BufMut;

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::protocol::{
    ProtocolVersion, MAX_SHORT_STRING_LEN, STREAM_MAGIC, STREAM_VERSION, TC_ARRAY, TC_CLASS,
    TC_CLASSDESC, TC_ENDBLOCKDATA, TC_ENUM, TC_EXCEPTION, TC_LONGSTRING, TC_NULL, TC_OBJECT,
    TC_PROXYCLASSDESC, TC_REFERENCE, TC_RESET, TC_STRING,
};
use crate::serialization::block::BlockDataOutput;
use crate::serialization::data_output::utf_length;
use crate::serialization::descriptor::ClassDescriptor;
use crate::serialization::fields::PutField;
use crate::serialization::handles::{to_wire, HandleKey, HandleMap};
use crate::serialization::heap::{ArrayElements, Heap, HeapObject, ObjectId, Value};
use crate::serialization::hooks::{ObjectOutput, ObjectReplacer};
use crate::serialization::DataOutput;

const ENUM: &str = "java.lang.Enum";
const THROWABLE: &str = "java.lang.Throwable";

/// Writes object graphs to a byte sink.
///
/// The stream header is written on construction. Top-level primitive writes through
/// the [`DataOutput`] impl go into block data.
pub struct ObjectWriter<W: Write> {
    out: BlockDataOutput<W>,
    protocol: ProtocolVersion,
    handles: HandleMap,
    subs: HashMap<ObjectId, Value>,
    depth: usize,
    heap_id: Option<u64>,
    replacer: Option<Arc<dyn ObjectReplacer>>,
}

impl<W: Write> fmt::Debug for ObjectWriter<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectWriter")
            .field("protocol", &self.protocol)
            .field("handles", &self.handles.size())
            .field("depth", &self.depth)
            .field("replace_enabled", &self.replacer.is_some())
            .finish()
    }
}

impl<W: Write> ObjectWriter<W> {
    /// Creates a writer with default settings and writes the stream header.
    pub fn new(sink: W) -> Result<Self> {
        Self::with_config(sink, &StreamConfig::default())
    }

    /// Creates a writer and writes the stream header.
    pub fn with_config(sink: W, config: &StreamConfig) -> Result<Self> {
        let mut out = BlockDataOutput::new(sink);
        out.write_short(STREAM_MAGIC as i16)?;
        out.write_short(STREAM_VERSION as i16)?;
        out.set_block_data_mode(true)?;
        Ok(Self {
            out,
            protocol: config.protocol_version(),
            handles: HandleMap::new(),
            subs: HashMap::new(),
            depth: 0,
            heap_id: None,
            replacer: None,
        })
    }

    /// Writes `value` and the graph reachable from it.
    ///
    /// On failure a terminal exception record describing the error is written and the
    /// handle table is cleared before the error is returned.
    pub fn write_object(&mut self, heap: &mut Heap, value: impl Into<Value>) -> Result<()> {
        self.write_top(heap, value.into(), false)
    }

    /// Writes `value` as a new object that is never back-referenced.
    pub fn write_unshared(&mut self, heap: &mut Heap, value: impl Into<Value>) -> Result<()> {
        self.write_top(heap, value.into(), true)
    }

    /// Writes a reset marker; the reader forgets all handles at this point.
    pub fn reset(&mut self) -> Result<()> {
        if self.depth != 0 {
            return Err(StreamError::IllegalState("stream active".to_string()));
        }
        self.out.set_block_data_mode(false)?;
        self.out.write_bytes(&[TC_RESET])?;
        self.clear();
        self.heap_id = None;
        self.out.set_block_data_mode(true)?;
        tracing::debug!("stream reset written");
        Ok(())
    }

    /// Drains buffered block data and flushes the sink.
    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()
    }

    /// Selects the protocol version. Only allowed before any handle is assigned.
    pub fn use_protocol_version(&mut self, version: ProtocolVersion) -> Result<()> {
        if !self.handles.is_empty() {
            return Err(StreamError::IllegalState("stream non-empty".to_string()));
        }
        self.protocol = version;
        Ok(())
    }

    /// The protocol version in use.
    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol
    }

    /// Installs a substitution applied to every value written from now on.
    pub fn enable_replace_object(&mut self, replacer: Arc<dyn ObjectReplacer>) {
        self.replacer = Some(replacer);
    }

    /// Removes the substitution installed by [`enable_replace_object`](Self::enable_replace_object).
    pub fn disable_replace_object(&mut self) {
        self.replacer = None;
    }

    /// Number of handles assigned since the last reset.
    pub fn handle_count(&self) -> usize {
        self.handles.size()
    }

    /// Returns the sink.
    pub fn get_ref(&self) -> &W {
        self.out.get_ref()
    }

    /// Drains buffered block data and returns the sink.
    pub fn into_inner(self) -> Result<W> {
        self.out.into_inner()
    }

    fn write_top(&mut self, heap: &mut Heap, value: Value, unshared: bool) -> Result<()> {
        match self.heap_id {
            Some(id) if id != heap.id() => {
                return Err(StreamError::IllegalState(
                    "writer is bound to a different heap; reset first".to_string(),
                ))
            }
            _ => self.heap_id = Some(heap.id()),
        }
        match self.write_object0(heap, value, unshared) {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::warn!(error = %err, "object write failed");
                if let Err(secondary) = self.write_fatal_exception(heap, &err) {
                    tracing::debug!(error = %secondary, "could not record terminal exception");
                }
                Err(err)
            }
        }
    }

    fn clear(&mut self) {
        self.handles.clear();
        self.subs.clear();
    }

    fn assign(&mut self, key: Option<HandleKey>) {
        let handle = self.handles.assign(key);
        tracing::trace!(handle, "assigned write handle");
    }

    fn write_fatal_exception(&mut self, heap: &Heap, err: &StreamError) -> Result<()> {
        self.clear();
        let old_mode = self.out.set_block_data_mode(false)?;
        self.out.write_bytes(&[TC_EXCEPTION])?;
        let mut scratch = Heap::new(Arc::clone(heap.registry()));
        let exception = build_exception(&mut scratch, err)?;
        self.write_object0(&mut scratch, Value::Ref(exception), false)?;
        self.clear();
        self.out.set_block_data_mode(old_mode)?;
        tracing::debug!(
            exception = err.exception_class_name(),
            "terminal exception record written"
        );
        Ok(())
    }

    pub(crate) fn write_object0(&mut self, heap: &mut Heap, value: Value, unshared: bool) -> Result<()> {
        let old_mode = self.out.set_block_data_mode(false)?;
        self.depth += 1;
        let result = self.write_object_body(heap, value, unshared);
        self.depth -= 1;
        let restored = self.out.set_block_data_mode(old_mode);
        result?;
        restored?;
        Ok(())
    }

    fn reference(heap: &mut Heap, value: Value) -> Result<Option<ObjectId>> {
        Ok(heap.boxed(value)?.as_object())
    }

    fn descriptor_of(heap: &Heap, id: ObjectId) -> Result<Option<Arc<ClassDescriptor>>> {
        match heap.object(id)? {
            HeapObject::Class { .. } | HeapObject::Descriptor(_) => Ok(None),
            other => heap.registry().descriptor(other.type_name()).map(Some),
        }
    }

    /// Handles the cases that short-circuit before any new record is started.
    fn write_shortcut(&mut self, heap: &mut Heap, id: ObjectId, unshared: bool) -> Result<bool> {
        if !unshared {
            if let Some(handle) = self.handles.lookup(&HandleKey::Object(id)) {
                self.write_handle(handle)?;
                return Ok(true);
            }
        }
        match heap.object(id)? {
            HeapObject::Class { name } => {
                let name = name.clone();
                self.write_class(heap, id, &name, unshared)?;
                Ok(true)
            }
            HeapObject::Descriptor(desc) => {
                let desc = Arc::clone(desc);
                self.write_class_desc(Some(desc), unshared)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn write_object_body(&mut self, heap: &mut Heap, value: Value, unshared: bool) -> Result<()> {
        let value = match value.as_object() {
            Some(id) => self.subs.get(&id).copied().unwrap_or(value),
            None => value,
        };
        let Some(orig) = Self::reference(heap, value)? else {
            return self.write_null();
        };
        if self.write_shortcut(heap, orig, unshared)? {
            return Ok(());
        }

        let mut type_name = heap.object(orig)?.type_name().to_string();
        let mut desc = Self::descriptor_of(heap, orig)?;
        let mut current = Some(orig);
        while let (Some(obj), Some(d)) = (current, desc.as_ref()) {
            let Some(hook) = d.hooks().and_then(|h| h.write_replace.clone()) else {
                break;
            };
            let rep = hook.write_replace(obj, heap)?;
            current = Self::reference(heap, rep)?;
            let Some(rep) = current else {
                break;
            };
            let rep_type = heap.object(rep)?.type_name().to_string();
            if rep_type == type_name {
                break;
            }
            desc = Self::descriptor_of(heap, rep)?;
            type_name = rep_type;
        }
        if let Some(replacer) = self.replacer.clone() {
            let rep = replacer.replace_object(heap, Value::from(current))?;
            let rep = Self::reference(heap, rep)?;
            if let Some(rep_id) = rep {
                if rep != current {
                    desc = Self::descriptor_of(heap, rep_id)?;
                    type_name = heap.object(rep_id)?.type_name().to_string();
                }
            }
            current = rep;
        }

        if current != Some(orig) {
            self.subs.insert(orig, Value::from(current));
            let Some(obj) = current else {
                return self.write_null();
            };
            if self.write_shortcut(heap, obj, unshared)? {
                return Ok(());
            }
        }

        let Some(obj) = current else {
            return self.write_null();
        };
        let desc = desc.ok_or_else(|| StreamError::NotSerializable(type_name.clone()))?;
        match heap.object(obj)? {
            HeapObject::String(s) => {
                let s = s.clone();
                let key = (!unshared).then_some(HandleKey::Object(obj));
                self.write_string(&s, key)
            }
            HeapObject::Array { .. } => self.write_array(heap, obj, desc, unshared),
            HeapObject::Enum { .. } => self.write_enum(heap, obj, desc, unshared),
            HeapObject::Instance(_) if desc.is_serializable() => {
                self.write_ordinary_object(heap, obj, desc, unshared)
            }
            _ => Err(StreamError::NotSerializable(type_name)),
        }
    }

    fn write_null(&mut self) -> Result<()> {
        self.out.write_bytes(&[TC_NULL])
    }

    fn write_handle(&mut self, handle: usize) -> Result<()> {
        self.out.write_bytes(&[TC_REFERENCE])?;
        self.out.write_int(to_wire(handle))
    }

    fn write_class(&mut self, heap: &Heap, id: ObjectId, name: &str, unshared: bool) -> Result<()> {
        self.out.write_bytes(&[TC_CLASS])?;
        let desc = heap.registry().descriptor(name)?;
        self.write_class_desc(Some(desc), false)?;
        self.assign((!unshared).then_some(HandleKey::Object(id)));
        Ok(())
    }

    fn write_class_desc(&mut self, desc: Option<Arc<ClassDescriptor>>, unshared: bool) -> Result<()> {
        let Some(desc) = desc else {
            return self.write_null();
        };
        let key = HandleKey::Descriptor(desc.name().to_string());
        if !unshared {
            if let Some(handle) = self.handles.lookup(&key) {
                return self.write_handle(handle);
            }
        }
        let key = (!unshared).then_some(key);
        if desc.is_proxy() {
            self.write_proxy_desc(&desc, key)
        } else {
            self.write_non_proxy_desc(&desc, key)
        }
    }

    fn write_proxy_desc(&mut self, desc: &Arc<ClassDescriptor>, key: Option<HandleKey>) -> Result<()> {
        self.out.write_bytes(&[TC_PROXYCLASSDESC])?;
        self.assign(key);
        let interfaces = desc.interfaces();
        self.out.write_int(interfaces.len() as i32)?;
        for name in interfaces {
            self.out.write_utf(name)?;
        }
        self.out.write_bytes(&[TC_ENDBLOCKDATA])?;
        tracing::debug!(class = %desc.name(), "wrote proxy class descriptor");
        self.write_class_desc(desc.super_desc().cloned(), false)
    }

    fn write_non_proxy_desc(&mut self, desc: &Arc<ClassDescriptor>, key: Option<HandleKey>) -> Result<()> {
        self.out.write_bytes(&[TC_CLASSDESC])?;
        self.assign(key);
        self.out.write_utf(desc.name())?;
        self.out.write_long(desc.suid())?;
        self.out.write_bytes(&[desc.wire_flags(self.protocol)])?;
        self.out.write_short(desc.fields().len() as i16)?;
        for field in desc.fields() {
            self.out.write_bytes(&[field.field_type().code()])?;
            self.out.write_utf(field.name())?;
            if !field.is_primitive() {
                self.write_type_string(field.signature())?;
            }
        }
        // empty class annotation
        self.out.write_bytes(&[TC_ENDBLOCKDATA])?;
        tracing::debug!(class = %desc.name(), suid = desc.suid(), "wrote class descriptor");
        self.write_class_desc(desc.super_desc().cloned(), false)
    }

    fn write_type_string(&mut self, signature: &str) -> Result<()> {
        let key = HandleKey::TypeString(signature.to_string());
        match self.handles.lookup(&key) {
            Some(handle) => self.write_handle(handle),
            None => self.write_string(signature, Some(key)),
        }
    }

    fn write_string(&mut self, s: &str, key: Option<HandleKey>) -> Result<()> {
        self.assign(key);
        if utf_length(s) <= MAX_SHORT_STRING_LEN {
            self.out.write_bytes(&[TC_STRING])?;
            self.out.write_utf(s)
        } else {
            self.out.write_bytes(&[TC_LONGSTRING])?;
            self.out.write_long_utf(s)
        }
    }

    fn write_array(
        &mut self,
        heap: &mut Heap,
        id: ObjectId,
        desc: Arc<ClassDescriptor>,
        unshared: bool,
    ) -> Result<()> {
        self.out.write_bytes(&[TC_ARRAY])?;
        self.write_class_desc(Some(desc), false)?;
        self.assign((!unshared).then_some(HandleKey::Object(id)));
        let elements = heap
            .array(id)
            .ok_or_else(|| StreamError::IllegalState(format!("object {} is not an array", id.index())))?;
        if let ArrayElements::Object(values) = elements {
            let values = values.clone();
            self.out.write_int(values.len() as i32)?;
            for value in values {
                self.write_object0(heap, value, false)?;
            }
            return Ok(());
        }
        self.out.write_int(elements.len() as i32)?;
        let mut buf = Vec::with_capacity(elements.len() * elements.element_type().primitive_size());
        match elements {
            ArrayElements::Boolean(v) => v.iter().for_each(|x| buf.put_u8(u8::from(*x))),
            ArrayElements::Byte(v) => v.iter().for_each(|x| buf.put_i8(*x)),
            ArrayElements::Char(v) => v.iter().for_each(|x| buf.put_u16(*x)),
            ArrayElements::Short(v) => v.iter().for_each(|x| buf.put_i16(*x)),
            ArrayElements::Int(v) => v.iter().for_each(|x| buf.put_i32(*x)),
            ArrayElements::Long(v) => v.iter().for_each(|x| buf.put_i64(*x)),
            ArrayElements::Float(v) => v.iter().for_each(|x| buf.put_f32(*x)),
            ArrayElements::Double(v) => v.iter().for_each(|x| buf.put_f64(*x)),
            ArrayElements::Object(_) => {}
        }
        self.out.write_bytes(&buf)
    }

    fn write_enum(
        &mut self,
        heap: &Heap,
        id: ObjectId,
        desc: Arc<ClassDescriptor>,
        unshared: bool,
    ) -> Result<()> {
        self.out.write_bytes(&[TC_ENUM])?;
        let class_desc = match desc.super_desc() {
            Some(sup) if sup.name() != ENUM && sup.is_enum() => Arc::clone(sup),
            _ => desc,
        };
        self.write_class_desc(Some(class_desc), false)?;
        self.assign((!unshared).then_some(HandleKey::Object(id)));
        let constant = match heap.object(id)? {
            HeapObject::Enum { constant, .. } => constant.clone(),
            other => {
                return Err(StreamError::IllegalState(format!(
                    "{} is not an enum constant",
                    other.type_name()
                )))
            }
        };
        self.write_string(&constant, None)
    }

    fn write_ordinary_object(
        &mut self,
        heap: &mut Heap,
        id: ObjectId,
        desc: Arc<ClassDescriptor>,
        unshared: bool,
    ) -> Result<()> {
        desc.check_serialize()?;
        self.out.write_bytes(&[TC_OBJECT])?;
        self.write_class_desc(Some(Arc::clone(&desc)), false)?;
        self.assign((!unshared).then_some(HandleKey::Object(id)));
        if desc.is_externalizable() && !desc.is_proxy() {
            self.write_external_data(heap, id, &desc)
        } else {
            self.write_serial_data(heap, id, &desc)
        }
    }

    fn write_external_data(&mut self, heap: &mut Heap, id: ObjectId, desc: &ClassDescriptor) -> Result<()> {
        let externalizer = desc
            .externalizer()
            .cloned()
            .ok_or_else(|| StreamError::invalid_class(desc.name(), "no externalizer registered"))?;
        if self.protocol == ProtocolVersion::V1 {
            let mut out = HookOutput::new(self, heap, None);
            return externalizer.write_external(id, &mut out);
        }
        self.out.set_block_data_mode(true)?;
        {
            let mut out = HookOutput::new(self, heap, None);
            externalizer.write_external(id, &mut out)?;
        }
        self.out.set_block_data_mode(false)?;
        self.out.write_bytes(&[TC_ENDBLOCKDATA])
    }

    fn write_serial_data(&mut self, heap: &mut Heap, id: ObjectId, desc: &Arc<ClassDescriptor>) -> Result<()> {
        for slot in desc.class_data_slots() {
            let slot_desc = slot.desc;
            match slot_desc.hooks().and_then(|h| h.write_object.clone()) {
                Some(hook) => {
                    self.out.set_block_data_mode(true)?;
                    {
                        let ctx = CallbackContext {
                            obj: id,
                            desc: Arc::clone(&slot_desc),
                            put: None,
                        };
                        let mut out = HookOutput::new(self, heap, Some(ctx));
                        hook.write_object(id, &mut out)?;
                    }
                    self.out.set_block_data_mode(false)?;
                    self.out.write_bytes(&[TC_ENDBLOCKDATA])?;
                }
                None => self.default_write_fields(heap, id, &slot_desc)?,
            }
        }
        Ok(())
    }

    fn default_write_fields(&mut self, heap: &mut Heap, id: ObjectId, desc: &ClassDescriptor) -> Result<()> {
        desc.check_default_serialize()?;
        let reflector = desc.reflector();
        let mut prims = vec![0u8; desc.prim_data_size()];
        let storage = reflector.class_name().unwrap_or(desc.name());
        let objs = match heap.instance(id).and_then(|inst| inst.slot(storage)) {
            Some(slot) => {
                reflector.get_prim_values(slot, &mut prims);
                reflector.get_obj_values(slot)
            }
            None => {
                return Err(StreamError::IllegalState(format!(
                    "object {} has no storage for class {}",
                    id.index(),
                    storage
                )))
            }
        };
        self.out.write_bytes(&prims)?;
        let fields = desc.fields();
        let num_prim = fields.len() - objs.len();
        for (i, value) in objs.into_iter().enumerate() {
            self.write_object0(heap, value, fields[num_prim + i].is_unshared())?;
        }
        Ok(())
    }

    fn write_put_fields(&mut self, heap: &mut Heap, put: &PutField) -> Result<()> {
        self.out.set_block_data_mode(false)?;
        self.out.write_bytes(put.prim_data())?;
        let fields = put.descriptor().fields();
        let values = put.obj_values();
        let num_prim = fields.len() - values.len();
        for (i, value) in values.iter().enumerate() {
            self.write_object0(heap, *value, fields[num_prim + i].is_unshared())?;
        }
        self.out.set_block_data_mode(true)?;
        Ok(())
    }
}

impl<W: Write> DataOutput for ObjectWriter<W> {
    fn write_byte(&mut self, v: i8) -> Result<()> {
        self.out.write_byte(v)
    }

    fn write_bool(&mut self, v: bool) -> Result<()> {
        self.out.write_bool(v)
    }

    fn write_char(&mut self, v: u16) -> Result<()> {
        self.out.write_char(v)
    }

    fn write_short(&mut self, v: i16) -> Result<()> {
        self.out.write_short(v)
    }

    fn write_int(&mut self, v: i32) -> Result<()> {
        self.out.write_int(v)
    }

    fn write_long(&mut self, v: i64) -> Result<()> {
        self.out.write_long(v)
    }

    fn write_float(&mut self, v: f32) -> Result<()> {
        self.out.write_float(v)
    }

    fn write_double(&mut self, v: f64) -> Result<()> {
        self.out.write_double(v)
    }

    fn write_bytes(&mut self, v: &[u8]) -> Result<()> {
        self.out.write_bytes(v)
    }
}

/// Builds the exception object recorded for a failed top-level write.
fn build_exception(heap: &mut Heap, err: &StreamError) -> Result<ObjectId> {
    let class_name = err.exception_class_name();
    let id = heap.new_instance(class_name)?;
    let message = heap.alloc_string(err.detail_message());
    heap.set_field_of(id, THROWABLE, "detailMessage", Value::Ref(message))?;
    let invalid_class = match err {
        StreamError::InvalidClass {
            class_name: Some(name),
            ..
        } => Some(name),
        StreamError::VersionMismatch { class_name, .. } => Some(class_name),
        _ => None,
    };
    if let Some(name) = invalid_class {
        let name = heap.alloc_string(name.clone());
        heap.set_field_of(id, class_name, "classname", Value::Ref(name))?;
    }
    if let StreamError::OptionalData { eof, length } = err {
        heap.set_field_of(id, class_name, "eof", Value::Boolean(*eof))?;
        heap.set_field_of(id, class_name, "length", Value::Int(*length as i32))?;
    }
    Ok(id)
}

/// The object and class level a write hook is running for.
struct CallbackContext {
    obj: ObjectId,
    desc: Arc<ClassDescriptor>,
    put: Option<PutField>,
}

/// Stream view handed to write hooks and externalizers.
struct HookOutput<'a, W: Write> {
    writer: &'a mut ObjectWriter<W>,
    heap: &'a mut Heap,
    ctx: Option<CallbackContext>,
}

impl<'a, W: Write> HookOutput<'a, W> {
    fn new(writer: &'a mut ObjectWriter<W>, heap: &'a mut Heap, ctx: Option<CallbackContext>) -> Self {
        Self { writer, heap, ctx }
    }

    fn context(&mut self) -> Result<&mut CallbackContext> {
        self.ctx
            .as_mut()
            .ok_or_else(|| StreamError::NotActive("not in call to writeObject".to_string()))
    }
}

impl<W: Write> ObjectOutput for HookOutput<'_, W> {
    fn write_object(&mut self, value: Value) -> Result<()> {
        self.writer.write_object0(self.heap, value, false)
    }

    fn write_unshared(&mut self, value: Value) -> Result<()> {
        self.writer.write_object0(self.heap, value, true)
    }

    fn default_write_object(&mut self) -> Result<()> {
        let ctx = self.context()?;
        let (obj, desc) = (ctx.obj, Arc::clone(&ctx.desc));
        self.writer.out.set_block_data_mode(false)?;
        self.writer.default_write_fields(self.heap, obj, &desc)?;
        self.writer.out.set_block_data_mode(true)?;
        Ok(())
    }

    fn put_fields(&mut self) -> Result<&mut PutField> {
        let ctx = self.context()?;
        let desc = Arc::clone(&ctx.desc);
        Ok(ctx.put.get_or_insert_with(|| PutField::new(desc)))
    }

    fn write_fields(&mut self) -> Result<()> {
        let put = self
            .ctx
            .as_ref()
            .and_then(|ctx| ctx.put.as_ref())
            .ok_or_else(|| StreamError::NotActive("no current PutField object".to_string()))?;
        self.writer.write_put_fields(self.heap, put)
    }

    fn heap(&self) -> &Heap {
        &*self.heap
    }

    fn heap_mut(&mut self) -> &mut Heap {
        &mut *self.heap
    }
}

impl<W: Write> DataOutput for HookOutput<'_, W> {
    fn write_byte(&mut self, v: i8) -> Result<()> {
        self.writer.out.write_byte(v)
    }

    fn write_bool(&mut self, v: bool) -> Result<()> {
        self.writer.out.write_bool(v)
    }

    fn write_char(&mut self, v: u16) -> Result<()> {
        self.writer.out.write_char(v)
    }

    fn write_short(&mut self, v: i16) -> Result<()> {
        self.writer.out.write_short(v)
    }

    fn write_int(&mut self, v: i32) -> Result<()> {
        self.writer.out.write_int(v)
    }

    fn write_long(&mut self, v: i64) -> Result<()> {
        self.writer.out.write_long(v)
    }

    fn write_float(&mut self, v: f32) -> Result<()> {
        self.writer.out.write_float(v)
    }

    fn write_double(&mut self, v: f64) -> Result<()> {
        self.writer.out.write_double(v)
    }

    fn write_bytes(&mut self, v: &[u8]) -> Result<()> {
        self.writer.out.write_bytes(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::registry::{TypeDef, TypeRegistry};

    fn heap() -> Heap {
        Heap::new(Arc::new(TypeRegistry::new()))
    }

    fn written(f: impl FnOnce(&mut ObjectWriter<Vec<u8>>, &mut Heap)) -> Vec<u8> {
        let mut heap = heap();
        let mut writer = ObjectWriter::new(Vec::new()).unwrap();
        f(&mut writer, &mut heap);
        writer.into_inner().unwrap()
    }

    #[test]
    fn test_header_only() {
        let bytes = written(|_, _| {});
        assert_eq!(bytes, vec![0xAC, 0xED, 0x00, 0x05]);
    }

    #[test]
    fn test_short_string_golden() {
        let bytes = written(|w, heap| {
            let s = heap.alloc_string("hi");
            w.write_object(heap, s).unwrap();
        });
        assert_eq!(bytes, vec![0xAC, 0xED, 0x00, 0x05, 0x74, 0x00, 0x02, b'h', b'i']);
    }

    #[test]
    fn test_null_and_back_reference() {
        let bytes = written(|w, heap| {
            let s = heap.alloc_string("a");
            w.write_object(heap, Value::Null).unwrap();
            w.write_object(heap, s).unwrap();
            w.write_object(heap, s).unwrap();
            assert_eq!(w.handle_count(), 1);
        });
        assert_eq!(
            &bytes[4..],
            &[TC_NULL, TC_STRING, 0, 1, b'a', TC_REFERENCE, 0x00, 0x7E, 0x00, 0x00]
        );
    }

    #[test]
    fn test_unshared_string_not_shared() {
        let bytes = written(|w, heap| {
            let s = heap.alloc_string("a");
            w.write_unshared(heap, s).unwrap();
            w.write_object(heap, s).unwrap();
            assert_eq!(w.handle_count(), 2);
        });
        assert_eq!(&bytes[4..], &[TC_STRING, 0, 1, b'a', TC_STRING, 0, 1, b'a']);
    }

    #[test]
    fn test_long_string_threshold() {
        let bytes = written(|w, heap| {
            let short = heap.alloc_string("x".repeat(65535));
            let long = heap.alloc_string("y".repeat(65536));
            w.write_object(heap, short).unwrap();
            w.write_object(heap, long).unwrap();
        });
        assert_eq!(bytes[4], TC_STRING);
        assert_eq!(bytes[4 + 3 + 65535], TC_LONGSTRING);
    }

    #[test]
    fn test_top_level_primitives_use_block_data() {
        let bytes = written(|w, _| {
            w.write_int(7).unwrap();
            w.flush().unwrap();
        });
        assert_eq!(&bytes[4..], &[0x77, 4, 0, 0, 0, 7]);
    }

    #[test]
    fn test_reset_clears_handles() {
        let bytes = written(|w, heap| {
            let s = heap.alloc_string("a");
            w.write_object(heap, s).unwrap();
            w.reset().unwrap();
            assert_eq!(w.handle_count(), 0);
            w.write_object(heap, s).unwrap();
        });
        assert_eq!(
            &bytes[4..],
            &[TC_STRING, 0, 1, b'a', TC_RESET, TC_STRING, 0, 1, b'a']
        );
    }

    #[test]
    fn test_protocol_change_only_before_handles() {
        written(|w, heap| {
            w.use_protocol_version(ProtocolVersion::V1).unwrap();
            let s = heap.alloc_string("a");
            w.write_object(heap, s).unwrap();
            assert!(w.use_protocol_version(ProtocolVersion::V2).is_err());
        });
    }

    #[test]
    fn test_not_serializable_records_exception() {
        let mut heap = heap();
        heap.registry()
            .register(TypeDef::builder("com.example.Socket").build())
            .unwrap();
        let socket = heap.new_instance("com.example.Socket").unwrap();
        let mut writer = ObjectWriter::new(Vec::new()).unwrap();
        let err = writer.write_object(&mut heap, socket).unwrap_err();
        assert!(matches!(err, StreamError::NotSerializable(ref name) if name == "com.example.Socket"));
        assert_eq!(writer.handle_count(), 0);
        let bytes = writer.into_inner().unwrap();
        assert_eq!(bytes[4], TC_EXCEPTION);
        assert_eq!(bytes[5], TC_OBJECT);
    }

    #[test]
    fn test_other_heap_rejected_until_reset() {
        let mut first = heap();
        let mut second = heap();
        let mut writer = ObjectWriter::new(Vec::new()).unwrap();
        writer.write_object(&mut first, Value::Null).unwrap();
        assert!(matches!(
            writer.write_object(&mut second, Value::Null),
            Err(StreamError::IllegalState(_))
        ));
        writer.reset().unwrap();
        writer.write_object(&mut second, Value::Null).unwrap();
    }

    #[test]
    fn test_replacer_substitutes_values() {
        let bytes = written(|w, heap| {
            let original = heap.alloc_string("secret");
            w.enable_replace_object(Arc::new(|heap: &mut Heap, value: Value| -> Result<Value> {
                if heap.string(value) == Some("secret") {
                    Ok(Value::Ref(heap.alloc_string("***")))
                } else {
                    Ok(value)
                }
            }));
            w.write_object(heap, original).unwrap();
            w.write_object(heap, original).unwrap();
        });
        assert_eq!(
            &bytes[4..],
            &[TC_STRING, 0, 3, b'*', b'*', b'*', TC_REFERENCE, 0x00, 0x7E, 0x00, 0x00]
        );
    }
}
