//! Deserialization reader.
//!
//! [`ObjectReader`] rebuilds object graphs from a stream into a [`Heap`]. Handles are
//! assigned in the same order the writer assigned them, so back-references resolve to
//! the same heap objects. A class that cannot be resolved locally does not abort the
//! read: its data is consumed and every object depending on it is marked failed, and
//! the failure surfaces only if such an object is handed out.

use std::fmt;
use std::io::Read;
use std::sync::Arc;

use bytes::Buf;

use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::protocol::{
    MAX_PROXY_INTERFACES, STREAM_MAGIC, STREAM_VERSION, TC_ARRAY, TC_BLOCKDATA, TC_BLOCKDATALONG,
    TC_CLASS, TC_CLASSDESC, TC_ENDBLOCKDATA, TC_ENUM, TC_EXCEPTION, TC_LONGSTRING, TC_NULL,
    TC_OBJECT, TC_PROXYCLASSDESC, TC_REFERENCE, TC_RESET, TC_STRING,
};
use crate::serialization::block::BlockDataInput;
use crate::serialization::descriptor::{class_name_of, ClassDescriptor, FieldType, StreamField, WireDescriptor};
use crate::serialization::fields::GetField;
use crate::serialization::filter::{self, FilterInfo, ObjectInputFilter};
use crate::serialization::handles::{from_wire, HandleTable, Payload};
use crate::serialization::heap::{ArrayElements, Heap, HeapObject, ObjectId, Value};
use crate::serialization::hooks::{ObjectInput, ObjectResolver};
use crate::serialization::registry::OBJECT;
use crate::serialization::validation::{ObjectInputValidation, ValidationList};
use crate::serialization::DataInput;

const THROWABLE: &str = "java.lang.Throwable";
const CHUNK: usize = 4096;

/// Reads object graphs from a byte source.
///
/// The stream header is read and checked on construction. Top-level primitive reads
/// through the [`DataInput`] impl consume block data.
pub struct ObjectReader<R: Read> {
    bin: BlockDataInput<R>,
    handles: HandleTable,
    pass_handle: Option<usize>,
    depth: usize,
    validations: ValidationList,
    filter: Option<Arc<dyn ObjectInputFilter>>,
    filter_set: bool,
    started: bool,
    resolver: Option<Arc<dyn ObjectResolver>>,
    strict_names: bool,
    heap_id: Option<u64>,
}

impl<R: Read> fmt::Debug for ObjectReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectReader")
            .field("handles", &self.handles.size())
            .field("depth", &self.depth)
            .field("validations", &self.validations)
            .field("filtered", &self.filter.is_some())
            .field("resolve_enabled", &self.resolver.is_some())
            .field("strict_names", &self.strict_names)
            .finish()
    }
}

impl<R: Read> ObjectReader<R> {
    /// Creates a reader with default settings and checks the stream header.
    pub fn new(source: R) -> Result<Self> {
        Self::with_config(source, &StreamConfig::default())
    }

    /// Creates a reader and checks the stream header.
    pub fn with_config(source: R, config: &StreamConfig) -> Result<Self> {
        let mut bin = BlockDataInput::new(source);
        let magic = bin.read_unsigned_short()?;
        let version = bin.read_unsigned_short()?;
        if magic != STREAM_MAGIC || version != STREAM_VERSION {
            return Err(StreamError::corrupted(format!(
                "invalid stream header: {:04X}{:04X}",
                magic, version
            )));
        }
        bin.set_block_data_mode(true)?;
        Ok(Self {
            bin,
            handles: HandleTable::new(),
            pass_handle: None,
            depth: 0,
            validations: ValidationList::new(),
            filter: config.filter_handle(),
            filter_set: false,
            started: false,
            resolver: None,
            strict_names: config.strict_class_names(),
            heap_id: None,
        })
    }

    /// Reads the next object and the graph reachable from it.
    ///
    /// Registered validations run before this returns. A back-reference to an object
    /// whose class could not be resolved fails with that class's error.
    pub fn read_object(&mut self, heap: &mut Heap) -> Result<Value> {
        self.read_top(heap, false)
    }

    /// Reads the next object as unshared; later back-references to it are errors.
    pub fn read_unshared(&mut self, heap: &mut Heap) -> Result<Value> {
        self.read_top(heap, true)
    }

    /// Installs a read filter.
    ///
    /// Only allowed once, and only before the first object is read.
    pub fn set_filter(&mut self, filter: Arc<dyn ObjectInputFilter>) -> Result<()> {
        if self.filter_set {
            return Err(StreamError::IllegalState(
                "filter can not be set more than once".to_string(),
            ));
        }
        if self.started {
            return Err(StreamError::IllegalState(
                "filter can not be set after an object has been read".to_string(),
            ));
        }
        self.filter = Some(filter);
        self.filter_set = true;
        Ok(())
    }

    /// Returns true if a read filter is active.
    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    /// Installs a substitution applied to every value read from now on.
    pub fn enable_resolve_object(&mut self, resolver: Arc<dyn ObjectResolver>) {
        self.resolver = Some(resolver);
    }

    /// Removes the substitution installed by [`enable_resolve_object`](Self::enable_resolve_object).
    pub fn disable_resolve_object(&mut self) {
        self.resolver = None;
    }

    /// Primitive bytes readable before the next object record.
    pub fn available(&mut self) -> Result<usize> {
        self.bin.available()
    }

    /// Number of handles assigned since the last reset.
    pub fn handle_count(&self) -> usize {
        self.handles.size()
    }

    /// Total bytes consumed from the source, header included.
    pub fn bytes_consumed(&self) -> u64 {
        self.bin.bytes_consumed()
    }

    fn read_top(&mut self, heap: &mut Heap, unshared: bool) -> Result<Value> {
        self.sync_reset();
        match self.heap_id {
            Some(id) if id != heap.id() && !self.handles.is_empty() => {
                return Err(StreamError::IllegalState(
                    "reader is bound to a different heap until the next reset".to_string(),
                ))
            }
            _ => self.heap_id = Some(heap.id()),
        }
        self.started = true;
        self.read_object_outer(heap, unshared)
    }

    /// Entry point shared by top-level reads and reads from inside hooks.
    fn read_object_outer(&mut self, heap: &mut Heap, unshared: bool) -> Result<Value> {
        let outer = self.pass_handle;
        let result = self.read_object0(heap, unshared).and_then(|value| {
            self.handles.mark_dependency(outer, self.pass_handle);
            if let Some(err) = self.pass_handle.and_then(|h| self.handles.lookup_exception(h)) {
                return Err(err.clone());
            }
            if self.depth == 0 {
                self.validations.run(heap)?;
            }
            Ok(value)
        });
        self.pass_handle = outer;
        if self.depth == 0 {
            self.validations.clear();
        }
        result
    }

    fn sync_reset(&mut self) {
        if self.bin.take_reset() {
            self.clear();
        }
    }

    fn clear(&mut self) {
        self.handles.clear();
        self.validations.clear();
        self.heap_id = None;
    }

    fn handle_reset(&mut self) -> Result<()> {
        if self.depth > 0 {
            return Err(StreamError::corrupted(format!(
                "unexpected reset; recursion depth: {}",
                self.depth
            )));
        }
        tracing::debug!(handles = self.handles.size(), "stream reset");
        self.clear();
        Ok(())
    }

    fn enter(&mut self) {
        self.depth += 1;
        self.bin.set_depth(self.depth);
    }

    fn leave(&mut self) {
        self.depth -= 1;
        self.bin.set_depth(self.depth);
    }

    fn assign(&mut self, unshared: bool, value: Value) -> usize {
        let payload = if unshared {
            Payload::Unshared
        } else {
            Payload::Value(value)
        };
        let handle = self.handles.assign(payload);
        tracing::trace!(handle, "assigned read handle");
        handle
    }

    fn filter_check(&self, class_name: Option<&str>, array_length: i64) -> Result<()> {
        match &self.filter {
            Some(f) => filter::apply(
                f.as_ref(),
                FilterInfo {
                    serial_class: class_name.map(str::to_string),
                    array_length,
                    depth: self.depth,
                    references: self.handles.size(),
                    stream_bytes: self.bin.bytes_consumed(),
                },
            ),
            None => Ok(()),
        }
    }

    pub(crate) fn read_object0(&mut self, heap: &mut Heap, unshared: bool) -> Result<Value> {
        let old_mode = self.bin.block_data_mode();
        if old_mode {
            let remaining = self.bin.current_block_remaining()?;
            if remaining > 0 {
                return Err(StreamError::OptionalData {
                    eof: false,
                    length: remaining,
                });
            }
            if self.bin.default_data_end() {
                return Err(StreamError::OptionalData { eof: true, length: 0 });
            }
            self.bin.set_block_data_mode(false)?;
        }

        let mut tc = self.bin.peek_byte()?;
        while tc == TC_RESET {
            self.bin.read_byte()?;
            self.handle_reset()?;
            tc = self.bin.peek_byte()?;
        }

        self.enter();
        let result = self.read_record(heap, tc, unshared, old_mode);
        self.leave();
        let restored = self.bin.set_block_data_mode(old_mode);
        let value = result?;
        restored?;
        Ok(value)
    }

    fn read_record(&mut self, heap: &mut Heap, tc: u8, unshared: bool, old_mode: bool) -> Result<Value> {
        match tc {
            TC_NULL => {
                self.bin.read_byte()?;
                self.pass_handle = None;
                Ok(Value::Null)
            }
            TC_REFERENCE => self.read_handle(unshared),
            TC_CLASS => self.read_class(heap, unshared),
            TC_CLASSDESC | TC_PROXYCLASSDESC => {
                let (_, value) = self.read_class_desc(heap, unshared)?.ok_or_else(|| {
                    StreamError::corrupted("missing class descriptor")
                })?;
                Ok(value)
            }
            TC_STRING | TC_LONGSTRING => {
                let value = self.read_string(heap, unshared)?;
                self.check_resolve(heap, value, unshared)
            }
            TC_ARRAY => {
                let value = self.read_array(heap, unshared)?;
                self.check_resolve(heap, value, unshared)
            }
            TC_ENUM => {
                let value = self.read_enum(heap, unshared)?;
                self.check_resolve(heap, value, unshared)
            }
            TC_OBJECT => {
                let value = self.read_ordinary_object(heap, unshared)?;
                self.check_resolve(heap, value, unshared)
            }
            TC_EXCEPTION => Err(self.read_fatal_exception(heap)?),
            TC_BLOCKDATA | TC_BLOCKDATALONG => {
                if old_mode {
                    self.bin.set_block_data_mode(true)?;
                    self.bin.peek()?;
                    Err(StreamError::OptionalData {
                        eof: false,
                        length: self.bin.current_block_remaining()?,
                    })
                } else {
                    Err(StreamError::corrupted("unexpected block data"))
                }
            }
            TC_ENDBLOCKDATA => {
                if old_mode {
                    Err(StreamError::OptionalData { eof: true, length: 0 })
                } else {
                    Err(StreamError::corrupted("unexpected end of block data"))
                }
            }
            other => Err(StreamError::corrupted(format!("invalid type code: {:02X}", other))),
        }
    }

    fn check_resolve(&mut self, heap: &mut Heap, value: Value, unshared: bool) -> Result<Value> {
        let Some(resolver) = self.resolver.clone() else {
            return Ok(value);
        };
        if value.is_null() {
            return Ok(value);
        }
        let rep = resolver.resolve_object(heap, value)?;
        if rep != value {
            if let Some(id) = rep.as_object() {
                let length = heap.array(id).map_or(-1, |a| a.len() as i64);
                let name = heap.type_name(id).map(str::to_string);
                self.filter_check(name.as_deref(), length)?;
            }
            if let (Some(handle), false) = (self.pass_handle, unshared) {
                self.handles.set_object(handle, rep);
            }
        }
        Ok(rep)
    }

    fn read_handle(&mut self, unshared: bool) -> Result<Value> {
        self.bin.read_byte()?;
        let wire = self.bin.read_int()?;
        let handle = from_wire(wire, self.handles.size())
            .ok_or_else(|| StreamError::corrupted(format!("invalid handle value: {:08X}", wire)))?;
        if unshared {
            return Err(StreamError::InvalidObject(
                "cannot read back reference as unshared".to_string(),
            ));
        }
        if let Some(Payload::Unshared) = self.handles.lookup(handle) {
            return Err(StreamError::InvalidObject(
                "cannot read back reference to unshared object".to_string(),
            ));
        }
        self.pass_handle = Some(handle);
        self.filter_check(None, -1)?;
        Ok(self.handles.lookup_object(handle).unwrap_or(Value::Null))
    }

    fn read_class(&mut self, heap: &mut Heap, unshared: bool) -> Result<Value> {
        self.bin.read_byte()?;
        let (desc, _) = self
            .read_class_desc(heap, false)?
            .ok_or_else(|| StreamError::corrupted("null class descriptor"))?;
        let class = Value::Ref(heap.class_object(desc.name()));
        let handle = self.assign(unshared, class);
        if let Some(err) = desc.resolve_error() {
            self.handles.mark_exception(handle, err.clone());
        }
        self.handles.finish(handle);
        self.pass_handle = Some(handle);
        Ok(class)
    }

    /// Reads a descriptor record, returning the descriptor and its heap value.
    fn read_class_desc(
        &mut self,
        heap: &mut Heap,
        unshared: bool,
    ) -> Result<Option<(Arc<ClassDescriptor>, Value)>> {
        match self.bin.peek_byte()? {
            TC_NULL => {
                self.bin.read_byte()?;
                self.pass_handle = None;
                Ok(None)
            }
            TC_REFERENCE => {
                let value = self.read_handle(unshared)?;
                let desc = value
                    .as_object()
                    .and_then(|id| match heap.get(id) {
                        Some(HeapObject::Descriptor(desc)) => Some(Arc::clone(desc)),
                        _ => None,
                    })
                    .ok_or_else(|| StreamError::corrupted("invalid class descriptor reference"))?;
                Ok(Some((desc, value)))
            }
            TC_PROXYCLASSDESC => self.read_proxy_desc(heap, unshared).map(Some),
            TC_CLASSDESC => self.read_non_proxy_desc(heap, unshared).map(Some),
            tc => Err(StreamError::corrupted(format!("invalid type code: {:02X}", tc))),
        }
    }

    /// Splits a local lookup into the bound descriptor or a recoverable resolve error.
    fn resolve_local(
        resolved: Result<Arc<ClassDescriptor>>,
    ) -> Result<(Option<Arc<ClassDescriptor>>, Option<StreamError>)> {
        match resolved {
            Ok(desc) => Ok((Some(desc), None)),
            Err(err) if err.is_class_not_found() => Ok((None, Some(err))),
            Err(err) => Err(err),
        }
    }

    fn read_super_desc(&mut self, heap: &mut Heap) -> Result<Option<Arc<ClassDescriptor>>> {
        self.enter();
        let result = self.read_class_desc(heap, false);
        self.leave();
        Ok(result?.map(|(desc, _)| desc))
    }

    fn finish_desc(
        &mut self,
        heap: &mut Heap,
        mut desc: ClassDescriptor,
        handle: usize,
        unshared: bool,
    ) -> Result<(Arc<ClassDescriptor>, Value)> {
        desc.compute_wire_layout(heap.registry())?;
        let desc = Arc::new(desc);
        let value = Value::Ref(heap.descriptor_object(Arc::clone(&desc)));
        if !unshared {
            self.handles.set_object(handle, value);
        }
        self.handles.finish(handle);
        self.pass_handle = Some(handle);
        Ok((desc, value))
    }

    fn read_proxy_desc(&mut self, heap: &mut Heap, unshared: bool) -> Result<(Arc<ClassDescriptor>, Value)> {
        self.bin.read_byte()?;
        let handle = self.assign(unshared, Value::Null);
        self.pass_handle = None;

        let count = self.bin.read_int()?;
        if count > MAX_PROXY_INTERFACES {
            return Err(StreamError::InvalidObject(format!(
                "interface limit exceeded: {}",
                count
            )));
        }
        if count < 0 {
            return Err(StreamError::corrupted(format!(
                "negative interface count: {}",
                count
            )));
        }
        let mut interfaces = Vec::with_capacity(count as usize);
        for _ in 0..count {
            interfaces.push(self.bin.read_utf()?);
        }

        let resolved = heap
            .registry()
            .resolve_proxy(&interfaces)
            .and_then(|def| heap.registry().descriptor(def.name()));
        let (local, resolve_error) = Self::resolve_local(resolved)?;
        for name in &interfaces {
            self.filter_check(Some(name), -1)?;
        }
        if let Some(local) = &local {
            self.filter_check(Some(local.name()), -1)?;
        }

        self.bin.set_block_data_mode(true)?;
        self.skip_custom_data(heap)?;
        let super_desc = self.read_super_desc(heap)?;

        let desc = ClassDescriptor::bind_proxy(interfaces, local, resolve_error, super_desc)?;
        tracing::debug!(
            class = %desc.name(),
            resolved = desc.is_resolved(),
            "read proxy class descriptor"
        );
        self.finish_desc(heap, desc, handle, unshared)
    }

    fn read_non_proxy_desc(&mut self, heap: &mut Heap, unshared: bool) -> Result<(Arc<ClassDescriptor>, Value)> {
        self.bin.read_byte()?;
        let handle = self.assign(unshared, Value::Null);
        self.pass_handle = None;

        let name = self.bin.read_utf()?;
        let suid = self.bin.read_long()?;
        let flags = self.bin.read_unsigned_byte()?;
        let count = self.bin.read_short()?;
        if count < 0 {
            return Err(StreamError::invalid_class(name, "illegal field count"));
        }
        let mut fields = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let code = self.bin.read_unsigned_byte()?;
            let field_name = self.bin.read_utf()?;
            let invalid = || {
                StreamError::invalid_class(
                    name.clone(),
                    format!("invalid descriptor for field {}", field_name),
                )
            };
            let field_type = FieldType::from_code(code).map_err(|_| invalid())?;
            let signature = if field_type.is_primitive() {
                char::from(code).to_string()
            } else {
                self.read_type_string(heap)?
            };
            fields.push(StreamField::new(field_name.clone(), signature, false).map_err(|_| invalid())?);
        }
        let wire = WireDescriptor::new(name, suid, flags, fields)?;

        let resolved = heap
            .registry()
            .resolve(&wire.name)
            .and_then(|def| heap.registry().descriptor(def.name()));
        let (local, resolve_error) = Self::resolve_local(resolved)?;
        self.filter_check(Some(&wire.name), -1)?;

        self.bin.set_block_data_mode(true)?;
        self.skip_custom_data(heap)?;
        let super_desc = self.read_super_desc(heap)?;

        let desc = ClassDescriptor::bind_non_proxy(
            wire,
            local,
            resolve_error,
            super_desc,
            self.strict_names,
        )?;
        tracing::debug!(
            class = %desc.name(),
            suid = desc.suid(),
            resolved = desc.is_resolved(),
            "read class descriptor"
        );
        self.finish_desc(heap, desc, handle, unshared)
    }

    fn read_type_string(&mut self, heap: &mut Heap) -> Result<String> {
        let old = self.pass_handle;
        let value = match self.bin.peek_byte()? {
            TC_NULL => {
                self.bin.read_byte()?;
                Value::Null
            }
            TC_REFERENCE => self.read_handle(false)?,
            TC_STRING | TC_LONGSTRING => self.read_string(heap, false)?,
            tc => return Err(StreamError::corrupted(format!("invalid type code: {:02X}", tc))),
        };
        self.pass_handle = old;
        heap.string(value)
            .map(str::to_string)
            .ok_or_else(|| StreamError::corrupted("field type string is not a string"))
    }

    fn read_string(&mut self, heap: &mut Heap, unshared: bool) -> Result<Value> {
        let s = match self.bin.read_unsigned_byte()? {
            TC_STRING => self.bin.read_utf()?,
            TC_LONGSTRING => self.bin.read_long_utf()?,
            tc => return Err(StreamError::corrupted(format!("invalid type code: {:02X}", tc))),
        };
        let value = Value::Ref(heap.alloc_string(s));
        let handle = self.assign(unshared, value);
        self.handles.finish(handle);
        self.pass_handle = Some(handle);
        Ok(value)
    }

    fn read_array(&mut self, heap: &mut Heap, unshared: bool) -> Result<Value> {
        self.bin.read_byte()?;
        let (desc, _) = self
            .read_class_desc(heap, false)?
            .ok_or_else(|| StreamError::corrupted("null array descriptor"))?;
        let len = self.bin.read_int()?;
        if len < 0 {
            return Err(StreamError::corrupted(format!("negative array length: {}", len)));
        }
        self.filter_check(Some(desc.name()), i64::from(len))?;
        let len = len as usize;
        let component = desc
            .name()
            .strip_prefix('[')
            .and_then(|sig| FieldType::from_signature(sig).ok())
            .ok_or_else(|| StreamError::invalid_class(desc.name(), "not an array class"))?;

        if component.is_primitive() {
            let elements = self.read_prim_elements(component, len)?;
            let value = if desc.is_resolved() {
                Value::Ref(heap.alloc_array(desc.name(), elements)?)
            } else {
                Value::Null
            };
            let handle = self.assign(unshared, value);
            if let Some(err) = desc.resolve_error() {
                self.handles.mark_exception(handle, err.clone());
            }
            self.handles.finish(handle);
            self.pass_handle = Some(handle);
            return Ok(value);
        }

        let array = if desc.is_resolved() {
            Some(heap.alloc_array(desc.name(), ArrayElements::Object(Vec::new()))?)
        } else {
            None
        };
        let value = Value::from(array);
        let handle = self.assign(unshared, value);
        if let Some(err) = desc.resolve_error() {
            self.handles.mark_exception(handle, err.clone());
        }
        for _ in 0..len {
            let element = self.read_object0(heap, false)?;
            self.handles.mark_dependency(Some(handle), self.pass_handle);
            if let Some(ArrayElements::Object(values)) = array.and_then(|id| heap.array_mut(id)) {
                values.push(element);
            }
        }
        self.handles.finish(handle);
        self.pass_handle = Some(handle);
        Ok(value)
    }

    fn read_prim_elements(&mut self, component: FieldType, len: usize) -> Result<ArrayElements> {
        let total = len
            .checked_mul(component.primitive_size())
            .ok_or_else(|| StreamError::corrupted(format!("array too large: {}", len)))?;
        let mut raw = Vec::with_capacity(total.min(CHUNK));
        let mut chunk = [0u8; CHUNK];
        let mut remaining = total;
        while remaining > 0 {
            let n = remaining.min(CHUNK);
            self.bin.read_fully(&mut chunk[..n])?;
            raw.extend_from_slice(&chunk[..n]);
            remaining -= n;
        }
        let mut buf = &raw[..];
        Ok(match component {
            FieldType::Boolean => ArrayElements::Boolean(raw.iter().map(|b| *b != 0).collect()),
            FieldType::Byte => ArrayElements::Byte(raw.iter().map(|b| *b as i8).collect()),
            FieldType::Char => ArrayElements::Char((0..len).map(|_| buf.get_u16()).collect()),
            FieldType::Short => ArrayElements::Short((0..len).map(|_| buf.get_i16()).collect()),
            FieldType::Int => ArrayElements::Int((0..len).map(|_| buf.get_i32()).collect()),
            FieldType::Long => ArrayElements::Long((0..len).map(|_| buf.get_i64()).collect()),
            FieldType::Float => ArrayElements::Float((0..len).map(|_| buf.get_f32()).collect()),
            FieldType::Double => ArrayElements::Double((0..len).map(|_| buf.get_f64()).collect()),
            FieldType::Object | FieldType::Array => ArrayElements::Object(Vec::new()),
        })
    }

    fn read_enum(&mut self, heap: &mut Heap, unshared: bool) -> Result<Value> {
        self.bin.read_byte()?;
        let (desc, _) = self
            .read_class_desc(heap, false)?
            .ok_or_else(|| StreamError::corrupted("null enum descriptor"))?;
        if !desc.is_enum() {
            return Err(StreamError::invalid_class_anon(format!(
                "non-enum class: {}",
                desc.name()
            )));
        }
        let handle = self.assign(unshared, Value::Null);
        if let Some(err) = desc.resolve_error() {
            self.handles.mark_exception(handle, err.clone());
        }
        let name_value = self.read_string(heap, false)?;
        let constant = heap.string(name_value).unwrap_or_default().to_string();
        let mut value = Value::Null;
        if desc.is_resolved() {
            let id = heap.enum_constant(desc.name(), &constant).map_err(|_| {
                StreamError::InvalidObject(format!(
                    "enum constant {} does not exist in {}",
                    constant,
                    desc.name()
                ))
            })?;
            value = Value::Ref(id);
            if !unshared {
                self.handles.set_object(handle, value);
            }
        }
        self.handles.finish(handle);
        self.pass_handle = Some(handle);
        Ok(value)
    }

    fn read_ordinary_object(&mut self, heap: &mut Heap, unshared: bool) -> Result<Value> {
        self.bin.read_byte()?;
        let (desc, _) = self
            .read_class_desc(heap, false)?
            .ok_or_else(|| StreamError::corrupted("null object descriptor"))?;
        desc.check_deserialize()?;
        if desc.is_resolved()
            && matches!(
                desc.name(),
                "java.lang.String" | "java.lang.Class" | "java.io.ObjectStreamClass"
            )
        {
            return Err(StreamError::invalid_class_anon("invalid class descriptor"));
        }

        let obj = match desc.instance_layouts() {
            Some(layouts) if desc.is_resolved() => Some(heap.alloc_instance(desc.name(), layouts)),
            _ => None,
        };
        let handle = self.assign(unshared, Value::from(obj));
        self.pass_handle = Some(handle);
        if let Some(err) = desc.resolve_error() {
            self.handles.mark_exception(handle, err.clone());
        }

        if desc.is_externalizable() {
            self.read_external_data(heap, obj, &desc, handle)?;
        } else {
            self.read_serial_data(heap, obj, &desc, handle)?;
        }
        self.handles.finish(handle);
        self.pass_handle = Some(handle);

        let Some(obj) = obj else {
            return Ok(Value::Null);
        };
        let mut value = Value::Ref(obj);
        let hook = desc.hooks().and_then(|h| h.read_resolve.clone());
        if let (Some(hook), None) = (hook, self.handles.lookup_exception(handle)) {
            let rep = hook.read_resolve(obj, heap)?;
            if rep != value {
                if let Some(id) = rep.as_object() {
                    let length = heap.array(id).map_or(-1, |a| a.len() as i64);
                    let name = heap.type_name(id).map(str::to_string);
                    self.filter_check(name.as_deref(), length)?;
                }
                if !unshared {
                    self.handles.set_object(handle, rep);
                }
                value = rep;
            }
        }
        Ok(value)
    }

    fn read_external_data(
        &mut self,
        heap: &mut Heap,
        obj: Option<ObjectId>,
        desc: &ClassDescriptor,
        handle: usize,
    ) -> Result<()> {
        let blocked = desc.has_block_external_data();
        if !blocked && obj.is_none() {
            // unframed data of an unknown class cannot be skipped
            return Err(desc
                .resolve_error()
                .cloned()
                .unwrap_or_else(|| StreamError::ClassNotFound(desc.name().to_string())));
        }
        if blocked {
            self.bin.set_block_data_mode(true)?;
        }
        if let Some(obj) = obj {
            let externalizer = desc
                .externalizer()
                .cloned()
                .ok_or_else(|| StreamError::invalid_class(desc.name(), "no externalizer registered"))?;
            let result = {
                let mut input = HookInput::new(self, heap, None);
                externalizer.read_external(obj, &mut input)
            };
            match result {
                Err(err) if err.is_class_not_found() => self.handles.mark_exception(handle, err),
                other => other?,
            }
        }
        if blocked {
            self.skip_custom_data(heap)?;
        }
        Ok(())
    }

    fn read_serial_data(
        &mut self,
        heap: &mut Heap,
        obj: Option<ObjectId>,
        desc: &Arc<ClassDescriptor>,
        handle: usize,
    ) -> Result<()> {
        for slot in desc.class_data_slots() {
            let slot_desc = slot.desc;
            let failed = self.handles.lookup_exception(handle).is_some();
            if !slot.has_data {
                let hook = slot_desc.hooks().and_then(|h| h.read_object_no_data.clone());
                if let (Some(obj), Some(hook), false) = (obj, hook, failed) {
                    hook.read_object_no_data(obj, heap)?;
                }
                continue;
            }
            let hook = slot_desc.hooks().and_then(|h| h.read_object.clone());
            match (obj, hook) {
                (Some(obj), Some(hook)) if !failed => {
                    self.bin.set_block_data_mode(true)?;
                    let result = {
                        let ctx = ReadContext {
                            obj,
                            desc: Arc::clone(&slot_desc),
                            used: false,
                        };
                        let mut input = HookInput::new(self, heap, Some(ctx));
                        hook.read_object(obj, &mut input)
                    };
                    self.bin.set_default_data_end(false);
                    match result {
                        Err(err) if err.is_class_not_found() => {
                            self.handles.mark_exception(handle, err)
                        }
                        other => other?,
                    }
                }
                (obj, _) => {
                    let obj = if failed { None } else { obj };
                    self.default_read_fields(heap, obj, &slot_desc)?;
                }
            }
            if slot_desc.has_write_object_data() {
                self.skip_custom_data(heap)?;
            } else {
                self.bin.set_block_data_mode(false)?;
            }
        }
        Ok(())
    }

    fn skip_custom_data(&mut self, heap: &mut Heap) -> Result<()> {
        let old = self.pass_handle;
        loop {
            if self.bin.block_data_mode() {
                self.bin.skip_block_data()?;
                self.bin.set_block_data_mode(false)?;
            }
            match self.bin.peek_byte()? {
                TC_BLOCKDATA | TC_BLOCKDATALONG => {
                    self.bin.set_block_data_mode(true)?;
                }
                TC_ENDBLOCKDATA => {
                    self.bin.read_byte()?;
                    self.pass_handle = old;
                    return Ok(());
                }
                _ => {
                    self.read_object0(heap, false)?;
                }
            }
        }
    }

    /// Reads one class level's fields in default layout into `obj`, or discards them.
    fn default_read_fields(
        &mut self,
        heap: &mut Heap,
        obj: Option<ObjectId>,
        desc: &ClassDescriptor,
    ) -> Result<()> {
        let mut prims = vec![0u8; desc.prim_data_size()];
        self.bin.read_fully(&mut prims)?;
        let reflector = desc.reflector();
        let storage = reflector.class_name().map(str::to_string);
        let target = obj.zip(storage);
        if let Some((obj, storage)) = &target {
            if let Some(slot) = heap.instance_mut(*obj).and_then(|i| i.slot_mut(storage)) {
                reflector.set_prim_values(slot, &prims);
            }
        }

        let obj_handle = self.pass_handle;
        let fields = desc.fields();
        let num_obj = desc.num_obj_fields();
        let num_prim = fields.len() - num_obj;
        let mut values = Vec::with_capacity(num_obj);
        for i in 0..num_obj {
            let value = self.read_object0(heap, fields[num_prim + i].is_unshared())?;
            if reflector.is_obj_bound(i) {
                self.handles.mark_dependency(obj_handle, self.pass_handle);
            }
            values.push(value);
        }
        self.pass_handle = obj_handle;

        if let Some((obj, storage)) = target {
            for (i, value) in values.iter().enumerate() {
                if !reflector.is_obj_bound(i) {
                    continue;
                }
                check_assignable(heap, desc, &fields[num_prim + i], reflector.obj_signature(i), *value)?;
            }
            if let Some(slot) = heap.instance_mut(obj).and_then(|i| i.slot_mut(&storage)) {
                reflector.set_obj_values(slot, &values);
            }
        }
        Ok(())
    }

    fn read_get_field(&mut self, heap: &mut Heap, desc: Arc<ClassDescriptor>) -> Result<GetField> {
        let mut prims = vec![0u8; desc.prim_data_size()];
        self.bin.read_fully(&mut prims)?;
        let old = self.pass_handle;
        let fields = desc.fields();
        let num_obj = desc.num_obj_fields();
        let num_prim = fields.len() - num_obj;
        let mut values = Vec::with_capacity(num_obj);
        let mut failures = Vec::with_capacity(num_obj);
        for i in 0..num_obj {
            values.push(self.read_object0(heap, fields[num_prim + i].is_unshared())?);
            failures.push(
                self.pass_handle
                    .and_then(|h| self.handles.lookup_exception(h))
                    .cloned(),
            );
        }
        self.pass_handle = old;
        Ok(GetField::new(Arc::clone(&desc), prims, values, failures))
    }

    fn read_fatal_exception(&mut self, heap: &mut Heap) -> Result<StreamError> {
        self.bin.read_byte()?;
        self.clear();
        let value = self.read_object0(heap, false)?;
        let failure = self
            .pass_handle
            .and_then(|h| self.handles.lookup_exception(h))
            .cloned();
        self.clear();
        let err = match (value.as_object(), failure) {
            (Some(id), _) => {
                let class_name = heap.type_name(id).unwrap_or("java.io.IOException").to_string();
                let message = heap
                    .field_of(id, THROWABLE, "detailMessage")
                    .ok()
                    .and_then(|m| heap.string(m).map(str::to_string));
                StreamError::WriteAborted { class_name, message }
            }
            (None, Some(StreamError::ClassNotFound(class_name))) => StreamError::WriteAborted {
                class_name,
                message: None,
            },
            (None, _) => StreamError::WriteAborted {
                class_name: "java.io.IOException".to_string(),
                message: None,
            },
        };
        tracing::debug!(error = %err, "read terminal exception record");
        Ok(err)
    }
}

fn check_assignable(
    heap: &Heap,
    desc: &ClassDescriptor,
    field: &StreamField,
    local_signature: Option<&str>,
    value: Value,
) -> Result<()> {
    let (Some(id), Some(signature)) = (value.as_object(), local_signature) else {
        return Ok(());
    };
    let Some(target) = class_name_of(signature) else {
        return Ok(());
    };
    let actual = heap.type_name(id).unwrap_or(OBJECT);
    if target == OBJECT || heap.registry().is_assignable(actual, &target) {
        return Ok(());
    }
    Err(StreamError::invalid_class(
        desc.name(),
        format!(
            "cannot assign instance of {} to field {}.{} of type {}",
            actual,
            desc.name(),
            field.name(),
            target
        ),
    ))
}

impl<R: Read> DataInput for ObjectReader<R> {
    fn read_fully(&mut self, buf: &mut [u8]) -> Result<()> {
        let result = self.bin.read_fully(buf);
        self.sync_reset();
        result
    }
}

/// The object and class level a read hook is running for.
struct ReadContext {
    obj: ObjectId,
    desc: Arc<ClassDescriptor>,
    used: bool,
}

/// Stream view handed to read hooks and externalizers.
struct HookInput<'a, R: Read> {
    reader: &'a mut ObjectReader<R>,
    heap: &'a mut Heap,
    ctx: Option<ReadContext>,
}

impl<'a, R: Read> HookInput<'a, R> {
    fn new(reader: &'a mut ObjectReader<R>, heap: &'a mut Heap, ctx: Option<ReadContext>) -> Self {
        Self { reader, heap, ctx }
    }

    /// Claims the current context for a one-time field read.
    fn claim_fields(&mut self) -> Result<(ObjectId, Arc<ClassDescriptor>)> {
        let ctx = self
            .ctx
            .as_mut()
            .ok_or_else(|| StreamError::NotActive("not in call to readObject".to_string()))?;
        if ctx.used {
            return Err(StreamError::NotActive(
                "not in readObject invocation or fields already read".to_string(),
            ));
        }
        ctx.used = true;
        Ok((ctx.obj, Arc::clone(&ctx.desc)))
    }
}

impl<R: Read> ObjectInput for HookInput<'_, R> {
    fn read_object(&mut self) -> Result<Value> {
        self.reader.read_object_outer(self.heap, false)
    }

    fn read_unshared(&mut self) -> Result<Value> {
        self.reader.read_object_outer(self.heap, true)
    }

    fn default_read_object(&mut self) -> Result<()> {
        let (obj, desc) = self.claim_fields()?;
        self.reader.bin.set_block_data_mode(false)?;
        self.reader.default_read_fields(self.heap, Some(obj), &desc)?;
        self.reader.bin.set_block_data_mode(true)?;
        if !desc.has_write_object_data() {
            self.reader.bin.set_default_data_end(true);
        }
        match self
            .reader
            .pass_handle
            .and_then(|h| self.reader.handles.lookup_exception(h))
        {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn read_fields(&mut self) -> Result<GetField> {
        let (_, desc) = self.claim_fields()?;
        self.reader.bin.set_block_data_mode(false)?;
        let fields = self.reader.read_get_field(self.heap, Arc::clone(&desc))?;
        self.reader.bin.set_block_data_mode(true)?;
        if !desc.has_write_object_data() {
            self.reader.bin.set_default_data_end(true);
        }
        Ok(fields)
    }

    fn register_validation(
        &mut self,
        validation: Arc<dyn ObjectInputValidation>,
        priority: i32,
    ) -> Result<()> {
        if self.reader.depth == 0 {
            return Err(StreamError::NotActive("stream inactive".to_string()));
        }
        self.reader.validations.register(validation, priority);
        Ok(())
    }

    fn available(&mut self) -> Result<usize> {
        self.reader.bin.available()
    }

    fn heap(&self) -> &Heap {
        &*self.heap
    }

    fn heap_mut(&mut self) -> &mut Heap {
        &mut *self.heap
    }
}

impl<R: Read> DataInput for HookInput<'_, R> {
    fn read_fully(&mut self, buf: &mut [u8]) -> Result<()> {
        self.reader.bin.read_fully(buf)
    }
}
