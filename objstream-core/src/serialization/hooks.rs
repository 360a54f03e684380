//! Per-type customization hooks and the stream views handed to them.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::serialization::fields::{GetField, PutField};
use crate::serialization::heap::{Heap, ObjectId, Value};
use crate::serialization::validation::ObjectInputValidation;
use crate::serialization::{DataInput, DataOutput};

/// Stream view passed to write hooks and externalizers.
///
/// Primitive writes go into block data. `default_write_object`, `put_fields` and
/// `write_fields` are only available inside a write hook.
pub trait ObjectOutput: DataOutput {
    /// Writes an object reference, sharing it with earlier writes.
    fn write_object(&mut self, value: Value) -> Result<()>;

    /// Writes an object as a new, never back-referenced entry.
    fn write_unshared(&mut self, value: Value) -> Result<()>;

    /// Writes the current class level's serializable fields in default layout.
    fn default_write_object(&mut self) -> Result<()>;

    /// Returns the field buffer for the current class level.
    fn put_fields(&mut self) -> Result<&mut PutField>;

    /// Writes the buffered fields from [`ObjectOutput::put_fields`].
    fn write_fields(&mut self) -> Result<()>;

    /// Returns the heap being written.
    fn heap(&self) -> &Heap;

    /// Returns the heap being written, mutably.
    fn heap_mut(&mut self) -> &mut Heap;
}

/// Stream view passed to read hooks and externalizers.
pub trait ObjectInput: DataInput {
    /// Reads an object reference.
    fn read_object(&mut self) -> Result<Value>;

    /// Reads an object that must not be shared with any other reference.
    fn read_unshared(&mut self) -> Result<Value>;

    /// Reads the current class level's serializable fields in default layout.
    fn default_read_object(&mut self) -> Result<()>;

    /// Reads the current class level's serializable fields into a [`GetField`].
    fn read_fields(&mut self) -> Result<GetField>;

    /// Registers a callback run after the whole graph has been read.
    ///
    /// Callbacks run in descending `priority`.
    fn register_validation(
        &mut self,
        validation: Arc<dyn ObjectInputValidation>,
        priority: i32,
    ) -> Result<()>;

    /// Number of primitive bytes readable without hitting an object record.
    fn available(&mut self) -> Result<usize>;

    /// Returns the heap being populated.
    fn heap(&self) -> &Heap;

    /// Returns the heap being populated, mutably.
    fn heap_mut(&mut self) -> &mut Heap;
}

/// Custom serialization of one class level.
pub trait WriteObjectHook: Send + Sync {
    /// Writes `this`'s data for the class level the hook is declared on.
    fn write_object(&self, this: ObjectId, out: &mut dyn ObjectOutput) -> Result<()>;
}

impl<F> WriteObjectHook for F
where
    F: Fn(ObjectId, &mut dyn ObjectOutput) -> Result<()> + Send + Sync,
{
    fn write_object(&self, this: ObjectId, out: &mut dyn ObjectOutput) -> Result<()> {
        self(this, out)
    }
}

/// Custom deserialization of one class level.
pub trait ReadObjectHook: Send + Sync {
    /// Reads `this`'s data for the class level the hook is declared on.
    fn read_object(&self, this: ObjectId, input: &mut dyn ObjectInput) -> Result<()>;
}

impl<F> ReadObjectHook for F
where
    F: Fn(ObjectId, &mut dyn ObjectInput) -> Result<()> + Send + Sync,
{
    fn read_object(&self, this: ObjectId, input: &mut dyn ObjectInput) -> Result<()> {
        self(this, input)
    }
}

/// Initialization for a class level the stream carries no data for.
pub trait ReadObjectNoDataHook: Send + Sync {
    /// Initializes `this`'s fields for the missing class level.
    fn read_object_no_data(&self, this: ObjectId, heap: &mut Heap) -> Result<()>;
}

impl<F> ReadObjectNoDataHook for F
where
    F: Fn(ObjectId, &mut Heap) -> Result<()> + Send + Sync,
{
    fn read_object_no_data(&self, this: ObjectId, heap: &mut Heap) -> Result<()> {
        self(this, heap)
    }
}

/// Substitution applied before an instance is written.
pub trait WriteReplaceHook: Send + Sync {
    /// Returns the value to write in place of `this`.
    fn write_replace(&self, this: ObjectId, heap: &mut Heap) -> Result<Value>;
}

impl<F> WriteReplaceHook for F
where
    F: Fn(ObjectId, &mut Heap) -> Result<Value> + Send + Sync,
{
    fn write_replace(&self, this: ObjectId, heap: &mut Heap) -> Result<Value> {
        self(this, heap)
    }
}

/// Substitution applied after an instance is read.
pub trait ReadResolveHook: Send + Sync {
    /// Returns the value to hand out in place of `this`.
    fn read_resolve(&self, this: ObjectId, heap: &mut Heap) -> Result<Value>;
}

impl<F> ReadResolveHook for F
where
    F: Fn(ObjectId, &mut Heap) -> Result<Value> + Send + Sync,
{
    fn read_resolve(&self, this: ObjectId, heap: &mut Heap) -> Result<Value> {
        self(this, heap)
    }
}

/// A type that writes and reads its whole payload itself.
pub trait Externalizable: Send + Sync {
    /// Writes the complete state of `this`.
    fn write_external(&self, this: ObjectId, out: &mut dyn ObjectOutput) -> Result<()>;

    /// Restores the complete state of `this`, which starts zero-initialized.
    fn read_external(&self, this: ObjectId, input: &mut dyn ObjectInput) -> Result<()>;
}

/// Caller-supplied substitution applied to every value the writer encodes.
pub trait ObjectReplacer: Send + Sync {
    /// Returns the value to write in place of `value`.
    fn replace_object(&self, heap: &mut Heap, value: Value) -> Result<Value>;
}

impl<F> ObjectReplacer for F
where
    F: Fn(&mut Heap, Value) -> Result<Value> + Send + Sync,
{
    fn replace_object(&self, heap: &mut Heap, value: Value) -> Result<Value> {
        self(heap, value)
    }
}

/// Caller-supplied substitution applied to every value the reader decodes.
pub trait ObjectResolver: Send + Sync {
    /// Returns the value to hand out in place of `value`.
    fn resolve_object(&self, heap: &mut Heap, value: Value) -> Result<Value>;
}

impl<F> ObjectResolver for F
where
    F: Fn(&mut Heap, Value) -> Result<Value> + Send + Sync,
{
    fn resolve_object(&self, heap: &mut Heap, value: Value) -> Result<Value> {
        self(heap, value)
    }
}

/// The optional capability set of a type.
#[derive(Clone, Default)]
pub struct TypeHooks {
    pub(crate) write_object: Option<Arc<dyn WriteObjectHook>>,
    pub(crate) read_object: Option<Arc<dyn ReadObjectHook>>,
    pub(crate) read_object_no_data: Option<Arc<dyn ReadObjectNoDataHook>>,
    pub(crate) write_replace: Option<Arc<dyn WriteReplaceHook>>,
    pub(crate) read_resolve: Option<Arc<dyn ReadResolveHook>>,
}

impl TypeHooks {
    /// Returns true if a custom write hook is present.
    pub fn has_write_object(&self) -> bool {
        self.write_object.is_some()
    }

    /// Returns true if a custom read hook is present.
    pub fn has_read_object(&self) -> bool {
        self.read_object.is_some()
    }

    /// Returns true if a no-data hook is present.
    pub fn has_read_object_no_data(&self) -> bool {
        self.read_object_no_data.is_some()
    }

    /// Returns true if a write substitution is present.
    pub fn has_write_replace(&self) -> bool {
        self.write_replace.is_some()
    }

    /// Returns true if a read substitution is present.
    pub fn has_read_resolve(&self) -> bool {
        self.read_resolve.is_some()
    }
}

impl fmt::Debug for TypeHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeHooks")
            .field("write_object", &self.has_write_object())
            .field("read_object", &self.has_read_object())
            .field("read_object_no_data", &self.has_read_object_no_data())
            .field("write_replace", &self.has_write_replace())
            .field("read_resolve", &self.has_read_resolve())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_hooks_empty() {
        let hooks = TypeHooks::default();
        assert!(!hooks.has_write_object());
        assert!(!hooks.has_read_object());
        assert!(!hooks.has_read_object_no_data());
        assert!(!hooks.has_write_replace());
        assert!(!hooks.has_read_resolve());
    }

    #[test]
    fn test_closures_implement_hooks() {
        let replace: Arc<dyn WriteReplaceHook> =
            Arc::new(|_this: ObjectId, _heap: &mut Heap| -> Result<Value> { Ok(Value::Null) });
        let hooks = TypeHooks {
            write_replace: Some(replace),
            ..TypeHooks::default()
        };
        assert!(hooks.has_write_replace());
        assert!(format!("{:?}", hooks).contains("write_replace: true"));
    }

    #[test]
    fn test_hooks_are_send_sync() {
        fn assert_traits<T: Send + Sync>() {}
        assert_traits::<TypeHooks>();
    }
}
