//! Handle tables on both sides of the stream.
//!
//! Every new value recorded in the stream (objects, strings, arrays, enum constants,
//! class descriptors) takes the next handle in sequence. The writer maps identities to
//! handles to emit back-references; the reader maps handles to decoded values and
//! tracks which handles are tainted by a `ClassNotFound` somewhere in their subgraph.

use std::collections::HashMap;

use crate::error::StreamError;
use crate::protocol::BASE_WIRE_HANDLE;
use crate::serialization::heap::{ObjectId, Value};

/// Identity of a value as far as the writer's handle table is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HandleKey {
    /// A heap object.
    Object(ObjectId),
    /// The local class descriptor of a named type.
    Descriptor(String),
    /// A field type string inside a class descriptor.
    TypeString(String),
}

/// Write-side identity to handle map.
#[derive(Debug, Default)]
pub struct HandleMap {
    map: HashMap<HandleKey, usize>,
    next: usize,
}

impl HandleMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns the next handle, recording `key` unless it is `None` (unshared writes).
    pub fn assign(&mut self, key: Option<HandleKey>) -> usize {
        let handle = self.next;
        self.next += 1;
        if let Some(key) = key {
            self.map.insert(key, handle);
        }
        handle
    }

    /// Returns the handle previously assigned to `key`.
    pub fn lookup(&self, key: &HandleKey) -> Option<usize> {
        self.map.get(key).copied()
    }

    /// Number of handles assigned.
    pub fn size(&self) -> usize {
        self.next
    }

    /// Returns true if no handles have been assigned.
    pub fn is_empty(&self) -> bool {
        self.next == 0
    }

    /// Forgets every assignment; the next handle is 0 again.
    pub fn clear(&mut self) {
        self.map.clear();
        self.next = 0;
    }
}

/// Converts a table index to its wire value.
pub fn to_wire(handle: usize) -> i32 {
    BASE_WIRE_HANDLE.wrapping_add(handle as i32)
}

/// Converts a wire value to a table index, if it is in range.
pub fn from_wire(wire: i32, size: usize) -> Option<usize> {
    let index = wire.checked_sub(BASE_WIRE_HANDLE)?;
    usize::try_from(index).ok().filter(|i| *i < size)
}

/// What a read-side handle resolved to.
#[derive(Debug, Clone)]
pub enum Payload {
    /// A decoded value.
    Value(Value),
    /// A value read with unshared semantics; back-references to it are errors.
    Unshared,
    /// The value's subgraph failed with this error.
    Exception(StreamError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Unknown,
    Ok,
    Exception,
}

#[derive(Debug)]
struct Entry {
    status: Status,
    payload: Payload,
    deps: Vec<usize>,
}

/// Read-side handle table with dependency tracking.
///
/// A handle is `Unknown` while its value is still being read. When a handle being read
/// references another unfinished handle, a dependency is recorded; if the target later
/// fails, the failure propagates to every dependent.
#[derive(Debug, Default)]
pub struct HandleTable {
    entries: Vec<Entry>,
    low_dep: Option<usize>,
}

impl HandleTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns the next handle to a value still being read.
    pub fn assign(&mut self, payload: Payload) -> usize {
        self.entries.push(Entry {
            status: Status::Unknown,
            payload,
            deps: Vec::new(),
        });
        self.entries.len() - 1
    }

    /// Records that `dependent` depends on `target`.
    ///
    /// A no-op when either handle is absent or `dependent` already finished. If `target`
    /// already failed, `dependent` fails too.
    pub fn mark_dependency(&mut self, dependent: Option<usize>, target: Option<usize>) {
        let (Some(dependent), Some(target)) = (dependent, target) else {
            return;
        };
        if dependent >= self.entries.len() || target >= self.entries.len() {
            return;
        }
        if self.entries[dependent].status != Status::Unknown {
            return;
        }
        match self.entries[target].status {
            Status::Ok => {}
            Status::Exception => {
                if let Payload::Exception(err) = &self.entries[target].payload {
                    let err = err.clone();
                    self.mark_exception(dependent, err);
                }
            }
            Status::Unknown => {
                if target == dependent {
                    return;
                }
                if !self.entries[target].deps.contains(&dependent) {
                    self.entries[target].deps.push(dependent);
                }
                if self.low_dep.map_or(true, |low| target < low) {
                    self.low_dep = Some(target);
                }
            }
        }
    }

    /// Records a failure against `handle` and every handle depending on it.
    pub fn mark_exception(&mut self, handle: usize, err: StreamError) {
        let mut pending = vec![handle];
        while let Some(h) = pending.pop() {
            let Some(entry) = self.entries.get_mut(h) else {
                continue;
            };
            match entry.status {
                Status::Ok | Status::Exception => continue,
                Status::Unknown => {
                    entry.status = Status::Exception;
                    entry.payload = Payload::Exception(err.clone());
                    pending.extend(entry.deps.drain(..));
                }
            }
        }
    }

    /// Marks `handle` as finished.
    ///
    /// Handles still waiting on an unfinished lower handle stay `Unknown` until that
    /// handle finishes; this prunes dependency lists in last-in-first-out order.
    pub fn finish(&mut self, handle: usize) {
        let end = match self.low_dep {
            None => handle + 1,
            Some(low) if low >= handle => {
                self.low_dep = None;
                self.entries.len()
            }
            Some(_) => return,
        };
        for entry in self.entries.iter_mut().take(end).skip(handle) {
            if entry.status == Status::Unknown {
                entry.status = Status::Ok;
                entry.deps.clear();
            }
        }
    }

    /// Replaces the value of `handle` unless it already failed.
    pub fn set_object(&mut self, handle: usize, value: Value) {
        if let Some(entry) = self.entries.get_mut(handle) {
            if entry.status != Status::Exception {
                entry.payload = Payload::Value(value);
            }
        }
    }

    /// Returns the payload of `handle`.
    pub fn lookup(&self, handle: usize) -> Option<&Payload> {
        self.entries.get(handle).map(|e| &e.payload)
    }

    /// Returns the recorded value of `handle`, or `None` if it failed or is unshared.
    pub fn lookup_object(&self, handle: usize) -> Option<Value> {
        match self.entries.get(handle)?.payload {
            Payload::Value(v) if self.entries[handle].status != Status::Exception => Some(v),
            _ => None,
        }
    }

    /// Returns the error recorded against `handle`, if any.
    pub fn lookup_exception(&self, handle: usize) -> Option<&StreamError> {
        match &self.entries.get(handle)?.payload {
            Payload::Exception(err) => Some(err),
            _ => None,
        }
    }

    /// Number of handles assigned.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no handles have been assigned.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forgets every handle.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.low_dep = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cnf() -> StreamError {
        StreamError::ClassNotFound("a.Missing".into())
    }

    #[test]
    fn test_handle_map_sequence() {
        let mut map = HandleMap::new();
        let a = map.assign(Some(HandleKey::Descriptor("a.B".into())));
        let b = map.assign(None);
        let c = map.assign(Some(HandleKey::TypeString("Ljava/lang/String;".into())));
        assert_eq!((a, b, c), (0, 1, 2));
        assert_eq!(map.lookup(&HandleKey::Descriptor("a.B".into())), Some(0));
        assert_eq!(map.size(), 3);
        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.assign(None), 0);
    }

    #[test]
    fn test_wire_conversion() {
        assert_eq!(to_wire(0), 0x7E_0000);
        assert_eq!(from_wire(0x7E_0001, 2), Some(1));
        assert_eq!(from_wire(0x7E_0002, 2), None);
        assert_eq!(from_wire(0x7D_FFFF, 2), None);
        assert_eq!(from_wire(i32::MIN, 2), None);
    }

    #[test]
    fn test_exception_propagates_to_dependents() {
        let mut table = HandleTable::new();
        let outer = table.assign(Payload::Value(Value::Null));
        let inner = table.assign(Payload::Value(Value::Null));
        table.mark_dependency(Some(outer), Some(inner));
        table.mark_exception(inner, cnf());
        assert!(table.lookup_exception(outer).is_some());
        assert!(table.lookup_object(outer).is_none());
    }

    #[test]
    fn test_dependency_on_failed_handle() {
        let mut table = HandleTable::new();
        let failed = table.assign(Payload::Value(Value::Null));
        table.mark_exception(failed, cnf());
        let later = table.assign(Payload::Value(Value::Null));
        table.mark_dependency(Some(later), Some(failed));
        assert!(table.lookup_exception(later).is_some());
    }

    #[test]
    fn test_finished_handle_is_immune() {
        let mut table = HandleTable::new();
        let a = table.assign(Payload::Value(Value::Int(1)));
        table.finish(a);
        table.mark_exception(a, cnf());
        assert_eq!(table.lookup_object(a), Some(Value::Int(1)));
    }

    #[test]
    fn test_finish_waits_for_lower_dependency() {
        let mut table = HandleTable::new();
        let outer = table.assign(Payload::Value(Value::Null));
        let inner = table.assign(Payload::Value(Value::Null));
        // inner refers back to outer while outer is unfinished
        table.mark_dependency(Some(inner), Some(outer));
        table.finish(inner);
        table.mark_exception(outer, cnf());
        assert!(table.lookup_exception(inner).is_some());
    }

    #[test]
    fn test_finish_outer_finishes_pending() {
        let mut table = HandleTable::new();
        let outer = table.assign(Payload::Value(Value::Null));
        let inner = table.assign(Payload::Value(Value::Null));
        table.mark_dependency(Some(inner), Some(outer));
        table.finish(inner);
        table.finish(outer);
        table.mark_exception(inner, cnf());
        assert!(table.lookup_exception(inner).is_none());
    }

    #[test]
    fn test_set_object_ignored_after_failure() {
        let mut table = HandleTable::new();
        let h = table.assign(Payload::Value(Value::Null));
        table.mark_exception(h, cnf());
        table.set_object(h, Value::Int(3));
        assert!(table.lookup_exception(h).is_some());
    }

    #[test]
    fn test_unshared_payload() {
        let mut table = HandleTable::new();
        let h = table.assign(Payload::Unshared);
        assert!(matches!(table.lookup(h), Some(Payload::Unshared)));
        assert!(table.lookup_object(h).is_none());
    }
}
