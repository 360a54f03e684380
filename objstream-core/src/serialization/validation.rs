//! Post-graph validation callbacks.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::serialization::heap::Heap;

/// Callback run once the outermost read has completed.
pub trait ObjectInputValidation: Send + Sync {
    /// Validates the graph; an error fails the outermost read.
    fn validate_object(&self, heap: &mut Heap) -> Result<()>;
}

impl<F> ObjectInputValidation for F
where
    F: Fn(&mut Heap) -> Result<()> + Send + Sync,
{
    fn validate_object(&self, heap: &mut Heap) -> Result<()> {
        self(heap)
    }
}

struct Entry {
    priority: i32,
    callback: Arc<dyn ObjectInputValidation>,
}

/// Pending validations of one outermost read, highest priority first.
///
/// Among equal priorities the most recently registered callback runs first.
#[derive(Default)]
pub struct ValidationList {
    entries: Vec<Entry>,
}

impl fmt::Debug for ValidationList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationList")
            .field(
                "priorities",
                &self.entries.iter().map(|e| e.priority).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ValidationList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a callback.
    pub fn register(&mut self, callback: Arc<dyn ObjectInputValidation>, priority: i32) {
        let at = self
            .entries
            .iter()
            .position(|e| e.priority <= priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(at, Entry { priority, callback });
    }

    /// Runs every callback in order, stopping at the first failure.
    ///
    /// The list is empty afterwards either way.
    pub fn run(&mut self, heap: &mut Heap) -> Result<()> {
        let entries = std::mem::take(&mut self.entries);
        for entry in entries {
            entry.callback.validate_object(heap)?;
        }
        Ok(())
    }

    /// Drops every pending callback.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of pending callbacks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no callbacks are pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamError;
    use crate::serialization::registry::TypeRegistry;
    use std::sync::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> Arc<dyn ObjectInputValidation> {
        let log = Arc::clone(log);
        Arc::new(move |_: &mut Heap| -> Result<()> {
            log.lock().unwrap().push(tag);
            Ok(())
        })
    }

    #[test]
    fn test_priority_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut list = ValidationList::new();
        list.register(recorder(&log, "five"), 5);
        list.register(recorder(&log, "ten"), 10);
        list.register(recorder(&log, "five-later"), 5);
        list.register(recorder(&log, "minus"), -1);
        let mut heap = Heap::new(Arc::new(TypeRegistry::new()));
        list.run(&mut heap).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["ten", "five-later", "five", "minus"]);
        assert!(list.is_empty());
    }

    #[test]
    fn test_failure_stops_and_clears() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut list = ValidationList::new();
        list.register(
            Arc::new(|_: &mut Heap| -> Result<()> { Err(StreamError::InvalidObject("bad".into())) }),
            10,
        );
        list.register(recorder(&log, "after"), 1);
        let mut heap = Heap::new(Arc::new(TypeRegistry::new()));
        assert!(list.run(&mut heap).is_err());
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(list.len(), 0);
    }
}
