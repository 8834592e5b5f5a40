//! Task-local key/value storage that survives across executions of a task.

use std::{
    any::Any,
    collections::BTreeMap,
    fmt::{self, Debug},
};

/// A value that can be stored in a [`Context`].
///
/// Implemented for every `Debug + Send + Sync + 'static` type, so any such value
/// can be stored without further ceremony. `Debug` is needed for
/// [`Task::describe`](crate::Task::describe).
pub trait ContextValue: Any + Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any + Debug + Send + Sync> ContextValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Mapping from string keys to values of arbitrary type.
///
/// Lookups are typed: asking for a key with a type other than the one it was
/// stored with behaves as if the key was absent. Keys are kept ordered so
/// diagnostics are stable.
#[derive(Default)]
pub struct Context {
    values: BTreeMap<String, Box<dyn ContextValue>>,
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a reference to the value under `key` if it holds a `T`.
    pub fn get<T: 'static>(&self, key: &str) -> Option<&T> {
        self.values
            .get(key)
            .and_then(|v| (**v).as_any().downcast_ref())
    }

    /// Returns a mutable reference to the value under `key` if it holds a `T`.
    pub fn get_mut<T: 'static>(&mut self, key: &str) -> Option<&mut T> {
        self.values
            .get_mut(key)
            .and_then(|v| (**v).as_any_mut().downcast_mut())
    }

    /// Inserts `value` under `key`, replacing any previous value whatever its type.
    pub fn insert<T: ContextValue>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Box::new(value));
    }

    /// Removes `key`. Does nothing if the key is absent.
    pub fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.values.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}
