// src/jobs/registry.rs

//! The four shared containers of the engine.
//!
//! Each container owns its own lock and only exposes methods that take the
//! lock, do one mutation or lookup, and hand back owned data (`Arc`s, `bool`s,
//! `Vec`s). No guard ever leaves this module, so a caller cannot hold two of
//! these locks at once.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::jobs::job::Job;
use crate::jobs::lock;
use crate::jobs::safe_object::SafeObject;

/// String-keyed map of shared entities behind one lock.
#[derive(Debug)]
pub struct KeyedRegistry<T> {
    inner: Mutex<HashMap<String, Arc<T>>>,
}

impl<T> Default for KeyedRegistry<T> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> KeyedRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the entry for `key`, creating it with `create` if absent.
    ///
    /// The boolean is `true` when this call created the entry.
    pub fn get_or_insert_with(&self, key: &str, create: impl FnOnce() -> T) -> (Arc<T>, bool) {
        let mut map = lock(&self.inner);
        if let Some(existing) = map.get(key) {
            return (Arc::clone(existing), false);
        }
        let entry = Arc::new(create());
        map.insert(key.to_string(), Arc::clone(&entry));
        (entry, true)
    }

    /// Insert `value` under `key`, returning what was there before.
    pub fn insert(&self, key: &str, value: Arc<T>) -> Option<Arc<T>> {
        lock(&self.inner).insert(key.to_string(), value)
    }

    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        lock(&self.inner).get(key).cloned()
    }

    /// Remove and return the entry for `key`.
    ///
    /// Only one caller can win this for a given entry, which is what makes
    /// wake-ups through the indices exactly-once.
    pub fn take(&self, key: &str) -> Option<Arc<T>> {
        lock(&self.inner).remove(key)
    }

    /// Remove `key` only if it still maps to `entry`.
    pub fn remove_entry(&self, key: &str, entry: &Arc<T>) -> bool {
        let mut map = lock(&self.inner);
        if map.get(key).is_some_and(|current| Arc::ptr_eq(current, entry)) {
            map.remove(key);
            return true;
        }
        false
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.inner).contains_key(key)
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).is_empty()
    }

    /// Empty the registry and return everything it held.
    pub fn drain(&self) -> Vec<Arc<T>> {
        lock(&self.inner).drain().map(|(_, v)| v).collect()
    }
}

/// Active jobs by job identifier.
pub type JobRegistry = KeyedRegistry<Job>;

/// Safe objects by identifier.
pub type SafeObjectRegistry = KeyedRegistry<SafeObject>;

/// Outstanding value identifier → the job waiting for it. Last writer wins.
pub type ParameterWaitIndex = KeyedRegistry<Job>;

/// Value identifiers the Orchestrator asked to have pushed back.
#[derive(Debug, Default)]
pub struct PullRequestIndex {
    inner: Mutex<HashSet<String>>,
}

impl PullRequestIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the value was already registered.
    pub fn register(&self, value: &str) -> bool {
        lock(&self.inner).insert(value.to_string())
    }

    /// Remove the registration; `true` means the caller now owns delivery.
    pub fn take(&self, value: &str) -> bool {
        lock(&self.inner).remove(value)
    }

    pub fn contains(&self, value: &str) -> bool {
        lock(&self.inner).contains(value)
    }

    /// Registered values, sorted.
    pub fn values(&self) -> Vec<String> {
        let mut values: Vec<String> = lock(&self.inner).iter().cloned().collect();
        values.sort_unstable();
        values
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).is_empty()
    }

    pub fn clear(&self) {
        lock(&self.inner).clear();
    }
}
