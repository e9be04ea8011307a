//! Per-kind object containers
//!
//! A [`Registry`] stores strong references in a slot map, so liveness of a handle is a
//! generation check, and keeps a separate insertion-ordered handle list so teardown visits
//! objects in the order they were created.

use std::sync::{Arc, RwLock};

use slotmap::{Key, SlotMap};

use crate::foundation::sync::{read, write};

struct RegistryInner<K: Key, T> {
    objects: SlotMap<K, Arc<T>>,
    order: Vec<K>,
}

/// Thread-safe, insertion-ordered container for one object kind
pub struct Registry<K: Key, T> {
    inner: RwLock<RegistryInner<K, T>>,
}

impl<K: Key, T> Registry<K, T> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                objects: SlotMap::with_key(),
                order: Vec::new(),
            }),
        }
    }

    /// Insert an object and return its handle
    pub fn insert(&self, object: Arc<T>) -> K {
        let mut inner = write(&self.inner);
        let handle = inner.objects.insert(object);
        inner.order.push(handle);
        handle
    }

    /// Remove an object; stale handles return `None`
    pub fn remove(&self, handle: K) -> Option<Arc<T>> {
        let mut inner = write(&self.inner);
        let object = inner.objects.remove(handle)?;
        inner.order.retain(|&key| key != handle);
        Some(object)
    }

    /// Look up a live object
    pub fn get(&self, handle: K) -> Option<Arc<T>> {
        read(&self.inner).objects.get(handle).cloned()
    }

    /// True if `handle` refers to a live object
    pub fn contains(&self, handle: K) -> bool {
        read(&self.inner).objects.contains_key(handle)
    }

    /// Number of live objects
    pub fn len(&self) -> usize {
        read(&self.inner).objects.len()
    }

    /// True if no objects are live
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live handles in insertion order
    pub fn handles(&self) -> Vec<K> {
        read(&self.inner).order.clone()
    }

    /// Live handles and objects in insertion order
    pub fn entries(&self) -> Vec<(K, Arc<T>)> {
        let inner = read(&self.inner);
        inner
            .order
            .iter()
            .filter_map(|&key| inner.objects.get(key).map(|object| (key, Arc::clone(object))))
            .collect()
    }

    /// Remove every object, returning them in insertion order
    pub fn drain(&self) -> Vec<(K, Arc<T>)> {
        let mut inner = write(&self.inner);
        let order = std::mem::take(&mut inner.order);
        order
            .into_iter()
            .filter_map(|key| inner.objects.remove(key).map(|object| (key, object)))
            .collect()
    }
}

impl<K: Key, T> Default for Registry<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::collections::BufferHandle;

    #[test]
    fn test_insert_and_remove() {
        let registry: Registry<BufferHandle, u32> = Registry::new();
        let handle = registry.insert(Arc::new(5));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(handle).as_deref(), Some(&5));

        assert!(registry.remove(handle).is_some());
        assert!(registry.is_empty());
        assert!(registry.remove(handle).is_none());
        assert!(!registry.contains(handle));
    }

    #[test]
    fn test_insertion_order_survives_removal() {
        let registry: Registry<BufferHandle, &str> = Registry::new();
        let a = registry.insert(Arc::new("a"));
        let b = registry.insert(Arc::new("b"));
        let c = registry.insert(Arc::new("c"));
        registry.remove(b);
        let d = registry.insert(Arc::new("d"));

        assert_eq!(registry.handles(), vec![a, c, d]);
        let drained: Vec<&str> = registry.drain().into_iter().map(|(_, v)| *v).collect();
        assert_eq!(drained, vec!["a", "c", "d"]);
        assert!(registry.is_empty());
        assert!(registry.handles().is_empty());
    }
}
