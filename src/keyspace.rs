//! Numbered databases and the value model the eviction engine works with.

use crate::{
    common::error::DictError,
    dict::{Dict, DictBuilder},
    evict::lru::LRU_CLOCK_MAX,
};

use std::sync::Arc;

/// A key of a [`Db`](./struct.Db.html). The main dictionary and the expires
/// dictionary share the same allocation.
pub type Key = Arc<[u8]>;

/// A value that can be ranked for eviction.
///
/// Every evictable value carries a 24-bit field. Under an LRU policy it holds
/// the LRU clock of the last access; under an LFU policy it holds the packed
/// last decrement time and logarithmic counter described in
/// [`evict::lfu`](../evict/lfu/index.html).
pub trait Evictable {
    /// Returns the 24-bit recency or frequency field.
    fn lru(&self) -> u32;

    fn set_lru(&mut self, lru: u32);

    /// Estimates the work needed to free this value, in allocations. Values
    /// above 64 are freed on the deferred deletion worker when lazy eviction
    /// is enabled.
    fn free_effort(&self) -> usize {
        1
    }
}

/// A value tagged with the recency or frequency field.
///
/// Use [`Evictor::initial_lru`][initial-lru] to get the field a new value
/// should start with under the active policy, and
/// [`Evictor::touch`][touch] to record an access.
///
/// [initial-lru]: ../evict/struct.Evictor.html#method.initial_lru
/// [touch]: ../evict/struct.Evictor.html#method.touch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Object<T> {
    value: T,
    lru: u32,
}

impl<T> Object<T> {
    pub fn new(value: T, lru: u32) -> Self {
        Self {
            value,
            lru: lru & LRU_CLOCK_MAX,
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.value
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> Evictable for Object<T> {
    fn lru(&self) -> u32 {
        self.lru
    }

    fn set_lru(&mut self, lru: u32) {
        self.lru = lru & LRU_CLOCK_MAX;
    }
}

/// A numbered database: a main dictionary holding the values, and an expires
/// dictionary holding the expire time, in Unix milliseconds, of the keys that
/// have one.
///
/// Every key of the expires dictionary is also a key of the main dictionary.
/// The methods of `Db` keep the two in sync; code that reaches into
/// [`dict_mut`](#method.dict_mut) or [`expires_mut`](#method.expires_mut)
/// directly is responsible for that.
#[derive(Debug)]
pub struct Db<V> {
    id: usize,
    pub(crate) dict: Dict<Key, V>,
    pub(crate) expires: Dict<Key, i64>,
}

impl<V> Db<V> {
    pub fn new(id: usize) -> Self {
        Self::with_dicts(id, Dict::new(), Dict::new())
    }

    /// Creates a database whose dictionaries sample keys deterministically.
    pub fn with_seed(id: usize, seed: u64) -> Self {
        Self::with_dicts(
            id,
            DictBuilder::new().seed(seed).build(),
            DictBuilder::new().seed(seed.wrapping_add(1)).build(),
        )
    }

    pub fn with_dicts(id: usize, dict: Dict<Key, V>, expires: Dict<Key, i64>) -> Self {
        Self { id, dict, expires }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn len(&self) -> usize {
        self.dict.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dict.is_empty()
    }

    pub fn dict(&self) -> &Dict<Key, V> {
        &self.dict
    }

    pub fn dict_mut(&mut self) -> &mut Dict<Key, V> {
        &mut self.dict
    }

    pub fn expires(&self) -> &Dict<Key, i64> {
        &self.expires
    }

    pub fn expires_mut(&mut self) -> &mut Dict<Key, i64> {
        &mut self.expires
    }

    /// Sets the value of `key`, keeping its expire time if it has one.
    /// Returns `true` if the key is new.
    pub fn insert(&mut self, key: impl Into<Key>, value: V) -> Result<bool, DictError> {
        self.dict.replace(key.into(), value)
    }

    pub fn get(&mut self, key: &[u8]) -> Option<&V> {
        self.dict.fetch_value(key)
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut V> {
        self.dict.find(key).map(|e| e.value_mut())
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.dict.contains_key(key)
    }

    /// Sets the expire time of an existing key, in Unix milliseconds.
    ///
    /// Returns `KeyNotFound` if the key is not in the main dictionary.
    pub fn set_expire(&mut self, key: &[u8], when: i64) -> Result<(), DictError> {
        let key = self
            .dict
            .find(key)
            .map(|e| Arc::clone(e.key()))
            .ok_or(DictError::KeyNotFound)?;
        self.expires.add_or_find(key, || when)?.set_value(when);
        Ok(())
    }

    pub fn expire_at(&self, key: &[u8]) -> Option<i64> {
        self.expires.get(key).map(|e| *e.value())
    }

    /// Removes the expire time of `key`. Returns `true` if it had one.
    pub fn persist(&mut self, key: &[u8]) -> bool {
        self.expires.delete(key).is_ok()
    }

    /// Removes `key` and returns its value without dropping it.
    pub fn unlink(&mut self, key: &[u8]) -> Option<V> {
        let entry = self.dict.unlink(key)?;
        if !self.expires.is_empty() {
            let _ = self.expires.delete(key);
        }
        let (_key, value) = entry.into_parts();
        Some(value)
    }

    /// Removes and drops `key`. Returns `true` if it was present.
    pub fn delete(&mut self, key: &[u8]) -> bool {
        self.unlink(key).is_some()
    }
}
