use super::{table::Tables, Dict, Entry};

use smallvec::SmallVec;
use std::hash::{BuildHasher, Hash};

/// An iterator over the entries of a [`Dict`][dict-struct].
///
/// Created by [`Dict::iter`][iter-method]. The iterator borrows the dictionary,
/// so the dictionary cannot be modified while it is alive. In debug builds the
/// structural fingerprint of the dictionary is checked again when the iterator
/// is dropped.
///
/// [dict-struct]: ./struct.Dict.html
/// [iter-method]: ./struct.Dict.html#method.iter
pub struct Iter<'a, K, V> {
    tables: &'a Tables<K, V>,
    table: usize,
    bucket: usize,
    current: Option<&'a Entry<K, V>>,
    fingerprint: u64,
}

impl<'a, K, V> Iter<'a, K, V> {
    pub(crate) fn new(tables: &'a Tables<K, V>) -> Self {
        Self {
            tables,
            table: 0,
            bucket: 0,
            current: None,
            fingerprint: tables.fingerprint(),
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = &'a Entry<K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.current {
                self.current = entry.next.as_deref();
                return Some(entry);
            }
            let table = self.tables.get(self.table)?;
            if self.bucket < table.size() {
                self.current = table.buckets[self.bucket].as_deref();
                self.bucket += 1;
            } else {
                self.table += 1;
                self.bucket = 0;
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.tables.len()))
    }
}

impl<'a, K, V> Drop for Iter<'a, K, V> {
    fn drop(&mut self) {
        debug_assert_eq!(
            self.fingerprint,
            self.tables.fingerprint(),
            "the dictionary was modified while an unsafe iterator was alive"
        );
    }
}

/// An iterator that allows the dictionary to be modified while iterating.
///
/// Created by [`Dict::safe_iter`][safe-iter-method]. Rehashing is paused for
/// the lifetime of the iterator, so entries never move between tables while it
/// walks them. The keys of each bucket are captured before the bucket is
/// visited, and every captured key is looked up again right before it is
/// returned. An entry removed through [`dict`](#method.dict) before it is
/// reached is therefore skipped.
///
/// `SafeIter` lends out mutable references, so it does not implement
/// `Iterator`. Drive it with `while let`:
///
/// ```rust
/// use kvcore::Dict;
///
/// let mut dict = Dict::new();
/// for k in 0..10 {
///     dict.add(k, k * 2).unwrap();
/// }
///
/// let mut iter = dict.safe_iter();
/// while let Some(entry) = iter.next_entry() {
///     let key = *entry.key();
///     *entry.value_mut() += 1;
///     if key % 2 == 0 {
///         iter.dict().delete(&key).unwrap();
///     }
/// }
/// drop(iter);
///
/// assert_eq!(dict.len(), 5);
/// assert_eq!(dict.fetch_value(&3), Some(&7));
/// ```
///
/// [safe-iter-method]: ./struct.Dict.html#method.safe_iter
pub struct SafeIter<'a, K, V, S> {
    dict: &'a mut Dict<K, V, S>,
    table: usize,
    bucket: usize,
    pending: SmallVec<[K; 8]>,
}

impl<'a, K, V, S> SafeIter<'a, K, V, S>
where
    K: Hash + Eq + Clone,
    S: BuildHasher,
{
    pub(crate) fn new(dict: &'a mut Dict<K, V, S>) -> Self {
        dict.pause_rehashing();
        Self {
            dict,
            table: 0,
            bucket: 0,
            pending: SmallVec::new(),
        }
    }

    /// Returns the next live entry, or `None` when every bucket was visited.
    pub fn next_entry(&mut self) -> Option<&mut Entry<K, V>> {
        loop {
            if let Some(key) = self.pending.pop() {
                let hash = self.dict.hash_key(&key);
                if let Some(pos) = self.dict.locate(hash, &key) {
                    return self.dict.entry_at_mut(pos);
                }
                continue;
            }

            let table = self.dict.tables.get(self.table)?;
            if self.bucket >= table.size() {
                self.table += 1;
                self.bucket = 0;
                continue;
            }

            let mut cur = table.buckets[self.bucket].as_deref();
            while let Some(entry) = cur {
                self.pending.push(entry.key.clone());
                cur = entry.next.as_deref();
            }
            // Pop from the back in chain order.
            self.pending.reverse();
            self.bucket += 1;
        }
    }

    /// Returns the dictionary being iterated, for modifications.
    pub fn dict(&mut self) -> &mut Dict<K, V, S> {
        self.dict
    }
}

impl<'a, K, V, S> Drop for SafeIter<'a, K, V, S> {
    fn drop(&mut self) {
        self.dict.resume_rehashing();
    }
}

#[cfg(test)]
mod tests {
    use crate::dict::Dict;

    use std::collections::HashSet;

    fn filled(n: u32) -> Dict<u32, u32> {
        let mut dict = Dict::new();
        for k in 0..n {
            dict.add(k, k).unwrap();
        }
        while dict.rehash(100) {}
        dict
    }

    #[test]
    fn iter_yields_every_key_once_while_rehashing() {
        let mut dict = filled(100);
        dict.expand(1000).unwrap();
        dict.rehash(3);
        assert!(dict.is_rehashing());

        let keys: Vec<u32> = dict.iter().map(|e| *e.key()).collect();
        assert_eq!(keys.len(), 100);
        assert_eq!(keys.iter().collect::<HashSet<_>>().len(), 100);
    }

    #[test]
    fn safe_iter_pauses_rehashing() {
        let mut dict = filled(100);
        dict.expand(1000).unwrap();
        let index = dict.rehash_index();

        let mut iter = dict.safe_iter();
        let mut visited = HashSet::new();
        while let Some(entry) = iter.next_entry() {
            visited.insert(*entry.key());
            // Paused, but the rehash is still pending.
            assert!(iter.dict().rehash(10));
            assert_eq!(iter.dict().rehash_index(), index);
        }
        drop(iter);

        assert_eq!(visited.len(), 100);
        assert!(dict.rehash(10));
    }

    #[test]
    fn safe_iter_skips_entries_deleted_ahead() {
        let mut dict = filled(50);
        let mut iter = dict.safe_iter();
        let mut visited = Vec::new();
        while let Some(entry) = iter.next_entry() {
            let key = *entry.key();
            visited.push(key);
            // Delete the partner of every visited key.
            let _ = iter.dict().delete(&(49 - key));
        }
        drop(iter);

        for key in &visited {
            assert!(!visited.contains(&(49 - key)) || *key == 49 - key);
        }
        assert_eq!(dict.len() + visited.len(), 50);
    }

    #[test]
    fn safe_iter_allows_insertions() {
        let mut dict = filled(4);
        let mut iter = dict.safe_iter();
        let mut count = 0;
        while iter.next_entry().is_some() {
            count += 1;
            let key = 1000 + count;
            iter.dict().add(key, 0).unwrap();
        }
        drop(iter);
        assert!(count >= 4);
        assert_eq!(dict.len(), 4 + count as usize);
    }
}
