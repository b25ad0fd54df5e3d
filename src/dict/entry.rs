use std::fmt;

pub(crate) type Link<K, V> = Option<Box<Entry<K, V>>>;

/// A key/value association stored in a [`Dict`][dict-struct].
///
/// An entry is exclusively owned by the bucket chain it is linked into. Removing
/// it with [`Dict::unlink`][unlink] detaches it and hands ownership back to the
/// caller.
///
/// Every entry carries a metadata region whose length is fixed per dictionary
/// (see [`DictBuilder::metadata_bytes`][metadata-bytes]). The region is
/// zero-initialized when the entry is created.
///
/// [dict-struct]: ./struct.Dict.html
/// [unlink]: ./struct.Dict.html#method.unlink
/// [metadata-bytes]: ./struct.DictBuilder.html#method.metadata_bytes
pub struct Entry<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) next: Link<K, V>,
    metadata: Box<[u8]>,
}

impl<K, V> Entry<K, V> {
    pub(crate) fn new(key: K, value: V, metadata_bytes: usize) -> Box<Self> {
        Box::new(Self {
            key,
            value,
            next: None,
            metadata: vec![0; metadata_bytes].into_boxed_slice(),
        })
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut V {
        &mut self.value
    }

    /// Installs `value` and returns the previous one. The previous value is
    /// handed back only after the new one is in place.
    pub fn set_value(&mut self, value: V) -> V {
        std::mem::replace(&mut self.value, value)
    }

    pub fn metadata(&self) -> &[u8] {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut [u8] {
        &mut self.metadata
    }

    /// Consumes a detached entry and returns its key and value.
    pub fn into_parts(self) -> (K, V) {
        (self.key, self.value)
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for Entry<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("key", &self.key)
            .field("value", &self.value)
            .field("metadata_len", &self.metadata.len())
            .finish()
    }
}

/// Walks a chain and returns the number of entries linked into it.
pub(crate) fn chain_len<K, V>(head: &Link<K, V>) -> usize {
    let mut len = 0;
    let mut cur = head.as_deref();
    while let Some(entry) = cur {
        len += 1;
        cur = entry.next.as_deref();
    }
    len
}

/// Returns the entry at `depth` positions from the head of the chain.
pub(crate) fn nth<K, V>(head: &Link<K, V>, depth: usize) -> Option<&Entry<K, V>> {
    let mut cur = head.as_deref();
    for _ in 0..depth {
        cur = cur?.next.as_deref();
    }
    cur
}

pub(crate) fn nth_mut<K, V>(head: &mut Link<K, V>, depth: usize) -> Option<&mut Entry<K, V>> {
    let mut cur = head.as_deref_mut();
    for _ in 0..depth {
        cur = cur?.next.as_deref_mut();
    }
    cur
}

/// Detaches the first entry of the chain matching `is_match` and returns it
/// with its `next` link cleared.
pub(crate) fn unlink_where<K, V>(
    mut link: &mut Link<K, V>,
    mut is_match: impl FnMut(&K) -> bool,
) -> Option<Box<Entry<K, V>>> {
    loop {
        match link {
            None => return None,
            Some(entry) if is_match(&entry.key) => {
                let next = entry.next.take();
                return std::mem::replace(link, next);
            }
            Some(entry) => link = &mut entry.next,
        }
    }
}
