use super::entry::Link;
use crate::common::error::{ConflictKind, DictError};

/// The exponent of the smallest table ever allocated (4 buckets).
pub(crate) const INITIAL_EXP: u32 = 2;
pub(crate) const INITIAL_SIZE: usize = 1 << INITIAL_EXP;

/// One bucket array and the number of entries linked into it.
pub(crate) struct Table<K, V> {
    pub(crate) buckets: Box<[Link<K, V>]>,
    pub(crate) used: usize,
}

impl<K, V> Table<K, V> {
    pub(crate) fn unallocated() -> Self {
        Self {
            buckets: Box::default(),
            used: 0,
        }
    }

    pub(crate) fn with_exp(exp: u32) -> Self {
        let size = 1usize << exp;
        Self {
            buckets: (0..size).map(|_| None).collect(),
            used: 0,
        }
    }

    pub(crate) fn try_with_exp(exp: u32) -> Result<Self, DictError> {
        let size = 1usize << exp;
        let mut buckets = Vec::new();
        buckets
            .try_reserve_exact(size)
            .map_err(|_| DictError::AllocationFailure { buckets: size })?;
        buckets.resize_with(size, || None);
        Ok(Self {
            buckets: buckets.into_boxed_slice(),
            used: 0,
        })
    }

    #[inline]
    pub(crate) fn size(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    pub(crate) fn mask(&self) -> usize {
        self.size().saturating_sub(1)
    }

    /// Returns the size exponent, or -1 for an unallocated table.
    pub(crate) fn exp(&self) -> i8 {
        if self.buckets.is_empty() {
            -1
        } else {
            self.size().trailing_zeros() as i8
        }
    }

    #[inline]
    pub(crate) fn index_of(&self, hash: u64) -> usize {
        (hash as usize) & self.mask()
    }

    pub(crate) fn addr(&self) -> usize {
        self.buckets.as_ptr() as usize
    }
}

// Chains are unlinked one entry at a time so that dropping a long chain does not
// recurse through every `next` box.
impl<K, V> Drop for Table<K, V> {
    fn drop(&mut self) {
        for head in self.buckets.iter_mut() {
            let mut cur = head.take();
            while let Some(mut entry) = cur {
                cur = entry.next.take();
            }
        }
    }
}

/// The two-table state of a dictionary.
///
/// While `Rehashing`, every bucket of `from` below `index` is empty, and new
/// entries are only ever linked into `to`.
pub(crate) enum Tables<K, V> {
    Stable(Table<K, V>),
    Rehashing {
        from: Table<K, V>,
        to: Table<K, V>,
        index: usize,
    },
}

impl<K, V> Default for Tables<K, V> {
    fn default() -> Self {
        Tables::Stable(Table::unallocated())
    }
}

impl<K, V> Tables<K, V> {
    pub(crate) fn main(&self) -> &Table<K, V> {
        match self {
            Tables::Stable(table) => table,
            Tables::Rehashing { from, .. } => from,
        }
    }

    pub(crate) fn get(&self, i: usize) -> Option<&Table<K, V>> {
        match (self, i) {
            (Tables::Stable(table), 0) => Some(table),
            (Tables::Rehashing { from, .. }, 0) => Some(from),
            (Tables::Rehashing { to, .. }, 1) => Some(to),
            _ => None,
        }
    }

    pub(crate) fn get_mut(&mut self, i: usize) -> Option<&mut Table<K, V>> {
        match (self, i) {
            (Tables::Stable(table), 0) => Some(table),
            (Tables::Rehashing { from, .. }, 0) => Some(from),
            (Tables::Rehashing { to, .. }, 1) => Some(to),
            _ => None,
        }
    }

    /// The table new entries are linked into.
    pub(crate) fn active_mut(&mut self) -> (usize, &mut Table<K, V>) {
        match self {
            Tables::Stable(table) => (0, table),
            Tables::Rehashing { to, .. } => (1, to),
        }
    }

    pub(crate) fn rehash_index(&self) -> Option<usize> {
        match self {
            Tables::Stable(_) => None,
            Tables::Rehashing { index, .. } => Some(*index),
        }
    }

    pub(crate) fn is_rehashing(&self) -> bool {
        matches!(self, Tables::Rehashing { .. })
    }

    pub(crate) fn count(&self) -> usize {
        if self.is_rehashing() {
            2
        } else {
            1
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Tables::Stable(table) => table.used,
            Tables::Rehashing { from, to, .. } => from.used + to.used,
        }
    }

    pub(crate) fn slots(&self) -> usize {
        match self {
            Tables::Stable(table) => table.size(),
            Tables::Rehashing { from, to, .. } => from.size() + to.size(),
        }
    }

    /// Folds the address, exponent and element count of both tables into a
    /// single integer. Any structural change to the dictionary changes it.
    pub(crate) fn fingerprint(&self) -> u64 {
        let mut integers = [0u64, -1i64 as u64, 0, 0, -1i64 as u64, 0];
        for (i, table) in (0..2).filter_map(|i| self.get(i).map(|t| (i, t))) {
            integers[i * 3] = table.addr() as u64;
            integers[i * 3 + 1] = table.exp() as i64 as u64;
            integers[i * 3 + 2] = table.used as u64;
        }

        // Thomas Wang's 64 bit integer hash, applied to the running sum.
        integers.iter().fold(0u64, |hash, &n| {
            let mut hash = hash.wrapping_add(n);
            hash = (!hash).wrapping_add(hash << 21);
            hash ^= hash >> 24;
            hash = hash.wrapping_add(hash << 3).wrapping_add(hash << 8);
            hash ^= hash >> 14;
            hash = hash.wrapping_add(hash << 2).wrapping_add(hash << 4);
            hash ^= hash >> 28;
            hash.wrapping_add(hash << 31)
        })
    }
}

/// Returns the exponent of the smallest power of two that is at least `size`,
/// never below [`INITIAL_EXP`].
pub(crate) fn next_exp(size: usize) -> Result<u32, DictError> {
    if size <= INITIAL_SIZE {
        return Ok(INITIAL_EXP);
    }
    size.checked_next_power_of_two()
        .map(|n| n.trailing_zeros())
        .ok_or(DictError::StructuralConflict(ConflictKind::Overflow))
}
