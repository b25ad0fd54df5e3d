//! A chained hash table that resizes incrementally.
//!
//! A [`Dict`] owns up to two bucket arrays. When it grows or shrinks, a second
//! array is allocated and entries are migrated a few buckets at a time by the
//! operations that touch the dictionary, so no single call pays for a full
//! rehash.

mod builder;
mod entry;
mod iter;
mod stats;
mod table;

pub use builder::DictBuilder;
pub use entry::Entry;
pub use iter::{Iter, SafeIter};
pub use stats::{DictStats, TableStats, CHAIN_LENGTH_SLOTS};

use self::{
    entry::{chain_len, nth, nth_mut, unlink_where, Link},
    table::{next_exp, Table, Tables, INITIAL_SIZE},
};
use crate::common::{
    error::{ConflictKind, DictError},
    time::Instant,
};

use rand::{rngs::SmallRng, Rng};
use smallvec::SmallVec;
use std::{
    borrow::Borrow,
    collections::hash_map::RandomState,
    fmt,
    hash::{BuildHasher, Hash},
    time::Duration,
};

/// The load factor past which a dictionary grows even when its resize policy is
/// `Avoid`.
pub const DEFAULT_FORCE_RESIZE_RATIO: usize = 5;

const REHASH_BATCH: usize = 100;
const FAIR_RANDOM_SAMPLE_SIZE: usize = 15;

/// Decides when a [`Dict`] may allocate a new table and migrate to it.
///
/// Servers that fork a child process to snapshot their memory switch to `Avoid`
/// while the child runs, so that copy-on-write pages are not touched by
/// rehashing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResizePolicy {
    /// Grow at a load factor of 1:1 and rehash on every operation.
    #[default]
    Enable,
    /// Grow and rehash only once the load factor exceeds the forced resize
    /// ratio.
    Avoid,
    /// Never grow and never rehash.
    Forbid,
}

pub(crate) type ExpandAllowed = Box<dyn Fn(usize, f64) -> bool + Send + Sync + 'static>;

/// The location of an entry: table, bucket, and depth in the bucket chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Position {
    table: usize,
    bucket: usize,
    depth: usize,
}

enum Slot {
    Vacant,
    Occupied(Position),
}

/// A chained hash table with incremental rehashing.
///
/// Every lookup and mutation migrates at most one bucket of the old table while a
/// rehash is in progress, unless rehashing is paused by a live [`SafeIter`].
/// Keys are hashed with the `BuildHasher` `S` (`RandomState` by default).
///
/// # Examples
///
/// ```rust
/// use kvcore::Dict;
///
/// let mut dict = Dict::new();
/// dict.add("a", 1).unwrap();
/// dict.add("b", 2).unwrap();
/// assert!(dict.add("a", 3).is_err());
///
/// assert_eq!(dict.replace("a", 10), Ok(false));
/// assert_eq!(dict.fetch_value(&"a"), Some(&10));
///
/// dict.delete(&"b").unwrap();
/// assert_eq!(dict.len(), 1);
/// ```
pub struct Dict<K, V, S = RandomState> {
    tables: Tables<K, V>,
    pause_rehash: usize,
    build_hasher: S,
    rng: SmallRng,
    resize_policy: ResizePolicy,
    force_resize_ratio: usize,
    metadata_bytes: usize,
    expand_allowed: Option<ExpandAllowed>,
}

impl<K, V, S> fmt::Debug for Dict<K, V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dict")
            .field("len", &self.tables.len())
            .field("slots", &self.tables.slots())
            .field("rehash_index", &self.tables.rehash_index())
            .field("resize_policy", &self.resize_policy)
            .finish()
    }
}

impl<K, V> Dict<K, V, RandomState>
where
    K: Hash + Eq,
{
    /// Creates an empty dictionary. No bucket array is allocated until the first
    /// insertion.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Returns a [`DictBuilder`], which can build a `Dict` with various
    /// configurations.
    pub fn builder() -> DictBuilder<Dict<K, V, RandomState>> {
        DictBuilder::default()
    }
}

impl<K, V> Default for Dict<K, V, RandomState>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> Dict<K, V, S> {
    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the total number of buckets of both tables.
    pub fn slots(&self) -> usize {
        self.tables.slots()
    }

    pub fn is_rehashing(&self) -> bool {
        self.tables.is_rehashing()
    }

    /// Returns the next bucket of the old table awaiting migration, or `None`
    /// when no rehash is in progress.
    pub fn rehash_index(&self) -> Option<usize> {
        self.tables.rehash_index()
    }

    /// Returns the number of buckets of table `0` (the main table) or `1` (the
    /// rehash target). An unallocated table has zero buckets.
    pub fn table_size(&self, table: usize) -> usize {
        self.tables.get(table).map_or(0, Table::size)
    }

    /// Returns the number of entries linked into table `0` or `1`.
    pub fn table_len(&self, table: usize) -> usize {
        self.tables.get(table).map_or(0, |t| t.used)
    }

    pub fn resize_policy(&self) -> ResizePolicy {
        self.resize_policy
    }

    pub fn set_resize_policy(&mut self, policy: ResizePolicy) {
        self.resize_policy = policy;
    }

    /// Returns a reference to the hasher of this dictionary.
    pub fn hasher(&self) -> &S {
        &self.build_hasher
    }

    /// Removes every entry and releases both bucket arrays.
    pub fn clear(&mut self) {
        self.tables = Tables::default();
    }

    /// Returns an iterator over all entries.
    ///
    /// The iterator holds a shared borrow of the dictionary, so nothing can
    /// change the dictionary while it is alive. Use [`safe_iter`] to mutate
    /// during iteration.
    ///
    /// [`safe_iter`]: #method.safe_iter
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(&self.tables)
    }

    /// Collects chain length statistics for both tables.
    pub fn stats(&self) -> DictStats {
        DictStats::collect(&self.tables)
    }

    /// Scans the dictionary with a stateless cursor.
    ///
    /// Start with cursor `0` and pass the returned cursor back until it is `0`
    /// again. Every key present for the whole duration of the scan is visited at
    /// least once, even if the dictionary is resized between calls. Some keys
    /// may be visited more than once.
    ///
    /// The cursor is advanced by incrementing its bits in reverse order, so the
    /// buckets already visited in a table of one size map to buckets already
    /// visited in a table of any other power-of-two size.
    pub fn scan(&self, cursor: u64, mut visit: impl FnMut(&Entry<K, V>)) -> u64 {
        if self.is_empty() {
            return 0;
        }

        let mut v = cursor;
        let mut visit_bucket = |head: &Link<K, V>| {
            let mut cur = head.as_deref();
            while let Some(entry) = cur {
                visit(entry);
                cur = entry.next.as_deref();
            }
        };

        match &self.tables {
            Tables::Stable(table) => {
                let m0 = table.mask() as u64;
                visit_bucket(&table.buckets[(v & m0) as usize]);
                v = advance_cursor(v, m0);
            }
            Tables::Rehashing { from, to, .. } => {
                let (small, large) = if from.size() <= to.size() {
                    (from, to)
                } else {
                    (to, from)
                };
                let m0 = small.mask() as u64;
                let m1 = large.mask() as u64;

                visit_bucket(&small.buckets[(v & m0) as usize]);

                // Visit every bucket of the larger table that is an expansion
                // of the bucket just visited in the smaller one.
                loop {
                    visit_bucket(&large.buckets[(v & m1) as usize]);
                    v = advance_cursor(v, m1);
                    if v & (m0 ^ m1) == 0 {
                        break;
                    }
                }
            }
        }
        v
    }

    fn entry_at(&self, pos: Position) -> Option<&Entry<K, V>> {
        let table = self.tables.get(pos.table)?;
        nth(table.buckets.get(pos.bucket)?, pos.depth)
    }

    fn entry_at_mut(&mut self, pos: Position) -> Option<&mut Entry<K, V>> {
        let table = self.tables.get_mut(pos.table)?;
        nth_mut(table.buckets.get_mut(pos.bucket)?, pos.depth)
    }

    /// Migrates up to `n` non-empty buckets from the old table to the new one.
    ///
    /// At most `10 * n` empty buckets are skipped before the call gives up. When
    /// the old table becomes empty the new table replaces it. Returns `true` if
    /// more buckets remain to be migrated.
    ///
    /// While a [`SafeIter`] is alive nothing is migrated, and the return value
    /// tells whether a rehash is armed. Returns `false` without migrating
    /// anything while the resize policy is `Forbid`, or while it is `Avoid` and
    /// the size ratio of the two tables is below the forced resize ratio.
    pub fn rehash(&mut self, n: usize) -> bool
    where
        K: Hash,
        S: BuildHasher,
    {
        if self.pause_rehash > 0 {
            return self.is_rehashing();
        }

        let Self {
            tables,
            build_hasher,
            resize_policy,
            force_resize_ratio,
            ..
        } = self;

        let (from, to, index) = match &mut *tables {
            Tables::Stable(_) => return false,
            Tables::Rehashing { from, to, index } => (from, to, index),
        };

        match resize_policy {
            ResizePolicy::Forbid => return false,
            ResizePolicy::Avoid => {
                let (larger, smaller) = if to.size() > from.size() {
                    (to.size(), from.size())
                } else {
                    (from.size(), to.size())
                };
                if larger / smaller < *force_resize_ratio {
                    return false;
                }
            }
            ResizePolicy::Enable => {}
        }

        let mut empty_visits = n.saturating_mul(10);
        for _ in 0..n {
            if from.used == 0 {
                break;
            }
            debug_assert!(*index < from.size());
            while from.buckets[*index].is_none() {
                *index += 1;
                empty_visits -= 1;
                if empty_visits == 0 {
                    return true;
                }
            }

            // Move the whole chain so that a bucket is never split between the
            // two tables.
            let mut chain = from.buckets[*index].take();
            while let Some(mut entry) = chain {
                chain = entry.next.take();
                let bucket = to.index_of(make_hash(build_hasher, &entry.key));
                entry.next = to.buckets[bucket].take();
                to.buckets[bucket] = Some(entry);
                from.used -= 1;
                to.used += 1;
            }
            *index += 1;
        }

        if from.used > 0 {
            return true;
        }

        if let Tables::Rehashing { to, .. } = std::mem::take(tables) {
            #[cfg(feature = "logging")]
            log::debug!(
                "Rehashing completed. The dictionary now has {} slots for {} entries",
                to.size(),
                to.used
            );
            *tables = Tables::Stable(to);
        }
        false
    }

    /// Drives the rehash in batches of 100 buckets until it completes or the
    /// time `budget` is spent. Returns the number of buckets of work done.
    pub fn rehash_for(&mut self, budget: Duration) -> usize
    where
        K: Hash,
        S: BuildHasher,
    {
        if self.pause_rehash > 0 {
            return 0;
        }

        let start = Instant::now();
        let mut rehashes = 0;
        while self.rehash(REHASH_BATCH) {
            rehashes += REHASH_BATCH;
            if Instant::now().saturating_duration_since(start) >= budget {
                break;
            }
        }
        rehashes
    }

    fn rehash_step(&mut self)
    where
        K: Hash,
        S: BuildHasher,
    {
        if self.pause_rehash == 0 {
            self.rehash(1);
        }
    }

    pub(crate) fn pause_rehashing(&mut self) {
        self.pause_rehash += 1;
    }

    pub(crate) fn resume_rehashing(&mut self) {
        debug_assert!(self.pause_rehash > 0);
        self.pause_rehash = self.pause_rehash.saturating_sub(1);
    }
}

impl<K, V, S> Dict<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    pub(crate) fn with_everything(
        initial_capacity: Option<usize>,
        build_hasher: S,
        rng: SmallRng,
        resize_policy: ResizePolicy,
        force_resize_ratio: usize,
        metadata_bytes: usize,
        expand_allowed: Option<ExpandAllowed>,
    ) -> Self {
        let table = match initial_capacity.map(next_exp) {
            Some(Ok(exp)) => Table::with_exp(exp),
            Some(Err(_)) => panic!("initial_capacity is too large"),
            None => Table::unallocated(),
        };

        Self {
            tables: Tables::Stable(table),
            pause_rehash: 0,
            build_hasher,
            rng,
            resize_policy,
            force_resize_ratio,
            metadata_bytes,
            expand_allowed,
        }
    }

    /// Returns the hash this dictionary computes for `key`.
    pub fn hash_key<Q>(&self, key: &Q) -> u64
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        make_hash(&self.build_hasher, key)
    }

    /// Grows or shrinks the dictionary to the smallest power of two holding at
    /// least `size` entries, and no fewer than 4.
    ///
    /// The first call on an unallocated dictionary installs the table directly.
    /// Otherwise a rehash into the new table is armed at bucket `0`.
    ///
    /// # Errors
    ///
    /// Returns a [`DictError::StructuralConflict`] and leaves the dictionary
    /// untouched when a rehash is already in progress, when `size` is below the
    /// number of entries, or when the new table would have the current size.
    pub fn expand(&mut self, size: usize) -> Result<(), DictError> {
        self.expand_with(size, |exp| Ok(Table::with_exp(exp)))
    }

    /// Like [`expand`](#method.expand), but reports a failure to allocate the
    /// new bucket array as [`DictError::AllocationFailure`] instead of
    /// aborting.
    pub fn try_expand(&mut self, size: usize) -> Result<(), DictError> {
        self.expand_with(size, Table::try_with_exp).map_err(|e| {
            #[cfg(feature = "logging")]
            if let DictError::AllocationFailure { buckets } = &e {
                log::warn!("Failed to expand the dictionary to {} slots", buckets);
            }
            e
        })
    }

    fn expand_with(
        &mut self,
        size: usize,
        allocate: impl FnOnce(u32) -> Result<Table<K, V>, DictError>,
    ) -> Result<(), DictError> {
        let main = match &self.tables {
            Tables::Rehashing { .. } => return Err(conflict(ConflictKind::Rehashing)),
            Tables::Stable(table) => table,
        };
        if main.used > size {
            return Err(conflict(ConflictKind::BelowElementCount));
        }

        let exp = next_exp(size)?;
        if exp as i8 == main.exp() {
            return Err(conflict(ConflictKind::Unchanged));
        }
        let new_table = allocate(exp)?;

        self.tables = match std::mem::take(&mut self.tables) {
            Tables::Stable(old) if old.size() == 0 => Tables::Stable(new_table),
            Tables::Stable(old) => Tables::Rehashing {
                from: old,
                to: new_table,
                index: 0,
            },
            rehashing => rehashing,
        };
        Ok(())
    }

    /// Resizes the dictionary to the smallest table that holds all of its
    /// entries.
    ///
    /// # Errors
    ///
    /// Returns a [`DictError::StructuralConflict`] when the resize policy is not
    /// `Enable`, when a rehash is in progress, or when the table already has
    /// that size.
    pub fn resize(&mut self) -> Result<(), DictError> {
        if self.resize_policy != ResizePolicy::Enable {
            return Err(conflict(ConflictKind::ResizeDisabled));
        }
        if self.is_rehashing() {
            return Err(conflict(ConflictKind::Rehashing));
        }
        let minimal = self.tables.main().used.max(INITIAL_SIZE);
        self.expand(minimal)
    }

    fn expand_if_needed(&mut self) -> Result<(), DictError> {
        let main = match &self.tables {
            Tables::Rehashing { .. } => return Ok(()),
            Tables::Stable(table) => table,
        };
        if main.size() == 0 {
            return self.expand(INITIAL_SIZE);
        }

        let (used, size) = (main.used, main.size());
        if !self.type_allows_expansion(used, size) {
            return Ok(());
        }
        let grow = (self.resize_policy == ResizePolicy::Enable && used >= size)
            || (self.resize_policy != ResizePolicy::Forbid
                && used / size > self.force_resize_ratio);
        if grow {
            self.expand(used + 1)
        } else {
            Ok(())
        }
    }

    fn type_allows_expansion(&self, used: usize, size: usize) -> bool {
        match &self.expand_allowed {
            None => true,
            Some(allowed) => {
                let bytes = next_exp(used + 1)
                    .ok()
                    .and_then(|exp| (1usize << exp).checked_mul(std::mem::size_of::<Link<K, V>>()))
                    .unwrap_or(usize::MAX);
                allowed(bytes, used as f64 / size as f64)
            }
        }
    }

    fn locate<Q>(&self, hash: u64, key: &Q) -> Option<Position>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        for table_no in 0..self.tables.count() {
            let table = match self.tables.get(table_no) {
                Some(table) if table.size() > 0 => table,
                _ => continue,
            };
            let bucket = table.index_of(hash);
            let mut cur = table.buckets[bucket].as_deref();
            let mut depth = 0;
            while let Some(entry) = cur {
                if entry.key.borrow() == key {
                    return Some(Position {
                        table: table_no,
                        bucket,
                        depth,
                    });
                }
                cur = entry.next.as_deref();
                depth += 1;
            }
        }
        None
    }

    fn key_slot(&mut self, key: &K, hash: u64) -> Result<Slot, DictError> {
        self.expand_if_needed()?;
        Ok(match self.locate(hash, key) {
            Some(pos) => Slot::Occupied(pos),
            None => Slot::Vacant,
        })
    }

    /// Links a new entry at the head of its bucket in the table that receives
    /// insertions.
    fn link_new(&mut self, hash: u64, key: K, value: V) -> &mut Entry<K, V> {
        let mut entry = Entry::new(key, value, self.metadata_bytes);
        let (_, table) = self.tables.active_mut();
        let bucket = table.index_of(hash);
        let head = &mut table.buckets[bucket];
        entry.next = head.take();
        table.used += 1;
        &mut **head.insert(entry)
    }

    /// Inserts a new entry and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`DictError::KeyExists`] if the key is already present. The
    /// dictionary is not modified in that case, and `key` and `value` are
    /// dropped.
    pub fn add(&mut self, key: K, value: V) -> Result<&mut Entry<K, V>, DictError> {
        self.rehash_step();
        let hash = self.hash_key(&key);
        match self.key_slot(&key, hash)? {
            Slot::Occupied(_) => Err(DictError::KeyExists),
            Slot::Vacant => Ok(self.link_new(hash, key, value)),
        }
    }

    /// Returns the entry of `key`, inserting the value returned by `default`
    /// first if the key is absent.
    pub fn add_or_find(
        &mut self,
        key: K,
        default: impl FnOnce() -> V,
    ) -> Result<&mut Entry<K, V>, DictError> {
        self.rehash_step();
        let hash = self.hash_key(&key);
        match self.key_slot(&key, hash)? {
            Slot::Occupied(pos) => self.entry_at_mut(pos).ok_or(DictError::KeyNotFound),
            Slot::Vacant => Ok(self.link_new(hash, key, default())),
        }
    }

    /// Inserts `key` or overwrites its value. Returns `true` if the key was
    /// new.
    ///
    /// When the key exists, the new value is installed before the old one is
    /// dropped, so a value may be replaced by itself safely.
    pub fn replace(&mut self, key: K, value: V) -> Result<bool, DictError> {
        self.rehash_step();
        let hash = self.hash_key(&key);
        match self.key_slot(&key, hash)? {
            Slot::Vacant => {
                self.link_new(hash, key, value);
                Ok(true)
            }
            Slot::Occupied(pos) => {
                if let Some(entry) = self.entry_at_mut(pos) {
                    let _old = entry.set_value(value);
                }
                Ok(false)
            }
        }
    }

    /// Looks up `key`, performing one rehash step first.
    pub fn find<Q>(&mut self, key: &Q) -> Option<&mut Entry<K, V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if self.is_empty() {
            return None;
        }
        self.rehash_step();
        let pos = self.locate(self.hash_key(key), key)?;
        self.entry_at_mut(pos)
    }

    /// Looks up `key` without advancing a rehash in progress.
    pub fn get<Q>(&self, key: &Q) -> Option<&Entry<K, V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if self.is_empty() {
            return None;
        }
        let pos = self.locate(self.hash_key(key), key)?;
        self.entry_at(pos)
    }

    /// Returns the value of `key`, performing one rehash step first.
    pub fn fetch_value<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find(key).map(|entry| &entry.value)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Detaches the entry of `key` and hands it back to the caller.
    pub fn unlink<Q>(&mut self, key: &Q) -> Option<Entry<K, V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if self.is_empty() {
            return None;
        }
        self.rehash_step();
        let hash = self.hash_key(key);

        for table_no in 0..self.tables.count() {
            let table = match self.tables.get_mut(table_no) {
                Some(table) if table.size() > 0 => table,
                _ => continue,
            };
            let bucket = table.index_of(hash);
            if let Some(entry) = unlink_where(&mut table.buckets[bucket], |k| k.borrow() == key) {
                table.used -= 1;
                return Some(*entry);
            }
        }
        None
    }

    /// Removes the entry of `key` and drops it.
    ///
    /// # Errors
    ///
    /// Returns [`DictError::KeyNotFound`] if the key is absent.
    pub fn delete<Q>(&mut self, key: &Q) -> Result<(), DictError>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.unlink(key).map(drop).ok_or(DictError::KeyNotFound)
    }

    /// Returns a random entry: a uniformly chosen non-empty bucket, then a
    /// uniformly chosen entry of its chain.
    ///
    /// Entries in long chains are therefore less likely to be returned than
    /// entries alone in their bucket. See [`fair_random_key`] for a better
    /// distribution.
    ///
    /// [`fair_random_key`]: #method.fair_random_key
    pub fn random_key(&mut self) -> Option<&Entry<K, V>> {
        let pos = self.random_position()?;
        self.entry_at(pos)
    }

    /// Returns a random entry chosen uniformly among a sample of 15 entries
    /// taken with [`sample_keys`](#method.sample_keys).
    pub fn fair_random_key(&mut self) -> Option<&Entry<K, V>> {
        let sample = self.sample_positions(FAIR_RANDOM_SAMPLE_SIZE);
        let pos = if sample.is_empty() {
            self.random_position()?
        } else {
            sample[self.rng.gen_range(0..sample.len())]
        };
        self.entry_at(pos)
    }

    /// Returns up to `count` entries taken from contiguous buckets starting at a
    /// random position.
    ///
    /// This is much faster than calling [`random_key`](#method.random_key)
    /// `count` times, and does not guarantee distinct or well distributed
    /// entries. Fewer than `count` entries may be returned if the walk runs
    /// through too many empty buckets.
    pub fn sample_keys(&mut self, count: usize) -> SmallVec<[&Entry<K, V>; 16]> {
        let positions = self.sample_positions(count);
        let this = &*self;
        positions
            .into_iter()
            .filter_map(|pos| this.entry_at(pos))
            .collect()
    }

    fn random_position(&mut self) -> Option<Position> {
        if self.is_empty() {
            return None;
        }
        self.rehash_step();

        let Self { tables, rng, .. } = self;
        let (table_no, bucket) = match &*tables {
            Tables::Stable(table) => loop {
                let bucket = rng.gen_range(0..table.size());
                if table.buckets[bucket].is_some() {
                    break (0, bucket);
                }
            },
            // Buckets of the old table below the rehash index are known to be
            // empty.
            Tables::Rehashing { from, to, index } => loop {
                let h = rng.gen_range(*index..from.size() + to.size());
                if h >= from.size() {
                    if to.buckets[h - from.size()].is_some() {
                        break (1, h - from.size());
                    }
                } else if from.buckets[h].is_some() {
                    break (0, h);
                }
            },
        };

        let head = &tables.get(table_no)?.buckets[bucket];
        let depth = rng.gen_range(0..chain_len(head));
        Some(Position {
            table: table_no,
            bucket,
            depth,
        })
    }

    fn sample_positions(&mut self, count: usize) -> SmallVec<[Position; 16]> {
        let count = count.min(self.len());
        let mut sampled = SmallVec::new();
        if count == 0 {
            return sampled;
        }

        for _ in 0..count {
            if !self.is_rehashing() {
                break;
            }
            self.rehash_step();
        }

        let Self { tables, rng, .. } = self;
        let tables = &*tables;
        let rehash_index = tables.rehash_index();
        let max_mask = (0..tables.count())
            .filter_map(|i| tables.get(i))
            .map(Table::mask)
            .max()
            .unwrap_or(0);

        let mut i = rng.gen::<usize>() & max_mask;
        let mut empty_len = 0;
        let mut max_steps = count * 10;

        while sampled.len() < count && max_steps > 0 {
            max_steps -= 1;
            for table_no in 0..tables.count() {
                if let (0, Some(rehash_index)) = (table_no, rehash_index) {
                    // Buckets of the old table below the rehash index are
                    // empty. Jump ahead unless the cursor is also past the end
                    // of the new table.
                    if i < rehash_index {
                        match tables.get(1) {
                            Some(to) if i >= to.size() => i = rehash_index,
                            _ => continue,
                        }
                    }
                }
                let table = match tables.get(table_no) {
                    Some(table) if i < table.size() => table,
                    _ => continue,
                };

                let mut cur = table.buckets[i].as_deref();
                if cur.is_none() {
                    empty_len += 1;
                    if empty_len >= 5 && empty_len > count {
                        i = rng.gen::<usize>() & max_mask;
                        empty_len = 0;
                    }
                    continue;
                }

                empty_len = 0;
                let mut depth = 0;
                while let Some(entry) = cur {
                    sampled.push(Position {
                        table: table_no,
                        bucket: i,
                        depth,
                    });
                    if sampled.len() == count {
                        return sampled;
                    }
                    cur = entry.next.as_deref();
                    depth += 1;
                }
            }
            i = (i + 1) & max_mask;
        }
        sampled
    }
}

impl<K, V, S> Dict<K, V, S>
where
    K: Hash + Eq + Clone,
    S: BuildHasher,
{
    /// Returns an iterator that allows the dictionary to be modified through
    /// [`SafeIter::dict`] while iterating. Rehashing is paused until the
    /// iterator is dropped.
    ///
    /// Entries deleted before they are reached are not returned. Entries
    /// inserted during the iteration may or may not be returned.
    pub fn safe_iter(&mut self) -> SafeIter<'_, K, V, S> {
        SafeIter::new(self)
    }
}

#[inline]
fn make_hash<Q, S>(build_hasher: &S, key: &Q) -> u64
where
    Q: Hash + ?Sized,
    S: BuildHasher,
{
    use std::hash::Hasher;
    let mut hasher = build_hasher.build_hasher();
    key.hash(&mut hasher);
    hasher.finish()
}

fn conflict(kind: ConflictKind) -> DictError {
    DictError::StructuralConflict(kind)
}

/// Sets the bits above `mask`, then increments the cursor from its most
/// significant bit downwards.
#[inline]
fn advance_cursor(v: u64, mask: u64) -> u64 {
    let v = v | !mask;
    v.reverse_bits().wrapping_add(1).reverse_bits()
}
