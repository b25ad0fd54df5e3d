use super::{lfu, lru, MaxmemoryPolicy};
use crate::keyspace::{Db, Evictable};

use std::fmt;

/// The number of candidates kept by an [`EvictionPool`](./struct.EvictionPool.html).
pub const EVPOOL_SIZE: usize = 16;

/// Keys up to this length are copied into a buffer the pool slot keeps around
/// between uses. Longer keys get a heap copy of their own.
pub const EVPOOL_CACHED_KEY_SIZE: usize = 255;

enum KeyStorage {
    Cached,
    Heap(Box<[u8]>),
}

struct PoolEntry {
    idle: u64,
    key: Option<KeyStorage>,
    cached: Vec<u8>,
    db: usize,
}

impl PoolEntry {
    fn new() -> Self {
        Self {
            idle: 0,
            key: None,
            cached: Vec::with_capacity(EVPOOL_CACHED_KEY_SIZE),
            db: 0,
        }
    }

    fn key(&self) -> Option<&[u8]> {
        match &self.key {
            None => None,
            Some(KeyStorage::Cached) => Some(self.cached.as_slice()),
            Some(KeyStorage::Heap(key)) => Some(&key[..]),
        }
    }

    fn set(&mut self, idle: u64, key: &[u8], db: usize) {
        if key.len() > EVPOOL_CACHED_KEY_SIZE {
            self.key = Some(KeyStorage::Heap(key.into()));
        } else {
            self.cached.clear();
            self.cached.extend_from_slice(key);
            self.key = Some(KeyStorage::Cached);
        }
        self.idle = idle;
        self.db = db;
    }

    fn clear(&mut self) {
        self.key = None;
        self.idle = 0;
    }
}

/// A candidate of an [`EvictionPool`](./struct.EvictionPool.html).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Candidate<'a> {
    /// The badness score. Larger values are evicted first.
    pub idle: u64,
    pub key: &'a [u8],
    /// The index of the database the key was sampled from.
    pub db: usize,
}

/// A fixed set of eviction candidates kept in ascending order of badness.
///
/// Every refill samples a few keys from each database and merges them into the
/// pool, so good candidates found by earlier samples survive until something
/// worse comes along. Keys are stored by copy; a candidate whose key was
/// deleted or changed since it was sampled is detected and skipped when
/// [`pick_worst`](#method.pick_worst) looks it up again.
pub struct EvictionPool {
    entries: [PoolEntry; EVPOOL_SIZE],
}

impl Default for EvictionPool {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EvictionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl EvictionPool {
    pub fn new() -> Self {
        Self {
            entries: std::array::from_fn(|_| PoolEntry::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.key.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries[0].key.is_none()
    }

    /// Returns the occupied slots, in ascending order of badness.
    pub fn iter(&self) -> impl Iterator<Item = Candidate<'_>> + '_ {
        self.entries.iter().filter_map(|e| {
            e.key().map(|key| Candidate {
                idle: e.idle,
                key,
                db: e.db,
            })
        })
    }

    pub fn clear(&mut self) {
        self.entries.iter_mut().for_each(PoolEntry::clear);
    }

    /// Offers a candidate to the pool. Returns `false` if the pool is full and
    /// every candidate in it is worse than this one.
    ///
    /// The candidate goes right before the first slot that is empty or holds an
    /// equal or higher score. If that slot is free it is used as is. Otherwise
    /// room is made by shifting the tail to the right when the last slot is
    /// free, or else by dropping the best candidate in slot 0 and shifting the
    /// head to the left.
    pub fn insert(&mut self, idle: u64, key: &[u8], db: usize) -> bool {
        let entries = &mut self.entries;
        let k = entries
            .iter()
            .position(|e| e.key.is_none() || e.idle >= idle)
            .unwrap_or(EVPOOL_SIZE);
        let last_is_free = entries[EVPOOL_SIZE - 1].key.is_none();

        let k = if k == 0 && !last_is_free {
            return false;
        } else if k < EVPOOL_SIZE && entries[k].key.is_none() {
            k
        } else if last_is_free {
            // The free last slot rotates into position k, buffer included.
            entries[k..].rotate_right(1);
            k
        } else {
            // Slot 0 rotates into position k - 1 and is overwritten.
            entries[..k].rotate_left(1);
            k - 1
        };
        entries[k].set(idle, key, db);
        true
    }

    /// Samples up to `samples` keys from `db` and offers them to the pool.
    ///
    /// Under the `allkeys` policies keys are sampled from the main dictionary,
    /// otherwise from the expires dictionary. `db_index` is recorded with every
    /// candidate.
    pub(crate) fn populate<V: Evictable>(
        &mut self,
        db_index: usize,
        db: &mut Db<V>,
        samples: usize,
        scorer: &Scorer,
    ) {
        let Db { dict, expires, .. } = db;
        if scorer.policy.is_allkeys() {
            for entry in dict.sample_keys(samples) {
                self.insert(scorer.score(entry.value()), entry.key(), db_index);
            }
        } else {
            for entry in expires.sample_keys(samples) {
                let idle = if scorer.policy == MaxmemoryPolicy::VolatileTtl {
                    Scorer::score_ttl(*entry.value())
                } else {
                    match dict.find(&**entry.key()) {
                        Some(value_entry) => scorer.score(value_entry.value()),
                        None => continue,
                    }
                };
                self.insert(idle, entry.key(), db_index);
            }
        }
    }

    /// Walks the pool from the worst candidate down and returns the first one
    /// `resolve` still finds, together with its database index.
    ///
    /// Every visited slot is emptied whether its key resolves or not.
    pub fn pick_worst<R>(
        &mut self,
        mut resolve: impl FnMut(usize, &[u8]) -> Option<R>,
    ) -> Option<(usize, R)> {
        for entry in self.entries.iter_mut().rev() {
            let found = match entry.key() {
                Some(key) => resolve(entry.db, key),
                None => continue,
            };
            let db = entry.db;
            entry.clear();
            if let Some(found) = found {
                return Some((db, found));
            }
        }
        None
    }
}

/// Computes badness scores at one instant of the clocks.
pub(crate) struct Scorer {
    pub(crate) policy: MaxmemoryPolicy,
    pub(crate) lru_clock: u32,
    pub(crate) lfu_minutes: u16,
    pub(crate) lfu_decay_time: u32,
}

impl Scorer {
    fn score<V: Evictable>(&self, value: &V) -> u64 {
        if self.policy.is_lfu() {
            let counter = lfu::decr_and_return(value.lru(), self.lfu_minutes, self.lfu_decay_time);
            u8::MAX as u64 - counter as u64
        } else {
            lru::estimate_idle_ms(self.lru_clock, value.lru())
        }
    }

    /// The sooner the expire time, the higher the score.
    fn score_ttl(expire_at: i64) -> u64 {
        u64::MAX.wrapping_sub(expire_at as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::{EvictionPool, Scorer, EVPOOL_CACHED_KEY_SIZE, EVPOOL_SIZE};
    use crate::{
        evict::{lfu, MaxmemoryPolicy},
        keyspace::{Db, Object},
    };

    fn idles(pool: &EvictionPool) -> Vec<u64> {
        pool.iter().map(|c| c.idle).collect()
    }

    #[test]
    fn candidates_are_kept_sorted() {
        let mut pool = EvictionPool::new();
        for (i, idle) in [5, 1, 9, 3].into_iter().enumerate() {
            assert!(pool.insert(idle, format!("k{}", i).as_bytes(), 0));
        }
        assert_eq!(idles(&pool), vec![1, 3, 5, 9]);
        let keys: Vec<_> = pool.iter().map(|c| c.key.to_vec()).collect();
        assert_eq!(keys, vec![b"k1".to_vec(), b"k3".to_vec(), b"k0".to_vec(), b"k2".to_vec()]);
    }

    #[test]
    fn a_full_pool_keeps_the_worst_candidates() {
        let mut pool = EvictionPool::new();
        for idle in 1..=40u64 {
            assert!(pool.insert(idle, &idle.to_be_bytes(), 0));
        }
        assert_eq!(pool.len(), EVPOOL_SIZE);
        assert_eq!(idles(&pool), (25..=40).collect::<Vec<_>>());

        // Better than everything in a full pool.
        assert!(!pool.insert(3, b"low", 0));
        // Lands in the middle and pushes out the best candidate.
        assert!(pool.insert(30, b"mid", 1));
        assert_eq!(pool.iter().next().map(|c| c.idle), Some(26));
        assert_eq!(pool.len(), EVPOOL_SIZE);
        let mid = pool.iter().find(|c| c.key == b"mid").unwrap();
        assert_eq!((mid.idle, mid.db), (30, 1));
        let sorted = idles(&pool);
        assert!(sorted.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn long_keys_are_stored_on_the_heap() {
        let mut pool = EvictionPool::new();
        let long = vec![b'x'; EVPOOL_CACHED_KEY_SIZE + 1];
        let short = vec![b'y'; EVPOOL_CACHED_KEY_SIZE];
        pool.insert(2, &long, 0);
        pool.insert(1, &short, 0);
        let keys: Vec<_> = pool.iter().map(|c| c.key.len()).collect();
        assert_eq!(keys, vec![EVPOOL_CACHED_KEY_SIZE, EVPOOL_CACHED_KEY_SIZE + 1]);
    }

    #[test]
    fn pick_worst_skips_ghosts() {
        let mut pool = EvictionPool::new();
        pool.insert(1, b"live-low", 0);
        pool.insert(2, b"live-high", 1);
        pool.insert(3, b"ghost", 0);

        let picked = pool.pick_worst(|db, key| (key != b"ghost").then(|| (db, key.to_vec())));
        assert_eq!(picked, Some((1, (1, b"live-high".to_vec()))));
        assert_eq!(idles(&pool), vec![1]);

        assert_eq!(pool.pick_worst(|_, _| None::<()>), None);
        assert!(pool.is_empty());
    }

    #[test]
    fn populate_scores_by_idle_time() {
        let mut db = Db::with_seed(0, 7);
        for i in 0..10u32 {
            db.insert(format!("key:{}", i).as_bytes(), Object::new(i, 100 + i))
                .unwrap();
        }
        let scorer = Scorer {
            policy: MaxmemoryPolicy::AllkeysLru,
            lru_clock: 200,
            lfu_minutes: 0,
            lfu_decay_time: 1,
        };

        let mut pool = EvictionPool::new();
        for _ in 0..20 {
            pool.populate(0, &mut db, 10, &scorer);
        }
        // key:0 was touched first and has been idle for 100 seconds.
        let worst = pool.iter().last().unwrap();
        assert_eq!(worst.key, b"key:0");
        assert_eq!(worst.idle, 100_000);
    }

    #[test]
    fn populate_volatile_policies_sample_keys_with_expire() {
        let mut db = Db::with_seed(0, 11);
        for i in 0..6u32 {
            let key = format!("key:{}", i);
            db.insert(key.as_bytes(), Object::new(i, lfu::pack(0, i as u8 * 10)))
                .unwrap();
            if i % 2 == 0 {
                db.set_expire(key.as_bytes(), 1_000 * i as i64).unwrap();
            }
        }

        let mut scorer = Scorer {
            policy: MaxmemoryPolicy::VolatileLfu,
            lru_clock: 0,
            lfu_minutes: 0,
            lfu_decay_time: 1,
        };
        // Three keys have an expire time, so one round samples all of them.
        let mut pool = EvictionPool::new();
        pool.populate(0, &mut db, 5, &scorer);
        let keys: Vec<_> = pool.iter().map(|c| (c.idle, c.key.to_vec())).collect();
        assert_eq!(
            keys,
            vec![
                (255 - 40, b"key:4".to_vec()),
                (255 - 20, b"key:2".to_vec()),
                (255, b"key:0".to_vec()),
            ]
        );

        scorer.policy = MaxmemoryPolicy::VolatileTtl;
        pool.clear();
        pool.populate(0, &mut db, 5, &scorer);
        // The nearest expire time is the worst candidate.
        assert_eq!(pool.iter().last().map(|c| c.key), Some(&b"key:0"[..]));
    }
}
