use super::{
    lfu,
    memory::{self, MemoryGauge, MemoryState},
    pool::Scorer,
    stats::StatsCounter,
    EvictOutcome, EvictionConfig, EvictionEnv, EvictionPool, EvictionStats, LazyFree,
    MaxmemoryPolicy, LAZYFREE_THRESHOLD,
};
use crate::{
    common::time::{Clock, Instant},
    keyspace::{Db, Evictable, Key},
};

use rand::{rngs::SmallRng, SeedableRng};
use std::{sync::Arc, thread, time::Duration};

/// The number of deletions between two checks of the time limit.
const CHECK_INTERVAL: u64 = 16;

/// The longest single sleep while waiting for deferred deletions.
const LAZYFREE_POLL_INTERVAL: Duration = Duration::from_micros(1000);

/// Enforces a memory budget over a set of databases.
///
/// An `Evictor` owns the eviction pool, the eviction statistics and the
/// configuration. The databases and the collaborators are passed to every
/// call, so one evictor can serve a keyspace that is owned elsewhere.
///
/// # Examples
///
/// ```rust
/// use kvcore::{
///     evict::{EvictOutcome, EvictionConfig, EvictionEnv, Evictor, MaxmemoryPolicy, MemoryCounter},
///     keyspace::{Db, Object},
///     Clock,
/// };
///
/// let memory = MemoryCounter::new();
/// let config = EvictionConfig::builder()
///     .maxmemory(1_000)
///     .policy(MaxmemoryPolicy::AllkeysLru)
///     .build();
/// let mut evictor = Evictor::new(config, Clock::new());
///
/// let mut dbs = vec![Db::new(0)];
/// for i in 0..20 {
///     let key = format!("key:{}", i);
///     dbs[0].insert(key.as_bytes(), Object::new(i, evictor.initial_lru())).unwrap();
/// }
///
/// // Within the budget, nothing happens.
/// memory.add(900);
/// let mut env = EvictionEnv::new(&memory);
/// assert_eq!(evictor.perform_evictions(&mut dbs, &mut env), EvictOutcome::Ok);
/// assert_eq!(dbs[0].len(), 20);
/// ```
pub struct Evictor {
    config: EvictionConfig,
    pool: EvictionPool,
    clock: Clock,
    rng: SmallRng,
    next_db: usize,
    proc_running: bool,
    stats: StatsCounter,
}

impl std::fmt::Debug for Evictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evictor")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .field("next_db", &self.next_db)
            .field("proc_running", &self.proc_running)
            .finish()
    }
}

impl Evictor {
    pub fn new(config: EvictionConfig, clock: Clock) -> Self {
        Self::with_rng(config, clock, SmallRng::from_entropy())
    }

    /// Creates an evictor whose LFU counter increments are deterministic.
    pub fn with_seed(config: EvictionConfig, clock: Clock, seed: u64) -> Self {
        Self::with_rng(config, clock, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(config: EvictionConfig, clock: Clock, rng: SmallRng) -> Self {
        Self {
            config,
            pool: EvictionPool::new(),
            clock,
            rng,
            next_db: 0,
            proc_running: false,
            stats: StatsCounter::default(),
        }
    }

    pub fn config(&self) -> &EvictionConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut EvictionConfig {
        &mut self.config
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn pool(&self) -> &EvictionPool {
        &self.pool
    }

    pub fn stats(&self) -> EvictionStats {
        self.stats.snapshot(self.clock.now())
    }

    /// Returns `true` while a continuation is scheduled or running.
    pub fn is_time_proc_running(&self) -> bool {
        self.proc_running
    }

    /// Returns the recency or frequency field a new value should start with
    /// under the current policy.
    pub fn initial_lru(&self) -> u32 {
        if self.config.policy().is_lfu() {
            lfu::initial_field(self.clock.lfu_minutes())
        } else {
            self.clock.lru_clock()
        }
    }

    /// Records an access to `value`: stamps the LRU clock, or decays and
    /// increments the LFU counter.
    pub fn touch<E: Evictable + ?Sized>(&mut self, value: &mut E) {
        let field = if self.config.policy().is_lfu() {
            lfu::on_access(
                value.lru(),
                self.clock.lfu_minutes(),
                self.config.lfu_log_factor(),
                self.config.lfu_decay_time(),
                &mut self.rng,
            )
        } else {
            self.clock.lru_clock()
        };
        value.set_lru(field);
    }

    /// Returns the LFU counter of `value` with decay applied, without updating
    /// it.
    pub fn lfu_counter<E: Evictable + ?Sized>(&self, value: &E) -> u8 {
        lfu::decr_and_return(
            value.lru(),
            self.clock.lfu_minutes(),
            self.config.lfu_decay_time(),
        )
    }

    pub fn memory_state(&self, gauge: &dyn MemoryGauge) -> MemoryState {
        MemoryState::measure(gauge, self.config.maxmemory())
    }

    /// Returns `true` if allocating `more` bytes would exceed the budget.
    pub fn over_maxmemory_after_alloc(&self, gauge: &dyn MemoryGauge, more: usize) -> bool {
        memory::over_maxmemory_after_alloc(gauge, self.config.maxmemory(), more)
    }

    /// Evicts keys from `dbs` until memory usage is within the budget, the
    /// time limit is hit, or there is nothing left to evict.
    ///
    /// Returns [`EvictOutcome::Ok`] without doing anything when the
    /// [gate](./struct.EvictionGate.html) of `env` reports an unsafe state.
    pub fn perform_evictions<V>(&mut self, dbs: &mut [Db<V>], env: &mut EvictionEnv<'_>) -> EvictOutcome
    where
        V: Evictable + Send + 'static,
    {
        if !env.gate.is_safe() {
            return EvictOutcome::Ok;
        }

        let state = self.memory_state(env.memory);
        let outcome = if !state.is_over_limit() {
            EvictOutcome::Ok
        } else if self.config.policy() == MaxmemoryPolicy::NoEviction {
            EvictOutcome::Fail
        } else {
            self.evict(dbs, env, state.to_free)
        };

        if outcome == EvictOutcome::Fail {
            #[cfg(feature = "logging")]
            log::debug!(
                "Could not free {} bytes with policy {}",
                state.to_free,
                self.config.policy()
            );
        }
        self.stats.record_outcome(outcome, self.clock.now());
        outcome
    }

    /// Runs one continuation of an eviction that hit its time limit.
    ///
    /// Returns `Some(Duration::ZERO)` if the continuation should run again
    /// right away, or `None` once memory is within the budget or nothing is
    /// left to evict.
    pub fn eviction_time_proc<V>(
        &mut self,
        dbs: &mut [Db<V>],
        env: &mut EvictionEnv<'_>,
    ) -> Option<Duration>
    where
        V: Evictable + Send + 'static,
    {
        if self.perform_evictions(dbs, env) == EvictOutcome::Running {
            return Some(Duration::ZERO);
        }
        self.proc_running = false;
        None
    }

    fn evict<V>(&mut self, dbs: &mut [Db<V>], env: &mut EvictionEnv<'_>, to_free: usize) -> EvictOutcome
    where
        V: Evictable + Send + 'static,
    {
        let time_limit = self.config.time_limit();
        let lazy = self.config.lazy_eviction();
        let start = self.clock.now();
        let to_free = to_free as i64;
        // Negative when a deletion ends up allocating.
        let mut mem_freed: i64 = 0;
        let mut keys_freed: u64 = 0;

        while mem_freed < to_free {
            let Some((index, key)) = self.select_victim(dbs) else {
                return self.wait_for_lazy_free(env, start, time_limit);
            };
            let db = &mut dbs[index];

            let before = env.memory.used_memory() as i64;
            delete_key(db, &key, lazy, env.lazyfree);
            mem_freed += before - env.memory.used_memory() as i64;
            self.stats.record_eviction();

            #[cfg(feature = "logging")]
            log::trace!(
                "Evicted key {:?} from db {}",
                String::from_utf8_lossy(&key),
                db.id()
            );

            if let Some(propagator) = env.propagator.as_deref_mut() {
                propagator.propagate_deletion(db.id(), &key, lazy);
            }
            keys_freed += 1;

            if keys_freed % CHECK_INTERVAL == 0 {
                // Deferred deletions release memory in the background, so the
                // local tally lags behind.
                if lazy && memory::is_within_limit(env.memory, self.config.maxmemory()) {
                    break;
                }
                if self.is_past(start, time_limit) {
                    self.start_time_proc(env, keys_freed);
                    break;
                }
            }
        }

        if self.proc_running {
            EvictOutcome::Running
        } else {
            EvictOutcome::Ok
        }
    }

    /// Returns the database index and the key of the next key to evict.
    fn select_victim<V: Evictable>(&mut self, dbs: &mut [Db<V>]) -> Option<(usize, Key)> {
        let policy = self.config.policy();
        let allkeys = policy.is_allkeys();

        if policy.uses_pool() {
            loop {
                let scorer = Scorer {
                    policy,
                    lru_clock: self.clock.lru_clock(),
                    lfu_minutes: self.clock.lfu_minutes(),
                    lfu_decay_time: self.config.lfu_decay_time(),
                };
                let mut total_keys = 0;
                for (index, db) in dbs.iter_mut().enumerate() {
                    let keys = if allkeys {
                        db.dict.len()
                    } else {
                        db.expires.len()
                    };
                    if keys > 0 {
                        self.pool
                            .populate(index, db, self.config.samples(), &scorer);
                        total_keys += keys;
                    }
                }
                if total_keys == 0 {
                    return None;
                }

                let found = self.pool.pick_worst(|index, key| {
                    let db = dbs.get_mut(index)?;
                    if allkeys {
                        db.dict.find(key).map(|e| Arc::clone(e.key()))
                    } else {
                        db.expires.find(key).map(|e| Arc::clone(e.key()))
                    }
                });
                if found.is_some() {
                    return found;
                }
            }
        }

        // Random policies visit the databases in turn, one key per call.
        let db_count = dbs.len();
        for _ in 0..db_count {
            self.next_db = (self.next_db + 1) % db_count;
            let index = self.next_db;
            let db = &mut dbs[index];
            let key = if allkeys {
                db.dict.random_key().map(|e| Arc::clone(e.key()))
            } else {
                db.expires.random_key().map(|e| Arc::clone(e.key()))
            };
            if let Some(key) = key {
                return Some((index, key));
            }
        }
        None
    }

    /// Gives pending deferred deletions a chance to bring memory back under
    /// the budget once there is nothing left to evict.
    fn wait_for_lazy_free(
        &self,
        env: &EvictionEnv<'_>,
        start: Instant,
        time_limit: Option<Duration>,
    ) -> EvictOutcome {
        let lazyfree = match env.lazyfree {
            Some(lazyfree) => lazyfree,
            None => return EvictOutcome::Fail,
        };
        while lazyfree.pending_jobs() > 0
            && time_limit.map_or(true, |limit| self.clock.elapsed_since(start) < limit)
        {
            if memory::is_within_limit(env.memory, self.config.maxmemory()) {
                return EvictOutcome::Ok;
            }
            thread::sleep(time_limit.map_or(LAZYFREE_POLL_INTERVAL, |limit| {
                limit.min(LAZYFREE_POLL_INTERVAL)
            }));
        }
        EvictOutcome::Fail
    }

    fn is_past(&self, start: Instant, time_limit: Option<Duration>) -> bool {
        time_limit.map_or(false, |limit| self.clock.elapsed_since(start) > limit)
    }

    fn start_time_proc(&mut self, env: &mut EvictionEnv<'_>, _keys_freed: u64) {
        if self.proc_running {
            return;
        }
        self.proc_running = true;
        if let Some(timers) = env.timers.as_deref_mut() {
            timers.schedule_once(Duration::ZERO);
        }

        #[cfg(feature = "logging")]
        log::debug!(
            "Eviction hit its time limit after {} keys; continuing in the background",
            _keys_freed
        );
    }
}

/// Removes `key` from `db`. The value is dropped on the deferred deletion
/// worker if `lazy` is set and it is expensive enough to free.
fn delete_key<V>(db: &mut Db<V>, key: &[u8], lazy: bool, lazyfree: Option<&dyn LazyFree>) -> bool
where
    V: Evictable + Send + 'static,
{
    let value = match db.unlink(key) {
        Some(value) => value,
        None => return false,
    };
    match lazyfree {
        Some(sink) if lazy && value.free_effort() > LAZYFREE_THRESHOLD => {
            sink.submit(Box::new(move || drop(value)));
        }
        _ => drop(value),
    }
    true
}
