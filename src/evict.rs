//! Approximate eviction of keys under a memory budget.
//!
//! An [`Evictor`](./struct.Evictor.html) keeps memory usage under
//! `maxmemory` by deleting keys chosen according to a
//! [`MaxmemoryPolicy`](./enum.MaxmemoryPolicy.html). The LRU, LFU and TTL
//! policies do not track every key; they sample a few keys from each database
//! and keep the best candidates found so far in an
//! [`EvictionPool`](./struct.EvictionPool.html).
//!
//! Each call of [`Evictor::perform_evictions`][perform] is bounded by a time
//! limit derived from the configured tenacity. When the limit is hit before
//! enough memory was released, the evictor asks the caller's timer to run
//! [`Evictor::eviction_time_proc`][time-proc] as soon as possible, and
//! reports [`EvictOutcome::Running`](./enum.EvictOutcome.html#variant.Running)
//! until the backlog is cleared.
//!
//! [perform]: ./struct.Evictor.html#method.perform_evictions
//! [time-proc]: ./struct.Evictor.html#method.eviction_time_proc

mod config;
mod controller;
pub mod lfu;
pub mod lru;
mod memory;
mod policy;
mod pool;
mod stats;

pub use crate::common::concurrent::{LazyFree, LazyFreeJob, LazyFreeWorker};
pub use config::{EvictionConfig, EvictionConfigBuilder, MAX_TENACITY};
pub use controller::Evictor;
pub use lru::{LRU_CLOCK_MAX, LRU_CLOCK_RESOLUTION};
pub use memory::{over_maxmemory_after_alloc, MemoryCounter, MemoryGauge, MemoryState};
pub use policy::MaxmemoryPolicy;
pub use pool::{Candidate, EvictionPool, EVPOOL_CACHED_KEY_SIZE, EVPOOL_SIZE};
pub use stats::EvictionStats;

use std::time::Duration;

/// Values whose free effort exceeds this are freed on the deferred deletion
/// worker under lazy eviction.
pub const LAZYFREE_THRESHOLD: usize = 64;

/// The outcome of an eviction cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EvictOutcome {
    /// Memory is within the budget, or eviction is not possible right now.
    Ok,
    /// Memory is still over the budget, and a continuation is scheduled to
    /// keep evicting.
    Running,
    /// Memory is over the budget and there is nothing left to evict, or the
    /// policy forbids eviction.
    Fail,
}

/// Runs the eviction continuation after a delay.
pub trait TimerScheduler {
    /// Asks for [`Evictor::eviction_time_proc`][time-proc] to be called once,
    /// no sooner than `delay` from now.
    ///
    /// [time-proc]: ./struct.Evictor.html#method.eviction_time_proc
    fn schedule_once(&mut self, delay: Duration);
}

impl<F: FnMut(Duration)> TimerScheduler for F {
    fn schedule_once(&mut self, delay: Duration) {
        self(delay)
    }
}

/// Receives a record of every evicted key, for replicas and append-only logs.
pub trait Propagator {
    fn propagate_deletion(&mut self, db: usize, key: &[u8], lazy: bool);
}

impl<F: FnMut(usize, &[u8], bool)> Propagator for F {
    fn propagate_deletion(&mut self, db: usize, key: &[u8], lazy: bool) {
        self(db, key, lazy)
    }
}

/// Server states in which eviction must not run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EvictionGate {
    /// A long running script or command is yielding to the event loop.
    pub yielding_long_command: bool,
    /// A dataset is being loaded.
    pub loading: bool,
    /// This is a replica told to ignore `maxmemory`.
    pub replica_ignoring_maxmemory: bool,
    /// Clients are paused, so the dataset must not change.
    pub clients_paused: bool,
}

impl EvictionGate {
    pub fn is_safe(&self) -> bool {
        !(self.yielding_long_command
            || self.loading
            || self.replica_ignoring_maxmemory
            || self.clients_paused)
    }
}

/// The collaborators an eviction cycle works with.
///
/// Only the memory gauge is required. Without a deferred deletion sink every
/// value is freed synchronously, and without a timer or propagator the
/// corresponding requests are dropped.
pub struct EvictionEnv<'a> {
    pub(crate) memory: &'a dyn MemoryGauge,
    pub(crate) lazyfree: Option<&'a dyn LazyFree>,
    pub(crate) timers: Option<&'a mut dyn TimerScheduler>,
    pub(crate) propagator: Option<&'a mut dyn Propagator>,
    pub(crate) gate: EvictionGate,
}

impl<'a> EvictionEnv<'a> {
    pub fn new(memory: &'a dyn MemoryGauge) -> Self {
        Self {
            memory,
            lazyfree: None,
            timers: None,
            propagator: None,
            gate: EvictionGate::default(),
        }
    }

    pub fn lazyfree(self, sink: &'a dyn LazyFree) -> Self {
        Self {
            lazyfree: Some(sink),
            ..self
        }
    }

    pub fn timers(self, timers: &'a mut dyn TimerScheduler) -> Self {
        Self {
            timers: Some(timers),
            ..self
        }
    }

    pub fn propagator(self, propagator: &'a mut dyn Propagator) -> Self {
        Self {
            propagator: Some(propagator),
            ..self
        }
    }

    pub fn gate(self, gate: EvictionGate) -> Self {
        Self { gate, ..self }
    }
}

#[cfg(test)]
mod tests {
    use super::EvictionGate;

    #[test]
    fn any_flag_makes_eviction_unsafe() {
        assert!(EvictionGate::default().is_safe());
        let flags = [
            EvictionGate {
                yielding_long_command: true,
                ..Default::default()
            },
            EvictionGate {
                loading: true,
                ..Default::default()
            },
            EvictionGate {
                replica_ignoring_maxmemory: true,
                ..Default::default()
            },
            EvictionGate {
                clients_paused: true,
                ..Default::default()
            },
        ];
        assert!(flags.iter().all(|gate| !gate.is_safe()));
    }
}
