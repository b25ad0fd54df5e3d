use crate::{evict::MemoryCounter, keyspace::Evictable};

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

#[derive(Debug, Default)]
pub(crate) struct Counters {
    value_created: AtomicU32,
    value_dropped: AtomicU32,
}

impl Counters {
    pub(crate) fn value_created(&self) -> u32 {
        self.value_created.load(Ordering::Acquire)
    }

    pub(crate) fn value_dropped(&self) -> u32 {
        self.value_dropped.load(Ordering::Acquire)
    }
}

/// A value that charges its size to a `MemoryCounter` while it is alive.
#[derive(Debug)]
pub(crate) struct Value {
    size: usize,
    lru: u32,
    free_effort: usize,
    memory: MemoryCounter,
    counters: Arc<Counters>,
}

impl Value {
    pub(crate) fn new(size: usize, memory: &MemoryCounter, counters: &Arc<Counters>) -> Self {
        memory.add(size);
        counters.value_created.fetch_add(1, Ordering::AcqRel);
        Self {
            size,
            lru: 0,
            free_effort: 1,
            memory: memory.clone(),
            counters: Arc::clone(counters),
        }
    }

    pub(crate) fn with_lru(mut self, lru: u32) -> Self {
        self.lru = lru;
        self
    }

    pub(crate) fn with_free_effort(mut self, effort: usize) -> Self {
        self.free_effort = effort;
        self
    }
}

impl Evictable for Value {
    fn lru(&self) -> u32 {
        self.lru
    }

    fn set_lru(&mut self, lru: u32) {
        self.lru = lru;
    }

    fn free_effort(&self) -> usize {
        self.free_effort
    }
}

impl Drop for Value {
    fn drop(&mut self) {
        self.memory.sub(self.size);
        self.counters.value_dropped.fetch_add(1, Ordering::AcqRel);
    }
}
