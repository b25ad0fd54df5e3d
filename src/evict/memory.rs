use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// A source of memory usage figures.
pub trait MemoryGauge {
    /// Returns the number of bytes in use.
    fn used_memory(&self) -> usize;

    /// Returns the part of [`used_memory`](#tymethod.used_memory) that does
    /// not count toward the budget, such as replication buffers.
    fn not_counted_memory(&self) -> usize {
        0
    }
}

/// A shareable byte counter implementing [`MemoryGauge`].
///
/// Callers record allocations and releases explicitly. Clones share the same
/// counters, so a value can carry a clone and release its bytes when it is
/// dropped, including on the deferred deletion worker.
///
/// ```rust
/// use kvcore::evict::{MemoryCounter, MemoryGauge};
///
/// let counter = MemoryCounter::new();
/// let handle = counter.clone();
/// handle.add(1024);
/// counter.sub(24);
/// assert_eq!(counter.used_memory(), 1000);
/// ```
#[derive(Clone, Debug, Default)]
pub struct MemoryCounter {
    used: Arc<AtomicUsize>,
    not_counted: Arc<AtomicUsize>,
}

impl MemoryCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, bytes: usize) {
        self.used.fetch_add(bytes, Ordering::AcqRel);
    }

    /// Records a release of `bytes`, saturating at zero.
    pub fn sub(&self, bytes: usize) {
        let _ = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                Some(used.saturating_sub(bytes))
            });
    }

    pub fn set_not_counted(&self, bytes: usize) {
        self.not_counted.store(bytes, Ordering::Release);
    }
}

impl MemoryGauge for MemoryCounter {
    fn used_memory(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    fn not_counted_memory(&self) -> usize {
        self.not_counted.load(Ordering::Acquire)
    }
}

/// Memory usage measured against a budget.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MemoryState {
    /// The figure reported by the gauge.
    pub reported: usize,
    /// The figure counted toward the budget.
    pub used: usize,
    /// The number of bytes to release to get back under the budget.
    pub to_free: usize,
    /// `used / maxmemory`, or zero when there is no budget.
    pub level: f64,
}

impl MemoryState {
    /// Measures the current usage against `maxmemory`. A `maxmemory` of zero
    /// means unlimited.
    ///
    /// The not-counted part of the usage is left out of `used` and `level`.
    /// It is only looked at once the reported figure exceeds the budget, so a
    /// reported figure within the budget is never over the limit.
    pub fn measure(gauge: &dyn MemoryGauge, maxmemory: usize) -> Self {
        let reported = gauge.used_memory();
        let mut state = Self {
            reported,
            used: reported,
            to_free: 0,
            level: 0.0,
        };
        if maxmemory == 0 {
            return state;
        }
        state.used = reported.saturating_sub(gauge.not_counted_memory());
        state.level = state.used as f64 / maxmemory as f64;
        if reported > maxmemory {
            state.to_free = state.used.saturating_sub(maxmemory);
        }
        state
    }

    pub fn is_over_limit(&self) -> bool {
        self.to_free > 0
    }
}

/// Returns `true` if allocating `more` bytes would push the usage over
/// `maxmemory`.
pub fn over_maxmemory_after_alloc(gauge: &dyn MemoryGauge, maxmemory: usize, more: usize) -> bool {
    if maxmemory == 0 {
        return false;
    }
    let reported = gauge.used_memory();
    if reported.saturating_add(more) <= maxmemory {
        return false;
    }
    reported
        .saturating_sub(gauge.not_counted_memory())
        .saturating_add(more)
        > maxmemory
}

pub(crate) fn is_within_limit(gauge: &dyn MemoryGauge, maxmemory: usize) -> bool {
    !MemoryState::measure(gauge, maxmemory).is_over_limit()
}
