use super::EvictOutcome;
use crate::common::time::Instant;

use std::time::Duration;

/// A snapshot of the eviction statistics of an [`Evictor`][evictor-struct].
///
/// [evictor-struct]: ./struct.Evictor.html
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EvictionStats {
    evicted_keys: u64,
    total_exceeded_time: Duration,
    current_exceeded_time: Duration,
}

impl EvictionStats {
    /// The number of keys evicted so far.
    pub fn evicted_keys(&self) -> u64 {
        self.evicted_keys
    }

    /// The total time memory usage spent over the budget in completed
    /// episodes.
    pub fn total_exceeded_time(&self) -> Duration {
        self.total_exceeded_time
    }

    /// The time memory usage has been over the budget in the current episode,
    /// or zero if it is within the budget.
    pub fn current_exceeded_time(&self) -> Duration {
        self.current_exceeded_time
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounter {
    evicted_keys: u64,
    total_exceeded_time: Duration,
    exceeded_since: Option<Instant>,
}

impl StatsCounter {
    pub(crate) fn record_eviction(&mut self) {
        self.evicted_keys = self.evicted_keys.saturating_add(1);
    }

    /// Opens an over-budget episode when a cycle could not bring memory back
    /// under the budget, and closes it when one did.
    pub(crate) fn record_outcome(&mut self, outcome: EvictOutcome, now: Instant) {
        match outcome {
            EvictOutcome::Running | EvictOutcome::Fail => {
                if self.exceeded_since.is_none() {
                    self.exceeded_since = Some(now);
                }
            }
            EvictOutcome::Ok => {
                if let Some(since) = self.exceeded_since.take() {
                    self.total_exceeded_time += now.saturating_duration_since(since);
                }
            }
        }
    }

    pub(crate) fn snapshot(&self, now: Instant) -> EvictionStats {
        EvictionStats {
            evicted_keys: self.evicted_keys,
            total_exceeded_time: self.total_exceeded_time,
            current_exceeded_time: self
                .exceeded_since
                .map(|since| now.saturating_duration_since(since))
                .unwrap_or_default(),
        }
    }
}
