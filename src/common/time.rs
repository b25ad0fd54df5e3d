use std::{
    fmt,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use crate::evict::lru;

pub(crate) type Instant = quanta::Instant;

/// The controllable source of time handed out by [`Clock::mock`].
///
/// [`Clock::mock`]: ./struct.Clock.html#method.mock
pub use quanta::Mock;

/// The source of time shared by the dictionary and the eviction engine.
///
/// A `Clock` measures monotonic time with [`quanta`][quanta-crate] and derives
/// the two reduced-resolution clocks stored inside values from it:
///
/// - the LRU clock, a 24-bit counter of seconds that wraps at
///   [`LRU_CLOCK_MAX`][lru-max];
/// - the LFU clock, a 16-bit counter of minutes used as the "last decrement
///   time" of frequency counters.
///
/// Both are computed from a wall-clock origin captured at construction plus the
/// monotonic time elapsed since then, so a mocked clock drives them too.
///
/// [quanta-crate]: https://crates.io/crates/quanta
/// [lru-max]: ./evict/constant.LRU_CLOCK_MAX.html
#[derive(Clone)]
pub struct Clock {
    inner: quanta::Clock,
    origin: Instant,
    unix_origin_ms: u64,
}

impl Default for Clock {
    fn default() -> Self {
        Self::from_quanta(quanta::Clock::new())
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clock")
            .field("unix_time_ms", &self.unix_time_ms())
            .finish()
    }
}

impl Clock {
    /// Creates a clock backed by the system time sources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a clock whose time only moves when the returned [`Mock`] is
    /// incremented.
    pub fn mock() -> (Clock, Arc<Mock>) {
        let (inner, mock) = quanta::Clock::mock();
        (Self::from_quanta(inner), mock)
    }

    /// Overrides the wall-clock time, in milliseconds since the Unix epoch, that
    /// this clock reports at the present instant.
    pub fn starting_at_unix_ms(mut self, unix_ms: u64) -> Self {
        self.origin = self.inner.now();
        self.unix_origin_ms = unix_ms;
        self
    }

    fn from_quanta(inner: quanta::Clock) -> Self {
        let origin = inner.now();
        let unix_origin_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self {
            inner,
            origin,
            unix_origin_ms,
        }
    }

    pub(crate) fn now(&self) -> Instant {
        self.inner.now()
    }

    pub(crate) fn elapsed_since(&self, earlier: Instant) -> Duration {
        self.now().saturating_duration_since(earlier)
    }

    /// Returns the wall-clock time in milliseconds since the Unix epoch.
    pub fn unix_time_ms(&self) -> u64 {
        let elapsed = self.elapsed_since(self.origin);
        self.unix_origin_ms
            .saturating_add(elapsed.as_millis().try_into().unwrap_or(u64::MAX))
    }

    /// Returns the current LRU clock: seconds at
    /// [`LRU_CLOCK_RESOLUTION`][resolution] granularity, truncated to 24 bits.
    ///
    /// [resolution]: ./evict/constant.LRU_CLOCK_RESOLUTION.html
    pub fn lru_clock(&self) -> u32 {
        lru::lru_clock_at(self.unix_time_ms())
    }

    /// Returns the current time in minutes truncated to 16 bits, the unit of
    /// the "last decrement time" half of an LFU field.
    pub fn lfu_minutes(&self) -> u16 {
        ((self.unix_time_ms() / 1000 / 60) & 0xFFFF) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::Clock;
    use std::time::Duration;

    #[test]
    fn mocked_clock_drives_derived_clocks() {
        let (clock, mock) = Clock::mock();
        let clock = clock.starting_at_unix_ms(3_600_000);
        assert_eq!(clock.unix_time_ms(), 3_600_000);
        assert_eq!(clock.lru_clock(), 3_600);
        assert_eq!(clock.lfu_minutes(), 60);

        mock.increment(Duration::from_secs(90));
        assert_eq!(clock.unix_time_ms(), 3_690_000);
        assert_eq!(clock.lru_clock(), 3_690);
        assert_eq!(clock.lfu_minutes(), 61);
    }

    #[test]
    fn lfu_minutes_wrap_at_16_bits() {
        let (clock, _mock) = Clock::mock();
        let clock = clock.starting_at_unix_ms(65_536 * 60 * 1000 + 5 * 60 * 1000);
        assert_eq!(clock.lfu_minutes(), 5);
    }
}
