//! LRU clock arithmetic.
//!
//! Values store the time of their last access in a 24-bit field, as a
//! reduced-resolution clock that wraps around roughly every 194 days.

/// The largest value of the 24-bit LRU clock.
pub const LRU_CLOCK_MAX: u32 = (1 << 24) - 1;

/// The resolution of the LRU clock, in milliseconds.
pub const LRU_CLOCK_RESOLUTION: u64 = 1000;

pub(crate) fn lru_clock_at(unix_ms: u64) -> u32 {
    ((unix_ms / LRU_CLOCK_RESOLUTION) & LRU_CLOCK_MAX as u64) as u32
}

/// Returns the approximate time in milliseconds since `lru` was recorded,
/// given the current LRU clock `now`.
///
/// The clock is assumed to have wrapped at most once between the two readings.
pub fn estimate_idle_ms(now: u32, lru: u32) -> u64 {
    let now = (now & LRU_CLOCK_MAX) as u64;
    let lru = (lru & LRU_CLOCK_MAX) as u64;
    if now >= lru {
        (now - lru) * LRU_CLOCK_RESOLUTION
    } else {
        (now + (LRU_CLOCK_MAX as u64 - lru)) * LRU_CLOCK_RESOLUTION
    }
}
