//! The logarithmic frequency estimator used by the LFU policies.
//!
//! The 24-bit recency field of a value is split in two when an LFU policy is
//! active:
//!
//! ```text
//!       16 bits      8 bits
//! +----------------+--------+
//! | Last decr time | LOG_C  |
//! +----------------+--------+
//! ```
//!
//! `LOG_C` is a logarithmic access counter, and the last decrement time is a
//! 16-bit clock of minutes. The counter is decremented by one for every decay
//! period elapsed since that time, so keys that used to be hot eventually
//! become eviction candidates again.

use rand::Rng;

/// The counter value of a new key. Starting above zero gives new keys a chance
/// to collect some accesses before they are evicted.
pub const LFU_INIT_VAL: u8 = 5;

/// Packs a last decrement time and a counter into a 24-bit field.
pub fn pack(minutes: u16, counter: u8) -> u32 {
    ((minutes as u32) << 8) | counter as u32
}

/// Returns the field of a newly created value.
pub fn initial_field(now_minutes: u16) -> u32 {
    pack(now_minutes, LFU_INIT_VAL)
}

pub fn counter(field: u32) -> u8 {
    (field & 0xFF) as u8
}

pub fn last_decrement_time(field: u32) -> u16 {
    ((field >> 8) & 0xFFFF) as u16
}

/// Returns the number of minutes elapsed since `ldt`, treating the 16-bit
/// minute clock as having wrapped at most once.
pub fn time_elapsed(now_minutes: u16, ldt: u16) -> u64 {
    let (now, ldt) = (now_minutes as u64, ldt as u64);
    if now >= ldt {
        now - ldt
    } else {
        65535 - ldt + now
    }
}

/// Increments `counter` with a probability that shrinks as it grows:
/// `1 / ((counter - LFU_INIT_VAL) * log_factor + 1)`. Saturates at 255.
pub fn log_incr(counter: u8, log_factor: u32, rng: &mut impl Rng) -> u8 {
    if counter == u8::MAX {
        return u8::MAX;
    }
    let r: f64 = rng.gen();
    let baseval = (counter as f64 - LFU_INIT_VAL as f64).max(0.0);
    let p = 1.0 / (baseval * log_factor as f64 + 1.0);
    if r < p {
        counter + 1
    } else {
        counter
    }
}

/// Returns the counter of `field`, decremented by one for every `decay_time`
/// minutes elapsed since its last decrement time. The field itself is not
/// updated. A `decay_time` of zero disables decay.
pub fn decr_and_return(field: u32, now_minutes: u16, decay_time: u32) -> u8 {
    let counter = counter(field);
    if decay_time == 0 {
        return counter;
    }
    let periods = time_elapsed(now_minutes, last_decrement_time(field)) / decay_time as u64;
    if periods > counter as u64 {
        0
    } else {
        counter - periods as u8
    }
}

/// Applies an access to `field`: decays the counter, increments it
/// logarithmically, and stamps the current minute.
pub fn on_access(
    field: u32,
    now_minutes: u16,
    log_factor: u32,
    decay_time: u32,
    rng: &mut impl Rng,
) -> u32 {
    let counter = decr_and_return(field, now_minutes, decay_time);
    pack(now_minutes, log_incr(counter, log_factor, rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::SmallRng, SeedableRng};

    #[test]
    fn new_keys_start_at_init_val() {
        let field = initial_field(1234);
        assert_eq!(counter(field), LFU_INIT_VAL);
        assert_eq!(last_decrement_time(field), 1234);
    }

    #[test]
    fn counters_below_init_val_always_increment() {
        let mut rng = SmallRng::seed_from_u64(1);
        for c in 0..=LFU_INIT_VAL {
            assert_eq!(log_incr(c, 10, &mut rng), c + 1);
        }
        assert_eq!(log_incr(255, 10, &mut rng), 255);
    }

    #[test]
    fn high_counters_grow_slowly() {
        let mut rng = SmallRng::seed_from_u64(2);
        let mut c = LFU_INIT_VAL;
        for _ in 0..1000 {
            c = log_incr(c, 10, &mut rng);
        }
        // With a log factor of 10, a thousand hits land far below saturation.
        assert!(c > 10 && c < 100, "counter = {}", c);
    }

    #[test]
    fn decay_subtracts_elapsed_periods() {
        let field = pack(100, 20);
        assert_eq!(decr_and_return(field, 100, 1), 20);
        assert_eq!(decr_and_return(field, 105, 1), 15);
        assert_eq!(decr_and_return(field, 110, 2), 15);
        assert_eq!(decr_and_return(field, 200, 1), 0);
        assert_eq!(decr_and_return(field, 200, 0), 20);
    }

    #[test]
    fn elapsed_minutes_wrap_once() {
        assert_eq!(time_elapsed(10, 5), 5);
        assert_eq!(time_elapsed(3, 65530), 8);
    }

    #[test]
    fn access_stamps_the_current_minute() {
        let mut rng = SmallRng::seed_from_u64(3);
        let field = on_access(pack(10, 3), 12, 10, 1, &mut rng);
        assert_eq!(last_decrement_time(field), 12);
        // 3 decays to 1 after two minutes, then always increments.
        assert_eq!(counter(field), 2);
    }
}
