use super::MaxmemoryPolicy;

use std::time::Duration;

pub(crate) const DEFAULT_SAMPLES: usize = 5;
pub(crate) const DEFAULT_TENACITY: u8 = 10;
pub(crate) const DEFAULT_LFU_LOG_FACTOR: u32 = 10;
pub(crate) const DEFAULT_LFU_DECAY_TIME: u32 = 1;

pub const MAX_TENACITY: u8 = 100;

/// The configuration of an [`Evictor`][evictor-struct].
///
/// Create one with [`EvictionConfig::builder`](#method.builder). `maxmemory`
/// and the policy can also be changed on a live evictor through
/// [`Evictor::config_mut`][config-mut].
///
/// [evictor-struct]: ./struct.Evictor.html
/// [config-mut]: ./struct.Evictor.html#method.config_mut
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvictionConfig {
    maxmemory: usize,
    policy: MaxmemoryPolicy,
    samples: usize,
    tenacity: u8,
    lfu_log_factor: u32,
    lfu_decay_time: u32,
    lazy_eviction: bool,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        EvictionConfigBuilder::default().build()
    }
}

impl EvictionConfig {
    pub fn builder() -> EvictionConfigBuilder {
        EvictionConfigBuilder::default()
    }

    /// The memory budget in bytes. Zero means unlimited.
    pub fn maxmemory(&self) -> usize {
        self.maxmemory
    }

    pub fn set_maxmemory(&mut self, bytes: usize) {
        self.maxmemory = bytes;
    }

    pub fn policy(&self) -> MaxmemoryPolicy {
        self.policy
    }

    /// Changes the policy. Values keep the LRU or LFU field they already
    /// carry, so switching between the two families takes a while to settle.
    pub fn set_policy(&mut self, policy: MaxmemoryPolicy) {
        self.policy = policy;
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn tenacity(&self) -> u8 {
        self.tenacity
    }

    pub fn lfu_log_factor(&self) -> u32 {
        self.lfu_log_factor
    }

    pub fn lfu_decay_time(&self) -> u32 {
        self.lfu_decay_time
    }

    pub fn lazy_eviction(&self) -> bool {
        self.lazy_eviction
    }

    /// Returns how long a single eviction cycle may run before it hands the
    /// rest of the work to a continuation, or `None` when it may run until
    /// done.
    pub fn time_limit(&self) -> Option<Duration> {
        time_limit(self.tenacity)
    }
}

/// Maps a tenacity to a time limit. Up to 10 the limit grows linearly by 50µs
/// per step, then by 15% per step, reaching about two minutes at 99. A tenacity
/// of 100 disables the limit.
pub(crate) fn time_limit(tenacity: u8) -> Option<Duration> {
    match tenacity {
        t if t <= 10 => Some(Duration::from_micros(50 * t as u64)),
        t if t < MAX_TENACITY => {
            let micros = 500.0 * 1.15f64.powi(t as i32 - 10);
            Some(Duration::from_micros(micros as u64))
        }
        _ => None,
    }
}

/// Builds an [`EvictionConfig`][config-struct].
///
/// [config-struct]: ./struct.EvictionConfig.html
///
/// # Examples
///
/// ```rust
/// use kvcore::evict::{EvictionConfig, MaxmemoryPolicy};
/// use std::time::Duration;
///
/// let config = EvictionConfig::builder()
///     .maxmemory(64 * 1024 * 1024)
///     .policy(MaxmemoryPolicy::AllkeysLru)
///     .tenacity(5)
///     .build();
///
/// assert_eq!(config.samples(), 5);
/// assert_eq!(config.time_limit(), Some(Duration::from_micros(250)));
/// ```
#[derive(Clone, Debug)]
pub struct EvictionConfigBuilder {
    maxmemory: usize,
    policy: MaxmemoryPolicy,
    samples: usize,
    tenacity: u8,
    lfu_log_factor: u32,
    lfu_decay_time: u32,
    lazy_eviction: bool,
}

impl Default for EvictionConfigBuilder {
    fn default() -> Self {
        Self {
            maxmemory: 0,
            policy: MaxmemoryPolicy::default(),
            samples: DEFAULT_SAMPLES,
            tenacity: DEFAULT_TENACITY,
            lfu_log_factor: DEFAULT_LFU_LOG_FACTOR,
            lfu_decay_time: DEFAULT_LFU_DECAY_TIME,
            lazy_eviction: false,
        }
    }
}

impl EvictionConfigBuilder {
    /// Sets the memory budget in bytes. Zero, the default, means unlimited.
    pub fn maxmemory(self, bytes: usize) -> Self {
        Self {
            maxmemory: bytes,
            ..self
        }
    }

    /// Sets the eviction policy. Defaults to `noeviction`.
    pub fn policy(self, policy: MaxmemoryPolicy) -> Self {
        Self { policy, ..self }
    }

    /// Sets how many keys are sampled from each database every time the
    /// eviction pool is refilled. Defaults to 5.
    ///
    /// # Panics
    ///
    /// `build` will panic if `samples` is zero.
    pub fn samples(self, samples: usize) -> Self {
        Self { samples, ..self }
    }

    /// Sets the eviction tenacity, from 0 to 100. Higher values let a cycle run
    /// longer before it yields. Defaults to 10.
    ///
    /// # Panics
    ///
    /// `build` will panic if `tenacity` is greater than 100.
    pub fn tenacity(self, tenacity: u8) -> Self {
        Self { tenacity, ..self }
    }

    /// Sets the LFU logarithmic factor. Defaults to 10.
    pub fn lfu_log_factor(self, factor: u32) -> Self {
        Self {
            lfu_log_factor: factor,
            ..self
        }
    }

    /// Sets the LFU decay period in minutes. Zero disables decay. Defaults
    /// to 1.
    pub fn lfu_decay_time(self, minutes: u32) -> Self {
        Self {
            lfu_decay_time: minutes,
            ..self
        }
    }

    /// Sets whether evicted values are freed on the deferred deletion worker.
    /// Defaults to `false`.
    pub fn lazy_eviction(self, lazy: bool) -> Self {
        Self {
            lazy_eviction: lazy,
            ..self
        }
    }

    /// Builds an `EvictionConfig`.
    ///
    /// # Panics
    ///
    /// Panics if `samples` is zero or `tenacity` is greater than 100.
    pub fn build(self) -> EvictionConfig {
        assert!(self.samples > 0, "samples must be greater than zero");
        assert!(
            self.tenacity <= MAX_TENACITY,
            "tenacity must be between 0 and {}",
            MAX_TENACITY
        );
        EvictionConfig {
            maxmemory: self.maxmemory,
            policy: self.policy,
            samples: self.samples,
            tenacity: self.tenacity,
            lfu_log_factor: self.lfu_log_factor,
            lfu_decay_time: self.lfu_decay_time,
            lazy_eviction: self.lazy_eviction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{time_limit, EvictionConfig};
    use crate::evict::MaxmemoryPolicy;

    use std::time::Duration;

    #[test]
    fn defaults() {
        let config = EvictionConfig::default();
        assert_eq!(config.maxmemory(), 0);
        assert_eq!(config.policy(), MaxmemoryPolicy::NoEviction);
        assert_eq!(config.samples(), 5);
        assert_eq!(config.tenacity(), 10);
        assert_eq!(config.lfu_log_factor(), 10);
        assert_eq!(config.lfu_decay_time(), 1);
        assert!(!config.lazy_eviction());
        assert_eq!(config.time_limit(), Some(Duration::from_micros(500)));
    }

    #[test]
    fn time_limit_curve() {
        assert_eq!(time_limit(0), Some(Duration::ZERO));
        assert_eq!(time_limit(1), Some(Duration::from_micros(50)));
        assert_eq!(time_limit(10), Some(Duration::from_micros(500)));
        let at_11 = time_limit(11).unwrap().as_micros();
        assert!((574..=575).contains(&at_11));
        let at_99 = time_limit(99).unwrap();
        assert!(at_99 > Duration::from_secs(100) && at_99 < Duration::from_secs(130));
        assert_eq!(time_limit(100), None);

        let mut previous = Duration::ZERO;
        for t in 1..100 {
            let limit = time_limit(t).unwrap();
            assert!(limit > previous);
            previous = limit;
        }
    }

    #[test]
    #[should_panic(expected = "tenacity must be between 0 and 100")]
    fn tenacity_out_of_range() {
        EvictionConfig::builder().tenacity(101).build();
    }

    #[test]
    #[should_panic(expected = "samples must be greater than zero")]
    fn zero_samples() {
        EvictionConfig::builder().samples(0).build();
    }
}
