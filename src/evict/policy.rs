use crate::common::error::ParsePolicyError;

use std::{fmt, str::FromStr};

/// The policy the eviction engine follows once memory usage exceeds the
/// configured `maxmemory`.
///
/// `Volatile*` policies only consider keys with an expire time set, `Allkeys*`
/// policies consider every key.
///
/// # Examples
///
/// ```rust
/// use kvcore::evict::MaxmemoryPolicy;
///
/// let policy: MaxmemoryPolicy = "allkeys-lfu".parse().unwrap();
/// assert_eq!(policy, MaxmemoryPolicy::AllkeysLfu);
/// assert!(policy.is_lfu() && policy.is_allkeys());
/// assert_eq!(policy.to_string(), "allkeys-lfu");
///
/// assert!("allkeys-mru".parse::<MaxmemoryPolicy>().is_err());
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MaxmemoryPolicy {
    /// Evict the approximately least recently used key among those with an
    /// expire time.
    VolatileLru,
    /// Evict the approximately least frequently used key among those with an
    /// expire time.
    VolatileLfu,
    /// Evict the key with the nearest expire time.
    VolatileTtl,
    /// Evict a random key among those with an expire time.
    VolatileRandom,
    /// Evict the approximately least recently used key.
    AllkeysLru,
    /// Evict the approximately least frequently used key.
    AllkeysLfu,
    /// Evict a random key.
    AllkeysRandom,
    /// Never evict. Writes that need memory fail instead.
    #[default]
    NoEviction,
}

impl MaxmemoryPolicy {
    pub const ALL: [MaxmemoryPolicy; 8] = [
        Self::VolatileLru,
        Self::VolatileLfu,
        Self::VolatileTtl,
        Self::VolatileRandom,
        Self::AllkeysLru,
        Self::AllkeysLfu,
        Self::AllkeysRandom,
        Self::NoEviction,
    ];

    pub fn is_lru(self) -> bool {
        matches!(self, Self::VolatileLru | Self::AllkeysLru)
    }

    /// Returns `true` if values carry an LFU field instead of an LRU clock.
    pub fn is_lfu(self) -> bool {
        matches!(self, Self::VolatileLfu | Self::AllkeysLfu)
    }

    pub fn is_allkeys(self) -> bool {
        matches!(
            self,
            Self::AllkeysLru | Self::AllkeysLfu | Self::AllkeysRandom
        )
    }

    pub fn is_random(self) -> bool {
        matches!(self, Self::VolatileRandom | Self::AllkeysRandom)
    }

    /// Returns `true` if victims are chosen through the eviction pool.
    pub(crate) fn uses_pool(self) -> bool {
        self.is_lru() || self.is_lfu() || self == Self::VolatileTtl
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::VolatileLru => "volatile-lru",
            Self::VolatileLfu => "volatile-lfu",
            Self::VolatileTtl => "volatile-ttl",
            Self::VolatileRandom => "volatile-random",
            Self::AllkeysLru => "allkeys-lru",
            Self::AllkeysLfu => "allkeys-lfu",
            Self::AllkeysRandom => "allkeys-random",
            Self::NoEviction => "noeviction",
        }
    }
}

impl fmt::Display for MaxmemoryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MaxmemoryPolicy {
    type Err = ParsePolicyError;

    /// Parses a policy name. Names are case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParsePolicyError(s.to_string()))
    }
}
