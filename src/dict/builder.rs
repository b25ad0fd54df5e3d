use super::{Dict, ExpandAllowed, ResizePolicy, DEFAULT_FORCE_RESIZE_RATIO};

use rand::{rngs::SmallRng, SeedableRng};
use std::{
    collections::hash_map::RandomState,
    hash::{BuildHasher, Hash},
    marker::PhantomData,
};

/// Builds a [`Dict`][dict-struct] with various configuration knobs.
///
/// These knobs play the role of a type descriptor: they are fixed per
/// dictionary instance and do not change once it is built.
///
/// [dict-struct]: ./struct.Dict.html
///
/// # Examples
///
/// ```rust
/// use kvcore::{Dict, ResizePolicy};
///
/// let mut dict: Dict<String, u64> = Dict::builder()
///     // Allocate 1,024 buckets up front.
///     .initial_capacity(1_000)
///     // Reserve 8 bytes of metadata in every entry.
///     .metadata_bytes(8)
///     // Only grow past the forced resize ratio.
///     .resize_policy(ResizePolicy::Avoid)
///     .build();
///
/// dict.add("a".to_string(), 1).unwrap().metadata_mut()[0] = 0xFF;
/// assert_eq!(dict.get("a").map(|e| e.metadata()[0]), Some(0xFF));
/// ```
///
pub struct DictBuilder<C> {
    initial_capacity: Option<usize>,
    resize_policy: ResizePolicy,
    force_resize_ratio: usize,
    metadata_bytes: usize,
    expand_allowed: Option<ExpandAllowed>,
    seed: Option<u64>,
    dict_type: PhantomData<C>,
}

impl<K, V> Default for DictBuilder<Dict<K, V, RandomState>>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            initial_capacity: None,
            resize_policy: ResizePolicy::default(),
            force_resize_ratio: DEFAULT_FORCE_RESIZE_RATIO,
            metadata_bytes: 0,
            expand_allowed: None,
            seed: None,
            dict_type: PhantomData::default(),
        }
    }
}

impl<K, V> DictBuilder<Dict<K, V, RandomState>>
where
    K: Eq + Hash,
{
    /// Construct a new `DictBuilder` with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a `Dict<K, V>`.
    ///
    /// # Panics
    ///
    /// Panics if the forced resize ratio is zero, or if the initial capacity
    /// cannot be rounded up to a power of two.
    pub fn build(self) -> Dict<K, V, RandomState> {
        self.build_with_hasher(RandomState::default())
    }

    /// Builds a `Dict<K, V, S>`, with the given `hasher`.
    ///
    /// # Panics
    ///
    /// Panics if the forced resize ratio is zero, or if the initial capacity
    /// cannot be rounded up to a power of two.
    pub fn build_with_hasher<S>(self, hasher: S) -> Dict<K, V, S>
    where
        S: BuildHasher,
    {
        assert!(
            self.force_resize_ratio > 0,
            "force_resize_ratio must be greater than zero"
        );
        let rng = match self.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Dict::with_everything(
            self.initial_capacity,
            hasher,
            rng,
            self.resize_policy,
            self.force_resize_ratio,
            self.metadata_bytes,
            self.expand_allowed,
        )
    }
}

impl<C> DictBuilder<C> {
    /// Sets the initial capacity of the dictionary. The bucket array is
    /// allocated by `build` instead of by the first insertion.
    pub fn initial_capacity(self, capacity: usize) -> Self {
        Self {
            initial_capacity: Some(capacity),
            ..self
        }
    }

    /// Sets the resize policy. It can be changed later with
    /// [`Dict::set_resize_policy`](./struct.Dict.html#method.set_resize_policy).
    pub fn resize_policy(self, policy: ResizePolicy) -> Self {
        Self {
            resize_policy: policy,
            ..self
        }
    }

    /// Sets the load factor past which the dictionary grows and rehashes even
    /// when its resize policy is `Avoid`. Defaults to 5.
    ///
    /// # Panics
    ///
    /// `DictBuilder::build*` methods will panic if `ratio` is zero.
    pub fn force_resize_ratio(self, ratio: usize) -> Self {
        Self {
            force_resize_ratio: ratio,
            ..self
        }
    }

    /// Sets the size of the zero-initialized metadata region carried by every
    /// entry.
    pub fn metadata_bytes(self, bytes: usize) -> Self {
        Self {
            metadata_bytes: bytes,
            ..self
        }
    }

    /// Sets a predicate consulted before the dictionary grows.
    ///
    /// The predicate receives the number of bytes the new bucket array would
    /// take and the current load factor, and returns whether the expansion may
    /// proceed.
    pub fn expand_allowed(
        self,
        predicate: impl Fn(usize, f64) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            expand_allowed: Some(Box::new(predicate)),
            ..self
        }
    }

    /// Seeds the random number generator used by random key selection and
    /// sampling, making them deterministic.
    pub fn seed(self, seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..self
        }
    }
}
