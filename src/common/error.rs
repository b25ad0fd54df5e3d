/// The error type for the structural and logical operations of a
/// [`Dict`][dict-struct].
///
/// Logical outcomes such as a missing key are ordinary values of this type. Only
/// [`AllocationFailure`](#variant.AllocationFailure) reports a resource problem,
/// and it is only produced by the fallible [`Dict::try_expand`][try-expand]
/// method; the infallible methods abort on allocation failure like any other
/// collection in `std`.
///
/// [dict-struct]: ./struct.Dict.html
/// [try-expand]: ./struct.Dict.html#method.try_expand
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DictError {
    /// The bucket array for the requested size could not be allocated.
    #[error("failed to allocate a bucket array of {buckets} buckets")]
    AllocationFailure {
        /// The number of buckets of the array that failed to allocate.
        buckets: usize,
    },

    /// The requested resize conflicts with the current shape of the dictionary.
    /// The dictionary is left untouched.
    #[error("cannot resize the dictionary: {0}")]
    StructuralConflict(ConflictKind),

    /// The key is already present.
    #[error("the key already exists")]
    KeyExists,

    /// The key is not present.
    #[error("the key was not found")]
    KeyNotFound,
}

/// Describes why a resize request was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// An incremental rehash is already in progress.
    Rehashing,
    /// The requested size is smaller than the number of stored elements.
    BelowElementCount,
    /// The requested size maps to the size the main table already has.
    Unchanged,
    /// The requested size cannot be represented.
    Overflow,
    /// Resizing is not enabled by the resize policy of the dictionary.
    ResizeDisabled,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            Self::Rehashing => "a rehash is already in progress",
            Self::BelowElementCount => "the target size is below the element count",
            Self::Unchanged => "the target size equals the current size",
            Self::Overflow => "the target size overflows",
            Self::ResizeDisabled => "resizing is disabled by the resize policy",
        };
        f.write_str(reason)
    }
}

/// The error type returned when parsing a [`MaxmemoryPolicy`][policy] from a
/// string fails.
///
/// [policy]: ./evict/enum.MaxmemoryPolicy.html
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown maxmemory policy `{0}`")]
pub struct ParsePolicyError(pub(crate) String);
