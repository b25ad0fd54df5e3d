#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

//! The in-memory core of a key/value server.
//!
//! - [`Dict`](./struct.Dict.html) is a chained hash table that grows and
//!   shrinks by incremental rehashing: the buckets of the old table move to
//!   the new one a few at a time, piggybacking on lookups and updates, so no
//!   single operation pays for a full resize.
//! - [`evict`](./evict/index.html) keeps memory usage under a budget by
//!   deleting keys chosen by approximated LRU, LFU or TTL policies, sampling a
//!   handful of keys instead of tracking all of them.
//! - [`keyspace`](./keyspace/index.html) ties the two together with numbered
//!   databases holding a main dictionary and an expires dictionary.
//!
//! # Example
//!
//! ```rust
//! use kvcore::Dict;
//!
//! let mut dict = Dict::new();
//! for i in 0..100 {
//!     dict.add(i, i * i).unwrap();
//! }
//!
//! // Growing arms an incremental rehash that later operations advance. It
//! // can also be driven explicitly.
//! while dict.rehash(100) {}
//! assert!(!dict.is_rehashing());
//! assert_eq!(dict.fetch_value(&9), Some(&81));
//!
//! // A full scan visits every key at least once, even across resizes.
//! let mut seen = Vec::new();
//! let mut cursor = 0;
//! loop {
//!     cursor = dict.scan(cursor, |entry| seen.push(*entry.key()));
//!     if cursor == 0 {
//!         break;
//!     }
//! }
//! seen.sort_unstable();
//! seen.dedup();
//! assert_eq!(seen.len(), 100);
//! ```
//!
//! # Logging
//!
//! With the `logging` feature, enabled by default, the crate emits records
//! through the [`log`][log-crate] facade: rehash completion and allocation
//! failures of the dictionary, and the time limits, failures and evicted keys
//! of the eviction engine.
//!
//! [log-crate]: https://crates.io/crates/log

pub(crate) mod common;
mod dict;
pub mod evict;
pub mod keyspace;

pub use common::{
    error::{ConflictKind, DictError, ParsePolicyError},
    time::{Clock, Mock},
};
pub use dict::{
    Dict, DictBuilder, DictStats, Entry, Iter, ResizePolicy, SafeIter, TableStats,
    CHAIN_LENGTH_SLOTS, DEFAULT_FORCE_RESIZE_RATIO,
};
