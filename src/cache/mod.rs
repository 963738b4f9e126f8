//! Keyed storage with per-entry TTL.
//!
//! The [`Cache`] trait is the seam between the node and its storage; the
//! node only ever holds an `Arc<dyn Cache>`. [`MemoryCache`] is the
//! in-process implementation.

pub mod memory;

pub use self::memory::MemoryCache;

use crate::core::error::FilamentResult;
use bytes::Bytes;
use std::time::Duration;

/// Thread-safe keyed storage with scheduled expiry.
///
/// Keys and values are opaque byte sequences. All operations validate
/// their inputs: an empty key is rejected everywhere, and `set`
/// additionally rejects an empty value and a non-positive TTL.
pub trait Cache: Send + Sync {
    /// Install `key → value`, expiring after `ttl`. A prior entry under
    /// the same key is replaced atomically with respect to readers, and
    /// its pending expiry can no longer delete the new value.
    fn set(&self, key: Bytes, value: Bytes, ttl: Duration) -> FilamentResult<()>;

    /// The current value under `key`, or `KeyNotFound`.
    fn get(&self, key: &[u8]) -> FilamentResult<Bytes>;

    /// Remove the entry under `key` if present.
    ///
    /// Idempotent at this layer: deleting an absent key succeeds. The
    /// returned bool reports whether an entry was actually removed, so
    /// callers that need to surface not-found (the node does, at the
    /// wire boundary) can.
    fn delete(&self, key: &[u8]) -> FilamentResult<bool>;

    /// Whether an entry currently exists under `key`. No side effects.
    fn contains(&self, key: &[u8]) -> FilamentResult<bool>;
}
