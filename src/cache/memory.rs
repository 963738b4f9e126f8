//! In-memory cache with a centralized expiry queue.
//!
//! The map is guarded by a reader-writer lock: gets proceed in parallel,
//! mutations and reaping take the write side. Expiry is driven by a
//! single reaper task over a min-heap of deadlines rather than one timer
//! per SET.
//!
//! # Stale-timer discipline
//!
//! Every entry carries a generation stamp, bumped on each SET. A heap
//! slot captures the generation it was scheduled for, and the reaper
//! removes a mapping only when the stamps still match. A SET that
//! replaces an entry therefore orphans the old slot: when it surfaces,
//! the generation comparison fails and the newer value survives. A
//! shorter replacement TTL takes effect through the fresh slot pushed by
//! the replacing SET.

use super::Cache;
use crate::core::error::{FilamentError, FilamentResult};
use bytes::Bytes;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// A stored value with its expiry metadata.
#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,
    generation: u64,
    deadline: Instant,
}

/// A scheduled expiry. Ordered by deadline, earliest first, so the
/// default max-heap behaves as a min-heap.
#[derive(Debug)]
struct ExpirySlot {
    deadline: Instant,
    generation: u64,
    key: Bytes,
}

impl PartialEq for ExpirySlot {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.generation == other.generation
    }
}

impl Eq for ExpirySlot {}

impl PartialOrd for ExpirySlot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ExpirySlot {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.generation.cmp(&self.generation))
    }
}

/// Map and expiry queue, mutated together under one lock.
#[derive(Default)]
struct Inner {
    map: HashMap<Bytes, Entry>,
    queue: BinaryHeap<ExpirySlot>,
}

/// In-memory TTL cache.
///
/// Construction spawns the reaper task, so a `MemoryCache` must be
/// created inside a tokio runtime. Dropping the cache stops the reaper.
pub struct MemoryCache {
    inner: Arc<RwLock<Inner>>,
    reaper_wake: Arc<Notify>,
    next_generation: AtomicU64,
}

impl MemoryCache {
    /// Create an empty cache and start its expiry reaper.
    pub fn new() -> Self {
        let inner = Arc::new(RwLock::new(Inner::default()));
        let reaper_wake = Arc::new(Notify::new());

        tokio::spawn(reap_loop(Arc::downgrade(&inner), reaper_wake.clone()));

        Self {
            inner,
            reaper_wake,
            next_generation: AtomicU64::new(1),
        }
    }

    /// Number of live entries. Entries past their deadline but not yet
    /// reaped are excluded.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .read()
            .map
            .values()
            .filter(|e| e.deadline > now)
            .count()
    }

    /// Whether the cache holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn validate_key(key: &[u8]) -> FilamentResult<()> {
        if key.is_empty() {
            return Err(FilamentError::KeyEmpty);
        }
        Ok(())
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryCache {
    fn drop(&mut self) {
        // Wake the reaper so it observes the dropped cache and exits.
        self.reaper_wake.notify_one();
    }
}

impl Cache for MemoryCache {
    fn set(&self, key: Bytes, value: Bytes, ttl: Duration) -> FilamentResult<()> {
        Self::validate_key(&key)?;
        if value.is_empty() {
            return Err(FilamentError::ValueEmpty);
        }
        if ttl.is_zero() {
            return Err(FilamentError::InvalidTtl {
                ttl_seconds: ttl.as_secs() as i64,
            });
        }

        let generation = self.next_generation.fetch_add(1, AtomicOrdering::Relaxed);
        let deadline = Instant::now() + ttl;

        let wake_reaper = {
            let mut inner = self.inner.write();
            let earliest = inner.queue.peek().map(|slot| slot.deadline);

            inner.map.insert(
                key.clone(),
                Entry {
                    value,
                    generation,
                    deadline,
                },
            );
            inner.queue.push(ExpirySlot {
                deadline,
                generation,
                key,
            });

            // Only a new earliest deadline changes what the reaper is
            // sleeping towards.
            earliest.map_or(true, |e| deadline < e)
        };

        if wake_reaper {
            self.reaper_wake.notify_one();
        }

        Ok(())
    }

    fn get(&self, key: &[u8]) -> FilamentResult<Bytes> {
        Self::validate_key(key)?;

        let inner = self.inner.read();
        match inner.map.get(key) {
            // An entry past its deadline is already dead, even if the
            // reaper has not collected it yet.
            Some(entry) if entry.deadline > Instant::now() => Ok(entry.value.clone()),
            _ => Err(FilamentError::KeyNotFound),
        }
    }

    fn delete(&self, key: &[u8]) -> FilamentResult<bool> {
        Self::validate_key(key)?;

        let mut inner = self.inner.write();
        Ok(inner.map.remove(key).is_some())
    }

    fn contains(&self, key: &[u8]) -> FilamentResult<bool> {
        Self::validate_key(key)?;

        let inner = self.inner.read();
        let live = matches!(inner.map.get(key), Some(entry) if entry.deadline > Instant::now());
        Ok(live)
    }
}

/// Reaper: sleep until the earliest scheduled deadline, then collect
/// every due slot whose generation still matches the live entry. Exits
/// once the owning cache has been dropped.
async fn reap_loop(inner: Weak<RwLock<Inner>>, wake: Arc<Notify>) {
    loop {
        let next_deadline = match inner.upgrade() {
            Some(strong) => strong.read().queue.peek().map(|slot| slot.deadline),
            None => return,
        };

        match next_deadline {
            None => wake.notified().await,
            Some(deadline) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {}
                    // A SET with an earlier deadline re-arms the sleep.
                    _ = wake.notified() => continue,
                }
            }
        }

        let strong = match inner.upgrade() {
            Some(strong) => strong,
            None => return,
        };

        let mut guard = strong.write();
        let now = Instant::now();
        while let Some(slot) = guard.queue.peek() {
            if slot.deadline > now {
                break;
            }
            let Some(slot) = guard.queue.pop() else {
                break;
            };

            let still_current =
                matches!(guard.map.get(&slot.key), Some(entry) if entry.generation == slot.generation);
            if still_current {
                guard.map.remove(&slot.key);
                tracing::debug!(
                    key = %String::from_utf8_lossy(&slot.key),
                    "entry expired"
                );
            }
        }
    }
}
