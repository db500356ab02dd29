//! Time-boxed aggregate cache with a single global epoch.
//!
//! Every key is flagged stale at once when the epoch expires, so related
//! aggregates (the node list and the link list, say) always age out together.
//! Stale keys are recomputed lazily on their next read. Nothing is evicted;
//! one key per distinct query argument means the key set only grows.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::clock::Clock;

/// Default epoch length in seconds.
pub const DEFAULT_TTL_SECS: u64 = 300;

/// A type-erased cached value.
pub type CachedValue = Arc<dyn Any + Send + Sync>;

/// Cache for computed aggregates.
///
/// Implementors provide raw storage and invalidation; the typed
/// [`get_or_compute`](AggregateCache::get_or_compute) helpers are built on top.
pub trait AggregateCache: Send + Sync + std::fmt::Debug {
    /// The value stored under `key`, unless absent or stale.
    fn get_fresh(&self, key: &str) -> Option<CachedValue>;

    /// Store a value and clear the key's stale flag.
    fn store(&self, key: &str, value: CachedValue);

    /// Flag every key stale if the epoch has run out. Returns whether it had.
    fn mark_all_stale_if_epoch_expired(&self) -> bool;

    /// Flag every key stale now and restart the epoch.
    fn invalidate_all(&self);

    /// Number of keys held, stale or not.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the cached value for `key`, running `compute` if it is absent
    /// or stale.
    ///
    /// A value stored under the same key with a different type counts as
    /// absent. No lock is held while `compute` runs.
    fn get_or_compute<T, F>(&self, key: &str, compute: F) -> Arc<T>
    where
        Self: Sized,
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        if let Some(value) = self.get_fresh(key).and_then(|v| v.downcast::<T>().ok()) {
            return value;
        }
        debug!(key, "recomputing cached aggregate");
        let value = Arc::new(compute());
        self.store(key, value.clone());
        value
    }

    /// Like [`get_or_compute`](AggregateCache::get_or_compute) for a fallible
    /// computation. Errors are returned as-is and nothing is cached.
    fn try_get_or_compute<T, E, F>(&self, key: &str, compute: F) -> Result<Arc<T>, E>
    where
        Self: Sized,
        T: Any + Send + Sync,
        F: FnOnce() -> Result<T, E>,
    {
        if let Some(value) = self.get_fresh(key).and_then(|v| v.downcast::<T>().ok()) {
            return Ok(value);
        }
        debug!(key, "recomputing cached aggregate");
        let value = Arc::new(compute()?);
        self.store(key, value.clone());
        Ok(value)
    }
}

#[derive(Debug)]
struct Entry {
    value: CachedValue,
    stale: bool,
}

#[derive(Debug)]
struct EpochState {
    entries: HashMap<String, Entry>,
    last_epoch_reset: u64,
}

/// [`AggregateCache`] with one coarse epoch shared by all keys.
#[derive(Debug)]
pub struct EpochCache {
    state: Mutex<EpochState>,
    clock: Arc<dyn Clock>,
    ttl_secs: u64,
}

impl EpochCache {
    /// Create a cache with the default 300 second epoch.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_ttl(clock, DEFAULT_TTL_SECS)
    }

    /// Create a cache with a custom epoch length.
    pub fn with_ttl(clock: Arc<dyn Clock>, ttl_secs: u64) -> Self {
        let now = clock.now();
        Self {
            state: Mutex::new(EpochState {
                entries: HashMap::new(),
                last_epoch_reset: now,
            }),
            clock,
            ttl_secs,
        }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Whether `key` is present and flagged stale.
    pub fn is_stale(&self, key: &str) -> bool {
        self.state.lock().entries.get(key).is_some_and(|e| e.stale)
    }
}

impl AggregateCache for EpochCache {
    fn get_fresh(&self, key: &str) -> Option<CachedValue> {
        let state = self.state.lock();
        state
            .entries
            .get(key)
            .filter(|e| !e.stale)
            .map(|e| e.value.clone())
    }

    fn store(&self, key: &str, value: CachedValue) {
        let mut state = self.state.lock();
        state
            .entries
            .insert(key.to_string(), Entry { value, stale: false });
    }

    fn mark_all_stale_if_epoch_expired(&self) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock();
        if now.saturating_sub(state.last_epoch_reset) <= self.ttl_secs {
            return false;
        }
        for entry in state.entries.values_mut() {
            entry.stale = true;
        }
        state.last_epoch_reset = now;
        debug!(keys = state.entries.len(), "cache epoch expired");
        true
    }

    fn invalidate_all(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        for entry in state.entries.values_mut() {
            entry.stale = true;
        }
        state.last_epoch_reset = now;
    }

    fn len(&self) -> usize {
        self.state.lock().entries.len()
    }
}
