//! In-memory TTL cache with single-flight refresh
//!
//! Sits in front of every expensive computation in the service (the snapshot
//! cycle, historical range queries, the canonical price series).
//!
//! # Architecture
//! ```text
//! Request → Check slot → Fresh? → Return
//!              ↓
//!           Expired/empty → Refresh (one caller per key, others wait)
//!                             ↓               ↓
//!                           Ok → Store      Err → Previous value, or error if none
//! ```
//!
//! # Cache Strategy
//! - Each key owns a slot guarded by an async mutex, so only one refresh per
//!   key is ever in flight
//! - Callers that waited on a refresh reuse its outcome instead of starting
//!   another one, even when it failed
//! - Entries are only ever replaced by a successful refresh; a failed refresh
//!   leaves the previous entry in place

use crate::error::{Result, SignalError};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// A cached value and when it was produced
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    pub value: V,
    pub fetched_at: DateTime<Utc>,
}

struct Slot<V> {
    entry: Option<CacheEntry<V>>,

    /// Monotonic time of the last successful refresh, for TTL checks
    stored_at: Option<Instant>,
}

struct SlotCell<V> {
    /// Refreshes finished on this slot, successful or not
    completed: AtomicU64,

    state: tokio::sync::Mutex<Slot<V>>,
}

/// Keyed cache of values that expire after a caller-supplied TTL
pub struct TtlCache<K, V> {
    /// Used in log lines
    name: &'static str,

    slots: Mutex<HashMap<K, Arc<SlotCell<V>>>>,

    /// Last successful refresh per key, readable without waiting on a refresh
    published: Mutex<HashMap<K, DateTime<Utc>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slots: Mutex::new(HashMap::new()),
            published: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, key: &K) -> Arc<SlotCell<V>> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(SlotCell {
                    completed: AtomicU64::new(0),
                    state: tokio::sync::Mutex::new(Slot {
                        entry: None,
                        stored_at: None,
                    }),
                })
            })
            .clone()
    }

    /// Return the cached value for `key` if younger than `ttl`, otherwise run
    /// `refresh` and cache its result.
    ///
    /// # Arguments
    /// * `key` - Cache key
    /// * `ttl` - Maximum age of a value served without refreshing
    /// * `refresh` - Produces a new value; only called by one caller at a time per key
    ///
    /// # Returns
    /// The fresh entry, or the previous entry unchanged when the refresh fails
    ///
    /// # Errors
    /// The refresh error when nothing was ever cached for `key`, or `NoData`
    /// when this caller waited on somebody else's failed refresh
    ///
    /// # Example
    /// ```rust,ignore
    /// let entry = cache
    ///     .get_or_refresh((), Duration::from_secs(60), || assembler.build())
    ///     .await?;
    /// println!("Snapshot from {}", entry.fetched_at);
    /// ```
    pub async fn get_or_refresh<F, Fut>(&self, key: K, ttl: Duration, refresh: F) -> Result<CacheEntry<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let cell = self.slot(&key);
        let seen = cell.completed.load(Ordering::Acquire);
        let mut slot = cell.state.lock().await;

        if let (Some(entry), Some(stored_at)) = (&slot.entry, slot.stored_at) {
            if stored_at.elapsed() < ttl {
                debug!("[{}] cache HIT for {:?}", self.name, key);
                return Ok(entry.clone());
            }
        }

        // A refresh finished while we were waiting for the slot
        if cell.completed.load(Ordering::Acquire) != seen {
            return match &slot.entry {
                Some(entry) => {
                    debug!("[{}] reusing concurrent refresh outcome for {:?}", self.name, key);
                    Ok(entry.clone())
                }
                None => Err(SignalError::NoData(format!(
                    "{} refresh for {:?} failed",
                    self.name, key
                ))),
            };
        }

        debug!("[{}] cache MISS for {:?}, refreshing", self.name, key);
        let outcome = refresh().await;
        cell.completed.fetch_add(1, Ordering::AcqRel);

        match outcome {
            Ok(value) => {
                let entry = CacheEntry {
                    value,
                    fetched_at: Utc::now(),
                };
                slot.entry = Some(entry.clone());
                slot.stored_at = Some(Instant::now());

                self.published
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(key.clone(), entry.fetched_at);

                info!("[{}] refreshed {:?}", self.name, key);
                Ok(entry)
            }
            Err(e) => match &slot.entry {
                Some(stale) => {
                    warn!(
                        "[{}] refresh for {:?} failed: {}; serving value from {}",
                        self.name, key, e, stale.fetched_at
                    );
                    Ok(stale.clone())
                }
                None => {
                    error!("[{}] refresh for {:?} failed with nothing cached: {}", self.name, key, e);
                    Err(e)
                }
            },
        }
    }

    /// When the value for `key` was last refreshed successfully
    pub fn last_refreshed(&self, key: &K) -> Option<DateTime<Utc>> {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .copied()
    }
}
