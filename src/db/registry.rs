//! Pool registry.
//!
//! Maps a [`ConnectionKey`] to at most one live pool. Pools are created lazily
//! on first use and evicted by a periodic sweep once nobody holds them.
//!
//! # Concurrency
//!
//! - One `OnceCell` per key: concurrent first requests for the same key wait
//!   on a single pool creation instead of racing to build several.
//! - Locks are never held across pool creation or pool closing.
//! - A [`PoolHandle`] keeps its cell alive through an `Arc`. The sweep only
//!   evicts a cell whose sole owner is the map, and whose pool has no borrowed
//!   connection, re-checked under the write lock.
//! - A failed creation removes its cell only when the cell is still the one in
//!   the map, still empty, and no other caller is waiting on it. The last
//!   failing waiter therefore always cleans up.

use crate::config::PoolOptions;
use crate::db::pool::{self, ConnectionPool, DbPool, PoolSizing};
use crate::error::{EngineError, EngineResult};
use crate::models::{ConnectionKey, PoolDetail, PoolStats};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{OnceCell, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type Slot = Arc<OnceCell<ConnectionPool>>;

/// A caller's claim on a registered pool.
///
/// While any handle for a pool is alive the sweep leaves that pool alone.
/// Dropping the handle is all the release there is.
#[derive(Debug)]
pub struct PoolHandle {
    slot: Slot,
    pool: DbPool,
}

impl PoolHandle {
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// True when both handles point at the same registered pool.
    pub fn same_pool(&self, other: &PoolHandle) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

pub struct PoolRegistry {
    options: PoolOptions,
    pools: RwLock<HashMap<ConnectionKey, Slot>>,
    /// Sweep task handle. A std mutex so it can be touched without awaiting.
    reaper: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl PoolRegistry {
    pub fn new(options: PoolOptions) -> Arc<Self> {
        Arc::new(Self {
            options,
            pools: RwLock::new(HashMap::new()),
            reaper: std::sync::Mutex::new(None),
        })
    }

    pub fn options(&self) -> &PoolOptions {
        &self.options
    }

    /// Spawn the periodic idle sweep. Replaces any sweep already running.
    ///
    /// The task holds only a weak reference and exits once the registry is
    /// dropped.
    pub fn start_reaper(self: &Arc<Self>, period: Duration) {
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(Self::reap_task(weak, period));

        match self.reaper.lock() {
            Ok(mut guard) => {
                if let Some(previous) = guard.replace(handle) {
                    previous.abort();
                }
            }
            Err(_) => {
                warn!("Reaper handle lock poisoned, stopping new sweep task");
                handle.abort();
            }
        }
        info!(period_secs = period.as_secs(), "Idle pool sweep started");
    }

    pub fn stop_reaper(&self) {
        if let Ok(mut guard) = self.reaper.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
                debug!("Idle pool sweep stopped");
            }
        }
    }

    /// Return a handle to the pool for `key`, creating the pool if needed.
    ///
    /// Creation connects eagerly. On failure nothing is registered and the
    /// connection error is returned.
    pub async fn acquire_pool(&self, key: &ConnectionKey) -> EngineResult<PoolHandle> {
        let slot = {
            let pools = self.pools.read().await;
            pools.get(key).cloned()
        };
        let slot = match slot {
            Some(slot) => slot,
            None => {
                let mut pools = self.pools.write().await;
                Arc::clone(pools.entry(key.clone()).or_default())
            }
        };

        let sizing = PoolSizing::for_dialect(&self.options, key.dialect);
        let created = slot
            .get_or_try_init(|| async {
                debug!(key = %key, "Creating pool");
                let db_pool = pool::connect(key, sizing).await?;
                Ok::<_, EngineError>(ConnectionPool::new(key.clone(), db_pool))
            })
            .await;

        match created {
            Ok(entry) => {
                let pool = entry.pool.clone();
                Ok(PoolHandle { slot, pool })
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Pool creation failed");
                let weak = Arc::downgrade(&slot);
                drop(slot);
                self.remove_failed_slot(key, &weak).await;
                Err(e)
            }
        }
    }

    async fn remove_failed_slot(
        &self,
        key: &ConnectionKey,
        failed: &Weak<OnceCell<ConnectionPool>>,
    ) {
        let mut pools = self.pools.write().await;
        let abandoned = pools.get(key).is_some_and(|slot| {
            std::ptr::eq(Arc::as_ptr(slot), failed.as_ptr())
                && !slot.initialized()
                && Arc::strong_count(slot) == 1
        });
        if abandoned {
            pools.remove(key);
        }
    }

    /// Remove and close the pool for `key`, if registered.
    ///
    /// Callers must have dropped their own handle first; closing waits for
    /// borrowed connections to come back.
    pub async fn discard(&self, key: &ConnectionKey) {
        let removed = {
            let mut pools = self.pools.write().await;
            pools.remove(key)
        };

        if let Some(entry) = removed.as_deref().and_then(OnceCell::get) {
            debug!(key = %key, "Discarding pool");
            entry.pool.close().await;
        }
    }

    /// Evict every pool that nobody holds and that has no borrowed connection.
    ///
    /// Returns the number of pools closed.
    pub async fn reap_idle(&self) -> usize {
        let candidates: Vec<ConnectionKey> = {
            let pools = self.pools.read().await;
            pools
                .iter()
                .filter(|(key, slot)| match slot.get() {
                    Some(entry) if Arc::strong_count(slot) == 1 && entry.is_idle() => true,
                    Some(_) => {
                        debug!(key = %key, "Skipping pool in use");
                        false
                    }
                    None => false,
                })
                .map(|(key, _)| key.clone())
                .collect()
        };

        let mut evicted = Vec::new();
        for key in candidates {
            let removed = {
                let mut pools = self.pools.write().await;
                // Re-check under the write lock; a caller may have claimed the
                // pool since the read pass.
                let still_idle = pools.get(&key).is_some_and(|slot| {
                    Arc::strong_count(slot) == 1
                        && slot.get().is_some_and(|entry| {
                            entry.is_idle()
                                && entry.total_connections() == entry.idle_connections()
                        })
                });
                if still_idle { pools.remove(&key) } else { None }
            };
            if let Some(slot) = removed {
                evicted.push((key, slot));
            }
        }

        let count = evicted.len();
        for (key, slot) in evicted {
            if let Some(entry) = slot.get() {
                info!(
                    key = %key,
                    age_secs = entry.created_at.elapsed().as_secs(),
                    "Closing idle pool"
                );
                entry.pool.close().await;
            }
        }
        count
    }

    async fn reap_task(weak: Weak<Self>, period: Duration) {
        let start = tokio::time::Instant::now() + period;
        let mut interval = tokio::time::interval_at(start, period);

        loop {
            interval.tick().await;

            let Some(registry) = weak.upgrade() else {
                debug!("Pool registry dropped, sweep exiting");
                return;
            };

            let evicted = registry.reap_idle().await;
            let remaining = registry.pool_count().await;
            debug!(evicted, remaining, "Idle pool sweep finished");

            // Release the strong reference before sleeping.
            drop(registry);
        }
    }

    /// Close every pool and empty the registry.
    ///
    /// Handles still held keep working against a closed pool and fail on
    /// their next borrow. A later acquire builds a fresh pool.
    pub async fn close_all(&self) {
        let drained: Vec<_> = {
            let mut pools = self.pools.write().await;
            pools.drain().collect()
        };

        for (key, slot) in drained {
            if let Some(entry) = slot.get() {
                info!(key = %key, "Closing pool");
                entry.pool.close().await;
            }
        }
        info!("All pools closed");
    }

    /// Number of live (initialized) pools.
    pub async fn pool_count(&self) -> usize {
        let pools = self.pools.read().await;
        pools.values().filter(|slot| slot.initialized()).count()
    }

    pub async fn contains(&self, key: &ConnectionKey) -> bool {
        let pools = self.pools.read().await;
        pools.get(key).is_some_and(|slot| slot.initialized())
    }

    pub async fn stats(&self) -> PoolStats {
        let pools = self.pools.read().await;
        let mut details: Vec<PoolDetail> = pools
            .values()
            .filter_map(|slot| slot.get())
            .map(|entry| PoolDetail {
                key: entry.key.to_string(),
                dialect: entry.key.dialect,
                active_connections: entry.active_connections(),
                idle_connections: entry.idle_connections(),
                total_connections: entry.total_connections(),
                age_secs: entry.created_at.elapsed().as_secs(),
            })
            .collect();
        details.sort_by(|a, b| a.key.cmp(&b.key));

        PoolStats {
            pool_count: details.len(),
            active_connections: details.iter().map(|d| d.active_connections).sum(),
            details,
        }
    }
}

impl Drop for PoolRegistry {
    fn drop(&mut self) {
        self.stop_reaper();
    }
}

impl std::fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
