//! Pool registry sharing, eviction and shutdown behaviour.

mod common;

use common::shop_file;
use slm_embed::config::PoolOptions;
use slm_embed::db::{DbPool, PoolRegistry};
use slm_embed::models::ConnectionKey;
use std::sync::Arc;
use std::time::Duration;

/// Connections go back to the pool asynchronously, so eviction may need a
/// few sweeps to observe a pool as idle.
async fn reap_until(registry: &PoolRegistry, expected: usize) -> usize {
    let mut evicted = 0;
    for _ in 0..100 {
        evicted += registry.reap_idle().await;
        if evicted >= expected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    evicted
}

fn sqlite_pool(pool: &DbPool) -> &sqlx::SqlitePool {
    match pool {
        DbPool::Sqlite(p) => p,
        other => panic!("expected a SQLite pool, got {:?}", other.dialect()),
    }
}

#[tokio::test]
async fn test_identical_keys_share_one_pool() {
    let dir = tempfile::tempdir().unwrap();
    let (path, key) = shop_file(&dir, "shared.db").await;
    let registry = PoolRegistry::new(PoolOptions::default());

    let first = registry.acquire_pool(&key).await.unwrap();
    let second = registry
        .acquire_pool(&ConnectionKey::embedded(&path))
        .await
        .unwrap();

    assert!(first.same_pool(&second));
    assert_eq!(registry.pool_count().await, 1);
}

#[tokio::test]
async fn test_concurrent_first_use_creates_one_pool() {
    let dir = tempfile::tempdir().unwrap();
    let (_, key) = shop_file(&dir, "concurrent.db").await;
    let registry = PoolRegistry::new(PoolOptions::default());

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let registry = Arc::clone(&registry);
        let key = key.clone();
        tasks.push(tokio::spawn(async move {
            registry.acquire_pool(&key).await.unwrap()
        }));
    }

    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.unwrap());
    }

    assert_eq!(registry.pool_count().await, 1);
    assert!(handles.iter().all(|h| h.same_pool(&handles[0])));
}

#[tokio::test]
async fn test_distinct_keys_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let (_, key_a) = shop_file(&dir, "a.db").await;
    let (_, key_b) = shop_file(&dir, "b.db").await;
    let registry = PoolRegistry::new(PoolOptions::default());

    let a = registry.acquire_pool(&key_a).await.unwrap();
    let b = registry.acquire_pool(&key_b).await.unwrap();
    assert!(!a.same_pool(&b));
    assert_eq!(registry.pool_count().await, 2);

    drop(a);
    registry.discard(&key_a).await;

    // Closing one pool leaves the other usable.
    let count: i64 = sqlx::query_scalar("SELECT count(*) FROM customers")
        .fetch_one(sqlite_pool(b.pool()))
        .await
        .unwrap();
    assert_eq!(count, 3);
    assert!(!registry.contains(&key_a).await);
    assert!(registry.contains(&key_b).await);
}

#[tokio::test]
async fn test_reaper_skips_held_pools() {
    let dir = tempfile::tempdir().unwrap();
    let (_, idle_key) = shop_file(&dir, "idle.db").await;
    let (_, held_key) = shop_file(&dir, "held.db").await;
    let registry = PoolRegistry::new(PoolOptions::default());

    drop(registry.acquire_pool(&idle_key).await.unwrap());
    let held = registry.acquire_pool(&held_key).await.unwrap();

    assert_eq!(reap_until(&registry, 1).await, 1);
    assert!(!registry.contains(&idle_key).await);
    assert!(registry.contains(&held_key).await);

    // Still held: repeated sweeps leave it alone.
    assert_eq!(registry.reap_idle().await, 0);
    assert!(registry.contains(&held_key).await);

    drop(held);
    assert_eq!(reap_until(&registry, 1).await, 1);
    assert_eq!(registry.pool_count().await, 0);
}

#[tokio::test]
async fn test_reaper_skips_borrowed_connection() {
    let dir = tempfile::tempdir().unwrap();
    let (_, key) = shop_file(&dir, "borrowed.db").await;
    let registry = PoolRegistry::new(PoolOptions::default());

    let handle = registry.acquire_pool(&key).await.unwrap();
    let pool = sqlite_pool(handle.pool()).clone();
    drop(handle);

    let conn = pool.acquire().await.unwrap();
    assert_eq!(registry.reap_idle().await, 0);
    assert!(registry.contains(&key).await);

    drop(conn);
    assert_eq!(reap_until(&registry, 1).await, 1);
    assert!(!registry.contains(&key).await);
}

#[tokio::test]
async fn test_close_all_then_fresh_pool() {
    let dir = tempfile::tempdir().unwrap();
    let (_, key) = shop_file(&dir, "restart.db").await;
    let registry = PoolRegistry::new(PoolOptions::default());

    let before = registry.acquire_pool(&key).await.unwrap();
    registry.close_all().await;
    assert_eq!(registry.pool_count().await, 0);
    assert!(before.pool().is_closed());

    let after = registry.acquire_pool(&key).await.unwrap();
    assert!(!after.same_pool(&before));
    assert!(!after.pool().is_closed());
    assert_eq!(registry.pool_count().await, 1);
}

#[tokio::test]
async fn test_stats_report_each_pool() {
    let dir = tempfile::tempdir().unwrap();
    let (_, key_a) = shop_file(&dir, "stats_a.db").await;
    let (_, key_b) = shop_file(&dir, "stats_b.db").await;
    let registry = PoolRegistry::new(PoolOptions::default());

    let _a = registry.acquire_pool(&key_a).await.unwrap();
    let b = registry.acquire_pool(&key_b).await.unwrap();
    let _conn = sqlite_pool(b.pool()).acquire().await.unwrap();

    let stats = registry.stats().await;
    assert_eq!(stats.pool_count, 2);
    assert!(stats.active_connections >= 1);

    let detail = stats
        .details
        .iter()
        .find(|d| d.key == key_b.to_string())
        .unwrap();
    assert_eq!(detail.active_connections, 1);
    assert_eq!(detail.total_connections, 1);
    assert!(stats.details.windows(2).all(|w| w[0].key <= w[1].key));
}

#[tokio::test]
async fn test_background_sweep_evicts_idle_pool() {
    let dir = tempfile::tempdir().unwrap();
    let (_, key) = shop_file(&dir, "sweep.db").await;
    let registry = PoolRegistry::new(PoolOptions::default());

    drop(registry.acquire_pool(&key).await.unwrap());
    registry.start_reaper(Duration::from_millis(50));

    for _ in 0..100 {
        if !registry.contains(&key).await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(!registry.contains(&key).await);
    registry.stop_reaper();
}
