//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 智能缓存读写、过期、淘汰和后台刷新集成测试

#[path = "../common/mod.rs"]
mod common;

use common::{new_cache, setup_logging};
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wealthcache::metrics::GLOBAL_METRICS;
use wealthcache::storage::MemoryStorage;
use wealthcache::{CacheError, CacheOptions, LocalStorage, SmartCache};

fn counting_fetcher<T: Send + 'static>(
    counter: &Arc<AtomicUsize>,
    value: T,
) -> impl FnOnce() -> std::future::Ready<wealthcache::Result<T>> + Send + 'static {
    let counter = counter.clone();
    move || {
        counter.fetch_add(1, Ordering::SeqCst);
        std::future::ready(Ok(value))
    }
}

#[tokio::test]
async fn test_hit_and_miss_counting() {
    let cache = new_cache(10);

    cache.set("k", &1, CacheOptions::default()).unwrap();
    let value: Option<i32> = cache.get("k").await.unwrap();
    assert_eq!(value, Some(1));

    let stats = cache.get_stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 0);

    let missing: Option<i32> = cache.get("missing").await.unwrap();
    assert_eq!(missing, None);

    let stats = cache.get_stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert!((stats.avg_hit_rate - 0.5).abs() < f64::EPSILON);
    assert_eq!(stats.size, 1);
    assert_eq!(cache.entry_hits("k"), Some(1));
}

#[tokio::test]
async fn test_fetch_on_miss_stores_result() {
    let cache = new_cache(10);
    let calls = Arc::new(AtomicUsize::new(0));

    let value: String = cache
        .get_or_fetch(
            "accounts:list",
            counting_fetcher(&calls, "fetched".to_string()),
            CacheOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(value, "fetched");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let cached: Option<String> = cache.get("accounts:list").await.unwrap();
    assert_eq!(cached.as_deref(), Some("fetched"));

    // 新鲜命中不会再调用 fetcher
    let again: String = cache
        .get_or_fetch(
            "accounts:list",
            counting_fetcher(&calls, "other".to_string()),
            CacheOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(again, "fetched");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_ttl_expiry_without_revalidation() {
    let cache = new_cache(10);
    let options = CacheOptions::default()
        .with_ttl(Duration::from_millis(100))
        .with_stale_while_revalidate(false);

    cache.set("short", &"v", options).unwrap();
    let fresh: Option<String> = cache.get("short").await.unwrap();
    assert_eq!(fresh.as_deref(), Some("v"));

    tokio::time::sleep(Duration::from_millis(150)).await;

    let expired: Option<String> = cache.get("short").await.unwrap();
    assert_eq!(expired, None);
    assert!(!cache.contains("short"));
    assert_eq!(cache.get_stats().evictions, 1);
}

#[tokio::test]
async fn test_stale_read_is_refetched_when_revalidation_disabled() {
    let cache = new_cache(10);
    let calls = Arc::new(AtomicUsize::new(0));
    let ttl = Duration::from_millis(200);

    cache
        .set("report", &1, CacheOptions::default().with_ttl(ttl))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(260)).await;

    let value: i32 = cache
        .get_or_fetch(
            "report",
            counting_fetcher(&calls, 2),
            CacheOptions::default()
                .with_ttl(ttl)
                .with_stale_while_revalidate(false),
        )
        .await
        .unwrap();
    assert_eq!(value, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stale_while_revalidate_does_not_block() {
    let cache = new_cache(10);
    let ttl = Duration::from_millis(200);
    let options = CacheOptions::default().with_ttl(ttl);

    cache.set("balance", &100, options.clone()).unwrap();
    tokio::time::sleep(Duration::from_millis(260)).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let slow = {
        let calls = calls.clone();
        move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok(200)
        }
    };

    let started = std::time::Instant::now();
    let value: i32 = tokio::time::timeout(
        Duration::from_millis(500),
        cache.get_or_fetch("balance", slow, options.clone()),
    )
    .await
    .expect("stale read must not wait for the fetcher")
    .unwrap();
    assert_eq!(value, 100);
    assert!(started.elapsed() < Duration::from_millis(500));
    assert!(cache.is_revalidating("balance"));

    // 同一个键的第二次陈旧命中不会再次发起刷新
    let second: i32 = cache
        .get_or_fetch(
            "balance",
            || async { Ok::<i32, CacheError>(300) },
            options,
        )
        .await
        .unwrap();
    assert_eq!(second, 100);

    let refreshed = common::wait_until(Duration::from_secs(4), || {
        let cache = cache.clone();
        async move { !cache.is_revalidating("balance") }
    })
    .await;
    assert!(refreshed);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let updated: Option<i32> = cache.get("balance").await.unwrap();
    assert_eq!(updated, Some(200));
}

#[tokio::test]
async fn test_failed_revalidation_keeps_stale_entry() {
    let cache = new_cache(10);
    let options = CacheOptions::default().with_ttl(Duration::from_millis(300));

    cache.set("budget", &"old", options.clone()).unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;

    let value: String = cache
        .get_or_fetch(
            "budget",
            || async { Err::<String, _>(CacheError::Fetch("network down".to_string())) },
            options,
        )
        .await
        .unwrap();
    assert_eq!(value, "old");

    let done = common::wait_until(Duration::from_secs(1), || {
        let cache = cache.clone();
        async move { !cache.is_revalidating("budget") }
    })
    .await;
    assert!(done);
    assert!(cache.contains("budget"));
}

#[tokio::test]
async fn test_fetch_failure_falls_back_to_last_known_value() {
    let cache = new_cache(10);
    let ttl = Duration::from_millis(200);

    cache
        .set("goals", &vec![1, 2], CacheOptions::default().with_ttl(ttl))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(260)).await;

    let value: Vec<i32> = cache
        .get_or_fetch(
            "goals",
            || async { Err(CacheError::Fetch("timeout".to_string())) },
            CacheOptions::default()
                .with_ttl(ttl)
                .with_stale_while_revalidate(false),
        )
        .await
        .unwrap();
    assert_eq!(value, vec![1, 2]);

    let missing: wealthcache::Result<Vec<i32>> = cache
        .get_or_fetch(
            "never-cached",
            || async { Err(CacheError::Fetch("timeout".to_string())) },
            CacheOptions::default(),
        )
        .await;
    assert!(matches!(missing, Err(CacheError::Fetch(_))));
}

#[tokio::test]
async fn test_force_refresh_bypasses_cache() {
    let cache = new_cache(10);
    let calls = Arc::new(AtomicUsize::new(0));

    cache.set("net_worth", &1, CacheOptions::default()).unwrap();
    let value: i32 = cache
        .get_or_fetch(
            "net_worth",
            counting_fetcher(&calls, 2),
            CacheOptions::default().with_force_refresh(),
        )
        .await
        .unwrap();
    assert_eq!(value, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let stored: Option<i32> = cache.get("net_worth").await.unwrap();
    assert_eq!(stored, Some(2));
}

#[tokio::test]
async fn test_capacity_eviction_removes_least_recently_used() {
    let cache = new_cache(3);

    for key in ["a", "b", "c"] {
        cache.set(key, &key, CacheOptions::default()).unwrap();
    }
    // 访问 a 后，b 成为最久未使用的条目
    let _: Option<String> = cache.get("a").await.unwrap();

    cache.set("d", &"d", CacheOptions::default()).unwrap();

    assert_eq!(cache.len(), 3);
    assert!(cache.contains("a"));
    assert!(!cache.contains("b"));
    assert!(cache.contains("c"));
    assert!(cache.contains("d"));
    assert_eq!(cache.get_stats().evictions, 1);

    // 覆盖已有键不会淘汰
    cache.set("a", &"a2", CacheOptions::default()).unwrap();
    assert_eq!(cache.get_stats().evictions, 1);
}

#[tokio::test]
async fn test_purge_expired_counts_evictions() {
    let cache = new_cache(10);
    let options = CacheOptions::default()
        .with_ttl(Duration::from_millis(50))
        .with_stale_while_revalidate(false);

    cache.set("x", &1, options.clone()).unwrap();
    cache.set("y", &2, options).unwrap();
    cache.set("z", &3, CacheOptions::default()).unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(cache.purge_expired(), 2);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get_stats().evictions, 2);
}

#[tokio::test]
async fn test_clear_resets_stats() {
    let cache = new_cache(10);
    cache.set("k", &1, CacheOptions::default()).unwrap();
    let _: Option<i32> = cache.get("k").await.unwrap();
    let _: Option<i32> = cache.get("nope").await.unwrap();

    cache.clear();
    assert!(cache.is_empty());
    assert_eq!(cache.get_stats(), wealthcache::CacheStats::default());
}

#[tokio::test]
async fn test_invalid_key_is_rejected() {
    let cache = new_cache(10);
    let result = cache.set("", &1, CacheOptions::default());
    assert!(matches!(result, Err(CacheError::InvalidInput(_))));
}

#[tokio::test]
async fn test_rehydrates_preferences_and_skips_malformed() {
    setup_logging();
    let storage = Arc::new(MemoryStorage::new());
    storage.set_item("smartcache_pref_theme", "\"dark\"").unwrap();
    storage.set_item("smartcache_pref_broken", "{not json").unwrap();
    storage.set_item("unrelated", "1").unwrap();

    let cache = SmartCache::with_storage("prefs", common::cache_config(10), storage);
    assert_eq!(cache.len(), 1);

    let theme: Option<String> = cache.get_preference("theme").await.unwrap();
    assert_eq!(theme.as_deref(), Some("dark"));
}

#[tokio::test]
async fn test_cleanup_task_purges_in_background() {
    setup_logging();
    let mut config = common::cache_config(10);
    config.cleanup_interval_secs = 1;
    let cache = SmartCache::new("janitor", config);
    let handle = cache.spawn_cleanup().expect("cleanup enabled");

    cache
        .set(
            "temp",
            &1,
            CacheOptions::default()
                .with_ttl(Duration::from_millis(10))
                .with_stale_while_revalidate(false),
        )
        .unwrap();

    let purged = common::wait_until(Duration::from_secs(3), || {
        let cache = cache.clone();
        async move { cache.len() == 0 }
    })
    .await;
    handle.abort();
    assert!(purged);
    assert_eq!(cache.get_stats().evictions, 1);
}

#[tokio::test]
#[serial]
async fn test_metrics_record_cache_requests() {
    let cache = new_cache(10);
    let hits_before = GLOBAL_METRICS.request_count("cache", "get", "hit");
    let misses_before = GLOBAL_METRICS.request_count("cache", "get", "miss");

    cache.set("m", &1, CacheOptions::default()).unwrap();
    let _: Option<i32> = cache.get("m").await.unwrap();
    let _: Option<i32> = cache.get("absent").await.unwrap();

    assert!(GLOBAL_METRICS.request_count("cache", "get", "hit") > hits_before);
    assert!(GLOBAL_METRICS.request_count("cache", "get", "miss") > misses_before);
    assert!(wealthcache::metrics::get_metrics_string().contains("wealthcache_requests_total"));
}
