//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 偏好、筛选条件、计算结果、批量读取、预热和记忆化集成测试

#[path = "../common/mod.rs"]
mod common;

use common::{cache_config, new_cache, setup_logging};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use wealthcache::cache::{memoize, BatchRequest, MemoizeOptions, WarmupPrediction};
use wealthcache::{CacheError, CacheOptions, FileStorage, LocalStorage, SmartCache};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TransactionFilters {
    account: Option<String>,
    category: Option<String>,
}

fn filters(category: &str) -> TransactionFilters {
    TransactionFilters {
        account: None,
        category: Some(category.to_string()),
    }
}

#[tokio::test]
async fn test_preferences_survive_restart() {
    setup_logging();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("storage.json");

    {
        let storage = Arc::new(FileStorage::open(&path).unwrap());
        let cache = SmartCache::with_storage("prefs", cache_config(10), storage);
        cache.cache_preference("currency", "EUR").unwrap();
        cache.cache_preference("dashboard_widgets", &vec!["budgets", "goals"]).unwrap();
    }

    let storage = Arc::new(FileStorage::open(&path).unwrap());
    assert_eq!(
        storage.get_item("smartcache_pref_currency").unwrap().as_deref(),
        Some("\"EUR\"")
    );
    let cache = SmartCache::with_storage("prefs", cache_config(10), storage);
    assert_eq!(cache.len(), 2);

    let currency: Option<String> = cache.get_preference("currency").await.unwrap();
    assert_eq!(currency.as_deref(), Some("EUR"));
    let widgets: Option<Vec<String>> = cache.get_preference("dashboard_widgets").await.unwrap();
    assert_eq!(widgets, Some(vec!["budgets".to_string(), "goals".to_string()]));
}

#[tokio::test]
async fn test_preference_falls_back_to_storage_after_eviction() {
    setup_logging();
    let storage = common::memory_storage();
    let cache = SmartCache::with_storage("small", cache_config(1), storage);

    cache.cache_preference("theme", "dark").unwrap();
    cache.set("other", &1, CacheOptions::default()).unwrap();
    assert_eq!(cache.get_stats().evictions, 1);

    let theme: Option<String> = cache.get_preference("theme").await.unwrap();
    assert_eq!(theme.as_deref(), Some("dark"));
}

#[tokio::test]
async fn test_preferences_not_persisted_when_disabled() {
    setup_logging();
    let storage = common::memory_storage();
    let mut config = cache_config(10);
    config.persist_to_storage = false;
    let cache = SmartCache::with_storage("volatile", config, storage.clone());

    cache.cache_preference("theme", "light").unwrap();

    assert!(storage.keys().unwrap().is_empty());
    let theme: Option<String> = cache.get_preference("theme").await.unwrap();
    assert_eq!(theme.as_deref(), Some("light"));
}

#[tokio::test]
async fn test_missing_preference() {
    let cache = new_cache(10);
    let value: Option<String> = cache.get_preference("nope").await.unwrap();
    assert!(value.is_none());
}

#[tokio::test]
async fn test_filters_and_recent_history() {
    let cache = new_cache(50);

    cache.cache_filters("transactions", &filters("food")).unwrap();
    cache.cache_filters("transactions", &filters("rent")).unwrap();
    // 重复的条件移到最前，不会出现两次
    cache.cache_filters("transactions", &filters("food")).unwrap();

    let current: Option<TransactionFilters> =
        cache.get_cached_filters("transactions").await.unwrap();
    assert_eq!(current, Some(filters("food")));

    let recent: Vec<TransactionFilters> = cache.get_recent_filters("transactions").await.unwrap();
    assert_eq!(recent, vec![filters("food"), filters("rent")]);

    let other: Vec<TransactionFilters> = cache.get_recent_filters("budgets").await.unwrap();
    assert!(other.is_empty());
}

#[tokio::test]
async fn test_recent_filters_are_capped() {
    let cache = new_cache(50);
    for i in 0..15 {
        cache
            .cache_filters("goals", &filters(&format!("c{}", i)))
            .unwrap();
    }

    let recent: Vec<TransactionFilters> = cache.get_recent_filters("goals").await.unwrap();
    assert_eq!(recent.len(), 10);
    assert_eq!(recent[0], filters("c14"));
    assert_eq!(recent[9], filters("c5"));
}

#[tokio::test]
async fn test_calculation_cache_is_keyed_by_params() {
    let cache = new_cache(10);
    let january = serde_json::json!({"month": 1});
    let february = serde_json::json!({"month": 2});

    cache
        .cache_calculation("cash_flow", &january, &1500.0, &[])
        .unwrap();

    let hit: Option<f64> = cache
        .get_cached_calculation("cash_flow", &january)
        .await
        .unwrap();
    assert_eq!(hit, Some(1500.0));

    let miss: Option<f64> = cache
        .get_cached_calculation("cash_flow", &february)
        .await
        .unwrap();
    assert_eq!(miss, None);
}

#[tokio::test]
async fn test_batch_preserves_order_and_isolates_failures() {
    let cache = new_cache(10);
    cache.set("cached", &0, CacheOptions::default()).unwrap();

    let requests = vec![
        BatchRequest::new("slow", || async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(1)
        }),
        BatchRequest::new("broken", || async {
            Err(CacheError::Fetch("boom".to_string()))
        }),
        BatchRequest::new("cached", || async { Ok(99) }),
        BatchRequest::new("fast", || async { Ok(3) }),
    ];

    let results = cache.batch(requests).await;

    assert_eq!(results.len(), 4);
    assert_eq!(*results[0].as_ref().unwrap(), 1);
    assert!(results[1].is_err());
    assert_eq!(*results[2].as_ref().unwrap(), 0);
    assert_eq!(*results[3].as_ref().unwrap(), 3);
    assert!(cache.contains("slow"));
    assert!(!cache.contains("broken"));
}

#[tokio::test]
async fn test_warm_up_respects_priority_and_concurrency() {
    let cache = new_cache(20);
    cache.set("already", &0, CacheOptions::default()).unwrap();

    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let started = Arc::new(Mutex::new(Vec::new()));

    let mut predictions = Vec::new();
    for priority in 1..=6 {
        let key = format!("key{}", priority);
        let active = active.clone();
        let peak = peak.clone();
        let started = started.clone();
        let name = key.clone();
        predictions.push(WarmupPrediction::new(key, priority, move || async move {
            started.lock().unwrap().push(name);
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            active.fetch_sub(1, Ordering::SeqCst);
            Ok(priority)
        }));
    }
    predictions.push(WarmupPrediction::new("already", 100, || async { Ok(100) }));
    predictions.push(WarmupPrediction::new("failing", 0, || async {
        Err(CacheError::Fetch("unavailable".to_string()))
    }));

    let result = cache.warm_up(predictions).await;

    assert_eq!(result.loaded, 6);
    assert_eq!(result.failed, 1);
    assert_eq!(result.skipped, 1);
    assert!(!result.success);
    assert!(peak.load(Ordering::SeqCst) <= 3);

    let mut first_three: Vec<String> = started.lock().unwrap()[..3].to_vec();
    first_three.sort();
    assert_eq!(first_three, vec!["key4", "key5", "key6"]);

    let already: Option<i32> = cache.get("already").await.unwrap();
    assert_eq!(already, Some(0));
    let loaded: Option<i32> = cache.get("key1").await.unwrap();
    assert_eq!(loaded, Some(1));
}

#[tokio::test]
async fn test_warm_up_empty_is_success() {
    let cache = new_cache(5);
    let result = cache.warm_up(Vec::<WarmupPrediction<i32>>::new()).await;
    assert!(result.success);
    assert_eq!(result.loaded, 0);
}

#[test]
fn test_memoize_monthly_summary() {
    let calls = AtomicUsize::new(0);
    let summarize = memoize(
        |months: &Vec<u32>| {
            calls.fetch_add(1, Ordering::SeqCst);
            months.iter().sum::<u32>()
        },
        MemoizeOptions::default().with_max_args(10),
    );

    assert_eq!(summarize.call(&vec![1, 2, 3]).unwrap(), 6);
    assert_eq!(summarize.call(&vec![1, 2, 3]).unwrap(), 6);
    assert_eq!(summarize.call(&vec![4]).unwrap(), 4);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(summarize.len(), 2);

    summarize.clear();
    assert!(summarize.is_empty());
    summarize.call(&vec![4]).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}
